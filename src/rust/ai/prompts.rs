// SPDX-License-Identifier: PMPL-1.0-or-later

//! System prompts for each transform step

/// Finding schema every reformatting prompt asks for
const FINDING_SCHEMA: &str = r#"{
  "results": [
    {
      "title": "short issue classification, e.g. Reentrancy",
      "description": "what is wrong and why it matters",
      "severity": "critical | high | medium | low",
      "line": 42,
      "file": "Contract.sol",
      "contract_name": "optional",
      "function_name": "optional",
      "suggested_fix": "optional",
      "confidence": "High | Medium | Low"
    }
  ],
  "logs": ["one line per notable analysis step"]
}"#;

/// Simple flow: analyzer findings into the report schema
pub fn reformat_findings() -> String {
    format!(
        "You are a smart-contract security auditor. You receive static-analysis findings as JSON. \
         Deduplicate them, give each a clear title and description, keep the reported line numbers, \
         and use only the severities high, medium or low. Respond with a single JSON object and \
         nothing else, in exactly this shape:\n{}",
        FINDING_SCHEMA
    )
}

/// Deep flow phase 1: natural-language specification draft
pub const DRAFT_SPECIFICATION: &str = "You are a formal-verification engineer. Read the Solidity \
contract and write the properties it must satisfy as a numbered list of short, precise English \
statements: invariants over state variables, pre- and post-conditions of every external function, \
access-control rules and value-conservation rules. Respond with the numbered list only.";

/// Deep flow phase 3: approved specification into prover code
pub const GENERATE_SPEC_CODE: &str = "You translate English contract properties into Certora \
Verification Language. Produce one complete .spec file containing a methods block followed by one \
rule or invariant per property, each preceded by a comment quoting the property. Respond with the \
code only, in a single fenced code block.";

/// Deep flow phase 3: prover output into the report schema
pub fn reformat_prover_results() -> String {
    format!(
        "You are a formal-verification engineer. You receive the raw output of a prover run. \
         Report every violated or unproven rule as an issue; a violated safety property is \
         critical. Mention proven rules in the logs. Respond with a single JSON object and \
         nothing else, in exactly this shape:\n{}",
        FINDING_SCHEMA
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reformat_prompts_embed_schema() {
        assert!(reformat_findings().contains("\"results\""));
        assert!(reformat_prover_results().contains("\"logs\""));
    }
}
