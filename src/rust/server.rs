// SPDX-License-Identifier: PMPL-1.0-or-later

//! HTTP API server
//!
//! A thin axum layer over [`VerificationService`]. Handlers translate JSON
//! bodies into service calls and map [`VerifyError`] onto status codes.

use anyhow::Result;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::config::ServerConfig;
use crate::core::{JobStatus, Project, VerificationJob};
use crate::error::VerifyError;
use crate::job::VerificationService;
use crate::store::MemoryStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<VerificationService>,
    /// Project registry behind `POST /projects`
    pub projects: Arc<MemoryStore>,
}

/// Build the router without binding a socket
pub fn router(state: AppState, enable_cors: bool) -> Router {
    let mut app = Router::new()
        .route("/api/health", get(health_check))
        .route("/projects", post(create_project))
        .route("/projects/:id/verifications", get(project_history))
        .route("/verify/simple", post(start_simple))
        .route("/verify/deep", post(start_deep))
        .route("/verify/confirm/:id", post(confirm))
        .route("/verification/:id", get(get_verification))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    if enable_cors {
        app = app.layer(CorsLayer::permissive());
    }
    app
}

/// Start the HTTP server
pub async fn start_server(config: &ServerConfig, state: AppState) -> Result<()> {
    let app = router(state, config.cors);
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    println!("{}", "solguard verification server".cyan().bold());
    println!("Listening on: {}", format!("http://{}", addr).green().bold());
    println!();
    println!("{}", "Endpoints:".yellow().bold());
    println!("  GET  /api/health                  - Health check");
    println!("  POST /projects                    - Register a contract");
    println!("  GET  /projects/:id/verifications  - Verification history");
    println!("  POST /verify/simple               - Start static analysis");
    println!("  POST /verify/deep                 - Start a specification draft");
    println!("  POST /verify/confirm/:id          - Approve a specification");
    println!("  GET  /verification/:id            - Job status and results");
    println!();

    info!("Binding {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// ========== Handlers ==========

async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        active_jobs: state.service.active_jobs(),
        ai_backends: state.service.ai_backends(),
    })
}

async fn create_project(
    State(state): State<AppState>,
    Json(req): Json<CreateProjectRequest>,
) -> Result<(StatusCode, Json<Project>), AppError> {
    if req.code.trim().is_empty() {
        return Err(AppError::BadRequest("project code is empty".to_string()));
    }
    let name = req.name.filter(|n| !n.trim().is_empty()).unwrap_or_else(|| "contract.sol".to_string());
    let project = state.projects.create_project(name, req.code).await;
    info!("Registered project {}", project.id);
    Ok((StatusCode::CREATED, Json(project)))
}

async fn project_history(
    State(state): State<AppState>,
    Path(project_id): Path<String>,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>, AppError> {
    let verifications = state.service.history(&project_id, params.limit).await?;
    Ok(Json(HistoryResponse { verifications }))
}

async fn start_simple(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    info!("Simple verification requested for project {}", req.project_id);
    let verification_id = state.service.start_simple(&req.project_id).await?;
    Ok(Json(StartResponse {
        verification_id,
        status: JobStatus::Running,
    }))
}

async fn start_deep(
    State(state): State<AppState>,
    Json(req): Json<StartRequest>,
) -> Result<Json<StartResponse>, AppError> {
    info!("Deep verification requested for project {}", req.project_id);
    let verification_id = state.service.start_deep(&req.project_id).await?;
    Ok(Json(StartResponse {
        verification_id,
        status: JobStatus::Running,
    }))
}

/// Body is a JSON string, a wrapper object, or raw text
async fn confirm(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    body: String,
) -> Result<Json<StartResponse>, AppError> {
    let payload = serde_json::from_str::<Value>(&body).unwrap_or(Value::String(body));
    state.service.confirm_payload(&job_id, &payload).await?;
    let job = state.service.status(&job_id).await?;
    Ok(Json(StartResponse {
        verification_id: job.id,
        status: job.status,
    }))
}

async fn get_verification(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> Result<Json<VerificationJob>, AppError> {
    Ok(Json(state.service.status(&job_id).await?))
}

// ========== Request/Response Types ==========

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    version: String,
    active_jobs: usize,
    ai_backends: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CreateProjectRequest {
    #[serde(default)]
    name: Option<String>,
    code: String,
}

#[derive(Debug, Deserialize)]
struct HistoryParams {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryResponse {
    verifications: Vec<VerificationJob>,
}

#[derive(Debug, Deserialize)]
struct StartRequest {
    project_id: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct StartResponse {
    verification_id: String,
    status: JobStatus,
}

// ========== Error Handling ==========

#[derive(Debug)]
enum AppError {
    BadRequest(String),
    NotFound(String),
    InternalError(String),
}

impl From<VerifyError> for AppError {
    fn from(err: VerifyError) -> Self {
        match err {
            VerifyError::RecordNotFound(_) => AppError::NotFound(err.to_string()),
            VerifyError::InvalidInput(_) => AppError::BadRequest(err.to_string()),
            other => AppError::InternalError(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        let body = Json(serde_json::json!({
            "error": message,
        }));

        (status, body).into_response()
    }
}
