// SPDX-License-Identifier: PMPL-1.0-or-later

//! In-memory record store

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

use super::{JobQuery, Order, ProjectSource, RecordStore};
use crate::core::{JobUpdate, NewJob, Project, VerificationJob};
use crate::error::VerifyError;

/// Job records and projects held in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    jobs: RwLock<HashMap<String, VerificationJob>>,
    projects: RwLock<HashMap<String, Project>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a project under a fresh id
    pub async fn create_project(&self, name: impl Into<String>, code: impl Into<String>) -> Project {
        let project = Project {
            id: uuid::Uuid::new_v4().to_string(),
            name: name.into(),
            code: code.into(),
            created_at: Utc::now(),
        };
        self.insert_project(project.clone()).await;
        project
    }

    /// Register a project under its own id, replacing any previous one
    pub async fn insert_project(&self, project: Project) {
        debug!("Registering project {} ({})", project.id, project.name);
        self.projects.write().await.insert(project.id.clone(), project);
    }

    pub async fn job_count(&self) -> usize {
        self.jobs.read().await.len()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn create(&self, job: NewJob) -> Result<String, VerifyError> {
        let id = uuid::Uuid::new_v4().to_string();
        let record = VerificationJob::from_new(id.clone(), job, Utc::now());
        self.jobs.write().await.insert(id.clone(), record);
        Ok(id)
    }

    async fn update(&self, id: &str, update: JobUpdate) -> Result<VerificationJob, VerifyError> {
        let mut jobs = self.jobs.write().await;
        let job = jobs
            .get_mut(id)
            .ok_or_else(|| VerifyError::RecordNotFound(id.to_string()))?;
        job.apply(update, Utc::now())?;
        Ok(job.clone())
    }

    async fn get(&self, id: &str) -> Result<Option<VerificationJob>, VerifyError> {
        Ok(self.jobs.read().await.get(id).cloned())
    }

    async fn query(&self, query: JobQuery) -> Result<Vec<VerificationJob>, VerifyError> {
        let jobs = self.jobs.read().await;
        let mut matching: Vec<VerificationJob> = jobs
            .values()
            .filter(|job| query.project_id.as_deref().map_or(true, |p| job.project_id == p))
            .cloned()
            .collect();

        matching.sort_by(|a, b| match query.order {
            Order::Newest => b.created_at.cmp(&a.created_at),
            Order::Oldest => a.created_at.cmp(&b.created_at),
        });
        if let Some(limit) = query.limit {
            matching.truncate(limit);
        }
        Ok(matching)
    }
}

#[async_trait]
impl ProjectSource for MemoryStore {
    async fn project(&self, id: &str) -> Result<Option<Project>, VerifyError> {
        Ok(self.projects.read().await.get(id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{JobStatus, VerificationLevel};

    fn new_job(project_id: &str) -> NewJob {
        NewJob {
            project_id: project_id.to_string(),
            level: VerificationLevel::Simple,
            status: JobStatus::Running,
            logs: vec!["Verification requested".to_string()],
        }
    }

    #[tokio::test]
    async fn test_create_then_get() {
        let store = MemoryStore::new();
        let id = store.create(new_job("p1")).await.unwrap();

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.id, id);
        assert_eq!(job.status, JobStatus::Running);
        assert!(job.completed_at.is_none());
        assert!(store.get("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_update_unknown_id() {
        let store = MemoryStore::new();
        let err = store.update("missing", JobUpdate::log("x")).await.unwrap_err();
        assert!(matches!(err, VerifyError::RecordNotFound(_)));
    }

    #[tokio::test]
    async fn test_illegal_update_leaves_record_intact() {
        let store = MemoryStore::new();
        let id = store.create(new_job("p1")).await.unwrap();
        store
            .update(&id, JobUpdate::status(JobStatus::Completed).with_log("done"))
            .await
            .unwrap();

        let err = store
            .update(&id, JobUpdate::status(JobStatus::Processing).with_log("again"))
            .await
            .unwrap_err();
        assert!(matches!(err, VerifyError::IllegalTransition { .. }));

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.logs, vec!["Verification requested", "done"]);
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn test_query_filters_orders_and_limits() {
        let store = MemoryStore::new();
        let first = store.create(new_job("p1")).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        let second = store.create(new_job("p1")).await.unwrap();
        store.create(new_job("p2")).await.unwrap();

        let newest = store.query(JobQuery::for_project("p1")).await.unwrap();
        let ids: Vec<_> = newest.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec![second.as_str(), first.as_str()]);

        let latest = store.query(JobQuery::for_project("p1").limit(1)).await.unwrap();
        assert_eq!(latest[0].id, second);

        let oldest = store
            .query(JobQuery {
                order: Order::Oldest,
                ..JobQuery::for_project("p1")
            })
            .await
            .unwrap();
        assert_eq!(oldest[0].id, first);

        assert_eq!(store.query(JobQuery::default()).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_projects() {
        let store = MemoryStore::new();
        let project = store.create_project("Bank", "contract Bank {}").await;
        let loaded = store.project(&project.id).await.unwrap().unwrap();
        assert_eq!(loaded.code, "contract Bank {}");
        assert!(store.project("nope").await.unwrap().is_none());
    }
}
