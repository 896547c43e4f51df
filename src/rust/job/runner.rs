// SPDX-License-Identifier: PMPL-1.0-or-later

//! Background execution of job steps
//!
//! Work is queued on a channel and drained by a dispatcher that spawns each
//! unit once a semaphore permit is free. Every unit runs under a supervisor:
//! an error or a panic marks its job `failed`, so no job is left running.
//!
//! In-flight tracking is per submission: a unit's cleanup only clears its
//! job's entry while the unit's token is still the latest for that job.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, error, info, warn};

use crate::core::{JobStatus, JobUpdate};
use crate::error::VerifyError;
use crate::store::RecordStore;

/// One unit of background work for a job
pub type JobFuture = Pin<Box<dyn Future<Output = Result<(), VerifyError>> + Send + 'static>>;

struct Task {
    job_id: String,
    token: u64,
    work: JobFuture,
}

/// Latest submission token per job with queued or running work
#[derive(Default)]
struct Submissions {
    next_token: u64,
    jobs: HashMap<String, u64>,
}

impl Submissions {
    fn register(&mut self, job_id: &str) -> u64 {
        self.next_token += 1;
        self.jobs.insert(job_id.to_string(), self.next_token);
        self.next_token
    }

    fn release(&mut self, job_id: &str, token: u64) {
        if self.jobs.get(job_id) == Some(&token) {
            self.jobs.remove(job_id);
        }
    }
}

type InFlight = Arc<Mutex<Submissions>>;

/// Bounded-concurrency executor for job steps
#[derive(Clone)]
pub struct JobRunner {
    queue: mpsc::UnboundedSender<Task>,
    in_flight: InFlight,
}

impl JobRunner {
    /// Start the dispatcher. Must be called from within a tokio runtime.
    pub fn start(store: Arc<dyn RecordStore>, max_concurrent: usize) -> Self {
        let (queue, mut rx) = mpsc::unbounded_channel::<Task>();
        let in_flight: InFlight = Arc::new(Mutex::new(Submissions::default()));
        let permits = Arc::new(Semaphore::new(max_concurrent.max(1)));

        let tracked = Arc::clone(&in_flight);
        tokio::spawn(async move {
            while let Some(task) = rx.recv().await {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let store = Arc::clone(&store);
                let tracked = Arc::clone(&tracked);
                tokio::spawn(async move {
                    let (job_id, token) = (task.job_id.clone(), task.token);
                    supervise(store.as_ref(), task).await;
                    drop(permit);
                    with_submissions(&tracked, |subs| subs.release(&job_id, token));
                });
            }
            debug!("Job dispatcher stopped");
        });

        JobRunner { queue, in_flight }
    }

    /// Queue `work` for `job_id` and return immediately
    pub fn submit(&self, job_id: &str, work: JobFuture) -> Result<(), VerifyError> {
        let token = with_submissions(&self.in_flight, |subs| subs.register(job_id));
        let task = Task {
            job_id: job_id.to_string(),
            token,
            work,
        };
        if self.queue.send(task).is_err() {
            with_submissions(&self.in_flight, |subs| subs.release(job_id, token));
            return Err(VerifyError::Store("job runner has stopped".to_string()));
        }
        debug!("Queued background work for job {}", job_id);
        Ok(())
    }

    /// Whether background work for `job_id` is queued or running
    pub fn is_in_flight(&self, job_id: &str) -> bool {
        with_submissions(&self.in_flight, |subs| subs.jobs.contains_key(job_id))
    }

    pub fn in_flight_count(&self) -> usize {
        with_submissions(&self.in_flight, |subs| subs.jobs.len())
    }
}

fn with_submissions<R>(subs: &Mutex<Submissions>, f: impl FnOnce(&mut Submissions) -> R) -> R {
    // a panic while holding this lock cannot leave the map half-updated
    let mut guard = subs.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut guard)
}

/// Run one unit and turn any failure into a terminal `failed` record
async fn supervise(store: &dyn RecordStore, task: Task) {
    let Task { job_id, work, .. } = task;
    match tokio::spawn(work).await {
        Ok(Ok(())) => debug!("Background work for job {} finished", job_id),
        Ok(Err(e)) => {
            warn!("Job {} failed: {}", job_id, e);
            mark_failed(store, &job_id, e.log_line()).await;
        }
        Err(join) => {
            let reason = if join.is_panic() {
                "job step panicked"
            } else {
                "job step was cancelled"
            };
            error!("Job {}: {}", job_id, reason);
            mark_failed(store, &job_id, format!("InternalError: {}", reason)).await;
        }
    }
}

/// Move a job to `failed`, recording `reason` in its log and error field
pub(crate) async fn mark_failed(store: &dyn RecordStore, job_id: &str, reason: String) {
    let update = JobUpdate::status(JobStatus::Failed)
        .with_log(reason.clone())
        .with_error(reason);
    match store.update(job_id, update).await {
        Ok(_) => info!("Job {} marked failed", job_id),
        Err(e) => warn!("Could not mark job {} failed: {}", job_id, e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{NewJob, VerificationLevel};
    use crate::store::MemoryStore;
    use std::time::Duration;

    async fn running_job(store: &MemoryStore) -> String {
        store
            .create(NewJob {
                project_id: "p1".into(),
                level: VerificationLevel::Simple,
                status: JobStatus::Running,
                logs: vec![],
            })
            .await
            .unwrap()
    }

    fn id_is_set() -> bool {
        true
    }

    async fn wait_idle(runner: &JobRunner) {
        for _ in 0..200 {
            if runner.in_flight_count() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("runner did not drain");
    }

    #[tokio::test]
    async fn test_error_marks_job_failed() {
        let store = Arc::new(MemoryStore::new());
        let runner = JobRunner::start(store.clone(), 2);
        let id = running_job(&store).await;

        runner
            .submit(
                &id,
                Box::pin(async { Err::<(), _>(VerifyError::InvalidInput("bad".into())) }),
            )
            .unwrap();
        wait_idle(&runner).await;

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.completed_at.is_some());
        assert_eq!(job.logs, vec!["InvalidInput: invalid input: bad"]);
    }

    #[tokio::test]
    async fn test_panic_marks_job_failed() {
        let store = Arc::new(MemoryStore::new());
        let runner = JobRunner::start(store.clone(), 1);
        let id = running_job(&store).await;

        let work: JobFuture = Box::pin(async {
            if id_is_set() {
                panic!("boom");
            }
            Ok::<(), VerifyError>(())
        });
        runner.submit(&id, work).unwrap();
        wait_idle(&runner).await;

        let job = store.get(&id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert!(job.error.unwrap().contains("panicked"));
    }

    #[tokio::test]
    async fn test_in_flight_tracking() {
        let store = Arc::new(MemoryStore::new());
        let runner = JobRunner::start(store.clone(), 1);
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();

        runner
            .submit(
                "held",
                Box::pin(async move {
                    let _ = rx.await;
                    Ok::<(), VerifyError>(())
                }),
            )
            .unwrap();
        assert!(runner.is_in_flight("held"));
        assert!(!runner.is_in_flight("other"));

        tx.send(()).unwrap();
        wait_idle(&runner).await;
        assert!(!runner.is_in_flight("held"));
    }

    #[tokio::test]
    async fn test_resubmission_outlives_previous_unit() {
        let store = Arc::new(MemoryStore::new());
        let runner = JobRunner::start(store.clone(), 2);
        let (release_first, first_gate) = tokio::sync::oneshot::channel::<()>();
        let (release_second, second_gate) = tokio::sync::oneshot::channel::<()>();

        runner
            .submit(
                "job",
                Box::pin(async move {
                    let _ = first_gate.await;
                    Ok::<(), VerifyError>(())
                }),
            )
            .unwrap();
        runner
            .submit(
                "job",
                Box::pin(async move {
                    let _ = second_gate.await;
                    Ok::<(), VerifyError>(())
                }),
            )
            .unwrap();

        release_first.send(()).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(runner.is_in_flight("job"));

        release_second.send(()).unwrap();
        wait_idle(&runner).await;
        assert!(!runner.is_in_flight("job"));
    }

    #[test]
    fn test_stale_release_keeps_latest_submission() {
        let mut subs = Submissions::default();
        let first = subs.register("job");
        let second = subs.register("job");
        subs.release("job", first);
        assert_eq!(subs.jobs.get("job"), Some(&second));
        subs.release("job", second);
        assert!(subs.jobs.is_empty());
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let store = Arc::new(MemoryStore::new());
        let runner = JobRunner::start(store.clone(), 2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        for i in 0..6 {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            runner
                .submit(
                    &format!("job-{}", i),
                    Box::pin(async move {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        active.fetch_sub(1, Ordering::SeqCst);
                        Ok::<(), VerifyError>(())
                    }),
                )
                .unwrap();
        }
        wait_idle(&runner).await;
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }
}
