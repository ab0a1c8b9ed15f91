//! Background execution of submitted jobs.
//!
//! Every submission gets a `Pending` record right away; the spawned task
//! always leaves a terminal record behind, whether the generation succeeded,
//! failed or was cancelled by shutdown.
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::error::{AppError, AppResult};
use crate::jobs::record::{JobRecord, JobState};
use crate::jobs::store::JobStore;
use crate::pipeline::Generator;

pub struct JobRunner {
    generator: Arc<Generator>,
    jobs: Arc<dyn JobStore>,
    permits: Arc<Semaphore>,
    shutdown: CancellationToken,
    counter: AtomicU64,
}

impl JobRunner {
    pub fn new(generator: Arc<Generator>, jobs: Arc<dyn JobStore>, max_in_flight: usize) -> Self {
        JobRunner {
            generator,
            jobs,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            shutdown: CancellationToken::new(),
            counter: AtomicU64::new(0),
        }
    }

    pub fn jobs(&self) -> &Arc<dyn JobStore> {
        &self.jobs
    }

    pub fn generator(&self) -> &Arc<Generator> {
        &self.generator
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Cancel queued and in-flight generations.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Record a pending job and start generating in the background.
    ///
    /// An id that is already live is not run again: the record holding it is
    /// returned unchanged.
    pub async fn submit(&self, job_id: String, prompt: String) -> JobRecord {
        let number = self.counter.fetch_add(1, Ordering::Relaxed);
        let record = JobRecord::pending(job_id, number, prompt);
        if let Err(existing) = self.jobs.insert_new(record.clone()).await {
            tracing::warn!("Job {} already submitted as #{}, not starting it again", existing.id, existing.number);
            return existing;
        }

        let generator = Arc::clone(&self.generator);
        let jobs = Arc::clone(&self.jobs);
        let permits = Arc::clone(&self.permits);
        let token = self.shutdown.clone();
        let mut finished = record.clone();

        tokio::spawn(async move {
            let job = Some((finished.id.as_str(), finished.number));
            let outcome = run_with_permit(&generator, &permits, &token, &finished.prompt, job).await;
            finished.state = match outcome {
                Ok(filename) => {
                    tracing::info!("Job {} completed: {}", finished.id, filename);
                    JobState::Completed { filename }
                }
                Err(e) => {
                    tracing::error!("Job {} failed: {}", finished.id, e);
                    JobState::Failed { message: e.to_string() }
                }
            };
            let id = finished.id.clone();
            if !jobs.finish(finished).await {
                tracing::warn!("Job {} no longer owns its record, result dropped", id);
            }
        });

        record
    }

    /// Generate synchronously, sharing the background jobs' concurrency limit.
    pub async fn run_now(&self, prompt: &str) -> AppResult<String> {
        run_with_permit(&self.generator, &self.permits, &self.shutdown, prompt, None).await
    }
}

/// Shutdown can interrupt the wait for a permit and the cloud call. Once the
/// bytes are in hand the save runs to completion.
async fn run_with_permit(
    generator: &Generator,
    permits: &Semaphore,
    token: &CancellationToken,
    prompt: &str,
    job: Option<(&str, u64)>,
) -> AppResult<String> {
    let (_permit, bytes) = tokio::select! {
        _ = token.cancelled() => return Err(AppError::Cancelled),
        fetched = async {
            let permit = permits.acquire().await.map_err(|_| AppError::Cancelled)?;
            let bytes = generator.fetch(prompt).await?;
            Ok::<_, AppError>((permit, bytes))
        } => fetched?,
    };
    generator.persist(&bytes, job).await
}
