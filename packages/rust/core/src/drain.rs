//! Embedding job drainer.
//!
//! Jobs run strictly in order. Each one reads its source text, embeds it,
//! writes the vector back, and removes itself from the queue. A failing job
//! is recorded and the batch moves on. The shutdown signal is checked once
//! per job: the job in flight finishes, the rest are failed with the
//! shutdown reason.

use std::collections::HashSet;
use std::sync::{Arc, OnceLock};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use atomizer_shared::{AtomizerError, FailedJob, JobDescriptor, Result};

use crate::embedding::EmbeddingProvider;
use crate::store::{JobQueue, RowStore};

const DEFAULT_SHUTDOWN_REASON: &str = "worker shutdown";

/// Cooperative shutdown flag shared between a worker and whoever stops it.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    token: CancellationToken,
    reason: Arc<OnceLock<String>>,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request shutdown. The first reason given is kept.
    pub fn trigger(&self, reason: impl Into<String>) {
        let _ = self.reason.set(reason.into());
        self.token.cancel();
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<String> {
        if !self.is_triggered() {
            return None;
        }
        Some(
            self.reason
                .get()
                .cloned()
                .unwrap_or_else(|| DEFAULT_SHUTDOWN_REASON.to_string()),
        )
    }

    fn cancellation_error(&self) -> AtomizerError {
        AtomizerError::Cancelled {
            reason: self
                .reason()
                .unwrap_or_else(|| DEFAULT_SHUTDOWN_REASON.to_string()),
        }
    }
}

/// Outcome of one drained batch.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DrainReport {
    pub completed: Vec<JobDescriptor>,
    pub failed: Vec<FailedJob>,
}

/// Parse and validate a JSON array of job descriptors.
///
/// Anything malformed rejects the whole batch.
pub fn parse_job_batch(json: &str) -> Result<Vec<JobDescriptor>> {
    let jobs: Vec<JobDescriptor> = serde_json::from_str(json)
        .map_err(|e| AtomizerError::validation(format!("invalid job batch: {e}")))?;

    let mut seen = HashSet::new();
    for job in &jobs {
        if !seen.insert(job.job_id) {
            return Err(AtomizerError::validation(format!(
                "duplicate jobId {}",
                job.job_id
            )));
        }
        for (field, value) in [
            ("schema", &job.schema),
            ("table", &job.table),
            ("contentFunction", &job.content_function),
            ("embeddingColumn", &job.embedding_column),
        ] {
            if value.trim().is_empty() {
                return Err(AtomizerError::validation(format!(
                    "job {}: {field} must not be empty",
                    job.job_id
                )));
            }
        }
    }
    Ok(jobs)
}

/// Runs embedding jobs against a row store, an embedder, and a queue.
pub struct Drainer<'a> {
    rows: &'a dyn RowStore,
    queue: &'a dyn JobQueue,
    embedder: &'a dyn EmbeddingProvider,
    queue_name: String,
}

impl<'a> Drainer<'a> {
    pub fn new(
        rows: &'a dyn RowStore,
        queue: &'a dyn JobQueue,
        embedder: &'a dyn EmbeddingProvider,
        queue_name: impl Into<String>,
    ) -> Self {
        Self {
            rows,
            queue,
            embedder,
            queue_name: queue_name.into(),
        }
    }

    /// Process `jobs` in order and partition them into completed and failed.
    ///
    /// Returns [`AtomizerError::Cancelled`] only when shutdown was already
    /// requested before the first job started.
    #[instrument(skip_all, fields(queue = %self.queue_name, jobs = jobs.len()))]
    pub async fn drain(
        &self,
        jobs: Vec<JobDescriptor>,
        signal: &ShutdownSignal,
    ) -> Result<DrainReport> {
        if signal.is_triggered() {
            return Err(signal.cancellation_error());
        }

        let mut report = DrainReport::default();
        let mut pending = jobs.into_iter();

        while let Some(job) = pending.next() {
            if signal.is_triggered() {
                let reason = signal.cancellation_error().detail();
                warn!(
                    remaining = pending.len() + 1,
                    %reason,
                    "shutdown requested, cancelling remaining jobs"
                );
                report.failed.push(FailedJob {
                    job,
                    error: reason.clone(),
                });
                report.failed.extend(pending.by_ref().map(|job| FailedJob {
                    job,
                    error: reason.clone(),
                }));
                break;
            }

            match self.process_job(&job).await {
                Ok(()) => {
                    debug!(job_id = job.job_id, "job completed");
                    report.completed.push(job);
                }
                Err(e) => {
                    warn!(job_id = job.job_id, error = %e, "job failed");
                    report.failed.push(FailedJob {
                        job,
                        error: e.detail(),
                    });
                }
            }
        }

        info!(
            completed = report.completed.len(),
            failed = report.failed.len(),
            "drain finished"
        );
        Ok(report)
    }

    /// Fetch → embed → persist → dequeue for a single job.
    ///
    /// Any failure comes back as [`AtomizerError::Job`] carrying the bare
    /// message that is recorded for the job.
    pub async fn process_job(&self, job: &JobDescriptor) -> Result<()> {
        self.run_job(job)
            .await
            .map_err(|e| AtomizerError::job(job.job_id, e.detail()))
    }

    async fn run_job(&self, job: &JobDescriptor) -> Result<()> {
        let label = job.row_label();

        let content = self
            .rows
            .fetch_row_content(&job.schema, &job.table, &job.content_function, &job.id)
            .await?
            .ok_or_else(|| AtomizerError::not_found("row", label.as_str()))?;

        let serde_json::Value::String(text) = content else {
            return Err(AtomizerError::validation(format!(
                "invalid content - expected string: {label}"
            )));
        };

        let embedding = self.embedder.embed(&text).await?;
        let value = serde_json::to_string(&embedding)
            .map_err(|e| AtomizerError::Embedding(format!("encode embedding: {e}")))?;

        self.rows
            .update_column(&job.schema, &job.table, &job.id, &job.embedding_column, &value)
            .await?;

        if !self.queue.delete_job(&self.queue_name, job.job_id).await? {
            debug!(job_id = job.job_id, "job was already removed from the queue");
        }
        Ok(())
    }
}
