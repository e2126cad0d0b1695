//! Completion poller: wait for a parsing job to reach a terminal state.
//!
//! The loop sleeps `check_interval` before every status query, so a job
//! that finishes on the third query returns after three intervals. The
//! whole loop runs under one `tokio::time::timeout`; when it fires the
//! in-flight query is dropped and [`Esg2SheetError::Timeout`] is returned.
//!
//! A failed status query is not fatal on its own. Up to
//! `max_poll_failures` consecutive failures are tolerated; one more
//! surfaces [`Esg2SheetError::Polling`]. Any successful query resets the
//! counter.

use crate::config::PipelineConfig;
use crate::error::Esg2SheetError;
use crate::model::{Job, JobStatus};
use crate::pipeline::parser::ParsingService;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

/// Polling knobs, usually taken from [`PipelineConfig`].
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub check_interval: Duration,
    pub timeout: Duration,
    pub max_failures: u32,
}

impl From<&PipelineConfig> for PollSettings {
    fn from(config: &PipelineConfig) -> Self {
        Self {
            check_interval: Duration::from_secs(config.check_interval_secs),
            timeout: Duration::from_secs(config.timeout_secs),
            max_failures: config.max_poll_failures,
        }
    }
}

/// Block until `job` is `Succeeded` or `Failed`, updating it in place.
///
/// Returns the terminal status. A `Failed` job is not an error here; the
/// fetch stage refuses it.
pub async fn wait_for_completion(
    service: &dyn ParsingService,
    job: &mut Job,
    settings: PollSettings,
) -> Result<JobStatus, Esg2SheetError> {
    info!(
        "Waiting for job {} (every {}s, up to {}s)",
        job.job_id,
        settings.check_interval.as_secs(),
        settings.timeout.as_secs()
    );
    let job_id = job.job_id.clone();

    let outcome = timeout(settings.timeout, poll_until_terminal(service, job, settings)).await;
    match outcome {
        Ok(result) => result,
        Err(_) => {
            warn!("Job {} still {} after {}s", job_id, job.status, settings.timeout.as_secs());
            Err(Esg2SheetError::Timeout {
                job_id,
                secs: settings.timeout.as_secs(),
            })
        }
    }
}

async fn poll_until_terminal(
    service: &dyn ParsingService,
    job: &mut Job,
    settings: PollSettings,
) -> Result<JobStatus, Esg2SheetError> {
    let start = Instant::now();
    let mut consecutive_failures = 0u32;

    loop {
        sleep(settings.check_interval).await;

        match service.poll_status(&job.job_id).await {
            Ok(report) => {
                consecutive_failures = 0;
                job.observe(report);
                debug!(
                    "Job {}: {} ({}s elapsed)",
                    job.job_id,
                    job.status,
                    start.elapsed().as_secs()
                );
                if job.status.is_terminal() {
                    match job.status {
                        JobStatus::Failed => warn!(
                            "Job {} failed: {}",
                            job.job_id,
                            job.failure_reason.as_deref().unwrap_or("no reason given")
                        ),
                        _ => info!("Job {} finished", job.job_id),
                    }
                    return Ok(job.status);
                }
            }
            Err(e) => {
                consecutive_failures += 1;
                if consecutive_failures > settings.max_failures {
                    return Err(Esg2SheetError::Polling {
                        job_id: job.job_id.clone(),
                        attempts: consecutive_failures,
                        last_error: e.to_string(),
                    });
                }
                warn!(
                    "Job {}: status query failed ({}/{} tolerated): {}",
                    job.job_id, consecutive_failures, settings.max_failures, e
                );
            }
        }
    }
}
