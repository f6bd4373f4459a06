//! Status polling for server-side ingestion jobs.
//!
//! [`JobPollState`] holds the transitions and knows nothing about time;
//! [`poll_job`] drives it with `tokio::time` and a cancellation token.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::constants;
use crate::error::GatewayError;
use crate::gateway::{Gateway, JobStatusReport};
use crate::models::JobStatus;

#[derive(Debug, Clone, PartialEq)]
pub struct PollPolicy {
    /// Delay before the first check and between checks
    pub interval: Duration,
    /// Ceiling for the delay once backoff has grown it
    pub max_interval: Duration,
    /// Delay multiplier applied after every non-terminal status; 1.0 keeps it fixed
    pub backoff: f64,
    /// Status checks allowed before giving up; `None` never gives up
    pub max_attempts: Option<u32>,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(constants::POLL_INTERVAL_MS),
            max_interval: Duration::from_millis(constants::POLL_MAX_INTERVAL_MS),
            backoff: 1.0,
            max_attempts: Some(constants::POLL_MAX_ATTEMPTS),
        }
    }
}

impl PollPolicy {
    /// Fixed interval, unbounded attempts
    pub fn fixed(interval: Duration) -> Self {
        Self {
            interval,
            max_interval: interval,
            backoff: 1.0,
            max_attempts: None,
        }
    }

    fn grow(&self, delay: Duration) -> Duration {
        if self.backoff <= 1.0 {
            return delay;
        }
        let ceiling = self.max_interval.max(self.interval);
        Duration::try_from_secs_f64(delay.as_secs_f64() * self.backoff)
            .map_or(ceiling, |grown| grown.min(ceiling))
    }
}

/// Terminal result of polling one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    Done { chunks: u32 },
    /// The server reported `error`
    Failed { reason: Option<String> },
    /// The status request itself failed
    Unreachable { message: String },
    /// The attempt budget ran out while the job was still pending
    TimedOut { attempts: u32 },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Done { .. })
    }

    pub fn failure_message(&self) -> Option<String> {
        match self {
            JobOutcome::Done { .. } => None,
            JobOutcome::Failed { reason } => {
                Some(reason.clone().unwrap_or_else(|| "Processing failed".to_string()))
            }
            JobOutcome::Unreachable { message } => Some(message.clone()),
            JobOutcome::TimedOut { attempts } => Some(format!(
                "Still processing after {} status checks",
                attempts
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PollStep {
    /// Check again after this delay
    Wait(Duration),
    Finished(JobOutcome),
}

#[derive(Debug, Clone)]
pub struct JobPollState {
    policy: PollPolicy,
    attempts: u32,
    delay: Duration,
    status: JobStatus,
}

impl JobPollState {
    pub fn new(policy: PollPolicy) -> Self {
        let delay = policy.interval;
        Self {
            policy,
            attempts: 0,
            delay,
            status: JobStatus::Queued,
        }
    }

    /// Delay before the next check
    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Last observed status
    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn observe(&mut self, result: Result<JobStatusReport, GatewayError>) -> PollStep {
        self.attempts += 1;
        let report = match result {
            Ok(report) => report,
            Err(e) => {
                return PollStep::Finished(JobOutcome::Unreachable {
                    message: e.to_string(),
                })
            }
        };
        self.status = report.status;

        match report.status {
            JobStatus::Done => PollStep::Finished(JobOutcome::Done {
                chunks: report.chunks_added.unwrap_or(0),
            }),
            JobStatus::Error => PollStep::Finished(JobOutcome::Failed {
                reason: report.error,
            }),
            JobStatus::Queued | JobStatus::Processing => {
                if let Some(max) = self.policy.max_attempts {
                    if self.attempts >= max {
                        return PollStep::Finished(JobOutcome::TimedOut {
                            attempts: self.attempts,
                        });
                    }
                }
                let current = self.delay;
                self.delay = self.policy.grow(current);
                PollStep::Wait(current)
            }
        }
    }
}

/// Poll `job_id` until it is terminal. `on_status` sees every non-terminal
/// status. Returns `None` if `cancel` fires first.
pub async fn poll_job(
    gateway: &dyn Gateway,
    job_id: &str,
    policy: PollPolicy,
    cancel: &CancellationToken,
    mut on_status: impl FnMut(JobStatus),
) -> Option<JobOutcome> {
    let mut state = JobPollState::new(policy);
    let mut delay = state.delay();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!(job_id, "Poll loop canceled");
                return None;
            }
            _ = tokio::time::sleep(delay) => {}
        }

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return None,
            result = gateway.get_job_status(job_id) => result,
        };

        match state.observe(result) {
            PollStep::Wait(next) => {
                debug!(job_id, status = ?state.status(), attempts = state.attempts(), "Job pending");
                on_status(state.status());
                delay = next;
            }
            PollStep::Finished(outcome) => {
                if !outcome.is_success() {
                    warn!(job_id, ?outcome, "Job did not complete");
                }
                return Some(outcome);
            }
        }
    }
}
