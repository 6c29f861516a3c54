//! Status poller
//!
//! Fixed-interval polling of a submitted job until it reaches a terminal
//! state or the timeout elapses. Each cycle waits one interval, queries the
//! state, classifies it, then checks the deadline:
//!
//! - `COMPLETED`: success
//! - `FAILED`, `SUBMISSION_FAILED`, `FAILING`, `INVALIDATING`: [`PollError::FailedState`]
//! - anything else: keep waiting
//! - deadline passed: [`PollError::Timeout`] (the job is left running)
//!
//! The interval wait is cut into short slices so a raised cancellation flag
//! is noticed promptly.

use std::sync::Arc;
use std::time::{Duration, Instant};

use reco_protocol::{ApplicationState, StateOutcome};
use thiserror::Error;
use tracing::{debug, info};

use crate::cluster::{Cluster, ClusterError, JobHandle};
use crate::config::{PollSettings, DEFAULT_POLL_INTERVAL_SECONDS, DEFAULT_POLL_TIMEOUT_SECONDS};
use crate::job::JobId;
use crate::signal::SignalState;

/// Longest uninterrupted sleep inside one interval wait.
const CANCEL_CHECK_SLICE: Duration = Duration::from_millis(100);

/// Poll timing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    pub interval: Duration,
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECONDS),
            timeout: Duration::from_secs(DEFAULT_POLL_TIMEOUT_SECONDS),
        }
    }
}

impl From<&PollSettings> for PollConfig {
    fn from(settings: &PollSettings) -> Self {
        Self {
            interval: settings.interval(),
            timeout: settings.timeout(),
        }
    }
}

/// Outcome of a successful poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollReport {
    pub job_id: JobId,
    /// Number of state queries issued.
    pub queries: u32,
    pub elapsed: Duration,
    pub state: ApplicationState,
}

/// Poll errors
#[derive(Debug, Error)]
pub enum PollError {
    #[error("policy recommendation job {job_id} entered state {state}{}", detail(.message))]
    FailedState {
        job_id: JobId,
        state: ApplicationState,
        message: Option<String>,
    },

    #[error("policy recommendation job {job_id} did not finish within {timeout:?} (last state {last_state}); the job was not cancelled")]
    Timeout {
        job_id: JobId,
        timeout: Duration,
        last_state: ApplicationState,
    },

    #[error("waiting for policy recommendation job {job_id} was cancelled")]
    Cancelled { job_id: JobId },

    #[error("querying state of job {job_id}: {source}")]
    Query {
        job_id: JobId,
        #[source]
        source: ClusterError,
    },
}

fn detail(message: &Option<String>) -> String {
    match message {
        Some(m) if !m.is_empty() => format!(": {}", m),
        _ => String::new(),
    }
}

/// Polls one job's state through a [`Cluster`].
pub struct StatusPoller<'a> {
    cluster: &'a dyn Cluster,
    config: PollConfig,
    cancel: Option<Arc<SignalState>>,
}

impl<'a> StatusPoller<'a> {
    pub fn new(cluster: &'a dyn Cluster, config: PollConfig) -> Self {
        Self {
            cluster,
            config,
            cancel: None,
        }
    }

    /// Stop waiting once `state` reports a cancellation request.
    pub fn with_cancellation(mut self, state: Arc<SignalState>) -> Self {
        self.cancel = Some(state);
        self
    }

    /// Block until the job completes, fails, times out or is cancelled.
    pub fn wait_for_completion(&self, handle: &JobHandle) -> Result<PollReport, PollError> {
        let job_id = handle.job_id;
        let started = Instant::now();
        let mut queries = 0u32;
        let mut last_state = handle.state.clone();

        loop {
            self.wait_interval(job_id)?;

            queries += 1;
            let app = self
                .cluster
                .get_application(&handle.namespace, &handle.name)
                .map_err(|source| PollError::Query { job_id, source })?;
            let state = app.state();

            if state != last_state {
                info!(%job_id, from = %last_state, to = %state, "job state changed");
            } else {
                debug!(%job_id, %state, queries, "job state unchanged");
            }

            match state.outcome() {
                StateOutcome::Succeeded => {
                    return Ok(PollReport {
                        job_id,
                        queries,
                        elapsed: started.elapsed(),
                        state,
                    });
                }
                StateOutcome::Failed => {
                    return Err(PollError::FailedState {
                        job_id,
                        state,
                        message: app.error_message().map(str::to_string),
                    });
                }
                StateOutcome::InProgress => {}
            }
            last_state = state;

            if started.elapsed() >= self.config.timeout {
                return Err(PollError::Timeout {
                    job_id,
                    timeout: self.config.timeout,
                    last_state,
                });
            }
        }
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .map(|s| s.is_cancel_requested())
            .unwrap_or(false)
    }

    fn wait_interval(&self, job_id: JobId) -> Result<(), PollError> {
        let deadline = Instant::now() + self.config.interval;
        loop {
            if self.is_cancelled() {
                return Err(PollError::Cancelled { job_id });
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep((deadline - now).min(CANCEL_CHECK_SLICE));
        }
    }
}
