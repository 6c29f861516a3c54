//! Pipeline orchestration
//!
//! Wires the stages together for the three commands:
//! - `run`: validate, pre-check, build, submit; with `wait` also poll and
//!   retrieve
//! - `status`: report the state of an existing job
//! - `retrieve`: fetch the artifact of an existing job
//!
//! Each stage is blocking and the first failure aborts the pipeline.
//! Results go to the supplied writer; diagnostics go through `tracing`.

use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use reco_params::{ParamError, RawParams};
use serde::Serialize;
use thiserror::Error;
use tracing::info;

use crate::cluster::{self, Cluster, ClusterError, JobHandle};
use crate::config::{ConfigError, Settings};
use crate::fetch::{self, FetchError, Reachability, ResultFetcher, ResultStore, Sink};
use crate::job::{ArgsError, JobArguments, JobId, JobSpecBuilder};
use crate::poll::{PollConfig, PollError, PollReport, StatusPoller};
use crate::signal::{SignalState, EXIT_CODE_CANCELLED};

/// Pipeline errors
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("invalid {}: {0}", .0.parameter())]
    Params(#[from] ParamError),

    #[error("invalid job id '{id}': {reason}")]
    InvalidJobId { id: String, reason: String },

    #[error("job arguments could not be decoded: {0}")]
    Arguments(#[from] ArgsError),

    #[error("control plane error: {0}")]
    Cluster(#[from] ClusterError),

    #[error(transparent)]
    Poll(#[from] PollError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PipelineError::Config(_) => 1,
            PipelineError::Params(_) => 10,
            PipelineError::InvalidJobId { .. } => 10,
            PipelineError::Arguments(_) => 20,
            PipelineError::Cluster(_) => 20,
            PipelineError::Poll(PollError::FailedState { .. }) => 50,
            PipelineError::Poll(PollError::Timeout { .. }) => 51,
            PipelineError::Poll(PollError::Cancelled { .. }) => EXIT_CODE_CANCELLED,
            PipelineError::Poll(PollError::Query { .. }) => 20,
            PipelineError::Fetch(FetchError::Cancelled { .. }) => EXIT_CODE_CANCELLED,
            PipelineError::Fetch(FetchError::Output { .. }) => 1,
            PipelineError::Fetch(e) if e.is_precondition() => 60,
            PipelineError::Fetch(_) => 70,
            PipelineError::Io(_) => 1,
            PipelineError::Serialization(_) => 1,
        }
    }
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

/// How to reach the store and where to put the artifact.
#[derive(Debug, Clone, Default)]
pub struct RetrievalOptions {
    /// Store URL overriding both in-cluster routes.
    pub endpoint: Option<String>,
    /// Use the service cluster IP instead of a port-forward.
    pub use_cluster_ip: bool,
    /// Write the artifact here instead of stdout.
    pub output: Option<PathBuf>,
}

impl RetrievalOptions {
    fn reachability(&self) -> Result<Box<dyn Reachability>, FetchError> {
        fetch::select(self.endpoint.as_deref(), self.use_cluster_ip)
    }

    fn sink(&self) -> Sink {
        Sink::from_path(self.output.clone())
    }
}

/// Options of the `run` command beyond the job parameters.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Poll to completion and retrieve the artifact.
    pub wait: bool,
    pub retrieval: RetrievalOptions,
}

/// What `run` accomplished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Submitted(JobHandle),
    Completed {
        handle: JobHandle,
        report: PollReport,
    },
}

impl RunOutcome {
    pub fn handle(&self) -> &JobHandle {
        match self {
            RunOutcome::Submitted(handle) => handle,
            RunOutcome::Completed { handle, .. } => handle,
        }
    }
}

/// `status --json` output.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub job_id: JobId,
    pub name: String,
    pub namespace: String,
    pub state: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Decoded job arguments; only filled in for `--json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<JobArguments>,
}

/// Parse a job id given on the command line.
pub fn parse_job_id(id: &str) -> PipelineResult<JobId> {
    id.trim().parse().map_err(|e: uuid::Error| PipelineError::InvalidJobId {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

/// Runs commands against one cluster and result store.
pub struct Pipeline<'a> {
    cluster: &'a dyn Cluster,
    store: &'a dyn ResultStore,
    settings: Settings,
    poll: PollConfig,
    cancel: Option<Arc<SignalState>>,
}

impl<'a> Pipeline<'a> {
    pub fn new(cluster: &'a dyn Cluster, store: &'a dyn ResultStore, settings: Settings) -> Self {
        let poll = PollConfig::from(&settings.poll);
        Self {
            cluster,
            store,
            settings,
            poll,
            cancel: None,
        }
    }

    /// Override the poll timing taken from the settings.
    pub fn with_poll_config(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }

    /// Abort polling once `state` reports a cancellation request.
    pub fn with_cancellation(mut self, state: Arc<SignalState>) -> Self {
        self.cancel = Some(state);
        self
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Validate, submit and optionally wait for and retrieve a job.
    pub fn run(&self, raw: &RawParams, options: &RunOptions, out: &mut dyn Write) -> PipelineResult<RunOutcome> {
        let request = reco_params::validate(raw)?;
        let reach = if options.wait {
            Some(options.retrieval.reachability()?)
        } else {
            None
        };

        let namespace = &self.settings.namespace;
        cluster::precheck_operator(self.cluster, namespace, &self.settings.prechecks.operator_selector)?;

        let spec = JobSpecBuilder::new(namespace, &self.settings.job, &self.settings.store).build(&request);
        let handle = cluster::submit(self.cluster, &spec)?;

        let Some(reach) = reach else {
            writeln!(out, "Successfully created policy recommendation job with ID {}", handle.job_id)?;
            return Ok(RunOutcome::Submitted(handle));
        };

        let report = self.poller().wait_for_completion(&handle)?;
        info!(job_id = %handle.job_id, queries = report.queries, elapsed = ?report.elapsed, "job completed");

        self.retrieve_with(handle.job_id, reach.as_ref(), &options.retrieval.sink(), out)?;
        Ok(RunOutcome::Completed { handle, report })
    }

    /// Print the state of an existing job.
    pub fn status(&self, job_id: JobId, json: bool, out: &mut dyn Write) -> PipelineResult<StatusReport> {
        let app = cluster::get_job(self.cluster, &self.settings.namespace, job_id)?;
        let arguments = if json {
            Some(JobArguments::parse(&app.spec.arguments)?)
        } else {
            None
        };
        let report = StatusReport {
            job_id,
            name: app.metadata.name.clone(),
            namespace: app.metadata.namespace.clone(),
            state: app.state().to_string(),
            error_message: app.error_message().map(str::to_string),
            arguments,
        };

        if json {
            serde_json::to_writer_pretty(&mut *out, &report)?;
            writeln!(out)?;
        } else {
            writeln!(out, "Status of this policy recommendation job is {}", report.state)?;
        }
        Ok(report)
    }

    /// Retrieve the artifact of an existing job.
    pub fn retrieve(&self, job_id: JobId, options: &RetrievalOptions, out: &mut dyn Write) -> PipelineResult<()> {
        let reach = options.reachability()?;
        self.retrieve_with(job_id, reach.as_ref(), &options.sink(), out)
    }

    fn retrieve_with(
        &self,
        job_id: JobId,
        reach: &dyn Reachability,
        sink: &Sink,
        out: &mut dyn Write,
    ) -> PipelineResult<()> {
        let mut fetcher =
            ResultFetcher::new(self.cluster, self.store, &self.settings.namespace, &self.settings.store);
        if let Some(state) = &self.cancel {
            fetcher = fetcher.with_cancellation(Arc::clone(state));
        }
        let artifact = fetcher.fetch(job_id, reach)?;
        sink.write_artifact(&artifact, out)?;
        Ok(())
    }

    fn poller(&self) -> StatusPoller<'_> {
        let poller = StatusPoller::new(self.cluster, self.poll);
        match &self.cancel {
            Some(state) => poller.with_cancellation(Arc::clone(state)),
            None => poller,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_exit_codes() {
        let job_id = JobId::new();
        let cases: Vec<(PipelineError, i32)> = vec![
            (ConfigError::ValidationError("x".into()).into(), 1),
            (ParamError::NegativeLimit(-1).into(), 10),
            (parse_job_id("nope").unwrap_err(), 10),
            (ArgsError::Missing("--id").into(), 20),
            (ClusterError::Decode("x".into()).into(), 20),
            (
                PollError::FailedState {
                    job_id,
                    state: reco_protocol::ApplicationState::Failed,
                    message: None,
                }
                .into(),
                50,
            ),
            (
                PollError::Timeout {
                    job_id,
                    timeout: Duration::from_secs(1),
                    last_state: reco_protocol::ApplicationState::Running,
                }
                .into(),
                51,
            ),
            (PollError::Cancelled { job_id }.into(), 80),
            (FetchError::Cancelled { job_id }.into(), 80),
            (
                FetchError::StoreNotReady {
                    selector: "app=clickhouse".into(),
                    namespace: "flow-visibility".into(),
                }
                .into(),
                60,
            ),
            (
                FetchError::InvalidEndpoint {
                    endpoint: "x".into(),
                    reason: "y".into(),
                }
                .into(),
                60,
            ),
            (FetchError::Query("refused".into()).into(), 70),
            (
                FetchError::Output {
                    target: "stdout".into(),
                    source: io::Error::new(io::ErrorKind::BrokenPipe, "closed"),
                }
                .into(),
                1,
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.exit_code(), code, "{err}");
        }
    }

    #[test]
    fn test_param_error_names_parameter() {
        let err: PipelineError = ParamError::UnknownOption("bogus".into()).into();
        assert!(err.to_string().starts_with("invalid option:"));
    }

    #[test]
    fn test_parse_job_id() {
        let id = JobId::new();
        assert_eq!(parse_job_id(&id.to_string()).unwrap(), id);
        assert_eq!(parse_job_id(&format!(" {} ", id)).unwrap(), id);
        assert!(matches!(
            parse_job_id("policy-reco-123"),
            Err(PipelineError::InvalidJobId { .. })
        ));
    }
}
