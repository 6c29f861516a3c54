//! policy-reco - policy recommendation job lifecycle
//!
//! Drives a cluster-scheduled policy recommendation job from the command
//! line: validate parameters, build and submit a `SparkApplication`, poll it
//! to a terminal state and retrieve the resulting artifact from the result
//! store, either through a port-forward or the service's cluster IP.

pub mod cluster;
pub mod config;
pub mod fetch;
pub mod job;
pub mod mock;
pub mod pipeline;
pub mod poll;
pub mod signal;

pub use cluster::{Cluster, ClusterError, JobHandle, Kubectl, Tunnel};
pub use config::{EffectiveConfig, Settings};
pub use fetch::{ClickHouseHttp, FetchError, Reachability, ResultFetcher, ResultStore, Sink};
pub use job::{JobArguments, JobId, JobSpec, JobSpecBuilder};
pub use pipeline::{
    parse_job_id, Pipeline, PipelineError, PipelineResult, RetrievalOptions, RunOptions, RunOutcome,
};
pub use poll::{PollConfig, PollError, PollReport, StatusPoller};
