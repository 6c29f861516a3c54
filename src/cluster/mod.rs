//! Control-plane access
//!
//! [`Cluster`] is the seam between the lifecycle engine and Kubernetes.
//! [`Kubectl`] implements it by shelling out; `crate::mock::MockCluster`
//! implements it in-process for tests.

mod kubectl;

pub use kubectl::{parse_forwarded_port, Kubectl, KubectlPortForward};

use reco_protocol::{ApplicationState, SparkApplication};
use thiserror::Error;
use tracing::{info, warn};

use crate::job::{JobId, JobSpec};

/// Operations the lifecycle engine needs from the control plane.
pub trait Cluster {
    /// Create the application; returns the object as stored by the API server.
    fn create_application(&self, app: &SparkApplication) -> Result<SparkApplication, ClusterError>;

    fn get_application(&self, namespace: &str, name: &str) -> Result<SparkApplication, ClusterError>;

    /// Number of pods matching `selector` in phase `Running`.
    fn running_pods(&self, namespace: &str, selector: &str) -> Result<usize, ClusterError>;

    fn service_cluster_ip(&self, namespace: &str, service: &str) -> Result<String, ClusterError>;

    /// Decoded value of one key of a Secret.
    fn secret_value(&self, namespace: &str, secret: &str, key: &str) -> Result<String, ClusterError>;

    /// Forward an OS-assigned local port to `service:remote_port`.
    ///
    /// The forward stays up until the returned guard is dropped.
    fn port_forward(
        &self,
        namespace: &str,
        service: &str,
        remote_port: u16,
    ) -> Result<Box<dyn Tunnel>, ClusterError>;
}

/// A live port forward. Dropping it tears the forward down.
pub trait Tunnel {
    fn local_port(&self) -> u16;
}

/// Control-plane errors
#[derive(Debug, Error)]
pub enum ClusterError {
    #[error("{kind} '{name}' not found in namespace '{namespace}'")]
    NotFound {
        kind: &'static str,
        name: String,
        namespace: String,
    },

    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` failed ({status}): {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },

    #[error("unexpected response from control plane: {0}")]
    Decode(String),

    #[error("port-forward failed: {0}")]
    PortForward(String),

    #[error("no running pods match '{selector}' in namespace '{namespace}'")]
    NotReady { selector: String, namespace: String },
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}

/// Control-plane acknowledgement of a submitted job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub job_id: JobId,
    pub name: String,
    pub namespace: String,
    pub state: ApplicationState,
}

/// Submit a job spec and return its handle.
///
/// Submission is a single attempt; any control-plane error is returned as is.
pub fn submit(cluster: &dyn Cluster, spec: &JobSpec) -> Result<JobHandle, ClusterError> {
    let created = cluster.create_application(&spec.application)?;

    if created.metadata.name != spec.name() {
        warn!(
            expected = spec.name(),
            actual = %created.metadata.name,
            "control plane returned a differently named object"
        );
    }

    let handle = JobHandle {
        job_id: spec.job_id,
        name: created.metadata.name.clone(),
        namespace: created.metadata.namespace.clone(),
        state: created.state(),
    };
    info!(job_id = %handle.job_id, name = %handle.name, namespace = %handle.namespace, "submitted job");
    Ok(handle)
}

/// Fetch the current application object of a job.
pub fn get_job(cluster: &dyn Cluster, namespace: &str, job_id: JobId) -> Result<SparkApplication, ClusterError> {
    cluster.get_application(namespace, &job_id.application_name())
}

/// Require at least one running Spark operator pod before submitting.
pub fn precheck_operator(cluster: &dyn Cluster, namespace: &str, selector: &str) -> Result<(), ClusterError> {
    let running = cluster.running_pods(namespace, selector)?;
    if running == 0 {
        return Err(ClusterError::NotReady {
            selector: selector.to_string(),
            namespace: namespace.to_string(),
        });
    }
    tracing::debug!(selector, running, "spark operator is running");
    Ok(())
}
