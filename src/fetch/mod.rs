//! Result fetcher
//!
//! Retrieves a finished job's recommendation artifact from the result store
//! and hands it to exactly one [`Sink`]. The store is reached through a
//! [`Reachability`] strategy; the fetcher does not care which one.

mod reach;
mod store;

pub use reach::{select, Direct, FixedEndpoint, Reachability, RetrievalTarget, StoreRoute, Tunneled};
pub use store::{artifact_from_body, artifact_query, ClickHouseHttp, ResultStore, StoreCredentials};

use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::cluster::{Cluster, ClusterError};
use crate::config::StoreSettings;
use crate::job::JobId;
use crate::signal::SignalState;

/// Retrieval errors
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("failed to decode input endpoint {endpoint} into a url: {reason}")]
    InvalidEndpoint { endpoint: String, reason: String },

    #[error("result store is not ready: no running pods match '{selector}' in namespace '{namespace}'")]
    StoreNotReady { selector: String, namespace: String },

    #[error("checking result store pods: {0}")]
    Readiness(#[source] ClusterError),

    #[error("reading result store credentials: {0}")]
    Credentials(#[source] ClusterError),

    #[error("opening route to result store: {0}")]
    Route(#[source] ClusterError),

    #[error("result store query failed: {0}")]
    Query(String),

    #[error("result store returned HTTP {status}: {body}")]
    QueryStatus { status: u16, body: String },

    #[error("retrieval of job {job_id} cancelled")]
    Cancelled { job_id: JobId },

    #[error("writing result to {target}: {source}")]
    Output {
        target: String,
        #[source]
        source: io::Error,
    },
}

impl FetchError {
    /// Failed before any query was sent.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            FetchError::InvalidEndpoint { .. }
                | FetchError::StoreNotReady { .. }
                | FetchError::Readiness(_)
                | FetchError::Credentials(_)
                | FetchError::Route(_)
        )
    }
}

/// Where the artifact goes. One per invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Sink {
    /// Printed as is, and only when non-empty.
    Stdout,
    /// Written with exactly the artifact's contents, replacing the file.
    File(PathBuf),
}

impl Sink {
    pub fn from_path(path: Option<PathBuf>) -> Self {
        match path {
            Some(p) => Sink::File(p),
            None => Sink::Stdout,
        }
    }

    /// Write the artifact. `stdout` is only touched by [`Sink::Stdout`].
    pub fn write_artifact(&self, artifact: &str, stdout: &mut dyn Write) -> Result<(), FetchError> {
        match self {
            Sink::File(path) => {
                fs::write(path, artifact).map_err(|source| FetchError::Output {
                    target: path.display().to_string(),
                    source,
                })?;
                info!(path = %path.display(), bytes = artifact.len(), "wrote recommendation");
            }
            Sink::Stdout => {
                if artifact.is_empty() {
                    debug!("empty recommendation, nothing printed");
                    return Ok(());
                }
                stdout
                    .write_all(artifact.as_bytes())
                    .and_then(|_| stdout.flush())
                    .map_err(|source| FetchError::Output {
                        target: "stdout".to_string(),
                        source,
                    })?;
            }
        }
        Ok(())
    }
}

/// Pulls artifacts out of the result store.
pub struct ResultFetcher<'a> {
    cluster: &'a dyn Cluster,
    store: &'a dyn ResultStore,
    namespace: String,
    settings: StoreSettings,
    cancel: Option<Arc<SignalState>>,
}

impl<'a> ResultFetcher<'a> {
    pub fn new(
        cluster: &'a dyn Cluster,
        store: &'a dyn ResultStore,
        namespace: impl Into<String>,
        settings: &StoreSettings,
    ) -> Self {
        Self {
            cluster,
            store,
            namespace: namespace.into(),
            settings: settings.clone(),
            cancel: None,
        }
    }

    /// Skip the query once `state` reports a cancellation request.
    pub fn with_cancellation(mut self, state: Arc<SignalState>) -> Self {
        self.cancel = Some(state);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|s| s.is_cancel_requested())
    }

    /// Require at least one running store pod.
    pub fn check_store_ready(&self) -> Result<(), FetchError> {
        let selector = &self.settings.pod_selector;
        let running = self
            .cluster
            .running_pods(&self.namespace, selector)
            .map_err(FetchError::Readiness)?;
        if running == 0 {
            return Err(FetchError::StoreNotReady {
                selector: selector.clone(),
                namespace: self.namespace.clone(),
            });
        }
        Ok(())
    }

    pub fn credentials(&self) -> Result<StoreCredentials, FetchError> {
        let secret = &self.settings.credentials_secret;
        let read = |key: &str| {
            self.cluster
                .secret_value(&self.namespace, secret, key)
                .map_err(FetchError::Credentials)
        };
        Ok(StoreCredentials {
            username: read(&self.settings.username_key)?,
            password: read(&self.settings.password_key)?,
        })
    }

    /// Open a route and fetch the artifact of `job_id`.
    ///
    /// Zero matching rows is a valid, empty artifact. Any tunnel opened for
    /// the query is closed before this returns.
    pub fn fetch(&self, job_id: JobId, reach: &dyn Reachability) -> Result<String, FetchError> {
        self.check_store_ready()?;
        let credentials = self.credentials()?;

        let route = reach.open(self.cluster, &self.namespace, &self.settings)?;
        info!(%job_id, via = %reach.describe(), url = %route.base_url, "retrieving recommendation");
        let target = RetrievalTarget { job_id, route };
        if self.is_cancelled() {
            info!(%job_id, "retrieval cancelled, closing route");
            return Err(FetchError::Cancelled { job_id });
        }

        let sql = artifact_query(&self.settings.table, &job_id);
        let body = self.store.query(&target, &credentials, &sql)?;
        Ok(artifact_from_body(&body))
    }
}
