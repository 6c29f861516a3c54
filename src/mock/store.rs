//! Mock result store.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::fetch::{FetchError, ResultStore, RetrievalTarget, StoreCredentials};
use crate::job::JobId;

/// One query seen by [`MockStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedQuery {
    pub job_id: JobId,
    pub base_url: String,
    pub tunneled: bool,
    pub username: String,
    pub sql: String,
}

/// [`ResultStore`] answering from a per-job table of response bodies.
///
/// Jobs without an entry produce the fallback body, or an empty body
/// (zero rows) when none is set.
#[derive(Debug, Default)]
pub struct MockStore {
    artifacts: HashMap<JobId, String>,
    fallback: Option<String>,
    failure: Option<String>,
    queries: Mutex<Vec<RecordedQuery>>,
}

impl MockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Response body returned for `job_id`.
    pub fn with_artifact(mut self, job_id: JobId, body: &str) -> Self {
        self.artifacts.insert(job_id, body.to_string());
        self
    }

    /// Response body for jobs without their own entry.
    pub fn with_default_artifact(mut self, body: &str) -> Self {
        self.fallback = Some(body.to_string());
        self
    }

    /// Answer every query with an HTTP 500 carrying `message`.
    pub fn failing(mut self, message: &str) -> Self {
        self.failure = Some(message.to_string());
        self
    }

    pub fn queries(&self) -> Vec<RecordedQuery> {
        self.queries.lock().unwrap().clone()
    }
}

impl ResultStore for MockStore {
    fn query(
        &self,
        target: &RetrievalTarget,
        credentials: &StoreCredentials,
        sql: &str,
    ) -> Result<String, FetchError> {
        self.queries.lock().unwrap().push(RecordedQuery {
            job_id: target.job_id,
            base_url: target.base_url().to_string(),
            tunneled: target.route.is_tunneled(),
            username: credentials.username.clone(),
            sql: sql.to_string(),
        });

        if let Some(message) = &self.failure {
            return Err(FetchError::QueryStatus {
                status: 500,
                body: message.clone(),
            });
        }
        Ok(self
            .artifacts
            .get(&target.job_id)
            .or(self.fallback.as_ref())
            .cloned()
            .unwrap_or_default())
    }
}
