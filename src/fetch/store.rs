//! Result store client.

use std::time::Duration;

use tracing::debug;

use super::reach::RetrievalTarget;
use super::FetchError;

/// Store login, read from the cluster Secret.
#[derive(Clone, PartialEq, Eq)]
pub struct StoreCredentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for StoreCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreCredentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Runs a read-only query and returns the raw result text.
pub trait ResultStore {
    fn query(
        &self,
        target: &RetrievalTarget,
        credentials: &StoreCredentials,
        sql: &str,
    ) -> Result<String, FetchError>;
}

/// ClickHouse HTTP interface.
///
/// The query is POSTed as the request body and rows come back as
/// `TabSeparatedRaw`, one row per line, without escaping.
#[derive(Debug, Clone)]
pub struct ClickHouseHttp {
    database: String,
    timeout: Duration,
}

impl ClickHouseHttp {
    pub fn new(database: impl Into<String>, timeout: Duration) -> Self {
        Self {
            database: database.into(),
            timeout,
        }
    }
}

impl ResultStore for ClickHouseHttp {
    fn query(
        &self,
        target: &RetrievalTarget,
        credentials: &StoreCredentials,
        sql: &str,
    ) -> Result<String, FetchError> {
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .connect_timeout(self.timeout)
            .build()
            .map_err(|e| FetchError::Query(format!("building HTTP client: {}", e)))?;

        let mut url = target.base_url().clone();
        url.query_pairs_mut()
            .append_pair("database", &self.database)
            .append_pair("default_format", "TabSeparatedRaw");

        debug!(url = %url.as_str(), job_id = %target.job_id, "querying result store");

        let response = client
            .post(url)
            .basic_auth(&credentials.username, Some(&credentials.password))
            .body(sql.to_string())
            .send()
            .map_err(|e| FetchError::Query(format!("request to {} failed: {}", target.base_url(), e)))?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| FetchError::Query(format!("reading response body: {}", e)))?;

        if !status.is_success() {
            return Err(FetchError::QueryStatus {
                status: status.as_u16(),
                body: body.trim().to_string(),
            });
        }
        Ok(body)
    }
}

/// `SELECT` statement for one job's artifact.
///
/// The id is a UUID rendered by [`crate::job::JobId`], so it never needs
/// quoting beyond the surrounding single quotes.
pub fn artifact_query(table: &str, job_id: &crate::job::JobId) -> String {
    format!("SELECT yamls FROM {} WHERE id = '{}'", table, job_id)
}

/// Artifact text from a `TabSeparatedRaw` body: the row terminator of the
/// last row is dropped, zero rows yield an empty artifact.
pub fn artifact_from_body(body: &str) -> String {
    body.strip_suffix('\n').unwrap_or(body).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobId;

    #[test]
    fn test_artifact_query() {
        let id: JobId = "6a1f0c0e-7e36-4a5b-9c1e-0c1d3bb5c9aa".parse().unwrap();
        assert_eq!(
            artifact_query("recommendations", &id),
            "SELECT yamls FROM recommendations WHERE id = '6a1f0c0e-7e36-4a5b-9c1e-0c1d3bb5c9aa'"
        );
    }

    #[test]
    fn test_artifact_from_body() {
        assert_eq!(artifact_from_body(""), "");
        assert_eq!(artifact_from_body("apiVersion: v1\nkind: X\n"), "apiVersion: v1\nkind: X");
        assert_eq!(artifact_from_body("no newline"), "no newline");
        assert_eq!(artifact_from_body("\n"), "");
    }

    #[test]
    fn test_credentials_debug_hides_password() {
        let creds = StoreCredentials {
            username: "clickhouse_operator".to_string(),
            password: "hunter2".to_string(),
        };
        let shown = format!("{:?}", creds);
        assert!(shown.contains("clickhouse_operator"));
        assert!(!shown.contains("hunter2"));
    }
}
