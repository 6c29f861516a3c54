//! Typed view of the merged configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::effective::ConfigError;

/// Everything the lifecycle engine reads from configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Namespace of the SparkApplication and the store service.
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubeconfig: Option<String>,
    /// `kubectl` executable.
    pub kubectl: String,
    pub poll: PollSettings,
    pub job: JobSettings,
    pub store: StoreSettings,
    pub prechecks: PrecheckSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PollSettings {
    pub interval_seconds: u64,
    pub timeout_seconds: u64,
}

impl PollSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

/// Fixed parts of the submitted SparkApplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobSettings {
    pub image: String,
    pub image_pull_policy: String,
    pub main_application_file: String,
    pub service_account: String,
    pub spark_version: String,
}

/// Location and credentials of the result store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreSettings {
    pub service: String,
    pub http_port: u16,
    pub pod_selector: String,
    /// Secret holding the store credentials; also wired into the job.
    pub credentials_secret: String,
    pub username_key: String,
    pub password_key: String,
    pub database: String,
    pub table: String,
    pub query_timeout_seconds: u64,
}

impl StoreSettings {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_seconds)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PrecheckSettings {
    /// Label selector of the Spark operator pods checked before submission.
    pub operator_selector: String,
}

impl Settings {
    /// Reject settings the lifecycle engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.namespace.is_empty() {
            return Err(ConfigError::ValidationError(
                "namespace must not be empty".to_string(),
            ));
        }
        if self.poll.interval_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "poll.interval_seconds must be > 0".to_string(),
            ));
        }
        if self.poll.interval_seconds > self.poll.timeout_seconds {
            return Err(ConfigError::ValidationError(format!(
                "poll.interval_seconds ({}) must not exceed poll.timeout_seconds ({})",
                self.poll.interval_seconds, self.poll.timeout_seconds
            )));
        }
        if self.store.http_port == 0 {
            return Err(ConfigError::ValidationError(
                "store.http_port must be > 0".to_string(),
            ));
        }
        if self.store.query_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError(
                "store.query_timeout_seconds must be > 0".to_string(),
            ));
        }
        if self.store.table.is_empty() {
            return Err(ConfigError::ValidationError(
                "store.table must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
