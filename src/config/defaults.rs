//! Built-in defaults (layer 1)

use serde_json::Value;

use super::settings::{JobSettings, PollSettings, PrecheckSettings, Settings, StoreSettings};

/// Namespace the analytics stack is deployed into.
pub const DEFAULT_NAMESPACE: &str = "flow-visibility";

pub const DEFAULT_POLL_INTERVAL_SECONDS: u64 = 5;

/// One hour.
pub const DEFAULT_POLL_TIMEOUT_SECONDS: u64 = 60 * 60;

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_POLL_INTERVAL_SECONDS,
            timeout_seconds: DEFAULT_POLL_TIMEOUT_SECONDS,
        }
    }
}

impl Default for JobSettings {
    fn default() -> Self {
        Self {
            image: "antrea/theia-policy-recommendation:latest".to_string(),
            image_pull_policy: "IfNotPresent".to_string(),
            main_application_file: "local:///opt/spark/work-dir/policy_recommendation_job.py"
                .to_string(),
            service_account: "policy-reco-spark".to_string(),
            spark_version: "3.1.1".to_string(),
        }
    }
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            service: "clickhouse-clickhouse".to_string(),
            http_port: 8123,
            pod_selector: "app=clickhouse".to_string(),
            credentials_secret: "clickhouse-secret".to_string(),
            username_key: "username".to_string(),
            password_key: "password".to_string(),
            database: "default".to_string(),
            table: "recommendations".to_string(),
            query_timeout_seconds: 30,
        }
    }
}

impl Default for PrecheckSettings {
    fn default() -> Self {
        Self {
            operator_selector: "app.kubernetes.io/name=spark-operator".to_string(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            kubeconfig: None,
            kubectl: "kubectl".to_string(),
            poll: PollSettings::default(),
            job: JobSettings::default(),
            store: StoreSettings::default(),
            prechecks: PrecheckSettings::default(),
        }
    }
}

/// Built-in defaults as a mergeable JSON layer.
pub fn builtin_value() -> Value {
    serde_json::to_value(Settings::default()).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_layer_shape() {
        let value = builtin_value();
        assert_eq!(value["namespace"], "flow-visibility");
        assert_eq!(value["poll"]["interval_seconds"], 5);
        assert_eq!(value["poll"]["timeout_seconds"], 3600);
        assert_eq!(value["store"]["http_port"], 8123);
        assert_eq!(value["job"]["service_account"], "policy-reco-spark");
    }

    #[test]
    fn test_defaults_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }
}
