//! Validation error types.

/// A single failed parameter check.
///
/// Validation is fail-fast: the first failing check is reported and no
/// request is produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParamError {
    #[error("recommendation type should be 'initial' or 'subsequent', got '{0}'")]
    InvalidType(String),

    #[error("limit should be an integer >= 0, got {0}")]
    NegativeLimit(i64),

    #[error(
        "option of network isolation preference should be anp-deny-applied or anp-deny-all or k8s-np, got '{0}'"
    )]
    UnknownOption(String),

    #[error(
        "parsing start-time '{value}': {reason}, start-time should be in 'YYYY-MM-DD hh:mm:ss' format, for example: 2006-01-02 15:04:05"
    )]
    InvalidStartTime { value: String, reason: String },

    #[error(
        "parsing end-time '{value}': {reason}, end-time should be in 'YYYY-MM-DD hh:mm:ss' format, for example: 2006-01-02 15:04:05"
    )]
    InvalidEndTime { value: String, reason: String },

    #[error("end-time ({end}) should be after start-time ({start})")]
    EndNotAfterStart { start: String, end: String },

    #[error(
        "parsing ns-allow-list: {0}, ns-allow-list should be a list of namespace string, for example: '[\"kube-system\",\"flow-aggregator\",\"flow-visibility\"]'"
    )]
    InvalidNsAllowList(String),

    #[error("ns-allow-list entry {index} is an empty namespace name")]
    EmptyNamespace { index: usize },

    #[error("executor-instances should be an integer >= 0, got {0}")]
    NegativeExecutorInstances(i64),

    #[error("{field} should conform to the Kubernetes quantity convention, got '{value}'")]
    InvalidQuantity { field: &'static str, value: String },
}

impl ParamError {
    /// Name of the invocation parameter this error refers to.
    pub fn parameter(&self) -> &'static str {
        match self {
            ParamError::InvalidType(_) => "type",
            ParamError::NegativeLimit(_) => "limit",
            ParamError::UnknownOption(_) => "option",
            ParamError::InvalidStartTime { .. } => "start-time",
            ParamError::InvalidEndTime { .. } | ParamError::EndNotAfterStart { .. } => "end-time",
            ParamError::InvalidNsAllowList(_) | ParamError::EmptyNamespace { .. } => "ns-allow-list",
            ParamError::NegativeExecutorInstances(_) => "executor-instances",
            ParamError::InvalidQuantity { field, .. } => *field,
        }
    }
}
