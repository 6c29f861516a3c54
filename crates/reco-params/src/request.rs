//! Validated request types.

use std::sync::OnceLock;

use chrono::NaiveDateTime;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};

use crate::quantity::Quantity;
use crate::ParamError;

/// Timestamp grammar for the flow-record time range (UTC).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Zero-padded layout every timestamp must match before it is parsed.
pub const TIMESTAMP_PATTERN: &str = r"^\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}$";

/// Namespaces whose traffic is allowed when no allow-list is given.
pub const DEFAULT_NS_ALLOW_LIST: &[&str] = &["kube-system", "flow-aggregator", "flow-visibility"];

/// Whether this is a first recommendation or a follow-up one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecoType {
    #[default]
    Initial,
    Subsequent,
}

impl RecoType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecoType::Initial => "initial",
            RecoType::Subsequent => "subsequent",
        }
    }
}

impl std::fmt::Display for RecoType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecoType {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initial" => Ok(RecoType::Initial),
            "subsequent" => Ok(RecoType::Subsequent),
            _ => Err(ParamError::InvalidType(s.to_string())),
        }
    }
}

/// Network isolation preference of the recommended policies.
///
/// Each option has a fixed numeric code understood by the analytics job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum IsolationOption {
    /// Allow policies plus default-deny only on Pods that received allow rules.
    #[default]
    #[serde(rename = "anp-deny-applied")]
    AnpDenyApplied,
    /// Allow policies plus a cluster-wide default deny.
    #[serde(rename = "anp-deny-all")]
    AnpDenyAll,
    /// Plain Kubernetes NetworkPolicies, no deny rules.
    #[serde(rename = "k8s-np")]
    K8sNp,
}

impl IsolationOption {
    pub const ALL: [IsolationOption; 3] = [
        IsolationOption::AnpDenyApplied,
        IsolationOption::AnpDenyAll,
        IsolationOption::K8sNp,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IsolationOption::AnpDenyApplied => "anp-deny-applied",
            IsolationOption::AnpDenyAll => "anp-deny-all",
            IsolationOption::K8sNp => "k8s-np",
        }
    }

    /// Numeric code passed to the analytics job.
    pub fn code(&self) -> u8 {
        match self {
            IsolationOption::AnpDenyApplied => 1,
            IsolationOption::AnpDenyAll => 2,
            IsolationOption::K8sNp => 3,
        }
    }

    /// Reverse lookup of [`IsolationOption::code`].
    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.code() == code)
    }
}

impl std::fmt::Display for IsolationOption {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for IsolationOption {
    type Err = ParamError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|o| o.as_str() == s)
            .ok_or_else(|| ParamError::UnknownOption(s.to_string()))
    }
}

/// Half-open `[start, end)` window of flow records; either bound may be open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<NaiveDateTime>,
    pub end: Option<NaiveDateTime>,
}

impl TimeRange {
    /// Build a range, rejecting `end <= start`.
    pub fn new(start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Result<Self, ParamError> {
        if let (Some(s), Some(e)) = (start, end) {
            if e <= s {
                return Err(ParamError::EndNotAfterStart {
                    start: format_timestamp(&s),
                    end: format_timestamp(&e),
                });
            }
        }
        Ok(Self { start, end })
    }

    pub fn is_unbounded(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

/// Render a timestamp in [`TIMESTAMP_FORMAT`].
pub fn format_timestamp(ts: &NaiveDateTime) -> String {
    ts.format(TIMESTAMP_FORMAT).to_string()
}

fn timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(TIMESTAMP_PATTERN).expect("timestamp pattern compiles"))
}

/// Why a timestamp was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TimestampError {
    #[error("expected the layout YYYY-MM-DD hh:mm:ss")]
    Layout,
    #[error(transparent)]
    Value(#[from] chrono::ParseError),
}

/// Parse a timestamp in [`TIMESTAMP_FORMAT`].
///
/// Every field must be zero-padded and no surrounding whitespace is allowed.
pub fn parse_timestamp(s: &str) -> Result<NaiveDateTime, TimestampError> {
    if !timestamp_regex().is_match(s) {
        return Err(TimestampError::Layout);
    }
    Ok(NaiveDateTime::parse_from_str(s, TIMESTAMP_FORMAT)?)
}

/// CPU/memory sizing of the Spark driver and executors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceProfile {
    pub executor_instances: u32,
    pub driver_core_request: Quantity,
    pub driver_memory: Quantity,
    pub executor_core_request: Quantity,
    pub executor_memory: Quantity,
}

/// A fully validated recommendation request.
///
/// Only [`crate::validate`] constructs this type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRequest {
    pub reco_type: RecoType,
    /// Maximum number of flow records read; 0 means no limit.
    pub limit: u64,
    pub option: IsolationOption,
    pub time_range: TimeRange,
    /// Explicit allow-list; `None` means [`DEFAULT_NS_ALLOW_LIST`].
    pub ns_allow_list: Option<Vec<String>>,
    pub rm_labels: bool,
    pub to_services: bool,
    pub resources: ResourceProfile,
}

impl JobRequest {
    /// The allow-list the job will actually apply.
    pub fn effective_ns_allow_list(&self) -> Vec<String> {
        match &self.ns_allow_list {
            Some(list) => list.clone(),
            None => DEFAULT_NS_ALLOW_LIST.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Raw invocation parameters, as typed by the operator.
///
/// Empty strings for the optional text parameters mean "not given".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawParams {
    pub reco_type: String,
    pub limit: i64,
    pub option: String,
    pub start_time: String,
    pub end_time: String,
    pub ns_allow_list: String,
    pub rm_labels: bool,
    pub to_services: bool,
    pub executor_instances: i64,
    pub driver_core_request: String,
    pub driver_memory: String,
    pub executor_core_request: String,
    pub executor_memory: String,
}

impl Default for RawParams {
    fn default() -> Self {
        Self {
            reco_type: "initial".to_string(),
            limit: 0,
            option: "anp-deny-applied".to_string(),
            start_time: String::new(),
            end_time: String::new(),
            ns_allow_list: String::new(),
            rm_labels: true,
            to_services: true,
            executor_instances: 1,
            driver_core_request: "200m".to_string(),
            driver_memory: "512M".to_string(),
            executor_core_request: "200m".to_string(),
            executor_memory: "512M".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_codes() {
        assert_eq!(IsolationOption::AnpDenyApplied.code(), 1);
        assert_eq!(IsolationOption::AnpDenyAll.code(), 2);
        assert_eq!(IsolationOption::K8sNp.code(), 3);
        for option in IsolationOption::ALL {
            assert_eq!(IsolationOption::from_code(option.code()), Some(option));
            assert_eq!(option.as_str().parse::<IsolationOption>().unwrap(), option);
        }
        assert_eq!(IsolationOption::from_code(0), None);
        assert_eq!(IsolationOption::from_code(4), None);
    }

    #[test]
    fn test_option_is_case_sensitive() {
        assert!("ANP-DENY-ALL".parse::<IsolationOption>().is_err());
    }

    #[test]
    fn test_time_range_requires_end_after_start() {
        let a = parse_timestamp("2022-01-01 00:00:00").unwrap();
        let b = parse_timestamp("2022-01-31 23:59:59").unwrap();

        assert!(TimeRange::new(Some(a), Some(b)).is_ok());
        assert!(matches!(
            TimeRange::new(Some(b), Some(a)),
            Err(ParamError::EndNotAfterStart { .. })
        ));
        assert!(matches!(
            TimeRange::new(Some(a), Some(a)),
            Err(ParamError::EndNotAfterStart { .. })
        ));
        assert!(TimeRange::new(None, Some(a)).is_ok());
        assert!(TimeRange::new(Some(a), None).is_ok());
    }

    #[test]
    fn test_timestamp_format_round_trip() {
        let ts = parse_timestamp("2022-01-31 23:59:59").unwrap();
        assert_eq!(format_timestamp(&ts), "2022-01-31 23:59:59");
    }

    #[test]
    fn test_timestamp_requires_padded_layout() {
        for input in ["2022-1-1 0:0:0", " 2022-01-01 00:00:00", "2022-01-01 00:00:00 ", "2022-01-01T00:00:00"] {
            assert_eq!(parse_timestamp(input), Err(TimestampError::Layout), "{input:?}");
        }
    }

    #[test]
    fn test_timestamp_rejects_impossible_date() {
        assert!(matches!(
            parse_timestamp("2022-02-30 00:00:00"),
            Err(TimestampError::Value(_))
        ));
    }

    #[test]
    fn test_raw_params_defaults() {
        let raw = RawParams::default();
        assert_eq!(raw.reco_type, "initial");
        assert_eq!(raw.option, "anp-deny-applied");
        assert_eq!(raw.executor_instances, 1);
        assert_eq!(raw.driver_memory, "512M");
        assert!(raw.rm_labels);
        assert!(raw.to_services);
    }
}
