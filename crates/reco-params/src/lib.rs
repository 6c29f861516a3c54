//! Fail-fast validation of policy recommendation job parameters.
//!
//! [`validate`] turns the operator's [`RawParams`] into a [`JobRequest`].
//! Checks run in a fixed order and the first failure is returned; there is
//! no partially validated request.

mod error;
pub mod quantity;
mod request;

pub use error::ParamError;
pub use quantity::{is_quantity, Quantity, QUANTITY_PATTERN};
pub use request::{
    format_timestamp, parse_timestamp, IsolationOption, JobRequest, RawParams, RecoType,
    ResourceProfile, TimeRange, TimestampError, DEFAULT_NS_ALLOW_LIST, TIMESTAMP_FORMAT,
    TIMESTAMP_PATTERN,
};

/// Validate raw parameters into a [`JobRequest`].
pub fn validate(raw: &RawParams) -> Result<JobRequest, ParamError> {
    let reco_type: RecoType = raw.reco_type.parse()?;

    if raw.limit < 0 {
        return Err(ParamError::NegativeLimit(raw.limit));
    }
    let limit = raw.limit as u64;

    let option: IsolationOption = raw.option.parse()?;

    let start = match raw.start_time.as_str() {
        "" => None,
        s => Some(parse_timestamp(s).map_err(|e| ParamError::InvalidStartTime {
            value: s.to_string(),
            reason: e.to_string(),
        })?),
    };
    let end = match raw.end_time.as_str() {
        "" => None,
        s => Some(parse_timestamp(s).map_err(|e| ParamError::InvalidEndTime {
            value: s.to_string(),
            reason: e.to_string(),
        })?),
    };
    let time_range = TimeRange::new(start, end)?;

    let ns_allow_list = parse_ns_allow_list(&raw.ns_allow_list)?;

    let executor_instances = u32::try_from(raw.executor_instances)
        .map_err(|_| ParamError::NegativeExecutorInstances(raw.executor_instances))?;

    let resources = ResourceProfile {
        executor_instances,
        driver_core_request: Quantity::parse("driver-core-request", &raw.driver_core_request)?,
        driver_memory: Quantity::parse("driver-memory", &raw.driver_memory)?,
        executor_core_request: Quantity::parse("executor-core-request", &raw.executor_core_request)?,
        executor_memory: Quantity::parse("executor-memory", &raw.executor_memory)?,
    };

    Ok(JobRequest {
        reco_type,
        limit,
        option,
        time_range,
        ns_allow_list,
        rm_labels: raw.rm_labels,
        to_services: raw.to_services,
        resources,
    })
}

/// Decode the JSON allow-list. Empty input selects the default set.
pub fn parse_ns_allow_list(input: &str) -> Result<Option<Vec<String>>, ParamError> {
    if input.trim().is_empty() {
        return Ok(None);
    }
    let list: Vec<String> =
        serde_json::from_str(input).map_err(|e| ParamError::InvalidNsAllowList(e.to_string()))?;
    if let Some(index) = list.iter().position(|ns| ns.is_empty()) {
        return Err(ParamError::EmptyNamespace { index });
    }
    Ok(Some(list))
}
