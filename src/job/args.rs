//! Argument list handed to the analytics job.
//!
//! The job receives its parameters as a flat list of `--key value` pairs.
//! [`JobArguments::to_argv`] produces it in a fixed order and
//! [`JobArguments::parse`] decodes it back, so a reflected SparkApplication
//! can be inspected without any other record of the request.

use chrono::NaiveDateTime;
use reco_params::{format_timestamp, parse_timestamp, IsolationOption, JobRequest, RecoType};
use serde::Serialize;
use thiserror::Error;

use super::JobId;

pub const ARG_TYPE: &str = "--type";
pub const ARG_LIMIT: &str = "--limit";
pub const ARG_OPTION: &str = "--option";
pub const ARG_START_TIME: &str = "--start_time";
pub const ARG_END_TIME: &str = "--end_time";
pub const ARG_NS_ALLOW_LIST: &str = "--ns_allow_list";
pub const ARG_RM_LABELS: &str = "--rm_labels";
pub const ARG_TO_SERVICES: &str = "--to_services";
pub const ARG_ID: &str = "--id";

/// Errors decoding an argument list
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgsError {
    #[error("argument {0} has no value")]
    MissingValue(String),

    #[error("expected a --flag, got '{0}'")]
    NotAFlag(String),

    #[error("unknown argument {0}")]
    UnknownFlag(String),

    #[error("argument {0} given more than once")]
    Duplicate(&'static str),

    #[error("required argument {0} is missing")]
    Missing(&'static str),

    #[error("invalid value '{value}' for {flag}: {reason}")]
    InvalidValue {
        flag: &'static str,
        value: String,
        reason: String,
    },
}

/// Logical content of the job's argument list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobArguments {
    pub reco_type: RecoType,
    pub limit: u64,
    pub option: IsolationOption,
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    pub ns_allow_list: Option<Vec<String>>,
    pub rm_labels: bool,
    pub to_services: bool,
    pub id: JobId,
}

impl JobArguments {
    pub fn from_request(request: &JobRequest, id: JobId) -> Self {
        Self {
            reco_type: request.reco_type,
            limit: request.limit,
            option: request.option,
            start_time: request.time_range.start,
            end_time: request.time_range.end,
            ns_allow_list: request.ns_allow_list.clone(),
            rm_labels: request.rm_labels,
            to_services: request.to_services,
            id,
        }
    }

    /// Encode as a flat `--key value` list.
    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = vec![
            ARG_TYPE.to_string(),
            self.reco_type.as_str().to_string(),
            ARG_LIMIT.to_string(),
            self.limit.to_string(),
            ARG_OPTION.to_string(),
            self.option.code().to_string(),
        ];
        if let Some(start) = &self.start_time {
            argv.push(ARG_START_TIME.to_string());
            argv.push(format_timestamp(start));
        }
        if let Some(end) = &self.end_time {
            argv.push(ARG_END_TIME.to_string());
            argv.push(format_timestamp(end));
        }
        if let Some(list) = &self.ns_allow_list {
            argv.push(ARG_NS_ALLOW_LIST.to_string());
            argv.push(encode_ns_allow_list(list));
        }
        argv.extend([
            ARG_RM_LABELS.to_string(),
            self.rm_labels.to_string(),
            ARG_TO_SERVICES.to_string(),
            self.to_services.to_string(),
            ARG_ID.to_string(),
            self.id.to_string(),
        ]);
        argv
    }

    /// Decode an argument list produced by [`JobArguments::to_argv`].
    ///
    /// Pairs may appear in any order; each flag at most once.
    pub fn parse<S: AsRef<str>>(argv: &[S]) -> Result<Self, ArgsError> {
        let mut reco_type = None;
        let mut limit = None;
        let mut option = None;
        let mut start_time = None;
        let mut end_time = None;
        let mut ns_allow_list = None;
        let mut rm_labels = None;
        let mut to_services = None;
        let mut id = None;

        let mut iter = argv.iter().map(AsRef::as_ref);
        while let Some(flag) = iter.next() {
            if !flag.starts_with("--") {
                return Err(ArgsError::NotAFlag(flag.to_string()));
            }
            let value = iter
                .next()
                .ok_or_else(|| ArgsError::MissingValue(flag.to_string()))?;

            match flag {
                ARG_TYPE => set_once(&mut reco_type, ARG_TYPE, parse_value(ARG_TYPE, value)?)?,
                ARG_LIMIT => set_once(&mut limit, ARG_LIMIT, parse_value(ARG_LIMIT, value)?)?,
                ARG_OPTION => {
                    let code: u8 = parse_value(ARG_OPTION, value)?;
                    let parsed = IsolationOption::from_code(code).ok_or_else(|| {
                        invalid(ARG_OPTION, value, "option code should be 1, 2 or 3")
                    })?;
                    set_once(&mut option, ARG_OPTION, parsed)?
                }
                ARG_START_TIME => {
                    let ts = parse_timestamp(value)
                        .map_err(|e| invalid(ARG_START_TIME, value, e))?;
                    set_once(&mut start_time, ARG_START_TIME, ts)?
                }
                ARG_END_TIME => {
                    let ts =
                        parse_timestamp(value).map_err(|e| invalid(ARG_END_TIME, value, e))?;
                    set_once(&mut end_time, ARG_END_TIME, ts)?
                }
                ARG_NS_ALLOW_LIST => {
                    let list: Vec<String> = serde_json::from_str(value)
                        .map_err(|e| invalid(ARG_NS_ALLOW_LIST, value, e))?;
                    set_once(&mut ns_allow_list, ARG_NS_ALLOW_LIST, list)?
                }
                ARG_RM_LABELS => {
                    set_once(&mut rm_labels, ARG_RM_LABELS, parse_value(ARG_RM_LABELS, value)?)?
                }
                ARG_TO_SERVICES => set_once(
                    &mut to_services,
                    ARG_TO_SERVICES,
                    parse_value(ARG_TO_SERVICES, value)?,
                )?,
                ARG_ID => set_once(&mut id, ARG_ID, parse_value(ARG_ID, value)?)?,
                other => return Err(ArgsError::UnknownFlag(other.to_string())),
            }
        }

        Ok(Self {
            reco_type: reco_type.ok_or(ArgsError::Missing(ARG_TYPE))?,
            limit: limit.ok_or(ArgsError::Missing(ARG_LIMIT))?,
            option: option.ok_or(ArgsError::Missing(ARG_OPTION))?,
            start_time,
            end_time,
            ns_allow_list,
            rm_labels: rm_labels.ok_or(ArgsError::Missing(ARG_RM_LABELS))?,
            to_services: to_services.ok_or(ArgsError::Missing(ARG_TO_SERVICES))?,
            id: id.ok_or(ArgsError::Missing(ARG_ID))?,
        })
    }
}

/// Compact JSON, e.g. `["kube-system","monitoring"]`.
fn encode_ns_allow_list(list: &[String]) -> String {
    let quoted: Vec<String> = list
        .iter()
        .map(|ns| serde_json::Value::String(ns.clone()).to_string())
        .collect();
    format!("[{}]", quoted.join(","))
}

fn set_once<T>(slot: &mut Option<T>, flag: &'static str, value: T) -> Result<(), ArgsError> {
    if slot.is_some() {
        return Err(ArgsError::Duplicate(flag));
    }
    *slot = Some(value);
    Ok(())
}

fn parse_value<T>(flag: &'static str, value: &str) -> Result<T, ArgsError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value.parse().map_err(|e| invalid(flag, value, e))
}

fn invalid(flag: &'static str, value: &str, reason: impl std::fmt::Display) -> ArgsError {
    ArgsError::InvalidValue {
        flag,
        value: value.to_string(),
        reason: reason.to_string(),
    }
}
