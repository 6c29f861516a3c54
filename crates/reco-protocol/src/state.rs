//! Application states reported by the Spark operator.

use serde::{Deserialize, Serialize};

/// How the lifecycle engine treats a state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateOutcome {
    /// Keep polling.
    InProgress,
    /// Terminal success.
    Succeeded,
    /// Terminal failure.
    Failed,
}

/// Application state as reported in `.status.applicationState.state`.
///
/// Strings outside the known set land in `Other` and are never terminal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ApplicationState {
    /// No state reported yet (operator has not picked the resource up).
    #[default]
    New,
    Submitted,
    Running,
    Completed,
    Failed,
    SubmissionFailed,
    Failing,
    Invalidating,
    PendingRerun,
    Succeeding,
    Unknown,
    Other(String),
}

impl ApplicationState {
    /// Parse a state string. Never fails.
    pub fn parse(s: &str) -> Self {
        match s {
            "" => ApplicationState::New,
            "SUBMITTED" => ApplicationState::Submitted,
            "RUNNING" => ApplicationState::Running,
            "COMPLETED" => ApplicationState::Completed,
            "FAILED" => ApplicationState::Failed,
            "SUBMISSION_FAILED" => ApplicationState::SubmissionFailed,
            "FAILING" => ApplicationState::Failing,
            "INVALIDATING" => ApplicationState::Invalidating,
            "PENDING_RERUN" => ApplicationState::PendingRerun,
            "SUCCEEDING" => ApplicationState::Succeeding,
            "UNKNOWN" => ApplicationState::Unknown,
            other => ApplicationState::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            ApplicationState::New => "",
            ApplicationState::Submitted => "SUBMITTED",
            ApplicationState::Running => "RUNNING",
            ApplicationState::Completed => "COMPLETED",
            ApplicationState::Failed => "FAILED",
            ApplicationState::SubmissionFailed => "SUBMISSION_FAILED",
            ApplicationState::Failing => "FAILING",
            ApplicationState::Invalidating => "INVALIDATING",
            ApplicationState::PendingRerun => "PENDING_RERUN",
            ApplicationState::Succeeding => "SUCCEEDING",
            ApplicationState::Unknown => "UNKNOWN",
            ApplicationState::Other(s) => s,
        }
    }

    pub fn outcome(&self) -> StateOutcome {
        match self {
            ApplicationState::Completed => StateOutcome::Succeeded,
            ApplicationState::Failed
            | ApplicationState::SubmissionFailed
            | ApplicationState::Failing
            | ApplicationState::Invalidating => StateOutcome::Failed,
            ApplicationState::New
            | ApplicationState::Submitted
            | ApplicationState::Running
            | ApplicationState::PendingRerun
            | ApplicationState::Succeeding
            | ApplicationState::Unknown
            | ApplicationState::Other(_) => StateOutcome::InProgress,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.outcome() != StateOutcome::InProgress
    }
}

impl From<String> for ApplicationState {
    fn from(s: String) -> Self {
        ApplicationState::parse(&s)
    }
}

impl From<ApplicationState> for String {
    fn from(state: ApplicationState) -> Self {
        state.as_str().to_string()
    }
}

impl std::fmt::Display for ApplicationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApplicationState::New => f.write_str("NEW"),
            other => f.write_str(other.as_str()),
        }
    }
}
