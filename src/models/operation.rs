//! Operation models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ErrorKind;

/// The mutation an operation performs, with its request parameters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OperationKind {
    /// Fetch from a remote. `None` picks the upstream remote of the current
    /// branch, then the configured default remote.
    Fetch { remote: Option<String> },
    /// Fetch the upstream of the current branch and integrate it
    Pull { rebase: bool },
    /// Push the current branch to its upstream
    Push,
    /// Save local changes to a new stash entry
    #[serde(rename_all = "camelCase")]
    StashSave {
        message: Option<String>,
        include_untracked: bool,
    },
    StashApply,
    StashPop,
    StashDrop,
    NewTag(TagRequest),
    RemoteSettings(RemoteSettings),
}

impl OperationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fetch { .. } => "fetch",
            Self::Pull { .. } => "pull",
            Self::Push => "push",
            Self::StashSave { .. } => "stashSave",
            Self::StashApply => "stashApply",
            Self::StashPop => "stashPop",
            Self::StashDrop => "stashDrop",
            Self::NewTag(_) => "newTag",
            Self::RemoteSettings(_) => "remoteSettings",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parameters for creating a tag
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TagRequest {
    pub name: String,
    /// Revision to tag; HEAD when absent
    pub target: Option<String>,
    /// Annotated tag message; lightweight tag when absent
    pub message: Option<String>,
}

/// New configuration for a named remote
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSettings {
    pub name: String,
    pub url: Option<String>,
    /// `Some("")` clears the push URL
    pub push_url: Option<String>,
}

/// Lifecycle state of an operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OperationState {
    Idle,
    Running,
    Succeeded,
    Canceled,
    Failed,
}

impl OperationState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Canceled | Self::Failed)
    }
}

/// Details of a failed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationFailure {
    pub kind: ErrorKind,
    pub message: String,
    /// Whether the UI should surface this failure to the user
    pub reportable: bool,
}

/// Terminal outcome of an operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "camelCase")]
pub enum OperationResult {
    Succeeded,
    Canceled,
    Failed(OperationFailure),
}

impl OperationResult {
    pub fn state(&self) -> OperationState {
        match self {
            Self::Succeeded => OperationState::Succeeded,
            Self::Canceled => OperationState::Canceled,
            Self::Failed(_) => OperationState::Failed,
        }
    }

    pub fn failure(&self) -> Option<&OperationFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            _ => None,
        }
    }
}

/// Completion notice delivered to the result sink
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationReport {
    pub operation_id: Uuid,
    pub kind: String,
    pub repository: String,
    pub result: OperationResult,
    pub created_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl OperationReport {
    /// Whether the UI should show an error for this report
    pub fn should_alert(&self) -> bool {
        self.result.failure().is_some_and(|f| f.reportable)
    }
}

/// Non-failure messages for the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Notice {
    NoStashes,
}

/// Confirmation dialog content
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationRequest {
    pub message: String,
    pub info: Option<String>,
    pub action_name: String,
}
