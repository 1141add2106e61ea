//! Error types for repository operations

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Why an operation refused to start
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", content = "detail", rename_all = "camelCase")]
pub enum PreconditionFailure {
    /// HEAD does not point at a local branch
    DetachedHead,
    /// The current branch has no upstream, or its remote can't be resolved
    NoUpstream,
    /// There is no stash entry to operate on
    NoStashes,
    /// The working tree has no changes to stash
    NothingToStash,
    /// No remote could be chosen for the operation
    NoRemote,
    /// The named remote does not exist
    RemoteNotFound(String),
    /// The requested tag name is not a valid reference name
    InvalidTagName(String),
}

impl std::fmt::Display for PreconditionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DetachedHead => write!(f, "no branch is checked out"),
            Self::NoUpstream => write!(f, "the current branch has no tracking branch"),
            Self::NoStashes => write!(f, "there are no stashes"),
            Self::NothingToStash => write!(f, "there are no local changes to stash"),
            Self::NoRemote => write!(f, "no remote is configured"),
            Self::RemoteNotFound(name) => write!(f, "remote '{}' not found", name),
            Self::InvalidTagName(name) => write!(f, "'{}' is not a valid tag name", name),
        }
    }
}

/// Coarse classification of a failed operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "precondition", rename_all = "camelCase")]
pub enum ErrorKind {
    Precondition(PreconditionFailure),
    Authentication,
    Transport,
    Unexpected,
}

/// Operation error types
#[derive(Error, Debug)]
pub enum OpsError {
    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Cannot start operation: {0}")]
    Precondition(PreconditionFailure),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Network error: {0}")]
    Transport(String),

    #[error("Push rejected: {0}")]
    PushRejected(String),

    #[error("Merge conflict")]
    MergeConflict,

    #[error("Operation canceled")]
    Canceled,

    #[error("Another operation is already running on this repository")]
    Busy,

    #[error("Operation already started")]
    AlreadyStarted,

    #[error("Operation already ended")]
    AlreadyEnded,

    #[error("Repository not found: {0}")]
    RepositoryNotFound(String),

    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl OpsError {
    /// Classify this error for reporting. Cancellation has no kind since
    /// it is not a failure.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            OpsError::Canceled => None,
            OpsError::Precondition(reason) => Some(ErrorKind::Precondition(reason.clone())),
            OpsError::Authentication(_) => Some(ErrorKind::Authentication),
            OpsError::Transport(_) | OpsError::PushRejected(_) => Some(ErrorKind::Transport),
            OpsError::Git(e) => Some(classify_git_error(e)),
            _ => Some(ErrorKind::Unexpected),
        }
    }

    /// True when the error is the expected outcome of the user backing out,
    /// either by canceling or by dismissing a credential prompt.
    pub fn is_user_cancellation(&self) -> bool {
        matches!(self.kind(), None | Some(ErrorKind::Authentication))
    }

    /// Stable error code for the UI layer
    pub fn code(&self) -> &'static str {
        match self {
            OpsError::Git(_) => "GIT_ERROR",
            OpsError::Io(_) => "IO_ERROR",
            OpsError::Serialization(_) => "SERIALIZATION_ERROR",
            OpsError::Precondition(_) => "PRECONDITION_FAILED",
            OpsError::Authentication(_) => "AUTH_FAILED",
            OpsError::Transport(_) => "TRANSPORT_ERROR",
            OpsError::PushRejected(_) => "PUSH_REJECTED",
            OpsError::MergeConflict => "MERGE_CONFLICT",
            OpsError::Canceled => "CANCELED",
            OpsError::Busy => "BUSY",
            OpsError::AlreadyStarted => "ALREADY_STARTED",
            OpsError::AlreadyEnded => "ALREADY_ENDED",
            OpsError::RepositoryNotFound(_) => "REPO_NOT_FOUND",
            OpsError::OperationFailed(_) => "OPERATION_FAILED",
        }
    }

    /// Convert a git2 error coming out of a gateway call, keeping the
    /// categories the framework cares about as dedicated variants.
    pub fn from_git(error: git2::Error) -> Self {
        match error.code() {
            git2::ErrorCode::User => OpsError::Canceled,
            git2::ErrorCode::Auth => OpsError::Authentication(error.message().to_string()),
            _ => match classify_git_error(&error) {
                ErrorKind::Transport => OpsError::Transport(error.message().to_string()),
                _ => OpsError::Git(error),
            },
        }
    }
}

fn classify_git_error(error: &git2::Error) -> ErrorKind {
    if error.code() == git2::ErrorCode::Auth {
        return ErrorKind::Authentication;
    }
    match error.class() {
        git2::ErrorClass::Net
        | git2::ErrorClass::Http
        | git2::ErrorClass::Ssh
        | git2::ErrorClass::Ssl => ErrorKind::Transport,
        _ => ErrorKind::Unexpected,
    }
}

/// Serializable error response for the UI layer
#[derive(Serialize, Debug)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
    pub details: Option<String>,
}

impl From<&OpsError> for ErrorResponse {
    fn from(error: &OpsError) -> Self {
        let details = match error {
            OpsError::Git(e) => Some(format!("{:?}/{:?}", e.class(), e.code())),
            _ => None,
        };

        ErrorResponse {
            code: error.code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}

impl serde::Serialize for OpsError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        ErrorResponse::from(self).serialize(serializer)
    }
}

/// Result type alias for operation code
pub type Result<T> = std::result::Result<T, OpsError>;
