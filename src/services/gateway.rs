//! Boundary between operations and the git engine

use std::path::Path;

use crate::error::Result;
use crate::models::{
    Credential, CredentialRequest, ProgressSample, Remote, RemoteSettings, Stash, Tag,
    TagRequest, TrackingBranch,
};

/// Progress callback. Returning `true` asks the engine to stop at its next
/// safe checkpoint.
pub type ProgressFn<'a> = &'a dyn Fn(ProgressSample) -> bool;

/// Credential callback. `None` means the user declined to provide any.
pub type CredentialsFn<'a> = &'a dyn Fn(&CredentialRequest) -> Option<Credential>;

/// Callbacks wired into a mutating gateway call
#[derive(Clone, Copy)]
pub struct TransferCallbacks<'a> {
    pub progress: ProgressFn<'a>,
    pub credentials: Option<CredentialsFn<'a>>,
}

impl<'a> TransferCallbacks<'a> {
    pub fn new(progress: ProgressFn<'a>) -> Self {
        Self {
            progress,
            credentials: None,
        }
    }

    pub fn with_credentials(mut self, credentials: CredentialsFn<'a>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Report progress; true means stop
    pub fn report(&self, sample: ProgressSample) -> bool {
        (self.progress)(sample)
    }

    /// Ask for credentials; `None` when not gated or declined
    pub fn credentials_for(&self, request: &CredentialRequest) -> Option<Credential> {
        self.credentials.and_then(|f| f(request))
    }
}

/// What to fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub remote: String,
    pub prune: bool,
}

/// What to pull
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PullRequest {
    pub tracking: TrackingBranch,
    pub remote: String,
    pub rebase: bool,
}

/// What to stash
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StashSaveRequest {
    pub message: String,
    pub include_untracked: bool,
}

/// What to push
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushRequest {
    pub local_branch: String,
    pub remote: String,
    pub remote_branch: String,
}

/// Narrow interface over the git engine.
///
/// Mutating calls are synchronous and run on a background thread; they must
/// call the progress callback periodically and abort, leaving the repository
/// consistent, once it returns `true`. The query methods are cheap local
/// reads used for precondition checks.
pub trait MutationGateway: Send + Sync {
    /// Name of the checked out branch, `None` when HEAD is detached or unborn
    fn current_branch(&self, repo: &Path) -> Result<Option<String>>;

    /// Upstream of a local branch, `None` if it has none
    fn tracking_branch(&self, repo: &Path, branch: &str) -> Result<Option<TrackingBranch>>;

    /// Look up a remote by name
    fn remote(&self, repo: &Path, name: &str) -> Result<Option<Remote>>;

    /// Stash entries, most recent first
    fn stashes(&self, repo: &Path) -> Result<Vec<Stash>>;

    fn fetch(&self, repo: &Path, request: &FetchRequest, callbacks: TransferCallbacks<'_>)
        -> Result<()>;

    fn pull(&self, repo: &Path, request: &PullRequest, callbacks: TransferCallbacks<'_>)
        -> Result<()>;

    fn push(&self, repo: &Path, request: &PushRequest, callbacks: TransferCallbacks<'_>)
        -> Result<()>;

    fn save_stash(
        &self,
        repo: &Path,
        request: &StashSaveRequest,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()>;

    fn apply_stash(&self, repo: &Path, index: usize, callbacks: TransferCallbacks<'_>)
        -> Result<()>;

    fn pop_stash(&self, repo: &Path, index: usize, callbacks: TransferCallbacks<'_>)
        -> Result<()>;

    fn drop_stash(&self, repo: &Path, index: usize, callbacks: TransferCallbacks<'_>)
        -> Result<()>;

    fn create_tag(&self, repo: &Path, request: &TagRequest) -> Result<Tag>;

    fn update_remote(&self, repo: &Path, settings: &RemoteSettings) -> Result<()>;
}
