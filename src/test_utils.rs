//! Test utilities: temporary git repositories and scripted collaborators

#![cfg(test)]

use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;

use crate::error::{OpsError, Result};
use crate::models::{
    ConfirmationRequest, Credential, CredentialRequest, Notice, OperationReport, ProgressEvent,
    ProgressSample, Remote, RemoteSettings, Stash, Tag, TagRequest, TrackingBranch,
};
use crate::services::credentials_service::CredentialPrompt;
use crate::services::gateway::{
    FetchRequest, MutationGateway, PullRequest, PushRequest, StashSaveRequest,
    TransferCallbacks,
};
use crate::services::notifications::{OperationEvent, ResultSink};
use crate::services::operation::ConfirmationDialog;

/// A temporary git repository for testing
pub struct TestRepo {
    pub dir: TempDir,
    pub path: PathBuf,
}

impl TestRepo {
    /// Create a new empty git repository
    pub fn new() -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().to_path_buf();

        let repo = git2::Repository::init(&path).expect("Failed to init repo");

        let mut config = repo.config().expect("Failed to get config");
        config
            .set_str("user.name", "Test User")
            .expect("Failed to set user.name");
        config
            .set_str("user.email", "test@example.com")
            .expect("Failed to set user.email");

        Self { dir, path }
    }

    /// Create a repository with an initial commit
    pub fn with_initial_commit() -> Self {
        let test_repo = Self::new();
        test_repo.create_commit("Initial commit", &[("README.md", "# Test Repo")]);
        test_repo
    }

    /// Get the git2 repository
    pub fn repo(&self) -> git2::Repository {
        git2::Repository::open(&self.path).expect("Failed to open repo")
    }

    /// Create a file with content
    pub fn create_file(&self, name: &str, content: &str) {
        let file_path = self.path.join(name);
        if let Some(parent) = file_path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent dirs");
        }
        std::fs::write(&file_path, content).expect("Failed to write file");
    }

    /// Stage a file
    pub fn stage_file(&self, name: &str) {
        let repo = self.repo();
        let mut index = repo.index().expect("Failed to get index");
        index.add_path(Path::new(name)).expect("Failed to stage file");
        index.write().expect("Failed to write index");
    }

    /// Create a commit with the given files
    pub fn create_commit(&self, message: &str, files: &[(&str, &str)]) -> git2::Oid {
        let repo = self.repo();

        for (name, content) in files {
            self.create_file(name, content);
            self.stage_file(name);
        }

        let mut index = repo.index().expect("Failed to get index");
        let tree_oid = index.write_tree().expect("Failed to write tree");
        let tree = repo.find_tree(tree_oid).expect("Failed to find tree");
        let sig = repo.signature().expect("Failed to get signature");

        let parent = repo.head().ok().and_then(|h| h.peel_to_commit().ok());
        let parents: Vec<&git2::Commit> = parent.as_ref().into_iter().collect();

        repo.commit(Some("HEAD"), &sig, &sig, message, &tree, &parents)
            .expect("Failed to create commit")
    }

    /// Create a branch at the current HEAD
    pub fn create_branch(&self, name: &str) -> git2::Oid {
        let repo = self.repo();
        let head = repo.head().expect("Failed to get HEAD");
        let commit = head.peel_to_commit().expect("Failed to get commit");
        repo.branch(name, &commit, false)
            .expect("Failed to create branch");
        commit.id()
    }

    /// Checkout a branch
    pub fn checkout_branch(&self, name: &str) {
        let repo = self.repo();
        let branch = repo
            .find_branch(name, git2::BranchType::Local)
            .expect("Failed to find branch");
        let obj = branch
            .get()
            .peel(git2::ObjectType::Commit)
            .expect("Failed to peel");
        repo.checkout_tree(&obj, None).expect("Failed to checkout");
        repo.set_head(branch.get().name().unwrap())
            .expect("Failed to set HEAD");
    }

    /// Point HEAD directly at the current commit
    pub fn detach_head(&self) {
        let repo = self.repo();
        repo.set_head_detached(self.head_oid())
            .expect("Failed to detach HEAD");
    }

    /// Get the current branch name
    pub fn current_branch(&self) -> String {
        let repo = self.repo();
        let head = repo.head().expect("Failed to get HEAD");
        head.shorthand().unwrap_or("").to_string()
    }

    /// Get the HEAD commit OID
    pub fn head_oid(&self) -> git2::Oid {
        let repo = self.repo();
        let head = repo.head().expect("Failed to get HEAD");
        head.target().expect("Failed to get target")
    }

    /// Add a remote
    pub fn add_remote(&self, name: &str, url: &str) {
        let repo = self.repo();
        repo.remote(name, url).expect("Failed to add remote");
    }

    /// Make `branch` track `remote/remote_branch`, creating the remote
    /// tracking ref at HEAD if needed
    pub fn set_upstream(&self, branch: &str, remote: &str, remote_branch: &str) {
        let repo = self.repo();
        let refname = format!("refs/remotes/{}/{}", remote, remote_branch);
        if repo.find_reference(&refname).is_err() {
            repo.reference(&refname, self.head_oid(), false, "test upstream")
                .expect("Failed to create remote ref");
        }
        let mut local = repo
            .find_branch(branch, git2::BranchType::Local)
            .expect("Failed to find branch");
        local
            .set_upstream(Some(&format!("{}/{}", remote, remote_branch)))
            .expect("Failed to set upstream");
    }

    /// Clone `upstream` into a new temporary directory. The clone's
    /// `origin` points at `upstream` and its branch tracks `origin`.
    pub fn clone_from(upstream: &TestRepo) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let path = dir.path().join("clone");

        let url = upstream.path.to_str().expect("Non-UTF-8 temp path");
        let repo = git2::Repository::clone(url, &path).expect("Failed to clone");

        let mut config = repo.config().expect("Failed to get config");
        config
            .set_str("user.name", "Test User")
            .expect("Failed to set user.name");
        config
            .set_str("user.email", "test@example.com")
            .expect("Failed to set user.email");

        Self { dir, path }
    }

    /// Read a file from the working tree
    pub fn read_file(&self, name: &str) -> String {
        std::fs::read_to_string(self.path.join(name)).expect("Failed to read file")
    }

    /// True when the index and working tree match HEAD
    pub fn is_clean(&self) -> bool {
        let repo = self.repo();
        let mut options = git2::StatusOptions::new();
        options.include_untracked(true);
        let statuses = repo.statuses(Some(&mut options)).expect("Failed to get status");
        statuses.is_empty()
    }

    /// Stash the working tree changes
    pub fn stash(&self, message: &str) -> git2::Oid {
        let mut repo = self.repo();
        let sig = repo.signature().expect("Failed to get signature");
        repo.stash_save(&sig, message, None)
            .expect("Failed to stash")
    }
}

impl Default for TestRepo {
    fn default() -> Self {
        Self::new()
    }
}

type FailureFn = Box<dyn Fn() -> OpsError + Send + Sync>;

/// Scripted [`MutationGateway`] that records every call
#[derive(Default)]
pub struct MockGateway {
    branch: Option<String>,
    remotes: HashMap<String, Remote>,
    upstreams: HashMap<String, TrackingBranch>,
    stashes: Vec<Stash>,
    progress_steps: u32,
    require_credentials: bool,
    hold_until_cancel: bool,
    ignore_stop: bool,
    failure: Option<FailureFn>,
    calls: Mutex<Vec<String>>,
}

impl MockGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_branch(mut self, name: &str) -> Self {
        self.branch = Some(name.to_string());
        self
    }

    pub fn with_remote(self, name: &str, url: &str) -> Self {
        self.with_remote_push_url(name, url, "")
    }

    pub fn with_remote_push_url(mut self, name: &str, url: &str, push_url: &str) -> Self {
        self.remotes.insert(
            name.to_string(),
            Remote {
                name: name.to_string(),
                url: url.to_string(),
                push_url: (!push_url.is_empty()).then(|| push_url.to_string()),
            },
        );
        self
    }

    pub fn with_upstream(mut self, branch: &str, remote: &str, remote_branch: &str) -> Self {
        self.upstreams.insert(
            branch.to_string(),
            TrackingBranch {
                local_branch: branch.to_string(),
                remote: Some(remote.to_string()),
                remote_branch: remote_branch.to_string(),
                upstream_ref: format!("refs/remotes/{}/{}", remote, remote_branch),
            },
        );
        self
    }

    /// Push a stash; the latest one added becomes index 0
    pub fn with_stash(mut self, message: &str) -> Self {
        self.stashes.insert(
            0,
            Stash {
                index: 0,
                message: message.to_string(),
                oid: format!("{:040x}", self.stashes.len() + 1),
            },
        );
        for (index, stash) in self.stashes.iter_mut().enumerate() {
            stash.index = index;
        }
        self
    }

    /// Report this many progress samples during transfers
    pub fn with_progress_steps(mut self, steps: u32) -> Self {
        self.progress_steps = steps;
        self
    }

    /// Ask for credentials before transferring
    pub fn require_credentials(mut self) -> Self {
        self.require_credentials = true;
        self
    }

    /// Keep reporting progress until told to stop
    pub fn hold_until_cancel(mut self) -> Self {
        self.hold_until_cancel = true;
        self
    }

    /// Keep going when a progress report asks to stop, as a gateway past
    /// its last abortable point does
    pub fn finish_despite_stop(mut self) -> Self {
        self.ignore_stop = true;
        self
    }

    /// Fail every mutating call with the error built by `failure`
    pub fn fail_with(mut self, failure: impl Fn() -> OpsError + Send + Sync + 'static) -> Self {
        self.failure = Some(Box::new(failure));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn transfer(&self, url: &str, callbacks: TransferCallbacks<'_>) -> Result<()> {
        if self.require_credentials
            && callbacks
                .credentials_for(&CredentialRequest::new(url, None))
                .is_none()
        {
            return Err(OpsError::Authentication(
                "credentials not provided".to_string(),
            ));
        }

        let total = self.progress_steps;
        for step in 1..=total {
            let stop = callbacks.report(ProgressSample::new(step, total, step as u64 * 1024));
            if stop && !self.ignore_stop {
                return Err(OpsError::Canceled);
            }
        }

        if self.hold_until_cancel {
            while !callbacks.report(ProgressSample::default()) {
                std::thread::sleep(Duration::from_millis(5));
            }
            return Err(OpsError::Canceled);
        }

        match &self.failure {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }

    fn remote_url(&self, name: &str, push: bool) -> String {
        self.remotes
            .get(name)
            .map(|r| {
                if push {
                    r.effective_push_url().to_string()
                } else {
                    r.url.clone()
                }
            })
            .unwrap_or_default()
    }
}

impl MutationGateway for MockGateway {
    fn current_branch(&self, _repo: &Path) -> Result<Option<String>> {
        self.record("current_branch");
        Ok(self.branch.clone())
    }

    fn tracking_branch(&self, _repo: &Path, branch: &str) -> Result<Option<TrackingBranch>> {
        self.record("tracking_branch");
        Ok(self.upstreams.get(branch).cloned())
    }

    fn remote(&self, _repo: &Path, name: &str) -> Result<Option<Remote>> {
        self.record("remote");
        Ok(self.remotes.get(name).cloned())
    }

    fn stashes(&self, _repo: &Path) -> Result<Vec<Stash>> {
        self.record("stashes");
        Ok(self.stashes.clone())
    }

    fn fetch(
        &self,
        _repo: &Path,
        request: &FetchRequest,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        self.record(format!("fetch:{}", request.remote));
        self.transfer(&self.remote_url(&request.remote, false), callbacks)
    }

    fn pull(
        &self,
        _repo: &Path,
        request: &PullRequest,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        self.record(format!("pull:{}", request.remote));
        self.transfer(&self.remote_url(&request.remote, false), callbacks)
    }

    fn push(
        &self,
        _repo: &Path,
        request: &PushRequest,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        self.record(format!("push:{}", request.remote));
        self.transfer(&self.remote_url(&request.remote, true), callbacks)
    }

    fn save_stash(
        &self,
        _repo: &Path,
        request: &StashSaveRequest,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        self.record(format!("save_stash:{}", request.message));
        self.transfer("", callbacks)
    }

    fn apply_stash(
        &self,
        _repo: &Path,
        index: usize,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        self.record(format!("apply_stash:{}", index));
        self.transfer("", callbacks)
    }

    fn pop_stash(&self, _repo: &Path, index: usize, callbacks: TransferCallbacks<'_>) -> Result<()> {
        self.record(format!("pop_stash:{}", index));
        self.transfer("", callbacks)
    }

    fn drop_stash(
        &self,
        _repo: &Path,
        index: usize,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        self.record(format!("drop_stash:{}", index));
        self.transfer("", callbacks)
    }

    fn create_tag(&self, _repo: &Path, request: &TagRequest) -> Result<Tag> {
        self.record(format!("create_tag:{}", request.name));
        if let Some(failure) = &self.failure {
            return Err(failure());
        }
        Ok(Tag {
            name: request.name.clone(),
            target_oid: "0".repeat(40),
            message: request.message.clone(),
            tagger: None,
            is_annotated: request.message.is_some(),
        })
    }

    fn update_remote(&self, _repo: &Path, settings: &RemoteSettings) -> Result<()> {
        self.record(format!("update_remote:{}", settings.name));
        match &self.failure {
            Some(failure) => Err(failure()),
            None => Ok(()),
        }
    }
}

/// Credential prompt answering from a script; `None` once exhausted
pub struct ScriptedPrompt {
    answers: Mutex<VecDeque<Option<Credential>>>,
    requests: Mutex<Vec<CredentialRequest>>,
}

impl ScriptedPrompt {
    pub fn new(answers: Vec<Option<Credential>>) -> Self {
        Self {
            answers: Mutex::new(answers.into()),
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn requests(&self) -> Vec<CredentialRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl CredentialPrompt for ScriptedPrompt {
    async fn prompt(&self, request: CredentialRequest) -> Option<Credential> {
        self.requests.lock().unwrap().push(request);
        self.answers.lock().unwrap().pop_front().flatten()
    }
}

/// Confirmation dialog with a fixed answer
pub struct ScriptedDialog {
    answer: bool,
    requests: Mutex<Vec<ConfirmationRequest>>,
}

impl ScriptedDialog {
    pub fn accept() -> Self {
        Self {
            answer: true,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn decline() -> Self {
        Self {
            answer: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ConfirmationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ConfirmationDialog for ScriptedDialog {
    async fn confirm(&self, request: ConfirmationRequest) -> bool {
        self.requests.lock().unwrap().push(request);
        self.answer
    }
}

/// Sink that keeps every event it receives
#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<OperationEvent>>,
}

impl RecordingSink {
    pub fn events(&self) -> Vec<OperationEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn progress_events(&self) -> Vec<ProgressEvent> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OperationEvent::Progress(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    pub fn reports(&self) -> Vec<OperationReport> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OperationEvent::Finished(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub fn notices(&self) -> Vec<Notice> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                OperationEvent::Notice { notice, .. } => Some(notice),
                _ => None,
            })
            .collect()
    }

    pub fn refs_changed_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, OperationEvent::RefsChanged { .. }))
            .count()
    }
}

impl ResultSink for RecordingSink {
    fn progress(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(OperationEvent::Progress(event));
    }

    fn refs_changed(&self, repository: &Path) {
        self.events.lock().unwrap().push(OperationEvent::RefsChanged {
            repository: repository.to_string_lossy().to_string(),
        });
    }

    fn finished(&self, report: &OperationReport) {
        self.events
            .lock()
            .unwrap()
            .push(OperationEvent::Finished(report.clone()));
    }

    fn notice(&self, repository: &Path, notice: Notice) {
        self.events.lock().unwrap().push(OperationEvent::Notice {
            repository: repository.to_string_lossy().to_string(),
            notice,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_repo() {
        let repo = TestRepo::new();
        assert!(repo.path.exists());
        assert!(repo.path.join(".git").exists());
    }

    #[test]
    fn test_checkout_branch() {
        let repo = TestRepo::with_initial_commit();
        repo.create_branch("feature");
        repo.checkout_branch("feature");
        assert_eq!(repo.current_branch(), "feature");
    }

    #[test]
    fn test_set_upstream() {
        let repo = TestRepo::with_initial_commit();
        repo.add_remote("origin", "https://example.com/a.git");
        let branch = repo.current_branch();
        repo.set_upstream(&branch, "origin", "main");

        let git_repo = repo.repo();
        let local = git_repo
            .find_branch(&branch, git2::BranchType::Local)
            .unwrap();
        assert_eq!(
            local.upstream().unwrap().get().name(),
            Some("refs/remotes/origin/main")
        );
    }

    #[test]
    fn test_mock_stash_order() {
        let gateway = MockGateway::new().with_stash("first").with_stash("second");
        let stashes = gateway.stashes(Path::new("/repo")).unwrap();
        assert_eq!(stashes[0].message, "second");
        assert_eq!(stashes[1].index, 1);
    }
}
