//! git2-backed mutation gateway

use std::cell::{Cell, RefCell};
use std::path::Path;

use git2::{
    Cred, CredentialType, ErrorClass, ErrorCode, FetchOptions, PushOptions, RemoteCallbacks,
    StashApplyOptions, StashApplyProgress,
};

use crate::error::{OpsError, PreconditionFailure, Result};
use crate::models::{
    CredentialRequest, ProgressSample, Remote, RemoteSettings, Signature, Stash, Tag,
    TagRequest, TrackingBranch,
};
use crate::services::config::OpsConfig;
use crate::services::gateway::{
    FetchRequest, MutationGateway, PullRequest, PushRequest, StashSaveRequest,
    TransferCallbacks,
};

/// Number of stages reported while applying a stash
const STASH_STAGES: u32 = 6;

/// Authentication strategies tried before falling back to the prompt
#[derive(Debug, Clone, Copy)]
pub struct GatewayOptions {
    pub try_ssh_agent: bool,
    pub use_credential_helper: bool,
}

impl Default for GatewayOptions {
    fn default() -> Self {
        Self {
            try_ssh_agent: true,
            use_credential_helper: true,
        }
    }
}

impl From<&OpsConfig> for GatewayOptions {
    fn from(config: &OpsConfig) -> Self {
        Self {
            try_ssh_agent: config.try_ssh_agent,
            use_credential_helper: config.use_credential_helper,
        }
    }
}

/// Mutation gateway over libgit2
#[derive(Debug, Clone, Default)]
pub struct Git2Gateway {
    options: GatewayOptions,
}

impl Git2Gateway {
    pub fn new(options: GatewayOptions) -> Self {
        Self { options }
    }

    fn open(path: &Path) -> Result<git2::Repository> {
        git2::Repository::open(path)
            .map_err(|_| OpsError::RepositoryNotFound(path.display().to_string()))
    }

    /// Remote callbacks with credential, progress and stop support.
    /// `stop` is set once the progress callback has asked to abort.
    fn remote_callbacks<'a>(
        &self,
        callbacks: TransferCallbacks<'a>,
        stop: &'a Cell<bool>,
    ) -> RemoteCallbacks<'a> {
        let options = self.options;
        let mut tried_ssh_agent = false;
        let mut tried_helper = false;

        let mut remote_callbacks = RemoteCallbacks::new();

        remote_callbacks.credentials(move |url, username_from_url, allowed_types| {
            tracing::debug!(
                "Credential callback: url={}, username={:?}, allowed={:?}",
                url,
                username_from_url,
                allowed_types
            );

            if stop.get() {
                return Err(abort_error());
            }

            if allowed_types.contains(CredentialType::SSH_KEY)
                && options.try_ssh_agent
                && !tried_ssh_agent
            {
                tried_ssh_agent = true;
                let username = username_from_url.unwrap_or("git");
                tracing::debug!("Trying SSH agent for user: {}", username);
                if let Ok(cred) = Cred::ssh_key_from_agent(username) {
                    return Ok(cred);
                }
            }

            if allowed_types.contains(CredentialType::USER_PASS_PLAINTEXT) {
                if options.use_credential_helper && !tried_helper {
                    tried_helper = true;
                    if let Ok(config) = git2::Config::open_default() {
                        if let Ok(cred) = Cred::credential_helper(&config, url, username_from_url)
                        {
                            tracing::debug!("Using credential helper for: {}", url);
                            return Ok(cred);
                        }
                    }
                }

                let request = CredentialRequest::new(url, username_from_url);
                return match callbacks.credentials_for(&request) {
                    Some(credential) => {
                        Cred::userpass_plaintext(&credential.username, &credential.secret)
                    }
                    None => Err(git2::Error::new(
                        ErrorCode::Auth,
                        ErrorClass::Callback,
                        "credentials not provided",
                    )),
                };
            }

            if allowed_types.contains(CredentialType::USERNAME) {
                return Cred::username(username_from_url.unwrap_or("git"));
            }

            if allowed_types.contains(CredentialType::DEFAULT) {
                tracing::debug!("Trying default credentials");
                return Cred::default();
            }

            Err(git2::Error::new(
                ErrorCode::Auth,
                ErrorClass::Callback,
                "no supported authentication method",
            ))
        });

        remote_callbacks.transfer_progress(move |stats| {
            let sample = ProgressSample::new(
                stats.received_objects() as u32,
                stats.total_objects() as u32,
                stats.received_bytes() as u64,
            );
            let halt = callbacks.report(sample);
            if halt {
                stop.set(true);
            }
            !halt
        });

        remote_callbacks.sideband_progress(move |data| {
            if let Ok(msg) = std::str::from_utf8(data) {
                let msg = msg.trim();
                if !msg.is_empty() {
                    tracing::info!("Remote: {}", msg);
                }
            }
            !stop.get()
        });

        // libgit2 can't interrupt the pack upload once negotiated, so a stop
        // request here is only honoured at the next abortable checkpoint
        remote_callbacks.push_transfer_progress(move |current, total, bytes| {
            let sample = ProgressSample::new(current as u32, total as u32, bytes as u64);
            if callbacks.report(sample) {
                tracing::debug!("Stop requested during pack upload, finishing push");
            }
        });

        remote_callbacks
    }

    fn fetch_remote(
        &self,
        repo: &git2::Repository,
        remote_name: &str,
        prune: bool,
        callbacks: TransferCallbacks<'_>,
        stop: &Cell<bool>,
    ) -> Result<()> {
        let mut remote = repo.find_remote(remote_name).map_err(|_| {
            OpsError::Precondition(PreconditionFailure::RemoteNotFound(remote_name.to_string()))
        })?;

        if callbacks.report(ProgressSample::default()) {
            stop.set(true);
            return Err(OpsError::Canceled);
        }

        let mut fetch_opts = FetchOptions::new();
        fetch_opts.remote_callbacks(self.remote_callbacks(callbacks, stop));
        if prune {
            fetch_opts.prune(git2::FetchPrune::On);
        }

        let refspecs: Vec<String> = remote
            .fetch_refspecs()?
            .iter()
            .filter_map(|s| s.map(|s| s.to_string()))
            .collect();
        let refspec_strs: Vec<&str> = refspecs.iter().map(|s| s.as_str()).collect();

        tracing::debug!("Fetching {} ({} refspecs)", remote_name, refspec_strs.len());
        remote
            .fetch(&refspec_strs, Some(&mut fetch_opts), None)
            .map_err(|e| transfer_error(e, stop))
    }

    fn merge_upstream(
        &self,
        repo: &git2::Repository,
        tracking: &TrackingBranch,
        rebase: bool,
    ) -> Result<()> {
        let fetch_head = repo.find_reference(&tracking.upstream_ref)?;
        let fetch_commit = repo.reference_to_annotated_commit(&fetch_head)?;

        let (analysis, _preference) = repo.merge_analysis(&[&fetch_commit])?;

        if analysis.is_up_to_date() {
            tracing::debug!("{} is up to date", tracking.local_branch);
        } else if analysis.is_fast_forward() {
            // Update the work tree while HEAD still names the old commit, so
            // a safe checkout can tell local edits from the incoming change
            let target = repo.find_object(fetch_commit.id(), None)?;
            repo.checkout_tree(&target, Some(git2::build::CheckoutBuilder::default().safe()))?;

            let refname = format!("refs/heads/{}", tracking.local_branch);
            let mut reference = repo.find_reference(&refname)?;
            reference.set_target(fetch_commit.id(), "pull: Fast-forward")?;
            repo.set_head(&refname)?;
        } else if rebase {
            let head = repo.head()?;
            let head_commit = repo.reference_to_annotated_commit(&head)?;
            let signature = repo.signature()?;

            let mut rebase = repo.rebase(Some(&head_commit), Some(&fetch_commit), None, None)?;
            while let Some(op) = rebase.next() {
                op?;
                if repo.index()?.has_conflicts() {
                    rebase.abort()?;
                    return Err(OpsError::MergeConflict);
                }
                rebase.commit(None, &signature, None)?;
            }
            rebase.finish(Some(&signature))?;
        } else {
            repo.merge(&[&fetch_commit], None, None)?;

            if repo.index()?.has_conflicts() {
                return Err(OpsError::MergeConflict);
            }

            let signature = repo.signature()?;
            let head = repo.head()?.peel_to_commit()?;
            let remote_commit = repo.find_commit(fetch_commit.id())?;
            let tree_oid = repo.index()?.write_tree()?;
            let tree = repo.find_tree(tree_oid)?;
            let upstream_name = tracking
                .upstream_ref
                .strip_prefix("refs/remotes/")
                .unwrap_or(&tracking.upstream_ref);

            repo.commit(
                Some("HEAD"),
                &signature,
                &signature,
                &format!("Merge {} into {}", upstream_name, tracking.local_branch),
                &tree,
                &[&head, &remote_commit],
            )?;

            repo.cleanup_state()?;
        }

        Ok(())
    }
}

impl MutationGateway for Git2Gateway {
    fn current_branch(&self, repo: &Path) -> Result<Option<String>> {
        let repo = Self::open(repo)?;

        if repo.head_detached().unwrap_or(false) {
            return Ok(None);
        }

        let head = match repo.head() {
            Ok(head) => head,
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };

        if !head.is_branch() {
            return Ok(None);
        }

        Ok(head.shorthand().map(|s| s.to_string()))
    }

    fn tracking_branch(&self, repo: &Path, branch: &str) -> Result<Option<TrackingBranch>> {
        let repo = Self::open(repo)?;

        let local_branch = match repo.find_branch(branch, git2::BranchType::Local) {
            Ok(b) => b,
            Err(e) if e.code() == ErrorCode::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let upstream = match local_branch.upstream() {
            Ok(upstream) => upstream,
            Err(_) => return Ok(None),
        };

        let upstream_ref = match upstream.get().name() {
            Some(name) => name.to_string(),
            None => return Ok(None),
        };

        let local_ref = format!("refs/heads/{}", branch);
        let remote = repo
            .branch_upstream_remote(&local_ref)
            .ok()
            .and_then(|buf| buf.as_str().map(|s| s.to_string()));

        let merge = repo
            .config()?
            .get_string(&format!("branch.{}.merge", branch))
            .ok();
        let remote_branch = match merge.as_deref().and_then(|m| m.strip_prefix("refs/heads/")) {
            Some(name) => name.to_string(),
            None => {
                let shorthand = upstream.get().shorthand().unwrap_or(branch);
                match &remote {
                    Some(r) => shorthand
                        .strip_prefix(&format!("{}/", r))
                        .unwrap_or(shorthand)
                        .to_string(),
                    None => shorthand.to_string(),
                }
            }
        };

        Ok(Some(TrackingBranch {
            local_branch: branch.to_string(),
            remote,
            remote_branch,
            upstream_ref,
        }))
    }

    fn remote(&self, repo: &Path, name: &str) -> Result<Option<Remote>> {
        let repo = Self::open(repo)?;

        let remote = match repo.find_remote(name) {
            Ok(remote) => remote,
            Err(e) if matches!(e.code(), ErrorCode::NotFound | ErrorCode::InvalidSpec) => {
                return Ok(None)
            }
            Err(e) => return Err(e.into()),
        };

        Ok(Some(Remote {
            name: name.to_string(),
            url: remote.url().unwrap_or("").to_string(),
            push_url: remote.pushurl().map(|s| s.to_string()),
        }))
    }

    fn stashes(&self, repo: &Path) -> Result<Vec<Stash>> {
        let mut repo = Self::open(repo)?;
        let mut stashes = Vec::new();

        repo.stash_foreach(|index, message, oid| {
            stashes.push(Stash {
                index,
                message: message.to_string(),
                oid: oid.to_string(),
            });
            true
        })?;

        Ok(stashes)
    }

    fn fetch(
        &self,
        repo: &Path,
        request: &FetchRequest,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        let repo = Self::open(repo)?;
        let stop = Cell::new(false);
        self.fetch_remote(&repo, &request.remote, request.prune, callbacks, &stop)
    }

    fn pull(
        &self,
        repo: &Path,
        request: &PullRequest,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        let repo = Self::open(repo)?;
        let stop = Cell::new(false);

        self.fetch_remote(&repo, &request.remote, false, callbacks, &stop)?;

        if stop.get() {
            return Err(OpsError::Canceled);
        }

        self.merge_upstream(&repo, &request.tracking, request.rebase)
    }

    fn push(
        &self,
        repo: &Path,
        request: &PushRequest,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        let repo = Self::open(repo)?;
        let mut remote = repo.find_remote(&request.remote).map_err(|_| {
            OpsError::Precondition(PreconditionFailure::RemoteNotFound(request.remote.clone()))
        })?;

        let stop = Cell::new(false);
        let rejected: RefCell<Option<String>> = RefCell::new(None);

        let mut remote_callbacks = self.remote_callbacks(callbacks, &stop);
        remote_callbacks.push_negotiation(|_updates| {
            if stop.get() || callbacks.report(ProgressSample::default()) {
                stop.set(true);
                return Err(abort_error());
            }
            Ok(())
        });
        remote_callbacks.push_update_reference(|refname, status| {
            if let Some(status) = status {
                tracing::warn!("Remote rejected {}: {}", refname, status);
                *rejected.borrow_mut() = Some(format!("{}: {}", refname, status));
            }
            Ok(())
        });

        let mut push_opts = PushOptions::new();
        push_opts.remote_callbacks(remote_callbacks);

        let refspec = format!(
            "refs/heads/{}:refs/heads/{}",
            request.local_branch, request.remote_branch
        );

        tracing::debug!("Pushing {} to {}", refspec, request.remote);
        remote
            .push(&[refspec.as_str()], Some(&mut push_opts))
            .map_err(|e| transfer_error(e, &stop))?;

        if let Some(reason) = rejected.take() {
            return Err(OpsError::PushRejected(reason));
        }

        Ok(())
    }

    fn save_stash(
        &self,
        repo: &Path,
        request: &StashSaveRequest,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        let mut repo = Self::open(repo)?;
        if callbacks.report(ProgressSample::new(0, 1, 0)) {
            return Err(OpsError::Canceled);
        }

        let signature = repo.signature()?;
        let mut flags = git2::StashFlags::DEFAULT;
        if request.include_untracked {
            flags |= git2::StashFlags::INCLUDE_UNTRACKED;
        }

        let oid = match repo.stash_save(&signature, &request.message, Some(flags)) {
            Ok(oid) => oid,
            Err(e) if e.code() == ErrorCode::NotFound => {
                return Err(OpsError::Precondition(PreconditionFailure::NothingToStash))
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!("Saved stash {}: {}", oid, request.message);
        callbacks.report(ProgressSample::new(1, 1, 0));
        Ok(())
    }

    fn apply_stash(
        &self,
        repo: &Path,
        index: usize,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        let mut repo = Self::open(repo)?;
        let stop = Cell::new(false);
        let mut opts = stash_apply_options(callbacks, &stop);
        repo.stash_apply(index, Some(&mut opts))
            .map_err(|e| stash_error(e, &stop))
    }

    fn pop_stash(
        &self,
        repo: &Path,
        index: usize,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        let mut repo = Self::open(repo)?;
        let stop = Cell::new(false);
        let mut opts = stash_apply_options(callbacks, &stop);
        repo.stash_pop(index, Some(&mut opts))
            .map_err(|e| stash_error(e, &stop))
    }

    fn drop_stash(
        &self,
        repo: &Path,
        index: usize,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        let mut repo = Self::open(repo)?;
        if callbacks.report(ProgressSample::new(0, 1, 0)) {
            return Err(OpsError::Canceled);
        }
        repo.stash_drop(index)?;
        callbacks.report(ProgressSample::new(1, 1, 0));
        Ok(())
    }

    fn create_tag(&self, repo: &Path, request: &TagRequest) -> Result<Tag> {
        let repo = Self::open(repo)?;

        let target_oid = match request.target {
            Some(ref target_ref) => repo.revparse_single(target_ref)?.id(),
            None => repo.head()?.peel_to_commit()?.id(),
        };
        let target_obj = repo.find_object(target_oid, None)?;

        let (is_annotated, tagger) = match request.message {
            Some(ref msg) => {
                let signature = repo.signature()?;
                repo.tag(&request.name, &target_obj, &signature, msg, false)?;
                (true, Some(Signature::from(signature)))
            }
            None => {
                repo.tag_lightweight(&request.name, &target_obj, false)?;
                (false, None)
            }
        };

        tracing::info!("Created tag {} at {}", request.name, target_oid);

        Ok(Tag {
            name: request.name.clone(),
            target_oid: target_oid.to_string(),
            message: request.message.clone(),
            tagger,
            is_annotated,
        })
    }

    fn update_remote(&self, repo: &Path, settings: &RemoteSettings) -> Result<()> {
        let repo = Self::open(repo)?;

        repo.find_remote(&settings.name).map_err(|_| {
            OpsError::Precondition(PreconditionFailure::RemoteNotFound(settings.name.clone()))
        })?;

        if let Some(ref url) = settings.url {
            repo.remote_set_url(&settings.name, url)?;
        }

        if let Some(ref push_url) = settings.push_url {
            let push_url = if push_url.is_empty() {
                None
            } else {
                Some(push_url.as_str())
            };
            repo.remote_set_pushurl(&settings.name, push_url)?;
        }

        Ok(())
    }
}

fn abort_error() -> git2::Error {
    git2::Error::new(ErrorCode::User, ErrorClass::Callback, "operation canceled")
}

fn transfer_error(error: git2::Error, stop: &Cell<bool>) -> OpsError {
    if stop.get() {
        OpsError::Canceled
    } else {
        OpsError::from_git(error)
    }
}

fn stash_error(error: git2::Error, stop: &Cell<bool>) -> OpsError {
    if stop.get() {
        return OpsError::Canceled;
    }
    match error.code() {
        ErrorCode::Conflict | ErrorCode::MergeConflict => OpsError::MergeConflict,
        _ => OpsError::from_git(error),
    }
}

fn stash_stage(progress: StashApplyProgress) -> u32 {
    match progress {
        StashApplyProgress::LoadingStash => 1,
        StashApplyProgress::AnalyzeIndex => 2,
        StashApplyProgress::AnalyzeModified => 3,
        StashApplyProgress::AnalyzeUntracked => 4,
        StashApplyProgress::CheckoutUntracked | StashApplyProgress::CheckoutModified => 5,
        StashApplyProgress::Done => STASH_STAGES,
        _ => 0,
    }
}

fn stash_apply_options<'a>(
    callbacks: TransferCallbacks<'a>,
    stop: &'a Cell<bool>,
) -> StashApplyOptions<'a> {
    let mut opts = StashApplyOptions::new();
    opts.progress_cb(move |progress| {
        let halt = callbacks.report(ProgressSample::new(stash_stage(progress), STASH_STAGES, 0));
        if halt {
            stop.set(true);
        }
        !halt
    });
    opts
}
