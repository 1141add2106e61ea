//! Concrete operation kinds
//!
//! Each kind checks its preconditions up front and hands the engine a
//! [`Mutation`] describing the confirmation to ask for and the single
//! gateway call to make.

pub mod fetch;
pub mod pull;
pub mod push;
pub mod remote;
pub mod stash;
pub mod tag;

use std::path::Path;
use std::sync::Arc;

use crate::error::{OpsError, PreconditionFailure, Result};
use crate::models::{ConfirmationRequest, OperationKind, Remote, TrackingBranch};
use crate::services::config::OpsConfig;
use crate::services::gateway::{MutationGateway, TransferCallbacks};

/// A prepared mutation whose preconditions have been checked
pub trait Mutation: Send + Sync {
    /// Dialog to show before touching the repository
    fn confirmation(&self) -> Option<ConfirmationRequest> {
        None
    }

    /// Remote URL the mutation talks to, used to scope credentials
    fn remote_url(&self) -> Option<&str> {
        None
    }

    /// Whether the gateway may ask for credentials
    fn credential_gated(&self) -> bool {
        false
    }

    /// Whether success should emit a refs-changed notification
    fn changes_refs(&self) -> bool {
        true
    }

    /// Runs on the calling thread with no progress phase
    fn is_immediate(&self) -> bool {
        false
    }

    fn execute(
        &self,
        gateway: &dyn MutationGateway,
        repo: &Path,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()>;
}

/// Check preconditions for `kind` and build its mutation
pub fn prepare(
    kind: &OperationKind,
    gateway: &dyn MutationGateway,
    repo: &Path,
    config: &OpsConfig,
) -> Result<Arc<dyn Mutation>> {
    let mutation: Arc<dyn Mutation> = match kind {
        OperationKind::Fetch { remote } => Arc::new(fetch::prepare(
            gateway,
            repo,
            remote.as_deref(),
            config,
        )?),
        OperationKind::Pull { rebase } => Arc::new(pull::prepare(gateway, repo, *rebase)?),
        OperationKind::Push => Arc::new(push::prepare(gateway, repo)?),
        OperationKind::StashSave {
            message,
            include_untracked,
        } => Arc::new(stash::prepare_save(message.as_deref(), *include_untracked)),
        OperationKind::StashApply => {
            Arc::new(stash::prepare(gateway, repo, stash::StashAction::Apply)?)
        }
        OperationKind::StashPop => Arc::new(stash::prepare(gateway, repo, stash::StashAction::Pop)?),
        OperationKind::StashDrop => {
            Arc::new(stash::prepare(gateway, repo, stash::StashAction::Drop)?)
        }
        OperationKind::NewTag(request) => Arc::new(tag::prepare(request)?),
        OperationKind::RemoteSettings(settings) => {
            Arc::new(remote::prepare(gateway, repo, settings)?)
        }
    };
    Ok(mutation)
}

/// Whether a failure of `kind` should be shown to the user
pub fn should_report(kind: &OperationKind, error: &OpsError) -> bool {
    match kind {
        OperationKind::Push => push::should_report(error),
        _ => !error.is_user_cancellation(),
    }
}

/// Current branch, its upstream, and the upstream's remote
pub(crate) fn resolve_upstream(
    gateway: &dyn MutationGateway,
    repo: &Path,
) -> Result<(TrackingBranch, Remote)> {
    let branch = match gateway.current_branch(repo)? {
        Some(branch) => branch,
        None => {
            tracing::warn!("Can't get current branch");
            return Err(OpsError::Precondition(PreconditionFailure::DetachedHead));
        }
    };

    let no_upstream = || {
        tracing::warn!("No tracking branch for {}", branch);
        OpsError::Precondition(PreconditionFailure::NoUpstream)
    };

    let tracking = gateway
        .tracking_branch(repo, &branch)?
        .ok_or_else(no_upstream)?;
    let remote_name = tracking.remote.clone().ok_or_else(no_upstream)?;
    let remote = gateway
        .remote(repo, &remote_name)?
        .ok_or_else(no_upstream)?;

    Ok((tracking, remote))
}
