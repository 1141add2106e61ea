//! Push operation

use std::path::Path;

use crate::error::{OpsError, Result};
use crate::models::{ConfirmationRequest, Remote, TrackingBranch};
use crate::operations::{resolve_upstream, Mutation};
use crate::services::gateway::{MutationGateway, PushRequest, TransferCallbacks};

pub struct PushMutation {
    tracking: TrackingBranch,
    remote: Remote,
}

/// The current branch must exist and track a branch on a known remote
pub fn prepare(gateway: &dyn MutationGateway, repo: &Path) -> Result<PushMutation> {
    let (tracking, remote) = resolve_upstream(gateway, repo)?;
    Ok(PushMutation { tracking, remote })
}

/// Push also treats a bare callback failure as the user backing out of a
/// credential helper, on top of the usual cancellation rules.
pub fn should_report(error: &OpsError) -> bool {
    if error.is_user_cancellation() {
        return false;
    }
    match error {
        OpsError::Git(e) => !(e.class() == git2::ErrorClass::Callback
            && e.code() == git2::ErrorCode::GenericError),
        _ => true,
    }
}

impl Mutation for PushMutation {
    fn confirmation(&self) -> Option<ConfirmationRequest> {
        Some(ConfirmationRequest {
            message: format!(
                "Push local branch \"{}\" to remote \"{}\"?",
                self.tracking.local_branch, self.remote.name
            ),
            info: None,
            action_name: "Push".to_string(),
        })
    }

    fn remote_url(&self) -> Option<&str> {
        Some(self.remote.effective_push_url())
    }

    fn credential_gated(&self) -> bool {
        true
    }

    fn execute(
        &self,
        gateway: &dyn MutationGateway,
        repo: &Path,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        let request = PushRequest {
            local_branch: self.tracking.local_branch.clone(),
            remote: self.remote.name.clone(),
            remote_branch: self.tracking.remote_branch.clone(),
        };
        gateway.push(repo, &request, callbacks)
    }
}
