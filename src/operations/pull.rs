//! Pull operation

use std::path::Path;

use crate::error::Result;
use crate::models::{Remote, TrackingBranch};
use crate::operations::{resolve_upstream, Mutation};
use crate::services::gateway::{MutationGateway, PullRequest, TransferCallbacks};

pub struct PullMutation {
    tracking: TrackingBranch,
    remote: Remote,
    rebase: bool,
}

/// Pull needs the same upstream configuration as push
pub fn prepare(gateway: &dyn MutationGateway, repo: &Path, rebase: bool) -> Result<PullMutation> {
    let (tracking, remote) = resolve_upstream(gateway, repo)?;
    Ok(PullMutation {
        tracking,
        remote,
        rebase,
    })
}

impl Mutation for PullMutation {
    fn remote_url(&self) -> Option<&str> {
        Some(&self.remote.url)
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
        let request = PullRequest {
            tracking: self.tracking.clone(),
            remote: self.remote.name.clone(),
            rebase: self.rebase,
        };
        gateway.pull(repo, &request, callbacks)
    }
}
