//! Fetch operation

use std::path::Path;

use crate::error::{OpsError, PreconditionFailure, Result};
use crate::models::Remote;
use crate::operations::Mutation;
use crate::services::config::OpsConfig;
use crate::services::gateway::{FetchRequest, MutationGateway, TransferCallbacks};

pub struct FetchMutation {
    remote: Remote,
    prune: bool,
}

/// Pick the remote to fetch: the requested one, else the current branch's
/// upstream remote, else the configured default.
pub fn prepare(
    gateway: &dyn MutationGateway,
    repo: &Path,
    requested: Option<&str>,
    config: &OpsConfig,
) -> Result<FetchMutation> {
    if let Some(name) = requested {
        let remote = gateway.remote(repo, name)?.ok_or_else(|| {
            OpsError::Precondition(PreconditionFailure::RemoteNotFound(name.to_string()))
        })?;
        return Ok(FetchMutation {
            remote,
            prune: config.prune_on_fetch,
        });
    }

    let upstream_remote = match gateway.current_branch(repo)? {
        Some(branch) => gateway
            .tracking_branch(repo, &branch)?
            .and_then(|tracking| tracking.remote),
        None => None,
    };

    for name in upstream_remote
        .iter()
        .map(|s| s.as_str())
        .chain(std::iter::once(config.default_remote.as_str()))
    {
        if let Some(remote) = gateway.remote(repo, name)? {
            return Ok(FetchMutation {
                remote,
                prune: config.prune_on_fetch,
            });
        }
    }

    Err(OpsError::Precondition(PreconditionFailure::NoRemote))
}

impl FetchMutation {
    pub fn remote_name(&self) -> &str {
        &self.remote.name
    }
}

impl Mutation for FetchMutation {
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
        let request = FetchRequest {
            remote: self.remote.name.clone(),
            prune: self.prune,
        };
        gateway.fetch(repo, &request, callbacks)
    }
}
