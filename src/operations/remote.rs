//! Remote settings operation

use std::path::Path;

use crate::error::{OpsError, PreconditionFailure, Result};
use crate::models::RemoteSettings;
use crate::operations::Mutation;
use crate::services::gateway::{MutationGateway, TransferCallbacks};

pub struct RemoteSettingsMutation {
    settings: RemoteSettings,
}

pub fn prepare(
    gateway: &dyn MutationGateway,
    repo: &Path,
    settings: &RemoteSettings,
) -> Result<RemoteSettingsMutation> {
    if gateway.remote(repo, &settings.name)?.is_none() {
        return Err(OpsError::Precondition(PreconditionFailure::RemoteNotFound(
            settings.name.clone(),
        )));
    }

    Ok(RemoteSettingsMutation {
        settings: settings.clone(),
    })
}

impl Mutation for RemoteSettingsMutation {
    fn changes_refs(&self) -> bool {
        false
    }

    fn is_immediate(&self) -> bool {
        true
    }

    fn execute(
        &self,
        gateway: &dyn MutationGateway,
        repo: &Path,
        _callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        gateway.update_remote(repo, &self.settings)
    }
}
