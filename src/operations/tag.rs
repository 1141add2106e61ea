//! New tag operation

use std::path::Path;

use crate::error::{OpsError, PreconditionFailure, Result};
use crate::models::TagRequest;
use crate::operations::Mutation;
use crate::services::gateway::{MutationGateway, TransferCallbacks};

pub struct NewTagMutation {
    request: TagRequest,
}

pub fn prepare(request: &TagRequest) -> Result<NewTagMutation> {
    let name = request.name.trim();
    if name.is_empty() || !git2::Reference::is_valid_name(&format!("refs/tags/{}", name)) {
        return Err(OpsError::Precondition(PreconditionFailure::InvalidTagName(
            request.name.clone(),
        )));
    }

    Ok(NewTagMutation {
        request: TagRequest {
            name: name.to_string(),
            target: request.target.clone(),
            message: request.message.clone().filter(|m| !m.trim().is_empty()),
        },
    })
}

impl Mutation for NewTagMutation {
    fn execute(
        &self,
        gateway: &dyn MutationGateway,
        repo: &Path,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        if callbacks.report(Default::default()) {
            return Err(OpsError::Canceled);
        }
        gateway.create_tag(repo, &self.request).map(|_| ())
    }
}
