//! Stash save, apply, pop and drop
//!
//! Apply, pop and drop always act on the most recent stash (index 0).

use std::path::Path;

use crate::error::{OpsError, PreconditionFailure, Result};
use crate::models::{ConfirmationRequest, Stash};
use crate::operations::Mutation;
use crate::services::gateway::{MutationGateway, StashSaveRequest, TransferCallbacks};

/// Stash message used when the caller gives none
const DEFAULT_STASH_MESSAGE: &str = "WIP";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StashAction {
    Apply,
    Pop,
    Drop,
}

pub struct StashMutation {
    action: StashAction,
    stash: Stash,
}

/// Fails with `NoStashes` when there is nothing to act on
pub fn prepare(
    gateway: &dyn MutationGateway,
    repo: &Path,
    action: StashAction,
) -> Result<StashMutation> {
    let stash = gateway
        .stashes(repo)?
        .into_iter()
        .find(|s| s.index == 0)
        .ok_or(OpsError::Precondition(PreconditionFailure::NoStashes))?;

    Ok(StashMutation { action, stash })
}

pub struct StashSaveMutation {
    request: StashSaveRequest,
}

/// Saving needs no lookup; an empty working tree is reported by the gateway
pub fn prepare_save(message: Option<&str>, include_untracked: bool) -> StashSaveMutation {
    let message = message
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_STASH_MESSAGE);

    StashSaveMutation {
        request: StashSaveRequest {
            message: message.to_string(),
            include_untracked,
        },
    }
}

impl Mutation for StashSaveMutation {
    fn execute(
        &self,
        gateway: &dyn MutationGateway,
        repo: &Path,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        gateway.save_stash(repo, &self.request, callbacks)
    }
}

impl Mutation for StashMutation {
    fn confirmation(&self) -> Option<ConfirmationRequest> {
        let (message, action_name) = match self.action {
            StashAction::Apply => ("Apply the most recent stash, without deleting it?", "Apply"),
            StashAction::Pop => ("Apply the most recent stash, and then delete it?", "Pop"),
            StashAction::Drop => ("Delete the most recent stash?", "Drop"),
        };
        Some(ConfirmationRequest {
            message: message.to_string(),
            info: Some(self.stash.message.clone()),
            action_name: action_name.to_string(),
        })
    }

    fn execute(
        &self,
        gateway: &dyn MutationGateway,
        repo: &Path,
        callbacks: TransferCallbacks<'_>,
    ) -> Result<()> {
        let index = self.stash.index;
        match self.action {
            StashAction::Apply => gateway.apply_stash(repo, index, callbacks),
            StashAction::Pop => gateway.pop_stash(repo, index, callbacks),
            StashAction::Drop => gateway.drop_stash(repo, index, callbacks),
        }
    }
}
