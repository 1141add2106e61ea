//! Per-repository operation dispatcher
//!
//! Holds the single slot that keeps mutating operations on one repository
//! from overlapping.

use std::sync::{Arc, Mutex, MutexGuard};

use uuid::Uuid;

use crate::error::{OpsError, Result};
use crate::models::{OperationKind, RepositoryHandle};
use crate::services::operation::{Operation, OperationContext};

type Slot = Arc<Mutex<Option<Arc<Operation>>>>;

/// Starts operations against one repository, one at a time
pub struct OperationDispatcher {
    repository: Arc<RepositoryHandle>,
    context: OperationContext,
    slot: Slot,
}

impl OperationDispatcher {
    pub fn new(repository: Arc<RepositoryHandle>, context: OperationContext) -> Self {
        Self {
            repository,
            context,
            slot: Arc::new(Mutex::new(None)),
        }
    }

    pub fn repository(&self) -> &Arc<RepositoryHandle> {
        &self.repository
    }

    /// True while a mutating operation holds the slot
    pub fn is_writing(&self) -> bool {
        lock(&self.slot).map(|s| s.is_some()).unwrap_or(false)
    }

    /// The operation holding the slot, if any
    pub fn current(&self) -> Option<Arc<Operation>> {
        lock(&self.slot).ok().and_then(|s| s.clone())
    }

    /// Cancel the running operation. Returns false when idle.
    pub fn cancel_current(&self) -> bool {
        match self.current() {
            Some(operation) => {
                operation.cancel();
                true
            }
            None => false,
        }
    }

    /// Start an operation of `kind`.
    ///
    /// Refuses with [`OpsError::Busy`] while another operation holds the
    /// slot. `Ok(None)` means the operation had nothing to do and was never
    /// started. Precondition failures are returned as errors.
    pub fn start_operation(&self, kind: OperationKind) -> Result<Option<Arc<Operation>>> {
        let operation = {
            let mut slot = lock(&self.slot)?;
            if let Some(current) = slot.as_ref() {
                tracing::warn!(
                    "Refusing {}: {} is still running on {}",
                    kind,
                    current.kind(),
                    self.repository.path().display()
                );
                return Err(OpsError::Busy);
            }

            let operation = Arc::new(Operation::new(
                kind,
                Arc::clone(&self.repository),
                self.context.clone(),
            ));
            *slot = Some(Arc::clone(&operation));
            operation
        };

        tracing::debug!("Starting {} ({})", operation.kind(), operation.id());

        match operation.start() {
            Ok(true) if operation.state().is_terminal() => {
                release(&self.slot, operation.id());
                Ok(Some(operation))
            }
            Ok(true) => {
                self.release_when_done(&operation)?;
                Ok(Some(operation))
            }
            Ok(false) => {
                release(&self.slot, operation.id());
                Ok(None)
            }
            Err(e) => {
                release(&self.slot, operation.id());
                Err(e)
            }
        }
    }

    fn release_when_done(&self, operation: &Arc<Operation>) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| OpsError::OperationFailed(format!("No async runtime: {}", e)))?;
        let slot = Arc::clone(&self.slot);
        let operation = Arc::clone(operation);
        runtime.spawn(async move {
            operation.wait().await;
            release(&slot, operation.id());
        });
        Ok(())
    }
}

fn lock(slot: &Slot) -> Result<MutexGuard<'_, Option<Arc<Operation>>>> {
    slot.lock()
        .map_err(|_| OpsError::OperationFailed("Operation slot poisoned".to_string()))
}

/// Clear the slot if it still holds operation `id`
fn release(slot: &Slot, id: Uuid) {
    match lock(slot) {
        Ok(mut guard) => {
            if guard.as_ref().is_some_and(|op| op.id() == id) {
                *guard = None;
                tracing::debug!("Released slot held by {}", id);
            }
        }
        Err(e) => tracing::error!("Failed to release operation slot: {}", e),
    }
}
