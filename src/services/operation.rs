//! Operation engine
//!
//! One engine drives every [`OperationKind`]: it checks preconditions,
//! asks for confirmation, runs the gateway call on a blocking thread while
//! relaying progress and credential requests, and records the terminal
//! result exactly once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::OnceCell;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tracing::Instrument;
use uuid::Uuid;

use crate::error::{OpsError, PreconditionFailure, Result};
use crate::models::{
    ConfirmationRequest, CredentialRequest, Notice, OperationFailure, OperationKind,
    OperationReport, OperationResult, OperationState, ProgressEvent, ProgressSample,
    RepositoryHandle,
};
use crate::operations::{self, Mutation};
use crate::services::cancellation::CancellationToken;
use crate::services::config::OpsConfig;
use crate::services::credentials_service::{CredentialPrompt, CredentialProvider};
use crate::services::gateway::{MutationGateway, TransferCallbacks};
use crate::services::notifications::ResultSink;

/// Asks the user to confirm a mutation
#[async_trait]
pub trait ConfirmationDialog: Send + Sync {
    /// `false` when the user declines
    async fn confirm(&self, request: ConfirmationRequest) -> bool;
}

/// Collaborators every operation of a dispatcher shares
#[derive(Clone)]
pub struct OperationContext {
    pub gateway: Arc<dyn MutationGateway>,
    pub dialog: Arc<dyn ConfirmationDialog>,
    pub prompt: Arc<dyn CredentialPrompt>,
    pub sink: Arc<dyn ResultSink>,
    pub config: OpsConfig,
}

/// A single run of a repository mutation
pub struct Operation {
    id: Uuid,
    kind: OperationKind,
    repository: Arc<RepositoryHandle>,
    context: OperationContext,
    token: CancellationToken,
    started: AtomicBool,
    stop_signaled: AtomicBool,
    result: OnceCell<OperationResult>,
    state: watch::Sender<OperationState>,
    created_at: DateTime<Utc>,
}

impl Operation {
    pub fn new(
        kind: OperationKind,
        repository: Arc<RepositoryHandle>,
        context: OperationContext,
    ) -> Self {
        let (state, _) = watch::channel(OperationState::Idle);
        Self {
            id: Uuid::new_v4(),
            kind,
            repository,
            context,
            token: CancellationToken::new(),
            started: AtomicBool::new(false),
            stop_signaled: AtomicBool::new(false),
            result: OnceCell::new(),
            state,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn kind(&self) -> &OperationKind {
        &self.kind
    }

    pub fn repository(&self) -> &Arc<RepositoryHandle> {
        &self.repository
    }

    pub fn state(&self) -> OperationState {
        *self.state.borrow()
    }

    /// Terminal result, `None` until the operation has ended
    pub fn result(&self) -> Option<OperationResult> {
        self.result.get().cloned()
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait for the terminal result.
    ///
    /// Never resolves for an operation that was not started.
    pub async fn wait(&self) -> OperationResult {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| s.is_terminal()).await;
        self.result().unwrap_or(OperationResult::Canceled)
    }

    /// Validate preconditions and launch the mutation.
    ///
    /// Returns `Ok(false)` when there was nothing to do (no stashes); the
    /// user gets a notice and the operation stays idle. Precondition
    /// failures end the operation and are returned to the caller.
    pub fn start(self: &Arc<Self>) -> Result<bool> {
        if self.started.swap(true, Ordering::SeqCst) {
            return Err(OpsError::AlreadyStarted);
        }

        let repo = self.repository.path();
        let mutation = match operations::prepare(
            &self.kind,
            self.context.gateway.as_ref(),
            repo,
            &self.context.config,
        ) {
            Ok(mutation) => mutation,
            Err(OpsError::Precondition(PreconditionFailure::NoStashes)) => {
                tracing::info!("No stashes in {}", repo.display());
                self.context.sink.notice(repo, Notice::NoStashes);
                return Ok(false);
            }
            Err(e) => {
                tracing::warn!("Cannot start {}: {}", self.kind, e);
                self.end(self.failure(&e))?;
                return Err(e);
            }
        };

        if mutation.is_immediate() {
            let _span = self.span().entered();
            self.state.send_replace(OperationState::Running);
            let never_stop = |_: ProgressSample| false;
            let result = mutation.execute(
                self.context.gateway.as_ref(),
                repo,
                TransferCallbacks::new(&never_stop),
            );
            self.complete(mutation.as_ref(), result);
            return Ok(true);
        }

        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(e) => {
                let error = OpsError::OperationFailed(format!("No async runtime: {}", e));
                self.end(self.failure(&error))?;
                return Err(error);
            }
        };

        let operation = Arc::clone(self);
        runtime.spawn(
            async move { operation.run(mutation).await }.instrument(self.span()),
        );
        Ok(true)
    }

    /// Request cancellation. Takes effect at the next progress checkpoint.
    pub fn cancel(&self) {
        if self.token.cancel() {
            tracing::info!("Cancel requested for operation {}", self.id);
        }
    }

    /// Forward a progress sample. Returns `true` when the gateway should
    /// stop: the operation was cancelled or its repository closed.
    pub fn progress_callback(&self, sample: ProgressSample) -> bool {
        self.context.sink.progress(ProgressEvent {
            operation_id: self.id,
            repository: self.repository.path().to_string_lossy().to_string(),
            progress: sample.current as f32,
            total: sample.total as f32,
            bytes_transferred: sample.bytes_transferred,
        });

        if self.token.is_cancelled() || self.repository.is_closed() {
            if !self.stop_signaled.swap(true, Ordering::SeqCst) {
                tracing::debug!("Asking gateway to stop operation {}", self.id);
            }
            return true;
        }
        false
    }

    /// Record the terminal result and notify the sink. Only the first call
    /// has any effect.
    pub fn end(&self, result: OperationResult) -> Result<()> {
        if self.result.set(result.clone()).is_err() {
            tracing::error!("Operation {} ended more than once", self.id);
            return Err(OpsError::AlreadyEnded);
        }

        match &result {
            OperationResult::Failed(failure) => {
                tracing::warn!("{} failed: {}", self.kind, failure.message)
            }
            other => tracing::info!("{} finished: {:?}", self.kind, other.state()),
        }

        self.context.sink.finished(&OperationReport {
            operation_id: self.id,
            kind: self.kind.as_str().to_string(),
            repository: self.repository.path().to_string_lossy().to_string(),
            result: result.clone(),
            created_at: self.created_at,
            finished_at: Utc::now(),
        });
        self.state.send_replace(result.state());
        Ok(())
    }

    /// Whether a failure should be shown to the user
    pub fn should_report(&self, error: &OpsError) -> bool {
        operations::should_report(&self.kind, error)
    }

    async fn run(self: Arc<Self>, mutation: Arc<dyn Mutation>) {
        if let Some(request) = mutation.confirmation() {
            let confirmed = tokio::select! {
                confirmed = self.context.dialog.confirm(request) => confirmed,
                _ = self.token.cancelled() => false,
            };
            if !confirmed {
                tracing::debug!("{} not confirmed", self.kind);
                self.end_logged(OperationResult::Canceled);
                return;
            }
        }

        self.state.send_replace(OperationState::Running);

        let operation = Arc::clone(&self);
        let background = Arc::clone(&mutation);
        let runtime = Handle::current();
        let span = tracing::Span::current();
        let joined = tokio::task::spawn_blocking(move || {
            let _span = span.entered();
            operation.execute(background.as_ref(), runtime)
        })
        .await;

        let result = joined.unwrap_or_else(|e| {
            Err(OpsError::OperationFailed(format!(
                "Background task failed: {}",
                e
            )))
        });
        self.complete(mutation.as_ref(), result);
    }

    /// Runs on the blocking thread
    fn execute(&self, mutation: &dyn Mutation, runtime: Handle) -> Result<()> {
        let gateway = self.context.gateway.as_ref();
        let repo = self.repository.path();
        let progress = |sample: ProgressSample| self.progress_callback(sample);
        let callbacks = TransferCallbacks::new(&progress);

        if !mutation.credential_gated() {
            return mutation.execute(gateway, repo, callbacks);
        }

        let provider = CredentialProvider::new(
            Arc::clone(&self.context.prompt),
            runtime,
            self.token.clone(),
            self.context.config.max_credential_prompts,
        );
        if let Some(url) = mutation.remote_url() {
            provider.set_remote_url(url);
        }
        let credentials = |request: &CredentialRequest| provider.get_password(request);

        let result = mutation.execute(gateway, repo, callbacks.with_credentials(&credentials));
        if result.is_err() && provider.prompt_canceled() {
            tracing::debug!("Credential prompt was dismissed");
        }
        result
    }

    fn complete(&self, mutation: &dyn Mutation, result: Result<()>) {
        let stopped = self.stop_signaled.load(Ordering::SeqCst);
        let outcome = match result {
            // The gateway went past its last abortable point, so the refs moved
            Ok(()) => {
                if stopped {
                    tracing::debug!("{} completed despite a stop request", self.kind);
                }
                if mutation.changes_refs() {
                    self.context.sink.refs_changed(self.repository.path());
                }
                OperationResult::Succeeded
            }
            Err(_) if stopped || self.token.is_cancelled() => OperationResult::Canceled,
            Err(e) => self.failure(&e),
        };
        self.end_logged(outcome);
    }

    fn failure(&self, error: &OpsError) -> OperationResult {
        match error.kind() {
            None => OperationResult::Canceled,
            Some(kind) => OperationResult::Failed(OperationFailure {
                kind,
                message: error.to_string(),
                reportable: self.should_report(error),
            }),
        }
    }

    fn end_logged(&self, result: OperationResult) {
        if let Err(e) = self.end(result) {
            tracing::error!("Failed to end operation {}: {}", self.id, e);
        }
    }

    fn span(&self) -> tracing::Span {
        tracing::info_span!(
            "operation",
            id = %self.id,
            kind = %self.kind,
            repository = %self.repository.path().display()
        )
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("repository", &self.repository.path())
            .field("state", &self.state())
            .finish()
    }
}
