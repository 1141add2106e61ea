//! Result sink and notification bus

use std::path::Path;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::{Notice, OperationReport, ProgressEvent};
use crate::services::config::OpsConfig;

/// Receives everything operations publish
pub trait ResultSink: Send + Sync {
    /// Progress while an operation is running
    fn progress(&self, event: ProgressEvent);

    /// References of the repository changed after a successful mutation
    fn refs_changed(&self, repository: &Path);

    /// An operation reached its terminal state
    fn finished(&self, report: &OperationReport);

    /// Something the user should see that isn't a failure
    fn notice(&self, repository: &Path, notice: Notice);
}

/// Event carried by the notification bus
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum OperationEvent {
    Progress(ProgressEvent),
    #[serde(rename_all = "camelCase")]
    RefsChanged { repository: String },
    Finished(OperationReport),
    #[serde(rename_all = "camelCase")]
    Notice { repository: String, notice: Notice },
}

impl OperationEvent {
    /// Event name as used by the UI layer
    pub fn name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "operation-progress",
            Self::RefsChanged { .. } => "repository-refs-changed",
            Self::Finished(_) => "operation-finished",
            Self::Notice { .. } => "operation-notice",
        }
    }
}

/// Broadcast-based sink that sidebar, history and other observers
/// subscribe to independently
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<OperationEvent>,
}

impl NotificationBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Bus sized by `event_capacity`. Lagging subscribers lose the oldest
    /// events beyond that.
    pub fn from_config(config: &OpsConfig) -> Self {
        Self::new(config.event_capacity)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OperationEvent> {
        self.sender.subscribe()
    }

    fn publish(&self, event: OperationEvent) {
        let name = event.name();
        // No subscribers is fine
        if self.sender.send(event).is_err() {
            tracing::trace!("No subscribers for {}", name);
        }
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::from_config(&OpsConfig::default())
    }
}

impl ResultSink for NotificationBus {
    fn progress(&self, event: ProgressEvent) {
        self.publish(OperationEvent::Progress(event));
    }

    fn refs_changed(&self, repository: &Path) {
        self.publish(OperationEvent::RefsChanged {
            repository: repository.to_string_lossy().to_string(),
        });
    }

    fn finished(&self, report: &OperationReport) {
        self.publish(OperationEvent::Finished(report.clone()));
    }

    fn notice(&self, repository: &Path, notice: Notice) {
        self.publish(OperationEvent::Notice {
            repository: repository.to_string_lossy().to_string(),
            notice,
        });
    }
}
