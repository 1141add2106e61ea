//! Progress models

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One progress report from the gateway
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSample {
    pub current: u32,
    pub total: u32,
    pub bytes_transferred: u64,
}

impl ProgressSample {
    pub fn new(current: u32, total: u32, bytes_transferred: u64) -> Self {
        Self {
            current,
            total,
            bytes_transferred,
        }
    }

    /// Completion in percent, if the total is known
    pub fn percent(&self) -> Option<f32> {
        if self.total == 0 {
            None
        } else {
            Some(self.current.min(self.total) as f32 / self.total as f32 * 100.0)
        }
    }
}

/// Progress notification posted while an operation is running
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub operation_id: Uuid,
    pub repository: String,
    pub progress: f32,
    pub total: f32,
    pub bytes_transferred: u64,
}
