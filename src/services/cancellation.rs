//! Cancellation tokens for long-running operations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A token that can be used to check if an operation has been cancelled.
///
/// Wraps [`tokio_util::sync::CancellationToken`] for the async wait and
/// remembers which `cancel()` call flipped it. The flag only ever goes from
/// false to true.
#[derive(Clone)]
pub struct CancellationToken {
    inner: tokio_util::sync::CancellationToken,
    flipped: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            inner: tokio_util::sync::CancellationToken::new(),
            flipped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Cancel the operation. Returns true if this call flipped the flag.
    pub fn cancel(&self) -> bool {
        let first = !self.flipped.swap(true, Ordering::SeqCst);
        if first {
            self.inner.cancel();
        }
        first
    }

    /// Check if the operation has been cancelled
    pub fn is_cancelled(&self) -> bool {
        self.inner.is_cancelled()
    }

    /// Wait until the token is cancelled
    pub async fn cancelled(&self) {
        self.inner.cancelled().await
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancellationToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}
