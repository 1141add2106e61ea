//! Leviathan operations
//!
//! Runs repository mutations (fetch, pull, push, stash, tag and remote
//! changes) as cancellable background operations with progress reporting,
//! credential prompting and one-writer-per-repository dispatch.

pub mod error;
pub mod models;
pub mod operations;
pub mod services;

#[cfg(test)]
mod test_utils;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install the default tracing subscriber. `RUST_LOG` overrides the filter.
pub fn init_tracing() {
    let result = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "leviathan_ops=debug,git2=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init();

    if result.is_ok() {
        tracing::info!("Tracing initialized");
    }
}
