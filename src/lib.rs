//! blobgate: authenticated, range-aware object streaming.
//!
//! This crate serves objects from a blob store over HTTP with correct
//! partial-content semantics, so browsers and media players can seek in
//! large files without downloading them whole.  It provides the range
//! parser, the streaming relay, a session gate, pluggable read-only
//! storage backends, and the axum router that ties them together.

use std::sync::Arc;
use std::time::Duration;

pub mod auth;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod metrics;
pub mod range;
pub mod server;
pub mod storage;
pub mod stream;

use crate::auth::AccessGate;
use crate::config::Config;
use crate::storage::backend::StorageBackend;

/// Shared application state passed to all handlers via `axum::extract::State`.
///
/// Immutable after startup; requests share nothing mutable.
pub struct AppState {
    /// Server configuration.
    pub config: Config,
    /// Read-only object store.
    pub storage: Arc<dyn StorageBackend>,
    /// Session check run before any store access.
    pub gate: Arc<dyn AccessGate>,
}

impl AppState {
    /// Deadline for a single metadata, open or list call.
    pub fn store_timeout(&self) -> Duration {
        Duration::from_secs(self.config.server.store_timeout)
    }

    /// Longest gap allowed between two upstream chunks.
    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.config.server.stream_idle_timeout)
    }
}
