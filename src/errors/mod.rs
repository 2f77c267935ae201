//! Error types for batch-fetcher
//!
//! Overview
//! --------
//! Canonical error enumeration shared by the Redis binding, the payload codec
//! and the batch fetcher. Whole-call failures (`Transport`, `Operation`,
//! `Cancelled`) are what `fetch` returns; `Decode` only ever describes a single
//! dropped payload and is handed to drop observers, never to the caller.
//!
//! Usage
//! -----
//! - Convert low-level errors at the edge (Redis, pool checkout, serde).
//! - Avoid leaking third-party error types across crate boundaries.
//!
//! Concurrency / Logging
//! ---------------------
//! Errors are `Send + Sync` and implement Display via `thiserror`.
//! Use `tracing` for context at call sites (`error!(...);`).
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// Failure to initialize external services (pool creation, client wiring).
    #[error("Redis initialization failed: {0}")]
    RedisInit(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The store could not be reached, or the connection failed mid-call.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The store answered but the atomic pop itself failed (script fault,
    /// rejected command, unexpected reply shape).
    #[error("Atomic pop failed: {0}")]
    Operation(String),

    /// Cancellation token fired or the fetch deadline elapsed. Items the store
    /// removed before this was observed are lost.
    #[error("Fetch cancelled: {0}")]
    Cancelled(String),

    /// A single payload could not be decoded into the caller's type.
    #[error("Payload decode error: {0}")]
    Decode(String),
}

impl FetchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, FetchError::Cancelled(_))
    }

    /// Whether retrying the whole call later could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transport(_) | FetchError::Cancelled(_))
    }
}
