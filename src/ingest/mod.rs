//! Ingest abstraction
//!
//! Overview
//! --------
//! Store-agnostic contracts for the atomic pop. Concrete implementations
//! include Redis lists (see `crate::redis`); tests use in-memory fakes.

use bytes::Bytes;

use crate::errors::FetchError;

/// Absolute ceiling on items removed by one pop.
pub const MAX_BATCH_CAP: usize = 1000;

/// One element as it came off the queue, before decoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawPayload {
    /// String-like wire item.
    Data(Bytes),
    /// Anything else the store put in the reply; always malformed.
    Unexpected(String),
}

impl RawPayload {
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            RawPayload::Data(b) => Some(b),
            RawPayload::Unexpected(_) => None,
        }
    }
}

impl From<&'static str> for RawPayload {
    fn from(s: &'static str) -> Self {
        RawPayload::Data(Bytes::from_static(s.as_bytes()))
    }
}

impl From<String> for RawPayload {
    fn from(s: String) -> Self {
        RawPayload::Data(Bytes::from(s))
    }
}

/// Upper bound on items popped per call, always within `1..=MAX_BATCH_CAP`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BatchCap(usize);

impl BatchCap {
    pub const MAX: BatchCap = BatchCap(MAX_BATCH_CAP);

    pub fn new(n: usize) -> Self {
        Self(n.clamp(1, MAX_BATCH_CAP))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for BatchCap {
    fn default() -> Self {
        Self::MAX
    }
}

/// Removes up to `cap` items from the head of `key` as one indivisible step.
///
/// Implementations must return items oldest first and must never hand the same
/// item to two callers. On `Err` the caller treats the batch as lost.
#[async_trait::async_trait]
pub trait AtomicPop: Send + Sync {
    type Error: Into<FetchError> + Send;

    async fn pop_up_to(&self, key: &str, cap: BatchCap) -> Result<Vec<RawPayload>, Self::Error>;
}

#[async_trait::async_trait]
impl<P: AtomicPop + ?Sized> AtomicPop for std::sync::Arc<P> {
    type Error = P::Error;

    async fn pop_up_to(&self, key: &str, cap: BatchCap) -> Result<Vec<RawPayload>, Self::Error> {
        (**self).pop_up_to(key, cap).await
    }
}
