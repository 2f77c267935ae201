//! Batch fetcher (hot path)
//!
//! Overview
//! --------
//! One `fetch` call is one atomic pop followed by a per-item decode. Items that
//! fail to decode are dropped and reported to an optional `DropObserver`; they
//! never fail the call.
//!
//! Delivery
//! --------
//! At-most-once. Popped items are gone from the queue before they are decoded,
//! so a late error, a cancellation that races the round trip, or a caller crash
//! after `fetch` returns all lose those items. Acknowledgement and redelivery
//! belong in a layer above this one.
//!
//! Concurrency
//! -----------
//! Stateless between calls and `Send + Sync`; share one fetcher across tasks.
//! The only suspension point is the store round trip.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::FetchError;
use crate::ingest::{AtomicPop, BatchCap, RawPayload};
use crate::transform::{decode_payload, JsonCodec, PayloadCodec};

/// Hex preview length for dropped payloads in logs.
const PREVIEW_BYTES: usize = 64;

/// Public fetch surface; lets callers hold `Arc<dyn Fetcher<T>>`.
#[async_trait::async_trait]
pub trait Fetcher<T>: Send + Sync {
    /// Pop and decode one batch from `keys[0]`. Remaining keys are ignored.
    async fn fetch(&self, cancel: &CancellationToken, keys: &[String]) -> Result<Vec<T>, FetchError>;
}

/// A payload that was popped but could not be decoded.
#[derive(Debug)]
pub struct DroppedPayload<'a> {
    pub key: &'a str,
    /// Position within the popped batch.
    pub index: usize,
    pub raw: &'a RawPayload,
    pub error: &'a FetchError,
}

pub trait DropObserver: Send + Sync {
    fn on_drop(&self, dropped: &DroppedPayload<'_>);
}

impl<F> DropObserver for F
where
    F: Fn(&DroppedPayload<'_>) + Send + Sync,
{
    fn on_drop(&self, dropped: &DroppedPayload<'_>) {
        self(dropped)
    }
}

/// Counts dropped payloads. Clones share the same counter.
#[derive(Debug, Clone, Default)]
pub struct DropCounter(Arc<AtomicU64>);

impl DropCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

impl DropObserver for DropCounter {
    fn on_drop(&self, _dropped: &DroppedPayload<'_>) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct BatchFetcher<T, P, C = JsonCodec<T>> {
    pop: P,
    codec: C,
    cap: BatchCap,
    deadline: Option<Duration>,
    observer: Option<Arc<dyn DropObserver>>,
    _out: PhantomData<fn() -> T>,
}

impl<T, P> BatchFetcher<T, P>
where
    T: DeserializeOwned,
    P: AtomicPop,
{
    /// JSON payloads, cap at the absolute maximum, no deadline.
    pub fn new(pop: P) -> Self {
        Self::with_codec(pop, JsonCodec::new())
    }
}

impl<T, P, C> BatchFetcher<T, P, C>
where
    P: AtomicPop,
    C: PayloadCodec<T>,
{
    pub fn with_codec(pop: P, codec: C) -> Self {
        Self {
            pop,
            codec,
            cap: BatchCap::default(),
            deadline: None,
            observer: None,
            _out: PhantomData,
        }
    }

    /// Clamped into `1..=MAX_BATCH_CAP`.
    pub fn with_cap(mut self, cap: usize) -> Self {
        self.cap = BatchCap::new(cap);
        self
    }

    /// Bound each round trip; expiry is reported as `Cancelled`.
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn with_drop_observer<O>(mut self, observer: O) -> Self
    where
        O: DropObserver + 'static,
    {
        self.observer = Some(Arc::new(observer));
        self
    }

    pub fn cap(&self) -> BatchCap {
        self.cap
    }

    #[tracing::instrument(skip_all, fields(key = tracing::field::Empty, cap = self.cap.get()))]
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        keys: &[String],
    ) -> Result<Vec<T>, FetchError> {
        let key = active_key(keys)?;
        tracing::Span::current().record("key", key);

        // Nothing has touched the queue yet.
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled("cancelled before dispatch".into()));
        }

        let raw = self.pop_raw(cancel, key).await?;
        Ok(self.decode_batch(key, &raw))
    }

    async fn pop_raw(
        &self,
        cancel: &CancellationToken,
        key: &str,
    ) -> Result<Vec<RawPayload>, FetchError> {
        let round_trip = async {
            let popped = self.pop.pop_up_to(key, self.cap);
            let out: Result<Vec<RawPayload>, FetchError> = match self.deadline {
                Some(limit) => match tokio::time::timeout(limit, popped).await {
                    Ok(res) => res.map_err(|e| e.into()),
                    Err(_) => Err(FetchError::Cancelled(format!(
                        "deadline of {limit:?} elapsed; popped items may be lost"
                    ))),
                },
                None => popped.await.map_err(|e| e.into()),
            };
            out
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(FetchError::Cancelled(
                "cancelled during round trip; popped items may be lost".into(),
            )),
            res = round_trip => res,
        }
    }

    fn decode_batch(&self, key: &str, raw: &[RawPayload]) -> Vec<T> {
        let mut items = Vec::with_capacity(raw.len());
        for (index, payload) in raw.iter().enumerate() {
            match decode_payload(&self.codec, payload) {
                Ok(item) => items.push(item),
                Err(error) => {
                    debug!(
                        key,
                        index,
                        error = %error,
                        payload_hex = %preview(payload),
                        "dropping undecodable payload"
                    );
                    if let Some(observer) = &self.observer {
                        observer.on_drop(&DroppedPayload {
                            key,
                            index,
                            raw: payload,
                            error: &error,
                        });
                    }
                }
            }
        }
        debug!(popped = raw.len(), decoded = items.len(), "batch fetched");
        items
    }
}

#[async_trait::async_trait]
impl<T, P, C> Fetcher<T> for BatchFetcher<T, P, C>
where
    T: Send + 'static,
    P: AtomicPop,
    C: PayloadCodec<T>,
{
    async fn fetch(&self, cancel: &CancellationToken, keys: &[String]) -> Result<Vec<T>, FetchError> {
        BatchFetcher::fetch(self, cancel, keys).await
    }
}

fn active_key(keys: &[String]) -> Result<&str, FetchError> {
    let (first, rest) = keys
        .split_first()
        .ok_or_else(|| FetchError::ConfigError("no queue key supplied".into()))?;
    if first.is_empty() {
        return Err(FetchError::ConfigError("queue key is empty".into()));
    }
    if !rest.is_empty() {
        trace!(ignored = rest.len(), "only the first queue key is used");
    }
    Ok(first)
}

fn preview(payload: &RawPayload) -> String {
    match payload.as_bytes() {
        Some(b) => hex::encode(&b[..b.len().min(PREVIEW_BYTES)]),
        None => String::from("-"),
    }
}
