//! batch-fetcher: atomic batched dequeue of typed work items from Redis lists.
pub mod config;
pub mod errors;
pub mod fetcher;
pub mod ingest;
pub mod redis;
pub mod transform;

pub use errors::FetchError;
pub use fetcher::{BatchFetcher, DropCounter, DropObserver, DroppedPayload, Fetcher};
pub use ingest::{AtomicPop, BatchCap, RawPayload, MAX_BATCH_CAP};
pub use transform::{JsonCodec, PayloadCodec};
