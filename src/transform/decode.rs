use std::marker::PhantomData;

use serde::de::DeserializeOwned;

use crate::errors::FetchError;
use crate::ingest::RawPayload;

/// Turns one raw payload into a fresh `T`.
pub trait PayloadCodec<T>: Send + Sync {
    fn decode(&self, raw: &[u8]) -> Result<T, FetchError>;
}

/// JSON documents into any `T: DeserializeOwned`.
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: DeserializeOwned> PayloadCodec<T> for JsonCodec<T> {
    fn decode(&self, raw: &[u8]) -> Result<T, FetchError> {
        serde_json::from_slice(raw).map_err(|e| FetchError::Decode(e.to_string()))
    }
}

impl<T, F> PayloadCodec<T> for F
where
    F: Fn(&[u8]) -> Result<T, FetchError> + Send + Sync,
{
    fn decode(&self, raw: &[u8]) -> Result<T, FetchError> {
        self(raw)
    }
}

/// Decode a popped item; non string-like items fail without reaching the codec.
pub fn decode_payload<T, C>(codec: &C, raw: &RawPayload) -> Result<T, FetchError>
where
    C: PayloadCodec<T> + ?Sized,
{
    match raw {
        RawPayload::Data(b) => codec.decode(b),
        RawPayload::Unexpected(what) => Err(FetchError::Decode(format!(
            "not a string payload: {what}"
        ))),
    }
}
