//! Payload codec: raw wire payloads into caller-defined types.
pub mod decode;

pub use decode::{decode_payload, JsonCodec, PayloadCodec};
