//! MsgPack codec using `rmp-serde`.
//!
//! This is the value-exchange format shared with the host: class references
//! arrive as MsgPack blobs, and instantiated data sources leave as MsgPack
//! blobs. Structs are always encoded with `to_vec_named` (struct-as-map) so
//! the host can read fields by name.
//!
//! # Example
//!
//! ```
//! use datasource_worker::codec::MsgPackCodec;
//! use serde::{Serialize, Deserialize};
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Source {
//!     path: String,
//! }
//!
//! let source = Source { path: "/data".to_string() };
//! let encoded = MsgPackCodec::encode(&source).unwrap();
//! let decoded: Source = MsgPackCodec::decode(&encoded).unwrap();
//! assert_eq!(decoded, source);
//! ```

use crate::error::Result;

/// MessagePack codec for structured data.
pub struct MsgPackCodec;

impl MsgPackCodec {
    /// Encode a value to MsgPack bytes (struct-as-map).
    ///
    /// # Errors
    ///
    /// Returns error if the value cannot be serialized.
    #[inline]
    pub fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
        Ok(rmp_serde::to_vec_named(value)?)
    }

    /// Decode MsgPack bytes to a value.
    ///
    /// # Errors
    ///
    /// Returns error if the bytes cannot be deserialized to type T.
    #[inline]
    pub fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        Ok(rmp_serde::from_slice(bytes)?)
    }
}
