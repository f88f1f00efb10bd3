//! Wire format encoding.
//!
//! Every frame is one of:
//! ```text
//! ┌────────────┬───────────────────────────┐
//! │ int        │ 4 bytes, i32 BE           │
//! │ long       │ 8 bytes, i64 BE           │
//! │ bool       │ 1 byte, non-zero = true   │
//! │ blob       │ int length + N bytes      │
//! │ string     │ blob holding UTF-8        │
//! └────────────┴───────────────────────────┘
//! ```
//!
//! Negative ints in the [`special_lengths`] table are control sentinels and
//! never valid blob lengths.

use bytes::{BufMut, BytesMut};

use crate::error::{Result, WorkerError};

/// Size of an int frame in bytes.
pub const INT_SIZE: usize = 4;

/// Size of a long frame in bytes.
pub const LONG_SIZE: usize = 8;

/// Default maximum blob size (1 GB).
pub const DEFAULT_MAX_BLOB_SIZE: usize = 1_073_741_824;

/// Reserved integer values used for control signaling.
pub mod special_lengths {
    /// End of a data section. Sent on the tail to refuse reuse.
    pub const END_OF_DATA_SECTION: i32 = -1;
    /// An error envelope follows.
    pub const EXCEPTION_THROWN: i32 = -2;
    /// End of stream. Echoed on the tail to accept reuse.
    pub const END_OF_STREAM: i32 = -4;
    /// A null blob.
    pub const NULL: i32 = -5;

    /// Human-readable name of a sentinel, for diagnostics.
    pub fn name(value: i32) -> Option<&'static str> {
        match value {
            END_OF_DATA_SECTION => Some("END_OF_DATA_SECTION"),
            EXCEPTION_THROWN => Some("EXCEPTION_THROWN"),
            END_OF_STREAM => Some("END_OF_STREAM"),
            NULL => Some("NULL"),
            _ => None,
        }
    }
}

/// Interpretation of a length prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobLength {
    /// The NULL sentinel.
    Null,
    /// A payload of this many bytes follows.
    Bytes(usize),
}

/// Validate a length prefix against the protocol and a size limit.
///
/// Only `NULL` is accepted among the sentinels; `END_OF_DATA_SECTION` where a
/// blob is expected means the host ended the section early.
pub fn check_blob_length(length: i32, max_blob_len: usize) -> Result<BlobLength> {
    match length {
        special_lengths::NULL => Ok(BlobLength::Null),
        special_lengths::END_OF_DATA_SECTION => Err(WorkerError::Protocol(
            "Unexpected END_OF_DATA_SECTION where a blob was expected".to_string(),
        )),
        n if n < 0 => Err(WorkerError::Protocol(format!("Invalid blob length {}", n))),
        n => {
            let len = n as usize;
            if len > max_blob_len {
                return Err(WorkerError::Protocol(format!(
                    "Blob size {} exceeds maximum {}",
                    len, max_blob_len
                )));
            }
            Ok(BlobLength::Bytes(len))
        }
    }
}

/// Append an int frame.
#[inline]
pub fn put_int(buf: &mut BytesMut, value: i32) {
    buf.put_i32(value);
}

/// Append a long frame.
#[inline]
pub fn put_long(buf: &mut BytesMut, value: i64) {
    buf.put_i64(value);
}

/// Append a bool frame.
#[inline]
pub fn put_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(u8::from(value));
}

/// Append a length-prefixed blob.
///
/// # Errors
///
/// Fails if the blob does not fit a signed 32-bit length.
pub fn put_blob(buf: &mut BytesMut, data: &[u8]) -> Result<()> {
    let len = i32::try_from(data.len()).map_err(|_| {
        WorkerError::Protocol(format!(
            "Blob size {} does not fit a 32-bit length",
            data.len()
        ))
    })?;
    buf.reserve(INT_SIZE + data.len());
    buf.put_i32(len);
    buf.put_slice(data);
    Ok(())
}

/// Append a UTF-8 string as a blob.
#[inline]
pub fn put_str(buf: &mut BytesMut, value: &str) -> Result<()> {
    put_blob(buf, value.as_bytes())
}

/// Append a NULL blob.
#[inline]
pub fn put_null(buf: &mut BytesMut) {
    buf.put_i32(special_lengths::NULL);
}
