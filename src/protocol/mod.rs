//! Protocol module - wire format, framing, and the error envelope.
//!
//! This module implements the worker side of the host protocol:
//! - Fixed-width ints, longs and bools, length-prefixed blobs and strings
//! - Control sentinels (`END_OF_STREAM`, `END_OF_DATA_SECTION`, ...)
//! - In-order reader and batching writer over any async byte stream
//! - The structured error envelope

mod envelope;
mod reader;
mod wire_format;
mod writer;

pub use envelope::ErrorEnvelope;
pub use reader::ProtocolReader;
pub use wire_format::{
    check_blob_length, put_blob, put_bool, put_int, put_long, put_null, put_str,
    special_lengths, BlobLength, DEFAULT_MAX_BLOB_SIZE, INT_SIZE, LONG_SIZE,
};
pub use writer::{ProtocolWriter, DEFAULT_WRITE_BUFFER};
