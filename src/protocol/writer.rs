//! Buffered frame writer for the host connection.
//!
//! Frames are encoded into a pending `BytesMut` and handed to the socket in
//! one `write_all` on [`ProtocolWriter::flush`], so a response composed of
//! several frames reaches the host as a single batch.

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::wire_format::{put_blob, put_bool, put_int, put_long, put_str};
use crate::error::Result;

/// Default capacity of the pending buffer.
pub const DEFAULT_WRITE_BUFFER: usize = 64 * 1024;

/// Writes protocol frames to the host.
pub struct ProtocolWriter<W> {
    inner: W,
    pending: BytesMut,
}

impl<W: AsyncWrite + Unpin> ProtocolWriter<W> {
    /// Create a writer with the default buffer capacity.
    pub fn new(inner: W) -> Self {
        Self::with_capacity(inner, DEFAULT_WRITE_BUFFER)
    }

    /// Create a writer with a custom buffer capacity.
    pub fn with_capacity(inner: W, capacity: usize) -> Self {
        Self {
            inner,
            pending: BytesMut::with_capacity(capacity),
        }
    }

    /// Queue an int frame.
    pub fn write_int(&mut self, value: i32) {
        put_int(&mut self.pending, value);
    }

    /// Queue a long frame.
    pub fn write_long(&mut self, value: i64) {
        put_long(&mut self.pending, value);
    }

    /// Queue a bool frame.
    pub fn write_bool(&mut self, value: bool) {
        put_bool(&mut self.pending, value);
    }

    /// Queue a length-prefixed blob.
    pub fn write_blob(&mut self, data: &[u8]) -> Result<()> {
        put_blob(&mut self.pending, data)
    }

    /// Queue a UTF-8 string.
    pub fn write_str(&mut self, value: &str) -> Result<()> {
        put_str(&mut self.pending, value)
    }

    /// Queue frames that were encoded elsewhere.
    pub fn write_encoded(&mut self, frames: Bytes) {
        self.pending.extend_from_slice(&frames);
    }

    /// Number of bytes queued but not yet flushed.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Drop queued frames without sending them.
    pub fn discard_pending(&mut self) -> usize {
        let dropped = self.pending.len();
        self.pending.clear();
        dropped
    }

    /// Write all queued frames and flush the connection.
    pub async fn flush(&mut self) -> Result<()> {
        if !self.pending.is_empty() {
            let batch = self.pending.split().freeze();
            self.inner.write_all(&batch).await?;
        }
        self.inner.flush().await?;
        Ok(())
    }

    /// Get a mutable reference to the underlying writer.
    pub fn inner_mut(&mut self) -> &mut W {
        &mut self.inner
    }

    /// Unwrap the underlying writer, discarding unflushed frames.
    pub fn into_inner(self) -> W {
        self.inner
    }
}
