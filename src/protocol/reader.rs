//! Blocking-in-order frame reader over the host connection.
//!
//! Every read waits for exactly the bytes its frame needs. A connection that
//! closes mid-frame surfaces as [`WorkerError::ConnectionClosed`].

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{check_blob_length, BlobLength, DEFAULT_MAX_BLOB_SIZE};
use crate::error::{Result, WorkerError};

const INITIAL_BLOB_CAPACITY: usize = 64 * 1024;

/// Reads protocol frames from the host.
pub struct ProtocolReader<R> {
    inner: R,
    max_blob_len: usize,
}

impl<R: AsyncRead + Unpin> ProtocolReader<R> {
    /// Create a reader with the default blob limit (1GB).
    pub fn new(inner: R) -> Self {
        Self::with_max_blob(inner, DEFAULT_MAX_BLOB_SIZE)
    }

    /// Create a reader with a custom blob limit.
    pub fn with_max_blob(inner: R, max_blob_len: usize) -> Self {
        Self {
            inner,
            max_blob_len,
        }
    }

    /// Read a 32-bit big-endian int.
    pub async fn read_int(&mut self) -> Result<i32> {
        self.inner.read_i32().await.map_err(map_eof)
    }

    /// Read a 64-bit big-endian long.
    pub async fn read_long(&mut self) -> Result<i64> {
        self.inner.read_i64().await.map_err(map_eof)
    }

    /// Read a one-byte bool.
    pub async fn read_bool(&mut self) -> Result<bool> {
        let byte = self.inner.read_u8().await.map_err(map_eof)?;
        Ok(byte != 0)
    }

    /// Read a blob that may be NULL.
    pub async fn read_nullable_blob(&mut self) -> Result<Option<Bytes>> {
        let length = self.read_int().await?;
        match check_blob_length(length, self.max_blob_len)? {
            BlobLength::Null => Ok(None),
            BlobLength::Bytes(len) => {
                // Grow with the bytes that actually arrive, not the claimed length.
                let mut buf = Vec::with_capacity(len.min(INITIAL_BLOB_CAPACITY));
                (&mut self.inner)
                    .take(len as u64)
                    .read_to_end(&mut buf)
                    .await?;
                if buf.len() < len {
                    return Err(WorkerError::ConnectionClosed);
                }
                Ok(Some(Bytes::from(buf)))
            }
        }
    }

    /// Read a blob; NULL is a protocol error.
    pub async fn read_blob(&mut self) -> Result<Bytes> {
        self.read_nullable_blob()
            .await?
            .ok_or_else(|| WorkerError::Protocol("Unexpected NULL blob".to_string()))
    }

    /// Read a UTF-8 string that may be NULL.
    pub async fn read_nullable_string(&mut self) -> Result<Option<String>> {
        match self.read_nullable_blob().await? {
            Some(bytes) => Ok(Some(String::from_utf8(bytes.to_vec())?)),
            None => Ok(None),
        }
    }

    /// Read a UTF-8 string; NULL is a protocol error.
    pub async fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_blob().await?;
        Ok(String::from_utf8(bytes.to_vec())?)
    }

    /// Get the blob size limit.
    pub fn max_blob_len(&self) -> usize {
        self.max_blob_len
    }

    /// Get a mutable reference to the underlying reader.
    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    /// Unwrap the underlying reader.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

fn map_eof(err: std::io::Error) -> WorkerError {
    if err.kind() == std::io::ErrorKind::UnexpectedEof {
        WorkerError::ConnectionClosed
    } else {
        WorkerError::Io(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::wire_format::{
        put_blob, put_bool, put_int, put_long, put_null, put_str, special_lengths,
    };
    use bytes::BytesMut;

    #[tokio::test]
    async fn test_reads_frames_in_order() {
        let mut buf = BytesMut::new();
        put_int(&mut buf, 7);
        put_bool(&mut buf, true);
        put_long(&mut buf, -3);
        put_str(&mut buf, "provider").unwrap();
        put_blob(&mut buf, &[1, 2, 3]).unwrap();

        let mut reader = ProtocolReader::new(&buf[..]);
        assert_eq!(reader.read_int().await.unwrap(), 7);
        assert!(reader.read_bool().await.unwrap());
        assert_eq!(reader.read_long().await.unwrap(), -3);
        assert_eq!(reader.read_string().await.unwrap(), "provider");
        assert_eq!(&reader.read_blob().await.unwrap()[..], &[1, 2, 3]);
    }

    #[tokio::test]
    async fn test_any_nonzero_byte_is_true() {
        let data = [0x02u8, 0x00];
        let mut reader = ProtocolReader::new(&data[..]);
        assert!(reader.read_bool().await.unwrap());
        assert!(!reader.read_bool().await.unwrap());
    }

    #[tokio::test]
    async fn test_null_blob() {
        let mut buf = BytesMut::new();
        put_null(&mut buf);
        put_null(&mut buf);

        let mut reader = ProtocolReader::new(&buf[..]);
        assert!(reader.read_nullable_string().await.unwrap().is_none());
        let err = reader.read_blob().await.unwrap_err();
        assert!(err.to_string().contains("Unexpected NULL blob"));
    }

    #[tokio::test]
    async fn test_truncated_payload_is_connection_closed() {
        let mut buf = BytesMut::new();
        put_int(&mut buf, 10);
        buf.extend_from_slice(b"short");

        let mut reader = ProtocolReader::new(&buf[..]);
        let err = reader.read_blob().await.unwrap_err();
        assert!(matches!(err, WorkerError::ConnectionClosed));
    }

    #[tokio::test]
    async fn test_truncated_int_is_connection_closed() {
        let data = [0u8, 1];
        let mut reader = ProtocolReader::new(&data[..]);
        assert!(matches!(
            reader.read_int().await.unwrap_err(),
            WorkerError::ConnectionClosed
        ));
    }

    #[tokio::test]
    async fn test_large_claimed_length_without_payload() {
        let mut buf = BytesMut::new();
        put_int(&mut buf, DEFAULT_MAX_BLOB_SIZE as i32);
        buf.extend_from_slice(b"only a few bytes");

        let mut reader = ProtocolReader::new(&buf[..]);
        assert!(matches!(
            reader.read_blob().await.unwrap_err(),
            WorkerError::ConnectionClosed
        ));
    }

    #[tokio::test]
    async fn test_blob_over_limit() {
        let mut buf = BytesMut::new();
        put_blob(&mut buf, &[0u8; 32]).unwrap();

        let mut reader = ProtocolReader::with_max_blob(&buf[..], 16);
        let err = reader.read_blob().await.unwrap_err();
        assert!(err.to_string().contains("exceeds maximum 16"));
    }

    #[tokio::test]
    async fn test_end_of_data_section_as_length() {
        let mut buf = BytesMut::new();
        put_int(&mut buf, special_lengths::END_OF_DATA_SECTION);

        let mut reader = ProtocolReader::new(&buf[..]);
        assert!(matches!(
            reader.read_string().await.unwrap_err(),
            WorkerError::Protocol(_)
        ));
    }

    #[tokio::test]
    async fn test_invalid_utf8() {
        let mut buf = BytesMut::new();
        put_blob(&mut buf, &[0xFF, 0xFE]).unwrap();

        let mut reader = ProtocolReader::new(&buf[..]);
        assert!(matches!(
            reader.read_string().await.unwrap_err(),
            WorkerError::Utf8(_)
        ));
    }
}
