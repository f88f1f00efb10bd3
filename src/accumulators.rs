//! Accumulator updates reported back to the host.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::io::AsyncWrite;
use tracing::debug;

use crate::codec::MsgPackCodec;
use crate::error::Result;
use crate::protocol::ProtocolWriter;

/// Shared registry of `(id, value)` accumulator updates.
///
/// Clones share the same registry, so plugins can hold a handle while the
/// worker flushes it after the response.
#[derive(Debug, Clone, Default)]
pub struct Accumulators {
    updates: Arc<Mutex<Vec<(i64, serde_json::Value)>>>,
}

impl Accumulators {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an update for accumulator `id`.
    pub fn add(&self, id: i64, value: impl Into<serde_json::Value>) {
        self.lock().push((id, value.into()));
    }

    /// Drop all pending updates.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Number of pending updates.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether there are no pending updates.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Queue `[count: int]` and one MsgPack `(id, value)` blob per update,
    /// draining the registry.
    pub fn flush_into<W: AsyncWrite + Unpin>(&self, writer: &mut ProtocolWriter<W>) -> Result<()> {
        let updates = std::mem::take(&mut *self.lock());
        let count = i32::try_from(updates.len()).unwrap_or(i32::MAX);
        writer.write_int(count);
        for update in updates.iter().take(count as usize) {
            writer.write_blob(&MsgPackCodec::encode(update)?)?;
        }
        debug!(count, "accumulator updates queued");
        Ok(())
    }

    // A panicking plugin can poison the lock; the data is still usable.
    fn lock(&self) -> MutexGuard<'_, Vec<(i64, serde_json::Value)>> {
        self.updates
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
