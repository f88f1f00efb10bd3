//! Decoding of the file and broadcast staging sections.
//!
//! Files:
//! ```text
//! [root dir: string][include count: int][include path: string × count]
//! ```
//!
//! Broadcasts:
//! ```text
//! [count: int][needs decryption server: bool]([port: int][secret: string])?
//! ([id: long][path: string if id >= 0 and no decryption server]) × count
//! ```
//! A negative id `n` removes broadcast `-n - 1`.

use std::path::PathBuf;

use tokio::io::AsyncRead;

use crate::error::{Result, WorkerError};
use crate::protocol::ProtocolReader;

// Counts come from the host; entries beyond this are allocated as they arrive.
const PREALLOCATE_LIMIT: usize = 1024;

/// Files the host has staged for this process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStaging {
    /// Directory holding staged files.
    pub root_dir: PathBuf,
    /// Extra include paths to make visible to plugins.
    pub includes: Vec<PathBuf>,
}

/// Coordinates of the host's broadcast decryption server.
#[derive(Clone, PartialEq, Eq)]
pub struct DecryptionServer {
    /// Local port.
    pub port: u16,
    /// Authentication secret.
    pub secret: String,
}

impl std::fmt::Debug for DecryptionServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecryptionServer")
            .field("port", &self.port)
            .field("secret", &"<redacted>")
            .finish()
    }
}

/// One change to the set of live broadcast variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastUpdate {
    /// A broadcast became available.
    Add {
        /// Broadcast id.
        id: i64,
        /// Local file with its value; absent when served by the decryption server.
        path: Option<PathBuf>,
    },
    /// A broadcast was released.
    Remove {
        /// Broadcast id.
        id: i64,
    },
}

/// Broadcast changes sent before the request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BroadcastStaging {
    /// Present when broadcast values must be fetched from the decryption server.
    pub decryption_server: Option<DecryptionServer>,
    /// Changes in arrival order.
    pub updates: Vec<BroadcastUpdate>,
}

/// Read the file staging section.
pub async fn read_file_staging<R: AsyncRead + Unpin>(
    reader: &mut ProtocolReader<R>,
) -> Result<FileStaging> {
    let root_dir = PathBuf::from(reader.read_string().await?);
    let count = read_count(reader, "include").await?;
    let mut includes = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
    for _ in 0..count {
        includes.push(PathBuf::from(reader.read_string().await?));
    }
    Ok(FileStaging { root_dir, includes })
}

/// Read the broadcast staging section.
pub async fn read_broadcast_staging<R: AsyncRead + Unpin>(
    reader: &mut ProtocolReader<R>,
) -> Result<BroadcastStaging> {
    let count = read_count(reader, "broadcast").await?;

    let decryption_server = if reader.read_bool().await? {
        let port = reader.read_int().await?;
        let port = u16::try_from(port).map_err(|_| {
            WorkerError::Protocol(format!("Invalid decryption server port {}", port))
        })?;
        let secret = reader.read_string().await?;
        Some(DecryptionServer { port, secret })
    } else {
        None
    };

    let mut updates = Vec::with_capacity(count.min(PREALLOCATE_LIMIT));
    for _ in 0..count {
        let id = reader.read_long().await?;
        if id >= 0 {
            let path = if decryption_server.is_some() {
                None
            } else {
                Some(PathBuf::from(reader.read_string().await?))
            };
            updates.push(BroadcastUpdate::Add { id, path });
        } else {
            updates.push(BroadcastUpdate::Remove { id: -(id + 1) });
        }
    }

    Ok(BroadcastStaging {
        decryption_server,
        updates,
    })
}

async fn read_count<R: AsyncRead + Unpin>(
    reader: &mut ProtocolReader<R>,
    what: &str,
) -> Result<usize> {
    let count = reader.read_int().await?;
    usize::try_from(count)
        .map_err(|_| WorkerError::Protocol(format!("Invalid {} count {}", what, count)))
}
