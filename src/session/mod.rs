//! Session setup: compatibility check and per-process resource staging.
//!
//! Every request is preceded by the same preamble: the host's runtime version,
//! then the staged files, then broadcast changes. The memory limit comes from
//! the environment rather than the wire and is applied between the two.

mod hooks;
mod staging;

pub use hooks::{ProcessHooks, SessionHooks};
pub use staging::{
    read_broadcast_staging, read_file_staging, BroadcastStaging, BroadcastUpdate,
    DecryptionServer, FileStaging,
};

use tokio::io::AsyncRead;
use tracing::debug;

use crate::error::{Result, WorkerError};
use crate::protocol::ProtocolReader;

/// Runtime version the host must announce, as `"<major>.<minor>"`.
pub fn runtime_version() -> String {
    format!(
        "{}.{}",
        env!("CARGO_PKG_VERSION_MAJOR"),
        env!("CARGO_PKG_VERSION_MINOR")
    )
}

/// Read the host's version string and compare it with [`runtime_version`].
pub async fn check_version<R: AsyncRead + Unpin>(reader: &mut ProtocolReader<R>) -> Result<()> {
    let host = reader.read_string().await?;
    let worker = runtime_version();
    if host != worker {
        return Err(WorkerError::VersionMismatch { host, worker });
    }
    debug!(version = worker.as_str(), "runtime version accepted");
    Ok(())
}

/// Apply the memory limit, then read and stage files and broadcasts.
pub async fn prepare<R, H>(
    reader: &mut ProtocolReader<R>,
    hooks: &mut H,
    memory_limit_mb: Option<u64>,
) -> Result<()>
where
    R: AsyncRead + Unpin,
    H: SessionHooks + ?Sized,
{
    if let Some(limit) = memory_limit_mb.filter(|mb| *mb > 0) {
        hooks.apply_memory_limit(limit)?;
    }

    let files = read_file_staging(reader).await?;
    hooks.stage_files(files)?;

    let broadcasts = read_broadcast_staging(reader).await?;
    hooks.stage_broadcasts(broadcasts)?;
    Ok(())
}
