//! Pass-through hooks for per-process resource setup.
//!
//! The protocol only decodes what the host sends; applying it to the process
//! is delegated to a [`SessionHooks`] implementation. [`ProcessHooks`] is the
//! default.

use std::collections::BTreeMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::staging::{BroadcastStaging, BroadcastUpdate, FileStaging};
use crate::error::Result;

/// Receives the session's resource setup.
pub trait SessionHooks {
    /// Cap the process address space, in megabytes. Only called for limits > 0.
    fn apply_memory_limit(&mut self, limit_mb: u64) -> Result<()> {
        debug!(limit_mb, "memory limit requested");
        Ok(())
    }

    /// Accept the host's staged files.
    fn stage_files(&mut self, files: FileStaging) -> Result<()> {
        debug!(root = %files.root_dir.display(), includes = files.includes.len(), "files staged");
        Ok(())
    }

    /// Accept broadcast changes.
    fn stage_broadcasts(&mut self, broadcasts: BroadcastStaging) -> Result<()> {
        debug!(updates = broadcasts.updates.len(), "broadcasts staged");
        Ok(())
    }
}

/// Default hooks: enforce the memory limit and track staged resources.
#[derive(Debug, Default)]
pub struct ProcessHooks {
    files: Option<FileStaging>,
    broadcasts: BTreeMap<i64, Option<PathBuf>>,
}

impl ProcessHooks {
    /// Create hooks with nothing staged.
    pub fn new() -> Self {
        Self::default()
    }

    /// Files staged by the last session.
    pub fn files(&self) -> Option<&FileStaging> {
        self.files.as_ref()
    }

    /// Live broadcasts by id.
    pub fn broadcasts(&self) -> &BTreeMap<i64, Option<PathBuf>> {
        &self.broadcasts
    }
}

impl SessionHooks for ProcessHooks {
    fn apply_memory_limit(&mut self, limit_mb: u64) -> Result<()> {
        set_address_space_limit(limit_mb.saturating_mul(1024 * 1024))
    }

    fn stage_files(&mut self, files: FileStaging) -> Result<()> {
        info!(root = %files.root_dir.display(), includes = files.includes.len(), "files staged");
        self.files = Some(files);
        Ok(())
    }

    fn stage_broadcasts(&mut self, broadcasts: BroadcastStaging) -> Result<()> {
        if let Some(server) = &broadcasts.decryption_server {
            debug!(port = server.port, "broadcast values served by decryption server");
        }
        for update in broadcasts.updates {
            match update {
                BroadcastUpdate::Add { id, path } => {
                    self.broadcasts.insert(id, path);
                }
                BroadcastUpdate::Remove { id } => {
                    if self.broadcasts.remove(&id).is_none() {
                        warn!(id, "removal of unknown broadcast");
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(target_os = "linux")]
fn set_address_space_limit(limit_bytes: u64) -> Result<()> {
    use nix::libc::RLIM_INFINITY;
    use nix::sys::resource::{getrlimit, setrlimit, Resource};

    let (soft, _hard) = getrlimit(Resource::RLIMIT_AS).map_err(std::io::Error::from)?;
    if soft == RLIM_INFINITY || limit_bytes < soft {
        setrlimit(Resource::RLIMIT_AS, limit_bytes, limit_bytes).map_err(std::io::Error::from)?;
        info!(limit_bytes, "address space limit applied");
    } else {
        debug!(limit_bytes, soft, "address space already below requested limit");
    }
    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn set_address_space_limit(limit_bytes: u64) -> Result<()> {
    warn!(limit_bytes, "memory limits are not supported on this platform");
    Ok(())
}
