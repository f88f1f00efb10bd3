//! Worker configuration read from the environment set up by the host.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{Result, WorkerError};
use crate::protocol::DEFAULT_MAX_BLOB_SIZE;

/// Unix socket path of the host's worker factory.
pub const ENV_SOCKET_PATH: &str = "PYTHON_WORKER_FACTORY_SOCK_PATH";
/// TCP port of the host's worker factory on 127.0.0.1.
pub const ENV_PORT: &str = "PYTHON_WORKER_FACTORY_PORT";
/// Shared secret for TCP connections.
pub const ENV_SECRET: &str = "PYTHON_WORKER_FACTORY_SECRET";
/// Connect and handshake timeout, in seconds.
pub const ENV_AUTH_TIMEOUT: &str = "SPARK_AUTH_SOCKET_TIMEOUT";
/// Read buffer size, in bytes.
pub const ENV_BUFFER_SIZE: &str = "SPARK_BUFFER_SIZE";
/// Directory for the per-process fault log.
pub const ENV_FAULT_DIR: &str = "PYTHON_FAULTHANDLER_DIR";
/// Interval of periodic state dumps, in seconds.
pub const ENV_DUMP_INTERVAL: &str = "PYTHON_TRACEBACK_DUMP_INTERVAL_SECONDS";
/// Address space limit, in megabytes.
pub const ENV_MEMORY_LIMIT: &str = "PYSPARK_PLANNER_MEMORY_MB";

/// Default connect and handshake timeout.
pub const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(15);
/// Default read buffer size.
pub const DEFAULT_BUFFER_SIZE: usize = 65536;

/// Where the host is listening.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionInfo {
    /// Unix domain socket; no authentication.
    Socket(PathBuf),
    /// TCP port on the loopback interface.
    Port(u16),
}

/// Settings for one worker process.
#[derive(Clone, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Host endpoint; required by [`crate::Worker::run`].
    pub connection: Option<ConnectionInfo>,
    /// Secret sent during the TCP handshake.
    pub auth_secret: Option<String>,
    /// Bound on connect plus handshake.
    pub auth_timeout: Duration,
    /// Read buffer size.
    pub buffer_size: usize,
    /// Fault log directory.
    pub diagnostics_dir: Option<PathBuf>,
    /// Interval of periodic dumps.
    pub dump_interval: Option<Duration>,
    /// Address space limit in megabytes.
    pub memory_limit_mb: Option<u64>,
    /// Largest accepted blob.
    pub max_blob_len: usize,
}

impl std::fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("connection", &self.connection)
            .field("auth_secret", &self.auth_secret.as_ref().map(|_| "<redacted>"))
            .field("auth_timeout", &self.auth_timeout)
            .field("buffer_size", &self.buffer_size)
            .field("diagnostics_dir", &self.diagnostics_dir)
            .field("dump_interval", &self.dump_interval)
            .field("memory_limit_mb", &self.memory_limit_mb)
            .field("max_blob_len", &self.max_blob_len)
            .finish()
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            connection: None,
            auth_secret: None,
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            buffer_size: DEFAULT_BUFFER_SIZE,
            diagnostics_dir: None,
            dump_interval: None,
            memory_limit_mb: None,
            max_blob_len: DEFAULT_MAX_BLOB_SIZE,
        }
    }
}

impl WorkerConfig {
    /// Read the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through `lookup`.
    ///
    /// Empty values count as unset. Non-positive ports, intervals and memory
    /// limits disable the corresponding feature.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let connection = match get(ENV_SOCKET_PATH) {
            Some(path) => Some(ConnectionInfo::Socket(PathBuf::from(path))),
            None => match parse::<i64>(ENV_PORT, get(ENV_PORT))? {
                Some(port) if port > 0 => {
                    let port = u16::try_from(port).map_err(|_| {
                        WorkerError::Config(format!("{} out of range: {}", ENV_PORT, port))
                    })?;
                    Some(ConnectionInfo::Port(port))
                }
                _ => None,
            },
        };

        let auth_timeout = parse::<u64>(ENV_AUTH_TIMEOUT, get(ENV_AUTH_TIMEOUT))?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_AUTH_TIMEOUT);

        let buffer_size = match parse::<usize>(ENV_BUFFER_SIZE, get(ENV_BUFFER_SIZE))? {
            Some(0) => {
                return Err(WorkerError::Config(format!(
                    "{} must be positive",
                    ENV_BUFFER_SIZE
                )))
            }
            Some(size) => size,
            None => DEFAULT_BUFFER_SIZE,
        };

        let dump_interval = parse::<i64>(ENV_DUMP_INTERVAL, get(ENV_DUMP_INTERVAL))?
            .filter(|secs| *secs > 0)
            .map(|secs| Duration::from_secs(secs as u64));

        let memory_limit_mb = parse::<i64>(ENV_MEMORY_LIMIT, get(ENV_MEMORY_LIMIT))?
            .filter(|mb| *mb > 0)
            .map(|mb| mb as u64);

        Ok(Self {
            connection,
            auth_secret: get(ENV_SECRET),
            auth_timeout,
            buffer_size,
            diagnostics_dir: get(ENV_FAULT_DIR).map(PathBuf::from),
            dump_interval,
            memory_limit_mb,
            max_blob_len: DEFAULT_MAX_BLOB_SIZE,
        })
    }
}

fn parse<T: FromStr>(key: &str, value: Option<String>) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    value
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|e| WorkerError::Config(format!("invalid {} '{}': {}", key, raw, e)))
        })
        .transpose()
}
