//! Fault log and periodic state dumps.
//!
//! [`FaultLog`] records panics to `<dir>/<pid>` while a request is being
//! served and removes the file when dropped. [`DumpTimer`] logs a snapshot of
//! the worker's progress on the `diagnostics` target at a fixed interval until
//! it is disarmed.

use std::backtrace::Backtrace;
use std::fs::File;
use std::io::Write;
use std::panic::PanicHookInfo;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::Result;

/// Coarse progress of the current request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Stage {
    /// Nothing read yet.
    Idle = 0,
    /// Reading the session preamble.
    Setup = 1,
    /// Decoding the request.
    Decoding = 2,
    /// Running plugin code.
    Resolving = 3,
    /// Writing the response.
    Responding = 4,
    /// Waiting for the host's tail reply.
    Finishing = 5,
}

impl Stage {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Stage::Setup,
            2 => Stage::Decoding,
            3 => Stage::Resolving,
            4 => Stage::Responding,
            5 => Stage::Finishing,
            _ => Stage::Idle,
        }
    }

    /// Lowercase stage name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Idle => "idle",
            Stage::Setup => "setup",
            Stage::Decoding => "decoding",
            Stage::Resolving => "resolving",
            Stage::Responding => "responding",
            Stage::Finishing => "finishing",
        }
    }
}

/// Shared view of the current [`Stage`].
#[derive(Debug, Clone, Default)]
pub struct StageTracker {
    stage: Arc<AtomicU8>,
}

impl StageTracker {
    /// Create a tracker at [`Stage::Idle`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Move to `stage`.
    pub fn set(&self, stage: Stage) {
        self.stage.store(stage as u8, Ordering::Relaxed);
    }

    /// Current stage.
    pub fn get(&self) -> Stage {
        Stage::from_u8(self.stage.load(Ordering::Relaxed))
    }
}

type PanicHook = Box<dyn Fn(&PanicHookInfo<'_>) + Sync + Send + 'static>;

/// Panic log scoped to one request.
///
/// While armed, panics are appended to `<dir>/<pid>` together with a captured
/// backtrace, then forwarded to the previously installed hook. Dropping the
/// guard reinstalls that hook and removes the file.
pub struct FaultLog {
    path: PathBuf,
    previous: Arc<PanicHook>,
}

impl FaultLog {
    /// Create the log file under `dir` and install the panic hook.
    pub fn arm(dir: &Path) -> Result<Self> {
        let path = dir.join(std::process::id().to_string());
        let file = Arc::new(Mutex::new(File::create(&path)?));

        let previous: Arc<PanicHook> = Arc::new(std::panic::take_hook());
        let forward = Arc::clone(&previous);
        std::panic::set_hook(Box::new(move |info| {
            if let Ok(mut file) = file.lock() {
                let _ = writeln!(file, "{}", info);
                let _ = writeln!(file, "{}", Backtrace::force_capture());
                let _ = file.flush();
            }
            forward(info);
        }));

        debug!(path = %path.display(), "fault log armed");
        Ok(Self { path, previous })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FaultLog {
    fn drop(&mut self) {
        let previous = Arc::clone(&self.previous);
        drop(std::panic::take_hook());
        std::panic::set_hook(Box::new(move |info| previous(info)));

        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), "fault log not removed: {}", e);
        }
    }
}

/// Repeating state dump on a dedicated thread.
pub struct DumpTimer {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl DumpTimer {
    /// Start dumping every `interval`.
    pub fn arm(interval: Duration, tracker: StageTracker) -> Result<Self> {
        let (stop, stopped) = mpsc::channel::<()>();
        let started = Instant::now();
        let pid = std::process::id();

        let thread = std::thread::Builder::new()
            .name("dump-timer".to_string())
            .spawn(move || loop {
                match stopped.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        warn!(
                            target: "diagnostics",
                            pid,
                            stage = tracker.get().as_str(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "worker still running"
                        );
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            })?;

        Ok(Self {
            stop: Some(stop),
            thread: Some(thread),
        })
    }

    /// Stop dumping and wait for the thread to exit.
    pub fn disarm(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }

    /// Whether the timer is still running.
    pub fn is_armed(&self) -> bool {
        self.thread.is_some()
    }
}

impl Drop for DumpTimer {
    fn drop(&mut self) {
        self.disarm();
    }
}
