//! Worker builder and request lifecycle.
//!
//! The [`WorkerBuilder`] registers data source types and configures the
//! worker. A [`Worker`] then serves exactly one request:
//! 1. Session setup (fault log, version check, dump timer, staging)
//! 2. Decode and validate the create-data-source request
//! 3. Instantiate the source and resolve its schema
//! 4. Write the response, or a single error envelope on any failure
//! 5. Flush accumulator updates and read the host's tail reply
//!
//! # Example
//!
//! ```ignore
//! use datasource_worker::{Worker, WorkerConfig};
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> std::process::ExitCode {
//!     datasource_worker::logging::init();
//!     let config = WorkerConfig::from_env()?;
//!     let mut worker = Worker::builder()
//!         .source::<CsvSource>("demos.CsvSource")
//!         .config(config)
//!         .build();
//!
//!     match worker.run().await {
//!         Ok(outcome) => outcome.exit_code(),
//!         Err(_) => std::process::ExitCode::FAILURE,
//!     }
//! }
//! ```

use std::process::ExitCode;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};
use tracing::{error, info, warn};

use crate::accumulators::Accumulators;
use crate::command::CommandDecoder;
use crate::config::WorkerConfig;
use crate::diagnostics::{DumpTimer, FaultLog, Stage, StageTracker};
use crate::error::{ErrorKind, Result, WorkerError};
use crate::protocol::{special_lengths, ErrorEnvelope, ProtocolReader, ProtocolWriter, INT_SIZE};
use crate::resolver::resolve;
use crate::response::encode_response;
use crate::session::{self, ProcessHooks, SessionHooks};
use crate::source::{DataSource, SourceFactory, SourceRegistry};
use crate::transport::connect_and_auth;

/// Exit status reported for anything but a clean reuse.
pub const FAILURE_EXIT_CODE: u8 = 255;

/// How a request cycle ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Response delivered and the host will reuse this process.
    Reuse,
    /// Response delivered but the host asked to discard this process.
    Discard,
    /// An error envelope was sent in place of the response.
    Failed(ErrorKind),
}

impl Outcome {
    /// Numeric exit status: 0 for [`Outcome::Reuse`], 255 otherwise.
    pub fn code(&self) -> u8 {
        match self {
            Outcome::Reuse => 0,
            Outcome::Discard | Outcome::Failed(_) => FAILURE_EXIT_CODE,
        }
    }

    /// Process exit code for this outcome.
    pub fn exit_code(&self) -> ExitCode {
        ExitCode::from(self.code())
    }
}

/// Builder for configuring and creating a [`Worker`].
pub struct WorkerBuilder<H = ProcessHooks> {
    registry: SourceRegistry,
    hooks: H,
    config: WorkerConfig,
    accumulators: Accumulators,
}

impl WorkerBuilder<ProcessHooks> {
    /// Create a builder with default configuration and [`ProcessHooks`].
    pub fn new() -> Self {
        Self {
            registry: SourceRegistry::new(),
            hooks: ProcessHooks::new(),
            config: WorkerConfig::default(),
            accumulators: Accumulators::new(),
        }
    }
}

impl Default for WorkerBuilder<ProcessHooks> {
    fn default() -> Self {
        Self::new()
    }
}

impl<H: SessionHooks> WorkerBuilder<H> {
    /// Register a data source type under `path`.
    pub fn source<T: DataSource>(mut self, path: &str) -> Self {
        self.registry.register::<T>(path);
        self
    }

    /// Register a custom factory under `path`.
    pub fn factory<F: SourceFactory>(mut self, path: &str, factory: F) -> Self {
        self.registry.register_factory(path, factory);
        self
    }

    /// Replace the session hooks.
    pub fn hooks<H2: SessionHooks>(self, hooks: H2) -> WorkerBuilder<H2> {
        WorkerBuilder {
            registry: self.registry,
            hooks,
            config: self.config,
            accumulators: self.accumulators,
        }
    }

    /// Replace the configuration.
    pub fn config(mut self, config: WorkerConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the largest accepted blob.
    ///
    /// Default: 1 GiB
    pub fn max_blob_len(mut self, max: usize) -> Self {
        self.config.max_blob_len = max;
        self
    }

    /// Accumulator registry flushed after the response.
    ///
    /// Clone it into factories that report accumulator updates.
    pub fn accumulators(&self) -> Accumulators {
        self.accumulators.clone()
    }

    /// Build the worker.
    pub fn build(self) -> Worker<H> {
        Worker {
            registry: self.registry,
            hooks: self.hooks,
            config: self.config,
            accumulators: self.accumulators,
            stage: StageTracker::new(),
        }
    }
}

/// A configured worker.
pub struct Worker<H = ProcessHooks> {
    registry: SourceRegistry,
    hooks: H,
    config: WorkerConfig,
    accumulators: Accumulators,
    stage: StageTracker,
}

impl Worker<ProcessHooks> {
    /// Create a new worker builder.
    pub fn builder() -> WorkerBuilder<ProcessHooks> {
        WorkerBuilder::new()
    }
}

impl<H: SessionHooks> Worker<H> {
    /// The session hooks.
    pub fn hooks(&self) -> &H {
        &self.hooks
    }

    /// The configuration.
    pub fn config(&self) -> &WorkerConfig {
        &self.config
    }

    /// Shared accumulator registry.
    pub fn accumulators(&self) -> Accumulators {
        self.accumulators.clone()
    }

    /// Current stage of the request being served.
    pub fn stage(&self) -> Stage {
        self.stage.get()
    }

    /// Connect to the host from the configuration, announce the pid and
    /// serve one request.
    pub async fn run(&mut self) -> Result<Outcome> {
        let info = self.config.connection.clone().ok_or_else(|| {
            WorkerError::Config("no host socket path or port configured".to_string())
        })?;
        let stream = connect_and_auth(
            &info,
            self.config.auth_secret.as_deref(),
            self.config.auth_timeout,
        )
        .await?;

        let (read_half, write_half) = tokio::io::split(stream);
        let reader = BufReader::with_capacity(self.config.buffer_size, read_half);

        let mut announce = ProtocolWriter::with_capacity(write_half, INT_SIZE);
        announce.write_int(std::process::id() as i32);
        announce.flush().await?;

        self.serve(reader, announce.into_inner()).await
    }

    /// Serve one request over an established connection.
    ///
    /// Every failure before the response is written becomes a single error
    /// envelope and [`Outcome::Failed`]. Transport failures after that point
    /// are returned as `Err`.
    pub async fn serve<R, W>(&mut self, reader: R, writer: W) -> Result<Outcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut reader = ProtocolReader::with_max_blob(reader, self.config.max_blob_len);
        let mut writer = ProtocolWriter::new(writer);
        let mut timer = None;

        let outcome = match self.handle_request(&mut reader, &mut timer).await {
            Ok(response) => {
                writer.write_encoded(response.freeze());
                self.finish(&mut reader, &mut writer).await?
            }
            Err(err) => {
                error!(kind = %err.kind(), "request failed: {}", err);
                writer.discard_pending();
                let envelope = ErrorEnvelope::from_error(&err).encode()?;
                writer.write_encoded(envelope.freeze());
                writer.flush().await?;
                Outcome::Failed(err.kind())
            }
        };

        if let Some(mut timer) = timer.take() {
            timer.disarm();
        }
        self.stage.set(Stage::Idle);
        Ok(outcome)
    }

    /// Session setup through response encoding. The fault log stays armed
    /// for exactly this span.
    async fn handle_request<R: AsyncRead + Unpin>(
        &mut self,
        reader: &mut ProtocolReader<R>,
        timer: &mut Option<DumpTimer>,
    ) -> Result<BytesMut> {
        let _fault_log = self
            .config
            .diagnostics_dir
            .as_deref()
            .map(FaultLog::arm)
            .transpose()?;

        self.stage.set(Stage::Setup);
        session::check_version(reader).await?;

        if let Some(interval) = self.config.dump_interval {
            *timer = Some(DumpTimer::arm(interval, self.stage.clone())?);
        }

        session::prepare(reader, &mut self.hooks, self.config.memory_limit_mb).await?;
        self.accumulators.clear();

        self.stage.set(Stage::Decoding);
        let command = CommandDecoder::new(&self.registry).decode(reader).await?;
        info!(
            source = command.source.path(),
            provider = command.provider.as_str(),
            "creating data source"
        );

        self.stage.set(Stage::Resolving);
        let resolved = resolve(command)?;

        self.stage.set(Stage::Responding);
        encode_response(&resolved)
    }

    /// Flush the response and accumulators, then answer the tail reply.
    async fn finish<R, W>(
        &mut self,
        reader: &mut ProtocolReader<R>,
        writer: &mut ProtocolWriter<W>,
    ) -> Result<Outcome>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        self.accumulators.flush_into(writer)?;
        writer.flush().await?;

        self.stage.set(Stage::Finishing);
        let tail = reader.read_int().await?;
        let outcome = if tail == special_lengths::END_OF_STREAM {
            writer.write_int(special_lengths::END_OF_STREAM);
            info!("host will reuse worker");
            Outcome::Reuse
        } else {
            warn!(
                tail,
                sentinel = special_lengths::name(tail).unwrap_or("none"),
                "host did not end the stream, discarding worker"
            );
            writer.write_int(special_lengths::END_OF_DATA_SECTION);
            Outcome::Discard
        };
        writer.flush().await?;
        Ok(outcome)
    }
}
