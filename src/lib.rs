//! # datasource-worker
//!
//! Worker-side handler for the host's create-data-source request.
//!
//! A host orchestrator launches the worker, connects to it, and asks it to
//! instantiate a user-defined data source from a class reference, a provider
//! name, an optional schema and a string options map. The worker validates
//! the reference, builds the instance, settles its schema and sends back the
//! serialized instance together with the schema.
//!
//! ## Protocol
//!
//! - Big-endian ints and longs, one-byte bools, length-prefixed blobs
//! - Reserved negative lengths for control signals (`END_OF_STREAM`, `NULL`, ...)
//! - A single structured error envelope in place of the response on failure
//!
//! ## Example
//!
//! ```no_run
//! use datasource_worker::options::OptionsMap;
//! use datasource_worker::schema::SchemaSpec;
//! use datasource_worker::source::{DataSource, PluginError};
//! use datasource_worker::{Worker, WorkerConfig};
//! use serde::Serialize;
//!
//! #[derive(Serialize)]
//! struct Numbers {
//!     limit: u64,
//! }
//!
//! impl DataSource for Numbers {
//!     fn name() -> String {
//!         "numbers".to_string()
//!     }
//!
//!     fn new(options: OptionsMap) -> Result<Self, PluginError> {
//!         let limit = options
//!             .get("limit")
//!             .unwrap_or("10")
//!             .parse()
//!             .map_err(|e| PluginError::new(format!("invalid limit: {}", e)))?;
//!         Ok(Numbers { limit })
//!     }
//!
//!     fn schema(&self) -> Result<Option<SchemaSpec>, PluginError> {
//!         Ok(Some("value BIGINT".into()))
//!     }
//! }
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), datasource_worker::WorkerError> {
//!     datasource_worker::logging::init();
//!     let mut worker = Worker::builder()
//!         .source::<Numbers>("demos.Numbers")
//!         .config(WorkerConfig::from_env()?)
//!         .build();
//!     let outcome = worker.run().await?;
//!     std::process::exit(i32::from(outcome.code()));
//! }
//! ```

pub mod accumulators;
pub mod codec;
pub mod command;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod logging;
pub mod options;
pub mod protocol;
pub mod resolver;
pub mod response;
pub mod schema;
pub mod session;
pub mod source;
pub mod transport;

mod worker;

pub use accumulators::Accumulators;
pub use config::{ConnectionInfo, WorkerConfig};
pub use error::{ErrorKind, Result, WorkerError};
pub use worker::{Outcome, Worker, WorkerBuilder, FAILURE_EXIT_CODE};
