//! CSV Worker - a data source worker launched by the host.
//!
//! This example demonstrates:
//! - Implementing `DataSource` for a plugin type
//! - Reading constructor options and deriving a schema from them
//! - Running the worker from the host-provided environment
//!
//! # Running
//!
//! The host starts the binary with `PYTHON_WORKER_FACTORY_SOCK_PATH` (or
//! `PYTHON_WORKER_FACTORY_PORT` and `PYTHON_WORKER_FACTORY_SECRET`) set, then
//! sends one request for class `demos.CsvSource` with provider `csv` and
//! options such as `{"path": "/data/people.csv", "columns": "name,age"}`.
//!
//! ```text
//! RUST_LOG=debug PYTHON_WORKER_FACTORY_SOCK_PATH=/tmp/host.sock \
//!     ./target/debug/examples/csv_worker
//! ```

use std::process::ExitCode;

use datasource_worker::options::OptionsMap;
use datasource_worker::schema::{DataType, SchemaSpec, StructField, StructType};
use datasource_worker::source::{DataSource, PluginError};
use datasource_worker::{Worker, WorkerConfig};
use serde::Serialize;

/// Reads a delimited text file.
#[derive(Serialize, Debug)]
struct CsvSource {
    path: String,
    separator: char,
    columns: Vec<String>,
}

impl DataSource for CsvSource {
    fn name() -> String {
        "csv".to_string()
    }

    fn new(options: OptionsMap) -> Result<Self, PluginError> {
        let path = options
            .get("path")
            .ok_or_else(|| PluginError::new("option 'path' is required"))?
            .to_string();

        let separator = match options.get("sep") {
            None => ',',
            Some(sep) => {
                let mut chars = sep.chars();
                match (chars.next(), chars.next()) {
                    (Some(c), None) => c,
                    _ => return Err(PluginError::new(format!("invalid separator '{}'", sep))),
                }
            }
        };

        let columns = options
            .get("columns")
            .map(|cols| {
                cols.split(',')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        Ok(CsvSource {
            path,
            separator,
            columns,
        })
    }

    fn schema(&self) -> Result<Option<SchemaSpec>, PluginError> {
        // Without declared columns every row is a single string value.
        if self.columns.is_empty() {
            return Ok(Some("value STRING".into()));
        }
        let fields = self
            .columns
            .iter()
            .map(|c| StructField::new(c.as_str(), DataType::String))
            .collect();
        Ok(Some(StructType::new(fields).into()))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    datasource_worker::logging::init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("invalid worker environment: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let mut worker = Worker::builder()
        .source::<CsvSource>("demos.CsvSource")
        .config(config)
        .build();

    match worker.run().await {
        Ok(outcome) => outcome.exit_code(),
        Err(e) => {
            tracing::error!("worker failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
