//! The capability contract every data source implements.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::Serialize;

use crate::codec::MsgPackCodec;
use crate::error::{Result, WorkerError};
use crate::options::OptionsMap;
use crate::schema::SchemaSpec;

/// Error raised by data source code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PluginError {
    message: String,
}

impl PluginError {
    /// Create an error with a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Error for an optional capability the source does not provide.
    pub fn not_implemented(capability: &str) -> Self {
        Self::new(format!("Data source does not implement '{}()'", capability))
    }

    /// The error message.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A pluggable data source.
///
/// The name is a type-level accessor: the worker checks it against the
/// provider the host asked for before anything is constructed.
///
/// # Example
///
/// ```
/// use datasource_worker::options::OptionsMap;
/// use datasource_worker::schema::SchemaSpec;
/// use datasource_worker::source::{DataSource, PluginError};
/// use serde::Serialize;
///
/// #[derive(Serialize)]
/// struct Numbers {
///     count: u32,
/// }
///
/// impl DataSource for Numbers {
///     fn name() -> String {
///         "numbers".to_string()
///     }
///
///     fn new(options: OptionsMap) -> Result<Self, PluginError> {
///         let count = options
///             .get("count")
///             .unwrap_or("10")
///             .parse()
///             .map_err(|e| PluginError::new(format!("bad count: {e}")))?;
///         Ok(Self { count })
///     }
///
///     fn schema(&self) -> Result<Option<SchemaSpec>, PluginError> {
///         Ok(Some("n INT".into()))
///     }
/// }
/// ```
pub trait DataSource: Serialize + Send + Sized + 'static {
    /// Declared provider name. Defaults to the type's short name.
    fn name() -> String {
        short_type_name::<Self>().to_string()
    }

    /// Build an instance from the request options.
    fn new(options: OptionsMap) -> std::result::Result<Self, PluginError>;

    /// The source's own schema, used when the host supplies none.
    fn schema(&self) -> std::result::Result<Option<SchemaSpec>, PluginError> {
        Err(PluginError::not_implemented("schema"))
    }
}

/// An instantiated data source, with its concrete type erased.
pub trait SourceInstance: Send {
    /// Invoke the schema accessor.
    fn schema(&self) -> Result<Option<SchemaSpec>>;

    /// Serialize the instance for the host.
    fn encode(&self) -> Result<Vec<u8>>;

    /// Short type name, for logs.
    fn type_name(&self) -> &'static str;
}

impl<T: DataSource> SourceInstance for T {
    fn schema(&self) -> Result<Option<SchemaSpec>> {
        Ok(guard_plugin("schema", || DataSource::schema(self))??)
    }

    fn encode(&self) -> Result<Vec<u8>> {
        guard_plugin("serialize", || MsgPackCodec::encode(self))?
    }

    fn type_name(&self) -> &'static str {
        short_type_name::<T>()
    }
}

/// Run plugin code, turning a panic into a [`PluginError`].
pub(crate) fn guard_plugin<T>(call: &str, f: impl FnOnce() -> T) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        WorkerError::Plugin(PluginError::new(format!(
            "Data source panicked in {}: {}",
            call,
            panic_message(payload.as_ref())
        )))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        *s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}
