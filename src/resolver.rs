//! Source resolver: instantiate the plugin and settle its schema.

use tracing::debug;

use crate::command::CreateSourceCommand;
use crate::error::{Result, WorkerError};
use crate::schema::SchemaSpec;
use crate::source::SourceInstance;

/// An instantiated data source and its effective schema.
pub struct ResolvedSource {
    /// The plugin instance.
    pub instance: Box<dyn SourceInstance>,
    /// Effective schema.
    pub schema: SchemaSpec,
}

/// Instantiate the source and determine its schema.
///
/// A caller-supplied schema always wins; the instance's schema accessor is
/// only consulted when there is none. An accessor returning no schema is an
/// assertion failure.
pub fn resolve(command: CreateSourceCommand<'_>) -> Result<ResolvedSource> {
    let CreateSourceCommand {
        source,
        user_schema,
        options,
        ..
    } = command;

    let instance = source.instantiate(options)?;

    let schema = match user_schema {
        Some(schema) => SchemaSpec::Struct(schema),
        None => instance.schema()?.ok_or_else(|| {
            WorkerError::Assertion(format!(
                "data source '{}' resolved to no schema",
                source.name()
            ))
        })?,
    };

    debug!(
        source = instance.type_name(),
        ddl = schema.is_ddl(),
        "resolved data source"
    );

    Ok(ResolvedSource { instance, schema })
}
