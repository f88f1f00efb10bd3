//! Command decoder for the create-data-source request.
//!
//! Request frames, strictly in this order:
//!
//! ```text
//! [class blob][provider string][has schema: bool][schema json string]?[option count: int][(key, value) string pairs]
//! ```
//!
//! The class reference and provider are checked as soon as they are read,
//! so a contract violation is reported before the rest of the request is
//! consumed.

use tokio::io::AsyncRead;
use tracing::debug;

use crate::error::{Result, WorkerError};
use crate::options::OptionsMap;
use crate::protocol::ProtocolReader;
use crate::schema::StructType;
use crate::source::{ClassReference, SourceRegistry, ValidatedSource};

/// A decoded and validated request.
pub struct CreateSourceCommand<'a> {
    /// The validated data source type.
    pub source: ValidatedSource<'a>,
    /// Provider name as sent by the host.
    pub provider: String,
    /// Schema supplied by the caller, if any.
    pub user_schema: Option<StructType>,
    /// Constructor options.
    pub options: OptionsMap,
}

/// Decodes requests against a registry.
pub struct CommandDecoder<'a> {
    registry: &'a SourceRegistry,
}

impl<'a> CommandDecoder<'a> {
    /// Create a decoder resolving class references in `registry`.
    pub fn new(registry: &'a SourceRegistry) -> Self {
        Self { registry }
    }

    /// Read and validate one request.
    pub async fn decode<R: AsyncRead + Unpin>(
        &self,
        reader: &mut ProtocolReader<R>,
    ) -> Result<CreateSourceCommand<'a>> {
        let class_blob = reader.read_nullable_blob().await?;
        let reference = ClassReference::decode(class_blob.as_deref())?;
        let source = self.registry.validate(&reference)?;
        debug!(path = source.path(), name = source.name(), "decoded class reference");

        let provider = reader.read_string().await?;
        if !source.matches_provider(&provider) {
            return Err(WorkerError::type_mismatch(
                format!("provider with name {}", source.name()),
                format!("'{}'", provider),
            ));
        }

        let user_schema = if reader.read_bool().await? {
            let json = reader.read_string().await?;
            Some(StructType::from_json(&json)?)
        } else {
            None
        };

        let options = read_options(reader).await?;
        debug!(
            provider = provider.as_str(),
            has_schema = user_schema.is_some(),
            options = options.len(),
            "decoded request"
        );

        Ok(CreateSourceCommand {
            source,
            provider,
            user_schema,
            options,
        })
    }
}

/// Read `[count: int]` followed by `count` key/value string pairs.
pub async fn read_options<R: AsyncRead + Unpin>(
    reader: &mut ProtocolReader<R>,
) -> Result<OptionsMap> {
    let count = reader.read_int().await?;
    if count < 0 {
        return Err(WorkerError::Protocol(format!(
            "Invalid option count {}",
            count
        )));
    }

    let mut options = OptionsMap::new();
    for _ in 0..count {
        let key = reader.read_string().await?;
        let value = reader.read_string().await?;
        options.insert(key, value);
    }
    Ok(options)
}
