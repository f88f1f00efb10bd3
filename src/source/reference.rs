//! Class references sent by the host.

use serde::{Deserialize, Serialize};

use crate::codec::MsgPackCodec;
use crate::error::Result;

/// What the host claims is a data source type.
///
/// Encoded as a MsgPack map tagged by `kind`:
/// `{"kind": "type", "path": "demos.CsvSource"}` or
/// `{"kind": "value", "type_name": "int"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ClassReference {
    /// A type, addressed by its registered path.
    Type {
        /// Registry path.
        path: String,
    },
    /// Something that is not a type.
    Value {
        /// Name of the value's own type.
        type_name: String,
    },
}

impl ClassReference {
    /// Reference to a registered type.
    pub fn of_type(path: impl Into<String>) -> Self {
        ClassReference::Type { path: path.into() }
    }

    /// Reference to a non-type value.
    pub fn of_value(type_name: impl Into<String>) -> Self {
        ClassReference::Value {
            type_name: type_name.into(),
        }
    }

    /// Decode a class blob; a NULL blob is a value of type `null`.
    pub fn decode(blob: Option<&[u8]>) -> Result<Self> {
        match blob {
            Some(bytes) => MsgPackCodec::decode(bytes),
            None => Ok(Self::of_value("null")),
        }
    }

    /// Encode as a class blob.
    pub fn encode(&self) -> Result<Vec<u8>> {
        MsgPackCodec::encode(self)
    }
}
