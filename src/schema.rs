//! Column schema model and its canonical JSON encoding.
//!
//! The JSON form matches the host's schema exchange format: atomic types are
//! bare strings (`"integer"`, `"decimal(10,2)"`), complex types are objects
//! tagged by `"type"`, and keys are emitted in sorted order with no
//! whitespace.
//!
//! # Example
//!
//! ```
//! use datasource_worker::schema::{DataType, StructField, StructType};
//!
//! let schema = StructType::new(vec![StructField::new("col", DataType::Integer)]);
//! assert_eq!(
//!     schema.to_json().unwrap(),
//!     r#"{"fields":[{"metadata":{},"name":"col","nullable":true,"type":"integer"}],"type":"struct"}"#
//! );
//! ```

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{Result, WorkerError};

/// A column data type.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(try_from = "DataTypeRepr")]
pub enum DataType {
    /// `null`
    Null,
    /// `boolean`
    Boolean,
    /// `byte`
    Byte,
    /// `short`
    Short,
    /// `integer`
    Integer,
    /// `long`
    Long,
    /// `float`
    Float,
    /// `double`
    Double,
    /// `string`
    String,
    /// `binary`
    Binary,
    /// `date`
    Date,
    /// `timestamp`
    Timestamp,
    /// `timestamp_ntz`
    TimestampNtz,
    /// `char(length)`
    Char(u32),
    /// `varchar(length)`
    Varchar(u32),
    /// `interval`, the calendar interval.
    CalendarInterval,
    /// `interval <start>[ to <end>]`, either year-month or day-time.
    Interval {
        /// Leading field.
        start: IntervalField,
        /// Trailing field; equal to `start` for single-field intervals.
        end: IntervalField,
    },
    /// `decimal(precision,scale)`
    Decimal {
        /// Total digits.
        precision: u8,
        /// Digits after the point.
        scale: u8,
    },
    /// Array of elements.
    Array {
        /// Element type.
        element_type: Box<DataType>,
        /// Whether elements may be null.
        contains_null: bool,
    },
    /// Key/value map.
    Map {
        /// Key type.
        key_type: Box<DataType>,
        /// Value type.
        value_type: Box<DataType>,
        /// Whether values may be null.
        value_contains_null: bool,
    },
    /// Nested struct.
    Struct(StructType),
}

impl DataType {
    /// Short type name as used in diagnostics (`"integer"`, `"struct"`, ...).
    pub fn type_name(&self) -> String {
        match self {
            DataType::Null => "null".to_string(),
            DataType::Boolean => "boolean".to_string(),
            DataType::Byte => "byte".to_string(),
            DataType::Short => "short".to_string(),
            DataType::Integer => "integer".to_string(),
            DataType::Long => "long".to_string(),
            DataType::Float => "float".to_string(),
            DataType::Double => "double".to_string(),
            DataType::String => "string".to_string(),
            DataType::Binary => "binary".to_string(),
            DataType::Date => "date".to_string(),
            DataType::Timestamp => "timestamp".to_string(),
            DataType::TimestampNtz => "timestamp_ntz".to_string(),
            DataType::Char(length) => format!("char({})", length),
            DataType::Varchar(length) => format!("varchar({})", length),
            DataType::CalendarInterval => "interval".to_string(),
            DataType::Interval { start, end } if start == end => {
                format!("interval {}", start.as_str())
            }
            DataType::Interval { start, end } => {
                format!("interval {} to {}", start.as_str(), end.as_str())
            }
            DataType::Decimal { precision, scale } => format!("decimal({},{})", precision, scale),
            DataType::Array { .. } => "array".to_string(),
            DataType::Map { .. } => "map".to_string(),
            DataType::Struct(_) => "struct".to_string(),
        }
    }

    /// Parse a data type from its JSON encoding.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Encode as canonical JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    fn parse_atomic(name: &str) -> Option<Self> {
        let parsed = match name {
            "null" | "void" => DataType::Null,
            "boolean" => DataType::Boolean,
            "byte" => DataType::Byte,
            "short" => DataType::Short,
            "integer" => DataType::Integer,
            "long" => DataType::Long,
            "float" => DataType::Float,
            "double" => DataType::Double,
            "string" => DataType::String,
            "binary" => DataType::Binary,
            "date" => DataType::Date,
            "timestamp" => DataType::Timestamp,
            "timestamp_ntz" => DataType::TimestampNtz,
            "interval" => DataType::CalendarInterval,
            "decimal" => DataType::Decimal {
                precision: 10,
                scale: 0,
            },
            other => {
                return parse_decimal(other)
                    .or_else(|| parse_char(other))
                    .or_else(|| parse_interval(other))
            }
        };
        Some(parsed)
    }
}

/// A field of a year-month or day-time interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum IntervalField {
    /// `year`
    Year,
    /// `month`
    Month,
    /// `day`
    Day,
    /// `hour`
    Hour,
    /// `minute`
    Minute,
    /// `second`
    Second,
}

impl IntervalField {
    /// Lowercase field name.
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalField::Year => "year",
            IntervalField::Month => "month",
            IntervalField::Day => "day",
            IntervalField::Hour => "hour",
            IntervalField::Minute => "minute",
            IntervalField::Second => "second",
        }
    }

    fn parse(name: &str) -> Option<Self> {
        match name {
            "year" => Some(IntervalField::Year),
            "month" => Some(IntervalField::Month),
            "day" => Some(IntervalField::Day),
            "hour" => Some(IntervalField::Hour),
            "minute" => Some(IntervalField::Minute),
            "second" => Some(IntervalField::Second),
            _ => None,
        }
    }

    fn is_year_month(&self) -> bool {
        matches!(self, IntervalField::Year | IntervalField::Month)
    }
}

fn parse_char(name: &str) -> Option<DataType> {
    if let Some(length) = name.strip_prefix("varchar(").and_then(|r| r.strip_suffix(')')) {
        return length.trim().parse().ok().map(DataType::Varchar);
    }
    let length = name.strip_prefix("char(")?.strip_suffix(')')?;
    length.trim().parse().ok().map(DataType::Char)
}

fn parse_interval(name: &str) -> Option<DataType> {
    let fields = name.strip_prefix("interval ")?;
    let (start, end) = match fields.split_once(" to ") {
        Some((start, end)) => (IntervalField::parse(start)?, IntervalField::parse(end)?),
        None => {
            let field = IntervalField::parse(fields)?;
            (field, field)
        }
    };
    // Year-month and day-time fields do not mix.
    if start > end || start.is_year_month() != end.is_year_month() {
        return None;
    }
    Some(DataType::Interval { start, end })
}

fn parse_decimal(name: &str) -> Option<DataType> {
    let args = name.strip_prefix("decimal(")?.strip_suffix(')')?;
    let (precision, scale) = args.split_once(',')?;
    Some(DataType::Decimal {
        precision: precision.trim().parse().ok()?,
        scale: scale.trim().parse().ok()?,
    })
}

impl Serialize for DataType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        // Keys in sorted order.
        match self {
            DataType::Array {
                element_type,
                contains_null,
            } => {
                let mut map = serializer.serialize_map(Some(3))?;
                map.serialize_entry("containsNull", contains_null)?;
                map.serialize_entry("elementType", element_type)?;
                map.serialize_entry("type", "array")?;
                map.end()
            }
            DataType::Map {
                key_type,
                value_type,
                value_contains_null,
            } => {
                let mut map = serializer.serialize_map(Some(4))?;
                map.serialize_entry("keyType", key_type)?;
                map.serialize_entry("type", "map")?;
                map.serialize_entry("valueContainsNull", value_contains_null)?;
                map.serialize_entry("valueType", value_type)?;
                map.end()
            }
            DataType::Struct(fields) => fields.serialize(serializer),
            atomic => serializer.serialize_str(&atomic.type_name()),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DataTypeRepr {
    Atomic(String),
    Complex(ComplexRepr),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum ComplexRepr {
    Array {
        #[serde(rename = "elementType")]
        element_type: DataType,
        #[serde(rename = "containsNull", default = "default_true")]
        contains_null: bool,
    },
    Map {
        #[serde(rename = "keyType")]
        key_type: DataType,
        #[serde(rename = "valueType")]
        value_type: DataType,
        #[serde(rename = "valueContainsNull", default = "default_true")]
        value_contains_null: bool,
    },
    Struct {
        fields: Vec<StructField>,
    },
}

impl TryFrom<DataTypeRepr> for DataType {
    type Error = String;

    fn try_from(repr: DataTypeRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            DataTypeRepr::Atomic(name) => {
                DataType::parse_atomic(&name).ok_or_else(|| format!("unknown data type '{}'", name))
            }
            DataTypeRepr::Complex(ComplexRepr::Array {
                element_type,
                contains_null,
            }) => Ok(DataType::Array {
                element_type: Box::new(element_type),
                contains_null,
            }),
            DataTypeRepr::Complex(ComplexRepr::Map {
                key_type,
                value_type,
                value_contains_null,
            }) => Ok(DataType::Map {
                key_type: Box::new(key_type),
                value_type: Box::new(value_type),
                value_contains_null,
            }),
            DataTypeRepr::Complex(ComplexRepr::Struct { fields }) => {
                Ok(DataType::Struct(StructType { fields }))
            }
        }
    }
}

fn default_true() -> bool {
    true
}

/// One column of a struct.
///
/// Field order matches the sorted key order of the JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructField {
    /// Free-form column metadata.
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    /// Column name.
    pub name: String,
    /// Whether the column may hold nulls.
    #[serde(default = "default_true")]
    pub nullable: bool,
    /// Column type.
    #[serde(rename = "type")]
    pub data_type: DataType,
}

impl StructField {
    /// Create a nullable field with empty metadata.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            metadata: serde_json::Map::new(),
            name: name.into(),
            nullable: true,
            data_type,
        }
    }

    /// Set nullability.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// An ordered list of columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StructType {
    /// Columns in order.
    pub fields: Vec<StructField>,
}

impl StructType {
    /// Create a struct from fields.
    pub fn new(fields: Vec<StructField>) -> Self {
        Self { fields }
    }

    /// Append a field.
    pub fn add(mut self, field: StructField) -> Self {
        self.fields.push(field);
        self
    }

    /// Canonical JSON encoding.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse a schema JSON string that must describe a struct.
    ///
    /// # Errors
    ///
    /// Malformed JSON is a JSON error; a well-formed non-struct type is a
    /// type mismatch.
    pub fn from_json(json: &str) -> Result<Self> {
        match DataType::from_json(json)? {
            DataType::Struct(schema) => Ok(schema),
            other => Err(WorkerError::type_mismatch(
                "the user-defined schema to be a 'StructType'",
                format!("'{}'", other.type_name()),
            )),
        }
    }
}

impl Serialize for StructType {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("fields", &self.fields)?;
        map.serialize_entry("type", "struct")?;
        map.end()
    }
}

/// Effective schema of a data source: structured, or a raw DDL string.
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaSpec {
    /// Structured column schema.
    Struct(StructType),
    /// Schema-definition-language string, passed through verbatim.
    Ddl(String),
}

impl SchemaSpec {
    /// Whether this is the raw DDL form.
    pub fn is_ddl(&self) -> bool {
        matches!(self, SchemaSpec::Ddl(_))
    }

    /// The text sent to the host: the DDL string, or the struct's JSON.
    pub fn to_wire_text(&self) -> Result<String> {
        match self {
            SchemaSpec::Struct(schema) => schema.to_json(),
            SchemaSpec::Ddl(ddl) => Ok(ddl.clone()),
        }
    }
}

impl From<StructType> for SchemaSpec {
    fn from(schema: StructType) -> Self {
        SchemaSpec::Struct(schema)
    }
}

impl From<String> for SchemaSpec {
    fn from(ddl: String) -> Self {
        SchemaSpec::Ddl(ddl)
    }
}

impl From<&str> for SchemaSpec {
    fn from(ddl: &str) -> Self {
        SchemaSpec::Ddl(ddl.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn test_struct_json_is_canonical() {
        let schema = StructType::new(vec![
            StructField::new("id", DataType::Long).nullable(false),
            StructField::new("name", DataType::String),
        ]);
        assert_eq!(
            schema.to_json().unwrap(),
            concat!(
                r#"{"fields":["#,
                r#"{"metadata":{},"name":"id","nullable":false,"type":"long"},"#,
                r#"{"metadata":{},"name":"name","nullable":true,"type":"string"}"#,
                r#"],"type":"struct"}"#
            )
        );
    }

    #[test]
    fn test_parse_host_schema() {
        let json = r#"{"type":"struct","fields":[
            {"name":"tags","type":{"type":"array","elementType":"string","containsNull":false},"nullable":true,"metadata":{}},
            {"name":"attrs","type":{"type":"map","keyType":"string","valueType":"integer","valueContainsNull":true},"nullable":true,"metadata":{"comment":"x"}},
            {"name":"price","type":"decimal(12,2)","nullable":false,"metadata":{}}
        ]}"#;

        let schema = StructType::from_json(json).unwrap();
        assert_eq!(schema.fields.len(), 3);
        assert_eq!(
            schema.fields[0].data_type,
            DataType::Array {
                element_type: Box::new(DataType::String),
                contains_null: false,
            }
        );
        assert_eq!(schema.fields[1].data_type.type_name(), "map");
        assert_eq!(schema.fields[1].metadata["comment"], "x");
        assert_eq!(
            schema.fields[2].data_type,
            DataType::Decimal {
                precision: 12,
                scale: 2
            }
        );
        assert!(!schema.fields[2].nullable);
    }

    #[test]
    fn test_json_is_stable_through_reparse() {
        let schema = StructType::new(vec![StructField::new(
            "m",
            DataType::Map {
                key_type: Box::new(DataType::String),
                value_type: Box::new(DataType::Struct(StructType::new(vec![
                    StructField::new("x", DataType::Double),
                ]))),
                value_contains_null: true,
            },
        )]);
        let json = schema.to_json().unwrap();
        assert_eq!(StructType::from_json(&json).unwrap().to_json().unwrap(), json);
    }

    #[test]
    fn test_non_struct_schema_is_type_mismatch() {
        let err = StructType::from_json(r#""integer""#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeMismatch);
        assert!(err.to_string().contains("'integer'"));
    }

    #[test]
    fn test_malformed_schema_is_generic() {
        let err = StructType::from_json("{not json").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);

        let err = StructType::from_json(r#""varchar2""#).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[test]
    fn test_bare_decimal() {
        assert_eq!(
            DataType::from_json(r#""decimal""#).unwrap(),
            DataType::Decimal {
                precision: 10,
                scale: 0
            }
        );
    }

    #[test]
    fn test_char_and_interval_types() {
        let json = r#"{"type":"struct","fields":[
            {"name":"code","type":"char(3)","nullable":true,"metadata":{}},
            {"name":"label","type":"varchar(40)","nullable":true,"metadata":{}},
            {"name":"age","type":"interval year to month","nullable":true,"metadata":{}},
            {"name":"wait","type":"interval day to second","nullable":true,"metadata":{}},
            {"name":"hours","type":"interval hour","nullable":true,"metadata":{}},
            {"name":"span","type":"interval","nullable":true,"metadata":{}}
        ]}"#;
        let schema = StructType::from_json(json).unwrap();
        let types: Vec<_> = schema.fields.iter().map(|f| f.data_type.clone()).collect();
        assert_eq!(
            types,
            vec![
                DataType::Char(3),
                DataType::Varchar(40),
                DataType::Interval {
                    start: IntervalField::Year,
                    end: IntervalField::Month
                },
                DataType::Interval {
                    start: IntervalField::Day,
                    end: IntervalField::Second
                },
                DataType::Interval {
                    start: IntervalField::Hour,
                    end: IntervalField::Hour
                },
                DataType::CalendarInterval,
            ]
        );

        let text = schema.to_json().unwrap();
        assert!(text.contains(r#""type":"varchar(40)""#));
        assert!(text.contains(r#""type":"interval day to second""#));
        assert!(text.contains(r#""type":"interval hour""#));
        assert_eq!(StructType::from_json(&text).unwrap(), schema);
    }

    #[test]
    fn test_invalid_interval_ranges() {
        assert!(DataType::from_json(r#""interval month to year""#).is_err());
        assert!(DataType::from_json(r#""interval year to day""#).is_err());
        assert!(DataType::from_json(r#""interval fortnight""#).is_err());
        assert!(DataType::from_json(r#""varchar(x)""#).is_err());
    }

    #[test]
    fn test_schema_spec_wire_text() {
        let ddl = SchemaSpec::from("a INT, b STRING");
        assert!(ddl.is_ddl());
        assert_eq!(ddl.to_wire_text().unwrap(), "a INT, b STRING");

        let structured = SchemaSpec::from(StructType::new(vec![StructField::new(
            "col",
            DataType::Integer,
        )]));
        assert!(!structured.is_ddl());
        assert!(structured.to_wire_text().unwrap().starts_with(r#"{"fields":"#));
    }
}
