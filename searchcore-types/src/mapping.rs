//! Index mappings and the field types they declare.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field datatypes an index mapping can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    /// Exact-match string.
    Keyword,
    /// Analyzed full-text string.
    Text,
    /// Signed 64-bit integer.
    Long,
    /// 64-bit float.
    Double,
    /// `true` or `false`.
    Boolean,
    /// Formatted date string or epoch milliseconds.
    Date,
}

impl FieldType {
    /// Mapping name of the type, as the cluster spells it.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Text => "text",
            Self::Long => "long",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Date => "date",
        }
    }

    /// Type a dynamic mapping assigns to a previously unseen field.
    ///
    /// Returns `None` for values that do not introduce a mapping (`null`,
    /// arrays and objects).
    pub fn infer(value: &Value) -> Option<Self> {
        match value {
            Value::String(_) => Some(Self::Keyword),
            Value::Number(number) if number.is_f64() => Some(Self::Double),
            Value::Number(_) => Some(Self::Long),
            Value::Bool(_) => Some(Self::Boolean),
            Value::Null | Value::Array(_) | Value::Object(_) => None,
        }
    }

    /// Whether a JSON value can be indexed into a field of this type.
    ///
    /// `null` is accepted by every type. Dates accept either a formatted
    /// string or epoch milliseconds.
    pub fn accepts(self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null)
            | (Self::Keyword | Self::Text | Self::Date, Value::String(_))
            | (Self::Double, Value::Number(_))
            | (Self::Boolean, Value::Bool(_)) => true,
            (Self::Long, Value::Number(number)) => number.is_i64() || number.is_u64(),
            (Self::Date, Value::Number(number)) => number.is_i64(),
            _ => false,
        }
    }
}

/// Field typing for one index.
///
/// A put-mapping may add fields but never change the type of an existing one.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingSchema {
    properties: BTreeMap<String, FieldType>,
}

impl MappingSchema {
    /// Schema without any declared field.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a field using builder pattern.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        let _ = self.properties.insert(name.into(), field_type);
        self
    }

    /// Declared type of `name`, if any.
    pub fn field_type(&self, name: &str) -> Option<FieldType> {
        self.properties.get(name).copied()
    }

    /// Declared fields in name order.
    pub fn properties(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.properties
            .iter()
            .map(|(name, field_type)| (name.as_str(), *field_type))
    }

    /// Whether no field is declared.
    pub fn is_empty(&self) -> bool {
        self.properties.is_empty()
    }
}
