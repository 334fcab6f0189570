use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use gstore_types::Value;

use super::rules::Rule;

/// Declared type of a schema path.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldType {
    String,
    Int,
    Double,
    Boolean,
    Datetime,
    Array,
    Object,
    GeoPoint,
    Buffer,
    /// A reference to another entity, stored as a key.
    EntityKey,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Int => "int",
            Self::Double => "double",
            Self::Boolean => "boolean",
            Self::Datetime => "datetime",
            Self::Array => "array",
            Self::Object => "object",
            Self::GeoPoint => "geoPoint",
            Self::Buffer => "buffer",
            Self::EntityKey => "entityKey",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "int" => Ok(Self::Int),
            "double" => Ok(Self::Double),
            "boolean" => Ok(Self::Boolean),
            "datetime" => Ok(Self::Datetime),
            "array" => Ok(Self::Array),
            "object" => Ok(Self::Object),
            "geoPoint" => Ok(Self::GeoPoint),
            "buffer" => Ok(Self::Buffer),
            "entityKey" => Ok(Self::EntityKey),
            other => Err(format!("unknown field type '{other}'")),
        }
    }
}

/// Value a path takes when an entity is built without it.
#[derive(Clone, Debug, PartialEq)]
pub enum DefaultValue {
    /// A fixed value.
    Value(Value),
    /// The current UTC time at construction.
    Now,
    /// Explicit null.
    Null,
}

impl DefaultValue {
    pub fn resolve(&self) -> Value {
        match self {
            Self::Value(value) => value.clone(),
            Self::Now => Value::Timestamp(Utc::now()),
            Self::Null => Value::Null,
        }
    }
}

/// Index exclusion declared on a path.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum IndexExclusion {
    #[default]
    None,
    /// The whole property, and everything below it for arrays and objects.
    All,
    /// Only the named sub-properties of an object or of array items.
    Properties(Vec<String>),
}

/// Definition of one schema field.
#[derive(Clone, Debug)]
pub struct PathDefinition {
    pub field_type: Option<FieldType>,
    pub default: Option<DefaultValue>,
    pub required: bool,
    /// Optional paths are left absent, not filled with null, when an
    /// entity is built without them.
    pub optional: bool,
    pub validate: Option<Rule>,
    pub values: Option<Vec<Value>>,
    pub read: bool,
    pub write: bool,
    pub exclude_from_indexes: IndexExclusion,
    /// Kind a reference field points at, when known.
    pub reference: Option<String>,
}

impl Default for PathDefinition {
    fn default() -> Self {
        Self {
            field_type: None,
            default: None,
            required: false,
            optional: false,
            validate: None,
            values: None,
            read: true,
            write: true,
            exclude_from_indexes: IndexExclusion::None,
            reference: None,
        }
    }
}

impl PathDefinition {
    /// An untyped, readable, writable path.
    pub fn new() -> Self {
        Self::default()
    }

    /// A path of the given type.
    pub fn of(field_type: FieldType) -> Self {
        Self {
            field_type: Some(field_type),
            ..Self::default()
        }
    }

    /// A reference field pointing at `kind`.
    pub fn reference(kind: impl Into<String>) -> Self {
        Self {
            field_type: Some(FieldType::EntityKey),
            reference: Some(kind.into()),
            ..Self::default()
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(DefaultValue::Value(value.into()));
        self
    }

    pub fn default_now(mut self) -> Self {
        self.default = Some(DefaultValue::Now);
        self
    }

    pub fn default_null(mut self) -> Self {
        self.default = Some(DefaultValue::Null);
        self
    }

    pub fn validate(mut self, rule: Rule) -> Self {
        self.validate = Some(rule);
        self
    }

    pub fn values<V: Into<Value>>(mut self, values: impl IntoIterator<Item = V>) -> Self {
        self.values = Some(values.into_iter().map(Into::into).collect());
        self
    }

    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    pub fn exclude_from_indexes(mut self) -> Self {
        self.exclude_from_indexes = IndexExclusion::All;
        self
    }

    pub fn exclude_properties(mut self, properties: &[&str]) -> Self {
        self.exclude_from_indexes =
            IndexExclusion::Properties(properties.iter().map(|p| p.to_string()).collect());
        self
    }
}
