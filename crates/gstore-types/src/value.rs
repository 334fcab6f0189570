use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::key::Key;

/// Ordered field map holding an entity's (or embedded entity's) data.
pub type Record = BTreeMap<String, Value>;

/// Marker field used to carry a [`Key`] inside plain JSON.
pub const JSON_KEY_MARKER: &str = "__key__";

// ---------------------------------------------------------------------------
// GeoPoint
// ---------------------------------------------------------------------------

/// A latitude/longitude pair stored natively by the backing store.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Latitude in `[-90, 90]` and longitude in `[-180, 180]`.
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.latitude) && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Read a `{latitude, longitude}` record. Returns `None` unless the
    /// record has exactly those two numeric fields.
    pub fn from_record(record: &Record) -> Option<Self> {
        if record.len() != 2 {
            return None;
        }
        let latitude = record.get("latitude")?.as_f64()?;
        let longitude = record.get("longitude")?.as_f64()?;
        Some(Self::new(latitude, longitude))
    }
}

// ---------------------------------------------------------------------------
// BoxedNumber
// ---------------------------------------------------------------------------

/// Which numeric type a [`BoxedNumber`] declares.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberKind {
    Int,
    Double,
}

/// A number carried as text with an explicit store type.
///
/// Used for values that do not fit the native numeric types (64-bit ids
/// coming from JSON, decimal strings) but must be stored as int or double.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoxedNumber {
    pub kind: NumberKind,
    pub raw: String,
}

impl BoxedNumber {
    pub fn int(raw: impl Into<String>) -> Self {
        Self {
            kind: NumberKind::Int,
            raw: raw.into(),
        }
    }

    pub fn double(raw: impl Into<String>) -> Self {
        Self {
            kind: NumberKind::Double,
            raw: raw.into(),
        }
    }

    /// The wrapped value parsed as an integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.raw.trim().parse().ok()
    }

    /// The wrapped value parsed as a float.
    pub fn as_f64(&self) -> Option<f64> {
        self.raw.trim().parse::<f64>().ok().filter(|f| f.is_finite())
    }
}

// ---------------------------------------------------------------------------
// Value
// ---------------------------------------------------------------------------

/// A dynamically typed field value.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Double(f64),
    Boxed(BoxedNumber),
    String(String),
    Timestamp(DateTime<Utc>),
    GeoPoint(GeoPoint),
    Key(Key),
    Blob(Vec<u8>),
    Array(Vec<Value>),
    Entity(Record),
}

impl Value {
    /// Short name of the runtime type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Boolean(_) => "boolean",
            Self::Integer(_) => "int",
            Self::Double(_) => "double",
            Self::Boxed(b) => match b.kind {
                NumberKind::Int => "int",
                NumberKind::Double => "double",
            },
            Self::String(_) => "string",
            Self::Timestamp(_) => "datetime",
            Self::GeoPoint(_) => "geoPoint",
            Self::Key(_) => "entityKey",
            Self::Blob(_) => "buffer",
            Self::Array(_) => "array",
            Self::Entity(_) => "object",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Null, or a string made only of whitespace.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(n) => Some(*n),
            Self::Boxed(b) => b.as_i64(),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(n) => Some(*n as f64),
            Self::Double(f) => Some(*f),
            Self::Boxed(b) => b.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&Key> {
        match self {
            Self::Key(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Self::Entity(record) => Some(record),
            _ => None,
        }
    }

    pub fn as_record_mut(&mut self) -> Option<&mut Record> {
        match self {
            Self::Entity(record) => Some(record),
            _ => None,
        }
    }

    /// Textual form of scalar values, used by string validation rules.
    /// Composite values have no textual form.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Self::Boolean(b) => Some(b.to_string()),
            Self::Integer(n) => Some(n.to_string()),
            Self::Double(f) => Some(f.to_string()),
            Self::Boxed(b) => Some(b.raw.clone()),
            Self::String(s) => Some(s.clone()),
            Self::Timestamp(t) => Some(t.to_rfc3339()),
            _ => None,
        }
    }

    // -----------------------------------------------------------------------
    // JSON conversion
    // -----------------------------------------------------------------------

    /// Convert plain JSON into a value.
    ///
    /// Objects of the form `{"__key__": {...}}` become [`Value::Key`];
    /// every other object becomes an embedded record. Strings are never
    /// reinterpreted as dates.
    pub fn from_json(json: serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Double(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => {
                Self::Array(items.into_iter().map(Self::from_json).collect())
            }
            serde_json::Value::Object(map) => {
                if map.len() == 1 {
                    if let Some(inner) = map.get(JSON_KEY_MARKER) {
                        if let Ok(key) = serde_json::from_value::<Key>(inner.clone()) {
                            return Self::Key(key);
                        }
                    }
                }
                Self::Entity(
                    map.into_iter()
                        .map(|(k, v)| (k, Self::from_json(v)))
                        .collect(),
                )
            }
        }
    }

    /// Convert a value into plain JSON (inverse of [`Self::from_json`] for
    /// the JSON-native variants).
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Boolean(b) => serde_json::Value::Bool(*b),
            Self::Integer(n) => serde_json::Value::from(*n),
            Self::Double(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Self::Boxed(b) => serde_json::Value::String(b.raw.clone()),
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Timestamp(t) => serde_json::Value::String(t.to_rfc3339()),
            Self::GeoPoint(g) => serde_json::json!({
                "latitude": g.latitude,
                "longitude": g.longitude,
            }),
            Self::Key(k) => {
                let mut map = serde_json::Map::new();
                map.insert(
                    JSON_KEY_MARKER.to_string(),
                    serde_json::to_value(k).unwrap_or(serde_json::Value::Null),
                );
                serde_json::Value::Object(map)
            }
            Self::Blob(bytes) => serde_json::Value::Array(
                bytes.iter().map(|b| serde_json::Value::from(*b)).collect(),
            ),
            Self::Array(items) => {
                serde_json::Value::Array(items.iter().map(Self::to_json).collect())
            }
            Self::Entity(record) => serde_json::Value::Object(
                record
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

/// Convert a JSON object into a record. Non-object JSON yields `None`.
pub fn record_from_json(json: serde_json::Value) -> Option<Record> {
    match Value::from_json(json) {
        Value::Entity(record) => Some(record),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Conversions
// ---------------------------------------------------------------------------

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Self::Integer(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Self::Integer(n.into())
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Double(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        Self::Key(key)
    }
}

impl From<GeoPoint> for Value {
    fn from(point: GeoPoint) -> Self {
        Self::GeoPoint(point)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Self::Timestamp(t)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::Entity(record)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<BoxedNumber> for Value {
    fn from(b: BoxedNumber) -> Self {
        Self::Boxed(b)
    }
}
