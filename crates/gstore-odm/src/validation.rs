//! Schema validation of entity data.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;

use gstore_types::{GeoPoint, NumberKind, Record, Value};

use crate::schema::{FieldType, PathDefinition, Schema};

/// Category of a field validation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum FieldErrorKind {
    UnknownField,
    Required,
    Type,
    Format,
    Validation,
    ValueNotAllowed,
}

impl fmt::Display for FieldErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UnknownField => "unknown field",
            Self::Required => "required",
            Self::Type => "wrong type",
            Self::Format => "wrong format",
            Self::Validation => "failed validation",
            Self::ValueNotAllowed => "value not allowed",
        };
        f.write_str(name)
    }
}

/// One failed field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub kind: FieldErrorKind,
    pub field: String,
    pub message: String,
}

impl FieldError {
    fn new(kind: FieldErrorKind, field: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            field: field.to_string(),
            message: message.into(),
        }
    }
}

/// Outcome of validating a record: at most one error per field.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    errors: BTreeMap<String, FieldError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, FieldError> {
        &self.errors
    }

    pub fn error(&self, field: &str) -> Option<&FieldError> {
        self.errors.get(field)
    }

    /// Kind of the error recorded for `field`.
    pub fn kind_of(&self, field: &str) -> Option<FieldErrorKind> {
        self.errors.get(field).map(|e| e.kind)
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    fn push(&mut self, error: FieldError) {
        self.errors.entry(error.field.clone()).or_insert(error);
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for error in self.errors.values() {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", error.field, error.message)?;
            first = false;
        }
        Ok(())
    }
}

/// Validate `record` against `schema`.
///
/// Each field present in the record is checked in this order, and the
/// first failing check is the field's only error: unknown field, required,
/// type, rule, allowed values. Virtual fields are skipped.
pub fn validate(schema: &Schema, record: &Record) -> ValidationReport {
    let mut report = ValidationReport::default();
    for (field, value) in record {
        if schema.is_virtual(field) {
            continue;
        }
        let Some(def) = schema.path(field) else {
            if schema.options().explicit_only {
                report.push(FieldError::new(
                    FieldErrorKind::UnknownField,
                    field,
                    format!("'{field}' is not declared in the schema"),
                ));
            }
            continue;
        };
        if let Some(error) = check_field(field, def, value) {
            report.push(error);
        }
    }
    report
}

fn check_field(field: &str, def: &PathDefinition, value: &Value) -> Option<FieldError> {
    if value.is_empty() {
        return def.required.then(|| {
            FieldError::new(FieldErrorKind::Required, field, format!("'{field}' is required"))
        });
    }

    if let Some(field_type) = def.field_type {
        if let Some(error) = check_type(field, field_type, value) {
            return Some(error);
        }
    }

    if let Some(rule) = &def.validate {
        if let Some(text) = value.to_text() {
            if !rule.check(text.trim()) {
                return Some(FieldError::new(
                    FieldErrorKind::Validation,
                    field,
                    format!("'{field}' failed rule {}", rule.name()),
                ));
            }
        }
    }

    if let Some(allowed) = &def.values {
        if !allowed.contains(value) {
            return Some(FieldError::new(
                FieldErrorKind::ValueNotAllowed,
                field,
                format!("'{field}' value is not one of the allowed values"),
            ));
        }
    }

    None
}

fn check_type(field: &str, field_type: FieldType, value: &Value) -> Option<FieldError> {
    let ok = match field_type {
        FieldType::Array => matches!(value, Value::Array(_)),
        FieldType::Int => match value {
            Value::Integer(_) => true,
            Value::Double(f) => f.is_finite() && f.fract() == 0.0,
            Value::Boxed(boxed) => boxed.as_i64().is_some(),
            _ => false,
        },
        FieldType::Double => match value {
            Value::Integer(_) | Value::Double(_) => true,
            Value::Boxed(boxed) => match boxed.kind {
                NumberKind::Int | NumberKind::Double => boxed.as_f64().is_some(),
            },
            _ => false,
        },
        FieldType::Datetime => {
            let ok = match value {
                Value::Timestamp(_) => true,
                Value::String(text) => is_date_text(text),
                _ => false,
            };
            if !ok {
                return Some(FieldError::new(
                    FieldErrorKind::Format,
                    field,
                    format!("'{field}' must be a date (YYYY-MM-DD with optional time)"),
                ));
            }
            true
        }
        FieldType::GeoPoint => match value {
            Value::GeoPoint(point) => point.is_valid(),
            Value::Entity(record) => GeoPoint::from_record(record).is_some_and(|p| p.is_valid()),
            _ => false,
        },
        FieldType::String => matches!(value, Value::String(_)),
        FieldType::Boolean => matches!(value, Value::Boolean(_)),
        FieldType::Object => matches!(value, Value::Entity(_)),
        FieldType::Buffer => matches!(value, Value::Blob(_)),
        FieldType::EntityKey => matches!(value, Value::Key(_)),
    };
    (!ok).then(|| {
        FieldError::new(
            FieldErrorKind::Type,
            field,
            format!("'{field}' must be of type {field_type}, got {}", value.type_name()),
        )
    })
}

/// `YYYY-MM-DD`, optionally followed by a time part.
fn is_date_text(text: &str) -> bool {
    let text = text.trim();
    DateTime::parse_from_rfc3339(text).is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f").is_ok()
        || NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M").is_ok()
        || NaiveDate::parse_from_str(text, "%Y-%m-%d").is_ok()
}
