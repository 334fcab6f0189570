//! Conversion between entity data and the store's wire form.

use gstore_store::{SaveMethod, WriteSpec};
use gstore_types::{Key, KeyId, Record, Value};

use crate::schema::{FieldType, IndexExclusion, Schema};

/// Field carrying the key's trailing id in plain output.
pub const ID_FIELD: &str = "id";

/// Build the wire write for an entity.
///
/// Virtual fields are never persisted. The injected `id` field is dropped
/// unless the schema declares it.
pub fn to_datastore(
    schema: &Schema,
    key: &Key,
    data: &Record,
    exclude_from_indexes: Vec<String>,
    method: SaveMethod,
) -> WriteSpec {
    let data: Record = data
        .iter()
        .filter(|(field, _)| !schema.is_virtual(field))
        .filter(|(field, _)| field.as_str() != ID_FIELD || schema.has_path(ID_FIELD))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    WriteSpec {
        key: key.clone(),
        data,
        method,
        exclude_from_indexes,
        exclude_large_properties: schema.options().exclude_large_properties,
    }
}

/// Read a stored record into its plain form.
///
/// Fields declared `read: false` are dropped unless `read_all` is set. The
/// key's trailing id is injected as `id` when the record has no such field.
pub fn from_datastore(schema: &Schema, key: &Key, data: &Record, read_all: bool) -> Record {
    let mut record: Record = data
        .iter()
        .filter(|(field, _)| read_all || schema.path(field).map_or(true, |def| def.read))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect();
    if let Some(id) = &key.id {
        record.entry(ID_FIELD.to_string()).or_insert_with(|| id_value(id));
    }
    record
}

/// A key id as a plain value.
pub fn id_value(id: &KeyId) -> Value {
    match id {
        KeyId::Id(n) => Value::Integer(*n),
        KeyId::Name(name) => Value::String(name.clone()),
    }
}

/// Dotted index-exclusion paths for the fields present in `data`.
///
/// A path excluded as a whole yields `prop` for scalars, `prop[]` and
/// `prop[].*` for arrays, and `prop` and `prop.*` for embedded records.
/// Excluded sub-properties yield `prop[].sub` for arrays and `prop.sub`
/// otherwise. `overlay` names extra properties excluded as a whole.
pub fn index_exclusions(schema: &Schema, overlay: &[String], data: &Record) -> Vec<String> {
    let mut out = Vec::new();
    for (field, value) in data {
        let declared = schema.path(field);
        let exclusion = match declared.map(|def| &def.exclude_from_indexes) {
            Some(IndexExclusion::None) | None if overlay.contains(field) => IndexExclusion::All,
            Some(exclusion) => exclusion.clone(),
            None => continue,
        };
        let declared_type = declared.and_then(|def| def.field_type);
        let is_array = declared_type == Some(FieldType::Array) || matches!(value, Value::Array(_));
        let is_object = declared_type == Some(FieldType::Object) || matches!(value, Value::Entity(_));

        match exclusion {
            IndexExclusion::None => {}
            IndexExclusion::All if is_array => {
                out.push(format!("{field}[]"));
                out.push(format!("{field}[].*"));
            }
            IndexExclusion::All if is_object => {
                out.push(field.clone());
                out.push(format!("{field}.*"));
            }
            IndexExclusion::All => out.push(field.clone()),
            IndexExclusion::Properties(properties) => {
                for property in &properties {
                    if is_array {
                        out.push(format!("{field}[].{property}"));
                    } else {
                        out.push(format!("{field}.{property}"));
                    }
                }
            }
        }
    }
    out
}
