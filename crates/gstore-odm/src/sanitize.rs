//! Schema-driven cleanup of caller-supplied data.

use gstore_types::{Record, Value};

use crate::schema::Schema;

/// Controls which sanitization steps run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SanitizeOptions {
    /// Keep fields declared `write: false`. Set on the save path, where
    /// those fields are server-managed values the entity already holds.
    pub keep_non_writable: bool,
}

impl SanitizeOptions {
    pub fn keep_non_writable() -> Self {
        Self {
            keep_non_writable: true,
        }
    }
}

/// Strip non-writable fields (unless kept) and, under `explicit_only`,
/// every field the schema does not declare. The literal string `"null"`
/// becomes `Null`. Applying it twice gives the same result as once.
pub fn sanitize(schema: &Schema, record: Record, options: SanitizeOptions) -> Record {
    let explicit_only = schema.options().explicit_only;
    record
        .into_iter()
        .filter(|(field, _)| match schema.path(field) {
            Some(def) => def.write || options.keep_non_writable,
            None => !explicit_only,
        })
        .map(|(field, value)| match value {
            Value::String(ref s) if s == "null" => (field, Value::Null),
            other => (field, other),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, PathDefinition, VirtualField};
    use proptest::prelude::*;

    fn schema(explicit_only: bool) -> std::sync::Arc<Schema> {
        Schema::builder()
            .path("name", PathDefinition::of(FieldType::String))
            .path("createdOn", PathDefinition::of(FieldType::Datetime).write(false))
            .path("bio", PathDefinition::new())
            .virtual_field("fullName", VirtualField::new())
            .explicit_only(explicit_only)
            .build()
            .unwrap()
    }

    fn record(fields: &[(&str, Value)]) -> Record {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn strips_unknown_and_virtual_fields() {
        let out = sanitize(
            &schema(true),
            record(&[
                ("name", Value::from("john")),
                ("unknown", Value::from(1)),
                ("fullName", Value::from("John Snow")),
            ]),
            SanitizeOptions::default(),
        );
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn keeps_unknown_fields_when_not_explicit() {
        let out = sanitize(
            &schema(false),
            record(&[("unknown", Value::from(1))]),
            SanitizeOptions::default(),
        );
        assert!(out.contains_key("unknown"));
    }

    #[test]
    fn non_writable_fields() {
        let input = record(&[("name", Value::from("a")), ("createdOn", Value::from("2020-01-01"))]);
        let stripped = sanitize(&schema(true), input.clone(), SanitizeOptions::default());
        assert!(!stripped.contains_key("createdOn"));
        let kept = sanitize(&schema(true), input, SanitizeOptions::keep_non_writable());
        assert!(kept.contains_key("createdOn"));
    }

    #[test]
    fn null_string_becomes_null() {
        let out = sanitize(
            &schema(true),
            record(&[("bio", Value::from("null"))]),
            SanitizeOptions::default(),
        );
        assert_eq!(out.get("bio"), Some(&Value::Null));
    }

    fn field_name() -> impl Strategy<Value = String> {
        prop_oneof![
            Just("name".to_string()),
            Just("createdOn".to_string()),
            Just("bio".to_string()),
            Just("fullName".to_string()),
            "[a-z]{1,8}",
        ]
    }

    fn field_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            Just(Value::from("null")),
            any::<i64>().prop_map(Value::Integer),
            "[a-z ]{0,6}".prop_map(Value::String),
        ]
    }

    proptest! {
        #[test]
        fn explicit_only_output_has_only_schema_paths(
            fields in proptest::collection::btree_map(field_name(), field_value(), 0..8),
            keep in any::<bool>(),
        ) {
            let schema = schema(true);
            let out = sanitize(&schema, fields, SanitizeOptions { keep_non_writable: keep });
            for field in out.keys() {
                prop_assert!(schema.has_path(field));
            }
        }

        #[test]
        fn sanitize_is_idempotent(
            fields in proptest::collection::btree_map(field_name(), field_value(), 0..8),
            explicit in any::<bool>(),
        ) {
            let schema = schema(explicit);
            let once = sanitize(&schema, fields, SanitizeOptions::default());
            let twice = sanitize(&schema, once.clone(), SanitizeOptions::default());
            prop_assert_eq!(once, twice);
        }
    }
}
