//! Schema file and fixture loading.
//!
//! The schema file is TOML:
//!
//! ```toml
//! [odm]
//! error_on_entity_not_found = true
//! delete_all_batch_size = 500
//!
//! [kinds.User]
//! key_type = "auto"
//!
//! [kinds.User.fields.email]
//! type = "string"
//! required = true
//! validate = "isEmail"
//!
//! [kinds.User.fields.company]
//! reference = "Company"
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use serde::Deserialize;
use tracing::{debug, warn};

use gstore_odm::key::coerce_id;
use gstore_odm::{
    DeleteAllConfig, FieldType, GstoreConfig, IndexExclusion, KeyType, PathDefinition, Rule, Schema,
};
use gstore_store::InMemoryDatastore;
use gstore_types::{record_from_json, Key, Value};

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub odm: OdmSection,
    pub kinds: BTreeMap<String, KindSection>,
}

/// `[odm]`: registry settings, flattened for TOML.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OdmSection {
    pub error_on_entity_not_found: bool,
    /// Attach an in-memory cache to the registry.
    pub cache: bool,
    pub cache_ttl_secs: Option<u64>,
    pub cache_reads: bool,
    pub delete_all_query_limit: usize,
    pub delete_all_batch_size: usize,
    pub delete_all_batch_delay_ms: u64,
}

impl Default for OdmSection {
    fn default() -> Self {
        let defaults = GstoreConfig::default();
        Self {
            error_on_entity_not_found: defaults.error_on_entity_not_found,
            cache: false,
            cache_ttl_secs: None,
            cache_reads: defaults.cache_reads,
            delete_all_query_limit: defaults.delete_all.query_limit,
            delete_all_batch_size: defaults.delete_all.batch_size,
            delete_all_batch_delay_ms: defaults.delete_all.batch_delay.as_millis() as u64,
        }
    }
}

impl OdmSection {
    pub fn to_config(&self) -> GstoreConfig {
        GstoreConfig {
            error_on_entity_not_found: self.error_on_entity_not_found,
            cache_ttl: self.cache_ttl_secs.map(Duration::from_secs),
            cache_reads: self.cache_reads,
            delete_all: DeleteAllConfig {
                query_limit: self.delete_all_query_limit,
                batch_size: self.delete_all_batch_size,
                batch_delay: Duration::from_millis(self.delete_all_batch_delay_ms),
            },
        }
    }
}

/// `[kinds.<Kind>]`: one schema.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct KindSection {
    pub key_type: KeyType,
    pub explicit_only: bool,
    pub validate_before_save: bool,
    pub exclude_large_properties: bool,
    pub fields: BTreeMap<String, FieldSection>,
}

impl Default for KindSection {
    fn default() -> Self {
        Self {
            key_type: KeyType::Auto,
            explicit_only: true,
            validate_before_save: true,
            exclude_large_properties: false,
            fields: BTreeMap::new(),
        }
    }
}

/// `[kinds.<Kind>.fields.<name>]`: one path definition.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct FieldSection {
    #[serde(rename = "type")]
    pub field_type: Option<FieldType>,
    pub required: bool,
    pub optional: bool,
    /// A literal default, or `"now"` for the current time.
    pub default: Option<toml::Value>,
    /// Rule name, e.g. `isEmail` or `isLength`.
    pub validate: Option<String>,
    pub validate_args: Vec<usize>,
    pub values: Option<Vec<toml::Value>>,
    pub read: Option<bool>,
    pub write: Option<bool>,
    pub exclude_from_indexes: Option<ExcludeSetting>,
    /// Kind this field references; implies `type = "entityKey"`.
    pub reference: Option<String>,
}

/// `exclude_from_indexes = true` or a list of sub-properties.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum ExcludeSetting {
    All(bool),
    Properties(Vec<String>),
}

impl CliConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            warn!(path = %path.display(), "schema file not found, no kinds declared");
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading schema file {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing schema file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn key_type(&self, kind: &str) -> KeyType {
        self.kinds.get(kind).map(|k| k.key_type).unwrap_or_default()
    }
}

impl KindSection {
    pub fn to_schema(&self, kind: &str) -> anyhow::Result<Arc<Schema>> {
        let mut builder = Schema::builder()
            .key_type(self.key_type)
            .explicit_only(self.explicit_only)
            .validate_before_save(self.validate_before_save)
            .exclude_large_properties(self.exclude_large_properties);
        for (name, field) in &self.fields {
            let definition = field
                .to_definition()
                .with_context(|| format!("field '{name}' of kind '{kind}'"))?;
            builder = builder.path(name.clone(), definition);
        }
        Ok(builder.build()?)
    }
}

impl FieldSection {
    pub fn to_definition(&self) -> anyhow::Result<PathDefinition> {
        let mut def = match (&self.reference, self.field_type) {
            (Some(kind), _) => PathDefinition::reference(kind.clone()),
            (None, Some(field_type)) => PathDefinition::of(field_type),
            (None, None) => PathDefinition::new(),
        };
        if self.required {
            def = def.required();
        }
        if self.optional {
            def = def.optional();
        }
        match &self.default {
            Some(toml::Value::String(s)) if s == "now" => def = def.default_now(),
            Some(value) => def = def.default_value(toml_to_value(value)?),
            None => {}
        }
        if let Some(name) = &self.validate {
            let rule = Rule::named(name, &self.validate_args)
                .ok_or_else(|| anyhow!("unknown validation rule '{name}'"))?;
            def = def.validate(rule);
        }
        if let Some(values) = &self.values {
            let values = values.iter().map(toml_to_value).collect::<anyhow::Result<Vec<_>>>()?;
            def = def.values(values);
        }
        if let Some(read) = self.read {
            def = def.read(read);
        }
        if let Some(write) = self.write {
            def = def.write(write);
        }
        def.exclude_from_indexes = match &self.exclude_from_indexes {
            None | Some(ExcludeSetting::All(false)) => IndexExclusion::None,
            Some(ExcludeSetting::All(true)) => IndexExclusion::All,
            Some(ExcludeSetting::Properties(properties)) => {
                IndexExclusion::Properties(properties.clone())
            }
        };
        Ok(def)
    }
}

fn toml_to_value(value: &toml::Value) -> anyhow::Result<Value> {
    Ok(Value::from_json(serde_json::to_value(value)?))
}

/// Load `{"Kind": {"id": {fields}}}` into `store`. Ids are coerced with the
/// kind's key type. Returns the number of entities loaded.
pub fn load_fixtures(path: &Path, config: &CliConfig, store: &InMemoryDatastore) -> anyhow::Result<usize> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading fixtures {}", path.display()))?;
    let json: serde_json::Value =
        serde_json::from_str(&text).with_context(|| format!("parsing fixtures {}", path.display()))?;
    load_fixture_json(json, config, store)
}

pub fn load_fixture_json(
    json: serde_json::Value,
    config: &CliConfig,
    store: &InMemoryDatastore,
) -> anyhow::Result<usize> {
    let serde_json::Value::Object(kinds) = json else {
        bail!("fixtures must be an object keyed by kind");
    };
    let mut loaded = 0;
    for (kind, entities) in kinds {
        let serde_json::Value::Object(entities) = entities else {
            bail!("fixtures for '{kind}' must be an object keyed by id");
        };
        let key_type = config.key_type(&kind);
        for (id, data) in entities {
            let id = coerce_id(&Value::from(id.as_str()), key_type)?;
            let record = record_from_json(data)
                .ok_or_else(|| anyhow!("fixture {kind}:{id} must be a JSON object"))?;
            store.insert_raw(Key::new(kind.as_str()).with_id(id), record);
            loaded += 1;
        }
    }
    debug!(loaded, "fixtures loaded");
    Ok(loaded)
}

#[cfg(test)]
mod tests {
    use super::*;
    use gstore_types::KeyId;

    const SCHEMA: &str = r#"
[odm]
error_on_entity_not_found = false
delete_all_batch_size = 2
delete_all_batch_delay_ms = 0

[kinds.User]
key_type = "name"

[kinds.User.fields.email]
type = "string"
required = true
validate = "isEmail"

[kinds.User.fields.role]
type = "string"
default = "member"
values = ["member", "admin"]

[kinds.User.fields.createdOn]
type = "datetime"
default = "now"
write = false

[kinds.User.fields.bio]
type = "string"
exclude_from_indexes = true

[kinds.User.fields.address]
type = "object"
exclude_from_indexes = ["street"]

[kinds.User.fields.company]
reference = "Company"
"#;

    #[test]
    fn parses_odm_section() {
        let config = CliConfig::parse(SCHEMA).unwrap();
        let odm = config.odm.to_config();
        assert!(!odm.error_on_entity_not_found);
        assert_eq!(odm.delete_all.batch_size, 2);
        assert_eq!(odm.delete_all.batch_delay, Duration::ZERO);
        assert_eq!(odm.delete_all.query_limit, 100_000);
    }

    #[test]
    fn builds_schema_from_kind_section() {
        let config = CliConfig::parse(SCHEMA).unwrap();
        let schema = config.kinds["User"].to_schema("User").unwrap();
        assert_eq!(schema.options().key_type, KeyType::Name);

        let email = schema.path("email").unwrap();
        assert!(email.required);
        assert_eq!(email.validate.as_ref().map(Rule::name), Some("isEmail"));

        assert_eq!(schema.path("role").unwrap().values.as_ref().map(Vec::len), Some(2));
        assert!(!schema.path("createdOn").unwrap().write);
        assert_eq!(schema.path("bio").unwrap().exclude_from_indexes, IndexExclusion::All);
        assert_eq!(
            schema.path("address").unwrap().exclude_from_indexes,
            IndexExclusion::Properties(vec!["street".into()])
        );
        assert_eq!(schema.reference_paths(), vec!["company"]);
    }

    #[test]
    fn unknown_rule_is_rejected() {
        let config = CliConfig::parse(
            r#"
[kinds.User.fields.email]
validate = "isShiny"
"#,
        )
        .unwrap();
        assert!(config.kinds["User"].to_schema("User").is_err());
    }

    #[test]
    fn fixtures_use_kind_key_type() {
        let config = CliConfig::parse(SCHEMA).unwrap();
        let store = InMemoryDatastore::new();
        let fixtures = serde_json::json!({
            "User": { "42": { "email": "a@b.co" } },
            "Company": { "7": { "name": "Acme" } }
        });
        assert_eq!(load_fixture_json(fixtures, &config, &store).unwrap(), 2);
        assert!(store.contains(&Key::new("User").with_id(KeyId::Name("42".into()))));
        assert!(store.contains(&Key::new("Company").with_id(7)));
    }

    #[test]
    fn malformed_fixtures_are_rejected() {
        let store = InMemoryDatastore::new();
        let config = CliConfig::default();
        assert!(load_fixture_json(serde_json::json!([1, 2]), &config, &store).is_err());
        assert!(load_fixture_json(serde_json::json!({"User": {"1": 5}}), &config, &store).is_err());
    }
}
