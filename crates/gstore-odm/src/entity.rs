use std::fmt;
use std::sync::Arc;

use gstore_types::{get_path, set_path, Key, KeyId, Record, Value};

use crate::error::{KeyError, OdmError, OdmResult};
use crate::hooks::{HookArgs, HookResponse};
use crate::loader::Loader;
use crate::model::{save, Model, SaveOptions};
use crate::populate::{populate_entities, PopulateRef};
use crate::schema::Method;
use crate::serializer;
use crate::transaction::Transaction;
use crate::validation::{self, ValidationReport};

/// Options for [`Entity::plain`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PlainOptions {
    /// Include fields declared `read: false`.
    pub read_all: bool,
    /// Include computed virtual fields.
    pub virtuals: bool,
    /// Include the entity key under `__key`.
    pub show_key: bool,
}

/// Field holding the entity key in plain output when `show_key` is set.
pub const KEY_FIELD: &str = "__key";

/// One in-memory entity: a key, its data, and the model it belongs to.
#[derive(Clone)]
pub struct Entity {
    key: Key,
    data: Record,
    model: Model,
    exclude_from_indexes: Vec<String>,
}

impl Entity {
    /// Build an entity from caller data.
    ///
    /// Virtual-named fields are routed through their setter and removed.
    /// Schema paths missing from the data get their default, or `Null` when
    /// the path is not optional.
    pub(crate) fn new(model: Model, mut data: Record, key: Key) -> Self {
        let schema = Arc::clone(model.schema());
        for (name, field) in schema.virtuals() {
            if let Some(value) = data.remove(name) {
                field.apply_set(&mut data, value);
            }
        }
        for (name, def) in schema.paths() {
            if data.contains_key(name) {
                continue;
            }
            if let Some(default) = &def.default {
                data.insert(name.clone(), default.resolve());
            } else if !def.optional {
                data.insert(name.clone(), Value::Null);
            }
        }
        let mut entity = Self {
            key,
            data,
            model,
            exclude_from_indexes: Vec::new(),
        };
        entity.refresh_exclusions();
        entity
    }

    /// An entity carrying only a key, used as hook context for deletes.
    pub(crate) fn bare(model: Model, key: Key) -> Self {
        Self {
            key,
            data: Record::new(),
            model,
            exclude_from_indexes: Vec::new(),
        }
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Trailing id of the key; `None` until first save for new entities.
    pub fn id(&self) -> Option<&KeyId> {
        self.key.id.as_ref()
    }

    pub fn kind(&self) -> &str {
        self.model.kind()
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn data(&self) -> &Record {
        &self.data
    }

    /// Direct access to the stored fields. Index exclusions are recomputed
    /// on save.
    pub fn data_mut(&mut self) -> &mut Record {
        &mut self.data
    }

    pub fn into_data(self) -> Record {
        self.data
    }

    /// Index exclusions for the current data, in dotted notation.
    pub fn exclude_from_indexes(&self) -> &[String] {
        &self.exclude_from_indexes
    }

    pub(crate) fn set_key(&mut self, key: Key) {
        self.key = key;
    }

    pub(crate) fn refresh_exclusions(&mut self) {
        self.exclude_from_indexes = serializer::index_exclusions(
            self.model.schema(),
            &self.model.index_overlay(),
            &self.data,
        );
    }

    // -----------------------------------------------------------------------
    // Field access
    // -----------------------------------------------------------------------

    /// Read a field. Virtual getters are consulted first; dotted paths walk
    /// embedded records.
    pub fn get(&self, path: &str) -> Option<Value> {
        if let Some(value) = self
            .model
            .schema()
            .virtual_field(path)
            .and_then(|field| field.apply_get(&self.data))
        {
            return Some(value);
        }
        get_path(&self.data, path).cloned()
    }

    /// Write a field. Virtual setters are consulted first; dotted paths
    /// create missing embedded records.
    pub fn set(&mut self, path: &str, value: Value) -> OdmResult<()> {
        let schema = Arc::clone(self.model.schema());
        if let Some(field) = schema.virtual_field(path) {
            if field.apply_set(&mut self.data, value.clone()) {
                self.refresh_exclusions();
                return Ok(());
            }
        }
        set_path(&mut self.data, path, value).map_err(KeyError::from)?;
        self.refresh_exclusions();
        Ok(())
    }

    /// Plain record for output: readable fields, the injected `id`, and
    /// optionally virtuals and the key.
    pub fn plain(&self, options: PlainOptions) -> Record {
        let schema = self.model.schema();
        let mut record = serializer::from_datastore(schema, &self.key, &self.data, options.read_all);
        if options.virtuals {
            for (name, field) in schema.virtuals() {
                if let Some(value) = field.apply_get(&self.data) {
                    record.insert(name.clone(), value);
                }
            }
        }
        if options.show_key {
            record.insert(KEY_FIELD.to_string(), Value::Key(self.key.clone()));
        }
        record
    }

    /// [`Self::plain`] rendered as JSON.
    pub fn to_json(&self, options: PlainOptions) -> serde_json::Value {
        Value::Entity(self.plain(options)).to_json()
    }

    // -----------------------------------------------------------------------
    // Operations
    // -----------------------------------------------------------------------

    /// Validate the current data without running hooks.
    pub fn validation_report(&self) -> ValidationReport {
        validation::validate(self.model.schema(), &self.data)
    }

    /// Validate the current data, running `validate` hooks around the check.
    pub async fn validate(&mut self) -> OdmResult<ValidationReport> {
        let hooks = self.model.hooks(&Method::Validate);
        hooks
            .run_pre(self, HookArgs::Validate)
            .await
            .map_err(OdmError::pre_hook("validate"))?;
        let report = self.validation_report();
        if !report.is_valid() {
            return Err(OdmError::Validation(report));
        }
        let response = hooks
            .run_post(self, HookResponse::Validated(report.clone()))
            .await
            .map_err(OdmError::post_hook("validate", false))?;
        Ok(match response {
            HookResponse::Validated(report) => report,
            _ => report,
        })
    }

    /// Save the entity, directly or inside `txn`. See [`save`] for the full
    /// flow.
    pub async fn save(&mut self, txn: Option<&mut Transaction>, options: SaveOptions) -> OdmResult<Entity> {
        save::save_entity(self, txn, options).await
    }

    /// Resolve reference fields in place. With no refs, every reference
    /// path the schema declares is populated.
    pub async fn populate(
        mut self,
        refs: Vec<PopulateRef>,
        loader: Option<Arc<dyn Loader>>,
    ) -> OdmResult<Entity> {
        populate_entities(std::slice::from_mut(&mut self), refs, loader).await?;
        Ok(self)
    }

    /// Invoke a custom schema method, running its hooks around it.
    pub async fn call(&mut self, method: &str, args: Vec<Value>) -> OdmResult<Value> {
        let schema = Arc::clone(self.model.schema());
        let function = schema
            .method(method)
            .ok_or_else(|| OdmError::Configuration(format!("unknown method '{method}'")))?;
        let hooks = self.model.hooks(&Method::Custom(method.to_string()));
        let args = match hooks
            .run_pre(self, HookArgs::Custom(args))
            .await
            .map_err(OdmError::pre_hook(method))?
        {
            HookArgs::Custom(args) => args,
            _ => {
                return Err(OdmError::Configuration(format!(
                    "pre hook on '{method}' must return method arguments"
                )))
            }
        };
        let value = function(self, args.as_slice())?;
        let response = hooks
            .run_post(self, HookResponse::Value(value.clone()))
            .await
            .map_err(OdmError::post_hook(method, false))?;
        Ok(match response {
            HookResponse::Value(value) => value,
            _ => value,
        })
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("kind", &self.model.kind())
            .field("key", &self.key)
            .field("data", &self.data)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldType, PathDefinition, Schema, VirtualField};
    use crate::test_support::{gstore, record};
    use gstore_hooks::{post_fn, pre_fn, Flow, HookError};

    fn user_schema() -> Arc<Schema> {
        Schema::builder()
            .path("firstname", PathDefinition::of(FieldType::String))
            .path("lastname", PathDefinition::of(FieldType::String))
            .path("status", PathDefinition::of(FieldType::String).default_value("active"))
            .path("nickname", PathDefinition::of(FieldType::String).optional())
            .path("password", PathDefinition::of(FieldType::String).read(false))
            .path("address", PathDefinition::of(FieldType::Object))
            .virtual_field(
                "fullName",
                VirtualField::new()
                    .get(|r| {
                        let first = r.get("firstname").and_then(Value::as_str).unwrap_or_default();
                        let last = r.get("lastname").and_then(Value::as_str).unwrap_or_default();
                        Value::from(format!("{first} {last}"))
                    })
                    .set(|r, v| {
                        if let Some((first, last)) = v.as_str().and_then(|s| s.split_once(' ')) {
                            r.insert("firstname".into(), Value::from(first));
                            r.insert("lastname".into(), Value::from(last));
                        }
                    }),
            )
            .method("greet", |entity, args| {
                let greeting = args.first().and_then(Value::as_str).unwrap_or("Hello");
                let name = entity.get("firstname").and_then(|v| v.as_str().map(str::to_string));
                Ok(Value::from(format!("{greeting} {}", name.unwrap_or_default())))
            })
            .build()
            .unwrap()
    }

    // -----------------------------------------------------------------------
    // Construction
    // -----------------------------------------------------------------------

    #[test]
    fn construction_fills_defaults_and_nulls() {
        let model = gstore().model("User", user_schema()).unwrap();
        let entity = model.entity(Record::new());
        assert_eq!(entity.data().get("status"), Some(&Value::from("active")));
        assert_eq!(entity.data().get("firstname"), Some(&Value::Null));
        assert!(!entity.data().contains_key("nickname"));
        assert!(!entity.key().is_complete());
    }

    #[test]
    fn virtual_input_is_routed_through_setter() {
        let model = gstore().model("User", user_schema()).unwrap();
        let entity = model.entity(record(&[("fullName", Value::from("John Snow"))]));
        assert_eq!(entity.data().get("firstname"), Some(&Value::from("John")));
        assert!(!entity.data().contains_key("fullName"));
        assert_eq!(entity.get("fullName"), Some(Value::from("John Snow")));
    }

    #[test]
    fn dotted_get_and_set() {
        let model = gstore().model("User", user_schema()).unwrap();
        let mut entity = model.entity(Record::new());
        entity.set("address.city", Value::from("Rome")).unwrap();
        assert_eq!(entity.get("address.city"), Some(Value::from("Rome")));
        entity.set("fullName", Value::from("Arya Stark")).unwrap();
        assert_eq!(entity.get("lastname"), Some(Value::from("Stark")));
        entity.set("firstname", Value::from("x")).unwrap();
        assert!(entity.set("firstname.inner", Value::from(1)).is_err());
    }

    #[test]
    fn plain_output() {
        let model = gstore().model("User", user_schema()).unwrap();
        let key = model.key(5, &Default::default()).unwrap();
        let entity = model.entity_with_key(
            record(&[("firstname", Value::from("John")), ("password", Value::from("x"))]),
            key.clone(),
        );
        let plain = entity.plain(PlainOptions::default());
        assert_eq!(plain.get("id"), Some(&Value::Integer(5)));
        assert!(!plain.contains_key("password"));
        assert!(!plain.contains_key("fullName"));

        let full = entity.plain(PlainOptions {
            read_all: true,
            virtuals: true,
            show_key: true,
        });
        assert!(full.contains_key("password"));
        assert!(full.contains_key("fullName"));
        assert_eq!(full.get(KEY_FIELD), Some(&Value::Key(key)));
    }

    #[test]
    fn to_json_renders_plain() {
        let model = gstore().model("User", user_schema()).unwrap();
        let entity = model.entity(record(&[("firstname", Value::from("John"))]));
        let json = entity.to_json(PlainOptions::default());
        assert_eq!(json["firstname"], "John");
    }

    // -----------------------------------------------------------------------
    // Validation and custom methods
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn scenario_a_required_name_on_empty_entity() {
        let schema = Schema::builder()
            .path("name", PathDefinition::of(FieldType::String).required())
            .path("age", PathDefinition::of(FieldType::Int))
            .build()
            .unwrap();
        let model = gstore().model("Person", schema).unwrap();
        let mut entity = model.entity(Record::new());
        let err = entity.validate().await.unwrap_err();
        let report = err.validation_report().unwrap();
        assert_eq!(
            report.kind_of("name"),
            Some(crate::validation::FieldErrorKind::Required)
        );
        assert!(report.error("age").is_none());
    }

    #[tokio::test]
    async fn validate_hooks_run_around_the_check() {
        let schema = Schema::builder()
            .path("name", PathDefinition::of(FieldType::String))
            .pre(
                "validate",
                Arc::new(pre_fn("trim", |entity: &mut Entity, _: &HookArgs| {
                    if let Some(Value::String(name)) = entity.data_mut().get_mut("name") {
                        *name = name.trim().to_string();
                    }
                    Ok(Flow::Continue)
                })),
            )
            .build()
            .unwrap();
        let model = gstore().model("Person", schema).unwrap();
        let mut entity = model.entity(record(&[("name", Value::from("  ann "))]));
        assert!(entity.validate().await.unwrap().is_valid());
        assert_eq!(entity.get("name"), Some(Value::from("ann")));
    }

    #[tokio::test]
    async fn call_custom_method_with_hooks() {
        let schema = Schema::builder()
            .path("firstname", PathDefinition::of(FieldType::String))
            .method("greet", |entity, args| {
                let greeting = args.first().and_then(Value::as_str).unwrap_or("Hello");
                let name = entity.get("firstname").and_then(|v| v.as_str().map(str::to_string));
                Ok(Value::from(format!("{greeting} {}", name.unwrap_or_default())))
            })
            .pre(
                "greet",
                Arc::new(pre_fn("hi", |_: &mut Entity, _: &HookArgs| {
                    Ok(Flow::Override(HookArgs::Custom(vec![Value::from("Hi")])))
                })),
            )
            .post(
                "greet",
                Arc::new(post_fn("shout", |_: &Entity, result: &HookResponse| match result {
                    HookResponse::Value(Value::String(s)) => {
                        Ok(Flow::Override(HookResponse::Value(Value::from(s.to_uppercase()))))
                    }
                    _ => Ok(Flow::Continue),
                })),
            )
            .build()
            .unwrap();
        let model = gstore().model("User", schema).unwrap();
        let mut entity = model.entity(record(&[("firstname", Value::from("john"))]));
        let value = entity.call("greet", vec![Value::from("Hello")]).await.unwrap();
        assert_eq!(value, Value::from("HI JOHN"));
    }

    #[tokio::test]
    async fn unknown_method_and_failing_pre_hook() {
        let model = gstore().model("User", user_schema()).unwrap();
        let mut entity = model.entity(Record::new());
        assert!(matches!(
            entity.call("missing", Vec::new()).await,
            Err(OdmError::Configuration(_))
        ));

        let schema = Schema::builder()
            .method("noop", |_, _| Ok(Value::Null))
            .pre(
                "noop",
                Arc::new(pre_fn("deny", |_: &mut Entity, _: &HookArgs| {
                    Err(HookError::reject("denied"))
                })),
            )
            .build()
            .unwrap();
        let model = gstore().model("Other", schema).unwrap();
        let mut entity = model.entity(Record::new());
        assert!(matches!(
            entity.call("noop", Vec::new()).await,
            Err(OdmError::PreHook { .. })
        ));
    }
}
