//! Per-kind schemas: path definitions, virtual fields, custom methods,
//! hooks and options.

mod path;
mod rules;
mod virtuals;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use gstore_hooks::{PostHook, PreHook};
use gstore_types::Value;

use crate::entity::Entity;
use crate::error::{OdmError, OdmResult};
use crate::hooks::{EntityPipeline, HookArgs, HookResponse};

pub use path::{DefaultValue, FieldType, IndexExclusion, PathDefinition};
pub use rules::{Rule, RuleFn};
pub use virtuals::VirtualField;

/// Names that clash with entity and model operations.
pub const RESERVED_NAMES: &[&str] = &[
    "constructor",
    "delete",
    "entityData",
    "entityKey",
    "errors",
    "excludeFromIndexes",
    "get",
    "gstore",
    "hook",
    "init",
    "isNew",
    "model",
    "modelName",
    "plain",
    "populate",
    "save",
    "schema",
    "set",
    "toObject",
    "update",
    "validate",
    "entity_data",
    "entity_key",
    "exclude_from_indexes",
    "is_new",
    "model_name",
    "to_object",
];

/// Field touched with the current time on every save when declared.
pub const MODIFIED_ON: &str = "modifiedOn";

/// A schema-defined method callable through `Entity::call`.
pub type CustomMethod = Arc<dyn Fn(&mut Entity, &[Value]) -> OdmResult<Value> + Send + Sync>;

/// How ids are coerced into key identifiers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// Integers and all-digit strings become numeric ids; other strings
    /// become names.
    #[default]
    Auto,
    /// Always numeric.
    Id,
    /// Always a string name.
    Name,
}

/// Schema-wide options.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaOptions {
    pub validate_before_save: bool,
    /// Reject (validate) and drop (sanitize) fields the schema does not
    /// declare.
    pub explicit_only: bool,
    pub exclude_large_properties: bool,
    pub key_type: KeyType,
}

impl Default for SchemaOptions {
    fn default() -> Self {
        Self {
            validate_before_save: true,
            explicit_only: true,
            exclude_large_properties: false,
            key_type: KeyType::Auto,
        }
    }
}

/// Operation a hook can wrap.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Method {
    Save,
    Delete,
    Validate,
    /// A custom method registered on the schema.
    Custom(String),
}

impl Method {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Save => "save",
            Self::Delete => "delete",
            Self::Validate => "validate",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Schema
// ---------------------------------------------------------------------------

/// Immutable description of an entity kind.
///
/// Built once with [`SchemaBuilder`] and shared behind `Arc` by every model
/// and entity of the kind.
pub struct Schema {
    paths: BTreeMap<String, PathDefinition>,
    virtuals: BTreeMap<String, VirtualField>,
    methods: BTreeMap<String, CustomMethod>,
    hooks: BTreeMap<Method, EntityPipeline>,
    options: SchemaOptions,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::new()
    }

    pub fn paths(&self) -> &BTreeMap<String, PathDefinition> {
        &self.paths
    }

    pub fn path(&self, name: &str) -> Option<&PathDefinition> {
        self.paths.get(name)
    }

    pub fn has_path(&self, name: &str) -> bool {
        self.paths.contains_key(name)
    }

    pub fn virtuals(&self) -> &BTreeMap<String, VirtualField> {
        &self.virtuals
    }

    pub fn virtual_field(&self, name: &str) -> Option<&VirtualField> {
        self.virtuals.get(name)
    }

    pub fn is_virtual(&self, name: &str) -> bool {
        self.virtuals.contains_key(name)
    }

    pub fn method(&self, name: &str) -> Option<&CustomMethod> {
        self.methods.get(name)
    }

    pub fn options(&self) -> &SchemaOptions {
        &self.options
    }

    /// Paths declared as references, in name order.
    pub fn reference_paths(&self) -> Vec<&str> {
        self.paths
            .iter()
            .filter(|(_, def)| def.field_type == Some(FieldType::EntityKey))
            .map(|(name, _)| name.as_str())
            .collect()
    }

    /// The hook pipeline wrapping `method`; empty when none is registered.
    pub fn hooks(&self, method: &Method) -> EntityPipeline {
        self.hooks.get(method).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for Schema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Schema")
            .field("paths", &self.paths.keys().collect::<Vec<_>>())
            .field("virtuals", &self.virtuals.keys().collect::<Vec<_>>())
            .field("methods", &self.methods.keys().collect::<Vec<_>>())
            .field("hooks", &self.hooks)
            .field("options", &self.options)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

enum HookRegistration {
    Pre(Arc<dyn PreHook<Entity, HookArgs>>),
    Post(Arc<dyn PostHook<Entity, HookResponse>>),
}

/// Collects path definitions, virtuals, methods and hooks, then checks
/// them once in [`SchemaBuilder::build`].
#[derive(Default)]
pub struct SchemaBuilder {
    paths: BTreeMap<String, PathDefinition>,
    virtuals: BTreeMap<String, VirtualField>,
    methods: BTreeMap<String, CustomMethod>,
    hooks: Vec<(String, HookRegistration)>,
    options: SchemaOptions,
}

impl SchemaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn path(mut self, name: impl Into<String>, definition: PathDefinition) -> Self {
        self.paths.insert(name.into(), definition);
        self
    }

    pub fn virtual_field(mut self, name: impl Into<String>, field: VirtualField) -> Self {
        self.virtuals.insert(name.into(), field);
        self
    }

    pub fn method(
        mut self,
        name: impl Into<String>,
        method: impl Fn(&mut Entity, &[Value]) -> OdmResult<Value> + Send + Sync + 'static,
    ) -> Self {
        self.methods.insert(name.into(), Arc::new(method));
        self
    }

    /// Register a hook to run before `method`.
    pub fn pre(mut self, method: impl Into<String>, hook: Arc<dyn PreHook<Entity, HookArgs>>) -> Self {
        self.hooks.push((method.into(), HookRegistration::Pre(hook)));
        self
    }

    /// Register a hook to run after `method`.
    pub fn post(
        mut self,
        method: impl Into<String>,
        hook: Arc<dyn PostHook<Entity, HookResponse>>,
    ) -> Self {
        self.hooks.push((method.into(), HookRegistration::Post(hook)));
        self
    }

    pub fn options(mut self, options: SchemaOptions) -> Self {
        self.options = options;
        self
    }

    pub fn key_type(mut self, key_type: KeyType) -> Self {
        self.options.key_type = key_type;
        self
    }

    pub fn validate_before_save(mut self, enabled: bool) -> Self {
        self.options.validate_before_save = enabled;
        self
    }

    pub fn explicit_only(mut self, enabled: bool) -> Self {
        self.options.explicit_only = enabled;
        self
    }

    /// Admit fields the schema does not declare, silently.
    pub fn admit_unknown_fields(self) -> Self {
        self.explicit_only(false)
    }

    pub fn exclude_large_properties(mut self, enabled: bool) -> Self {
        self.options.exclude_large_properties = enabled;
        self
    }

    /// Check names and hook targets and freeze the schema.
    pub fn build(self) -> OdmResult<Arc<Schema>> {
        let names = self
            .paths
            .keys()
            .chain(self.virtuals.keys())
            .chain(self.methods.keys());
        for name in names {
            if RESERVED_NAMES.contains(&name.as_str()) {
                return Err(OdmError::Configuration(format!(
                    "'{name}' is a reserved name and cannot be used in a schema"
                )));
            }
        }

        let mut hooks: BTreeMap<Method, EntityPipeline> = BTreeMap::new();
        for (target, registration) in self.hooks {
            let method = match target.as_str() {
                "save" => Method::Save,
                "delete" => Method::Delete,
                "validate" => Method::Validate,
                other if self.methods.contains_key(other) => Method::Custom(other.to_string()),
                other => {
                    return Err(OdmError::Configuration(format!(
                        "cannot register a hook on unknown method '{other}'"
                    )))
                }
            };
            let pipeline = hooks.entry(method).or_default();
            match registration {
                HookRegistration::Pre(hook) => pipeline.add_pre(hook),
                HookRegistration::Post(hook) => pipeline.add_post(hook),
            }
        }

        Ok(Arc::new(Schema {
            paths: self.paths,
            virtuals: self.virtuals,
            methods: self.methods,
            hooks,
            options: self.options,
        }))
    }
}
