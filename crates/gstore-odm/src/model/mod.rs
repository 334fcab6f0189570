//! Models: the per-kind handle for creating, reading and mutating entities.
//!
//! Operations are split by concern:
//! - [`get`] - keyed reads through loader, cache or store
//! - [`save`] - the save flow shared by entities and batch saves
//! - [`update`] - read-merge-write inside a transaction
//! - [`delete`] - keyed deletes
//! - [`delete_all`] - batched deletion of a whole kind or subtree

pub(crate) mod delete;
pub(crate) mod delete_all;
pub(crate) mod get;
pub(crate) mod save;
pub(crate) mod update;

use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::debug;

use gstore_store::{Cache, CacheError, Datastore, StoredEntity};
use gstore_types::{Key, Record, Value};

use crate::config::GstoreConfig;
use crate::entity::Entity;
use crate::error::OdmResult;
use crate::hooks::EntityPipeline;
use crate::key::{derive_key, derive_keys, KeyPath};
use crate::loader::Loader;
use crate::populate::{populate_entities, PopulateRef};
use crate::registry::Shared;
use crate::sanitize::{sanitize, SanitizeOptions};
use crate::schema::{Method, Schema};

pub use delete::{DeleteOptions, DeleteRequest, DeleteResult};
pub use delete_all::DeleteAllResult;
pub use get::GetOptions;
pub use save::SaveOptions;
pub use update::UpdateOptions;

struct ModelInner {
    kind: String,
    schema: Arc<Schema>,
    index_overlay: RwLock<Vec<String>>,
    shared: Arc<Shared>,
}

/// Handle for one entity kind bound to a store.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct Model {
    inner: Arc<ModelInner>,
}

impl Model {
    pub(crate) fn new(
        kind: impl Into<String>,
        schema: Arc<Schema>,
        shared: Arc<Shared>,
    ) -> Self {
        Self {
            inner: Arc::new(ModelInner {
                kind: kind.into(),
                schema,
                index_overlay: RwLock::new(Vec::new()),
                shared,
            }),
        }
    }

    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    pub fn schema(&self) -> &Arc<Schema> {
        &self.inner.schema
    }

    pub fn config(&self) -> &GstoreConfig {
        &self.inner.shared.config
    }

    pub fn datastore(&self) -> &Arc<dyn Datastore> {
        &self.inner.shared.datastore
    }

    pub fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.inner.shared.cache.as_ref()
    }

    pub(crate) fn shared(&self) -> &Arc<Shared> {
        &self.inner.shared
    }

    // -----------------------------------------------------------------------
    // Keys and entities
    // -----------------------------------------------------------------------

    /// Derive the key for `id` under `path`.
    pub fn key(&self, id: impl Into<Value>, path: &KeyPath) -> OdmResult<Key> {
        let id = id.into();
        Ok(derive_key(
            self.kind(),
            Some(&id),
            path,
            self.datastore().namespace(),
            self.schema().options().key_type,
        )?)
    }

    /// Derive one key per id, in input order.
    pub fn keys(&self, ids: &[Value], path: &KeyPath) -> OdmResult<Vec<Key>> {
        Ok(derive_keys(
            self.kind(),
            ids,
            path,
            self.datastore().namespace(),
            self.schema().options().key_type,
        )?)
    }

    /// A new entity with an incomplete key; the store assigns the id on
    /// save.
    pub fn entity(&self, data: Record) -> Entity {
        let key = Key::new(self.kind()).with_namespace(self.datastore().namespace().map(str::to_string));
        Entity::new(self.clone(), data, key)
    }

    /// A new entity whose key is derived from `id` under `path`.
    pub fn entity_with_id(&self, data: Record, id: impl Into<Value>, path: &KeyPath) -> OdmResult<Entity> {
        let key = self.key(id, path)?;
        Ok(Entity::new(self.clone(), data, key))
    }

    pub fn entity_with_key(&self, data: Record, key: Key) -> Entity {
        Entity::new(self.clone(), data, key)
    }

    pub(crate) fn hydrate(&self, stored: StoredEntity) -> Entity {
        Entity::new(self.clone(), stored.data, stored.key)
    }

    /// Strip fields callers may not write: non-writable paths always, and
    /// undeclared fields under `explicit_only`.
    pub fn sanitize(&self, data: Record) -> Record {
        sanitize(self.schema(), data, SanitizeOptions::default())
    }

    /// Exclude extra top-level properties from indexes for every entity
    /// built by this model from now on.
    pub fn exclude_from_indexes(&self, properties: &[&str]) {
        let mut overlay = self.inner.index_overlay.write().expect("lock poisoned");
        for property in properties {
            if !overlay.iter().any(|p| p == property) {
                overlay.push(property.to_string());
            }
        }
    }

    pub(crate) fn index_overlay(&self) -> Vec<String> {
        self.inner.index_overlay.read().expect("lock poisoned").clone()
    }

    /// The hook pipeline wrapping `method` for this kind.
    pub fn hooks(&self, method: &Method) -> EntityPipeline {
        self.schema().hooks(method)
    }

    // -----------------------------------------------------------------------
    // Cache
    // -----------------------------------------------------------------------

    /// Drop cached entries for `keys` and every cached query of this kind.
    pub async fn clear_cache(&self, keys: &[Key]) -> Result<(), CacheError> {
        self.invalidate(keys).await
    }

    /// Cache invalidation after a mutation. A no-op without a cache.
    pub(crate) async fn invalidate(&self, keys: &[Key]) -> Result<(), CacheError> {
        self.invalidate_with(keys, true).await
    }

    pub(crate) async fn invalidate_with(&self, keys: &[Key], clear_queries: bool) -> Result<(), CacheError> {
        let Some(cache) = self.cache() else {
            return Ok(());
        };
        if !keys.is_empty() {
            cache.del_keys(keys).await?;
        }
        if clear_queries {
            cache.clear_queries_by_kind(&[self.kind()]).await?;
        }
        debug!(kind = %self.kind(), keys = keys.len(), clear_queries, "cache invalidated");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Population
    // -----------------------------------------------------------------------

    /// Resolve references on several entities, sharing one load per level.
    pub async fn populate(
        &self,
        mut entities: Vec<Entity>,
        refs: Vec<PopulateRef>,
        loader: Option<Arc<dyn Loader>>,
    ) -> OdmResult<Vec<Entity>> {
        populate_entities(&mut entities, refs, loader).await?;
        Ok(entities)
    }
}

impl fmt::Debug for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Model")
            .field("kind", &self.inner.kind)
            .field("schema", &self.inner.schema)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::Gstore;
    use crate::schema::{FieldType, KeyType, PathDefinition};
    use crate::test_support::{gstore, gstore_with, record};
    use gstore_store::{InMemoryCache, InMemoryDatastore};
    use gstore_types::KeyId;

    fn schema() -> Arc<Schema> {
        Schema::builder()
            .path("name", PathDefinition::of(FieldType::String))
            .path("secret", PathDefinition::of(FieldType::String).write(false))
            .path("bio", PathDefinition::of(FieldType::String))
            .build()
            .unwrap()
    }

    #[test]
    fn keys_follow_key_type_and_namespace() {
        let store = InMemoryDatastore::with_namespace(Some("tenant".into()));
        let gstore = gstore_with(&store);
        let model = gstore
            .model("User", Schema::builder().key_type(KeyType::Name).build().unwrap())
            .unwrap();
        let key = model.key(12, &KeyPath::new()).unwrap();
        assert_eq!(key.id, Some(KeyId::Name("12".into())));
        assert_eq!(key.namespace.as_deref(), Some("tenant"));

        let keys = model
            .keys(&[Value::from("a"), Value::from("b")], &KeyPath::new().ancestor("Org", 1))
            .unwrap();
        assert_eq!(keys.len(), 2);
        assert_eq!(keys[1].ancestors.len(), 1);

        let entity = model.entity(Record::new());
        assert_eq!(entity.key().namespace.as_deref(), Some("tenant"));
    }

    #[test]
    fn sanitize_strips_non_writable() {
        let model = gstore().model("User", schema()).unwrap();
        let out = model.sanitize(record(&[
            ("name", Value::from("a")),
            ("secret", Value::from("x")),
            ("other", Value::from(1)),
        ]));
        assert_eq!(out.keys().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn index_overlay_applies_to_new_entities() {
        let model = gstore().model("User", schema()).unwrap();
        model.exclude_from_indexes(&["bio", "bio"]);
        let entity = model.entity(record(&[("bio", Value::from("long text"))]));
        assert_eq!(entity.exclude_from_indexes(), ["bio".to_string()]);
    }

    #[test]
    fn models_outlive_their_registry() {
        let gstore = gstore();
        let model = gstore.model("User", schema()).unwrap();
        drop(gstore);
        assert!(model.shared().schema_of("User").is_some());
        assert!(model.key(1, &KeyPath::new()).is_ok());
    }

    #[tokio::test]
    async fn clear_cache_drops_keys_and_queries() {
        let store = InMemoryDatastore::new();
        let cache = InMemoryCache::new();
        let gstore = Gstore::with_options(
            Arc::new(store),
            GstoreConfig::default(),
            Some(Arc::new(cache.clone())),
        );
        let model = gstore.model("User", schema()).unwrap();
        cache.set_query("User", "q1");
        model.clear_cache(&[model.key(1, &KeyPath::new()).unwrap()]).await.unwrap();
        assert_eq!(cache.query_count("User"), 0);
        assert_eq!(cache.stats().key_deletes, 1);
    }
}
