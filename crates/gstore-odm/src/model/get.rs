//! Keyed reads.

use std::sync::Arc;

use tracing::debug;

use gstore_store::StoredEntity;
use gstore_types::{Key, Value};

use super::Model;
use crate::entity::Entity;
use crate::error::{OdmError, OdmResult};
use crate::key::KeyPath;
use crate::loader::{read_through, Loader};

/// Options for [`Model::get`] and friends.
#[derive(Clone, Default)]
pub struct GetOptions {
    /// Read through the cache. Defaults to the registry's `cache_reads`.
    pub cache: Option<bool>,
    /// Read through this loader instead of the cache or store.
    pub loader: Option<Arc<dyn Loader>>,
}

impl GetOptions {
    pub fn with_loader(loader: Arc<dyn Loader>) -> Self {
        Self {
            loader: Some(loader),
            ..Self::default()
        }
    }

    pub fn no_cache() -> Self {
        Self {
            cache: Some(false),
            ..Self::default()
        }
    }
}

impl Model {
    /// Fetch one entity by id.
    ///
    /// A missing entity is [`OdmError::EntityNotFound`] when the registry is
    /// configured with `error_on_entity_not_found`, otherwise `None`.
    pub async fn get(
        &self,
        id: impl Into<Value>,
        path: &KeyPath,
        options: GetOptions,
    ) -> OdmResult<Option<Entity>> {
        let key = self.key(id, path)?;
        let mut found = self.get_by_keys(&[key], options).await?;
        Ok(found.pop().flatten())
    }

    /// Fetch several entities by id. Results are positional: slot `i` holds
    /// the entity for `ids[i]`.
    pub async fn get_many(
        &self,
        ids: &[Value],
        path: &KeyPath,
        options: GetOptions,
    ) -> OdmResult<Vec<Option<Entity>>> {
        let keys = self.keys(ids, path)?;
        self.get_by_keys(&keys, options).await
    }

    /// Fetch entities by key, positionally.
    pub async fn get_by_keys(&self, keys: &[Key], options: GetOptions) -> OdmResult<Vec<Option<Entity>>> {
        let fetched = self.fetch(keys, &options).await?;
        let mut out = Vec::with_capacity(keys.len());
        for (key, stored) in keys.iter().zip(fetched) {
            match stored {
                Some(stored) => out.push(Some(self.hydrate(stored))),
                None if self.config().error_on_entity_not_found => {
                    return Err(OdmError::EntityNotFound { key: key.clone() })
                }
                None => out.push(None),
            }
        }
        debug!(kind = %self.kind(), requested = keys.len(), "get");
        Ok(out)
    }

    async fn fetch(&self, keys: &[Key], options: &GetOptions) -> OdmResult<Vec<Option<StoredEntity>>> {
        if let Some(loader) = &options.loader {
            return loader.load_many(keys).await;
        }

        let use_cache = options.cache.unwrap_or(self.config().cache_reads);
        let cache = self.cache().filter(|_| use_cache);
        read_through(
            self.datastore().as_ref(),
            cache.map(|cache| &**cache),
            self.config().cache_ttl,
            keys,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GstoreConfig;
    use crate::registry::Gstore;
    use crate::schema::{FieldType, PathDefinition, Schema};
    use crate::test_support::{gstore_with, record};
    use gstore_store::{InMemoryCache, InMemoryDatastore};

    fn schema() -> Arc<Schema> {
        Schema::builder()
            .path("name", PathDefinition::of(FieldType::String))
            .path("password", PathDefinition::of(FieldType::String).read(false))
            .build()
            .unwrap()
    }

    fn seed(store: &InMemoryDatastore, id: i64, name: &str) -> Key {
        let key = Key::new("User").with_id(id);
        store.insert_raw(key.clone(), record(&[("name", Value::from(name))]));
        key
    }

    #[tokio::test]
    async fn get_hydrates_stored_entity() {
        let store = InMemoryDatastore::new();
        seed(&store, 1, "john");
        let users = gstore_with(&store).model("User", schema()).unwrap();
        let user = users.get(1, &KeyPath::new(), GetOptions::default()).await.unwrap().unwrap();
        assert_eq!(user.get("name"), Some(Value::from("john")));
        assert_eq!(user.data().get("password"), Some(&Value::Null));
    }

    #[tokio::test]
    async fn missing_entity_errors_or_returns_none() {
        let store = InMemoryDatastore::new();
        let users = gstore_with(&store).model("User", schema()).unwrap();
        assert!(matches!(
            users.get(9, &KeyPath::new(), GetOptions::default()).await,
            Err(OdmError::EntityNotFound { .. })
        ));

        let lenient = Gstore::with_options(
            Arc::new(store),
            GstoreConfig {
                error_on_entity_not_found: false,
                ..GstoreConfig::default()
            },
            None,
        );
        let users = lenient.model("User", schema()).unwrap();
        assert!(users.get(9, &KeyPath::new(), GetOptions::default()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_many_is_positional() {
        let store = InMemoryDatastore::new();
        seed(&store, 1, "a");
        seed(&store, 2, "b");
        let gstore = Gstore::with_options(
            Arc::new(store.clone()),
            GstoreConfig {
                error_on_entity_not_found: false,
                ..GstoreConfig::default()
            },
            None,
        );
        let users = gstore.model("User", schema()).unwrap();
        let found = users
            .get_many(
                &[Value::from(2), Value::from(7), Value::from(1)],
                &KeyPath::new(),
                GetOptions::default(),
            )
            .await
            .unwrap();
        assert_eq!(found[0].as_ref().unwrap().get("name"), Some(Value::from("b")));
        assert!(found[1].is_none());
        assert_eq!(found[2].as_ref().unwrap().get("name"), Some(Value::from("a")));
        assert_eq!(store.stats().get_calls, 1);
    }

    #[tokio::test]
    async fn cache_is_filled_then_served() {
        let store = InMemoryDatastore::new();
        seed(&store, 1, "a");
        let cache = InMemoryCache::new();
        let gstore = Gstore::with_options(
            Arc::new(store.clone()),
            GstoreConfig::default(),
            Some(Arc::new(cache.clone())),
        );
        let users = gstore.model("User", schema()).unwrap();

        users.get(1, &KeyPath::new(), GetOptions::default()).await.unwrap();
        assert!(cache.contains(&Key::new("User").with_id(1)));
        users.get(1, &KeyPath::new(), GetOptions::default()).await.unwrap();
        assert_eq!(store.stats().get_calls, 1);
        assert_eq!(cache.stats().hits, 1);

        users.get(1, &KeyPath::new(), GetOptions::no_cache()).await.unwrap();
        assert_eq!(store.stats().get_calls, 2);
    }

    #[tokio::test]
    async fn cache_read_failure_falls_back_to_store() {
        let store = InMemoryDatastore::new();
        seed(&store, 1, "a");
        let cache = InMemoryCache::new();
        let gstore = Gstore::with_options(
            Arc::new(store.clone()),
            GstoreConfig::default(),
            Some(Arc::new(cache.clone())),
        );
        let users = gstore.model("User", schema()).unwrap();
        cache.fail_next();
        let user = users.get(1, &KeyPath::new(), GetOptions::default()).await.unwrap();
        assert!(user.is_some());
        assert_eq!(store.stats().get_calls, 1);
    }

    #[tokio::test]
    async fn loader_bypasses_cache_and_batches() {
        let store = InMemoryDatastore::new();
        seed(&store, 1, "a");
        let gstore = gstore_with(&store);
        let users = gstore.model("User", schema()).unwrap();
        let loader: Arc<dyn Loader> = gstore.create_data_loader();
        for _ in 0..3 {
            users
                .get(1, &KeyPath::new(), GetOptions::with_loader(loader.clone()))
                .await
                .unwrap();
        }
        assert_eq!(store.stats().get_calls, 1);
    }
}
