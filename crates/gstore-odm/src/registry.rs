//! The registry: one store connection, its cache, and every model.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use gstore_store::{Cache, Datastore};

use crate::config::GstoreConfig;
use crate::entity::Entity;
use crate::error::{OdmError, OdmResult, Persisted};
use crate::loader::DataLoader;
use crate::model::{save, Model};
use crate::schema::Schema;
use crate::transaction::{self, Transaction};

/// State shared by the registry and every model it creates.
///
/// Models hold it strongly, so it outlives the [`Gstore`] that built them.
pub(crate) struct Shared {
    pub(crate) datastore: Arc<dyn Datastore>,
    pub(crate) cache: Option<Arc<dyn Cache>>,
    pub(crate) config: GstoreConfig,
    /// Schemas of registered kinds, for resolving references.
    schemas: RwLock<HashMap<String, Arc<Schema>>>,
}

impl Shared {
    pub(crate) fn new(
        datastore: Arc<dyn Datastore>,
        cache: Option<Arc<dyn Cache>>,
        config: GstoreConfig,
    ) -> Self {
        Self {
            datastore,
            cache,
            config,
            schemas: RwLock::new(HashMap::new()),
        }
    }

    /// Schema registered for `kind`.
    pub(crate) fn schema_of(&self, kind: &str) -> Option<Arc<Schema>> {
        self.schemas.read().expect("lock poisoned").get(kind).cloned()
    }

    /// Cache used by reads, if any and enabled.
    pub(crate) fn read_cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref().filter(|_| self.config.cache_reads)
    }

    /// A loader over the store, reading through the cache when reads use it.
    pub(crate) fn data_loader(&self) -> DataLoader {
        let loader = DataLoader::new(Arc::clone(&self.datastore));
        match self.read_cache() {
            Some(cache) => loader.with_cache(Arc::clone(cache), self.config.cache_ttl),
            None => loader,
        }
    }
}

struct RegistryInner {
    shared: Arc<Shared>,
    models: RwLock<HashMap<String, Model>>,
}

/// Entry point: binds a store (and optional cache) to a set of models.
///
/// Cheap to clone; clones share the same model table.
#[derive(Clone)]
pub struct Gstore {
    inner: Arc<RegistryInner>,
}

impl Gstore {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self::with_options(datastore, GstoreConfig::default(), None)
    }

    pub fn with_options(
        datastore: Arc<dyn Datastore>,
        config: GstoreConfig,
        cache: Option<Arc<dyn Cache>>,
    ) -> Self {
        info!(
            namespace = ?datastore.namespace(),
            cache = cache.is_some(),
            "gstore initialised"
        );
        Self {
            inner: Arc::new(RegistryInner {
                shared: Arc::new(Shared::new(datastore, cache, config)),
                models: RwLock::new(HashMap::new()),
            }),
        }
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

    /// Register `schema` under `kind` and return its model.
    ///
    /// Registering the same schema again returns the existing model; a
    /// different schema for a known kind is a configuration error.
    pub fn model(&self, kind: &str, schema: Arc<Schema>) -> OdmResult<Model> {
        let mut models = self.inner.models.write().expect("lock poisoned");
        if let Some(existing) = models.get(kind) {
            if Arc::ptr_eq(existing.schema(), &schema) {
                return Ok(existing.clone());
            }
            return Err(OdmError::Configuration(format!(
                "model '{kind}' is already registered with a different schema"
            )));
        }
        let model = Model::new(kind, Arc::clone(&schema), Arc::clone(&self.inner.shared));
        self.inner
            .shared
            .schemas
            .write()
            .expect("lock poisoned")
            .insert(kind.to_string(), schema);
        models.insert(kind.to_string(), model.clone());
        debug!(kind, "model registered");
        Ok(model)
    }

    /// Build a model bound to this store without registering it.
    pub fn model_uncached(&self, kind: &str, schema: Arc<Schema>) -> Model {
        Model::new(kind, schema, Arc::clone(&self.inner.shared))
    }

    /// Look up a registered model.
    pub fn model_of(&self, kind: &str) -> OdmResult<Model> {
        self.inner
            .models
            .read()
            .expect("lock poisoned")
            .get(kind)
            .cloned()
            .ok_or_else(|| OdmError::Configuration(format!("model '{kind}' is not registered")))
    }

    /// Registered kinds, sorted.
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self
            .inner
            .models
            .read()
            .expect("lock poisoned")
            .keys()
            .cloned()
            .collect();
        kinds.sort();
        kinds
    }

    /// A new, not yet started transaction. Call [`Transaction::run`] before
    /// using it.
    pub async fn transaction(&self) -> OdmResult<Transaction> {
        let backend = self.datastore().transaction().await?;
        Ok(Transaction::new(backend, Arc::clone(self.datastore())))
    }

    /// A fresh loader over this store, for one unit of work. Misses read
    /// through the cache when reads use it.
    pub fn create_data_loader(&self) -> Arc<DataLoader> {
        Arc::new(self.inner.shared.data_loader())
    }

    /// Save many entities, possibly of different kinds, in one store write.
    ///
    /// Entities are sanitized, validated and prepared as in a single save,
    /// but no hooks run. Any invalid entity aborts the batch before the
    /// store is touched.
    pub async fn save_all(
        &self,
        mut entities: Vec<Entity>,
        txn: Option<&mut Transaction>,
    ) -> OdmResult<Vec<Entity>> {
        let mut writes = Vec::with_capacity(entities.len());
        for entity in &mut entities {
            save::check(entity, None)?;
            writes.push(save::to_write(entity, Default::default()));
        }

        match txn {
            None => {
                let ack = self.datastore().save(writes).await?;
                for (entity, key) in entities.iter_mut().zip(ack.keys) {
                    entity.set_key(key);
                }
                for entity in &entities {
                    if let Err(source) = entity.model().invalidate(&[entity.key().clone()]).await {
                        return Err(OdmError::Cache {
                            result: Box::new(Persisted::Entity(Box::new(entity.clone()))),
                            source,
                        });
                    }
                }
            }
            Some(txn) => {
                for (entity, mut write) in entities.iter_mut().zip(writes) {
                    let key = txn.complete_key(entity.key().clone()).await?;
                    entity.set_key(key.clone());
                    write.key = key.clone();
                    txn.queue_save(write)?;
                    let model = entity.model().clone();
                    txn.after_commit(transaction::replay(
                        txn.id().to_string(),
                        model,
                        Default::default(),
                        "save",
                        entity.clone(),
                        crate::hooks::HookResponse::Entity(entity.clone()),
                        vec![key],
                    ));
                }
            }
        }
        debug!(count = entities.len(), "saved batch");
        Ok(entities)
    }
}

impl fmt::Debug for Gstore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gstore")
            .field("namespace", &self.datastore().namespace())
            .field("cache", &self.cache().is_some())
            .field("kinds", &self.kinds())
            .finish()
    }
}
