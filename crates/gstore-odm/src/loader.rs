//! Batched, memoised key lookups.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::{trace, warn};

use gstore_store::{Cache, Datastore, StoredEntity};
use gstore_types::Key;

use crate::error::OdmResult;

/// Source of entities by key, used by reads and reference population.
#[async_trait]
pub trait Loader: Send + Sync {
    /// Load `keys`, returning one slot per key in input order.
    async fn load_many(&self, keys: &[Key]) -> OdmResult<Vec<Option<StoredEntity>>>;

    /// Forget anything remembered for `key`.
    fn clear(&self, key: &Key);
}

/// Read `keys` positionally, through `cache` when one is given.
///
/// Cache hits are served as is; misses go to the store in one call and
/// are written back with `ttl`. A failing cache read falls back to the
/// store and a failing cache fill is only logged.
pub(crate) async fn read_through(
    datastore: &dyn Datastore,
    cache: Option<&dyn Cache>,
    ttl: Option<Duration>,
    keys: &[Key],
) -> OdmResult<Vec<Option<StoredEntity>>> {
    if let Some(cache) = cache {
        match cache.get_keys(keys).await {
            Ok(cached) => {
                let misses: Vec<Key> = keys
                    .iter()
                    .zip(&cached)
                    .filter(|(_, hit)| hit.is_none())
                    .map(|(key, _)| key.clone())
                    .collect();
                if misses.is_empty() {
                    return Ok(cached);
                }
                let fetched = datastore.get(&misses).await?;
                if !fetched.is_empty() {
                    if let Err(err) = cache.set_keys(&fetched, ttl).await {
                        warn!(error = %err, "cache fill failed");
                    }
                }
                let mut by_key = index(fetched);
                return Ok(keys
                    .iter()
                    .zip(cached)
                    .map(|(key, hit)| hit.or_else(|| by_key.remove(key)))
                    .collect());
            }
            Err(err) => warn!(error = %err, "cache read failed, reading from the store"),
        }
    }

    let by_key = index(datastore.get(keys).await?);
    Ok(keys.iter().map(|key| by_key.get(key).cloned()).collect())
}

fn index(entities: Vec<StoredEntity>) -> HashMap<Key, StoredEntity> {
    entities.into_iter().map(|entity| (entity.key.clone(), entity)).collect()
}

/// Loader that memoises results per canonical key and fetches all unknown
/// keys of a call with a single read, through the cache when it has one.
///
/// Scoped to one unit of work; it never expires entries on its own.
#[derive(Clone)]
pub struct DataLoader {
    datastore: Arc<dyn Datastore>,
    cache: Option<Arc<dyn Cache>>,
    cache_ttl: Option<Duration>,
    memo: Arc<Mutex<HashMap<String, Option<StoredEntity>>>>,
}

impl DataLoader {
    pub fn new(datastore: Arc<dyn Datastore>) -> Self {
        Self {
            datastore,
            cache: None,
            cache_ttl: None,
            memo: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Read misses through `cache`, filling it with `ttl`.
    pub fn with_cache(mut self, cache: Arc<dyn Cache>, ttl: Option<Duration>) -> Self {
        self.cache = Some(cache);
        self.cache_ttl = ttl;
        self
    }

    /// Number of remembered keys.
    pub fn len(&self) -> usize {
        self.memo.lock().expect("lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl Loader for DataLoader {
    async fn load_many(&self, keys: &[Key]) -> OdmResult<Vec<Option<StoredEntity>>> {
        let missing: Vec<Key> = {
            let memo = self.memo.lock().expect("lock poisoned");
            let mut seen = std::collections::HashSet::new();
            keys.iter()
                .filter(|key| {
                    let canonical = key.canonical();
                    !memo.contains_key(&canonical) && seen.insert(canonical)
                })
                .cloned()
                .collect()
        };

        if !missing.is_empty() {
            trace!(keys = missing.len(), "loader fetching");
            let fetched = read_through(
                self.datastore.as_ref(),
                self.cache.as_deref(),
                self.cache_ttl,
                &missing,
            )
            .await?;
            let mut memo = self.memo.lock().expect("lock poisoned");
            for (key, entity) in missing.iter().zip(fetched) {
                memo.insert(key.canonical(), entity);
            }
        }

        let memo = self.memo.lock().expect("lock poisoned");
        Ok(keys
            .iter()
            .map(|key| memo.get(&key.canonical()).cloned().flatten())
            .collect())
    }

    fn clear(&self, key: &Key) {
        self.memo.lock().expect("lock poisoned").remove(&key.canonical());
    }
}

impl fmt::Debug for DataLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataLoader")
            .field("remembered", &self.len())
            .field("cached", &self.cache.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gstore_store::{InMemoryCache, InMemoryDatastore};
    use gstore_types::{Record, Value};

    fn seeded() -> InMemoryDatastore {
        let store = InMemoryDatastore::new();
        for id in 1..=3 {
            let mut data = Record::new();
            data.insert("n".into(), Value::Integer(id));
            store.insert_raw(Key::new("Item").with_id(id), data);
        }
        store
    }

    #[tokio::test]
    async fn batches_and_preserves_order() {
        let store = seeded();
        let loader = DataLoader::new(Arc::new(store.clone()));
        let keys = vec![
            Key::new("Item").with_id(3),
            Key::new("Item").with_id(9),
            Key::new("Item").with_id(1),
            Key::new("Item").with_id(3),
        ];
        let loaded = loader.load_many(&keys).await.unwrap();
        assert_eq!(loaded.len(), 4);
        assert_eq!(loaded[0].as_ref().unwrap().key, keys[0]);
        assert!(loaded[1].is_none());
        assert_eq!(loaded[2].as_ref().unwrap().key, keys[2]);
        assert_eq!(loaded[3].as_ref().unwrap().key, keys[0]);

        let stats = store.stats();
        assert_eq!(stats.get_calls, 1);
        assert_eq!(stats.keys_fetched, 3);
    }

    #[tokio::test]
    async fn memoises_hits_and_misses() {
        let store = seeded();
        let loader = DataLoader::new(Arc::new(store.clone()));
        let keys = vec![Key::new("Item").with_id(1), Key::new("Item").with_id(9)];
        loader.load_many(&keys).await.unwrap();
        loader.load_many(&keys).await.unwrap();
        assert_eq!(store.stats().get_calls, 1);
        assert_eq!(loader.len(), 2);

        loader.clear(&keys[0]);
        loader.load_many(&keys).await.unwrap();
        let stats = store.stats();
        assert_eq!(stats.get_calls, 2);
        assert_eq!(stats.keys_fetched, 3);
    }

    #[tokio::test]
    async fn cached_keys_skip_the_store() {
        let store = seeded();
        let cache = InMemoryCache::new();
        let one = store.get(&[Key::new("Item").with_id(1)]).await.unwrap();
        cache.set_keys(&one, None).await.unwrap();
        store.reset_stats();

        let loader = DataLoader::new(Arc::new(store.clone())).with_cache(Arc::new(cache.clone()), None);
        let keys = vec![Key::new("Item").with_id(1), Key::new("Item").with_id(2)];
        let loaded = loader.load_many(&keys).await.unwrap();
        assert!(loaded.iter().all(Option::is_some));
        assert_eq!(store.stats().keys_fetched, 1);
        assert_eq!(cache.stats().hits, 1);
        assert!(cache.contains(&keys[1]));
    }
}
