use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use gstore_types::Key;

use crate::entity::StoredEntity;
use crate::error::{CacheError, CacheResult};

/// Optional key and query cache.
///
/// The mapping layer reads entities through `get_keys`, fills misses with
/// `set_keys`, and invalidates with `del_keys` / `clear_queries_by_kind`
/// after every mutation.
#[async_trait]
pub trait Cache: Send + Sync {
    /// Look up `keys`. The result is positional: `None` marks a miss.
    async fn get_keys(&self, keys: &[Key]) -> CacheResult<Vec<Option<StoredEntity>>>;

    /// Store entities, expiring after `ttl` (or the cache default).
    async fn set_keys(&self, entities: &[StoredEntity], ttl: Option<Duration>) -> CacheResult<()>;

    /// Remove the entries stored under `keys`.
    async fn del_keys(&self, keys: &[Key]) -> CacheResult<()>;

    /// Drop every cached query result for the given kinds.
    async fn clear_queries_by_kind(&self, kinds: &[&str]) -> CacheResult<()>;
}

/// Hit and miss counters kept by [`InMemoryCache`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: usize,
    pub misses: usize,
    pub key_deletes: usize,
    pub query_clears: usize,
}

struct CachedEntry {
    entity: StoredEntity,
    expires_at: Option<Instant>,
}

impl CachedEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| now < at)
    }
}

#[derive(Default)]
struct CacheState {
    keys: HashMap<Key, CachedEntry>,
    queries: HashMap<String, HashSet<String>>,
    stats: CacheStats,
    fail_next: bool,
}

impl CacheState {
    fn take_failure(&mut self) -> CacheResult<()> {
        if std::mem::take(&mut self.fail_next) {
            return Err(CacheError::Unavailable("injected cache failure".into()));
        }
        Ok(())
    }
}

/// In-memory, `HashMap`-based cache with per-entry TTL.
///
/// Query results are tracked only by an identifier per kind; the cache
/// stores them so tests can observe `clear_queries_by_kind`. Clones share
/// state.
#[derive(Clone)]
pub struct InMemoryCache {
    default_ttl: Option<Duration>,
    state: Arc<RwLock<CacheState>>,
}

impl InMemoryCache {
    /// Create a cache whose entries never expire unless a TTL is given.
    pub fn new() -> Self {
        Self::with_ttl(None)
    }

    /// Create a cache with a default entry TTL.
    pub fn with_ttl(default_ttl: Option<Duration>) -> Self {
        Self {
            default_ttl,
            state: Arc::new(RwLock::new(CacheState::default())),
        }
    }

    /// Record a cached query result for `kind`.
    pub fn set_query(&self, kind: &str, query_id: impl Into<String>) {
        self.state
            .write()
            .expect("lock poisoned")
            .queries
            .entry(kind.to_string())
            .or_default()
            .insert(query_id.into());
    }

    /// Number of cached queries for `kind`.
    pub fn query_count(&self, kind: &str) -> usize {
        self.state
            .read()
            .expect("lock poisoned")
            .queries
            .get(kind)
            .map_or(0, HashSet::len)
    }

    /// Returns `true` if a live entry exists for `key`.
    pub fn contains(&self, key: &Key) -> bool {
        let now = Instant::now();
        self.state
            .read()
            .expect("lock poisoned")
            .keys
            .get(key)
            .is_some_and(|entry| entry.is_live(now))
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        self.state.read().expect("lock poisoned").stats
    }

    /// Make the next cache call fail.
    pub fn fail_next(&self) {
        self.state.write().expect("lock poisoned").fail_next = true;
    }
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read().expect("lock poisoned");
        f.debug_struct("InMemoryCache")
            .field("default_ttl", &self.default_ttl)
            .field("keys", &state.keys.len())
            .field("query_kinds", &state.queries.len())
            .finish()
    }
}

#[async_trait]
impl Cache for InMemoryCache {
    async fn get_keys(&self, keys: &[Key]) -> CacheResult<Vec<Option<StoredEntity>>> {
        let now = Instant::now();
        let mut state = self.state.write().expect("lock poisoned");
        state.take_failure()?;

        let mut found = Vec::with_capacity(keys.len());
        for key in keys {
            let hit = state
                .keys
                .get(key)
                .filter(|entry| entry.is_live(now))
                .map(|entry| entry.entity.clone());
            if hit.is_some() {
                state.stats.hits += 1;
            } else {
                state.keys.remove(key);
                state.stats.misses += 1;
            }
            found.push(hit);
        }
        Ok(found)
    }

    async fn set_keys(&self, entities: &[StoredEntity], ttl: Option<Duration>) -> CacheResult<()> {
        let expires_at = ttl.or(self.default_ttl).map(|ttl| Instant::now() + ttl);
        let mut state = self.state.write().expect("lock poisoned");
        state.take_failure()?;
        for entity in entities {
            state.keys.insert(
                entity.key.clone(),
                CachedEntry {
                    entity: entity.clone(),
                    expires_at,
                },
            );
        }
        Ok(())
    }

    async fn del_keys(&self, keys: &[Key]) -> CacheResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.take_failure()?;
        for key in keys {
            state.keys.remove(key);
        }
        state.stats.key_deletes += keys.len();
        debug!(count = keys.len(), "cache keys deleted");
        Ok(())
    }

    async fn clear_queries_by_kind(&self, kinds: &[&str]) -> CacheResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        state.take_failure()?;
        for kind in kinds {
            state.queries.remove(*kind);
        }
        state.stats.query_clears += 1;
        Ok(())
    }
}
