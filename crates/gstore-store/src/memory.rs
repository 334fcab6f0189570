use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use tracing::debug;

use gstore_types::{Key, KeyId, Record};

use crate::entity::{DeleteAck, SaveAck, SaveMethod, StoredEntity, WriteSpec};
use crate::error::{StoreError, StoreResult};
use crate::query::{compare_values, Query, QueryResponse};
use crate::traits::{Datastore, TransactionBackend};

/// Operation an [`InMemoryDatastore`] can be told to fail once.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FailOn {
    Get,
    Save,
    Delete,
    Query,
    Commit,
}

/// Call counters kept by [`InMemoryDatastore`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Non-transactional `get` calls.
    pub get_calls: usize,
    /// Keys requested across all non-transactional `get` calls.
    pub keys_fetched: usize,
    /// Transactional `get` calls.
    pub tx_get_calls: usize,
    /// Non-transactional `save` calls.
    pub save_calls: usize,
    /// Entities written, transactional commits included.
    pub entities_written: usize,
    /// Size of every non-transactional `delete` call, in call order.
    pub delete_batches: Vec<usize>,
    pub query_calls: usize,
    pub transactions: usize,
    pub commits: usize,
    pub rollbacks: usize,
}

/// An entity row plus the index exclusions it was written with.
#[derive(Clone, Debug)]
struct Row {
    data: Record,
    excluded: Vec<String>,
}

impl Row {
    /// One index row for the key plus one per indexed top-level property.
    fn index_rows(&self) -> u64 {
        let indexed = self
            .data
            .keys()
            .filter(|field| !self.excluded.iter().any(|e| e == *field))
            .count();
        1 + indexed as u64
    }
}

struct State {
    rows: BTreeMap<Key, Row>,
    next_id: i64,
    stats: StoreStats,
    failures: HashSet<FailOn>,
}

struct Inner {
    namespace: Option<String>,
    state: RwLock<State>,
}

impl Inner {
    fn take_failure(&self, op: FailOn) -> StoreResult<()> {
        let mut state = self.state.write().expect("lock poisoned");
        if state.failures.remove(&op) {
            return Err(StoreError::Backend(format!("injected {op:?} failure")));
        }
        Ok(())
    }
}

/// In-memory, `BTreeMap`-based document store.
///
/// Intended for tests and embedding. Entities are kept in key order behind
/// a `RwLock`; ids for incomplete keys are allocated sequentially from 1.
/// Cloning the store yields another handle to the same data.
#[derive(Clone)]
pub struct InMemoryDatastore {
    inner: Arc<Inner>,
}

impl InMemoryDatastore {
    /// Create a new empty store with no default namespace.
    pub fn new() -> Self {
        Self::with_namespace(None)
    }

    /// Create a new empty store whose keys default to `namespace`.
    pub fn with_namespace(namespace: Option<String>) -> Self {
        Self {
            inner: Arc::new(Inner {
                namespace,
                state: RwLock::new(State {
                    rows: BTreeMap::new(),
                    next_id: 1,
                    stats: StoreStats::default(),
                    failures: HashSet::new(),
                }),
            }),
        }
    }

    /// Number of entities currently stored.
    pub fn len(&self) -> usize {
        self.inner.state.read().expect("lock poisoned").rows.len()
    }

    /// Returns `true` if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` if an entity exists under `key`.
    pub fn contains(&self, key: &Key) -> bool {
        self.inner
            .state
            .read()
            .expect("lock poisoned")
            .rows
            .contains_key(key)
    }

    /// Raw data stored under `key`, without touching the call counters.
    pub fn peek(&self, key: &Key) -> Option<Record> {
        self.inner
            .state
            .read()
            .expect("lock poisoned")
            .rows
            .get(key)
            .map(|row| row.data.clone())
    }

    /// Index exclusions `key` was written with.
    pub fn excluded_from_indexes(&self, key: &Key) -> Option<Vec<String>> {
        self.inner
            .state
            .read()
            .expect("lock poisoned")
            .rows
            .get(key)
            .map(|row| row.excluded.clone())
    }

    /// Insert an entity directly, bypassing counters. For fixtures.
    pub fn insert_raw(&self, key: Key, data: Record) {
        let mut state = self.inner.state.write().expect("lock poisoned");
        if let Some(KeyId::Id(id)) = key.id {
            state.next_id = state.next_id.max(id + 1);
        }
        state.rows.insert(
            key,
            Row {
                data,
                excluded: Vec::new(),
            },
        );
    }

    /// Snapshot of the call counters.
    pub fn stats(&self) -> StoreStats {
        self.inner.state.read().expect("lock poisoned").stats.clone()
    }

    /// Reset the call counters.
    pub fn reset_stats(&self) {
        self.inner.state.write().expect("lock poisoned").stats = StoreStats::default();
    }

    /// Make the next call of `op` fail with a backend error.
    pub fn fail_next(&self, op: FailOn) {
        self.inner
            .state
            .write()
            .expect("lock poisoned")
            .failures
            .insert(op);
    }

    /// Remove every entity.
    pub fn clear(&self) {
        self.inner.state.write().expect("lock poisoned").rows.clear();
    }
}

impl Default for InMemoryDatastore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryDatastore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryDatastore")
            .field("namespace", &self.inner.namespace)
            .field("entity_count", &self.len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Write application
// ---------------------------------------------------------------------------

fn complete_key(state: &mut State, key: &Key) -> Key {
    complete_key_from(&mut state.next_id, key)
}

fn complete_key_from(next_id: &mut i64, key: &Key) -> Key {
    if key.is_complete() {
        return key.clone();
    }
    let id = *next_id;
    *next_id += 1;
    key.clone().with_id(id)
}

/// Validate and apply a set of writes atomically: either every write is
/// applied or none is. Ids are only consumed when the whole set applies.
fn apply_writes(state: &mut State, writes: Vec<WriteSpec>) -> StoreResult<Vec<Key>> {
    let mut next_id = state.next_id;
    let mut planned = Vec::with_capacity(writes.len());
    for write in writes {
        let key = complete_key_from(&mut next_id, &write.key);
        let exists = state.rows.contains_key(&key);
        match write.method {
            SaveMethod::Insert if exists => return Err(StoreError::AlreadyExists(key)),
            SaveMethod::Update if !exists => return Err(StoreError::NotFound(key)),
            _ => {}
        }
        planned.push((key, write));
    }
    state.next_id = next_id;

    let mut keys = Vec::with_capacity(planned.len());
    for (key, write) in planned {
        state.rows.insert(
            key.clone(),
            Row {
                data: write.data,
                excluded: write.exclude_from_indexes,
            },
        );
        state.stats.entities_written += 1;
        keys.push(key);
    }
    Ok(keys)
}

fn apply_deletes(state: &mut State, keys: &[Key]) -> u64 {
    keys.iter()
        .filter_map(|key| state.rows.remove(key))
        .map(|row| row.index_rows())
        .sum()
}

fn read_rows(state: &State, keys: &[Key]) -> Vec<StoredEntity> {
    keys.iter()
        .filter_map(|key| {
            state
                .rows
                .get(key)
                .map(|row| StoredEntity::new(key.clone(), row.data.clone()))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Datastore
// ---------------------------------------------------------------------------

#[async_trait]
impl Datastore for InMemoryDatastore {
    fn namespace(&self) -> Option<&str> {
        self.inner.namespace.as_deref()
    }

    async fn get(&self, keys: &[Key]) -> StoreResult<Vec<StoredEntity>> {
        self.inner.take_failure(FailOn::Get)?;
        let mut state = self.inner.state.write().expect("lock poisoned");
        state.stats.get_calls += 1;
        state.stats.keys_fetched += keys.len();
        Ok(read_rows(&state, keys))
    }

    async fn save(&self, writes: Vec<WriteSpec>) -> StoreResult<SaveAck> {
        self.inner.take_failure(FailOn::Save)?;
        let mut state = self.inner.state.write().expect("lock poisoned");
        state.stats.save_calls += 1;
        let keys = apply_writes(&mut state, writes)?;
        debug!(count = keys.len(), "in-memory save");
        Ok(SaveAck { keys })
    }

    async fn delete(&self, keys: &[Key]) -> StoreResult<DeleteAck> {
        self.inner.take_failure(FailOn::Delete)?;
        let mut state = self.inner.state.write().expect("lock poisoned");
        state.stats.delete_batches.push(keys.len());
        let index_updates = apply_deletes(&mut state, keys);
        debug!(count = keys.len(), index_updates, "in-memory delete");
        Ok(DeleteAck { index_updates })
    }

    async fn run_query(&self, query: &Query) -> StoreResult<QueryResponse> {
        self.inner.take_failure(FailOn::Query)?;
        let start = match &query.start {
            Some(cursor) => cursor
                .parse::<usize>()
                .map_err(|_| StoreError::InvalidQuery(format!("bad cursor '{cursor}'")))?,
            None => 0,
        };

        let mut state = self.inner.state.write().expect("lock poisoned");
        state.stats.query_calls += 1;

        let mut matching: Vec<StoredEntity> = state
            .rows
            .iter()
            .map(|(key, row)| StoredEntity::new(key.clone(), row.data.clone()))
            .filter(|entity| query.matches(entity))
            .collect();

        for order in query.orders.iter().rev() {
            matching.sort_by(|a, b| {
                let ordering = match (a.data.get(&order.field), b.data.get(&order.field)) {
                    (Some(x), Some(y)) => compare_values(x, y).unwrap_or(std::cmp::Ordering::Equal),
                    (Some(_), None) => std::cmp::Ordering::Greater,
                    (None, Some(_)) => std::cmp::Ordering::Less,
                    (None, None) => std::cmp::Ordering::Equal,
                };
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let skip = start + query.offset;
        let total = matching.len();
        let page: Vec<StoredEntity> = matching
            .into_iter()
            .skip(skip)
            .take(query.limit.unwrap_or(usize::MAX))
            .map(|entity| query.project(&entity))
            .collect();
        let consumed = skip + page.len();

        Ok(QueryResponse {
            entities: page,
            end_cursor: Some(consumed.to_string()),
            more_results: consumed < total,
        })
    }

    async fn allocate_ids(&self, key: &Key, count: usize) -> StoreResult<Vec<Key>> {
        if key.is_complete() {
            return Err(StoreError::Backend(format!(
                "cannot allocate ids for complete key {key}"
            )));
        }
        let mut state = self.inner.state.write().expect("lock poisoned");
        Ok((0..count).map(|_| complete_key(&mut state, key)).collect())
    }

    async fn transaction(&self) -> StoreResult<Box<dyn TransactionBackend>> {
        self.inner.state.write().expect("lock poisoned").stats.transactions += 1;
        Ok(Box::new(InMemoryTransaction {
            id: uuid::Uuid::now_v7().to_string(),
            inner: Arc::clone(&self.inner),
            status: TxStatus::Created,
            mutations: Vec::new(),
        }))
    }
}

// ---------------------------------------------------------------------------
// Transaction
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum TxStatus {
    Created,
    Running,
    Closed,
}

enum Mutation {
    Save(WriteSpec),
    Delete(Vec<Key>),
}

/// Buffered transaction over an [`InMemoryDatastore`].
struct InMemoryTransaction {
    id: String,
    inner: Arc<Inner>,
    status: TxStatus,
    mutations: Vec<Mutation>,
}

impl InMemoryTransaction {
    fn ensure_running(&self) -> StoreResult<()> {
        match self.status {
            TxStatus::Running => Ok(()),
            TxStatus::Created => Err(StoreError::TransactionNotStarted(self.id.clone())),
            TxStatus::Closed => Err(StoreError::TransactionClosed(self.id.clone())),
        }
    }
}

#[async_trait]
impl TransactionBackend for InMemoryTransaction {
    fn id(&self) -> &str {
        &self.id
    }

    async fn run(&mut self) -> StoreResult<()> {
        match self.status {
            TxStatus::Created => {
                self.status = TxStatus::Running;
                Ok(())
            }
            TxStatus::Running => Ok(()),
            TxStatus::Closed => Err(StoreError::TransactionClosed(self.id.clone())),
        }
    }

    async fn get(&mut self, keys: &[Key]) -> StoreResult<Vec<StoredEntity>> {
        self.ensure_running()?;
        self.inner.take_failure(FailOn::Get)?;
        let mut state = self.inner.state.write().expect("lock poisoned");
        state.stats.tx_get_calls += 1;
        Ok(read_rows(&state, keys))
    }

    fn save(&mut self, write: WriteSpec) -> StoreResult<()> {
        self.ensure_running()?;
        if !write.key.is_complete() {
            return Err(StoreError::IncompleteKey(write.key));
        }
        self.mutations.push(Mutation::Save(write));
        Ok(())
    }

    fn delete(&mut self, keys: &[Key]) -> StoreResult<()> {
        self.ensure_running()?;
        self.mutations.push(Mutation::Delete(keys.to_vec()));
        Ok(())
    }

    async fn commit(&mut self) -> StoreResult<()> {
        self.ensure_running()?;
        self.inner.take_failure(FailOn::Commit)?;

        let mut state = self.inner.state.write().expect("lock poisoned");
        let mutations = std::mem::take(&mut self.mutations);
        let writes: Vec<WriteSpec> = mutations
            .iter()
            .filter_map(|m| match m {
                Mutation::Save(w) => Some(w.clone()),
                Mutation::Delete(_) => None,
            })
            .collect();

        // Validate every write before touching the rows.
        let mut scratch = State {
            rows: state.rows.clone(),
            next_id: state.next_id,
            stats: StoreStats::default(),
            failures: HashSet::new(),
        };
        for mutation in &mutations {
            match mutation {
                Mutation::Save(write) => {
                    apply_writes(&mut scratch, vec![write.clone()])?;
                }
                Mutation::Delete(keys) => {
                    apply_deletes(&mut scratch, keys);
                }
            }
        }

        state.rows = scratch.rows;
        state.stats.entities_written += writes.len();
        state.stats.commits += 1;
        self.status = TxStatus::Closed;
        debug!(tx = %self.id, mutations = mutations.len(), "in-memory commit");
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        if self.status == TxStatus::Closed {
            return Err(StoreError::TransactionClosed(self.id.clone()));
        }
        self.mutations.clear();
        self.status = TxStatus::Closed;
        self.inner.state.write().expect("lock poisoned").stats.rollbacks += 1;
        Ok(())
    }
}
