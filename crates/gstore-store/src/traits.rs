use async_trait::async_trait;

use gstore_types::Key;

use crate::entity::{DeleteAck, SaveAck, StoredEntity, WriteSpec};
use crate::error::StoreResult;
use crate::query::{Query, QueryResponse};

/// Hierarchical-key document store.
///
/// All implementations must satisfy these invariants:
/// - `get` returns only existing entities; order is unspecified.
/// - `save` completes incomplete keys and returns them in request order.
/// - `delete` of a missing key is not an error; it reports zero index
///   updates for that key.
/// - Errors are propagated unchanged, never swallowed.
#[async_trait]
pub trait Datastore: Send + Sync {
    /// Namespace applied to keys that do not name one.
    fn namespace(&self) -> Option<&str> {
        None
    }

    /// Fetch the entities stored under `keys`.
    async fn get(&self, keys: &[Key]) -> StoreResult<Vec<StoredEntity>>;

    /// Write entities, honouring each spec's save method.
    async fn save(&self, writes: Vec<WriteSpec>) -> StoreResult<SaveAck>;

    /// Delete the entities stored under `keys`.
    async fn delete(&self, keys: &[Key]) -> StoreResult<DeleteAck>;

    /// Run a query and return one page of results.
    async fn run_query(&self, query: &Query) -> StoreResult<QueryResponse>;

    /// Reserve `count` ids for the incomplete `key` and return the
    /// completed keys.
    async fn allocate_ids(&self, key: &Key, count: usize) -> StoreResult<Vec<Key>>;

    /// Create a new, not yet started transaction.
    async fn transaction(&self) -> StoreResult<Box<dyn TransactionBackend>>;
}

/// A store transaction.
///
/// Writes are buffered and applied atomically by `commit`. Once committed
/// or rolled back the transaction is closed and every further call fails.
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    /// Backend-assigned transaction identifier.
    fn id(&self) -> &str;

    /// Begin the transaction.
    async fn run(&mut self) -> StoreResult<()>;

    /// Transactional read.
    async fn get(&mut self, keys: &[Key]) -> StoreResult<Vec<StoredEntity>>;

    /// Queue a write. Keys must be complete.
    fn save(&mut self, write: WriteSpec) -> StoreResult<()>;

    /// Queue a delete.
    fn delete(&mut self, keys: &[Key]) -> StoreResult<()>;

    /// Apply every queued mutation.
    async fn commit(&mut self) -> StoreResult<()>;

    /// Discard every queued mutation.
    async fn rollback(&mut self) -> StoreResult<()>;
}
