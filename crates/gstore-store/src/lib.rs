//! Backing document-store and cache interfaces for gstore.
//!
//! gstore does not implement a storage engine. It sits above a document
//! store with hierarchical keys, batch get/save/delete, ancestor-scoped
//! queries and transactions. This crate defines that boundary as traits so
//! the mapping layer can run against any backend.
//!
//! # Interfaces
//!
//! - [`Datastore`] - non-transactional reads and writes, queries, id
//!   allocation, and transaction creation
//! - [`TransactionBackend`] - buffered transactional get/save/delete with
//!   commit and rollback
//! - [`Cache`] - optional key/query cache the mapping layer reads through
//!   and invalidates
//!
//! # Backends
//!
//! - [`InMemoryDatastore`] - `BTreeMap`-based store for tests and embedding
//! - [`InMemoryCache`] - `HashMap`-based cache with per-entry TTL
//!
//! # Design Rules
//!
//! 1. The store never interprets entity data beyond what queries need.
//! 2. `get` returns only the entities that exist, in no guaranteed order.
//! 3. Transactional writes are buffered and become visible only on commit.
//! 4. All backend errors are propagated, never silently ignored.

pub mod cache;
pub mod entity;
pub mod error;
pub mod memory;
pub mod query;
pub mod traits;

// Re-export primary types at crate root for ergonomic imports.
pub use cache::{Cache, CacheStats, InMemoryCache};
pub use entity::{DeleteAck, SaveAck, SaveMethod, StoredEntity, WriteSpec};
pub use error::{CacheError, CacheResult, StoreError, StoreResult};
pub use memory::{FailOn, InMemoryDatastore, StoreStats};
pub use query::{Filter, FilterOp, Order, Query, QueryResponse, KEY_FIELD};
pub use traits::{Datastore, TransactionBackend};
