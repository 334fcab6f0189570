//! Transactions: buffered writes plus work replayed after commit.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::{debug, warn};

use gstore_store::{Datastore, StoredEntity, TransactionBackend, WriteSpec};
use gstore_types::Key;

use crate::entity::Entity;
use crate::error::{OdmError, OdmResult, Persisted};
use crate::hooks::{EntityPipeline, HookResponse};
use crate::model::Model;

/// Work scheduled to run once the transaction commits.
pub(crate) type PostCommit = Box<dyn FnOnce() -> BoxFuture<'static, OdmResult<()>> + Send>;

/// A store transaction.
///
/// Saves and deletes queued here become visible only on [`commit`]. Post
/// hooks and cache invalidation for those mutations are deferred until the
/// commit succeeds and are dropped on rollback.
///
/// [`commit`]: Transaction::commit
pub struct Transaction {
    backend: Box<dyn TransactionBackend>,
    datastore: Arc<dyn Datastore>,
    post_commit: Vec<PostCommit>,
    closed: bool,
}

impl Transaction {
    pub(crate) fn new(backend: Box<dyn TransactionBackend>, datastore: Arc<dyn Datastore>) -> Self {
        Self {
            backend,
            datastore,
            post_commit: Vec::new(),
            closed: false,
        }
    }

    pub fn id(&self) -> &str {
        self.backend.id()
    }

    /// True once committed or rolled back.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Callbacks waiting for commit.
    pub fn pending(&self) -> usize {
        self.post_commit.len()
    }

    /// Begin the transaction.
    pub async fn run(&mut self) -> OdmResult<()> {
        self.backend.run().await?;
        debug!(transaction = %self.id(), "transaction started");
        Ok(())
    }

    /// Transactional read.
    pub async fn get(&mut self, keys: &[Key]) -> OdmResult<Vec<StoredEntity>> {
        Ok(self.backend.get(keys).await?)
    }

    pub(crate) fn queue_save(&mut self, write: WriteSpec) -> OdmResult<()> {
        Ok(self.backend.save(write)?)
    }

    pub(crate) fn queue_delete(&mut self, keys: &[Key]) -> OdmResult<()> {
        Ok(self.backend.delete(keys)?)
    }

    /// Complete `key` through the store's id allocator so the caller sees
    /// the final key before commit.
    pub(crate) async fn complete_key(&self, key: Key) -> OdmResult<Key> {
        if key.is_complete() {
            return Ok(key);
        }
        let mut allocated = self.datastore.allocate_ids(&key, 1).await?;
        allocated
            .pop()
            .ok_or_else(|| OdmError::Configuration(format!("store allocated no id for {key}")))
    }

    pub(crate) fn after_commit(&mut self, callback: PostCommit) {
        self.post_commit.push(callback);
    }

    /// Apply every queued mutation, then replay deferred work in the order
    /// it was queued.
    ///
    /// Every callback runs even if an earlier one fails; the first failure
    /// is returned.
    pub async fn commit(&mut self) -> OdmResult<()> {
        let id = self.id().to_string();
        self.backend
            .commit()
            .await
            .map_err(|source| OdmError::Transaction { id: id.clone(), source })?;
        self.closed = true;
        debug!(transaction = %id, callbacks = self.post_commit.len(), "transaction committed");

        let mut first_error = None;
        for callback in std::mem::take(&mut self.post_commit) {
            if let Err(err) = callback().await {
                warn!(transaction = %id, error = %err, "post-commit work failed");
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Discard queued mutations and deferred work.
    pub async fn rollback(&mut self) -> OdmResult<()> {
        self.post_commit.clear();
        let id = self.id().to_string();
        self.backend
            .rollback()
            .await
            .map_err(|source| OdmError::Transaction { id: id.clone(), source })?;
        self.closed = true;
        debug!(transaction = %id, "transaction rolled back");
        Ok(())
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Transaction")
            .field("id", &self.id())
            .field("pending", &self.post_commit.len())
            .field("closed", &self.closed)
            .finish()
    }
}

/// Deferred cache invalidation and post hooks for a mutation queued in
/// transaction `transaction`.
pub(crate) fn replay(
    transaction: String,
    model: Model,
    hooks: EntityPipeline,
    method: &'static str,
    context: Entity,
    response: HookResponse,
    keys: Vec<Key>,
) -> PostCommit {
    Box::new(move || {
        Box::pin(async move {
            if let Err(source) = model.invalidate(&keys).await {
                return Err(OdmError::Cache {
                    result: Box::new(Persisted::Committed { transaction }),
                    source,
                });
            }
            hooks
                .run_post(&context, response)
                .await
                .map(|_| ())
                .map_err(OdmError::post_hook(method, true))
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SaveOptions;
    use crate::schema::{FieldType, PathDefinition, Schema};
    use crate::test_support::{gstore_with, record};
    use gstore_hooks::{post_fn, Flow};
    use gstore_store::{FailOn, InMemoryDatastore};
    use gstore_types::Value;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_schema(counter: Arc<AtomicUsize>) -> Arc<Schema> {
        Schema::builder()
            .path("name", PathDefinition::of(FieldType::String))
            .post(
                "save",
                Arc::new(post_fn("count", move |_: &Entity, _: &HookResponse| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Flow::Continue)
                })),
            )
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn writes_and_post_hooks_wait_for_commit() {
        let store = InMemoryDatastore::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let gstore = gstore_with(&store);
        let model = gstore.model("User", counting_schema(counter.clone())).unwrap();

        let mut txn = gstore.transaction().await.unwrap();
        txn.run().await.unwrap();
        let mut entity = model.entity(record(&[("name", Value::from("a"))]));
        let saved = entity.save(Some(&mut txn), SaveOptions::default()).await.unwrap();

        assert!(saved.key().is_complete());
        assert!(!store.contains(saved.key()));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(txn.pending(), 1);

        txn.commit().await.unwrap();
        assert!(store.contains(saved.key()));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert!(txn.is_closed());
    }

    #[tokio::test]
    async fn rollback_drops_deferred_work() {
        let store = InMemoryDatastore::new();
        let counter = Arc::new(AtomicUsize::new(0));
        let gstore = gstore_with(&store);
        let model = gstore.model("User", counting_schema(counter.clone())).unwrap();

        let mut txn = gstore.transaction().await.unwrap();
        txn.run().await.unwrap();
        let mut entity = model.entity(record(&[("name", Value::from("a"))]));
        let saved = entity.save(Some(&mut txn), SaveOptions::default()).await.unwrap();
        txn.rollback().await.unwrap();

        assert!(!store.contains(saved.key()));
        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(txn.pending(), 0);
    }

    #[tokio::test]
    async fn failed_commit_reports_transaction_id() {
        let store = InMemoryDatastore::new();
        let gstore = gstore_with(&store);
        let model = gstore
            .model("User", counting_schema(Arc::new(AtomicUsize::new(0))))
            .unwrap();

        let mut txn = gstore.transaction().await.unwrap();
        txn.run().await.unwrap();
        let mut entity = model.entity(Default::default());
        entity.save(Some(&mut txn), SaveOptions::default()).await.unwrap();
        store.fail_next(FailOn::Commit);

        let id = txn.id().to_string();
        match txn.commit().await {
            Err(OdmError::Transaction { id: failed, .. }) => assert_eq!(failed, id),
            other => panic!("expected transaction error, got {other:?}"),
        }
        assert!(!txn.is_closed());
        txn.rollback().await.unwrap();
    }

    #[tokio::test]
    async fn writes_before_run_are_rejected() {
        let store = InMemoryDatastore::new();
        let gstore = gstore_with(&store);
        let model = gstore
            .model("User", counting_schema(Arc::new(AtomicUsize::new(0))))
            .unwrap();
        let mut txn = gstore.transaction().await.unwrap();
        let mut entity = model.entity(Default::default());
        let err = entity.save(Some(&mut txn), SaveOptions::default()).await.unwrap_err();
        assert!(matches!(err, OdmError::Store(_)));
    }
}
