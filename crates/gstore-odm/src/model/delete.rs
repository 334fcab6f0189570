//! Keyed deletes.

use std::sync::Arc;

use tracing::debug;

use gstore_types::{Key, Value};

use super::Model;
use crate::entity::Entity;
use crate::error::{KeyError, OdmError, OdmResult, Persisted};
use crate::hooks::{HookArgs, HookResponse};
use crate::key::KeyPath;
use crate::loader::Loader;
use crate::schema::Method;
use crate::transaction::{self, Transaction};

/// What to delete: ids under a key path, or explicit keys.
///
/// Pre hooks on `delete` receive the request and may replace it.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DeleteRequest {
    pub ids: Vec<Value>,
    pub path: KeyPath,
    pub keys: Vec<Key>,
}

impl DeleteRequest {
    pub fn id(id: impl Into<Value>) -> Self {
        Self {
            ids: vec![id.into()],
            ..Self::default()
        }
    }

    pub fn ids<V: Into<Value>>(ids: impl IntoIterator<Item = V>) -> Self {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn key(key: Key) -> Self {
        Self {
            keys: vec![key],
            ..Self::default()
        }
    }

    pub fn keys(keys: Vec<Key>) -> Self {
        Self {
            keys,
            ..Self::default()
        }
    }

    /// Derive id keys under `path`.
    pub fn within(mut self, path: KeyPath) -> Self {
        self.path = path;
        self
    }

    /// Explicit keys first, then keys derived from ids. Empty is an error.
    pub fn resolve(&self, model: &Model) -> OdmResult<Vec<Key>> {
        let mut keys = self.keys.clone();
        keys.extend(model.keys(&self.ids, &self.path)?);
        if keys.is_empty() {
            return Err(KeyError::Missing("delete needs at least one id or key".into()).into());
        }
        Ok(keys)
    }
}

/// Outcome of a delete.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteResult {
    pub keys: Vec<Key>,
    /// Whether anything was removed. Always true inside a transaction,
    /// where the outcome is unknown until commit.
    pub success: bool,
    /// Index updates reported by the store; `None` inside a transaction.
    pub index_updates: Option<u64>,
}

/// Options for [`Model::delete`].
#[derive(Clone, Default)]
pub struct DeleteOptions {
    /// Loader whose memo entries for the deleted keys are cleared.
    pub loader: Option<Arc<dyn Loader>>,
}

impl Model {
    /// Delete by id or key, running `delete` hooks around the store call.
    ///
    /// Hooks see an entity holding only the first key; its data is not
    /// loaded.
    pub async fn delete(
        &self,
        request: DeleteRequest,
        txn: Option<&mut Transaction>,
        options: DeleteOptions,
    ) -> OdmResult<DeleteResult> {
        self.delete_with(request, txn, options, true).await
    }

    /// [`Model::delete`], leaving the kind's cached queries alone unless
    /// `clear_queries` is set. Only applies outside a transaction.
    pub(crate) async fn delete_with(
        &self,
        request: DeleteRequest,
        txn: Option<&mut Transaction>,
        options: DeleteOptions,
        clear_queries: bool,
    ) -> OdmResult<DeleteResult> {
        let keys = request.resolve(self)?;
        let hooks = self.hooks(&Method::Delete);
        let mut context = Entity::bare(self.clone(), keys[0].clone());

        let request = match hooks
            .run_pre(&mut context, HookArgs::Delete(request))
            .await
            .map_err(OdmError::pre_hook("delete"))?
        {
            HookArgs::Delete(request) => request,
            _ => {
                return Err(OdmError::Configuration(
                    "delete pre hook must return a delete request".into(),
                ))
            }
        };
        let keys = request.resolve(self)?;

        let Some(txn) = txn else {
            let ack = self.datastore().delete(&keys).await?;
            let result = DeleteResult {
                keys: keys.clone(),
                success: ack.index_updates > 0,
                index_updates: Some(ack.index_updates),
            };
            debug!(kind = %self.kind(), keys = keys.len(), index_updates = ack.index_updates, "delete");

            if let Some(loader) = &options.loader {
                for key in &keys {
                    loader.clear(key);
                }
            }
            if let Err(source) = self.invalidate_with(&keys, clear_queries).await {
                return Err(OdmError::Cache {
                    result: Box::new(Persisted::Deleted(result)),
                    source,
                });
            }
            let response = hooks
                .run_post(&context, HookResponse::Deleted(result.clone()))
                .await
                .map_err(OdmError::post_hook("delete", true))?;
            return Ok(match response {
                HookResponse::Deleted(result) => result,
                _ => result,
            });
        };

        txn.queue_delete(&keys)?;
        let result = DeleteResult {
            keys: keys.clone(),
            success: true,
            index_updates: None,
        };
        if let Some(loader) = &options.loader {
            for key in &keys {
                loader.clear(key);
            }
        }
        let callback = transaction::replay(
            txn.id().to_string(),
            self.clone(),
            hooks,
            "delete",
            context,
            HookResponse::Deleted(result.clone()),
            keys,
        );
        txn.after_commit(callback);
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GstoreConfig;
    use crate::registry::Gstore;
    use crate::schema::{FieldType, PathDefinition, Schema};
    use crate::test_support::{gstore_with, record};
    use gstore_hooks::{post_fn, pre_fn, Flow};
    use gstore_store::{InMemoryCache, InMemoryDatastore};
    use std::sync::Mutex;

    fn schema() -> Arc<Schema> {
        Schema::builder()
            .path("name", PathDefinition::of(FieldType::String))
            .build()
            .unwrap()
    }

    fn seed(store: &InMemoryDatastore, ids: &[i64]) {
        for id in ids {
            store.insert_raw(Key::new("User").with_id(*id), record(&[("name", Value::from("x"))]));
        }
    }

    #[tokio::test]
    async fn delete_reports_index_updates() {
        let store = InMemoryDatastore::new();
        seed(&store, &[1]);
        let users = gstore_with(&store).model("User", schema()).unwrap();
        let result = users
            .delete(DeleteRequest::id(1), None, DeleteOptions::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.index_updates, Some(2));
        assert!(store.is_empty());

        let missing = users
            .delete(DeleteRequest::id(1), None, DeleteOptions::default())
            .await
            .unwrap();
        assert!(!missing.success);
    }

    #[tokio::test]
    async fn delete_needs_a_key() {
        let users = gstore_with(&InMemoryDatastore::new()).model("User", schema()).unwrap();
        let err = users
            .delete(DeleteRequest::default(), None, DeleteOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, OdmError::Key(KeyError::Missing(_))));
    }

    #[tokio::test]
    async fn hooks_see_bare_entity_and_may_redirect() {
        let seen = Arc::new(Mutex::new(None));
        let sink = seen.clone();
        let schema = Schema::builder()
            .path("name", PathDefinition::of(FieldType::String))
            .pre(
                "delete",
                Arc::new(pre_fn("redirect", |entity: &mut Entity, _: &HookArgs| {
                    assert!(entity.data().is_empty());
                    Ok(Flow::Override(HookArgs::Delete(DeleteRequest::id(2))))
                })),
            )
            .post(
                "delete",
                Arc::new(post_fn("record", move |_: &Entity, result: &HookResponse| {
                    if let HookResponse::Deleted(result) = result {
                        *sink.lock().unwrap() = Some(result.keys.clone());
                    }
                    Ok(Flow::Continue)
                })),
            )
            .build()
            .unwrap();
        let store = InMemoryDatastore::new();
        seed(&store, &[1, 2]);
        let users = gstore_with(&store).model("User", schema).unwrap();
        users
            .delete(DeleteRequest::id(1), None, DeleteOptions::default())
            .await
            .unwrap();
        assert!(store.contains(&Key::new("User").with_id(1)));
        assert!(!store.contains(&Key::new("User").with_id(2)));
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(vec![Key::new("User").with_id(2)])
        );
    }

    #[tokio::test]
    async fn transactional_delete_waits_for_commit() {
        let store = InMemoryDatastore::new();
        seed(&store, &[1, 2]);
        let gstore = gstore_with(&store);
        let users = gstore.model("User", schema()).unwrap();
        let mut txn = gstore.transaction().await.unwrap();
        txn.run().await.unwrap();
        let result = users
            .delete(DeleteRequest::ids([1, 2]), Some(&mut txn), DeleteOptions::default())
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.index_updates, None);
        assert_eq!(store.len(), 2);
        txn.commit().await.unwrap();
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn cache_failure_carries_delete_result() {
        let store = InMemoryDatastore::new();
        seed(&store, &[1]);
        let cache = InMemoryCache::new();
        let gstore = Gstore::with_options(
            Arc::new(store.clone()),
            GstoreConfig::default(),
            Some(Arc::new(cache.clone())),
        );
        let users = gstore.model("User", schema()).unwrap();
        cache.fail_next();
        let err = users
            .delete(DeleteRequest::id(1), None, DeleteOptions::default())
            .await
            .unwrap_err();
        match err {
            OdmError::Cache { result, .. } => {
                assert!(matches!(*result, Persisted::Deleted(DeleteResult { success: true, .. })))
            }
            other => panic!("expected cache error, got {other:?}"),
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn loader_entries_are_cleared() {
        let store = InMemoryDatastore::new();
        seed(&store, &[1]);
        let gstore = gstore_with(&store);
        let users = gstore.model("User", schema()).unwrap();
        let loader = gstore.create_data_loader();
        loader.load_many(&[Key::new("User").with_id(1)]).await.unwrap();
        assert_eq!(loader.len(), 1);
        users
            .delete(
                DeleteRequest::id(1),
                None,
                DeleteOptions {
                    loader: Some(loader.clone()),
                },
            )
            .await
            .unwrap();
        assert!(loader.is_empty());
    }
}
