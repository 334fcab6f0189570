//! Batched deletion of every entity of a kind, optionally under an
//! ancestor.

use tracing::{debug, info};

use gstore_store::Query;

use super::delete::{DeleteOptions, DeleteRequest};
use super::Model;
use crate::error::{OdmError, OdmResult, Persisted};
use crate::key::KeyPath;
use crate::schema::Method;

/// Outcome of [`Model::delete_all`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeleteAllResult {
    pub success: bool,
    pub message: String,
    /// Number of keys submitted for deletion.
    pub deleted: usize,
}

impl Model {
    /// Delete every entity of this kind, scoped to the innermost ancestor
    /// of `path` when it has one.
    ///
    /// Keys are read with keys-only queries of at most `query_limit` and
    /// deleted in batches of `batch_size`, pausing `batch_delay` between
    /// batches. When `delete` hooks are registered, each entity goes
    /// through [`Model::delete`] so the hooks run per key. Cached queries
    /// of the kind are cleared once either way.
    pub async fn delete_all(&self, path: &KeyPath) -> OdmResult<DeleteAllResult> {
        let settings = self.config().delete_all.clone();
        let namespace = path.resolve_namespace(self.datastore().namespace());
        let ancestor = path.ancestor_key(self.datastore().namespace());
        let with_hooks = !self.hooks(&Method::Delete).is_empty();
        let batch_size = settings.batch_size.max(1);

        let mut deleted = 0;
        let mut batches = 0usize;
        let mut queries_cleared = false;
        loop {
            let mut query = Query::new(self.kind(), namespace.clone())
                .keys_only()
                .limit(settings.query_limit);
            if let Some(ancestor) = &ancestor {
                query = query.has_ancestor(ancestor.clone());
            }
            let keys = self.datastore().run_query(&query).await?.keys();
            if keys.is_empty() {
                break;
            }

            for batch in keys.chunks(batch_size) {
                if batches > 0 && !settings.batch_delay.is_zero() {
                    tokio::time::sleep(settings.batch_delay).await;
                }
                batches += 1;

                if with_hooks {
                    for key in batch {
                        self.delete_with(
                            DeleteRequest::key(key.clone()),
                            None,
                            DeleteOptions::default(),
                            !queries_cleared,
                        )
                        .await?;
                        queries_cleared = true;
                    }
                } else {
                    self.datastore().delete(batch).await?;
                    if let Some(cache) = self.cache() {
                        let cleared = match cache.del_keys(batch).await {
                            Ok(()) if !queries_cleared => {
                                cache.clear_queries_by_kind(&[self.kind()]).await
                            }
                            other => other,
                        };
                        if let Err(source) = cleared {
                            return Err(OdmError::Cache {
                                result: Box::new(Persisted::Deleted(super::DeleteResult {
                                    keys: batch.to_vec(),
                                    success: true,
                                    index_updates: None,
                                })),
                                source,
                            });
                        }
                        queries_cleared = true;
                    }
                }
                deleted += batch.len();
                debug!(kind = %self.kind(), batch = batches, size = batch.len(), "delete_all batch");
            }
        }

        let message = match &ancestor {
            Some(ancestor) => format!("all {} entities under {ancestor} deleted successfully", self.kind()),
            None => format!("all {} entities deleted successfully", self.kind()),
        };
        info!(kind = %self.kind(), deleted, batches, "delete_all finished");
        Ok(DeleteAllResult {
            success: true,
            message,
            deleted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{DeleteAllConfig, GstoreConfig};
    use crate::entity::Entity;
    use crate::hooks::HookResponse;
    use crate::registry::Gstore;
    use crate::schema::{FieldType, PathDefinition, Schema};
    use crate::test_support::record;
    use gstore_hooks::{post_fn, Flow};
    use gstore_store::{InMemoryCache, InMemoryDatastore};
    use gstore_types::{Ancestor, Key, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    fn gstore(store: &InMemoryDatastore, cache: Option<&InMemoryCache>) -> Gstore {
        Gstore::with_options(
            Arc::new(store.clone()),
            GstoreConfig {
                delete_all: DeleteAllConfig::without_delay(),
                ..GstoreConfig::default()
            },
            cache.map(|c| Arc::new(c.clone()) as Arc<dyn gstore_store::Cache>),
        )
    }

    fn schema() -> Arc<Schema> {
        Schema::builder()
            .path("name", PathDefinition::of(FieldType::String))
            .build()
            .unwrap()
    }

    fn seed(store: &InMemoryDatastore, kind: &str, count: i64) {
        for id in 1..=count {
            store.insert_raw(Key::new(kind).with_id(id), record(&[("name", Value::from("x"))]));
        }
    }

    #[tokio::test]
    async fn scenario_d_batches_of_five_hundred() {
        let store = InMemoryDatastore::new();
        seed(&store, "User", 1200);
        seed(&store, "Other", 3);
        let cache = InMemoryCache::new();
        cache.set_query("User", "q");
        let users = gstore(&store, Some(&cache)).model("User", schema()).unwrap();

        let result = users.delete_all(&KeyPath::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.deleted, 1200);
        assert_eq!(store.stats().delete_batches, vec![500, 500, 200]);
        assert_eq!(store.len(), 3);
        assert_eq!(cache.query_count("User"), 0);
        assert_eq!(cache.stats().query_clears, 1);
    }

    #[tokio::test]
    async fn requeries_past_the_query_limit() {
        let store = InMemoryDatastore::new();
        seed(&store, "User", 25);
        let gstore = Gstore::with_options(
            Arc::new(store.clone()),
            GstoreConfig {
                delete_all: DeleteAllConfig {
                    query_limit: 10,
                    batch_size: 4,
                    batch_delay: Duration::ZERO,
                },
                ..GstoreConfig::default()
            },
            None,
        );
        let users = gstore.model("User", schema()).unwrap();
        let result = users.delete_all(&KeyPath::new()).await.unwrap();
        assert_eq!(result.deleted, 25);
        assert!(store.is_empty());
        assert_eq!(store.stats().query_calls, 4);
    }

    #[tokio::test]
    async fn scoped_to_ancestor() {
        let store = InMemoryDatastore::new();
        for id in 1..=3 {
            store.insert_raw(
                Key::new("User")
                    .with_id(id)
                    .with_ancestors(vec![Ancestor::new("Org", 1)]),
                record(&[]),
            );
        }
        seed(&store, "User", 2);
        let users = gstore(&store, None).model("User", schema()).unwrap();
        let result = users
            .delete_all(&KeyPath::new().ancestor("Org", 1))
            .await
            .unwrap();
        assert_eq!(result.deleted, 3);
        assert_eq!(store.len(), 2);
        assert!(result.message.contains("Org"));
    }

    #[tokio::test]
    async fn delete_hooks_run_per_entity() {
        let count = Arc::new(AtomicUsize::new(0));
        let counter = count.clone();
        let schema = Schema::builder()
            .post(
                "delete",
                Arc::new(post_fn("count", move |_: &Entity, _: &HookResponse| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(Flow::Continue)
                })),
            )
            .build()
            .unwrap();
        let store = InMemoryDatastore::new();
        seed(&store, "User", 5);
        let users = gstore(&store, None).model("User", schema).unwrap();
        users.delete_all(&KeyPath::new()).await.unwrap();
        assert_eq!(count.load(Ordering::SeqCst), 5);
        assert_eq!(store.stats().delete_batches, vec![1; 5]);
    }

    #[tokio::test]
    async fn hooked_deletes_clear_queries_once() {
        let schema = Schema::builder()
            .post(
                "delete",
                Arc::new(post_fn("noop", |_: &Entity, _: &HookResponse| Ok(Flow::Continue))),
            )
            .build()
            .unwrap();
        let store = InMemoryDatastore::new();
        seed(&store, "User", 4);
        let cache = InMemoryCache::new();
        cache.set_query("User", "q");
        let users = gstore(&store, Some(&cache)).model("User", schema).unwrap();

        let result = users.delete_all(&KeyPath::new()).await.unwrap();
        assert_eq!(result.deleted, 4);
        assert!(store.is_empty());
        let stats = cache.stats();
        assert_eq!(stats.query_clears, 1);
        assert_eq!(stats.key_deletes, 4);
        assert_eq!(cache.query_count("User"), 0);
    }

    #[tokio::test]
    async fn empty_kind_is_a_successful_no_op() {
        let store = InMemoryDatastore::new();
        let users = gstore(&store, None).model("User", schema()).unwrap();
        let result = users.delete_all(&KeyPath::new()).await.unwrap();
        assert!(result.success);
        assert_eq!(result.deleted, 0);
        assert!(store.stats().delete_batches.is_empty());
    }
}
