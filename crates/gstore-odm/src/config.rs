use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration shared by every model of a [`Gstore`](crate::Gstore)
/// instance.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GstoreConfig {
    /// When `true`, `Model::get` fails with `EntityNotFound` for a missing
    /// entity instead of yielding `None`. `Model::update` always fails.
    pub error_on_entity_not_found: bool,
    /// TTL applied to entities written into the cache by read-through.
    /// `None` uses the cache's own default.
    pub cache_ttl: Option<Duration>,
    /// Whether `get` reads through the cache when one is configured.
    pub cache_reads: bool,
    /// Batching of `Model::delete_all`.
    pub delete_all: DeleteAllConfig,
}

impl Default for GstoreConfig {
    fn default() -> Self {
        Self {
            error_on_entity_not_found: true,
            cache_ttl: None,
            cache_reads: true,
            delete_all: DeleteAllConfig::default(),
        }
    }
}

/// Limits used by `Model::delete_all`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeleteAllConfig {
    /// Maximum keys fetched by one keys-only query.
    pub query_limit: usize,
    /// Keys per delete call. Matches the store's per-call limit.
    pub batch_size: usize,
    /// Pause between two consecutive delete batches.
    pub batch_delay: Duration,
}

impl Default for DeleteAllConfig {
    fn default() -> Self {
        Self {
            query_limit: 100_000,
            batch_size: 500,
            batch_delay: Duration::from_millis(500),
        }
    }
}

impl DeleteAllConfig {
    /// No pause between batches. Used by tests and bulk tooling.
    pub fn without_delay() -> Self {
        Self {
            batch_delay: Duration::ZERO,
            ..Default::default()
        }
    }
}
