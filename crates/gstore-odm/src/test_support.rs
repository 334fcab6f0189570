//! Shared fixtures for unit tests.

use std::sync::Arc;

use gstore_store::InMemoryDatastore;
use gstore_types::{Record, Value};

use crate::registry::Gstore;

/// A registry over a fresh in-memory store.
pub(crate) fn gstore() -> Gstore {
    gstore_with(&InMemoryDatastore::new())
}

/// A registry over `store`; the caller keeps a handle for inspection.
pub(crate) fn gstore_with(store: &InMemoryDatastore) -> Gstore {
    Gstore::new(Arc::new(store.clone()))
}

pub(crate) fn record(fields: &[(&str, Value)]) -> Record {
    fields
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
