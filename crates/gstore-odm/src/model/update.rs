//! Read-merge-write updates.

use std::sync::Arc;

use tracing::{debug, warn};

use gstore_store::SaveMethod;
use gstore_types::{Record, Value};

use super::save::SaveOptions;
use super::Model;
use crate::entity::Entity;
use crate::error::{OdmError, OdmResult};
use crate::key::KeyPath;
use crate::transaction::Transaction;

/// Options for [`Model::update`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Overwrite the stored entity instead of merging into it. No read is
    /// made and no transaction is opened.
    pub replace: bool,
}

impl UpdateOptions {
    pub fn replace() -> Self {
        Self { replace: true }
    }
}

impl Model {
    /// Update the entity stored under `id`.
    ///
    /// `data` is sanitized first, so non-writable and (under
    /// `explicit_only`) undeclared fields are dropped. The stored entity is
    /// read inside a transaction, shallow-merged with `data`, and saved
    /// through the normal save flow. Without `txn` an internal transaction
    /// is created, committed on success and rolled back on any failure.
    pub async fn update(
        &self,
        id: impl Into<Value>,
        data: Record,
        path: &KeyPath,
        txn: Option<&mut Transaction>,
        options: UpdateOptions,
    ) -> OdmResult<Entity> {
        let key = self.key(id, path)?;
        let data = self.sanitize(data);

        if options.replace {
            let mut entity = self.entity_with_key(data, key);
            return entity.save(txn, SaveOptions::method(SaveMethod::Upsert)).await;
        }

        if let Some(txn) = txn {
            return self.merge_and_save(key, data, txn).await;
        }

        let backend = self.datastore().transaction().await?;
        let mut txn = Transaction::new(backend, Arc::clone(self.datastore()));
        txn.run().await?;
        let result = match self.merge_and_save(key, data, &mut txn).await {
            Ok(entity) => txn.commit().await.map(|()| entity),
            Err(err) => Err(err),
        };
        if result.is_err() && !txn.is_closed() {
            if let Err(rollback) = txn.rollback().await {
                warn!(kind = %self.kind(), transaction = %txn.id(), error = %rollback, "rollback after failed update failed");
            }
        }
        result
    }

    async fn merge_and_save(
        &self,
        key: gstore_types::Key,
        data: Record,
        txn: &mut Transaction,
    ) -> OdmResult<Entity> {
        let mut stored = txn.get(std::slice::from_ref(&key)).await?;
        let Some(current) = stored.pop() else {
            debug!(kind = %self.kind(), key = %key, "update target missing");
            return Err(OdmError::EntityNotFound { key });
        };
        let mut merged = current.data;
        merged.extend(data);
        let mut entity = self.entity_with_key(merged, key);
        entity.save(Some(txn), SaveOptions::method(SaveMethod::Update)).await
    }
}
