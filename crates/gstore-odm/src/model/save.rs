//! The save flow.
//!
//! `pre hooks -> sanitize -> validate -> prepare -> serialize -> persist ->
//! invalidate cache -> post hooks`. Inside a transaction the last two steps
//! are deferred until commit.

use chrono::Utc;
use tracing::debug;

use gstore_store::{SaveMethod, WriteSpec};
use gstore_types::{GeoPoint, Value};

use crate::entity::Entity;
use crate::error::{OdmError, OdmResult, Persisted};
use crate::hooks::{HookArgs, HookResponse};
use crate::sanitize::{sanitize, SanitizeOptions};
use crate::schema::{FieldType, Method, MODIFIED_ON};
use crate::serializer;
use crate::transaction::{self, Transaction};
use crate::validation::validate;

/// Options for a single save.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SaveOptions {
    pub method: SaveMethod,
    /// Overrides the schema's `validate_before_save`.
    pub validate: Option<bool>,
}

impl SaveOptions {
    pub fn method(method: SaveMethod) -> Self {
        Self {
            method,
            validate: None,
        }
    }

    pub fn without_validation(mut self) -> Self {
        self.validate = Some(false);
        self
    }
}

/// Sanitize, validate and prepare an entity for writing.
///
/// Non-writable fields are kept here: they hold values the entity already
/// owns rather than caller input.
pub(crate) fn check(entity: &mut Entity, validate_override: Option<bool>) -> OdmResult<()> {
    let schema = std::sync::Arc::clone(entity.model().schema());
    let data = std::mem::take(entity.data_mut());
    *entity.data_mut() = sanitize(&schema, data, SanitizeOptions::keep_non_writable());

    if validate_override.unwrap_or(schema.options().validate_before_save) {
        let report = validate(&schema, entity.data());
        if !report.is_valid() {
            debug!(kind = %entity.kind(), errors = report.len(), state = "invalid", "save");
            return Err(OdmError::Validation(report));
        }
    }
    prepare(entity);
    Ok(())
}

/// Touch `modifiedOn`, convert geo-point records, recompute exclusions.
fn prepare(entity: &mut Entity) {
    let schema = std::sync::Arc::clone(entity.model().schema());
    let data = entity.data_mut();
    if schema.has_path(MODIFIED_ON) {
        data.insert(MODIFIED_ON.to_string(), Value::Timestamp(Utc::now()));
    }
    for (name, def) in schema.paths() {
        if def.field_type != Some(FieldType::GeoPoint) {
            continue;
        }
        let point = data.get(name).and_then(Value::as_record).and_then(GeoPoint::from_record);
        if let Some(point) = point {
            data.insert(name.clone(), Value::GeoPoint(point));
        }
    }
    entity.refresh_exclusions();
}

pub(crate) fn to_write(entity: &Entity, method: SaveMethod) -> WriteSpec {
    serializer::to_datastore(
        entity.model().schema(),
        entity.key(),
        entity.data(),
        entity.exclude_from_indexes().to_vec(),
        method,
    )
}

pub(crate) async fn save_entity(
    entity: &mut Entity,
    txn: Option<&mut Transaction>,
    options: SaveOptions,
) -> OdmResult<Entity> {
    let model = entity.model().clone();
    let hooks = model.hooks(&Method::Save);

    let options = match hooks
        .run_pre(entity, HookArgs::Save(options))
        .await
        .map_err(OdmError::pre_hook("save"))?
    {
        HookArgs::Save(options) => options,
        _ => {
            return Err(OdmError::Configuration(
                "save pre hook must return save options".into(),
            ))
        }
    };

    check(entity, options.validate)?;
    let mut write = to_write(entity, options.method);
    debug!(kind = %model.kind(), key = %entity.key(), method = %options.method, state = "persisting", "save");

    let Some(txn) = txn else {
        let ack = model.datastore().save(vec![write]).await?;
        if let Some(key) = ack.keys.into_iter().next() {
            entity.set_key(key);
        }
        debug!(kind = %model.kind(), key = %entity.key(), state = "committed", "save");

        if let Err(source) = model.invalidate(&[entity.key().clone()]).await {
            return Err(OdmError::Cache {
                result: Box::new(Persisted::Entity(Box::new(entity.clone()))),
                source,
            });
        }
        let response = hooks
            .run_post(entity, HookResponse::Entity(entity.clone()))
            .await
            .map_err(OdmError::post_hook("save", true))?;
        return Ok(match response {
            HookResponse::Entity(saved) => saved,
            _ => entity.clone(),
        });
    };

    let key = txn.complete_key(entity.key().clone()).await?;
    entity.set_key(key.clone());
    write.key = key.clone();
    txn.queue_save(write)?;
    debug!(kind = %model.kind(), key = %key, transaction = %txn.id(), state = "queued", "save");

    let callback = transaction::replay(
        txn.id().to_string(),
        model,
        hooks,
        "save",
        entity.clone(),
        HookResponse::Entity(entity.clone()),
        vec![key],
    );
    txn.after_commit(callback);
    Ok(entity.clone())
}
