use gstore_hooks::HookError;
use gstore_store::{CacheError, StoreError};
use gstore_types::{Key, TypeError};

use crate::entity::Entity;
use crate::model::DeleteResult;
use crate::validation::ValidationReport;

/// Errors from key derivation and reference handling.
#[derive(Debug, thiserror::Error)]
pub enum KeyError {
    /// An id could not be coerced into a key identifier.
    #[error("invalid key id {value}: {reason}")]
    InvalidId { value: String, reason: String },

    /// A reference field held something other than a key.
    #[error("value at '{path}' is not a key")]
    NotAKey { path: String },

    /// An operation needed a key and none could be derived.
    #[error("missing key: {0}")]
    Missing(String),

    #[error(transparent)]
    Type(#[from] TypeError),
}

/// What a mutation had already persisted when a later step failed.
#[derive(Debug)]
pub enum Persisted {
    /// A saved or updated entity.
    Entity(Box<Entity>),
    /// A completed delete.
    Deleted(DeleteResult),
    /// A committed transaction.
    Committed { transaction: String },
}

/// Errors from model and entity operations.
#[derive(Debug, thiserror::Error)]
pub enum OdmError {
    /// Bad schema, duplicate kind registration, unknown hook target or
    /// method.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Entity data failed schema validation. No store call was made.
    #[error("validation failed: {0}")]
    Validation(ValidationReport),

    /// No entity exists under the key.
    #[error("entity not found: {key}")]
    EntityNotFound { key: Key },

    #[error("key error: {0}")]
    Key(#[from] KeyError),

    /// The mutation succeeded but cache invalidation failed afterwards.
    #[error("cache error after successful mutation: {source}")]
    Cache {
        result: Box<Persisted>,
        #[source]
        source: CacheError,
    },

    /// A pre hook aborted the operation before it ran.
    #[error("pre hook aborted '{method}': {source}")]
    PreHook {
        method: String,
        #[source]
        source: HookError,
    },

    /// A post hook failed. When `persisted` is set the mutation had
    /// already been written.
    #[error("post hook failed on '{method}' (persisted: {persisted}): {source}")]
    PostHook {
        method: String,
        persisted: bool,
        #[source]
        source: HookError,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Commit or rollback failed.
    #[error("transaction {id} failed: {source}")]
    Transaction {
        id: String,
        #[source]
        source: StoreError,
    },
}

impl OdmError {
    pub(crate) fn pre_hook(method: &str) -> impl FnOnce(HookError) -> OdmError + '_ {
        move |source| OdmError::PreHook {
            method: method.to_string(),
            source,
        }
    }

    pub(crate) fn post_hook(method: &str, persisted: bool) -> impl FnOnce(HookError) -> OdmError + '_ {
        move |source| OdmError::PostHook {
            method: method.to_string(),
            persisted,
            source,
        }
    }

    /// The validation report, if this is a validation failure.
    pub fn validation_report(&self) -> Option<&ValidationReport> {
        match self {
            Self::Validation(report) => Some(report),
            _ => None,
        }
    }
}

/// Result alias for gstore-odm operations.
pub type OdmResult<T> = Result<T, OdmError>;
