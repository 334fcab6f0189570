//! Object-document mapping over a hierarchical-key document store.
//!
//! Schemas describe entity kinds; a [`Gstore`] registry binds them to a
//! store as [`Model`]s; models create, read and mutate [`Entity`] values.
//! Every mutation runs through sanitization, validation and a pre/post
//! hook pipeline, optionally inside a [`Transaction`]. Key-valued fields
//! can be resolved into the entities they reference with one batched load
//! per nesting level.
//!
//! # Example
//!
//! ```no_run
//! # async fn demo() -> gstore_odm::OdmResult<()> {
//! use std::sync::Arc;
//! use gstore_odm::{FieldType, Gstore, PathDefinition, SaveOptions, Schema};
//! use gstore_store::InMemoryDatastore;
//! use gstore_types::{Record, Value};
//!
//! let gstore = Gstore::new(Arc::new(InMemoryDatastore::new()));
//! let schema = Schema::builder()
//!     .path("name", PathDefinition::of(FieldType::String).required())
//!     .build()?;
//! let users = gstore.model("User", schema)?;
//!
//! let mut data = Record::new();
//! data.insert("name".into(), Value::from("john"));
//! let saved = users.entity(data).save(None, SaveOptions::default()).await?;
//! println!("saved {}", saved.key());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod entity;
pub mod error;
pub mod hooks;
pub mod key;
pub mod loader;
pub mod model;
pub mod populate;
pub mod registry;
pub mod sanitize;
pub mod schema;
pub mod serializer;
pub mod transaction;
pub mod validation;

#[cfg(test)]
mod test_support;

pub use config::{DeleteAllConfig, GstoreConfig};
pub use entity::{Entity, PlainOptions};
pub use error::{KeyError, OdmError, OdmResult, Persisted};
pub use hooks::{EntityPipeline, HookArgs, HookResponse};
pub use key::KeyPath;
pub use loader::{DataLoader, Loader};
pub use model::{
    DeleteAllResult, DeleteOptions, DeleteRequest, DeleteResult, GetOptions, Model, SaveOptions,
    UpdateOptions,
};
pub use populate::{PopulateRef, Select};
pub use registry::Gstore;
pub use schema::{
    DefaultValue, FieldType, IndexExclusion, KeyType, Method, PathDefinition, Rule, Schema,
    SchemaBuilder, SchemaOptions, VirtualField,
};
pub use transaction::Transaction;
pub use validation::{FieldError, FieldErrorKind, ValidationReport};
