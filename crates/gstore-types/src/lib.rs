//! Foundation types for gstore.
//!
//! This crate provides the value model shared by every other gstore crate:
//! hierarchical keys addressing entities in the backing document store, and
//! the dynamic [`Value`] / [`Record`] representation of entity data.
//!
//! # Key Types
//!
//! - [`Key`]: kind + optional id, ancestor path, optional namespace
//! - [`KeyId`]: numeric (`Id`) or string (`Name`) key identifier
//! - [`Ancestor`]: one `(kind, id)` element of an ancestor path
//! - [`Value`]: dynamically typed field value
//! - [`Record`]: ordered field map holding an entity's data
//! - [`GeoPoint`] / [`BoxedNumber`]: store-specific value wrappers

pub mod error;
pub mod key;
pub mod path;
pub mod value;

pub use error::TypeError;
pub use key::{Ancestor, Key, KeyId};
pub use path::{get_path, get_path_mut, parent_record, set_path};
pub use value::{record_from_json, BoxedNumber, GeoPoint, NumberKind, Record, Value, JSON_KEY_MARKER};
