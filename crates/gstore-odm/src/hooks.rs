//! Argument and result types flowing through entity hook pipelines.

use gstore_hooks::HookPipeline;
use gstore_types::Value;

use crate::entity::Entity;
use crate::model::{DeleteRequest, DeleteResult, SaveOptions};
use crate::validation::ValidationReport;

/// Arguments a pre hook sees, and may override, for each operation.
#[derive(Clone, Debug)]
pub enum HookArgs {
    Save(SaveOptions),
    Delete(DeleteRequest),
    Validate,
    Custom(Vec<Value>),
}

/// Result a post hook sees, and may override, for each operation.
#[derive(Clone, Debug)]
pub enum HookResponse {
    Entity(Entity),
    Deleted(DeleteResult),
    Validated(ValidationReport),
    Value(Value),
}

/// Pipeline wrapping one entity operation. The acting entity is the hook
/// context.
pub type EntityPipeline = HookPipeline<Entity, HookArgs, HookResponse>;
