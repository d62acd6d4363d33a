//! Error types for the editor

use thiserror::Error;
use trellis_data::{PatchError, StoreKind};

/// Why a structural edit was refused
///
/// Every variant names the records involved so callers can explain the
/// failure without parsing the message.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Instance not found: {0}")]
    InstanceNotFound(String),

    #[error("Parent not found: {0}")]
    ParentNotFound(String),

    #[error("Instance {parent_id} ({component}) does not accept children")]
    ParentRejectsChildren { parent_id: String, component: String },

    #[error("Cannot delete root instance {0}")]
    CannotDeleteRoot(String),

    #[error("Cannot move root instance {0}")]
    CannotMoveRoot(String),

    #[error("Moving {instance_id} into {parent_id} would create a cycle")]
    CycleDetected {
        instance_id: String,
        parent_id: String,
    },

    #[error("Prop not found: {0}")]
    PropNotFound(String),

    #[error("Data source not found: {0}")]
    DataSourceNotFound(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Style declaration not found: {0}")]
    StyleDeclNotFound(String),

    #[error("Invalid children for {instance_id}: {reason}")]
    InvalidChildren { instance_id: String, reason: String },

    #[error("Fragment has no instances to insert")]
    EmptyFragment,

    #[error("Id already exists: {0}")]
    DuplicateId(String),

    #[error("Records of {0} cannot be edited as a fragment")]
    UnsupportedStore(StoreKind),
}

pub type MutationResult<T> = Result<T, MutationError>;

#[derive(Error, Debug)]
pub enum EditorError {
    #[error("Mutation error: {0}")]
    Mutation(#[from] MutationError),

    #[error("Patch error: {0}")]
    Patch(#[from] PatchError),

    #[error("Unknown change set: {0}")]
    UnknownChangeSet(String),
}
