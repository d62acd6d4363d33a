//! # Drag/Drop and Keyboard Coordinator
//!
//! Turns intents from the canvas (drop, delete) and keyboard shortcuts into
//! transactions. Drop geometry is computed elsewhere; this module only
//! resolves the final parent, applies the edit, rebinds variables for the
//! moved subtree and reports what should be selected next.

use crate::clone::clone_instance;
use crate::components::ComponentRegistry;
use crate::errors::{MutationError, MutationResult};
use crate::fragment::Fragment;
use crate::mutations::{InsertPosition, Mutation};
use crate::stores::ProjectStores;
use crate::tree::{find_closest_accepting_parent, find_closest_sibling_instance, TreeIndex};
use crate::variables::rebind_tree_variables;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use trellis_data::{Instance, ProjectData, Store};

/// Drop location reported by the canvas
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropTarget {
    pub parent_id: String,
    pub position: InsertPosition,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum DragDropIntent {
    #[serde(rename_all = "camelCase")]
    InsertInstance { fragment: Fragment, target: DropTarget },
    #[serde(rename_all = "camelCase")]
    ReparentInstance {
        instance_id: String,
        target: DropTarget,
    },
    #[serde(rename_all = "camelCase")]
    DeleteInstance { instance_id: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EditorCommand {
    Delete,
    Duplicate,
    Undo,
    Redo,
    SelectParent,
}

/// Result of a successfully applied intent or command
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct IntentOutcome {
    /// Instance to select now; `None` keeps the current selection
    pub selected_instance_id: Option<String>,
}

impl IntentOutcome {
    fn select(id: impl Into<String>) -> Self {
        Self {
            selected_instance_id: Some(id.into()),
        }
    }
}

/// Move a drop onto the closest instance that can hold children
///
/// When the drop lands on a leaf, the item goes next to the branch of the
/// accepting ancestor that contains the leaf.
pub fn resolve_drop_target(
    instances: &Store<Instance>,
    registry: &ComponentRegistry,
    target: &DropTarget,
) -> Option<DropTarget> {
    let parent_id = find_closest_accepting_parent(instances, registry, &target.parent_id)?;
    if parent_id == target.parent_id {
        return Some(target.clone());
    }

    let index = TreeIndex::new(instances);
    let mut branch = target.parent_id.clone();
    while let Some(parent) = index.parent_of(&branch) {
        if parent == parent_id {
            break;
        }
        branch = parent.to_string();
    }
    let position = instances
        .get(&parent_id)
        .and_then(|parent| parent.child_position(&branch))
        .map_or(InsertPosition::End, |position| {
            InsertPosition::Index(position + 1)
        });

    Some(DropTarget {
        parent_id,
        position,
    })
}

fn parent_of(data: &ProjectData, instance_id: &str) -> Option<String> {
    TreeIndex::new(&data.instances)
        .parent_of(instance_id)
        .map(str::to_string)
}

/// Apply a drag/drop intent as one transaction
#[instrument(skip(stores, intent))]
pub fn apply_intent(
    stores: &mut ProjectStores,
    intent: DragDropIntent,
) -> MutationResult<IntentOutcome> {
    match intent {
        DragDropIntent::InsertInstance { fragment, target } => {
            let target = resolve_drop_target(&stores.data().instances, stores.registry(), &target)
                .ok_or_else(|| MutationError::ParentNotFound(target.parent_id.clone()))?;
            let root_ids = fragment.root_ids();
            stores.transaction(|tx| -> MutationResult<()> {
                tx.describe("Insert");
                tx.apply(Mutation::InsertFragment {
                    fragment,
                    parent_id: target.parent_id.clone(),
                    position: target.position,
                })?;
                for root_id in &root_ids {
                    rebind_tree_variables(tx, root_id)?;
                }
                Ok(())
            })?;
            Ok(root_ids
                .first()
                .map(IntentOutcome::select)
                .unwrap_or_default())
        }

        DragDropIntent::ReparentInstance {
            instance_id,
            target,
        } => {
            let target = resolve_drop_target(&stores.data().instances, stores.registry(), &target)
                .ok_or_else(|| MutationError::ParentNotFound(target.parent_id.clone()))?;
            stores.transaction(|tx| -> MutationResult<()> {
                tx.describe("Move");
                tx.reparent_instance(&instance_id, &target.parent_id, target.position)?;
                rebind_tree_variables(tx, &instance_id)?;
                Ok(())
            })?;
            Ok(IntentOutcome::select(instance_id))
        }

        DragDropIntent::DeleteInstance { instance_id } => delete_with_selection(stores, &instance_id),
    }
}

fn delete_with_selection(
    stores: &mut ProjectStores,
    instance_id: &str,
) -> MutationResult<IntentOutcome> {
    let next = parent_of(stores.data(), instance_id).and_then(|parent_id| {
        find_closest_sibling_instance(&stores.data().instances, &parent_id, instance_id)
    });
    stores.transaction(|tx| tx.delete_instance(instance_id))?;
    Ok(IntentOutcome {
        selected_instance_id: next,
    })
}

/// Insert a fresh copy of `instance_id` right after it
pub fn duplicate_instance(
    stores: &mut ProjectStores,
    instance_id: &str,
) -> MutationResult<IntentOutcome> {
    let parent_id = parent_of(stores.data(), instance_id)
        .ok_or_else(|| MutationError::CannotMoveRoot(instance_id.to_string()))?;
    let position = stores
        .data()
        .instance(&parent_id)
        .and_then(|parent| parent.child_position(instance_id))
        .map_or(InsertPosition::End, |position| {
            InsertPosition::Index(position + 1)
        });

    let snapshot = stores.data().clone();
    let (fragment, ids) = clone_instance(&snapshot, instance_id, stores.ids_mut())
        .ok_or_else(|| MutationError::InstanceNotFound(instance_id.to_string()))?;
    let new_root = ids
        .get(instance_id)
        .cloned()
        .ok_or_else(|| MutationError::InstanceNotFound(instance_id.to_string()))?;

    stores.transaction(|tx| -> MutationResult<()> {
        tx.describe("Duplicate");
        tx.apply(Mutation::InsertFragment {
            fragment,
            parent_id,
            position,
        })?;
        rebind_tree_variables(tx, &new_root)?;
        Ok(())
    })?;

    info!(instance_id, duplicate = %new_root, "Duplicated instance");
    Ok(IntentOutcome::select(new_root))
}

/// Run a keyboard command against the current selection
pub fn apply_command(
    stores: &mut ProjectStores,
    selected: Option<&str>,
    command: EditorCommand,
) -> MutationResult<IntentOutcome> {
    match (command, selected) {
        (EditorCommand::Undo, _) => {
            stores.undo();
            Ok(IntentOutcome::default())
        }
        (EditorCommand::Redo, _) => {
            stores.redo();
            Ok(IntentOutcome::default())
        }
        (EditorCommand::Delete, Some(instance_id)) => delete_with_selection(stores, instance_id),
        (EditorCommand::Duplicate, Some(instance_id)) => duplicate_instance(stores, instance_id),
        (EditorCommand::SelectParent, Some(instance_id)) => Ok(IntentOutcome {
            selected_instance_id: parent_of(stores.data(), instance_id),
        }),
        (_, None) => Ok(IntentOutcome::default()),
    }
}
