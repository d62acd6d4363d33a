//! Copy and paste of instance subtrees
//!
//! The clipboard carries a versioned JSON payload. Anything that does not
//! parse as the current version is simply nothing to paste.

use crate::clone::{clone_fragment, rewrite_fragment_expressions};
use crate::drag_drop::{resolve_drop_target, DropTarget};
use crate::errors::{MutationError, MutationResult};
use crate::fragment::{extract_fragment_with_tokens, Fragment};
use crate::mutations::{InsertPosition, Mutation};
use crate::stores::{id_in_use, ProjectStores};
use crate::variables::rebind_tree_variables;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::debug;
use trellis_data::ProjectData;
use trellis_expression::unset_expression_variables;

pub const CLIPBOARD_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ClipboardPayload {
    version: u32,
    fragment: Fragment,
}

/// Serialize a fragment for the clipboard
pub fn serialize_clipboard(fragment: &Fragment) -> Result<String, serde_json::Error> {
    serde_json::to_string(&ClipboardPayload {
        version: CLIPBOARD_VERSION,
        fragment: fragment.clone(),
    })
}

/// Fragment from clipboard text; `None` for foreign, malformed or outdated payloads
pub fn parse_clipboard(text: &str) -> Option<Fragment> {
    let payload: ClipboardPayload = match serde_json::from_str(text) {
        Ok(payload) => payload,
        Err(err) => {
            debug!(error = %err, "Clipboard does not hold instances");
            return None;
        }
    };
    if payload.version != CLIPBOARD_VERSION {
        debug!(version = payload.version, "Clipboard payload has another version");
        return None;
    }
    if payload.fragment.root_ids().is_empty() {
        return None;
    }
    Some(payload.fragment)
}

/// Clipboard text for the subtree of `instance_id`
///
/// References to variables declared outside the subtree are stored by name,
/// so that pasting binds them to whatever the paste location provides.
pub fn copy_instance(data: &ProjectData, instance_id: &str) -> Option<String> {
    data.instances.get(instance_id)?;
    let mut fragment = extract_fragment_with_tokens(data, &[instance_id]);

    let copied: HashSet<String> = fragment.data_sources.iter().map(|d| d.id.clone()).collect();
    let outside_names: HashMap<String, String> = data
        .data_sources
        .values()
        .filter(|data_source| !copied.contains(&data_source.id))
        .map(|data_source| (data_source.id.clone(), data_source.name.clone()))
        .collect();
    rewrite_fragment_expressions(&mut fragment, |code| {
        unset_expression_variables(code, &outside_names)
    });

    serialize_clipboard(&fragment)
        .map_err(|err| debug!(error = %err, "Cannot serialize clipboard"))
        .ok()
}

/// Paste clipboard text into (or next to) `target_id`
///
/// Returns the ids of the pasted top-level instances, or `None` when the
/// clipboard holds nothing pasteable. Pasted records get fresh ids and their
/// expressions are rebound to the variables visible at the paste location.
pub fn paste(
    stores: &mut ProjectStores,
    text: &str,
    target_id: &str,
) -> MutationResult<Option<Vec<String>>> {
    let Some(fragment) = parse_clipboard(text) else {
        return Ok(None);
    };

    let target = resolve_drop_target(
        &stores.data().instances,
        stores.registry(),
        &DropTarget {
            parent_id: target_id.to_string(),
            position: InsertPosition::End,
        },
    )
    .ok_or_else(|| MutationError::ParentNotFound(target_id.to_string()))?;

    let snapshot = stores.data().clone();
    let (fragment, _) = clone_fragment(&fragment, stores.ids_mut(), |id| {
        // Tokens keep their id, everything else must be new
        id_in_use(&snapshot, id)
    });
    let root_ids = fragment.root_ids();

    stores.transaction(|tx| -> MutationResult<()> {
        tx.describe("Paste");
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

    Ok(Some(root_ids))
}
