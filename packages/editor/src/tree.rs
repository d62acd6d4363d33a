//! # Tree Traversal
//!
//! Read-only queries over the instance store. Every function is total:
//! absence (unknown id, unreachable node) is reported as `None`, never as a
//! panic, and cycles in malformed data terminate the walk.

use crate::components::ComponentRegistry;
use std::collections::{HashMap, HashSet};
use trellis_data::{Instance, InstanceChild, Store};

/// Result of [`find_subtree`]
#[derive(Debug, Clone, PartialEq)]
pub struct Subtree<'a> {
    /// `None` when the target is the root itself
    pub parent: Option<&'a Instance>,
    pub target: &'a Instance,
    /// Target first, then descendants in pre-order
    pub subtree_ids: Vec<String>,
}

/// Child-to-parent index over every instance in the store
#[derive(Debug, Clone, Default)]
pub struct TreeIndex {
    parents: HashMap<String, String>,
}

impl TreeIndex {
    pub fn new(instances: &Store<Instance>) -> Self {
        let mut parents = HashMap::new();
        for instance in instances.values() {
            for child_id in instance.child_ids() {
                parents
                    .entry(child_id.to_string())
                    .or_insert_with(|| instance.id.clone());
            }
        }
        Self { parents }
    }

    pub fn parent_of(&self, id: &str) -> Option<&str> {
        self.parents.get(id).map(String::as_str)
    }

    /// Ancestors of `id`, nearest first
    pub fn ancestors(&self, id: &str) -> Vec<String> {
        let mut ancestors = Vec::new();
        let mut seen = HashSet::from([id.to_string()]);
        let mut current = id;
        while let Some(parent) = self.parent_of(current) {
            if !seen.insert(parent.to_string()) {
                break;
            }
            ancestors.push(parent.to_string());
            current = parent;
        }
        ancestors
    }

    /// Top-most ancestor of `id` (itself when it has no parent)
    pub fn root_of(&self, id: &str) -> String {
        self.ancestors(id).pop().unwrap_or_else(|| id.to_string())
    }
}

/// Find `id` if it is reachable from `root_id`
pub fn find_instance_by_id<'a>(
    instances: &'a Store<Instance>,
    root_id: &str,
    id: &str,
) -> Option<&'a Instance> {
    collect_subtree_ids(instances, root_id)
        .iter()
        .any(|candidate| candidate == id)
        .then(|| instances.get(id))
        .flatten()
}

/// Parent of `id` within the tree rooted at `root_id`
pub fn find_parent_instance<'a>(
    instances: &'a Store<Instance>,
    root_id: &str,
    id: &str,
) -> Option<&'a Instance> {
    collect_subtree_ids(instances, root_id)
        .iter()
        .filter_map(|candidate| instances.get(candidate))
        .find(|instance| instance.child_ids().any(|child_id| child_id == id))
}

/// Selection target after `id` is removed from `parent_id`
///
/// The next sibling wins, then the previous one, then the parent itself.
pub fn find_closest_sibling_instance(
    instances: &Store<Instance>,
    parent_id: &str,
    id: &str,
) -> Option<String> {
    let parent = instances.get(parent_id)?;
    let siblings: Vec<&str> = parent.child_ids().collect();
    let Some(index) = siblings.iter().position(|sibling| *sibling == id) else {
        return Some(parent.id.clone());
    };

    let closest = siblings
        .get(index + 1)
        .or_else(|| index.checked_sub(1).and_then(|prev| siblings.get(prev)))
        .copied()
        .unwrap_or(parent_id);
    Some(closest.to_string())
}

/// Locate `target_id` under `root_id` together with its parent and subtree ids
pub fn find_subtree<'a>(
    instances: &'a Store<Instance>,
    root_id: &str,
    target_id: &str,
) -> Option<Subtree<'a>> {
    let target = find_instance_by_id(instances, root_id, target_id)?;
    let parent = if target_id == root_id {
        None
    } else {
        find_parent_instance(instances, root_id, target_id)
    };

    Some(Subtree {
        parent,
        target,
        subtree_ids: collect_subtree_ids(instances, target_id),
    })
}

/// `id` and its descendants in pre-order; empty when `id` is unknown
pub fn collect_subtree_ids(instances: &Store<Instance>, id: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![id.to_string()];

    while let Some(current) = stack.pop() {
        let Some(instance) = instances.get(&current) else {
            continue;
        };
        if !seen.insert(current.clone()) {
            continue;
        }
        // Reverse so the first child is visited first
        for child_id in instance.child_ids().collect::<Vec<_>>().into_iter().rev() {
            stack.push(child_id.to_string());
        }
        ids.push(current);
    }

    ids
}

/// Whether `id` is `ancestor_id` or lies somewhere below it
pub fn is_descendant_or_self(instances: &Store<Instance>, ancestor_id: &str, id: &str) -> bool {
    ancestor_id == id
        || collect_subtree_ids(instances, ancestor_id)
            .iter()
            .any(|candidate| candidate == id)
}

/// Closest instance at or above `candidate_id` that accepts children
///
/// The walk ends at the top of the tree; that instance is returned even if
/// its component is not a container.
pub fn find_closest_accepting_parent(
    instances: &Store<Instance>,
    registry: &ComponentRegistry,
    candidate_id: &str,
) -> Option<String> {
    instances.get(candidate_id)?;
    let index = TreeIndex::new(instances);

    let mut chain = vec![candidate_id.to_string()];
    chain.extend(index.ancestors(candidate_id));

    let accepting = chain.iter().find(|id| {
        instances
            .get(id.as_str())
            .map_or(false, |instance| registry.accepts_children(&instance.component))
    });
    accepting.or(chain.last()).cloned()
}

/// Id children referenced from `children`
pub fn child_ids_of(children: &[InstanceChild]) -> Vec<&str> {
    children.iter().filter_map(InstanceChild::as_id).collect()
}
