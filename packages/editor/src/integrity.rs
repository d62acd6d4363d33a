//! # Project Integrity
//!
//! Structural checks over a whole project, plus garbage collection of
//! records nothing points at anymore. Deletes cascade eagerly, so orphans
//! only come from older snapshots or from edits made outside the stores.

use crate::errors::MutationResult;
use crate::fragment::Fragment;
use crate::mutations::Mutation;
use crate::stores::ProjectStores;
use crate::tree::collect_subtree_ids;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use thiserror::Error;
use tracing::info;
use trellis_data::{
    InstanceChild, ProjectData, ProjectSnapshot, StoreKind, StyleDecl, ROOT_INSTANCE_ID,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueLevel {
    Error,
    Warning,
}

#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum IntegrityIssue {
    #[error("{store} contains id {id} more than once")]
    DuplicateKey { store: StoreKind, id: String },

    #[error("{store} record stored under {key} has id {id}")]
    KeyMismatch {
        store: StoreKind,
        key: String,
        id: String,
    },

    #[error("Id {id} is used by both {first} and {second}")]
    SharedId {
        id: String,
        first: StoreKind,
        second: StoreKind,
    },

    #[error("Instance {instance_id} has missing child {child_id}")]
    DanglingChild {
        instance_id: String,
        child_id: String,
    },

    #[error("Instance {instance_id} has several parents: {}", parent_ids.join(", "))]
    MultipleParents {
        instance_id: String,
        parent_ids: Vec<String>,
    },

    #[error("Instance {instance_id} is its own ancestor")]
    Cycle { instance_id: String },

    #[error("Page {page_id} has missing root instance {instance_id}")]
    MissingPageRoot { page_id: String, instance_id: String },

    #[error("Instance {instance_id} is not reachable from any page")]
    Unreachable { instance_id: String },

    #[error("Prop {prop_id} belongs to missing instance {instance_id}")]
    OrphanProp { prop_id: String, instance_id: String },

    #[error("Variable {data_source_id} is scoped to missing instance {instance_id}")]
    OrphanDataSource {
        data_source_id: String,
        instance_id: String,
    },

    #[error("Resource {resource_id} is not used by any prop or variable")]
    OrphanResource { resource_id: String },

    #[error("Style selection of missing instance {instance_id}")]
    OrphanStyleSelection { instance_id: String },

    #[error("Local style source {style_source_id} is not selected by any instance")]
    OrphanStyleSource { style_source_id: String },

    #[error("Style declaration {key} belongs to missing style source")]
    OrphanStyle { key: String },
}

impl IntegrityIssue {
    /// Orphans waste space but render fine; everything else is broken data
    pub fn level(&self) -> IssueLevel {
        match self {
            IntegrityIssue::Unreachable { .. }
            | IntegrityIssue::OrphanProp { .. }
            | IntegrityIssue::OrphanDataSource { .. }
            | IntegrityIssue::OrphanResource { .. }
            | IntegrityIssue::OrphanStyleSelection { .. }
            | IntegrityIssue::OrphanStyleSource { .. }
            | IntegrityIssue::OrphanStyle { .. } => IssueLevel::Warning,
            _ => IssueLevel::Error,
        }
    }
}

/// Checks only visible in the persisted form: duplicate and mismatched keys
pub fn validate_snapshot(snapshot: &ProjectSnapshot) -> Vec<IntegrityIssue> {
    fn check<T>(
        issues: &mut Vec<IntegrityIssue>,
        store: StoreKind,
        pairs: &[(String, T)],
        id_of: impl Fn(&T) -> String,
    ) {
        let mut seen = HashSet::new();
        for (key, value) in pairs {
            if !seen.insert(key.as_str()) {
                issues.push(IntegrityIssue::DuplicateKey {
                    store,
                    id: key.clone(),
                });
            }
            let id = id_of(value);
            if &id != key {
                issues.push(IntegrityIssue::KeyMismatch {
                    store,
                    key: key.clone(),
                    id,
                });
            }
        }
    }

    let mut issues = Vec::new();
    check(&mut issues, StoreKind::Instances, &snapshot.instances, |i| i.id.clone());
    check(&mut issues, StoreKind::Props, &snapshot.props, |p| p.id.clone());
    check(&mut issues, StoreKind::DataSources, &snapshot.data_sources, |d| d.id.clone());
    check(&mut issues, StoreKind::Resources, &snapshot.resources, |r| r.id.clone());
    check(&mut issues, StoreKind::StyleSources, &snapshot.style_sources, |s| s.id().to_string());
    check(
        &mut issues,
        StoreKind::StyleSourceSelections,
        &snapshot.style_source_selections,
        |s| s.instance_id.clone(),
    );
    check(&mut issues, StoreKind::Styles, &snapshot.styles, StyleDecl::key);
    check(&mut issues, StoreKind::Breakpoints, &snapshot.breakpoints, |b| b.id.clone());
    check(&mut issues, StoreKind::Pages, &snapshot.pages, |p| p.id.clone());
    issues.extend(validate_project(&ProjectData::from_snapshot(snapshot.clone())));
    issues
}

fn parents_by_child(data: &ProjectData) -> BTreeMap<&str, Vec<&str>> {
    let mut parents: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for instance in data.instances.values() {
        for child_id in instance.child_ids() {
            parents.entry(child_id).or_default().push(&instance.id);
        }
    }
    parents
}

fn root_ids(data: &ProjectData, parents: &BTreeMap<&str, Vec<&str>>) -> Vec<String> {
    if data.pages.is_empty() {
        data.instances
            .keys()
            .filter(|id| !parents.contains_key(id.as_str()))
            .cloned()
            .collect()
    } else {
        data.pages
            .values()
            .map(|page| page.root_instance_id.clone())
            .collect()
    }
}

fn reachable_ids(data: &ProjectData) -> HashSet<String> {
    let parents = parents_by_child(data);
    root_ids(data, &parents)
        .iter()
        .flat_map(|root_id| collect_subtree_ids(&data.instances, root_id))
        .collect()
}

fn has_cycle(data: &ProjectData, start: &str) -> bool {
    let mut stack: Vec<&str> = data
        .instances
        .get(start)
        .map(|instance| instance.child_ids().collect())
        .unwrap_or_default();
    let mut visited = HashSet::new();
    while let Some(id) = stack.pop() {
        if id == start {
            return true;
        }
        if !visited.insert(id) {
            continue;
        }
        if let Some(instance) = data.instances.get(id) {
            stack.extend(instance.child_ids());
        }
    }
    false
}

/// Every structural problem of `data`, in store order
pub fn validate_project(data: &ProjectData) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();

    let mut owners: HashMap<&str, StoreKind> = HashMap::new();
    let keyed = [
        (StoreKind::Instances, data.instances.keys().collect::<Vec<_>>()),
        (StoreKind::Props, data.props.keys().collect()),
        (StoreKind::DataSources, data.data_sources.keys().collect()),
        (StoreKind::Resources, data.resources.keys().collect()),
        (StoreKind::StyleSources, data.style_sources.keys().collect()),
    ];
    for (store, ids) in keyed {
        for id in ids {
            if let Some(first) = owners.insert(id.as_str(), store) {
                issues.push(IntegrityIssue::SharedId {
                    id: id.clone(),
                    first,
                    second: store,
                });
            }
        }
    }

    for (key, instance) in data.instances.iter() {
        if &instance.id != key {
            issues.push(IntegrityIssue::KeyMismatch {
                store: StoreKind::Instances,
                key: key.clone(),
                id: instance.id.clone(),
            });
        }
        for child in &instance.children {
            if let InstanceChild::Id(child_id) = child {
                if !data.instances.contains_key(child_id) {
                    issues.push(IntegrityIssue::DanglingChild {
                        instance_id: instance.id.clone(),
                        child_id: child_id.clone(),
                    });
                }
            }
        }
    }

    let parents = parents_by_child(data);
    for (child_id, parent_ids) in &parents {
        // Slot content is shared by every copy of the slot
        let shared_by_slots = parent_ids.iter().all(|parent_id| {
            data.instances
                .get(*parent_id)
                .is_some_and(|parent| parent.is_slot())
        });
        if parent_ids.len() > 1 && !shared_by_slots {
            issues.push(IntegrityIssue::MultipleParents {
                instance_id: child_id.to_string(),
                parent_ids: parent_ids.iter().map(|id| id.to_string()).collect(),
            });
        }
    }

    for id in data.instances.keys() {
        if has_cycle(data, id) {
            issues.push(IntegrityIssue::Cycle {
                instance_id: id.clone(),
            });
        }
    }

    for page in data.pages.values() {
        if !data.instances.contains_key(&page.root_instance_id) {
            issues.push(IntegrityIssue::MissingPageRoot {
                page_id: page.id.clone(),
                instance_id: page.root_instance_id.clone(),
            });
        }
    }

    if !data.pages.is_empty() {
        let reachable = reachable_ids(data);
        for id in data.instances.keys() {
            if !reachable.contains(id) {
                issues.push(IntegrityIssue::Unreachable {
                    instance_id: id.clone(),
                });
            }
        }
    }

    issues.extend(orphan_issues(data));
    issues
}

fn orphan_issues(data: &ProjectData) -> Vec<IntegrityIssue> {
    let mut issues = Vec::new();

    for prop in data.props.values() {
        if !data.instances.contains_key(&prop.instance_id) {
            issues.push(IntegrityIssue::OrphanProp {
                prop_id: prop.id.clone(),
                instance_id: prop.instance_id.clone(),
            });
        }
    }

    for data_source in data.data_sources.values() {
        match data_source.scope_instance_id.as_deref() {
            None | Some(ROOT_INSTANCE_ID) => {}
            Some(scope) if data.instances.contains_key(scope) => {}
            Some(scope) => issues.push(IntegrityIssue::OrphanDataSource {
                data_source_id: data_source.id.clone(),
                instance_id: scope.to_string(),
            }),
        }
    }

    let used_resources: HashSet<&str> = data
        .props
        .values()
        .filter_map(|prop| prop.value.resource_id())
        .chain(
            data.data_sources
                .values()
                .filter_map(|data_source| data_source.resource_id()),
        )
        .collect();
    for resource_id in data.resources.keys() {
        if !used_resources.contains(resource_id.as_str()) {
            issues.push(IntegrityIssue::OrphanResource {
                resource_id: resource_id.clone(),
            });
        }
    }

    for instance_id in data.style_source_selections.keys() {
        if !data.instances.contains_key(instance_id) {
            issues.push(IntegrityIssue::OrphanStyleSelection {
                instance_id: instance_id.clone(),
            });
        }
    }

    let selected: HashSet<&str> = data
        .style_source_selections
        .iter()
        .filter(|(instance_id, _)| data.instances.contains_key(*instance_id))
        .flat_map(|(_, selection)| selection.values.iter().map(String::as_str))
        .collect();
    for source in data.style_sources.values() {
        if source.is_local() && !selected.contains(source.id()) {
            issues.push(IntegrityIssue::OrphanStyleSource {
                style_source_id: source.id().to_string(),
            });
        }
    }

    for (key, decl) in data.styles.iter() {
        let source_alive = data
            .style_sources
            .get(&decl.style_source_id)
            .is_some_and(|source| !source.is_local() || selected.contains(source.id()));
        if !source_alive {
            issues.push(IntegrityIssue::OrphanStyle { key: key.clone() });
        }
    }

    issues
}

/// Records that nothing in the tree reaches anymore
///
/// Unreachable instances are included only when the project has pages;
/// without pages every parentless instance counts as a root.
pub fn find_orphans(data: &ProjectData) -> Fragment {
    let mut orphans = Fragment::default();

    if !data.pages.is_empty() {
        let reachable = reachable_ids(data);
        orphans.instances = data
            .instances
            .values()
            .filter(|instance| !reachable.contains(&instance.id))
            .cloned()
            .collect();
    }
    let removed: HashSet<String> = orphans.instances.iter().map(|i| i.id.clone()).collect();
    let alive = |id: &str| data.instances.contains_key(id) && !removed.contains(id);

    orphans.props = data
        .props
        .values()
        .filter(|prop| !alive(&prop.instance_id))
        .cloned()
        .collect();
    orphans.data_sources = data
        .data_sources
        .values()
        .filter(|data_source| match data_source.scope_instance_id.as_deref() {
            None | Some(ROOT_INSTANCE_ID) => false,
            Some(scope) => !alive(scope),
        })
        .cloned()
        .collect();
    orphans.style_source_selections = data
        .style_source_selections
        .values()
        .filter(|selection| !alive(&selection.instance_id))
        .cloned()
        .collect();

    let selected: HashSet<&str> = data
        .style_source_selections
        .values()
        .filter(|selection| alive(&selection.instance_id))
        .flat_map(|selection| selection.values.iter().map(String::as_str))
        .collect();
    orphans.style_sources = data
        .style_sources
        .values()
        .filter(|source| source.is_local() && !selected.contains(source.id()))
        .cloned()
        .collect();
    let dead_sources: HashSet<String> = orphans
        .style_sources
        .iter()
        .map(|s| s.id().to_string())
        .collect();
    orphans.styles = data
        .styles
        .values()
        .filter(|decl| {
            dead_sources.contains(&decl.style_source_id)
                || !data.style_sources.contains_key(&decl.style_source_id)
        })
        .cloned()
        .collect();

    let dead_props: HashSet<String> = orphans.props.iter().map(|p| p.id.clone()).collect();
    let dead_data_sources: HashSet<String> =
        orphans.data_sources.iter().map(|d| d.id.clone()).collect();
    let used_resources: HashSet<&str> = data
        .props
        .values()
        .filter(|prop| !dead_props.contains(&prop.id))
        .filter_map(|prop| prop.value.resource_id())
        .chain(
            data.data_sources
                .values()
                .filter(|data_source| !dead_data_sources.contains(&data_source.id))
                .filter_map(|data_source| data_source.resource_id()),
        )
        .collect();
    orphans.resources = data
        .resources
        .values()
        .filter(|resource| !used_resources.contains(resource.id.as_str()))
        .cloned()
        .collect();

    orphans
}

/// Remove every orphan in one undoable transaction; returns how many records went
pub fn remove_orphans(stores: &mut ProjectStores) -> MutationResult<usize> {
    let orphans = find_orphans(stores.data());
    if orphans.is_empty() {
        return Ok(0);
    }

    let removals: Vec<(StoreKind, Vec<String>)> = vec![
        (
            StoreKind::Instances,
            orphans.instances.iter().map(|i| i.id.clone()).collect(),
        ),
        (StoreKind::Props, orphans.props.iter().map(|p| p.id.clone()).collect()),
        (
            StoreKind::DataSources,
            orphans.data_sources.iter().map(|d| d.id.clone()).collect(),
        ),
        (
            StoreKind::Resources,
            orphans.resources.iter().map(|r| r.id.clone()).collect(),
        ),
        (
            StoreKind::StyleSourceSelections,
            orphans
                .style_source_selections
                .iter()
                .map(|s| s.instance_id.clone())
                .collect(),
        ),
        (
            StoreKind::StyleSources,
            orphans.style_sources.iter().map(|s| s.id().to_string()).collect(),
        ),
        (StoreKind::Styles, orphans.styles.iter().map(StyleDecl::key).collect()),
    ];
    let count = removals.iter().map(|(_, ids)| ids.len()).sum();

    stores.transaction(|tx| -> MutationResult<()> {
        tx.describe("Remove unused records");
        for (namespace, ids) in removals {
            if !ids.is_empty() {
                tx.apply(Mutation::RemoveRecords { namespace, ids })?;
            }
        }
        Ok(())
    })?;
    info!(count, "Removed orphaned records");
    Ok(count)
}
