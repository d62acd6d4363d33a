//! # Project Mutations
//!
//! Structural operations on the project stores.
//!
//! ## Design Principles
//!
//! 1. **Validated first**: every check runs before the first write, so a
//!    rejected mutation leaves the data exactly as it was
//! 2. **Self-inverting**: `apply` returns the mutations that undo it, in the
//!    order they must be applied
//! 3. **Cascading**: deleting an instance removes what the subtree owns
//!    (see [`crate::post_effects`]) and the inverse brings all of it back
//!
//! ## Mutation Semantics
//!
//! ### InsertFragment
//! - Parent must exist and accept children
//! - Ids in the fragment must be new; shared tokens that already exist are kept
//!
//! ### ReparentInstance
//! - Fails if the target parent lies inside the moved subtree
//! - `position` indexes the new parent's children after the instance left its old parent
//!
//! ### DeleteInstance
//! - Removes the instance, its descendants and their dependent records
//! - Page roots are never deleted

use crate::components::ComponentRegistry;
use crate::errors::{MutationError, MutationResult};
use crate::fragment::{extract_fragment, Fragment};
use crate::tree::{child_ids_of, is_descendant_or_self, TreeIndex};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use trellis_data::{
    DataSource, InstanceChild, ProjectData, Prop, Resource, StoreKind, StyleDecl,
    ROOT_INSTANCE_ID,
};

/// Where inserted children go within the parent's `children`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum InsertPosition {
    Index(usize),
    End,
}

impl InsertPosition {
    /// Concrete index for a list of `len` children; out of range means end
    pub fn resolve(self, len: usize) -> usize {
        match self {
            InsertPosition::Index(index) => index.min(len),
            InsertPosition::End => len,
        }
    }
}

/// Semantic mutations of a project
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Mutation {
    /// Attach the fragment's top-level instances to a parent
    #[serde(rename_all = "camelCase")]
    InsertFragment {
        fragment: Fragment,
        parent_id: String,
        position: InsertPosition,
    },

    /// Remove an instance subtree and everything it owns
    #[serde(rename_all = "camelCase")]
    DeleteInstance { instance_id: String },

    /// Move an instance to a new parent
    #[serde(rename_all = "camelCase")]
    ReparentInstance {
        instance_id: String,
        parent_id: String,
        position: InsertPosition,
    },

    /// Replace text and expression children; instance children must stay as they are
    #[serde(rename_all = "camelCase")]
    SetInstanceChildren {
        instance_id: String,
        children: Vec<InstanceChild>,
    },

    #[serde(rename_all = "camelCase")]
    SetInstanceLabel {
        instance_id: String,
        label: Option<String>,
    },

    /// Upsert on `(instance_id, name)`
    SetProp { prop: Prop },

    #[serde(rename_all = "camelCase")]
    DeleteProp { prop_id: String },

    #[serde(rename_all = "camelCase")]
    PutDataSource { data_source: DataSource },

    #[serde(rename_all = "camelCase")]
    DeleteDataSource { data_source_id: String },

    PutResource { resource: Resource },

    #[serde(rename_all = "camelCase")]
    DeleteResource { resource_id: String },

    SetStyleDecl { decl: StyleDecl },

    /// Key as produced by [`StyleDecl::key`]
    DeleteStyleDecl { key: String },

    /// Upsert raw records without touching the tree
    PutRecords { fragment: Fragment },

    /// Remove records by id from one store
    RemoveRecords { namespace: StoreKind, ids: Vec<String> },
}

impl Mutation {
    /// Apply to `data`, returning the inverse mutations
    pub fn apply(
        &self,
        data: &mut ProjectData,
        registry: &ComponentRegistry,
    ) -> MutationResult<Vec<Mutation>> {
        match self {
            Mutation::InsertFragment {
                fragment,
                parent_id,
                position,
            } => Self::apply_insert_fragment(data, registry, fragment, parent_id, *position),
            Mutation::DeleteInstance { instance_id } => Self::apply_delete(data, instance_id),
            Mutation::ReparentInstance {
                instance_id,
                parent_id,
                position,
            } => Self::apply_reparent(data, registry, instance_id, parent_id, *position),
            Mutation::SetInstanceChildren {
                instance_id,
                children,
            } => Self::apply_set_children(data, instance_id, children),
            Mutation::SetInstanceLabel { instance_id, label } => {
                Self::apply_set_label(data, instance_id, label)
            }
            Mutation::SetProp { prop } => Self::apply_set_prop(data, prop),
            Mutation::DeleteProp { prop_id } => Self::apply_delete_prop(data, prop_id),
            Mutation::PutDataSource { data_source } => {
                Self::apply_put_data_source(data, data_source)
            }
            Mutation::DeleteDataSource { data_source_id } => {
                Self::apply_delete_data_source(data, data_source_id)
            }
            Mutation::PutResource { resource } => Self::apply_put_resource(data, resource),
            Mutation::DeleteResource { resource_id } => {
                Self::apply_delete_resource(data, resource_id)
            }
            Mutation::SetStyleDecl { decl } => Self::apply_set_style_decl(data, decl),
            Mutation::DeleteStyleDecl { key } => Self::apply_delete_style_decl(data, key),
            Mutation::PutRecords { fragment } => Self::apply_put_records(data, fragment),
            Mutation::RemoveRecords { namespace, ids } => {
                Self::apply_remove_records(data, *namespace, ids)
            }
        }
    }

    /// Check the mutation against `data` without changing it
    pub fn validate(&self, data: &ProjectData, registry: &ComponentRegistry) -> MutationResult<()> {
        // Stores are shared until written, so the scratch copy is cheap
        let mut scratch = data.clone();
        self.apply(&mut scratch, registry).map(|_| ())
    }

    /// Short label used for undo history
    pub fn description(&self) -> &'static str {
        match self {
            Mutation::InsertFragment { .. } => "Insert",
            Mutation::DeleteInstance { .. } => "Delete",
            Mutation::ReparentInstance { .. } => "Move",
            Mutation::SetInstanceChildren { .. } => "Edit content",
            Mutation::SetInstanceLabel { .. } => "Rename",
            Mutation::SetProp { .. } => "Set property",
            Mutation::DeleteProp { .. } => "Delete property",
            Mutation::PutDataSource { .. } => "Set variable",
            Mutation::DeleteDataSource { .. } => "Delete variable",
            Mutation::PutResource { .. } => "Set resource",
            Mutation::DeleteResource { .. } => "Delete resource",
            Mutation::SetStyleDecl { .. } => "Set style",
            Mutation::DeleteStyleDecl { .. } => "Delete style",
            Mutation::PutRecords { .. } => "Restore records",
            Mutation::RemoveRecords { .. } => "Remove records",
        }
    }

    fn accepts_children(
        data: &ProjectData,
        registry: &ComponentRegistry,
        parent_id: &str,
    ) -> MutationResult<()> {
        let parent = data
            .instances
            .get(parent_id)
            .ok_or_else(|| MutationError::ParentNotFound(parent_id.to_string()))?;
        if registry.accepts_children(&parent.component) || data.is_page_root(parent_id) {
            Ok(())
        } else {
            Err(MutationError::ParentRejectsChildren {
                parent_id: parent_id.to_string(),
                component: parent.component.clone(),
            })
        }
    }

    fn apply_insert_fragment(
        data: &mut ProjectData,
        registry: &ComponentRegistry,
        fragment: &Fragment,
        parent_id: &str,
        position: InsertPosition,
    ) -> MutationResult<Vec<Mutation>> {
        let root_ids = fragment.root_ids();
        if root_ids.is_empty() {
            return Err(MutationError::EmptyFragment);
        }
        if root_ids.len() != fragment.children.len() {
            return Err(MutationError::InvalidChildren {
                instance_id: parent_id.to_string(),
                reason: "fragment children must reference instances".to_string(),
            });
        }
        Self::accepts_children(data, registry, parent_id)?;

        let instance_ids = fragment.instance_ids();
        if let Some(missing) = root_ids
            .iter()
            .find(|id| !instance_ids.contains(id.as_str()))
        {
            return Err(MutationError::InvalidChildren {
                instance_id: parent_id.to_string(),
                reason: format!("{} is not part of the fragment", missing),
            });
        }

        let duplicate = fragment
            .instances
            .iter()
            .map(|instance| &instance.id)
            .find(|id| data.instances.contains_key(*id))
            .or_else(|| {
                fragment
                    .props
                    .iter()
                    .map(|prop| &prop.id)
                    .find(|id| data.props.contains_key(*id))
            })
            .or_else(|| {
                fragment
                    .data_sources
                    .iter()
                    .map(|data_source| &data_source.id)
                    .find(|id| data.data_sources.contains_key(*id))
            })
            .or_else(|| {
                fragment
                    .resources
                    .iter()
                    .map(|resource| &resource.id)
                    .find(|id| data.resources.contains_key(*id))
            });
        if let Some(id) = duplicate {
            return Err(MutationError::DuplicateId(id.clone()));
        }
        if let Some(source) = fragment
            .style_sources
            .iter()
            .find(|source| source.is_local() && data.style_sources.contains_key(source.id()))
        {
            return Err(MutationError::DuplicateId(source.id().to_string()));
        }

        // Tokens are shared: an existing token wins over the fragment's copy
        let existing_tokens: HashSet<String> = fragment
            .style_sources
            .iter()
            .filter(|source| !source.is_local() && data.style_sources.contains_key(source.id()))
            .map(|source| source.id().to_string())
            .collect();
        let mut records = fragment.clone();
        records.children.clear();
        records
            .style_sources
            .retain(|source| !existing_tokens.contains(source.id()));
        records
            .styles
            .retain(|decl| !existing_tokens.contains(&decl.style_source_id));

        let new_tokens: Vec<String> = records
            .style_sources
            .iter()
            .filter(|source| !source.is_local())
            .map(|source| source.id().to_string())
            .collect();
        let new_token_styles: Vec<String> = records
            .styles
            .iter()
            .filter(|decl| new_tokens.contains(&decl.style_source_id))
            .map(StyleDecl::key)
            .collect();

        records.put_into(data);
        if let Some(parent) = Arc::make_mut(&mut data.instances).get_mut(parent_id) {
            let index = position.resolve(parent.children.len());
            parent
                .children
                .splice(index..index, fragment.children.iter().cloned());
        }

        let mut inverses: Vec<Mutation> = root_ids
            .into_iter()
            .map(|instance_id| Mutation::DeleteInstance { instance_id })
            .collect();
        if !new_token_styles.is_empty() {
            inverses.push(Mutation::RemoveRecords {
                namespace: StoreKind::Styles,
                ids: new_token_styles,
            });
        }
        if !new_tokens.is_empty() {
            inverses.push(Mutation::RemoveRecords {
                namespace: StoreKind::StyleSources,
                ids: new_tokens,
            });
        }
        Ok(inverses)
    }

    fn apply_delete(data: &mut ProjectData, instance_id: &str) -> MutationResult<Vec<Mutation>> {
        if instance_id == ROOT_INSTANCE_ID || data.is_page_root(instance_id) {
            return Err(MutationError::CannotDeleteRoot(instance_id.to_string()));
        }
        if !data.instances.contains_key(instance_id) {
            return Err(MutationError::InstanceNotFound(instance_id.to_string()));
        }

        let index = TreeIndex::new(&data.instances);
        let parent_id = index
            .parent_of(instance_id)
            .ok_or_else(|| MutationError::CannotDeleteRoot(instance_id.to_string()))?
            .to_string();
        let position = data
            .instances
            .get(&parent_id)
            .and_then(|parent| parent.child_position(instance_id))
            .ok_or_else(|| MutationError::ParentNotFound(parent_id.clone()))?;

        let fragment = extract_fragment(data, &[instance_id]);
        fragment.remove_from(data);
        if let Some(parent) = Arc::make_mut(&mut data.instances).get_mut(&parent_id) {
            parent.children.remove(position);
        }

        Ok(vec![Mutation::InsertFragment {
            fragment,
            parent_id,
            position: InsertPosition::Index(position),
        }])
    }

    fn apply_reparent(
        data: &mut ProjectData,
        registry: &ComponentRegistry,
        instance_id: &str,
        parent_id: &str,
        position: InsertPosition,
    ) -> MutationResult<Vec<Mutation>> {
        if !data.instances.contains_key(instance_id) {
            return Err(MutationError::InstanceNotFound(instance_id.to_string()));
        }
        if is_descendant_or_self(&data.instances, instance_id, parent_id) {
            return Err(MutationError::CycleDetected {
                instance_id: instance_id.to_string(),
                parent_id: parent_id.to_string(),
            });
        }
        Self::accepts_children(data, registry, parent_id)?;
        if data.is_page_root(instance_id) {
            return Err(MutationError::CannotMoveRoot(instance_id.to_string()));
        }

        let index = TreeIndex::new(&data.instances);
        let old_parent_id = index
            .parent_of(instance_id)
            .ok_or_else(|| MutationError::CannotMoveRoot(instance_id.to_string()))?
            .to_string();
        let old_position = data
            .instances
            .get(&old_parent_id)
            .and_then(|parent| parent.child_position(instance_id))
            .ok_or_else(|| MutationError::ParentNotFound(old_parent_id.clone()))?;

        let instances = Arc::make_mut(&mut data.instances);
        if let Some(old_parent) = instances.get_mut(&old_parent_id) {
            old_parent.children.remove(old_position);
        }
        if let Some(parent) = instances.get_mut(parent_id) {
            let index = position.resolve(parent.children.len());
            parent
                .children
                .insert(index, InstanceChild::id(instance_id));
        }

        Ok(vec![Mutation::ReparentInstance {
            instance_id: instance_id.to_string(),
            parent_id: old_parent_id,
            position: InsertPosition::Index(old_position),
        }])
    }

    fn apply_set_children(
        data: &mut ProjectData,
        instance_id: &str,
        children: &[InstanceChild],
    ) -> MutationResult<Vec<Mutation>> {
        let instance = data
            .instances
            .get(instance_id)
            .ok_or_else(|| MutationError::InstanceNotFound(instance_id.to_string()))?;
        if child_ids_of(children) != instance.child_ids().collect::<Vec<_>>() {
            return Err(MutationError::InvalidChildren {
                instance_id: instance_id.to_string(),
                reason: "instance children can only change through insert, move or delete"
                    .to_string(),
            });
        }

        let old = instance.children.clone();
        if let Some(instance) = Arc::make_mut(&mut data.instances).get_mut(instance_id) {
            instance.children = children.to_vec();
        }
        Ok(vec![Mutation::SetInstanceChildren {
            instance_id: instance_id.to_string(),
            children: old,
        }])
    }

    fn apply_set_label(
        data: &mut ProjectData,
        instance_id: &str,
        label: &Option<String>,
    ) -> MutationResult<Vec<Mutation>> {
        let instance = Arc::make_mut(&mut data.instances)
            .get_mut(instance_id)
            .ok_or_else(|| MutationError::InstanceNotFound(instance_id.to_string()))?;
        let old = std::mem::replace(&mut instance.label, label.clone());
        Ok(vec![Mutation::SetInstanceLabel {
            instance_id: instance_id.to_string(),
            label: old,
        }])
    }

    fn apply_set_prop(data: &mut ProjectData, prop: &Prop) -> MutationResult<Vec<Mutation>> {
        if !data.instances.contains_key(&prop.instance_id) {
            return Err(MutationError::InstanceNotFound(prop.instance_id.clone()));
        }

        let replaced: Vec<Prop> = data
            .props
            .values()
            .filter(|existing| {
                existing.id == prop.id
                    || (existing.instance_id == prop.instance_id && existing.name == prop.name)
            })
            .cloned()
            .collect();

        let props = Arc::make_mut(&mut data.props);
        for existing in &replaced {
            props.remove(&existing.id);
        }
        props.insert(prop.id.clone(), prop.clone());

        let mut inverses = vec![Mutation::DeleteProp {
            prop_id: prop.id.clone(),
        }];
        inverses.extend(
            replaced
                .into_iter()
                .map(|prop| Mutation::SetProp { prop }),
        );
        Ok(inverses)
    }

    fn apply_delete_prop(data: &mut ProjectData, prop_id: &str) -> MutationResult<Vec<Mutation>> {
        let prop = Arc::make_mut(&mut data.props)
            .remove(prop_id)
            .ok_or_else(|| MutationError::PropNotFound(prop_id.to_string()))?;
        Ok(vec![Mutation::SetProp { prop }])
    }

    fn apply_put_data_source(
        data: &mut ProjectData,
        data_source: &DataSource,
    ) -> MutationResult<Vec<Mutation>> {
        if let Some(scope) = &data_source.scope_instance_id {
            if scope != ROOT_INSTANCE_ID && !data.instances.contains_key(scope) {
                return Err(MutationError::InstanceNotFound(scope.clone()));
            }
        }

        let old = Arc::make_mut(&mut data.data_sources)
            .insert(data_source.id.clone(), data_source.clone());
        Ok(vec![match old {
            Some(data_source) => Mutation::PutDataSource { data_source },
            None => Mutation::DeleteDataSource {
                data_source_id: data_source.id.clone(),
            },
        }])
    }

    fn apply_delete_data_source(
        data: &mut ProjectData,
        data_source_id: &str,
    ) -> MutationResult<Vec<Mutation>> {
        let data_source = Arc::make_mut(&mut data.data_sources)
            .remove(data_source_id)
            .ok_or_else(|| MutationError::DataSourceNotFound(data_source_id.to_string()))?;
        Ok(vec![Mutation::PutDataSource { data_source }])
    }

    fn apply_put_resource(
        data: &mut ProjectData,
        resource: &Resource,
    ) -> MutationResult<Vec<Mutation>> {
        let old =
            Arc::make_mut(&mut data.resources).insert(resource.id.clone(), resource.clone());
        Ok(vec![match old {
            Some(resource) => Mutation::PutResource { resource },
            None => Mutation::DeleteResource {
                resource_id: resource.id.clone(),
            },
        }])
    }

    fn apply_delete_resource(
        data: &mut ProjectData,
        resource_id: &str,
    ) -> MutationResult<Vec<Mutation>> {
        let resource = Arc::make_mut(&mut data.resources)
            .remove(resource_id)
            .ok_or_else(|| MutationError::ResourceNotFound(resource_id.to_string()))?;
        Ok(vec![Mutation::PutResource { resource }])
    }

    fn apply_set_style_decl(
        data: &mut ProjectData,
        decl: &StyleDecl,
    ) -> MutationResult<Vec<Mutation>> {
        let key = decl.key();
        let old = Arc::make_mut(&mut data.styles).insert(key.clone(), decl.clone());
        Ok(vec![match old {
            Some(decl) => Mutation::SetStyleDecl { decl },
            None => Mutation::DeleteStyleDecl { key },
        }])
    }

    fn apply_delete_style_decl(data: &mut ProjectData, key: &str) -> MutationResult<Vec<Mutation>> {
        let decl = Arc::make_mut(&mut data.styles)
            .remove(key)
            .ok_or_else(|| MutationError::StyleDeclNotFound(key.to_string()))?;
        Ok(vec![Mutation::SetStyleDecl { decl }])
    }

    fn apply_put_records(
        data: &mut ProjectData,
        fragment: &Fragment,
    ) -> MutationResult<Vec<Mutation>> {
        let previous = existing_records(data, fragment);

        let mut inverses = Vec::new();
        let mut remove_new = |namespace: StoreKind, ids: Vec<String>| {
            if !ids.is_empty() {
                inverses.push(Mutation::RemoveRecords { namespace, ids });
            }
        };
        remove_new(
            StoreKind::Instances,
            new_ids(fragment.instances.iter().map(|i| i.id.clone()), |id| {
                data.instances.contains_key(id)
            }),
        );
        remove_new(
            StoreKind::Props,
            new_ids(fragment.props.iter().map(|p| p.id.clone()), |id| {
                data.props.contains_key(id)
            }),
        );
        remove_new(
            StoreKind::DataSources,
            new_ids(fragment.data_sources.iter().map(|d| d.id.clone()), |id| {
                data.data_sources.contains_key(id)
            }),
        );
        remove_new(
            StoreKind::Resources,
            new_ids(fragment.resources.iter().map(|r| r.id.clone()), |id| {
                data.resources.contains_key(id)
            }),
        );
        remove_new(
            StoreKind::StyleSources,
            new_ids(
                fragment.style_sources.iter().map(|s| s.id().to_string()),
                |id| data.style_sources.contains_key(id),
            ),
        );
        remove_new(
            StoreKind::StyleSourceSelections,
            new_ids(
                fragment
                    .style_source_selections
                    .iter()
                    .map(|s| s.instance_id.clone()),
                |id| data.style_source_selections.contains_key(id),
            ),
        );
        remove_new(
            StoreKind::Styles,
            new_ids(fragment.styles.iter().map(StyleDecl::key), |id| {
                data.styles.contains_key(id)
            }),
        );

        fragment.put_into(data);
        if !previous.is_empty() {
            inverses.push(Mutation::PutRecords { fragment: previous });
        }
        Ok(inverses)
    }

    fn apply_remove_records(
        data: &mut ProjectData,
        namespace: StoreKind,
        ids: &[String],
    ) -> MutationResult<Vec<Mutation>> {
        let removed = records_by_id(data, namespace, ids)?;
        removed.remove_from(data);
        if removed.is_empty() {
            Ok(Vec::new())
        } else {
            Ok(vec![Mutation::PutRecords { fragment: removed }])
        }
    }
}

fn new_ids(ids: impl Iterator<Item = String>, exists: impl Fn(&str) -> bool) -> Vec<String> {
    ids.filter(|id| !exists(id)).collect()
}

/// Current versions of the records `fragment` would overwrite
fn existing_records(data: &ProjectData, fragment: &Fragment) -> Fragment {
    Fragment {
        children: Vec::new(),
        instances: fragment
            .instances
            .iter()
            .filter_map(|instance| data.instances.get(&instance.id).cloned())
            .collect(),
        props: fragment
            .props
            .iter()
            .filter_map(|prop| data.props.get(&prop.id).cloned())
            .collect(),
        data_sources: fragment
            .data_sources
            .iter()
            .filter_map(|data_source| data.data_sources.get(&data_source.id).cloned())
            .collect(),
        resources: fragment
            .resources
            .iter()
            .filter_map(|resource| data.resources.get(&resource.id).cloned())
            .collect(),
        style_sources: fragment
            .style_sources
            .iter()
            .filter_map(|source| data.style_sources.get(source.id()).cloned())
            .collect(),
        style_source_selections: fragment
            .style_source_selections
            .iter()
            .filter_map(|selection| {
                data.style_source_selections
                    .get(&selection.instance_id)
                    .cloned()
            })
            .collect(),
        styles: fragment
            .styles
            .iter()
            .filter_map(|decl| data.styles.get(&decl.key()).cloned())
            .collect(),
    }
}

/// Records of one store with the given ids; unknown ids are skipped
pub(crate) fn records_by_id(
    data: &ProjectData,
    namespace: StoreKind,
    ids: &[String],
) -> MutationResult<Fragment> {
    fn pick<T: Clone>(store: &trellis_data::Store<T>, ids: &[String]) -> Vec<T> {
        ids.iter().filter_map(|id| store.get(id)).cloned().collect()
    }

    let mut fragment = Fragment::default();
    match namespace {
        StoreKind::Instances => fragment.instances = pick(&data.instances, ids),
        StoreKind::Props => fragment.props = pick(&data.props, ids),
        StoreKind::DataSources => fragment.data_sources = pick(&data.data_sources, ids),
        StoreKind::Resources => fragment.resources = pick(&data.resources, ids),
        StoreKind::StyleSources => fragment.style_sources = pick(&data.style_sources, ids),
        StoreKind::StyleSourceSelections => {
            fragment.style_source_selections = pick(&data.style_source_selections, ids)
        }
        StoreKind::Styles => fragment.styles = pick(&data.styles, ids),
        StoreKind::Breakpoints | StoreKind::Pages => {
            return Err(MutationError::UnsupportedStore(namespace))
        }
    }
    Ok(fragment)
}
