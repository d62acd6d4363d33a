//! # Variable Scoping
//!
//! Which data sources an instance can see, which names its expressions leave
//! unbound, and how expressions are rebound when a subtree changes scope.
//!
//! A variable is visible to the instance it is scoped to and everything
//! below, until a `Slot`: slot content is shared between instances and only
//! sees what is declared inside the slot. Variables scoped to `:root` (or to
//! nothing) are global. The closest declaration of a name wins.

use crate::errors::MutationResult;
use crate::mutations::Mutation;
use crate::stores::Transaction;
use crate::tree::TreeIndex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};
use trellis_data::{
    collect_instance_expressions, walk_instance_expressions_mut, DataSource, DataSourceKind,
    ExpressionLocation, ExpressionVisitorMut, Instance, ProjectData, Store, VariableValue,
    ROOT_INSTANCE_ID,
};
use trellis_expression::{
    compute_expression, find_unset_names, find_used_data_source_ids,
    restore_expression_variables, unset_expression_variables, Value,
};

/// Instances whose variables are visible at one instance, nearest first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScopeChain {
    scopes: Vec<String>,
}

impl ScopeChain {
    pub fn new(data: &ProjectData, instance_id: &str) -> Self {
        let mut scopes = vec![instance_id.to_string()];
        let is_slot = |id: &str| data.instance(id).map_or(false, Instance::is_slot);

        if !is_slot(instance_id) {
            let index = TreeIndex::new(&data.instances);
            for ancestor in index.ancestors(instance_id) {
                let boundary = is_slot(&ancestor);
                scopes.push(ancestor);
                if boundary {
                    break;
                }
            }
        }

        Self { scopes }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// Distance of a data source's scope; globals come after every instance
    pub fn depth_of(&self, data_source: &DataSource) -> Option<usize> {
        match data_source.scope_instance_id.as_deref() {
            None | Some(ROOT_INSTANCE_ID) => Some(self.scopes.len()),
            Some(scope) => self.scopes.iter().position(|id| id == scope),
        }
    }

    /// Visible data sources ordered by distance, nearest first
    fn visible<'a>(&self, data: &'a ProjectData) -> Vec<&'a DataSource> {
        let mut visible: Vec<(usize, &DataSource)> = data
            .data_sources
            .values()
            .filter_map(|data_source| Some((self.depth_of(data_source)?, data_source)))
            .collect();
        visible.sort_by(|(a, left), (b, right)| a.cmp(b).then_with(|| left.id.cmp(&right.id)));
        visible.into_iter().map(|(_, data_source)| data_source).collect()
    }
}

/// Variables an expression at `instance_id` can reference, one per name
pub fn find_available_variables(data: &ProjectData, instance_id: &str) -> Vec<DataSource> {
    let mut names = HashSet::new();
    ScopeChain::new(data, instance_id)
        .visible(data)
        .into_iter()
        .filter(|data_source| names.insert(data_source.name.as_str()))
        .cloned()
        .collect()
}

/// Name to id of the declaration that wins at `instance_id`
///
/// This is the map plain names are rebound through.
pub fn find_masked_variables(data: &ProjectData, instance_id: &str) -> BTreeMap<String, String> {
    find_available_variables(data, instance_id)
        .into_iter()
        .map(|data_source| (data_source.name, data_source.id))
        .collect()
}

/// Declarations hidden at `instance_id` by a closer variable of the same name
pub fn find_shadowed_variables(data: &ProjectData, instance_id: &str) -> Vec<DataSource> {
    let mut names = HashSet::new();
    ScopeChain::new(data, instance_id)
        .visible(data)
        .into_iter()
        .filter(|data_source| !names.insert(data_source.name.as_str()))
        .cloned()
        .collect()
}

/// Subtree ids in pre-order without descending into slots
fn scope_subtree_ids(instances: &Store<Instance>, instance_id: &str) -> Vec<String> {
    let mut ids = Vec::new();
    let mut seen = HashSet::new();
    let mut stack = vec![instance_id.to_string()];

    while let Some(current) = stack.pop() {
        let Some(instance) = instances.get(&current) else {
            continue;
        };
        if !seen.insert(current.clone()) {
            continue;
        }
        let is_nested_slot = instance.is_slot() && current != instance_id;
        if !is_nested_slot {
            for child_id in instance.child_ids().collect::<Vec<_>>().into_iter().rev() {
                stack.push(child_id.to_string());
            }
        }
        ids.push(current);
    }

    ids
}

/// Plain names referenced in a subtree that no data source id backs
///
/// Action arguments are not counted. Slot content is skipped since it is
/// scoped on its own.
pub fn find_unset_variable_names(data: &ProjectData, instance_id: &str) -> Vec<String> {
    let mut names = Vec::new();
    for id in scope_subtree_ids(&data.instances, instance_id) {
        for expression in collect_instance_expressions(data, &id) {
            for name in find_unset_names(expression.code, expression.args) {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }
    }
    names
}

/// Detaches every id from its old variable, then binds names in the new scope
struct Rebinder<'a> {
    names_by_id: &'a HashMap<String, String>,
    ids_by_name: &'a HashMap<String, String>,
}

impl ExpressionVisitorMut for Rebinder<'_> {
    fn visit_expression_mut(
        &mut self,
        location: &ExpressionLocation,
        code: &mut String,
        args: &[String],
    ) {
        let unset = unset_expression_variables(code, self.names_by_id);
        let restored = restore_expression_variables(&unset, self.ids_by_name, args);
        if restored != *code {
            debug!(?location, from = %code, to = %restored, "Rebound expression");
            *code = restored;
        }
    }
}

/// Records of `instance_id` that differ between `before` and `after`, as mutations
fn changed_records(before: &ProjectData, after: &ProjectData, instance_id: &str) -> Vec<Mutation> {
    let mut mutations = Vec::new();

    if let (Some(old), Some(new)) = (before.instance(instance_id), after.instance(instance_id)) {
        if old.children != new.children {
            mutations.push(Mutation::SetInstanceChildren {
                instance_id: instance_id.to_string(),
                children: new.children.clone(),
            });
        }
    }

    if !Arc::ptr_eq(&before.props, &after.props) {
        mutations.extend(
            after
                .props_of(instance_id)
                .filter(|prop| before.props.get(&prop.id) != Some(*prop))
                .map(|prop| Mutation::SetProp { prop: prop.clone() }),
        );
    }

    if !Arc::ptr_eq(&before.data_sources, &after.data_sources) {
        mutations.extend(
            after
                .data_sources_of(instance_id)
                .filter(|data_source| before.data_sources.get(&data_source.id) != Some(*data_source))
                .map(|data_source| Mutation::PutDataSource {
                    data_source: data_source.clone(),
                }),
        );
    }

    if !Arc::ptr_eq(&before.resources, &after.resources) {
        mutations.extend(
            after
                .resources
                .values()
                .filter(|resource| before.resources.get(&resource.id) != Some(*resource))
                .map(|resource| Mutation::PutResource {
                    resource: resource.clone(),
                }),
        );
    }

    mutations
}

/// Rebind every expression in the subtree of `instance_id` to the variables
/// visible at its current position
///
/// Run after a subtree moved (insert, paste, reparent). References whose
/// name has no variable in the new scope are left as free names. Returns the
/// number of records rewritten.
pub fn rebind_tree_variables(tx: &mut Transaction<'_>, instance_id: &str) -> MutationResult<usize> {
    let names_by_id: HashMap<String, String> = tx
        .data()
        .data_sources
        .values()
        .map(|data_source| (data_source.id.clone(), data_source.name.clone()))
        .collect();

    let mut rewritten = 0;
    for id in scope_subtree_ids(&tx.data().instances, instance_id) {
        let ids_by_name: HashMap<String, String> =
            find_masked_variables(tx.data(), &id).into_iter().collect();

        let mut scratch = tx.data().clone();
        walk_instance_expressions_mut(
            &mut Rebinder {
                names_by_id: &names_by_id,
                ids_by_name: &ids_by_name,
            },
            &mut scratch,
            &id,
        );

        for mutation in changed_records(tx.data(), &scratch, &id) {
            tx.apply(mutation)?;
            rewritten += 1;
        }
    }

    Ok(rewritten)
}

pub fn variable_value(value: &VariableValue) -> Value {
    match value {
        VariableValue::String(value) => Value::String(value.clone()),
        VariableValue::Number(value) => Value::Number(*value),
        VariableValue::Boolean(value) => Value::Boolean(*value),
        VariableValue::Json(value) => Value::from(value.clone()),
        VariableValue::StringArray(values) => {
            Value::Array(values.iter().cloned().map(Value::String).collect())
        }
    }
}

/// Current value of every variable visible at `instance_id`, keyed by data source id
///
/// `resource_values` holds loaded resource data keyed by resource id;
/// parameters and unloaded resources are absent. Computed variables are
/// evaluated after the variables they use; a dependency cycle evaluates to
/// `undefined`.
pub fn compute_variable_values(
    data: &ProjectData,
    instance_id: &str,
    resource_values: &HashMap<String, Value>,
) -> HashMap<String, Value> {
    let mut values = HashMap::new();
    let mut computed: HashMap<String, String> = HashMap::new();

    for data_source in find_available_variables(data, instance_id) {
        match &data_source.kind {
            DataSourceKind::Variable { value } => {
                values.insert(data_source.id.clone(), variable_value(value));
            }
            DataSourceKind::Resource { resource_id } => {
                if let Some(value) = resource_values.get(resource_id) {
                    values.insert(data_source.id.clone(), value.clone());
                }
            }
            DataSourceKind::Expression { code } => {
                computed.insert(data_source.id.clone(), code.clone());
            }
            DataSourceKind::Parameter => {}
        }
    }

    fn resolve(
        id: &str,
        computed: &HashMap<String, String>,
        values: &mut HashMap<String, Value>,
        visiting: &mut HashSet<String>,
    ) -> bool {
        if values.contains_key(id) {
            return true;
        }
        let Some(code) = computed.get(id) else {
            return true;
        };
        if !visiting.insert(id.to_string()) {
            warn!(data_source_id = id, "Computed variable depends on itself");
            return false;
        }
        let acyclic = find_used_data_source_ids(code)
            .iter()
            .all(|dependency| resolve(dependency, computed, values, visiting));
        let value = if acyclic {
            compute_expression(code, values)
        } else {
            Value::Undefined
        };
        visiting.remove(id);
        values.insert(id.to_string(), value);
        acyclic
    }

    let mut ids: Vec<&String> = computed.keys().collect();
    ids.sort();
    for id in ids {
        resolve(id, &computed, &mut values, &mut HashSet::new());
    }

    values
}
