//! Deep copies of instance subtrees with fresh ids

use crate::fragment::{extract_fragment, Fragment};
use crate::stores::id_in_use;
use std::collections::{HashMap, HashSet};
use tracing::debug;
use trellis_data::{
    ActionValue, DataSourceKind, IdGenerator, InstanceChild, ProjectData, PropValue, Resource,
    StyleSource,
};
use trellis_expression::{decode_data_variable_id, encode_data_variable_id, transpile_expression};

/// Old id to new id for every record a clone renamed
pub type IdMap = HashMap<String, String>;

/// Point data source references in `code` at their cloned counterparts
///
/// References to variables outside the cloned set are kept.
fn remap_expression(code: &str, ids: &IdMap) -> String {
    let remapped = transpile_expression(code, |identifier| {
        let id = decode_data_variable_id(&identifier.name)?;
        ids.get(&id).map(|new_id| encode_data_variable_id(new_id))
    });
    remapped.unwrap_or_else(|err| {
        debug!(error = %err, "Copying unparseable expression as is");
        code.to_string()
    })
}

fn remap_id(id: &str, ids: &IdMap) -> String {
    ids.get(id).cloned().unwrap_or_else(|| id.to_string())
}

/// Rewrite every expression a fragment carries
pub(crate) fn rewrite_fragment_expressions(fragment: &mut Fragment, rewrite: impl Fn(&str) -> String) {
    let children = fragment
        .children
        .iter_mut()
        .chain(fragment.instances.iter_mut().flat_map(|i| i.children.iter_mut()));
    for child in children {
        if let InstanceChild::Expression(code) = child {
            *code = rewrite(code);
        }
    }

    for prop in &mut fragment.props {
        match &mut prop.value {
            PropValue::Expression(code) => *code = rewrite(code),
            PropValue::Action(actions) => {
                for action in actions.iter_mut() {
                    let ActionValue::Execute { code, .. } = action;
                    *code = rewrite(code);
                }
            }
            PropValue::String(_)
            | PropValue::Number(_)
            | PropValue::Boolean(_)
            | PropValue::Asset(_)
            | PropValue::Resource(_) => {}
        }
    }

    for data_source in &mut fragment.data_sources {
        if let DataSourceKind::Expression { code } = &mut data_source.kind {
            *code = rewrite(code);
        }
    }

    for resource in &mut fragment.resources {
        resource.url = rewrite(&resource.url);
        for param in resource.search_params.iter_mut().chain(resource.headers.iter_mut()) {
            param.value = rewrite(&param.value);
        }
        if let Some(body) = &mut resource.body {
            *body = rewrite(body);
        }
    }
}

/// Copy a fragment, giving every owned record a new id
///
/// Ids are never reused from the source fragment and never collide with
/// anything `exists` reports. Shared tokens keep their ids.
pub fn clone_fragment(
    fragment: &Fragment,
    generator: &mut IdGenerator,
    exists: impl Fn(&str) -> bool,
) -> (Fragment, IdMap) {
    let owned_ids = fragment
        .instances
        .iter()
        .map(|instance| instance.id.clone())
        .chain(fragment.props.iter().map(|prop| prop.id.clone()))
        .chain(fragment.data_sources.iter().map(|ds| ds.id.clone()))
        .chain(fragment.resources.iter().map(|resource| resource.id.clone()))
        .chain(
            fragment
                .style_sources
                .iter()
                .filter(|source| source.is_local())
                .map(|source| source.id().to_string()),
        );

    let mut taken: HashSet<String> = owned_ids.clone().collect();
    let mut ids = IdMap::new();
    for old_id in owned_ids {
        let new_id = generator.new_unique_id(|candidate| exists(candidate) || taken.contains(candidate));
        taken.insert(new_id.clone());
        ids.insert(old_id, new_id);
    }

    let remap_children = |children: &[InstanceChild]| -> Vec<InstanceChild> {
        children
            .iter()
            .map(|child| match child {
                InstanceChild::Id(id) => InstanceChild::Id(remap_id(id, &ids)),
                other => other.clone(),
            })
            .collect()
    };

    let mut clone = Fragment {
        children: remap_children(&fragment.children),
        ..Fragment::default()
    };

    for instance in &fragment.instances {
        let mut instance = instance.clone();
        instance.id = remap_id(&instance.id, &ids);
        instance.children = remap_children(&instance.children);
        clone.instances.push(instance);
    }

    for prop in &fragment.props {
        let mut prop = prop.clone();
        prop.id = remap_id(&prop.id, &ids);
        prop.instance_id = remap_id(&prop.instance_id, &ids);
        if let PropValue::Resource(resource_id) = &mut prop.value {
            *resource_id = remap_id(resource_id, &ids);
        }
        clone.props.push(prop);
    }

    for data_source in &fragment.data_sources {
        let mut data_source = data_source.clone();
        data_source.id = remap_id(&data_source.id, &ids);
        data_source.scope_instance_id = data_source
            .scope_instance_id
            .as_deref()
            .map(|scope| remap_id(scope, &ids));
        if let DataSourceKind::Resource { resource_id } = &mut data_source.kind {
            *resource_id = remap_id(resource_id, &ids);
        }
        clone.data_sources.push(data_source);
    }

    clone.resources = fragment
        .resources
        .iter()
        .map(|resource| Resource {
            id: remap_id(&resource.id, &ids),
            ..resource.clone()
        })
        .collect();

    clone.style_sources = fragment
        .style_sources
        .iter()
        .map(|source| match source {
            StyleSource::Local { id } => StyleSource::Local {
                id: remap_id(id, &ids),
            },
            token => token.clone(),
        })
        .collect();

    for selection in &fragment.style_source_selections {
        let mut selection = selection.clone();
        selection.instance_id = remap_id(&selection.instance_id, &ids);
        selection.values = selection.values.iter().map(|id| remap_id(id, &ids)).collect();
        clone.style_source_selections.push(selection);
    }

    for decl in &fragment.styles {
        let mut decl = decl.clone();
        decl.style_source_id = remap_id(&decl.style_source_id, &ids);
        clone.styles.push(decl);
    }

    rewrite_fragment_expressions(&mut clone, |code| remap_expression(code, &ids));
    (clone, ids)
}

/// Copy the subtree of `instance_id` with fresh ids, ready to insert into `data`
pub fn clone_instance(
    data: &ProjectData,
    instance_id: &str,
    generator: &mut IdGenerator,
) -> Option<(Fragment, IdMap)> {
    data.instances.get(instance_id)?;
    let fragment = extract_fragment(data, &[instance_id]);
    Some(clone_fragment(&fragment, generator, |id| id_in_use(data, id)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use trellis_data::{
        DataSource, Instance, Prop, StyleDecl, StyleSourceSelection, VariableValue,
    };

    fn data() -> ProjectData {
        let mut data = ProjectData::new();
        let instances = Arc::make_mut(&mut data.instances);
        instances.insert(
            "body".into(),
            Instance::new("body", "Body").with_children(vec![InstanceChild::id("card")]),
        );
        instances.insert(
            "card".into(),
            Instance::new("card", "Box").with_children(vec![InstanceChild::id("title")]),
        );
        instances.insert(
            "title".into(),
            Instance::new("title", "Text").with_children(vec![InstanceChild::expression(
                "$ws$dataSource$count + $ws$dataSource$global",
            )]),
        );
        Arc::make_mut(&mut data.data_sources).insert(
            "count".into(),
            DataSource::variable("count", "count", "card", VariableValue::Number(1.0)),
        );
        Arc::make_mut(&mut data.data_sources).insert(
            "global".into(),
            DataSource::variable("global", "global", ":root", VariableValue::Number(1.0)),
        );
        Arc::make_mut(&mut data.props).insert(
            "p1".into(),
            Prop::new("p1", "title", "label", PropValue::Expression("$ws$dataSource$count".into())),
        );
        Arc::make_mut(&mut data.style_sources)
            .insert("local".into(), StyleSource::Local { id: "local".into() });
        Arc::make_mut(&mut data.style_source_selections).insert(
            "card".into(),
            StyleSourceSelection {
                instance_id: "card".into(),
                values: vec!["local".into()],
            },
        );
        let decl = StyleDecl {
            style_source_id: "local".into(),
            breakpoint_id: "base".into(),
            state: None,
            property: "color".into(),
            value: serde_json::json!("red"),
        };
        Arc::make_mut(&mut data.styles).insert(decl.key(), decl);
        data
    }

    #[test]
    fn test_clone_ids_are_disjoint_from_source() {
        let data = data();
        let mut generator = IdGenerator::from_seed("c".into());
        let (clone, ids) = clone_instance(&data, "card", &mut generator).unwrap();

        for instance in &clone.instances {
            assert!(!data.instances.contains_key(&instance.id));
        }
        for prop in &clone.props {
            assert!(!data.props.contains_key(&prop.id));
            assert_eq!(prop.instance_id, ids["title"]);
        }
        assert_eq!(clone.root_ids(), vec![ids["card"].clone()]);
        assert_eq!(clone.data_sources[0].scope_instance_id.as_deref(), Some(ids["card"].as_str()));
    }

    #[test]
    fn test_clone_rewrites_internal_references_only() {
        let data = data();
        let mut generator = IdGenerator::from_seed("c".into());
        let (clone, ids) = clone_instance(&data, "card", &mut generator).unwrap();

        let title = clone
            .instances
            .iter()
            .find(|instance| instance.id == ids["title"])
            .unwrap();
        assert_eq!(
            title.children,
            vec![InstanceChild::expression(format!(
                "{} + $ws$dataSource$global",
                encode_data_variable_id(&ids["count"])
            ))]
        );
    }

    #[test]
    fn test_clone_keeps_style_structure() {
        let data = data();
        let mut generator = IdGenerator::from_seed("c".into());
        let (clone, ids) = clone_instance(&data, "card", &mut generator).unwrap();

        let new_local = &ids["local"];
        assert_eq!(clone.style_sources, vec![StyleSource::Local { id: new_local.clone() }]);
        assert_eq!(clone.style_source_selections[0].instance_id, ids["card"]);
        assert_eq!(clone.style_source_selections[0].values, vec![new_local.clone()]);
        assert_eq!(&clone.styles[0].style_source_id, new_local);
    }

    #[test]
    fn test_generator_collisions_are_skipped() {
        let data = data();
        // The seed produces "c-1" first; make it taken
        let mut generator = IdGenerator::from_seed("c".into());
        let fragment = extract_fragment(&data, &["title"]);
        let (clone, _) = clone_fragment(&fragment, &mut generator, |id| id == "c-1");
        assert!(clone.instances.iter().all(|instance| instance.id != "c-1"));
    }
}
