//! # Fragments
//!
//! A self-contained slice of a project: a set of instance subtrees plus every
//! record that hangs off them. Fragments are what delete captures for undo,
//! what the clipboard carries, and what insert consumes.

use crate::post_effects::PostEffectEngine;
use crate::tree::collect_subtree_ids;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use trellis_data::{
    DataSource, Instance, InstanceChild, ProjectData, Prop, Resource, StyleDecl, StyleSource,
    StyleSourceSelection,
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fragment {
    /// Top-level instances, in insertion order
    #[serde(default)]
    pub children: Vec<InstanceChild>,
    #[serde(default)]
    pub instances: Vec<Instance>,
    #[serde(default)]
    pub props: Vec<Prop>,
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
    #[serde(default)]
    pub resources: Vec<Resource>,
    #[serde(default)]
    pub style_sources: Vec<StyleSource>,
    #[serde(default)]
    pub style_source_selections: Vec<StyleSourceSelection>,
    #[serde(default)]
    pub styles: Vec<StyleDecl>,
}

impl Fragment {
    pub fn root_ids(&self) -> Vec<String> {
        self.children
            .iter()
            .filter_map(InstanceChild::as_id)
            .map(str::to_string)
            .collect()
    }

    pub fn instance_ids(&self) -> HashSet<&str> {
        self.instances.iter().map(|instance| instance.id.as_str()).collect()
    }

    /// No records at all
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
            && self.instances.is_empty()
            && self.props.is_empty()
            && self.data_sources.is_empty()
            && self.resources.is_empty()
            && self.style_sources.is_empty()
            && self.style_source_selections.is_empty()
            && self.styles.is_empty()
    }

    /// Append records from `other`, skipping ids already present
    pub fn merge(&mut self, other: Fragment) {
        fn extend_unique<T>(target: &mut Vec<T>, items: Vec<T>, key: impl Fn(&T) -> String) {
            let mut seen: HashSet<String> = target.iter().map(&key).collect();
            for item in items {
                if seen.insert(key(&item)) {
                    target.push(item);
                }
            }
        }

        self.children.extend(other.children);
        extend_unique(&mut self.instances, other.instances, |i| i.id.clone());
        extend_unique(&mut self.props, other.props, |p| p.id.clone());
        extend_unique(&mut self.data_sources, other.data_sources, |d| d.id.clone());
        extend_unique(&mut self.resources, other.resources, |r| r.id.clone());
        extend_unique(&mut self.style_sources, other.style_sources, |s| {
            s.id().to_string()
        });
        extend_unique(
            &mut self.style_source_selections,
            other.style_source_selections,
            |s| s.instance_id.clone(),
        );
        extend_unique(&mut self.styles, other.styles, StyleDecl::key);
    }

    /// Write every record into `data`, replacing records with the same id
    pub fn put_into(&self, data: &mut ProjectData) {
        if !self.instances.is_empty() {
            let store = Arc::make_mut(&mut data.instances);
            for instance in &self.instances {
                store.insert(instance.id.clone(), instance.clone());
            }
        }
        if !self.props.is_empty() {
            let store = Arc::make_mut(&mut data.props);
            for prop in &self.props {
                store.insert(prop.id.clone(), prop.clone());
            }
        }
        if !self.data_sources.is_empty() {
            let store = Arc::make_mut(&mut data.data_sources);
            for data_source in &self.data_sources {
                store.insert(data_source.id.clone(), data_source.clone());
            }
        }
        if !self.resources.is_empty() {
            let store = Arc::make_mut(&mut data.resources);
            for resource in &self.resources {
                store.insert(resource.id.clone(), resource.clone());
            }
        }
        if !self.style_sources.is_empty() {
            let store = Arc::make_mut(&mut data.style_sources);
            for style_source in &self.style_sources {
                store.insert(style_source.id().to_string(), style_source.clone());
            }
        }
        if !self.style_source_selections.is_empty() {
            let store = Arc::make_mut(&mut data.style_source_selections);
            for selection in &self.style_source_selections {
                store.insert(selection.instance_id.clone(), selection.clone());
            }
        }
        if !self.styles.is_empty() {
            let store = Arc::make_mut(&mut data.styles);
            for decl in &self.styles {
                store.insert(decl.key(), decl.clone());
            }
        }
    }

    /// Remove every record of this fragment from `data`
    pub fn remove_from(&self, data: &mut ProjectData) {
        if !self.instances.is_empty() {
            let store = Arc::make_mut(&mut data.instances);
            for instance in &self.instances {
                store.remove(&instance.id);
            }
        }
        if !self.props.is_empty() {
            let store = Arc::make_mut(&mut data.props);
            for prop in &self.props {
                store.remove(&prop.id);
            }
        }
        if !self.data_sources.is_empty() {
            let store = Arc::make_mut(&mut data.data_sources);
            for data_source in &self.data_sources {
                store.remove(&data_source.id);
            }
        }
        if !self.resources.is_empty() {
            let store = Arc::make_mut(&mut data.resources);
            for resource in &self.resources {
                store.remove(&resource.id);
            }
        }
        if !self.style_sources.is_empty() {
            let store = Arc::make_mut(&mut data.style_sources);
            for style_source in &self.style_sources {
                store.remove(style_source.id());
            }
        }
        if !self.style_source_selections.is_empty() {
            let store = Arc::make_mut(&mut data.style_source_selections);
            for selection in &self.style_source_selections {
                store.remove(&selection.instance_id);
            }
        }
        if !self.styles.is_empty() {
            let store = Arc::make_mut(&mut data.styles);
            for decl in &self.styles {
                store.remove(&decl.key());
            }
        }
    }
}

/// Capture the subtrees under `root_ids` and everything they own
///
/// Dependent records are found by the post-effect cascade, so deleting a
/// fragment and extracting it always agree on what belongs to a subtree.
pub fn extract_fragment(data: &ProjectData, root_ids: &[&str]) -> Fragment {
    let mut fragment = Fragment::default();
    let mut subtree = Vec::new();

    for root_id in root_ids {
        if !data.instances.contains_key(*root_id) {
            continue;
        }
        fragment.children.push(InstanceChild::id(*root_id));
        subtree.extend(collect_subtree_ids(&data.instances, root_id));
    }

    fragment.instances = subtree
        .iter()
        .filter_map(|id| data.instances.get(id))
        .cloned()
        .collect();

    let ids: HashSet<String> = subtree.into_iter().collect();
    fragment.merge(PostEffectEngine::new().collect(data, &ids));
    fragment
}

/// Like [`extract_fragment`], plus the shared token sources the subtree uses
///
/// Tokens are not owned by the subtree and are left alone on delete, but a
/// copied fragment carries them so it can be pasted into another project.
pub fn extract_fragment_with_tokens(data: &ProjectData, root_ids: &[&str]) -> Fragment {
    let mut fragment = extract_fragment(data, root_ids);

    let token_ids: HashSet<&str> = fragment
        .style_source_selections
        .iter()
        .flat_map(|selection| selection.values.iter().map(String::as_str))
        .filter(|id| {
            data.style_sources
                .get(*id)
                .map_or(false, |source| !source.is_local())
        })
        .collect();

    let tokens = Fragment {
        style_sources: token_ids
            .iter()
            .filter_map(|id| data.style_sources.get(*id))
            .cloned()
            .collect(),
        styles: data
            .styles
            .values()
            .filter(|decl| token_ids.contains(decl.style_source_id.as_str()))
            .cloned()
            .collect(),
        ..Fragment::default()
    };
    fragment.merge(tokens);
    fragment
}

#[cfg(test)]
mod tests {
    use super::*;
    use trellis_data::PropValue;

    fn data() -> ProjectData {
        let mut data = ProjectData::new();
        let instances = Arc::make_mut(&mut data.instances);
        instances.insert(
            "body".into(),
            Instance::new("body", "Body").with_children(vec![InstanceChild::id("box")]),
        );
        instances.insert(
            "box".into(),
            Instance::new("box", "Box").with_children(vec![InstanceChild::id("text")]),
        );
        instances.insert("text".into(), Instance::new("text", "Text"));
        Arc::make_mut(&mut data.props).insert(
            "p1".into(),
            Prop::new("p1", "text", "title", PropValue::String("x".into())),
        );
        Arc::make_mut(&mut data.style_sources).insert(
            "token".into(),
            StyleSource::Token {
                id: "token".into(),
                name: "Primary".into(),
            },
        );
        Arc::make_mut(&mut data.style_source_selections).insert(
            "box".into(),
            StyleSourceSelection {
                instance_id: "box".into(),
                values: vec!["token".into()],
            },
        );
        data
    }

    #[test]
    fn test_extract_collects_subtree_and_dependents() {
        let fragment = extract_fragment(&data(), &["box"]);
        assert_eq!(fragment.root_ids(), vec!["box"]);
        assert_eq!(fragment.instances.len(), 2);
        assert_eq!(fragment.props.len(), 1);
        assert_eq!(fragment.style_source_selections.len(), 1);
        assert!(fragment.style_sources.is_empty());
    }

    #[test]
    fn test_extract_with_tokens() {
        let fragment = extract_fragment_with_tokens(&data(), &["box"]);
        assert_eq!(fragment.style_sources.len(), 1);
    }

    #[test]
    fn test_remove_then_put_restores() {
        let original = data();
        let fragment = extract_fragment(&original, &["box"]);
        let mut edited = original.clone();
        fragment.remove_from(&mut edited);
        assert!(edited.instance("text").is_none());
        assert!(edited.props.is_empty());

        fragment.put_into(&mut edited);
        assert_eq!(edited, original);
    }
}
