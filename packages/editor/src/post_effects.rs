//! # Post-Effect System
//!
//! Removing an instance subtree has to take the records that hang off it
//! along: props, style selections, local style sources and their
//! declarations, scoped data sources and the resources those records point
//! to. Each cascade is one [`PostEffect`]; the engine runs all of them and
//! gathers their output into a [`Fragment`].
//!
//! Effects only read the project and the removed ids, never each other's
//! output, so registration order does not matter.

use crate::fragment::Fragment;
use std::collections::HashSet;
use trellis_data::ProjectData;

/// Cascade triggered by removing a set of instances
pub trait PostEffect: std::fmt::Debug + Send + Sync {
    /// Records owned by the instances in `subtree`
    fn collect(&self, data: &ProjectData, subtree: &HashSet<String>) -> Fragment;
}

/// Props whose instance is removed
#[derive(Debug)]
pub struct CascadeProps;

impl PostEffect for CascadeProps {
    fn collect(&self, data: &ProjectData, subtree: &HashSet<String>) -> Fragment {
        Fragment {
            props: data
                .props
                .values()
                .filter(|prop| subtree.contains(&prop.instance_id))
                .cloned()
                .collect(),
            ..Fragment::default()
        }
    }
}

/// Style selections of removed instances, with the local sources they own
///
/// Token sources are shared and stay.
#[derive(Debug)]
pub struct CascadeStyles;

impl PostEffect for CascadeStyles {
    fn collect(&self, data: &ProjectData, subtree: &HashSet<String>) -> Fragment {
        let selections: Vec<_> = data
            .style_source_selections
            .values()
            .filter(|selection| subtree.contains(&selection.instance_id))
            .cloned()
            .collect();

        let local_ids: HashSet<&str> = selections
            .iter()
            .flat_map(|selection| selection.values.iter().map(String::as_str))
            .filter(|id| {
                data.style_sources
                    .get(*id)
                    .map_or(false, |source| source.is_local())
            })
            .collect();

        Fragment {
            style_sources: local_ids
                .iter()
                .filter_map(|id| data.style_sources.get(*id))
                .cloned()
                .collect(),
            styles: data
                .styles
                .values()
                .filter(|decl| local_ids.contains(decl.style_source_id.as_str()))
                .cloned()
                .collect(),
            style_source_selections: selections,
            ..Fragment::default()
        }
    }
}

/// Data sources scoped to a removed instance
#[derive(Debug)]
pub struct CascadeDataSources;

impl PostEffect for CascadeDataSources {
    fn collect(&self, data: &ProjectData, subtree: &HashSet<String>) -> Fragment {
        Fragment {
            data_sources: data
                .data_sources
                .values()
                .filter(|data_source| {
                    data_source
                        .scope_instance_id
                        .as_ref()
                        .map_or(false, |scope| subtree.contains(scope))
                })
                .cloned()
                .collect(),
            ..Fragment::default()
        }
    }
}

/// Resources referenced by removed resource props and resource data sources
#[derive(Debug)]
pub struct CascadeResources;

impl PostEffect for CascadeResources {
    fn collect(&self, data: &ProjectData, subtree: &HashSet<String>) -> Fragment {
        let from_props = data
            .props
            .values()
            .filter(|prop| subtree.contains(&prop.instance_id))
            .filter_map(|prop| prop.value.resource_id());
        let from_data_sources = data
            .data_sources
            .values()
            .filter(|data_source| {
                data_source
                    .scope_instance_id
                    .as_ref()
                    .map_or(false, |scope| subtree.contains(scope))
            })
            .filter_map(|data_source| data_source.resource_id());

        let mut seen = HashSet::new();
        let resources = from_props
            .chain(from_data_sources)
            .filter(|id| seen.insert(*id))
            .filter_map(|id| data.resources.get(id))
            .cloned()
            .collect();

        Fragment {
            resources,
            ..Fragment::default()
        }
    }
}

/// Post-effect engine that runs all registered cascades
#[derive(Debug)]
pub struct PostEffectEngine {
    effects: Vec<Box<dyn PostEffect>>,
}

impl PostEffectEngine {
    /// Create engine with default effects
    pub fn new() -> Self {
        Self {
            effects: vec![
                Box::new(CascadeProps),
                Box::new(CascadeStyles),
                Box::new(CascadeDataSources),
                Box::new(CascadeResources),
            ],
        }
    }

    /// Everything the instances in `subtree` own, excluding the instances themselves
    pub fn collect(&self, data: &ProjectData, subtree: &HashSet<String>) -> Fragment {
        let mut dependents = Fragment::default();
        for effect in &self.effects {
            dependents.merge(effect.collect(data, subtree));
        }
        dependents
    }
}

impl Default for PostEffectEngine {
    fn default() -> Self {
        Self::new()
    }
}
