//! Shared fixtures for the editor test suites

#![allow(dead_code)]

use std::sync::Arc;
use trellis_data::{
    DataSource, Instance, InstanceChild, Page, ProjectData, Prop, PropValue, StyleDecl,
    StyleSource, StyleSourceSelection, VariableValue,
};

/// Builds project data one instance at a time
#[derive(Default)]
pub struct ProjectBuilder {
    data: ProjectData,
}

impl ProjectBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance with a prop `<id>-prop` and a local style `<id>-style`
    pub fn instance(mut self, id: &str, component: &str, children: &[&str]) -> Self {
        let instance = Instance::new(id, component).with_children(
            children.iter().map(|child| InstanceChild::id(*child)).collect(),
        );
        Arc::make_mut(&mut self.data.instances).insert(id.into(), instance);

        let prop_id = format!("{id}-prop");
        Arc::make_mut(&mut self.data.props).insert(
            prop_id.clone(),
            Prop::new(prop_id, id, "title", PropValue::String(id.into())),
        );

        let style_id = format!("{id}-style");
        Arc::make_mut(&mut self.data.style_sources).insert(
            style_id.clone(),
            StyleSource::Local {
                id: style_id.clone(),
            },
        );
        Arc::make_mut(&mut self.data.style_source_selections).insert(
            id.into(),
            StyleSourceSelection {
                instance_id: id.into(),
                values: vec![style_id.clone()],
            },
        );
        let decl = StyleDecl {
            style_source_id: style_id,
            breakpoint_id: "base".into(),
            state: None,
            property: "color".into(),
            value: serde_json::json!("red"),
        };
        Arc::make_mut(&mut self.data.styles).insert(decl.key(), decl);
        self
    }

    pub fn prop(mut self, instance_id: &str, name: &str, value: PropValue) -> Self {
        let id = format!("{instance_id}-{name}");
        Arc::make_mut(&mut self.data.props).insert(id.clone(), Prop::new(id, instance_id, name, value));
        self
    }

    pub fn variable(mut self, id: &str, name: &str, scope: &str, value: VariableValue) -> Self {
        Arc::make_mut(&mut self.data.data_sources)
            .insert(id.into(), DataSource::variable(id, name, scope, value));
        self
    }

    pub fn page(mut self, id: &str, path: &str, root: &str) -> Self {
        Arc::make_mut(&mut self.data.pages).insert(id.into(), Page::new(id, id, path, root));
        self
    }

    pub fn build(self) -> ProjectData {
        self.data
    }
}

/// `root → [box1, box2 → [box3 → [child1, child2 → [descendant], child3]], box4]`
pub fn nested_boxes() -> ProjectData {
    ProjectBuilder::new()
        .instance("root", "Body", &["box1", "box2", "box4"])
        .instance("box1", "Box", &[])
        .instance("box2", "Box", &["box3"])
        .instance("box3", "Box", &["child1", "child2", "child3"])
        .instance("child1", "Box", &[])
        .instance("child2", "Box", &["descendant"])
        .instance("descendant", "Box", &[])
        .instance("child3", "Box", &[])
        .instance("box4", "Box", &[])
        .page("home", "/", "root")
        .build()
}

pub fn child_ids(data: &ProjectData, id: &str) -> Vec<String> {
    data.instance(id)
        .map(|instance| instance.child_ids().map(str::to_string).collect())
        .unwrap_or_default()
}
