use serde::{Deserialize, Serialize};

/// Scope id for variables visible on every page.
pub const ROOT_INSTANCE_ID: &str = ":root";

pub const BODY_COMPONENT: &str = "Body";
pub const SLOT_COMPONENT: &str = "Slot";
pub const FRAGMENT_COMPONENT: &str = "Fragment";
/// Generic element rendered with its `tag`.
pub const ELEMENT_COMPONENT: &str = "Element";

/// Node of the component tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Instance {
    pub id: String,

    /// Renderable kind
    pub component: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,

    /// HTML tag for generic element instances
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,

    #[serde(default)]
    pub children: Vec<InstanceChild>,
}

/// Ordered child of an instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum InstanceChild {
    /// Reference to another instance
    Id(String),
    Text(String),
    Expression(String),
}

impl Instance {
    pub fn new(id: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            component: component.into(),
            label: None,
            tag: None,
            children: Vec::new(),
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_children(mut self, children: Vec<InstanceChild>) -> Self {
        self.children = children;
        self
    }

    /// Ids of instance children, in order
    pub fn child_ids(&self) -> impl Iterator<Item = &str> + '_ {
        self.children.iter().filter_map(InstanceChild::as_id)
    }

    /// Position of an instance child within `children`
    pub fn child_position(&self, child_id: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|child| child.as_id() == Some(child_id))
    }

    pub fn is_slot(&self) -> bool {
        self.component == SLOT_COMPONENT
    }
}

impl InstanceChild {
    pub fn id(value: impl Into<String>) -> Self {
        InstanceChild::Id(value.into())
    }

    pub fn text(value: impl Into<String>) -> Self {
        InstanceChild::Text(value.into())
    }

    pub fn expression(value: impl Into<String>) -> Self {
        InstanceChild::Expression(value.into())
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            InstanceChild::Id(id) => Some(id),
            InstanceChild::Text(_) | InstanceChild::Expression(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_serialization_is_tagged() {
        let child = InstanceChild::expression("$ws$dataSource$a");
        let json = serde_json::to_string(&child).unwrap();
        assert_eq!(json, r#"{"type":"expression","value":"$ws$dataSource$a"}"#);
    }

    #[test]
    fn test_child_ids_skip_text() {
        let instance = Instance::new("box", "Box").with_children(vec![
            InstanceChild::text("hello"),
            InstanceChild::id("child1"),
            InstanceChild::expression("1 + 1"),
            InstanceChild::id("child2"),
        ]);

        let ids: Vec<_> = instance.child_ids().collect();
        assert_eq!(ids, vec!["child1", "child2"]);
        assert_eq!(instance.child_position("child2"), Some(3));
        assert_eq!(instance.child_position("missing"), None);
    }
}
