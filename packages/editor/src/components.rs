//! Component metadata the tree operations depend on

use std::collections::HashMap;
use trellis_data::{BODY_COMPONENT, ELEMENT_COMPONENT, FRAGMENT_COMPONENT, SLOT_COMPONENT};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ComponentMeta {
    /// Instances of this component may hold instance children
    pub accepts_children: bool,
}

impl ComponentMeta {
    pub const CONTAINER: ComponentMeta = ComponentMeta {
        accepts_children: true,
    };
    pub const LEAF: ComponentMeta = ComponentMeta {
        accepts_children: false,
    };
}

/// Known components; anything unregistered is treated as a leaf
#[derive(Debug, Clone)]
pub struct ComponentRegistry {
    metas: HashMap<String, ComponentMeta>,
}

impl ComponentRegistry {
    pub fn empty() -> Self {
        Self {
            metas: HashMap::new(),
        }
    }

    pub fn register(&mut self, component: impl Into<String>, meta: ComponentMeta) {
        self.metas.insert(component.into(), meta);
    }

    pub fn with(mut self, component: impl Into<String>, meta: ComponentMeta) -> Self {
        self.register(component, meta);
        self
    }

    pub fn meta(&self, component: &str) -> ComponentMeta {
        self.metas.get(component).copied().unwrap_or_default()
    }

    pub fn accepts_children(&self, component: &str) -> bool {
        self.meta(component).accepts_children
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        let containers = [
            BODY_COMPONENT,
            SLOT_COMPONENT,
            FRAGMENT_COMPONENT,
            ELEMENT_COMPONENT,
            "Box",
            "Form",
            "List",
            "ListItem",
            "Link",
            "Collection",
        ];
        let leaves = ["Text", "Heading", "Paragraph", "Image", "Input", "Button"];

        let mut registry = Self::empty();
        for component in containers {
            registry.register(component, ComponentMeta::CONTAINER);
        }
        for component in leaves {
            registry.register(component, ComponentMeta::LEAF);
        }
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let registry = ComponentRegistry::default();
        assert!(registry.accepts_children("Box"));
        assert!(registry.accepts_children(BODY_COMPONENT));
        assert!(!registry.accepts_children("Image"));
        assert!(!registry.accepts_children("Unknown"));
    }

    #[test]
    fn test_register_overrides() {
        let registry = ComponentRegistry::default().with("Image", ComponentMeta::CONTAINER);
        assert!(registry.accepts_children("Image"));
    }
}
