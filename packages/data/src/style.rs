use serde::{Deserialize, Serialize};

/// Indirection between instances and style declarations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum StyleSource {
    /// Owned by a single instance
    Local { id: String },
    /// Shared design token
    Token { id: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleSourceSelection {
    pub instance_id: String,
    /// Style source ids, in cascade order
    pub values: Vec<String>,
}

/// Single style declaration; the value is opaque to the core
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StyleDecl {
    pub style_source_id: String,
    pub breakpoint_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    pub property: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    pub id: String,
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_width: Option<u32>,
}

impl StyleSource {
    pub fn id(&self) -> &str {
        match self {
            StyleSource::Local { id } | StyleSource::Token { id, .. } => id,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self, StyleSource::Local { .. })
    }
}

impl StyleDecl {
    /// Store key: one declaration per source, breakpoint, state and property
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            self.style_source_id,
            self.breakpoint_id,
            self.property,
            self.state.as_deref().unwrap_or("")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_style_decl_key() {
        let decl = StyleDecl {
            style_source_id: "local1".into(),
            breakpoint_id: "base".into(),
            state: Some(":hover".into()),
            property: "color".into(),
            value: serde_json::json!({ "type": "keyword", "value": "red" }),
        };
        assert_eq!(decl.key(), "local1:base:color::hover");
    }
}
