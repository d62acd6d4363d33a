use serde::{Deserialize, Serialize};

/// Named value attached to an instance
///
/// At most one prop per `(instance_id, name)` is live; setting a prop with an
/// existing pair replaces the value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prop {
    pub id: String,
    pub instance_id: String,
    pub name: String,
    #[serde(flatten)]
    pub value: PropValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PropValue {
    String(String),
    Number(f64),
    Boolean(bool),
    /// Asset id
    Asset(String),
    Expression(String),
    Action(Vec<ActionValue>),
    /// Resource id
    Resource(String),
}

/// Code run when an action prop fires
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionValue {
    Execute {
        /// Argument names the code may reference
        args: Vec<String>,
        code: String,
    },
}

impl Prop {
    pub fn new(
        id: impl Into<String>,
        instance_id: impl Into<String>,
        name: impl Into<String>,
        value: PropValue,
    ) -> Self {
        Self {
            id: id.into(),
            instance_id: instance_id.into(),
            name: name.into(),
            value,
        }
    }
}

impl PropValue {
    pub fn resource_id(&self) -> Option<&str> {
        match self {
            PropValue::Resource(id) => Some(id),
            _ => None,
        }
    }
}
