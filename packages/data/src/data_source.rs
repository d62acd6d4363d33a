use serde::{Deserialize, Serialize};

/// Named binding scoped to an instance (a "variable")
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub id: String,
    pub name: String,

    /// Instance whose subtree can see this variable
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope_instance_id: Option<String>,

    #[serde(flatten)]
    pub kind: DataSourceKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DataSourceKind {
    /// Literal value edited in the builder
    Variable { value: VariableValue },

    /// Value supplied by the enclosing component (collection item, route params)
    Parameter,

    /// Result of loading a resource
    Resource {
        #[serde(rename = "resourceId")]
        resource_id: String,
    },

    /// Computed from other variables
    Expression { code: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum VariableValue {
    #[serde(rename = "string")]
    String(String),
    #[serde(rename = "number")]
    Number(f64),
    #[serde(rename = "boolean")]
    Boolean(bool),
    #[serde(rename = "json")]
    Json(serde_json::Value),
    #[serde(rename = "string[]")]
    StringArray(Vec<String>),
}

/// Declarative HTTP request template; every string field except `name` is an expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub method: ResourceMethod,
    pub url: String,
    #[serde(default)]
    pub search_params: Vec<ResourceParam>,
    #[serde(default)]
    pub headers: Vec<ResourceParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceParam {
    pub name: String,
    /// Expression
    pub value: String,
}

impl DataSource {
    pub fn variable(
        id: impl Into<String>,
        name: impl Into<String>,
        scope_instance_id: impl Into<String>,
        value: VariableValue,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scope_instance_id: Some(scope_instance_id.into()),
            kind: DataSourceKind::Variable { value },
        }
    }

    pub fn resource(
        id: impl Into<String>,
        name: impl Into<String>,
        scope_instance_id: impl Into<String>,
        resource_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scope_instance_id: Some(scope_instance_id.into()),
            kind: DataSourceKind::Resource {
                resource_id: resource_id.into(),
            },
        }
    }

    pub fn is_scoped_to(&self, instance_id: &str) -> bool {
        self.scope_instance_id.as_deref() == Some(instance_id)
    }

    pub fn resource_id(&self) -> Option<&str> {
        match &self.kind {
            DataSourceKind::Resource { resource_id } => Some(resource_id),
            _ => None,
        }
    }
}

impl ResourceMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceMethod::Get => "GET",
            ResourceMethod::Post => "POST",
            ResourceMethod::Put => "PUT",
            ResourceMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for ResourceMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Resource {
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            method: ResourceMethod::Get,
            url: url.into(),
            search_params: Vec::new(),
            headers: Vec::new(),
            body: None,
        }
    }

    pub fn with_method(mut self, method: ResourceMethod) -> Self {
        self.method = method;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push(ResourceParam {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_search_param(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.search_params.push(ResourceParam {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = Some(body.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_variable_roundtrip_shape() {
        let data_source = DataSource::variable(
            "ds1",
            "Collection Item",
            "box",
            VariableValue::StringArray(vec!["a".into()]),
        );
        let json = serde_json::to_value(&data_source).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "ds1",
                "name": "Collection Item",
                "scopeInstanceId": "box",
                "type": "variable",
                "value": { "type": "string[]", "value": ["a"] }
            })
        );
    }

    #[test]
    fn test_resource_defaults() {
        let json = serde_json::json!({ "id": "r1", "name": "posts", "url": "\"https://api\"" });
        let resource: Resource = serde_json::from_value(json).unwrap();
        assert_eq!(resource.method, ResourceMethod::Get);
        assert!(resource.headers.is_empty());
        assert!(resource.body.is_none());
    }
}
