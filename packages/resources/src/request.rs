//! Turning resource templates into concrete requests

use crate::error::{ResourceError, ResourceResult};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, warn};
use trellis_data::{
    DataSourceKind, ProjectData, Resource, ResourceMethod, ROOT_INSTANCE_ID,
};
use trellis_editor::{collect_subtree_ids, compute_variable_values};
use trellis_expression::{compute_expression, Value};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestParam {
    pub name: String,
    pub value: String,
}

/// A resource with every expression field evaluated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequest {
    /// Resource the request was computed from; not part of the key
    pub id: String,
    pub name: String,
    pub method: ResourceMethod,
    pub url: String,
    #[serde(default)]
    pub search_params: Vec<RequestParam>,
    #[serde(default)]
    pub headers: Vec<RequestParam>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl ResourceRequest {
    /// Url with search params appended, as a browser would send it
    pub fn full_url(&self) -> ResourceResult<String> {
        if self.search_params.is_empty() {
            return Ok(self.url.clone());
        }
        let mut url = reqwest::Url::parse(&self.url)
            .map_err(|e| ResourceError::InvalidRequest(format!("{}: {}", self.url, e)))?;
        {
            let mut query = url.query_pairs_mut();
            for param in &self.search_params {
                query.append_pair(&param.name, &param.value);
            }
        }
        Ok(url.to_string())
    }
}

fn compute_param(value: &str, values: &HashMap<String, Value>) -> String {
    compute_expression(value, values).to_display_string()
}

/// Evaluate a resource template against the variable values visible to it
pub fn compute_resource_request(
    resource: &Resource,
    values: &HashMap<String, Value>,
) -> ResourceRequest {
    let params = |params: &[trellis_data::ResourceParam]| {
        params
            .iter()
            .map(|param| RequestParam {
                name: param.name.clone(),
                value: compute_param(&param.value, values),
            })
            .collect()
    };

    ResourceRequest {
        id: resource.id.clone(),
        name: resource.name.clone(),
        method: resource.method,
        url: compute_param(&resource.url, values),
        search_params: params(&resource.search_params),
        headers: params(&resource.headers),
        body: resource
            .body
            .as_deref()
            .map(|code| compute_expression(code, values)),
    }
}

fn key_input(request: &ResourceRequest) -> ResourceResult<serde_json::Value> {
    let params = |params: &[RequestParam]| -> serde_json::Value {
        params
            .iter()
            .map(|param| serde_json::json!([param.name, param.value]))
            .collect()
    };
    let body = match &request.body {
        Some(body) => body
            .try_to_json()
            .map_err(|e| ResourceError::InvalidRequest(e.to_string()))?,
        None => serde_json::Value::Null,
    };

    Ok(serde_json::json!([
        request.name,
        request.method.as_str(),
        request.url,
        params(&request.search_params),
        params(&request.headers),
        body,
    ]))
}

/// Stable cache key of a request
///
/// Requests that cannot be hashed all share the empty key.
pub fn get_resource_key(request: &ResourceRequest) -> String {
    let input = match key_input(request).and_then(|input| Ok(serde_json::to_vec(&input)?)) {
        Ok(input) => input,
        Err(error) => {
            warn!(resource = %request.name, %error, "Unable to compute resource key");
            return String::new();
        }
    };

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&input);
    format!("{:08x}", hasher.finalize())
}

/// Requests for every resource a page loads
///
/// Covers resource data sources scoped inside the page tree (or globally)
/// and props that reference a resource directly. Each request is computed
/// with the variables visible where it is declared.
pub fn collect_page_requests(
    data: &ProjectData,
    root_id: &str,
    resource_values: &HashMap<String, Value>,
) -> Vec<ResourceRequest> {
    let subtree: HashSet<String> = collect_subtree_ids(&data.instances, root_id)
        .into_iter()
        .collect();

    let mut owners: Vec<(&str, &str)> = Vec::new();
    for data_source in data.data_sources.values() {
        let DataSourceKind::Resource { resource_id } = &data_source.kind else {
            continue;
        };
        let owner = match data_source.scope_instance_id.as_deref() {
            Some(ROOT_INSTANCE_ID) | None => root_id,
            Some(scope) if subtree.contains(scope) => scope,
            Some(_) => continue,
        };
        owners.push((resource_id.as_str(), owner));
    }
    for prop in data.props.values() {
        if let Some(resource_id) = prop.value.resource_id() {
            if subtree.contains(&prop.instance_id) {
                owners.push((resource_id, prop.instance_id.as_str()));
            }
        }
    }

    let mut seen = HashSet::new();
    let mut requests = Vec::new();
    for (resource_id, owner) in owners {
        if !seen.insert(resource_id) {
            continue;
        }
        let Some(resource) = data.resources.get(resource_id) else {
            debug!(resource_id, "Skipping missing resource");
            continue;
        };
        let values = compute_variable_values(data, owner, resource_values);
        requests.push(compute_resource_request(resource, &values));
    }
    requests
}
