//! Loaders turn a batch of requests into values
//!
//! [`HttpResourceLoader`] is what a browser-side editor uses: the whole batch
//! goes to a loader endpoint in one call. [`DirectFetchLoader`] performs the
//! requests itself and is meant for server-side rendering and the CLI.

use crate::error::{ResourceError, ResourceResult};
use crate::request::ResourceRequest;
use async_trait::async_trait;
use futures::future::join_all;
use tracing::{debug, instrument};
use trellis_data::ResourceMethod;
use trellis_expression::Value;

/// Loads a batch of requests
///
/// The returned values line up with `requests`; a loader either resolves
/// the whole batch or fails it.
#[async_trait]
pub trait ResourceLoader: Send + Sync {
    async fn load(&self, requests: &[ResourceRequest]) -> ResourceResult<Vec<Value>>;
}

fn check_count(expected: usize, values: Vec<Value>) -> ResourceResult<Vec<Value>> {
    if values.len() != expected {
        return Err(ResourceError::ResultCount {
            expected,
            received: values.len(),
        });
    }
    Ok(values)
}

/// Posts the batch as a JSON array and expects an array of results back
pub struct HttpResourceLoader {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpResourceLoader {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), endpoint)
    }

    pub fn with_client(client: reqwest::Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl ResourceLoader for HttpResourceLoader {
    #[instrument(skip(self, requests), fields(endpoint = %self.endpoint, count = requests.len()))]
    async fn load(&self, requests: &[ResourceRequest]) -> ResourceResult<Vec<Value>> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(requests)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(ResourceError::Status {
                method: "POST".to_string(),
                url: self.endpoint.clone(),
                status: status.as_u16(),
            });
        }

        let body: Vec<serde_json::Value> = serde_json::from_slice(&response.bytes().await?)?;
        debug!(received = body.len(), "Loader responded");
        check_count(requests.len(), body.into_iter().map(Value::from).collect())
    }
}

/// Issues every request itself, concurrently
pub struct DirectFetchLoader {
    client: reqwest::Client,
}

impl Default for DirectFetchLoader {
    fn default() -> Self {
        Self::new(reqwest::Client::new())
    }
}

impl DirectFetchLoader {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, request: &ResourceRequest) -> ResourceResult<Value> {
        let method = match request.method {
            ResourceMethod::Get => reqwest::Method::GET,
            ResourceMethod::Post => reqwest::Method::POST,
            ResourceMethod::Put => reqwest::Method::PUT,
            ResourceMethod::Delete => reqwest::Method::DELETE,
        };
        let url = request.full_url()?;

        let mut builder = self.client.request(method, &url);
        for header in &request.headers {
            builder = builder.header(header.name.as_str(), header.value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(&body.to_json());
        }

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ResourceError::Status {
                method: request.method.as_str().to_string(),
                url,
                status: status.as_u16(),
            });
        }

        // Non-JSON responses resolve to their text
        let text = response.text().await?;
        Ok(match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(json) => Value::from(json),
            Err(_) => Value::String(text),
        })
    }
}

#[async_trait]
impl ResourceLoader for DirectFetchLoader {
    #[instrument(skip(self, requests), fields(count = requests.len()))]
    async fn load(&self, requests: &[ResourceRequest]) -> ResourceResult<Vec<Value>> {
        let results = join_all(requests.iter().map(|request| self.fetch(request))).await;
        let values = results.into_iter().collect::<ResourceResult<Vec<_>>>()?;
        check_count(requests.len(), values)
    }
}
