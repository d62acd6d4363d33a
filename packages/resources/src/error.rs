use thiserror::Error;

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{method} {url} returned status {status}")]
    Status {
        method: String,
        url: String,
        status: u16,
    },

    #[error("Invalid loader response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Loader returned {received} results for {expected} requests")]
    ResultCount { expected: usize, received: usize },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

pub type ResourceResult<T> = Result<T, ResourceError>;
