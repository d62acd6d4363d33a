//! # Trellis Resources
//!
//! Computes the HTTP requests described by project resources and keeps a
//! deduplicated cache of their results.
//!
//! ```text
//! Resource template ──compute_resource_request──▶ ResourceRequest
//!                                                      │ get_resource_key
//!                                                      ▼
//!            preload ──▶ queued ──flush──▶ pending ──loader──▶ cached
//! ```
//!
//! ```rust,ignore
//! let engine = ResourceEngine::new(Arc::new(HttpResourceLoader::new(url)));
//! for request in collect_page_requests(&data, &page.root_instance_id, &values) {
//!     engine.preload_resource(request);
//! }
//! let mut updates = engine.subscribe();
//! updates.changed().await?;
//! ```

pub mod engine;
pub mod error;
pub mod loader;
pub mod request;

pub use engine::{
    CacheSnapshot, ResourceEngine, ResourceEngineConfig, FLUSH_DELAY, MAX_PENDING_RESOURCES,
};
pub use error::{ResourceError, ResourceResult};
pub use loader::{DirectFetchLoader, HttpResourceLoader, ResourceLoader};
pub use request::{
    collect_page_requests, compute_resource_request, get_resource_key, RequestParam,
    ResourceRequest,
};
