//! Object-storage listing seam.

use async_trait::async_trait;

use crate::retry::CallError;

/// One listed object.
#[derive(Debug, Clone)]
pub struct ObjectEntry {
    pub path: String,
}

impl ObjectEntry {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

/// Lists objects under a prefix, in the service's listing order.
#[async_trait]
pub trait ObjectLister: Send + Sync {
    /// List entries whose path starts with `prefix`. Failures are
    /// transient from the caller's perspective.
    async fn list(&self, prefix: &str) -> Result<Vec<ObjectEntry>, CallError>;
}
