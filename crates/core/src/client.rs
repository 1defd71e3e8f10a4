use crate::{ClientError, Resource};

/// Backing-store primitives the composer needs. Passed explicitly to every
/// composition; implementations own their own retry policy.
#[async_trait::async_trait]
pub trait ResourceClient: Send + Sync {
    /// List resources of `kind` in `namespace`, optionally filtered by a label selector.
    async fn list(&self, kind: &str, namespace: &str, label_selector: Option<&str>) -> Result<Vec<Resource>, ClientError>;

    /// Fetch one resource by name.
    async fn get(&self, kind: &str, namespace: &str, name: &str) -> Result<Resource, ClientError>;
}
