//! Content providers: where unmodified blob bytes come from.

use async_trait::async_trait;
use std::sync::Arc;

use repofs_types::ContentError;

/// Source of raw blob content for the remote tree.
///
/// Paths are repository-relative manifest paths (`foo/bar.js`), never mount
/// paths. Each call is expected to hit the remote; caching happens in the
/// content tree, not here.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, ContentError>;
}

#[async_trait]
impl<P: ContentProvider + ?Sized> ContentProvider for Arc<P> {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        (**self).get_content(path).await
    }
}

/// Decorator that substitutes empty content for a provider NotFound.
///
/// Manifests can list entries the content API refuses to serve (submodule
/// pointers, LFS objects). Other failures pass through untouched.
#[derive(Debug, Clone)]
pub struct EmptyOnNotFound<P> {
    inner: P,
}

impl<P> EmptyOnNotFound<P> {
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[async_trait]
impl<P: ContentProvider> ContentProvider for EmptyOnNotFound<P> {
    async fn get_content(&self, path: &str) -> Result<Vec<u8>, ContentError> {
        match self.inner.get_content(path).await {
            Err(ContentError::NotFound(_)) => {
                tracing::debug!(path, "content not found, using empty blob");
                Ok(Vec::new())
            }
            other => other,
        }
    }
}
