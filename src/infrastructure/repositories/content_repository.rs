use crate::domain::script::RawContent;
use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum FetchError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("invalid source: {0}")]
    InvalidSource(String),

    #[error("fetch failed: {0}")]
    Unavailable(String),
}

/// Repository resolving a remote source into raw prose.
/// Scraping sophistication lives behind this seam; the pipeline only sees
/// text.
#[async_trait]
pub trait ContentRepository: Send + Sync {
    async fn fetch(&self, source: &str) -> Result<RawContent, FetchError>;
}
