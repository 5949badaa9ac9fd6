use super::content_repository::{ContentRepository, FetchError};
use crate::domain::script::RawContent;
use async_trait::async_trait;
use html2text::from_read;

/// HTTP implementation of the content repository: fetch a page and strip it
/// down to readable text.
pub struct HttpContentRepository {
    client: reqwest::Client,
}

impl HttpContentRepository {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentRepository for HttpContentRepository {
    async fn fetch(&self, source: &str) -> Result<RawContent, FetchError> {
        if !source.starts_with("http://") && !source.starts_with("https://") {
            return Err(FetchError::InvalidSource(source.to_string()));
        }

        tracing::info!(source = %source, "Fetching content");

        let response = self
            .client
            .get(source)
            .send()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(FetchError::NotFound(source.to_string()));
        }
        if !response.status().is_success() {
            return Err(FetchError::Unavailable(format!(
                "{} returned {}",
                source,
                response.status()
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| FetchError::Unavailable(e.to_string()))?;
        // Wide enough that wrapping never splits mid-sentence structure;
        // the normalizer collapses line breaks inside blocks anyway.
        let text = from_read(body.as_bytes(), 500);

        tracing::info!(
            source = %source,
            body_length = body.len(),
            text_length = text.len(),
            "Content fetched"
        );

        Ok(RawContent::new(text, source))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_rejects_non_http_sources() {
        let repo = HttpContentRepository::new(reqwest::Client::new());
        let result = repo.fetch("ftp://example.com/doc").await;
        assert!(matches!(result, Err(FetchError::InvalidSource(_))));
    }
}
