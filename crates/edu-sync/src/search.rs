//! Hook invoked once per cycle so the search index can be rebuilt.

use anyhow::Context;
use async_trait::async_trait;
use edu_core::SyncErrors;
use edu_storage::HttpFetcher;
use serde::Serialize;
use tracing::info;

#[async_trait]
pub trait SearchIndexer: Send + Sync {
    async fn index(&self, errors: &SyncErrors) -> anyhow::Result<()>;
}

#[derive(Debug, Default)]
pub struct NoopSearchIndexer;

#[async_trait]
impl SearchIndexer for NoopSearchIndexer {
    async fn index(&self, _errors: &SyncErrors) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Serialize)]
pub struct IndexRequest<'a> {
    pub errors: &'a [String],
}

/// POSTs `{ "errors": [...] }` to a search service endpoint.
#[derive(Debug)]
pub struct HttpSearchIndexer {
    url: String,
    http: HttpFetcher,
}

impl HttpSearchIndexer {
    pub fn new(url: impl Into<String>, http: HttpFetcher) -> Self {
        Self { url: url.into(), http }
    }
}

#[async_trait]
impl SearchIndexer for HttpSearchIndexer {
    async fn index(&self, errors: &SyncErrors) -> anyhow::Result<()> {
        let body = IndexRequest {
            errors: errors.errors(),
        };
        let status = self
            .http
            .post_json(&self.url, &body)
            .await
            .with_context(|| format!("notifying search index at {}", self.url))?;
        info!(url = %self.url, status = status.as_u16(), "search index notified");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_body_carries_errors() {
        let mut errors = SyncErrors::new();
        errors.push_error("Invalid courses path courses/README.md");
        let body = serde_json::to_value(IndexRequest {
            errors: errors.errors(),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "errors": ["Invalid courses path courses/README.md"] })
        );
    }
}
