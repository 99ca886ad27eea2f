use crate::error::Result;
use async_trait::async_trait;

// Ingest-side port: anything that can hand back a page body for a URL
#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<String>;
}
