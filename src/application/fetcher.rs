//! Content-addressed file downloads.

use std::sync::Arc;

use tracing::debug;

use crate::application::error::PipelineError;
use crate::application::remote::ContentTransport;
use crate::cache::{CacheStore, blob_key};
use crate::domain::files::RemoteFile;

const SOURCE: &str = "application::fetcher";

/// Downloads file bodies, caching them forever under their content hash.
pub struct ContentFetcher {
    transport: Arc<dyn ContentTransport>,
    cache: Arc<CacheStore>,
}

impl ContentFetcher {
    pub fn new(transport: Arc<dyn ContentTransport>, cache: Arc<CacheStore>) -> Self {
        Self { transport, cache }
    }

    pub async fn fetch_content(&self, file: &RemoteFile) -> Result<String, PipelineError> {
        let key = blob_key(&file.sha);
        if let Some(cached) = self.cache.get::<String>(&key).await {
            return Ok(cached.data);
        }

        let body = self
            .transport
            .download(&file.download_url)
            .await
            .map_err(|source| PipelineError::Fetch {
                file: file.name.clone(),
                source,
            })?;

        debug!(
            target = SOURCE,
            file = %file.name,
            sha = %file.sha,
            bytes = body.len(),
            "downloaded file body"
        );
        self.cache.set_permanent(&key, &body).await;
        Ok(body)
    }
}
