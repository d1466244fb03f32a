pub mod error;

pub use error::{Result, StorageError};

use std::time::Duration;

use tracing::debug;

pub struct StorageClient {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

impl StorageClient {
    pub fn new(base_url: &str, service_key: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_key: service_key.to_string(),
        }
    }

    /// Delete a single object from a bucket.
    pub async fn remove(&self, bucket: &str, path: &str) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, path);

        debug!(bucket, path, "Removing storage object");

        let resp = self
            .client
            .delete(&url)
            .bearer_auth(&self.service_key)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(StorageError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(())
    }
}
