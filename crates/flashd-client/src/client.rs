//! Flash API HTTP client implementation

use std::path::Path;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{FlashClientError, Result};
use crate::stream::FlashStream;
use crate::types::ErrorResponse;

/// Default timeout for short requests (health)
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default connection timeout
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the remote flash API
///
/// Flash requests have no overall timeout: a flash streams for as long as the
/// programmer runs. Only connection setup is bounded for them.
#[derive(Debug, Clone)]
pub struct FlashClient {
    client: Client,
    base_url: Url,
    timeout: Duration,
}

impl FlashClient {
    /// Create a new client
    ///
    /// # Arguments
    /// * `base_url` - Base URL of the flash server (e.g., "http://localhost:8000")
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_config(base_url, DEFAULT_TIMEOUT, DEFAULT_CONNECT_TIMEOUT)
    }

    /// Create a new client with custom timeouts
    pub fn with_config(base_url: &str, timeout: Duration, connect_timeout: Duration) -> Result<Self> {
        let client = Client::builder().connect_timeout(connect_timeout).build()?;
        let base_url = Url::parse(base_url)?;

        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Check server health
    #[instrument(skip(self))]
    pub async fn health(&self) -> Result<String> {
        let url = self.base_url.join("/health")?;
        let response = self.client.get(url).timeout(self.timeout).send().await?;

        if response.status().is_success() {
            Ok(response.text().await?)
        } else {
            Err(extract_error(response).await)
        }
    }

    /// Upload a local image file and start flashing it
    #[instrument(skip(self))]
    pub async fn flash_file(&self, path: &Path) -> Result<FlashStream> {
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| {
                FlashClientError::IoError(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    format!("No usable file name in {}", path.display()),
                ))
            })?
            .to_string();
        let data = tokio::fs::read(path).await?;

        self.flash_bytes(&filename, data).await
    }

    /// Upload image bytes under `filename` and start flashing them.
    ///
    /// Returns once the server has accepted the upload and started
    /// streaming; rejections come back as [`FlashClientError::ServerError`].
    #[instrument(skip(self, data))]
    pub async fn flash_bytes(&self, filename: &str, data: Vec<u8>) -> Result<FlashStream> {
        let url = self.base_url.join("/api/flash")?;
        debug!("Uploading {} to {}", filename, url);

        let part = Part::bytes(data)
            .file_name(filename.to_string())
            .mime_str("application/octet-stream")?;
        let form = Form::new().part("file", part);

        let response = self.client.post(url).multipart(form).send().await?;

        if response.status().is_success() {
            Ok(FlashStream::new(response))
        } else {
            Err(extract_error(response).await)
        }
    }
}

/// Extract error from failed response
async fn extract_error(response: reqwest::Response) -> FlashClientError {
    let status = response.status();
    let message = match response.json::<ErrorResponse>().await {
        Ok(err) => err.message,
        Err(_) => format!("HTTP {}", status),
    };

    FlashClientError::server_error(status.as_u16(), message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_creation() {
        let client = FlashClient::new("http://localhost:8000").unwrap();
        assert_eq!(client.base_url().as_str(), "http://localhost:8000/");
    }

    #[test]
    fn test_invalid_url() {
        assert!(matches!(
            FlashClient::new("not a url"),
            Err(FlashClientError::InvalidUrl(_))
        ));
    }

    #[test]
    fn test_unreachable_server() {
        let client = FlashClient::with_config(
            "http://127.0.0.1:1",
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .unwrap();

        let result = tokio_test::block_on(client.health());
        assert!(matches!(result, Err(FlashClientError::HttpError(_))));
    }
}
