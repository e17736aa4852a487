//! HTTP transport for uploads, behind a trait so the node can be tested offline

use crate::error::{NodeError, Result};
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// Performs one HTTP GET and reports the status code
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// GET `url`, returning the response status
    ///
    /// # Errors
    ///
    /// Returns `NodeError::Upload` if no response was received
    async fn http_get(&self, url: &str) -> Result<u16>;
}

/// [`HttpTransport`] backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| NodeError::Upload(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn http_get(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NodeError::Upload(format!("Request failed: {}", e)))?;

        let status = response.status();
        debug!("Upload response status: {}", status);
        Ok(status.as_u16())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reqwest_transport_builds() {
        assert!(ReqwestTransport::new(Duration::from_secs(5)).is_ok());
    }

    #[tokio::test]
    async fn test_unreachable_server_is_upload_error() {
        let transport = ReqwestTransport::new(Duration::from_millis(200)).unwrap();
        let result = transport.http_get("http://127.0.0.1:9/update").await;
        assert!(matches!(result, Err(NodeError::Upload(_))));
    }
}
