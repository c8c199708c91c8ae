//! Export Client
//!
//! Delivers snapshot records to the downstream detector over HTTP.

use std::future::Future;
use std::time::Duration;

use super::record::ExportRecord;

/// Destination for exported records
pub trait SnapshotSink: Send + Sync {
    fn send(&self, record: &ExportRecord) -> impl Future<Output = Result<(), ExportError>> + Send;
}

/// POSTs each record as JSON to `{base_url}/detect`
pub struct HttpSink {
    endpoint: String,
    http_client: reqwest::Client,
}

impl HttpSink {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ExportError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            endpoint: format!("{}/detect", base_url.trim_end_matches('/')),
            http_client,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl SnapshotSink for HttpSink {
    async fn send(&self, record: &ExportRecord) -> Result<(), ExportError> {
        let body = serde_json::to_vec(record)?;
        let response = self
            .http_client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(ExportError::Server(response.status().as_u16()))
        }
    }
}

/// Export errors
#[derive(Debug)]
pub enum ExportError {
    Network(String),
    Server(u16),
    Serialize(String),
}

impl ExportError {
    /// Client-side rejections will not succeed on retry
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Server(code) => *code >= 500 || *code == 429,
            Self::Serialize(_) => false,
        }
    }
}

impl std::fmt::Display for ExportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Network(e) => write!(f, "Network error: {}", e),
            Self::Server(code) => write!(f, "Server error: {}", code),
            Self::Serialize(e) => write!(f, "Serialize error: {}", e),
        }
    }
}

impl std::error::Error for ExportError {}

impl From<reqwest::Error> for ExportError {
    fn from(e: reqwest::Error) -> Self {
        match e.status() {
            Some(status) => Self::Server(status.as_u16()),
            None => Self::Network(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ExportError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialize(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_detect_path() {
        let sink = HttpSink::new("http://127.0.0.1:5000/", Duration::from_millis(200)).unwrap();
        assert_eq!(sink.endpoint(), "http://127.0.0.1:5000/detect");
    }

    #[test]
    fn test_retryable_errors() {
        assert!(ExportError::Network("reset".into()).is_retryable());
        assert!(ExportError::Server(503).is_retryable());
        assert!(!ExportError::Server(400).is_retryable());
        assert!(!ExportError::Serialize("nan".into()).is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        // port 9 (discard) on loopback is closed in test environments
        let sink = HttpSink::new("http://127.0.0.1:9", Duration::from_millis(300)).unwrap();
        let record = crate::logic::features::FeatureSnapshot::empty().to_export_record();
        match sink.send(&record).await {
            Err(ExportError::Network(_)) => {}
            other => panic!("unexpected result {:?}", other),
        }
    }
}
