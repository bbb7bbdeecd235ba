//! Transport seam for the usage endpoint

use async_trait::async_trait;
use thiserror::Error;

/// Raw HTTP result; interpreting the status is the engine's job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out")]
    Timeout,
    #[error("connection failed: {0}")]
    Connect(String),
    #[error("{0}")]
    Other(String),
}

/// Performs the authenticated GET against the usage endpoint
#[async_trait]
pub trait UsageApi: Send + Sync {
    async fn fetch_usage(&self, access_token: &str) -> Result<ApiResponse, TransportError>;

    /// Endpoint name for logs
    fn name(&self) -> &'static str;
}
