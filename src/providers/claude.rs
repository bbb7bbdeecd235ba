//! Anthropic OAuth usage endpoint
//!
//! `GET {base}/api/oauth/usage` with the Claude Code bearer token and the
//! OAuth beta header. The 10 second default timeout is enforced by reqwest.

use async_trait::async_trait;
use std::time::Duration;

use super::{ApiResponse, TransportError, UsageApi};

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const OAUTH_USAGE_PATH: &str = "/api/oauth/usage";
const OAUTH_BETA_HEADER: &str = "oauth-2025-04-20";
const USER_AGENT: &str = concat!("UsageBar/", env!("CARGO_PKG_VERSION"));

pub struct ClaudeUsageApi {
    client: reqwest::Client,
    base_url: String,
}

impl ClaudeUsageApi {
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();

        Self {
            client,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn usage_url(&self) -> String {
        format!("{}{}", self.base_url, OAUTH_USAGE_PATH)
    }
}

fn classify(err: reqwest::Error) -> TransportError {
    if err.is_timeout() {
        TransportError::Timeout
    } else if err.is_connect() {
        TransportError::Connect(err.to_string())
    } else {
        TransportError::Other(err.to_string())
    }
}

#[async_trait]
impl UsageApi for ClaudeUsageApi {
    async fn fetch_usage(&self, access_token: &str) -> Result<ApiResponse, TransportError> {
        let url = self.usage_url();
        tracing::debug!("Fetching Claude usage from {}", url);

        let response = self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", access_token))
            .header("anthropic-beta", OAUTH_BETA_HEADER)
            .header("Content-Type", "application/json")
            .header("Accept", "application/json")
            .header("User-Agent", USER_AGENT)
            .send()
            .await
            .map_err(classify)?;

        let status = response.status().as_u16();
        let body = response.bytes().await.map_err(classify)?;

        Ok(ApiResponse {
            status,
            body: body.to_vec(),
        })
    }

    fn name(&self) -> &'static str {
        "Claude OAuth usage"
    }
}
