//! Credential lookup for the usage API
//!
//! The engine only sees [`CredentialProvider`]. The Claude implementation
//! reads the OAuth blob Claude Code keeps in the system keyring and falls
//! back to `~/.claude/.credentials.json` when the keyring has nothing.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::keyring::{current_account, KeyringError, SecureStorage};
use crate::usage::Credentials;

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// Source of the bearer token used for each fetch
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Current credentials, or `None` when the user is not signed in
    async fn lookup(&self) -> Option<Credentials>;

    /// Raw `subscriptionType` stored next to the token
    async fn subscription_hint(&self) -> Option<String> {
        None
    }

    /// Drop anything cached so the next lookup goes back to the store
    fn invalidate(&self) {}
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OAuthRecord {
    #[serde(default)]
    access_token: Option<String>,
    /// Epoch milliseconds
    #[serde(default)]
    expires_at: Option<f64>,
    #[serde(default)]
    subscription_type: Option<String>,
}

impl OAuthRecord {
    fn credentials(&self) -> Option<Credentials> {
        let token = self.access_token.as_deref().filter(|t| !t.is_empty())?;
        let expires_at = self.expires_at?;
        Some(Credentials::from_millis(token.to_string(), expires_at as i64))
    }
}

/// Decode the stored blob. Claude Code nests it under `claudeAiOauth`;
/// a flat object with the same fields is accepted too.
fn parse_blob(raw: &str) -> Option<OAuthRecord> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;
    let record = value.get("claudeAiOauth").cloned().unwrap_or(value);
    serde_json::from_value(record).ok()
}

struct CachedRecord {
    record: OAuthRecord,
    fetched_at: Instant,
}

pub struct ClaudeCredentialProvider {
    keyring: Option<SecureStorage>,
    account: String,
    credentials_path: Option<PathBuf>,
    lookup_timeout: Duration,
    cache_ttl: Duration,
    cache: Mutex<Option<CachedRecord>>,
}

impl ClaudeCredentialProvider {
    pub fn new() -> Self {
        Self {
            keyring: Some(SecureStorage::claude()),
            account: current_account(),
            credentials_path: default_credentials_path(),
            lookup_timeout: DEFAULT_LOOKUP_TIMEOUT,
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: Mutex::new(None),
        }
    }

    pub fn with_credentials_path(mut self, path: Option<PathBuf>) -> Self {
        self.credentials_path = path;
        self
    }

    pub fn without_keyring(mut self) -> Self {
        self.keyring = None;
        self
    }

    /// Zero disables caching
    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = ttl;
        self
    }

    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = timeout;
        self
    }

    fn cached(&self) -> Option<OAuthRecord> {
        let cache = self.cache.lock().ok()?;
        let entry = cache.as_ref()?;
        if entry.fetched_at.elapsed() < self.cache_ttl {
            Some(entry.record.clone())
        } else {
            None
        }
    }

    fn store_cache(&self, record: &OAuthRecord) {
        if self.cache_ttl.is_zero() {
            return;
        }
        if let Ok(mut cache) = self.cache.lock() {
            *cache = Some(CachedRecord {
                record: record.clone(),
                fetched_at: Instant::now(),
            });
        }
    }

    async fn record(&self) -> Option<OAuthRecord> {
        if let Some(record) = self.cached() {
            return Some(record);
        }

        let record = match self.read_keyring().await.as_deref().and_then(parse_blob) {
            Some(record) => record,
            None => self.read_credentials_file().await?,
        };

        self.store_cache(&record);
        Some(record)
    }

    async fn read_keyring(&self) -> Option<String> {
        let storage = self.keyring.clone()?;
        let account = self.account.clone();
        let lookup = tokio::task::spawn_blocking(move || storage.get(&account));

        match tokio::time::timeout(self.lookup_timeout, lookup).await {
            Ok(Ok(Ok(blob))) => Some(blob),
            Ok(Ok(Err(KeyringError::NotFound))) => None,
            Ok(Ok(Err(err))) => {
                tracing::debug!("Failed to read Claude credentials from keyring: {}", err);
                None
            }
            Ok(Err(err)) => {
                tracing::warn!("Keyring lookup task failed: {}", err);
                None
            }
            Err(_) => {
                tracing::warn!("Keyring lookup timed out after {:?}", self.lookup_timeout);
                None
            }
        }
    }

    async fn read_credentials_file(&self) -> Option<OAuthRecord> {
        let path = self.credentials_path.as_ref()?;
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(err) => {
                tracing::debug!("No Claude credentials file at {:?}: {}", path, err);
                return None;
            }
        };

        let record = parse_blob(&content);
        if record.is_none() {
            tracing::warn!("Claude credentials file at {:?} could not be parsed", path);
        }
        record
    }
}

impl Default for ClaudeCredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialProvider for ClaudeCredentialProvider {
    async fn lookup(&self) -> Option<Credentials> {
        self.record().await?.credentials()
    }

    async fn subscription_hint(&self) -> Option<String> {
        self.record().await?.subscription_type
    }

    fn invalidate(&self) {
        if let Ok(mut cache) = self.cache.lock() {
            if cache.take().is_some() {
                tracing::debug!("Cleared cached Claude credentials");
            }
        }
    }
}

/// `~/.claude/.credentials.json`
pub fn default_credentials_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join(".credentials.json"))
}
