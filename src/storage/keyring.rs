//! Read access to the system keyring

use keyring::Entry;
use thiserror::Error;

/// Service name Claude Code registers its OAuth blob under
pub const CLAUDE_CREDENTIALS_SERVICE: &str = "Claude Code-credentials";

#[derive(Error, Debug)]
pub enum KeyringError {
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
    #[error("Credential not found")]
    NotFound,
}

/// Keyring entry lookup scoped to one service
#[derive(Debug, Clone)]
pub struct SecureStorage {
    service: String,
}

impl SecureStorage {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    pub fn claude() -> Self {
        Self::new(CLAUDE_CREDENTIALS_SERVICE)
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Retrieve the secret stored for `account`
    pub fn get(&self, account: &str) -> Result<String, KeyringError> {
        let entry = Entry::new(&self.service, account)?;
        match entry.get_password() {
            Ok(password) => Ok(password),
            Err(keyring::Error::NoEntry) => Err(KeyringError::NotFound),
            Err(e) => Err(KeyringError::Keyring(e)),
        }
    }
}

impl Default for SecureStorage {
    fn default() -> Self {
        Self::claude()
    }
}

/// Account name the credential was stored under (the login user)
pub fn current_account() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_entry_is_not_found_or_backend_error() {
        let storage = SecureStorage::new("usagebar-test-service-that-does-not-exist");
        match storage.get("nobody") {
            Ok(value) => panic!("unexpected secret: {}", value),
            Err(KeyringError::NotFound) | Err(KeyringError::Keyring(_)) => {}
        }
    }

    #[test]
    fn claude_service_name() {
        assert_eq!(SecureStorage::default().service(), "Claude Code-credentials");
    }
}
