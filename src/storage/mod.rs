//! Storage utilities for credentials and exported snapshots

pub mod credentials;
pub mod keyring;
pub mod snapshot_file;

// Re-export commonly used items
pub use credentials::{ClaudeCredentialProvider, CredentialProvider};
pub use self::keyring::SecureStorage;
