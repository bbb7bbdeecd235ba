//! Connection status and the transitions driven by each fetch attempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::parser::UsagePayload;
use super::time_math::{clock_label, CountdownPolicy, DisplayZone};
use super::UsageSnapshot;

/// Status shown to the user. Re-entered on every poll cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConnectionStatus {
    #[default]
    Connecting,
    Connected,
    Error,
    NoAuth,
    AuthError,
    TokenExpired,
    ApiError,
}

impl ConnectionStatus {
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionStatus::Connecting => "Connecting...",
            ConnectionStatus::Connected => "Connected",
            ConnectionStatus::Error => "Error",
            ConnectionStatus::NoAuth => "No credentials",
            ConnectionStatus::AuthError => "Auth failed",
            ConnectionStatus::TokenExpired => "Token expired",
            ConnectionStatus::ApiError => "API error",
        }
    }

    /// Percentages are replaced by `--` rather than showing stale numbers
    pub fn shows_placeholders(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting
                | ConnectionStatus::NoAuth
                | ConnectionStatus::AuthError
                | ConnectionStatus::TokenExpired
        )
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

/// Why a fetch cycle did not produce fresh usage
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error("no Claude credentials found")]
    NoCredential,
    #[error("Claude access token has expired")]
    ExpiredCredential,
    #[error("request failed: {0}")]
    TransportFailure(String),
    #[error("usage API rejected the access token")]
    AuthRejected,
    #[error("usage API returned HTTP {status}")]
    ApiRejected { status: u16 },
    #[error("usage payload could not be decoded: {0}")]
    MalformedPayload(String),
}

impl SyncError {
    pub fn status(&self) -> ConnectionStatus {
        match self {
            SyncError::NoCredential => ConnectionStatus::NoAuth,
            SyncError::ExpiredCredential => ConnectionStatus::TokenExpired,
            SyncError::TransportFailure(_) => ConnectionStatus::Error,
            SyncError::AuthRejected => ConnectionStatus::AuthError,
            SyncError::ApiRejected { .. } => ConnectionStatus::ApiError,
            SyncError::MalformedPayload(_) => ConnectionStatus::ApiError,
        }
    }
}

/// Applies fetch outcomes to the snapshot.
///
/// Parsing, the status change, the `lastUpdated` stamp and the countdown
/// refresh all happen inside one call so a reader never sees half of them.
#[derive(Debug, Clone, Copy)]
pub struct ConnectionStateMachine {
    zone: DisplayZone,
    policy: CountdownPolicy,
}

impl ConnectionStateMachine {
    pub fn new(zone: DisplayZone, policy: CountdownPolicy) -> Self {
        Self { zone, policy }
    }

    pub fn policy(&self) -> CountdownPolicy {
        self.policy
    }

    pub fn apply(
        &self,
        snapshot: &mut UsageSnapshot,
        outcome: &Result<UsagePayload, SyncError>,
        now: DateTime<Utc>,
    ) -> ConnectionStatus {
        let status = match outcome {
            Ok(payload) => {
                payload.apply_to(snapshot, self.zone);
                snapshot.last_error = None;
                ConnectionStatus::Connected
            }
            Err(err) => {
                snapshot.last_error = Some(err.to_string());
                err.status()
            }
        };

        if snapshot.status != status {
            tracing::info!("Connection status {:?} -> {:?}", snapshot.status, status);
        }
        snapshot.status = status;
        snapshot.last_updated = Some(clock_label(now, self.zone));
        snapshot.refresh_countdowns(now, self.policy);
        status
    }
}
