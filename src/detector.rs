//! Active model and subscription tier detection
//!
//! Resolution order for the model, first match wins:
//! 1. `model` in Claude's `settings.json` (`opus`, `sonnet`, `haiku`)
//! 2. the plain-text override file (`opus|o|sonnet|s|haiku|h`)
//! 3. the tier default: free and pro use sonnet, max uses opus
//!
//! Every failure degrades to the next step; detection never errors.

use std::path::{Path, PathBuf};

use crate::storage::CredentialProvider;
use crate::usage::{ActiveModel, SubscriptionTier};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Detection {
    pub model: ActiveModel,
    pub tier: SubscriptionTier,
}

#[derive(Debug, Clone, Default)]
pub struct ModelDetector {
    settings_path: Option<PathBuf>,
    override_path: Option<PathBuf>,
}

impl ModelDetector {
    pub fn new(settings_path: Option<PathBuf>, override_path: Option<PathBuf>) -> Self {
        Self {
            settings_path,
            override_path,
        }
    }

    pub async fn detect(&self, credentials: &dyn CredentialProvider) -> Detection {
        let hint = credentials.subscription_hint().await;
        let tier = SubscriptionTier::from_hint(hint.as_deref());

        let model = if let Some(model) = self.model_from_settings().await {
            model
        } else if let Some(model) = self.model_from_override().await {
            model
        } else {
            tier.default_model()
        };

        tracing::debug!("Detected model {:?} on {:?} tier", model, tier);
        Detection { model, tier }
    }

    async fn model_from_settings(&self) -> Option<ActiveModel> {
        let content = read_optional(self.settings_path.as_deref()).await?;
        let settings: serde_json::Value = match serde_json::from_str(&content) {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!("Ignoring unparsable Claude settings: {}", err);
                return None;
            }
        };
        settings
            .get("model")
            .and_then(|m| m.as_str())
            .and_then(ActiveModel::from_name)
    }

    async fn model_from_override(&self) -> Option<ActiveModel> {
        let content = read_optional(self.override_path.as_deref()).await?;
        ActiveModel::from_override(&content)
    }
}

async fn read_optional(path: Option<&Path>) -> Option<String> {
    tokio::fs::read_to_string(path?).await.ok()
}

pub fn default_settings_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude").join("settings.json"))
}

pub fn default_override_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".claude-status-model"))
}
