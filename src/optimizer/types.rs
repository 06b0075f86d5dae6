//! Wire types for the text-generation service: the outbound request
//! payload and the validated inbound response.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::changes::ProposedChange;
use crate::error::PlateTuneError;
use crate::mapping::ProcessSettings;
use crate::project::{PlateImage, ProjectSummary};

pub const PAYLOAD_VERSION: u32 = 1;

// =============================================================================
// PROVIDERS
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Claude,
    OpenAi,
    OpenRouter,
    Kimi,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Claude => "claude",
            Provider::OpenAi => "openai",
            Provider::OpenRouter => "openrouter",
            Provider::Kimi => "kimi",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Provider::Claude => "claude-sonnet-4-20250514",
            Provider::OpenAi => "gpt-4o",
            Provider::OpenRouter => "anthropic/claude-sonnet-4",
            Provider::Kimi => "moonshot-v1-128k",
        }
    }

    /// OS keychain service holding this provider's API key.
    pub fn keyring_service(&self) -> String {
        format!("platetune-{}-api", self.as_str())
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = PlateTuneError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "claude" | "anthropic" => Ok(Provider::Claude),
            "openai" => Ok(Provider::OpenAi),
            "openrouter" => Ok(Provider::OpenRouter),
            "kimi" | "moonshot" => Ok(Provider::Kimi),
            other => Err(PlateTuneError::Config(format!(
                "Unsupported AI provider: '{}'. Supported: claude, openai, openrouter, kimi",
                other
            ))),
        }
    }
}

// =============================================================================
// REQUEST
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Quality,
    Speed,
    Strength,
}

/// What the user asked for. Only fields the user actually supplied are
/// serialized.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub goal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub material: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectSettings {
    pub object_name: String,
    pub plate_index: Option<u32>,
    pub settings: ProcessSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CurrentSettings {
    pub global: ProcessSettings,
    pub objects: Vec<ObjectSettings>,
}

/// Request flags that are not part of the project itself.
#[derive(Debug, Clone, PartialEq)]
pub struct PayloadFlags {
    pub allow_user_setting_overrides: bool,
    /// Any BCP-47-ish tag; normalized when the payload is built.
    pub language: String,
}

impl Default for PayloadFlags {
    fn default() -> Self {
        Self {
            allow_user_setting_overrides: false,
            language: "en".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestPayload {
    pub version: u32,
    pub project_summary: ProjectSummary,
    pub current_settings: CurrentSettings,
    pub user_modified_settings: Vec<String>,
    pub intent_details: IntentDetails,
    pub plate_images: Vec<PlateImage>,
    pub allow_user_setting_overrides: bool,
    pub target_language: String,
}

// =============================================================================
// RESPONSE
// =============================================================================

/// A response that passed validation.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationResponse {
    pub version: Option<u32>,
    pub changes: Vec<ProposedChange>,
    pub global_rationale: Option<String>,
    pub warnings: Vec<String>,
}
