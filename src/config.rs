//! User configuration and API key lookup.
//!
//! Sources, lowest to highest precedence:
//! - built-in defaults
//! - `config.toml` (`<config dir>/platetune/config.toml` or `--config`)
//! - `PLATETUNE_PROVIDER` / `PLATETUNE_MODEL` / `PLATETUNE_LANGUAGE`

use std::path::{Path, PathBuf};

use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{PlateTuneError, Result};
use crate::optimizer::Provider;
use crate::project::previews::MAX_PREVIEW_DIMENSION;

pub const ENV_PROVIDER: &str = "PLATETUNE_PROVIDER";
pub const ENV_MODEL: &str = "PLATETUNE_MODEL";
pub const ENV_LANGUAGE: &str = "PLATETUNE_LANGUAGE";
pub const ENV_API_KEY: &str = "PLATETUNE_API_KEY";

const KEYRING_USER: &str = "platetune";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub provider: Provider,
    /// `None` means the provider's default model.
    pub model: Option<String>,
    pub language: String,
    pub allow_user_setting_overrides: bool,
    pub max_preview_dimension: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            provider: Provider::default(),
            model: None,
            language: "en".to_string(),
            allow_user_setting_overrides: false,
            max_preview_dimension: MAX_PREVIEW_DIMENSION,
        }
    }
}

impl AppConfig {
    /// `<config dir>/platetune/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("platetune").join("config.toml"))
    }

    /// Parse a TOML document. Missing fields take their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| PlateTuneError::Config(format!("Invalid config TOML: {}", e)))
    }

    /// Load configuration and apply environment overrides.
    ///
    /// An explicit `path` must exist. The default path is optional; when it
    /// is missing the built-in defaults are used.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_file(path)?,
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::load_file(&default)?,
                _ => {
                    debug!("No config file found, using defaults");
                    Self::default()
                }
            },
        };
        config.apply_overrides(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PlateTuneError::Config(format!("Failed to read config {}: {}", path.display(), e))
        })?;
        info!("Loaded config from {}", path.display());
        Self::from_toml_str(&content)
    }

    /// Apply overrides from a variable lookup (the process environment in
    /// production).
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(provider) = non_empty(ENV_PROVIDER) {
            self.provider = provider.parse()?;
        }
        if let Some(model) = non_empty(ENV_MODEL) {
            self.model = Some(model);
        }
        if let Some(language) = non_empty(ENV_LANGUAGE) {
            self.language = language;
        }
        Ok(())
    }

    /// The configured model, or the provider default.
    pub fn effective_model(&self) -> &str {
        self.model
            .as_deref()
            .unwrap_or_else(|| self.provider.default_model())
    }
}

/// Find the API key for `provider`: `PLATETUNE_API_KEY`, then the OS
/// keychain.
pub fn resolve_api_key(provider: Provider) -> Result<String> {
    if let Some(key) = std::env::var(ENV_API_KEY).ok().filter(|k| !k.trim().is_empty()) {
        debug!("Using API key from {}", ENV_API_KEY);
        return Ok(key);
    }
    match keychain_api_key(provider)? {
        Some(key) => Ok(key),
        None => Err(missing_key(provider)),
    }
}

fn keychain_api_key(provider: Provider) -> Result<Option<String>> {
    let service = provider.keyring_service();
    info!("Getting API key for service: {}", service);
    let entry = Entry::new(&service, KEYRING_USER).map_err(|e| {
        warn!("Failed to create keyring entry for {}: {}", service, e);
        PlateTuneError::Credentials(e.to_string())
    })?;
    match entry.get_password() {
        Ok(password) if !password.trim().is_empty() => Ok(Some(password)),
        Ok(_) | Err(keyring::Error::NoEntry) => {
            info!("No API key found for service: {}", service);
            Ok(None)
        }
        Err(e) => {
            warn!("Failed to get password for {}: {}", service, e);
            Err(PlateTuneError::Credentials(e.to_string()))
        }
    }
}

fn missing_key(provider: Provider) -> PlateTuneError {
    PlateTuneError::Credentials(format!(
        "No API key for {}. Set {} or store one in the OS keychain under service '{}', user '{}'",
        provider,
        ENV_API_KEY,
        provider.keyring_service(),
        KEYRING_USER
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.provider, Provider::Claude);
        assert_eq!(config.effective_model(), "claude-sonnet-4-20250514");
        assert_eq!(config.language, "en");
        assert!(!config.allow_user_setting_overrides);
        assert_eq!(config.max_preview_dimension, 1024);
    }

    #[test]
    fn test_partial_toml() {
        let config = AppConfig::from_toml_str(
            r#"
provider = "openrouter"
allow_user_setting_overrides = true
"#,
        )
        .unwrap();
        assert_eq!(config.provider, Provider::OpenRouter);
        assert_eq!(config.effective_model(), "anthropic/claude-sonnet-4");
        assert!(config.allow_user_setting_overrides);
        assert_eq!(config.language, "en");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = AppConfig::from_toml_str("provider = ").unwrap_err();
        assert!(matches!(err, PlateTuneError::Config(_)));
        assert!(AppConfig::from_toml_str("provider = \"gemini\"").is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_PROVIDER, "kimi"),
            (ENV_MODEL, "moonshot-v1-32k"),
            (ENV_LANGUAGE, ""),
        ]
        .into_iter()
        .collect();
        let mut config = AppConfig::default();
        config
            .apply_overrides(|name| env.get(name).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.provider, Provider::Kimi);
        assert_eq!(config.effective_model(), "moonshot-v1-32k");
        assert_eq!(config.language, "en");
    }

    #[test]
    fn test_bad_env_provider_fails() {
        let mut config = AppConfig::default();
        let err = config
            .apply_overrides(|name| (name == ENV_PROVIDER).then(|| "gemini".to_string()))
            .unwrap_err();
        assert!(matches!(err, PlateTuneError::Config(_)));
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "language = \"de\"\nmax_preview_dimension = 512\n").unwrap();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.max_preview_dimension, 512);

        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            AppConfig::load(Some(&missing)),
            Err(PlateTuneError::Config(_))
        ));
    }

    #[test]
    fn test_missing_key_message() {
        let err = missing_key(Provider::OpenAi);
        let msg = err.to_string();
        assert!(msg.contains("PLATETUNE_API_KEY"));
        assert!(msg.contains("platetune-openai-api"));
    }
}
