//! Configuration management for plantscan
//!
//! Config stored at: ~/.config/plantscan/config.toml
//! Provider settings can be overridden with LLM_KEY, LLM_NAME, LLM_URL and
//! PLANTSCAN_REGION.

use plantscan_types::{ConfigError, OutputFormat, Result};
use plantscan_vision::Dialect;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_API_KEY: &str = "LLM_KEY";
pub const ENV_MODEL: &str = "LLM_NAME";
pub const ENV_ENDPOINT: &str = "LLM_URL";
pub const ENV_REGION: &str = "PLANTSCAN_REGION";

/// Application configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Provider base URL or full request URL
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// API key (prefer LLM_KEY over storing it here)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Wire dialect override; detected from the endpoint when unset
    #[serde(default)]
    pub dialect: Option<Dialect>,

    /// Region used when a request names none
    #[serde(default = "default_region")]
    pub default_region: String,

    #[serde(default = "default_analysis_timeout")]
    pub analysis_timeout_secs: u64,

    #[serde(default = "default_chat_timeout")]
    pub chat_timeout_secs: u64,

    #[serde(default = "default_analysis_max_tokens")]
    pub analysis_max_tokens: u32,

    #[serde(default = "default_chat_max_tokens")]
    pub chat_max_tokens: u32,

    /// Extra attempts with a doubled token budget after a truncated reply
    #[serde(default = "default_truncation_retries")]
    pub truncation_retries: u32,

    /// Ask for confidenceScore / confidenceReasoning
    #[serde(default = "default_true")]
    pub include_confidence: bool,

    /// Default output format (table, json)
    #[serde(default)]
    pub output_format: OutputFormat,
}

fn default_endpoint() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_model() -> String {
    "gemini-2.0-flash".to_string()
}

fn default_region() -> String {
    "North America".to_string()
}

fn default_analysis_timeout() -> u64 {
    90
}

fn default_chat_timeout() -> u64 {
    30
}

fn default_analysis_max_tokens() -> u32 {
    4000
}

fn default_chat_max_tokens() -> u32 {
    1000
}

fn default_truncation_retries() -> u32 {
    1
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            model: default_model(),
            api_key: None,
            dialect: None,
            default_region: default_region(),
            analysis_timeout_secs: default_analysis_timeout(),
            chat_timeout_secs: default_chat_timeout(),
            analysis_max_tokens: default_analysis_max_tokens(),
            chat_max_tokens: default_chat_max_tokens(),
            truncation_retries: default_truncation_retries(),
            include_confidence: true,
            output_format: OutputFormat::default(),
        }
    }
}

/// Resolved provider settings for one model call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or(ConfigError::NotFound)?
            .join("plantscan");
        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Load config from the default location, then apply environment overrides
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;
        let mut config = Self::load_from(&path)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Load config from `path`, or defaults when the file does not exist
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Config::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        Ok(config)
    }

    /// Save config to the default location
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        // Ensure directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SaveError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Override provider settings from `lookup` (the process environment in `load`).
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get(ENV_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(model) = get(ENV_MODEL) {
            self.model = model;
        }
        if let Some(endpoint) = get(ENV_ENDPOINT) {
            self.endpoint = endpoint;
        }
        if let Some(region) = get(ENV_REGION) {
            self.default_region = region;
        }
    }

    /// Provider settings, failing when any of them is empty
    pub fn credentials(&self) -> Result<ProviderCredentials> {
        let api_key = self
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .ok_or(ConfigError::MissingCredential("api_key"))?;
        if self.model.trim().is_empty() {
            return Err(ConfigError::MissingCredential("model").into());
        }
        if self.endpoint.trim().is_empty() {
            return Err(ConfigError::MissingCredential("endpoint").into());
        }

        Ok(ProviderCredentials {
            endpoint: self.endpoint.trim().to_string(),
            api_key: api_key.to_string(),
            model: self.model.trim().to_string(),
        })
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_secs.max(1))
    }

    pub fn chat_timeout(&self) -> Duration {
        Duration::from_secs(self.chat_timeout_secs.max(1))
    }

    /// Region to use when the request names none
    pub fn region_or_default(&self, region: Option<&str>) -> String {
        region
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or(self.default_region.trim())
            .to_string()
    }
}

fn mask_key(key: &str) -> String {
    let count = key.chars().count();
    if count <= 8 {
        return "****".to_string();
    }
    let tail: String = key.chars().skip(count - 4).collect();
    format!("****{}", tail)
}

impl std::fmt::Display for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Plantscan Configuration")?;
        writeln!(f, "=======================")?;
        writeln!(f)?;
        writeln!(f, "Endpoint:           {}", self.endpoint)?;
        writeln!(f, "Model:              {}", self.model)?;
        writeln!(
            f,
            "API key:            {}",
            self.api_key
                .as_deref()
                .map(mask_key)
                .unwrap_or_else(|| "(not set)".to_string())
        )?;
        writeln!(
            f,
            "Dialect:            {}",
            self.dialect
                .map(|d| d.to_string())
                .unwrap_or_else(|| format!("auto ({})", Dialect::detect(&self.endpoint)))
        )?;
        writeln!(f, "Default region:     {}", self.default_region)?;
        writeln!(f, "Analysis timeout:   {}s", self.analysis_timeout_secs)?;
        writeln!(f, "Chat timeout:       {}s", self.chat_timeout_secs)?;
        writeln!(f, "Analysis tokens:    {}", self.analysis_max_tokens)?;
        writeln!(f, "Chat tokens:        {}", self.chat_max_tokens)?;
        writeln!(f, "Truncation retries: {}", self.truncation_retries)?;
        writeln!(f, "Confidence fields:  {}", self.include_confidence)?;
        writeln!(f, "Output format:      {}", self.output_format)?;

        if let Ok(path) = Self::config_path() {
            writeln!(f)?;
            writeln!(f, "Config file:        {}", path.display())?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use plantscan_types::Error;
    use std::collections::HashMap;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.default_region, "North America");
        assert_eq!(config.analysis_timeout_secs, 90);
        assert_eq!(config.chat_timeout_secs, 30);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "model = \"gpt-4o-mini\"\ndialect = \"chat-completions\"\noutput_format = \"json\"\n",
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.dialect, Some(Dialect::ChatCompletions));
        assert_eq!(config.output_format, OutputFormat::Json);
        assert_eq!(config.analysis_max_tokens, 4000);
        assert!(config.include_confidence);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config {
            api_key: Some("secret".to_string()),
            default_region: "Texas".to_string(),
            truncation_retries: 3,
            ..Config::default()
        };

        config.save_to(&path).unwrap();
        assert_eq!(Config::load_from(&path).unwrap(), config);
    }

    #[test]
    fn test_invalid_toml_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "analysis_timeout_secs = \"soon\"").unwrap();

        let err = Config::load_from(&path).unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            (ENV_API_KEY, "env-key"),
            (ENV_MODEL, "env-model"),
            (ENV_ENDPOINT, "http://localhost:11434/v1"),
            (ENV_REGION, ""),
        ]
        .into_iter()
        .collect();

        let mut config = Config::default();
        config.apply_env(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.api_key.as_deref(), Some("env-key"));
        assert_eq!(config.model, "env-model");
        assert_eq!(config.endpoint, "http://localhost:11434/v1");
        assert_eq!(config.default_region, "North America");
    }

    #[test]
    fn test_credentials() {
        let config = Config::default();
        assert!(matches!(
            config.credentials(),
            Err(Error::Config(ConfigError::MissingCredential("api_key")))
        ));

        let config = Config {
            api_key: Some("k".to_string()),
            model: " ".to_string(),
            ..Config::default()
        };
        assert!(matches!(
            config.credentials(),
            Err(Error::Config(ConfigError::MissingCredential("model")))
        ));

        let config = Config {
            api_key: Some("k".to_string()),
            ..Config::default()
        };
        let creds = config.credentials().unwrap();
        assert_eq!(creds.api_key, "k");
        assert_eq!(creds.model, "gemini-2.0-flash");
    }

    #[test]
    fn test_region_or_default() {
        let config = Config::default();
        assert_eq!(config.region_or_default(Some("Texas")), "Texas");
        assert_eq!(config.region_or_default(Some("  ")), "North America");
        assert_eq!(config.region_or_default(None), "North America");
    }

    #[test]
    fn test_display_masks_key() {
        let config = Config {
            api_key: Some("sk-abcdefghijklmnop".to_string()),
            ..Config::default()
        };
        let shown = config.to_string();
        assert!(shown.contains("****mnop"));
        assert!(!shown.contains("abcdefgh"));
        assert!(shown.contains("auto (generate-content)"));
    }
}
