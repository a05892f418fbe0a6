//! Magic Prompt configuration types and loading

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::llm::LlmError;
use crate::scanner::{DEFAULT_IGNORED_DIRS, IgnoreRules, ScanLimits};
use crate::session::SessionOptions;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Project scan limits
    pub scan: ScanConfig,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[serde(rename = "log-level")]
    pub log_level: Option<String>,
}

impl Config {
    /// Validate configuration before use
    ///
    /// Checks that the API key environment variable is set. Call this before
    /// dispatching any enrichment so a missing credential fails fast.
    pub fn validate(&self) -> Result<()> {
        self.llm.api_key()?;
        Ok(())
    }

    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .magic-prompt.yml
        let local_config = PathBuf::from(".magic-prompt.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/magic-prompt/magic-prompt.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("magic-prompt").join("magic-prompt.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Read only the log level, before logging is set up
    ///
    /// Errors are swallowed: a broken config file is reported later by `load`.
    pub fn load_log_level(config_path: Option<&PathBuf>) -> Option<String> {
        Self::load(config_path).ok().and_then(|c| c.log_level)
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name: "groq", "openai" or "anthropic"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Environment variable containing the API key (provider default if unset)
    #[serde(rename = "api-key-env")]
    pub api_key_env: Option<String>,

    /// API base URL (provider default if unset)
    #[serde(rename = "base-url")]
    pub base_url: Option<String>,

    /// Maximum tokens per response
    #[serde(rename = "max-tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    pub temperature: f32,

    /// HTTP connect timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,

    /// Upper bound on the wait for the first streamed chunk
    #[serde(rename = "first-chunk-timeout-ms")]
    pub first_chunk_timeout_ms: u64,

    /// Upper bound on a whole streamed completion
    #[serde(rename = "completion-timeout-ms")]
    pub completion_timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "groq".to_string(),
            model: "llama-3.3-70b-versatile".to_string(),
            api_key_env: None,
            base_url: None,
            max_tokens: 4096,
            temperature: 0.7,
            timeout_ms: 10_000,
            first_chunk_timeout_ms: 30_000,
            completion_timeout_ms: 120_000,
        }
    }
}

impl LlmConfig {
    /// Name of the environment variable holding the API key
    pub fn api_key_env(&self) -> &str {
        if let Some(env) = &self.api_key_env {
            return env;
        }
        match self.provider.as_str() {
            "openai" => "OPENAI_API_KEY",
            "anthropic" => "ANTHROPIC_API_KEY",
            _ => "GROQ_API_KEY",
        }
    }

    /// API base URL, without a trailing slash
    pub fn base_url(&self) -> &str {
        if let Some(url) = &self.base_url {
            return url.trim_end_matches('/');
        }
        match self.provider.as_str() {
            "openai" => "https://api.openai.com",
            "anthropic" => "https://api.anthropic.com",
            _ => "https://api.groq.com/openai",
        }
    }

    /// Read the API key from the configured environment variable
    pub fn api_key(&self) -> Result<String, LlmError> {
        let env = self.api_key_env();
        match std::env::var(env) {
            Ok(key) if !key.trim().is_empty() => Ok(key),
            _ => Err(LlmError::CredentialMissing(env.to_string())),
        }
    }

    /// Per-session model parameters and time bounds
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            model: self.model.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            first_chunk_timeout: Duration::from_millis(self.first_chunk_timeout_ms),
            completion_timeout: Duration::from_millis(self.completion_timeout_ms),
        }
    }
}

/// Project scan configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    #[serde(rename = "max-files")]
    pub max_files: usize,

    #[serde(rename = "max-file-bytes")]
    pub max_file_bytes: u64,

    #[serde(rename = "max-signatures")]
    pub max_signatures: usize,

    #[serde(rename = "max-signature-bytes")]
    pub max_signature_bytes: usize,

    #[serde(rename = "max-signatures-per-file")]
    pub max_signatures_per_file: usize,

    /// Directory names skipped during the walk (hidden dirs are always skipped)
    #[serde(rename = "ignore-dirs")]
    pub ignore_dirs: Vec<String>,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let limits = ScanLimits::default();
        Self {
            max_files: limits.max_files,
            max_file_bytes: limits.max_file_bytes,
            max_signatures: limits.max_signatures,
            max_signature_bytes: limits.max_signature_bytes,
            max_signatures_per_file: limits.max_signatures_per_file,
            ignore_dirs: DEFAULT_IGNORED_DIRS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ScanConfig {
    pub fn limits(&self) -> ScanLimits {
        ScanLimits {
            max_files: self.max_files,
            max_file_bytes: self.max_file_bytes,
            max_signatures: self.max_signatures,
            max_signature_bytes: self.max_signature_bytes,
            max_signatures_per_file: self.max_signatures_per_file,
        }
    }

    pub fn ignore_rules(&self) -> IgnoreRules {
        IgnoreRules::new(self.ignore_dirs.iter().cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert_eq!(config.llm.provider, "groq");
        assert_eq!(config.llm.model, "llama-3.3-70b-versatile");
        assert_eq!(config.scan.max_files, 500);
        assert!(config.log_level.is_none());
    }

    #[test]
    fn test_deserialize_config() {
        let yaml = r#"
llm:
  provider: anthropic
  model: claude-haiku
  api-key-env: MY_API_KEY
  base-url: https://api.example.com
  max-tokens: 1024
  temperature: 0.2
  completion-timeout-ms: 5000

scan:
  max-files: 50
  ignore-dirs: [generated]

log-level: debug
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.api_key_env(), "MY_API_KEY");
        assert_eq!(config.llm.base_url(), "https://api.example.com");
        assert_eq!(config.llm.max_tokens, 1024);
        assert_eq!(config.llm.completion_timeout_ms, 5000);
        assert_eq!(config.scan.max_files, 50);
        assert_eq!(config.scan.ignore_dirs, vec!["generated"]);
        assert_eq!(config.log_level.as_deref(), Some("debug"));
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
llm:
  model: llama-3.1-8b-instant
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.llm.model, "llama-3.1-8b-instant");
        assert_eq!(config.llm.provider, "groq");
        assert_eq!(config.llm.first_chunk_timeout_ms, 30_000);
        assert_eq!(config.scan.max_signatures, 400);
        assert!(config.scan.ignore_dirs.contains(&"node_modules".to_string()));
    }

    #[test]
    fn test_scan_config_to_limits_and_rules() {
        let scan = ScanConfig {
            max_signature_bytes: 10,
            ignore_dirs: vec!["gen".to_string()],
            ..ScanConfig::default()
        };
        assert_eq!(scan.limits().max_signature_bytes, 10);
        assert!(scan.ignore_rules().skips_dir("gen"));
        assert!(!scan.ignore_rules().skips_dir("node_modules"));
    }

    #[test]
    fn test_session_options_from_llm_config() {
        let opts = LlmConfig::default().session_options();
        assert_eq!(opts.first_chunk_timeout, Duration::from_secs(30));
        assert_eq!(opts.completion_timeout, Duration::from_secs(120));
        assert_eq!(opts.max_tokens, 4096);
    }

    #[test]
    fn test_provider_defaults() {
        let groq = LlmConfig::default();
        assert_eq!(groq.api_key_env(), "GROQ_API_KEY");
        assert_eq!(groq.base_url(), "https://api.groq.com/openai");

        let anthropic = LlmConfig {
            provider: "anthropic".to_string(),
            ..LlmConfig::default()
        };
        assert_eq!(anthropic.api_key_env(), "ANTHROPIC_API_KEY");
        assert_eq!(anthropic.base_url(), "https://api.anthropic.com");

        let custom = LlmConfig {
            base_url: Some("http://localhost:8080/".to_string()),
            ..LlmConfig::default()
        };
        assert_eq!(custom.base_url(), "http://localhost:8080");
    }

    #[test]
    #[serial]
    fn test_api_key_missing() {
        let config = LlmConfig {
            api_key_env: Some("MAGIC_PROMPT_TEST_MISSING_KEY".to_string()),
            ..LlmConfig::default()
        };
        unsafe { std::env::remove_var("MAGIC_PROMPT_TEST_MISSING_KEY") };
        assert!(matches!(config.api_key(), Err(LlmError::CredentialMissing(_))));
    }

    #[test]
    #[serial]
    fn test_api_key_present() {
        let config = LlmConfig {
            api_key_env: Some("MAGIC_PROMPT_TEST_PRESENT_KEY".to_string()),
            ..LlmConfig::default()
        };
        unsafe { std::env::set_var("MAGIC_PROMPT_TEST_PRESENT_KEY", "gsk_test") };
        assert_eq!(config.api_key().unwrap(), "gsk_test");
        unsafe { std::env::remove_var("MAGIC_PROMPT_TEST_PRESENT_KEY") };
    }
}
