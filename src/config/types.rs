//! Configuration Types
//!
//! All configuration structures with sensible defaults.
//! Supports global (~/.config/codetutor/) and project (.codetutor/) level configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

use super::env::EnvLookup;
use crate::constants::{cache as cache_constants, context as context_constants, env, logging};
use crate::gateway::provider::ProviderKind;
use crate::types::{Result, TutorError};

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration version
    pub version: String,

    /// Context budgeter settings
    pub context: ContextConfig,

    /// Model gateway provider table
    pub llm: LlmConfig,

    /// Response cache settings
    pub cache: CacheConfig,

    /// Call log settings
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            context: ContextConfig::default(),
            llm: LlmConfig::default(),
            cache: CacheConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    /// Validate configuration values are within acceptable ranges.
    /// Returns `TutorError::Config` on validation failure.
    pub fn validate(&self) -> Result<()> {
        if self.context.max_tokens == 0 {
            return Err(TutorError::config(
                "context.max_tokens must be greater than 0",
            ));
        }

        if self.context.max_files_per_level == 0 {
            return Err(TutorError::config(
                "context.max_files_per_level must be greater than 0",
            ));
        }

        if self.llm.active_provider.trim().is_empty() {
            return Err(TutorError::config("llm.active_provider must not be empty"));
        }

        if self.llm.timeout_secs == Some(0) {
            return Err(TutorError::config(
                "llm.timeout_secs must be greater than 0 when set",
            ));
        }

        for (name, entry) in &self.llm.providers {
            if let Some(temperature) = entry.options.temperature
                && !(0.0..=2.0).contains(&temperature)
            {
                return Err(TutorError::Config(format!(
                    "llm.providers.{}.options.temperature must be between 0.0 and 2.0, got {}",
                    name, temperature
                )));
            }
        }

        if self.cache.ttl_secs == 0 {
            return Err(TutorError::config("cache.ttl_secs must be greater than 0"));
        }

        Ok(())
    }

    /// Apply the legacy `USE_CACHE`, `CACHE_FILE` and `LOG_DIR` overrides.
    ///
    /// `USE_CACHE` enables the cache only when it equals "true" (any case);
    /// every other value disables it.
    pub fn apply_legacy_overrides(&mut self, lookup: &dyn EnvLookup) {
        if let Some(value) = lookup.var(env::USE_CACHE) {
            self.cache.enabled = value.trim().eq_ignore_ascii_case("true");
        }
        if let Some(path) = lookup.var(env::CACHE_FILE) {
            self.cache.path = Some(PathBuf::from(path));
        }
        if let Some(dir) = lookup.var(env::LOG_DIR) {
            self.logging.dir = PathBuf::from(dir);
        }
    }
}

// =============================================================================
// Context Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Model whose BPE tokenizer counts context tokens
    pub tokenizer_model: String,

    /// Token ceiling for one context build
    pub max_tokens: usize,

    /// Files kept per directory depth before budgeting
    pub max_files_per_level: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            tokenizer_model: context_constants::DEFAULT_TOKENIZER_MODEL.to_string(),
            max_tokens: context_constants::DEFAULT_MAX_TOKENS,
            max_files_per_level: context_constants::DEFAULT_MAX_FILES_PER_LEVEL,
        }
    }
}

// =============================================================================
// LLM Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider entry used for every call
    pub active_provider: String,

    /// Optional request timeout in seconds (unset = wait indefinitely)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Provider table keyed by provider name
    pub providers: BTreeMap<String, ProviderEntry>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        let mut providers = BTreeMap::new();

        providers.insert(
            "gemini".to_string(),
            ProviderEntry {
                kind: Some(ProviderKind::Gemini),
                api_key_env: Some("GEMINI_API_KEY".to_string()),
                model_env: Some("GEMINI_MODEL".to_string()),
                default_model: "gemini-2.5-pro".to_string(),
                endpoint: Some(
                    "https://generativelanguage.googleapis.com/v1beta/models/{model}:generateContent"
                        .to_string(),
                ),
                ..Default::default()
            },
        );

        providers.insert(
            "openai".to_string(),
            ProviderEntry {
                kind: Some(ProviderKind::OpenAi),
                api_key_env: Some("OPENAI_API_KEY".to_string()),
                model_env: Some("OPENAI_MODEL".to_string()),
                default_model: "o4-mini".to_string(),
                endpoint: Some("https://api.openai.com/v1/chat/completions".to_string()),
                options: ProviderOptions {
                    max_tokens: Some(4000),
                    reasoning_effort: Some("medium".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        providers.insert(
            "anthropic".to_string(),
            ProviderEntry {
                kind: Some(ProviderKind::Anthropic),
                api_key_env: Some("ANTHROPIC_API_KEY".to_string()),
                model_env: Some("ANTHROPIC_MODEL".to_string()),
                default_model: "claude-3-7-sonnet-20250219".to_string(),
                endpoint: Some("https://api.anthropic.com/v1/messages".to_string()),
                options: ProviderOptions {
                    max_tokens: Some(8192),
                    api_version: Some("2023-06-01".to_string()),
                    ..Default::default()
                },
                ..Default::default()
            },
        );

        providers.insert(
            "openrouter".to_string(),
            ProviderEntry {
                kind: Some(ProviderKind::OpenRouter),
                api_key_env: Some("OPENROUTER_API_KEY".to_string()),
                model_env: Some("OPENROUTER_MODEL".to_string()),
                default_model: "anthropic/claude-3.7-sonnet".to_string(),
                endpoint: Some("https://openrouter.ai/api/v1/chat/completions".to_string()),
                ..Default::default()
            },
        );

        Self {
            active_provider: "gemini".to_string(),
            timeout_secs: None,
            providers,
        }
    }
}

/// One provider entry in the `[llm.providers]` table
///
/// Note: a literal `api_key` is never serialized to output and is redacted
/// in debug output. Prefer `api_key_env`.
#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderEntry {
    /// Request/response protocol; inferred from the provider name when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ProviderKind>,

    /// Environment variable holding the API key
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Literal API key (used when the env var is unset)
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    /// Environment variable overriding the model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_env: Option<String>,

    /// Model used when the override variable is unset
    pub default_model: String,

    /// Endpoint URL; `{model}` is replaced with the resolved model name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,

    /// Provider-specific request options
    pub options: ProviderOptions,
}

impl std::fmt::Debug for ProviderEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderEntry")
            .field("kind", &self.kind)
            .field("api_key_env", &self.api_key_env)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model_env", &self.model_env)
            .field("default_model", &self.default_model)
            .field("endpoint", &self.endpoint)
            .field("options", &self.options)
            .finish()
    }
}

/// Provider-specific request options
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderOptions {
    /// Maximum output tokens
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// API version header (Anthropic)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    /// Sampling temperature
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Reasoning effort for o-series chat models
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<String>,
}

// =============================================================================
// Cache Configuration
// =============================================================================

/// Storage engine behind the response cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackend {
    /// JSON object file (prompt -> {timestamp, response}) with advisory locking
    #[default]
    Json,
    /// Embedded SQLite store with transactional upsert and prune
    Sqlite,
}

impl std::fmt::Display for CacheBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheBackend::Json => write!(f, "json"),
            CacheBackend::Sqlite => write!(f, "sqlite"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether `call_model` reads and writes the cache
    pub enabled: bool,

    /// Storage engine
    pub backend: CacheBackend,

    /// Cache file path; defaults to a backend-specific file name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Entry validity window in seconds
    pub ttl_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: CacheBackend::Json,
            path: None,
            ttl_secs: cache_constants::TTL_SECS,
        }
    }
}

impl CacheConfig {
    /// Configured path, else the backend's default file
    pub fn resolved_path(&self) -> PathBuf {
        match &self.path {
            Some(path) => path.clone(),
            None => PathBuf::from(match self.backend {
                CacheBackend::Json => cache_constants::DEFAULT_CACHE_FILE,
                CacheBackend::Sqlite => cache_constants::DEFAULT_SQLITE_FILE,
            }),
        }
    }
}

// =============================================================================
// Logging Configuration
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Directory for the daily call log
    pub dir: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(logging::DEFAULT_LOG_DIR),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.version, "1.0");
        assert_eq!(config.llm.active_provider, "gemini");
        assert_eq!(config.llm.providers.len(), 4);
        assert!(config.cache.enabled);
        assert_eq!(config.cache.ttl_secs, 600);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let mut config = Config::default();
        config.context.max_tokens = 0;
        assert!(matches!(config.validate(), Err(TutorError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_bad_temperature() {
        let mut config = Config::default();
        if let Some(entry) = config.llm.providers.get_mut("openai") {
            entry.options.temperature = Some(3.5);
        }
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_legacy_overrides() {
        let mut config = Config::default();
        let env: HashMap<String, String> = [
            ("USE_CACHE", "False"),
            ("CACHE_FILE", "/tmp/other_cache.json"),
            ("LOG_DIR", "/tmp/llm-logs"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        config.apply_legacy_overrides(&env);

        assert!(!config.cache.enabled);
        assert_eq!(config.cache.resolved_path(), PathBuf::from("/tmp/other_cache.json"));
        assert_eq!(config.logging.dir, PathBuf::from("/tmp/llm-logs"));
    }

    #[test]
    fn test_cache_path_default_follows_backend() {
        let mut cache = CacheConfig::default();
        assert_eq!(cache.resolved_path(), PathBuf::from("llm_cache.json"));

        cache.backend = CacheBackend::Sqlite;
        assert_eq!(cache.resolved_path(), PathBuf::from("llm_cache.db"));

        cache.path = Some(PathBuf::from("shared/cache.sqlite"));
        assert_eq!(cache.resolved_path(), PathBuf::from("shared/cache.sqlite"));
    }

    #[test]
    fn test_use_cache_only_true_enables() {
        let mut config = Config::default();
        config.cache.enabled = false;
        let env: HashMap<String, String> =
            HashMap::from([("USE_CACHE".to_string(), "TRUE".to_string())]);
        config.apply_legacy_overrides(&env);
        assert!(config.cache.enabled);

        let env: HashMap<String, String> =
            HashMap::from([("USE_CACHE".to_string(), "1".to_string())]);
        config.apply_legacy_overrides(&env);
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_provider_entry_debug_redacts_key() {
        let entry = ProviderEntry {
            api_key: Some("sk-secret".to_string()),
            ..Default::default()
        };
        let debug = format!("{:?}", entry);
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("sk-secret"));
    }

    #[test]
    fn test_api_key_never_serialized() {
        let entry = ProviderEntry {
            api_key: Some("sk-secret".to_string()),
            default_model: "m".to_string(),
            ..Default::default()
        };
        let json = serde_json::to_string(&entry).unwrap();
        assert!(!json.contains("sk-secret"));
    }
}
