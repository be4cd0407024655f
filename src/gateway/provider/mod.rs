//! Provider Protocols
//!
//! Every provider kind is a closed enum case with the same two capabilities:
//! build a request envelope for a prompt, and parse a response body into
//! text or a routine [`LlmError`]. The kind of each configured provider is
//! decided once, when the [`ProviderRegistry`] is built.
//!
//! ## Modules
//!
//! - `gemini`: contents/parts shape, prompt-feedback block reasons
//! - `openai`: chat-completion shape (OpenAI and OpenRouter)
//! - `anthropic`: messages with typed content blocks

mod anthropic;
mod gemini;
mod openai;

use std::collections::BTreeMap;

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{EnvLookup, LlmConfig, ProviderEntry, ProviderOptions};
use crate::types::{ErrorCategory, ErrorClassifier, LlmError, Result, TutorError};

/// Placeholder replaced by the resolved model name in endpoint templates
const MODEL_PLACEHOLDER: &str = "{model}";

/// Longest raw body excerpt quoted in error messages
const MAX_ERROR_BODY_CHARS: usize = 500;

// =============================================================================
// Provider Kind
// =============================================================================

/// Request/response protocol of a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Google Gemini `generateContent` (contents → parts → text)
    Gemini,
    /// OpenAI chat completions (choices[0].message.content)
    OpenAi,
    /// Anthropic messages (typed content blocks)
    Anthropic,
    /// OpenRouter chat completions
    OpenRouter,
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProviderKind::Gemini => write!(f, "gemini"),
            ProviderKind::OpenAi => write!(f, "openai"),
            ProviderKind::Anthropic => write!(f, "anthropic"),
            ProviderKind::OpenRouter => write!(f, "openrouter"),
        }
    }
}

/// Outbound request ready to send
#[derive(Debug, Clone)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

impl ProviderKind {
    /// Infer the kind from a provider name prefix
    pub fn infer(name: &str) -> Option<Self> {
        let lower = name.to_lowercase();
        if lower.starts_with("openrouter") {
            Some(ProviderKind::OpenRouter)
        } else if lower.starts_with("gemini") || lower.starts_with("google") {
            Some(ProviderKind::Gemini)
        } else if lower.starts_with("openai") {
            Some(ProviderKind::OpenAi)
        } else if lower.starts_with("anthropic") || lower.starts_with("claude") {
            Some(ProviderKind::Anthropic)
        } else {
            None
        }
    }

    /// Model name as sent on the wire
    pub fn wire_model<'a>(&self, model: &'a str) -> &'a str {
        match self {
            ProviderKind::OpenRouter => model.strip_prefix("openrouter/").unwrap_or(model),
            _ => model,
        }
    }

    /// Build the provider-specific request envelope
    pub fn build_request(
        &self,
        url: String,
        model: &str,
        prompt: &str,
        options: &ProviderOptions,
        api_key: &SecretString,
    ) -> PreparedRequest {
        let key = api_key.expose_secret();
        match self {
            ProviderKind::Gemini => PreparedRequest {
                url,
                headers: vec![("x-goog-api-key", key.to_string())],
                body: gemini::request_body(prompt, options),
            },
            ProviderKind::OpenAi | ProviderKind::OpenRouter => PreparedRequest {
                url,
                headers: vec![("Authorization", format!("Bearer {}", key))],
                body: openai::request_body(*self, self.wire_model(model), prompt, options),
            },
            ProviderKind::Anthropic => PreparedRequest {
                url,
                headers: vec![
                    ("x-api-key", key.to_string()),
                    (
                        "anthropic-version",
                        options
                            .api_version
                            .clone()
                            .unwrap_or_else(|| anthropic::DEFAULT_API_VERSION.to_string()),
                    ),
                ],
                body: anthropic::request_body(model, prompt, options),
            },
        }
    }

    /// Parse a response into generated text or a routine error
    pub fn parse_response(
        &self,
        provider: &str,
        status: u16,
        body: &str,
    ) -> std::result::Result<String, LlmError> {
        if !(200..300).contains(&status) {
            let detail = error_message(body).unwrap_or_else(|| excerpt(body));
            return Err(ErrorClassifier::classify_http_status(
                status,
                &format!("{} API error ({}): {}", provider, status, detail),
                provider,
            ));
        }

        let parsed = match self {
            ProviderKind::Gemini => gemini::parse_body(body),
            ProviderKind::OpenAi | ProviderKind::OpenRouter => openai::parse_body(body),
            ProviderKind::Anthropic => anthropic::parse_body(body),
        };
        parsed.map_err(|e| e.provider(provider))
    }
}

/// `error.message` (or a string `error`) from an error-shaped JSON body
fn error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    match error {
        Value::String(message) => Some(message.clone()),
        Value::Object(obj) => obj
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string),
        _ => None,
    }
}

fn excerpt(body: &str) -> String {
    if body.chars().count() <= MAX_ERROR_BODY_CHARS {
        body.to_string()
    } else {
        let cut: String = body.chars().take(MAX_ERROR_BODY_CHARS).collect();
        format!("{}...", cut)
    }
}

fn unparsable(kind: ProviderKind, err: serde_json::Error) -> LlmError {
    LlmError::new(
        ErrorCategory::ParseError,
        format!("Failed to parse {} response: {}", kind, err),
    )
}

// =============================================================================
// Provider Registry
// =============================================================================

/// A configured provider with its resolved kind
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    pub name: String,
    pub kind: ProviderKind,
    pub entry: ProviderEntry,
}

impl ProviderSpec {
    /// Endpoint template; a provider without one cannot be called
    pub fn endpoint_template(&self) -> Result<&str> {
        self.entry
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| {
                TutorError::Config(format!(
                    "Provider '{}' has no endpoint configured (llm.providers.{}.endpoint)",
                    self.name, self.name
                ))
            })
    }

    /// Endpoint URL for `model`
    pub fn endpoint_url(&self, model: &str) -> Result<String> {
        let template = self.endpoint_template()?;
        let url = template.replace(MODEL_PLACEHOLDER, self.kind.wire_model(model));
        url::Url::parse(&url).map_err(|e| {
            TutorError::Config(format!(
                "Invalid endpoint for provider '{}': {} ({})",
                self.name, url, e
            ))
        })?;
        Ok(url)
    }

    /// Model from the override variable, else the configured default
    pub fn resolve_model(&self, env: &dyn EnvLookup) -> String {
        self.entry
            .model_env
            .as_deref()
            .and_then(|name| env.var(name))
            .unwrap_or_else(|| self.entry.default_model.clone())
    }

    /// API key from the configured variable, else the literal config value
    pub fn resolve_api_key(&self, env: &dyn EnvLookup) -> std::result::Result<SecretString, LlmError> {
        self.entry
            .api_key_env
            .as_deref()
            .and_then(|name| env.var(name))
            .or_else(|| self.entry.api_key.clone().filter(|k| !k.is_empty()))
            .map(SecretString::from)
            .ok_or_else(|| {
                let hint = match &self.entry.api_key_env {
                    Some(var) => format!("set {}", var),
                    None => format!("set llm.providers.{}.api_key", self.name),
                };
                LlmError::with_provider(
                    ErrorCategory::Auth,
                    format!("Missing API key for provider '{}': {}", self.name, hint),
                    &self.name,
                )
            })
    }
}

/// Provider table with kinds resolved at load time
#[derive(Debug, Clone)]
pub struct ProviderRegistry {
    active: String,
    providers: BTreeMap<String, ProviderSpec>,
}

impl ProviderRegistry {
    /// Resolve every provider's kind; an undeterminable kind is a config error
    pub fn from_config(llm: &LlmConfig) -> Result<Self> {
        let mut providers = BTreeMap::new();
        for (name, entry) in &llm.providers {
            let kind = entry
                .kind
                .or_else(|| ProviderKind::infer(name))
                .ok_or_else(|| {
                    TutorError::Config(format!(
                        "Unsupported provider '{}': set llm.providers.{}.kind to one of gemini, openai, anthropic, openrouter",
                        name, name
                    ))
                })?;
            providers.insert(
                name.clone(),
                ProviderSpec {
                    name: name.clone(),
                    kind,
                    entry: entry.clone(),
                },
            );
        }

        Ok(Self {
            active: llm.active_provider.clone(),
            providers,
        })
    }

    /// Name of the active provider
    pub fn active_name(&self) -> &str {
        &self.active
    }

    /// The active provider entry; missing is a config error
    pub fn active(&self) -> Result<&ProviderSpec> {
        self.get(&self.active).ok_or_else(|| {
            TutorError::Config(format!(
                "Active provider '{}' is not configured. Available: {}",
                self.active,
                self.names().join(", ")
            ))
        })
    }

    pub fn get(&self, name: &str) -> Option<&ProviderSpec> {
        self.providers.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.providers.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_infer_kind_from_prefix() {
        assert_eq!(ProviderKind::infer("gemini"), Some(ProviderKind::Gemini));
        assert_eq!(ProviderKind::infer("openai-o1"), Some(ProviderKind::OpenAi));
        assert_eq!(ProviderKind::infer("Claude"), Some(ProviderKind::Anthropic));
        assert_eq!(
            ProviderKind::infer("openrouter-fast"),
            Some(ProviderKind::OpenRouter)
        );
        assert_eq!(ProviderKind::infer("mystery"), None);
    }

    #[test]
    fn test_registry_rejects_unknown_kind() {
        let mut llm = LlmConfig::default();
        llm.providers.insert(
            "mystery".to_string(),
            ProviderEntry {
                default_model: "m".to_string(),
                ..Default::default()
            },
        );
        let err = ProviderRegistry::from_config(&llm).unwrap_err();
        assert!(matches!(err, TutorError::Config(_)));
    }

    #[test]
    fn test_explicit_kind_wins() {
        let mut llm = LlmConfig::default();
        llm.providers.insert(
            "local".to_string(),
            ProviderEntry {
                kind: Some(ProviderKind::OpenAi),
                default_model: "llama3".to_string(),
                endpoint: Some("http://localhost:8080/v1/chat/completions".to_string()),
                ..Default::default()
            },
        );
        let registry = ProviderRegistry::from_config(&llm).unwrap();
        assert_eq!(registry.get("local").unwrap().kind, ProviderKind::OpenAi);
    }

    #[test]
    fn test_missing_active_provider_is_config_error() {
        let llm = LlmConfig {
            active_provider: "nowhere".to_string(),
            ..Default::default()
        };
        let registry = ProviderRegistry::from_config(&llm).unwrap();
        assert!(matches!(registry.active(), Err(TutorError::Config(_))));
    }

    #[test]
    fn test_model_and_key_resolution() {
        let registry = ProviderRegistry::from_config(&LlmConfig::default()).unwrap();
        let gemini = registry.get("gemini").unwrap();

        let empty = env(&[]);
        assert_eq!(gemini.resolve_model(&empty), "gemini-2.5-pro");
        let err = gemini.resolve_api_key(&empty).unwrap_err();
        assert_eq!(err.category, ErrorCategory::Auth);
        assert!(err.message.contains("GEMINI_API_KEY"));

        let vars = env(&[("GEMINI_MODEL", "gemini-2.0-flash"), ("GEMINI_API_KEY", "k")]);
        assert_eq!(gemini.resolve_model(&vars), "gemini-2.0-flash");
        assert_eq!(gemini.resolve_api_key(&vars).unwrap().expose_secret(), "k");
    }

    #[test]
    fn test_literal_api_key_fallback() {
        let spec = ProviderSpec {
            name: "openai".to_string(),
            kind: ProviderKind::OpenAi,
            entry: ProviderEntry {
                api_key_env: Some("OPENAI_API_KEY".to_string()),
                api_key: Some("literal".to_string()),
                ..Default::default()
            },
        };
        assert_eq!(
            spec.resolve_api_key(&env(&[])).unwrap().expose_secret(),
            "literal"
        );
    }

    #[test]
    fn test_endpoint_template_substitution() {
        let registry = ProviderRegistry::from_config(&LlmConfig::default()).unwrap();
        let url = registry
            .get("gemini")
            .unwrap()
            .endpoint_url("gemini-2.5-pro")
            .unwrap();
        assert_eq!(
            url,
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-2.5-pro:generateContent"
        );
    }

    #[test]
    fn test_missing_endpoint_is_config_error() {
        let spec = ProviderSpec {
            name: "anthropic-eu".to_string(),
            kind: ProviderKind::Anthropic,
            entry: ProviderEntry::default(),
        };
        assert!(matches!(spec.endpoint_url("m"), Err(TutorError::Config(_))));
    }

    #[test]
    fn test_openrouter_model_namespace() {
        assert_eq!(
            ProviderKind::OpenRouter.wire_model("openrouter/anthropic/claude-3.7-sonnet"),
            "anthropic/claude-3.7-sonnet"
        );
        assert_eq!(ProviderKind::OpenAi.wire_model("openrouter/x"), "openrouter/x");
    }

    #[test]
    fn test_non_success_status_is_routine_error() {
        let body = r#"{"error": {"message": "Incorrect API key provided", "type": "invalid_request_error"}}"#;
        let err = ProviderKind::OpenAi
            .parse_response("openai", 401, body)
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Auth);
        assert_eq!(err.status, Some(401));
        assert!(err.message.contains("Incorrect API key provided"));
    }

    #[test]
    fn test_non_json_error_body_is_excerpted() {
        let body = "x".repeat(2000);
        let err = ProviderKind::Gemini
            .parse_response("gemini", 502, &body)
            .unwrap_err();
        assert_eq!(err.category, ErrorCategory::Http);
        assert!(err.message.len() < 700);
    }

    #[test]
    fn test_build_request_headers() {
        let key = SecretString::from("secret-key".to_string());
        let options = ProviderOptions::default();

        let request = ProviderKind::Anthropic.build_request(
            "https://api.anthropic.com/v1/messages".to_string(),
            "claude",
            "hi",
            &options,
            &key,
        );
        assert!(request.headers.contains(&("x-api-key", "secret-key".to_string())));
        assert!(request
            .headers
            .contains(&("anthropic-version", "2023-06-01".to_string())));

        let request = ProviderKind::OpenRouter.build_request(
            "https://openrouter.ai/api/v1/chat/completions".to_string(),
            "openrouter/meta/llama",
            "hi",
            &options,
            &key,
        );
        assert!(request
            .headers
            .contains(&("Authorization", "Bearer secret-key".to_string())));
        assert_eq!(request.body["model"], "meta/llama");
    }
}
