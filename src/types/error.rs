//! Unified Error Type System
//!
//! Centralized error types for the crate. Two failure channels are kept
//! apart on purpose:
//!
//! - **Raised**: [`TutorError::Config`] and friends stop the current call.
//!   They signal a misconfigured deployment.
//! - **Routine**: [`TutorError::Llm`] wraps an [`LlmError`] for failures a
//!   long-running generation pipeline expects to see (transport, non-2xx,
//!   unparsable bodies, blocked prompts, missing API keys). The legacy
//!   string surface renders these as `"Error: <message>"`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// Error Categories
// =============================================================================

/// Categories of routine model-call failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing or rejected credentials
    Auth,
    /// Provider rate limiting
    RateLimit,
    /// Connection, DNS or TLS failure before a response arrived
    Network,
    /// Non-2xx response without a more specific classification
    Http,
    /// Response body did not have the expected shape
    ParseError,
    /// Provider refused the prompt (safety or policy block)
    Blocked,
    /// Provider returned an error-shaped body
    Provider,
    /// Anything else
    Unknown,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auth => write!(f, "AUTH"),
            Self::RateLimit => write!(f, "RATE_LIMIT"),
            Self::Network => write!(f, "NETWORK"),
            Self::Http => write!(f, "HTTP"),
            Self::ParseError => write!(f, "PARSE_ERROR"),
            Self::Blocked => write!(f, "BLOCKED"),
            Self::Provider => write!(f, "PROVIDER"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

impl ErrorCategory {
    /// Whether a caller could reasonably retry the same prompt later
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimit | Self::Network | Self::Http)
    }
}

// =============================================================================
// LLM Error
// =============================================================================

/// Routine model-call failure with category and provider context
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmError {
    /// Error category for caller policy decisions
    pub category: ErrorCategory,
    /// Human-readable detail
    pub message: String,
    /// Provider that produced the error
    pub provider: Option<String>,
    /// HTTP status, when the failure came from a response
    pub status: Option<u16>,
}

impl std::fmt::Display for LlmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(provider) = &self.provider {
            write!(f, "[{}:{}] {}", provider, self.category, self.message)
        } else {
            write!(f, "[{}] {}", self.category, self.message)
        }
    }
}

impl std::error::Error for LlmError {}

impl LlmError {
    /// Prefix of every rendered routine error on the legacy string surface
    pub const RENDER_PREFIX: &'static str = "Error: ";

    pub fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            category,
            message: message.into(),
            provider: None,
            status: None,
        }
    }

    /// Create error with provider context
    pub fn with_provider(
        category: ErrorCategory,
        message: impl Into<String>,
        provider: impl Into<String>,
    ) -> Self {
        Self {
            category,
            message: message.into(),
            provider: Some(provider.into()),
            status: None,
        }
    }

    /// Add provider context to existing error
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Attach the HTTP status that produced this error
    pub fn status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn is_retryable(&self) -> bool {
        self.category.is_retryable()
    }

    /// Render for callers that expect a plain string result
    pub fn render(&self) -> String {
        format!("{}{}", Self::RENDER_PREFIX, self.message)
    }

    /// Rebuild an error from its rendered form (used for cached errors)
    pub fn from_rendered(category: ErrorCategory, rendered: &str) -> Self {
        let message = rendered
            .strip_prefix(Self::RENDER_PREFIX)
            .unwrap_or(rendered);
        Self::new(category, message)
    }
}

// =============================================================================
// Error Classifier
// =============================================================================

/// Maps transport-level facts to error categories
pub struct ErrorClassifier;

impl ErrorClassifier {
    /// Classify an HTTP status code
    pub fn classify_http_status(status: u16, message: &str, provider: &str) -> LlmError {
        let category = match status {
            429 => ErrorCategory::RateLimit,
            401 | 403 => ErrorCategory::Auth,
            _ => ErrorCategory::Http,
        };
        LlmError::with_provider(category, message, provider).status(status)
    }

    /// Classify a reqwest transport failure
    pub fn classify_transport(err: &reqwest::Error, provider: &str) -> LlmError {
        let message = if err.is_connect() {
            format!("Failed to connect to {}: {}", provider, err)
        } else if err.is_timeout() {
            format!("Request to {} timed out: {}", provider, err)
        } else {
            format!("Request to {} failed: {}", provider, err)
        };
        LlmError::with_provider(ErrorCategory::Network, message, provider)
    }
}

// =============================================================================
// Application Error
// =============================================================================

#[derive(Debug, Error)]
pub enum TutorError {
    // -------------------------------------------------------------------------
    // System Errors (auto From impl)
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::ser::Error),

    // -------------------------------------------------------------------------
    // Raised Errors
    // -------------------------------------------------------------------------
    #[error("Config error: {0}")]
    Config(String),

    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    #[error("Cache error: {0}")]
    Cache(String),

    // -------------------------------------------------------------------------
    // Routine Errors
    // -------------------------------------------------------------------------
    #[error("LLM error: {0}")]
    Llm(LlmError),
}

impl From<LlmError> for TutorError {
    fn from(err: LlmError) -> Self {
        TutorError::Llm(err)
    }
}

pub type Result<T> = std::result::Result<T, TutorError>;

impl TutorError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Whether this error belongs to the routine channel
    pub fn is_routine(&self) -> bool {
        matches!(self, Self::Llm(_))
    }
}

/// Context extension trait for adding context to errors
pub trait ResultExt<T> {
    /// Add context to an error
    fn with_context<C: Into<String>>(self, context: C) -> Result<T>;

    /// Add context using a closure (lazy evaluation)
    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn with_context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| TutorError::Cache(format!("{}: {}", context.into(), e)))
    }

    fn with_context_fn<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| TutorError::Cache(format!("{}: {}", f().into(), e)))
    }
}

// =============================================================================
// Tests
// =============================================================================
