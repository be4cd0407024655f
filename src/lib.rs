//! codetutor - Context Budgeting and Model Gateway for Codebase Tutorials
//!
//! Two building blocks for pipelines that turn a codebase into
//! LLM-generated tutorials:
//!
//! - **Context Budgeter**: assembles file contents into a context that fits
//!   a token budget, grouping by directory depth and degrading oversized
//!   files to summaries
//! - **Model Gateway**: sends a prompt to the configured provider (Gemini,
//!   OpenAI, Anthropic, OpenRouter) with a TTL'd, process-safe response cache
//!   and a daily call log
//!
//! ## Quick Start
//!
//! ```ignore
//! use codetutor::{ConfigLoader, ModelGateway, build_context_with_config};
//!
//! let config = ConfigLoader::load()?;
//! let context = build_context_with_config(&config.context, &files)?;
//! let gateway = ModelGateway::new(&config)?;
//! let answer = gateway
//!     .call_model(&format!("Explain this code:\n\n{}", context.render()))
//!     .await?;
//! ```
//!
//! ## Modules
//!
//! - [`context`]: token counting, budget, hierarchical context assembly
//! - [`gateway`]: provider protocols, response cache, call log
//! - [`config`]: layered configuration
//! - [`cli`]: command handlers for the `codetutor` binary

pub mod cli;
pub mod config;
pub mod constants;
pub mod context;
pub mod gateway;
pub mod types;

// =============================================================================
// Core Re-exports
// =============================================================================

// Configuration
pub use config::{CacheBackend, Config, ConfigLoader, EnvLookup, ProcessEnv};

// Error Types
pub use types::error::{ErrorCategory, LlmError, Result, ResultExt, TutorError};

// Context Budgeter
pub use context::{
    ContextBudget, ContextEntry, EntryKind, HierarchicalContext, TokenCounter, TokenEstimator,
    build_context, build_context_with_config,
};

// Model Gateway
pub use gateway::{CacheEntry, ModelGateway, ProviderKind, ResponseCache, SharedCache};
