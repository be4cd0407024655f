//! Configuration Management
//!
//! Unified configuration system with hierarchical resolution:
//! 1. Built-in defaults
//! 2. Global config (~/.config/codetutor/config.toml)
//! 3. Project config (.codetutor/config.toml)
//! 4. Environment variables (CODETUTOR_*)
//! 5. Legacy overrides (USE_CACHE, CACHE_FILE, LOG_DIR)
//!
//! The loaded [`Config`] is an explicit value: construct it once at process
//! start and hand it to the components that need it.

mod env;
mod loader;
mod types;

pub use env::{EnvLookup, ProcessEnv};
pub use loader::ConfigLoader;
pub use types::*;
