//! Environment Lookup
//!
//! API keys, model overrides and the legacy cache/log overrides are read
//! through [`EnvLookup`] so tests can inject variables without touching the
//! process environment.

use std::collections::HashMap;

/// Source of environment-style variables
pub trait EnvLookup: Send + Sync {
    /// Value of `name`, or `None` when unset or empty
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads the real process environment
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnv;

impl EnvLookup for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

impl EnvLookup for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).filter(|v| !v.is_empty()).cloned()
    }
}
