//! Global Constants
//!
//! Centralized constants for configuration and tuning.
//! All magic numbers should be defined here with documentation.

/// Context budgeter constants
pub mod context {
    /// Tokenizer model used when none is configured
    pub const DEFAULT_TOKENIZER_MODEL: &str = "gpt-4";

    /// Default token ceiling for one context build
    pub const DEFAULT_MAX_TOKENS: usize = 128_000;

    /// Default number of files kept per directory depth
    pub const DEFAULT_MAX_FILES_PER_LEVEL: usize = 50;

    /// Lines of content kept in a file summary preview
    pub const SUMMARY_PREVIEW_LINES: usize = 10;

    /// Budget key prefix for full file contents
    pub const FULL_KEY_PREFIX: &str = "full_";

    /// Budget key prefix for file summaries
    pub const SUMMARY_KEY_PREFIX: &str = "summary_";
}

/// Response cache constants
pub mod cache {
    /// Entries older than this are never hits and are pruned on write
    pub const TTL_SECS: u64 = 600;

    /// Default JSON cache file (relative to the working directory)
    pub const DEFAULT_CACHE_FILE: &str = "llm_cache.json";

    /// Default SQLite cache database (relative to the working directory)
    pub const DEFAULT_SQLITE_FILE: &str = "llm_cache.db";

    /// Suffix of the advisory lock file next to the JSON cache
    pub const LOCK_SUFFIX: &str = "lock";
}

/// Call log constants
pub mod logging {
    /// Default log directory (relative to the working directory)
    pub const DEFAULT_LOG_DIR: &str = "logs";

    /// Tracing target for per-call prompt/response lines
    pub const CALL_LOG_TARGET: &str = "codetutor::calls";

    /// File name prefix of the daily call log
    pub const CALL_LOG_PREFIX: &str = "llm_calls_";
}

/// Legacy environment overrides honored on top of `CODETUTOR_*`
pub mod env {
    /// Enables or disables the response cache ("true"/"false")
    pub const USE_CACHE: &str = "USE_CACHE";

    /// Overrides the JSON cache file path
    pub const CACHE_FILE: &str = "CACHE_FILE";

    /// Overrides the call log directory
    pub const LOG_DIR: &str = "LOG_DIR";
}
