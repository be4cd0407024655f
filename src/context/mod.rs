//! Context Budgeter
//!
//! Selects and degrades file contents so their combined token cost fits a
//! fixed budget. Budget state lives for exactly one context build.

pub mod budget;
pub mod hierarchy;
pub mod tokenizer;

pub use budget::ContextBudget;
pub use hierarchy::{
    ContextEntry, EntryKind, HierarchicalContext, is_test_like, path_depth, summarize_file,
};
pub use tokenizer::{TokenCounter, TokenEstimator};

use crate::config::ContextConfig;
use crate::types::Result;

/// Build a context with a fresh budget of `max_tokens`
pub fn build_context<P, C>(
    counter: &TokenCounter,
    max_tokens: usize,
    files: &[(P, C)],
    max_files_per_level: usize,
) -> HierarchicalContext
where
    P: AsRef<str>,
    C: AsRef<str>,
{
    ContextBudget::new(counter.clone(), max_tokens)
        .create_hierarchical_context(files, max_files_per_level)
}

/// Build a context using the tokenizer model and limits from configuration
pub fn build_context_with_config<P, C>(
    config: &ContextConfig,
    files: &[(P, C)],
) -> Result<HierarchicalContext>
where
    P: AsRef<str>,
    C: AsRef<str>,
{
    let counter = TokenCounter::for_model(&config.tokenizer_model)?;
    Ok(build_context(
        &counter,
        config.max_tokens,
        files,
        config.max_files_per_level,
    ))
}
