//! Token Counting
//!
//! Budgets are expressed in tokens of the target model's tokenizer.
//!
//! ## Strategy
//! - BPE counting via `tiktoken-rs` for the configured model (exact)
//! - Heuristic estimators for callers without a BPE model (approximate)
//!
//! Both are deterministic: identical text and model always give the same count.

use std::sync::Arc;

use tiktoken_rs::CoreBPE;
use tracing::debug;

use crate::types::{Result, TutorError};

/// Heuristic token estimation method
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenEstimator {
    /// Simple character-based estimation (4 chars = 1 token)
    CharBased,
    /// Code-aware estimation (accounts for syntax, keywords)
    CodeAware,
}

#[derive(Clone)]
enum Backend {
    Bpe { model: String, bpe: Arc<CoreBPE> },
    Heuristic(TokenEstimator),
}

/// Token counter for context budgeting
#[derive(Clone)]
pub struct TokenCounter {
    backend: Backend,
}

impl std::fmt::Debug for TokenCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.backend {
            Backend::Bpe { model, .. } => f.debug_tuple("TokenCounter::Bpe").field(model).finish(),
            Backend::Heuristic(estimator) => f
                .debug_tuple("TokenCounter::Heuristic")
                .field(estimator)
                .finish(),
        }
    }
}

impl TokenCounter {
    /// BPE tokenizer of `model` (e.g. "gpt-4", "gpt-4o")
    pub fn for_model(model: &str) -> Result<Self> {
        let bpe = tiktoken_rs::get_bpe_from_model(model).map_err(|e| {
            TutorError::Tokenizer(format!("No tokenizer for model '{}': {}", model, e))
        })?;
        debug!("Loaded BPE tokenizer for model {}", model);
        Ok(Self {
            backend: Backend::Bpe {
                model: model.to_string(),
                bpe: Arc::new(bpe),
            },
        })
    }

    /// Offline estimator, no tokenizer tables required
    pub fn heuristic(estimator: TokenEstimator) -> Self {
        Self {
            backend: Backend::Heuristic(estimator),
        }
    }

    /// Model name for BPE counters
    pub fn model(&self) -> Option<&str> {
        match &self.backend {
            Backend::Bpe { model, .. } => Some(model),
            Backend::Heuristic(_) => None,
        }
    }

    /// Count tokens in `text`
    pub fn count(&self, text: &str) -> usize {
        match &self.backend {
            // Special-token text is counted as ordinary text, never rejected
            Backend::Bpe { bpe, .. } => bpe.encode_ordinary(text).len(),
            Backend::Heuristic(TokenEstimator::CharBased) => count_char_based(text),
            Backend::Heuristic(TokenEstimator::CodeAware) => count_code_aware(text),
        }
    }

    /// Check if content fits within a token budget
    pub fn fits_budget(&self, text: &str, budget: usize) -> bool {
        self.count(text) <= budget
    }
}

/// Simple character-based counting (4 chars = 1 token)
fn count_char_based(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// Code-aware counting
/// - Punctuation and operators are individual tokens
/// - Words are split by length
fn count_code_aware(text: &str) -> usize {
    if text.is_empty() {
        return 0;
    }

    let mut tokens = 0;
    let mut current_word = String::new();

    for ch in text.chars() {
        match ch {
            '(' | ')' | '{' | '}' | '[' | ']' | ';' | ':' | ',' | '.' | '+' | '-' | '*' | '/'
            | '=' | '<' | '>' | '!' | '&' | '|' | '@' | '#' | '$' | '%' | '^' | '~' | '?'
            | '\\' => {
                if !current_word.is_empty() {
                    tokens += estimate_word_tokens(&current_word);
                    current_word.clear();
                }
                tokens += 1;
            }
            ' ' | '\t' | '\n' | '\r' => {
                if !current_word.is_empty() {
                    tokens += estimate_word_tokens(&current_word);
                    current_word.clear();
                }
            }
            _ => current_word.push(ch),
        }
    }

    if !current_word.is_empty() {
        tokens += estimate_word_tokens(&current_word);
    }

    tokens.max(1)
}

fn estimate_word_tokens(word: &str) -> usize {
    match word.len() {
        0..=4 => 1,
        5..=8 => 2,
        len => len.div_ceil(4),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_char_based_counting() {
        let counter = TokenCounter::heuristic(TokenEstimator::CharBased);
        assert_eq!(counter.count("hello"), 2);
        assert_eq!(counter.count("hi"), 1);
        assert_eq!(counter.count("hello world"), 3);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_code_aware_counting() {
        let counter = TokenCounter::heuristic(TokenEstimator::CodeAware);

        let tokens = counter.count("fn main() {}");
        assert!(tokens > 0);
        assert!(tokens <= 10);

        let complex = r#"
            pub fn calculate(&self, value: i32) -> Result<i32, Error> {
                if value < 0 {
                    return Err(Error::Invalid);
                }
                Ok(value * 2)
            }
        "#;
        assert!(counter.count(complex) > tokens);
    }

    #[test]
    fn test_bpe_counting_is_deterministic() {
        let counter = TokenCounter::for_model("gpt-4").unwrap();
        assert_eq!(counter.model(), Some("gpt-4"));

        let text = "Hello, world! This is a test.";
        let first = counter.count(text);
        assert!(first > 0);
        assert!(first < 20);
        assert_eq!(counter.count(text), first);
        assert_eq!(counter.count(""), 0);
    }

    #[test]
    fn test_bpe_special_tokens_counted_as_text() {
        let counter = TokenCounter::for_model("gpt-4").unwrap();
        assert!(counter.count("before <|endoftext|> after") > 3);
    }

    #[test]
    fn test_unknown_model_is_tokenizer_error() {
        let err = TokenCounter::for_model("definitely-not-a-model").unwrap_err();
        assert!(matches!(err, TutorError::Tokenizer(_)));
    }

    #[test]
    fn test_fits_budget() {
        let counter = TokenCounter::heuristic(TokenEstimator::CharBased);
        assert!(counter.fits_budget("abcd", 1));
        assert!(!counter.fits_budget("abcde", 1));
    }
}
