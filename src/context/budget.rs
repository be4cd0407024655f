//! Context Token Budget
//!
//! Tracks the token cost of every piece of content committed to a context,
//! keyed by a caller-chosen content key (`full_<path>`, `summary_<path>`).
//!
//! Invariants held after every operation:
//! - `current_tokens <= max_tokens`
//! - the sum of all per-key charges equals `current_tokens`

use std::collections::HashMap;

use tracing::debug;

use super::tokenizer::TokenCounter;

/// Token budget for one context build
#[derive(Debug, Clone)]
pub struct ContextBudget {
    max_tokens: usize,
    current_tokens: usize,
    content_tokens: HashMap<String, usize>,
    counter: TokenCounter,
}

impl ContextBudget {
    pub fn new(counter: TokenCounter, max_tokens: usize) -> Self {
        Self {
            max_tokens,
            current_tokens: 0,
            content_tokens: HashMap::new(),
            counter,
        }
    }

    /// Count tokens with the budget's tokenizer
    pub fn count_tokens(&self, text: &str) -> usize {
        self.counter.count(text)
    }

    /// Commit `content` under `key` if it fits.
    ///
    /// Returns `false` and leaves the budget untouched when it does not fit.
    /// Re-adding an existing key replaces its previous charge.
    pub fn add_content(&mut self, key: &str, content: &str) -> bool {
        let tokens = self.count_tokens(content);
        let previous = self.content_tokens.get(key).copied().unwrap_or(0);
        let committed = self.current_tokens - previous;

        if committed + tokens > self.max_tokens {
            debug!(
                "Cannot add '{}' ({} tokens), would exceed budget: {}/{}",
                key,
                tokens,
                committed + tokens,
                self.max_tokens
            );
            return false;
        }

        self.content_tokens.insert(key.to_string(), tokens);
        self.current_tokens = committed + tokens;
        debug!(
            "Added '{}' ({} tokens), total: {}/{}",
            key, tokens, self.current_tokens, self.max_tokens
        );
        true
    }

    /// Release the charge recorded for `key`; no-op when absent
    pub fn remove_content(&mut self, key: &str) {
        if let Some(tokens) = self.content_tokens.remove(key) {
            self.current_tokens -= tokens;
        }
    }

    /// Tokens still available
    pub fn get_available_tokens(&self) -> usize {
        self.max_tokens - self.current_tokens
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn current_tokens(&self) -> usize {
        self.current_tokens
    }

    /// Charge recorded for `key`, if committed
    pub fn tokens_for(&self, key: &str) -> Option<usize> {
        self.content_tokens.get(key).copied()
    }

    /// Number of committed keys
    pub fn len(&self) -> usize {
        self.content_tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.content_tokens.is_empty()
    }

    /// Get utilization percentage
    pub fn utilization(&self) -> f32 {
        if self.max_tokens == 0 {
            return 0.0;
        }
        self.current_tokens as f32 / self.max_tokens as f32 * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::tokenizer::TokenEstimator;
    use proptest::prelude::*;

    // 4 chars = 1 token keeps the arithmetic obvious
    fn budget(max_tokens: usize) -> ContextBudget {
        ContextBudget::new(TokenCounter::heuristic(TokenEstimator::CharBased), max_tokens)
    }

    #[test]
    fn test_add_and_remove() {
        let mut budget = budget(10);

        assert!(budget.add_content("full_a.rs", &"x".repeat(16)));
        assert_eq!(budget.current_tokens(), 4);
        assert_eq!(budget.tokens_for("full_a.rs"), Some(4));
        assert_eq!(budget.get_available_tokens(), 6);

        budget.remove_content("full_a.rs");
        assert_eq!(budget.current_tokens(), 0);
        assert!(budget.is_empty());

        // Removing an absent key is a no-op
        budget.remove_content("full_a.rs");
        assert_eq!(budget.current_tokens(), 0);
    }

    #[test]
    fn test_oversized_content_rejected_without_state_change() {
        let mut budget = budget(10);
        assert!(budget.add_content("full_small", "abcd"));

        assert!(!budget.add_content("full_huge", &"x".repeat(100)));
        assert_eq!(budget.current_tokens(), 1);
        assert_eq!(budget.tokens_for("full_huge"), None);
        assert_eq!(budget.len(), 1);
    }

    #[test]
    fn test_exact_fit_accepted() {
        let mut budget = budget(2);
        assert!(budget.add_content("full_a", "abcdefgh"));
        assert_eq!(budget.get_available_tokens(), 0);
        assert!(!budget.add_content("full_b", "a"));
    }

    #[test]
    fn test_readd_same_key_replaces_charge() {
        let mut budget = budget(10);
        assert!(budget.add_content("full_a", &"x".repeat(32)));
        assert_eq!(budget.current_tokens(), 8);

        // 8 + 8 would overflow, but the old charge is released first
        assert!(budget.add_content("full_a", &"y".repeat(32)));
        assert_eq!(budget.current_tokens(), 8);

        assert!(budget.add_content("full_a", "z"));
        assert_eq!(budget.current_tokens(), 1);
    }

    #[test]
    fn test_utilization() {
        let mut budget = budget(100);
        assert_eq!(budget.utilization(), 0.0);
        assert!(budget.add_content("k", &"x".repeat(100)));
        assert!((budget.utilization() - 25.0).abs() < f32::EPSILON);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Add(u8, usize),
        Remove(u8),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..6, 0usize..200).prop_map(|(k, len)| Op::Add(k, len)),
            (0u8..6).prop_map(Op::Remove),
        ]
    }

    proptest! {
        #[test]
        fn prop_invariants_hold_for_any_sequence(
            max_tokens in 0usize..80,
            ops in prop::collection::vec(op_strategy(), 0..40),
        ) {
            let mut budget = budget(max_tokens);
            let mut charges: HashMap<String, usize> = HashMap::new();

            for op in ops {
                match op {
                    Op::Add(k, len) => {
                        let key = format!("key_{}", k);
                        let before = budget.current_tokens();
                        let accepted = budget.add_content(&key, &"x".repeat(len));
                        if accepted {
                            charges.insert(key, len.div_ceil(4));
                        } else {
                            prop_assert_eq!(budget.current_tokens(), before);
                        }
                    }
                    Op::Remove(k) => {
                        let key = format!("key_{}", k);
                        budget.remove_content(&key);
                        charges.remove(&key);
                    }
                }

                prop_assert!(budget.current_tokens() <= budget.max_tokens());
                prop_assert_eq!(
                    budget.get_available_tokens(),
                    budget.max_tokens() - budget.current_tokens()
                );
                prop_assert_eq!(charges.values().sum::<usize>(), budget.current_tokens());
            }
        }

        #[test]
        fn prop_content_larger_than_budget_always_rejected(
            max_tokens in 0usize..50,
            extra in 1usize..50,
        ) {
            let mut budget = budget(max_tokens);
            let content = "x".repeat((max_tokens + extra) * 4);
            prop_assert!(!budget.add_content("full_big", &content));
            prop_assert_eq!(budget.current_tokens(), 0);
        }
    }
}
