//! Hierarchical Context Assembly
//!
//! Turns a flat list of `(path, content)` pairs into a token-bounded context
//! grouped by directory depth:
//!
//! 1. Group files by depth (number of path segments)
//! 2. Within a depth, non-test files first, then larger files first
//! 3. Keep at most `max_files_per_level` files per depth
//! 4. Admit each file in full, else as a summary, else drop it
//!
//! A path that appears more than once is admitted at most once.
//!
//! Shallower depths are processed first and get first claim on the budget.
//! A file that does not fit even as a summary is dropped silently; the
//! build never fails because of one oversized file.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::budget::ContextBudget;
use crate::constants::context::{FULL_KEY_PREFIX, SUMMARY_KEY_PREFIX, SUMMARY_PREVIEW_LINES};

/// How a file was admitted into the context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Full,
    Summary,
}

/// One admitted file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextEntry {
    pub path: String,
    pub kind: EntryKind,
    pub content: String,
}

/// Token-bounded, depth-grouped context
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HierarchicalContext {
    /// Depth -> admitted entries in priority order; empty depths are absent
    pub levels: BTreeMap<usize, Vec<ContextEntry>>,
    /// Number of input files considered
    pub total_files: usize,
    /// Files cut by the per-level cap, repeated paths, or files too large
    /// even as a summary
    pub dropped_files: usize,
}

impl HierarchicalContext {
    /// All admitted entries, shallowest depth first
    pub fn entries(&self) -> impl Iterator<Item = &ContextEntry> {
        self.levels.values().flatten()
    }

    pub fn entry_count(&self) -> usize {
        self.levels.values().map(Vec::len).sum()
    }

    /// Entry for `path`, if admitted
    pub fn find(&self, path: &str) -> Option<&ContextEntry> {
        self.entries().find(|e| e.path == path)
    }

    /// Serialize into prompt text
    pub fn render(&self) -> String {
        let mut out = String::new();
        for entry in self.entries() {
            match entry.kind {
                EntryKind::Full => {
                    out.push_str(&format!(
                        "## File: {}\n\n```\n{}\n```\n\n",
                        entry.path, entry.content
                    ));
                }
                EntryKind::Summary => {
                    out.push_str(&format!(
                        "## File (summary): {}\n\n{}\n\n",
                        entry.path, entry.content
                    ));
                }
            }
        }
        out
    }
}

impl ContextBudget {
    /// Build a hierarchical context from `files` within this budget
    pub fn create_hierarchical_context<P, C>(
        &mut self,
        files: &[(P, C)],
        max_files_per_level: usize,
    ) -> HierarchicalContext
    where
        P: AsRef<str>,
        C: AsRef<str>,
    {
        let mut by_depth: BTreeMap<usize, Vec<(&str, &str)>> = BTreeMap::new();
        for (path, content) in files {
            let path = path.as_ref();
            by_depth
                .entry(path_depth(path))
                .or_default()
                .push((path, content.as_ref()));
        }

        let mut context = HierarchicalContext {
            total_files: files.len(),
            ..Default::default()
        };

        for (depth, mut level_files) in by_depth {
            // sort_by_cached_key is stable: ties keep input order
            level_files.sort_by_cached_key(|(path, content)| {
                (is_test_like(path), std::cmp::Reverse(content.chars().count()))
            });

            if level_files.len() > max_files_per_level {
                context.dropped_files += level_files.len() - max_files_per_level;
                level_files.truncate(max_files_per_level);
            }

            let mut entries = Vec::new();
            for (path, content) in level_files {
                let full_key = format!("{}{}", FULL_KEY_PREFIX, path);
                let summary_key = format!("{}{}", SUMMARY_KEY_PREFIX, path);

                // A repeated path would replace the first copy's charge
                if self.tokens_for(&full_key).is_some() || self.tokens_for(&summary_key).is_some() {
                    debug!("Dropping {} (path already in context)", path);
                    context.dropped_files += 1;
                    continue;
                }

                if self.add_content(&full_key, content) {
                    entries.push(ContextEntry {
                        path: path.to_string(),
                        kind: EntryKind::Full,
                        content: content.to_string(),
                    });
                    continue;
                }

                let summary = summarize_file(path, content);
                if self.add_content(&summary_key, &summary) {
                    entries.push(ContextEntry {
                        path: path.to_string(),
                        kind: EntryKind::Summary,
                        content: summary,
                    });
                } else {
                    debug!("Dropping {} (does not fit even as a summary)", path);
                    context.dropped_files += 1;
                }
            }

            if !entries.is_empty() {
                context.levels.insert(depth, entries);
            }
        }

        debug!(
            "Context built: {} of {} files admitted, {} dropped, {}/{} tokens",
            context.entry_count(),
            context.total_files,
            context.dropped_files,
            self.current_tokens(),
            self.max_tokens()
        );

        context
    }
}

/// Number of segments of the normalized path (at least 1)
pub fn path_depth(path: &str) -> usize {
    let mut segments: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(segments.last(), Some(last) if *last != "..") {
                    segments.pop();
                } else {
                    segments.push(segment);
                }
            }
            _ => segments.push(segment),
        }
    }
    segments.len().max(1)
}

/// Paths containing "test" in any case sort after other files
pub fn is_test_like(path: &str) -> bool {
    path.to_lowercase().contains("test")
}

/// Path, byte size and the first lines of a file
pub fn summarize_file(path: &str, content: &str) -> String {
    let preview: Vec<&str> = content.lines().take(SUMMARY_PREVIEW_LINES).collect();
    format!(
        "File: {}\nSize: {} bytes\nPreview:\n{}\n...",
        path,
        content.len(),
        preview.join("\n")
    )
}
