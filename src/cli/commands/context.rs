//! Context Command
//!
//! Build a token-bounded hierarchical context from a JSON file list.
//!
//! Input is a JSON array of `{"path": ..., "content": ...}` objects; `-`
//! reads it from stdin.
//!
//! Usage:
//!   codetutor context --input files.json [--max-tokens N] [--format json]

use std::io::Read;
use std::path::Path;

use serde::Deserialize;

use crate::cli::ui::Output;
use crate::config::Config;
use crate::context::{self, EntryKind, HierarchicalContext, TokenCounter};
use crate::types::{Result, TutorError};

#[derive(Debug, Deserialize)]
struct InputFile {
    path: String,
    content: String,
}

pub fn run(
    config: &Config,
    input: &Path,
    max_tokens: Option<usize>,
    max_files_per_level: Option<usize>,
    format: &str,
) -> Result<()> {
    let files = read_input(input)?;
    let max_tokens = max_tokens.unwrap_or(config.context.max_tokens);
    let max_files_per_level = max_files_per_level.unwrap_or(config.context.max_files_per_level);

    let counter = TokenCounter::for_model(&config.context.tokenizer_model)?;
    let built = context::build_context(&counter, max_tokens, &files, max_files_per_level);

    if format == "json" {
        println!("{}", serde_json::to_string_pretty(&built)?);
    } else {
        print!("{}", built.render());
        print_summary(&built, &counter, max_tokens);
    }
    Ok(())
}

fn read_input(input: &Path) -> Result<Vec<(String, String)>> {
    let raw = if input == Path::new("-") {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(input).map_err(|e| {
            TutorError::Config(format!("Cannot read {}: {}", input.display(), e))
        })?
    };

    let files: Vec<InputFile> = serde_json::from_str(&raw)?;
    Ok(files.into_iter().map(|f| (f.path, f.content)).collect())
}

fn print_summary(built: &HierarchicalContext, counter: &TokenCounter, max_tokens: usize) {
    let out = Output::new();
    out.section("Context");

    let summaries = built
        .entries()
        .filter(|e| e.kind == EntryKind::Summary)
        .count();
    let used: usize = built.entries().map(|e| counter.count(&e.content)).sum();

    out.info(&format!(
        "{} of {} files admitted ({} as summaries), {} dropped",
        built.entry_count(),
        built.total_files,
        summaries,
        built.dropped_files
    ));
    for (depth, entries) in &built.levels {
        out.field(&format!("depth {}", depth), format!("{} files", entries.len()));
    }
    out.info(&format!("~{} / {} tokens", used, max_tokens));
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_read_input() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(
            file.path(),
            r##"[{"path": "src/lib.rs", "content": "pub mod a;"}, {"path": "README.md", "content": "# hi"}]"##,
        )
        .unwrap();

        let files = read_input(file.path()).unwrap();
        assert_eq!(files.len(), 2);
        assert_eq!(files[0], ("src/lib.rs".to_string(), "pub mod a;".to_string()));
    }

    #[test]
    fn test_read_input_rejects_bad_shape() {
        let file = NamedTempFile::new().unwrap();
        std::fs::write(file.path(), r#"{"path": "a"}"#).unwrap();
        assert!(matches!(read_input(file.path()), Err(TutorError::Json(_))));
    }
}
