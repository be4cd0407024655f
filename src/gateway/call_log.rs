//! Model Call Log
//!
//! Every gateway call emits a `PROMPT:` event before dispatch and a
//! `RESPONSE:` event after the outcome is known, on the dedicated
//! `codetutor::calls` tracing target. [`call_log_layer`] routes that target
//! into `<dir>/llm_calls_YYYYMMDD.log`, one file per local calendar day.
//!
//! Writing the log is best-effort: a file that cannot be opened drops the
//! line and never fails a call.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::Local;
use tracing::{Level, Subscriber, info};
use tracing_subscriber::Layer;
use tracing_subscriber::filter::{Filtered, Targets};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::fmt::format::{DefaultFields, Format};
use tracing_subscriber::registry::LookupSpan;

use crate::constants::logging::{CALL_LOG_PREFIX, CALL_LOG_TARGET};

/// Record the prompt of a call about to be made
pub fn log_prompt(prompt: &str) {
    info!(target: CALL_LOG_TARGET, "PROMPT: {}", prompt);
}

/// Record the final text of a call (response or rendered error)
pub fn log_response(response: &str) {
    info!(target: CALL_LOG_TARGET, "RESPONSE: {}", response);
}

/// Appends to the current day's call log file
#[derive(Debug, Clone)]
pub struct DailyFileWriter {
    dir: PathBuf,
}

impl DailyFileWriter {
    pub fn new(dir: impl AsRef<Path>) -> io::Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Log file for today's local date
    pub fn current_path(&self) -> PathBuf {
        self.dir.join(format!(
            "{}{}.log",
            CALL_LOG_PREFIX,
            Local::now().format("%Y%m%d")
        ))
    }
}

impl<'a> MakeWriter<'a> for DailyFileWriter {
    type Writer = Box<dyn Write + Send + 'a>;

    fn make_writer(&'a self) -> Self::Writer {
        match OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.current_path())
        {
            Ok(file) => Box::new(file),
            Err(_) => Box::new(io::sink()),
        }
    }
}

/// Formatting layer over [`DailyFileWriter`], filtered to the call-log target
pub type CallLogLayer<S> =
    Filtered<tracing_subscriber::fmt::Layer<S, DefaultFields, Format, DailyFileWriter>, Targets, S>;

/// Layer writing only call-log events to the daily file in `dir`
pub fn call_log_layer<S>(dir: impl AsRef<Path>) -> io::Result<CallLogLayer<S>>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let writer = DailyFileWriter::new(dir)?;
    Ok(tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .with_filter(Targets::new().with_target(CALL_LOG_TARGET, Level::INFO)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_file_name_uses_local_date() {
        let dir = TempDir::new().unwrap();
        let writer = DailyFileWriter::new(dir.path()).unwrap();
        let name = writer
            .current_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .to_string();

        assert!(name.starts_with("llm_calls_"));
        assert!(name.ends_with(".log"));
        assert_eq!(name.len(), "llm_calls_YYYYMMDD.log".len());
    }

    #[test]
    fn test_only_call_events_reach_the_file() {
        let dir = TempDir::new().unwrap();
        let log_dir = dir.path().join("logs");
        let subscriber =
            tracing_subscriber::registry().with(call_log_layer(&log_dir).unwrap());

        tracing::subscriber::with_default(subscriber, || {
            log_prompt("What does this crate do?");
            info!("unrelated event");
            log_response("It tutors.");
        });

        let path = DailyFileWriter::new(&log_dir).unwrap().current_path();
        let content = fs::read_to_string(path).unwrap();
        assert!(content.contains("PROMPT: What does this crate do?"));
        assert!(content.contains("RESPONSE: It tutors."));
        assert!(!content.contains("unrelated event"));
    }
}
