//! Error sinks for database failures.
//!
//! [`DailyFileLog`] writes one plain-text file per calendar day under
//! `<root>/logs/YYYY-MM-DD.txt`. The newest entry sits at the top of the file:
//!
//! ```text
//! Time : 14:02:11\r\n
//! no such table: t\r\n
//! Raw SQL : SELECT * FROM t\r\n
//! \r\n
//! Time : 09:15:40\r\n
//! ...
//! ```

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Local, NaiveDate, NaiveDateTime};
use thiserror::Error;
use tracing::Level;

/// Something that records database failures.
pub trait ErrorSink: Send + Sync {
    /// Record `message` with extra key/value context.
    fn record(&self, level: Level, message: &str, context: &[(&str, &str)]) -> anyhow::Result<()>;

    /// Whether this sink already turns records into `tracing` events.
    fn emits_tracing(&self) -> bool {
        false
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for Arc<S> {
    fn record(&self, level: Level, message: &str, context: &[(&str, &str)]) -> anyhow::Result<()> {
        (**self).record(level, message, context)
    }

    fn emits_tracing(&self) -> bool {
        (**self).emits_tracing()
    }
}

impl<S: ErrorSink + ?Sized> ErrorSink for Box<S> {
    fn record(&self, level: Level, message: &str, context: &[(&str, &str)]) -> anyhow::Result<()> {
        (**self).record(level, message, context)
    }

    fn emits_tracing(&self) -> bool {
        (**self).emits_tracing()
    }
}

#[derive(Error, Debug)]
pub enum LogError {
    #[error("failed to create log directory {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to open log file {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write log file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Daily plain-text exception log.
#[derive(Debug, Clone)]
pub struct DailyFileLog {
    dir: PathBuf,
}

impl DailyFileLog {
    /// Log into `<root>/logs`.
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self::with_dir(root.as_ref().join("logs"))
    }

    /// Log directly into `dir`.
    pub fn with_dir<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the log file for `date`.
    pub fn file_for(&self, date: NaiveDate) -> PathBuf {
        self.dir.join(format!("{}.txt", date.format("%Y-%m-%d")))
    }

    /// Write `message` stamped with the local time.
    pub fn write(&self, message: &str) -> Result<(), LogError> {
        self.write_at(message, Local::now().naive_local())
    }

    /// Write `message` stamped with `now` into that day's file.
    ///
    /// Prepending rewrites the whole day file, so each entry costs the size
    /// of the file so far.
    pub fn write_at(&self, message: &str, now: NaiveDateTime) -> Result<(), LogError> {
        self.ensure_dir()?;

        let path = self.file_for(now.date());
        let entry = format!("Time : {}\r\n{}\r\n", now.format("%H:%M:%S"), message);

        if path.exists() {
            let old = fs::read(&path).map_err(|source| LogError::Open {
                path: path.clone(),
                source,
            })?;
            let mut content = Vec::with_capacity(entry.len() + 2 + old.len());
            content.extend_from_slice(entry.as_bytes());
            content.extend_from_slice(b"\r\n");
            content.extend_from_slice(&old);
            fs::write(&path, content).map_err(|source| LogError::Write { path, source })
        } else {
            let mut file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(&path)
                .map_err(|source| LogError::Open {
                    path: path.clone(),
                    source,
                })?;
            file.write_all(entry.as_bytes())
                .map_err(|source| LogError::Write { path, source })
        }
    }

    fn ensure_dir(&self) -> Result<(), LogError> {
        if self.dir.is_dir() {
            return Ok(());
        }
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o777);
        }
        builder.create(&self.dir).map_err(|source| LogError::CreateDir {
            path: self.dir.clone(),
            source,
        })
    }
}

impl ErrorSink for DailyFileLog {
    fn record(&self, _level: Level, message: &str, context: &[(&str, &str)]) -> anyhow::Result<()> {
        self.write(&with_context(message, context))?;
        Ok(())
    }
}

/// Forwards failures to `tracing` events.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn record(&self, level: Level, message: &str, context: &[(&str, &str)]) -> anyhow::Result<()> {
        let context = context
            .iter()
            .map(|(k, v)| format!("{}={:?}", k, v))
            .collect::<Vec<_>>()
            .join(" ");
        match level {
            Level::ERROR => tracing::error!(%context, "{}", message),
            Level::WARN => tracing::warn!(%context, "{}", message),
            Level::INFO => tracing::info!(%context, "{}", message),
            Level::DEBUG => tracing::debug!(%context, "{}", message),
            _ => tracing::trace!(%context, "{}", message),
        }
        Ok(())
    }

    fn emits_tracing(&self) -> bool {
        true
    }
}

fn with_context(message: &str, context: &[(&str, &str)]) -> String {
    let mut text = message.to_string();
    for (key, value) in context {
        text.push_str(&format!("\r\n{} : {}", key, value));
    }
    text
}
