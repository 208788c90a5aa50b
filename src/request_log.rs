//! Request-scoped diagnostic log.
//!
//! Every ingestion or query call gets its own [`RequestLog`], passed by
//! `&mut` through the orchestrator. Entries are kept in order for the
//! caller (e.g. to return alongside a response) and mirrored to `tracing`
//! with the request id attached. Nothing is shared between requests.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Serialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub level: LogLevel,
    /// Pipeline stage, e.g. `"extract"`, `"embed"`, `"store"`.
    pub stage: &'static str,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestLog {
    request_id: String,
    entries: Vec<LogEntry>,
}

impl Default for RequestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestLog {
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4().to_string(),
            entries: Vec::new(),
        }
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn entries(&self) -> &[LogEntry] {
        &self.entries
    }

    /// Entries recorded for one stage.
    pub fn stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a LogEntry> + 'a {
        self.entries.iter().filter(move |e| e.stage == stage)
    }

    pub fn info(&mut self, stage: &'static str, message: impl Into<String>) {
        self.push(LogLevel::Info, stage, message.into());
    }

    pub fn warn(&mut self, stage: &'static str, message: impl Into<String>) {
        self.push(LogLevel::Warn, stage, message.into());
    }

    pub fn error(&mut self, stage: &'static str, message: impl Into<String>) {
        self.push(LogLevel::Error, stage, message.into());
    }

    fn push(&mut self, level: LogLevel, stage: &'static str, message: String) {
        let request_id = self.request_id.as_str();
        match level {
            LogLevel::Info => tracing::info!(request_id, stage, "{}", message),
            LogLevel::Warn => tracing::warn!(request_id, stage, "{}", message),
            LogLevel::Error => tracing::error!(request_id, stage, "{}", message),
        }
        self.entries.push(LogEntry {
            at: Utc::now(),
            level,
            stage,
            message,
        });
    }
}
