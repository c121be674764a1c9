//! Log event types for queue and fragment logging.
//!
//! Provides structured log events with correlation IDs (queue_id,
//! fragment_id, semaphore_id) for debugging submissions after the fact.

use crate::types::{FragmentId, QueueId, SemaphoreId};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Log severity level.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Fine-grained debugging information.
    Trace,
    /// Debugging information.
    Debug,
    /// Informational messages.
    #[default]
    Info,
    /// Warning messages.
    Warn,
    /// Error messages.
    Error,
}

impl LogLevel {
    /// Parse a log level from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "trace" => Some(Self::Trace),
            "debug" => Some(Self::Debug),
            "info" => Some(Self::Info),
            "warn" | "warning" => Some(Self::Warn),
            "error" => Some(Self::Error),
            _ => None,
        }
    }

    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Category of log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    /// Queue submissions and drains.
    Queue,
    /// Fragment lifecycle (issued, retired, failed).
    Fragment,
    /// Semaphore signals and poisoning.
    Semaphore,
    /// Dispatch and transfer task execution.
    Dispatch,
    /// Block and event pool pressure.
    Pool,
    /// Device lifecycle and other internal events.
    System,
}

impl LogCategory {
    /// Get the string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queue => "queue",
            Self::Fragment => "fragment",
            Self::Semaphore => "semaphore",
            Self::Dispatch => "dispatch",
            Self::Pool => "pool",
            Self::System => "system",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A structured log event with correlation IDs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    /// Event ID, assigned by the collector.
    pub id: u64,
    /// Timestamp in nanoseconds since UNIX epoch.
    pub timestamp_ns: u64,
    /// Log severity level.
    pub level: LogLevel,
    /// Event category.
    pub category: LogCategory,
    /// Queue the event belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub queue_id: Option<QueueId>,
    /// Fragment the event belongs to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fragment_id: Option<FragmentId>,
    /// Semaphore the event concerns, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub semaphore_id: Option<SemaphoreId>,
    /// Human-readable message.
    pub message: String,
    /// Structured fields for additional context.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, serde_json::Value>,
}

impl LogEvent {
    /// Create a new log event with the current timestamp.
    pub fn new(level: LogLevel, category: LogCategory, message: impl Into<String>) -> Self {
        Self {
            id: 0,
            timestamp_ns: current_timestamp_ns(),
            level,
            category,
            queue_id: None,
            fragment_id: None,
            semaphore_id: None,
            message: message.into(),
            fields: HashMap::new(),
        }
    }

    /// Create a debug-level log event.
    pub fn debug(category: LogCategory, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Debug, category, message)
    }

    /// Create an info-level log event.
    pub fn info(category: LogCategory, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, category, message)
    }

    /// Create a warn-level log event.
    pub fn warn(category: LogCategory, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warn, category, message)
    }

    /// Create an error-level log event.
    pub fn error(category: LogCategory, message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, category, message)
    }

    /// Set the queue ID.
    pub fn with_queue_id(mut self, queue_id: QueueId) -> Self {
        self.queue_id = Some(queue_id);
        self
    }

    /// Set the fragment ID.
    pub fn with_fragment_id(mut self, fragment_id: FragmentId) -> Self {
        self.fragment_id = Some(fragment_id);
        self
    }

    /// Set the semaphore ID.
    pub fn with_semaphore_id(mut self, semaphore_id: SemaphoreId) -> Self {
        self.semaphore_id = Some(semaphore_id);
        self
    }

    /// Add a string field.
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields
            .insert(key.into(), serde_json::Value::String(value.into()));
        self
    }

    /// Add a numeric field.
    pub fn with_field_u64(mut self, key: impl Into<String>, value: u64) -> Self {
        self.fields
            .insert(key.into(), serde_json::Value::Number(value.into()));
        self
    }

    /// Format as a single log line.
    pub fn format_line(&self) -> String {
        let mut parts = vec![
            format!("{}ns", self.timestamp_ns),
            format!("[{}]", self.level.as_str().to_uppercase()),
            format!("[{}]", self.category),
        ];

        if let Some(queue_id) = self.queue_id {
            parts.push(format!("queue={}", queue_id.as_u32()));
        }
        if let Some(fragment_id) = self.fragment_id {
            parts.push(format!("fragment={}", fragment_id.as_u64()));
        }
        if let Some(semaphore_id) = self.semaphore_id {
            parts.push(format!("semaphore={}", semaphore_id.as_u64()));
        }

        parts.push(self.message.clone());

        if !self.fields.is_empty() {
            let mut fields: Vec<String> = self
                .fields
                .iter()
                .map(|(k, v)| format!("{}={}", k, v))
                .collect();
            fields.sort();
            parts.push(format!("{{{}}}", fields.join(", ")));
        }

        parts.join(" ")
    }
}

fn current_timestamp_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
