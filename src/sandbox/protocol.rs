//! Host ⇄ worker wire protocol
//!
//! The host and the isolated worker communicate exclusively through these
//! serializable envelopes. The worker reports either a batched array of
//! log records or a control object (readiness, completion); the host sends
//! a single execute request per run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::ExecutionStrategy;

/// Kind of a captured output record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Log,
    Warning,
    Error,
    Info,
    Success,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Log => write!(f, "log"),
            RecordKind::Warning => write!(f, "warning"),
            RecordKind::Error => write!(f, "error"),
            RecordKind::Info => write!(f, "info"),
            RecordKind::Success => write!(f, "success"),
        }
    }
}

/// One observed output or error event from executed code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// Record kind
    #[serde(rename = "type")]
    pub kind: RecordKind,
    /// Captured message text
    pub message: String,
    /// Stack trace, for error records that carry one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    /// When the record was captured
    #[serde(default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl LogRecord {
    /// Create a record of the given kind
    pub fn new(kind: RecordKind, message: impl Into<String>) -> Self {
        LogRecord {
            kind,
            message: message.into(),
            stack: None,
            timestamp: Utc::now(),
        }
    }

    /// Create a plain log record
    pub fn log(message: impl Into<String>) -> Self {
        Self::new(RecordKind::Log, message)
    }

    /// Create a warning record
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(RecordKind::Warning, message)
    }

    /// Create an error record
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(RecordKind::Error, message)
    }

    /// Create an error record with a stack trace
    pub fn error_with_stack(message: impl Into<String>, stack: impl Into<String>) -> Self {
        LogRecord {
            stack: Some(stack.into()),
            ..Self::new(RecordKind::Error, message)
        }
    }

    /// Create an informational record
    pub fn info(message: impl Into<String>) -> Self {
        Self::new(RecordKind::Info, message)
    }

    /// Create a success record
    pub fn success(message: impl Into<String>) -> Self {
        Self::new(RecordKind::Success, message)
    }

    /// Whether this record reports an error
    pub fn is_error(&self) -> bool {
        self.kind == RecordKind::Error
    }
}

/// Host → worker: one run of user code
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// The code to execute
    pub code: String,
    /// Invocation strategy (JS flavors only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<ExecutionStrategy>,
    /// Libraries to load before executing (Python only)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub libraries: Vec<String>,
}

impl ExecuteRequest {
    /// Create a request with no strategy or libraries
    pub fn new(code: impl Into<String>) -> Self {
        ExecuteRequest {
            code: code.into(),
            strategy: None,
            libraries: Vec::new(),
        }
    }

    /// Set the invocation strategy
    pub fn with_strategy(mut self, strategy: ExecutionStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Set the library list
    pub fn with_libraries(mut self, libraries: Vec<String>) -> Self {
        self.libraries = libraries;
        self
    }
}

/// Worker → host control object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlMessage {
    /// Generic readiness (HTML flavor)
    Ready,
    /// Python worker listening, interpreter resolved
    PythonReady,
    /// JS worker listening
    JsReady,
    /// Terminal signal of a run; always the last message of that run
    ExecutionComplete { success: bool },
}

impl ControlMessage {
    /// Whether this is one of the readiness variants
    pub fn is_ready(&self) -> bool {
        matches!(
            self,
            ControlMessage::Ready | ControlMessage::PythonReady | ControlMessage::JsReady
        )
    }
}

/// Worker → host: a batched record flush or a control object
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WorkerMessage {
    /// Batched flush of captured records, FIFO within one run
    Logs(Vec<LogRecord>),
    /// Readiness or completion control object
    Control(ControlMessage),
}
