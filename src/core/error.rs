//! Error taxonomy for item processing and step/job execution

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Finite classification of item-level failures.
///
/// Skip and retry policies are keyed by this enumeration; the engine never
/// inspects error messages to decide what to do with a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// A source record could not be parsed
    Parse,
    /// An upstream dependency failed in a way that may succeed on another attempt
    TransientDependency,
    /// A sink failed to write a chunk
    SinkWrite,
    /// Invalid job or step configuration
    Configuration,
    /// Anything else
    Internal,
}

impl ErrorKind {
    /// Kinds that may never be registered as skippable or retryable
    pub fn is_always_fatal(&self) -> bool {
        matches!(self, ErrorKind::SinkWrite | ErrorKind::Configuration)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Parse => "parse",
            Self::TransientDependency => "transient_dependency",
            Self::SinkWrite => "sink_write",
            Self::Configuration => "configuration",
            Self::Internal => "internal",
        };
        f.write_str(s)
    }
}

/// A classified failure raised by an item source, transformer or sink
#[derive(Debug, Clone, Error)]
#[error("{kind} error: {message}")]
pub struct ItemError {
    /// Classification used by the skip and retry policies
    pub kind: ErrorKind,

    /// Human-readable description
    pub message: String,

    /// Raw input that caused the failure, if known (e.g. an unparseable line)
    pub input: Option<String>,
}

impl ItemError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            input: None,
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Parse, message)
    }

    pub fn transient(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientDependency, message)
    }

    pub fn sink_write(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::SinkWrite, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// Attach the raw input that triggered this error
    pub fn with_input(mut self, input: impl Into<String>) -> Self {
        self.input = Some(input.into());
        self
    }
}

/// Phase of the chunk loop in which an item failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemPhase {
    Read,
    Process,
}

impl fmt::Display for ItemPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Read => "read",
            Self::Process => "process",
        };
        f.write_str(s)
    }
}

/// Step- and job-level failures
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("skip limit of {limit} exceeded for {kind} errors during {phase}: {source}")]
    SkipLimitExceeded {
        kind: ErrorKind,
        limit: u32,
        phase: ItemPhase,
        #[source]
        source: ItemError,
    },

    #[error("non-skippable error during {phase}: {source}")]
    NonSkippable {
        phase: ItemPhase,
        #[source]
        source: ItemError,
    },

    #[error("chunk write failed, {items} items rolled back: {source}")]
    WriteFailed {
        items: usize,
        #[source]
        source: ItemError,
    },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("job instance {job} is already complete for these parameters")]
    JobInstanceAlreadyComplete { job: String },

    #[error("job instance {job} already has a running execution ({execution_id})")]
    JobExecutionAlreadyRunning { job: String, execution_id: uuid::Uuid },

    #[error("{0:#}")]
    Tasklet(anyhow::Error),

    #[error("item stream error: {0:#}")]
    Stream(anyhow::Error),

    #[error("repository error: {0:#}")]
    Repository(anyhow::Error),
}

impl BatchError {
    /// True for errors raised before any step was started
    pub fn is_launch_error(&self) -> bool {
        matches!(
            self,
            BatchError::Configuration(_)
                | BatchError::JobInstanceAlreadyComplete { .. }
                | BatchError::JobExecutionAlreadyRunning { .. }
        )
    }
}
