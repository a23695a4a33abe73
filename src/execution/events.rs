//! Execution events and their delivery to registered handlers

use crate::core::{BatchStatus, ErrorKind, ItemPhase};
use std::sync::Arc;
use uuid::Uuid;

/// Events that can occur during a job run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    JobStarted {
        execution_id: Uuid,
        job_name: String,
        restart: bool,
    },
    StepStarted {
        step_name: String,
    },
    /// A step completed by an earlier execution of the same instance was not re-run
    StepAlreadyComplete {
        step_name: String,
    },
    ChunkCommitted {
        step_name: String,
        items: usize,
        write_count: u64,
    },
    ChunkRolledBack {
        step_name: String,
        items: usize,
        error: String,
    },
    ItemRetried {
        step_name: String,
        kind: ErrorKind,
        retry: u32,
    },
    ItemSkipped {
        step_name: String,
        phase: ItemPhase,
        kind: ErrorKind,
        error: String,
    },
    StepFinished {
        step_name: String,
        status: BatchStatus,
        summary: String,
        exit_description: String,
    },
    JobFinished {
        execution_id: Uuid,
        status: BatchStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(&ExecutionEvent) + Send + Sync>;

/// Ordered set of event handlers
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Vec<EventHandler>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub fn subscribe<F>(&mut self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        for handler in &self.handlers {
            handler(&event);
        }
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
