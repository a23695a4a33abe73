//! Step executor - runs one step and records its execution

use crate::{
    core::{BatchError, StepContext, StepExecution, Tasklet},
    execution::{
        chunk::ChunkStep,
        events::{EventBus, ExecutionEvent},
    },
    persistence::JobRepository,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{error, info};

/// How a step's work ended when it did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// All work done
    Completed,
    /// Stopped cooperatively at a chunk boundary
    Stopped,
}

/// The work a step performs.
///
/// Handlers that update `execution` as they go save it to `repository` at
/// each checkpoint, so a crashed run leaves its progress behind.
#[async_trait]
pub trait StepHandler: Send {
    async fn handle(
        &mut self,
        ctx: &StepContext,
        execution: &mut StepExecution,
        events: &EventBus,
        repository: &dyn JobRepository,
    ) -> Result<StepOutcome, BatchError>;
}

/// Runs a tasklet exactly once
pub struct TaskletStep<T> {
    tasklet: T,
}

impl<T: Tasklet> TaskletStep<T> {
    pub fn new(tasklet: T) -> Self {
        Self { tasklet }
    }
}

#[async_trait]
impl<T: Tasklet> StepHandler for TaskletStep<T> {
    async fn handle(
        &mut self,
        ctx: &StepContext,
        _execution: &mut StepExecution,
        _events: &EventBus,
        _repository: &dyn JobRepository,
    ) -> Result<StepOutcome, BatchError> {
        if ctx.is_stop_requested() {
            return Ok(StepOutcome::Stopped);
        }
        self.tasklet
            .execute(ctx)
            .await
            .map_err(BatchError::Tasklet)?;
        Ok(StepOutcome::Completed)
    }
}

/// A named step of a job
pub struct Step {
    name: String,
    handler: Box<dyn StepHandler>,
}

impl Step {
    /// A step with a custom handler
    pub fn new(name: impl Into<String>, handler: impl StepHandler + 'static) -> Self {
        Self {
            name: name.into(),
            handler: Box::new(handler),
        }
    }

    /// A single-action step
    pub fn tasklet(name: impl Into<String>, tasklet: impl Tasklet + 'static) -> Self {
        Self::new(name, TaskletStep::new(tasklet))
    }

    /// A chunk-oriented step
    pub fn chunk<I, O>(name: impl Into<String>, chunk: ChunkStep<I, O>) -> Self
    where
        I: Send + Sync + 'static,
        O: Send + Sync + 'static,
    {
        Self::new(name, chunk)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step").field("name", &self.name).finish()
    }
}

/// Executes single steps, persisting their execution records
pub struct StepExecutor {
    repository: Arc<dyn JobRepository>,
}

impl StepExecutor {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self { repository }
    }

    /// Execute a step and return its finalized execution record.
    ///
    /// Step failures are captured in the returned record; only repository
    /// failures surface as `Err`.
    pub async fn execute(
        &self,
        step: &mut Step,
        ctx: &StepContext,
        events: &EventBus,
    ) -> Result<StepExecution, BatchError> {
        let mut execution = StepExecution::new(step.name.clone(), ctx.job_execution_id);
        execution.start();
        self.repository
            .save_step_execution(&execution)
            .await
            .map_err(BatchError::Repository)?;

        info!("Executing step: {}", step.name);
        events.emit(ExecutionEvent::StepStarted {
            step_name: step.name.clone(),
        });

        match step
            .handler
            .handle(ctx, &mut execution, events, self.repository.as_ref())
            .await
        {
            Ok(StepOutcome::Completed) => {
                execution.complete();
                info!("Step {} completed: {}", step.name, execution.summary());
            }
            Ok(StepOutcome::Stopped) => {
                execution.stop();
                info!("Step {} stopped: {}", step.name, execution.summary());
            }
            Err(e) => {
                error!("Step {} failed: {}", step.name, e);
                execution.fail(e.to_string());
            }
        }

        self.repository
            .save_step_execution(&execution)
            .await
            .map_err(BatchError::Repository)?;

        events.emit(ExecutionEvent::StepFinished {
            step_name: step.name.clone(),
            status: execution.status,
            summary: execution.summary(),
            exit_description: execution.exit_status.exit_description.clone(),
        });

        Ok(execution)
    }
}
