//! Execution state models

use crate::core::parameters::JobParameters;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Status shared by job and step executions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    /// Execution record created, nothing has run yet
    Starting,
    /// Execution is running
    Started,
    /// Execution finished successfully
    Completed,
    /// Execution aborted on an error
    Failed,
    /// Execution was asked to stop at a chunk boundary
    Stopped,
}

impl BatchStatus {
    /// Check if the status is terminal
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BatchStatus::Completed | BatchStatus::Failed | BatchStatus::Stopped
        )
    }

    /// Whether an instance whose latest execution ended with this status may be restarted
    pub fn is_restartable(&self) -> bool {
        matches!(self, BatchStatus::Failed | BatchStatus::Stopped)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Starting => "STARTING",
            BatchStatus::Started => "STARTED",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::Failed => "FAILED",
            BatchStatus::Stopped => "STOPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "STARTING" => Some(BatchStatus::Starting),
            "STARTED" => Some(BatchStatus::Started),
            "COMPLETED" => Some(BatchStatus::Completed),
            "FAILED" => Some(BatchStatus::Failed),
            "STOPPED" => Some(BatchStatus::Stopped),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exit code reported alongside the status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExitCode {
    Unknown,
    Executing,
    Completed,
    Failed,
    Stopped,
}

impl ExitCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExitCode::Unknown => "UNKNOWN",
            ExitCode::Executing => "EXECUTING",
            ExitCode::Completed => "COMPLETED",
            ExitCode::Failed => "FAILED",
            ExitCode::Stopped => "STOPPED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "UNKNOWN" => Some(ExitCode::Unknown),
            "EXECUTING" => Some(ExitCode::Executing),
            "COMPLETED" => Some(ExitCode::Completed),
            "FAILED" => Some(ExitCode::Failed),
            "STOPPED" => Some(ExitCode::Stopped),
            _ => None,
        }
    }
}

/// Exit code plus a free-form description (the root cause on failure)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitStatus {
    pub exit_code: ExitCode,
    pub exit_description: String,
}

impl ExitStatus {
    pub fn new(exit_code: ExitCode) -> Self {
        Self {
            exit_code,
            exit_description: String::new(),
        }
    }

    pub fn executing() -> Self {
        Self::new(ExitCode::Executing)
    }

    pub fn completed() -> Self {
        Self::new(ExitCode::Completed)
    }

    pub fn failed(description: impl Into<String>) -> Self {
        Self {
            exit_code: ExitCode::Failed,
            exit_description: description.into(),
        }
    }

    pub fn stopped() -> Self {
        Self::new(ExitCode::Stopped)
    }
}

impl Default for ExitStatus {
    fn default() -> Self {
        Self::new(ExitCode::Unknown)
    }
}

/// Record of one step run within a job execution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepExecution {
    /// Unique step execution ID
    pub id: Uuid,

    /// Step name
    pub step_name: String,

    /// Owning job execution
    pub job_execution_id: Uuid,

    pub status: BatchStatus,
    pub exit_status: ExitStatus,

    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub read_skip_count: u64,
    pub process_skip_count: u64,
    pub retry_count: u64,
    pub commit_count: u64,
    pub rollback_count: u64,

    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl StepExecution {
    /// Create a step execution in the STARTING state
    pub fn new(step_name: impl Into<String>, job_execution_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_name: step_name.into(),
            job_execution_id,
            status: BatchStatus::Starting,
            exit_status: ExitStatus::executing(),
            read_count: 0,
            write_count: 0,
            filter_count: 0,
            read_skip_count: 0,
            process_skip_count: 0,
            retry_count: 0,
            commit_count: 0,
            rollback_count: 0,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    /// Total items skipped in any phase
    pub fn skip_count(&self) -> u64 {
        self.read_skip_count + self.process_skip_count
    }

    /// Mark step as running
    pub fn start(&mut self) {
        self.status = BatchStatus::Started;
        self.start_time = Utc::now();
    }

    /// Mark step as completed
    pub fn complete(&mut self) {
        self.finish(BatchStatus::Completed, ExitStatus::completed());
    }

    /// Mark step as failed with the root cause as exit description
    pub fn fail(&mut self, description: impl Into<String>) {
        self.finish(BatchStatus::Failed, ExitStatus::failed(description));
    }

    /// Mark step as stopped at a chunk boundary
    pub fn stop(&mut self) {
        self.finish(BatchStatus::Stopped, ExitStatus::stopped());
    }

    fn finish(&mut self, status: BatchStatus, exit_status: ExitStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.exit_status = exit_status;
        self.end_time = Some(Utc::now());
    }

    /// One-line counter summary for logs and console output
    pub fn summary(&self) -> String {
        format!(
            "read={} write={} filter={} skip={} retry={} commit={} rollback={}",
            self.read_count,
            self.write_count,
            self.filter_count,
            self.skip_count(),
            self.retry_count,
            self.commit_count,
            self.rollback_count
        )
    }
}

/// Record of one job run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobExecution {
    /// Unique execution ID
    pub id: Uuid,

    /// Job name
    pub job_name: String,

    /// Canonical form of the identifying parameters; together with the job
    /// name it identifies the job instance
    pub instance_key: String,

    /// Launch parameters
    pub parameters: JobParameters,

    pub status: BatchStatus,
    pub exit_status: ExitStatus,

    /// Step executions in the order they ran
    pub step_executions: Vec<StepExecution>,

    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,

    /// Root causes of failures, in order of occurrence
    pub failure_exceptions: Vec<String>,
}

impl JobExecution {
    /// Create a job execution in the STARTING state
    pub fn new(job_name: impl Into<String>, parameters: JobParameters) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_name: job_name.into(),
            instance_key: parameters.instance_key(),
            parameters,
            status: BatchStatus::Starting,
            exit_status: ExitStatus::default(),
            step_executions: Vec::new(),
            start_time: Utc::now(),
            end_time: None,
            failure_exceptions: Vec::new(),
        }
    }

    /// Mark job as running
    pub fn start(&mut self) {
        self.status = BatchStatus::Started;
        self.exit_status = ExitStatus::executing();
        self.start_time = Utc::now();
    }

    /// Mark job as completed
    pub fn complete(&mut self) {
        self.finish(BatchStatus::Completed, ExitStatus::completed());
    }

    /// Mark job as failed for a reason outside any step
    pub fn fail(&mut self, cause: impl Into<String>) {
        let cause = cause.into();
        self.add_failure(cause.clone());
        self.finish(BatchStatus::Failed, ExitStatus::failed(cause));
    }

    /// Mark job as stopped between steps
    pub fn stop(&mut self) {
        self.finish(BatchStatus::Stopped, ExitStatus::stopped());
    }

    /// Take the terminal status of a non-successful step
    pub fn finish_with_step(&mut self, step: &StepExecution) {
        if step.status == BatchStatus::Failed {
            self.add_failure(format!("{}: {}", step.step_name, step.exit_status.exit_description));
        }
        self.finish(step.status, step.exit_status.clone());
    }

    /// Record a failure cause
    pub fn add_failure(&mut self, cause: impl Into<String>) {
        self.failure_exceptions.push(cause.into());
    }

    fn finish(&mut self, status: BatchStatus, exit_status: ExitStatus) {
        if self.status.is_terminal() {
            return;
        }
        self.status = status;
        self.exit_status = exit_status;
        self.end_time = Some(Utc::now());
    }

    /// Get a step execution by step name
    pub fn step_execution(&self, step_name: &str) -> Option<&StepExecution> {
        self.step_executions.iter().find(|s| s.step_name == step_name)
    }

    /// The first step that did not complete, if any
    pub fn failed_step(&self) -> Option<&StepExecution> {
        self.step_executions
            .iter()
            .find(|s| s.status != BatchStatus::Completed)
    }
}
