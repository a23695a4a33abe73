//! Step context - what a running step can see of its job

use crate::core::parameters::JobParameters;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

/// Execution context handed to sources, sinks and tasklets
///
/// Contains the immutable launch parameters and the identity of the running
/// job and step.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Name of the owning job
    pub job_name: String,

    /// Owning job execution
    pub job_execution_id: Uuid,

    /// Name of the step being executed
    pub step_name: String,

    /// Launch parameters, shared by every step of the run
    pub parameters: Arc<JobParameters>,

    stop_requested: Arc<AtomicBool>,
}

impl StepContext {
    pub fn new(
        job_name: impl Into<String>,
        job_execution_id: Uuid,
        step_name: impl Into<String>,
        parameters: Arc<JobParameters>,
        stop_requested: Arc<AtomicBool>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            job_execution_id,
            step_name: step_name.into(),
            parameters,
            stop_requested,
        }
    }

    /// Standalone context for running a single step outside a job
    pub fn detached(step_name: impl Into<String>, parameters: JobParameters) -> Self {
        Self::new(
            "detached",
            Uuid::new_v4(),
            step_name,
            Arc::new(parameters),
            Arc::new(AtomicBool::new(false)),
        )
    }

    /// Whether a cooperative stop was requested for this run
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Required string parameter, as an error naming the parameter when absent
    pub fn require_string(&self, name: &str) -> anyhow::Result<&str> {
        self.parameters
            .get_string(name)
            .ok_or_else(|| anyhow::anyhow!("Missing string job parameter '{}'", name))
    }

    /// Required integer parameter
    pub fn require_int(&self, name: &str) -> anyhow::Result<i64> {
        self.parameters
            .get_int(name)
            .ok_or_else(|| anyhow::anyhow!("Missing int job parameter '{}'", name))
    }
}
