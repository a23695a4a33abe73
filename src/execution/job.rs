//! Job executor - runs a job's steps in order and owns the job lifecycle

use crate::{
    core::{BatchError, BatchStatus, JobExecution, JobParameters, StepContext},
    execution::{
        events::{EventBus, ExecutionEvent},
        step::{Step, StepExecutor},
    },
    persistence::JobRepository,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// A named, ordered sequence of steps
#[derive(Debug)]
pub struct Job {
    name: String,
    steps: Vec<Step>,
    required_parameters: Vec<String>,
}

impl Job {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            required_parameters: Vec::new(),
        }
    }

    /// Append a step; steps run in the order they were added
    pub fn step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Declare a parameter that every launch must provide
    pub fn require_parameter(mut self, name: impl Into<String>) -> Self {
        self.required_parameters.push(name.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn step_names(&self) -> Vec<&str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub fn required_parameters(&self) -> &[String] {
        &self.required_parameters
    }

    /// Check the job definition and the launch parameters
    pub fn validate(&self, parameters: &JobParameters) -> Result<(), BatchError> {
        if self.steps.is_empty() {
            return Err(BatchError::Configuration(format!(
                "job '{}' has no steps",
                self.name
            )));
        }

        let mut seen = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.name()) {
                return Err(BatchError::Configuration(format!(
                    "job '{}' has duplicate step name '{}'",
                    self.name,
                    step.name()
                )));
            }
        }

        let missing: Vec<&str> = self
            .required_parameters
            .iter()
            .filter(|name| !parameters.contains(name))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            return Err(BatchError::Configuration(format!(
                "missing required job parameters: {}",
                missing.join(", ")
            )));
        }

        Ok(())
    }
}

/// Launches jobs against a repository
pub struct JobExecutor {
    repository: Arc<dyn JobRepository>,
    events: EventBus,
    stop: Arc<AtomicBool>,
}

impl JobExecutor {
    pub fn new(repository: Arc<dyn JobRepository>) -> Self {
        Self {
            repository,
            events: EventBus::new(),
            stop: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&mut self, handler: F)
    where
        F: Fn(&ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    /// Flag that asks the running job to stop at the next chunk boundary
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Launch a job, or restart its instance if the last run did not complete.
    ///
    /// Returns `Err` only when the launch is refused or the repository fails;
    /// step failures are reported through the returned execution's status.
    pub async fn run(
        &self,
        job: &mut Job,
        parameters: JobParameters,
    ) -> Result<JobExecution, BatchError> {
        job.validate(&parameters)?;

        let completed_steps = self.check_instance(job, &parameters).await?;
        let restart = completed_steps.is_some();
        let completed_steps = completed_steps.unwrap_or_default();

        let mut execution = JobExecution::new(job.name.clone(), parameters);
        execution.start();
        self.save(&execution).await?;

        info!(
            job = %job.name,
            execution_id = %execution.id,
            restart,
            "Starting job execution"
        );
        self.events.emit(ExecutionEvent::JobStarted {
            execution_id: execution.id,
            job_name: job.name.clone(),
            restart,
        });

        let parameters = Arc::new(execution.parameters.clone());
        let step_executor = StepExecutor::new(self.repository.clone());

        for step in job.steps.iter_mut() {
            if completed_steps.contains(step.name()) {
                info!(step = step.name(), "Step already complete, not re-running");
                self.events.emit(ExecutionEvent::StepAlreadyComplete {
                    step_name: step.name().to_string(),
                });
                continue;
            }

            if self.stop.load(Ordering::SeqCst) {
                warn!(job = %job.name, "Stop requested, not starting step {}", step.name());
                execution.stop();
                break;
            }

            let ctx = StepContext::new(
                job.name.clone(),
                execution.id,
                step.name(),
                parameters.clone(),
                self.stop.clone(),
            );

            let step_execution = match step_executor.execute(step, &ctx, &self.events).await {
                Ok(step_execution) => step_execution,
                Err(e) => {
                    error!(job = %job.name, "Step {} could not be recorded: {}", step.name(), e);
                    execution.fail(format!("{}: {}", step.name(), e));
                    if let Err(save_err) = self.repository.save_job_execution(&execution).await {
                        warn!(
                            job = %job.name,
                            execution_id = %execution.id,
                            "Failed to record job failure: {:#}",
                            save_err
                        );
                    }
                    return Err(e);
                }
            };

            let status = step_execution.status;
            execution.step_executions.push(step_execution);
            if status != BatchStatus::Completed {
                if let Some(last) = execution.step_executions.last().cloned() {
                    execution.finish_with_step(&last);
                }
                break;
            }
        }

        if !execution.status.is_terminal() {
            execution.complete();
        }
        self.save(&execution).await?;

        match execution.status {
            BatchStatus::Completed => info!(
                job = %job.name,
                execution_id = %execution.id,
                "Job completed"
            ),
            status => warn!(
                job = %job.name,
                execution_id = %execution.id,
                %status,
                "Job finished without completing: {}",
                execution.exit_status.exit_description
            ),
        }
        self.events.emit(ExecutionEvent::JobFinished {
            execution_id: execution.id,
            status: execution.status,
        });

        Ok(execution)
    }

    /// Decide whether the instance may run.
    ///
    /// Returns `None` for a first run, or the names of steps already
    /// completed when the instance is being restarted.
    async fn check_instance(
        &self,
        job: &Job,
        parameters: &JobParameters,
    ) -> Result<Option<HashSet<String>>, BatchError> {
        let previous = self
            .repository
            .instance_executions(&job.name, &parameters.instance_key())
            .await
            .map_err(BatchError::Repository)?;

        let Some(latest) = previous.first() else {
            return Ok(None);
        };

        match latest.status {
            BatchStatus::Completed => Err(BatchError::JobInstanceAlreadyComplete {
                job: job.name.clone(),
            }),
            status if status.is_restartable() => {
                let completed: HashSet<String> = previous
                    .iter()
                    .flat_map(|e| e.step_executions.iter())
                    .filter(|s| s.status == BatchStatus::Completed)
                    .map(|s| s.step_name.clone())
                    .collect();
                debug!(
                    job = %job.name,
                    previous_executions = previous.len(),
                    "Restarting job instance, {} step(s) already complete",
                    completed.len()
                );
                Ok(Some(completed))
            }
            _ => Err(BatchError::JobExecutionAlreadyRunning {
                job: job.name.clone(),
                execution_id: latest.id,
            }),
        }
    }

    async fn save(&self, execution: &JobExecution) -> Result<(), BatchError> {
        self.repository
            .save_job_execution(execution)
            .await
            .map_err(BatchError::Repository)
    }
}
