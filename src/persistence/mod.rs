//! Persistence layer for job and step execution records

#[cfg(feature = "sqlite")]
pub mod store;

#[cfg(feature = "sqlite")]
pub use store::SqliteJobRepository;

use crate::core::{JobExecution, StepExecution};
use anyhow::Result;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

/// Durable store for execution records
///
/// Job executions are saved without their step executions; loading a job
/// execution attaches its step records in the order they were first saved.
#[async_trait::async_trait]
pub trait JobRepository: Send + Sync {
    /// Insert or update a job execution
    async fn save_job_execution(&self, execution: &JobExecution) -> Result<()>;

    /// Insert or update a step execution
    async fn save_step_execution(&self, execution: &StepExecution) -> Result<()>;

    /// Load a job execution by ID
    async fn load_job_execution(&self, execution_id: Uuid) -> Result<Option<JobExecution>>;

    /// All executions of one job instance, newest first
    async fn instance_executions(
        &self,
        job_name: &str,
        instance_key: &str,
    ) -> Result<Vec<JobExecution>>;

    /// Recent executions, newest first, optionally for one job only
    async fn list_job_executions(
        &self,
        job_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<JobExecution>>;

    /// All job names
    async fn list_jobs(&self) -> Result<Vec<String>>;
}

/// In-memory persistence (for testing or ephemeral use)
pub struct InMemoryPersistence {
    executions: RwLock<HashMap<Uuid, JobExecution>>,
    steps: RwLock<HashMap<Uuid, Vec<StepExecution>>>,
    order: RwLock<Vec<Uuid>>,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self {
            executions: RwLock::new(HashMap::new()),
            steps: RwLock::new(HashMap::new()),
            order: RwLock::new(Vec::new()),
        }
    }

    /// Step records saved for a job execution
    pub async fn step_executions(&self, job_execution_id: Uuid) -> Vec<StepExecution> {
        self.steps
            .read()
            .await
            .get(&job_execution_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn with_steps(&self, mut execution: JobExecution) -> JobExecution {
        execution.step_executions = self.step_executions(execution.id).await;
        execution
    }

    async fn newest_first<F>(&self, filter: F) -> Vec<JobExecution>
    where
        F: Fn(&JobExecution) -> bool,
    {
        let order = self.order.read().await;
        let execs = self.executions.read().await;
        order
            .iter()
            .rev()
            .filter_map(|id| execs.get(id))
            .filter(|e| filter(e))
            .cloned()
            .collect()
    }
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JobRepository for InMemoryPersistence {
    async fn save_job_execution(&self, execution: &JobExecution) -> Result<()> {
        let mut record = execution.clone();
        record.step_executions.clear();

        let is_new = self
            .executions
            .write()
            .await
            .insert(execution.id, record)
            .is_none();
        if is_new {
            self.order.write().await.push(execution.id);
        }

        Ok(())
    }

    async fn save_step_execution(&self, execution: &StepExecution) -> Result<()> {
        let mut steps = self.steps.write().await;
        let records = steps.entry(execution.job_execution_id).or_default();
        match records.iter_mut().find(|s| s.id == execution.id) {
            Some(existing) => *existing = execution.clone(),
            None => records.push(execution.clone()),
        }

        Ok(())
    }

    async fn load_job_execution(&self, execution_id: Uuid) -> Result<Option<JobExecution>> {
        let found = self.executions.read().await.get(&execution_id).cloned();
        match found {
            Some(execution) => Ok(Some(self.with_steps(execution).await)),
            None => Ok(None),
        }
    }

    async fn instance_executions(
        &self,
        job_name: &str,
        instance_key: &str,
    ) -> Result<Vec<JobExecution>> {
        let found = self
            .newest_first(|e| e.job_name == job_name && e.instance_key == instance_key)
            .await;
        let mut result = Vec::with_capacity(found.len());
        for execution in found {
            result.push(self.with_steps(execution).await);
        }
        Ok(result)
    }

    async fn list_job_executions(
        &self,
        job_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<JobExecution>> {
        let found = self
            .newest_first(|e| job_name.map_or(true, |name| e.job_name == name))
            .await;
        let mut result = Vec::new();
        for execution in found.into_iter().take(limit) {
            result.push(self.with_steps(execution).await);
        }
        Ok(result)
    }

    async fn list_jobs(&self) -> Result<Vec<String>> {
        let execs = self.executions.read().await;
        let mut names: Vec<String> = execs.values().map(|e| e.job_name.clone()).collect();
        names.sort();
        names.dedup();
        Ok(names)
    }
}
