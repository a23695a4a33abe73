//! SQLite-based job repository

use crate::core::{
    BatchStatus, ExitCode, ExitStatus, JobExecution, JobParameters, StepExecution,
};
use crate::persistence::JobRepository;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use uuid::Uuid;

/// Open a connection pool, creating the database file if needed.
///
/// In-memory databases get a single connection that is never recycled, so
/// every query sees the same database.
pub async fn connect(database_url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(database_url)
        .with_context(|| format!("Invalid database URL: {}", database_url))?
        .create_if_missing(true);

    let pool_options = if database_url.contains(":memory:") {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(4)
    };

    pool_options
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to connect to database {}", database_url))
}

/// Default database location under the user's local data directory
pub fn default_database_url() -> Result<String> {
    let data_dir = dirs::data_local_dir().unwrap_or_else(|| std::path::PathBuf::from("."));
    let db_dir = data_dir.join("billing-batch");
    std::fs::create_dir_all(&db_dir)
        .with_context(|| format!("Failed to create {}", db_dir.display()))?;

    Ok(format!("sqlite://{}", db_dir.join("batch.db").display()))
}

/// SQLite job repository
pub struct SqliteJobRepository {
    pool: SqlitePool,
}

const JOB_COLUMNS: &str = "id, job_name, instance_key, parameters, status, exit_code, \
     exit_description, start_time, end_time, failure_exceptions";

const STEP_COLUMNS: &str = "id, job_execution_id, step_name, status, exit_code, exit_description, \
     read_count, write_count, filter_count, read_skip_count, process_skip_count, retry_count, \
     commit_count, rollback_count, start_time, end_time";

impl SqliteJobRepository {
    /// Create a repository on a new connection pool
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = connect(database_url).await?;
        Self::with_pool(pool).await
    }

    /// Create a repository on an existing pool
    pub async fn with_pool(pool: SqlitePool) -> Result<Self> {
        let store = Self { pool };
        store.init().await?;
        Ok(store)
    }

    /// Initialize database schema
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS batch_job_execution (
                id TEXT PRIMARY KEY,
                job_name TEXT NOT NULL,
                instance_key TEXT NOT NULL,
                parameters TEXT NOT NULL,
                status TEXT NOT NULL,
                exit_code TEXT NOT NULL,
                exit_description TEXT NOT NULL DEFAULT '',
                start_time TEXT NOT NULL,
                end_time TEXT,
                failure_exceptions TEXT NOT NULL DEFAULT '[]'
            );

            CREATE TABLE IF NOT EXISTS batch_step_execution (
                id TEXT PRIMARY KEY,
                job_execution_id TEXT NOT NULL REFERENCES batch_job_execution(id),
                step_name TEXT NOT NULL,
                status TEXT NOT NULL,
                exit_code TEXT NOT NULL,
                exit_description TEXT NOT NULL DEFAULT '',
                read_count INTEGER NOT NULL DEFAULT 0,
                write_count INTEGER NOT NULL DEFAULT 0,
                filter_count INTEGER NOT NULL DEFAULT 0,
                read_skip_count INTEGER NOT NULL DEFAULT 0,
                process_skip_count INTEGER NOT NULL DEFAULT 0,
                retry_count INTEGER NOT NULL DEFAULT 0,
                commit_count INTEGER NOT NULL DEFAULT 0,
                rollback_count INTEGER NOT NULL DEFAULT 0,
                start_time TEXT NOT NULL,
                end_time TEXT
            );

            CREATE INDEX IF NOT EXISTS idx_job_instance ON batch_job_execution(job_name, instance_key);
            CREATE INDEX IF NOT EXISTS idx_job_start_time ON batch_job_execution(start_time);
            CREATE INDEX IF NOT EXISTS idx_step_job ON batch_step_execution(job_execution_id);
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to initialize batch schema")?;

        Ok(())
    }

    async fn load_steps(&self, job_execution_id: Uuid) -> Result<Vec<StepExecution>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM batch_step_execution WHERE job_execution_id = ?1 ORDER BY rowid ASC",
            STEP_COLUMNS
        ))
        .bind(job_execution_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to load step executions")?;

        rows.iter().map(step_from_row).collect()
    }

    async fn attach_steps(&self, rows: Vec<SqliteRow>) -> Result<Vec<JobExecution>> {
        let mut result = Vec::with_capacity(rows.len());
        for row in &rows {
            let mut execution = job_from_row(row)?;
            execution.step_executions = self.load_steps(execution.id).await?;
            result.push(execution);
        }
        Ok(result)
    }
}

fn parse_status(s: &str) -> Result<BatchStatus> {
    BatchStatus::parse(s).ok_or_else(|| anyhow::anyhow!("Unknown batch status '{}'", s))
}

fn parse_exit_code(s: &str) -> ExitCode {
    ExitCode::parse(s).unwrap_or(ExitCode::Unknown)
}

fn job_from_row(row: &SqliteRow) -> Result<JobExecution> {
    let parameters: JobParameters = serde_json::from_str(&row.try_get::<String, _>("parameters")?)
        .context("Corrupt job parameters")?;
    let failure_exceptions: Vec<String> =
        serde_json::from_str(&row.try_get::<String, _>("failure_exceptions")?)
            .context("Corrupt failure list")?;

    Ok(JobExecution {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        job_name: row.try_get("job_name")?,
        instance_key: row.try_get("instance_key")?,
        parameters,
        status: parse_status(&row.try_get::<String, _>("status")?)?,
        exit_status: ExitStatus {
            exit_code: parse_exit_code(&row.try_get::<String, _>("exit_code")?),
            exit_description: row.try_get("exit_description")?,
        },
        step_executions: Vec::new(),
        start_time: row.try_get::<DateTime<Utc>, _>("start_time")?,
        end_time: row.try_get::<Option<DateTime<Utc>>, _>("end_time")?,
        failure_exceptions,
    })
}

fn step_from_row(row: &SqliteRow) -> Result<StepExecution> {
    let count = |name: &str| -> Result<u64> { Ok(row.try_get::<i64, _>(name)?.max(0) as u64) };

    Ok(StepExecution {
        id: Uuid::parse_str(&row.try_get::<String, _>("id")?)?,
        step_name: row.try_get("step_name")?,
        job_execution_id: Uuid::parse_str(&row.try_get::<String, _>("job_execution_id")?)?,
        status: parse_status(&row.try_get::<String, _>("status")?)?,
        exit_status: ExitStatus {
            exit_code: parse_exit_code(&row.try_get::<String, _>("exit_code")?),
            exit_description: row.try_get("exit_description")?,
        },
        read_count: count("read_count")?,
        write_count: count("write_count")?,
        filter_count: count("filter_count")?,
        read_skip_count: count("read_skip_count")?,
        process_skip_count: count("process_skip_count")?,
        retry_count: count("retry_count")?,
        commit_count: count("commit_count")?,
        rollback_count: count("rollback_count")?,
        start_time: row.try_get::<DateTime<Utc>, _>("start_time")?,
        end_time: row.try_get::<Option<DateTime<Utc>>, _>("end_time")?,
    })
}

#[async_trait::async_trait]
impl JobRepository for SqliteJobRepository {
    async fn save_job_execution(&self, execution: &JobExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_job_execution
            (id, job_name, instance_key, parameters, status, exit_code, exit_description,
             start_time, end_time, failure_exceptions)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                exit_code = excluded.exit_code,
                exit_description = excluded.exit_description,
                start_time = excluded.start_time,
                end_time = excluded.end_time,
                failure_exceptions = excluded.failure_exceptions
            "#,
        )
        .bind(execution.id.to_string())
        .bind(&execution.job_name)
        .bind(&execution.instance_key)
        .bind(serde_json::to_string(&execution.parameters)?)
        .bind(execution.status.as_str())
        .bind(execution.exit_status.exit_code.as_str())
        .bind(&execution.exit_status.exit_description)
        .bind(execution.start_time)
        .bind(execution.end_time)
        .bind(serde_json::to_string(&execution.failure_exceptions)?)
        .execute(&self.pool)
        .await
        .context("Failed to save job execution")?;

        Ok(())
    }

    async fn save_step_execution(&self, execution: &StepExecution) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO batch_step_execution
            (id, job_execution_id, step_name, status, exit_code, exit_description,
             read_count, write_count, filter_count, read_skip_count, process_skip_count,
             retry_count, commit_count, rollback_count, start_time, end_time)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                exit_code = excluded.exit_code,
                exit_description = excluded.exit_description,
                read_count = excluded.read_count,
                write_count = excluded.write_count,
                filter_count = excluded.filter_count,
                read_skip_count = excluded.read_skip_count,
                process_skip_count = excluded.process_skip_count,
                retry_count = excluded.retry_count,
                commit_count = excluded.commit_count,
                rollback_count = excluded.rollback_count,
                start_time = excluded.start_time,
                end_time = excluded.end_time
            "#,
        )
        .bind(execution.id.to_string())
        .bind(execution.job_execution_id.to_string())
        .bind(&execution.step_name)
        .bind(execution.status.as_str())
        .bind(execution.exit_status.exit_code.as_str())
        .bind(&execution.exit_status.exit_description)
        .bind(execution.read_count as i64)
        .bind(execution.write_count as i64)
        .bind(execution.filter_count as i64)
        .bind(execution.read_skip_count as i64)
        .bind(execution.process_skip_count as i64)
        .bind(execution.retry_count as i64)
        .bind(execution.commit_count as i64)
        .bind(execution.rollback_count as i64)
        .bind(execution.start_time)
        .bind(execution.end_time)
        .execute(&self.pool)
        .await
        .context("Failed to save step execution")?;

        Ok(())
    }

    async fn load_job_execution(&self, execution_id: Uuid) -> Result<Option<JobExecution>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM batch_job_execution WHERE id = ?1",
            JOB_COLUMNS
        ))
        .bind(execution_id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to load job execution")?;

        match row {
            Some(row) => Ok(self.attach_steps(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    async fn instance_executions(
        &self,
        job_name: &str,
        instance_key: &str,
    ) -> Result<Vec<JobExecution>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM batch_job_execution \
             WHERE job_name = ?1 AND instance_key = ?2 \
             ORDER BY start_time DESC, rowid DESC",
            JOB_COLUMNS
        ))
        .bind(job_name)
        .bind(instance_key)
        .fetch_all(&self.pool)
        .await
        .context("Failed to load job instance executions")?;

        self.attach_steps(rows).await
    }

    async fn list_job_executions(
        &self,
        job_name: Option<&str>,
        limit: usize,
    ) -> Result<Vec<JobExecution>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM batch_job_execution \
             WHERE ?1 IS NULL OR job_name = ?1 \
             ORDER BY start_time DESC, rowid DESC \
             LIMIT ?2",
            JOB_COLUMNS
        ))
        .bind(job_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list job executions")?;

        self.attach_steps(rows).await
    }

    async fn list_jobs(&self) -> Result<Vec<String>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT job_name
            FROM batch_job_execution
            ORDER BY job_name ASC
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list jobs")?;

        rows.iter()
            .map(|row| row.try_get("job_name").map_err(Into::into))
            .collect()
    }
}
