use anyhow::{Context, Result};
use billing_batch::billing::{BillingJobBuilder, JobConfig, JOB_NAME};
use billing_batch::cli::commands::{HistoryCommand, RunCommand, ShowCommand, ValidateCommand};
use billing_batch::cli::output::*;
use billing_batch::cli::{Cli, Command};
use billing_batch::core::{BatchStatus, JobExecution};
use billing_batch::execution::JobExecutor;
use billing_batch::persistence::store::{connect, default_database_url};
use billing_batch::persistence::{InMemoryPersistence, JobRepository, SqliteJobRepository};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, warn, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging; RUST_LOG wins over --verbose
    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.as_str().to_lowercase()));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    match &cli.command {
        Command::Run(cmd) => run_job(cmd).await?,
        Command::History(cmd) => show_history(cmd).await?,
        Command::Show(cmd) => show_execution(cmd).await?,
        Command::Validate(cmd) => validate_config(cmd)?,
    }

    Ok(())
}

fn database_url(explicit: Option<&str>, config: Option<&JobConfig>) -> Result<String> {
    match explicit.or_else(|| config.and_then(|c| c.database_url.as_deref())) {
        Some(url) => Ok(url.to_string()),
        None => default_database_url(),
    }
}

async fn run_job(cmd: &RunCommand) -> Result<()> {
    let config = match &cmd.config {
        Some(path) => JobConfig::from_file(path)
            .with_context(|| format!("Failed to load job config {}", path.display()))?,
        None => JobConfig::default(),
    };
    let parameters = cmd.parameters();

    let url = database_url(cmd.db.as_deref(), Some(&config))?;
    let pool = connect(&url).await?;

    // Set up persistence
    let repository: Arc<dyn JobRepository> = if cmd.no_history {
        Arc::new(InMemoryPersistence::new())
    } else {
        Arc::new(SqliteJobRepository::with_pool(pool.clone()).await?)
    };

    let mut job = BillingJobBuilder::new(&config, pool).build(&parameters);
    let mut executor = JobExecutor::new(repository);

    // Event handler for console output
    let spinner = create_spinner();
    {
        let spinner = spinner.clone();
        executor.add_event_handler(move |event| {
            if let Some(line) = format_execution_event(event) {
                spinner.println(line);
            } else if let Some(message) = format_progress(event) {
                spinner.set_message(message);
            }
        });
    }

    // Ctrl-C stops at the next chunk boundary
    let stop = executor.stop_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Stop requested, finishing the current chunk");
            stop.store(true, Ordering::SeqCst);
        }
    });

    let result = executor.run(&mut job, parameters).await;
    spinner.finish_and_clear();

    let execution = match result {
        Ok(execution) => execution,
        Err(e) if e.is_launch_error() => {
            println!("{} {} was not launched", CROSS, style(JOB_NAME).bold());
            println!("  {}", style(&e).red());
            std::process::exit(1);
        }
        Err(e) => return Err(e.into()),
    };

    print_execution_details(&execution);

    if execution.status == BatchStatus::Completed {
        println!(
            "\n{} {} completed {}",
            CHECK,
            style(&execution.job_name).bold(),
            style("successfully").green()
        );
    } else {
        println!(
            "\n{} {} {}",
            CROSS,
            style(&execution.job_name).bold(),
            format_status(execution.status)
        );
        for failure in &execution.failure_exceptions {
            error!("{}", failure);
        }
        std::process::exit(1);
    }

    Ok(())
}

async fn open_repository(db: Option<&str>) -> Result<SqliteJobRepository> {
    let url = database_url(db, None)?;
    SqliteJobRepository::new(&url).await
}

async fn show_history(cmd: &HistoryCommand) -> Result<()> {
    let store = open_repository(cmd.db.as_deref()).await?;
    let executions = store
        .list_job_executions(cmd.job.as_deref(), cmd.limit)
        .await?;

    if cmd.json {
        let data = serde_json::json!({ "executions": executions });
        println!("{}", serde_json::to_string_pretty(&data)?);
        return Ok(());
    }

    if executions.is_empty() {
        println!("{} No executions found", INFO);
        return Ok(());
    }

    println!("{} Execution history (showing latest {}):", INFO, cmd.limit);
    for execution in &executions {
        println!("  {}", format_execution_summary(execution));
    }

    Ok(())
}

async fn show_execution(cmd: &ShowCommand) -> Result<()> {
    let store = open_repository(cmd.db.as_deref()).await?;
    let execution_id =
        uuid::Uuid::parse_str(&cmd.execution_id).context("Invalid execution ID format")?;

    match store.load_job_execution(execution_id).await? {
        Some(execution) if cmd.json => {
            println!("{}", serde_json::to_string_pretty(&execution)?);
        }
        Some(execution) => print_execution_details(&execution),
        None => println!("{} Execution not found", WARN),
    }

    Ok(())
}

fn validate_config(cmd: &ValidateCommand) -> Result<()> {
    println!("{} Validating job configuration...", INFO);

    match JobConfig::from_file(&cmd.config) {
        Ok(config) => {
            println!("{} Job configuration is valid!", CHECK);
            println!("  Staging dir: {}", style(config.staging_dir.display()).bold());
            println!(
                "  Chunk sizes: ingestion {} / report {}",
                style(config.ingestion.chunk_size).cyan(),
                style(config.report.chunk_size).cyan()
            );
            println!("  Spending threshold: {}", style(config.spending_threshold).cyan());

            if cmd.json {
                let json = serde_json::to_string_pretty(&config)?;
                println!("\n{}", json);
            }
            Ok(())
        }
        Err(e) => {
            println!("{} Validation failed:", CROSS);
            println!("  {}", style(format!("{:#}", e)).red());
            std::process::exit(1);
        }
    }
}

fn print_execution_details(execution: &JobExecution) {
    println!("{} Execution Details", INFO);
    println!("  ID: {}", style(execution.id).cyan());
    println!("  Job: {}", style(&execution.job_name).bold());
    println!("  Parameters: {}", style(&execution.instance_key).dim());
    println!("  Status: {}", format_status(execution.status));
    println!("  Exit code: {}", execution.exit_status.exit_code.as_str());
    println!("  Started: {}", style(execution.start_time.to_rfc3339()).dim());
    if let Some(ended) = execution.end_time {
        println!("  Ended: {}", style(ended.to_rfc3339()).dim());
        if let Ok(duration) = ended.signed_duration_since(execution.start_time).to_std() {
            println!("  Duration: {}", style(format_duration(duration)).dim());
        }
    }

    if !execution.step_executions.is_empty() {
        println!("  Steps:");
        for step in &execution.step_executions {
            println!("    {}", format_step_execution(step));
        }
    }
}
