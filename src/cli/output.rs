//! CLI output formatting

use crate::core::{BatchStatus, JobExecution, StepExecution};
use crate::execution::ExecutionEvent;
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Create a spinner that shows chunk progress
pub fn create_spinner() -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.green} [{elapsed_precise}] {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    spinner.set_style(style);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a batch status for display
pub fn format_status(status: BatchStatus) -> String {
    match status {
        BatchStatus::Starting => style("STARTING").dim().to_string(),
        BatchStatus::Started => style("STARTED").yellow().to_string(),
        BatchStatus::Completed => style("COMPLETED").green().to_string(),
        BatchStatus::Failed => style("FAILED").red().to_string(),
        BatchStatus::Stopped => style("STOPPED").yellow().to_string(),
    }
}

fn status_icon(status: BatchStatus) -> Emoji<'static, 'static> {
    match status {
        BatchStatus::Completed => CHECK,
        BatchStatus::Failed => CROSS,
        BatchStatus::Starting | BatchStatus::Started => SPINNER,
        BatchStatus::Stopped => WARN,
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

/// One-line summary of a job execution for history listings
pub fn format_execution_summary(execution: &JobExecution) -> String {
    format!(
        "{} {} - {} - {} - {} - {}",
        status_icon(execution.status),
        style(short_id(&execution.id)).dim(),
        style(&execution.job_name).bold(),
        format_status(execution.status),
        style(execution.start_time.format("%Y-%m-%d %H:%M:%S")).dim(),
        style(&execution.instance_key).cyan()
    )
}

/// One line per step with its counters
pub fn format_step_execution(step: &StepExecution) -> String {
    let mut line = format!(
        "{} {} {} {}",
        status_icon(step.status),
        style(&step.step_name).bold(),
        format_status(step.status),
        style(step.summary()).dim()
    );
    if !step.exit_status.exit_description.is_empty() {
        line.push_str(&format!("\n      {}", style(&step.exit_status.exit_description).red()));
    }
    line
}

/// Format an execution event for display
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    match event {
        ExecutionEvent::JobStarted {
            execution_id,
            job_name,
            restart,
        } => Some(format!(
            "{} {} {} ({})",
            ROCKET,
            if *restart { "Restarting" } else { "Starting" },
            style(job_name).bold(),
            style(short_id(execution_id)).dim()
        )),
        ExecutionEvent::StepStarted { step_name } => {
            Some(format!("{} {}", SPINNER, style(step_name).cyan()))
        }
        ExecutionEvent::StepAlreadyComplete { step_name } => Some(format!(
            "{} {} already complete",
            SKIP,
            style(step_name).dim()
        )),
        ExecutionEvent::StepFinished {
            step_name,
            status,
            summary,
            exit_description,
        } => {
            let mut line = format!(
                "{} {} {} {}",
                status_icon(*status),
                style(step_name).bold(),
                format_status(*status),
                style(summary).dim()
            );
            if !exit_description.is_empty() {
                line.push_str(&format!("\n   {}", style(exit_description).red()));
            }
            Some(line)
        }
        ExecutionEvent::JobFinished {
            execution_id,
            status,
        } => Some(format!(
            "{} Job ({}) {}",
            status_icon(*status),
            style(short_id(execution_id)).dim(),
            format_status(*status)
        )),
        // high-volume events feed the spinner instead
        ExecutionEvent::ChunkCommitted { .. }
        | ExecutionEvent::ChunkRolledBack { .. }
        | ExecutionEvent::ItemRetried { .. }
        | ExecutionEvent::ItemSkipped { .. } => None,
    }
}

/// Spinner message for high-volume events
pub fn format_progress(event: &ExecutionEvent) -> Option<String> {
    match event {
        ExecutionEvent::ChunkCommitted {
            step_name,
            write_count,
            ..
        } => Some(format!("{}: {} items written", step_name, write_count)),
        ExecutionEvent::ItemSkipped {
            step_name,
            phase,
            kind,
            ..
        } => Some(format!("{}: skipped a {} error during {}", step_name, kind, phase)),
        _ => None,
    }
}

/// Format a duration as 1h 2m 3s
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
