//! Test: Chunk commits are all-or-nothing

use crate::helpers::*;
use billing_batch::core::{BatchStatus, SkipPolicy, StepContext};
use billing_batch::execution::{ChunkStep, ExecutionEvent};
use billing_batch::{ErrorKind, JobParameters};

/// A failed second write leaves exactly the first chunk committed
#[tokio::test]
async fn test_failed_write_rolls_back_chunk_and_fails_step() {
    let writer = FailingWriter::new(2);
    let mut step = ChunkStep::new(
        VecReader::new(numbers(30)),
        ScriptedProcessor::pass_through(),
        writer.clone(),
    )
    .chunk_size(10);

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Failed);
    assert_eq!(writer.committed(), numbers(10));
    assert_eq!(execution.commit_count, 1);
    assert_eq!(execution.rollback_count, 1);
    assert_eq!(execution.write_count, 10);
    assert!(
        execution
            .exit_status
            .exit_description
            .contains("chunk write failed"),
        "{}",
        execution.exit_status.exit_description
    );
    assert!(execution.exit_status.exit_description.contains("disk full"));
}

/// Write failures are never skipped, even with a generous skip policy
#[tokio::test]
async fn test_write_failure_ignores_skip_policy() {
    let writer = FailingWriter::new(1);
    let mut step = ChunkStep::new(
        VecReader::new(numbers(5)),
        ScriptedProcessor::pass_through(),
        writer.clone(),
    )
    .skip_policy(SkipPolicy::never().skip(ErrorKind::SinkWrite, 1000));

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Failed);
    assert!(writer.committed().is_empty());
    assert_eq!(execution.write_count, 0);
    assert_eq!(execution.commit_count, 0);
}

/// The rollback is announced before the step fails
#[tokio::test]
async fn test_rollback_event() {
    let (bus, events) = recording_bus();
    let mut step = ChunkStep::new(
        VecReader::new(numbers(4)),
        ScriptedProcessor::pass_through(),
        FailingWriter::new(2),
    )
    .chunk_size(2);

    let ctx = StepContext::detached("atomic", JobParameters::new());
    let execution = step.run(&ctx, &bus).await;
    assert_eq!(execution.status, BatchStatus::Failed);

    let events = events.lock().unwrap();
    let rolled_back: Vec<usize> = events
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::ChunkRolledBack { items, .. } => Some(*items),
            _ => None,
        })
        .collect();
    assert_eq!(rolled_back, vec![2]);
}
