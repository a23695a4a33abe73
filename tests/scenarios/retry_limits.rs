//! Test: Retry policy boundaries

use crate::helpers::*;
use billing_batch::core::{BatchStatus, RetryPolicy, SkipPolicy};
use billing_batch::execution::ChunkStep;
use billing_batch::ErrorKind;

fn retry_transient(limit: u32) -> RetryPolicy {
    RetryPolicy::never().retry(ErrorKind::TransientDependency, limit)
}

/// R failures followed by a success are absorbed by R retries
#[tokio::test]
async fn test_item_succeeds_within_retry_limit() {
    let writer = RecordingWriter::new();
    let processor = ScriptedProcessor::pass_through().fail(5, 3);
    let mut step = ChunkStep::new(VecReader::new(numbers(10)), processor, writer.clone())
        .retry_policy(retry_transient(3));

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.retry_count, 3);
    assert_eq!(execution.skip_count(), 0);
    assert_eq!(writer.items(), numbers(10));
}

/// The (R+1)-th failure is handed to the skip policy
#[tokio::test]
async fn test_exhausted_retries_fall_through_to_skip() {
    let writer = RecordingWriter::new();
    let processor = ScriptedProcessor::pass_through().fail(5, 4);
    let mut step = ChunkStep::new(VecReader::new(numbers(10)), processor, writer.clone())
        .retry_policy(retry_transient(3))
        .skip_policy(SkipPolicy::never().skip(ErrorKind::TransientDependency, 1));

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.retry_count, 3);
    assert_eq!(execution.process_skip_count, 1);
    assert!(!writer.items().contains(&5));
    assert_counts_balance(&execution);
}

/// Without a skip registration an exhausted item fails the step
#[tokio::test]
async fn test_exhausted_retries_fail_step_when_not_skippable() {
    let writer = RecordingWriter::new();
    let processor = ScriptedProcessor::pass_through().fail(5, 4);
    let mut step = ChunkStep::new(VecReader::new(numbers(10)), processor, writer.clone())
        .chunk_size(4)
        .retry_policy(retry_transient(3));

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Failed);
    assert_eq!(execution.retry_count, 3);
    assert!(execution.exit_status.exit_description.contains("item 5 failed"));
    // only the first chunk made it
    assert_eq!(writer.items(), vec![1, 2, 3, 4]);
    assert_eq!(execution.commit_count, 1);
}

/// Errors of kinds without a retry registration are never retried
#[tokio::test]
async fn test_unregistered_kind_is_not_retried() {
    let processor = ScriptedProcessor::pass_through()
        .with_kind(ErrorKind::Parse)
        .fail(2, 1);
    let mut step = ChunkStep::new(
        VecReader::new(numbers(3)),
        processor,
        RecordingWriter::new(),
    )
    .retry_policy(retry_transient(100))
    .skip_policy(SkipPolicy::never().skip(ErrorKind::Parse, 1));

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.retry_count, 0);
    assert_eq!(execution.process_skip_count, 1);
}

/// Retry budgets are per item, not per step
#[tokio::test]
async fn test_retry_limit_applies_per_item() {
    let processor = ScriptedProcessor::pass_through()
        .fail(1, 2)
        .fail(2, 2)
        .fail(3, 2);
    let mut step = ChunkStep::new(
        VecReader::new(numbers(3)),
        processor,
        RecordingWriter::new(),
    )
    .retry_policy(retry_transient(2));

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.retry_count, 6);
    assert_eq!(execution.write_count, 3);
}

/// A dependency failing on every seventh call never exhausts a limit of 100
#[tokio::test]
async fn test_flaky_dependency_completes_with_retries() {
    let writer = RecordingWriter::new();
    let mut step = ChunkStep::new(
        VecReader::new(numbers(1000)),
        EveryNthFails::new(7),
        writer.clone(),
    )
    .chunk_size(100)
    .retry_policy(retry_transient(100));

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.write_count, 1000);
    assert_eq!(execution.skip_count(), 0);
    // 1166 calls in total, of which every seventh failed
    assert_eq!(execution.retry_count, 166);
    assert_eq!(writer.items(), numbers(1000));
}
