//! Test: Chunk boundaries and counter bookkeeping

use crate::helpers::*;
use billing_batch::core::{BatchStatus, StepContext};
use billing_batch::execution::{ChunkStep, ExecutionEvent};
use billing_batch::JobParameters;

/// 1000 valid records in chunks of 100
#[tokio::test]
async fn test_thousand_records_commit_ten_chunks() {
    let writer = RecordingWriter::new();
    let mut step = ChunkStep::new(
        VecReader::new(numbers(1000)),
        ScriptedProcessor::pass_through(),
        writer.clone(),
    )
    .chunk_size(100);

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.read_count, 1000);
    assert_eq!(execution.write_count, 1000);
    assert_eq!(execution.commit_count, 10);
    assert_eq!(execution.skip_count(), 0);
    assert_eq!(execution.rollback_count, 0);
    assert_eq!(writer.chunk_sizes(), vec![100; 10]);
    assert_eq!(writer.items(), numbers(1000));
}

/// A final partial chunk is committed on its own
#[tokio::test]
async fn test_partial_last_chunk() {
    let writer = RecordingWriter::new();
    let mut step = ChunkStep::new(
        VecReader::new(numbers(25)),
        ScriptedProcessor::pass_through(),
        writer.clone(),
    )
    .chunk_size(10);

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(writer.chunk_sizes(), vec![10, 10, 5]);
    assert_eq!(execution.commit_count, 3);
    assert_counts_balance(&execution);
}

/// The identity holds for every chunk size, with filters and skips mixed in
#[tokio::test]
async fn test_counts_balance_for_all_chunk_sizes() {
    for chunk_size in [1, 2, 3, 7, 10, 64, 100, 500] {
        let writer = RecordingWriter::new();
        let processor = ScriptedProcessor::pass_through()
            .fail(13, 5)
            .fail(42, 5)
            .filter_below(20);
        let mut step = ChunkStep::new(
            VecReader::with_failures(numbers(200), &[5, 50]),
            processor,
            writer.clone(),
        )
        .chunk_size(chunk_size)
        .skip_policy(
            billing_batch::core::SkipPolicy::never()
                .skip(billing_batch::ErrorKind::Parse, 10)
                .skip(billing_batch::ErrorKind::TransientDependency, 10),
        )
        .retry_policy(
            billing_batch::core::RetryPolicy::never()
                .retry(billing_batch::ErrorKind::TransientDependency, 2),
        );

        let execution = run_step(&mut step).await;

        assert_eq!(execution.status, BatchStatus::Completed, "chunk size {}", chunk_size);
        assert_counts_balance(&execution);
        assert!(execution.read_count <= 202);
        assert_eq!(execution.read_count, 200);
        assert_eq!(execution.read_skip_count, 2);
        // 13 runs out of retries before the filter ever sees it
        assert_eq!(execution.process_skip_count, 2);
        assert_eq!(execution.filter_count, 18);
        assert_eq!(execution.write_count, 180);
        assert_eq!(execution.retry_count, 4);
        assert_eq!(writer.items().len() as u64, execution.write_count);
    }
}

/// Items rejected by the transformer are filtered, not errors
#[tokio::test]
async fn test_filter_threshold() {
    let writer = RecordingWriter::new();
    let mut step = ChunkStep::new(
        VecReader::new(numbers(100)),
        ScriptedProcessor::pass_through().filter_below(31),
        writer.clone(),
    )
    .chunk_size(25);

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.filter_count, 30);
    assert_eq!(execution.write_count, 70);
    assert_eq!(execution.skip_count(), 0);
    assert_eq!(writer.items(), (31..=100).collect::<Vec<u32>>());
}

/// An empty source completes without committing anything
#[tokio::test]
async fn test_empty_source() {
    let writer = RecordingWriter::<u32>::new();
    let mut step = ChunkStep::new(
        VecReader::new(Vec::<u32>::new()),
        ScriptedProcessor::pass_through(),
        writer.clone(),
    );

    let execution = run_step(&mut step).await;

    assert_eq!(execution.status, BatchStatus::Completed);
    assert_eq!(execution.read_count, 0);
    assert_eq!(execution.commit_count, 0);
    assert!(writer.chunks().is_empty());
}

/// A chunk whose items are all filtered still commits, without calling the sink
#[tokio::test]
async fn test_fully_filtered_chunk_commits_without_write() {
    let writer = RecordingWriter::new();
    let mut step = ChunkStep::new(
        VecReader::new(numbers(20)),
        ScriptedProcessor::pass_through().filter_below(11),
        writer.clone(),
    )
    .chunk_size(10);

    let execution = run_step(&mut step).await;

    assert_eq!(execution.commit_count, 2);
    assert_eq!(writer.chunk_sizes(), vec![10]);
    assert_counts_balance(&execution);
}

/// Chunk commits are announced with the running write count
#[tokio::test]
async fn test_commit_events() {
    let (bus, events) = recording_bus();
    let mut step = ChunkStep::new(
        VecReader::new(numbers(5)),
        ScriptedProcessor::pass_through(),
        RecordingWriter::new(),
    )
    .chunk_size(2);

    let ctx = StepContext::detached("counting", JobParameters::new());
    let execution = step.run(&ctx, &bus).await;
    assert_eq!(execution.status, BatchStatus::Completed);

    let commits: Vec<(usize, u64)> = events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|event| match event {
            ExecutionEvent::ChunkCommitted {
                items, write_count, ..
            } => Some((*items, *write_count)),
            _ => None,
        })
        .collect();
    assert_eq!(commits, vec![(2, 2), (2, 4), (1, 5)]);
}
