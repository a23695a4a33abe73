//! Chunk executor - read, process and write items in transactional chunks

use crate::{
    core::{
        config::ChunkStepConfig, BatchError, ErrorKind, ItemError, ItemPhase, ItemProcessor,
        ItemReader, ItemWriter, RetryDecision, RetryPolicy, SkipDecision, SkipListener,
        SkipPolicy, StepContext, StepExecution,
    },
    execution::{
        events::{EventBus, ExecutionEvent},
        step::{StepHandler, StepOutcome},
    },
    persistence::{InMemoryPersistence, JobRepository},
};
use async_trait::async_trait;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};

/// Processed items awaiting a single commit
#[derive(Debug)]
pub struct Chunk<O> {
    items: Vec<O>,
}

impl<O> Chunk<O> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            items: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, item: O) {
        self.items.push(item);
    }

    pub fn items(&self) -> &[O] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Items read for one chunk, and whether the source ran dry while reading them
struct ReadBatch<I> {
    items: Vec<I>,
    exhausted: bool,
}

/// A chunk-oriented step: source, transformer, sink and fault-tolerance policies
pub struct ChunkStep<I, O> {
    reader: Box<dyn ItemReader<I>>,
    processor: Box<dyn ItemProcessor<I, O>>,
    writer: Box<dyn ItemWriter<O>>,
    chunk_size: usize,
    skip_policy: SkipPolicy,
    retry_policy: RetryPolicy,
    listeners: Vec<Box<dyn SkipListener<I>>>,
}

impl<I, O> ChunkStep<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    /// Create a chunk step with a chunk size of 100 and no fault tolerance
    pub fn new(
        reader: impl ItemReader<I> + 'static,
        processor: impl ItemProcessor<I, O> + 'static,
        writer: impl ItemWriter<O> + 'static,
    ) -> Self {
        Self {
            reader: Box::new(reader),
            processor: Box::new(processor),
            writer: Box::new(writer),
            chunk_size: 100,
            skip_policy: SkipPolicy::never(),
            retry_policy: RetryPolicy::never(),
            listeners: Vec::new(),
        }
    }

    pub fn chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn skip_policy(mut self, policy: SkipPolicy) -> Self {
        self.skip_policy = policy;
        self
    }

    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Apply chunk size and policies from configuration
    pub fn with_config(self, config: &ChunkStepConfig) -> Self {
        self.chunk_size(config.chunk_size)
            .skip_policy(config.skip_policy())
            .retry_policy(config.retry_policy())
    }

    pub fn listener(mut self, listener: impl SkipListener<I> + 'static) -> Self {
        self.listeners.push(Box::new(listener));
        self
    }

    /// Run the step outside of any job, returning its finalized execution record
    pub async fn run(&mut self, ctx: &StepContext, events: &EventBus) -> StepExecution {
        let scratch = InMemoryPersistence::new();
        let mut execution = StepExecution::new(ctx.step_name.clone(), ctx.job_execution_id);
        execution.start();
        match self.handle(ctx, &mut execution, events, &scratch).await {
            Ok(StepOutcome::Completed) => execution.complete(),
            Ok(StepOutcome::Stopped) => execution.stop(),
            Err(e) => execution.fail(e.to_string()),
        }
        execution
    }

    async fn run_chunks(
        &mut self,
        ctx: &StepContext,
        execution: &mut StepExecution,
        events: &EventBus,
        repository: &dyn JobRepository,
    ) -> Result<StepOutcome, BatchError> {
        if self.chunk_size == 0 {
            return Err(BatchError::Configuration(format!(
                "step '{}' has a chunk size of 0",
                ctx.step_name
            )));
        }

        // Skips are limited per kind for the whole step execution
        let mut skip_counts: HashMap<ErrorKind, u32> = HashMap::new();

        loop {
            let batch = self.read_chunk(ctx, execution, events, &mut skip_counts).await?;
            if batch.items.is_empty() && batch.exhausted {
                break;
            }

            let chunk = self
                .process_chunk(batch.items, ctx, execution, events, &mut skip_counts)
                .await?;
            let written = self.write_chunk(chunk, ctx, execution, events).await;
            // counters after a commit or rollback are persisted before moving on
            let saved = repository
                .save_step_execution(execution)
                .await
                .map_err(BatchError::Repository);
            written?;
            saved?;

            if batch.exhausted {
                break;
            }

            if ctx.is_stop_requested() {
                info!(
                    step = %ctx.step_name,
                    "Stop requested, stopping after chunk {}",
                    execution.commit_count
                );
                return Ok(StepOutcome::Stopped);
            }
        }

        Ok(StepOutcome::Completed)
    }

    /// Pull up to `chunk_size` items, skipping read failures the policy allows
    async fn read_chunk(
        &mut self,
        ctx: &StepContext,
        execution: &mut StepExecution,
        events: &EventBus,
        skip_counts: &mut HashMap<ErrorKind, u32>,
    ) -> Result<ReadBatch<I>, BatchError> {
        let mut items = Vec::with_capacity(self.chunk_size);
        let mut exhausted = false;

        while items.len() < self.chunk_size {
            match self.reader.read().await {
                Ok(Some(item)) => {
                    execution.read_count += 1;
                    items.push(item);
                }
                Ok(None) => {
                    exhausted = true;
                    break;
                }
                Err(err) => {
                    self.skip_or_abort(ItemPhase::Read, err, None, ctx, execution, events, skip_counts)
                        .await?;
                }
            }
        }

        Ok(ReadBatch { items, exhausted })
    }

    /// Transform each item in read order; filtered items are dropped
    async fn process_chunk(
        &self,
        items: Vec<I>,
        ctx: &StepContext,
        execution: &mut StepExecution,
        events: &EventBus,
        skip_counts: &mut HashMap<ErrorKind, u32>,
    ) -> Result<Chunk<O>, BatchError> {
        let mut chunk = Chunk::with_capacity(items.len());

        for item in items {
            match self.process_with_retry(&item, ctx, execution, events).await {
                Ok(Some(output)) => chunk.push(output),
                Ok(None) => execution.filter_count += 1,
                Err(err) => {
                    self.skip_or_abort(
                        ItemPhase::Process,
                        err,
                        Some(&item),
                        ctx,
                        execution,
                        events,
                        skip_counts,
                    )
                    .await?;
                }
            }
        }

        Ok(chunk)
    }

    /// Invoke the transformer until it succeeds, fails non-retryably, or the
    /// retry limit for the failure kind is used up
    async fn process_with_retry(
        &self,
        item: &I,
        ctx: &StepContext,
        execution: &mut StepExecution,
        events: &EventBus,
    ) -> Result<Option<O>, ItemError> {
        let mut retries: u32 = 0;

        loop {
            let err = match self.processor.process(item).await {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };

            match self.retry_policy.classify(err.kind, retries) {
                RetryDecision::RetryAgain => {
                    let delay = self.retry_policy.backoff().delay_for(retries);
                    retries += 1;
                    execution.retry_count += 1;
                    debug!(
                        step = %ctx.step_name,
                        retry = retries,
                        "Retrying item after {}",
                        err
                    );
                    events.emit(ExecutionEvent::ItemRetried {
                        step_name: ctx.step_name.clone(),
                        kind: err.kind,
                        retry: retries,
                    });
                    if !delay.is_zero() {
                        tokio::time::sleep(delay).await;
                    }
                }
                RetryDecision::GiveUp => {
                    if retries > 0 {
                        warn!(
                            step = %ctx.step_name,
                            "Giving up on item after {} retries: {}",
                            retries,
                            err
                        );
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Commit one chunk to the sink; a failed write rolls back the whole chunk
    /// and fails the step
    async fn write_chunk(
        &mut self,
        chunk: Chunk<O>,
        ctx: &StepContext,
        execution: &mut StepExecution,
        events: &EventBus,
    ) -> Result<(), BatchError> {
        let items = chunk.len();

        if !chunk.is_empty() {
            if let Err(err) = self.writer.write(chunk.items()).await {
                execution.rollback_count += 1;
                error!(
                    step = %ctx.step_name,
                    items,
                    "Chunk write failed, rolling back: {}",
                    err
                );
                events.emit(ExecutionEvent::ChunkRolledBack {
                    step_name: ctx.step_name.clone(),
                    items,
                    error: err.to_string(),
                });
                return Err(BatchError::WriteFailed { items, source: err });
            }
        }

        execution.write_count += items as u64;
        execution.commit_count += 1;
        debug!(
            step = %ctx.step_name,
            items,
            commit = execution.commit_count,
            "Chunk committed"
        );
        events.emit(ExecutionEvent::ChunkCommitted {
            step_name: ctx.step_name.clone(),
            items,
            write_count: execution.write_count,
        });

        Ok(())
    }

    /// Apply the skip policy to a failed item: count and report the skip, or
    /// turn it into the error that aborts the step
    #[allow(clippy::too_many_arguments)]
    async fn skip_or_abort(
        &self,
        phase: ItemPhase,
        err: ItemError,
        item: Option<&I>,
        ctx: &StepContext,
        execution: &mut StepExecution,
        events: &EventBus,
        skip_counts: &mut HashMap<ErrorKind, u32>,
    ) -> Result<(), BatchError> {
        let kind = err.kind;
        let skipped = skip_counts.entry(kind).or_insert(0);

        match self.skip_policy.classify(kind, *skipped) {
            SkipDecision::Skip => {
                *skipped += 1;
                match phase {
                    ItemPhase::Read => execution.read_skip_count += 1,
                    ItemPhase::Process => execution.process_skip_count += 1,
                }
                warn!(
                    step = %ctx.step_name,
                    %phase,
                    %kind,
                    skipped = *skipped,
                    "Skipping item: {}",
                    err.message
                );
                for listener in &self.listeners {
                    match item {
                        Some(item) => listener.on_skip_in_process(item, &err).await,
                        None => listener.on_skip_in_read(&err).await,
                    }
                }
                events.emit(ExecutionEvent::ItemSkipped {
                    step_name: ctx.step_name.clone(),
                    phase,
                    kind,
                    error: err.to_string(),
                });
                Ok(())
            }
            SkipDecision::Fatal => {
                error!(step = %ctx.step_name, %phase, "Aborting step: {}", err);
                Err(match self.skip_policy.limit_for(kind) {
                    Some(limit) if !kind.is_always_fatal() => BatchError::SkipLimitExceeded {
                        kind,
                        limit,
                        phase,
                        source: err,
                    },
                    _ => BatchError::NonSkippable { phase, source: err },
                })
            }
        }
    }
}

#[async_trait]
impl<I, O> StepHandler for ChunkStep<I, O>
where
    I: Send + Sync + 'static,
    O: Send + Sync + 'static,
{
    async fn handle(
        &mut self,
        ctx: &StepContext,
        execution: &mut StepExecution,
        events: &EventBus,
        repository: &dyn JobRepository,
    ) -> Result<StepOutcome, BatchError> {
        self.reader.open(ctx).await.map_err(BatchError::Stream)?;
        if let Err(e) = self.writer.open(ctx).await {
            if let Err(close_err) = self.reader.close().await {
                warn!(step = %ctx.step_name, "Failed to close reader: {:#}", close_err);
            }
            return Err(BatchError::Stream(e));
        }

        let result = self.run_chunks(ctx, execution, events, repository).await;

        let closed = match (self.reader.close().await, self.writer.close().await) {
            (Err(e), _) | (_, Err(e)) => Err(e),
            _ => Ok(()),
        };

        match (result, closed) {
            (Ok(outcome), Ok(())) => Ok(outcome),
            (Ok(_), Err(e)) => Err(BatchError::Stream(e)),
            (Err(e), Err(close_err)) => {
                warn!(step = %ctx.step_name, "Failed to close item streams: {:#}", close_err);
                Err(e)
            }
            (Err(e), Ok(())) => Err(e),
        }
    }
}
