//! Test utilities for batch scenarios

#![allow(dead_code)]

use async_trait::async_trait;
use billing_batch::core::{
    ErrorKind, ItemError, ItemProcessor, ItemReader, ItemWriter, SkipListener, StepContext,
    StepExecution,
};
use billing_batch::execution::{ChunkStep, EventBus, ExecutionEvent};
use billing_batch::JobParameters;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// In-memory source handing out scripted results in order
pub struct VecReader<T> {
    items: VecDeque<Result<T, ItemError>>,
}

impl<T> VecReader<T> {
    pub fn new(items: impl IntoIterator<Item = T>) -> Self {
        Self {
            items: items.into_iter().map(Ok).collect(),
        }
    }

    /// Source whose reads fail for the given 1-based positions
    pub fn with_failures(items: impl IntoIterator<Item = T>, fail_at: &[usize]) -> Self {
        let mut scripted = VecDeque::new();
        let mut position = 0;
        for item in items {
            position += 1;
            while fail_at.contains(&position) {
                scripted.push_back(Err(
                    ItemError::parse(format!("bad record {}", position))
                        .with_input(format!("raw-{}", position)),
                ));
                position += 1;
            }
            scripted.push_back(Ok(item));
        }
        Self { items: scripted }
    }

    pub fn scripted(items: impl IntoIterator<Item = Result<T, ItemError>>) -> Self {
        Self {
            items: items.into_iter().collect(),
        }
    }
}

#[async_trait]
impl<T: Send + Sync> ItemReader<T> for VecReader<T> {
    async fn read(&mut self) -> Result<Option<T>, ItemError> {
        self.items.pop_front().transpose()
    }
}

/// Source that starts over from the first item every time it is opened
pub struct ReplayReader<T> {
    items: Vec<T>,
    cursor: usize,
    pub opened: Arc<AtomicUsize>,
}

impl<T: Clone> ReplayReader<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items,
            cursor: 0,
            opened: Arc::new(AtomicUsize::new(0)),
        }
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> ItemReader<T> for ReplayReader<T> {
    async fn open(&mut self, _ctx: &StepContext) -> anyhow::Result<()> {
        self.cursor = 0;
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<T>, ItemError> {
        let item = self.items.get(self.cursor).cloned();
        self.cursor += 1;
        Ok(item)
    }
}

/// Sink that keeps every committed chunk
#[derive(Clone)]
pub struct RecordingWriter<T> {
    chunks: Arc<Mutex<Vec<Vec<T>>>>,
}

impl<T: Clone> RecordingWriter<T> {
    pub fn new() -> Self {
        Self {
            chunks: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn chunks(&self) -> Vec<Vec<T>> {
        self.chunks.lock().unwrap().clone()
    }

    pub fn items(&self) -> Vec<T> {
        self.chunks().into_iter().flatten().collect()
    }

    pub fn chunk_sizes(&self) -> Vec<usize> {
        self.chunks.lock().unwrap().iter().map(Vec::len).collect()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> ItemWriter<T> for RecordingWriter<T> {
    async fn write(&mut self, items: &[T]) -> Result<(), ItemError> {
        self.chunks.lock().unwrap().push(items.to_vec());
        Ok(())
    }
}

/// Sink that commits chunks until the n-th write (1-based), which fails
#[derive(Clone)]
pub struct FailingWriter<T> {
    inner: RecordingWriter<T>,
    fail_on_write: usize,
    writes: Arc<AtomicUsize>,
}

impl<T: Clone> FailingWriter<T> {
    pub fn new(fail_on_write: usize) -> Self {
        Self {
            inner: RecordingWriter::new(),
            fail_on_write,
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn committed(&self) -> Vec<T> {
        self.inner.items()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> ItemWriter<T> for FailingWriter<T> {
    async fn write(&mut self, items: &[T]) -> Result<(), ItemError> {
        let write = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        if write == self.fail_on_write {
            return Err(ItemError::sink_write(format!("disk full on write {}", write)));
        }
        self.inner.write(items).await
    }
}

/// Sink that rejects every chunk while its switch is on
#[derive(Clone)]
pub struct SwitchableWriter<T> {
    inner: RecordingWriter<T>,
    pub failing: Arc<AtomicBool>,
}

impl<T: Clone> SwitchableWriter<T> {
    pub fn new(failing: bool) -> Self {
        Self {
            inner: RecordingWriter::new(),
            failing: Arc::new(AtomicBool::new(failing)),
        }
    }

    pub fn committed(&self) -> Vec<T> {
        self.inner.items()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> ItemWriter<T> for SwitchableWriter<T> {
    async fn write(&mut self, items: &[T]) -> Result<(), ItemError> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(ItemError::sink_write("sink unavailable"));
        }
        self.inner.write(items).await
    }
}

/// Transformer that raises a stop flag once it sees a given item
pub struct StopAt {
    item: u32,
    stop: Arc<AtomicBool>,
}

impl StopAt {
    pub fn new(item: u32, stop: Arc<AtomicBool>) -> Self {
        Self { item, stop }
    }
}

#[async_trait]
impl ItemProcessor<u32, u32> for StopAt {
    async fn process(&self, item: &u32) -> Result<Option<u32>, ItemError> {
        if *item == self.item {
            self.stop.store(true, Ordering::SeqCst);
        }
        Ok(Some(*item))
    }
}

/// Transformer that fails with `kind` on chosen items, a set number of times each
pub struct ScriptedProcessor {
    kind: ErrorKind,
    failures: Mutex<std::collections::HashMap<u32, usize>>,
    filter_below: Option<u32>,
    calls: AtomicUsize,
}

impl ScriptedProcessor {
    /// Passes every item through unchanged
    pub fn pass_through() -> Self {
        Self {
            kind: ErrorKind::TransientDependency,
            failures: Mutex::new(Default::default()),
            filter_below: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Item `item` fails `times` times before succeeding
    pub fn fail(self, item: u32, times: usize) -> Self {
        self.failures.lock().unwrap().insert(item, times);
        self
    }

    pub fn with_kind(mut self, kind: ErrorKind) -> Self {
        self.kind = kind;
        self
    }

    /// Items below `threshold` are filtered out
    pub fn filter_below(mut self, threshold: u32) -> Self {
        self.filter_below = Some(threshold);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ItemProcessor<u32, u32> for ScriptedProcessor {
    async fn process(&self, item: &u32) -> Result<Option<u32>, ItemError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(item) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ItemError::new(self.kind, format!("item {} failed", item)));
                }
            }
        }
        if self.filter_below.is_some_and(|threshold| *item < threshold) {
            return Ok(None);
        }
        Ok(Some(*item))
    }
}

/// Transformer whose every n-th call fails with a transient error
pub struct EveryNthFails {
    n: usize,
    calls: AtomicUsize,
}

impl EveryNthFails {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ItemProcessor<u32, u32> for EveryNthFails {
    async fn process(&self, item: &u32) -> Result<Option<u32>, ItemError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call % self.n == 0 {
            return Err(ItemError::transient(format!("call {} failed", call)));
        }
        Ok(Some(*item))
    }
}

/// Skip listener remembering what it was told
#[derive(Clone, Default)]
pub struct RecordingSkipListener {
    pub read_skips: Arc<Mutex<Vec<String>>>,
    pub process_skips: Arc<Mutex<Vec<u32>>>,
}

#[async_trait]
impl SkipListener<u32> for RecordingSkipListener {
    async fn on_skip_in_read(&self, error: &ItemError) {
        self.read_skips
            .lock()
            .unwrap()
            .push(error.input.clone().unwrap_or_default());
    }

    async fn on_skip_in_process(&self, item: &u32, _error: &ItemError) {
        self.process_skips.lock().unwrap().push(*item);
    }
}

/// Event bus recording every event
pub fn recording_bus() -> (EventBus, Arc<Mutex<Vec<ExecutionEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let mut bus = EventBus::new();
    {
        let events = events.clone();
        bus.subscribe(move |event| events.lock().unwrap().push(event.clone()));
    }
    (bus, events)
}

/// Run a chunk step on its own
pub async fn run_step(step: &mut ChunkStep<u32, u32>) -> StepExecution {
    let ctx = StepContext::detached("test-step", JobParameters::new());
    step.run(&ctx, &EventBus::new()).await
}

/// Assert the counter identity of a completed step
pub fn assert_counts_balance(execution: &StepExecution) {
    assert_eq!(
        execution.write_count + execution.filter_count + execution.process_skip_count,
        execution.read_count,
        "write + filter + process skips must equal reads: {}",
        execution.summary()
    );
}

/// Items 1..=n
pub fn numbers(n: u32) -> Vec<u32> {
    (1..=n).collect()
}
