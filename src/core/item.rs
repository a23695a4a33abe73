//! Item source, transformer and sink contracts

use crate::core::{context::StepContext, error::ItemError};
use async_trait::async_trait;
use std::marker::PhantomData;

/// Pulls items one at a time from a source
#[async_trait]
pub trait ItemReader<T>: Send + Sync {
    /// Called once when the step starts, before the first read
    async fn open(&mut self, _ctx: &StepContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Next item, or `None` at end of stream
    async fn read(&mut self) -> Result<Option<T>, ItemError>;

    /// Called once when the step ends, whatever the outcome
    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Maps one input item to zero or one output items.
///
/// `Ok(None)` filters the item out. The same input may be offered again after
/// a retryable failure, so implementations must not consume it.
#[async_trait]
pub trait ItemProcessor<I, O>: Send + Sync {
    async fn process(&self, item: &I) -> Result<Option<O>, ItemError>;
}

/// Accepts one chunk of items at a time.
///
/// A call to [`write`](ItemWriter::write) is atomic: on error, none of the
/// items may remain visible downstream.
#[async_trait]
pub trait ItemWriter<T>: Send + Sync {
    async fn open(&mut self, _ctx: &StepContext) -> anyhow::Result<()> {
        Ok(())
    }

    async fn write(&mut self, items: &[T]) -> Result<(), ItemError>;

    async fn close(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A single unit of work run once per step execution
#[async_trait]
pub trait Tasklet: Send {
    async fn execute(&mut self, ctx: &StepContext) -> anyhow::Result<()>;
}

/// Notified whenever the chunk executor skips an item
#[async_trait]
pub trait SkipListener<I: Sync>: Send + Sync {
    async fn on_skip_in_read(&self, _error: &ItemError) {}

    async fn on_skip_in_process(&self, _item: &I, _error: &ItemError) {}
}

/// Forwards every item unchanged, for steps without a transformation
pub struct PassThroughProcessor<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> PassThroughProcessor<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for PassThroughProcessor<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<T: Clone + Send + Sync> ItemProcessor<T, T> for PassThroughProcessor<T> {
    async fn process(&self, item: &T) -> Result<Option<T>, ItemError> {
        Ok(Some(item.clone()))
    }
}
