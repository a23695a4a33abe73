//! billing-batch - chunk-oriented, fault-tolerant batch jobs and the monthly
//! billing job built on them

pub mod billing;
pub mod cli;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use core::{
    BatchError, BatchStatus, ErrorKind, ItemError, ItemProcessor, ItemReader, ItemWriter,
    JobExecution, JobParameters, StepContext, StepExecution, Tasklet,
};
pub use execution::{ChunkStep, ExecutionEvent, Job, JobExecutor, Step};
pub use persistence::{InMemoryPersistence, JobRepository};
