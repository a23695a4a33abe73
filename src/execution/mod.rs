//! Job, step and chunk execution

pub mod chunk;
pub mod events;
pub mod job;
pub mod step;

pub use chunk::{Chunk, ChunkStep};
pub use events::{EventBus, EventHandler, ExecutionEvent};
pub use job::{Job, JobExecutor};
pub use step::{Step, StepExecutor, StepHandler, StepOutcome, TaskletStep};
