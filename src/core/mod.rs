//! Core domain models for the batch engine
//!
//! This module defines the execution-state records, launch parameters, the
//! error taxonomy, skip/retry policies and the item contracts that the
//! executors drive.

pub mod config;
pub mod context;
pub mod error;
pub mod item;
pub mod parameters;
pub mod policy;
pub mod state;

pub use context::*;
pub use error::*;
pub use item::*;
pub use parameters::{JobParameter, JobParameters};
pub use policy::*;
pub use state::*;
