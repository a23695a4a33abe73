//! Chunk step configuration from YAML

use crate::core::{
    error::ErrorKind,
    policy::{BackoffPolicy, RetryPolicy, SkipPolicy},
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Fault tolerance and commit interval for one chunk step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkStepConfig {
    /// Items read per transaction
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Skip limit per error kind (per step execution)
    #[serde(default)]
    pub skip: BTreeMap<ErrorKind, u32>,

    /// Retry limit per error kind (per item)
    #[serde(default)]
    pub retry: BTreeMap<ErrorKind, u32>,

    /// Delay between retries
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Backoff between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackoffConfig {
    #[default]
    None,
    Fixed {
        delay_ms: u64,
    },
    Exponential {
        base_ms: u64,
        max_ms: u64,
    },
}

impl From<BackoffConfig> for BackoffPolicy {
    fn from(config: BackoffConfig) -> Self {
        match config {
            BackoffConfig::None => BackoffPolicy::None,
            BackoffConfig::Fixed { delay_ms } => BackoffPolicy::Fixed(Duration::from_millis(delay_ms)),
            BackoffConfig::Exponential { base_ms, max_ms } => BackoffPolicy::Exponential {
                base: Duration::from_millis(base_ms),
                max: Duration::from_millis(max_ms),
            },
        }
    }
}

fn default_chunk_size() -> usize {
    100
}

impl Default for ChunkStepConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            skip: BTreeMap::new(),
            retry: BTreeMap::new(),
            backoff: BackoffConfig::None,
        }
    }
}

impl ChunkStepConfig {
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_skip(mut self, kind: ErrorKind, limit: u32) -> Self {
        self.skip.insert(kind, limit);
        self
    }

    pub fn with_retry(mut self, kind: ErrorKind, limit: u32) -> Self {
        self.retry.insert(kind, limit);
        self
    }

    /// Validate the step configuration
    pub fn validate(&self, step_name: &str) -> Result<()> {
        if self.chunk_size == 0 {
            anyhow::bail!("Step '{}': chunk_size must be at least 1", step_name);
        }

        for kind in self.skip.keys() {
            if kind.is_always_fatal() {
                anyhow::bail!("Step '{}': {} errors cannot be skipped", step_name, kind);
            }
        }

        for kind in self.retry.keys() {
            if kind.is_always_fatal() {
                anyhow::bail!("Step '{}': {} errors cannot be retried", step_name, kind);
            }
        }

        if let BackoffConfig::Exponential { base_ms, max_ms } = self.backoff {
            if base_ms > max_ms {
                anyhow::bail!(
                    "Step '{}': backoff base_ms ({}) exceeds max_ms ({})",
                    step_name,
                    base_ms,
                    max_ms
                );
            }
        }

        Ok(())
    }

    pub fn skip_policy(&self) -> SkipPolicy {
        self.skip
            .iter()
            .fold(SkipPolicy::never(), |policy, (kind, limit)| policy.skip(*kind, *limit))
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
            .iter()
            .fold(RetryPolicy::never(), |policy, (kind, limit)| policy.retry(*kind, *limit))
            .with_backoff(self.backoff.into())
    }
}
