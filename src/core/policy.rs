//! Skip and retry policies
//!
//! Both policies are pure decision functions over a finite [`ErrorKind`]
//! mapping. The counts they are consulted with are owned and incremented by
//! the chunk executor.

use crate::core::error::ErrorKind;
use std::collections::HashMap;
use std::time::Duration;

/// Outcome of consulting the skip policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipDecision {
    /// Drop the offending item and continue
    Skip,
    /// Abort the step
    Fatal,
}

/// Outcome of consulting the retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-invoke the transformer on the same item
    RetryAgain,
    /// Stop retrying; the item goes to the skip policy
    GiveUp,
}

/// `Skip` iff the kind is skip-eligible and `skips_so_far < limit`
pub fn classify_skip(eligible: bool, skips_so_far: u32, limit: u32) -> SkipDecision {
    if eligible && skips_so_far < limit {
        SkipDecision::Skip
    } else {
        SkipDecision::Fatal
    }
}

/// `RetryAgain` iff the kind is retry-eligible and `retries_so_far < limit`
pub fn classify_retry(eligible: bool, retries_so_far: u32, limit: u32) -> RetryDecision {
    if eligible && retries_so_far < limit {
        RetryDecision::RetryAgain
    } else {
        RetryDecision::GiveUp
    }
}

/// Per-kind skip limits for one step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkipPolicy {
    limits: HashMap<ErrorKind, u32>,
}

impl SkipPolicy {
    /// A policy under which every failure is fatal
    pub fn never() -> Self {
        Self::default()
    }

    /// Register `kind` as skippable up to `limit` times per step execution
    pub fn skip(mut self, kind: ErrorKind, limit: u32) -> Self {
        self.limits.insert(kind, limit);
        self
    }

    pub fn limit_for(&self, kind: ErrorKind) -> Option<u32> {
        self.limits.get(&kind).copied()
    }

    /// Decide whether a failure of `kind` may be skipped, given how many
    /// failures of that kind this step has already skipped
    pub fn classify(&self, kind: ErrorKind, skips_so_far: u32) -> SkipDecision {
        match self.limit_for(kind) {
            Some(limit) if !kind.is_always_fatal() => classify_skip(true, skips_so_far, limit),
            _ => SkipDecision::Fatal,
        }
    }
}

/// Delay between retry attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffPolicy {
    /// Retry immediately
    #[default]
    None,
    /// Fixed delay between retries
    Fixed(Duration),
    /// base * 2^retry, capped at max
    Exponential { base: Duration, max: Duration },
}

impl BackoffPolicy {
    /// Delay before retry number `retry` (0-indexed)
    pub fn delay_for(&self, retry: u32) -> Duration {
        match self {
            BackoffPolicy::None => Duration::ZERO,
            BackoffPolicy::Fixed(d) => *d,
            BackoffPolicy::Exponential { base, max } => {
                let millis = (base.as_millis() as u64).saturating_mul(2u64.saturating_pow(retry));
                Duration::from_millis(millis).min(*max)
            }
        }
    }
}

/// Per-kind retry limits for one step
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    limits: HashMap<ErrorKind, u32>,
    backoff: BackoffPolicy,
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn never() -> Self {
        Self::default()
    }

    /// Register `kind` as retryable up to `limit` times per item
    pub fn retry(mut self, kind: ErrorKind, limit: u32) -> Self {
        self.limits.insert(kind, limit);
        self
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    pub fn limit_for(&self, kind: ErrorKind) -> Option<u32> {
        self.limits.get(&kind).copied()
    }

    /// Decide whether to re-attempt an item that failed with `kind`, given how
    /// many retries that item has already had
    pub fn classify(&self, kind: ErrorKind, retries_so_far: u32) -> RetryDecision {
        match self.limit_for(kind) {
            Some(limit) if !kind.is_always_fatal() => classify_retry(true, retries_so_far, limit),
            _ => RetryDecision::GiveUp,
        }
    }
}
