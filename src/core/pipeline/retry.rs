#![allow(clippy::result_large_err)] // Policy validation returns AppError to match schema loading.

use crate::core::error::AppError;
use crate::core::types::{ErrorCategory, OutcomeKind};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Backoff and per-stage retry switches for batch lifecycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    pub backoff_ms: u64,
    pub backoff_multiplier: f32,
    pub max_backoff_ms: u64,
    pub jitter_ms: u64,
    pub retry_transform: bool,
    pub retry_validation: bool,
    pub retry_submission: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            backoff_ms: 500,
            backoff_multiplier: 2.0,
            max_backoff_ms: 30_000,
            jitter_ms: 0,
            retry_transform: true,
            retry_validation: false,
            retry_submission: true,
        }
    }
}

impl RetryPolicy {
    /// Policy without any sleeping between attempts.
    pub fn immediate() -> Self {
        Self {
            backoff_ms: 0,
            max_backoff_ms: 0,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if !self.backoff_multiplier.is_finite() || self.backoff_multiplier < 1.0 {
            return Err(AppError::new(
                ErrorCategory::LoadError,
                "options.retry.backoff_multiplier must be >= 1.0",
            )
            .with_code("AS-LOAD-005"));
        }
        Ok(())
    }

    /// Whether a failure on the given one-based attempt earns another attempt.
    pub fn should_retry(&self, failure: OutcomeKind, attempt: u32, max_retries: u32) -> bool {
        if attempt > max_retries {
            return false;
        }
        match failure {
            OutcomeKind::TransformFailed => self.retry_transform,
            OutcomeKind::ValidationFailed => self.retry_validation,
            OutcomeKind::SubmissionFailed => self.retry_submission,
            _ => false,
        }
    }

    /// Sleep before the attempt following `attempt`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(32) as i32;
        let scaled = (self.backoff_ms as f64) * f64::from(self.backoff_multiplier).powi(exponent);
        let capped = if self.max_backoff_ms > 0 {
            scaled.min(self.max_backoff_ms as f64)
        } else {
            scaled
        };
        let jitter = if self.jitter_ms > 0 {
            rand::thread_rng().gen_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis((capped as u64).saturating_add(jitter))
    }
}

/// Optional wall-clock bounds per stage invocation, in milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    pub transform_ms: Option<u64>,
    pub validate_ms: Option<u64>,
    pub submit_ms: Option<u64>,
}

impl StageTimeouts {
    pub fn transform(&self) -> Option<Duration> {
        self.transform_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Option<Duration> {
        self.validate_ms.map(Duration::from_millis)
    }

    pub fn submit(&self) -> Option<Duration> {
        self.submit_ms.map(Duration::from_millis)
    }
}
