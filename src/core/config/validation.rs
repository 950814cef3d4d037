#![allow(clippy::result_large_err)]

use super::AutoshiftConfig;
use crate::core::error::AppError;
use crate::core::types::ErrorCategory;

pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate configuration rules
    pub fn validate(config: &AutoshiftConfig) -> Result<(), AppError> {
        if config.ledger.dir.as_os_str().is_empty() {
            return Err(AppError::new(
                ErrorCategory::ConfigError,
                "ledger.dir cannot be empty",
            ));
        }

        if config.run.concurrency == Some(0) {
            return Err(AppError::new(
                ErrorCategory::ConfigError,
                "run.concurrency must be at least 1",
            )
            .with_suggestion("Set AUTOSHIFT_CONCURRENCY or [run] concurrency to 1 or more"));
        }

        Ok(())
    }
}
