//! Crate-level error type

use thiserror::Error;

use super::config::ConfigError;
use crate::logging::LoggingError;
use crate::vector::{PoolError, VectorError};

/// Result type alias for document store applications
pub type Result<T> = std::result::Result<T, DocStoreError>;

/// Any failure an application built on this crate can see
#[derive(Error, Debug)]
pub enum DocStoreError {
    #[error("Vector store error: {0}")]
    Vector(#[from] VectorError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging error: {0}")]
    Logging(#[from] LoggingError),

    #[error("Worker pool error: {0}")]
    Pool(#[from] PoolError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DocStoreError {
    /// Check if the error is retryable
    pub fn is_retryable(&self) -> bool {
        match self {
            DocStoreError::Vector(e) => e.is_retryable(),
            DocStoreError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }

    /// Get suggested retry delay in milliseconds
    pub fn retry_delay_ms(&self) -> Option<u64> {
        match self {
            DocStoreError::Vector(e) => e.retry_delay_ms(),
            DocStoreError::Io(_) if self.is_retryable() => Some(100),
            _ => None,
        }
    }
}
