//! Errors surfaced by pipeline runs.

use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::error::{DomainError, WarehouseError};

use super::config::ConfigError;

/// Errors that can occur while running a pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Warehouse error.
    #[error("Warehouse error: {0}")]
    Warehouse(#[from] WarehouseError),

    /// Owner resolution failed during aggregation.
    #[error("Aggregation error: {0}")]
    Aggregate(#[from] AggregateError),

    /// Invalid domain value (e.g. an empty author name).
    #[error("Invalid input: {0}")]
    Domain(#[from] DomainError),

    /// A step failed.
    #[error("Step '{step}' failed: {reason}")]
    StepFailed { step: String, reason: String },

    /// IO error while writing artifacts.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error while writing artifacts.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
