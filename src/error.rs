//! Error types for llm-engineering operations.
//!
//! Defines error types for the subsystems shared across pipelines:
//! - Domain value parsing
//! - Document warehouse access
//! - Link crawling

use thiserror::Error;

/// Errors raised while building domain values.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("User name is empty")]
    EmptyUserName,

    #[error("Unknown document category: {0}")]
    UnknownCategory(String),
}

/// Errors that can occur while reading from or writing to the warehouse.
#[derive(Debug, Error)]
pub enum WarehouseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(#[from] sqlx::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Corrupt record in '{collection}': {reason}")]
    CorruptRecord { collection: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors that can occur while crawling a link.
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Invalid link '{0}'")]
    InvalidLink(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Unexpected status {status} for '{link}'")]
    BadStatus { link: String, status: u16 },

    #[error("Failed to store crawled document: {0}")]
    Warehouse(#[from] WarehouseError),
}
