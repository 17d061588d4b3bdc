//! llm-engineering: data pipelines for an LLM twin.
//!
//! Crawls an author's public content into a document warehouse, gathers it
//! back with a concurrent per-category fetch, cleans it, and turns it into an
//! instruction dataset.

pub mod aggregate;
pub mod cli;
pub mod domain;
pub mod error;
pub mod pipeline;
pub mod warehouse;

pub use aggregate::{AggregateError, AggregateResult, MultiSourceAggregator, Summary};
pub use domain::{Category, Document, UserDocument, UserName};
pub use error::{CrawlError, DomainError, WarehouseError};
