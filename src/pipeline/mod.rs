//! Named data pipelines over the document warehouse.
//!
//! # Pipelines
//!
//! - **digital_data_etl**: resolve an author, crawl their links and store
//!   each page as a document of the matching category
//! - **feature_engineering**: query every category for a list of authors,
//!   then clean the raw documents
//! - **generate_instruct_datasets**: query and clean as above, then build an
//!   instruction dataset and export train/test JSONL files
//!
//! Each run reads its parameters from `<root>/configs/<pipeline>.yaml`,
//! records its steps in `<artifacts>/runs/<run_name>/run.json`, and caches the
//! outputs of pure steps under `<artifacts>/cache/`.
//!
//! # Example
//!
//! ```rust,ignore
//! use llm_engineering::pipeline::{PipelineKind, PipelineRunner, RunOptions, Settings};
//!
//! let runner = PipelineRunner::connect(Settings::from_env()?).await?;
//! let options = RunOptions::for_pipeline(PipelineKind::FeatureEngineering, ".".as_ref(), true);
//! let record = runner.run(PipelineKind::FeatureEngineering, &options).await?;
//! println!("{} finished: {}", record.run_name, record.status);
//! ```

pub mod cache;
pub mod config;
pub mod crawler;
pub mod dataset;
pub mod error;
pub mod options;
pub mod runner;
pub mod steps;
pub mod tracker;

pub use cache::{CacheKey, StepCache};
pub use config::{
    ConfigError, EtlParameters, FeatureEngineeringParameters, InstructDatasetParameters, Settings,
};
pub use crawler::{route_link, CrawlReport, Crawler, HttpCrawler};
pub use dataset::{InstructDataset, InstructSample};
pub use error::PipelineError;
pub use options::{PipelineKind, RunOptions};
pub use runner::PipelineRunner;
pub use steps::{clean_text, CleanedDocument};
pub use tracker::{MetadataSink, RunRecord, RunStatus, RunTracker, StepRecord};
