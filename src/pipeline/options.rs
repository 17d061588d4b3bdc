//! Named pipelines and per-run options.

use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local, TimeZone};
use serde::{Deserialize, Serialize};

/// The pipelines this crate can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineKind {
    /// Crawl an author's links into the warehouse.
    DigitalDataEtl,
    /// Query the warehouse and clean the raw documents.
    FeatureEngineering,
    /// Turn cleaned documents into an instruction dataset.
    GenerateInstructDatasets,
}

impl PipelineKind {
    /// Pipelines in the order the CLI runs them.
    pub const ALL: [PipelineKind; 3] = [
        PipelineKind::DigitalDataEtl,
        PipelineKind::FeatureEngineering,
        PipelineKind::GenerateInstructDatasets,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            PipelineKind::DigitalDataEtl => "digital_data_etl",
            PipelineKind::FeatureEngineering => "feature_engineering",
            PipelineKind::GenerateInstructDatasets => "generate_instruct_datasets",
        }
    }

    /// File name of this pipeline's parameter file under `configs/`.
    pub fn config_file_name(&self) -> String {
        format!("{}.yaml", self.name())
    }

    /// Run name stamped with `at`: `<pipeline>_run_YYYY_MM_DD_HH_MM_SS`.
    pub fn run_name_at<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> String
    where
        Tz::Offset: fmt::Display,
    {
        format!("{}_run_{}", self.name(), at.format("%Y_%m_%d_%H_%M_%S"))
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for one pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    /// Reuse cached step outputs when inputs are unchanged.
    pub enable_cache: bool,
    /// Parameter file for the pipeline.
    pub config_path: PathBuf,
    /// Unique name of the run; also its artifact directory name.
    pub run_name: String,
}

impl RunOptions {
    /// Options for `kind` rooted at `root_dir`, named after the current
    /// local time.
    pub fn for_pipeline(kind: PipelineKind, root_dir: &Path, enable_cache: bool) -> Self {
        Self {
            enable_cache,
            config_path: root_dir.join("configs").join(kind.config_file_name()),
            run_name: kind.run_name_at(&Local::now()),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn with_run_name(mut self, name: impl Into<String>) -> Self {
        self.run_name = name.into();
        self
    }
}
