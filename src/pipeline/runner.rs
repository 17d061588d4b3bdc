//! Executes named pipelines step by step.
//!
//! [`PipelineRunner`] owns the warehouse and crawler shared by every run. A
//! run loads the pipeline's parameter file, executes its steps through a
//! [`RunTracker`], and reuses cached outputs of pure steps when caching is
//! enabled.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};

use crate::aggregate::MultiSourceAggregator;
use crate::domain::Document;
use crate::warehouse::{self, DocumentStore};

use super::cache::{CacheKey, StepCache};
use super::config::{
    load_parameters, EtlParameters, FeatureEngineeringParameters, InstructDatasetParameters,
    Settings,
};
use super::crawler::{crawl_links, Crawler, HttpCrawler};
use super::dataset::{
    build_instruction_samples, train_test_split, InstructDataset, InstructSample,
};
use super::error::PipelineError;
use super::options::{PipelineKind, RunOptions};
use super::steps::{
    clean_documents, cleaned_metadata, get_or_create_user, query_data_warehouse,
    CleanedDocument, CLEANED_DOCUMENTS, RAW_DOCUMENTS,
};
use super::tracker::{MetadataSink, RunRecord, RunTracker, StepContext};

/// Runs pipelines against one warehouse.
pub struct PipelineRunner {
    settings: Settings,
    store: Arc<dyn DocumentStore>,
    crawler: Arc<dyn Crawler>,
}

impl PipelineRunner {
    /// Creates a runner from explicit collaborators.
    pub fn new(settings: Settings, store: Arc<dyn DocumentStore>, crawler: Arc<dyn Crawler>) -> Self {
        Self {
            settings,
            store,
            crawler,
        }
    }

    /// Opens the warehouse named in `settings` and crawls over HTTP.
    pub async fn connect(settings: Settings) -> Result<Self, PipelineError> {
        settings.validate()?;
        let store = warehouse::connect(&settings.database_url).await?;
        let crawler = Arc::new(HttpCrawler::new(settings.crawl_timeout));
        Ok(Self::new(settings, store, crawler))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// Runs `kind` with `options`.
    ///
    /// The run record is persisted whether the run completes or fails.
    ///
    /// # Errors
    ///
    /// Returns the error of the first failing step.
    pub async fn run(
        &self,
        kind: PipelineKind,
        options: &RunOptions,
    ) -> Result<RunRecord, PipelineError> {
        tracing::info!(
            pipeline = %kind,
            run = %options.run_name,
            config = %options.config_path.display(),
            enable_cache = options.enable_cache,
            "Starting pipeline run"
        );

        let tracker = RunTracker::new(&self.settings.artifact_path, kind, options);
        let cache = StepCache::new(&self.settings.artifact_path, options.enable_cache);

        let result = match kind {
            PipelineKind::DigitalDataEtl => self.digital_data_etl(&tracker, options).await,
            PipelineKind::FeatureEngineering => {
                self.feature_engineering(&tracker, &cache, options).await
            }
            PipelineKind::GenerateInstructDatasets => {
                self.generate_instruct_datasets(&tracker, &cache, options).await
            }
        };

        match result {
            Ok(()) => tracker.complete().await,
            Err(e) => {
                if let Err(save_err) = tracker.fail(&e).await {
                    tracing::warn!(error = %save_err, "Failed to persist run record");
                }
                Err(e)
            }
        }
    }

    async fn digital_data_etl(
        &self,
        tracker: &RunTracker,
        options: &RunOptions,
    ) -> Result<(), PipelineError> {
        let params: EtlParameters = load_parameters(&options.config_path)?;

        let step = tracker.start_step("get_or_create_user");
        let user = finish(step, get_or_create_user(&self.store, &params.user_full_name).await)?;
        tracker.save_output("user", &user).await?;

        let step = tracker.start_step("crawl_links");
        let report = crawl_links(&self.store, self.crawler.as_ref(), &user, &params.links).await;
        step.add_output_metadata("crawled_links", report.to_metadata());
        step.complete();

        tracker.save_output("crawled_links", &report).await?;
        Ok(())
    }

    async fn feature_engineering(
        &self,
        tracker: &RunTracker,
        cache: &StepCache,
        options: &RunOptions,
    ) -> Result<(), PipelineError> {
        let params: FeatureEngineeringParameters = load_parameters(&options.config_path)?;
        params.validate()?;

        let raw = self.query_step(tracker, &params.author_full_names).await?;
        tracker.save_output(RAW_DOCUMENTS, &raw).await?;

        let cleaned = clean_step(tracker, cache, &raw).await?;
        tracker.save_output(CLEANED_DOCUMENTS, &cleaned).await?;
        Ok(())
    }

    async fn generate_instruct_datasets(
        &self,
        tracker: &RunTracker,
        cache: &StepCache,
        options: &RunOptions,
    ) -> Result<(), PipelineError> {
        let params: InstructDatasetParameters = load_parameters(&options.config_path)?;
        params.validate()?;

        let raw = self.query_step(tracker, &params.author_full_names).await?;
        let cleaned = clean_step(tracker, cache, &raw).await?;

        let samples: Vec<InstructSample> = cached_step(
            tracker,
            cache,
            "build_instruction_samples",
            &(&cleaned, params.chunk_size),
            || build_instruction_samples(&cleaned, params.chunk_size),
            |samples| ("instruct_samples", json!({ "num_samples": samples.len() })),
        )
        .await?;

        let step = tracker.start_step("train_test_split");
        let dataset = train_test_split(samples, params.test_split_size, params.seed);
        step.add_output_metadata("instruct_datasets", dataset.to_metadata());
        let dataset = finish(step, non_empty(dataset))?;

        let step = tracker.start_step("export_dataset");
        let (train, test) = finish(step, dataset.export_jsonl(tracker.run_dir()))?;
        tracing::info!(
            train = %train.display(),
            test = %test.display(),
            samples = dataset.len(),
            "Exported instruction dataset"
        );
        Ok(())
    }

    async fn query_step(
        &self,
        tracker: &RunTracker,
        author_full_names: &[String],
    ) -> Result<Vec<Document>, PipelineError> {
        let aggregator = MultiSourceAggregator::from_store(Arc::clone(&self.store))
            .with_lookup_timeout(self.settings.lookup_timeout);

        let step = tracker.start_step("query_data_warehouse");
        let result = query_data_warehouse(&aggregator, author_full_names, &step).await;
        finish(step, result)
    }
}

async fn clean_step(
    tracker: &RunTracker,
    cache: &StepCache,
    raw: &[Document],
) -> Result<Vec<CleanedDocument>, PipelineError> {
    cached_step(
        tracker,
        cache,
        "clean_documents",
        raw,
        || clean_documents(raw),
        |cleaned| (CLEANED_DOCUMENTS, cleaned_metadata(cleaned)),
    )
    .await
}

/// Runs a pure step, reusing its cached output when the inputs match a
/// previous run.
async fn cached_step<I, T>(
    tracker: &RunTracker,
    cache: &StepCache,
    name: &str,
    inputs: &I,
    compute: impl FnOnce() -> T,
    metadata: impl Fn(&T) -> (&'static str, Value),
) -> Result<T, PipelineError>
where
    I: Serialize + ?Sized,
    T: Serialize + DeserializeOwned,
{
    let step = tracker.start_step(name);
    let key = match CacheKey::new(name, inputs) {
        Ok(key) => key,
        Err(e) => {
            step.fail(&e);
            return Err(e);
        }
    };

    if let Some(output) = cache.load::<T>(name, &key).await {
        let (output_name, value) = metadata(&output);
        step.add_output_metadata(output_name, value);
        step.complete_cached();
        return Ok(output);
    }

    let output = compute();
    if let Err(e) = cache.store(name, &key, &output).await {
        step.fail(&e);
        return Err(e);
    }

    let (output_name, value) = metadata(&output);
    step.add_output_metadata(output_name, value);
    step.complete();
    Ok(output)
}

fn non_empty(dataset: InstructDataset) -> Result<InstructDataset, PipelineError> {
    if dataset.is_empty() {
        return Err(PipelineError::StepFailed {
            step: "train_test_split".to_string(),
            reason: "no instruction samples for the given authors".to_string(),
        });
    }
    Ok(dataset)
}

/// Completes or fails `step` according to `result`.
fn finish<T>(step: StepContext<'_>, result: Result<T, PipelineError>) -> Result<T, PipelineError> {
    match result {
        Ok(value) => {
            step.complete();
            Ok(value)
        }
        Err(e) => {
            step.fail(&e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Category, UserName};
    use crate::error::CrawlError;
    use crate::pipeline::tracker::RunStatus;
    use crate::warehouse::InMemoryWarehouse;
    use async_trait::async_trait;
    use std::path::Path;

    struct EchoCrawler;

    #[async_trait]
    impl Crawler for EchoCrawler {
        async fn fetch(&self, link: &str) -> Result<Value, CrawlError> {
            Ok(json!({"content": format!("Crawled words from {}", link)}))
        }
    }

    fn runner(artifacts: &Path) -> PipelineRunner {
        PipelineRunner::new(
            Settings::new().with_artifact_path(artifacts),
            Arc::new(InMemoryWarehouse::new()),
            Arc::new(EchoCrawler),
        )
    }

    fn options(root: &Path, kind: PipelineKind, yaml: &str) -> RunOptions {
        let path = root.join(kind.config_file_name());
        std::fs::write(&path, yaml).unwrap();
        RunOptions::for_pipeline(kind, root, true)
            .with_config_path(path)
            .with_run_name(format!("{}_test", kind))
    }

    #[tokio::test]
    async fn test_etl_run_stores_documents() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path());
        let options = options(
            dir.path(),
            PipelineKind::DigitalDataEtl,
            "parameters:\n  user_full_name: Jane Doe\n  links:\n    - https://github.com/jane/a\n    - https://www.linkedin.com/posts/b\n",
        );

        let record = runner.run(PipelineKind::DigitalDataEtl, &options).await.unwrap();
        assert_eq!(record.status, RunStatus::Completed);
        assert_eq!(
            record.step("crawl_links").unwrap().outputs["crawled_links"]["github.com"],
            json!({"successful": 1, "total": 1})
        );

        let user = runner
            .store()
            .get_or_create_user(&UserName::new("Jane", "Doe"))
            .await
            .unwrap();
        let posts = runner.store().bulk_find(Category::Posts, user.id).await.unwrap();
        assert_eq!(posts.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_config_fails_run_and_persists_record() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path());
        let options = RunOptions::for_pipeline(PipelineKind::FeatureEngineering, dir.path(), false)
            .with_run_name("missing");

        let err = runner
            .run(PipelineKind::FeatureEngineering, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        let saved = std::fs::read(dir.path().join("runs/missing/run.json")).unwrap();
        let record: RunRecord = serde_json::from_slice(&saved).unwrap();
        assert_eq!(record.status, RunStatus::Failed);
    }

    #[tokio::test]
    async fn test_clean_step_uses_cache_on_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path());
        let yaml = "parameters:\n  author_full_names: [Jane Doe]\n";

        let first = options(dir.path(), PipelineKind::FeatureEngineering, yaml);
        let record = runner.run(PipelineKind::FeatureEngineering, &first).await.unwrap();
        assert!(!record.step("clean_documents").unwrap().cached);

        let second = first.clone().with_run_name("second");
        let record = runner.run(PipelineKind::FeatureEngineering, &second).await.unwrap();
        assert!(record.step("clean_documents").unwrap().cached);
        assert!(!record.step("query_data_warehouse").unwrap().cached);
    }

    #[tokio::test]
    async fn test_dataset_without_documents_fails_split_step() {
        let dir = tempfile::tempdir().unwrap();
        let runner = runner(dir.path());
        let options = options(
            dir.path(),
            PipelineKind::GenerateInstructDatasets,
            "parameters:\n  author_full_names: [Nobody Here]\n",
        );

        let err = runner
            .run(PipelineKind::GenerateInstructDatasets, &options)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::StepFailed { .. }));

        let record: RunRecord = serde_json::from_slice(
            &std::fs::read(dir.path().join("runs").join(&options.run_name).join("run.json"))
                .unwrap(),
        )
        .unwrap();
        assert_eq!(record.status, RunStatus::Failed);
        let split = record.step("train_test_split").unwrap();
        assert_eq!(split.status, RunStatus::Failed);
        assert!(split.error.as_deref().unwrap().contains("no instruction samples"));
        assert!(record.step("export_dataset").is_none());
    }
}
