//! Warehouse-facing pipeline steps: owner resolution, the concurrent
//! warehouse query and document cleaning.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::aggregate::{MultiSourceAggregator, Summary};
use crate::domain::{Category, Document, UserDocument, UserName};
use crate::warehouse::DocumentStore;

use super::error::PipelineError;
use super::tracker::MetadataSink;

/// Output name of the documents returned by [`query_data_warehouse`].
pub const RAW_DOCUMENTS: &str = "raw_documents";
/// Output name of the documents returned by [`clean_documents`].
pub const CLEANED_DOCUMENTS: &str = "cleaned_documents";

static DISALLOWED_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^\w\s.,!?]").expect("static regex"));

/// Splits `user_full_name` and returns the matching user, creating it on
/// first sight.
pub async fn get_or_create_user(
    store: &Arc<dyn DocumentStore>,
    user_full_name: &str,
) -> Result<UserDocument, PipelineError> {
    let name = UserName::parse(user_full_name)?;
    let user = store.get_or_create_user(&name).await?;
    tracing::info!(user = %name, user_id = %user.id, "User resolved");
    Ok(user)
}

/// Gathers every document of each author from all categories.
///
/// Authors are queried one after another; within an author the categories
/// are fetched concurrently by the aggregator. The combined per-category
/// counts, plus a per-author breakdown, are reported to `sink` under
/// [`RAW_DOCUMENTS`].
pub async fn query_data_warehouse(
    aggregator: &MultiSourceAggregator,
    author_full_names: &[String],
    sink: &dyn MetadataSink,
) -> Result<Vec<Document>, PipelineError> {
    let mut documents = Vec::new();
    let mut per_author = serde_json::Map::new();

    for author_full_name in author_full_names {
        let name = UserName::parse(author_full_name)?;
        let result = aggregator.aggregate(&name).await?;

        per_author.insert(name.to_string(), result.summary.to_metadata());
        documents.extend(result.documents);
    }

    let mut metadata = Summary::from_documents(&documents).to_metadata();
    if let Some(object) = metadata.as_object_mut() {
        object.insert("authors".to_string(), serde_json::Value::Object(per_author));
    }
    sink.add_output_metadata(RAW_DOCUMENTS, metadata);

    Ok(documents)
}

/// A warehouse document reduced to cleaned plain text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedDocument {
    pub id: Uuid,
    pub category: Category,
    pub author_id: Uuid,
    pub author_full_name: String,
    pub platform: String,
    pub link: String,
    pub content: String,
}

impl CleanedDocument {
    pub fn from_document(document: &Document) -> Self {
        Self {
            id: document.id,
            category: document.category,
            author_id: document.author_id,
            author_full_name: document.author_full_name.clone(),
            platform: document.platform.clone(),
            link: document.link.clone(),
            content: clean_text(&document.text()),
        }
    }
}

/// Replaces characters other than word characters, whitespace and `.,!?`
/// with spaces, then collapses whitespace.
pub fn clean_text(text: &str) -> String {
    let replaced = DISALLOWED_CHARS.replace_all(text, " ");
    replaced.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Cleans every document, dropping those left without text.
pub fn clean_documents(documents: &[Document]) -> Vec<CleanedDocument> {
    let cleaned: Vec<CleanedDocument> = documents
        .iter()
        .map(CleanedDocument::from_document)
        .filter(|d| !d.content.is_empty())
        .collect();

    let dropped = documents.len() - cleaned.len();
    if dropped > 0 {
        tracing::debug!(dropped = dropped, "Dropped documents without text");
    }
    cleaned
}

/// Metadata for a set of cleaned documents, shaped like the raw summary.
pub fn cleaned_metadata(documents: &[CleanedDocument]) -> serde_json::Value {
    let mut metadata = Summary::from_categories(documents.iter().map(|d| d.category)).to_metadata();
    if let Some(object) = metadata.as_object_mut() {
        let words: usize = documents
            .iter()
            .map(|d| d.content.split_whitespace().count())
            .sum();
        object.insert("num_words".to_string(), json!(words));
    }
    metadata
}
