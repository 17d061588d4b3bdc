//! Per-category document counts.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::domain::{Category, Document};

/// Number of documents per category plus the overall total.
///
/// Only categories with at least one document appear in `counts`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub counts: BTreeMap<Category, usize>,
    pub total: usize,
}

impl Summary {
    /// Tallies documents by their declared category.
    pub fn from_documents(documents: &[Document]) -> Self {
        Self::from_categories(documents.iter().map(|d| d.category))
    }

    /// Tallies one entry per yielded category.
    pub fn from_categories(categories: impl IntoIterator<Item = Category>) -> Self {
        let mut summary = Self::default();
        for category in categories {
            *summary.counts.entry(category).or_insert(0) += 1;
            summary.total += 1;
        }
        summary
    }

    pub fn count(&self, category: Category) -> usize {
        self.counts.get(&category).copied().unwrap_or(0)
    }

    /// Output metadata in the shape
    /// `{"num_documents": N, "<collection>": {"num_documents": n}, ...}`.
    pub fn to_metadata(&self) -> Value {
        let mut metadata = Map::new();
        metadata.insert("num_documents".to_string(), json!(self.total));
        for (category, count) in &self.counts {
            metadata.insert(
                category.collection_name().to_string(),
                json!({ "num_documents": count }),
            );
        }
        Value::Object(metadata)
    }
}
