//! Concurrent multi-category document fetch for one author.
//!
//! [`MultiSourceAggregator`] resolves an author through an
//! [`OwnerDirectory`], then queries every registered category at once and
//! waits for all of them:
//!
//! ```text
//!                 get_or_create(first, last)
//!                           │
//!          ┌────────────────┼────────────────┐
//!          ▼                ▼                ▼
//!     ┌─────────┐      ┌─────────┐      ┌──────────────┐
//!     │articles │      │  posts  │      │ repositories │
//!     └────┬────┘      └────┬────┘      └──────┬───────┘
//!          └────────────────┼──────────────────┘
//!                           ▼
//!                 documents + Summary
//! ```
//!
//! Only owner resolution can fail the call. A category whose lookup errors,
//! panics or times out is logged and contributes no documents.
//!
//! # Example
//!
//! ```rust,ignore
//! let aggregator = MultiSourceAggregator::from_store(store)
//!     .with_lookup_timeout(Duration::from_secs(10));
//!
//! let result = aggregator.aggregate(&UserName::parse("Paul Iusztin")?).await?;
//! println!("{} documents", result.summary.total);
//! ```

pub mod summary;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::task::{JoinError, JoinHandle};
use uuid::Uuid;

use crate::domain::{Category, Document, UserDocument, UserName};
use crate::error::WarehouseError;
use crate::warehouse::{
    CategoryLookup, CollectionLookup, DocumentStore, OwnerDirectory, StoreDirectory,
};

pub use summary::Summary;

/// Default bound on a single category lookup.
pub const DEFAULT_LOOKUP_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that abort an aggregation.
#[derive(Debug, Error)]
pub enum AggregateError {
    /// The owner could not be resolved or created.
    #[error("Failed to resolve owner '{owner}': {source}")]
    OwnerResolution {
        owner: String,
        #[source]
        source: WarehouseError,
    },
}

/// Why a single category produced no documents.
#[derive(Debug, Error)]
pub enum CategoryLookupError {
    #[error("lookup failed: {0}")]
    Lookup(#[from] WarehouseError),

    #[error("lookup timed out after {0:?}")]
    TimedOut(Duration),

    #[error("lookup task panicked: {0}")]
    Panicked(String),

    #[error("lookup task was cancelled")]
    Cancelled,
}

impl From<JoinError> for CategoryLookupError {
    fn from(err: JoinError) -> Self {
        if err.is_panic() {
            CategoryLookupError::Panicked(err.to_string())
        } else {
            CategoryLookupError::Cancelled
        }
    }
}

/// Result of querying one category.
#[derive(Debug)]
pub enum FetchOutcome {
    Fetched {
        category: Category,
        items: Vec<Document>,
    },
    Failed {
        category: Category,
        cause: CategoryLookupError,
    },
}

impl FetchOutcome {
    pub fn category(&self) -> Category {
        match self {
            FetchOutcome::Fetched { category, .. } | FetchOutcome::Failed { category, .. } => {
                *category
            }
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, FetchOutcome::Failed { .. })
    }

    /// Documents contributed to the aggregate; none for a failed lookup.
    pub fn into_items(self) -> Vec<Document> {
        match self {
            FetchOutcome::Fetched { items, .. } => items,
            FetchOutcome::Failed { .. } => Vec::new(),
        }
    }
}

/// Combined documents of one author across every category.
#[derive(Debug, Clone)]
pub struct AggregateResult {
    pub owner: UserDocument,
    /// Documents grouped by category in registration order; each category
    /// keeps the order its lookup returned.
    pub documents: Vec<Document>,
    pub summary: Summary,
}

impl AggregateResult {
    /// Flattens outcomes and tallies the summary from the documents.
    pub fn from_outcomes(owner: UserDocument, outcomes: Vec<FetchOutcome>) -> Self {
        let documents: Vec<Document> = outcomes
            .into_iter()
            .flat_map(FetchOutcome::into_items)
            .collect();
        let summary = Summary::from_documents(&documents);

        Self {
            owner,
            documents,
            summary,
        }
    }
}

type LookupHandle = JoinHandle<Result<Vec<Document>, CategoryLookupError>>;

/// Spawned lookups for one aggregation. Dropping the group aborts any task
/// still running, so no lookup outlives the call that started it.
struct TaskGroup {
    handles: Vec<(Category, LookupHandle)>,
}

impl TaskGroup {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            handles: Vec::with_capacity(capacity),
        }
    }

    fn spawn(
        &mut self,
        category: Category,
        lookup: Arc<dyn CategoryLookup>,
        owner_id: Uuid,
        timeout: Option<Duration>,
    ) {
        let handle = tokio::spawn(async move {
            let query = lookup.find_all(owner_id);
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, query).await {
                    Ok(result) => result.map_err(CategoryLookupError::from),
                    Err(_) => Err(CategoryLookupError::TimedOut(limit)),
                },
                None => query.await.map_err(CategoryLookupError::from),
            }
        });
        self.handles.push((category, handle));
    }

    /// Waits for every task, whatever order they finish in.
    async fn join(mut self) -> Vec<FetchOutcome> {
        let joined = futures::future::join_all(self.handles.iter_mut().map(|(_, h)| h)).await;

        self.handles
            .iter()
            .zip(joined)
            .map(|((category, _), result)| {
                let category = *category;
                match result.map_err(CategoryLookupError::from).and_then(|r| r) {
                    Ok(items) => FetchOutcome::Fetched { category, items },
                    Err(cause) => FetchOutcome::Failed { category, cause },
                }
            })
            .collect()
    }
}

impl Drop for TaskGroup {
    fn drop(&mut self) {
        for (_, handle) in &self.handles {
            handle.abort();
        }
    }
}

/// Fans one author's lookup out over a fixed table of categories.
#[derive(Clone)]
pub struct MultiSourceAggregator {
    directory: Arc<dyn OwnerDirectory>,
    lookups: Vec<(Category, Arc<dyn CategoryLookup>)>,
    lookup_timeout: Option<Duration>,
}

impl MultiSourceAggregator {
    /// Creates an aggregator with no categories registered.
    pub fn new(directory: Arc<dyn OwnerDirectory>) -> Self {
        Self {
            directory,
            lookups: Vec::new(),
            lookup_timeout: Some(DEFAULT_LOOKUP_TIMEOUT),
        }
    }

    /// Creates an aggregator reading every [`Category`] from `store`.
    pub fn from_store(store: Arc<dyn DocumentStore>) -> Self {
        let directory: Arc<dyn OwnerDirectory> = Arc::new(StoreDirectory::new(Arc::clone(&store)));

        Category::ALL
            .into_iter()
            .fold(Self::new(directory), |aggregator, category| {
                let lookup: Arc<dyn CategoryLookup> =
                    Arc::new(CollectionLookup::new(Arc::clone(&store), category));
                aggregator.with_lookup(category, lookup)
            })
    }

    /// Registers the lookup for `category`, replacing any earlier one.
    pub fn with_lookup(mut self, category: Category, lookup: Arc<dyn CategoryLookup>) -> Self {
        match self.lookups.iter_mut().find(|(c, _)| *c == category) {
            Some(entry) => entry.1 = lookup,
            None => self.lookups.push((category, lookup)),
        }
        self
    }

    /// Bounds each category lookup; an expired lookup counts as failed.
    pub fn with_lookup_timeout(mut self, timeout: Duration) -> Self {
        self.lookup_timeout = Some(timeout);
        self
    }

    /// Lets lookups run for as long as they take.
    pub fn without_lookup_timeout(mut self) -> Self {
        self.lookup_timeout = None;
        self
    }

    /// Registered categories, in registration order.
    pub fn categories(&self) -> Vec<Category> {
        self.lookups.iter().map(|(c, _)| *c).collect()
    }

    pub fn lookup_timeout(&self) -> Option<Duration> {
        self.lookup_timeout
    }

    /// Resolves `owner` and gathers their documents from every category.
    ///
    /// # Errors
    ///
    /// Returns `AggregateError::OwnerResolution` if the owner directory
    /// fails. No category is queried in that case.
    pub async fn aggregate(&self, owner: &UserName) -> Result<AggregateResult, AggregateError> {
        let user = self.directory.get_or_create(owner).await.map_err(|source| {
            AggregateError::OwnerResolution {
                owner: owner.to_string(),
                source,
            }
        })?;

        tracing::debug!(owner = %owner, owner_id = %user.id, "Owner resolved");

        let outcomes = self.fetch_all(user.id).await;
        let result = AggregateResult::from_outcomes(user, outcomes);

        tracing::info!(
            owner = %owner,
            total = result.summary.total,
            "Aggregated documents"
        );

        Ok(result)
    }

    /// Queries every registered category for `owner_id` concurrently.
    ///
    /// Returns one outcome per category, in registration order. Failures are
    /// logged here and never escalate.
    pub async fn fetch_all(&self, owner_id: Uuid) -> Vec<FetchOutcome> {
        let mut group = TaskGroup::with_capacity(self.lookups.len());
        for (category, lookup) in &self.lookups {
            group.spawn(*category, Arc::clone(lookup), owner_id, self.lookup_timeout);
        }

        let outcomes = group.join().await;

        for outcome in &outcomes {
            match outcome {
                FetchOutcome::Fetched { category, items } => {
                    tracing::debug!(category = %category, count = items.len(), "Query succeeded");
                }
                FetchOutcome::Failed { category, cause } => {
                    tracing::error!(category = %category, error = %cause, "'{}' request failed", category);
                }
            }
        }

        outcomes
    }
}
