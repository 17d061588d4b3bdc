//! Document warehouse access.
//!
//! The warehouse stores authors and their documents, one collection per
//! [`Category`]. Two backends are provided:
//!
//! - **InMemoryWarehouse**: process-local maps, used for dry runs and tests
//! - **SqliteWarehouse**: SQLite database through `sqlx`
//!
//! The aggregator does not talk to a backend directly. It consumes the two
//! narrow capabilities defined here, [`OwnerDirectory`] and
//! [`CategoryLookup`], which [`StoreDirectory`] and [`CollectionLookup`]
//! provide on top of any [`DocumentStore`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use llm_engineering::warehouse;
//!
//! let store = warehouse::connect("sqlite://warehouse.db").await?;
//! let user = store.get_or_create_user(&UserName::new("Paul", "Iusztin")).await?;
//! let articles = store.bulk_find(Category::Articles, user.id).await?;
//! ```

pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{Category, Document, UserDocument, UserName};
use crate::error::WarehouseError;

pub use memory::InMemoryWarehouse;
pub use sqlite::SqliteWarehouse;

/// `DATABASE_URL` value selecting the in-memory backend.
pub const MEMORY_URL: &str = "memory";

/// Resolves owners by name, creating them on first sight.
#[async_trait]
pub trait OwnerDirectory: Send + Sync {
    /// Returns the user with this name, creating it if needed.
    ///
    /// Calling twice with the same name returns the same id.
    async fn get_or_create(&self, name: &UserName) -> Result<UserDocument, WarehouseError>;
}

/// Fetches every document of one category owned by an author.
#[async_trait]
pub trait CategoryLookup: Send + Sync {
    async fn find_all(&self, owner_id: Uuid) -> Result<Vec<Document>, WarehouseError>;
}

/// Full read/write access to a document warehouse backend.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Returns the user with this name, creating it if needed.
    async fn get_or_create_user(&self, name: &UserName) -> Result<UserDocument, WarehouseError>;

    /// Stores a document. Documents are returned by [`bulk_find`] in
    /// insertion order.
    ///
    /// [`bulk_find`]: DocumentStore::bulk_find
    async fn insert(&self, document: &Document) -> Result<(), WarehouseError>;

    /// Finds a document of `category` by its source link.
    async fn find_by_link(
        &self,
        category: Category,
        link: &str,
    ) -> Result<Option<Document>, WarehouseError>;

    /// Returns all documents of `category` written by `author_id`.
    async fn bulk_find(
        &self,
        category: Category,
        author_id: Uuid,
    ) -> Result<Vec<Document>, WarehouseError>;
}

/// [`OwnerDirectory`] backed by a [`DocumentStore`].
#[derive(Clone)]
pub struct StoreDirectory {
    store: Arc<dyn DocumentStore>,
}

impl StoreDirectory {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl OwnerDirectory for StoreDirectory {
    async fn get_or_create(&self, name: &UserName) -> Result<UserDocument, WarehouseError> {
        self.store.get_or_create_user(name).await
    }
}

/// [`CategoryLookup`] over one collection of a [`DocumentStore`].
#[derive(Clone)]
pub struct CollectionLookup {
    store: Arc<dyn DocumentStore>,
    category: Category,
}

impl CollectionLookup {
    pub fn new(store: Arc<dyn DocumentStore>, category: Category) -> Self {
        Self { store, category }
    }

    pub fn category(&self) -> Category {
        self.category
    }
}

#[async_trait]
impl CategoryLookup for CollectionLookup {
    async fn find_all(&self, owner_id: Uuid) -> Result<Vec<Document>, WarehouseError> {
        self.store.bulk_find(self.category, owner_id).await
    }
}

/// Opens the warehouse named by `database_url`.
///
/// `memory` selects [`InMemoryWarehouse`]; anything else is handed to
/// [`SqliteWarehouse::connect`].
pub async fn connect(database_url: &str) -> Result<Arc<dyn DocumentStore>, WarehouseError> {
    if database_url == MEMORY_URL {
        tracing::info!("Using in-memory warehouse");
        return Ok(Arc::new(InMemoryWarehouse::new()));
    }

    let warehouse = SqliteWarehouse::connect(database_url).await?;
    Ok(Arc::new(warehouse))
}
