//! Process-local warehouse backend.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{Category, Document, UserDocument, UserName};
use crate::error::WarehouseError;

use super::DocumentStore;

#[derive(Default)]
struct Collections {
    users: HashMap<UserName, UserDocument>,
    documents: HashMap<Category, Vec<Document>>,
}

/// Warehouse kept entirely in memory. Contents are lost when dropped.
#[derive(Default)]
pub struct InMemoryWarehouse {
    inner: RwLock<Collections>,
}

impl InMemoryWarehouse {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of documents stored across all collections.
    pub async fn len(&self) -> usize {
        let inner = self.inner.read().await;
        inner.documents.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl DocumentStore for InMemoryWarehouse {
    async fn get_or_create_user(&self, name: &UserName) -> Result<UserDocument, WarehouseError> {
        let mut inner = self.inner.write().await;
        let user = inner.users.entry(name.clone()).or_insert_with(|| {
            tracing::debug!(user = %name, "Creating user");
            UserDocument::new(&name.first_name, &name.last_name)
        });
        Ok(user.clone())
    }

    async fn insert(&self, document: &Document) -> Result<(), WarehouseError> {
        let mut inner = self.inner.write().await;
        inner
            .documents
            .entry(document.category)
            .or_default()
            .push(document.clone());
        Ok(())
    }

    async fn find_by_link(
        &self,
        category: Category,
        link: &str,
    ) -> Result<Option<Document>, WarehouseError> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .get(&category)
            .and_then(|docs| docs.iter().find(|d| d.link == link))
            .cloned())
    }

    async fn bulk_find(
        &self,
        category: Category,
        author_id: Uuid,
    ) -> Result<Vec<Document>, WarehouseError> {
        let inner = self.inner.read().await;
        Ok(inner
            .documents
            .get(&category)
            .map(|docs| {
                docs.iter()
                    .filter(|d| d.author_id == author_id)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_get_or_create_returns_same_user() {
        let warehouse = InMemoryWarehouse::new();
        let name = UserName::new("Paul", "Iusztin");

        let a = warehouse.get_or_create_user(&name).await.unwrap();
        let b = warehouse.get_or_create_user(&name).await.unwrap();
        let other = warehouse
            .get_or_create_user(&UserName::new("Maxime", "Labonne"))
            .await
            .unwrap();

        assert_eq!(a.id, b.id);
        assert_ne!(a.id, other.id);
    }

    #[tokio::test]
    async fn test_bulk_find_filters_author_and_keeps_order() {
        let warehouse = InMemoryWarehouse::new();
        let jane = warehouse
            .get_or_create_user(&UserName::new("Jane", "Doe"))
            .await
            .unwrap();
        let john = warehouse
            .get_or_create_user(&UserName::new("John", "Doe"))
            .await
            .unwrap();

        for (i, author) in [&jane, &john, &jane].into_iter().enumerate() {
            let doc = Document::new(
                Category::Articles,
                author,
                "medium",
                format!("https://medium.com/{}", i),
                json!({"content": i.to_string()}),
            );
            warehouse.insert(&doc).await.unwrap();
        }

        let found = warehouse
            .bulk_find(Category::Articles, jane.id)
            .await
            .unwrap();
        let links: Vec<&str> = found.iter().map(|d| d.link.as_str()).collect();
        assert_eq!(links, vec!["https://medium.com/0", "https://medium.com/2"]);
        assert_eq!(warehouse.len().await, 3);
    }

    #[tokio::test]
    async fn test_find_by_link_is_scoped_to_category() {
        let warehouse = InMemoryWarehouse::new();
        let jane = warehouse
            .get_or_create_user(&UserName::new("Jane", "Doe"))
            .await
            .unwrap();
        let doc = Document::new(
            Category::Repositories,
            &jane,
            "github",
            "https://github.com/jane/repo",
            json!({}),
        );
        warehouse.insert(&doc).await.unwrap();

        assert!(warehouse
            .find_by_link(Category::Repositories, "https://github.com/jane/repo")
            .await
            .unwrap()
            .is_some());
        assert!(warehouse
            .find_by_link(Category::Posts, "https://github.com/jane/repo")
            .await
            .unwrap()
            .is_none());
    }
}
