//! Document categories and the records stored in the warehouse.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::user::UserDocument;
use crate::error::DomainError;

/// A statically known document collection belonging to an author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// Long-form articles (Medium, personal blogs, ...).
    Articles,
    /// Short social posts (LinkedIn).
    Posts,
    /// Source code repositories (GitHub).
    Repositories,
}

impl Category {
    /// Every category, in the order lookups are registered by default.
    pub const ALL: [Category; 3] = [Category::Articles, Category::Posts, Category::Repositories];

    /// Name of the collection this category is stored in.
    pub fn collection_name(&self) -> &'static str {
        match self {
            Category::Articles => "articles",
            Category::Posts => "posts",
            Category::Repositories => "repositories",
        }
    }

    /// Singular noun used when phrasing instructions about a document.
    pub fn singular(&self) -> &'static str {
        match self {
            Category::Articles => "article",
            Category::Posts => "post",
            Category::Repositories => "repository",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.collection_name())
    }
}

impl FromStr for Category {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "articles" | "article" => Ok(Category::Articles),
            "posts" | "post" => Ok(Category::Posts),
            "repositories" | "repository" => Ok(Category::Repositories),
            _ => Err(DomainError::UnknownCategory(s.to_string())),
        }
    }
}

/// A single piece of content owned by one author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub category: Category,
    pub author_id: Uuid,
    pub author_full_name: String,
    /// Platform the content was crawled from (e.g. "medium", "github").
    pub platform: String,
    pub link: String,
    /// Free-form content fields, keyed by field name.
    pub content: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Document {
    /// Creates a document for `author` with a fresh id.
    pub fn new(
        category: Category,
        author: &UserDocument,
        platform: impl Into<String>,
        link: impl Into<String>,
        content: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            category,
            author_id: author.id,
            author_full_name: author.full_name(),
            platform: platform.into(),
            link: link.into(),
            content,
            created_at: Utc::now(),
        }
    }

    /// Collection the document belongs to.
    pub fn collection_name(&self) -> &'static str {
        self.category.collection_name()
    }

    /// All string values of the content object joined by a single space,
    /// in field-name order.
    pub fn text(&self) -> String {
        match &self.content {
            serde_json::Value::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                keys.into_iter()
                    .filter_map(|k| map.get(k).and_then(|v| v.as_str()))
                    .filter(|s| !s.is_empty())
                    .collect::<Vec<_>>()
                    .join(" ")
            }
            serde_json::Value::String(s) => s.clone(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_category_collection_names() {
        assert_eq!(Category::Articles.collection_name(), "articles");
        assert_eq!(Category::Posts.collection_name(), "posts");
        assert_eq!(Category::Repositories.collection_name(), "repositories");
        assert_eq!(format!("{}", Category::Posts), "posts");
    }

    #[test]
    fn test_category_from_str() {
        assert_eq!("Articles".parse::<Category>().unwrap(), Category::Articles);
        assert_eq!("post".parse::<Category>().unwrap(), Category::Posts);
        assert!("videos".parse::<Category>().is_err());
    }

    #[test]
    fn test_document_text_joins_string_fields_in_key_order() {
        let user = UserDocument::new("Jane", "Doe");
        let doc = Document::new(
            Category::Articles,
            &user,
            "medium",
            "https://medium.com/@jane/a",
            json!({"title": "Hello", "content": "World", "claps": 12}),
        );

        assert_eq!(doc.text(), "World Hello");
        assert_eq!(doc.author_full_name, "Jane Doe");
        assert_eq!(doc.author_id, user.id);
    }
}
