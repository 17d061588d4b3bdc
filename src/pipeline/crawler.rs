//! Link crawling for the ETL pipeline.
//!
//! Each link is routed by host to a document [`Category`] and platform name,
//! fetched through a [`Crawler`], and stored in the warehouse.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::domain::{Category, Document, UserDocument};
use crate::error::CrawlError;
use crate::warehouse::DocumentStore;

/// Where a link's content belongs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkRoute {
    pub category: Category,
    pub platform: &'static str,
    /// Host without a leading `www.`.
    pub domain: String,
}

/// Routes a link to a category by its host.
///
/// GitHub links are repositories, LinkedIn links are posts, and everything
/// else is treated as an article.
pub fn route_link(link: &str) -> Result<LinkRoute, CrawlError> {
    let url = Url::parse(link).map_err(|_| CrawlError::InvalidLink(link.to_string()))?;
    let host = url
        .host_str()
        .ok_or_else(|| CrawlError::InvalidLink(link.to_string()))?;
    let domain = host.strip_prefix("www.").unwrap_or(host).to_lowercase();

    let (category, platform) = if is_domain(&domain, "github.com") {
        (Category::Repositories, "github")
    } else if is_domain(&domain, "linkedin.com") {
        (Category::Posts, "linkedin")
    } else if is_domain(&domain, "medium.com") {
        (Category::Articles, "medium")
    } else {
        (Category::Articles, "custom_article")
    };

    Ok(LinkRoute {
        category,
        platform,
        domain,
    })
}

fn is_domain(host: &str, domain: &str) -> bool {
    host == domain || host.ends_with(&format!(".{}", domain))
}

/// Fetches the content behind a link.
#[async_trait]
pub trait Crawler: Send + Sync {
    /// Returns the content fields to store for `link`.
    async fn fetch(&self, link: &str) -> Result<Value, CrawlError>;
}

/// [`Crawler`] that downloads pages over HTTP and keeps their title and text.
pub struct HttpCrawler {
    client: Client,
    title: Regex,
    noise: Regex,
    tags: Regex,
}

impl HttpCrawler {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: Client::builder()
                .timeout(timeout)
                .user_agent(concat!("llm-engineering/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_else(|_| Client::new()),
            title: Regex::new(r"(?is)<title[^>]*>(.*?)</title>").expect("static regex"),
            noise: Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>")
                .expect("static regex"),
            tags: Regex::new(r"(?s)<[^>]+>").expect("static regex"),
        }
    }

    /// Title and visible text of an HTML page.
    pub fn extract(&self, html: &str) -> Value {
        let title = self
            .title
            .captures(html)
            .and_then(|c| c.get(1))
            .map(|m| collapse_whitespace(m.as_str()))
            .unwrap_or_default();

        let without_noise = self.noise.replace_all(html, " ");
        let text = self.tags.replace_all(&without_noise, " ");

        json!({
            "title": title,
            "content": collapse_whitespace(&text),
        })
    }
}

#[async_trait]
impl Crawler for HttpCrawler {
    async fn fetch(&self, link: &str) -> Result<Value, CrawlError> {
        let response = self.client.get(link).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(CrawlError::BadStatus {
                link: link.to_string(),
                status: status.as_u16(),
            });
        }

        let body = response.text().await?;
        Ok(self.extract(&body))
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Successful and attempted crawls for one domain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainCrawlStats {
    pub successful: usize,
    pub total: usize,
}

/// Per-domain crawl results of one ETL run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrawlReport {
    pub domains: BTreeMap<String, DomainCrawlStats>,
}

impl CrawlReport {
    fn record(&mut self, domain: &str, success: bool) {
        let stats = self.domains.entry(domain.to_string()).or_default();
        stats.total += 1;
        if success {
            stats.successful += 1;
        }
    }

    pub fn successful(&self) -> usize {
        self.domains.values().map(|s| s.successful).sum()
    }

    pub fn total(&self) -> usize {
        self.domains.values().map(|s| s.total).sum()
    }

    pub fn to_metadata(&self) -> Value {
        json!(self.domains)
    }
}

/// Crawls `links` for `user` and stores each new document.
///
/// Links already stored are skipped and count as successful. A link that
/// cannot be routed, fetched or stored is logged and counted as failed.
pub async fn crawl_links(
    store: &Arc<dyn DocumentStore>,
    crawler: &dyn Crawler,
    user: &UserDocument,
    links: &[String],
) -> CrawlReport {
    let mut report = CrawlReport::default();

    for link in links {
        let route = match route_link(link) {
            Ok(route) => route,
            Err(e) => {
                tracing::warn!(link = %link, error = %e, "Skipping link");
                report.record("invalid", false);
                continue;
            }
        };

        let success = match crawl_one(store, crawler, user, link, &route).await {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(link = %link, error = %e, "Failed to crawl link");
                false
            }
        };
        report.record(&route.domain, success);
    }

    tracing::info!(
        successful = report.successful(),
        total = report.total(),
        "Crawling finished"
    );
    report
}

async fn crawl_one(
    store: &Arc<dyn DocumentStore>,
    crawler: &dyn Crawler,
    user: &UserDocument,
    link: &str,
    route: &LinkRoute,
) -> Result<(), CrawlError> {
    if store.find_by_link(route.category, link).await?.is_some() {
        tracing::info!(link = %link, "Document already exists in the warehouse");
        return Ok(());
    }

    let content = crawler.fetch(link).await?;
    let document = Document::new(route.category, user, route.platform, link, content);
    store.insert(&document).await?;

    tracing::debug!(link = %link, category = %route.category, "Stored document");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::UserName;
    use crate::error::WarehouseError;
    use crate::warehouse::InMemoryWarehouse;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StaticCrawler {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Crawler for StaticCrawler {
        async fn fetch(&self, link: &str) -> Result<Value, CrawlError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if link.contains("broken") {
                return Err(CrawlError::BadStatus {
                    link: link.to_string(),
                    status: 500,
                });
            }
            Ok(json!({"content": format!("content of {}", link)}))
        }
    }

    #[test]
    fn test_route_link() {
        let route = route_link("https://github.com/iusztinpaul/project").unwrap();
        assert_eq!(route.category, Category::Repositories);
        assert_eq!(route.platform, "github");
        assert_eq!(route.domain, "github.com");

        let route = route_link("https://www.linkedin.com/posts/abc").unwrap();
        assert_eq!(route.category, Category::Posts);
        assert_eq!(route.domain, "linkedin.com");

        let route = route_link("https://pauliusztin.medium.com/post").unwrap();
        assert_eq!(route.category, Category::Articles);
        assert_eq!(route.platform, "medium");

        let route = route_link("https://decodingml.substack.com/p/x").unwrap();
        assert_eq!(route.category, Category::Articles);
        assert_eq!(route.platform, "custom_article");
    }

    #[test]
    fn test_route_link_rejects_garbage() {
        assert!(matches!(
            route_link("not a url"),
            Err(CrawlError::InvalidLink(_))
        ));
        assert!(!is_domain("notgithub.com", "github.com"));
    }

    #[test]
    fn test_extract_title_and_text() {
        let crawler = HttpCrawler::new(Duration::from_secs(1));
        let html = r#"<html><head><title> My  Post </title>
            <style>body { color: red }</style><script>var x = 1;</script></head>
            <body><h1>Hello</h1><p>World   again</p></body></html>"#;

        let content = crawler.extract(html);
        assert_eq!(content["title"], "My Post");
        assert_eq!(content["content"], "My Post Hello World again");
    }

    #[tokio::test]
    async fn test_crawl_links_stores_and_skips_existing() {
        let store: Arc<dyn DocumentStore> = Arc::new(InMemoryWarehouse::new());
        let user = store
            .get_or_create_user(&UserName::new("Jane", "Doe"))
            .await
            .unwrap();
        let crawler = StaticCrawler {
            calls: AtomicUsize::new(0),
        };
        let links = vec![
            "https://medium.com/@jane/a".to_string(),
            "https://github.com/jane/tool".to_string(),
            "https://medium.com/@jane/broken".to_string(),
            "::bad::".to_string(),
        ];

        let report = crawl_links(&store, &crawler, &user, &links).await;
        assert_eq!(report.total(), 4);
        assert_eq!(report.successful(), 2);
        assert_eq!(
            report.domains["medium.com"],
            DomainCrawlStats {
                successful: 1,
                total: 2
            }
        );
        assert_eq!(report.domains["invalid"].successful, 0);

        let articles = store.bulk_find(Category::Articles, user.id).await.unwrap();
        assert_eq!(articles.len(), 1);
        assert_eq!(articles[0].platform, "medium");

        // Second pass: stored links are not fetched again.
        let report = crawl_links(&store, &crawler, &user, &links[..2]).await;
        assert_eq!(report.successful(), 2);
        assert_eq!(crawler.calls.load(Ordering::SeqCst), 3);
    }

    struct ReadOnlyStore;

    #[async_trait]
    impl DocumentStore for ReadOnlyStore {
        async fn get_or_create_user(
            &self,
            name: &UserName,
        ) -> Result<UserDocument, WarehouseError> {
            Ok(UserDocument::new(name.first_name.clone(), name.last_name.clone()))
        }

        async fn insert(&self, _document: &Document) -> Result<(), WarehouseError> {
            Err(WarehouseError::ConnectionFailed("read-only".to_string()))
        }

        async fn find_by_link(
            &self,
            _category: Category,
            _link: &str,
        ) -> Result<Option<Document>, WarehouseError> {
            Ok(None)
        }

        async fn bulk_find(
            &self,
            _category: Category,
            _author_id: uuid::Uuid,
        ) -> Result<Vec<Document>, WarehouseError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test]
    async fn test_store_failure_counts_as_failed_link() {
        let store: Arc<dyn DocumentStore> = Arc::new(ReadOnlyStore);
        let user = UserDocument::new("Jane", "Doe");
        let crawler = StaticCrawler {
            calls: AtomicUsize::new(0),
        };
        let route = route_link("https://github.com/jane/tool").unwrap();

        let err = crawl_one(&store, &crawler, &user, "https://github.com/jane/tool", &route)
            .await
            .unwrap_err();
        assert!(matches!(err, CrawlError::Warehouse(_)));

        let links = vec!["https://github.com/jane/tool".to_string()];
        let report = crawl_links(&store, &crawler, &user, &links).await;
        assert_eq!(
            report.domains["github.com"],
            DomainCrawlStats {
                successful: 0,
                total: 1
            }
        );
    }
}
