//! Rate-limited, retrying and cached access to a [`ComicCatalog`].
//!
//! Every remote call goes through [`with_retry`], which takes a token from the
//! shared [`RateLimiter`] before each attempt. Cacheable calls check the
//! [`ResponseCache`] first and skip the limiter entirely on a hit.

mod retry;

pub use retry::{with_retry, RetryPolicy};

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::{cache_key, MemoryResponseCache, ResponseCache};
use crate::catalog::{
    CatalogError, ComicCatalog, FailureClass, Issue, IssueFilter, Person, Volume,
};
use crate::config::{Config, SearchConfig};
use crate::metrics::CACHE_LOOKUPS;
use crate::rate_limit::RateLimiter;

/// Author value hosts use when they know nothing about the author.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

struct CacheSettings {
    cache: Arc<dyn ResponseCache>,
    hours: u64,
}

/// Catalog access with rate limiting, retries and caching.
pub struct CatalogClient {
    catalog: Arc<dyn ComicCatalog>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    search: SearchConfig,
    cache: Option<CacheSettings>,
}

impl CatalogClient {
    /// Create an uncached client.
    pub fn new(
        catalog: Arc<dyn ComicCatalog>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        search: SearchConfig,
    ) -> Self {
        Self {
            catalog,
            limiter,
            retry,
            search,
            cache: None,
        }
    }

    /// Create a client from configuration, with an in-memory cache when
    /// caching is enabled.
    pub fn from_config(
        catalog: Arc<dyn ComicCatalog>,
        limiter: Arc<RateLimiter>,
        config: &Config,
    ) -> Self {
        let client = Self::new(
            catalog,
            limiter,
            RetryPolicy::new(config.retry.max_attempts),
            config.search.clone(),
        );

        if config.cache.is_active() {
            client.with_cache(Arc::new(MemoryResponseCache::new()), config.cache.hours)
        } else {
            client
        }
    }

    /// Serve cacheable calls from `cache`, keeping entries for `hours`.
    pub fn with_cache(mut self, cache: Arc<dyn ResponseCache>, hours: u64) -> Self {
        self.cache = Some(CacheSettings { cache, hours });
        self
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Fetch a volume. A volume the catalog cannot find is `None`.
    pub async fn lookup_volume(&self, volume_id: u64) -> Result<Option<Volume>, CatalogError> {
        self.cached("lookup_volume", volume_id.to_string(), || async {
            debug!(volume_id, "Looking up volume");
            let catalog = &self.catalog;
            let result = with_retry("lookup_volume", &self.retry, &self.limiter, || {
                catalog.lookup_volume(volume_id)
            })
            .await;

            match result {
                Ok(volume) => Ok(Some(volume)),
                Err(e) if e.is_not_found() => {
                    warn!(volume_id, "Failed to find volume");
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })
        .await
    }

    /// Volumes matching every token, falling back to matching any token
    /// (with a smaller cap) when the strict search finds nothing.
    pub async fn search_volumes(&self, tokens: &[String]) -> Result<Vec<Volume>, CatalogError> {
        if tokens.is_empty() {
            return Ok(Vec::new());
        }

        let limit = self.search.volume_limit;
        let args = format!("limit-{}-{}", limit, tokens.join(" "));

        self.cached("search_volumes", args, || async {
            let strict = tokens.join(" AND ");
            debug!(query = %strict, "Searching for volumes");
            let mut volumes = self.run_volume_search(&strict, limit).await?;

            if volumes.is_empty() {
                let relaxed = tokens.join(" ");
                debug!(query = %relaxed, "Searching for volumes without AND in query");
                volumes = self
                    .run_volume_search(&relaxed, self.search.fallback_volume_limit)
                    .await?;
            }

            debug!(
                count = volumes.len(),
                ids = ?volumes.iter().map(|v| v.id).collect::<Vec<_>>(),
                "Volume matches found"
            );
            Ok(volumes)
        })
        .await
    }

    /// Walk result pages until `limit` volumes are collected or the
    /// catalog runs out. Each page is a separate rate-limited call.
    async fn run_volume_search(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Volume>, CatalogError> {
        let catalog = &self.catalog;
        let mut volumes = Vec::new();
        let mut offset = 0;

        while volumes.len() < limit {
            let page = with_retry("search_volumes", &self.retry, &self.limiter, || {
                catalog.search_volumes(query, offset, limit)
            })
            .await?;
            volumes.extend(page.items);

            match page.next_offset {
                Some(next) => offset = next,
                None => break,
            }
        }

        volumes.truncate(limit);
        Ok(volumes)
    }

    /// Fetch an issue. Missing issues, and issues without a volume, are `None`.
    ///
    /// When the issue record carries no publisher, the publisher is taken
    /// from its volume. Quota and unexpected failures of that volume lookup
    /// fail the issue lookup; anything else leaves the publisher unset.
    pub async fn lookup_issue(&self, issue_id: u64) -> Result<Option<Issue>, CatalogError> {
        self.cached("lookup_issue", issue_id.to_string(), || async {
            debug!(issue_id, "Looking up issue");
            let catalog = &self.catalog;
            let result = with_retry("lookup_issue", &self.retry, &self.limiter, || {
                catalog.lookup_issue(issue_id)
            })
            .await;

            let mut issue = match result {
                Ok(Some(issue)) => issue,
                Ok(None) => {
                    warn!(issue_id, "Found issue but failed to find issue volume");
                    return Ok(None);
                }
                Err(e) if e.is_not_found() => {
                    warn!(issue_id, "Failed to find issue");
                    return Ok(None);
                }
                Err(e) => return Err(e),
            };

            if issue.publisher_name.is_none() {
                match self.lookup_volume(issue.volume_id).await {
                    Ok(volume) => issue.publisher_name = volume.and_then(|v| v.publisher_name),
                    Err(e)
                        if matches!(
                            e.class(),
                            FailureClass::QuotaExceeded | FailureClass::Unexpected
                        ) =>
                    {
                        return Err(e)
                    }
                    Err(e) => warn!(
                        issue_id,
                        volume_id = issue.volume_id,
                        error = %e,
                        "Failed to look up issue publisher"
                    ),
                }
            }

            debug!(
                issue_id,
                volume = %issue.volume_name,
                issue_number = %issue.issue_number,
                "Found issue"
            );
            Ok(Some(issue))
        })
        .await
    }

    /// IDs of issues in any of the volumes, optionally with one issue number.
    ///
    /// Volume IDs are sent in chunks of `search.issue_page_size`, and every
    /// result page of every chunk is read. The result is the union in
    /// first-seen order.
    pub async fn search_issue_ids(
        &self,
        volume_ids: &[u64],
        issue_number: Option<&str>,
    ) -> Result<Vec<u64>, CatalogError> {
        if volume_ids.is_empty() {
            return Ok(Vec::new());
        }

        let args = format!(
            "{}-{}",
            volume_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join("|"),
            issue_number.unwrap_or("any")
        );

        self.cached("search_issue_ids", args, || async {
            let catalog = &self.catalog;
            let mut seen = HashSet::new();
            let mut all_issue_ids = Vec::new();

            for page in volume_ids.chunks(self.search.issue_page_size.max(1)) {
                let filter = IssueFilter::new(page.to_vec(), issue_number.map(str::to_string));
                debug!(filter = %filter.to_filter_string(), "Searching for issues");

                let mut offset = 0;
                loop {
                    let page_ids =
                        with_retry("search_issue_ids", &self.retry, &self.limiter, || {
                            catalog.search_issue_ids(&filter, offset)
                        })
                        .await?;

                    debug!(count = page_ids.items.len(), offset, "Issue ID matches found");
                    all_issue_ids.extend(page_ids.items.into_iter().filter(|id| seen.insert(*id)));

                    match page_ids.next_offset {
                        Some(next) => offset = next,
                        None => break,
                    }
                }
            }

            debug!(count = all_issue_ids.len(), "Total issue ID matches found");
            Ok(all_issue_ids)
        })
        .await
    }

    /// People whose name matches `name`.
    pub async fn search_people(&self, name: &str) -> Result<Vec<Person>, CatalogError> {
        debug!(name, "Searching for people");
        let catalog = &self.catalog;
        with_retry("search_people", &self.retry, &self.limiter, || {
            catalog.search_people(name)
        })
        .await
    }

    /// Issues credited to the first author.
    ///
    /// `None` means no author filter applies: no author was given, the
    /// author is [`UNKNOWN_AUTHOR`], or the catalog knows nobody by that name.
    pub async fn find_author_issue_ids(
        &self,
        authors: &[String],
    ) -> Result<Option<HashSet<u64>>, CatalogError> {
        let Some(author) = authors.first().map(|a| a.trim()) else {
            return Ok(None);
        };
        if author.is_empty() || author == UNKNOWN_AUTHOR {
            return Ok(None);
        }

        let people = self.search_people(author).await?;
        if people.is_empty() {
            debug!(author, "No catalog people match author, not filtering");
            return Ok(None);
        }

        let issue_ids: HashSet<u64> = people
            .iter()
            .flat_map(|person| person.issue_ids.iter().copied())
            .collect();
        debug!(
            author,
            people = people.len(),
            issues = issue_ids.len(),
            "Author issue matches found"
        );
        Ok(Some(issue_ids))
    }

    /// Cover URLs of an issue, best quality first. `best_only` keeps just
    /// the first one.
    pub async fn cover_urls(
        &self,
        issue_id: u64,
        best_only: bool,
    ) -> Result<Vec<String>, CatalogError> {
        let mut urls = self
            .cached("cover_urls", issue_id.to_string(), || async {
                debug!(issue_id, "Looking up issue image");
                let catalog = &self.catalog;
                let result = with_retry("cover_urls", &self.retry, &self.limiter, || {
                    catalog.lookup_issue_image_urls(issue_id)
                })
                .await;

                match result {
                    Ok(urls) => Ok(urls),
                    Err(e) if e.is_not_found() => {
                        warn!(issue_id, "Failed to find issue");
                        Ok(Vec::new())
                    }
                    Err(e) => Err(e),
                }
            })
            .await?;

        if best_only {
            urls.truncate(1);
        }
        Ok(urls)
    }

    /// Serve `compute` from the cache when possible. Only successful,
    /// non-null results are stored.
    async fn cached<T, F, Fut>(
        &self,
        operation: &str,
        args: String,
        compute: F,
    ) -> Result<T, CatalogError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, CatalogError>>,
    {
        let Some(settings) = &self.cache else {
            return compute().await;
        };

        let key = cache_key(operation, settings.hours, &args);
        if let Some(value) = settings.cache.get(&key).await {
            match serde_json::from_value(value) {
                Ok(hit) => {
                    CACHE_LOOKUPS.with_label_values(&[operation, "hit"]).inc();
                    debug!(key = %key, "Cache hit");
                    return Ok(hit);
                }
                Err(e) => warn!(key = %key, error = %e, "Discarding unreadable cache entry"),
            }
        }
        CACHE_LOOKUPS.with_label_values(&[operation, "miss"]).inc();

        let result = compute().await?;
        match serde_json::to_value(&result) {
            Ok(serde_json::Value::Null) => {}
            Ok(value) => {
                let ttl = Duration::from_secs(settings.hours * 3600);
                settings.cache.put(&key, value, ttl).await;
            }
            Err(e) => warn!(key = %key, error = %e, "Failed to serialize response for cache"),
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockComicCatalog, RecordedCatalogQuery};

    fn client_for(catalog: Arc<MockComicCatalog>, search: SearchConfig) -> CatalogClient {
        CatalogClient::new(
            catalog,
            Arc::new(RateLimiter::new(Duration::from_secs(3600), 1000)),
            RetryPolicy::new(3),
            search,
        )
    }

    fn tokens(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[tokio::test]
    async fn test_search_volumes_uses_and_query() {
        let catalog = Arc::new(MockComicCatalog::new());
        catalog.add_volume(fixtures::volume(1, "Preacher Special", 1996)).await;
        let client = client_for(catalog.clone(), SearchConfig::default());

        let volumes = client
            .search_volumes(&tokens(&["preacher", "special"]))
            .await
            .unwrap();

        assert_eq!(volumes.len(), 1);
        let queries = catalog.recorded_queries().await;
        assert!(matches!(
            &queries[0],
            RecordedCatalogQuery::SearchVolumes { query, offset: 0, page_size: 100 }
                if query == "preacher AND special"
        ));
        assert_eq!(queries.len(), 1);
    }

    #[tokio::test]
    async fn test_search_volumes_falls_back_to_or_query() {
        let catalog = Arc::new(MockComicCatalog::new());
        catalog.add_volume(fixtures::volume(1, "Preacher", 1995)).await;
        let client = client_for(catalog.clone(), SearchConfig::default());

        let volumes = client
            .search_volumes(&tokens(&["preacher", "cassidy"]))
            .await
            .unwrap();

        assert_eq!(volumes.iter().map(|v| v.id).collect::<Vec<_>>(), vec![1]);
        let queries = catalog.recorded_queries().await;
        assert_eq!(queries.len(), 2);
        assert!(matches!(
            &queries[1],
            RecordedCatalogQuery::SearchVolumes { query, page_size: 20, .. }
                if query == "preacher cassidy"
        ));
    }

    #[tokio::test]
    async fn test_search_volumes_without_tokens_skips_remote() {
        let catalog = Arc::new(MockComicCatalog::new());
        let client = client_for(catalog.clone(), SearchConfig::default());

        assert!(client.search_volumes(&[]).await.unwrap().is_empty());
        assert_eq!(catalog.query_count().await, 0);
    }

    #[tokio::test]
    async fn test_search_issue_ids_pages_and_dedups() {
        let catalog = Arc::new(MockComicCatalog::new());
        for volume_id in 1..=5 {
            catalog
                .add_issue(fixtures::issue(volume_id * 10, volume_id, "Dogville", "1"))
                .await;
        }

        let search = SearchConfig {
            issue_page_size: 2,
            ..SearchConfig::default()
        };
        let client = client_for(catalog.clone(), search);

        let ids = client
            .search_issue_ids(&[1, 2, 3, 4, 5, 1], Some("1"))
            .await
            .unwrap();

        assert_eq!(ids, vec![10, 20, 30, 40, 50]);
        let filters: Vec<String> = catalog
            .recorded_queries()
            .await
            .into_iter()
            .filter_map(|q| match q {
                RecordedCatalogQuery::SearchIssues { filter, .. } => Some(filter),
                _ => None,
            })
            .collect();
        assert_eq!(
            filters,
            vec![
                "volume:1|2,issue_number:1",
                "volume:3|4,issue_number:1",
                "volume:5|1,issue_number:1"
            ]
        );
    }

    #[tokio::test]
    async fn test_search_issue_ids_reads_every_result_page() {
        let catalog = Arc::new(MockComicCatalog::new());
        for issue_id in 1..=5 {
            catalog
                .add_issue(fixtures::issue(issue_id, 9, "Dogville", &issue_id.to_string()))
                .await;
        }
        catalog.set_page_cap(2).await;
        let client = client_for(catalog.clone(), SearchConfig::default());

        let ids = client.search_issue_ids(&[9], None).await.unwrap();

        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        let offsets: Vec<usize> = catalog
            .recorded_queries()
            .await
            .into_iter()
            .filter_map(|q| match q {
                RecordedCatalogQuery::SearchIssues { offset, .. } => Some(offset),
                _ => None,
            })
            .collect();
        assert_eq!(offsets, vec![0, 2, 4]);
    }

    #[tokio::test]
    async fn test_search_volumes_pages_up_to_limit() {
        let catalog = Arc::new(MockComicCatalog::new());
        for volume_id in 1..=7 {
            catalog
                .add_volume(fixtures::volume(volume_id, "Preacher", 1995))
                .await;
        }
        catalog.set_page_cap(2).await;
        let search = SearchConfig {
            volume_limit: 5,
            ..SearchConfig::default()
        };
        let client = client_for(catalog.clone(), search);

        let volumes = client.search_volumes(&tokens(&["preacher"])).await.unwrap();

        assert_eq!(
            volumes.iter().map(|v| v.id).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(catalog.query_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_missing_issue_is_none_after_retries() {
        let catalog = Arc::new(MockComicCatalog::new());
        let client = client_for(catalog.clone(), SearchConfig::default());

        assert!(client.lookup_issue(404).await.unwrap().is_none());
        assert_eq!(catalog.query_count().await, 3);
    }

    #[tokio::test]
    async fn test_lookup_issue_fills_publisher_from_volume() {
        let catalog = Arc::new(MockComicCatalog::new());
        let mut volume = fixtures::volume(7, "Preacher Special", 1996);
        volume.publisher_name = Some("Vertigo".to_string());
        catalog.add_volume(volume).await;

        let mut issue = fixtures::issue(70, 7, "Preacher Special", "1");
        issue.publisher_name = None;
        catalog.add_issue(issue).await;

        let client = client_for(catalog.clone(), SearchConfig::default());
        let issue = client.lookup_issue(70).await.unwrap().unwrap();
        assert_eq!(issue.publisher_name.as_deref(), Some("Vertigo"));
    }

    #[tokio::test]
    async fn test_quota_error_propagates() {
        let catalog = Arc::new(MockComicCatalog::new());
        catalog.add_issue(fixtures::issue(1, 1, "Dogville", "2")).await;
        catalog
            .set_next_error(CatalogError::QuotaExceeded("107".into()))
            .await;
        let client = client_for(catalog.clone(), SearchConfig::default());

        let result = client.lookup_issue(1).await;
        assert!(matches!(result, Err(CatalogError::QuotaExceeded(_))));
        assert_eq!(catalog.query_count().await, 1);
    }

    #[tokio::test]
    async fn test_cache_hit_skips_remote_and_limiter() {
        let catalog = Arc::new(MockComicCatalog::new());
        catalog.add_issue(fixtures::issue(1, 1, "Dogville", "2")).await;
        let client = client_for(catalog.clone(), SearchConfig::default())
            .with_cache(Arc::new(MemoryResponseCache::new()), 12);

        let first = client.lookup_issue(1).await.unwrap();
        let tokens_after_first = client.limiter().status().await.tokens_available;
        let second = client.lookup_issue(1).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(catalog.query_count().await, 1);
        assert_eq!(
            client.limiter().status().await.tokens_available,
            tokens_after_first
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_results_are_not_cached() {
        let catalog = Arc::new(MockComicCatalog::new());
        let client = client_for(catalog.clone(), SearchConfig::default())
            .with_cache(Arc::new(MemoryResponseCache::new()), 12);

        assert!(client.lookup_volume(9).await.unwrap().is_none());
        catalog.add_volume(fixtures::volume(9, "Saga", 2012)).await;
        assert!(client.lookup_volume(9).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_find_author_issue_ids() {
        let catalog = Arc::new(MockComicCatalog::new());
        catalog
            .add_person(fixtures::person(40439, "Garth Ennis", &[1, 2, 3]))
            .await;
        let client = client_for(catalog.clone(), SearchConfig::default());

        let ids = client
            .find_author_issue_ids(&tokens(&["Garth Ennis"]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(ids, HashSet::from([1, 2, 3]));

        assert!(client.find_author_issue_ids(&[]).await.unwrap().is_none());
        assert!(client
            .find_author_issue_ids(&tokens(&[UNKNOWN_AUTHOR]))
            .await
            .unwrap()
            .is_none());
        assert!(client
            .find_author_issue_ids(&tokens(&["Nobody Known"]))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_cover_urls() {
        let catalog = Arc::new(MockComicCatalog::new());
        let mut issue = fixtures::issue(1, 1, "Dogville", "2");
        issue.image_urls = vec!["super".into(), "medium".into(), "small".into()];
        catalog.add_issue(issue).await;
        let client = client_for(catalog.clone(), SearchConfig::default());

        assert_eq!(
            client.cover_urls(1, false).await.unwrap(),
            vec!["super", "medium", "small"]
        );
        assert_eq!(client.cover_urls(1, true).await.unwrap(), vec!["super"]);
    }

    #[tokio::test]
    async fn test_publisher_lookup_quota_error_is_not_masked() {
        let catalog = Arc::new(MockComicCatalog::new());
        let mut issue = fixtures::issue(7, 3, "Dogville", "2");
        issue.publisher_name = None;
        catalog.add_issue(issue).await;
        catalog.add_volume(fixtures::volume(3, "Dogville", 2010)).await;
        catalog
            .set_next_volume_error(CatalogError::QuotaExceeded("107".into()))
            .await;
        let client = client_for(catalog.clone(), SearchConfig::default());

        assert!(matches!(
            client.lookup_issue(7).await,
            Err(CatalogError::QuotaExceeded(_))
        ));
    }

    #[tokio::test]
    async fn test_publisher_lookup_is_best_effort_for_other_errors() {
        let catalog = Arc::new(MockComicCatalog::new());
        let mut issue = fixtures::issue(7, 3, "Dogville", "2");
        issue.publisher_name = None;
        catalog.add_issue(issue).await;
        catalog
            .set_next_volume_error(CatalogError::ApiError {
                status: 414,
                message: "Request-URI Too Long".into(),
            })
            .await;
        let client = client_for(catalog.clone(), SearchConfig::default());

        let issue = client.lookup_issue(7).await.unwrap().unwrap();
        assert_eq!(issue.id, 7);
        assert_eq!(issue.publisher_name, None);
    }
}
