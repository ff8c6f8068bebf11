//! Mock comic catalog for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::catalog::{
    CatalogError, ComicCatalog, Issue, IssueFilter, Person, ResultPage, Volume,
};

/// A recorded catalog query for test assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordedCatalogQuery {
    LookupVolume { volume_id: u64 },
    SearchVolumes {
        query: String,
        offset: usize,
        page_size: usize,
    },
    LookupIssue { issue_id: u64 },
    SearchIssues { filter: String, offset: usize },
    SearchPeople { name: String },
    LookupIssueImages { issue_id: u64 },
}

/// Mock implementation of the ComicCatalog trait.
///
/// Provides controllable behavior for testing:
/// - Serve volumes, issues and people from memory
/// - Track queries for assertions (failed attempts included)
/// - Simulate failures, one scripted error per call
/// - Split search results into small pages
///
/// Volume searches understand the two query shapes the client sends:
/// `"a AND b"` needs every token in the volume name, `"a b"` needs any.
///
/// # Example
///
/// ```rust,ignore
/// use comicmeta_core::testing::{MockComicCatalog, fixtures};
///
/// let catalog = MockComicCatalog::new();
/// catalog.add_volume(fixtures::volume(1, "Preacher Special", 1996)).await;
///
/// let volumes = catalog.search_volumes("preacher AND special", 0, 10).await?;
/// assert_eq!(volumes.items.len(), 1);
/// ```
#[derive(Debug, Default)]
pub struct MockComicCatalog {
    /// Volumes by ID.
    volumes: Arc<RwLock<HashMap<u64, Volume>>>,
    /// Issues by ID.
    issues: Arc<RwLock<HashMap<u64, Issue>>>,
    /// Issue IDs that exist but have no volume.
    orphan_issues: Arc<RwLock<HashSet<u64>>>,
    people: Arc<RwLock<Vec<Person>>>,
    /// Recorded queries.
    queries: Arc<RwLock<Vec<RecordedCatalogQuery>>>,
    /// Errors returned by the next calls, in order.
    errors: Arc<RwLock<VecDeque<CatalogError>>>,
    /// Errors returned by the next volume lookups only.
    volume_errors: Arc<RwLock<VecDeque<CatalogError>>>,
    /// Largest page served by searches, unlimited when `None`.
    page_cap: Arc<RwLock<Option<usize>>>,
}

impl MockComicCatalog {
    /// Create a new empty mock catalog.
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Catalog Contents
    // =========================================================================

    pub async fn add_volume(&self, volume: Volume) {
        self.volumes.write().await.insert(volume.id, volume);
    }

    pub async fn add_issue(&self, issue: Issue) {
        self.issues.write().await.insert(issue.id, issue);
    }

    /// Register an issue ID whose record has no volume.
    pub async fn add_orphan_issue(&self, issue_id: u64) {
        self.orphan_issues.write().await.insert(issue_id);
    }

    pub async fn add_person(&self, person: Person) {
        self.people.write().await.push(person);
    }

    /// Serve search results in pages of at most `cap` entries.
    pub async fn set_page_cap(&self, cap: usize) {
        *self.page_cap.write().await = Some(cap.max(1));
    }

    async fn page<T>(&self, matches: Vec<T>, offset: usize, page_size: usize) -> ResultPage<T> {
        let size = match *self.page_cap.read().await {
            Some(cap) => page_size.min(cap),
            None => page_size,
        };
        let total = matches.len();
        let items: Vec<T> = matches.into_iter().skip(offset).take(size).collect();
        let returned = items.len();
        ResultPage::new(items, offset, returned, total)
    }

    /// Clear all volumes, issues and people.
    pub async fn clear(&self) {
        self.volumes.write().await.clear();
        self.issues.write().await.clear();
        self.orphan_issues.write().await.clear();
        self.people.write().await.clear();
    }

    // =========================================================================
    // Query Recording
    // =========================================================================

    /// Get all recorded queries.
    pub async fn recorded_queries(&self) -> Vec<RecordedCatalogQuery> {
        self.queries.read().await.clone()
    }

    /// Clear recorded queries.
    pub async fn clear_recorded(&self) {
        self.queries.write().await.clear();
    }

    /// Get the number of queries performed.
    pub async fn query_count(&self) -> usize {
        self.queries.read().await.len()
    }

    // =========================================================================
    // Error Injection
    // =========================================================================

    /// Configure the next operation to fail with the given error.
    pub async fn set_next_error(&self, error: CatalogError) {
        self.errors.write().await.push_back(error);
    }

    /// Configure the next operations to fail, one error each.
    pub async fn queue_errors(&self, errors: impl IntoIterator<Item = CatalogError>) {
        self.errors.write().await.extend(errors);
    }

    /// Configure the next volume lookup to fail, leaving other calls alone.
    pub async fn set_next_volume_error(&self, error: CatalogError) {
        self.volume_errors.write().await.push_back(error);
    }

    /// Clear any pending errors.
    pub async fn clear_errors(&self) {
        self.errors.write().await.clear();
        self.volume_errors.write().await.clear();
    }

    /// Record a query and take the next scripted error, if any.
    async fn begin(&self, query: RecordedCatalogQuery) -> Result<(), CatalogError> {
        self.queries.write().await.push(query);
        match self.errors.write().await.pop_front() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

fn volume_matches(name: &str, query: &str) -> bool {
    let name = name.to_lowercase();
    let query = query.to_lowercase();

    if query.contains(" and ") {
        query
            .split(" and ")
            .map(str::trim)
            .all(|token| name.contains(token))
    } else {
        query
            .split_whitespace()
            .any(|token| name.contains(token))
    }
}

#[async_trait]
impl ComicCatalog for MockComicCatalog {
    async fn lookup_volume(&self, volume_id: u64) -> Result<Volume, CatalogError> {
        self.begin(RecordedCatalogQuery::LookupVolume { volume_id })
            .await?;
        if let Some(err) = self.volume_errors.write().await.pop_front() {
            return Err(err);
        }

        self.volumes
            .read()
            .await
            .get(&volume_id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("volume {}", volume_id)))
    }

    async fn search_volumes(
        &self,
        query: &str,
        offset: usize,
        page_size: usize,
    ) -> Result<ResultPage<Volume>, CatalogError> {
        self.begin(RecordedCatalogQuery::SearchVolumes {
            query: query.to_string(),
            offset,
            page_size,
        })
        .await?;

        let mut results: Vec<Volume> = self
            .volumes
            .read()
            .await
            .values()
            .filter(|v| volume_matches(&v.name, query))
            .cloned()
            .collect();
        results.sort_by_key(|v| v.id);

        Ok(self.page(results, offset, page_size).await)
    }

    async fn lookup_issue(&self, issue_id: u64) -> Result<Option<Issue>, CatalogError> {
        self.begin(RecordedCatalogQuery::LookupIssue { issue_id })
            .await?;

        if self.orphan_issues.read().await.contains(&issue_id) {
            return Ok(None);
        }

        self.issues
            .read()
            .await
            .get(&issue_id)
            .cloned()
            .map(Some)
            .ok_or_else(|| CatalogError::NotFound(format!("issue {}", issue_id)))
    }

    async fn search_issue_ids(
        &self,
        filter: &IssueFilter,
        offset: usize,
    ) -> Result<ResultPage<u64>, CatalogError> {
        self.begin(RecordedCatalogQuery::SearchIssues {
            filter: filter.to_filter_string(),
            offset,
        })
        .await?;

        let mut ids: Vec<u64> = self
            .issues
            .read()
            .await
            .values()
            .filter(|issue| filter.volume_ids.contains(&issue.volume_id))
            .filter(|issue| match &filter.issue_number {
                Some(number) => &issue.issue_number == number,
                None => true,
            })
            .map(|issue| issue.id)
            .collect();
        ids.sort_unstable();

        Ok(self.page(ids, offset, usize::MAX).await)
    }

    async fn search_people(&self, name: &str) -> Result<Vec<Person>, CatalogError> {
        self.begin(RecordedCatalogQuery::SearchPeople {
            name: name.to_string(),
        })
        .await?;

        let wanted = name.to_lowercase();
        Ok(self
            .people
            .read()
            .await
            .iter()
            .filter(|p| p.name.to_lowercase().contains(&wanted))
            .cloned()
            .collect())
    }

    async fn lookup_issue_image_urls(&self, issue_id: u64) -> Result<Vec<String>, CatalogError> {
        self.begin(RecordedCatalogQuery::LookupIssueImages { issue_id })
            .await?;

        self.issues
            .read()
            .await
            .get(&issue_id)
            .map(|issue| issue.image_urls.clone())
            .ok_or_else(|| CatalogError::NotFound(format!("issue {}", issue_id)))
    }
}
