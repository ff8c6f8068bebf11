//! Candidate resolution: from a query to the catalog issue IDs worth fetching.

use std::sync::Arc;

use tracing::{debug, info};

use crate::catalog::CatalogError;
use crate::client::CatalogClient;
use crate::identify::Query;
use crate::parser::{normalize_title, Tokenizer};

/// Turns a query into candidate issue IDs through the catalog client.
pub struct CandidateResolver {
    client: Arc<CatalogClient>,
    tokenizer: Arc<Tokenizer>,
}

impl CandidateResolver {
    pub fn new(client: Arc<CatalogClient>, tokenizer: Arc<Tokenizer>) -> Self {
        Self { client, tokenizer }
    }

    /// Candidate issue IDs for `query`, without duplicates.
    ///
    /// A catalog issue ID in the query is the only candidate. Otherwise the
    /// title picks the volumes (or the query's volume ID does), the issue
    /// number narrows the issues, and the first author, when the catalog
    /// knows them, narrows them further.
    pub async fn resolve(&self, query: &Query) -> Result<Vec<u64>, CatalogError> {
        if let Some(issue_id) = query.comicvine_id() {
            debug!(issue_id, "Query names an issue, skipping search");
            return Ok(vec![issue_id]);
        }

        let Some(title) = query.title_text() else {
            debug!("Query has no title, nothing to search for");
            return Ok(Vec::new());
        };

        let normalized = normalize_title(title, Some(self.tokenizer.as_ref()));
        debug!(
            title,
            tokens = ?normalized.tokens,
            issue_number = ?normalized.issue_number,
            "Normalized query title"
        );

        let volume_ids = self.candidate_volume_ids(query, &normalized.tokens).await?;
        if volume_ids.is_empty() {
            info!(title, "No candidate volumes found");
            return Ok(Vec::new());
        }

        let mut issue_ids = self
            .client
            .search_issue_ids(&volume_ids, normalized.issue_number.as_deref())
            .await?;

        if let Some(authored) = self.client.find_author_issue_ids(&query.authors).await? {
            let before = issue_ids.len();
            issue_ids.retain(|id| authored.contains(id));
            debug!(
                before,
                after = issue_ids.len(),
                "Narrowed candidates to author's issues"
            );
        }

        Ok(issue_ids)
    }

    async fn candidate_volume_ids(
        &self,
        query: &Query,
        tokens: &[String],
    ) -> Result<Vec<u64>, CatalogError> {
        if let Some(volume_id) = query.comicvine_volume_id() {
            debug!(volume_id, "Query names a volume");
            let volume = self.client.lookup_volume(volume_id).await?;
            return Ok(volume.map(|v| vec![v.id]).unwrap_or_default());
        }

        let volumes = self.client.search_volumes(tokens).await?;
        Ok(volumes.into_iter().map(|v| v.id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::client::RetryPolicy;
    use crate::config::SearchConfig;
    use crate::identify::{COMICVINE, COMICVINE_VOLUME};
    use crate::parser::default_tokenizer;
    use crate::rate_limit::RateLimiter;
    use crate::testing::{fixtures, MockComicCatalog, RecordedCatalogQuery};

    fn resolver_for(catalog: Arc<MockComicCatalog>) -> CandidateResolver {
        let client = CatalogClient::new(
            catalog,
            Arc::new(RateLimiter::new(Duration::from_secs(3600), 1000)),
            RetryPolicy::new(3),
            SearchConfig::default(),
        );
        CandidateResolver::new(Arc::new(client), Arc::new(default_tokenizer))
    }

    async fn preacher_catalog() -> Arc<MockComicCatalog> {
        let catalog = Arc::new(MockComicCatalog::new());
        catalog.add_volume(fixtures::volume(1, "Preacher", 1995)).await;
        catalog
            .add_volume(fixtures::volume(2, "Preacher Special", 1996))
            .await;
        catalog.add_issue(fixtures::issue(10, 1, "Preacher", "1")).await;
        catalog.add_issue(fixtures::issue(11, 1, "Preacher", "2")).await;
        catalog
            .add_issue(fixtures::issue(20, 2, "Preacher Special", "1"))
            .await;
        catalog
    }

    #[tokio::test]
    async fn test_issue_identifier_skips_search() {
        let catalog = preacher_catalog().await;
        let resolver = resolver_for(catalog.clone());

        let query = Query::title("Preacher #1").with_identifier(COMICVINE, "105615");
        assert_eq!(resolver.resolve(&query).await.unwrap(), vec![105615]);
        assert_eq!(catalog.query_count().await, 0);
    }

    #[tokio::test]
    async fn test_no_title_resolves_to_nothing() {
        let catalog = preacher_catalog().await;
        let resolver = resolver_for(catalog.clone());

        let query = Query::new().with_author("Garth Ennis");
        assert!(resolver.resolve(&query).await.unwrap().is_empty());
        assert_eq!(catalog.query_count().await, 0);
    }

    #[tokio::test]
    async fn test_title_search_with_issue_number() {
        let resolver = resolver_for(preacher_catalog().await);

        let ids = resolver.resolve(&Query::title("Preacher #1")).await.unwrap();
        assert_eq!(ids, vec![10, 20]);

        let ids = resolver
            .resolve(&Query::title("Preacher Special #1 (1996)"))
            .await
            .unwrap();
        assert_eq!(ids, vec![20]);
    }

    #[tokio::test]
    async fn test_title_without_issue_number_matches_all_issues() {
        let resolver = resolver_for(preacher_catalog().await);

        let ids = resolver.resolve(&Query::title("Preacher")).await.unwrap();
        assert_eq!(ids, vec![10, 11, 20]);
    }

    #[tokio::test]
    async fn test_volume_identifier_replaces_volume_search() {
        let catalog = preacher_catalog().await;
        let resolver = resolver_for(catalog.clone());

        let query = Query::title("Preacher #1").with_identifier(COMICVINE_VOLUME, "1");
        assert_eq!(resolver.resolve(&query).await.unwrap(), vec![10]);

        let queries = catalog.recorded_queries().await;
        assert!(queries.contains(&RecordedCatalogQuery::LookupVolume { volume_id: 1 }));
        assert!(!queries
            .iter()
            .any(|q| matches!(q, RecordedCatalogQuery::SearchVolumes { .. })));
    }

    #[tokio::test]
    async fn test_unknown_volume_identifier_resolves_to_nothing() {
        let resolver = resolver_for(preacher_catalog().await);

        let query = Query::title("Preacher #1").with_identifier(COMICVINE_VOLUME, "999");
        assert!(resolver.resolve(&query).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_author_narrows_candidates() {
        let catalog = preacher_catalog().await;
        catalog
            .add_person(fixtures::person(40, "Garth Ennis", &[20, 11]))
            .await;
        let resolver = resolver_for(catalog);

        let query = Query::title("Preacher #1").with_author("Garth Ennis");
        assert_eq!(resolver.resolve(&query).await.unwrap(), vec![20]);
    }

    #[tokio::test]
    async fn test_unmatched_or_unknown_author_does_not_narrow() {
        let catalog = preacher_catalog().await;
        let resolver = resolver_for(catalog.clone());

        let query = Query::title("Preacher #1").with_author("Nobody Known");
        assert_eq!(resolver.resolve(&query).await.unwrap(), vec![10, 20]);

        catalog.clear_recorded().await;
        let query = Query::title("Preacher #1").with_author("Unknown");
        assert_eq!(resolver.resolve(&query).await.unwrap(), vec![10, 20]);
        assert!(!catalog
            .recorded_queries()
            .await
            .iter()
            .any(|q| matches!(q, RecordedCatalogQuery::SearchPeople { .. })));
    }

    #[tokio::test]
    async fn test_no_matching_volume() {
        let resolver = resolver_for(preacher_catalog().await);
        assert!(resolver
            .resolve(&Query::title("Dogville #2"))
            .await
            .unwrap()
            .is_empty());
    }
}
