//! Candidate resolution and the bounded fetch pool.
//!
//! Fetch failures are sorted by class. Exhausted retries are counted and
//! the pool moves on; quota, non-recoverable and unexpected failures let the
//! in-flight fetches finish and then fail the whole identify call with the
//! first such error.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::query::Query;
use super::record::{MetadataRecord, RankedResult};
use super::sink::{AbortHandle, ResultSink, VecSink};
use super::IdentifyError;
use crate::catalog::{CatalogError, FailureClass};
use crate::client::CatalogClient;
use crate::config::IdentifyConfig;
use crate::metrics::IDENTIFY_RESULTS;
use crate::parser::{default_tokenizer, Tokenizer};
use crate::ranking::{rank_records, IssueScorer};
use crate::resolver::CandidateResolver;

/// Where an identify call is, or where it ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Resolving,
    Fetching,
    Done,
    Aborted,
}

impl PipelineState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Resolving => "resolving",
            PipelineState::Fetching => "fetching",
            PipelineState::Done => "done",
            PipelineState::Aborted => "aborted",
        }
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Summary of one identify call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdentifyReport {
    /// `Done` or `Aborted`.
    pub state: PipelineState,
    /// Candidate issue IDs found while resolving.
    pub candidates: usize,
    /// Records pushed to the sink.
    pub published: usize,
    /// Fetches whose retries ran out.
    pub failed: usize,
}

impl IdentifyReport {
    fn new(state: PipelineState) -> Self {
        Self {
            state,
            candidates: 0,
            published: 0,
            failed: 0,
        }
    }
}

enum FetchOutcome {
    Published,
    Missing,
    Skipped,
    /// Retries ran out on a retryable error.
    Failed,
    /// Quota, non-recoverable or unexpected error, reported to the caller.
    Fatal(CatalogError),
}

/// Resolves a query to candidate issues and fetches them in parallel.
pub struct IdentifyPipeline {
    client: Arc<CatalogClient>,
    resolver: CandidateResolver,
    tokenizer: Arc<Tokenizer>,
    worker_threads: usize,
}

impl IdentifyPipeline {
    /// Create a pipeline using the default tokenizer.
    pub fn new(client: Arc<CatalogClient>, worker_threads: usize) -> Self {
        Self::with_tokenizer(client, worker_threads, Arc::new(default_tokenizer))
    }

    pub fn from_config(client: Arc<CatalogClient>, config: &IdentifyConfig) -> Self {
        Self::new(client, config.worker_threads)
    }

    /// Create a pipeline that splits titles with `tokenizer`.
    pub fn with_tokenizer(
        client: Arc<CatalogClient>,
        worker_threads: usize,
        tokenizer: Arc<Tokenizer>,
    ) -> Self {
        Self {
            resolver: CandidateResolver::new(client.clone(), tokenizer.clone()),
            client,
            tokenizer,
            worker_threads: worker_threads.max(1),
        }
    }

    pub fn client(&self) -> &Arc<CatalogClient> {
        &self.client
    }

    /// Resolve `query` and push one record per fetched candidate into `sink`.
    ///
    /// Records arrive in no particular order. A fetch that runs out of
    /// retries is logged and counted. Any other fetch error is returned once
    /// every sibling fetch has finished, so records already pushed stay in
    /// `sink`. Once `abort` is set no further records are published.
    pub async fn identify(
        &self,
        query: &Query,
        sink: &dyn ResultSink,
        abort: &AbortHandle,
    ) -> Result<IdentifyReport, IdentifyError> {
        if abort.is_aborted() {
            return Ok(self.finish(IdentifyReport::new(PipelineState::Aborted)));
        }

        debug!(state = %PipelineState::Resolving, "Identify started");
        let candidates = self.resolver.resolve(query).await?;
        info!(count = candidates.len(), "Candidate issues found");

        let mut report = IdentifyReport::new(PipelineState::Fetching);
        report.candidates = candidates.len();

        if abort.is_aborted() {
            report.state = PipelineState::Aborted;
            return Ok(self.finish(report));
        }

        debug!(
            state = %PipelineState::Fetching,
            workers = self.worker_threads,
            "Fetching candidate issues"
        );

        let outcomes: Vec<FetchOutcome> = stream::iter(candidates)
            .map(|issue_id| self.fetch_and_publish(issue_id, sink, abort))
            .buffer_unordered(self.worker_threads)
            .collect()
            .await;

        let mut fatal = None;
        for outcome in outcomes {
            match outcome {
                FetchOutcome::Published => report.published += 1,
                FetchOutcome::Failed => report.failed += 1,
                FetchOutcome::Fatal(e) => {
                    fatal.get_or_insert(e);
                }
                FetchOutcome::Missing | FetchOutcome::Skipped => {}
            }
        }

        report.state = if abort.is_aborted() {
            PipelineState::Aborted
        } else {
            PipelineState::Done
        };
        let report = self.finish(report);

        match fatal {
            Some(e) => Err(e.into()),
            None => Ok(report),
        }
    }

    /// Identify into a fresh sink and order the records best first.
    ///
    /// Ties keep the order in which records were fetched.
    pub async fn identify_and_rank(&self, query: &Query) -> Result<Vec<RankedResult>, IdentifyError> {
        let sink = VecSink::new();
        self.identify(query, &sink, &AbortHandle::new()).await?;

        let scorer = IssueScorer::new(query, self.tokenizer.as_ref());
        Ok(rank_records(&scorer, sink.into_inner())
            .into_iter()
            .map(|(record, rank)| RankedResult { record, rank })
            .collect())
    }

    /// Cover image URLs for the issue named by the query's catalog ID, best
    /// quality first. Queries without one have no covers.
    pub async fn cover_urls(&self, query: &Query, best_only: bool) -> Result<Vec<String>, IdentifyError> {
        let Some(issue_id) = query.comicvine_id() else {
            debug!("Query has no issue identifier, no covers to look up");
            return Ok(Vec::new());
        };
        Ok(self.client.cover_urls(issue_id, best_only).await?)
    }

    async fn fetch_and_publish(
        &self,
        issue_id: u64,
        sink: &dyn ResultSink,
        abort: &AbortHandle,
    ) -> FetchOutcome {
        if abort.is_aborted() {
            debug!(issue_id, "Abort requested, skipping issue");
            return FetchOutcome::Skipped;
        }

        match self.client.lookup_issue(issue_id).await {
            Ok(Some(issue)) => {
                if abort.is_aborted() {
                    debug!(issue_id, "Abort requested, discarding fetched issue");
                    return FetchOutcome::Skipped;
                }
                sink.push(MetadataRecord::from(&issue));
                FetchOutcome::Published
            }
            Ok(None) => FetchOutcome::Missing,
            Err(e) => match e.class() {
                FailureClass::Retryable => {
                    warn!(issue_id, error = %e, "Failed to fetch issue");
                    FetchOutcome::Failed
                }
                FailureClass::Unexpected => {
                    error!(issue_id, error = %e, "Unexpected failure fetching issue");
                    FetchOutcome::Fatal(e)
                }
                FailureClass::QuotaExceeded | FailureClass::NonRecoverable => {
                    warn!(issue_id, error = %e, "Fetching issue failed, reporting to caller");
                    FetchOutcome::Fatal(e)
                }
            },
        }
    }

    fn finish(&self, report: IdentifyReport) -> IdentifyReport {
        IDENTIFY_RESULTS
            .with_label_values(&[report.state.as_str()])
            .observe(report.published as f64);
        info!(
            state = %report.state,
            candidates = report.candidates,
            published = report.published,
            failed = report.failed,
            "Identify finished"
        );
        report
    }
}
