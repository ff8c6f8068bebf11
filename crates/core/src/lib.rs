pub mod cache;
pub mod catalog;
pub mod client;
pub mod config;
pub mod identify;
pub mod metrics;
pub mod parser;
pub mod ranking;
pub mod rate_limit;
pub mod resolver;
pub mod testing;

pub use cache::{cache_key, MemoryResponseCache, ResponseCache};
pub use catalog::{
    CatalogError, ComicCatalog, ComicVineClient, FailureClass, Issue, IssueFilter, Person,
    ResultPage, Volume,
};
pub use client::{with_retry, CatalogClient, RetryPolicy, UNKNOWN_AUTHOR};
pub use config::{
    load_config, load_config_from_str, load_default_config, validate_config, Config, ConfigError,
    SanitizedConfig,
};
pub use identify::{
    AbortHandle, IdentifyError, IdentifyPipeline, IdentifyReport, MetadataRecord, PipelineState,
    Query, RankedResult, ResultSink, VecSink, COMICVINE, COMICVINE_VOLUME,
};
pub use parser::{default_tokenizer, get_year, issue_number, normalize_title, NormalizedTitle, Tokenizer};
pub use ranking::{format_issue_number, sanitize_title, IssueScorer, ScoreBreakdown};
pub use rate_limit::{
    BucketState, BucketStateStore, JsonFileStateStore, RateLimitStatus, RateLimiter,
};
pub use resolver::CandidateResolver;
