use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration. Every section is optional.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub identify: IdentifyConfig,
    #[serde(default)]
    pub cache: CacheConfig,
}

/// Remote catalog connection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CatalogConfig {
    /// ComicVine API key
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            base_url: default_base_url(),
            timeout_secs: default_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_base_url() -> String {
    "https://comicvine.gamespot.com/api".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("comicmeta/{}", env!("CARGO_PKG_VERSION"))
}

/// Token bucket settings shared by every remote call
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Seconds between token mints (default: 2)
    #[serde(default = "default_request_interval")]
    pub request_interval_secs: f64,
    /// Maximum tokens banked while idle (default: 16)
    #[serde(default = "default_burst_size")]
    pub burst_size: u32,
    /// Optional JSON file that keeps the bucket across restarts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_path: Option<PathBuf>,
}

impl RateLimitConfig {
    /// Interval as a duration. Callers must validate first.
    pub fn interval(&self) -> Duration {
        Duration::from_secs_f64(self.request_interval_secs)
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            request_interval_secs: default_request_interval(),
            burst_size: default_burst_size(),
            state_path: None,
        }
    }
}

fn default_request_interval() -> f64 {
    2.0
}

fn default_burst_size() -> u32 {
    16
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetryConfig {
    /// Attempts per remote call, including the first (default: 3)
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

/// Candidate search limits
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Volumes kept from the strict AND search (default: 100)
    #[serde(default = "default_volume_limit")]
    pub volume_limit: usize,
    /// Volumes kept from the relaxed fallback search (default: 20)
    #[serde(default = "default_fallback_volume_limit")]
    pub fallback_volume_limit: usize,
    /// Volume ids per issue filter request (default: 50)
    #[serde(default = "default_issue_page_size")]
    pub issue_page_size: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            volume_limit: default_volume_limit(),
            fallback_volume_limit: default_fallback_volume_limit(),
            issue_page_size: default_issue_page_size(),
        }
    }
}

fn default_volume_limit() -> usize {
    100
}

fn default_fallback_volume_limit() -> usize {
    20
}

fn default_issue_page_size() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IdentifyConfig {
    /// Concurrent issue fetches per identify run (default: 16)
    #[serde(default = "default_worker_threads")]
    pub worker_threads: usize,
}

impl Default for IdentifyConfig {
    fn default() -> Self {
        Self {
            worker_threads: default_worker_threads(),
        }
    }
}

fn default_worker_threads() -> usize {
    16
}

/// In-process response cache
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Freshness window in hours, 0 disables caching (default: 12)
    #[serde(default = "default_cache_hours")]
    pub hours: u64,
}

impl CacheConfig {
    pub fn is_active(&self) -> bool {
        self.enabled && self.hours > 0
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.hours * 3600)
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            hours: default_cache_hours(),
        }
    }
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_hours() -> u64 {
    12
}

/// Sanitized config for logs and the CLI (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub catalog: SanitizedCatalogConfig,
    pub rate_limit: RateLimitConfig,
    pub retry: RetryConfig,
    pub search: SearchConfig,
    pub identify: IdentifyConfig,
    pub cache: CacheConfig,
}

/// Sanitized catalog config (API key hidden)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedCatalogConfig {
    pub api_key_configured: bool,
    pub base_url: String,
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            catalog: SanitizedCatalogConfig {
                api_key_configured: !config.catalog.api_key.is_empty(),
                base_url: config.catalog.base_url.clone(),
                timeout_secs: config.catalog.timeout_secs,
                user_agent: config.catalog.user_agent.clone(),
            },
            rate_limit: config.rate_limit.clone(),
            retry: config.retry.clone(),
            search: config.search.clone(),
            identify: config.identify.clone(),
            cache: config.cache.clone(),
        }
    }
}
