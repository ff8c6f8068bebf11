//! ComicVine API client.
//!
//! ComicVine wraps every response in an envelope carrying its own
//! `status_code`. A missing object is reported as status 101 with an empty
//! `results` array, so the envelope is checked before `results` is decoded.
//!
//! List endpoints page with `offset`, the search endpoint with a 1-based
//! `page`. Both report `number_of_total_results`.

use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use super::types::{Issue, IssueFilter, Person, ResultPage, Volume};
use super::{CatalogError, ComicCatalog};
use crate::config::CatalogConfig;

const VOLUME_TYPE: &str = "4050";
const ISSUE_TYPE: &str = "4000";

const VOLUME_FIELDS: &str = "id,name,start_year,publisher";
const ISSUE_FIELDS: &str =
    "id,name,volume,issue_number,person_credits,description,store_date,cover_date,image";

// Largest page the list endpoints hand out.
const MAX_PAGE: usize = 100;

// Envelope status codes.
const STATUS_OK: u32 = 1;
const STATUS_INVALID_KEY: u32 = 100;
const STATUS_NOT_FOUND: u32 = 101;
const STATUS_RATE_LIMITED: u32 = 107;

/// ComicVine API client.
pub struct ComicVineClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl ComicVineClient {
    /// Create a new ComicVine client.
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogError> {
        if config.api_key.is_empty() {
            return Err(CatalogError::NotConfigured(
                "catalog.api_key is empty".to_string(),
            ));
        }

        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }

    async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<T, CatalogError> {
        let envelope = self.get_envelope(path, params, what).await?;
        decode_results(envelope.results, what)
    }

    /// Fetch one page of a list, flattening null entries.
    async fn get_page<T: DeserializeOwned>(
        &self,
        path: &str,
        params: &[(&str, String)],
        offset: usize,
        what: &str,
    ) -> Result<ResultPage<T>, CatalogError> {
        let envelope = self.get_envelope(path, params, what).await?;
        let total = envelope.number_of_total_results;
        let raw: Vec<Option<T>> = decode_results(envelope.results, what)?;
        let returned = raw.len();
        let items = raw.into_iter().flatten().collect();
        Ok(ResultPage::new(items, offset, returned, total))
    }

    async fn get_envelope(
        &self,
        path: &str,
        params: &[(&str, String)],
        what: &str,
    ) -> Result<CvEnvelope, CatalogError> {
        let url = format!("{}/{}/", self.base_url, path);

        let response = self
            .client
            .get(&url)
            .query(&[("api_key", self.api_key.as_str()), ("format", "json")])
            .query(params)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 420 {
            warn!(status = status.as_u16(), "ComicVine rate limit exceeded");
            return Err(CatalogError::QuotaExceeded(format!("HTTP {}", status)));
        }
        if status == StatusCode::NOT_FOUND {
            return Err(CatalogError::NotFound(what.to_string()));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::ApiError {
                status: status.as_u16(),
                message: body,
            });
        }

        let envelope: CvEnvelope = response.json().await.map_err(|e| {
            CatalogError::ParseError(format!("Failed to parse {} response: {}", what, e))
        })?;

        match envelope.status_code {
            STATUS_OK => Ok(envelope),
            STATUS_NOT_FOUND => Err(CatalogError::NotFound(what.to_string())),
            STATUS_RATE_LIMITED => {
                warn!("ComicVine rate limit exceeded");
                Err(CatalogError::QuotaExceeded(envelope.error))
            }
            STATUS_INVALID_KEY => Err(CatalogError::NotConfigured(envelope.error)),
            code => Err(CatalogError::Rejected {
                code,
                message: envelope.error,
            }),
        }
    }
}

#[async_trait]
impl ComicCatalog for ComicVineClient {
    async fn lookup_volume(&self, volume_id: u64) -> Result<Volume, CatalogError> {
        debug!(volume_id, "ComicVine get volume");

        let volume: CvVolume = self
            .get(
                &format!("volume/{}-{}", VOLUME_TYPE, volume_id),
                &[("field_list", VOLUME_FIELDS.to_string())],
                &format!("volume {}", volume_id),
            )
            .await?;

        Ok(volume.into())
    }

    async fn search_volumes(
        &self,
        query: &str,
        offset: usize,
        page_size: usize,
    ) -> Result<ResultPage<Volume>, CatalogError> {
        let page_size = page_size.clamp(1, MAX_PAGE);
        let page = search_page_number(offset, page_size);
        debug!(query, offset, page, page_size, "ComicVine search volumes");

        let volumes: ResultPage<CvVolume> = self
            .get_page(
                "search",
                &[
                    ("resources", "volume".to_string()),
                    ("query", query.to_string()),
                    ("field_list", VOLUME_FIELDS.to_string()),
                    ("limit", page_size.to_string()),
                    ("page", page.to_string()),
                ],
                offset,
                "volume search",
            )
            .await?;

        Ok(ResultPage {
            items: volumes.items.into_iter().map(Volume::from).collect(),
            next_offset: volumes.next_offset,
        })
    }

    async fn lookup_issue(&self, issue_id: u64) -> Result<Option<Issue>, CatalogError> {
        debug!(issue_id, "ComicVine get issue");

        let issue: CvIssue = self
            .get(
                &format!("issue/{}-{}", ISSUE_TYPE, issue_id),
                &[("field_list", ISSUE_FIELDS.to_string())],
                &format!("issue {}", issue_id),
            )
            .await?;

        Ok(issue.into_issue())
    }

    async fn search_issue_ids(
        &self,
        filter: &IssueFilter,
        offset: usize,
    ) -> Result<ResultPage<u64>, CatalogError> {
        let filter_string = filter.to_filter_string();
        debug!(filter = %filter_string, offset, "ComicVine search issues");

        let issues: ResultPage<CvId> = self
            .get_page(
                "issues",
                &[
                    ("filter", filter_string),
                    ("field_list", "id".to_string()),
                    ("limit", MAX_PAGE.to_string()),
                    ("offset", offset.to_string()),
                ],
                offset,
                "issue search",
            )
            .await?;

        Ok(ResultPage {
            items: issues.items.into_iter().map(|issue| issue.id).collect(),
            next_offset: issues.next_offset,
        })
    }

    async fn search_people(&self, name: &str) -> Result<Vec<Person>, CatalogError> {
        debug!(name, "ComicVine search people");

        let people: Vec<Option<CvPerson>> = self
            .get(
                "people",
                &[
                    ("filter", format!("name:{}", name)),
                    ("field_list", "id,name,issue_credits".to_string()),
                ],
                "people search",
            )
            .await?;

        Ok(people.into_iter().flatten().map(Person::from).collect())
    }

    async fn lookup_issue_image_urls(&self, issue_id: u64) -> Result<Vec<String>, CatalogError> {
        debug!(issue_id, "ComicVine get issue image");

        let issue: CvIssueImage = self
            .get(
                &format!("issue/{}-{}", ISSUE_TYPE, issue_id),
                &[("field_list", "image".to_string())],
                &format!("issue {}", issue_id),
            )
            .await?;

        Ok(issue.image.map(CvImage::into_urls).unwrap_or_default())
    }
}

// ============================================================================
// ComicVine API Response Types (private)
// ============================================================================

#[derive(Debug, Deserialize)]
struct CvEnvelope {
    status_code: u32,
    #[serde(default)]
    error: String,
    #[serde(default)]
    number_of_total_results: usize,
    #[serde(default)]
    results: serde_json::Value,
}

fn decode_results<T: DeserializeOwned>(
    results: serde_json::Value,
    what: &str,
) -> Result<T, CatalogError> {
    serde_json::from_value(results)
        .map_err(|e| CatalogError::ParseError(format!("Failed to parse {} results: {}", what, e)))
}

/// 1-based search page holding `offset`.
fn search_page_number(offset: usize, page_size: usize) -> usize {
    offset / page_size.max(1) + 1
}

#[derive(Debug, Deserialize)]
struct CvId {
    id: u64,
}

#[derive(Debug, Deserialize)]
struct CvNamed {
    id: u64,
    #[serde(default)]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CvVolume {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    /// Usually a number or a numeric string, occasionally junk like `"1952?"`.
    #[serde(default)]
    start_year: Option<serde_json::Value>,
    #[serde(default)]
    publisher: Option<CvNamed>,
}

#[derive(Debug, Deserialize)]
struct CvIssue {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    issue_number: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    person_credits: Option<Vec<CvNamed>>,
    #[serde(default)]
    volume: Option<CvNamed>,
    #[serde(default)]
    store_date: Option<String>,
    #[serde(default)]
    cover_date: Option<String>,
    #[serde(default)]
    image: Option<CvImage>,
}

#[derive(Debug, Deserialize)]
struct CvIssueImage {
    #[serde(default)]
    image: Option<CvImage>,
}

#[derive(Debug, Deserialize)]
struct CvImage {
    #[serde(default)]
    super_url: Option<String>,
    #[serde(default)]
    medium_url: Option<String>,
    #[serde(default)]
    small_url: Option<String>,
}

impl CvImage {
    fn into_urls(self) -> Vec<String> {
        [self.super_url, self.medium_url, self.small_url]
            .into_iter()
            .flatten()
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct CvPerson {
    id: u64,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    issue_credits: Vec<CvId>,
}

fn parse_start_year(value: Option<serde_json::Value>) -> Option<i32> {
    match value? {
        serde_json::Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        serde_json::Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn parse_date(value: Option<&str>) -> Option<NaiveDate> {
    value.and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

impl From<CvVolume> for Volume {
    fn from(cv: CvVolume) -> Self {
        Volume {
            id: cv.id,
            name: cv.name.unwrap_or_default(),
            start_year: parse_start_year(cv.start_year),
            publisher_name: cv.publisher.and_then(|p| p.name),
        }
    }
}

impl CvIssue {
    fn into_issue(self) -> Option<Issue> {
        let volume = self.volume?;

        let date = parse_date(self.store_date.as_deref())
            .or_else(|| parse_date(self.cover_date.as_deref()));

        Some(Issue {
            id: self.id,
            name: self.name,
            issue_number: self.issue_number.unwrap_or_default(),
            description: self.description,
            author_names: self
                .person_credits
                .unwrap_or_default()
                .into_iter()
                .filter_map(|p| p.name)
                .collect(),
            volume_id: volume.id,
            volume_name: volume.name.unwrap_or_default(),
            publisher_name: None,
            image_urls: self.image.map(CvImage::into_urls).unwrap_or_default(),
            date,
        })
    }
}

impl From<CvPerson> for Person {
    fn from(cv: CvPerson) -> Self {
        Person {
            id: cv.id,
            name: cv.name.unwrap_or_default(),
            issue_ids: cv.issue_credits.into_iter().map(|i| i.id).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_requires_api_key() {
        let config = CatalogConfig::default();
        assert!(matches!(
            ComicVineClient::new(&config),
            Err(CatalogError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_volume_start_year_variants() {
        let parse = |value: serde_json::Value| {
            let cv: CvVolume = serde_json::from_value(json!({
                "id": 1,
                "name": "Preacher Special",
                "start_year": value,
            }))
            .unwrap();
            Volume::from(cv).start_year
        };

        assert_eq!(parse(json!(1996)), Some(1996));
        assert_eq!(parse(json!("1996")), Some(1996));
        assert_eq!(parse(json!("1952?")), None);
        assert_eq!(parse(json!(null)), None);
    }

    #[test]
    fn test_issue_conversion() {
        let cv: CvIssue = serde_json::from_value(json!({
            "id": 105_615,
            "name": "Cassidy: Blood & Whiskey",
            "issue_number": "1",
            "description": "<p>One-shot.</p>",
            "person_credits": [{"id": 40439, "name": "Garth Ennis"}, {"id": 1, "name": null}],
            "volume": {"id": 18_098, "name": "Preacher Special"},
            "store_date": null,
            "cover_date": "1998-02-01",
            "image": {
                "small_url": "https://img/small.jpg",
                "super_url": "https://img/super.jpg",
                "medium_url": "https://img/medium.jpg"
            }
        }))
        .unwrap();

        let issue = cv.into_issue().unwrap();
        assert_eq!(issue.volume_id, 18_098);
        assert_eq!(issue.volume_name, "Preacher Special");
        assert_eq!(issue.author_names, vec!["Garth Ennis"]);
        assert_eq!(issue.date, NaiveDate::from_ymd_opt(1998, 2, 1));
        assert_eq!(
            issue.image_urls,
            vec![
                "https://img/super.jpg",
                "https://img/medium.jpg",
                "https://img/small.jpg"
            ]
        );
    }

    #[test]
    fn test_store_date_wins_over_cover_date() {
        let cv: CvIssue = serde_json::from_value(json!({
            "id": 1,
            "issue_number": "2",
            "volume": {"id": 2, "name": "Dogville"},
            "store_date": "2010-05-12",
            "cover_date": "2010-07-01"
        }))
        .unwrap();

        let issue = cv.into_issue().unwrap();
        assert_eq!(issue.date, NaiveDate::from_ymd_opt(2010, 5, 12));
    }

    #[test]
    fn test_issue_without_volume_is_dropped() {
        let cv: CvIssue = serde_json::from_value(json!({
            "id": 1,
            "issue_number": "2",
            "volume": null
        }))
        .unwrap();

        assert!(cv.into_issue().is_none());
    }

    #[test]
    fn test_person_issue_credits() {
        let cv: CvPerson = serde_json::from_value(json!({
            "id": 40439,
            "name": "Garth Ennis",
            "issue_credits": [{"id": 1}, {"id": 2}]
        }))
        .unwrap();

        let person = Person::from(cv);
        assert_eq!(person.issue_ids, vec![1, 2]);
    }

    #[test]
    fn test_search_page_number() {
        assert_eq!(search_page_number(0, 100), 1);
        assert_eq!(search_page_number(100, 100), 2);
        assert_eq!(search_page_number(40, 20), 3);
        assert_eq!(search_page_number(5, 0), 6);
    }

    #[test]
    fn test_envelope_page_totals() {
        let envelope: CvEnvelope = serde_json::from_value(json!({
            "status_code": 1,
            "error": "OK",
            "number_of_total_results": 250,
            "results": [{"id": 1}, null, {"id": 3}]
        }))
        .unwrap();
        let total = envelope.number_of_total_results;
        let raw: Vec<Option<CvId>> = decode_results(envelope.results, "issue search").unwrap();
        let returned = raw.len();
        let page = ResultPage::new(
            raw.into_iter().flatten().map(|i| i.id).collect(),
            100,
            returned,
            total,
        );

        assert_eq!(page.items, vec![1, 3]);
        assert_eq!(page.next_offset, Some(103));
    }
}
