//! Metadata records handed back to the host, plain and ranked.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::query::{COMICVINE, COMICVINE_VOLUME};
use crate::catalog::Issue;

/// Metadata handed to the host for one candidate issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub series: String,
    /// Issue number as printed by the catalog.
    pub series_index: String,
    /// `comicvine` and `comicvine-volume` IDs.
    pub identifiers: BTreeMap<String, String>,
    pub comments: Option<String>,
    pub publisher: Option<String>,
    pub pubdate: Option<NaiveDate>,
    /// Covers are fetched separately, so records never carry one.
    pub has_cover: bool,
}

impl MetadataRecord {
    pub fn comicvine_id(&self) -> Option<&str> {
        self.identifiers.get(COMICVINE).map(String::as_str)
    }

    pub fn comicvine_volume_id(&self) -> Option<&str> {
        self.identifiers.get(COMICVINE_VOLUME).map(String::as_str)
    }
}

impl From<&Issue> for MetadataRecord {
    fn from(issue: &Issue) -> Self {
        Self {
            title: issue.full_title(),
            authors: issue.authors(),
            series: issue.volume_name.clone(),
            series_index: issue.issue_number.clone(),
            identifiers: BTreeMap::from([
                (COMICVINE.to_string(), issue.id.to_string()),
                (COMICVINE_VOLUME.to_string(), issue.volume_id.to_string()),
            ]),
            comments: issue.description.clone(),
            publisher: issue.publisher_name.clone(),
            pubdate: issue.date,
            has_cover: false,
        }
    }
}

/// A metadata record with its rank against the query. Lower is better.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub record: MetadataRecord,
    pub rank: u32,
}
