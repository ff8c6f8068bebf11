//! Records returned by the remote comic catalog.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A named, numbered publication series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub id: u64,
    pub name: String,
    /// First year of publication, when the catalog knows it.
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub publisher_name: Option<String>,
}

/// A single release within a volume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    pub id: u64,
    /// Subtitle of the issue, if any.
    #[serde(default)]
    pub name: Option<String>,
    /// Issue number as printed (`"1"`, `"3.1"`, `"1½"`).
    pub issue_number: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author_names: Vec<String>,
    pub volume_id: u64,
    pub volume_name: String,
    #[serde(default)]
    pub publisher_name: Option<String>,
    /// Cover image URLs, best quality first.
    #[serde(default)]
    pub image_urls: Vec<String>,
    /// Store date, falling back to cover date.
    #[serde(default)]
    pub date: Option<NaiveDate>,
}

impl Issue {
    /// `"Volume #N"`, followed by `": Subtitle"` when the issue has one.
    pub fn full_title(&self) -> String {
        let mut title = format!("{} #{}", self.volume_name, self.issue_number);
        if let Some(name) = self.name.as_deref().filter(|n| !n.is_empty()) {
            title.push_str(": ");
            title.push_str(name);
        }
        title
    }

    /// Credited people, or the publisher squashed into a single word when
    /// nobody is credited.
    pub fn authors(&self) -> Vec<String> {
        if !self.author_names.is_empty() {
            return self.author_names.clone();
        }
        match &self.publisher_name {
            Some(publisher) => vec![publisher.replace(' ', "")],
            None => Vec::new(),
        }
    }
}

/// A person credited on catalog issues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Person {
    pub id: u64,
    pub name: String,
    /// Issues this person is credited on.
    #[serde(default)]
    pub issue_ids: Vec<u64>,
}

/// Filter for an issue search: issues in any of the volumes, optionally
/// restricted to one issue number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssueFilter {
    pub volume_ids: Vec<u64>,
    pub issue_number: Option<String>,
}

impl IssueFilter {
    pub fn new(volume_ids: Vec<u64>, issue_number: Option<String>) -> Self {
        Self {
            volume_ids,
            issue_number,
        }
    }

    /// Render as `volume:1|2|3,issue_number:7`.
    pub fn to_filter_string(&self) -> String {
        let ids = self
            .volume_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join("|");

        match &self.issue_number {
            Some(number) => format!("volume:{},issue_number:{}", ids, number),
            None => format!("volume:{}", ids),
        }
    }
}

/// One page of a list or search result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultPage<T> {
    pub items: Vec<T>,
    /// Offset of the following page, `None` on the last page.
    pub next_offset: Option<usize>,
}

impl<T> ResultPage<T> {
    /// Page built from `returned` raw entries read at `offset` out of `total`.
    ///
    /// An empty page is always the last, whatever `total` claims.
    pub fn new(items: Vec<T>, offset: usize, returned: usize, total: usize) -> Self {
        let next = offset + returned;
        Self {
            items,
            next_offset: (returned > 0 && next < total).then_some(next),
        }
    }
}
