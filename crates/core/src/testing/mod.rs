//! Testing utilities and mock implementations.
//!
//! This module provides an in-memory catalog and record builders so the
//! identify flow can be exercised without network access.
//!
//! # Example
//!
//! ```rust,ignore
//! use comicmeta_core::testing::{fixtures, MockComicCatalog};
//!
//! let catalog = MockComicCatalog::new();
//! catalog.add_volume(fixtures::volume(18098, "Preacher Special", 1996)).await;
//! catalog.add_issue(fixtures::issue(105615, 18098, "Preacher Special", "1")).await;
//!
//! // Scripted failures
//! catalog.set_next_error(CatalogError::Transport("reset".into())).await;
//! ```

mod mock_catalog;

pub use mock_catalog::{MockComicCatalog, RecordedCatalogQuery};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::collections::BTreeMap;

    use chrono::NaiveDate;

    use crate::catalog::{Issue, Person, Volume};
    use crate::identify::{MetadataRecord, COMICVINE, COMICVINE_VOLUME};

    /// Create a test volume.
    pub fn volume(id: u64, name: &str, start_year: i32) -> Volume {
        Volume {
            id,
            name: name.to_string(),
            start_year: Some(start_year),
            publisher_name: Some("Test Publisher".to_string()),
        }
    }

    /// Create a test issue with a publisher, a date and no credits.
    pub fn issue(id: u64, volume_id: u64, volume_name: &str, issue_number: &str) -> Issue {
        Issue {
            id,
            name: None,
            issue_number: issue_number.to_string(),
            description: None,
            author_names: Vec::new(),
            volume_id,
            volume_name: volume_name.to_string(),
            publisher_name: Some("Test Publisher".to_string()),
            image_urls: vec![
                format!("https://images.example/{}/super.jpg", id),
                format!("https://images.example/{}/medium.jpg", id),
            ],
            date: NaiveDate::from_ymd_opt(2010, 1, 1),
        }
    }

    /// Create a test issue credited to the given people.
    pub fn credited_issue(
        id: u64,
        volume_id: u64,
        volume_name: &str,
        issue_number: &str,
        authors: &[&str],
    ) -> Issue {
        let mut issue = issue(id, volume_id, volume_name, issue_number);
        issue.author_names = authors.iter().map(|a| a.to_string()).collect();
        issue
    }

    /// Create a test person credited on the given issues.
    pub fn person(id: u64, name: &str, issue_ids: &[u64]) -> Person {
        Person {
            id,
            name: name.to_string(),
            issue_ids: issue_ids.to_vec(),
        }
    }

    /// Create a metadata record for ranking tests.
    pub fn record(series: &str, series_index: &str, year: Option<i32>) -> MetadataRecord {
        MetadataRecord {
            title: format!("{} #{}", series, series_index),
            authors: Vec::new(),
            series: series.to_string(),
            series_index: series_index.to_string(),
            identifiers: BTreeMap::from([
                (COMICVINE.to_string(), "1".to_string()),
                (COMICVINE_VOLUME.to_string(), "1".to_string()),
            ]),
            comments: None,
            publisher: None,
            pubdate: year.and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)),
            has_cover: false,
        }
    }
}
