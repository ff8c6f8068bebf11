//! Identify query: title, authors and catalog identifiers.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Identifier kind of a catalog issue ID.
pub const COMICVINE: &str = "comicvine";
/// Identifier kind of a catalog volume ID.
pub const COMICVINE_VOLUME: &str = "comicvine-volume";

/// What the caller knows about the comic being identified.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub authors: Vec<String>,
    /// Identifier kind (`comicvine`, `comicvine-volume`) to value.
    #[serde(default)]
    pub identifiers: BTreeMap<String, String>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Query by title only.
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn with_identifier(mut self, kind: impl Into<String>, value: impl Into<String>) -> Self {
        self.identifiers.insert(kind.into(), value.into());
        self
    }

    /// Title, if present and not blank.
    pub fn title_text(&self) -> Option<&str> {
        self.title.as_deref().filter(|t| !t.trim().is_empty())
    }

    /// Catalog issue ID, if one was given and is numeric.
    pub fn comicvine_id(&self) -> Option<u64> {
        self.numeric_identifier(COMICVINE)
    }

    /// Catalog volume ID, if one was given and is numeric.
    pub fn comicvine_volume_id(&self) -> Option<u64> {
        self.numeric_identifier(COMICVINE_VOLUME)
    }

    fn numeric_identifier(&self, kind: &str) -> Option<u64> {
        self.identifiers.get(kind)?.trim().parse().ok()
    }
}
