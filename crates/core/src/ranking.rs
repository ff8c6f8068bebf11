//! Multi-factor ranking of candidate issues against a query.
//!
//! Each candidate collects penalty points for every way it differs from the
//! query; lower is better. Rank `0` is reserved for a candidate whose catalog
//! ID equals the one given in the query.

use once_cell::sync::Lazy;
use regex_lite::Regex;

use crate::identify::{MetadataRecord, Query};
use crate::parser::{get_year, normalize_title, Tokenizer};

const AUTHOR_MISMATCH: u32 = 10;
const YEAR_DISTANCE: u32 = 3;
const MISSING_DATE: u32 = 10;
const MISSING_TOKEN: u32 = 10;
const MISSING_ISSUE_NUMBER: u32 = 10;
const WRONG_ISSUE_NUMBER: u32 = 50;
const COLLECTION: u32 = 50;
const LEADING_COLLECTION: u32 = 10;
const TRANSLATION: u32 = 20;

static COLLECTION_PHRASE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:collect|contain)(?:s|ing) issues").unwrap());

// Leading HTML tags are skipped.
static LEADING_COLLECTION_WORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?:<[^>]*>\s*)*(?:Collect|Contain)(?:s|ing)\b").unwrap()
});

/// Penalty points per scoring component.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub authors: u32,
    pub publish_date: u32,
    pub title_tokens: u32,
    pub title_length: u32,
    pub issue_number: u32,
    pub comments: u32,
}

impl ScoreBreakdown {
    pub fn total(&self) -> u32 {
        self.authors
            + self.publish_date
            + self.title_tokens
            + self.title_length
            + self.issue_number
            + self.comments
    }
}

/// Query title, broken down once for scoring many candidates.
#[derive(Debug, Clone)]
struct ParsedTitle {
    tokens: Vec<String>,
    issue_number: Option<String>,
    year: Option<i32>,
    sanitized: String,
}

/// Scores candidates against one query.
#[derive(Debug, Clone)]
pub struct IssueScorer {
    comicvine_id: Option<u64>,
    authors: Vec<String>,
    title: Option<ParsedTitle>,
}

impl IssueScorer {
    pub fn new(query: &Query, tokenizer: &Tokenizer) -> Self {
        let title = query.title_text().map(|title| {
            let normalized = normalize_title(title, Some(tokenizer));
            ParsedTitle {
                sanitized: sanitized(&normalized.tokens, normalized.issue_number.as_deref()),
                year: get_year(title).and_then(|y| y.parse().ok()),
                tokens: normalized.tokens,
                issue_number: normalized.issue_number,
            }
        });

        Self {
            comicvine_id: query.comicvine_id(),
            authors: query.authors.clone(),
            title,
        }
    }

    /// Rank of `record`. `0` only for an identifier match, at least `1`
    /// otherwise.
    pub fn score(&self, record: &MetadataRecord) -> u32 {
        if self.matches_identifier(record) {
            return 0;
        }
        self.breakdown(record).total().max(1)
    }

    /// Identifiers compare as numbers, so `"0105615"` matches `105615`.
    pub fn matches_identifier(&self, record: &MetadataRecord) -> bool {
        let actual = record
            .comicvine_id()
            .and_then(|id| id.trim().parse::<u64>().ok());
        matches!((self.comicvine_id, actual), (Some(wanted), Some(actual)) if wanted == actual)
    }

    /// Per-component penalties. Without a query title only authors count.
    pub fn breakdown(&self, record: &MetadataRecord) -> ScoreBreakdown {
        let authors = self.score_authors(record);
        let Some(title) = &self.title else {
            return ScoreBreakdown {
                authors,
                ..ScoreBreakdown::default()
            };
        };

        ScoreBreakdown {
            authors,
            publish_date: score_publish_date(title.year, record),
            title_tokens: score_title_tokens(&title.tokens, &record.series),
            title_length: score_title_length(title, record),
            issue_number: score_issue_number(title.issue_number.as_deref(), &record.series_index),
            comments: score_comments(record.comments.as_deref()),
        }
    }

    fn score_authors(&self, record: &MetadataRecord) -> u32 {
        let missing = self
            .authors
            .iter()
            .filter(|author| !record.authors.contains(author))
            .count() as u32;
        missing * AUTHOR_MISMATCH
    }
}

fn score_publish_date(query_year: Option<i32>, record: &MetadataRecord) -> u32 {
    use chrono::Datelike;

    match (record.pubdate, query_year) {
        (None, _) => MISSING_DATE,
        (Some(_), None) => 0,
        (Some(date), Some(year)) => date.year().abs_diff(year) * YEAR_DISTANCE,
    }
}

fn score_title_tokens(tokens: &[String], series: &str) -> u32 {
    let series = series.to_lowercase();
    let missing = tokens
        .iter()
        .filter(|token| !series.contains(&token.to_lowercase()))
        .count() as u32;
    missing * MISSING_TOKEN
}

// Zero when the query has no issue number.
fn score_title_length(title: &ParsedTitle, record: &MetadataRecord) -> u32 {
    if title.issue_number.is_none() {
        return 0;
    }

    let candidate = format_issue_title(&record.series, &record.series_index);
    let differs = u32::from(title.sanitized != candidate);
    let delta = title
        .sanitized
        .chars()
        .count()
        .abs_diff(candidate.chars().count()) as u32;
    differs + delta
}

fn score_issue_number(issue_number: Option<&str>, series_index: &str) -> u32 {
    let Some(issue_number) = issue_number else {
        return MISSING_ISSUE_NUMBER;
    };

    let same = match (
        issue_number.parse::<f64>(),
        series_index.trim().parse::<f64>(),
    ) {
        (Ok(wanted), Ok(actual)) => wanted == actual,
        _ => issue_number.eq_ignore_ascii_case(series_index.trim()),
    };

    if same {
        0
    } else {
        WRONG_ISSUE_NUMBER
    }
}

fn score_comments(comments: Option<&str>) -> u32 {
    let Some(comments) = comments else {
        return 0;
    };

    let lower = comments.to_lowercase();
    if COLLECTION_PHRASE.is_match(&lower) {
        return COLLECTION;
    }
    if LEADING_COLLECTION_WORD.is_match(comments) && !lower.contains("issues") {
        return LEADING_COLLECTION;
    }
    if comments.contains("Translates") && comments.matches('\n').count() <= 1 {
        return TRANSLATION;
    }
    0
}

fn sanitized(tokens: &[String], issue_number: Option<&str>) -> String {
    let joined = tokens.join(" ");
    let title = match issue_number {
        Some(number) => format!("{} #{}", joined, number),
        None => joined,
    };
    title.to_lowercase().trim().to_string()
}

/// Query title as compared against candidates: tokens joined by spaces,
/// then `" #"` and the issue number, lower-cased.
pub fn sanitize_title(title: &str, tokenizer: &Tokenizer) -> String {
    let normalized = normalize_title(title, Some(tokenizer));
    sanitized(&normalized.tokens, normalized.issue_number.as_deref())
}

fn format_issue_title(series: &str, series_index: &str) -> String {
    let number = match series_index.trim().parse::<f64>() {
        Ok(index) => format_issue_number(index),
        Err(_) => series_index.trim().to_string(),
    };
    format!("{} #{}", series, number).to_lowercase().trim().to_string()
}

/// `2.0` becomes `"2"`, `2.10` becomes `"2.1"`.
pub fn format_issue_number(index: f64) -> String {
    if index.fract() == 0.0 {
        format!("{}", index as i64)
    } else {
        format!("{:.6}", index)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

/// Stable sort of records by rank, best first.
pub fn rank_records(scorer: &IssueScorer, records: Vec<MetadataRecord>) -> Vec<(MetadataRecord, u32)> {
    let mut ranked: Vec<(MetadataRecord, u32)> = records
        .into_iter()
        .map(|record| {
            let rank = scorer.score(&record);
            (record, rank)
        })
        .collect();
    ranked.sort_by_key(|(_, rank)| *rank);
    ranked
}
