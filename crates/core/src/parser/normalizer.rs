//! Issue number and search token extraction.
//!
//! The title is pushed through an ordered list of textual rewrites. Order
//! matters: the issue-number rule assumes volume markers, scene tags and
//! parenthesized groups are already gone.

use once_cell::sync::Lazy;
use regex_lite::{Captures, Regex};

use super::tokenizer::Tokenizer;

/// Result of normalizing a title.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NormalizedTitle {
    /// Issue number exactly as written after leading zeros are dropped (`"3.1"`, `"1½"`).
    pub issue_number: Option<String>,
    /// Lower-case tokens of the remaining title. Empty when no tokenizer was given.
    pub tokens: Vec<String>,
}

enum Rewrite {
    /// Replace every match with a fixed template (`${n}` refers to groups).
    Template(&'static str),
    /// Squash a run of initials ("J. R. R.") into one word ("JRR").
    CollapseInitials,
}

static REWRITES: Lazy<Vec<(Regex, Rewrite)>> = Lazy::new(|| {
    vec![
        // "J. R. R." or "J.R.R." style initials
        (
            Regex::new(r"(?:^|\s)[a-zA-Z]\.(?:\s?[a-zA-Z]\.)+").unwrap(),
            Rewrite::CollapseInitials,
        ),
        // "(of 3)" or "of 3"
        (
            Regex::new(r"\s\(?of \d+\)?").unwrap(),
            Rewrite::Template(" "),
        ),
        // "v2", "vol2", "v 2", "vol 2", "v02"
        (
            Regex::new(r"(?:v|vol)\s?\d+").unwrap(),
            Rewrite::Template(" "),
        ),
        // c2c = cover to cover, TPB = trade paperback, OS = one-shot
        (
            Regex::new(r"\s(?:c2c|TPB|OS)\s").unwrap(),
            Rewrite::Template(" "),
        ),
        (
            Regex::new(r"\s(?:c2c|TPB|OS)$").unwrap(),
            Rewrite::Template(" "),
        ),
        // scan groups, years, edition notes
        (Regex::new(r"\([^)]+\)").unwrap(), Rewrite::Template(" ")),
        // Mark the last number that is neither the first word nor quoted
        // ('68). Swallows '#', leading zeros and trailing noise up to a colon.
        (
            Regex::new(r"([^#\d½']+)(?:[#\s])?0*([\d½]+[^:\s]*):?[^\d]*$").unwrap(),
            Rewrite::Template("${1}___${2}___"),
        ),
        (Regex::new(r"\s{2,}").unwrap(), Rewrite::Template(" ")),
    ]
});

static ISSUE_MARKER: Lazy<Regex> = Lazy::new(|| Regex::new(r"___([^:\s]+)___").unwrap());

static PARENTHESIZED_YEAR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\((\d{4})\)").unwrap());

/// Break a title into an issue number and lower-case search tokens.
///
/// A missing issue number is not an error; it just yields `None`.
pub fn normalize_title(title: &str, tokenizer: Option<&Tokenizer>) -> NormalizedTitle {
    let mut text = title.to_string();

    for (pattern, rewrite) in REWRITES.iter() {
        text = match rewrite {
            Rewrite::Template(template) => pattern.replace_all(&text, *template).into_owned(),
            Rewrite::CollapseInitials => pattern
                .replace_all(&text, |caps: &Captures| collapse_initials(&caps[0]))
                .into_owned(),
        };
    }

    let issue_number = ISSUE_MARKER
        .captures(&text)
        .map(|caps| caps[1].to_string());
    if issue_number.is_some() {
        text = ISSUE_MARKER.replace_all(&text, "").into_owned();
    }

    let tokens = match tokenizer {
        Some(tokenize) => tokenize(text.trim())
            .into_iter()
            .map(|token| token.to_lowercase())
            .collect(),
        None => Vec::new(),
    };

    NormalizedTitle {
        issue_number,
        tokens,
    }
}

fn collapse_initials(run: &str) -> String {
    let leading = if run.starts_with(char::is_whitespace) {
        " "
    } else {
        ""
    };
    let letters: String = run
        .chars()
        .filter(|c| *c != '.' && !c.is_whitespace())
        .collect();
    format!("{leading}{letters}")
}

/// Issue number of a title, if one can be found.
pub fn issue_number(title: &str) -> Option<String> {
    normalize_title(title, None).issue_number
}

/// Search tokens of a title.
pub fn title_tokens(title: &str, tokenizer: &Tokenizer) -> Vec<String> {
    normalize_title(title, Some(tokenizer)).tokens
}

/// The last 4-digit number wrapped in parentheses, taken as the publication year.
pub fn get_year(title: &str) -> Option<String> {
    PARENTHESIZED_YEAR
        .captures_iter(title)
        .last()
        .map(|caps| caps[1].to_string())
}

/// Replace up to `count` occurrences of `old` in `s`, counting from the end.
pub fn rreplace(s: &str, old: &str, new: &str, count: usize) -> String {
    if old.is_empty() || count == 0 {
        return s.to_string();
    }

    let mut parts: Vec<&str> = s.rsplitn(count + 1, old).collect();
    parts.reverse();
    parts.join(new)
}
