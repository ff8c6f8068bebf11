//! Title parsing for loosely specified issue titles.
//!
//! Turns noisy, human-entered file names such as
//! `"Spider-Man 003.1 (2010) (extra stuff)"` into an issue number and a
//! list of lower-case search tokens.

mod normalizer;
mod tokenizer;

pub use normalizer::{
    get_year, issue_number, normalize_title, rreplace, title_tokens, NormalizedTitle,
};
pub use tokenizer::{default_tokenizer, Tokenizer};
