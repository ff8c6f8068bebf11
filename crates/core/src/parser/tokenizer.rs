//! Word tokenizer used when the caller does not supply one.

/// A function that splits a sanitized title into words.
pub type Tokenizer = dyn Fn(&str) -> Vec<String> + Send + Sync;

/// Split text into words on anything that is not alphanumeric or an apostrophe.
pub fn default_tokenizer(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|s| s.trim_matches('\''))
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}
