//! Command-line query tokens.
//!
//! `t:<title>` sets the title, `a:<author>` adds an author and
//! `i:<kind>:<id>` adds a catalog identifier.

use anyhow::{bail, Result};

use comicmeta_core::Query;

pub fn parse_query(tokens: &[String]) -> Result<Query> {
    let mut query = Query::new();

    for token in tokens {
        let Some((prefix, value)) = token.split_once(':') else {
            bail!("Invalid query token {:?}, expected t:, a: or i:", token);
        };

        match prefix {
            "t" => {
                if query.title.is_some() {
                    bail!("Only one t: token is allowed");
                }
                query.title = Some(value.to_string());
            }
            "a" => query.authors.push(value.to_string()),
            "i" => {
                let Some((kind, id)) = value.split_once(':') else {
                    bail!("Invalid identifier token {:?}, expected i:<kind>:<id>", token);
                };
                query.identifiers.insert(kind.to_string(), id.to_string());
            }
            other => bail!("Unknown query token prefix {:?}", other),
        }
    }

    Ok(query)
}
