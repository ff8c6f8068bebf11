//! Identify pipeline: query in, metadata records out.
//!
//! An identify call moves through these states:
//! - **Resolving**: the query becomes a set of candidate issue IDs
//! - **Fetching**: a bounded pool of workers fetches each candidate and pushes
//!   a [`MetadataRecord`] into the caller's [`ResultSink`]
//! - **Done** or **Aborted**
//!
//! Ranking happens afterwards, see [`IdentifyPipeline::identify_and_rank`].

mod pipeline;
mod query;
mod record;
mod sink;

pub use pipeline::{IdentifyPipeline, IdentifyReport, PipelineState};
pub use query::{Query, COMICVINE, COMICVINE_VOLUME};
pub use record::{MetadataRecord, RankedResult};
pub use sink::{AbortHandle, ResultSink, VecSink};

use thiserror::Error;

use crate::catalog::CatalogError;

/// Errors that end an identify call.
#[derive(Debug, Error)]
pub enum IdentifyError {
    /// Candidate resolution or a cover lookup failed.
    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),
}
