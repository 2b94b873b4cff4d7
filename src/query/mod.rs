//! Query processing: BM25 scoring, DAAT/WAND/MaxScore/TAAT algorithms, and
//! the processor that dispatches between them.

pub mod bm25;
mod daat;
mod layered;
mod maxscore;
pub mod processor;
mod taat;
pub mod topk;
mod wand;

pub use bm25::{Bm25Scorer, BM25_B, BM25_K1};
pub use processor::{QueryAlgorithm, QueryMode, QueryOutput, QueryProcessor, QueryStats};
pub use topk::{format_results, ResultFormat, SearchResult};

use std::time::Instant;

use crate::docmap::DocumentMap;
use crate::error::{Error, Result};

/// Shared scoring context handed to each algorithm.
pub(crate) struct ScoreContext<'a> {
    pub scorer: &'a Bm25Scorer,
    pub doc_map: &'a DocumentMap,
    pub deadline: Option<Instant>,
}

impl ScoreContext<'_> {
    #[inline]
    pub fn check_deadline(&self) -> Result<()> {
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded);
            }
        }
        Ok(())
    }
}

/// Postings scored/skipped, folded into query statistics.
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct TraversalCounters {
    pub scored: u64,
    pub skipped: u64,
}
