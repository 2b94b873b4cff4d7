//! Silt - a disk-resident inverted-index search engine
//!
//! This library provides:
//! - Block/chunk on-disk index layout with pluggable integer codecs
//!   (variable-byte, Simple-16, Rice, PForDelta)
//! - Lazy list traversal with `next_geq` skipping and an optional in-memory
//!   block-level skip index
//! - BM25 top-k retrieval: DAAT AND/OR, WAND, MaxScore, their two-tiered
//!   variants, and pruned TAAT-OR over layered indices
//! - Four block cache policies: LRU, memory-mapped, fully resident, and
//!   merging-sequential
//! - A layered-index generator splitting lists by partial BM25 score

pub mod cache;
pub mod codecs;
pub mod config;
pub mod docmap;
pub mod error;
pub mod index;
pub mod layerify;
pub mod meta;
pub mod query;

// Re-exports from cache
pub use cache::{BlockCache, CacheStats, LruCache, MergingCache, MmapCache, ResidentCache, BLOCK_SIZE};

// Re-exports from codecs
pub use codecs::{coding_scheme, Codec, CodingScheme};

// Re-exports from index
pub use index::{
    BuilderCounters, IndexBuilder, IndexFiles, IndexReader, LexiconEntry, ListData, Purpose,
    CHUNK_SIZE, MAX_LIST_LAYERS, TERMINATED,
};

// Re-exports from query
pub use query::{
    format_results, Bm25Scorer, QueryAlgorithm, QueryMode, QueryOutput, QueryProcessor,
    QueryStats, ResultFormat, SearchResult,
};

// Re-exports from other modules
pub use config::Config;
pub use docmap::DocumentMap;
pub use error::{Error, Result};
pub use layerify::{LayerSplitMode, LayeredIndexGenerator};
pub use meta::MetaInfo;

pub type DocId = u32;
pub type TermFreq = u32;
pub type Score = f32;
