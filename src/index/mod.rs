//! On-disk index structures: chunks, blocks, lexicon, builder, reader, and
//! list traversal.

pub mod block;
pub mod builder;
pub mod chunk;
pub mod external;
pub mod lexicon;
pub mod list;
pub mod reader;

#[cfg(test)]
mod tests;

use std::path::{Path, PathBuf};

use crate::codecs::{coding_scheme, CodingScheme};
use crate::config::Config;
use crate::error::Result;
use crate::meta::{keys, MetaInfo};

pub use block::BlockDecoder;
pub use builder::{BuilderCounters, IndexBuilder};
pub use chunk::ChunkDecoder;
pub use external::{ExternalIndexReader, ExternalIndexWriter};
pub use lexicon::{LayerInfo, Lexicon, LexiconEntry, LexiconStream, MAX_LIST_LAYERS};
pub use list::{ListData, TERMINATED};
pub use reader::{IndexReader, Purpose};

/// The maximum number of postings in a chunk.
pub const CHUNK_SIZE: usize = 128;

/// The maximum number of stored positions per document.
pub const MAX_POSITIONS_PER_DOC: usize = 32;

/// The file set making up one finalized index, identified by a common prefix.
#[derive(Debug, Clone)]
pub struct IndexFiles {
    prefix: PathBuf,
}

impl IndexFiles {
    pub fn new(prefix: impl Into<PathBuf>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    fn with_extension(&self, ext: &str) -> PathBuf {
        let mut path = self.prefix.clone().into_os_string();
        path.push(".");
        path.push(ext);
        PathBuf::from(path)
    }

    pub fn index_filename(&self) -> PathBuf {
        self.with_extension("idx")
    }

    pub fn lexicon_filename(&self) -> PathBuf {
        self.with_extension("lex")
    }

    pub fn meta_filename(&self) -> PathBuf {
        self.with_extension("meta")
    }

    pub fn document_map_filename(&self) -> PathBuf {
        self.with_extension("dmap")
    }

    pub fn external_index_filename(&self) -> PathBuf {
        self.with_extension("ext")
    }

    pub fn remapping_filename(&self) -> PathBuf {
        self.prefix
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(crate::docmap::REMAPPING_FILENAME)
    }
}

/// One coding scheme per index stream; names are persisted in the meta file
/// and never change after startup.
pub struct CodecSet {
    pub doc_id: CodingScheme,
    pub frequency: CodingScheme,
    pub position: CodingScheme,
    pub block_header: CodingScheme,
}

impl CodecSet {
    pub fn from_names(
        doc_id: &str,
        frequency: &str,
        position: &str,
        block_header: &str,
    ) -> Result<Self> {
        Ok(Self {
            doc_id: coding_scheme(doc_id)?,
            frequency: coding_scheme(frequency)?,
            position: coding_scheme(position)?,
            block_header: coding_scheme(block_header)?,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::from_names(
            &config.doc_id_coding,
            &config.frequency_coding,
            &config.position_coding,
            &config.block_header_coding,
        )
    }

    pub fn from_meta(meta: &MetaInfo) -> Result<Self> {
        Self::from_names(
            meta.get_str(keys::INDEX_DOC_ID_CODING)?,
            meta.get_str(keys::INDEX_FREQUENCY_CODING)?,
            meta.get_str(keys::INDEX_POSITION_CODING)?,
            meta.get_str(keys::INDEX_BLOCK_HEADER_CODING)?,
        )
    }
}
