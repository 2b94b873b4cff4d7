//! Index meta-info: an ordered `key=value` store persisted as UTF-8 text,
//! one pair per line.

use std::fs;
use std::path::Path;

use rustc_hash::FxHashMap;

use crate::error::{Error, Result};

/// Standard properties used by meta file readers and writers.
pub mod keys {
    /// Whether the docIDs have been reordered based upon some mapping. When
    /// set, the document map loads the `url_sorted_doc_id_mapping` file.
    pub const REMAPPED_INDEX: &str = "remapped_index";
    pub const LAYERED_INDEX: &str = "layered_index";
    /// The (max) number of layers the index was built with.
    pub const NUM_LAYERS: &str = "num_layers";
    pub const OVERLAPPING_LAYERS: &str = "overlapping_layers";
    pub const INCLUDES_POSITIONS: &str = "includes_positions";
    pub const INCLUDES_CONTEXTS: &str = "includes_contexts";
    pub const INDEX_DOC_ID_CODING: &str = "index_doc_id_coding";
    pub const INDEX_FREQUENCY_CODING: &str = "index_frequency_coding";
    pub const INDEX_POSITION_CODING: &str = "index_position_coding";
    pub const INDEX_BLOCK_HEADER_CODING: &str = "index_block_header_coding";
    pub const TOTAL_NUM_CHUNKS: &str = "total_num_chunks";
    /// Per-term block count (as if no term shared a block with another).
    pub const TOTAL_NUM_PER_TERM_BLOCKS: &str = "total_num_per_term_blocks";
    pub const TOTAL_DOCUMENT_LENGTHS: &str = "total_document_lengths";
    pub const TOTAL_NUM_DOCS: &str = "total_num_docs";
    /// May differ from `TOTAL_NUM_DOCS` when some documents produce no postings.
    pub const TOTAL_UNIQUE_NUM_DOCS: &str = "total_unique_num_docs";
    pub const FIRST_DOC_ID: &str = "first_doc_id";
    pub const LAST_DOC_ID: &str = "last_doc_id";
    pub const NUM_UNIQUE_TERMS: &str = "num_unique_terms";
    pub const DOCUMENT_POSTING_COUNT: &str = "document_posting_count";
    pub const INDEX_POSTING_COUNT: &str = "index_posting_count";
    pub const TOTAL_HEADER_BYTES: &str = "total_header_bytes";
    pub const TOTAL_DOC_ID_BYTES: &str = "total_doc_id_bytes";
    pub const TOTAL_FREQUENCY_BYTES: &str = "total_frequency_bytes";
    pub const TOTAL_POSITION_BYTES: &str = "total_position_bytes";
    /// Bytes used to pad blocks out to exactly the block size.
    pub const TOTAL_WASTED_BYTES: &str = "total_wasted_bytes";
}

/// Ordered key-value store backing the `.meta` file.
#[derive(Debug, Clone, Default)]
pub struct MetaInfo {
    entries: Vec<(String, String)>,
    by_key: FxHashMap<String, usize>,
}

impl MetaInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        let mut meta = Self::new();
        for (line_num, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::Corruption(format!(
                    "malformed meta file line {}: '{}'",
                    line_num + 1,
                    line
                ))
            })?;
            meta.set(key, value);
        }
        Ok(meta)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let mut out = String::new();
        for (key, value) in &self.entries {
            out.push_str(key);
            out.push('=');
            out.push_str(value);
            out.push('\n');
        }
        fs::write(path.as_ref(), out)?;
        Ok(())
    }

    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        if let Some(&idx) = self.by_key.get(key) {
            self.entries[idx].1 = value;
        } else {
            self.by_key.insert(key.to_string(), self.entries.len());
            self.entries.push((key.to_string(), value));
        }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.by_key
            .get(key)
            .map(|&idx| self.entries[idx].1.as_str())
    }

    /// Missing boolean keys default to false.
    pub fn get_bool(&self, key: &str) -> bool {
        matches!(self.get(key), Some("true") | Some("1"))
    }

    /// A missing or malformed numeric key is a configuration error.
    pub fn get_u64(&self, key: &str) -> Result<u64> {
        let value = self
            .get(key)
            .ok_or_else(|| Error::Config(format!("missing required meta key '{}'", key)))?;
        value
            .parse()
            .map_err(|_| Error::Corruption(format!("meta key '{}' has non-numeric value '{}'", key, value)))
    }

    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| Error::Config(format!("missing required meta key '{}'", key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.meta");

        let mut meta = MetaInfo::new();
        meta.set(keys::TOTAL_NUM_DOCS, 42u64);
        meta.set(keys::LAYERED_INDEX, "true");
        meta.set(keys::INDEX_DOC_ID_CODING, "vbyte");
        meta.write(&path).unwrap();

        let loaded = MetaInfo::load(&path).unwrap();
        assert_eq!(loaded.get_u64(keys::TOTAL_NUM_DOCS).unwrap(), 42);
        assert!(loaded.get_bool(keys::LAYERED_INDEX));
        assert!(!loaded.get_bool(keys::OVERLAPPING_LAYERS));
        assert_eq!(loaded.get_str(keys::INDEX_DOC_ID_CODING).unwrap(), "vbyte");
    }

    #[test]
    fn test_missing_required_key() {
        let meta = MetaInfo::new();
        assert!(meta.get_u64(keys::TOTAL_NUM_DOCS).is_err());
    }
}
