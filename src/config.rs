//! Explicit configuration context threaded through readers and query processors.
//!
//! Parsed from a plain `key=value` text file. Unrecognized keys are logged and
//! ignored; malformed values for recognized keys are fatal at startup.

use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

/// Recognized configuration keys.
pub mod keys {
    pub const MEMORY_MAPPED_INDEX: &str = "memory_mapped_index";
    pub const MEMORY_RESIDENT_INDEX: &str = "memory_resident_index";
    pub const LRU_CACHE_BLOCKS: &str = "lru_cache_blocks";
    pub const MAX_NUMBER_RESULTS: &str = "max_number_results";
    pub const USE_POSITIONS: &str = "use_positions";
    pub const NUM_LAYERS: &str = "num_layers";
    pub const OVERLAPPING_LAYERS: &str = "overlapping_layers";
    pub const INDEX_DOC_ID_CODING: &str = "index_doc_id_coding";
    pub const INDEX_FREQUENCY_CODING: &str = "index_frequency_coding";
    pub const INDEX_POSITION_CODING: &str = "index_position_coding";
    pub const INDEX_BLOCK_HEADER_CODING: &str = "index_block_header_coding";
}

/// Configuration for opening an index and running queries against it.
///
/// If both `memory_mapped_index` and `memory_resident_index` are set, the
/// memory-mapped policy wins.
#[derive(Debug, Clone)]
pub struct Config {
    pub memory_mapped_index: bool,
    pub memory_resident_index: bool,
    pub lru_cache_blocks: usize,
    pub max_number_results: usize,
    pub use_positions: bool,
    pub num_layers: usize,
    pub overlapping_layers: bool,
    pub doc_id_coding: String,
    pub frequency_coding: String,
    pub position_coding: String,
    pub block_header_coding: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory_mapped_index: false,
            memory_resident_index: false,
            lru_cache_blocks: 1024,
            max_number_results: 10,
            use_positions: false,
            num_layers: 2,
            overlapping_layers: false,
            doc_id_coding: "vbyte".to_string(),
            frequency_coding: "s16".to_string(),
            position_coding: "vbyte".to_string(),
            block_header_coding: "s16".to_string(),
        }
    }
}

impl Config {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_str_contents(&text)
    }

    pub fn from_str_contents(text: &str) -> Result<Self> {
        let mut config = Self::default();
        for (line_num, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let (key, value) = line.split_once('=').ok_or_else(|| {
                Error::Config(format!(
                    "malformed configuration line {}: '{}'",
                    line_num + 1,
                    line
                ))
            })?;
            config.set(key.trim(), value.trim())?;
        }
        Ok(config)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        match key {
            keys::MEMORY_MAPPED_INDEX => self.memory_mapped_index = parse_bool(key, value)?,
            keys::MEMORY_RESIDENT_INDEX => self.memory_resident_index = parse_bool(key, value)?,
            keys::LRU_CACHE_BLOCKS => {
                self.lru_cache_blocks = parse_numeric(key, value)?;
                if self.lru_cache_blocks == 0 {
                    return Err(erroneous_value(key, value));
                }
            }
            keys::MAX_NUMBER_RESULTS => {
                self.max_number_results = parse_numeric(key, value)?;
                if self.max_number_results == 0 {
                    return Err(erroneous_value(key, value));
                }
            }
            keys::USE_POSITIONS => self.use_positions = parse_bool(key, value)?,
            keys::NUM_LAYERS => {
                self.num_layers = parse_numeric(key, value)?;
                if self.num_layers == 0 || self.num_layers > crate::index::MAX_LIST_LAYERS {
                    return Err(erroneous_value(key, value));
                }
            }
            keys::OVERLAPPING_LAYERS => self.overlapping_layers = parse_bool(key, value)?,
            keys::INDEX_DOC_ID_CODING => self.doc_id_coding = value.to_string(),
            keys::INDEX_FREQUENCY_CODING => self.frequency_coding = value.to_string(),
            keys::INDEX_POSITION_CODING => self.position_coding = value.to_string(),
            keys::INDEX_BLOCK_HEADER_CODING => self.block_header_coding = value.to_string(),
            _ => {
                log::warn!("ignoring unrecognized configuration key '{}'", key);
            }
        }
        Ok(())
    }
}

fn erroneous_value(key: &str, value: &str) -> Error {
    Error::Config(format!("key '{}' has an erroneous value of '{}'", key, value))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        _ => Err(erroneous_value(key, value)),
    }
}

fn parse_numeric(key: &str, value: &str) -> Result<usize> {
    value.parse().map_err(|_| erroneous_value(key, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.max_number_results, 10);
        assert_eq!(config.doc_id_coding, "vbyte");
        assert!(!config.memory_mapped_index);
    }

    #[test]
    fn test_parse() {
        let config = Config::from_str_contents(
            "# comment\n\
             memory_mapped_index=true\n\
             lru_cache_blocks=64\n\
             max_number_results=25\n\
             index_doc_id_coding=pfor\n",
        )
        .unwrap();
        assert!(config.memory_mapped_index);
        assert_eq!(config.lru_cache_blocks, 64);
        assert_eq!(config.max_number_results, 25);
        assert_eq!(config.doc_id_coding, "pfor");
    }

    #[test]
    fn test_erroneous_values_are_fatal() {
        assert!(Config::from_str_contents("max_number_results=0").is_err());
        assert!(Config::from_str_contents("max_number_results=lots").is_err());
        assert!(Config::from_str_contents("num_layers=99").is_err());
        assert!(Config::from_str_contents("use_positions=maybe").is_err());
    }
}
