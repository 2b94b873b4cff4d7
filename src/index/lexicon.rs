//! Lexicon: term → per-layer list metadata.
//!
//! Random-query mode loads every entry into a move-to-front chain hash:
//! query traffic is Zipfian, so hot terms settle at the head of their chains.
//! Merge-streaming mode reads entries one at a time in the order they were
//! written, for tools that walk the whole index without holding the lexicon
//! in memory.

use std::fs::File;
use std::hash::{Hash, Hasher};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::sync::Arc;

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use parking_lot::Mutex;
use rustc_hash::FxHasher;

use crate::error::{Error, Result};

/// The maximum number of layers a list may be split into.
pub const MAX_LIST_LAYERS: usize = 8;

const MAX_TERM_LEN: usize = 4096;

/// Metadata for one layer of one term's inverted list.
#[derive(Debug, Clone)]
pub struct LayerInfo {
    pub num_docs: u32,
    pub num_chunks: u32,
    pub num_chunks_last_block: u32,
    pub num_blocks: u32,
    /// Block the layer starts in.
    pub block_number: u32,
    /// Chunk index within that block where the layer starts; nonzero when the
    /// layer shares its first block with the tail of another list.
    pub chunk_number: u32,
    /// Max partial-BM25 score of any posting in the layer.
    pub score_threshold: f32,
    pub external_index_offset: u32,
    /// Block-level skip index: last docID of each of the layer's blocks.
    /// Built lazily by the query processor; not persisted.
    pub last_doc_ids: Option<Arc<Vec<u32>>>,
}

#[derive(Debug, Clone)]
pub struct LexiconEntry {
    pub term: Vec<u8>,
    pub layers: Vec<LayerInfo>,
    /// Document frequency of the complete list, used for IDF so layered and
    /// non-layered traversals score identically.
    pub num_docs_complete_list: u32,
}

impl LexiconEntry {
    pub fn num_layers(&self) -> usize {
        self.layers.len()
    }

    pub fn layer(&self, layer_num: usize) -> &LayerInfo {
        &self.layers[layer_num]
    }

    fn compute_doc_frequency(&mut self, overlapping: bool) {
        self.num_docs_complete_list = if overlapping {
            // The last layer re-includes all prior layers.
            self.layers.last().map(|l| l.num_docs).unwrap_or(0)
        } else {
            self.layers.iter().map(|l| l.num_docs).sum()
        };
    }
}

fn write_entry(writer: &mut impl Write, entry: &LexiconEntry) -> Result<()> {
    writer.write_u32::<LittleEndian>(entry.term.len() as u32)?;
    writer.write_all(&entry.term)?;
    writer.write_u32::<LittleEndian>(entry.layers.len() as u32)?;
    for layer in &entry.layers {
        writer.write_u32::<LittleEndian>(layer.num_docs)?;
        writer.write_u32::<LittleEndian>(layer.num_chunks)?;
        writer.write_u32::<LittleEndian>(layer.num_chunks_last_block)?;
        writer.write_u32::<LittleEndian>(layer.num_blocks)?;
        writer.write_u32::<LittleEndian>(layer.block_number)?;
        writer.write_u32::<LittleEndian>(layer.chunk_number)?;
        writer.write_f32::<LittleEndian>(layer.score_threshold)?;
        writer.write_u32::<LittleEndian>(layer.external_index_offset)?;
    }
    Ok(())
}

fn read_entry(reader: &mut impl Read) -> Result<Option<LexiconEntry>> {
    let term_len = match reader.read_u32::<LittleEndian>() {
        Ok(len) => len as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if term_len == 0 || term_len > MAX_TERM_LEN {
        return Err(Error::Corruption(format!(
            "lexicon term length {} out of range",
            term_len
        )));
    }
    let mut term = vec![0u8; term_len];
    reader.read_exact(&mut term)?;
    let num_layers = reader.read_u32::<LittleEndian>()? as usize;
    if num_layers == 0 || num_layers > MAX_LIST_LAYERS {
        return Err(Error::Corruption(format!(
            "lexicon entry declares {} layers",
            num_layers
        )));
    }
    let mut layers = Vec::with_capacity(num_layers);
    for _ in 0..num_layers {
        layers.push(LayerInfo {
            num_docs: reader.read_u32::<LittleEndian>()?,
            num_chunks: reader.read_u32::<LittleEndian>()?,
            num_chunks_last_block: reader.read_u32::<LittleEndian>()?,
            num_blocks: reader.read_u32::<LittleEndian>()?,
            block_number: reader.read_u32::<LittleEndian>()?,
            chunk_number: reader.read_u32::<LittleEndian>()?,
            score_threshold: reader.read_f32::<LittleEndian>()?,
            external_index_offset: reader.read_u32::<LittleEndian>()?,
            last_doc_ids: None,
        });
    }
    Ok(Some(LexiconEntry {
        term,
        layers,
        num_docs_complete_list: 0,
    }))
}

pub struct LexiconWriter {
    writer: BufWriter<File>,
    num_entries: u64,
}

impl LexiconWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self {
            writer: BufWriter::new(File::create(path.as_ref())?),
            num_entries: 0,
        })
    }

    pub fn add_entry(&mut self, entry: &LexiconEntry) -> Result<()> {
        write_entry(&mut self.writer, entry)?;
        self.num_entries += 1;
        Ok(())
    }

    pub fn finalize(mut self) -> Result<u64> {
        self.writer.flush()?;
        Ok(self.num_entries)
    }
}

/// Merge-streaming access: one entry at a time through a small buffer.
pub struct LexiconStream {
    reader: BufReader<File>,
    overlapping_layers: bool,
}

impl LexiconStream {
    pub fn open(path: impl AsRef<Path>, overlapping_layers: bool) -> Result<Self> {
        Ok(Self {
            reader: BufReader::new(File::open(path.as_ref())?),
            overlapping_layers,
        })
    }

    pub fn next_entry(&mut self) -> Result<Option<LexiconEntry>> {
        let mut entry = read_entry(&mut self.reader)?;
        if let Some(entry) = entry.as_mut() {
            entry.compute_doc_frequency(self.overlapping_layers);
        }
        Ok(entry)
    }
}

/// Chain state kept apart from the entries so lookups can relocate chain
/// heads under a lock while returned entry references stay stable.
struct ChainTable {
    buckets: Vec<Option<usize>>,
    next: Vec<Option<usize>>,
}

/// Random-query lexicon: all entries resident, hashed by term bytes into a
/// move-to-front chain table.
pub struct Lexicon {
    entries: Vec<LexiconEntry>,
    chains: Mutex<ChainTable>,
    mask: usize,
}

impl Lexicon {
    pub fn load(path: impl AsRef<Path>, overlapping_layers: bool) -> Result<Self> {
        let mut stream = LexiconStream::open(path, overlapping_layers)?;
        let mut entries = Vec::new();
        while let Some(entry) = stream.next_entry()? {
            entries.push(entry);
        }
        Ok(Self::from_entries(entries))
    }

    fn from_entries(entries: Vec<LexiconEntry>) -> Self {
        let num_buckets = (entries.len() * 2).next_power_of_two().max(16);
        let mask = num_buckets - 1;
        let mut buckets = vec![None; num_buckets];
        let mut next = vec![None; entries.len()];
        for (idx, entry) in entries.iter().enumerate() {
            let bucket = hash_term(&entry.term) & mask;
            next[idx] = buckets[bucket];
            buckets[bucket] = Some(idx);
        }
        Self {
            entries,
            chains: Mutex::new(ChainTable { buckets, next }),
            mask,
        }
    }

    /// Term lookup with move-to-front on the chain hit.
    pub fn get(&self, term: &[u8]) -> Option<&LexiconEntry> {
        let bucket = hash_term(term) & self.mask;
        let mut chains = self.chains.lock();
        let mut prev: Option<usize> = None;
        let mut curr = chains.buckets[bucket];
        while let Some(idx) = curr {
            if self.entries[idx].term == term {
                if let Some(prev_idx) = prev {
                    chains.next[prev_idx] = chains.next[idx];
                    chains.next[idx] = chains.buckets[bucket];
                    chains.buckets[bucket] = Some(idx);
                }
                return Some(&self.entries[idx]);
            }
            prev = curr;
            curr = chains.next[idx];
        }
        None
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &LexiconEntry> {
        self.entries.iter()
    }

    /// Mutable walk for building per-layer skip-index annotations.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut LexiconEntry> {
        self.entries.iter_mut()
    }
}

fn hash_term(term: &[u8]) -> usize {
    let mut hasher = FxHasher::default();
    term.hash(&mut hasher);
    hasher.finish() as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term: &str, num_docs: u32) -> LexiconEntry {
        LexiconEntry {
            term: term.as_bytes().to_vec(),
            layers: vec![LayerInfo {
                num_docs,
                num_chunks: 1,
                num_chunks_last_block: 1,
                num_blocks: 1,
                block_number: 0,
                chunk_number: 0,
                score_threshold: 1.0,
                external_index_offset: 0,
                last_doc_ids: None,
            }],
            num_docs_complete_list: num_docs,
        }
    }

    #[test]
    fn test_write_then_stream() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lex");

        let mut writer = LexiconWriter::create(&path).unwrap();
        writer.add_entry(&entry("apple", 3)).unwrap();
        writer.add_entry(&entry("banana", 7)).unwrap();
        assert_eq!(writer.finalize().unwrap(), 2);

        let mut stream = LexiconStream::open(&path, false).unwrap();
        let first = stream.next_entry().unwrap().unwrap();
        assert_eq!(first.term, b"apple");
        assert_eq!(first.num_docs_complete_list, 3);
        let second = stream.next_entry().unwrap().unwrap();
        assert_eq!(second.term, b"banana");
        assert!(stream.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_random_access_with_move_to_front() {
        let entries = vec![entry("a", 1), entry("b", 2), entry("c", 3)];
        let lexicon = Lexicon::from_entries(entries);

        assert_eq!(lexicon.get(b"b").unwrap().layer(0).num_docs, 2);
        assert_eq!(lexicon.get(b"b").unwrap().layer(0).num_docs, 2);
        assert_eq!(lexicon.get(b"a").unwrap().layer(0).num_docs, 1);
        assert!(lexicon.get(b"zebra").is_none());
    }

    #[test]
    fn test_overlapping_doc_frequency() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("test.lex");

        let mut two_layer = entry("term", 0);
        let mut second = two_layer.layers[0].clone();
        two_layer.layers[0].num_docs = 10;
        second.num_docs = 50;
        two_layer.layers.push(second);

        let mut writer = LexiconWriter::create(&path).unwrap();
        writer.add_entry(&two_layer).unwrap();
        writer.finalize().unwrap();

        let overlapping = Lexicon::load(&path, true).unwrap();
        assert_eq!(overlapping.get(b"term").unwrap().num_docs_complete_list, 50);
        let disjoint = Lexicon::load(&path, false).unwrap();
        assert_eq!(disjoint.get(b"term").unwrap().num_docs_complete_list, 60);
    }

    #[test]
    fn test_corrupt_length_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.lex");
        std::fs::write(&path, (MAX_TERM_LEN as u32 + 1).to_le_bytes()).unwrap();
        let mut stream = LexiconStream::open(&path, false).unwrap();
        assert!(stream.next_entry().is_err());
    }
}
