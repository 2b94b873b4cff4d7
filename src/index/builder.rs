//! Index builder: assembles chunks into fixed-size blocks from an ordered
//! posting stream and writes the index, lexicon, external index, and meta
//! counters.
//!
//! The upstream posting source feeds one term at a time, docIDs strictly
//! increasing within each layer. Layered builds call `finalize_layer` between
//! layers; single-layer builds just call `finalize_term`, which closes the
//! only layer with the maximum partial score seen.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::sync::Arc;

use crate::cache::{BLOCK_SIZE, BLOCK_WORDS};
use crate::docmap::DocumentMap;
use crate::error::{Error, Result};
use crate::meta::{keys, MetaInfo};
use crate::query::bm25::Bm25Scorer;

use super::chunk::{encode_chunk, num_doc_properties, EncodedChunk};
use super::external::ExternalIndexWriter;
use super::lexicon::{LayerInfo, LexiconEntry, LexiconWriter};
use super::{CodecSet, IndexFiles, CHUNK_SIZE};

/// Collection-level context for computing chunk and block max scores at
/// build time. Without it, stored score bounds are zero and score-skipping
/// algorithms degrade to exhaustive traversal.
pub struct ScoreContext {
    pub scorer: Bm25Scorer,
    pub doc_map: Arc<DocumentMap>,
}

#[derive(Debug, Clone, Default)]
pub struct BuilderCounters {
    pub total_num_chunks: u64,
    pub total_num_per_term_blocks: u64,
    pub total_num_blocks: u64,
    pub posting_count: u64,
    pub num_unique_terms: u64,
    pub total_header_bytes: u64,
    pub total_doc_id_bytes: u64,
    pub total_frequency_bytes: u64,
    pub total_position_bytes: u64,
    pub total_wasted_bytes: u64,
    pub first_doc_id: u32,
    pub last_doc_id: u32,
}

pub struct IndexBuilder {
    idx_writer: BufWriter<File>,
    lexicon: LexiconWriter,
    external: ExternalIndexWriter,
    codecs: Arc<CodecSet>,
    includes_positions: bool,
    score_context: Option<ScoreContext>,

    // Block assembly.
    curr_block_num: u32,
    block_chunks: Vec<EncodedChunk>,

    // Current term.
    curr_term: Option<Vec<u8>>,
    term_doc_frequency: u32,
    term_idf: f32,
    finished_layers: Vec<LayerInfo>,

    // Pending postings of the chunk being assembled.
    pending_doc_ids: Vec<u32>,
    pending_frequencies: Vec<u32>,
    pending_positions: Vec<u32>,
    pending_scores: Vec<f32>,
    prev_doc_id: u32,
    gap_base: u32,

    // Current layer.
    layer_num_docs: u32,
    layer_num_chunks: u32,
    layer_num_blocks: u32,
    layer_chunks_last_block: u32,
    layer_chunks_in_curr_block: u32,
    layer_start_block: u32,
    layer_start_chunk: u32,
    layer_external_offset: u32,
    layer_max_score: f32,
    curr_block_chunk_scores: Vec<f32>,

    first_doc_id: Option<u32>,
    counters: BuilderCounters,
}

impl IndexBuilder {
    pub fn create(
        files: &IndexFiles,
        codecs: Arc<CodecSet>,
        includes_positions: bool,
        score_context: Option<ScoreContext>,
    ) -> Result<Self> {
        Ok(Self {
            idx_writer: BufWriter::new(File::create(files.index_filename())?),
            lexicon: LexiconWriter::create(files.lexicon_filename())?,
            external: ExternalIndexWriter::create(files.external_index_filename())?,
            codecs,
            includes_positions,
            score_context,
            curr_block_num: 0,
            block_chunks: Vec::new(),
            curr_term: None,
            term_doc_frequency: 0,
            term_idf: 0.0,
            finished_layers: Vec::new(),
            pending_doc_ids: Vec::with_capacity(CHUNK_SIZE),
            pending_frequencies: Vec::with_capacity(CHUNK_SIZE),
            pending_positions: Vec::new(),
            pending_scores: Vec::with_capacity(CHUNK_SIZE),
            prev_doc_id: 0,
            gap_base: 0,
            layer_num_docs: 0,
            layer_num_chunks: 0,
            layer_num_blocks: 0,
            layer_chunks_last_block: 0,
            layer_chunks_in_curr_block: 0,
            layer_start_block: 0,
            layer_start_chunk: 0,
            layer_external_offset: 0,
            layer_max_score: 0.0,
            curr_block_chunk_scores: Vec::new(),
            first_doc_id: None,
            counters: BuilderCounters::default(),
        })
    }

    /// Begins a new term. `doc_frequency` is the document frequency of the
    /// complete list, known to the posting source up front; it drives the IDF
    /// used for chunk score bounds.
    pub fn start_term(&mut self, term: &[u8], doc_frequency: u32) -> Result<()> {
        if self.curr_term.is_some() {
            return Err(Error::Corruption(
                "start_term called before the previous term was finalized".to_string(),
            ));
        }
        if term.is_empty() {
            return Err(Error::Corruption("empty term".to_string()));
        }
        self.curr_term = Some(term.to_vec());
        self.term_doc_frequency = doc_frequency;
        self.term_idf = self
            .score_context
            .as_ref()
            .map(|ctx| ctx.scorer.idf(doc_frequency))
            .unwrap_or(0.0);
        self.reset_layer_state();
        Ok(())
    }

    /// Adds the next posting of the current term. DocIDs must be strictly
    /// increasing within a layer.
    pub fn add_posting(&mut self, doc_id: u32, frequency: u32, positions: &[u32]) -> Result<()> {
        if self.curr_term.is_none() {
            return Err(Error::Corruption(
                "add_posting called with no active term".to_string(),
            ));
        }
        if frequency == 0 {
            return Err(Error::Corruption(format!(
                "posting for docID {} has zero frequency",
                doc_id
            )));
        }
        let have_postings = self.layer_num_docs > 0 || !self.pending_doc_ids.is_empty();
        if have_postings && doc_id <= self.prev_doc_id {
            return Err(Error::Corruption(format!(
                "docID {} does not follow {} in increasing order",
                doc_id, self.prev_doc_id
            )));
        }

        let score = match &self.score_context {
            Some(ctx) => ctx
                .scorer
                .partial(self.term_idf, frequency, ctx.doc_map.doc_len(doc_id)),
            None => 0.0,
        };
        if score > self.layer_max_score || self.layer_num_docs == 0 {
            self.layer_max_score = score;
        }

        self.pending_doc_ids.push(doc_id);
        self.pending_frequencies.push(frequency);
        self.pending_scores.push(score);
        if self.includes_positions {
            if positions.len() != frequency as usize {
                return Err(Error::Corruption(format!(
                    "docID {} carries {} positions for frequency {}",
                    doc_id,
                    positions.len(),
                    frequency
                )));
            }
            self.pending_positions
                .extend_from_slice(&positions[..num_doc_properties(frequency)]);
        }
        self.prev_doc_id = doc_id;
        self.layer_num_docs += 1;
        self.counters.posting_count += 1;
        if self.first_doc_id.is_none() {
            self.first_doc_id = Some(doc_id);
        }
        self.counters.last_doc_id = self.counters.last_doc_id.max(doc_id);

        if self.pending_doc_ids.len() == CHUNK_SIZE {
            self.flush_pending_chunk()?;
        }
        Ok(())
    }

    /// Closes the current layer, recording its score upperbound. Must be
    /// called before postings for the next layer are added.
    pub fn finalize_layer(&mut self, score_threshold: f32) -> Result<()> {
        self.flush_pending_chunk()?;
        if self.layer_num_chunks == 0 {
            return Err(Error::Layering("finalizing an empty layer".to_string()));
        }
        if self.finished_layers.len() == super::MAX_LIST_LAYERS {
            return Err(Error::Layering(format!(
                "more than {} layers for one list",
                super::MAX_LIST_LAYERS
            )));
        }
        self.finish_layer_block()?;
        self.finished_layers.push(LayerInfo {
            num_docs: self.layer_num_docs,
            num_chunks: self.layer_num_chunks,
            num_chunks_last_block: self.layer_chunks_last_block,
            num_blocks: self.layer_num_blocks,
            block_number: self.layer_start_block,
            chunk_number: self.layer_start_chunk,
            score_threshold,
            external_index_offset: self.layer_external_offset,
            last_doc_ids: None,
        });
        self.reset_layer_state();
        Ok(())
    }

    /// Completes the current term: closes an in-progress layer (threshold =
    /// max partial score seen) and emits the lexicon entry.
    pub fn finalize_term(&mut self) -> Result<()> {
        let term = self
            .curr_term
            .take()
            .ok_or_else(|| Error::Corruption("finalize_term with no active term".to_string()))?;
        if self.layer_num_docs > 0 || !self.pending_doc_ids.is_empty() {
            let threshold = self.layer_max_score;
            self.finalize_layer(threshold)?;
        }
        if self.finished_layers.is_empty() {
            return Err(Error::Corruption(format!(
                "term '{}' finalized without postings",
                String::from_utf8_lossy(&term)
            )));
        }
        let entry = LexiconEntry {
            term,
            layers: std::mem::take(&mut self.finished_layers),
            num_docs_complete_list: self.term_doc_frequency,
        };
        self.lexicon.add_entry(&entry)?;
        self.counters.num_unique_terms += 1;
        Ok(())
    }

    /// Flushes the last block and finalizes all output files.
    pub fn finalize(mut self) -> Result<BuilderCounters> {
        if self.curr_term.is_some() {
            return Err(Error::Corruption(
                "finalize called with an unfinished term".to_string(),
            ));
        }
        self.flush_block()?;
        self.idx_writer.flush()?;
        self.lexicon.finalize()?;
        self.external.finalize()?;
        self.counters.first_doc_id = self.first_doc_id.unwrap_or(0);
        log::info!(
            "index build complete: {} terms, {} postings, {} blocks, {} wasted bytes",
            self.counters.num_unique_terms,
            self.counters.posting_count,
            self.counters.total_num_blocks,
            self.counters.total_wasted_bytes
        );
        Ok(self.counters)
    }

    fn reset_layer_state(&mut self) {
        self.pending_doc_ids.clear();
        self.pending_frequencies.clear();
        self.pending_positions.clear();
        self.pending_scores.clear();
        self.prev_doc_id = 0;
        self.gap_base = 0;
        self.layer_num_docs = 0;
        self.layer_num_chunks = 0;
        self.layer_num_blocks = 0;
        self.layer_chunks_last_block = 0;
        self.layer_chunks_in_curr_block = 0;
        self.layer_max_score = 0.0;
        self.curr_block_chunk_scores.clear();
    }

    fn flush_pending_chunk(&mut self) -> Result<()> {
        if self.pending_doc_ids.is_empty() {
            return Ok(());
        }
        let mut gaps = Vec::with_capacity(self.pending_doc_ids.len());
        let mut prev = self.gap_base;
        for &doc_id in &self.pending_doc_ids {
            gaps.push(doc_id.wrapping_sub(prev));
            prev = doc_id;
        }
        let last_doc_id = *self.pending_doc_ids.last().unwrap();
        let chunk_max = self
            .pending_scores
            .iter()
            .fold(f32::MIN, |max, &s| max.max(s));

        let chunk = encode_chunk(
            &self.codecs,
            &gaps,
            &self.pending_frequencies,
            self.includes_positions
                .then_some(self.pending_positions.as_slice()),
            last_doc_id,
            chunk_max,
        )?;

        self.pending_doc_ids.clear();
        self.pending_frequencies.clear();
        self.pending_positions.clear();
        self.pending_scores.clear();
        self.gap_base = last_doc_id;
        self.append_chunk(chunk)
    }

    fn append_chunk(&mut self, chunk: EncodedChunk) -> Result<()> {
        if !self.chunk_fits(&chunk)? {
            self.flush_block()?;
            if !self.chunk_fits(&chunk)? {
                return Err(Error::Corruption(format!(
                    "{}-word chunk cannot fit an empty block",
                    chunk.size_words()
                )));
            }
        }
        if self.layer_num_chunks == 0 {
            self.layer_start_block = self.curr_block_num;
            self.layer_start_chunk = self.block_chunks.len() as u32;
            self.layer_external_offset = self.external.current_offset();
        }
        self.counters.total_doc_id_bytes += chunk.doc_id_words as u64 * 4;
        self.counters.total_frequency_bytes += chunk.frequency_words as u64 * 4;
        self.counters.total_position_bytes += chunk.position_words as u64 * 4;
        self.counters.total_num_chunks += 1;
        self.curr_block_chunk_scores.push(chunk.max_score);
        self.layer_chunks_in_curr_block += 1;
        self.layer_num_chunks += 1;
        self.block_chunks.push(chunk);
        Ok(())
    }

    /// Conservative fit test: compresses the candidate header outright, since
    /// header compressibility varies with the chunk mix.
    fn chunk_fits(&self, chunk: &EncodedChunk) -> Result<bool> {
        let header_words = self.header_words_with(Some(chunk))?;
        let payload: usize = self
            .block_chunks
            .iter()
            .map(|c| c.size_words())
            .sum::<usize>()
            + chunk.size_words();
        Ok(1 + header_words + payload <= BLOCK_WORDS)
    }

    fn header_words_with(&self, extra: Option<&EncodedChunk>) -> Result<usize> {
        let mut header = Vec::with_capacity(2 * (self.block_chunks.len() + 1));
        for c in self.block_chunks.iter().chain(extra) {
            header.push(c.last_doc_id);
            header.push(c.size_words() as u32);
        }
        if header.is_empty() {
            return Ok(0);
        }
        let mut scratch = vec![0u32; header.len() * 4 + 16];
        self.codecs.block_header.encode(&header, &mut scratch)
    }

    /// Records the current layer's presence in the block being assembled:
    /// one external-index record per (term layer, block).
    fn finish_layer_block(&mut self) -> Result<()> {
        if self.curr_block_chunk_scores.is_empty() {
            return Ok(());
        }
        let block_max = self
            .curr_block_chunk_scores
            .iter()
            .fold(f32::MIN, |max, &s| max.max(s));
        self.external
            .add_block(block_max, &self.curr_block_chunk_scores)?;
        self.counters.total_num_per_term_blocks += 1;
        self.layer_num_blocks += 1;
        self.layer_chunks_last_block = self.layer_chunks_in_curr_block;
        self.layer_chunks_in_curr_block = 0;
        self.curr_block_chunk_scores.clear();
        Ok(())
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block_chunks.is_empty() {
            return Ok(());
        }
        self.finish_layer_block()?;

        let header_words = self.header_words_with(None)?;
        let mut words = Vec::with_capacity(BLOCK_WORDS);
        words.push(self.block_chunks.len() as u32);
        let mut header = Vec::with_capacity(2 * self.block_chunks.len());
        for c in &self.block_chunks {
            header.push(c.last_doc_id);
            header.push(c.size_words() as u32);
        }
        let mut scratch = vec![0u32; header.len() * 4 + 16];
        let written = self.codecs.block_header.encode(&header, &mut scratch)?;
        debug_assert_eq!(written, header_words);
        words.extend_from_slice(&scratch[..written]);
        for c in &self.block_chunks {
            words.extend_from_slice(&c.data);
        }
        if words.len() > BLOCK_WORDS {
            return Err(Error::Corruption(format!(
                "assembled block is {} words",
                words.len()
            )));
        }
        let padding = BLOCK_WORDS - words.len();
        words.resize(BLOCK_WORDS, 0);

        let mut bytes = Vec::with_capacity(BLOCK_SIZE);
        for word in &words {
            bytes.extend_from_slice(&word.to_le_bytes());
        }
        self.idx_writer.write_all(&bytes)?;

        self.counters.total_header_bytes += (1 + header_words) as u64 * 4;
        self.counters.total_wasted_bytes += padding as u64 * 4;
        self.counters.total_num_blocks += 1;
        self.curr_block_num += 1;
        self.block_chunks.clear();
        Ok(())
    }
}

/// Index-level flags recorded in the meta file.
#[derive(Debug, Clone, Default)]
pub struct IndexFlags {
    pub layered: bool,
    pub overlapping_layers: bool,
    pub num_layers: usize,
    pub includes_positions: bool,
    pub includes_contexts: bool,
    pub remapped: bool,
}

/// Collection statistics the posting source knows and the builder doesn't.
#[derive(Debug, Clone, Default)]
pub struct CollectionStats {
    pub total_num_docs: u64,
    pub total_unique_num_docs: u64,
    pub total_document_lengths: u64,
    pub document_posting_count: u64,
}

pub fn build_meta(
    counters: &BuilderCounters,
    flags: &IndexFlags,
    codec_names: [&str; 4],
    collection: &CollectionStats,
) -> MetaInfo {
    let mut meta = MetaInfo::new();
    meta.set(keys::REMAPPED_INDEX, flags.remapped);
    meta.set(keys::LAYERED_INDEX, flags.layered);
    meta.set(keys::NUM_LAYERS, flags.num_layers.max(1));
    meta.set(keys::OVERLAPPING_LAYERS, flags.overlapping_layers);
    meta.set(keys::INCLUDES_POSITIONS, flags.includes_positions);
    meta.set(keys::INCLUDES_CONTEXTS, flags.includes_contexts);
    meta.set(keys::INDEX_DOC_ID_CODING, codec_names[0]);
    meta.set(keys::INDEX_FREQUENCY_CODING, codec_names[1]);
    meta.set(keys::INDEX_POSITION_CODING, codec_names[2]);
    meta.set(keys::INDEX_BLOCK_HEADER_CODING, codec_names[3]);
    meta.set(keys::TOTAL_NUM_CHUNKS, counters.total_num_chunks);
    meta.set(
        keys::TOTAL_NUM_PER_TERM_BLOCKS,
        counters.total_num_per_term_blocks,
    );
    meta.set(
        keys::TOTAL_DOCUMENT_LENGTHS,
        collection.total_document_lengths,
    );
    meta.set(keys::TOTAL_NUM_DOCS, collection.total_num_docs);
    meta.set(
        keys::TOTAL_UNIQUE_NUM_DOCS,
        collection.total_unique_num_docs,
    );
    meta.set(keys::FIRST_DOC_ID, counters.first_doc_id);
    meta.set(keys::LAST_DOC_ID, counters.last_doc_id);
    meta.set(keys::NUM_UNIQUE_TERMS, counters.num_unique_terms);
    meta.set(
        keys::DOCUMENT_POSTING_COUNT,
        collection.document_posting_count,
    );
    meta.set(keys::INDEX_POSTING_COUNT, counters.posting_count);
    meta.set(keys::TOTAL_HEADER_BYTES, counters.total_header_bytes);
    meta.set(keys::TOTAL_DOC_ID_BYTES, counters.total_doc_id_bytes);
    meta.set(keys::TOTAL_FREQUENCY_BYTES, counters.total_frequency_bytes);
    meta.set(keys::TOTAL_POSITION_BYTES, counters.total_position_bytes);
    meta.set(keys::TOTAL_WASTED_BYTES, counters.total_wasted_bytes);
    meta
}
