//! Inverted-list traversal.
//!
//! A `ListData` tracks the current position within one (term, layer) list:
//! which block, which chunk within it, and which posting within the chunk.
//! DocID gaps are accumulated during traversal, so skipped chunks never pay
//! for gap summing, and frequencies/positions stay compressed until a
//! document is actually scored.

use std::sync::Arc;

use crate::cache::{BlockBuf, BlockCache};
use crate::error::{Error, Result};

use super::block::BlockDecoder;
use super::chunk::{num_doc_properties, ChunkDecoder};
use super::external::ExternalIndexReader;
use super::lexicon::LayerInfo;
use super::{CodecSet, CHUNK_SIZE};

/// Sentinel: no more documents in the list.
pub const TERMINATED: u32 = u32::MAX;

/// Blocks to schedule ahead of the traversal position.
const READ_AHEAD_BLOCKS: u32 = 32;

/// Below this distance a sequential scan of the skip array beats binary
/// search.
const SEQUENTIAL_SKIP_THRESHOLD: usize = 16;

pub struct ListData {
    // List identity, fixed at open.
    layer_num: usize,
    term_num: usize,
    num_docs: u32,
    num_docs_complete_list: u32,
    num_chunks: u32,
    num_chunks_last_block: u32,
    num_blocks: u32,
    initial_block_num: u32,
    initial_chunk_num: u32,
    num_docs_last_chunk: u32,
    score_threshold: f32,
    single_term: bool,
    decode_positions: bool,
    block_skipping: bool,
    last_doc_ids: Option<Arc<Vec<u32>>>,
    external: Option<(Arc<ExternalIndexReader>, u32)>,

    codecs: Arc<CodecSet>,
    cache: Arc<dyn BlockCache>,

    // Traversal state.
    block: BlockDecoder,
    chunk: ChunkDecoder,
    chunk_initialized: bool,
    curr_block_num: u32,
    curr_block_idx: u32,
    num_blocks_left: u32,
    num_chunks_last_block_left: u32,
    prev_block_last_doc_id: u32,
    last_queued_block: u32,

    // Per-list I/O accounting, folded into the reader on close.
    cached_bytes_read: u64,
    disk_bytes_read: u64,
    num_blocks_skipped: u32,
}

#[allow(clippy::too_many_arguments)]
impl ListData {
    pub(crate) fn open(
        layer: &LayerInfo,
        layer_num: usize,
        num_docs_complete_list: u32,
        codecs: Arc<CodecSet>,
        cache: Arc<dyn BlockCache>,
        external: Option<(Arc<ExternalIndexReader>, u32)>,
        decode_positions: bool,
        single_term: bool,
        block_skipping: bool,
        term_num: usize,
    ) -> Result<Self> {
        let leftover = layer.num_docs % CHUNK_SIZE as u32;
        let mut list = Self {
            layer_num,
            term_num,
            num_docs: layer.num_docs,
            num_docs_complete_list,
            num_chunks: layer.num_chunks,
            num_chunks_last_block: layer.num_chunks_last_block,
            num_blocks: layer.num_blocks,
            initial_block_num: layer.block_number,
            initial_chunk_num: layer.chunk_number,
            num_docs_last_chunk: if leftover == 0 {
                CHUNK_SIZE as u32
            } else {
                leftover
            },
            score_threshold: layer.score_threshold,
            single_term,
            decode_positions,
            block_skipping,
            last_doc_ids: layer.last_doc_ids.clone(),
            external,
            block: BlockDecoder::new(&codecs.block_header),
            chunk: ChunkDecoder::new(&codecs),
            chunk_initialized: false,
            codecs,
            cache,
            curr_block_num: 0,
            curr_block_idx: 0,
            num_blocks_left: 0,
            num_chunks_last_block_left: 0,
            prev_block_last_doc_id: 0,
            last_queued_block: 0,
            cached_bytes_read: 0,
            disk_bytes_read: 0,
            num_blocks_skipped: 0,
        };
        list.init()?;
        Ok(list)
    }

    /// Rewinds to the list's initial block and chunk.
    pub fn reset_list(&mut self, single_term: bool) -> Result<()> {
        self.single_term = single_term;
        self.init()
    }

    fn init(&mut self) -> Result<()> {
        if self.num_docs == 0 || self.num_blocks == 0 {
            return Err(Error::Corruption("opening an empty list".to_string()));
        }
        self.curr_block_num = self.initial_block_num;
        self.curr_block_idx = 0;
        self.num_blocks_left = self.num_blocks;
        self.num_chunks_last_block_left = self.num_chunks_last_block;
        self.prev_block_last_doc_id = 0;
        self.chunk_initialized = false;

        let ahead = READ_AHEAD_BLOCKS.min(self.num_blocks);
        self.cache
            .queue_blocks(self.initial_block_num as u64, ahead as u64);
        self.last_queued_block = self.initial_block_num + ahead;

        let data = self.fetch_block(self.curr_block_num)?;
        self.block
            .init_block(&self.codecs.block_header, self.initial_chunk_num as usize, data)?;
        Ok(())
    }

    /// Returns the smallest docID >= `target` in the list, or [`TERMINATED`].
    pub fn next_geq(&mut self, target: u32) -> Result<u32> {
        if !self.has_more() {
            return Ok(TERMINATED);
        }

        if self.block_skipping && !self.single_term {
            if let Some(last_doc_ids) = self.last_doc_ids.clone() {
                let idx = self.curr_block_idx as usize;
                if last_doc_ids[idx] < target {
                    self.skip_blocks_to(&last_doc_ids, target)?;
                    if !self.has_more() {
                        return Ok(TERMINATED);
                    }
                }
            }
        }

        loop {
            if !self.has_more() {
                return Ok(TERMINATED);
            }
            let num_chunks = self.block.num_chunks();
            if self.block.curr_chunk() >= num_chunks {
                self.advance_to_next_block()?;
                continue;
            }
            if self.block.chunk_last_doc_id(self.block.curr_chunk()) < target {
                self.advance_chunk();
                continue;
            }
            break;
        }

        self.ensure_doc_ids_decoded()?;

        let mut offset = self.chunk.curr_document_offset();
        let mut doc_id = self.chunk.prev_decoded_doc_id();
        while doc_id < target {
            offset += 1;
            if offset >= self.chunk.num_docs() {
                return Err(Error::Corruption(
                    "chunk exhausted before its header's last docID".to_string(),
                ));
            }
            doc_id = doc_id.wrapping_add(self.chunk.doc_id(offset));
        }
        self.chunk.set_curr_document_offset(offset);
        self.chunk.set_prev_decoded_doc_id(doc_id);
        Ok(doc_id)
    }

    /// Frequency of the current docID; decodes the chunk's property streams
    /// on first use.
    pub fn get_freq(&mut self) -> Result<u32> {
        if !self.chunk.decoded_properties() {
            self.chunk.decode_frequencies(&self.codecs.frequency)?;
            if self.decode_positions {
                self.chunk.decode_positions(&self.codecs.position)?;
            }
        }
        Ok(self.chunk.current_frequency())
    }

    /// Number of stored per-document properties for the current docID.
    pub fn get_num_doc_properties(&mut self) -> Result<u32> {
        Ok(num_doc_properties(self.get_freq()?) as u32)
    }

    /// Positions of the current docID. Requires the index to store positions
    /// and the list to have been opened with position decoding on.
    pub fn get_positions(&mut self) -> Result<&[u32]> {
        if !self.decode_positions {
            return Err(Error::Query(
                "positions requested but position decoding is disabled".to_string(),
            ));
        }
        self.get_freq()?;
        self.chunk.update_properties_offset();
        Ok(self.chunk.current_positions())
    }

    /// Advances to the next docID whose block's stored score upperbound
    /// exceeds `min_score`, skipping whole blocks.
    pub fn next_greater_block_score(&mut self, min_score: f32) -> Result<u32> {
        loop {
            if !self.has_more() {
                return Ok(TERMINATED);
            }
            if self.block_score_bound()? > min_score {
                return self.next_geq(0);
            }
            self.advance_to_next_block()?;
        }
    }

    /// Advances to the next docID whose chunk's stored score upperbound
    /// exceeds `min_score`, skipping chunk by chunk.
    pub fn next_greater_chunk_score(&mut self, min_score: f32) -> Result<u32> {
        loop {
            if !self.has_more() {
                return Ok(TERMINATED);
            }
            if self.block.curr_chunk() >= self.block.num_chunks() {
                self.advance_to_next_block()?;
                continue;
            }
            if self.chunk_score_bound()? > min_score {
                return self.next_geq(0);
            }
            self.advance_chunk();
        }
    }

    /// Score upperbound of the current block, from the external index.
    pub fn block_score_bound(&self) -> Result<f32> {
        match &self.external {
            Some((reader, offset)) => Ok(reader
                .block(offset + self.curr_block_idx)?
                .block_max_score),
            None => Ok(f32::MAX),
        }
    }

    /// Score upperbound of the current chunk, from the external index.
    pub fn chunk_score_bound(&self) -> Result<f32> {
        match &self.external {
            Some((reader, offset)) => {
                let record = reader.block(offset + self.curr_block_idx)?;
                let chunk_idx = self.block.curr_chunk() - self.block.starting_chunk();
                record.chunk_scores.get(chunk_idx).copied().ok_or_else(|| {
                    Error::Corruption(format!(
                        "external index record missing chunk {}",
                        chunk_idx
                    ))
                })
            }
            None => Ok(f32::MAX),
        }
    }

    /// Sequential move to the next block.
    pub fn advance_block(&mut self) -> Result<()> {
        self.advance_to_next_block()
    }

    /// Sequential move past the current chunk.
    pub fn advance_chunk(&mut self) {
        if self.num_blocks_left == 1 {
            self.num_chunks_last_block_left -= 1;
        }
        self.block.advance_curr_chunk();
        self.chunk_initialized = false;
    }

    fn advance_to_next_block(&mut self) -> Result<()> {
        self.prev_block_last_doc_id = self.block.chunk_last_doc_id(self.block.num_chunks() - 1);
        self.cache.free_block(self.curr_block_num as u64);
        self.num_blocks_left -= 1;
        if self.num_blocks_left == 0 {
            self.num_chunks_last_block_left = 0;
            return Ok(());
        }
        self.curr_block_num += 1;
        self.curr_block_idx += 1;
        self.chunk_initialized = false;
        self.queue_read_ahead();
        let data = self.fetch_block(self.curr_block_num)?;
        self.block.init_block(&self.codecs.block_header, 0, data)
    }

    /// Jumps to the first block whose last docID >= `target`, using the
    /// in-memory skip array.
    fn skip_blocks_to(&mut self, last_doc_ids: &[u32], target: u32) -> Result<()> {
        let start = self.curr_block_idx as usize;
        let total = self.num_blocks as usize;
        debug_assert_eq!(last_doc_ids.len(), total);

        let idx = if total - start <= SEQUENTIAL_SKIP_THRESHOLD {
            let mut i = start;
            while i < total && last_doc_ids[i] < target {
                i += 1;
            }
            i
        } else {
            start + last_doc_ids[start..].partition_point(|&last| last < target)
        };

        self.cache.free_block(self.curr_block_num as u64);
        if idx >= total {
            self.num_blocks_left = 0;
            self.num_chunks_last_block_left = 0;
            return Ok(());
        }
        self.num_blocks_skipped += (idx - start).saturating_sub(1) as u32;
        self.curr_block_idx = idx as u32;
        self.curr_block_num = self.initial_block_num + idx as u32;
        self.num_blocks_left = (total - idx) as u32;
        self.num_chunks_last_block_left = self.num_chunks_last_block;
        self.prev_block_last_doc_id = if idx == 0 { 0 } else { last_doc_ids[idx - 1] };
        self.chunk_initialized = false;

        self.queue_read_ahead();
        let data = self.fetch_block(self.curr_block_num)?;
        let starting_chunk = if idx == 0 {
            self.initial_chunk_num as usize
        } else {
            0
        };
        self.block
            .init_block(&self.codecs.block_header, starting_chunk, data)
    }

    fn ensure_doc_ids_decoded(&mut self) -> Result<()> {
        if !self.chunk_initialized {
            let num_docs = self.curr_chunk_docs() as usize;
            let offset = self.block.curr_data_offset();
            self.chunk
                .init_chunk(num_docs, self.block.block_data(), offset);
            if self.external.is_some() {
                let score = self.chunk_score_bound()?;
                self.chunk.set_chunk_max_score(score);
            }
            self.chunk_initialized = true;
        }
        if !self.chunk.decoded_doc_ids() {
            self.chunk.decode_doc_ids(&self.codecs.doc_id)?;
            let base = self.chunk_base();
            self.chunk
                .set_prev_decoded_doc_id(base.wrapping_add(self.chunk.doc_id(0)));
        }
        Ok(())
    }

    /// Gap base for the current chunk: zero at the start of the list, the
    /// previous block's last docID across a block boundary, and otherwise the
    /// preceding chunk's header entry.
    fn chunk_base(&self) -> u32 {
        let chunk = self.block.curr_chunk();
        if chunk == self.block.starting_chunk() {
            if self.curr_block_idx == 0 {
                0
            } else {
                self.prev_block_last_doc_id
            }
        } else {
            self.block.chunk_last_doc_id(chunk - 1)
        }
    }

    fn curr_chunk_docs(&self) -> u32 {
        if self.num_blocks_left == 1 && self.num_chunks_last_block_left == 1 {
            self.num_docs_last_chunk
        } else {
            CHUNK_SIZE as u32
        }
    }

    fn has_more(&self) -> bool {
        self.num_chunks_last_block_left != 0
    }

    fn queue_read_ahead(&mut self) {
        if self.curr_block_num >= self.last_queued_block {
            let list_end = self.initial_block_num + self.num_blocks;
            let ahead = READ_AHEAD_BLOCKS.min(list_end - self.curr_block_num);
            self.cache
                .queue_blocks(self.curr_block_num as u64, ahead as u64);
            self.last_queued_block = self.curr_block_num + ahead;
        }
    }

    fn fetch_block(&mut self, block_num: u32) -> Result<BlockBuf> {
        let before = self.cache.stats();
        let data = self.cache.get_block(block_num as u64)?;
        let after = self.cache.stats();
        self.cached_bytes_read += after.cached_bytes_read - before.cached_bytes_read;
        self.disk_bytes_read += after.disk_bytes_read - before.disk_bytes_read;
        Ok(data)
    }

    pub fn layer_num(&self) -> usize {
        self.layer_num
    }

    pub fn num_docs(&self) -> u32 {
        self.num_docs
    }

    /// Document frequency of the complete list, for IDF. Layered and
    /// non-layered traversals must score identically.
    pub fn num_docs_complete_list(&self) -> u32 {
        self.num_docs_complete_list
    }

    pub fn num_chunks(&self) -> u32 {
        self.num_chunks
    }

    pub fn num_blocks(&self) -> u32 {
        self.num_blocks
    }

    pub fn score_threshold(&self) -> f32 {
        self.score_threshold
    }

    pub fn term_num(&self) -> usize {
        self.term_num
    }

    pub fn set_term_num(&mut self, term_num: usize) {
        self.term_num = term_num;
    }

    pub fn curr_block_decoder(&self) -> &BlockDecoder {
        &self.block
    }

    pub fn cached_bytes_read(&self) -> u64 {
        self.cached_bytes_read
    }

    pub fn disk_bytes_read(&self) -> u64 {
        self.disk_bytes_read
    }

    pub fn num_blocks_skipped(&self) -> u32 {
        self.num_blocks_skipped
    }
}
