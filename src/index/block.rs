//! Block header decoding.
//!
//! A block begins with an uncompressed chunk count, followed by the
//! compressed header listing every chunk's last docID and size in words, and
//! then the chunk payloads back to back. One block may hold chunks from
//! several terms; `starting_chunk` marks where the current list's chunks
//! begin within the block.

use crate::cache::{BlockBuf, BLOCK_WORDS};
use crate::codecs::CodingScheme;
use crate::error::{Error, Result};

/// A chunk payload is at least two words (one per mandatory stream), which
/// bounds the number of header entries a block can carry.
pub const MAX_CHUNKS_PER_BLOCK: usize = BLOCK_WORDS / 2;

pub struct BlockDecoder {
    /// Interleaved (last_doc_id, size_words) per chunk.
    chunk_properties: Vec<u32>,
    num_chunks: usize,
    curr_chunk: usize,
    starting_chunk: usize,
    /// Word offset of the next chunk payload to decode.
    data_offset: usize,
    block_max_score: f32,
    block: Option<BlockBuf>,
}

impl BlockDecoder {
    pub fn new(header_scheme: &CodingScheme) -> Self {
        Self {
            chunk_properties: vec![0; header_scheme.upper_bound(2 * MAX_CHUNKS_PER_BLOCK)],
            num_chunks: 0,
            curr_chunk: 0,
            starting_chunk: 0,
            data_offset: 0,
            block_max_score: f32::MAX,
            block: None,
        }
    }

    /// Decodes the header of `block` and positions the payload cursor at
    /// `starting_chunk`, the first chunk belonging to the current list.
    pub fn init_block(
        &mut self,
        header_scheme: &CodingScheme,
        starting_chunk: usize,
        block: BlockBuf,
    ) -> Result<()> {
        let num_chunks = block[0] as usize;
        if num_chunks == 0 || num_chunks > MAX_CHUNKS_PER_BLOCK {
            return Err(Error::Corruption(format!(
                "block header declares {} chunks",
                num_chunks
            )));
        }
        if starting_chunk >= num_chunks {
            return Err(Error::Corruption(format!(
                "list starts at chunk {} of a {}-chunk block",
                starting_chunk, num_chunks
            )));
        }
        let consumed =
            header_scheme.decode(&block[1..], &mut self.chunk_properties, 2 * num_chunks)?;
        self.num_chunks = num_chunks;
        self.data_offset = 1 + consumed;
        self.starting_chunk = starting_chunk;
        self.curr_chunk = 0;
        self.block_max_score = f32::MAX;
        self.block = Some(block);
        // Skip payloads of chunks that belong to an earlier list.
        while self.curr_chunk < starting_chunk {
            self.advance_curr_chunk();
        }
        Ok(())
    }

    /// The last fully decoded docID of chunk `chunk_idx` in this block.
    #[inline]
    pub fn chunk_last_doc_id(&self, chunk_idx: usize) -> u32 {
        debug_assert!(chunk_idx < self.num_chunks);
        self.chunk_properties[2 * chunk_idx]
    }

    /// The size in words of chunk `chunk_idx` in this block.
    #[inline]
    pub fn chunk_size(&self, chunk_idx: usize) -> u32 {
        debug_assert!(chunk_idx < self.num_chunks);
        self.chunk_properties[2 * chunk_idx + 1]
    }

    /// Chunks in this block that belong to the current list.
    pub fn num_actual_chunks(&self) -> usize {
        self.num_chunks - self.starting_chunk
    }

    #[inline]
    pub fn num_chunks(&self) -> usize {
        self.num_chunks
    }

    #[inline]
    pub fn curr_chunk(&self) -> usize {
        self.curr_chunk
    }

    #[inline]
    pub fn starting_chunk(&self) -> usize {
        self.starting_chunk
    }

    /// Word offset of the current chunk's payload within the block.
    #[inline]
    pub fn curr_data_offset(&self) -> usize {
        self.data_offset
    }

    /// Moves the payload cursor past the current chunk.
    pub fn advance_curr_chunk(&mut self) {
        self.data_offset += self.chunk_size(self.curr_chunk) as usize;
        self.curr_chunk += 1;
    }

    pub fn block_data(&self) -> BlockBuf {
        std::sync::Arc::clone(self.block.as_ref().expect("block not initialized"))
    }

    pub fn block_max_score(&self) -> f32 {
        self.block_max_score
    }

    pub fn set_block_max_score(&mut self, score: f32) {
        self.block_max_score = score;
    }
}
