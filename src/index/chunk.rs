//! Chunk encoding and decoding.
//!
//! A chunk is a run of at most [`CHUNK_SIZE`] postings of one term, stored as
//! three independently compressed streams: docID gaps, frequencies, and
//! positions. The streams are self-delimiting, so frequencies and positions
//! can stay compressed until a document actually gets scored.

use std::sync::Arc;

use crate::cache::BlockBuf;
use crate::codecs::CodingScheme;
use crate::error::Result;

use super::{CodecSet, CHUNK_SIZE, MAX_POSITIONS_PER_DOC};

/// Number of positions stored for a document with the given frequency.
#[inline]
pub fn num_doc_properties(frequency: u32) -> usize {
    (frequency as usize).min(MAX_POSITIONS_PER_DOC)
}

/// A fully encoded chunk, ready for block assembly.
#[derive(Debug, Clone)]
pub struct EncodedChunk {
    pub last_doc_id: u32,
    pub num_docs: u32,
    pub data: Vec<u32>,
    pub max_score: f32,
    pub doc_id_words: usize,
    pub frequency_words: usize,
    pub position_words: usize,
}

impl EncodedChunk {
    pub fn size_words(&self) -> usize {
        self.data.len()
    }
}

/// Compresses one chunk. `doc_id_gaps` are d-gaps continuing from the
/// previous chunk of the same list; `positions` concatenates each document's
/// stored positions (already capped at [`MAX_POSITIONS_PER_DOC`]).
pub fn encode_chunk(
    codecs: &CodecSet,
    doc_id_gaps: &[u32],
    frequencies: &[u32],
    positions: Option<&[u32]>,
    last_doc_id: u32,
    max_score: f32,
) -> Result<EncodedChunk> {
    assert!(!doc_id_gaps.is_empty() && doc_id_gaps.len() <= CHUNK_SIZE);
    assert_eq!(doc_id_gaps.len(), frequencies.len());

    let mut data = vec![0u32; encode_upper_bound(&codecs.doc_id, doc_id_gaps.len())];
    let doc_id_words = codecs.doc_id.encode(doc_id_gaps, &mut data)?;
    data.truncate(doc_id_words);

    let mut scratch = vec![0u32; encode_upper_bound(&codecs.frequency, frequencies.len())];
    let frequency_words = codecs.frequency.encode(frequencies, &mut scratch)?;
    data.extend_from_slice(&scratch[..frequency_words]);

    let mut position_words = 0;
    if let Some(positions) = positions {
        let mut scratch = vec![0u32; encode_upper_bound(&codecs.position, positions.len())];
        position_words = codecs.position.encode(positions, &mut scratch)?;
        data.extend_from_slice(&scratch[..position_words]);
    }

    Ok(EncodedChunk {
        last_doc_id,
        num_docs: doc_id_gaps.len() as u32,
        data,
        max_score,
        doc_id_words,
        frequency_words,
        position_words,
    })
}

/// Generous output bound: covers blockwise padding plus codecs whose encoded
/// form can exceed the input length (unary runs, exception patches).
fn encode_upper_bound(scheme: &CodingScheme, n: usize) -> usize {
    scheme.upper_bound(n) * 4 + 16
}

/// Decodes one chunk lazily, tracking traversal state within it.
///
/// DocID gaps are decompressed but not summed here; gap accumulation happens
/// during traversal. Frequencies and positions are decoded only when a
/// document is actually scored.
pub struct ChunkDecoder {
    doc_ids: Vec<u32>,
    frequencies: Vec<u32>,
    positions: Vec<u32>,
    num_docs: usize,
    num_positions: usize,
    curr_document_offset: usize,
    prev_document_offset: usize,
    curr_position_offset: usize,
    prev_decoded_doc_id: u32,
    decoded_doc_ids: bool,
    decoded_properties: bool,
    chunk_max_score: f32,
    block: Option<BlockBuf>,
    data_offset: usize,
}

impl ChunkDecoder {
    pub fn new(codecs: &CodecSet) -> Self {
        Self {
            doc_ids: vec![0; codecs.doc_id.upper_bound(CHUNK_SIZE)],
            frequencies: vec![0; codecs.frequency.upper_bound(CHUNK_SIZE)],
            positions: vec![
                0;
                codecs
                    .position
                    .upper_bound(CHUNK_SIZE * MAX_POSITIONS_PER_DOC)
            ],
            num_docs: 0,
            num_positions: 0,
            curr_document_offset: 0,
            prev_document_offset: 0,
            curr_position_offset: 0,
            prev_decoded_doc_id: 0,
            decoded_doc_ids: false,
            decoded_properties: false,
            chunk_max_score: f32::MAX,
            block: None,
            data_offset: 0,
        }
    }

    /// Points the decoder at a raw chunk within a resident block.
    pub fn init_chunk(&mut self, num_docs: usize, block: BlockBuf, word_offset: usize) {
        debug_assert!(num_docs > 0 && num_docs <= CHUNK_SIZE);
        self.num_docs = num_docs;
        self.num_positions = 0;
        self.curr_document_offset = 0;
        self.prev_document_offset = 0;
        self.curr_position_offset = 0;
        self.prev_decoded_doc_id = 0;
        self.decoded_doc_ids = false;
        self.decoded_properties = false;
        self.chunk_max_score = f32::MAX;
        self.block = Some(block);
        self.data_offset = word_offset;
    }

    pub fn decode_doc_ids(&mut self, scheme: &CodingScheme) -> Result<()> {
        let block = Arc::clone(self.block.as_ref().expect("chunk not initialized"));
        let consumed = scheme.decode(
            &block[self.data_offset..],
            &mut self.doc_ids,
            self.num_docs,
        )?;
        self.data_offset += consumed;
        self.decoded_doc_ids = true;
        Ok(())
    }

    pub fn decode_frequencies(&mut self, scheme: &CodingScheme) -> Result<()> {
        debug_assert!(self.decoded_doc_ids);
        let block = Arc::clone(self.block.as_ref().expect("chunk not initialized"));
        let consumed = scheme.decode(
            &block[self.data_offset..],
            &mut self.frequencies,
            self.num_docs,
        )?;
        self.data_offset += consumed;
        self.num_positions = self.frequencies[..self.num_docs]
            .iter()
            .map(|&f| num_doc_properties(f))
            .sum();
        self.decoded_properties = true;
        Ok(())
    }

    pub fn decode_positions(&mut self, scheme: &CodingScheme) -> Result<()> {
        debug_assert!(self.decoded_properties);
        let block = Arc::clone(self.block.as_ref().expect("chunk not initialized"));
        let consumed = scheme.decode(
            &block[self.data_offset..],
            &mut self.positions,
            self.num_positions,
        )?;
        self.data_offset += consumed;
        Ok(())
    }

    /// Advances the position-stream cursor to the current document by summing
    /// the frequencies of the documents passed over since the last update.
    /// Amortized O(1) during sequential scoring, O(gap) on jumps.
    pub fn update_properties_offset(&mut self) {
        debug_assert!(self.decoded_properties);
        for i in self.prev_document_offset..self.curr_document_offset {
            self.curr_position_offset += num_doc_properties(self.frequencies[i]);
        }
        self.prev_document_offset = self.curr_document_offset;
    }

    /// The stored docID gap at `idx`.
    #[inline]
    pub fn doc_id(&self, idx: usize) -> u32 {
        debug_assert!(idx < self.num_docs);
        self.doc_ids[idx]
    }

    #[inline]
    pub fn current_frequency(&self) -> u32 {
        debug_assert!(self.curr_document_offset < self.num_docs);
        self.frequencies[self.curr_document_offset]
    }

    pub fn current_positions(&self) -> &[u32] {
        let count = num_doc_properties(self.current_frequency());
        &self.positions[self.curr_position_offset..self.curr_position_offset + count]
    }

    #[inline]
    pub fn num_docs(&self) -> usize {
        self.num_docs
    }

    #[inline]
    pub fn curr_document_offset(&self) -> usize {
        self.curr_document_offset
    }

    pub fn set_curr_document_offset(&mut self, offset: usize) {
        debug_assert!(offset >= self.curr_document_offset && offset < self.num_docs);
        self.curr_document_offset = offset;
    }

    #[inline]
    pub fn prev_decoded_doc_id(&self) -> u32 {
        self.prev_decoded_doc_id
    }

    pub fn set_prev_decoded_doc_id(&mut self, doc_id: u32) {
        self.prev_decoded_doc_id = doc_id;
    }

    #[inline]
    pub fn decoded_doc_ids(&self) -> bool {
        self.decoded_doc_ids
    }

    #[inline]
    pub fn decoded_properties(&self) -> bool {
        self.decoded_properties
    }

    pub fn chunk_max_score(&self) -> f32 {
        self.chunk_max_score
    }

    pub fn set_chunk_max_score(&mut self, score: f32) {
        self.chunk_max_score = score;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codecs() -> CodecSet {
        CodecSet::from_names("vbyte", "s16", "vbyte", "s16").unwrap()
    }

    #[test]
    fn test_chunk_roundtrip() {
        let codecs = codecs();
        let gaps = [5u32, 3, 1, 7, 2];
        let freqs = [1u32, 4, 2, 1, 3];
        let positions: Vec<u32> = vec![10, 1, 2, 3, 4, 8, 9, 20, 5, 6, 7];
        assert_eq!(
            positions.len(),
            freqs.iter().map(|&f| num_doc_properties(f)).sum::<usize>()
        );

        let chunk = encode_chunk(&codecs, &gaps, &freqs, Some(&positions), 18, 1.5).unwrap();
        assert_eq!(chunk.num_docs, 5);
        assert_eq!(chunk.last_doc_id, 18);

        let block = Arc::new(chunk.data.clone());
        let mut decoder = ChunkDecoder::new(&codecs);
        decoder.init_chunk(5, block, 0);
        decoder.decode_doc_ids(&codecs.doc_id).unwrap();
        for (i, &gap) in gaps.iter().enumerate() {
            assert_eq!(decoder.doc_id(i), gap);
        }

        decoder.decode_frequencies(&codecs.frequency).unwrap();
        decoder.decode_positions(&codecs.position).unwrap();

        assert_eq!(decoder.current_frequency(), 1);
        assert_eq!(decoder.current_positions(), &[10]);

        decoder.set_curr_document_offset(1);
        decoder.update_properties_offset();
        assert_eq!(decoder.current_positions(), &[1, 2, 3, 4]);

        decoder.set_curr_document_offset(4);
        decoder.update_properties_offset();
        assert_eq!(decoder.current_positions(), &[5, 6, 7]);
    }

    #[test]
    fn test_lazy_properties() {
        let codecs = codecs();
        let gaps = [1u32; 128];
        let freqs = [2u32; 128];
        let chunk = encode_chunk(&codecs, &gaps, &freqs, None, 128, 0.0).unwrap();

        let mut decoder = ChunkDecoder::new(&codecs);
        decoder.init_chunk(128, Arc::new(chunk.data), 0);
        assert!(!decoder.decoded_doc_ids());
        decoder.decode_doc_ids(&codecs.doc_id).unwrap();
        assert!(decoder.decoded_doc_ids());
        assert!(!decoder.decoded_properties());
        decoder.decode_frequencies(&codecs.frequency).unwrap();
        assert_eq!(decoder.current_frequency(), 2);
    }
}
