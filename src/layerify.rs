//! Layered-index generation.
//!
//! Splits each inverted list of a finalized index into score-ordered layers:
//! postings are sorted by partial BM25 score descending, contiguous prefixes
//! become the upper layers, and each layer is re-sorted by docID and written
//! out through the index builder with its score threshold. Layers are either
//! disjoint or overlapping (each layer re-including all previous ones).
//!
//! Any single list is assumed to fit in memory; splitting and externally
//! merging oversized lists is not supported.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::cache::MergingCache;
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::builder::{build_meta, CollectionStats, IndexFlags, ScoreContext};
use crate::index::{
    CodecSet, IndexBuilder, IndexFiles, IndexReader, Purpose, CHUNK_SIZE, MAX_LIST_LAYERS,
    TERMINATED,
};
use crate::meta::keys;
use crate::query::bm25::Bm25Scorer;

/// How postings are apportioned among layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerSplitMode {
    /// Fixed percentage of the list per layer.
    Percentage,
    /// Percentages capped by a per-layer maximum size.
    PercentageFixedBounded,
    /// Exponentially increasing sizes, base = n^(1/num_layers).
    ExponentiallyIncreasing,
}

const LAYER_PERCENTAGES: [usize; MAX_LIST_LAYERS] = [5, 5, 10, 15, 25, 40, 0, 0];
/// 0 means unbounded.
const LAYER_MAX_SIZES: [usize; MAX_LIST_LAYERS] = [1024, 8192, 0, 0, 0, 0, 0, 0];
const LAYER_MIN_SIZES: [usize; MAX_LIST_LAYERS] = [
    1024, 2048, 4096, 8192, 16384, 32768, 65536, 131072,
];

pub struct LayeredIndexGenerator {
    reader: IndexReader,
    builder: IndexBuilder,
    output_files: IndexFiles,
    scorer: Bm25Scorer,
    num_layers: usize,
    overlapping_layers: bool,
    split_mode: LayerSplitMode,
    codec_names: [String; 4],
    input_posting_count: u64,
    input_remapped: bool,
    input_doc_map_path: std::path::PathBuf,
}

impl LayeredIndexGenerator {
    pub fn new(
        input_files: &IndexFiles,
        output_prefix: &str,
        config: &Config,
        split_mode: LayerSplitMode,
    ) -> Result<Self> {
        let cache = Arc::new(MergingCache::open(input_files.index_filename())?);
        let reader = IndexReader::open(Purpose::Merge, cache, input_files, false, false)?;
        if reader.includes_positions() {
            return Err(Error::Layering(
                "layered indices with positions are not supported".to_string(),
            ));
        }
        if reader.layered() {
            return Err(Error::Layering(
                "input index is already layered".to_string(),
            ));
        }
        let num_layers = config.num_layers;

        let meta = reader.meta();
        let codec_names = [
            meta.get_str(keys::INDEX_DOC_ID_CODING)?.to_string(),
            meta.get_str(keys::INDEX_FREQUENCY_CODING)?.to_string(),
            meta.get_str(keys::INDEX_POSITION_CODING)?.to_string(),
            meta.get_str(keys::INDEX_BLOCK_HEADER_CODING)?.to_string(),
        ];
        let input_posting_count = meta.get_u64(keys::INDEX_POSTING_COUNT)?;
        let input_remapped = meta.get_bool(keys::REMAPPED_INDEX);

        let scorer = Bm25Scorer::new(reader.total_num_docs()?, reader.average_doc_len()?);
        let output_files = IndexFiles::new(output_prefix);
        let builder = IndexBuilder::create(
            &output_files,
            Arc::new(CodecSet::from_names(
                &codec_names[0],
                &codec_names[1],
                &codec_names[2],
                &codec_names[3],
            )?),
            false,
            Some(ScoreContext {
                scorer,
                doc_map: Arc::clone(reader.document_map()),
            }),
        )?;

        Ok(Self {
            reader,
            builder,
            output_files,
            scorer,
            num_layers,
            overlapping_layers: config.overlapping_layers,
            split_mode,
            codec_names,
            input_posting_count,
            input_remapped,
            input_doc_map_path: input_files.document_map_filename(),
        })
    }

    pub fn create_layered_index(mut self) -> Result<()> {
        log::info!(
            "creating {} layered index with {} layers",
            if self.overlapping_layers {
                "overlapping"
            } else {
                "disjoint"
            },
            self.num_layers
        );

        while let Some(entry) = self.reader.next_term()? {
            self.layer_list(&entry)?;
        }

        let counters = self.builder.finalize()?;

        // These must match the input, except that overlapping layers store
        // postings more than once.
        if (!self.overlapping_layers && self.input_posting_count != counters.posting_count)
            || (self.overlapping_layers && self.input_posting_count > counters.posting_count)
        {
            log::error!(
                "posting count mismatch: input index reports {}, builder wrote {}",
                self.input_posting_count,
                counters.posting_count
            );
        }

        let input_meta = self.reader.meta();
        let collection = CollectionStats {
            total_num_docs: input_meta.get_u64(keys::TOTAL_NUM_DOCS)?,
            total_unique_num_docs: input_meta.get_u64(keys::TOTAL_UNIQUE_NUM_DOCS)?,
            total_document_lengths: input_meta.get_u64(keys::TOTAL_DOCUMENT_LENGTHS)?,
            document_posting_count: input_meta.get_u64(keys::DOCUMENT_POSTING_COUNT)?,
        };
        let flags = IndexFlags {
            layered: true,
            overlapping_layers: self.overlapping_layers,
            num_layers: self.num_layers,
            includes_positions: false,
            includes_contexts: self.reader.includes_contexts(),
            remapped: self.input_remapped,
        };
        let meta = build_meta(
            &counters,
            &flags,
            [
                &self.codec_names[0],
                &self.codec_names[1],
                &self.codec_names[2],
                &self.codec_names[3],
            ],
            &collection,
        );
        meta.write(self.output_files.meta_filename())?;

        // The layered index shares the input's document map.
        let doc_map_out = self.output_files.document_map_filename();
        if self.input_doc_map_path != doc_map_out {
            std::fs::copy(&self.input_doc_map_path, &doc_map_out)?;
        }
        log::info!("finished creating layered index");
        Ok(())
    }

    fn layer_list(&mut self, entry: &crate::index::LexiconEntry) -> Result<()> {
        // Pull the whole list into memory.
        let mut list = self.reader.open_list(entry, 0, true, 0)?;
        let mut postings: Vec<(u32, u32)> = Vec::with_capacity(list.num_docs() as usize);
        let mut target = 0u32;
        loop {
            let doc_id = list.next_geq(target)?;
            if doc_id == TERMINATED {
                break;
            }
            postings.push((doc_id, list.get_freq()?));
            target = doc_id + 1;
        }
        self.reader.close_list(list);

        let total = postings.len();
        let idf = self.scorer.idf(entry.num_docs_complete_list);
        let doc_map = Arc::clone(self.reader.document_map());
        let scores: Vec<f32> = postings
            .iter()
            .map(|&(doc_id, frequency)| {
                self.scorer.partial(idf, frequency, doc_map.doc_len(doc_id))
            })
            .collect();

        // Score-descending order, docID as a deterministic tiebreak.
        let mut order: Vec<usize> = (0..total).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(Ordering::Equal)
                .then_with(|| postings[a].0.cmp(&postings[b].0))
        });

        let base = (total as f64).powf(1.0 / self.num_layers as f64);

        self.builder
            .start_term(&entry.term, entry.num_docs_complete_list)?;
        let mut num_left = total;
        for layer_num in 0..self.num_layers {
            if num_left == 0 {
                break;
            }
            let mut layer_size = match self.split_mode {
                LayerSplitMode::Percentage => LAYER_PERCENTAGES[layer_num] * total / 100,
                LayerSplitMode::PercentageFixedBounded => {
                    let size = LAYER_PERCENTAGES[layer_num] * total / 100;
                    if LAYER_MAX_SIZES[layer_num] != 0 {
                        size.min(LAYER_MAX_SIZES[layer_num])
                    } else {
                        size
                    }
                }
                LayerSplitMode::ExponentiallyIncreasing => {
                    let size = ((base - 1.0) * base.powi(layer_num as i32)) as usize;
                    if LAYER_MIN_SIZES[layer_num] != 0 {
                        size.max(LAYER_MIN_SIZES[layer_num])
                    } else {
                        size
                    }
                }
            };
            layer_size = layer_size.min(num_left);
            // Every layer gets at least a chunk's worth while postings last.
            if layer_size < CHUNK_SIZE && num_left >= CHUNK_SIZE {
                layer_size = CHUNK_SIZE;
            }
            layer_size = layer_size.max(1);
            num_left -= layer_size;
            if layer_num == self.num_layers - 1 && num_left > 0 {
                layer_size += num_left;
                num_left = 0;
            }

            // Score ties across a layer boundary break early-termination
            // rank safety: the boundary postings move up until the next
            // layer's threshold is strictly lower.
            while layer_num < self.num_layers - 1 && num_left > 0 {
                let curr_threshold = scores[order[total - num_left - layer_size]];
                let next_threshold = scores[order[total - num_left]];
                if curr_threshold <= next_threshold {
                    layer_size += 1;
                    num_left -= 1;
                } else {
                    break;
                }
            }

            let layer_start = total - num_left - layer_size;
            let emit_start = if self.overlapping_layers { 0 } else { layer_start };
            let threshold = scores[order[layer_start]];

            let mut emit: Vec<usize> = order[emit_start..layer_start + layer_size].to_vec();
            emit.sort_by_key(|&idx| postings[idx].0);
            for idx in emit {
                let (doc_id, frequency) = postings[idx];
                self.builder.add_posting(doc_id, frequency, &[])?;
            }
            self.builder.finalize_layer(threshold)?;
        }
        self.builder.finalize_term()
    }
}
