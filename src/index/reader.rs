//! Index reader: composes the cache manager, codecs, lexicon, document map,
//! and meta info, and hands out `ListData` instances for traversal.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;

use crate::cache::BlockCache;
use crate::docmap::DocumentMap;
use crate::error::{Error, Result};
use crate::meta::{keys, MetaInfo};

use super::external::ExternalIndexReader;
use super::lexicon::{Lexicon, LexiconEntry, LexiconStream};
use super::list::ListData;
use super::{CodecSet, IndexFiles};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Purpose {
    /// Random term lookups: the whole lexicon is loaded into memory.
    RandomQuery,
    /// Sequential single-pass walks for merging/layering tools.
    Merge,
}

pub struct IndexReader {
    purpose: Purpose,
    cache: Arc<dyn BlockCache>,
    codecs: Arc<CodecSet>,
    meta: MetaInfo,
    doc_map: Arc<DocumentMap>,
    lexicon: Option<Lexicon>,
    lexicon_stream: Option<LexiconStream>,
    external: Option<Arc<ExternalIndexReader>>,

    layered: bool,
    overlapping_layers: bool,
    num_layers: usize,
    includes_positions: bool,
    includes_contexts: bool,
    use_positions: bool,
    block_skipping_enabled: bool,

    total_cached_bytes_read: AtomicU64,
    total_disk_bytes_read: AtomicU64,
    total_num_lists_accessed: AtomicU64,
    total_num_blocks_skipped: AtomicU32,
}

impl IndexReader {
    /// Opens an index. `load_external` pulls the external index into memory
    /// for block/chunk score skipping; only some algorithms want it.
    pub fn open(
        purpose: Purpose,
        cache: Arc<dyn BlockCache>,
        files: &IndexFiles,
        use_positions: bool,
        load_external: bool,
    ) -> Result<Self> {
        let meta = MetaInfo::load(files.meta_filename())?;
        let codecs = Arc::new(CodecSet::from_meta(&meta)?);

        let layered = meta.get_bool(keys::LAYERED_INDEX);
        let overlapping_layers = meta.get_bool(keys::OVERLAPPING_LAYERS);
        let num_layers = if layered {
            meta.get_u64(keys::NUM_LAYERS)? as usize
        } else {
            1
        };
        let includes_positions = meta.get_bool(keys::INCLUDES_POSITIONS);
        let includes_contexts = meta.get_bool(keys::INCLUDES_CONTEXTS);
        if use_positions && !includes_positions {
            return Err(Error::Config(
                "positions requested but the index was built without them".to_string(),
            ));
        }

        let remapping_path = files.remapping_filename();
        let doc_map = Arc::new(DocumentMap::load(
            files.document_map_filename(),
            meta.get_bool(keys::REMAPPED_INDEX)
                .then_some(remapping_path.as_path()),
        )?);

        let (lexicon, lexicon_stream) = match purpose {
            Purpose::RandomQuery => (
                Some(Lexicon::load(files.lexicon_filename(), overlapping_layers)?),
                None,
            ),
            Purpose::Merge => (
                None,
                Some(LexiconStream::open(
                    files.lexicon_filename(),
                    overlapping_layers,
                )?),
            ),
        };

        let external = if load_external {
            Some(Arc::new(ExternalIndexReader::load(
                files.external_index_filename(),
            )?))
        } else {
            None
        };

        log::info!(
            "opened index '{}': {} docs, layered={}, positions={}",
            files.index_filename().display(),
            meta.get_u64(keys::TOTAL_NUM_DOCS)?,
            layered,
            includes_positions,
        );

        Ok(Self {
            purpose,
            cache,
            codecs,
            meta,
            doc_map,
            lexicon,
            lexicon_stream,
            external,
            layered,
            overlapping_layers,
            num_layers,
            includes_positions,
            includes_contexts,
            use_positions,
            block_skipping_enabled: false,
            total_cached_bytes_read: AtomicU64::new(0),
            total_disk_bytes_read: AtomicU64::new(0),
            total_num_lists_accessed: AtomicU64::new(0),
            total_num_blocks_skipped: AtomicU32::new(0),
        })
    }

    pub fn open_list(
        &self,
        entry: &LexiconEntry,
        layer_num: usize,
        single_term: bool,
        term_num: usize,
    ) -> Result<ListData> {
        let layer = entry.layers.get(layer_num).ok_or_else(|| {
            Error::Query(format!(
                "layer {} requested from a {}-layer list",
                layer_num,
                entry.num_layers()
            ))
        })?;
        let external = self
            .external
            .as_ref()
            .map(|ext| (Arc::clone(ext), layer.external_index_offset));
        ListData::open(
            layer,
            layer_num,
            entry.num_docs_complete_list,
            Arc::clone(&self.codecs),
            Arc::clone(&self.cache),
            external,
            self.use_positions && self.includes_positions,
            single_term,
            self.block_skipping_enabled && layer.last_doc_ids.is_some(),
            term_num,
        )
    }

    /// Folds the list's I/O counters into reader totals.
    pub fn close_list(&self, list: ListData) {
        self.total_cached_bytes_read
            .fetch_add(list.cached_bytes_read(), Ordering::Relaxed);
        self.total_disk_bytes_read
            .fetch_add(list.disk_bytes_read(), Ordering::Relaxed);
        self.total_num_blocks_skipped
            .fetch_add(list.num_blocks_skipped(), Ordering::Relaxed);
        self.total_num_lists_accessed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn lexicon(&self) -> &Lexicon {
        self.lexicon
            .as_ref()
            .expect("lexicon is loaded only for random-query readers")
    }

    pub fn lexicon_mut(&mut self) -> &mut Lexicon {
        self.lexicon
            .as_mut()
            .expect("lexicon is loaded only for random-query readers")
    }

    /// Streams the next lexicon entry; merge-purpose readers only.
    pub fn next_term(&mut self) -> Result<Option<LexiconEntry>> {
        match &mut self.lexicon_stream {
            Some(stream) => stream.next_entry(),
            None => Err(Error::Query(
                "streaming lexicon access requires a merge-purpose reader".to_string(),
            )),
        }
    }

    pub fn purpose(&self) -> Purpose {
        self.purpose
    }

    pub fn meta(&self) -> &MetaInfo {
        &self.meta
    }

    pub fn document_map(&self) -> &Arc<DocumentMap> {
        &self.doc_map
    }

    pub fn cache(&self) -> &Arc<dyn BlockCache> {
        &self.cache
    }

    pub fn codecs(&self) -> &Arc<CodecSet> {
        &self.codecs
    }

    pub fn external_index(&self) -> Option<&Arc<ExternalIndexReader>> {
        self.external.as_ref()
    }

    pub fn layered(&self) -> bool {
        self.layered
    }

    pub fn overlapping_layers(&self) -> bool {
        self.overlapping_layers
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    pub fn includes_positions(&self) -> bool {
        self.includes_positions
    }

    pub fn includes_contexts(&self) -> bool {
        self.includes_contexts
    }

    pub fn block_skipping_enabled(&self) -> bool {
        self.block_skipping_enabled
    }

    pub fn set_block_skipping_enabled(&mut self, enabled: bool) {
        self.block_skipping_enabled = enabled;
    }

    pub fn total_num_docs(&self) -> Result<u32> {
        Ok(self.meta.get_u64(keys::TOTAL_NUM_DOCS)? as u32)
    }

    pub fn average_doc_len(&self) -> Result<f32> {
        let total_lengths = self.meta.get_u64(keys::TOTAL_DOCUMENT_LENGTHS)?;
        let total_docs = self.meta.get_u64(keys::TOTAL_NUM_DOCS)?.max(1);
        Ok(total_lengths as f32 / total_docs as f32)
    }

    pub fn reset_stats(&self) {
        self.total_cached_bytes_read.store(0, Ordering::Relaxed);
        self.total_disk_bytes_read.store(0, Ordering::Relaxed);
        self.total_num_lists_accessed.store(0, Ordering::Relaxed);
        self.total_num_blocks_skipped.store(0, Ordering::Relaxed);
    }

    pub fn total_cached_bytes_read(&self) -> u64 {
        self.total_cached_bytes_read.load(Ordering::Relaxed)
    }

    pub fn total_disk_bytes_read(&self) -> u64 {
        self.total_disk_bytes_read.load(Ordering::Relaxed)
    }

    pub fn total_num_lists_accessed(&self) -> u64 {
        self.total_num_lists_accessed.load(Ordering::Relaxed)
    }

    pub fn total_num_blocks_skipped(&self) -> u32 {
        self.total_num_blocks_skipped.load(Ordering::Relaxed)
    }
}
