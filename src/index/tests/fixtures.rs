//! Shared helpers: build small on-disk indices from in-memory corpora.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::cache::LruCache;
use crate::docmap::DocumentMap;
use crate::index::builder::{build_meta, CollectionStats, IndexFlags, ScoreContext};
use crate::index::{CodecSet, IndexBuilder, IndexFiles, IndexReader, Purpose, TERMINATED};
use crate::query::bm25::Bm25Scorer;

pub(crate) struct TestIndex {
    // Keeps the temp directory alive for the test's duration.
    pub _dir: tempfile::TempDir,
    pub files: IndexFiles,
}

/// Builds a complete single-layer index (idx/lex/meta/dmap/ext) from the
/// given documents. Doc `i` gets docID `i` and URL `http://docs.example/i`.
pub(crate) fn build_index(
    docs: &[&str],
    codec_names: [&str; 4],
    with_positions: bool,
) -> TestIndex {
    let dir = tempfile::tempdir().unwrap();
    let files = IndexFiles::new(dir.path().join("test"));

    let doc_lens: Vec<u32> = docs
        .iter()
        .map(|d| d.split_whitespace().count() as u32)
        .collect();
    let urls: Vec<String> = (0..docs.len())
        .map(|i| format!("http://docs.example/{}", i))
        .collect();
    DocumentMap::write(files.document_map_filename(), &doc_lens, &urls).unwrap();
    let doc_map = Arc::new(DocumentMap::load(files.document_map_filename(), None).unwrap());

    // term -> docID -> (frequency, positions)
    let mut postings: BTreeMap<String, BTreeMap<u32, (u32, Vec<u32>)>> = BTreeMap::new();
    let mut token_count = 0u64;
    for (doc_id, doc) in docs.iter().enumerate() {
        for (pos, token) in doc.split_whitespace().enumerate() {
            let entry = postings
                .entry(token.to_string())
                .or_default()
                .entry(doc_id as u32)
                .or_insert((0, Vec::new()));
            entry.0 += 1;
            entry.1.push(pos as u32);
            token_count += 1;
        }
    }

    let total_docs = docs.len() as u32;
    let scorer = Bm25Scorer::new(total_docs, doc_map.avg_doc_len());
    let codecs = Arc::new(
        CodecSet::from_names(codec_names[0], codec_names[1], codec_names[2], codec_names[3])
            .unwrap(),
    );
    let mut builder = IndexBuilder::create(
        &files,
        codecs,
        with_positions,
        Some(ScoreContext {
            scorer,
            doc_map: Arc::clone(&doc_map),
        }),
    )
    .unwrap();

    for (term, term_postings) in &postings {
        builder
            .start_term(term.as_bytes(), term_postings.len() as u32)
            .unwrap();
        for (&doc_id, (frequency, positions)) in term_postings {
            builder.add_posting(doc_id, *frequency, positions).unwrap();
        }
        builder.finalize_term().unwrap();
    }
    let counters = builder.finalize().unwrap();

    let flags = IndexFlags {
        layered: false,
        overlapping_layers: false,
        num_layers: 1,
        includes_positions: with_positions,
        includes_contexts: false,
        remapped: false,
    };
    let collection = CollectionStats {
        total_num_docs: total_docs as u64,
        total_unique_num_docs: docs.iter().filter(|d| !d.trim().is_empty()).count() as u64,
        total_document_lengths: doc_lens.iter().map(|&l| l as u64).sum(),
        document_posting_count: token_count,
    };
    build_meta(&counters, &flags, codec_names, &collection)
        .write(files.meta_filename())
        .unwrap();

    TestIndex { _dir: dir, files }
}

pub(crate) fn open_reader(files: &IndexFiles) -> IndexReader {
    let cache = Arc::new(LruCache::open(files.index_filename(), 128).unwrap());
    IndexReader::open(Purpose::RandomQuery, cache, files, false, false).unwrap()
}

/// Reads a whole (term, layer) list back as (docID, frequency) pairs.
pub(crate) fn collect_postings(
    reader: &IndexReader,
    term: &str,
    layer_num: usize,
) -> Vec<(u32, u32)> {
    let entry = reader
        .lexicon()
        .get(term.as_bytes())
        .unwrap_or_else(|| panic!("term '{}' not in lexicon", term))
        .clone();
    let mut list = reader.open_list(&entry, layer_num, true, 0).unwrap();
    let mut postings = Vec::new();
    let mut target = 0u32;
    loop {
        let doc_id = list.next_geq(target).unwrap();
        if doc_id == TERMINATED {
            break;
        }
        postings.push((doc_id, list.get_freq().unwrap()));
        target = doc_id + 1;
    }
    reader.close_list(list);
    postings
}

/// Builds an index whose longest list spans several blocks, directly through
/// the builder: "huge" in every doc, "mid" in every 7th, "rare" in every
/// 997th.
pub(crate) fn build_big_index(num_docs: u32) -> TestIndex {
    let dir = tempfile::tempdir().unwrap();
    let files = IndexFiles::new(dir.path().join("big"));

    let doc_lens: Vec<u32> = (0..num_docs).map(|i| 10 + i % 30).collect();
    let urls: Vec<String> = (0..num_docs).map(|i| format!("http://big.example/{}", i)).collect();
    DocumentMap::write(files.document_map_filename(), &doc_lens, &urls).unwrap();
    let doc_map = Arc::new(DocumentMap::load(files.document_map_filename(), None).unwrap());

    let scorer = Bm25Scorer::new(num_docs, doc_map.avg_doc_len());
    let codecs = Arc::new(CodecSet::from_names("vbyte", "s16", "vbyte", "s16").unwrap());
    let mut builder = IndexBuilder::create(
        &files,
        codecs,
        false,
        Some(ScoreContext {
            scorer,
            doc_map: Arc::clone(&doc_map),
        }),
    )
    .unwrap();

    let terms: [(&str, u32, fn(u32) -> u32); 4] = [
        ("huge", 1, |i| 1 + i % 3),
        ("mid", 7, |i| 1 + i % 2),
        ("rare", 997, |_| 2),
        // Postings further apart than a whole block of the dense list.
        ("sparse", 95_000, |_| 1),
    ];
    let mut token_count = 0u64;
    for (term, stride, freq) in terms {
        let doc_frequency = num_docs.div_ceil(stride);
        builder.start_term(term.as_bytes(), doc_frequency).unwrap();
        for doc_id in (0..num_docs).step_by(stride as usize) {
            builder.add_posting(doc_id, freq(doc_id), &[]).unwrap();
            token_count += freq(doc_id) as u64;
        }
        builder.finalize_term().unwrap();
    }
    let counters = builder.finalize().unwrap();
    assert!(
        counters.total_num_blocks > 1,
        "fixture must span multiple blocks"
    );

    let flags = IndexFlags::default();
    let collection = CollectionStats {
        total_num_docs: num_docs as u64,
        total_unique_num_docs: num_docs as u64,
        total_document_lengths: doc_lens.iter().map(|&l| l as u64).sum(),
        document_posting_count: token_count,
    };
    build_meta(
        &counters,
        &flags,
        ["vbyte", "s16", "vbyte", "s16"],
        &collection,
    )
    .write(files.meta_filename())
    .unwrap();

    TestIndex { _dir: dir, files }
}

/// Deterministic synthetic corpus with a skewed vocabulary: low-index words
/// are much more common, like real text.
pub(crate) fn synthetic_corpus(num_docs: usize) -> Vec<String> {
    const VOCAB: [&str; 15] = [
        "the", "of", "search", "index", "engine", "query", "block", "chunk", "score", "rank",
        "term", "list", "cache", "disk", "layer",
    ];
    let mut state = 42u64;
    let mut next = || {
        state = state
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (state >> 33) as usize
    };
    let mut docs = Vec::with_capacity(num_docs);
    for i in 0..num_docs {
        let len = 5 + (i % 23);
        let mut words = Vec::with_capacity(len);
        for _ in 0..len {
            let r = next() % 10_000;
            let idx = r * r / 10_000 * VOCAB.len() / 10_000;
            words.push(VOCAB[idx.min(VOCAB.len() - 1)]);
        }
        docs.push(words.join(" "));
    }
    docs
}
