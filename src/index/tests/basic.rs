//! Build-then-read scenarios: round trips, `next_geq` behavior, and on-disk
//! invariants.

use crate::cache::BLOCK_SIZE;
use crate::index::{IndexFiles, TERMINATED};
use crate::meta::{keys, MetaInfo};

use super::fixtures::{build_index, collect_postings, open_reader, synthetic_corpus};

const CODECS: [&str; 4] = ["vbyte", "s16", "vbyte", "s16"];

fn three_doc_index() -> super::fixtures::TestIndex {
    build_index(&["a b a", "b c", "a c c"], CODECS, false)
}

#[test]
fn test_three_doc_corpus_postings() {
    let index = three_doc_index();
    let reader = open_reader(&index.files);

    let meta = reader.meta();
    assert_eq!(meta.get_u64(keys::TOTAL_NUM_DOCS).unwrap(), 3);
    assert_eq!(meta.get_u64(keys::NUM_UNIQUE_TERMS).unwrap(), 3);

    assert_eq!(collect_postings(&reader, "a", 0), vec![(0, 2), (2, 1)]);
    assert_eq!(collect_postings(&reader, "b", 0), vec![(0, 1), (1, 1)]);
    assert_eq!(collect_postings(&reader, "c", 0), vec![(1, 1), (2, 2)]);
}

#[test]
fn test_next_geq_target_sequence() {
    let index = three_doc_index();
    let reader = open_reader(&index.files);
    let entry = reader.lexicon().get(b"a").unwrap().clone();
    let mut list = reader.open_list(&entry, 0, true, 0).unwrap();

    assert_eq!(list.next_geq(0).unwrap(), 0);
    assert_eq!(list.next_geq(1).unwrap(), 2);
    assert_eq!(list.next_geq(2).unwrap(), 2);
    assert_eq!(list.next_geq(3).unwrap(), TERMINATED);
    reader.close_list(list);
}

#[test]
fn test_next_geq_monotone() {
    let docs = synthetic_corpus(400);
    let doc_refs: Vec<&str> = docs.iter().map(|d| d.as_str()).collect();
    let index = build_index(&doc_refs, CODECS, false);
    let reader = open_reader(&index.files);

    let reference = collect_postings(&reader, "the", 0);
    assert!(reference.len() > 50, "corpus should make 'the' common");

    let entry = reader.lexicon().get(b"the").unwrap().clone();
    let mut list = reader.open_list(&entry, 0, true, 0).unwrap();
    for step in [0u32, 1, 3, 7, 19, 42] {
        list.reset_list(true).unwrap();
        let mut prev_returned = 0u32;
        let mut target = 0u32;
        loop {
            let doc_id = list.next_geq(target).unwrap();
            if doc_id == TERMINATED {
                break;
            }
            assert!(doc_id >= target);
            assert!(doc_id >= prev_returned);
            // The returned docID is the smallest one >= target.
            assert!(reference.iter().any(|&(d, _)| d == doc_id));
            assert!(!reference
                .iter()
                .any(|&(d, _)| d >= target && d < doc_id));
            prev_returned = doc_id;
            target = doc_id + step + 1;
        }
    }
    reader.close_list(list);
}

#[test]
fn test_multi_block_round_trip() {
    const NUM_DOCS: u32 = 100_000;
    let index = super::fixtures::build_big_index(NUM_DOCS);
    let reader = open_reader(&index.files);

    let entry = reader.lexicon().get(b"huge").unwrap().clone();
    assert!(
        entry.layer(0).num_blocks > 1,
        "the long list must span blocks"
    );

    // Full sequential scan reconstructs the stream across block boundaries.
    let huge = collect_postings(&reader, "huge", 0);
    assert_eq!(huge.len(), NUM_DOCS as usize);
    for (i, &(doc_id, frequency)) in huge.iter().enumerate() {
        assert_eq!(doc_id, i as u32);
        assert_eq!(frequency, 1 + doc_id % 3);
    }

    // Jumping far ahead lands in later blocks directly.
    let mut list = reader.open_list(&entry, 0, false, 0).unwrap();
    assert_eq!(list.next_geq(70_000).unwrap(), 70_000);
    assert_eq!(list.get_freq().unwrap(), 1 + 70_000 % 3);
    assert_eq!(list.next_geq(NUM_DOCS - 1).unwrap(), NUM_DOCS - 1);
    assert_eq!(list.next_geq(NUM_DOCS).unwrap(), TERMINATED);
    reader.close_list(list);

    // The short list interleaved after the long one reads back too.
    let rare = collect_postings(&reader, "rare", 0);
    assert_eq!(rare.len(), NUM_DOCS.div_ceil(997) as usize);
    assert!(rare.iter().all(|&(d, f)| d % 997 == 0 && f == 2));
}

#[test]
fn test_positions_round_trip() {
    let index = build_index(&["x y x y x", "y x"], CODECS, true);
    let files = index.files.clone();

    let cache = std::sync::Arc::new(crate::cache::LruCache::open(files.index_filename(), 16).unwrap());
    let reader =
        crate::index::IndexReader::open(crate::index::Purpose::RandomQuery, cache, &files, true, false)
            .unwrap();

    let entry = reader.lexicon().get(b"x").unwrap().clone();
    let mut list = reader.open_list(&entry, 0, true, 0).unwrap();
    assert_eq!(list.next_geq(0).unwrap(), 0);
    assert_eq!(list.get_freq().unwrap(), 3);
    assert_eq!(list.get_positions().unwrap(), &[0, 2, 4]);
    assert_eq!(list.next_geq(1).unwrap(), 1);
    assert_eq!(list.get_freq().unwrap(), 1);
    assert_eq!(list.get_positions().unwrap(), &[1]);
    reader.close_list(list);
}

#[test]
fn test_block_size_invariant() {
    let docs = synthetic_corpus(1500);
    let doc_refs: Vec<&str> = docs.iter().map(|d| d.as_str()).collect();
    let index = build_index(&doc_refs, CODECS, false);

    let file_len = std::fs::metadata(index.files.index_filename()).unwrap().len();
    assert!(file_len > 0);
    assert_eq!(file_len % BLOCK_SIZE as u64, 0, "every block is exactly {} bytes", BLOCK_SIZE);

    // The file decomposes exactly into headers, streams, and tracked padding.
    let meta = MetaInfo::load(index.files.meta_filename()).unwrap();
    let accounted = meta.get_u64(keys::TOTAL_HEADER_BYTES).unwrap()
        + meta.get_u64(keys::TOTAL_DOC_ID_BYTES).unwrap()
        + meta.get_u64(keys::TOTAL_FREQUENCY_BYTES).unwrap()
        + meta.get_u64(keys::TOTAL_POSITION_BYTES).unwrap()
        + meta.get_u64(keys::TOTAL_WASTED_BYTES).unwrap();
    assert_eq!(accounted, file_len);
}

#[test]
fn test_all_codec_schemes_round_trip_an_index() {
    for codecs in [
        ["vbyte", "vbyte", "vbyte", "vbyte"],
        ["s16", "s16", "s16", "s16"],
        ["pfor", "s16", "vbyte", "s16"],
        ["rice", "rice", "vbyte", "s16"],
    ] {
        let docs = synthetic_corpus(300);
        let doc_refs: Vec<&str> = docs.iter().map(|d| d.as_str()).collect();
        let index = build_index(&doc_refs, codecs, false);
        let reader = open_reader(&index.files);
        let the = collect_postings(&reader, "the", 0);
        assert!(!the.is_empty(), "codecs {:?}", codecs);
        // Same corpus, same postings, regardless of codec.
        let baseline_index = build_index(&doc_refs, CODECS, false);
        let baseline_reader = open_reader(&baseline_index.files);
        assert_eq!(the, collect_postings(&baseline_reader, "the", 0));
    }
}

#[test]
fn test_cache_counters_flow_through_reader() {
    let docs = synthetic_corpus(1000);
    let doc_refs: Vec<&str> = docs.iter().map(|d| d.as_str()).collect();
    let index = build_index(&doc_refs, CODECS, false);
    let reader = open_reader(&index.files);

    collect_postings(&reader, "the", 0);
    assert_eq!(reader.total_num_lists_accessed(), 1);
    assert!(reader.total_cached_bytes_read() + reader.total_disk_bytes_read() > 0);
}

#[test]
fn test_missing_index_files() {
    let dir = tempfile::tempdir().unwrap();
    let files = IndexFiles::new(dir.path().join("nothing"));
    assert!(crate::cache::LruCache::open(files.index_filename(), 4).is_err());
}
