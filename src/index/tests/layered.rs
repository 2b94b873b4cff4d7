//! Layer generation invariants and layered query algorithms against flat
//! baselines.

use std::collections::BTreeSet;

use crate::config::Config;
use crate::index::IndexFiles;
use crate::layerify::{LayerSplitMode, LayeredIndexGenerator};
use crate::query::{Bm25Scorer, QueryAlgorithm, QueryProcessor};

use super::algorithms::assert_topk_agrees;
use super::fixtures::{build_index, collect_postings, open_reader, synthetic_corpus, TestIndex};

const CODECS: [&str; 4] = ["vbyte", "s16", "vbyte", "s16"];

fn layer_index(
    flat: &TestIndex,
    num_layers: usize,
    overlapping: bool,
    mode: LayerSplitMode,
) -> IndexFiles {
    let output_prefix = flat
        .files
        .index_filename()
        .parent()
        .unwrap()
        .join(format!("layered{}{}", num_layers, overlapping as u8));
    let mut config = Config::default();
    config.num_layers = num_layers;
    config.overlapping_layers = overlapping;
    let generator = LayeredIndexGenerator::new(
        &flat.files,
        output_prefix.to_str().unwrap(),
        &config,
        mode,
    )
    .unwrap();
    generator.create_layered_index().unwrap();
    IndexFiles::new(output_prefix)
}

fn corpus_index(num_docs: usize) -> TestIndex {
    let docs = synthetic_corpus(num_docs);
    let doc_refs: Vec<&str> = docs.iter().map(|d| d.as_str()).collect();
    build_index(&doc_refs, CODECS, false)
}

fn processor(files: &IndexFiles, algorithm: QueryAlgorithm, k: usize) -> QueryProcessor {
    let mut config = Config::default();
    config.max_number_results = k;
    QueryProcessor::new(files, &config, algorithm).unwrap()
}

fn doc_ids(processor: &mut QueryProcessor, query: &str) -> BTreeSet<u32> {
    processor
        .execute_query(query)
        .unwrap()
        .results
        .iter()
        .map(|r| r.doc_id)
        .collect()
}

#[test]
fn test_disjoint_layer_invariants() {
    let flat = corpus_index(700);
    let layered_files = layer_index(&flat, 3, false, LayerSplitMode::PercentageFixedBounded);

    let flat_reader = open_reader(&flat.files);
    let reader = open_reader(&layered_files);
    assert!(reader.layered());
    assert!(!reader.overlapping_layers());

    let scorer = Bm25Scorer::new(
        reader.total_num_docs().unwrap(),
        reader.average_doc_len().unwrap(),
    );
    let doc_map = std::sync::Arc::clone(reader.document_map());

    let mut saw_multi_layer = false;
    for entry in reader.lexicon().iter() {
        // Thresholds strictly decrease from layer to layer.
        for pair in entry.layers.windows(2) {
            assert!(
                pair[0].score_threshold > pair[1].score_threshold,
                "term '{}'",
                String::from_utf8_lossy(&entry.term)
            );
        }
        if entry.num_layers() > 1 {
            saw_multi_layer = true;
        }

        // Each posting's score is bounded by its layer's threshold, and the
        // union of the layers is exactly the flat list.
        let term = String::from_utf8_lossy(&entry.term).to_string();
        let idf = scorer.idf(entry.num_docs_complete_list);
        let mut union = Vec::new();
        for layer_num in 0..entry.num_layers() {
            let threshold = entry.layer(layer_num).score_threshold;
            for &(doc_id, frequency) in &collect_postings(&reader, &term, layer_num) {
                let score = scorer.partial(idf, frequency, doc_map.doc_len(doc_id));
                assert!(
                    score <= threshold + 1e-5,
                    "term '{}' layer {} doc {}",
                    term,
                    layer_num,
                    doc_id
                );
                union.push((doc_id, frequency));
            }
        }
        union.sort_unstable();
        assert_eq!(union, collect_postings(&flat_reader, &term, 0), "term '{}'", term);
    }
    assert!(saw_multi_layer, "corpus should produce layered lists");
}

#[test]
fn test_overlapping_layers_replicate_prior_layers() {
    let flat = corpus_index(700);
    let layered_files = layer_index(&flat, 2, true, LayerSplitMode::PercentageFixedBounded);
    let flat_reader = open_reader(&flat.files);
    let reader = open_reader(&layered_files);
    assert!(reader.overlapping_layers());

    for entry in reader.lexicon().iter() {
        let term = String::from_utf8_lossy(&entry.term).to_string();
        let flat_postings = collect_postings(&flat_reader, &term, 0);
        let last = collect_postings(&reader, &term, entry.num_layers() - 1);
        // The overlapping last layer is the complete list.
        assert_eq!(last, flat_postings, "term '{}'", term);
        if entry.num_layers() == 2 {
            let first = collect_postings(&reader, &term, 0);
            // Every top-docs posting re-appears in the last layer.
            for posting in &first {
                assert!(flat_postings.contains(posting), "term '{}'", term);
            }
            assert!(first.len() < last.len(), "term '{}'", term);
        }
    }
}

#[test]
fn test_two_tiered_wand_and_maxscore_agree_with_flat_daat_or() {
    let flat = corpus_index(800);
    let layered_files = layer_index(&flat, 2, true, LayerSplitMode::PercentageFixedBounded);

    let queries = [
        "search engine",
        "index block chunk",
        "the of query",
        "cache disk",
    ];
    let k = 10;
    let mut full = processor(&flat.files, QueryAlgorithm::DaatOr, 3000);
    let mut baseline = processor(&flat.files, QueryAlgorithm::DaatOr, k);
    let mut wand = processor(&layered_files, QueryAlgorithm::DualLayeredWand, k);
    let mut max_score = processor(&layered_files, QueryAlgorithm::DualLayeredMaxScore, k);

    for query in queries {
        let full_ranking = full.execute_query(query).unwrap().results;
        let expected = doc_ids(&mut baseline, query);
        let wand_docs = doc_ids(&mut wand, query);
        assert_topk_agrees(&full_ranking, &expected, &wand_docs, &format!("wand '{}'", query));
        let max_score_docs = doc_ids(&mut max_score, query);
        assert_topk_agrees(
            &full_ranking,
            &expected,
            &max_score_docs,
            &format!("maxscore '{}'", query),
        );
    }
}

#[test]
fn test_dual_layered_daat_agrees_with_flat_intersection() {
    let flat = corpus_index(800);
    let layered_files = layer_index(&flat, 2, true, LayerSplitMode::PercentageFixedBounded);

    let queries = [
        "search engine",
        "the of",
        "index chunk score",
        "the of search index", // four terms exercises the merge variant
    ];
    let k = 10;
    let mut full = processor(&flat.files, QueryAlgorithm::DaatAnd, 3000);
    let mut baseline = processor(&flat.files, QueryAlgorithm::DaatAnd, k);
    let mut layered = processor(&layered_files, QueryAlgorithm::DualLayeredOverlappingDaat, k);
    let mut merge_layered = processor(
        &layered_files,
        QueryAlgorithm::DualLayeredOverlappingMergeDaat,
        k,
    );

    for query in queries {
        let full_ranking = full.execute_query(query).unwrap().results;
        let expected = doc_ids(&mut baseline, query);
        let layered_docs = doc_ids(&mut layered, query);
        assert_topk_agrees(
            &full_ranking,
            &expected,
            &layered_docs,
            &format!("dual-layered '{}'", query),
        );
        let merge_docs = doc_ids(&mut merge_layered, query);
        assert_topk_agrees(
            &full_ranking,
            &expected,
            &merge_docs,
            &format!("merge dual-layered '{}'", query),
        );
    }
}

#[test]
fn test_pruned_taat_agrees_with_flat_daat_or() {
    let flat = corpus_index(800);
    let layered_files = layer_index(&flat, 4, false, LayerSplitMode::PercentageFixedBounded);

    let queries = [
        "search engine",
        "the of",
        "index block chunk",
        "score rank list cache",
        "the engine",
    ];
    let k = 10;
    let mut full = processor(&flat.files, QueryAlgorithm::DaatOr, 3000);
    let mut baseline = processor(&flat.files, QueryAlgorithm::DaatOr, k);
    let mut taat = processor(
        &layered_files,
        QueryAlgorithm::LayeredTaatOrEarlyTerminated,
        k,
    );

    for query in queries {
        let full_ranking = full.execute_query(query).unwrap().results;
        let expected = doc_ids(&mut baseline, query);
        let taat_docs = doc_ids(&mut taat, query);
        assert_topk_agrees(&full_ranking, &expected, &taat_docs, &format!("taat '{}'", query));
    }
}

#[test]
fn test_pruned_taat_early_terminates_single_term() {
    let flat = corpus_index(800);
    let layered_files = layer_index(&flat, 4, false, LayerSplitMode::PercentageFixedBounded);

    let mut taat = processor(
        &layered_files,
        QueryAlgorithm::LayeredTaatOrEarlyTerminated,
        3,
    );
    // "the" has several disjoint layers; the top-docs layer alone resolves a
    // k=3 query, every later layer having a strictly lower upperbound.
    let output = taat.execute_query("the").unwrap();
    assert_eq!(output.results.len(), 3);
    assert!(taat.stats().num_early_terminated_queries > 0);

    // Early termination must not change the result: compare against the
    // flat exhaustive ranking.
    let mut baseline = processor(&flat.files, QueryAlgorithm::DaatOr, 3);
    let expected = doc_ids(&mut baseline, "the");
    let actual: BTreeSet<u32> = output.results.iter().map(|r| r.doc_id).collect();
    let mut full = processor(&flat.files, QueryAlgorithm::DaatOr, 3000);
    let full_ranking = full.execute_query("the").unwrap().results;
    assert_topk_agrees(&full_ranking, &expected, &actual, "taat single term");
}
