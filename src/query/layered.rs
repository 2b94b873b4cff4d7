//! Helpers for the dual-layered overlapping DAAT algorithms.

use rustc_hash::FxHashSet;

use super::topk::{sort_results, SearchResult};

/// Merges per-intersection result lists (each sorted by score descending)
/// into a single docID-deduplicated ranking. Scores for the same docID can
/// differ across intersections by float rounding, so duplicates are dropped
/// by docID, keeping the first (highest-ranked) occurrence.
pub(crate) fn merge_intersection_results(
    mut per_intersection: Vec<Vec<SearchResult>>,
    k: usize,
) -> Vec<SearchResult> {
    let mut merged: Vec<SearchResult> = Vec::new();
    for results in per_intersection.drain(..) {
        merged.extend(results);
    }
    sort_results(&mut merged);

    let mut seen = FxHashSet::default();
    let mut deduped = Vec::with_capacity(k);
    for result in merged {
        if seen.insert(result.doc_id) {
            deduped.push(result);
            if deduped.len() == k {
                break;
            }
        }
    }
    deduped
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dedupe_keeps_best_ranked() {
        let a = vec![
            SearchResult {
                doc_id: 1,
                score: 3.0,
            },
            SearchResult {
                doc_id: 2,
                score: 1.0,
            },
        ];
        let b = vec![
            SearchResult {
                doc_id: 1,
                score: 2.9999998, // same doc, different addition order
            },
            SearchResult {
                doc_id: 3,
                score: 2.0,
            },
        ];
        let merged = merge_intersection_results(vec![a, b], 10);
        let docs: Vec<u32> = merged.iter().map(|r| r.doc_id).collect();
        assert_eq!(docs, vec![1, 3, 2]);
    }

    #[test]
    fn test_truncates_to_k() {
        let a = (0..20)
            .map(|i| SearchResult {
                doc_id: i,
                score: 20.0 - i as f32,
            })
            .collect();
        let merged = merge_intersection_results(vec![a], 5);
        assert_eq!(merged.len(), 5);
        assert_eq!(merged[0].doc_id, 0);
    }
}
