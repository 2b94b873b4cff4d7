//! Document-at-a-time processing: conjunctive intersection and disjunctive
//! merge.

use crate::error::Result;
use crate::index::{ListData, TERMINATED};

use super::topk::{SearchResult, TopK};
use super::{ScoreContext, TraversalCounters};

/// DAAT AND over `lists`, which the caller sorts shortest first. The
/// optional `merge_lists` drive candidate docIDs: the union of their
/// postings is intersected against every list in `lists` (used by the
/// merge-driven layered variant).
///
/// Returns the top-k and the total number of documents in the intersection.
pub(crate) fn intersect_lists(
    ctx: &ScoreContext<'_>,
    merge_lists: &mut [&mut ListData],
    lists: &mut [&mut ListData],
    k: usize,
    counters: &mut TraversalCounters,
) -> Result<(Vec<SearchResult>, u64)> {
    let idfs: Vec<f32> = lists
        .iter()
        .map(|l| ctx.scorer.idf(l.num_docs_complete_list()))
        .collect();

    let mut topk = TopK::new(k);
    let mut total_results = 0u64;
    let mut did = 0u32;

    'outer: while did < TERMINATED {
        ctx.check_deadline()?;
        let first_probe;
        if merge_lists.is_empty() {
            // Drive by the shortest list.
            did = lists[0].next_geq(did)?;
            if did == TERMINATED {
                break;
            }
            first_probe = 1;
        } else {
            // Drive by the lowest candidate among the merge lists, ignoring
            // duplicates and anything skipped past in AND traversal.
            let mut min_doc_id = TERMINATED;
            for list in merge_lists.iter_mut() {
                let d = list.next_geq(did)?;
                if d < min_doc_id {
                    min_doc_id = d;
                }
            }
            if min_doc_id == TERMINATED {
                break;
            }
            did = min_doc_id;
            first_probe = 0;
        }

        // Probe the remaining lists for the candidate.
        for i in first_probe..lists.len() {
            let d = lists[i].next_geq(did)?;
            if d != did {
                did = d;
                continue 'outer;
            }
        }

        let mut score = 0.0f32;
        let doc_len = ctx.doc_map.doc_len(did);
        for (i, list) in lists.iter_mut().enumerate() {
            let frequency = list.get_freq()?;
            score += ctx.scorer.partial(idfs[i], frequency, doc_len);
            counters.scored += 1;
        }
        topk.insert(did, score);
        total_results += 1;
        did += 1;
    }

    Ok((topk.into_sorted_results(), total_results))
}

/// DAAT OR over `lists`: a flat array holds each list's current posting; at
/// each step the minimum docID is fully scored in one pass and every list
/// positioned on it advances. Faster than a heap for the small list counts
/// real queries have.
pub(crate) fn merge_lists(
    ctx: &ScoreContext<'_>,
    lists: &mut [&mut ListData],
    k: usize,
    counters: &mut TraversalCounters,
) -> Result<(Vec<SearchResult>, u64)> {
    merge_lists_seeded(ctx, lists, k, 0.0, counters)
}

pub(crate) fn merge_lists_seeded(
    ctx: &ScoreContext<'_>,
    lists: &mut [&mut ListData],
    k: usize,
    threshold_floor: f32,
    counters: &mut TraversalCounters,
) -> Result<(Vec<SearchResult>, u64)> {
    let idfs: Vec<f32> = lists
        .iter()
        .map(|l| ctx.scorer.idf(l.num_docs_complete_list()))
        .collect();

    let mut current: Vec<(u32, usize)> = Vec::with_capacity(lists.len());
    for (i, list) in lists.iter_mut().enumerate() {
        let d = list.next_geq(0)?;
        if d != TERMINATED {
            current.push((d, i));
        }
    }

    let mut topk = TopK::with_floor(k, threshold_floor);
    let mut total_results = 0u64;

    while !current.is_empty() {
        ctx.check_deadline()?;
        let min_doc = current.iter().map(|&(d, _)| d).min().unwrap();
        let doc_len = ctx.doc_map.doc_len(min_doc);
        let mut score = 0.0f32;

        let mut i = 0;
        while i < current.len() {
            if current[i].0 == min_doc {
                let list_idx = current[i].1;
                let frequency = lists[list_idx].get_freq()?;
                score += ctx.scorer.partial(idfs[list_idx], frequency, doc_len);
                counters.scored += 1;
                let next = lists[list_idx].next_geq(min_doc + 1)?;
                if next == TERMINATED {
                    current.swap_remove(i);
                    continue;
                }
                current[i].0 = next;
            }
            i += 1;
        }

        topk.insert(min_doc, score);
        total_results += 1;
    }

    Ok((topk.into_sorted_results(), total_results))
}
