//! MaxScore early termination.
//!
//! Lists are ordered by upperbound descending with precomputed suffix sums.
//! The next candidate is the lowest current docID among the essential lists
//! (those whose suffix upperbound can still reach θ); it is scored fully,
//! with per-document early exit as soon as the partial sum plus the
//! remaining suffix upperbound falls below θ. Exhausted lists are compacted
//! out immediately and the suffix sums recomputed. With the external index
//! loaded, a list whose current block's score bound cannot contribute is
//! dropped from the remainder of the query.

use crate::error::Result;
use crate::index::{ListData, TERMINATED};

use super::topk::{SearchResult, TopK};
use super::{ScoreContext, TraversalCounters};

pub(crate) fn max_score_merge(
    ctx: &ScoreContext<'_>,
    lists: &mut [&mut ListData],
    full_upperbounds: &[f32],
    k: usize,
    threshold_floor: f32,
    score_skipping: bool,
    counters: &mut TraversalCounters,
) -> Result<(Vec<SearchResult>, u64)> {
    let idfs: Vec<f32> = lists
        .iter()
        .map(|l| ctx.scorer.idf(l.num_docs_complete_list()))
        .collect();

    // Current posting per list, indexed by list position.
    let mut current: Vec<u32> = Vec::with_capacity(lists.len());
    for list in lists.iter_mut() {
        current.push(list.next_geq(0)?);
    }

    // (suffix upperbound, list index), sorted by upperbound descending.
    let mut bounds: Vec<(f32, usize)> = (0..lists.len())
        .filter(|&i| current[i] != TERMINATED)
        .map(|i| (full_upperbounds[i], i))
        .collect();
    bounds.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    for i in (0..bounds.len().saturating_sub(1)).rev() {
        bounds[i].0 += bounds[i + 1].0;
    }

    let mut topk = TopK::with_floor(k, threshold_floor);
    let mut total_results = 0u64;

    while !bounds.is_empty() {
        ctx.check_deadline()?;
        let threshold = topk.threshold();

        // Lowest docID among the essential lists.
        let mut top = 0usize;
        for i in 1..bounds.len() {
            if threshold > bounds[i].0 {
                break;
            }
            if current[bounds[i].1] < current[bounds[top].1] {
                top = i;
            }
        }
        // Upperbounds only shrink when a list is finished; check whether
        // anything can still make it.
        if threshold > bounds[0].0 {
            break;
        }
        let curr_doc = current[bounds[top].1];
        if curr_doc == TERMINATED {
            break;
        }

        // Score the candidate fully, looking it up in every list that can
        // still matter.
        let doc_len = ctx.doc_map.doc_len(curr_doc);
        let mut score = 0.0f32;
        let mut i = 0usize;
        while i < bounds.len() {
            if threshold > score + bounds[i].0 {
                counters.skipped += (bounds.len() - i) as u64;
                break;
            }
            let list_idx = bounds[i].1;
            current[list_idx] = lists[list_idx].next_geq(curr_doc)?;

            if current[list_idx] == TERMINATED {
                remove_list(&mut bounds, i, full_upperbounds);
                continue;
            }

            // A tighter bound from the current block can rule this list out
            // for the rest of the query.
            if score_skipping {
                let remaining = if i + 1 < bounds.len() {
                    bounds[i + 1].0
                } else {
                    0.0
                };
                let block_bound = lists[list_idx].block_score_bound()?;
                if threshold > score + block_bound + remaining {
                    remove_list(&mut bounds, i, full_upperbounds);
                    continue;
                }
            }

            if current[list_idx] == curr_doc {
                let frequency = lists[list_idx].get_freq()?;
                score += ctx.scorer.partial(idfs[list_idx], frequency, doc_len);
                counters.scored += 1;
                current[list_idx] = lists[list_idx].next_geq(curr_doc + 1)?;
                if current[list_idx] == TERMINATED {
                    remove_list(&mut bounds, i, full_upperbounds);
                    continue;
                }
            }
            i += 1;
        }

        topk.insert(curr_doc, score);
        total_results += 1;
    }

    Ok((topk.into_sorted_results(), total_results))
}

/// Compacts out the list at position `i` and rebates its full upperbound
/// from the prefix entries; suffix entries never included it.
fn remove_list(bounds: &mut Vec<(f32, usize)>, i: usize, full_upperbounds: &[f32]) {
    let removed_upperbound = full_upperbounds[bounds[i].1];
    bounds.remove(i);
    for entry in bounds.iter_mut().take(i) {
        entry.0 -= removed_upperbound;
    }
}
