//! WAND early termination.
//!
//! The pivot is the first list, in current-docID order, at which the
//! cumulative sum of full-list upperbounds reaches the threshold θ. No
//! document below the pivot can enter the top-k. This is the mWAND variant:
//! when the pivot hasn't been reached by the leading lists, *all* lists
//! before the pivot advance to it, trading some skipping for fewer sort
//! passes.

use crate::error::Result;
use crate::index::{ListData, TERMINATED};

use super::topk::{SearchResult, TopK};
use super::{ScoreContext, TraversalCounters};

/// Runs WAND over `lists`. `upperbounds[i]` is the full-list score
/// upperbound of `lists[i]`; `threshold_floor` pre-seeds θ for the
/// two-tiered variant.
pub(crate) fn wand_merge(
    ctx: &ScoreContext<'_>,
    lists: &mut [&mut ListData],
    upperbounds: &[f32],
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
        current.sort_unstable_by_key(|&(doc, _)| doc);

        // Select the pivot.
        let threshold = topk.threshold();
        let mut cumulative = 0.0f32;
        let mut pivot: Option<usize> = None;
        for (pos, &(_, list_idx)) in current.iter().enumerate() {
            cumulative += upperbounds[list_idx];
            if cumulative >= threshold {
                pivot = Some(pos);
                break;
            }
        }
        // No pivot: no newly encountered docID can reach the top-k.
        let Some(pivot_pos) = pivot else {
            break;
        };
        let pivot_doc = current[pivot_pos].0;

        if pivot_doc == current[0].0 {
            // Enough weight on the pivot: fully score every list sitting on
            // it and advance them.
            let doc_len = ctx.doc_map.doc_len(pivot_doc);
            let mut score = 0.0f32;
            for entry in current.iter_mut() {
                if entry.0 != pivot_doc {
                    continue;
                }
                let list_idx = entry.1;
                let frequency = lists[list_idx].get_freq()?;
                score += ctx.scorer.partial(idfs[list_idx], frequency, doc_len);
                counters.scored += 1;
                entry.0 = lists[list_idx].next_geq(pivot_doc + 1)?;
            }
            current.retain(|&(doc, _)| doc != TERMINATED);
            topk.insert(pivot_doc, score);
            total_results += 1;
        } else {
            // Not enough weight yet: advance every list before the pivot at
            // least to the pivot docID.
            for pos in 0..pivot_pos {
                let list_idx = current[pos].1;
                current[pos].0 = lists[list_idx].next_geq(pivot_doc)?;
            }
            counters.skipped += pivot_pos as u64;
            current.retain(|&(doc, _)| doc != TERMINATED);
        }
    }

    Ok((topk.into_sorted_results(), total_results))
}
