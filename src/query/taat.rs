//! Pruned term-at-a-time OR processing over disjoint layers.
//!
//! Layers of all query terms are traversed in max-score-descending order
//! into a docID-sorted accumulator array. Processing starts in OR mode
//! (inserting new accumulators) and switches to AND mode (updating existing
//! ones only) once the remainder function says no unseen document can reach
//! the threshold. After each layer, accumulators whose upperbound falls
//! below the threshold are pruned, and two conditions decide whether the
//! remaining layers can be skipped entirely. Rank safe, not score safe.

use std::cmp::Ordering;

use crate::error::Result;
use crate::index::{ListData, TERMINATED};

use super::topk::{KthScoreHeap, SearchResult};
use super::{ScoreContext, TraversalCounters};

#[derive(Debug, Clone, Copy)]
struct Accumulator {
    doc_id: u32,
    score: f32,
    /// Bit t set when term t has contributed to the score.
    term_bitmap: u32,
}

/// Runs the pruned TAAT query over every layer of every query term.
/// `layers[j].term_num()` identifies the owning term. Returns the top-k,
/// whether the query early-terminated, and the number of surviving
/// accumulators.
pub(crate) fn taat_pruned(
    ctx: &ScoreContext<'_>,
    layers: &mut [&mut ListData],
    num_terms: usize,
    k: usize,
    counters: &mut TraversalCounters,
) -> Result<(Vec<SearchResult>, bool, u64)> {
    // Highest-scoring layers first.
    layers.sort_by(|a, b| {
        b.score_threshold()
            .partial_cmp(&a.score_threshold())
            .unwrap_or(Ordering::Equal)
    });
    let total_layers = layers.len();

    let mut accumulators: Vec<Accumulator> = Vec::new();
    // Partial scores of very common terms can be arbitrarily small, so the
    // threshold starts at the lowest representable score.
    let mut threshold = f32::MIN;
    let mut and_mode = false;
    let mut early_terminated = false;

    for i in 0..total_layers {
        ctx.check_deadline()?;

        // Upperbound for any newly discovered docID: per term, the best
        // threshold among the layers not yet processed (including this one).
        let mut total_remainder = 0.0f32;
        for term in 0..num_terms {
            for layer in layers[i..].iter() {
                if layer.term_num() == term {
                    total_remainder += layer.score_threshold();
                    break;
                }
            }
        }
        if total_remainder < threshold {
            and_mode = true;
        }

        debug_assert!(accumulators.windows(2).all(|w| w[0].doc_id < w[1].doc_id));
        threshold = if and_mode {
            process_layer_and(ctx, &mut *layers[i], &mut accumulators, k, counters)?
        } else {
            process_layer_or(ctx, &mut *layers[i], &mut accumulators, k, counters)?
        };

        // Per-term upperbound over the layers still unprocessed.
        let mut term_upperbounds = vec![0.0f32; num_terms];
        for (term, upperbound) in term_upperbounds.iter_mut().enumerate() {
            for layer in layers[i + 1..].iter() {
                if layer.term_num() == term {
                    *upperbound = layer.score_threshold();
                    break;
                }
            }
        }

        // Prune accumulators that can no longer reach the threshold, and
        // check whether any below-threshold accumulator could still climb
        // above it (first early-termination condition).
        let mut condition_one = true;
        accumulators.retain(|acc| {
            let upperbound = acc.score + remaining_upperbound(acc, &term_upperbounds);
            if condition_one && acc.score < threshold && upperbound > threshold {
                condition_one = false;
            }
            upperbound >= threshold
        });

        // Second condition: among survivors sorted by current score, no
        // pair's order can still flip.
        let mut condition_two = true;
        if condition_one {
            accumulators.sort_by(|a, b| {
                a.score.partial_cmp(&b.score).unwrap_or(Ordering::Equal)
            });
            for pair in accumulators.windows(2) {
                let upperbound = remaining_upperbound(&pair[0], &term_upperbounds);
                if pair[0].score == pair[1].score && upperbound > 0.0 {
                    condition_two = false;
                    break;
                }
                if upperbound > pair[1].score - pair[0].score {
                    condition_two = false;
                    break;
                }
            }
        }

        if condition_one && condition_two {
            if i < total_layers - 1 {
                early_terminated = true;
            }
            break;
        }

        // Back to docID order for the next layer.
        accumulators.sort_by_key(|acc| acc.doc_id);
    }

    accumulators.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
    let total = accumulators.len() as u64;
    let results = accumulators
        .into_iter()
        .take(k)
        .map(|acc| SearchResult {
            doc_id: acc.doc_id,
            score: acc.score,
        })
        .collect();
    Ok((results, early_terminated, total))
}

#[inline]
fn remaining_upperbound(acc: &Accumulator, term_upperbounds: &[f32]) -> f32 {
    let mut upperbound = 0.0f32;
    for (term, &term_upper) in term_upperbounds.iter().enumerate() {
        if (acc.term_bitmap >> term) & 1 == 0 {
            upperbound += term_upper;
        }
    }
    upperbound
}

/// OR mode: walk the layer, updating matching accumulators and inserting new
/// ones. The accumulator array stays docID-sorted; new entries are appended
/// and merged back in at the end. Returns the running k-th score.
fn process_layer_or(
    ctx: &ScoreContext<'_>,
    list: &mut ListData,
    accumulators: &mut Vec<Accumulator>,
    k: usize,
    counters: &mut TraversalCounters,
) -> Result<f32> {
    let idf = ctx.scorer.idf(list.num_docs_complete_list());
    let term_bit = 1u32 << list.term_num();
    let num_sorted = accumulators.len();
    let mut kth = KthScoreHeap::new(k);
    let mut threshold = f32::MIN;
    let mut acc_idx = 0usize;
    let mut target = 0u32;

    loop {
        let doc_id = list.next_geq(target)?;
        if doc_id == TERMINATED {
            break;
        }
        // Account for the old accumulators we pass over; their scores stand.
        while acc_idx < num_sorted && accumulators[acc_idx].doc_id < doc_id {
            threshold = kth.insert(accumulators[acc_idx].score);
            acc_idx += 1;
        }

        let frequency = list.get_freq()?;
        let partial = ctx
            .scorer
            .partial(idf, frequency, ctx.doc_map.doc_len(doc_id));
        counters.scored += 1;

        if acc_idx < num_sorted && accumulators[acc_idx].doc_id == doc_id {
            accumulators[acc_idx].score += partial;
            accumulators[acc_idx].term_bitmap |= term_bit;
            threshold = kth.insert(accumulators[acc_idx].score);
            acc_idx += 1;
        } else {
            accumulators.push(Accumulator {
                doc_id,
                score: partial,
                term_bitmap: term_bit,
            });
            threshold = kth.insert(partial);
        }
        target = doc_id + 1;
    }
    ctx.check_deadline()?;

    // Merge the appended entries with the sorted prefix.
    accumulators.sort_by_key(|acc| acc.doc_id);
    Ok(threshold)
}

/// AND mode: look up existing accumulators only; no new documents can make
/// it into the top-k anymore.
fn process_layer_and(
    ctx: &ScoreContext<'_>,
    list: &mut ListData,
    accumulators: &mut [Accumulator],
    k: usize,
    counters: &mut TraversalCounters,
) -> Result<f32> {
    let idf = ctx.scorer.idf(list.num_docs_complete_list());
    let term_bit = 1u32 << list.term_num();
    let mut kth = KthScoreHeap::new(k);
    let mut threshold = f32::MIN;

    for acc in accumulators.iter_mut() {
        let doc_id = list.next_geq(acc.doc_id)?;
        if doc_id == acc.doc_id {
            let frequency = list.get_freq()?;
            acc.score += ctx
                .scorer
                .partial(idf, frequency, ctx.doc_map.doc_len(doc_id));
            acc.term_bitmap |= term_bit;
            counters.scored += 1;
        } else {
            counters.skipped += 1;
        }
        threshold = kth.insert(acc.score);
    }
    ctx.check_deadline()?;
    Ok(threshold)
}
