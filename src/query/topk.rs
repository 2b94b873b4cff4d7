//! Top-k maintenance and result formatting.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use crate::docmap::DocumentMap;

/// A scored document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchResult {
    pub doc_id: u32,
    pub score: f32,
}

#[derive(Clone, Copy)]
struct HeapEntry {
    doc_id: u32,
    score: f32,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.score == other.score && self.doc_id == other.doc_id
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        // Min-heap: lower scores come first (to be evicted); among equal
        // scores the higher docID is evicted first.
        other
            .score
            .partial_cmp(&self.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| self.doc_id.cmp(&other.doc_id))
    }
}

/// Min-heap of size k; the heap top is the running threshold θ.
pub struct TopK {
    heap: BinaryHeap<HeapEntry>,
    k: usize,
    /// Pre-seeded lower bound, used by the two-tiered algorithms.
    floor: f32,
}

impl TopK {
    pub fn new(k: usize) -> Self {
        Self::with_floor(k, 0.0)
    }

    pub fn with_floor(k: usize, floor: f32) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
            floor,
        }
    }

    pub fn insert(&mut self, doc_id: u32, score: f32) {
        if self.heap.len() < self.k {
            self.heap.push(HeapEntry { doc_id, score });
        } else if score > self.threshold() {
            self.heap.pop();
            self.heap.push(HeapEntry { doc_id, score });
        }
    }

    /// The score a new document must exceed to enter the top-k.
    pub fn threshold(&self) -> f32 {
        if self.heap.len() == self.k {
            self.heap
                .peek()
                .map(|e| e.score.max(self.floor))
                .unwrap_or(self.floor)
        } else {
            self.floor
        }
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    /// Drains into results sorted by score descending, docID ascending.
    pub fn into_sorted_results(self) -> Vec<SearchResult> {
        let mut results: Vec<SearchResult> = self
            .heap
            .into_vec()
            .into_iter()
            .map(|e| SearchResult {
                doc_id: e.doc_id,
                score: e.score,
            })
            .collect();
        sort_results(&mut results);
        results
    }
}

pub fn sort_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.doc_id.cmp(&b.doc_id))
    });
}

/// Running k-th score tracker for accumulator-based processing. Returns the
/// lowest retained score once k scores have been seen, and the minimum
/// representable score before that.
pub struct KthScoreHeap {
    heap: BinaryHeap<HeapEntry>,
    k: usize,
}

impl KthScoreHeap {
    pub fn new(k: usize) -> Self {
        Self {
            heap: BinaryHeap::with_capacity(k + 1),
            k,
        }
    }

    pub fn insert(&mut self, score: f32) -> f32 {
        if self.heap.len() < self.k {
            self.heap.push(HeapEntry { doc_id: 0, score });
        } else if score > self.heap.peek().map(|e| e.score).unwrap_or(f32::MIN) {
            self.heap.pop();
            self.heap.push(HeapEntry { doc_id: 0, score });
        }
        if self.heap.len() < self.k {
            f32::MIN
        } else {
            self.heap.peek().map(|e| e.score).unwrap_or(f32::MIN)
        }
    }
}

/// Output format for the collaborating CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultFormat {
    /// score, docID, URL.
    Normal,
    /// TREC run format.
    Trec,
    /// score/docID pairs for cross-run comparison.
    Compare,
    /// Produce no output (timing runs).
    Discard,
}

pub fn format_results(
    results: &[SearchResult],
    doc_map: &DocumentMap,
    format: ResultFormat,
    query_id: u64,
) -> String {
    let mut out = String::new();
    match format {
        ResultFormat::Normal => {
            for r in results {
                out.push_str(&format!(
                    "{:.6}\t{}\t{}\n",
                    r.score,
                    r.doc_id,
                    doc_map.doc_url(r.doc_id)
                ));
            }
        }
        ResultFormat::Trec => {
            for (rank, r) in results.iter().enumerate() {
                out.push_str(&format!(
                    "{} Q0 {} {} {:.6} silt\n",
                    query_id,
                    doc_map.doc_url(r.doc_id),
                    rank + 1,
                    r.score
                ));
            }
        }
        ResultFormat::Compare => {
            for r in results {
                out.push_str(&format!("{} {} {:.6}\n", query_id, r.doc_id, r.score));
            }
        }
        ResultFormat::Discard => {}
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topk_keeps_highest() {
        let mut topk = TopK::new(3);
        for (doc, score) in [(1, 0.5), (2, 2.0), (3, 1.0), (4, 3.0), (5, 0.1)] {
            topk.insert(doc, score);
        }
        let results = topk.into_sorted_results();
        let docs: Vec<u32> = results.iter().map(|r| r.doc_id).collect();
        assert_eq!(docs, vec![4, 2, 3]);
    }

    #[test]
    fn test_topk_tie_break_prefers_lower_doc_id() {
        let mut topk = TopK::new(2);
        topk.insert(10, 1.0);
        topk.insert(5, 1.0);
        topk.insert(7, 1.0);
        let results = topk.into_sorted_results();
        let docs: Vec<u32> = results.iter().map(|r| r.doc_id).collect();
        assert_eq!(docs, vec![5, 7]);
    }

    #[test]
    fn test_threshold_with_floor() {
        let mut topk = TopK::with_floor(2, 1.5);
        assert_eq!(topk.threshold(), 1.5);
        topk.insert(1, 0.5); // below the floor, but the heap isn't full yet
        topk.insert(2, 2.0);
        assert_eq!(topk.threshold(), 1.5);
        topk.insert(3, 3.0);
        assert_eq!(topk.threshold(), 2.0);
    }

    #[test]
    fn test_kth_score_heap() {
        let mut kth = KthScoreHeap::new(2);
        assert_eq!(kth.insert(1.0), f32::MIN);
        assert_eq!(kth.insert(3.0), 1.0);
        assert_eq!(kth.insert(2.0), 2.0);
        assert_eq!(kth.insert(0.5), 2.0);
    }
}
