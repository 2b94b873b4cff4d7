//! Query processor: term lookup, list/layer management, algorithm dispatch,
//! and query statistics.

use std::io::BufRead;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustc_hash::FxHashSet;

use crate::cache::{BlockCache, LruCache, MmapCache, ResidentCache};
use crate::config::Config;
use crate::error::{Error, Result};
use crate::index::{IndexFiles, IndexReader, LexiconEntry, ListData, Purpose};

use super::bm25::Bm25Scorer;
use super::topk::SearchResult;
use super::{daat, layered, maxscore, taat, wand, ScoreContext, TraversalCounters};

/// Maximum query length; the TAAT accumulator term bitmap is a u32.
const MAX_QUERY_TERMS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryAlgorithm {
    /// Pick a sensible algorithm for the type of index being queried.
    Default,
    DaatAnd,
    DaatOr,
    /// Each first layer intersected with the other full lists; results merged.
    DualLayeredOverlappingDaat,
    /// First layers merged into a virtual list driving one intersection.
    DualLayeredOverlappingMergeDaat,
    /// Pruned TAAT with accumulator trimming over disjoint layers.
    LayeredTaatOrEarlyTerminated,
    Wand,
    DualLayeredWand,
    MaxScore,
    DualLayeredMaxScore,
}

impl QueryAlgorithm {
    fn and_semantics(self) -> bool {
        matches!(
            self,
            QueryAlgorithm::DaatAnd
                | QueryAlgorithm::DualLayeredOverlappingDaat
                | QueryAlgorithm::DualLayeredOverlappingMergeDaat
        )
    }

    fn wants_external_index(self) -> bool {
        matches!(
            self,
            QueryAlgorithm::MaxScore | QueryAlgorithm::DualLayeredMaxScore
        )
    }
}

/// How queries arrive. The interactive modes are driven by the caller one
/// query at a time; the batch modes run a whole stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    Interactive,
    InteractiveSingle,
    /// Shuffled stream: most queries warm the cache, a test fraction is timed.
    Batch,
    /// Whole stream timed, no warm-up, original order.
    BatchAll,
}

#[derive(Debug, Clone, Default)]
pub struct QueryStats {
    pub total_num_queries: u64,
    pub num_single_term_queries: u64,
    pub num_early_terminated_queries: u64,
    pub not_enough_results_definitely: u64,
    pub not_enough_results_possibly: u64,
    pub num_queries_containing_single_layered_terms: u64,
    pub num_queries_kth_result_meeting_threshold: u64,
    pub num_queries_kth_result_not_meeting_threshold: u64,
    pub num_postings_scored: u64,
    pub num_postings_skipped: u64,
    pub total_querying_time: Duration,
}

#[derive(Debug, Clone)]
pub struct QueryOutput {
    pub results: Vec<SearchResult>,
    /// Total matching documents found, before top-k truncation.
    pub total_results: u64,
}

impl QueryOutput {
    fn empty() -> Self {
        Self {
            results: Vec::new(),
            total_results: 0,
        }
    }
}

pub struct QueryProcessor {
    reader: IndexReader,
    scorer: Bm25Scorer,
    algorithm: QueryAlgorithm,
    max_num_results: usize,
    deadline: Option<Instant>,
    warm_up_mode: bool,
    stats: QueryStats,
}

impl QueryProcessor {
    pub fn new(files: &IndexFiles, config: &Config, algorithm: QueryAlgorithm) -> Result<Self> {
        let cache = make_cache(files, config)?;
        // `Default` may resolve to a score-skipping algorithm, so it loads
        // the external index too.
        let load_external =
            algorithm.wants_external_index() || algorithm == QueryAlgorithm::Default;
        let mut reader = IndexReader::open(
            Purpose::RandomQuery,
            cache,
            files,
            config.use_positions,
            load_external,
        )?;
        let scorer = Bm25Scorer::new(reader.total_num_docs()?, reader.average_doc_len()?);
        let algorithm = resolve_default(algorithm, &reader);

        let mut processor = Self {
            reader,
            scorer,
            algorithm,
            max_num_results: config.max_number_results,
            deadline: None,
            warm_up_mode: false,
            stats: QueryStats::default(),
        };

        // With the index in memory, a block-level skip index pays for itself
        // on algorithms that jump around; pure OR scans never skip.
        if (config.memory_mapped_index || config.memory_resident_index)
            && algorithm != QueryAlgorithm::DaatOr
        {
            processor.build_block_level_index()?;
        }
        Ok(processor)
    }

    /// Cooperative cancellation: checked between top-k insertions.
    pub fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    pub fn stats(&self) -> &QueryStats {
        &self.stats
    }

    pub fn reader(&self) -> &IndexReader {
        &self.reader
    }

    pub fn algorithm(&self) -> QueryAlgorithm {
        self.algorithm
    }

    /// Builds the in-memory block-level skip index: for every layer of every
    /// term, the last docID of each of its blocks, attached to the lexicon.
    pub fn build_block_level_index(&mut self) -> Result<()> {
        log::info!("building in-memory block-level index");
        let entries: Vec<LexiconEntry> = self.reader.lexicon().iter().cloned().collect();
        let mut skip_arrays: Vec<Vec<Arc<Vec<u32>>>> = Vec::with_capacity(entries.len());

        for entry in &entries {
            let mut per_layer = Vec::with_capacity(entry.num_layers());
            for layer_num in 0..entry.num_layers() {
                let layer = entry.layer(layer_num);
                let mut list = self.reader.open_list(entry, layer_num, true, 0)?;
                let mut last_doc_ids = Vec::with_capacity(layer.num_blocks as usize);
                let mut chunks_left = layer.num_chunks as i64;
                while chunks_left > 0 {
                    let block = list.curr_block_decoder();
                    // Index the last chunk in this block that belongs to this
                    // list; in the final block that may not be the block's
                    // last chunk.
                    let total_chunks = block.num_chunks() as i64;
                    let chunk_num = block.starting_chunk() as i64 + chunks_left;
                    let last_list_chunk = total_chunks.min(chunk_num) as usize;
                    last_doc_ids.push(block.chunk_last_doc_id(last_list_chunk - 1));
                    chunks_left -= block.num_actual_chunks() as i64;
                    if chunks_left > 0 {
                        list.advance_block()?;
                    }
                }
                debug_assert_eq!(last_doc_ids.len(), layer.num_blocks as usize);
                self.reader.close_list(list);
                per_layer.push(Arc::new(last_doc_ids));
            }
            skip_arrays.push(per_layer);
        }

        for (entry, per_layer) in self.reader.lexicon_mut().iter_mut().zip(skip_arrays) {
            for (layer, last_doc_ids) in entry.layers.iter_mut().zip(per_layer) {
                layer.last_doc_ids = Some(last_doc_ids);
            }
        }
        self.reader.set_block_skipping_enabled(true);
        self.reader.reset_stats();
        Ok(())
    }

    pub fn execute_query(&mut self, query: &str) -> Result<QueryOutput> {
        let start = Instant::now();
        let terms = tokenize(query);
        if terms.is_empty() {
            return Ok(QueryOutput::empty());
        }
        if terms.len() > MAX_QUERY_TERMS {
            return Err(Error::Query(format!(
                "query has {} terms; at most {} supported",
                terms.len(),
                MAX_QUERY_TERMS
            )));
        }

        let mut entries: Vec<LexiconEntry> = Vec::with_capacity(terms.len());
        let mut any_missing = false;
        for term in &terms {
            match self.reader.lexicon().get(term.as_bytes()) {
                Some(entry) => entries.push(entry.clone()),
                None => any_missing = true,
            }
        }
        // Under AND semantics a missing term empties the result silently;
        // under OR semantics missing terms are dropped.
        if entries.is_empty() || (any_missing && self.algorithm.and_semantics()) {
            self.finish_query(start);
            return Ok(QueryOutput::empty());
        }

        let mut counters = TraversalCounters::default();
        let output = match self.algorithm {
            QueryAlgorithm::Default => unreachable!("resolved at construction"),
            QueryAlgorithm::DaatAnd => self.process_standard(&entries, true, &mut counters)?,
            QueryAlgorithm::DaatOr => self.process_standard(&entries, false, &mut counters)?,
            QueryAlgorithm::DualLayeredOverlappingDaat => {
                self.process_layered_daat(&entries, false, &mut counters)?
            }
            QueryAlgorithm::DualLayeredOverlappingMergeDaat => {
                self.process_layered_daat(&entries, true, &mut counters)?
            }
            QueryAlgorithm::LayeredTaatOrEarlyTerminated => {
                self.process_taat_pruned(&entries, &mut counters)?
            }
            QueryAlgorithm::Wand => self.process_wand(&entries, false, &mut counters)?,
            QueryAlgorithm::DualLayeredWand => self.process_wand(&entries, true, &mut counters)?,
            QueryAlgorithm::MaxScore => self.process_max_score(&entries, false, &mut counters)?,
            QueryAlgorithm::DualLayeredMaxScore => {
                self.process_max_score(&entries, true, &mut counters)?
            }
        };

        if !self.warm_up_mode {
            self.stats.num_postings_scored += counters.scored;
            self.stats.num_postings_skipped += counters.skipped;
            if entries.len() == 1 {
                self.stats.num_single_term_queries += 1;
            }
        }
        self.finish_query(start);
        Ok(output)
    }

    /// Runs a whole query stream. `Batch` shuffles and uses most of the
    /// stream untimed to warm the cache; `BatchAll` times everything in
    /// order.
    pub fn run_batch(&mut self, input: impl BufRead, mode: QueryMode) -> Result<()> {
        let mut queries: Vec<String> = Vec::new();
        for line in input.lines() {
            let line = line?;
            if !line.trim().is_empty() {
                queries.push(line);
            }
        }
        match mode {
            QueryMode::Batch => {
                shuffle(&mut queries);
                let timed = ((queries.len() as f64 * 0.01).ceil() as usize)
                    .clamp(1, queries.len());
                let warm = queries.len() - timed;
                self.warm_up_mode = true;
                for query in &queries[..warm] {
                    self.execute_query(query)?;
                }
                self.warm_up_mode = false;
                for query in &queries[warm..] {
                    self.execute_query(query)?;
                }
            }
            QueryMode::BatchAll => {
                for query in &queries {
                    self.execute_query(query)?;
                }
            }
            QueryMode::Interactive | QueryMode::InteractiveSingle => {
                return Err(Error::Query(
                    "interactive modes are driven by the caller, one query at a time"
                        .to_string(),
                ));
            }
        }
        log::info!(
            "batch finished: {} queries, {:?} total",
            self.stats.total_num_queries,
            self.stats.total_querying_time
        );
        Ok(())
    }

    fn finish_query(&mut self, start: Instant) {
        if !self.warm_up_mode {
            self.stats.total_num_queries += 1;
            self.stats.total_querying_time += start.elapsed();
        }
    }

    fn process_standard(
        &mut self,
        entries: &[LexiconEntry],
        and_mode: bool,
        counters: &mut TraversalCounters,
    ) -> Result<QueryOutput> {
        let doc_map = Arc::clone(self.reader.document_map());
        let ctx = ScoreContext {
            scorer: &self.scorer,
            doc_map: &doc_map,
            deadline: self.deadline,
        };
        let single_term = entries.len() == 1;
        let k = self.max_num_results;

        // The last layer of an overlapping list is the complete list, so
        // standard processing works on layered indices too.
        let mut lists: Vec<ListData> = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            lists.push(
                self.reader
                    .open_list(entry, entry.num_layers() - 1, single_term, i)?,
            );
        }

        let result = {
            let mut refs: Vec<&mut ListData> = lists.iter_mut().collect();
            if and_mode {
                refs.sort_by_key(|l| l.num_docs());
                let mut no_merge: Vec<&mut ListData> = Vec::new();
                daat::intersect_lists(&ctx, &mut no_merge, &mut refs, k, counters)
            } else {
                daat::merge_lists(&ctx, &mut refs, k, counters)
            }
        };
        for list in lists {
            self.reader.close_list(list);
        }
        let (results, total_results) = result?;
        Ok(QueryOutput {
            results,
            total_results,
        })
    }

    fn process_wand(
        &mut self,
        entries: &[LexiconEntry],
        two_tiered: bool,
        counters: &mut TraversalCounters,
    ) -> Result<QueryOutput> {
        self.early_termination_merge(entries, two_tiered, false, counters)
    }

    fn process_max_score(
        &mut self,
        entries: &[LexiconEntry],
        two_tiered: bool,
        counters: &mut TraversalCounters,
    ) -> Result<QueryOutput> {
        self.early_termination_merge(entries, two_tiered, true, counters)
    }

    /// Common driver for WAND and MaxScore, with the optional two-tiered
    /// phase: derive θ from a DAAT-OR pass over the top-docs layers, then
    /// rerun over the overlapping last layers with θ pre-seeded.
    fn early_termination_merge(
        &mut self,
        entries: &[LexiconEntry],
        two_tiered: bool,
        max_score: bool,
        counters: &mut TraversalCounters,
    ) -> Result<QueryOutput> {
        if two_tiered
            && !(self.reader.layered()
                && self.reader.overlapping_layers()
                && self.reader.num_layers() == 2)
        {
            return Err(Error::Query(
                "two-tiered processing requires a two-layer overlapping index".to_string(),
            ));
        }
        let doc_map = Arc::clone(self.reader.document_map());
        let ctx = ScoreContext {
            scorer: &self.scorer,
            doc_map: &doc_map,
            deadline: self.deadline,
        };
        let k = self.max_num_results;
        let single_term = entries.len() == 1;

        // Full-list upperbounds: the first layer carries the list maximum.
        let upperbounds: Vec<f32> = entries
            .iter()
            .map(|e| e.layer(0).score_threshold)
            .collect();

        if single_term {
            // WAND brings nothing for one list; run DAAT-OR on the top-docs
            // layer and fall back to the complete layer only when it can't
            // fill the top-k.
            let entry = &entries[0];
            let mut list = self.reader.open_list(entry, 0, true, 0)?;
            let (mut results, mut total) = {
                let mut refs = vec![&mut list];
                daat::merge_lists(&ctx, &mut refs, k, counters)?
            };
            if total < k as u64 && entry.num_layers() > 1 {
                self.reader.close_list(list);
                list = self
                    .reader
                    .open_list(entry, entry.num_layers() - 1, true, 0)?;
                let mut refs = vec![&mut list];
                (results, total) = daat::merge_lists(&ctx, &mut refs, k, counters)?;
            }
            self.reader.close_list(list);
            return Ok(QueryOutput {
                results,
                total_results: total,
            });
        }

        // Open the top-docs layers first.
        let mut lists: Vec<ListData> = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            lists.push(self.reader.open_list(entry, 0, single_term, i)?);
        }

        let mut seed_threshold = 0.0f32;
        if two_tiered {
            // An unresolved docID present in only some top-docs lists could
            // still outscore the k-th result here, so this is only a lower
            // bound; the overlapping layers are traversed in full next.
            let (top_results, _) = {
                let mut refs: Vec<&mut ListData> = lists.iter_mut().collect();
                daat::merge_lists(&ctx, &mut refs, k, counters)?
            };
            if top_results.len() >= k {
                seed_threshold = top_results[k - 1].score;
            }
            log::debug!("two-tiered seed threshold: {}", seed_threshold);
        }

        // Switch every list to its complete (overlapping last) layer.
        for (i, entry) in entries.iter().enumerate() {
            if entry.num_layers() == 1 {
                lists[i].reset_list(single_term)?;
            } else {
                let fresh =
                    self.reader
                        .open_list(entry, entry.num_layers() - 1, single_term, i)?;
                let old = std::mem::replace(&mut lists[i], fresh);
                self.reader.close_list(old);
            }
        }

        let result = {
            let mut refs: Vec<&mut ListData> = lists.iter_mut().collect();
            if max_score {
                let score_skipping = self.reader.external_index().is_some();
                maxscore::max_score_merge(
                    &ctx,
                    &mut refs,
                    &upperbounds,
                    k,
                    seed_threshold,
                    score_skipping,
                    counters,
                )
            } else {
                wand::wand_merge(&ctx, &mut refs, &upperbounds, k, seed_threshold, counters)
            }
        };
        for list in lists {
            self.reader.close_list(list);
        }
        let (results, total_results) = result?;
        Ok(QueryOutput {
            results,
            total_results,
        })
    }

    /// Dual-layered overlapping DAAT with AND semantics: intersect each
    /// term's top-docs layer with every other term's complete list, merge
    /// the per-term result sets, and early-terminate when the k-th merged
    /// score beats the sum of the last-layer upperbounds. Falls back to a
    /// standard intersection over the complete layers otherwise.
    fn process_layered_daat(
        &mut self,
        entries: &[LexiconEntry],
        merge_variant: bool,
        counters: &mut TraversalCounters,
    ) -> Result<QueryOutput> {
        let doc_map = Arc::clone(self.reader.document_map());
        let ctx = ScoreContext {
            scorer: &self.scorer,
            doc_map: &doc_map,
            deadline: self.deadline,
        };
        let k = self.max_num_results;
        let num_terms = entries.len();
        let single_term = num_terms == 1;

        // Open every layer of every term; one flat pool, selected by index.
        let mut lists: Vec<ListData> = Vec::new();
        let mut first_layer_idx = Vec::with_capacity(num_terms);
        let mut last_layer_idx = Vec::with_capacity(num_terms);
        for (i, entry) in entries.iter().enumerate() {
            first_layer_idx.push(lists.len());
            for layer_num in 0..entry.num_layers() {
                lists.push(self.reader.open_list(entry, layer_num, single_term, i)?);
            }
            last_layer_idx.push(lists.len() - 1);
            log::debug!(
                "term {}: {} layers, threshold {}",
                i,
                entry.num_layers(),
                entry.layer(0).score_threshold
            );
        }
        let single_layer_term = entries.iter().any(|e| e.num_layers() == 1);

        let mut output = QueryOutput::empty();
        let mut run_standard_intersection = false;
        let mut fresh_lists = true;

        if single_layer_term || single_term {
            // A term with only one layer means its "first layer" is already
            // the complete list; the plain intersection is the cheapest
            // correct plan, and it early-terminates by definition.
            if !self.warm_up_mode {
                self.stats.num_queries_containing_single_layered_terms += 1;
                self.stats.num_early_terminated_queries += 1;
            }
            run_standard_intersection = true;
        } else if merge_variant && num_terms > 2 {
            // Merge the first layers into a virtual candidate stream and
            // intersect it against every complete list in one pass.
            let first_set: FxHashSet<usize> = first_layer_idx.iter().copied().collect();
            let last_set: FxHashSet<usize> = last_layer_idx.iter().copied().collect();
            let (mut merge_refs, mut probe_refs) =
                select_disjoint(&mut lists, &first_set, &last_set);
            probe_refs.sort_by_key(|l| l.num_docs());
            let (results, total) =
                daat::intersect_lists(&ctx, &mut merge_refs, &mut probe_refs, k, counters)?;
            output = QueryOutput {
                results,
                total_results: total,
            };
            fresh_lists = false;
            check_layered_early_termination(
                &mut self.stats,
                self.warm_up_mode,
                k,
                entries,
                &output,
                &mut run_standard_intersection,
            );
        } else {
            // One intersection per term: its first layer against the other
            // terms' complete lists.
            let mut per_term_results = Vec::with_capacity(num_terms);
            let mut total = 0u64;
            for i in 0..num_terms {
                let mut selection: FxHashSet<usize> = FxHashSet::default();
                selection.insert(first_layer_idx[i]);
                for (j, &idx) in last_layer_idx.iter().enumerate() {
                    if j != i {
                        selection.insert(idx);
                    }
                }
                let (mut refs, _) = select_disjoint(&mut lists, &selection, &FxHashSet::default());
                refs.sort_by_key(|l| l.num_docs());
                let mut no_merge: Vec<&mut ListData> = Vec::new();
                let (results, t) =
                    daat::intersect_lists(&ctx, &mut no_merge, &mut refs, k, counters)?;
                total += t;
                per_term_results.push(results);
                // The complete layers get traversed again by the next
                // intersection.
                for r in refs {
                    if r.layer_num() > 0 {
                        r.reset_list(single_term)?;
                    }
                }
            }
            output = QueryOutput {
                results: layered::merge_intersection_results(per_term_results, k),
                total_results: total,
            };
            fresh_lists = false;
            check_layered_early_termination(
                &mut self.stats,
                self.warm_up_mode,
                k,
                entries,
                &output,
                &mut run_standard_intersection,
            );
        }

        if run_standard_intersection {
            let last_set: FxHashSet<usize> = last_layer_idx.iter().copied().collect();
            let (mut refs, _) = select_disjoint(&mut lists, &last_set, &FxHashSet::default());
            if !fresh_lists {
                for r in refs.iter_mut() {
                    r.reset_list(single_term)?;
                }
            }
            refs.sort_by_key(|l| l.num_docs());
            let mut no_merge: Vec<&mut ListData> = Vec::new();
            let (results, total) =
                daat::intersect_lists(&ctx, &mut no_merge, &mut refs, k, counters)?;
            output = QueryOutput {
                results,
                total_results: total,
            };
        }

        for list in lists {
            self.reader.close_list(list);
        }
        Ok(output)
    }

    /// Pruned TAAT over every layer of every term, disjoint layering.
    fn process_taat_pruned(
        &mut self,
        entries: &[LexiconEntry],
        counters: &mut TraversalCounters,
    ) -> Result<QueryOutput> {
        let doc_map = Arc::clone(self.reader.document_map());
        let ctx = ScoreContext {
            scorer: &self.scorer,
            doc_map: &doc_map,
            deadline: self.deadline,
        };
        let k = self.max_num_results;
        let single_term = entries.len() == 1;

        let mut lists: Vec<ListData> = Vec::new();
        for (i, entry) in entries.iter().enumerate() {
            for layer_num in 0..entry.num_layers() {
                lists.push(self.reader.open_list(entry, layer_num, single_term, i)?);
            }
        }

        let result = {
            let mut refs: Vec<&mut ListData> = lists.iter_mut().collect();
            taat::taat_pruned(&ctx, &mut refs, entries.len(), k, counters)
        };
        for list in lists {
            self.reader.close_list(list);
        }
        let (results, early_terminated, total_results) = result?;
        if early_terminated && !self.warm_up_mode {
            self.stats.num_early_terminated_queries += 1;
        }
        Ok(QueryOutput {
            results,
            total_results,
        })
    }
}

/// Decides whether the merged layered results already settle the query: the
/// k-th score must beat the best score any unseen document could reach (the
/// sum of the complete-layer upperbounds).
fn check_layered_early_termination(
    stats: &mut QueryStats,
    warm_up_mode: bool,
    k: usize,
    entries: &[LexiconEntry],
    output: &QueryOutput,
    run_standard_intersection: &mut bool,
) {
    if output.results.len() >= k {
        let remaining_upperbound: f32 = entries
            .iter()
            .map(|e| e.layer(e.num_layers() - 1).score_threshold)
            .sum();
        let kth_score = output.results[k - 1].score;
        if kth_score > remaining_upperbound {
            if !warm_up_mode {
                stats.num_queries_kth_result_meeting_threshold += 1;
                stats.num_early_terminated_queries += 1;
            }
        } else {
            if !warm_up_mode {
                stats.num_queries_kth_result_not_meeting_threshold += 1;
            }
            *run_standard_intersection = true;
        }
    } else {
        if !warm_up_mode {
            if output.total_results < k as u64 {
                stats.not_enough_results_definitely += 1;
            } else {
                stats.not_enough_results_possibly += 1;
            }
        }
        *run_standard_intersection = true;
    }
}

fn tokenize(query: &str) -> Vec<String> {
    let mut seen = FxHashSet::default();
    let mut terms = Vec::new();
    for token in query.split_whitespace() {
        let term = token.to_lowercase();
        if seen.insert(term.clone()) {
            terms.push(term);
        }
    }
    terms
}

fn resolve_default(algorithm: QueryAlgorithm, reader: &IndexReader) -> QueryAlgorithm {
    if algorithm != QueryAlgorithm::Default {
        return algorithm;
    }
    if reader.layered() {
        if reader.overlapping_layers() && reader.num_layers() == 2 {
            QueryAlgorithm::DualLayeredMaxScore
        } else {
            QueryAlgorithm::LayeredTaatOrEarlyTerminated
        }
    } else {
        QueryAlgorithm::DaatAnd
    }
}

pub(crate) fn make_cache(files: &IndexFiles, config: &Config) -> Result<Arc<dyn BlockCache>> {
    // Memory-mapped wins when both in-memory policies are requested.
    if config.memory_mapped_index {
        Ok(Arc::new(MmapCache::open(files.index_filename())?))
    } else if config.memory_resident_index {
        Ok(Arc::new(ResidentCache::open(files.index_filename())?))
    } else {
        Ok(Arc::new(LruCache::open(
            files.index_filename(),
            config.lru_cache_blocks,
        )?))
    }
}

/// Picks two disjoint sets of mutable list references out of the flat pool.
fn select_disjoint<'a>(
    lists: &'a mut [ListData],
    first: &FxHashSet<usize>,
    second: &FxHashSet<usize>,
) -> (Vec<&'a mut ListData>, Vec<&'a mut ListData>) {
    let mut first_refs = Vec::with_capacity(first.len());
    let mut second_refs = Vec::with_capacity(second.len());
    for (i, list) in lists.iter_mut().enumerate() {
        if first.contains(&i) {
            first_refs.push(list);
        } else if second.contains(&i) {
            second_refs.push(list);
        }
    }
    (first_refs, second_refs)
}

/// Deterministic Fisher-Yates shuffle; batch timing runs must be repeatable.
fn shuffle(queries: &mut [String]) {
    let mut state = 0x9E3779B97F4A7C15u64;
    for i in (1..queries.len()).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        queries.swap(i, (state % (i as u64 + 1)) as usize);
    }
}
