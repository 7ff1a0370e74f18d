//! Query and ranking engine.
//!
//! Scoring happens in two layers with a strict one-way relationship:
//!
//! 1. **SPECTRA layer** (ranking). Every chunk sharing at least one query
//!    term gets a BM25 score, boosted by query coverage and term proximity,
//!    and in explore mode by editorial multipliers. Results are sorted by
//!    this score, ties kept in index order. Nothing after this step
//!    reorders them.
//! 2. **Confidence layer** (margin). Anchor hits, neighbor resonance, and
//!    source type only move the margin, a single scalar describing how
//!    clearly the first result beats the second.
//!
//! # Scoring
//!
//! ```text
//! bm25      = Σ idf(t) · tf·(k1+1) / (tf + k1·(1 − b + b·len/avg_len))
//! coverage  = |query ∩ chunk| / |query|
//! proximity = 1 / min_span   (0 with fewer than two distinct matched terms)
//! score     = bm25 · (1 + coverage·0.5) · (1 + proximity·0.5) · editorial
//! ```
//!
//! # Margin
//!
//! ```text
//! raw     = (s0 − s1) / max(s0, ε) · 100
//! anchor  = anchor_weight · (hits0 − hits1)
//! nbr     = neighbor_weight · (res0 − res1)        (retrieve only)
//! type    = ±5 by canonical > standard > deprecated (retrieve only)
//! margin  = clamp(raw + anchor + nbr + type, 0.1, 100)
//! ```
//!
//! With one result the margin is `100.0`; with none it is `0.0`.

use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;

use crate::index::Index;
use crate::models::{ChunkRef, Confidence, ContentKind, SearchMode, SourceTag};
use crate::normalize::normalize;

const EPSILON: f64 = 1e-9;
const MARGIN_FLOOR: f64 = 0.1;
const MARGIN_CEILING: f64 = 100.0;
const TYPE_ADJUSTMENT: f64 = 5.0;
const CANONICAL_BOOST: f64 = 1.5;
const DEPRECATED_PENALTY: f64 = 0.5;
const SNIPPET_CHARS: usize = 240;

/// Ranking and confidence tuning, decoupled from application config.
#[derive(Debug, Clone)]
pub struct RankingParams {
    pub bm25_k1: f64,
    pub bm25_b: f64,
    /// Multiplier for chunks in caller-boosted groups (explore only).
    pub entity_boost: f64,
    pub anchor_weight: f64,
    pub neighbor_weight: f64,
    /// Positions on each side of a chunk consulted for neighbor resonance.
    pub neighbor_radius: usize,
}

impl Default for RankingParams {
    fn default() -> Self {
        Self {
            bm25_k1: 1.2,
            bm25_b: 0.75,
            entity_boost: 1.3,
            anchor_weight: 15.0,
            neighbor_weight: 10.0,
            neighbor_radius: 2,
        }
    }
}

/// Bundles all inputs for a single search invocation.
#[derive(Debug, Clone)]
pub struct SearchRequest<'a> {
    pub query: &'a str,
    /// Maximum number of deduplicated results.
    pub top_n: usize,
    pub mode: SearchMode,
    /// Only score chunks from these groups.
    pub group_filter: Option<&'a [String]>,
    /// Groups multiplied by `entity_boost` in explore mode.
    pub boosted_groups: &'a [String],
    /// If true, populate [`ScoreExplanation`] on each result.
    pub explain: bool,
}

impl<'a> SearchRequest<'a> {
    pub fn new(query: &'a str, top_n: usize) -> Self {
        Self {
            query,
            top_n,
            mode: SearchMode::Auto,
            group_filter: None,
            boosted_groups: &[],
            explain: false,
        }
    }

    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }
}

/// Ranked results plus the query-level margin.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    /// The mode actually applied (`auto` is resolved).
    pub mode: SearchMode,
    pub margin: f64,
    /// Number of chunks that matched before deduplication and truncation.
    pub total_matches: usize,
    pub results: Vec<SearchResultItem>,
}

impl SearchResponse {
    fn empty(mode: SearchMode) -> Self {
        Self {
            mode,
            margin: 0.0,
            total_matches: 0,
            results: Vec::new(),
        }
    }
}

/// A single deduplicated hit.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    #[serde(flatten)]
    pub chunk: ChunkRef,
    /// SPECTRA-layer score; results are sorted by it, descending.
    pub score: f64,
    pub matched_terms: Vec<String>,
    /// Query terms that are anchors of this chunk.
    pub anchor_hits: Vec<String>,
    /// Populated in retrieve mode only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub neighbor_resonance: Option<f64>,
    pub confidence: Confidence,
    /// Same-key hits folded into this result.
    pub siblings: usize,
    pub tag: SourceTag,
    pub kind: ContentKind,
    pub snippet: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

/// Scoring breakdown for a search result.
#[derive(Debug, Clone, Serialize)]
pub struct ScoreExplanation {
    pub bm25: f64,
    pub coverage: f64,
    pub proximity: f64,
    /// Product of explore-mode multipliers (1.0 in retrieve mode).
    pub editorial: f64,
}

/// The per-result inputs of the confidence layer.
#[derive(Debug, Clone, Copy)]
pub struct MarginCandidate {
    pub score: f64,
    pub anchor_hits: usize,
    pub neighbor_resonance: f64,
    pub tag: SourceTag,
}

struct Scored {
    index: usize,
    score: f64,
    matched: Vec<u32>,
    explain: ScoreExplanation,
}

/// Score, rank, deduplicate, and label chunks of `index` for `req`.
///
/// A query that normalizes to no terms, or an empty index, yields an empty
/// response with margin `0.0`.
pub fn search(index: &Index, req: &SearchRequest<'_>, params: &RankingParams) -> SearchResponse {
    let mode = req.mode.resolve(index.scope().origin);

    let query_terms = unique_terms(req.query);
    if query_terms.is_empty() || index.is_empty() || req.top_n == 0 {
        return SearchResponse::empty(mode);
    }
    let qs = query_terms.len().max(1) as f64;
    let query_ids: Vec<u32> = query_terms
        .iter()
        .filter_map(|t| index.term_id(t))
        .collect();

    let mut scored: Vec<Scored> = (0..index.len())
        .filter(|&i| match req.group_filter {
            Some(groups) => groups.iter().any(|g| *g == index.chunk(i).group),
            None => true,
        })
        .filter_map(|i| score_chunk(index, i, &query_ids, qs, mode, req, params))
        .collect();

    // Primary ranking. Every later step preserves this order.
    scored.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });
    let total_matches = scored.len();

    let mut visible: Vec<(Scored, usize)> = Vec::new();
    let mut slot_of: HashMap<(&str, &str, Option<&str>), usize> = HashMap::new();
    for s in scored {
        let chunk = index.chunk(s.index);
        let key = (
            chunk.group.as_str(),
            chunk.subgroup.as_str(),
            chunk.heading.as_deref(),
        );
        match slot_of.get(&key) {
            Some(&slot) => visible[slot].1 += 1,
            None => {
                slot_of.insert(key, visible.len());
                visible.push((s, 0));
            }
        }
    }
    visible.truncate(req.top_n);

    let mut results: Vec<SearchResultItem> = visible
        .into_iter()
        .map(|(s, siblings)| {
            let chunk = index.chunk(s.index);
            let anchor_hits = query_ids
                .iter()
                .filter(|&&t| index.anchors(s.index).contains(t))
                .map(|&t| index.term(t).to_string())
                .collect();
            let neighbor_resonance = (mode == SearchMode::Retrieve).then(|| {
                neighbor_resonance(index, s.index, &query_ids, qs, params.neighbor_radius)
            });
            SearchResultItem {
                chunk: ChunkRef::of(s.index, chunk),
                score: s.score,
                matched_terms: s.matched.iter().map(|&t| index.term(t).to_string()).collect(),
                anchor_hits,
                neighbor_resonance,
                confidence: Confidence::Low,
                siblings,
                tag: chunk.tag,
                kind: chunk.kind,
                snippet: chunk.text.chars().take(SNIPPET_CHARS).collect(),
                explain: req.explain.then_some(s.explain),
            }
        })
        .collect();

    let candidates: Vec<MarginCandidate> = results
        .iter()
        .take(2)
        .map(|r| MarginCandidate {
            score: r.score,
            anchor_hits: r.anchor_hits.len(),
            neighbor_resonance: r.neighbor_resonance.unwrap_or(0.0),
            tag: r.tag,
        })
        .collect();
    let margin = compute_margin(&candidates, mode, params);

    apply_labels(&mut results, mode, margin);

    SearchResponse {
        mode,
        margin,
        total_matches,
        results,
    }
}

/// Normalized query terms, first occurrence order, duplicates removed.
fn unique_terms(query: &str) -> Vec<String> {
    let mut seen = Vec::new();
    for term in normalize(query) {
        if !seen.contains(&term) {
            seen.push(term);
        }
    }
    seen
}

fn score_chunk(
    index: &Index,
    i: usize,
    query_ids: &[u32],
    qs: f64,
    mode: SearchMode,
    req: &SearchRequest<'_>,
    params: &RankingParams,
) -> Option<Scored> {
    let counts = index.term_counts(i);
    let matched: Vec<u32> = query_ids
        .iter()
        .copied()
        .filter(|t| counts.contains_key(t))
        .collect();
    if matched.is_empty() {
        return None;
    }

    let len = index.sequence(i).len() as f64;
    let avg_len = index.avg_len().max(EPSILON);
    let norm = params.bm25_k1 * (1.0 - params.bm25_b + params.bm25_b * len / avg_len);
    let bm25: f64 = matched
        .iter()
        .map(|&t| {
            let tf = counts[&t] as f64;
            index.idf_of(t) * tf * (params.bm25_k1 + 1.0) / (tf + norm)
        })
        .sum();

    let coverage = matched.len() as f64 / qs;
    let proximity = match min_span(index.sequence(i), &matched) {
        Some(span) => 1.0 / span as f64,
        None => 0.0,
    };

    let chunk = index.chunk(i);
    let mut editorial = 1.0;
    if mode == SearchMode::Explore {
        match chunk.tag {
            SourceTag::Canonical => editorial *= CANONICAL_BOOST,
            SourceTag::Deprecated => editorial *= DEPRECATED_PENALTY,
            SourceTag::Standard => {}
        }
        if req.boosted_groups.iter().any(|g| *g == chunk.group) {
            editorial *= params.entity_boost;
        }
    }

    let score = bm25 * (1.0 + coverage * 0.5) * (1.0 + proximity * 0.5) * editorial;
    Some(Scored {
        index: i,
        score,
        matched,
        explain: ScoreExplanation {
            bm25,
            coverage,
            proximity,
            editorial,
        },
    })
}

/// Smallest position distance between two different matched terms.
///
/// `None` when fewer than two distinct terms occur in `sequence`. The
/// closest such pair is always adjacent among the matched positions, so a
/// single pass suffices.
pub fn min_span(sequence: &[u32], matched: &[u32]) -> Option<usize> {
    let mut best: Option<usize> = None;
    let mut prev: Option<(usize, u32)> = None;
    for (pos, &term) in sequence.iter().enumerate() {
        if !matched.contains(&term) {
            continue;
        }
        if let Some((prev_pos, prev_term)) = prev {
            if prev_term != term {
                let span = pos - prev_pos;
                best = Some(best.map_or(span, |b| b.min(span)));
            }
        }
        prev = Some((pos, term));
    }
    best
}

/// Mean query coverage of the chunks around `i` in the same source.
fn neighbor_resonance(index: &Index, i: usize, query_ids: &[u32], qs: f64, radius: usize) -> f64 {
    let neighbors: Vec<usize> = index
        .neighbors(i, radius)
        .iter()
        .copied()
        .filter(|&j| j != i)
        .collect();
    if neighbors.is_empty() {
        return 0.0;
    }
    let total: f64 = neighbors
        .iter()
        .map(|&j| {
            let hits = query_ids
                .iter()
                .filter(|&&t| index.contains_term(j, t))
                .count();
            hits as f64 / qs
        })
        .sum();
    total / neighbors.len() as f64
}

/// Confidence gap between the top two candidates.
///
/// `candidates` holds at most the first two results in ranked order.
pub fn compute_margin(candidates: &[MarginCandidate], mode: SearchMode, params: &RankingParams) -> f64 {
    let (first, second) = match candidates {
        [] => return 0.0,
        [_] => return MARGIN_CEILING,
        [first, second, ..] => (first, second),
    };

    let raw = (first.score - second.score) / first.score.max(EPSILON) * 100.0;
    let anchor_adj =
        params.anchor_weight * (first.anchor_hits as f64 - second.anchor_hits as f64);

    let mut margin = raw + anchor_adj;
    if mode == SearchMode::Retrieve {
        margin += params.neighbor_weight * (first.neighbor_resonance - second.neighbor_resonance);
        margin += match first.tag.rank().cmp(&second.tag.rank()) {
            Ordering::Greater => TYPE_ADJUSTMENT,
            Ordering::Less => -TYPE_ADJUSTMENT,
            Ordering::Equal => 0.0,
        };
    }
    margin.clamp(MARGIN_FLOOR, MARGIN_CEILING)
}

/// Retrieve mode label, shared by every result of a query.
pub fn margin_label(margin: f64) -> Confidence {
    if margin > 50.0 {
        Confidence::High
    } else if margin > 15.0 {
        Confidence::Med
    } else {
        Confidence::Low
    }
}

/// Explore mode label from a result's score relative to the top score.
pub fn ratio_label(ratio: f64) -> Confidence {
    if ratio >= 0.7 {
        Confidence::High
    } else if ratio >= 0.35 {
        Confidence::Med
    } else {
        Confidence::Low
    }
}

fn apply_labels(results: &mut [SearchResultItem], mode: SearchMode, margin: f64) {
    match mode {
        SearchMode::Explore => {
            let top = results.first().map_or(0.0, |r| r.score);
            for r in results.iter_mut() {
                let ratio = if top <= 0.0 { 1.0 } else { r.score / top };
                r.confidence = ratio_label(ratio);
            }
        }
        _ => {
            let label = margin_label(margin);
            for r in results.iter_mut() {
                r.confidence = label;
            }
        }
    }
}
