//! Statistical index over a chunk collection.
//!
//! An [`Index`] is an immutable snapshot: it is built in full from a chunk
//! list and never mutated afterwards. The engine replaces the current index
//! by swapping in a freshly built one.
//!
//! # Build steps
//!
//! 1. Normalize each chunk's searchable text (heading, file stem, body).
//! 2. Assign term ids and count document frequency (chunks containing the
//!    term at least once).
//! 3. `idf(term) = ln(N / df)`; terms absent from the corpus score `0.0`.
//! 4. Keep per-chunk term sequences (for term frequency and proximity) and
//!    IDF-weighted unit vectors (for similarity).
//! 5. Compute contrastive anchors (see [`crate::anchors`]).

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::anchors::{self, AnchorSet, AnchorStrategy};
use crate::models::{Chunk, ScopeDescriptor};
use crate::normalize::normalize;
use crate::vector::SparseVector;

/// Tuning knobs for index construction.
#[derive(Debug, Clone)]
pub struct IndexSettings {
    /// Anchors kept per chunk.
    pub anchor_k: usize,
    /// Nearest neighbors consulted when scoring anchors.
    pub confuser_k: usize,
    /// Above this many chunks, anchors fall back to top-IDF terms.
    pub anchor_fallback_threshold: usize,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            anchor_k: 5,
            confuser_k: 4,
            anchor_fallback_threshold: 500,
        }
    }
}

/// Summary of a completed build, returned by reindex operations.
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub chunks: usize,
    pub groups: usize,
    pub vocabulary: usize,
    pub duration_ms: u64,
    pub anchor_strategy: AnchorStrategy,
    pub built_at: DateTime<Utc>,
}

/// Read-only retrieval index. See the module docs for how it is built.
#[derive(Debug)]
pub struct Index {
    chunks: Vec<Chunk>,
    vocabulary: Vec<String>,
    term_ids: HashMap<String, u32>,
    /// Per-chunk term id sequence, in text order.
    sequences: Vec<Vec<u32>>,
    /// Per-chunk term frequencies.
    counts: Vec<HashMap<u32, usize>>,
    df: Vec<usize>,
    idf: Vec<f64>,
    avg_len: f64,
    vectors: Vec<SparseVector>,
    anchors: Vec<AnchorSet>,
    anchor_strategy: AnchorStrategy,
    /// Chunk indices of each `(group, subgroup)` source, ordered by position.
    sources: Vec<Vec<usize>>,
    /// For each chunk: (source slot, offset within that source).
    source_slot: Vec<(usize, usize)>,
    scope: ScopeDescriptor,
    built_at: DateTime<Utc>,
    build_duration: Duration,
}

impl Index {
    /// An index with no chunks, used until the first build completes.
    pub fn empty(scope: ScopeDescriptor) -> Self {
        Self::build(Vec::new(), scope, &IndexSettings::default())
    }

    /// Build a complete index from `chunks`.
    ///
    /// An empty chunk list yields a valid index with `N = 0`.
    pub fn build(chunks: Vec<Chunk>, scope: ScopeDescriptor, settings: &IndexSettings) -> Self {
        let started = Instant::now();

        let mut vocabulary: Vec<String> = Vec::new();
        let mut term_ids: HashMap<String, u32> = HashMap::new();
        let mut sequences: Vec<Vec<u32>> = Vec::with_capacity(chunks.len());

        for chunk in &chunks {
            let seq = normalize(&chunk.searchable_text())
                .into_iter()
                .map(|term| {
                    if let Some(&id) = term_ids.get(&term) {
                        return id;
                    }
                    let id = vocabulary.len() as u32;
                    vocabulary.push(term.clone());
                    term_ids.insert(term, id);
                    id
                })
                .collect();
            sequences.push(seq);
        }

        let mut df = vec![0usize; vocabulary.len()];
        let counts: Vec<HashMap<u32, usize>> = sequences
            .iter()
            .map(|seq| {
                let mut tf: HashMap<u32, usize> = HashMap::new();
                for &term in seq {
                    *tf.entry(term).or_default() += 1;
                }
                for &term in tf.keys() {
                    df[term as usize] += 1;
                }
                tf
            })
            .collect();

        let n = chunks.len() as f64;
        let idf: Vec<f64> = df
            .iter()
            .map(|&d| if d > 0 { (n / d as f64).ln() } else { 0.0 })
            .collect();

        let total_len: usize = sequences.iter().map(Vec::len).sum();
        let avg_len = if chunks.is_empty() {
            0.0
        } else {
            total_len as f64 / n
        };

        let vectors = counts
            .iter()
            .map(|tf| SparseVector::from_counts(tf, &idf))
            .collect();

        let (sources, source_slot) = group_sources(&chunks);

        let mut index = Index {
            chunks,
            vocabulary,
            term_ids,
            sequences,
            counts,
            df,
            idf,
            avg_len,
            vectors,
            anchors: Vec::new(),
            anchor_strategy: AnchorStrategy::Contrastive,
            sources,
            source_slot,
            scope,
            built_at: Utc::now(),
            build_duration: Duration::ZERO,
        };

        let (anchor_sets, strategy) = anchors::compute_anchors(&index, settings);
        index.anchors = anchor_sets;
        index.anchor_strategy = strategy;
        index.build_duration = started.elapsed();

        debug!(
            chunks = index.len(),
            vocabulary = index.vocabulary.len(),
            strategy = ?strategy,
            duration_ms = index.build_duration.as_millis() as u64,
            "index built"
        );

        index
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    pub fn chunks(&self) -> &[Chunk] {
        &self.chunks
    }

    pub fn chunk(&self, i: usize) -> &Chunk {
        &self.chunks[i]
    }

    pub fn vocabulary_size(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn term(&self, id: u32) -> &str {
        &self.vocabulary[id as usize]
    }

    pub fn term_id(&self, term: &str) -> Option<u32> {
        self.term_ids.get(term).copied()
    }

    /// Number of chunks containing `term`; `0` for unknown terms.
    pub fn df(&self, term: &str) -> usize {
        self.term_id(term).map_or(0, |id| self.df[id as usize])
    }

    /// `ln(N / df)`; `0.0` for terms absent from the corpus.
    pub fn idf(&self, term: &str) -> f64 {
        self.term_id(term).map_or(0.0, |id| self.idf[id as usize])
    }

    pub(crate) fn idf_of(&self, id: u32) -> f64 {
        self.idf[id as usize]
    }

    pub fn sequence(&self, i: usize) -> &[u32] {
        &self.sequences[i]
    }

    pub fn term_counts(&self, i: usize) -> &HashMap<u32, usize> {
        &self.counts[i]
    }

    pub fn contains_term(&self, i: usize, id: u32) -> bool {
        self.counts[i].contains_key(&id)
    }

    /// The chunk's normalized terms as strings, in text order.
    pub fn terms(&self, i: usize) -> Vec<&str> {
        self.sequences[i].iter().map(|&id| self.term(id)).collect()
    }

    pub fn avg_len(&self) -> f64 {
        self.avg_len
    }

    pub fn vector(&self, i: usize) -> &SparseVector {
        &self.vectors[i]
    }

    /// Cosine similarity between two chunks over IDF-weighted term vectors.
    pub fn similarity(&self, a: usize, b: usize) -> f64 {
        self.vectors[a].cosine(&self.vectors[b])
    }

    pub fn anchors(&self, i: usize) -> &AnchorSet {
        &self.anchors[i]
    }

    pub fn anchor_strategy(&self) -> AnchorStrategy {
        self.anchor_strategy
    }

    /// Chunks of the same source within `radius` positions of `i`, `i` included.
    pub fn neighbors(&self, i: usize, radius: usize) -> &[usize] {
        let (slot, offset) = self.source_slot[i];
        let members = &self.sources[slot];
        let lo = offset.saturating_sub(radius);
        let hi = (offset + radius + 1).min(members.len());
        &members[lo..hi]
    }

    /// Distinct groups present in the index, sorted.
    pub fn groups(&self) -> Vec<&str> {
        let set: BTreeSet<&str> = self.chunks.iter().map(|c| c.group.as_str()).collect();
        set.into_iter().collect()
    }

    pub fn scope(&self) -> &ScopeDescriptor {
        &self.scope
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn build_duration(&self) -> Duration {
        self.build_duration
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats {
            chunks: self.len(),
            groups: self.groups().len(),
            vocabulary: self.vocabulary_size(),
            duration_ms: self.build_duration.as_millis() as u64,
            anchor_strategy: self.anchor_strategy,
            built_at: self.built_at,
        }
    }
}

/// Bucket chunk indices by `(group, subgroup)` and order each bucket by position.
fn group_sources(chunks: &[Chunk]) -> (Vec<Vec<usize>>, Vec<(usize, usize)>) {
    let mut slots: HashMap<(&str, &str), usize> = HashMap::new();
    let mut sources: Vec<Vec<usize>> = Vec::new();
    for (i, chunk) in chunks.iter().enumerate() {
        let slot = *slots.entry(chunk.source_key()).or_insert_with(|| {
            sources.push(Vec::new());
            sources.len() - 1
        });
        sources[slot].push(i);
    }

    let mut source_slot = vec![(0, 0); chunks.len()];
    for (slot, members) in sources.iter_mut().enumerate() {
        members.sort_by_key(|&i| (chunks[i].position, i));
        for (offset, &i) in members.iter().enumerate() {
            source_slot[i] = (slot, offset);
        }
    }
    (sources, source_slot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Origin, ScopeMode};

    fn scope() -> ScopeDescriptor {
        ScopeDescriptor::new(vec!["a".into(), "b".into()], ScopeMode::All, Origin::Default)
    }

    #[test]
    fn test_empty_index_is_valid() {
        let index = Index::build(Vec::new(), scope(), &IndexSettings::default());
        assert_eq!(index.len(), 0);
        assert_eq!(index.vocabulary_size(), 0);
        assert_eq!(index.avg_len(), 0.0);
        assert_eq!(index.stats().groups, 0);
    }

    #[test]
    fn test_document_frequency_and_idf() {
        let chunks = vec![
            Chunk::new("a", "x", "rust cargo rust"),
            Chunk::new("b", "y", "rust python"),
        ];
        let index = Index::build(chunks, scope(), &IndexSettings::default());
        assert_eq!(index.df("rust"), 2);
        assert_eq!(index.df("cargo"), 1);
        assert_eq!(index.idf("rust"), 0.0);
        assert!((index.idf("cargo") - 2f64.ln()).abs() < 1e-12);
        assert_eq!(index.idf("missing"), 0.0);
        assert_eq!(index.df("missing"), 0);
    }

    #[test]
    fn test_sequences_keep_repeats_and_order() {
        let chunks = vec![Chunk::new("a", "x", "rust cargo rust")];
        let index = Index::build(chunks, scope(), &IndexSettings::default());
        // file stem "x" is too short to become a term
        assert_eq!(index.terms(0), vec!["rust", "cargo", "rust"]);
        let rust = index.term_id("rust").unwrap();
        assert_eq!(index.term_counts(0)[&rust], 2);
    }

    #[test]
    fn test_heading_and_file_stem_are_indexed() {
        let chunks = vec![Chunk::new("a", "notes/deployment.md", "body text").with_heading("Rollback")];
        let index = Index::build(chunks, scope(), &IndexSettings::default());
        assert_eq!(index.terms(0), vec!["rollback", "deploy", "body", "text"]);
    }

    #[test]
    fn test_neighbors_stay_within_source() {
        let chunks = vec![
            Chunk::new("a", "f.md", "one").with_position(0),
            Chunk::new("a", "f.md", "two").with_position(1),
            Chunk::new("a", "g.md", "other").with_position(0),
            Chunk::new("a", "f.md", "three").with_position(2),
        ];
        let index = Index::build(chunks, scope(), &IndexSettings::default());
        assert_eq!(index.neighbors(1, 1), &[0, 1, 3]);
        assert_eq!(index.neighbors(0, 1), &[0, 1]);
        assert_eq!(index.neighbors(2, 2), &[2]);
    }

    #[test]
    fn test_stats_report_groups_and_vocabulary() {
        let chunks = vec![
            Chunk::new("a", "x", "alpha beta"),
            Chunk::new("b", "y", "gamma delta"),
        ];
        let index = Index::build(chunks, scope(), &IndexSettings::default());
        let stats = index.stats();
        assert_eq!(stats.chunks, 2);
        assert_eq!(stats.groups, 2);
        assert_eq!(stats.vocabulary, 4);
    }
}
