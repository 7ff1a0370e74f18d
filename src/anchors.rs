//! Contrastive anchor engine.
//!
//! For each chunk, the anchors are the few terms that best separate it from
//! its nearest neighbors (its *confusers*). A term scores
//! `idf(term) × (1 − presence)`, where `presence` is the fraction of the
//! chunk's confusers that also contain the term. A rare term that none of
//! the confusers share is what lets a query reach this chunk rather than
//! the ones most easily mistaken for it.
//!
//! # Cost
//!
//! Confuser selection compares every chunk with every other chunk, which is
//! O(N²). Rows are independent and computed in parallel with rayon. Above
//! [`IndexSettings::anchor_fallback_threshold`] chunks the engine switches to
//! [`AnchorStrategy::TopIdf`]: each chunk's highest-IDF terms, with no
//! confuser contrast. That trades discrimination precision for an O(N·K)
//! build; it never leaves chunks without anchors.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;

use crate::index::{Index, IndexSettings};

/// How the anchors of an index were derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorStrategy {
    /// IDF contrasted against each chunk's confusers.
    Contrastive,
    /// Highest-IDF terms only; used above the fallback threshold.
    TopIdf,
}

/// Bounded term → contrastiveness mapping for one chunk, best first.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorSet {
    entries: Vec<(u32, f64)>,
}

impl AnchorSet {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, term: u32) -> bool {
        self.entries.iter().any(|(t, _)| *t == term)
    }

    /// `(term id, anchor score)` pairs, highest score first.
    pub fn entries(&self) -> &[(u32, f64)] {
        &self.entries
    }
}

/// Compute the anchor set of every chunk in `index`.
pub fn compute_anchors(index: &Index, settings: &IndexSettings) -> (Vec<AnchorSet>, AnchorStrategy) {
    if index.len() > settings.anchor_fallback_threshold {
        let sets = (0..index.len())
            .into_par_iter()
            .map(|i| top_idf_anchors(index, i, settings.anchor_k))
            .collect();
        return (sets, AnchorStrategy::TopIdf);
    }

    let sets = (0..index.len())
        .into_par_iter()
        .map(|i| {
            let confusers = confusers(index, i, settings.confuser_k);
            contrastive_anchors(index, i, &confusers, settings.anchor_k)
        })
        .collect();
    (sets, AnchorStrategy::Contrastive)
}

/// The `k` chunks most similar to `i`, excluding `i` itself.
///
/// Ties are broken by chunk index so the result is deterministic.
pub fn confusers(index: &Index, i: usize, k: usize) -> Vec<usize> {
    let mut scored: Vec<(usize, f64)> = (0..index.len())
        .filter(|&j| j != i)
        .map(|j| (j, index.similarity(i, j)))
        .collect();
    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then(a.0.cmp(&b.0))
    });
    scored.truncate(k);
    scored.into_iter().map(|(j, _)| j).collect()
}

fn contrastive_anchors(index: &Index, i: usize, confusers: &[usize], k: usize) -> AnchorSet {
    let scored = index.term_counts(i).keys().map(|&term| {
        let presence = if confusers.is_empty() {
            0.0
        } else {
            let shared = confusers
                .iter()
                .filter(|&&c| index.contains_term(c, term))
                .count();
            shared as f64 / confusers.len() as f64
        };
        (term, index.idf_of(term) * (1.0 - presence))
    });
    keep_top(index, scored, k)
}

fn top_idf_anchors(index: &Index, i: usize, k: usize) -> AnchorSet {
    let scored = index
        .term_counts(i)
        .keys()
        .map(|&term| (term, index.idf_of(term)));
    keep_top(index, scored, k)
}

/// Keep the `k` best positive scores; ties go to the lexicographically smaller term.
fn keep_top(index: &Index, scored: impl Iterator<Item = (u32, f64)>, k: usize) -> AnchorSet {
    let mut entries: Vec<(u32, f64)> = scored.filter(|(_, s)| *s > 0.0).collect();
    entries.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| index.term(a.0).cmp(index.term(b.0)))
    });
    entries.truncate(k);
    AnchorSet { entries }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Chunk, ScopeDescriptor};

    fn build(texts: &[&str], settings: &IndexSettings) -> Index {
        let chunks = texts
            .iter()
            .enumerate()
            .map(|(i, t)| Chunk::new("g", format!("c{}", i), *t))
            .collect();
        Index::build(chunks, ScopeDescriptor::empty(), settings)
    }

    fn anchor_terms(index: &Index, i: usize) -> Vec<&str> {
        index
            .anchors(i)
            .entries()
            .iter()
            .map(|(t, _)| index.term(*t))
            .collect()
    }

    #[test]
    fn test_confusers_are_most_similar_and_exclude_self() {
        let index = build(
            &[
                "kafka broker partition replica",
                "kafka broker partition leader",
                "kafka consumer offset",
                "garden tomato basil",
            ],
            &IndexSettings::default(),
        );
        let c = confusers(&index, 0, 2);
        assert_eq!(c.len(), 2);
        assert_eq!(c[0], 1);
        assert!(!c.contains(&0));
    }

    #[test]
    fn test_term_shared_with_confusers_ranks_below_unique_term() {
        // "replica" and "leader" each appear once in the corpus, but "broker"
        // appears in chunk 0's closest neighbor too.
        let settings = IndexSettings {
            anchor_k: 5,
            confuser_k: 1,
            anchor_fallback_threshold: 500,
        };
        let index = build(
            &[
                "broker replica",
                "broker leader",
                "tomato basil",
                "tomato pepper",
            ],
            &settings,
        );
        let anchors = anchor_terms(&index, 0);
        assert_eq!(anchors.first(), Some(&"replica"));
        assert!(!anchors.contains(&"broker"));
    }

    #[test]
    fn test_anchor_set_is_bounded() {
        let settings = IndexSettings {
            anchor_k: 2,
            ..IndexSettings::default()
        };
        let index = build(
            &["alpha bravo charlie delta echo", "foxtrot golf hotel"],
            &settings,
        );
        assert!(index.anchors(0).len() <= 2);
        assert_eq!(index.anchor_strategy(), AnchorStrategy::Contrastive);
    }

    #[test]
    fn test_fallback_above_threshold_still_produces_anchors() {
        let settings = IndexSettings {
            anchor_k: 3,
            confuser_k: 3,
            anchor_fallback_threshold: 2,
        };
        let index = build(
            &["alpha bravo", "charlie delta", "echo foxtrot"],
            &settings,
        );
        assert_eq!(index.anchor_strategy(), AnchorStrategy::TopIdf);
        for i in 0..index.len() {
            assert!(!index.anchors(i).is_empty());
        }
    }

    #[test]
    fn test_single_chunk_has_no_positive_anchors() {
        // With N = 1 every term has idf ln(1) = 0.
        let index = build(&["lonely words here"], &IndexSettings::default());
        assert!(index.anchors(0).is_empty());
    }
}
