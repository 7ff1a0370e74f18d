//! Corpus maintenance analyses.
//!
//! Read-only reports over an [`Index`]: near-duplicate pairs, isolated
//! (orphaned) chunks, seed-to-root coverage for a group, and vocabulary
//! overlap between groups. The first three use the same cosine-similarity
//! primitive as confuser selection.

use rayon::prelude::*;
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};

use crate::error::{EngineError, Result};
use crate::index::Index;
use crate::models::{ChunkRef, ContentKind};

/// Two chunks from different sources whose similarity meets the threshold.
#[derive(Debug, Clone, Serialize)]
pub struct DuplicatePair {
    pub a: ChunkRef,
    pub b: ChunkRef,
    pub similarity: f64,
}

/// A chunk with no close neighbor anywhere in the index.
#[derive(Debug, Clone, Serialize)]
pub struct OrphanChunk {
    #[serde(flatten)]
    pub chunk: ChunkRef,
    pub max_similarity: f64,
    /// The most similar other chunk, if any exists.
    pub nearest: Option<ChunkRef>,
    pub kind: ContentKind,
}

#[derive(Debug, Clone, Serialize)]
pub struct SeedCoverage {
    #[serde(flatten)]
    pub chunk: ChunkRef,
    /// Best similarity to any root chunk of the group.
    pub best_similarity: f64,
    pub best_root: Option<ChunkRef>,
    pub weak: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CoverageReport {
    pub group: String,
    pub roots: usize,
    pub seeds: Vec<SeedCoverage>,
    pub average: f64,
    pub weak_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupPair {
    pub a: String,
    pub b: String,
    /// Jaccard similarity of the two groups' vocabularies.
    pub similarity: f64,
}

/// Chunk pairs from different sources with similarity `>= threshold`.
///
/// With `exclude_shared_names`, pairs whose files share a name across
/// different groups (template content such as a per-group `README.md`) are
/// skipped. Sorted by similarity descending, capped at `top_n`.
pub fn find_duplicates(
    index: &Index,
    threshold: f64,
    top_n: usize,
    exclude_shared_names: bool,
) -> Vec<DuplicatePair> {
    let mut pairs: Vec<(usize, usize, f64)> = (0..index.len())
        .into_par_iter()
        .flat_map_iter(|i| {
            ((i + 1)..index.len()).filter_map(move |j| {
                let (a, b) = (index.chunk(i), index.chunk(j));
                if a.source_key() == b.source_key() {
                    return None;
                }
                if exclude_shared_names && a.group != b.group && a.file_name() == b.file_name() {
                    return None;
                }
                let sim = index.similarity(i, j);
                (sim >= threshold).then_some((i, j, sim))
            })
        })
        .collect();

    pairs.sort_by(|x, y| {
        y.2.partial_cmp(&x.2)
            .unwrap_or(Ordering::Equal)
            .then((x.0, x.1).cmp(&(y.0, y.1)))
    });
    pairs.truncate(top_n);

    pairs
        .into_iter()
        .map(|(i, j, similarity)| DuplicatePair {
            a: ChunkRef::of(i, index.chunk(i)),
            b: ChunkRef::of(j, index.chunk(j)),
            similarity,
        })
        .collect()
}

/// Chunks whose best similarity to any other chunk is `<= threshold`.
///
/// Most isolated first, capped at `top_n`.
pub fn find_orphans(index: &Index, threshold: f64, top_n: usize) -> Vec<OrphanChunk> {
    let mut orphans: Vec<(usize, f64, Option<usize>)> = (0..index.len())
        .into_par_iter()
        .filter_map(|i| {
            let (nearest, max_sim) = nearest_neighbor(index, i);
            (max_sim <= threshold).then_some((i, max_sim, nearest))
        })
        .collect();

    orphans.sort_by(|x, y| {
        x.1.partial_cmp(&y.1)
            .unwrap_or(Ordering::Equal)
            .then(x.0.cmp(&y.0))
    });
    orphans.truncate(top_n);

    orphans
        .into_iter()
        .map(|(i, max_similarity, nearest)| OrphanChunk {
            chunk: ChunkRef::of(i, index.chunk(i)),
            max_similarity,
            nearest: nearest.map(|j| ChunkRef::of(j, index.chunk(j))),
            kind: index.chunk(i).kind,
        })
        .collect()
}

/// The most similar other chunk and its similarity (`0.0` when alone).
fn nearest_neighbor(index: &Index, i: usize) -> (Option<usize>, f64) {
    let mut best: (Option<usize>, f64) = (None, 0.0);
    for j in (0..index.len()).filter(|&j| j != i) {
        let sim = index.similarity(i, j);
        if best.0.is_none() || sim > best.1 {
            best = (Some(j), sim);
        }
    }
    best
}

/// How well each seed chunk of `group` is reached by the group's root chunks.
///
/// Errors with [`EngineError::NotFound`] if the index has no chunk in
/// `group`. A group lacking roots or seeds yields a report with a note.
pub fn coverage(index: &Index, group: &str, weak_threshold: f64) -> Result<CoverageReport> {
    let members: Vec<usize> = (0..index.len())
        .filter(|&i| index.chunk(i).group == group)
        .collect();
    if members.is_empty() {
        return Err(EngineError::NotFound(format!("group '{}' is not indexed", group)));
    }

    let roots: Vec<usize> = members
        .iter()
        .copied()
        .filter(|&i| index.chunk(i).kind == ContentKind::Root)
        .collect();
    let seed_ids: Vec<usize> = members
        .iter()
        .copied()
        .filter(|&i| index.chunk(i).kind == ContentKind::Seed)
        .collect();

    let note = match (roots.is_empty(), seed_ids.is_empty()) {
        (true, _) => Some("no root chunks in group".to_string()),
        (false, true) => Some("no seed chunks in group".to_string()),
        _ => None,
    };
    if note.is_some() {
        return Ok(CoverageReport {
            group: group.to_string(),
            roots: roots.len(),
            seeds: Vec::new(),
            average: 0.0,
            weak_count: 0,
            note,
        });
    }

    let seeds: Vec<SeedCoverage> = seed_ids
        .iter()
        .map(|&s| {
            let (best_root, best_similarity) = roots
                .iter()
                .map(|&r| (r, index.similarity(s, r)))
                .fold((None, 0.0), |best, (r, sim)| {
                    if best.0.is_none() || sim > best.1 {
                        (Some(r), sim)
                    } else {
                        best
                    }
                });
            SeedCoverage {
                chunk: ChunkRef::of(s, index.chunk(s)),
                best_similarity,
                best_root: best_root.map(|r| ChunkRef::of(r, index.chunk(r))),
                weak: best_similarity < weak_threshold,
            }
        })
        .collect();

    let average = seeds.iter().map(|s| s.best_similarity).sum::<f64>() / seeds.len() as f64;
    let weak_count = seeds.iter().filter(|s| s.weak).count();

    Ok(CoverageReport {
        group: group.to_string(),
        roots: roots.len(),
        seeds,
        average,
        weak_count,
        note: None,
    })
}

/// Jaccard similarity of combined vocabularies for every pair of groups.
pub fn group_similarity(index: &Index) -> Vec<GroupPair> {
    let mut vocab: BTreeMap<&str, HashSet<u32>> = BTreeMap::new();
    for i in 0..index.len() {
        vocab
            .entry(index.chunk(i).group.as_str())
            .or_default()
            .extend(index.term_counts(i).keys().copied());
    }

    let groups: Vec<(&str, HashSet<u32>)> = vocab.into_iter().collect();
    let mut pairs = Vec::new();
    for (x, (name_a, terms_a)) in groups.iter().enumerate() {
        for (name_b, terms_b) in &groups[x + 1..] {
            let union = terms_a.union(terms_b).count();
            let similarity = if union == 0 {
                0.0
            } else {
                terms_a.intersection(terms_b).count() as f64 / union as f64
            };
            pairs.push(GroupPair {
                a: name_a.to_string(),
                b: name_b.to_string(),
                similarity,
            });
        }
    }

    pairs.sort_by(|x, y| {
        y.similarity
            .partial_cmp(&x.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| (&x.a, &x.b).cmp(&(&y.a, &y.b)))
    });
    pairs
}
