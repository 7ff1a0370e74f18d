//! Sparse IDF-weighted term vectors and the cosine-similarity primitive.
//!
//! The anchor engine (confuser selection) and every maintenance analysis
//! compare chunks through [`SparseVector::cosine`], so they agree on what
//! "similar" means.

use std::collections::HashMap;

/// A unit-length sparse vector keyed by term id, sorted by id.
///
/// Vectors are normalized at construction, so cosine similarity reduces to a
/// dot product. A chunk with no weighted terms gets an empty vector whose
/// similarity to anything is `0.0`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SparseVector {
    entries: Vec<(u32, f64)>,
}

impl SparseVector {
    /// Build from raw term frequencies, weighting each term by its IDF.
    ///
    /// Terms with zero IDF (present in every chunk) carry no weight and are
    /// omitted.
    pub fn from_counts(counts: &HashMap<u32, usize>, idf: &[f64]) -> Self {
        let mut entries: Vec<(u32, f64)> = counts
            .iter()
            .filter_map(|(&term, &tf)| {
                let weight = tf as f64 * idf[term as usize];
                (weight > 0.0).then_some((term, weight))
            })
            .collect();
        entries.sort_by_key(|(term, _)| *term);

        let norm = entries.iter().map(|(_, w)| w * w).sum::<f64>().sqrt();
        if norm < f64::EPSILON {
            return Self::default();
        }
        for (_, w) in &mut entries {
            *w /= norm;
        }
        Self { entries }
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cosine similarity in `[0.0, 1.0]` (weights are non-negative).
    pub fn cosine(&self, other: &SparseVector) -> f64 {
        let (a, b) = (&self.entries, &other.entries);
        let (mut i, mut j) = (0, 0);
        let mut dot = 0.0;
        while i < a.len() && j < b.len() {
            match a[i].0.cmp(&b[j].0) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    dot += a[i].1 * b[j].1;
                    i += 1;
                    j += 1;
                }
            }
        }
        dot.clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn counts(pairs: &[(u32, usize)]) -> HashMap<u32, usize> {
        pairs.iter().copied().collect()
    }

    #[test]
    fn test_identical_vectors_have_similarity_one() {
        let idf = vec![1.0, 2.0, 0.5];
        let v = SparseVector::from_counts(&counts(&[(0, 1), (1, 3)]), &idf);
        assert!((v.cosine(&v) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_disjoint_vectors_have_similarity_zero() {
        let idf = vec![1.0, 1.0, 1.0, 1.0];
        let a = SparseVector::from_counts(&counts(&[(0, 1), (1, 1)]), &idf);
        let b = SparseVector::from_counts(&counts(&[(2, 1), (3, 1)]), &idf);
        assert_eq!(a.cosine(&b), 0.0);
    }

    #[test]
    fn test_zero_idf_terms_dropped() {
        let idf = vec![0.0, 1.0];
        let a = SparseVector::from_counts(&counts(&[(0, 5)]), &idf);
        assert!(a.is_empty());
        let b = SparseVector::from_counts(&counts(&[(0, 5), (1, 1)]), &idf);
        assert_eq!(a.cosine(&b), 0.0);
    }

    #[test]
    fn test_partial_overlap_between_zero_and_one() {
        let idf = vec![1.0, 1.0, 1.0];
        let a = SparseVector::from_counts(&counts(&[(0, 1), (1, 1)]), &idf);
        let b = SparseVector::from_counts(&counts(&[(1, 1), (2, 1)]), &idf);
        let sim = a.cosine(&b);
        assert!((sim - 0.5).abs() < 1e-9, "got {}", sim);
    }
}
