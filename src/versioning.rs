//! Version-control decision logic.
//!
//! On re-ingestion under an existing identity, the new embedding is
//! compared to the stored one and the outcome decides whether the document
//! is reprocessed. The unchanged interval is closed: similarity exactly at
//! the threshold classifies as unchanged. When either embedding is
//! unavailable equivalence cannot be proven, so the engine errs toward
//! preserving history and commits a new version.

use crate::embedding::compare;

/// Outcome of comparing a fresh ingestion against stored state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum VersionDecision {
    /// No prior version exists; commit version 1.
    FirstVersion,
    /// Content is within the threshold of the stored version; skip
    /// reprocessing and leave the counter untouched.
    Unchanged { similarity: f32 },
    /// Content materially changed (or equivalence could not be
    /// determined); snapshot the prior state and commit a new version.
    Changed { similarity: Option<f32> },
}

/// Decide how a re-ingestion resolves.
///
/// `stored` is the embedding currently on the document (absent when the
/// prior ingestion was degraded); `fresh` is the newly computed one.
pub fn decide(
    has_prior_version: bool,
    stored: Option<&[f32]>,
    fresh: Option<&[f32]>,
    threshold: f32,
) -> VersionDecision {
    if !has_prior_version {
        return VersionDecision::FirstVersion;
    }

    match compare(stored, fresh) {
        Some(similarity) if similarity >= threshold => VersionDecision::Unchanged { similarity },
        Some(similarity) => VersionDecision::Changed {
            similarity: Some(similarity),
        },
        None => VersionDecision::Changed { similarity: None },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const THRESHOLD: f32 = 0.95;
    const EPS: f32 = 1e-4;

    /// Build a unit vector whose cosine against the x axis is exactly `c`.
    fn vector_with_cosine(c: f32) -> Vec<f32> {
        vec![c, (1.0 - c * c).sqrt()]
    }

    #[test]
    fn first_ingestion_always_commits() {
        assert_eq!(
            decide(false, None, None, THRESHOLD),
            VersionDecision::FirstVersion
        );
    }

    #[test]
    fn similarity_at_threshold_is_unchanged() {
        let a = vec![1.0f32, 0.0];
        let b = vector_with_cosine(THRESHOLD);
        match decide(true, Some(&a), Some(&b), THRESHOLD) {
            VersionDecision::Unchanged { similarity } => {
                assert!((similarity - THRESHOLD).abs() < EPS)
            }
            other => panic!("expected Unchanged, got {:?}", other),
        }
    }

    #[test]
    fn similarity_just_below_threshold_is_changed() {
        let a = vec![1.0f32, 0.0];
        let b = vector_with_cosine(THRESHOLD - EPS * 10.0);
        assert!(matches!(
            decide(true, Some(&a), Some(&b), THRESHOLD),
            VersionDecision::Changed { similarity: Some(_) }
        ));
    }

    #[test]
    fn similarity_just_above_threshold_is_unchanged() {
        let a = vec![1.0f32, 0.0];
        let b = vector_with_cosine(THRESHOLD + EPS * 10.0);
        assert!(matches!(
            decide(true, Some(&a), Some(&b), THRESHOLD),
            VersionDecision::Unchanged { .. }
        ));
    }

    #[test]
    fn identical_vectors_are_unchanged() {
        let a = vec![0.3f32, -0.2, 0.9];
        assert!(matches!(
            decide(true, Some(&a), Some(&a), THRESHOLD),
            VersionDecision::Unchanged { .. }
        ));
    }

    #[test]
    fn unavailable_embedding_forces_changed() {
        let a = vec![1.0f32, 0.0];
        assert_eq!(
            decide(true, None, Some(&a), THRESHOLD),
            VersionDecision::Changed { similarity: None }
        );
        assert_eq!(
            decide(true, Some(&a), None, THRESHOLD),
            VersionDecision::Changed { similarity: None }
        );
        assert_eq!(
            decide(true, None, None, THRESHOLD),
            VersionDecision::Changed { similarity: None }
        );
    }
}
