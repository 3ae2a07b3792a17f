//! Descriptor similarity and gallery matching.

use crate::types::{Descriptor, EnrollmentRecord, MatchDecision};
use thiserror::Error;

/// Similarity a candidate must strictly exceed to be accepted.
pub const DEFAULT_THRESHOLD: f32 = 0.6;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MatchError {
    #[error("descriptor dimension mismatch: probe has {probe}, enrolled has {enrolled}")]
    DimensionMismatch { probe: usize, enrolled: usize },
}

/// Similarity in [0, 1] derived from Euclidean distance.
///
/// The distance is clamped to 1 before inversion, so identical descriptors
/// score 1 and anything at distance 1 or more scores 0. This is piecewise
/// linear in the distance, not a cosine score.
pub fn similarity(a: &Descriptor, b: &Descriptor) -> Result<f32, MatchError> {
    if a.dim() != b.dim() {
        return Err(MatchError::DimensionMismatch {
            probe: a.dim(),
            enrolled: b.dim(),
        });
    }

    // NaN distances collapse to 1 here (f32::min ignores NaN) and score 0.
    let distance = a.euclidean_distance(b);
    Ok(1.0 - distance.min(1.0))
}

/// Strategy for comparing a probe descriptor against a gallery of enrolled faces.
pub trait Matcher {
    fn identify(
        &self,
        probe: &Descriptor,
        gallery: &[EnrollmentRecord],
        threshold: f32,
    ) -> Result<MatchDecision, MatchError>;
}

/// Linear-scan matcher over Euclidean similarity.
///
/// Visits every gallery entry. A candidate replaces the current best only
/// when its similarity is strictly greater than both the threshold and the
/// best so far, so ties keep the earliest entry. Records without a
/// descriptor are skipped.
///
/// Cost is O(gallery × dimension); fine for tens to low thousands of
/// identities, beyond that an ANN index would be needed.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn identify(
        &self,
        probe: &Descriptor,
        gallery: &[EnrollmentRecord],
        threshold: f32,
    ) -> Result<MatchDecision, MatchError> {
        let mut best_sim = 0.0f32;
        let mut best_idx: Option<usize> = None;
        let mut best_seen = 0.0f32;

        for (i, record) in gallery.iter().enumerate() {
            let Some(enrolled) = record.descriptor.as_ref() else {
                continue;
            };
            let sim = similarity(probe, enrolled)?;
            best_seen = best_seen.max(sim);

            if sim > threshold && sim > best_sim {
                best_sim = sim;
                best_idx = Some(i);
            }
        }

        Ok(match best_idx {
            Some(idx) => MatchDecision {
                identity: Some(gallery[idx].identity.clone()),
                similarity: best_sim,
            },
            None => MatchDecision {
                identity: None,
                similarity: best_seen,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn desc(values: &[f32]) -> Descriptor {
        Descriptor::new(values.to_vec())
    }

    fn record(id: &str, values: &[f32]) -> EnrollmentRecord {
        EnrollmentRecord::new(id, desc(values))
    }

    #[test]
    fn test_similarity_self_is_perfect() {
        let a = desc(&[0.12, -0.4, 0.33, 0.9]);
        assert_eq!(similarity(&a, &a).unwrap(), 1.0);
    }

    #[test]
    fn test_similarity_symmetric() {
        let a = desc(&[0.1, 0.2, 0.3]);
        let b = desc(&[0.15, 0.05, 0.42]);
        assert_eq!(similarity(&a, &b).unwrap(), similarity(&b, &a).unwrap());
    }

    #[test]
    fn test_similarity_linear_below_unit_distance() {
        let a = desc(&[0.0, 0.0]);
        let b = desc(&[0.3, 0.4]);
        // distance 0.5
        assert!((similarity(&a, &b).unwrap() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_similarity_zero_at_or_beyond_unit_distance() {
        let origin = desc(&[0.0, 0.0, 0.0]);
        assert_eq!(similarity(&origin, &desc(&[1.0, 0.0, 0.0])).unwrap(), 0.0);
        assert_eq!(similarity(&origin, &desc(&[1.0, 1.0, 1.0])).unwrap(), 0.0);
        assert_eq!(similarity(&origin, &desc(&[50.0, -3.0, 7.0])).unwrap(), 0.0);
    }

    #[test]
    fn test_similarity_dimension_mismatch() {
        let err = similarity(&desc(&[0.0; 128]), &desc(&[0.0; 64])).unwrap_err();
        assert_eq!(
            err,
            MatchError::DimensionMismatch {
                probe: 128,
                enrolled: 64
            }
        );
    }

    #[test]
    fn test_similarity_nan_scores_zero() {
        let a = desc(&[f32::NAN, 0.0]);
        let b = desc(&[0.0, 0.0]);
        assert_eq!(similarity(&a, &b).unwrap(), 0.0);
    }

    #[test]
    fn test_identify_empty_gallery() {
        let decision = EuclideanMatcher
            .identify(&desc(&[0.0, 0.0]), &[], DEFAULT_THRESHOLD)
            .unwrap();
        assert!(!decision.matched());
        assert_eq!(decision.similarity, 0.0);
    }

    #[test]
    fn test_identify_exact_match() {
        let gallery = vec![record("alice", &[0.0, 0.0, 0.0])];
        let decision = EuclideanMatcher
            .identify(&desc(&[0.0, 0.0, 0.0]), &gallery, DEFAULT_THRESHOLD)
            .unwrap();
        assert_eq!(decision.identity.as_deref(), Some("alice"));
        assert_eq!(decision.similarity, 1.0);
    }

    #[test]
    fn test_identify_far_probe_no_match() {
        let gallery = vec![record("alice", &[0.0, 0.0, 0.0])];
        let decision = EuclideanMatcher
            .identify(&desc(&[1.0, 1.0, 1.0]), &gallery, DEFAULT_THRESHOLD)
            .unwrap();
        assert!(!decision.matched());
        assert_eq!(decision.similarity, 0.0);
    }

    #[test]
    fn test_identify_scans_whole_gallery() {
        // Best candidate is last; the middle one also clears the threshold.
        let gallery = vec![
            record("far", &[0.9, 0.0]),
            record("close", &[0.3, 0.0]),
            record("closest", &[0.1, 0.0]),
        ];
        let decision = EuclideanMatcher
            .identify(&desc(&[0.0, 0.0]), &gallery, 0.5)
            .unwrap();
        assert_eq!(decision.identity.as_deref(), Some("closest"));
        assert!((decision.similarity - 0.9).abs() < 1e-6);
    }

    #[test]
    fn test_identify_single_candidate_above_threshold() {
        let gallery = vec![
            record("stranger", &[0.8, 0.0]),
            record("owner", &[0.2, 0.0]),
            record("other", &[0.0, 0.9]),
        ];
        let decision = EuclideanMatcher
            .identify(&desc(&[0.0, 0.0]), &gallery, DEFAULT_THRESHOLD)
            .unwrap();
        assert_eq!(decision.identity.as_deref(), Some("owner"));
    }

    #[test]
    fn test_identify_threshold_is_strict() {
        // distance 0.4 → similarity 0.6, which must not be accepted at 0.6
        let gallery = vec![record("edge", &[0.0, 0.4])];
        let probe = desc(&[0.0, 0.0]);
        let sim = similarity(&probe, &gallery[0].descriptor.clone().unwrap()).unwrap();
        let decision = EuclideanMatcher.identify(&probe, &gallery, sim).unwrap();
        assert!(!decision.matched());
        assert_eq!(decision.similarity, sim);
    }

    #[test]
    fn test_identify_tie_keeps_first_seen() {
        let gallery = vec![
            record("first", &[0.1, 0.0]),
            record("second", &[0.0, 0.1]),
            record("third", &[-0.1, 0.0]),
        ];
        let decision = EuclideanMatcher
            .identify(&desc(&[0.0, 0.0]), &gallery, DEFAULT_THRESHOLD)
            .unwrap();
        assert_eq!(decision.identity.as_deref(), Some("first"));
    }

    #[test]
    fn test_identify_skips_absent_descriptors() {
        let gallery = vec![
            EnrollmentRecord::new("password-only", None),
            record("face", &[0.0, 0.1]),
        ];
        let decision = EuclideanMatcher
            .identify(&desc(&[0.0, 0.0]), &gallery, DEFAULT_THRESHOLD)
            .unwrap();
        assert_eq!(decision.identity.as_deref(), Some("face"));
    }

    #[test]
    fn test_identify_dimension_mismatch_is_error() {
        let gallery = vec![record("a", &[0.0, 0.0]), record("b", &[0.0, 0.0, 0.0])];
        let err = EuclideanMatcher
            .identify(&desc(&[0.0, 0.0]), &gallery, DEFAULT_THRESHOLD)
            .unwrap_err();
        assert!(matches!(err, MatchError::DimensionMismatch { probe: 2, enrolled: 3 }));
    }
}
