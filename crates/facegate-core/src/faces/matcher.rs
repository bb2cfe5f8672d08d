use serde::Serialize;

use crate::faces::store::TemplateStore;

pub const UNKNOWN_IDENTITY: &str = "Unknown";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchDecision {
    pub identity: String,
    /// Smallest cosine distance seen, reported even when the identity is
    /// forced to `Unknown`.
    pub distance: f64,
}

impl MatchDecision {
    pub fn unknown(distance: f64) -> Self {
        Self {
            identity: UNKNOWN_IDENTITY.to_string(),
            distance,
        }
    }

    pub fn is_known(&self) -> bool {
        self.identity != UNKNOWN_IDENTITY
    }
}

/// Finds the enrolled identity closest to `probe`.
///
/// Identities are scanned in lexicographic order and only a strictly smaller
/// distance replaces the current best, so ties go to the first identity.
pub fn verify(probe: &[f64], store: &TemplateStore, threshold: f64) -> MatchDecision {
    let mut best_distance = f64::INFINITY;
    let mut best_identity: Option<&str> = None;

    for (identity, templates) in store.iter() {
        for template in templates {
            let distance = cosine_distance(probe, template);
            if distance < best_distance {
                best_distance = distance;
                best_identity = Some(identity);
            }
        }
    }

    match best_identity {
        Some(identity) if best_distance <= threshold => MatchDecision {
            identity: identity.to_string(),
            distance: best_distance,
        },
        _ => MatchDecision::unknown(best_distance),
    }
}

pub fn cosine_distance(lhs: &[f64], rhs: &[f64]) -> f64 {
    1.0 - cosine_similarity(lhs, rhs)
}

pub fn cosine_similarity(lhs: &[f64], rhs: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_lhs = 0.0;
    let mut norm_rhs = 0.0;

    for (l, r) in lhs.iter().zip(rhs.iter()) {
        dot += l * r;
        norm_lhs += l * l;
        norm_rhs += r * r;
    }

    let denominator = norm_lhs.sqrt() * norm_rhs.sqrt();
    if denominator <= f64::EPSILON {
        return 0.0;
    }
    // Rounding can push the ratio just past +/-1.
    (dot / denominator).clamp(-1.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(entries: &[(&str, Vec<f64>)]) -> TemplateStore {
        entries
            .iter()
            .map(|(identity, vector)| (identity.to_string(), vector.clone()))
            .collect()
    }

    #[test]
    fn self_distance_is_zero() {
        let vectors = [
            vec![1.0, 0.0, 0.0],
            vec![0.3, -0.7, 2.5, 9.1],
            vec![-4.0, -4.0],
            vec![1e-3, 5e2, 7.25],
        ];
        for vector in &vectors {
            assert!(cosine_distance(vector, vector).abs() < 1e-12);
        }
    }

    #[test]
    fn empty_store_returns_unknown_at_infinity() {
        let decision = verify(&[0.2, 0.4], &TemplateStore::new(), 0.4);
        assert_eq!(decision.identity, UNKNOWN_IDENTITY);
        assert!(decision.distance.is_infinite());
    }

    #[test]
    fn exact_template_matches_with_zero_distance() {
        let store = store_with(&[
            ("alice", vec![1.0, 0.0, 0.0]),
            ("alice", vec![0.0, 1.0, 0.0]),
            ("alice", vec![0.0, 0.0, 1.0]),
        ]);
        let decision = verify(&[0.0, 1.0, 0.0], &store, 0.4);
        assert_eq!(decision.identity, "alice");
        assert!(decision.distance.abs() < 1e-12);
    }

    #[test]
    fn distance_above_threshold_reports_unknown_with_true_minimum() {
        let store = store_with(&[("alice", vec![1.0, 0.0]), ("bob", vec![0.0, 1.0])]);
        let probe = [1.0, 1.0];
        let decision = verify(&probe, &store, 0.1);
        assert!(!decision.is_known());
        let expected = cosine_distance(&probe, &[1.0, 0.0]);
        assert!((decision.distance - expected).abs() < 1e-12);
    }

    #[test]
    fn closest_identity_wins() {
        let store = store_with(&[
            ("alice", vec![1.0, 0.0]),
            ("bob", vec![0.9, 0.1]),
            ("carol", vec![0.0, 1.0]),
        ]);
        let decision = verify(&[0.1, 0.95], &store, 0.4);
        assert_eq!(decision.identity, "carol");
    }

    #[test]
    fn ties_resolve_to_lexicographically_first_identity() {
        let store = store_with(&[("zed", vec![1.0, 0.0]), ("amy", vec![2.0, 0.0])]);
        let decision = verify(&[3.0, 0.0], &store, 0.4);
        assert_eq!(decision.identity, "amy");
    }

    #[test]
    fn zero_vector_is_maximally_distant_but_finite() {
        let store = store_with(&[("alice", vec![0.0, 0.0])]);
        let decision = verify(&[1.0, 0.0], &store, 0.4);
        assert!(!decision.is_known());
        assert_eq!(decision.distance, 1.0);
    }
}
