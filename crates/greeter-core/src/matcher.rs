//! Nearest-neighbour identity matching.

use crate::gallery::Gallery;
use crate::types::{Embedding, RecognitionResult};

/// Distance cutoff for L2-normalized ArcFace embeddings.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 1.10;

/// Strategy for comparing a query embedding against the gallery.
pub trait Matcher {
    fn find(&self, query: &Embedding, gallery: &Gallery, threshold: f32) -> RecognitionResult;
}

/// Euclidean nearest-neighbour matcher.
///
/// Visits every gallery entry. Ties resolve to the entry that comes first in
/// gallery order; a best distance equal to the threshold is still accepted.
#[derive(Debug, Default, Clone, Copy)]
pub struct EuclideanMatcher;

impl Matcher for EuclideanMatcher {
    fn find(&self, query: &Embedding, gallery: &Gallery, threshold: f32) -> RecognitionResult {
        let mut best_dist = f32::INFINITY;
        let mut best_idx: Option<usize> = None;

        for (i, entry) in gallery.entries().iter().enumerate() {
            if entry.embedding.dim() != query.dim() {
                tracing::warn!(
                    name = %entry.name,
                    gallery_dim = entry.embedding.dim(),
                    query_dim = query.dim(),
                    "skipping gallery entry of a different dimension"
                );
                continue;
            }
            let dist = query.euclidean_distance(&entry.embedding);
            tracing::trace!(name = %entry.name, distance = dist, "gallery distance");
            if dist < best_dist {
                best_dist = dist;
                best_idx = Some(i);
            }
        }

        match best_idx {
            Some(idx) if best_dist <= threshold => RecognitionResult {
                name: Some(gallery.entries()[idx].name.clone()),
                distance: best_dist,
            },
            _ => RecognitionResult {
                name: None,
                distance: best_dist,
            },
        }
    }
}

/// Return the nearest identity within `threshold`, or `None`.
pub fn match_identity(query: &Embedding, gallery: &Gallery, threshold: f32) -> Option<String> {
    EuclideanMatcher.find(query, gallery, threshold).name
}

#[cfg(test)]
mod tests {
    use super::*;

    fn emb(values: &[f32]) -> Embedding {
        Embedding::new(values.to_vec())
    }

    fn gallery(entries: &[(&str, &[f32])]) -> Gallery {
        let mut g = Gallery::new();
        for (name, v) in entries {
            g.insert(*name, emb(v)).unwrap();
        }
        g
    }

    #[test]
    fn test_returns_nearest_within_threshold() {
        let g = gallery(&[("alice", &[1.0, 0.0]), ("bob", &[0.0, 1.0])]);
        let result = EuclideanMatcher.find(&emb(&[0.9, 0.1]), &g, 0.5);
        assert_eq!(result.name.as_deref(), Some("alice"));
        assert!((result.distance - 0.02f32.sqrt()).abs() < 1e-6);
    }

    #[test]
    fn test_visits_every_entry() {
        // Best match is the last entry.
        let g = gallery(&[
            ("decoy1", &[0.0, 1.0, 0.0]),
            ("decoy2", &[0.0, 0.0, 1.0]),
            ("match", &[1.0, 0.0, 0.0]),
        ]);
        let result = EuclideanMatcher.find(&emb(&[1.0, 0.0, 0.0]), &g, 0.5);
        assert_eq!(result.name.as_deref(), Some("match"));
        assert_eq!(result.distance, 0.0);
    }

    #[test]
    fn test_none_beyond_threshold() {
        let g = gallery(&[("alice", &[1.0, 0.0]), ("bob", &[0.0, 1.0])]);
        let result = EuclideanMatcher.find(&emb(&[-1.0, -1.0]), &g, 0.52);
        assert!(result.name.is_none());
        // Nearest is still reported.
        assert!((result.distance - 5.0f32.sqrt()).abs() < 1e-5);
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let g = gallery(&[("alice", &[0.0, 0.0])]);
        assert_eq!(match_identity(&emb(&[0.5, 0.0]), &g, 0.5).as_deref(), Some("alice"));
        assert_eq!(match_identity(&emb(&[0.5001, 0.0]), &g, 0.5), None);
    }

    #[test]
    fn test_tie_goes_to_first_entry() {
        let g = gallery(&[("first", &[1.0, 0.0]), ("second", &[-1.0, 0.0])]);
        let result = EuclideanMatcher.find(&emb(&[0.0, 0.0]), &g, 2.0);
        assert_eq!(result.name.as_deref(), Some("first"));
    }

    #[test]
    fn test_idempotent() {
        let g = gallery(&[("alice", &[0.2, 0.4]), ("bob", &[0.5, 0.1])]);
        let query = emb(&[0.3, 0.3]);
        let a = EuclideanMatcher.find(&query, &g, 0.52);
        let b = EuclideanMatcher.find(&query, &g, 0.52);
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_gallery() {
        let result = EuclideanMatcher.find(&emb(&[1.0, 0.0]), &Gallery::new(), 10.0);
        assert!(result.name.is_none());
        assert!(result.distance.is_infinite());
    }

    #[test]
    fn test_query_of_other_dimension_never_matches() {
        let g = gallery(&[("alice", &[0.1, 0.2])]);
        let result = EuclideanMatcher.find(&emb(&[0.1, 0.2, 0.9, -0.9]), &g, 0.5);
        assert!(result.name.is_none());
        assert!(result.distance.is_infinite());
    }
}
