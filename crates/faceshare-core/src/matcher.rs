//! Similarity scoring and best-match assignment against a gallery.

use crate::gallery::Gallery;
use crate::types::{Embedding, MatchResult};
use serde::Serialize;

/// Default cosine-similarity threshold for ArcFace `w600k_r50`.
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.4;

/// Result of comparing two embeddings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Comparison {
    pub similarity: f32,
    /// `1 - similarity`.
    pub distance: f32,
    pub is_match: bool,
    pub threshold: f32,
}

/// Compare two unit-norm embeddings; a match is `similarity >= threshold`.
pub fn compare(a: &Embedding, b: &Embedding, threshold: f32) -> Comparison {
    let similarity = a.similarity(b);
    Comparison {
        similarity,
        distance: 1.0 - similarity,
        is_match: similarity >= threshold,
        threshold,
    }
}

/// Strategy for comparing a query embedding against a gallery.
pub trait Matcher {
    fn best_match(&self, query: &Embedding, gallery: &Gallery, threshold: f32) -> MatchResult;
}

/// Cosine similarity matcher.
///
/// Only entries at or above the threshold are candidates; among them the
/// highest similarity wins, and the earliest gallery position wins a tie.
/// Every entry is always visited, so running time does not reveal the
/// position of the match.
pub struct CosineMatcher;

impl Matcher for CosineMatcher {
    fn best_match(&self, query: &Embedding, gallery: &Gallery, threshold: f32) -> MatchResult {
        let mut best: Option<(usize, f32)> = None;
        let mut best_seen = f32::NEG_INFINITY;

        for (i, entry) in gallery.entries().iter().enumerate() {
            let sim = query.similarity(&entry.embedding);
            best_seen = best_seen.max(sim);
            if sim >= threshold && best.map_or(true, |(_, s)| sim > s) {
                best = Some((i, sim));
            }
        }

        match best {
            Some((idx, similarity)) => MatchResult {
                matched: true,
                identity: Some(gallery.entries()[idx].identity.clone()),
                similarity,
                distance: 1.0 - similarity,
            },
            None if best_seen == f32::NEG_INFINITY => MatchResult::no_match(0.0),
            None => MatchResult::no_match(best_seen),
        }
    }
}
