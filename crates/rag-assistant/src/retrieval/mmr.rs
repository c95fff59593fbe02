//! Maximal Marginal Relevance re-ranking
//!
//! MMR = λ × relevance(doc) − (1 − λ) × max(similarity(doc, selected))
//!
//! λ = 1.0 is plain relevance ordering, λ = 0.0 is pure diversity.

use crate::index::cosine_similarity;

/// Candidate for MMR reranking
#[derive(Debug, Clone)]
pub struct MmrCandidate<'a> {
    /// Similarity to the query
    pub relevance: f32,
    /// Candidate embedding
    pub vector: &'a [f32],
}

/// Select up to `k` candidates, returning their indices in selection order.
///
/// Candidates are expected sorted by relevance (highest first); ties in MMR
/// score go to the earlier candidate.
pub fn mmr_rerank(candidates: &[MmrCandidate<'_>], k: usize, lambda: f32) -> Vec<usize> {
    let lambda = lambda.clamp(0.0, 1.0);
    let k = k.min(candidates.len());

    let mut selected: Vec<usize> = Vec::with_capacity(k);
    let mut remaining: Vec<usize> = (0..candidates.len()).collect();

    while selected.len() < k {
        let mut best_pos = 0;
        let mut best_score = f32::NEG_INFINITY;

        for (pos, &idx) in remaining.iter().enumerate() {
            let candidate = &candidates[idx];
            let redundancy = selected
                .iter()
                .map(|&s| cosine_similarity(candidate.vector, candidates[s].vector))
                .fold(f32::NEG_INFINITY, f32::max);
            let redundancy = if selected.is_empty() { 0.0 } else { redundancy };

            let score = lambda * candidate.relevance - (1.0 - lambda) * redundancy;
            if score > best_score {
                best_score = score;
                best_pos = pos;
            }
        }

        selected.push(remaining.remove(best_pos));
    }

    selected
}
