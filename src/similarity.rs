//! Cosine similarity and exhaustive top-K ranking.
//!
//! Ranking is a full scan: every candidate vector is scored against the
//! query. Candidates whose dimensionality differs from the query, and
//! vectors with zero magnitude (for which cosine similarity is undefined),
//! are excluded rather than scored, so no `NaN` ever reaches a caller.

use std::cmp::Ordering;

/// Compute cosine similarity between two embedding vectors.
///
/// Returns a value in `[-1.0, 1.0]`, or `None` when the vectors are empty,
/// differ in length, or either has zero magnitude.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;

    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (*x as f64, *y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if !denom.is_finite() || denom < f64::from(f32::EPSILON) {
        return None;
    }

    let sim = (dot / denom).clamp(-1.0, 1.0) as f32;
    sim.is_finite().then_some(sim)
}

/// Score every candidate against `query`, best first.
///
/// Candidates with mismatched dimensionality or zero magnitude are skipped.
/// Ties keep the candidates' input order. An empty candidate set yields an
/// empty ranking. Callers truncate to their top-K.
pub fn rank<'a, I, K>(query: &[f32], candidates: I) -> Vec<(K, f32)>
where
    I: IntoIterator<Item = (K, &'a [f32])>,
{
    let mut scored: Vec<(K, f32)> = candidates
        .into_iter()
        .filter_map(|(id, vector)| cosine_similarity(query, vector).map(|score| (id, score)))
        .collect();

    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    scored
}

/// [`rank`] followed by truncation to `k` entries.
pub fn top_k<'a, I, K>(query: &[f32], candidates: I, k: usize) -> Vec<(K, f32)>
where
    I: IntoIterator<Item = (K, &'a [f32])>,
{
    let mut ranked = rank(query, candidates);
    ranked.truncate(k);
    ranked
}
