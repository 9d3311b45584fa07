//! Reciprocal rank fusion.

use std::collections::HashMap;

use crate::vector_index::RetrievalResult;

/// Rank offset added before taking the reciprocal. Ranks are 0-based.
pub const RRF_CONSTANT: f32 = 61.0;

/// Merge ranked lists: each list contributes `1 / (rank + 61)` per hit.
///
/// The first occurrence of an id supplies the result body. Output is sorted
/// by fused score, ties keep first-seen order, and is cut to `k`.
#[must_use]
pub fn reciprocal_rank_fusion(lists: &[Vec<RetrievalResult>], k: usize) -> Vec<RetrievalResult> {
    let mut scores: HashMap<&str, f32> = HashMap::new();
    let mut order: Vec<&RetrievalResult> = Vec::new();

    for list in lists {
        for (rank, result) in list.iter().enumerate() {
            #[allow(clippy::cast_precision_loss)]
            let contribution = 1.0 / (rank as f32 + RRF_CONSTANT);
            let entry = scores.entry(result.id.as_str()).or_insert_with(|| {
                order.push(result);
                0.0
            });
            *entry += contribution;
        }
    }

    let mut fused: Vec<RetrievalResult> = order
        .into_iter()
        .map(|r| {
            let mut r = r.clone();
            r.fusion_score = scores.get(r.id.as_str()).copied();
            r
        })
        .collect();
    fused.sort_by(|a, b| {
        b.fusion_score
            .partial_cmp(&a.fusion_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    fused.truncate(k);
    fused
}
