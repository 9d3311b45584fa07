//! Pure per-stage transformations. The [`super::stages`] wrap these with service calls.

use std::collections::HashSet;
use std::fmt::Write as _;

use quarry_llm::LlmError;
use quarry_memory::RetrievalResult;
use quarry_memory::document::{ChunkMetadata, UNKNOWN};

use crate::config::RetrievalConfig;
use crate::context::AssembledContext;

/// Characters of normalized text compared during deduplication.
pub const SIGNATURE_CHARS: usize = 100;
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Keep results with `similarity >= threshold`, preserving order.
#[must_use]
pub fn filter_by_threshold(results: Vec<RetrievalResult>, threshold: f32) -> Vec<RetrievalResult> {
    results
        .into_iter()
        .filter(|r| r.similarity >= threshold)
        .collect()
}

/// Attach `scores`, sort descending, keep `top_k`, and number ranks from 1.
///
/// # Errors
///
/// Returns `LlmError::ScoreCountMismatch` unless there is exactly one score per result.
pub fn apply_rerank_scores(
    mut results: Vec<RetrievalResult>,
    scores: &[f32],
    top_k: usize,
) -> Result<Vec<RetrievalResult>, LlmError> {
    if scores.len() != results.len() {
        return Err(LlmError::ScoreCountMismatch {
            expected: results.len(),
            actual: scores.len(),
        });
    }
    for (result, score) in results.iter_mut().zip(scores) {
        result.rerank_score = Some(*score);
    }
    results.sort_by(|a, b| {
        b.rerank_score
            .partial_cmp(&a.rerank_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(top_k);
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = Some(i + 1);
    }
    Ok(results)
}

/// Lower-cased, whitespace-collapsed prefix used to spot duplicate chunks.
#[must_use]
pub fn signature(text: &str) -> String {
    let lowered = text.to_lowercase();
    let collapsed = lowered.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.chars().take(SIGNATURE_CHARS).collect()
}

/// Drop results whose signature was already seen; the first occurrence wins.
#[must_use]
pub fn deduplicate(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut seen = HashSet::new();
    results
        .into_iter()
        .filter(|r| seen.insert(signature(&r.text)))
        .collect()
}

#[must_use]
pub fn is_adjacent(a: &RetrievalResult, b: &RetrievalResult) -> bool {
    a.metadata.source_file == b.metadata.source_file
        && a.metadata.chunk_index.abs_diff(b.metadata.chunk_index) == 1
}

/// Single forward pass folding each result into its predecessor when the two
/// are neighbours in the same file. A result absorbed this way is not
/// considered for the following pair.
#[must_use]
pub fn merge_adjacent(results: Vec<RetrievalResult>) -> Vec<RetrievalResult> {
    let mut out = Vec::with_capacity(results.len());
    let mut iter = results.into_iter().peekable();
    while let Some(mut current) = iter.next() {
        if let Some(next) = iter.next_if(|n| is_adjacent(&current, n)) {
            let tokens = current.token_count() + next.token_count();
            current.text = format!("{}\n\n{}", current.text, next.text);
            current.metadata.token_count = tokens;
            current.metadata.merged = true;
        }
        out.push(current);
    }
    out
}

/// `[Source: FILE, Section S - HEADING]`, omitting unknown parts.
#[must_use]
pub fn attribution(meta: &ChunkMetadata) -> String {
    let mut out = format!("[Source: {}", meta.source_file);
    if !meta.section.is_empty() && meta.section != UNKNOWN {
        let _ = write!(out, ", Section {}", meta.section);
    }
    if !meta.heading.is_empty() && meta.heading != UNKNOWN {
        let _ = write!(out, " - {}", meta.heading);
    }
    out.push(']');
    out
}

/// Longest prefix whose token total stays within `max_tokens`.
#[must_use]
pub fn trim_to_budget(
    results: Vec<RetrievalResult>,
    max_tokens: usize,
) -> (Vec<RetrievalResult>, usize) {
    let mut total = 0;
    let mut kept = Vec::with_capacity(results.len());
    for result in results {
        let tokens = result.token_count();
        if total + tokens > max_tokens {
            break;
        }
        total += tokens;
        kept.push(result);
    }
    (kept, total)
}

/// Turn ranked results into one context string.
///
/// Deduplicates, merges neighbours, restores document order, attributes,
/// trims to the token budget, then joins with [`CONTEXT_SEPARATOR`].
/// `retrieval_time_ms` is left at zero for the caller to fill in.
#[must_use]
pub fn assemble(results: Vec<RetrievalResult>, config: &RetrievalConfig) -> AssembledContext {
    if results.is_empty() {
        return AssembledContext::default();
    }
    let input = results.len();

    let mut chunks = if config.enable_deduplication {
        deduplicate(results)
    } else {
        results
    };
    let deduplicated = chunks.len();

    if config.enable_chunk_merging {
        chunks = merge_adjacent(chunks);
    }

    chunks.sort_by(|a, b| {
        (a.metadata.source_file.as_str(), a.metadata.chunk_index)
            .cmp(&(b.metadata.source_file.as_str(), b.metadata.chunk_index))
    });

    if config.enable_source_attribution {
        for chunk in &mut chunks {
            chunk.metadata.attribution = Some(attribution(&chunk.metadata));
        }
    }

    let (chunks, total_tokens) = trim_to_budget(chunks, config.max_context_tokens);

    let context = chunks
        .iter()
        .map(|c| match c.metadata.attribution.as_deref() {
            Some(attr) if config.enable_source_attribution => format!("{attr}\n{}", c.text),
            _ => c.text.clone(),
        })
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR);

    let mut sources: Vec<String> = Vec::new();
    for chunk in &chunks {
        if !sources.contains(&chunk.metadata.source_file) {
            sources.push(chunk.metadata.source_file.clone());
        }
    }

    tracing::info!(
        input,
        deduplicated,
        chunks = chunks.len(),
        total_tokens,
        sources = sources.len(),
        "context assembled"
    );

    AssembledContext {
        context,
        chunks,
        total_tokens,
        sources,
        retrieval_time_ms: 0.0,
    }
}
