//! Vector scoring, ranking and snippet helpers.
//!
//! Everything here is pure and synchronous; the orchestrator and tests call it directly.

use std::cmp::Ordering;

use crate::error::{SemanticError, SemanticResult};

const ELLIPSIS: &str = "...";

/// Cosine similarity of two equal-length vectors.
///
/// Returns `0.0` when either vector has zero norm: such a vector carries no
/// signal and must not be treated as a real judgement. The result is clamped to
/// `[-1, 1]` to absorb floating point drift.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> SemanticResult<f32> {
    if a.len() != b.len() {
        return Err(SemanticError::InvalidArgument(format!(
            "vector length mismatch: {} vs {}",
            a.len(),
            b.len()
        )));
    }

    let (mut dot, mut norm_a, mut norm_b) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return Ok(0.0);
    }

    let score = dot / (norm_a.sqrt() * norm_b.sqrt());
    Ok(score.clamp(-1.0, 1.0) as f32)
}

fn sortable(score: f32) -> f32 {
    if score.is_nan() {
        f32::NEG_INFINITY
    } else {
        score
    }
}

fn descending(a: f32, b: f32) -> Ordering {
    sortable(b)
        .partial_cmp(&sortable(a))
        .unwrap_or(Ordering::Equal)
}

/// Stable descending sort by `score`, truncated to `limit`.
///
/// Equal scores keep their insertion order; NaN scores sort last.
pub fn rank_by<T, F>(mut items: Vec<T>, limit: usize, score: F) -> Vec<T>
where
    F: Fn(&T) -> f32,
{
    items.sort_by(|a, b| descending(score(a), score(b)));
    items.truncate(limit);
    items
}

/// [`rank_by`] over `(id, score)` pairs
pub fn rank<K>(scored: Vec<(K, f32)>, limit: usize) -> Vec<(K, f32)> {
    rank_by(scored, limit, |(_, score)| *score)
}

/// Window of `max_length` characters around the earliest query term in `text`.
///
/// Terms are the whitespace-split words of `query`, matched case-insensitively.
/// Truncated edges are marked with `...`. Without a match the text is cut from
/// the left. Lengths count characters, never bytes.
pub fn extract_snippet(text: &str, query: &str, max_length: usize) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= max_length {
        return text.to_string();
    }
    if max_length == 0 {
        return String::new();
    }

    let lowered: Vec<char> = chars.iter().map(|c| fold(*c)).collect();
    let terms: Vec<Vec<char>> = query
        .split_whitespace()
        .map(|term| term.chars().map(fold).collect())
        .collect();

    let Some((position, term_len)) = earliest_match(&lowered, &terms) else {
        let head: String = chars[..max_length].iter().collect();
        return format!("{}{}", head, ELLIPSIS);
    };

    let center = position + term_len / 2;
    let mut start = center.saturating_sub(max_length / 2);
    let end = (start + max_length).min(chars.len());
    start = end.saturating_sub(max_length);

    let mut snippet = String::with_capacity(max_length + 2 * ELLIPSIS.len());
    if start > 0 {
        snippet.push_str(ELLIPSIS);
    }
    snippet.extend(&chars[start..end]);
    if end < chars.len() {
        snippet.push_str(ELLIPSIS);
    }
    snippet
}

/// Single-char lowercase fold so that indexes stay aligned with the source text
fn fold(c: char) -> char {
    c.to_lowercase().next().unwrap_or(c)
}

fn earliest_match(haystack: &[char], terms: &[Vec<char>]) -> Option<(usize, usize)> {
    terms
        .iter()
        .filter(|term| !term.is_empty() && term.len() <= haystack.len())
        .filter_map(|term| {
            haystack
                .windows(term.len())
                .position(|window| window == term.as_slice())
                .map(|pos| (pos, term.len()))
        })
        .min_by_key(|(pos, _)| *pos)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn test_cosine_identical_vectors() {
        let a = [0.3, -1.2, 4.0];
        assert!(approx(cosine_similarity(&a, &a).unwrap(), 1.0));
    }

    #[test]
    fn test_cosine_orthogonal_and_opposite() {
        assert!(approx(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap(), 0.0));
        assert!(approx(cosine_similarity(&[1.0, 2.0], &[-1.0, -2.0]).unwrap(), -1.0));
    }

    #[test]
    fn test_cosine_is_symmetric_and_bounded() {
        let pairs: [(&[f32], &[f32]); 4] = [
            (&[1.0, 2.0, 3.0], &[3.0, 2.0, 1.0]),
            (&[0.9, 0.1], &[1.0, 0.0]),
            (&[-5.0, 0.5, 2.0], &[1e-3, 7.0, -2.5]),
            (&[1e20, 1e20], &[1e20, 1e20]),
        ];
        for (a, b) in pairs {
            let ab = cosine_similarity(a, b).unwrap();
            let ba = cosine_similarity(b, a).unwrap();
            assert!(approx(ab, ba));
            assert!((-1.0..=1.0).contains(&ab));
        }
    }

    #[test]
    fn test_cosine_zero_norm_is_zero() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 1.0]).unwrap(), 0.0);
        assert_eq!(cosine_similarity(&[], &[]).unwrap(), 0.0);
    }

    #[test]
    fn test_cosine_length_mismatch() {
        let err = cosine_similarity(&[1.0], &[1.0, 2.0]).unwrap_err();
        assert!(matches!(err, SemanticError::InvalidArgument(_)));
    }

    #[test]
    fn test_rank_is_stable_and_truncated() {
        let scored = vec![("a", 0.9), ("b", 0.3), ("c", 0.9), ("d", 0.1)];
        let ranked = rank(scored, 2);
        assert_eq!(ranked, vec![("a", 0.9), ("c", 0.9)]);
    }

    #[test]
    fn test_rank_non_increasing_and_nan_last() {
        let scored = vec![("x", f32::NAN), ("y", -0.5), ("z", 0.7), ("w", 0.7)];
        let ranked = rank(scored, 10);
        let ids: Vec<&str> = ranked.iter().map(|(id, _)| *id).collect();
        assert_eq!(ids, vec!["z", "w", "y", "x"]);
    }

    #[test]
    fn test_rank_limit_larger_than_input() {
        let ranked = rank(vec![("only", 0.2)], 5);
        assert_eq!(ranked.len(), 1);
        assert!(rank::<&str>(vec![], 3).is_empty());
    }

    #[test]
    fn test_snippet_contains_term() {
        let snippet = extract_snippet("the quick brown fox", "brown", 10);
        assert!(snippet.contains("brown"), "got {snippet}");
        assert!(snippet.starts_with(ELLIPSIS));
        assert!(snippet.ends_with(ELLIPSIS));
    }

    #[test]
    fn test_snippet_without_match_is_left_anchored() {
        let snippet = extract_snippet("hello world", "zzz", 5);
        assert_eq!(snippet, "hello...");
    }

    #[test]
    fn test_snippet_short_text_unchanged() {
        assert_eq!(extract_snippet("short", "x", 200), "short");
    }

    #[test]
    fn test_snippet_case_insensitive_earliest_term() {
        let text = "Invoice for ACME roofing; later mention of gutters and roofing again";
        let snippet = extract_snippet(text, "gutters roofing", 20);
        assert!(snippet.to_lowercase().contains("roofing"));
        assert!(snippet.contains("ACME"));
    }

    #[test]
    fn test_snippet_match_near_end_keeps_full_window() {
        let text = "aaaaaaaaaaaaaaaaaaaa needle";
        let snippet = extract_snippet(text, "needle", 10);
        assert_eq!(snippet, "...aaa needle");
    }

    #[test]
    fn test_snippet_counts_characters_not_bytes() {
        let text = "ééééééééééééé café ééééééééé";
        let snippet = extract_snippet(text, "CAFÉ", 8);
        assert!(snippet.contains("café"));
        assert_eq!(snippet.trim_matches('.').chars().count(), 8);
    }
}
