//! Heuristic complexity scoring and decomposition, the same
//! marker-word-list approach the router patterns use: cheap, explainable,
//! and tunable without a model call on the hot path.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Subtask;

const SEQUENCE_MARKERS: &[&str] = &[
    "first",
    "then",
    "next",
    "finally",
    "after that",
    "and then",
];

const CONJUNCTION_MARKERS: &[&str] = &["and also", "as well as", "in addition"];

static NUMBERED_LIST: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^\s*\d+[.)]\s").unwrap());
static SPLIT_ON_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(first|then|next|finally|and then|after that)\b").unwrap());

/// Scores 0.0-1.0: how much this query looks like it bundles multiple
/// independent subtasks rather than asking one thing.
pub fn complexity_score(query: &str) -> f32 {
    let lowered = query.to_lowercase();
    let mut score = 0.0;

    let sequence_hits = SEQUENCE_MARKERS
        .iter()
        .filter(|marker| lowered.contains(*marker))
        .count();
    score += sequence_hits as f32 * 0.25;

    let conjunction_hits = CONJUNCTION_MARKERS
        .iter()
        .filter(|marker| lowered.contains(*marker))
        .count();
    score += conjunction_hits as f32 * 0.2;

    if NUMBERED_LIST.is_match(query) {
        score += 0.4;
    }

    let question_marks = query.matches('?').count();
    if question_marks > 1 {
        score += 0.15 * (question_marks - 1) as f32;
    }

    let word_count = query.split_whitespace().count();
    if word_count > 40 {
        score += 0.15;
    }

    score.min(1.0)
}

/// Splits a query into subtasks along sequence markers or numbered list
/// items. Falls back to a single subtask if no clear boundary is found,
/// so callers never get an empty list back.
pub fn decompose(query: &str, default_tier: &str) -> Vec<Subtask> {
    let parts: Vec<String> = if NUMBERED_LIST.is_match(query) {
        query
            .lines()
            .map(|line| NUMBERED_LIST.replace(line, "").trim().to_string())
            .filter(|line| !line.is_empty())
            .collect()
    } else {
        SPLIT_ON_SEQUENCE
            .split(query)
            .map(|s| s.trim().trim_matches(',').trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    };

    let parts = if parts.len() > 1 {
        parts
    } else {
        vec![query.trim().to_string()]
    };

    parts
        .into_iter()
        .enumerate()
        .map(|(id, description)| Subtask {
            id,
            // Sequence/numbered-list decomposition is itself evidence of
            // an order: each step depends on the one before it.
            depends_on: if id == 0 { Vec::new() } else { vec![id - 1] },
            description,
            tier: default_tier.to_string(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_question_scores_low() {
        assert!(complexity_score("what time is it") < 0.3);
    }

    #[test]
    fn sequenced_request_scores_higher() {
        let score = complexity_score("first search the web, then summarize the results");
        assert!(score >= 0.25);
    }

    #[test]
    fn numbered_list_scores_high() {
        let query = "1. search for rust crates\n2. summarize the top three\n3. rank them";
        assert!(complexity_score(query) >= 0.4);
    }

    #[test]
    fn decompose_splits_numbered_list() {
        let query = "1. search for rust crates\n2. summarize the top three";
        let subtasks = decompose(query, "fast");
        assert_eq!(subtasks.len(), 2);
        assert!(subtasks[0].description.contains("search"));
    }

    #[test]
    fn decompose_splits_sequence_markers() {
        let query = "first look up the weather, then calculate the average";
        let subtasks = decompose(query, "fast");
        assert_eq!(subtasks.len(), 2);
    }

    #[test]
    fn decompose_falls_back_to_single_subtask() {
        let subtasks = decompose("what is the capital of france", "fast");
        assert_eq!(subtasks.len(), 1);
    }
}
