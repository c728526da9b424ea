//! Candidate ranking and result scoring formulas (spec §4.6.2, §4.6.5).

use std::collections::HashSet;

use serde_json::Value;

use crate::types::{AttributeTags, Level, Source, TaskContext};

use super::ToolCandidate;

fn jaccard(a: &[String], b: &[String]) -> f64 {
    let set_a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let set_b: HashSet<&str> = b.iter().map(String::as_str).collect();
    if set_a.is_empty() || set_b.is_empty() {
        return 0.0;
    }
    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    if union == 0 {
        0.0
    } else {
        intersection as f64 / union as f64
    }
}

/// Score one candidate against `task_ctx`. Returns `None` when
/// capability fit is zero (candidate excluded).
#[must_use]
pub fn task_aware_score(
    candidate: &ToolCandidate,
    task_ctx: &TaskContext,
    last_success: bool,
) -> Option<f64> {
    let capability_fit = jaccard(&candidate.capabilities, &task_ctx.capability_tags);
    if capability_fit == 0.0 {
        return None;
    }

    let cost = candidate.source.unit_cost() / 9.0;
    let attribute_match = attribute_score(candidate.source, &task_ctx.attribute_tags);
    let recency_bonus = if last_success { 0.1 } else { 0.0 };

    Some(0.5 * capability_fit + 0.25 * cost + 0.25 * attribute_match + recency_bonus)
}

fn attribute_score(source: Source, attrs: &AttributeTags) -> f64 {
    let mut hits = 0u8;
    let local_or_skill = matches!(source, Source::Tools | Source::Skills);

    if attrs.reliability == Level::High && local_or_skill {
        hits += 1;
    }
    if attrs.timeliness == Level::High && local_or_skill {
        hits += 1;
    }
    if attrs.cost_sensitivity == Level::High && source != Source::Mcps {
        hits += 1;
    }
    f64::from(hits) / 3.0
}

/// Stable tie-break ordering key: `(priority ascending, source, name)`.
#[must_use]
pub fn tie_break_key(candidate: &ToolCandidate) -> (u8, u8, String) {
    (
        candidate.priority,
        candidate.source.ordinal(),
        candidate.name.clone(),
    )
}

/// Score a successful result for winner-take-all picking (spec §4.6.5).
#[must_use]
pub fn result_score(text: &str, result: &Value, priority: u8) -> f64 {
    0.5 * length_score(text) + 0.2 * quality_score(result) + 0.3 * priority_score(priority)
}

fn length_score(text: &str) -> f64 {
    let len = text.chars().count();
    if len < 10 {
        0.3
    } else if len <= 500 {
        0.3 + 0.7 * (len as f64 - 10.0) / 490.0
    } else if len <= 2000 {
        1.0
    } else {
        let over = (len - 2000) as f64;
        (1.0 - over / 10_000.0).max(0.4)
    }
}

fn quality_score(result: &Value) -> f64 {
    let Some(obj) = result.as_object() else {
        return 0.0;
    };
    let mut score = 0.2;
    if ["results", "data", "content", "items"]
        .iter()
        .any(|key| obj.contains_key(*key))
    {
        score += 0.1;
    }
    score
}

fn priority_score(priority: u8) -> f64 {
    1.0 - f64::from(priority) / 3.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jaccard_zero_when_disjoint() {
        let a = vec!["search".to_string()];
        let b = vec!["calculate".to_string()];
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn length_score_bands() {
        assert_eq!(length_score("short"), 0.3);
        assert!(length_score(&"a".repeat(500)) > 0.95);
        assert!((length_score(&"a".repeat(2000)) - 1.0).abs() < 1e-9);
        assert!(length_score(&"a".repeat(12000)) < 1.0);
    }

    #[test]
    fn priority_score_ranks_local_highest() {
        assert!((priority_score(0) - 1.0).abs() < 1e-9);
        assert!((priority_score(1) - 0.666_666_666_666_666_7).abs() < 1e-9);
        assert!((priority_score(2) - 0.333_333_333_333_333_3).abs() < 1e-9);
    }

    #[test]
    fn quality_score_detects_known_keys() {
        let plain = serde_json::json!("text");
        assert_eq!(quality_score(&plain), 0.0);

        let obj = serde_json::json!({"other": 1});
        assert!((quality_score(&obj) - 0.2).abs() < 1e-9);

        let rich = serde_json::json!({"results": []});
        assert!((quality_score(&rich) - 0.3).abs() < 1e-9);
    }
}
