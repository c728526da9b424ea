//! Consistency and logic checks over step results. Never gates progress
//! (spec §9 open question): findings are recorded, not enforced.

use std::collections::HashSet;

use crate::types::{StepResult, VerificationFinding};

/// Structural check over one step result against its predecessors.
#[derive(Debug, Clone, Copy)]
pub struct VerificationAgent;

impl VerificationAgent {
    /// Verify `result` against `prior` successful results.
    #[must_use]
    pub fn verify(result: &StepResult, prior: &[StepResult]) -> VerificationFinding {
        let mut issues = Vec::new();
        let mut confidence = 0.7;

        let consistency_ok = check_consistency(result, prior, &mut issues);
        if consistency_ok {
            confidence += 0.1;
        }

        let logic_ok = check_logic(result, &mut issues);
        if logic_ok {
            confidence += 0.1;
        }

        let source_count = result
            .meta
            .as_ref()
            .and_then(|m| m.get("sources"))
            .and_then(|s| s.as_array())
            .map_or(0, Vec::len);
        if source_count >= 2 {
            confidence += 0.1;
        }

        VerificationFinding {
            verified: issues.is_empty(),
            confidence: confidence.min(1.0),
            issues,
        }
    }
}

fn check_consistency(result: &StepResult, prior: &[StepResult], issues: &mut Vec<String>) -> bool {
    if !result.success {
        return true;
    }
    let text = result.result_text();
    let mut ok = true;
    for other in prior.iter().filter(|r| r.success) {
        let sim = jaccard_text(&text, &other.result_text());
        if sim > 0.9 {
            issues.push(format!("suspect duplicate of step {}", other.step_id));
            ok = false;
        } else if sim < 0.05 && prior_expected_refinement(result) {
            issues.push(format!("suspect drift from step {}", other.step_id));
            ok = false;
        }
    }
    ok
}

/// Whether this step's metadata marks it as refining a prior result. The
/// core has no explicit "refines" field on `StepResult`; absent one, drift
/// is only flagged when the step carries a `refines` metadata hint.
fn prior_expected_refinement(result: &StepResult) -> bool {
    result
        .meta
        .as_ref()
        .and_then(|m| m.get("refines"))
        .and_then(serde_json::Value::as_bool)
        .unwrap_or(false)
}

fn check_logic(result: &StepResult, issues: &mut Vec<String>) -> bool {
    if !result.success {
        return true;
    }
    let Some(value) = &result.result else {
        issues.push("missing result value".to_string());
        return false;
    };

    if let Some(n) = value.as_f64() {
        if n.abs() > 1e15 {
            issues.push("absurd numeric magnitude".to_string());
            return false;
        }
        return true;
    }

    if let Some(text) = value.as_str() {
        if text.trim().is_empty() {
            issues.push("empty text result".to_string());
            return false;
        }
        if looks_like_timestamp(&result.method) && !has_recognizable_date(text) {
            issues.push("timestamp lacks recognizable date pattern".to_string());
            return false;
        }
    }
    true
}

fn looks_like_timestamp(method: &str) -> bool {
    method.contains("clock")
}

fn has_recognizable_date(text: &str) -> bool {
    text.chars().any(|c| c.is_ascii_digit()) && (text.contains(':') || text.contains('-'))
}

fn jaccard_text(a: &str, b: &str) -> f64 {
    let tokenize = |s: &str| -> HashSet<String> {
        s.split_whitespace().map(str::to_lowercase).collect()
    };
    let set_a = tokenize(a);
    let set_b = tokenize(b);
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
