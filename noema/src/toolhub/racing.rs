//! Concurrent candidate racing, evidence synthesis, and capability
//! suggestion (spec §4.6.3, §4.6.4).

use std::sync::Arc;
use std::time::Duration;

use futures::future::{self, Either};
use serde_json::{json, Value};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::llm::{GenerateOptions, LlmClient};
use crate::tool::Tool;
use crate::types::{TaskContext, ToolResult, ToolResultMeta};

use super::scoring::{result_score, task_aware_score, tie_break_key};
use super::ToolCandidate;

/// After the first success in a race batch, how long to keep listening
/// for other near-simultaneous successes before scoring and picking the
/// best one (spec §4.6.3, §4.6.5).
const RACE_GRACE_WINDOW: Duration = Duration::from_millis(50);

/// Run one candidate invocation, honoring both its own timeout and
/// cooperative cancellation via `token`.
async fn race_one(
    token: &CancellationToken,
    timeout: Duration,
    tool: Arc<dyn Tool>,
    input: Value,
) -> Result<Value, String> {
    let cancelled = Box::pin(token.cancelled());
    let exec = Box::pin(tokio::time::timeout(timeout, tool.execute(input)));
    match future::select(cancelled, exec).await {
        Either::Left(((), _)) => Err("cancelled".to_string()),
        Either::Right((Ok(Ok(value)), _)) => Ok(value),
        Either::Right((Ok(Err(err)), _)) => Err(err.to_string()),
        Either::Right((Err(_), _)) => Err("timeout".to_string()),
    }
}

/// Rank candidates per spec §4.6.2: task-aware scoring when `task_ctx` is
/// present, else recency-then-priority ordering.
#[must_use]
pub fn rank(
    mut candidates: Vec<ToolCandidate>,
    task_ctx: Option<&TaskContext>,
    last_success_identity: Option<&str>,
) -> Vec<ToolCandidate> {
    if let Some(ctx) = task_ctx {
        let mut scored: Vec<(f64, ToolCandidate)> = candidates
            .into_iter()
            .filter_map(|c| {
                let is_last = last_success_identity == Some(c.identity().as_str());
                task_aware_score(&c, ctx, is_last).map(|score| (score, c))
            })
            .collect();
        scored.sort_by(|(score_a, a), (score_b, b)| {
            score_b
                .partial_cmp(score_a)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| tie_break_key(a).cmp(&tie_break_key(b)))
        });
        scored.into_iter().map(|(_, c)| c).collect()
    } else {
        candidates.sort_by(|a, b| {
            let a_last = last_success_identity == Some(a.identity().as_str());
            let b_last = last_success_identity == Some(b.identity().as_str());
            b_last
                .cmp(&a_last)
                .then_with(|| a.priority.cmp(&b.priority))
                .then_with(|| tie_break_key(a).cmp(&tie_break_key(b)))
        });
        candidates
    }
}

/// `pick_best`: race up to 3 top-ranked candidates at a time; the first
/// success wins. If a second, third, ... success lands within the grace
/// window, the highest-scoring successful result wins instead of simply
/// the first (spec §4.6.3, §4.6.5). If a whole batch fails, the next
/// batch is tried sequentially.
pub async fn race(
    ranked: &[ToolCandidate],
    input: Value,
    timeout: Duration,
    token: &CancellationToken,
) -> ToolResult {
    let mut errors = Vec::new();
    for batch in ranked.chunks(3) {
        let race_token = token.child_token();
        let mut set: JoinSet<(usize, Result<Value, String>)> = JoinSet::new();
        for (idx, candidate) in batch.iter().enumerate() {
            let tool = candidate.tool.clone();
            let input = input.clone();
            let task_token = race_token.clone();
            set.spawn(async move { (idx, race_one(&task_token, timeout, tool, input).await) });
        }

        let mut winners: Vec<(usize, Value)> = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((idx, Ok(value))) => {
                    winners.push((idx, value));
                    break;
                }
                Ok((_, Err(err))) => errors.push(err),
                Err(_join_err) => errors.push("cancelled".to_string()),
            }
        }

        if !winners.is_empty() {
            tokio::time::sleep(RACE_GRACE_WINDOW).await;
            while let Some(joined) = set.try_join_next() {
                match joined {
                    Ok((idx, Ok(value))) => winners.push((idx, value)),
                    Ok((_, Err(err))) => errors.push(err),
                    Err(_join_err) => errors.push("cancelled".to_string()),
                }
            }
        }

        // Cancel and await every remaining sibling so no task outlives the
        // request, even though a winner was already found.
        race_token.cancel();
        set.abort_all();
        while set.join_next().await.is_some() {}

        let best = winners.into_iter().max_by(|(idx_a, val_a), (idx_b, val_b)| {
            let score_a = result_score(&render(val_a), val_a, batch[*idx_a].priority);
            let score_b = result_score(&render(val_b), val_b, batch[*idx_b].priority);
            score_a.partial_cmp(&score_b).unwrap_or(std::cmp::Ordering::Equal)
        });

        if let Some((idx, value)) = best {
            let winning = &batch[idx];
            return ToolResult {
                success: true,
                result: Some(value),
                error: None,
                meta: ToolResultMeta {
                    source: Some(winning.identity()),
                    ..ToolResultMeta::default()
                },
            };
        }
    }

    ToolResult {
        success: false,
        result: None,
        error: Some("all candidates failed".to_string()),
        meta: ToolResultMeta {
            errors: Some(errors),
            ..ToolResultMeta::default()
        },
    }
}

/// `synthesize`: launch every selected candidate concurrently, collect
/// successes, and either simple-merge or LLM-synthesize them.
pub async fn synthesize(
    ranked: &[ToolCandidate],
    input: Value,
    timeout: Duration,
    llm: Option<&dyn LlmClient>,
    token: &CancellationToken,
) -> ToolResult {
    let selected = &ranked[..ranked.len().min(5)];
    let mut set: JoinSet<(String, Result<Value, String>)> = JoinSet::new();
    for candidate in selected {
        let tool = candidate.tool.clone();
        let input = input.clone();
        let identity = candidate.identity();
        let task_token = token.child_token();
        set.spawn(async move { (identity, race_one(&task_token, timeout, tool, input).await) });
    }

    let mut successes: Vec<(String, Value)> = Vec::new();
    let mut errors = Vec::new();
    while let Some(joined) = set.join_next().await {
        match joined {
            Ok((identity, Ok(value))) => successes.push((identity, value)),
            Ok((_, Err(err))) => errors.push(err),
            Err(_) => errors.push("cancelled".to_string()),
        }
    }

    if successes.is_empty() {
        return ToolResult {
            success: false,
            result: None,
            error: Some("all candidates failed".to_string()),
            meta: ToolResultMeta {
                errors: Some(errors),
                ..ToolResultMeta::default()
            },
        };
    }

    let sources: Vec<String> = successes.iter().map(|(id, _)| id.clone()).collect();
    let total_len: usize = successes
        .iter()
        .map(|(_, v)| render(v).chars().count())
        .sum();

    let merged = if total_len > 2000 || successes.len() > 3 || llm.is_none() {
        simple_merge(&successes)
    } else {
        match llm_synthesize(llm.expect("checked above"), &successes).await {
            Some(text) => text,
            None => simple_merge(&successes),
        }
    };

    ToolResult {
        success: true,
        result: Some(json!(merged)),
        error: None,
        meta: ToolResultMeta {
            synthesized: Some(true),
            sources: Some(sources),
            errors: if errors.is_empty() { None } else { Some(errors) },
            ..ToolResultMeta::default()
        },
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn simple_merge(successes: &[(String, Value)]) -> String {
    successes
        .iter()
        .map(|(source, value)| {
            let text = render(value);
            let truncated: String = text.chars().take(300).collect();
            format!("[{source}] {truncated}")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

async fn llm_synthesize(llm: &dyn LlmClient, successes: &[(String, Value)]) -> Option<String> {
    let mut prompt = String::from("Combine the following findings into one coherent answer:\n");
    for (source, value) in successes {
        let text: String = render(value).chars().take(250).collect();
        prompt.push_str(&format!("- ({source}) {text}\n"));
    }
    let opts = GenerateOptions {
        timeout: Duration::from_secs(10),
        ..GenerateOptions::default()
    };
    tokio::time::timeout(Duration::from_secs(10), llm.generate(&prompt, opts))
        .await
        .ok()
        .and_then(std::result::Result::ok)
}

/// Nearest-match suggestions via Levenshtein distance, closest first,
/// capped to 3 entries.
#[must_use]
pub fn nearest_capabilities(requested: &str, known: &[String]) -> Vec<String> {
    let mut scored: Vec<(usize, &String)> = known
        .iter()
        .map(|cap| (levenshtein(requested, cap), cap))
        .collect();
    scored.sort_by_key(|(dist, name)| (*dist, (*name).clone()));
    scored.into_iter().take(3).map(|(_, name)| name.clone()).collect()
}

fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j] + cost).min(prev[j + 1] + 1).min(curr[j] + 1);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::test_support::{FixedTool, SlowTool};
    use crate::types::Source;
    use std::sync::atomic::Ordering;

    fn candidate(name: &str, source: Source, priority: u8, tool: Arc<dyn crate::tool::Tool>) -> ToolCandidate {
        ToolCandidate {
            name: name.to_string(),
            source,
            priority,
            tool,
            capabilities: vec!["calculate".to_string()],
        }
    }

    #[tokio::test]
    async fn race_prefers_fast_winner_and_cancels_slow_sibling() {
        let slow = Arc::new(SlowTool::new(Duration::from_secs(5), json!("slow")));
        let fast = Arc::new(FixedTool::new("fast", "calculate", "14"));
        let cancelled_flag = Arc::clone(&slow.cancelled);

        let ranked = vec![
            candidate("fast", Source::Tools, 0, fast),
            candidate("slow", Source::Tools, 1, slow),
        ];

        let result = race(
            &ranked,
            json!("2+3*4"),
            Duration::from_secs(10),
            &CancellationToken::new(),
        )
        .await;
        assert!(result.success);
        assert_eq!(result.result, Some(json!("14")));
        assert!(cancelled_flag.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn synthesize_merges_two_search_results() {
        let a = Arc::new(FixedTool::new("search-a", "search", "result A"));
        let b = Arc::new(FixedTool::new("search-b", "search", "result B"));
        let ranked = vec![
            candidate("search-a", Source::Tools, 0, a),
            candidate("search-b", Source::Skills, 1, b),
        ];

        let result = synthesize(
            &ranked,
            json!("query"),
            Duration::from_secs(10),
            None,
            &CancellationToken::new(),
        )
        .await;
        assert!(result.success);
        assert_eq!(result.meta.synthesized, Some(true));
        assert_eq!(result.meta.sources.as_ref().map(Vec::len), Some(2));
        let text = result.result.unwrap();
        let text = text.as_str().unwrap_or_default();
        assert!(text.contains("result A"));
        assert!(text.contains("result B"));
    }

    #[test]
    fn nearest_capabilities_orders_by_distance() {
        let known = vec!["calculate".to_string(), "search".to_string(), "time".to_string()];
        let suggestions = nearest_capabilities("calculat", &known);
        assert_eq!(suggestions.first(), Some(&"calculate".to_string()));
    }
}
