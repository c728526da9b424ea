//! Per-step dispatch: direct reasoning vs. tool call, with input
//! extraction, template substitution, retry, and output formatting.

use std::time::Instant;

use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;
use tracing::{info_span, warn, Instrument};

use crate::llm::{GenerateOptions, LlmClient};
use crate::retry::with_retry;
use crate::toolhub::ToolHub;
use crate::trace::{elapsed_ms, Trace};
use crate::types::{Step, StepKind, StepResult, TaskContext};

/// Dispatches and formats the outcome of one plan step.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionAgent;

impl ExecutionAgent {
    /// Execute `step`, given prior results for template substitution and
    /// digesting, an optional task context, and a retry ceiling.
    #[allow(clippy::too_many_arguments)]
    pub async fn execute_step(
        llm: &dyn LlmClient,
        toolhub: &ToolHub,
        step: &Step,
        prior: &[StepResult],
        task_ctx: Option<&TaskContext>,
        max_retries: u32,
        trace: &dyn Trace,
        token: &CancellationToken,
    ) -> StepResult {
        let span = info_span!("step", step_id = step.id, tool_type = %step.tool_type);
        async move {
            match step.kind() {
                StepKind::DirectReasoning => direct_reason(llm, step, prior, trace).await,
                StepKind::ToolInvocation { name } => {
                    tool_invoke(
                        llm, toolhub, step, &name, prior, task_ctx, max_retries, trace, token,
                    )
                    .await
                }
            }
        }
        .instrument(span)
        .await
    }
}

async fn direct_reason(
    llm: &dyn LlmClient,
    step: &Step,
    prior: &[StepResult],
    trace: &dyn Trace,
) -> StepResult {
    trace.on_reasoning_start(step.id);
    let start = Instant::now();
    let digest = digest_prior(prior, 500);
    let description = substitute_placeholders(&step.description, prior);
    let prompt = format!(
        "Answer the following step directly.\nStep: {description}\nPrior results:\n{digest}"
    );
    let result = match llm.generate(&prompt, GenerateOptions::default()).await {
        Ok(text) => StepResult {
            step_id: step.id,
            success: true,
            result: Some(json!(text)),
            method: "direct_reasoning".to_string(),
            error: None,
            meta: None,
        },
        Err(err) => StepResult {
            step_id: step.id,
            success: false,
            result: None,
            method: "direct_reasoning".to_string(),
            error: Some(err.to_string()),
            meta: None,
        },
    };
    trace.on_reasoning_end(step.id, elapsed_ms(start), result.success);
    result
}

#[allow(clippy::too_many_arguments)]
async fn tool_invoke(
    llm: &dyn LlmClient,
    toolhub: &ToolHub,
    step: &Step,
    tool_type: &str,
    prior: &[StepResult],
    task_ctx: Option<&TaskContext>,
    max_retries: u32,
    trace: &dyn Trace,
    token: &CancellationToken,
) -> StepResult {
    let description = substitute_placeholders(&step.description, prior);
    let input = extract_input(tool_type, &description);
    let capability = infer_capability(&description);

    let start = Instant::now();
    let outcome = with_retry(
        max_retries,
        |err: &crate::error::ToolError| err.is_terminal(),
        |_attempt| async {
            let result = toolhub
                .execute(tool_type, input.clone(), task_ctx, token)
                .await;
            if result.success {
                Ok(result)
            } else {
                let fallback = toolhub
                    .execute_by_capability(&capability, input.clone(), task_ctx, token)
                    .await;
                if fallback.success {
                    Ok(fallback)
                } else {
                    Err(crate::error::ToolError::Execution {
                        tool: tool_type.to_string(),
                        message: fallback.error.unwrap_or_default(),
                    })
                }
            }
        },
    )
    .await;

    match outcome {
        Ok(tool_result) => {
            let text = tool_result
                .result
                .as_ref()
                .map_or_else(String::new, |v| match v {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                });
            trace.on_tool_call(step.id, tool_type, elapsed_ms(start), true);
            StepResult {
                step_id: step.id,
                success: true,
                result: Some(json!(format_output(tool_type, &text))),
                method: format!("tool:{tool_type}"),
                error: None,
                meta: serde_json::to_value(&tool_result.meta).ok(),
            }
        }
        Err(err) => {
            trace.on_tool_call(step.id, tool_type, elapsed_ms(start), false);
            warn!(error = %err, "tool dispatch exhausted retries, falling back to direct reasoning");
            direct_reason(llm, step, prior, trace).await
        }
    }
}

fn digest_prior(prior: &[StepResult], budget: usize) -> String {
    prior
        .iter()
        .filter(|r| r.success)
        .map(|r| truncate_sentence(&r.result_text(), budget))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Resolve `{step_<k>_result}` placeholders against `prior` (1-indexed).
#[must_use]
pub fn substitute_placeholders(description: &str, prior: &[StepResult]) -> String {
    let mut out = description.to_string();
    for (idx, result) in prior.iter().enumerate() {
        let placeholder = format!("{{step_{}_result}}", idx + 1);
        if out.contains(&placeholder) {
            out = out.replace(&placeholder, &result.result_text());
        }
    }
    out
}

/// Type-specific input extraction heuristics (spec §4.4 step a).
#[must_use]
pub fn extract_input(tool_type: &str, description: &str) -> Value {
    match tool_type {
        "calculator" => json!(extract_arithmetic(description).unwrap_or_default()),
        "search" => json!(extract_search_query(description)),
        "clock" => json!(description),
        "history" => json!(classify_history_query(description)),
        _ => json!(description),
    }
}

fn extract_arithmetic(description: &str) -> Option<String> {
    let mut best: Option<String> = None;
    let mut current = String::new();
    for c in description.chars() {
        if "0123456789+-*/().".contains(c) || c.is_whitespace() {
            current.push(c);
        } else {
            if current.trim().chars().any(|c| c.is_ascii_digit()) && best.is_none() {
                best = Some(current.trim().to_string());
            }
            current.clear();
        }
    }
    if current.trim().chars().any(|c| c.is_ascii_digit()) && best.is_none() {
        best = Some(current.trim().to_string());
    }
    best
}

const INSTRUCTION_VERBS: &[&str] = &[
    "search", "find", "look", "up", "for", "please", "can", "you", "me", "tell",
];

fn extract_search_query(description: &str) -> String {
    description
        .chars()
        .map(|c| if c.is_ascii_punctuation() { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .filter(|word| !INSTRUCTION_VERBS.contains(&word.to_lowercase().as_str()))
        .collect::<Vec<_>>()
        .join(" ")
}

fn classify_history_query(description: &str) -> String {
    let lower = description.to_lowercase();
    if let Some(n) = lower
        .split_whitespace()
        .find_map(|word| word.parse::<u32>().ok())
    {
        return n.to_string();
    }
    if lower.contains("just") || lower.contains("previous") || lower.contains("last") {
        if lower.contains("user") || lower.contains("i ask") || lower.contains("我") {
            return "last_user".to_string();
        }
        return "last".to_string();
    }
    if lower.contains("all") || lower.contains("everything") {
        return "all".to_string();
    }
    "last".to_string()
}

/// Map a step description to a ToolHub capability by keyword (spec §4.4
/// step c).
#[must_use]
pub fn infer_capability(description: &str) -> String {
    let lower = description.to_lowercase();
    if lower.contains("search") || lower.contains("find") || lower.contains("查") {
        "search".to_string()
    } else if lower.contains("compute") || lower.contains("calc") || lower.contains("计算") {
        "calculate".to_string()
    } else if lower.contains("time") || lower.contains("date") || lower.contains("几点") {
        "time".to_string()
    } else {
        "general".to_string()
    }
}

fn budget_for(tool_type: &str) -> usize {
    match tool_type {
        "calculator" => 100,
        "clock" => 200,
        "search" => 500,
        "history" => 1000,
        _ => 500,
    }
}

/// Format a tool's raw output per its length budget, truncating at the
/// nearest sentence boundary.
#[must_use]
pub fn format_output(tool_type: &str, text: &str) -> String {
    truncate_sentence(text, budget_for(tool_type))
}

fn truncate_sentence(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let truncated: String = text.chars().take(budget).collect();
    if let Some(idx) = truncated.rfind(['.', '!', '?']) {
        return truncated[..=idx].to_string();
    }
    truncated
}

/// A minimal arithmetic evaluator over `+ - * / ( )`, used by the
/// calculator test fixture tool.
#[must_use]
pub(crate) fn eval_arithmetic(expr: &str) -> Option<f64> {
    let tokens = tokenize(expr)?;
    let mut pos = 0;
    let value = parse_expr(&tokens, &mut pos)?;
    if pos == tokens.len() {
        Some(value)
    } else {
        None
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Option<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            let num: f64 = chars[start..i].iter().collect::<String>().parse().ok()?;
            tokens.push(Token::Num(num));
        } else {
            tokens.push(match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => return None,
            });
            i += 1;
        }
    }
    Some(tokens)
}

fn parse_expr(tokens: &[Token], pos: &mut usize) -> Option<f64> {
    let mut value = parse_term(tokens, pos)?;
    while let Some(tok) = tokens.get(*pos) {
        match tok {
            Token::Plus => {
                *pos += 1;
                value += parse_term(tokens, pos)?;
            }
            Token::Minus => {
                *pos += 1;
                value -= parse_term(tokens, pos)?;
            }
            _ => break,
        }
    }
    Some(value)
}

fn parse_term(tokens: &[Token], pos: &mut usize) -> Option<f64> {
    let mut value = parse_factor(tokens, pos)?;
    while let Some(tok) = tokens.get(*pos) {
        match tok {
            Token::Star => {
                *pos += 1;
                value *= parse_factor(tokens, pos)?;
            }
            Token::Slash => {
                *pos += 1;
                let divisor = parse_factor(tokens, pos)?;
                if divisor == 0.0 {
                    return None;
                }
                value /= divisor;
            }
            _ => break,
        }
    }
    Some(value)
}

fn parse_factor(tokens: &[Token], pos: &mut usize) -> Option<f64> {
    match tokens.get(*pos) {
        Some(Token::Num(n)) => {
            *pos += 1;
            Some(*n)
        }
        Some(Token::Minus) => {
            *pos += 1;
            Some(-parse_factor(tokens, pos)?)
        }
        Some(Token::LParen) => {
            *pos += 1;
            let value = parse_expr(tokens, pos)?;
            match tokens.get(*pos) {
                Some(Token::RParen) => {
                    *pos += 1;
                    Some(value)
                }
                _ => None,
            }
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_arithmetic_from_prose() {
        let extracted = extract_arithmetic("please compute 2 + 3 * 4 for me");
        assert_eq!(extracted.as_deref(), Some("2 + 3 * 4"));
    }

    #[test]
    fn eval_respects_precedence() {
        assert_eq!(eval_arithmetic("2 + 3 * 4"), Some(14.0));
        assert_eq!(eval_arithmetic("(2 + 3) * 4"), Some(20.0));
        assert_eq!(eval_arithmetic("10 / 0"), None);
    }

    #[test]
    fn search_query_strips_instruction_verbs() {
        let query = extract_search_query("please search for rust async runtimes");
        assert_eq!(query, "rust async runtimes");
    }

    #[test]
    fn history_query_classification() {
        assert_eq!(classify_history_query("what did I just ask?"), "last");
        assert_eq!(classify_history_query("what did I just ask, user?"), "last_user");
        assert_eq!(classify_history_query("show me all my questions"), "all");
        assert_eq!(classify_history_query("show last 3 entries"), "3");
    }

    #[test]
    fn format_output_truncates_at_sentence_boundary() {
        let long = "First sentence. Second sentence is much longer than the rest of it. Third.";
        let formatted = format_output("calculator", long);
        assert!(formatted.chars().count() <= 100);
        assert!(formatted.ends_with('.'));
    }

    #[test]
    fn placeholder_substitution_reads_prior_result() {
        let prior = vec![StepResult {
            step_id: 1,
            success: true,
            result: Some(json!("42")),
            method: "direct_reasoning".to_string(),
            error: None,
            meta: None,
        }];
        let resolved = substitute_placeholders("the answer is {step_1_result}", &prior);
        assert_eq!(resolved, "the answer is 42");
    }
}
