//! Decomposes a question into an ordered step list via one LLM call.

use tracing::{info_span, warn, Instrument};

use crate::llm::{GenerateOptions, LlmClient};
use crate::types::{Plan, Step};

/// Tool names always present in the inventory handed to the planner,
/// regardless of what else is registered.
pub const CORE_TOOLS: &[&str] = &["none", "search", "calculator", "clock", "history"];

const MAX_LISTED_TOOLS: usize = 10;

/// LLM-driven question decomposition.
#[derive(Debug, Clone, Copy)]
pub struct PlanningAgent;

impl PlanningAgent {
    /// Decompose `question` into a [`Plan`], given the current tool
    /// inventory (name, description pairs).
    pub async fn decompose(
        llm: &dyn LlmClient,
        question: &str,
        inventory: &[(String, String)],
    ) -> Plan {
        let span = info_span!("planning", question_len = question.chars().count());
        async move {
            let prompt = build_prompt(question, inventory);
            let raw = match llm.generate(&prompt, GenerateOptions::default()).await {
                Ok(text) => text,
                Err(err) => {
                    warn!(error = %err, "planning llm call failed, falling back to single step");
                    return Plan::fallback(question);
                }
            };

            match parse_plan(&raw) {
                Some(mut plan) if !plan.steps.is_empty() && plan.is_well_formed() => {
                    sanitize_tool_types(&mut plan, inventory);
                    plan
                }
                _ => {
                    warn!("planner produced an unusable plan, falling back to single step");
                    Plan::fallback(question)
                }
            }
        }
        .instrument(span)
        .await
    }
}

fn build_prompt(question: &str, inventory: &[(String, String)]) -> String {
    let non_core: Vec<&(String, String)> = inventory
        .iter()
        .filter(|(name, _)| !CORE_TOOLS.contains(&name.as_str()))
        .collect();

    let mut listed = String::new();
    for (name, description) in non_core.iter().take(MAX_LISTED_TOOLS) {
        listed.push_str(&format!("- {name}: {description}\n"));
    }
    if non_core.len() > MAX_LISTED_TOOLS {
        listed.push_str(&format!("{} more available\n", non_core.len() - MAX_LISTED_TOOLS));
    }

    format!(
        "Decompose the question into a JSON plan with a `steps` array. \
         Core tools: {core}. Additional tools:\n{listed}\
         Question: {question}\n\
         Respond with JSON only: {{\"steps\": [{{\"id\":1,\"description\":\"...\",\
         \"tool_type\":\"none\",\"dependencies\":[]}}]}}",
        core = CORE_TOOLS.join(", "),
    )
}

/// Parse plan JSON with tolerance for markdown fences and trailing commas.
fn parse_plan(raw: &str) -> Option<Plan> {
    let cleaned = strip_fences(raw);
    let repaired = strip_trailing_commas(&cleaned);
    serde_json::from_str(&repaired).ok()
}

fn strip_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_start = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    without_start.strip_suffix("```").unwrap_or(without_start).trim().to_string()
}

fn strip_trailing_commas(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c == ',' {
            let mut lookahead = chars.clone();
            while let Some(next) = lookahead.peek() {
                if next.is_whitespace() {
                    lookahead.next();
                } else {
                    break;
                }
            }
            if matches!(lookahead.peek(), Some(']') | Some('}')) {
                continue;
            }
        }
        out.push(c);
    }
    out
}

fn sanitize_tool_types(plan: &mut Plan, inventory: &[(String, String)]) {
    let known: std::collections::HashSet<&str> = CORE_TOOLS
        .iter()
        .copied()
        .chain(inventory.iter().map(|(name, _)| name.as_str()))
        .collect();
    for step in &mut plan.steps {
        if !known.contains(step.tool_type.as_str()) {
            warn!(tool_type = %step.tool_type, "unknown tool type, rewriting to direct reasoning");
            step.tool_type = "none".to_string();
        }
    }
}
