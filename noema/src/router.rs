//! Optional pre-flight classification of a question into a
//! [`TaskContext`], via a single LLM call with tolerant JSON parsing.

use crate::llm::{GenerateOptions, LlmClient};
use crate::types::TaskContext;

/// Stateless router: one call in, one `TaskContext` out.
#[derive(Debug, Clone, Copy)]
pub struct TaskRouter;

impl TaskRouter {
    /// Classify `question` given the currently known tool names.
    pub async fn route(llm: &dyn LlmClient, question: &str, tool_names: &[String]) -> TaskContext {
        let prompt = format!(
            "Classify the question for tool routing. Known tools: {}\n\
             Question: {question}\n\
             Respond with JSON only: {{\"use_tools\":true,\"capability_tags\":[],\
             \"attribute_tags\":{{\"timeliness\":\"medium\",\"reliability\":\"medium\",\
             \"cost_sensitivity\":\"medium\"}},\"adapt_carriers\":[\"tools\",\"skills\",\"mcps\"]}}",
            tool_names.join(", "),
        );

        match llm.generate(&prompt, GenerateOptions::default()).await {
            Ok(raw) => serde_json::from_str(raw.trim()).unwrap_or_default(),
            Err(_) => TaskContext::default(),
        }
    }
}
