//! The hardest subsystem: multi-source tool registry, task-aware scoring,
//! racing, synthesis, and retry-friendly dispatch.
//!
//! Grounded on the teacher's `ToolSet`/`ToolType` registry shape
//! (`tool/toolset.rs`) for the by-name/by-capability indices, and on
//! `agent/runner.rs::execute_tool_calls` for bounded-concurrency dispatch,
//! generalized here into a cancelling race instead of a wait-for-all.

pub mod racing;
pub mod scoring;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::error::ToolError;
use crate::llm::LlmClient;
use crate::tool::Tool;
use crate::types::{Source, TaskContext, ToolResult, ToolResultMeta};

/// A registered tool candidate. Immutable after registration.
#[derive(Clone)]
pub struct ToolCandidate {
    /// Name this candidate is addressed by.
    pub name: String,
    /// Which registration source this candidate came from.
    pub source: Source,
    /// Ranking priority: 0 (local) < 1 (skill) < 2 (mcp).
    pub priority: u8,
    /// The callable handle.
    pub tool: Arc<dyn Tool>,
    /// Capability tags, derived from the tool's own metadata.
    pub capabilities: Vec<String>,
}

impl std::fmt::Debug for ToolCandidate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolCandidate")
            .field("name", &self.name)
            .field("source", &self.source)
            .field("priority", &self.priority)
            .field("capabilities", &self.capabilities)
            .finish_non_exhaustive()
    }
}

impl ToolCandidate {
    /// A unique identity for recency tracking: name qualified by source.
    #[must_use]
    pub fn identity(&self) -> String {
        format!("{}@{:?}", self.name, self.source)
    }
}

/// Pre-declared capability/pick-best routing buckets (spec §4.6.3).
const PICK_BEST_KEYS: &[&str] = &["calculate", "time"];
const SYNTHESIZE_KEYS: &[&str] = &["search", "extract"];

/// The multi-source tool registry and dispatcher.
#[derive(Debug)]
pub struct ToolHub {
    by_name: HashMap<String, Vec<ToolCandidate>>,
    by_capability: HashMap<String, Vec<ToolCandidate>>,
    last_success: Mutex<HashMap<String, String>>,
    timeout: Duration,
    llm: Option<Arc<dyn LlmClient>>,
}

impl ToolHub {
    /// Build an empty hub. `llm` is consulted for evidence synthesis; when
    /// `None`, synthesis always falls back to the simple merge.
    #[must_use]
    pub fn new(timeout: Duration, llm: Option<Arc<dyn LlmClient>>) -> Self {
        Self {
            by_name: HashMap::new(),
            by_capability: HashMap::new(),
            last_success: Mutex::new(HashMap::new()),
            timeout,
            llm,
        }
    }

    /// Register a candidate under its name and every declared capability.
    pub fn register(&mut self, candidate: ToolCandidate) {
        for cap in &candidate.capabilities {
            self.by_capability
                .entry(cap.clone())
                .or_default()
                .push(candidate.clone());
        }
        self.by_name
            .entry(candidate.name.clone())
            .or_default()
            .push(candidate);
    }

    /// Short descriptions of every registered tool, for planner prompts.
    #[must_use]
    pub fn inventory(&self) -> Vec<(String, String)> {
        let mut seen = std::collections::HashSet::new();
        let mut out = Vec::new();
        for candidates in self.by_name.values() {
            if let Some(candidate) = candidates.first() {
                if seen.insert(candidate.name.clone()) {
                    out.push((
                        candidate.name.clone(),
                        candidate.tool.meta().description.clone(),
                    ));
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }

    /// All distinct capability tags known to the registry.
    #[must_use]
    pub fn known_capabilities(&self) -> Vec<String> {
        let mut caps: Vec<String> = self.by_capability.keys().cloned().collect();
        caps.sort();
        caps
    }

    /// Dispatch by exact tool name.
    pub async fn execute(
        &self,
        name: &str,
        input: Value,
        task_ctx: Option<&TaskContext>,
        token: &CancellationToken,
    ) -> ToolResult {
        let candidates = self.by_name.get(name).cloned().unwrap_or_default();
        self.dispatch(name, candidates, input, task_ctx, token).await
    }

    /// Dispatch by capability; on unknown capability, suggest nearest
    /// matches rather than crash.
    pub async fn execute_by_capability(
        &self,
        capability: &str,
        input: Value,
        task_ctx: Option<&TaskContext>,
        token: &CancellationToken,
    ) -> ToolResult {
        let candidates = self.by_capability.get(capability).cloned().unwrap_or_default();
        if candidates.is_empty() {
            let suggestions = racing::nearest_capabilities(capability, &self.known_capabilities());
            return ToolResult {
                success: false,
                result: None,
                error: Some("no_match".to_string()),
                meta: ToolResultMeta {
                    suggestions: Some(suggestions),
                    ..ToolResultMeta::default()
                },
            };
        }
        self.dispatch(capability, candidates, input, task_ctx, token).await
    }

    async fn dispatch(
        &self,
        key: &str,
        candidates: Vec<ToolCandidate>,
        input: Value,
        task_ctx: Option<&TaskContext>,
        token: &CancellationToken,
    ) -> ToolResult {
        if candidates.is_empty() {
            return ToolResult {
                success: false,
                result: None,
                error: Some(ToolError::CapabilityMiss {
                    requested: key.to_string(),
                    suggestions: racing::nearest_capabilities(key, &self.known_capabilities()),
                }
                .to_string()),
                meta: ToolResultMeta::default(),
            };
        }

        let last_success_identity = self.last_success.lock().await.get(key).cloned();
        let ranked = racing::rank(candidates, task_ctx, last_success_identity.as_deref());

        if ranked.is_empty() {
            return ToolResult {
                success: false,
                result: None,
                error: Some("no_match".to_string()),
                meta: ToolResultMeta {
                    suggestions: Some(racing::nearest_capabilities(
                        key,
                        &self.known_capabilities(),
                    )),
                    ..ToolResultMeta::default()
                },
            };
        }

        let strategy = choose_strategy(key, ranked.len());
        let result = match strategy {
            Strategy::PickBest => racing::race(&ranked, input, self.timeout, token).await,
            Strategy::Synthesize => {
                racing::synthesize(&ranked, input, self.timeout, self.llm.as_deref(), token).await
            }
        };

        if result.success {
            if let Some(source) = result.meta.source.clone() {
                self.last_success.lock().await.insert(key.to_string(), source);
            }
        }
        result
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strategy {
    PickBest,
    Synthesize,
}

fn choose_strategy(key: &str, candidate_count: usize) -> Strategy {
    if candidate_count <= 1 {
        Strategy::PickBest
    } else if PICK_BEST_KEYS.contains(&key) {
        Strategy::PickBest
    } else if SYNTHESIZE_KEYS.contains(&key) {
        Strategy::Synthesize
    } else if candidate_count > 3 {
        Strategy::PickBest
    } else {
        Strategy::Synthesize
    }
}
