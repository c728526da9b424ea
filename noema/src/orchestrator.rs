//! Entry point: fast-path detection, snapshot, request cache, trace
//! injection, and the top-level timeout/failure policy.
//!
//! Grounded on the teacher's `Agent`/`Runner` split: `Orchestrator` is
//! built once via construction (no back-pointers, dependencies flow
//! inward only per the design notes) and driven by the stateless
//! [`WorkflowEngine`].

use std::sync::Arc;
use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};
use uuid::Uuid;

use crate::cache::RequestCache;
use crate::config::Config;
use crate::llm::{GenerateOptions, LlmClient};
use crate::memory::Memory;
use crate::metrics::Metrics;
use crate::router::TaskRouter;
use crate::toolhub::ToolHub;
use crate::trace;
use crate::types::{ConversationEntry, Question, Role, TraceEvent};
use crate::workflow::WorkflowEngine;

const GREETINGS: &[&str] = &["hi", "hello", "hey", "yo", "greetings", "hola", "你好", "嗨"];
const GREETING_MAX_LEN: usize = 16;
const GREETING_ANSWER: &str =
    "Hello! I'm a research agent. Ask me a question and I'll plan, investigate, and answer.";

const CAPABILITY_PHRASES: &[&str] = &[
    "what can you do",
    "what are your capabilities",
    "capabilities",
    "what tools do you have",
];

const HISTORY_META_KEYWORDS: &[&str] = &[
    "what did i ask",
    "previous question",
    "what did i just ask",
    "上一个问题",
    "之前问",
];

const CACHE_BYPASS_KEYWORDS: &[&str] = &[
    "now", "today", "time", "just", "previous", "刚刚", "之前", "现在", "今天",
];

/// Response shape returned by [`Orchestrator::process_task`].
#[derive(Debug, Clone)]
pub struct TaskResponse {
    /// Whether the request completed successfully.
    pub success: bool,
    /// The answer text; always present, even on failure.
    pub answer: String,
    /// Free-form reasoning detail, when available.
    pub reasoning: Option<String>,
    /// Accumulated error strings.
    pub errors: Vec<String>,
    /// Serialized trace events, when observability is enabled and
    /// `include_in_response` is set.
    pub trace: Option<Vec<TraceEvent>>,
}

impl TaskResponse {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            answer: "Unable to produce an answer".to_string(),
            reasoning: None,
            errors: vec![error.into()],
            trace: None,
        }
    }
}

/// A snapshot of process health, for the out-of-scope `GET /health`
/// handler to render.
#[derive(Debug, Clone)]
pub struct HealthSnapshot {
    /// Number of distinct tool names registered.
    pub registered_tools: usize,
    /// Current cache entry count.
    pub cache_size: usize,
    /// Seconds since the orchestrator was constructed.
    pub uptime_secs: u64,
}

/// Composes `WorkflowEngine`, `Memory`, an optional `TaskRouter`, and
/// `TraceContext` construction. Intended to be held behind an `Arc` by the
/// out-of-scope HTTP layer.
#[derive(Debug)]
pub struct Orchestrator {
    memory: Memory,
    toolhub: ToolHub,
    llm: Arc<dyn LlmClient>,
    cache: Option<RequestCache>,
    metrics: Metrics,
    config: Config,
    started_at: Instant,
}

impl Orchestrator {
    /// Construct an orchestrator from its owned services.
    #[must_use]
    pub fn new(llm: Arc<dyn LlmClient>, toolhub: ToolHub, config: Config) -> Self {
        let cache = config
            .performance
            .cache_enabled
            .then(|| RequestCache::new(config.performance.cache_capacity, config.performance.cache_ttl));
        Self {
            memory: Memory::new(config.memory.short_term_size),
            toolhub,
            llm,
            cache,
            metrics: Metrics::new(),
            config,
            started_at: Instant::now(),
        }
    }

    /// Process one question end to end.
    pub async fn process_task(&self, question: &str) -> TaskResponse {
        let task_id = Uuid::new_v4();
        let span = info_span!(
            "task",
            question_len = question.chars().count(),
            task_id = %task_id.simple()
        );
        self.process_task_inner(question).instrument(span).await
    }

    async fn process_task_inner(&self, question: &str) -> TaskResponse {
        let validated = match Question::new(question) {
            Ok(q) => q,
            Err(err) => {
                self.metrics.incr("input");
                return TaskResponse::failure(err.to_string());
            }
        };

        if let Some(answer) = self.fast_path(validated.as_str()).await {
            return TaskResponse {
                success: true,
                answer,
                reasoning: None,
                errors: Vec::new(),
                trace: None,
            };
        }

        self.memory.create_snapshot().await;
        self.memory
            .append(ConversationEntry::user(validated.as_str()))
            .await;

        let result = self.run_task(validated).await;

        self.memory.clear_snapshot().await;
        match &result {
            Ok(response) => {
                self.memory
                    .append(ConversationEntry::assistant(response.answer.clone()))
                    .await;
                response.clone()
            }
            Err(err) => {
                self.metrics.incr(err.kind());
                self.memory
                    .append(ConversationEntry::assistant(
                        "Unable to produce an answer".to_string(),
                    ))
                    .await;
                TaskResponse::failure(err.to_string())
            }
        }
    }

    async fn run_task(&self, question: Question) -> Result<TaskResponse, crate::error::AgentError> {
        let fingerprint = question.fingerprint();
        let cache_eligible = !contains_any(&fingerprint, CACHE_BYPASS_KEYWORDS);

        if cache_eligible {
            if let Some(cache) = &self.cache {
                if let Some(answer) = cache.get(&fingerprint).await {
                    return Ok(TaskResponse {
                        success: true,
                        answer,
                        reasoning: None,
                        errors: Vec::new(),
                        trace: None,
                    });
                }
            }
        }

        let trace = trace::build(
            self.config.observability.enabled,
            self.config.observability.max_events,
            self.config.observability.max_preview,
        );

        let task_ctx = if self.config.tools.use_task_router {
            let tool_names: Vec<String> = self.toolhub.inventory().into_iter().map(|(n, _)| n).collect();
            let ctx = TaskRouter::route(self.llm.as_ref(), question.as_str(), &tool_names).await;
            if !ctx.use_tools {
                let answer = self.direct_answer(question.as_str()).await?;
                return Ok(TaskResponse {
                    success: true,
                    answer,
                    reasoning: None,
                    errors: Vec::new(),
                    trace: None,
                });
            }
            Some(ctx)
        } else {
            None
        };

        let token = CancellationToken::new();
        let run = WorkflowEngine::run(
            self.llm.as_ref(),
            &self.toolhub,
            question,
            task_ctx,
            trace.as_ref(),
            self.config.tools.max_retries,
            &token,
        );

        let state = match tokio::time::timeout(self.config.task.timeout, run).await {
            Ok(state) => state,
            Err(_) => {
                token.cancel();
                self.metrics.incr("deadline_exceeded");
                return Err(crate::error::AgentError::DeadlineExceeded);
            }
        };

        let answer = state
            .final_answer
            .clone()
            .unwrap_or_else(|| "Unable to produce an answer".to_string());
        let success = !answer.is_empty() && state.errors.len() < state.step_results.len().max(1);

        if cache_eligible && success {
            if let Some(cache) = &self.cache {
                cache.put(fingerprint, answer.clone()).await;
            }
        }

        let trace_events = (self.config.observability.enabled
            && self.config.observability.include_in_response)
            .then(|| trace.events());

        Ok(TaskResponse {
            success,
            answer,
            reasoning: None,
            errors: state.errors,
            trace: trace_events,
        })
    }

    async fn direct_answer(&self, question: &str) -> Result<String, crate::error::AgentError> {
        let prompt = format!("Answer directly, without using any tools.\nQuestion: {question}");
        self.llm
            .generate(&prompt, GenerateOptions::default())
            .await
            .map_err(crate::error::AgentError::from)
    }

    async fn fast_path(&self, question: &str) -> Option<String> {
        let lower = question.to_lowercase();

        if question.chars().count() <= GREETING_MAX_LEN
            && GREETINGS.iter().any(|g| whole_word_match(&lower, g))
        {
            return Some(GREETING_ANSWER.to_string());
        }

        if contains_any(&lower, CAPABILITY_PHRASES) {
            return Some(self.capability_summary());
        }

        if contains_any(&lower, HISTORY_META_KEYWORDS) {
            return Some(self.history_answer().await);
        }

        None
    }

    fn capability_summary(&self) -> String {
        let names: Vec<String> = self.toolhub.inventory().into_iter().map(|(n, _)| n).collect();
        if names.is_empty() {
            "I can reason directly, but no tools are currently registered.".to_string()
        } else {
            format!("I can use the following tools: {}", names.join(", "))
        }
    }

    async fn history_answer(&self) -> String {
        let recent = self.memory.recent(20, false).await;
        match recent.iter().rev().find(|entry| entry.role == Role::User) {
            Some(entry) => format!("You previously asked: \"{}\"", entry.content),
            None => "You haven't asked anything yet.".to_string(),
        }
    }

    /// A snapshot of process health for the `GET /health` boundary.
    pub async fn health(&self) -> HealthSnapshot {
        HealthSnapshot {
            registered_tools: self.toolhub.inventory().len(),
            cache_size: match &self.cache {
                Some(cache) => cache.len().await,
                None => 0,
            },
            uptime_secs: self.started_at.elapsed().as_secs(),
        }
    }
}

fn whole_word_match(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !c.is_alphanumeric())
        .any(|token| token == word)
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}
