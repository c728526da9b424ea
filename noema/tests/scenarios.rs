//! End-to-end scenarios against the public `Orchestrator` API, using
//! local LLM/tool fixtures (the crate's own scripted fixtures are
//! `pub(crate)` and not visible from here).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::{json, Value};

use noema::prelude::*;

/// Initializes `tracing` output for test runs; ignored on repeat calls
/// since every test in this file shares one process.
fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Default)]
struct ScriptedLlm {
    responses: Mutex<Vec<Result<String, LlmError>>>,
}

impl ScriptedLlm {
    fn new(responses: Vec<Result<String, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses),
        }
    }
}

#[async_trait]
impl LlmClient for ScriptedLlm {
    async fn generate(&self, _prompt: &str, _opts: GenerateOptions) -> Result<String, LlmError> {
        let mut responses = self.responses.lock().expect("lock poisoned");
        if responses.is_empty() {
            return Ok(String::new());
        }
        responses.remove(0)
    }
}

#[derive(Debug)]
struct Calculator {
    meta: ToolMeta,
}

impl Default for Calculator {
    fn default() -> Self {
        Self {
            meta: ToolMeta::new(vec!["calculate".to_string()], "evaluates arithmetic"),
        }
    }
}

#[async_trait]
impl Tool for Calculator {
    fn name(&self) -> &str {
        "calculator"
    }

    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let expr = input.as_str().unwrap_or_default();
        let total: i64 = expr
            .split('+')
            .filter_map(|part| part.trim().parse::<i64>().ok())
            .sum();
        Ok(json!(total.to_string()))
    }
}

#[derive(Debug)]
struct FixedResult {
    name: String,
    meta: ToolMeta,
    value: String,
}

impl FixedResult {
    fn new(name: &str, capability: &str, value: &str) -> Self {
        Self {
            name: name.to_string(),
            meta: ToolMeta::new(vec![capability.to_string()], "returns a fixed value"),
            value: value.to_string(),
        }
    }
}

#[async_trait]
impl Tool for FixedResult {
    fn name(&self) -> &str {
        &self.name
    }

    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        Ok(json!(self.value))
    }
}

#[derive(Debug)]
struct SlowTool {
    meta: ToolMeta,
    delay: Duration,
    cancelled: Arc<AtomicBool>,
    completed: Arc<AtomicU64>,
}

impl SlowTool {
    fn new(delay: Duration, cancelled: Arc<AtomicBool>, completed: Arc<AtomicU64>) -> Self {
        Self {
            meta: ToolMeta::new(vec!["calculate".to_string()], "a slow candidate"),
            delay,
            cancelled,
            completed,
        }
    }
}

#[async_trait]
impl Tool for SlowTool {
    fn name(&self) -> &str {
        "slow"
    }

    fn meta(&self) -> &ToolMeta {
        &self.meta
    }

    async fn execute(&self, _input: Value) -> Result<Value, ToolError> {
        struct MarkOnDrop(Arc<AtomicBool>, bool);
        impl Drop for MarkOnDrop {
            fn drop(&mut self) {
                if !self.1 {
                    self.0.store(true, Ordering::SeqCst);
                }
            }
        }
        let mut guard = MarkOnDrop(Arc::clone(&self.cancelled), false);
        tokio::time::sleep(self.delay).await;
        guard.1 = true;
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(json!("too slow"))
    }
}

fn plan_json(description: &str, tool_type: &str) -> String {
    json!({
        "steps": [{
            "id": 1,
            "description": description,
            "tool_type": tool_type,
            "dependencies": []
        }]
    })
    .to_string()
}

#[tokio::test]
async fn greeting_takes_the_fast_path_with_no_llm_calls() {
    let llm = Arc::new(ScriptedLlm::new(vec![]));
    let hub = ToolHub::new(Duration::from_secs(5), None);
    let orchestrator = Orchestrator::new(llm, hub, Config::default());

    let response = orchestrator.process_task("hello").await;
    assert!(response.success);
    assert!(response.trace.is_none());
}

#[tokio::test]
async fn calculator_plan_produces_numeric_answer() {
    init_tracing();
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(plan_json(
        "2 + 3 + 9",
        "calculator",
    ))]));
    let mut hub = ToolHub::new(Duration::from_secs(5), None);
    hub.register(ToolCandidate {
        name: "calculator".to_string(),
        source: Source::Tools,
        priority: 0,
        tool: Arc::new(Calculator::default()),
        capabilities: vec!["calculate".to_string()],
    });
    let orchestrator = Orchestrator::new(llm, hub, Config::default());

    let response = orchestrator.process_task("what is 2 + 3 + 9?").await;
    assert!(response.success);
    assert_eq!(response.answer, "14");
}

#[tokio::test]
async fn trace_records_a_tool_call_with_nonnegative_duration() {
    init_tracing();
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(plan_json(
        "2 + 3 + 9",
        "calculator",
    ))]));
    let mut hub = ToolHub::new(Duration::from_secs(5), None);
    hub.register(ToolCandidate {
        name: "calculator".to_string(),
        source: Source::Tools,
        priority: 0,
        tool: Arc::new(Calculator::default()),
        capabilities: vec!["calculate".to_string()],
    });
    let config = Config::builder()
        .observability_enabled(true)
        .build();
    let orchestrator = Orchestrator::new(llm, hub, config);

    let response = orchestrator.process_task("what is 2 + 3 + 9?").await;
    assert!(response.success);

    let events = response.trace.expect("trace events included");
    let tool_call = events
        .iter()
        .find(|e| e.phase == "tool_call")
        .expect("a tool_call event was recorded");
    assert!(tool_call.duration_ms.is_some());
    assert_eq!(tool_call.success, Some(true));
}

#[tokio::test]
async fn history_meta_query_recalls_the_prior_turn() {
    let llm = Arc::new(ScriptedLlm::new(vec![
        Ok(plan_json("what time is it?", "none")),
        Ok("it is noon".to_string()),
    ]));
    let hub = ToolHub::new(Duration::from_secs(5), None);
    let orchestrator = Orchestrator::new(llm, hub, Config::default());

    let first = orchestrator.process_task("what time is it?").await;
    assert!(first.success);

    let second = orchestrator.process_task("what did I just ask?").await;
    assert!(second.answer.contains("what time is it?"));
}

#[tokio::test]
async fn multi_candidate_race_cancels_the_slow_sibling() {
    // "calculate" is a pick-best routing key, so two same-named candidates
    // race rather than get merged by synthesis.
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(plan_json("race", "calculate"))]));
    let mut hub = ToolHub::new(Duration::from_secs(10), None);

    let cancelled = Arc::new(AtomicBool::new(false));
    let completed = Arc::new(AtomicU64::new(0));
    hub.register(ToolCandidate {
        name: "calculate".to_string(),
        source: Source::Tools,
        priority: 0,
        tool: Arc::new(FixedResult::new("calculate", "calculate", "fast-answer")),
        capabilities: vec!["calculate".to_string()],
    });
    hub.register(ToolCandidate {
        name: "calculate".to_string(),
        source: Source::Skills,
        priority: 1,
        tool: Arc::new(SlowTool::new(
            Duration::from_secs(5),
            Arc::clone(&cancelled),
            Arc::clone(&completed),
        )),
        capabilities: vec!["calculate".to_string()],
    });

    let orchestrator = Orchestrator::new(llm, hub, Config::default());
    let response = orchestrator.process_task("race these candidates").await;

    assert!(response.success);
    assert_eq!(response.answer, "fast-answer");
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn search_synthesis_merges_two_sources() {
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(plan_json(
        "search for rust async runtimes",
        "search",
    ))]));
    let mut hub = ToolHub::new(Duration::from_secs(5), None);
    hub.register(ToolCandidate {
        name: "search-a".to_string(),
        source: Source::Tools,
        priority: 0,
        tool: Arc::new(FixedResult::new("search-a", "search", "result from source A")),
        capabilities: vec!["search".to_string()],
    });
    hub.register(ToolCandidate {
        name: "search-b".to_string(),
        source: Source::Skills,
        priority: 1,
        tool: Arc::new(FixedResult::new("search-b", "search", "result from source B")),
        capabilities: vec!["search".to_string()],
    });

    let orchestrator = Orchestrator::new(llm, hub, Config::default());
    let response = orchestrator
        .process_task("please search for rust async runtimes")
        .await;

    assert!(response.success);
    assert!(response.answer.contains("result from source A"));
    assert!(response.answer.contains("result from source B"));
}

#[tokio::test]
async fn overall_deadline_produces_a_fast_deterministic_failure() {
    let llm = Arc::new(ScriptedLlm::new(vec![Ok(plan_json("compute", "slow"))]));
    let mut hub = ToolHub::new(Duration::from_secs(10), None);
    let cancelled = Arc::new(AtomicBool::new(false));
    let completed = Arc::new(AtomicU64::new(0));
    hub.register(ToolCandidate {
        name: "slow".to_string(),
        source: Source::Tools,
        priority: 0,
        tool: Arc::new(SlowTool::new(
            Duration::from_secs(10),
            Arc::clone(&cancelled),
            Arc::clone(&completed),
        )),
        capabilities: vec!["calculate".to_string()],
    });

    let config = Config::builder()
        .task_timeout(Duration::from_millis(200))
        .build();
    let orchestrator = Orchestrator::new(llm, hub, config);

    let start = Instant::now();
    let response = orchestrator.process_task("compute something slow").await;

    assert!(!response.success);
    assert!(start.elapsed() < Duration::from_millis(1500));
    assert_eq!(completed.load(Ordering::SeqCst), 0);
}
