//! The data model shared across the pipeline.
//!
//! Types here are deliberately plain data: mutation is expressed by
//! constructing a new value or appending to a collection, never by
//! reaching into a sibling's internals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An immutable, validated question fed to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question(String);

/// Maximum accepted length, after trimming.
pub const MAX_QUESTION_LEN: usize = 5000;

impl Question {
    /// Validate and wrap raw input text.
    ///
    /// # Errors
    ///
    /// Returns [`crate::error::AgentError::Input`] if the trimmed text is
    /// empty or exceeds [`MAX_QUESTION_LEN`].
    pub fn new(raw: impl Into<String>) -> crate::error::Result<Self> {
        let trimmed = raw.into().trim().to_string();
        if trimmed.is_empty() {
            return Err(crate::error::AgentError::Input(
                "question is empty".to_string(),
            ));
        }
        if trimmed.chars().count() > MAX_QUESTION_LEN {
            return Err(crate::error::AgentError::Input(format!(
                "question exceeds {MAX_QUESTION_LEN} characters"
            )));
        }
        Ok(Self(trimmed))
    }

    /// Borrow the validated text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Lowercased, trimmed fingerprint used for cache lookups.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        self.0.to_lowercase()
    }
}

impl std::fmt::Display for Question {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Who authored a [`ConversationEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// A human-supplied question.
    User,
    /// The orchestrator's reply.
    Assistant,
}

/// One immutable turn in the conversation log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationEntry {
    /// Who produced this entry.
    pub role: Role,
    /// The entry's text.
    pub content: String,
    /// When the entry was created.
    pub timestamp: DateTime<Utc>,
    /// Optional free-form metadata.
    pub metadata: Option<Value>,
}

impl ConversationEntry {
    /// Build a user entry stamped with the current time.
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }

    /// Build an assistant entry stamped with the current time.
    #[must_use]
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
            timestamp: Utc::now(),
            metadata: None,
        }
    }
}

/// A point-in-time copy of the conversation sequence, taken before the
/// current user entry is appended.
pub type MemorySnapshot = Vec<ConversationEntry>;

/// What a plan step asks for: direct reasoning, or a named tool/capability.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    /// Answer using the LLM alone, no tool dispatch.
    DirectReasoning,
    /// Dispatch to a tool or capability by name.
    ToolInvocation {
        /// The requested tool or capability name.
        name: String,
    },
}

/// One node in a [`Plan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    /// Dense, 1-based identifier, unique within a plan.
    pub id: u32,
    /// Natural-language description of the work.
    pub description: String,
    /// `"none"` for direct reasoning, else a tool/capability name.
    pub tool_type: String,
    /// IDs of steps this one depends on; each must be smaller than `id`.
    pub dependencies: Vec<u32>,
    /// Optional complexity estimate, 1-5.
    pub complexity: Option<u32>,
    /// Optional estimated duration in seconds.
    pub estimated_time: Option<u32>,
}

impl Step {
    /// The tagged-variant view of `tool_type`.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        if self.tool_type == "none" {
            StepKind::DirectReasoning
        } else {
            StepKind::ToolInvocation {
                name: self.tool_type.clone(),
            }
        }
    }
}

/// An ordered sequence of steps produced by the planner.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Plan {
    /// The steps, in execution order.
    pub steps: Vec<Step>,
    /// Groups of step IDs the source system marks as parallelizable.
    ///
    /// Declared but not executed in parallel — see the design notes on
    /// mirroring sequential execution.
    #[serde(default)]
    pub parallel_groups: Option<Vec<Vec<u32>>>,
    /// Optional total estimated duration in seconds.
    #[serde(default)]
    pub total_estimated_time: Option<u32>,
}

impl Plan {
    /// A single-step fallback plan that reasons directly over `question`.
    #[must_use]
    pub fn fallback(question: &str) -> Self {
        Self {
            steps: vec![Step {
                id: 1,
                description: question.to_string(),
                tool_type: "none".to_string(),
                dependencies: Vec::new(),
                complexity: None,
                estimated_time: None,
            }],
            parallel_groups: None,
            total_estimated_time: None,
        }
    }

    /// Step IDs unique and dense from 1, and every dependency refers to a
    /// smaller step ID.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        if self.steps.is_empty() {
            return false;
        }
        for (idx, step) in self.steps.iter().enumerate() {
            if step.id != u32::try_from(idx).unwrap_or(u32::MAX) + 1 {
                return false;
            }
            if step.dependencies.iter().any(|&dep| dep >= step.id) {
                return false;
            }
        }
        true
    }
}

/// Outcome of executing one [`Step`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// The step this result belongs to.
    pub step_id: u32,
    /// Whether the step completed successfully.
    pub success: bool,
    /// The produced value, if any.
    pub result: Option<Value>,
    /// How the result was obtained: `"direct_reasoning"`, `"tool:<name>"`, …
    pub method: String,
    /// Error detail, if `success` is false.
    pub error: Option<String>,
    /// Free-form metadata (e.g. verification findings, tool sources).
    pub meta: Option<Value>,
}

impl StepResult {
    /// Render `result` as text for prompts, verification, and previews.
    #[must_use]
    pub fn result_text(&self) -> String {
        match &self.result {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => self.error.clone().unwrap_or_default(),
        }
    }
}

/// Router-derived classification of a question, propagated through
/// `WorkflowState.metadata` and consumed by `ToolHub` scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskContext {
    /// Whether tools should be consulted at all.
    pub use_tools: bool,
    /// Coarse capability tags the question implies.
    pub capability_tags: Vec<String>,
    /// Attribute preferences used by candidate scoring.
    pub attribute_tags: AttributeTags,
    /// Candidate sources the router suggests preferring.
    pub adapt_carriers: Vec<String>,
}

impl Default for TaskContext {
    fn default() -> Self {
        Self {
            use_tools: true,
            capability_tags: Vec::new(),
            attribute_tags: AttributeTags::default(),
            adapt_carriers: vec![
                "tools".to_string(),
                "skills".to_string(),
                "mcps".to_string(),
            ],
        }
    }
}

/// A coarse three-level attribute preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Level {
    /// Low preference.
    Low,
    /// Middling preference.
    Medium,
    /// High preference.
    High,
}

impl Default for Level {
    fn default() -> Self {
        Self::Medium
    }
}

/// The three attribute dimensions considered by candidate scoring.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct AttributeTags {
    /// Preference for up-to-date results.
    pub timeliness: Level,
    /// Preference for dependable sources.
    pub reliability: Level,
    /// Preference for cheap sources.
    pub cost_sensitivity: Level,
}

/// The registry source a [`crate::tool::Tool`] candidate was added under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Source {
    /// A local, in-process tool.
    Tools,
    /// A skill-backed candidate.
    Skills,
    /// A remote MCP-backed candidate.
    Mcps,
}

impl Source {
    /// The local/skill/mcp unit cost used by cost scoring (§4.6.2).
    #[must_use]
    pub const fn unit_cost(self) -> f64 {
        match self {
            Self::Tools => 9.0,
            Self::Skills => 7.0,
            Self::Mcps => 4.0,
        }
    }

    /// Stable ordinal used for tie-break `(priority, source, name)`.
    #[must_use]
    pub const fn ordinal(self) -> u8 {
        match self {
            Self::Tools => 0,
            Self::Skills => 1,
            Self::Mcps => 2,
        }
    }
}

/// Result of a tool invocation, as seen by `ToolHub` callers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// Whether the call succeeded.
    pub success: bool,
    /// The produced value, if any.
    pub result: Option<Value>,
    /// Error detail, if `success` is false.
    pub error: Option<String>,
    /// Metadata describing provenance and (for multi-candidate calls)
    /// synthesis detail.
    pub meta: ToolResultMeta,
}

/// Metadata attached to a [`ToolResult`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ToolResultMeta {
    /// Name of the winning candidate, if any.
    pub source: Option<String>,
    /// Whether this result was assembled from multiple candidates.
    pub synthesized: Option<bool>,
    /// Names of the candidates that contributed.
    pub sources: Option<Vec<String>>,
    /// Errors from candidates that did not contribute.
    pub errors: Option<Vec<String>>,
    /// Nearest-match suggestions on a capability miss.
    pub suggestions: Option<Vec<String>>,
}

/// Mutable pipeline state threaded through the workflow nodes.
#[derive(Debug, Clone)]
pub struct WorkflowState {
    /// The question being answered.
    pub question: Question,
    /// The plan, once produced by the planning node.
    pub task_plan: Option<Plan>,
    /// Index of the next step to execute (0-based).
    pub current_step: usize,
    /// Results appended in execution order.
    pub step_results: Vec<StepResult>,
    /// The synthesized answer, once produced.
    pub final_answer: Option<String>,
    /// Accumulated error strings.
    pub errors: Vec<String>,
    /// Router context and trace handle, if present.
    pub metadata: WorkflowMetadata,
}

/// Side-channel metadata carried on [`WorkflowState`].
#[derive(Debug, Clone, Default)]
pub struct WorkflowMetadata {
    /// Router-derived task classification, if routing is enabled.
    pub task_ctx: Option<TaskContext>,
    /// Verification findings, keyed by step ID.
    pub verifications: Vec<(u32, VerificationFinding)>,
}

/// Outcome of [`crate::agent::verification::VerificationAgent::verify`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationFinding {
    /// Whether the step passed every check.
    pub verified: bool,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable issues found, if any.
    pub issues: Vec<String>,
}

impl WorkflowState {
    /// Start a fresh workflow run for `question`.
    #[must_use]
    pub fn new(question: Question) -> Self {
        Self {
            question,
            task_plan: None,
            current_step: 0,
            step_results: Vec::new(),
            final_answer: None,
            errors: Vec::new(),
            metadata: WorkflowMetadata::default(),
        }
    }

    /// Number of steps in the plan, or 0 if no plan has been produced yet.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.task_plan.as_ref().map_or(0, |p| p.steps.len())
    }

    /// Whether every planned step has been executed.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.current_step >= self.step_count()
    }
}

/// A phase-tagged observation captured by [`crate::trace::TraceContext`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    /// The pipeline phase this event belongs to.
    pub phase: String,
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Wall-clock duration, for paired start/end events.
    pub duration_ms: Option<u64>,
    /// Outcome, for events that report success/failure.
    pub success: Option<bool>,
    /// The step ID this event relates to, if any.
    pub step_id: Option<u32>,
    /// The tool type this event relates to, if any.
    pub tool_type: Option<String>,
    /// Truncated preview of the input.
    pub input_preview: Option<String>,
    /// Truncated preview of the output.
    pub output_preview: Option<String>,
}
