//! Convenient imports for building on top of the core.
//!
//! ```rust
//! use noema::prelude::*;
//! ```

pub use crate::agent::execution::ExecutionAgent;
pub use crate::agent::planning::PlanningAgent;
pub use crate::agent::verification::VerificationAgent;
pub use crate::config::{Config, ConfigBuilder};
pub use crate::error::{AgentError, LlmError, Result, ToolError};
pub use crate::llm::{GenerateOptions, LlmClient};
pub use crate::memory::Memory;
pub use crate::orchestrator::{HealthSnapshot, Orchestrator, TaskResponse};
pub use crate::router::TaskRouter;
pub use crate::tool::{Tool, ToolMeta};
pub use crate::toolhub::{ToolCandidate, ToolHub};
pub use crate::trace::{NullTraceContext, Trace, TraceContext};
pub use crate::types::{
    ConversationEntry, Plan, Question, Role, Source, Step, StepResult, TaskContext, ToolResult,
    WorkflowState,
};
pub use crate::workflow::WorkflowEngine;
