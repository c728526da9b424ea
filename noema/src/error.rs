//! Error types for the research agent core.
//!
//! Every public entry point returns `Result<T, AgentError>`, or degrades to a
//! structured `{success: false, ...}` value at the orchestrator boundary.
//! Nothing uncaught escapes the crate.

use thiserror::Error;

/// A type alias for `Result<T, AgentError>`.
pub type Result<T> = std::result::Result<T, AgentError>;

/// Errors raised by the LLM collaborator.
#[derive(Debug, Error, Clone)]
pub enum LlmError {
    /// The call did not complete before its timeout.
    #[error("llm call timed out after {0:?}")]
    Timeout(std::time::Duration),

    /// The underlying transport could not be reached.
    #[error("llm connection error: {0}")]
    Connection(String),

    /// The collaborator returned a non-success status.
    #[error("llm http error: status {status}, {message}")]
    Http {
        /// Status code reported by the collaborator.
        status: u16,
        /// Human-readable detail.
        message: String,
    },

    /// The response body could not be interpreted.
    #[error("llm parse error: {0}")]
    Parse(String),
}

/// Errors raised by a tool invocation.
#[derive(Debug, Error, Clone)]
pub enum ToolError {
    /// The tool did not complete before its timeout.
    #[error("tool '{0}' timed out")]
    Timeout(String),

    /// The tool raised an error while executing.
    #[error("tool '{tool}' execution error: {message}")]
    Execution {
        /// Name of the tool that failed.
        tool: String,
        /// The underlying error message.
        message: String,
    },

    /// The input could not be understood by the tool.
    #[error("tool '{0}' received invalid input")]
    InvalidInput(String),

    /// No registered candidate could serve the request.
    #[error("no tool matches '{requested}'")]
    CapabilityMiss {
        /// The name or capability that was requested.
        requested: String,
        /// Nearest-match suggestions, closest first.
        suggestions: Vec<String>,
    },
}

impl ToolError {
    /// Whether this error is terminal (retrying would not help).
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::InvalidInput(_) | Self::CapabilityMiss { .. })
    }
}

/// The top-level error type for agent operations.
#[derive(Debug, Error, Clone)]
pub enum AgentError {
    /// The question failed input validation.
    #[error("invalid input: {0}")]
    Input(String),

    /// An LLM call failed.
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// A tool call failed.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// The planner could not produce a usable plan.
    #[error("plan error: {0}")]
    Plan(String),

    /// The overall request deadline elapsed.
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Anything uncaught, caught at the orchestrator boundary.
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Create a new internal error from any displayable cause.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// A short, stable label used as a metrics key.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Input(_) => "input",
            Self::Llm(LlmError::Timeout(_)) => "llm_timeout",
            Self::Llm(LlmError::Connection(_)) => "llm_connection",
            Self::Llm(LlmError::Http { .. }) => "llm_http",
            Self::Llm(LlmError::Parse(_)) => "llm_parse",
            Self::Tool(ToolError::Timeout(_)) => "tool_timeout",
            Self::Tool(ToolError::Execution { .. }) => "tool_execution",
            Self::Tool(ToolError::InvalidInput(_)) => "tool_invalid_input",
            Self::Tool(ToolError::CapabilityMiss { .. }) => "capability_miss",
            Self::Plan(_) => "plan",
            Self::DeadlineExceeded => "deadline_exceeded",
            Self::Internal(_) => "internal",
        }
    }
}
