//! The uniform tool contract.
//!
//! Grounded on the teacher's `Tool`/`DynTool` split (`tool.rs`), collapsed
//! to a single object-safe async trait: the core never needs statically
//! typed `Args`/`Output` associated types, only a uniform
//! `execute(input) -> result` call plus capability metadata.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::ToolError;

/// Static metadata describing a tool, independent of any registration.
#[derive(Debug, Clone)]
pub struct ToolMeta {
    /// Coarse capability tags, e.g. `["calculate"]`.
    pub capabilities: Vec<String>,
    /// Short human-readable description, used in planner prompts.
    pub description: String,
}

impl ToolMeta {
    /// Build metadata with the given capabilities and description.
    #[must_use]
    pub fn new(capabilities: Vec<String>, description: impl Into<String>) -> Self {
        Self {
            capabilities,
            description: description.into(),
        }
    }
}

/// A tool callable through the uniform contract. No tool-specific types
/// leak into the core: every candidate is addressed only through this
/// trait.
#[async_trait]
pub trait Tool: Send + Sync + std::fmt::Debug {
    /// Stable name this tool is registered under.
    fn name(&self) -> &str;

    /// Capability and description metadata.
    fn meta(&self) -> &ToolMeta;

    /// Execute the tool against `input`, cooperatively honoring
    /// cancellation of the enclosing future.
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::{Tool, ToolError, ToolMeta};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// A calculator tool supporting `+ - * /` over two numbers, grounded
    /// on the teacher's `CalculatorTool` integration fixture.
    #[derive(Debug)]
    pub struct CalculatorTool {
        meta: ToolMeta,
    }

    impl Default for CalculatorTool {
        fn default() -> Self {
            Self {
                meta: ToolMeta::new(vec!["calculate".to_string()], "evaluates arithmetic"),
            }
        }
    }

    #[async_trait]
    impl Tool for CalculatorTool {
        fn name(&self) -> &str {
            "calculator"
        }

        fn meta(&self) -> &ToolMeta {
            &self.meta
        }

        async fn execute(&self, input: Value) -> Result<Value, ToolError> {
            let expr = input
                .as_str()
                .ok_or_else(|| ToolError::InvalidInput("calculator".to_string()))?;
            let result = crate::agent::execution::eval_arithmetic(expr)
                .ok_or_else(|| ToolError::InvalidInput("calculator".to_string()))?;
            Ok(json!(result))
        }
    }

    /// A tool that sleeps before succeeding, and flags whether it was
    /// cancelled before completion (used by the racing/timeout tests).
    #[derive(Debug)]
    pub struct SlowTool {
        meta: ToolMeta,
        delay: Duration,
        result: Value,
        pub cancelled: Arc<AtomicBool>,
        pub completed: Arc<AtomicU64>,
    }

    impl SlowTool {
        pub fn new(delay: Duration, result: Value) -> Self {
            Self {
                meta: ToolMeta::new(vec!["calculate".to_string()], "a slow candidate"),
                delay,
                result,
                cancelled: Arc::new(AtomicBool::new(false)),
                completed: Arc::new(AtomicU64::new(0)),
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
            let cancelled = Arc::clone(&self.cancelled);
            struct MarkOnDrop(Arc<AtomicBool>, bool);
            impl Drop for MarkOnDrop {
                fn drop(&mut self) {
                    if !self.1 {
                        self.0.store(true, Ordering::SeqCst);
                    }
                }
            }
            let mut guard = MarkOnDrop(cancelled, false);
            tokio::time::sleep(self.delay).await;
            guard.1 = true;
            self.completed.fetch_add(1, Ordering::SeqCst);
            Ok(self.result.clone())
        }
    }

    /// A tool returning a fixed string, used for synthesis tests.
    #[derive(Debug)]
    pub struct FixedTool {
        name: String,
        meta: ToolMeta,
        value: String,
    }

    impl FixedTool {
        pub fn new(name: impl Into<String>, capability: &str, value: impl Into<String>) -> Self {
            Self {
                name: name.into(),
                meta: ToolMeta::new(vec![capability.to_string()], "returns a fixed value"),
                value: value.into(),
            }
        }
    }

    #[async_trait]
    impl Tool for FixedTool {
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
}
