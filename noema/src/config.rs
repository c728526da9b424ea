//! Process-wide configuration for the research agent core.
//!
//! Constructed in-process via [`ConfigBuilder`]; no file parsing happens
//! here (that is the out-of-scope concern of the deployment layer).

use std::time::Duration;

/// Tool dispatch settings.
#[derive(Debug, Clone, Copy)]
pub struct ToolsConfig {
    /// Per-tool invocation timeout.
    pub timeout: Duration,
    /// Retry ceiling per dispatch attempt.
    pub max_retries: u32,
    /// Whether `TaskRouter` is consulted before planning.
    pub use_task_router: bool,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            max_retries: 2,
            use_task_router: false,
        }
    }
}

/// Caching settings for the request-level cache.
#[derive(Debug, Clone, Copy)]
pub struct PerformanceConfig {
    /// Whether the request-level cache is consulted.
    pub cache_enabled: bool,
    /// Time-to-live of a cache entry.
    pub cache_ttl: Duration,
    /// Maximum number of cached entries.
    pub cache_capacity: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            cache_enabled: true,
            cache_ttl: Duration::from_secs(3600),
            cache_capacity: 256,
        }
    }
}

/// Trace capture settings.
#[derive(Debug, Clone, Copy)]
pub struct ObservabilityConfig {
    /// Whether a real `TraceContext` is built (vs. the null sink).
    pub enabled: bool,
    /// Ring buffer capacity.
    pub max_events: usize,
    /// Preview truncation length, in characters.
    pub max_preview: usize,
    /// Whether the serialized trace is attached to the response.
    pub include_in_response: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_events: 200,
            max_preview: 500,
            include_in_response: true,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Copy)]
pub struct MemoryConfig {
    /// Maximum number of entries retained, oldest dropped first.
    pub short_term_size: usize,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term_size: 100,
        }
    }
}

/// Task-level settings.
#[derive(Debug, Clone, Copy)]
pub struct TaskConfig {
    /// Overall deadline for one `process_task` call.
    pub timeout: Duration,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
        }
    }
}

/// Root configuration, composed of the per-subsystem sections above.
#[derive(Debug, Clone, Copy, Default)]
pub struct Config {
    /// Tool dispatch settings.
    pub tools: ToolsConfig,
    /// Cache settings.
    pub performance: PerformanceConfig,
    /// Trace settings.
    pub observability: ObservabilityConfig,
    /// Conversation memory settings.
    pub memory: MemoryConfig,
    /// Overall task deadline.
    pub task: TaskConfig,
}

impl Config {
    /// Start building a configuration from defaults.
    #[must_use]
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }
}

/// Fluent builder for [`Config`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Per-tool invocation timeout.
    #[must_use]
    pub const fn tool_timeout(mut self, timeout: Duration) -> Self {
        self.config.tools.timeout = timeout;
        self
    }

    /// Retry ceiling per dispatch attempt.
    #[must_use]
    pub const fn max_retries(mut self, max_retries: u32) -> Self {
        self.config.tools.max_retries = max_retries;
        self
    }

    /// Enable or disable the `TaskRouter` pre-flight classification.
    #[must_use]
    pub const fn use_task_router(mut self, enabled: bool) -> Self {
        self.config.tools.use_task_router = enabled;
        self
    }

    /// Enable or disable the request-level cache.
    #[must_use]
    pub const fn cache_enabled(mut self, enabled: bool) -> Self {
        self.config.performance.cache_enabled = enabled;
        self
    }

    /// Time-to-live of a cache entry.
    #[must_use]
    pub const fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.config.performance.cache_ttl = ttl;
        self
    }

    /// Enable or disable real trace capture.
    #[must_use]
    pub const fn observability_enabled(mut self, enabled: bool) -> Self {
        self.config.observability.enabled = enabled;
        self
    }

    /// Ring buffer capacity for trace events.
    #[must_use]
    pub const fn max_events(mut self, max_events: usize) -> Self {
        self.config.observability.max_events = max_events;
        self
    }

    /// Maximum size of a conversation log before FIFO eviction.
    #[must_use]
    pub const fn short_term_size(mut self, size: usize) -> Self {
        self.config.memory.short_term_size = size;
        self
    }

    /// Overall request deadline.
    #[must_use]
    pub const fn task_timeout(mut self, timeout: Duration) -> Self {
        self.config.task.timeout = timeout;
        self
    }

    /// Finish building.
    #[must_use]
    pub const fn build(self) -> Config {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let cfg = Config::default();
        assert_eq!(cfg.tools.timeout, Duration::from_secs(10));
        assert_eq!(cfg.tools.max_retries, 2);
        assert!(!cfg.tools.use_task_router);
        assert!(cfg.performance.cache_enabled);
        assert_eq!(cfg.performance.cache_ttl, Duration::from_secs(3600));
        assert!(!cfg.observability.enabled);
        assert_eq!(cfg.observability.max_events, 200);
        assert_eq!(cfg.observability.max_preview, 500);
        assert_eq!(cfg.memory.short_term_size, 100);
        assert_eq!(cfg.task.timeout, Duration::from_secs(300));
    }

    #[test]
    fn builder_overrides_fields() {
        let cfg = Config::builder()
            .max_retries(5)
            .cache_enabled(false)
            .observability_enabled(true)
            .build();
        assert_eq!(cfg.tools.max_retries, 5);
        assert!(!cfg.performance.cache_enabled);
        assert!(cfg.observability.enabled);
    }
}
