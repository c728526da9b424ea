//! Phase-tagged event capture, with a zero-cost null sink when disabled.
//!
//! Grounded on the teacher's `NoopRunHooks` (same-interface, no-op)
//! pattern from `callback/noop.rs`, generalized from typed callbacks to a
//! bounded ring buffer of [`TraceEvent`]s.

use std::collections::VecDeque;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::types::TraceEvent;

fn truncate_preview(text: &str, max_preview: usize) -> String {
    match text.char_indices().nth(max_preview) {
        Some((byte_idx, _)) => text[..byte_idx].to_string(),
        None => text.to_string(),
    }
}

/// Capture sink for pipeline events, implemented either as a real ring
/// buffer or a zero-cost null object.
pub trait Trace: std::fmt::Debug + Send + Sync {
    /// Record the start of planning.
    fn on_planning_start(&self, input_preview: &str);
    /// Record the end of planning.
    fn on_planning_end(&self, duration_ms: u64, success: bool, output_preview: &str);
    /// Record the start of a step.
    fn on_step_start(&self, step_id: u32, tool_type: &str);
    /// Record the end of a step.
    fn on_step_end(&self, step_id: u32, duration_ms: u64, success: bool);
    /// Record a tool call.
    fn on_tool_call(&self, step_id: u32, tool_type: &str, duration_ms: u64, success: bool);
    /// Record direct-reasoning start.
    fn on_reasoning_start(&self, step_id: u32);
    /// Record direct-reasoning end.
    fn on_reasoning_end(&self, step_id: u32, duration_ms: u64, success: bool);
    /// Record a verification finding.
    fn on_verification(&self, step_id: u32, confidence: f64);
    /// Record the start of multi-candidate synthesis.
    fn on_evidence_synthesis_start(&self);
    /// Record the end of multi-candidate synthesis.
    fn on_evidence_synthesis_end(&self, duration_ms: u64, source_count: usize);
    /// Snapshot the captured events, most-recent-last.
    fn events(&self) -> Vec<TraceEvent>;
}

/// Real ring-buffer backed trace context.
#[derive(Debug)]
pub struct TraceContext {
    max_events: usize,
    max_preview: usize,
    events: Mutex<VecDeque<TraceEvent>>,
}

impl TraceContext {
    /// Build a trace context bounded to `max_events`, truncating previews
    /// at `max_preview` characters.
    #[must_use]
    pub fn new(max_events: usize, max_preview: usize) -> Self {
        Self {
            max_events,
            max_preview,
            events: Mutex::new(VecDeque::new()),
        }
    }

    fn push(&self, event: TraceEvent) {
        if let Ok(mut events) = self.events.try_lock() {
            events.push_back(event);
            while events.len() > self.max_events {
                events.pop_front();
            }
        }
    }

    fn base(&self, phase: &str) -> TraceEvent {
        TraceEvent {
            phase: phase.to_string(),
            timestamp: Utc::now(),
            duration_ms: None,
            success: None,
            step_id: None,
            tool_type: None,
            input_preview: None,
            output_preview: None,
        }
    }
}

impl Trace for TraceContext {
    fn on_planning_start(&self, input_preview: &str) {
        let mut event = self.base("planning_start");
        event.input_preview = Some(truncate_preview(input_preview, self.max_preview));
        self.push(event);
    }

    fn on_planning_end(&self, duration_ms: u64, success: bool, output_preview: &str) {
        let mut event = self.base("planning_end");
        event.duration_ms = Some(duration_ms);
        event.success = Some(success);
        event.output_preview = Some(truncate_preview(output_preview, self.max_preview));
        self.push(event);
    }

    fn on_step_start(&self, step_id: u32, tool_type: &str) {
        let mut event = self.base("step_start");
        event.step_id = Some(step_id);
        event.tool_type = Some(tool_type.to_string());
        self.push(event);
    }

    fn on_step_end(&self, step_id: u32, duration_ms: u64, success: bool) {
        let mut event = self.base("step_end");
        event.step_id = Some(step_id);
        event.duration_ms = Some(duration_ms);
        event.success = Some(success);
        self.push(event);
    }

    fn on_tool_call(&self, step_id: u32, tool_type: &str, duration_ms: u64, success: bool) {
        let mut event = self.base("tool_call");
        event.step_id = Some(step_id);
        event.tool_type = Some(tool_type.to_string());
        event.duration_ms = Some(duration_ms);
        event.success = Some(success);
        self.push(event);
    }

    fn on_reasoning_start(&self, step_id: u32) {
        let mut event = self.base("reasoning_start");
        event.step_id = Some(step_id);
        self.push(event);
    }

    fn on_reasoning_end(&self, step_id: u32, duration_ms: u64, success: bool) {
        let mut event = self.base("reasoning_end");
        event.step_id = Some(step_id);
        event.duration_ms = Some(duration_ms);
        event.success = Some(success);
        self.push(event);
    }

    fn on_verification(&self, step_id: u32, confidence: f64) {
        let mut event = self.base("verification");
        event.step_id = Some(step_id);
        event.success = Some(confidence >= 0.7);
        self.push(event);
    }

    fn on_evidence_synthesis_start(&self) {
        self.push(self.base("evidence_synthesis_start"));
    }

    fn on_evidence_synthesis_end(&self, duration_ms: u64, source_count: usize) {
        let mut event = self.base("evidence_synthesis_end");
        event.duration_ms = Some(duration_ms);
        event.success = Some(source_count > 0);
        self.push(event);
    }

    fn events(&self) -> Vec<TraceEvent> {
        self.events
            .try_lock()
            .map(|events| events.iter().cloned().collect())
            .unwrap_or_default()
    }
}

/// Zero-cost trace sink used when observability is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullTraceContext;

impl Trace for NullTraceContext {
    #[inline]
    fn on_planning_start(&self, _input_preview: &str) {}
    #[inline]
    fn on_planning_end(&self, _duration_ms: u64, _success: bool, _output_preview: &str) {}
    #[inline]
    fn on_step_start(&self, _step_id: u32, _tool_type: &str) {}
    #[inline]
    fn on_step_end(&self, _step_id: u32, _duration_ms: u64, _success: bool) {}
    #[inline]
    fn on_tool_call(&self, _step_id: u32, _tool_type: &str, _duration_ms: u64, _success: bool) {}
    #[inline]
    fn on_reasoning_start(&self, _step_id: u32) {}
    #[inline]
    fn on_reasoning_end(&self, _step_id: u32, _duration_ms: u64, _success: bool) {}
    #[inline]
    fn on_verification(&self, _step_id: u32, _confidence: f64) {}
    #[inline]
    fn on_evidence_synthesis_start(&self) {}
    #[inline]
    fn on_evidence_synthesis_end(&self, _duration_ms: u64, _source_count: usize) {}
    #[inline]
    fn events(&self) -> Vec<TraceEvent> {
        Vec::new()
    }
}

/// Build the configured trace sink: real if observability is enabled, the
/// null sink otherwise.
#[must_use]
pub fn build(enabled: bool, max_events: usize, max_preview: usize) -> Box<dyn Trace> {
    if enabled {
        Box::new(TraceContext::new(max_events, max_preview))
    } else {
        Box::new(NullTraceContext)
    }
}

/// A small stopwatch, used at call sites to compute `duration_ms`.
#[must_use]
pub fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_drops_oldest_past_capacity() {
        let trace = TraceContext::new(2, 100);
        trace.on_step_start(1, "none");
        trace.on_step_start(2, "none");
        trace.on_step_start(3, "none");

        let events = trace.events();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].step_id, Some(2));
        assert_eq!(events[1].step_id, Some(3));
    }

    #[test]
    fn preview_truncates_at_char_boundary() {
        let trace = TraceContext::new(10, 3);
        trace.on_planning_start("héllo world");
        let events = trace.events();
        assert_eq!(events[0].input_preview.as_deref(), Some("hél"));
    }

    #[test]
    fn null_trace_never_records() {
        let trace = NullTraceContext;
        trace.on_planning_start("anything");
        trace.on_step_start(1, "none");
        assert!(trace.events().is_empty());
    }
}
