//! State-machine sequencing of planning -> execution -> verification ->
//! synthesis, implemented as a straight loop (spec §4.2 degraded mode):
//! no graph-execution library is pulled in, mirroring the teacher's own
//! `agent/runner.rs`, which drives its loop the same way.

use std::time::Instant;

use tokio_util::sync::CancellationToken;
use tracing::{info_span, Instrument};

use crate::agent::execution::ExecutionAgent;
use crate::agent::planning::PlanningAgent;
use crate::agent::verification::VerificationAgent;
use crate::llm::{GenerateOptions, LlmClient};
use crate::toolhub::ToolHub;
use crate::trace::{elapsed_ms, Trace};
use crate::types::{Plan, Question, StepResult, TaskContext, WorkflowState};

/// Stateless sequencer over the four workflow nodes.
#[derive(Debug, Clone, Copy)]
pub struct WorkflowEngine;

impl WorkflowEngine {
    /// Run the full pipeline for `question`, returning the final state.
    #[allow(clippy::too_many_arguments)]
    pub async fn run(
        llm: &dyn LlmClient,
        toolhub: &ToolHub,
        question: Question,
        task_ctx: Option<TaskContext>,
        trace: &dyn Trace,
        max_retries: u32,
        token: &CancellationToken,
    ) -> WorkflowState {
        let mut state = WorkflowState::new(question);
        state.metadata.task_ctx = task_ctx;

        Self::planning_node(llm, toolhub, &mut state, trace).await;

        while !state.is_complete() {
            Self::execution_node(llm, toolhub, &mut state, trace, max_retries, token).await;
            Self::verification_node(&mut state, trace);
        }

        Self::synthesis_node(llm, &mut state, trace).await;
        state
    }

    async fn planning_node(
        llm: &dyn LlmClient,
        toolhub: &ToolHub,
        state: &mut WorkflowState,
        trace: &dyn Trace,
    ) {
        let start = Instant::now();
        trace.on_planning_start(state.question.as_str());

        let inventory = toolhub.inventory();
        let mut plan = PlanningAgent::decompose(llm, state.question.as_str(), &inventory)
            .instrument(info_span!("planning_node"))
            .await;

        if plan.steps.is_empty() {
            plan = Plan::fallback(state.question.as_str());
        }

        trace.on_planning_end(
            elapsed_ms(start),
            true,
            &plan.steps.first().map_or_else(String::new, |s| s.description.clone()),
        );
        state.task_plan = Some(plan);
    }

    async fn execution_node(
        llm: &dyn LlmClient,
        toolhub: &ToolHub,
        state: &mut WorkflowState,
        trace: &dyn Trace,
        max_retries: u32,
        token: &CancellationToken,
    ) {
        let idx = state.current_step;
        let Some(plan) = state.task_plan.as_ref() else {
            return;
        };
        let Some(step) = plan.steps.get(idx).cloned() else {
            state.current_step += 1;
            return;
        };

        let start = Instant::now();
        trace.on_step_start(step.id, &step.tool_type);

        let task_ctx = state.metadata.task_ctx.clone();
        let step_result = ExecutionAgent::execute_step(
            llm,
            toolhub,
            &step,
            &state.step_results,
            task_ctx.as_ref(),
            max_retries,
            trace,
            token,
        )
        .await;

        trace.on_step_end(step.id, elapsed_ms(start), step_result.success);
        if !step_result.success {
            state
                .errors
                .push(step_result.error.clone().unwrap_or_default());
        }
        state.step_results.push(step_result);
        state.current_step += 1;
    }

    fn verification_node(state: &mut WorkflowState, trace: &dyn Trace) {
        let Some(last) = state.step_results.last().cloned() else {
            return;
        };
        let prior = &state.step_results[..state.step_results.len() - 1];
        let finding = VerificationAgent::verify(&last, prior);
        trace.on_verification(last.step_id, finding.confidence);
        state.metadata.verifications.push((last.step_id, finding));
    }

    async fn synthesis_node(llm: &dyn LlmClient, state: &mut WorkflowState, trace: &dyn Trace) {
        trace.on_evidence_synthesis_start();
        let start = Instant::now();

        let direct = state
            .step_results
            .iter()
            .rev()
            .find(|r| r.success && !r.result_text().trim().is_empty())
            .map(StepResult::result_text);

        let answer = match direct {
            Some(text) => text,
            None if state.step_results.is_empty() => {
                "Unable to produce an answer".to_string()
            }
            None => synthesize_fallback(llm, state).await,
        };

        trace.on_evidence_synthesis_end(elapsed_ms(start), state.step_results.len());
        state.final_answer = Some(answer);
    }
}

async fn synthesize_fallback(llm: &dyn LlmClient, state: &WorkflowState) -> String {
    let dump = state
        .step_results
        .iter()
        .map(|r| format!("step {}: {}", r.step_id, r.result_text()))
        .collect::<Vec<_>>()
        .join("\n");
    let prompt = format!(
        "Question: {}\nStep results:\n{dump}\nSynthesize a final answer.",
        state.question
    );
    match llm.generate(&prompt, GenerateOptions::default()).await {
        Ok(text) if !text.trim().is_empty() => text,
        _ => "Unable to produce an answer".to_string(),
    }
}
