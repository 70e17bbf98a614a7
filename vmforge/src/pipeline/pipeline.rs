//! Sequential pipeline runner.
//!
//! Runs an ordered list of steps against a shared state and, on halt, rolls
//! back every entered step in reverse entry order.

use super::metrics::{PipelineMetrics, StepMetrics};
use super::step::{BoxedStep, StepAction};
use chrono::Utc;
use std::time::Instant;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

pub struct ExecutionPlan<S: Send> {
    steps: Vec<BoxedStep<S>>,
}

impl<S: Send> ExecutionPlan<S> {
    pub fn new(steps: Vec<BoxedStep<S>>) -> Self {
        Self { steps }
    }

    pub fn steps(self) -> Vec<BoxedStep<S>> {
        self.steps
    }
}

/// Runner lifecycle. `Succeeded` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunnerState {
    Idle,
    Running(usize),
    Succeeded,
    Failed { halted_at: usize },
}

impl RunnerState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunnerState::Succeeded | RunnerState::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    Succeeded,
    Halted { index: usize, step: String },
}

#[derive(Debug, Clone)]
pub struct PipelineReport {
    pub outcome: PipelineOutcome,
    /// Step names in the order they were entered.
    pub entered: Vec<String>,
    /// Step names in the order their cleanup ran (empty on success).
    pub cleaned_up: Vec<String>,
    pub metrics: PipelineMetrics,
}

impl PipelineReport {
    pub fn succeeded(&self) -> bool {
        self.outcome == PipelineOutcome::Succeeded
    }
}

/// Indices of entered steps, popped in LIFO order during rollback.
#[derive(Debug, Default, Clone)]
pub struct CleanupStack {
    entered: Vec<usize>,
}

impl CleanupStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, index: usize) {
        self.entered.push(index);
    }

    pub fn pop(&mut self) -> Option<usize> {
        self.entered.pop()
    }

    pub fn len(&self) -> usize {
        self.entered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entered.is_empty()
    }
}

pub struct Pipeline<S: Send> {
    steps: Vec<BoxedStep<S>>,
    state: RunnerState,
}

impl<S: Send> Pipeline<S> {
    pub fn new(steps: Vec<BoxedStep<S>>) -> Self {
        Self {
            steps,
            state: RunnerState::Idle,
        }
    }

    pub fn state(&self) -> RunnerState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Execute every step in order.
    ///
    /// A halted run is not an `Err`: the report carries the outcome. `Err`
    /// is returned only when the pipeline has already left `Idle`.
    pub async fn execute(&mut self, ctx: &mut S) -> VmforgeResult<PipelineReport> {
        if self.state != RunnerState::Idle {
            return Err(VmforgeError::InvalidState(format!(
                "pipeline cannot be executed from {:?}",
                self.state
            )));
        }

        let started_at = Utc::now();
        let total_start = Instant::now();
        let mut cleanup_stack = CleanupStack::new();
        let mut entered = Vec::with_capacity(self.steps.len());
        let mut step_metrics = Vec::with_capacity(self.steps.len());
        let mut halted_at = None;

        for (index, step) in self.steps.iter_mut().enumerate() {
            self.state = RunnerState::Running(index);
            let name = step.name().to_string();
            cleanup_stack.push(index);
            entered.push(name.clone());

            tracing::debug!(step = %name, index, "Entering step");
            let step_start = Instant::now();
            let action = step.run(ctx).await;
            let duration_ms = step_start.elapsed().as_millis();
            tracing::debug!(step = %name, ?action, duration_ms, "Step finished");

            step_metrics.push(StepMetrics {
                name,
                action,
                duration_ms,
            });

            if action == StepAction::Halt {
                halted_at = Some(index);
                break;
            }
        }

        let cleanup_start = Instant::now();
        let mut cleaned_up = Vec::new();
        let outcome = match halted_at {
            None => {
                self.state = RunnerState::Succeeded;
                PipelineOutcome::Succeeded
            }
            Some(index) => {
                let step = self.steps[index].name().to_string();
                tracing::warn!(step = %step, index, "Pipeline halted, rolling back");

                while let Some(entered_index) = cleanup_stack.pop() {
                    let target = &mut self.steps[entered_index];
                    tracing::debug!(step = %target.name(), "Cleaning up step");
                    target.cleanup(ctx).await;
                    cleaned_up.push(target.name().to_string());
                }

                self.state = RunnerState::Failed { halted_at: index };
                PipelineOutcome::Halted { index, step }
            }
        };

        Ok(PipelineReport {
            outcome,
            entered,
            cleaned_up,
            metrics: PipelineMetrics {
                started_at,
                total_duration_ms: total_start.elapsed().as_millis(),
                cleanup_duration_ms: cleanup_start.elapsed().as_millis(),
                steps: step_metrics,
            },
        })
    }
}

pub struct PipelineBuilder;

impl PipelineBuilder {
    pub fn from_plan<S: Send>(plan: ExecutionPlan<S>) -> Pipeline<S> {
        Pipeline::new(plan.steps())
    }
}
