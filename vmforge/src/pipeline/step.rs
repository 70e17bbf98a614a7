//! Step contract for pipeline execution.

use async_trait::async_trait;

/// What the runner should do after a step's `run` returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepAction {
    /// Proceed to the next step.
    Continue,
    /// Stop forward progress and roll back every entered step.
    Halt,
}

/// A unit of provisioning work.
///
/// Steps own whatever they need to undo their own remote side effects:
/// `run` records what it created on `self`, and `cleanup` acts only on
/// that record. Failures are reported by the step itself and surface to the
/// runner only as a [`StepAction`].
#[async_trait]
pub trait Step<S: Send>: Send + Sync {
    /// Perform forward work against the shared state.
    async fn run(&mut self, state: &mut S) -> StepAction;

    /// Undo this step's side effects after a halted run.
    ///
    /// Invoked for every entered step, so it must be a no-op when `run`
    /// produced nothing. Errors are reported, never propagated.
    async fn cleanup(&mut self, _state: &mut S) {}

    /// Get human-readable step name for logging and metrics.
    fn name(&self) -> &str;
}

pub type BoxedStep<S> = Box<dyn Step<S>>;
