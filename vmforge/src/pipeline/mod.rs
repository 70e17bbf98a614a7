//! Linear step pipeline with reverse-order rollback.
//!
//! ## Architecture
//!
//! ```text
//! ExecutionPlan → Pipeline → Steps
//!
//! - ExecutionPlan: Ordered list of steps (fixed at construction)
//! - Pipeline: Runner state machine (Idle → Running(i) → Succeeded | Failed)
//! - Step: Forward work (`run`) plus best-effort undo (`cleanup`)
//! ```
//!
//! Steps run one at a time in plan order against a shared `&mut` state.
//! When a step returns [`StepAction::Halt`], every step that was entered,
//! including the halting one, is cleaned up in reverse entry order.
//!
//! ## Example
//!
//! ```ignore
//! use vmforge::pipeline::{ExecutionPlan, PipelineBuilder};
//!
//! let plan = ExecutionPlan::new(vec![Box::new(StepA), Box::new(StepB)]);
//! let mut pipeline = PipelineBuilder::from_plan(plan);
//! let report = pipeline.execute(&mut state).await?;
//! println!("pipeline took {}ms", report.metrics.total_duration_ms);
//! ```

mod metrics;
#[allow(clippy::module_inception)]
mod pipeline;
mod step;

pub use metrics::{PipelineMetrics, StepMetrics};
pub use pipeline::{
    CleanupStack, ExecutionPlan, Pipeline, PipelineBuilder, PipelineOutcome, PipelineReport,
    RunnerState,
};
pub use step::{BoxedStep, Step, StepAction};
