//! Instance provisioning orchestration.
//!
//! ## Architecture
//!
//! Provisioning runs a fixed, linear plan:
//!
//! ```text
//!   1. InstantiateTemplate  (resolve template by uuid or name, clone it)
//!   2. ImportInstance       (fallback: import source_path if 1 made nothing)
//!   3. ConfigureHardware    (vCPUs, memory)
//!   4. AttachNetworks       (one VIF per configured network)
//!   5. StartInstance        (optional power-on)
//! ```
//!
//! Any step may halt; the pipeline then cleans up every entered step in
//! reverse order (shut down, detach networks, destroy the instance).

pub mod steps;

use crate::client::{ControlPlaneClient, VifHandle, VmHandle};
use crate::config::ProvisionConfig;
use crate::pipeline::{
    BoxedStep, ExecutionPlan, PipelineBuilder, PipelineMetrics, PipelineOutcome,
};
use crate::state::ProvisionState;
use crate::ui::Ui;
use std::sync::Arc;
use steps::{
    AttachNetworksStep, ConfigureHardwareStep, ImportInstanceStep, InstantiateTemplateStep,
    StartInstanceStep,
};
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

fn get_execution_plan() -> ExecutionPlan<ProvisionState> {
    let steps: Vec<BoxedStep<ProvisionState>> = vec![
        Box::new(InstantiateTemplateStep::new()),
        Box::new(ImportInstanceStep::new()),
        Box::new(ConfigureHardwareStep),
        Box::new(AttachNetworksStep::new()),
        Box::new(StartInstanceStep::new()),
    ];
    ExecutionPlan::new(steps)
}

fn log_step_metrics(vm_name: &str, metrics: &PipelineMetrics) {
    for step in &metrics.steps {
        tracing::info!(
            vm = %vm_name,
            step = %step.name,
            action = ?step.action,
            duration_ms = step.duration_ms,
            "Provisioning step timing"
        );
    }
    tracing::info!(
        vm = %vm_name,
        total_ms = metrics.total_duration_ms,
        cleanup_ms = metrics.cleanup_duration_ms,
        "Provisioning run finished"
    );
}

/// Result of a successful provisioning run.
#[derive(Debug, Clone)]
pub struct ProvisionedInstance {
    pub uuid: String,
    pub handle: VmHandle,
    pub vifs: Vec<VifHandle>,
    pub metrics: PipelineMetrics,
}

/// Provisions one instance.
///
/// # Example
///
/// ```ignore
/// let instance = Provisioner::new(config, client, Arc::new(TracingUi))?
///     .provision()
///     .await?;
/// println!("created {}", instance.uuid);
/// ```
pub struct Provisioner {
    config: Arc<ProvisionConfig>,
    client: Arc<dyn ControlPlaneClient>,
    ui: Arc<dyn Ui>,
}

impl Provisioner {
    /// Validates the configuration up front; steps assume it is sane.
    pub fn new(
        config: ProvisionConfig,
        client: Arc<dyn ControlPlaneClient>,
        ui: Arc<dyn Ui>,
    ) -> VmforgeResult<Self> {
        config.sanitize()?;
        Ok(Self {
            config: Arc::new(config),
            client,
            ui,
        })
    }

    /// Run the provisioning plan.
    ///
    /// On a halted run, everything the run created has already been cleaned
    /// up (best effort) when this returns `VmforgeError::Halted`.
    pub async fn provision(self) -> VmforgeResult<ProvisionedInstance> {
        let Provisioner { config, client, ui } = self;
        let vm_name = config.vm_name.clone();

        let mut state = ProvisionState::new(Arc::clone(&config), client, Arc::clone(&ui));
        let mut pipeline = PipelineBuilder::from_plan(get_execution_plan());
        let report = pipeline.execute(&mut state).await?;

        log_step_metrics(&vm_name, &report.metrics);

        if let PipelineOutcome::Halted { step, .. } = report.outcome {
            ui.error(&format!(
                "Provisioning of '{}' failed at step '{}'",
                vm_name, step
            ));
            return Err(VmforgeError::Halted(step));
        }

        let handle = state.require_instance()?.clone();
        let uuid = state
            .instance_uuid()
            .ok_or_else(|| VmforgeError::Internal("instance uuid was not published".into()))?
            .to_string();

        Ok(ProvisionedInstance {
            uuid,
            handle,
            vifs: state.vifs().to_vec(),
            metrics: report.metrics,
        })
    }
}
