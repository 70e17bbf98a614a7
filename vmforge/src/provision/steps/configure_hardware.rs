//! Step: Configure hardware - apply vCPU and memory sizing to the instance.

use super::{halt, step_start};
use crate::pipeline::{Step, StepAction};
use crate::state::ProvisionState;
use async_trait::async_trait;
use std::sync::Arc;

const STEP: &str = "configure_hardware";

#[derive(Debug, Default)]
pub struct ConfigureHardwareStep;

#[async_trait]
impl Step<ProvisionState> for ConfigureHardwareStep {
    async fn run(&mut self, state: &mut ProvisionState) -> StepAction {
        let config = Arc::clone(state.config());
        if config.vcpus.is_none() && config.memory_mib.is_none() {
            return StepAction::Continue;
        }

        step_start(state, STEP);
        let client = Arc::clone(state.client());
        let ui = Arc::clone(state.ui());
        let instance = match state.require_instance() {
            Ok(instance) => instance.clone(),
            Err(e) => {
                return halt(ui.as_ref(), STEP, format!("Cannot configure hardware: {}", e));
            }
        };

        ui.say("Step: Configure hardware");

        if let Some(vcpus) = config.vcpus {
            if let Err(e) = client.set_vcpus(&instance, vcpus).await {
                return halt(
                    ui.as_ref(),
                    STEP,
                    format!("Error setting vCPUs to {}: {}", vcpus, e),
                );
            }
            tracing::debug!(vm = %instance.reference, vcpus, "Set vCPUs");
        }

        let memory_bytes = match config.memory_bytes() {
            Ok(bytes) => bytes,
            Err(e) => return halt(ui.as_ref(), STEP, format!("Invalid memory size: {}", e)),
        };
        if let Some(bytes) = memory_bytes {
            if let Err(e) = client.set_memory(&instance, bytes).await {
                return halt(
                    ui.as_ref(),
                    STEP,
                    format!("Error setting memory to {} bytes: {}", bytes, e),
                );
            }
            tracing::debug!(vm = %instance.reference, bytes, "Set memory");
        }

        StepAction::Continue
    }

    fn name(&self) -> &str {
        STEP
    }
}
