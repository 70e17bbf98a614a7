//! Step: Start instance - boot the VM when `power_on` is set.

use super::{halt, step_start};
use crate::client::VmHandle;
use crate::pipeline::{Step, StepAction};
use crate::state::ProvisionState;
use async_trait::async_trait;
use std::sync::Arc;

const STEP: &str = "start_instance";

#[derive(Debug, Default)]
pub struct StartInstanceStep {
    /// VM this step powered on; shut down on cleanup.
    started: Option<VmHandle>,
}

impl StartInstanceStep {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Step<ProvisionState> for StartInstanceStep {
    async fn run(&mut self, state: &mut ProvisionState) -> StepAction {
        if !state.config().power_on {
            return StepAction::Continue;
        }

        step_start(state, STEP);
        let client = Arc::clone(state.client());
        let ui = Arc::clone(state.ui());
        let instance = match state.require_instance() {
            Ok(instance) => instance.clone(),
            Err(e) => return halt(ui.as_ref(), STEP, format!("Cannot start VM: {}", e)),
        };

        ui.say("Step: Start instance");
        if let Err(e) = client.start_vm(&instance).await {
            return halt(
                ui.as_ref(),
                STEP,
                format!("Error starting VM '{}': {}", instance.name_label, e),
            );
        }
        self.started = Some(instance.clone());

        ui.say(&format!("Started VM '{}'", instance.name_label));
        StepAction::Continue
    }

    async fn cleanup(&mut self, state: &mut ProvisionState) {
        let Some(instance) = self.started.take() else {
            return;
        };
        let ui = state.ui();
        ui.say(&format!("Shutting down VM '{}'", instance.name_label));
        if let Err(e) = state.client().hard_shutdown_vm(&instance).await {
            ui.error(&format!(
                "Failed to shut down VM '{}' during cleanup: {}",
                instance.name_label, e
            ));
        }
    }

    fn name(&self) -> &str {
        STEP
    }
}
