//! Step: Attach networks - create one VIF per configured network.
//!
//! Unlike template resolution there is no fallback here, so a network name
//! that matches nothing or more than one network halts the run.

use super::{halt, step_start};
use crate::client::{ControlPlaneClient, VifHandle};
use crate::pipeline::{Step, StepAction};
use crate::state::ProvisionState;
use crate::ui::Ui;
use async_trait::async_trait;
use std::sync::Arc;

const STEP: &str = "attach_networks";

#[derive(Debug, Default)]
pub struct AttachNetworksStep {
    /// VIFs in creation order.
    created: Vec<VifHandle>,
}

impl AttachNetworksStep {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Step<ProvisionState> for AttachNetworksStep {
    async fn run(&mut self, state: &mut ProvisionState) -> StepAction {
        let config = Arc::clone(state.config());
        if config.network_names.is_empty() {
            return StepAction::Continue;
        }

        step_start(state, STEP);
        let client = Arc::clone(state.client());
        let ui = Arc::clone(state.ui());
        let instance = match state.require_instance() {
            Ok(instance) => instance.clone(),
            Err(e) => return halt(ui.as_ref(), STEP, format!("Cannot attach networks: {}", e)),
        };

        ui.say("Step: Attach networks");

        for (index, name) in config.network_names.iter().enumerate() {
            let device = index.to_string();
            let mut networks = match client.get_networks_by_name_label(name).await {
                Ok(networks) => networks,
                Err(e) => {
                    return halt(
                        ui.as_ref(),
                        STEP,
                        format!("Error looking up network '{}': {}", name, e),
                    );
                }
            };

            let network = match networks.len() {
                1 => networks.remove(0),
                0 => {
                    return halt(
                        ui.as_ref(),
                        STEP,
                        format!("Could not find a network named '{}'.", name),
                    );
                }
                count => {
                    return halt(
                        ui.as_ref(),
                        STEP,
                        format!(
                            "Found {} networks named '{}'. The name must be unique.",
                            count, name
                        ),
                    );
                }
            };

            let vif = match client.create_vif(&instance, &network, &device).await {
                Ok(vif) => vif,
                Err(e) => {
                    return halt(
                        ui.as_ref(),
                        STEP,
                        format!(
                            "Error attaching network '{}' as device {}: {}",
                            name, device, e
                        ),
                    );
                }
            };
            tracing::debug!(vif = %vif.reference, network = %name, device = %device, "Created VIF");
            self.created.push(vif.clone());
            state.push_vif(vif);
        }

        ui.say(&format!("Attached {} network(s)", self.created.len()));
        StepAction::Continue
    }

    async fn cleanup(&mut self, state: &mut ProvisionState) {
        while let Some(vif) = self.created.pop() {
            destroy_vif(state.client().as_ref(), state.ui().as_ref(), &vif).await;
        }
    }

    fn name(&self) -> &str {
        STEP
    }
}

async fn destroy_vif(client: &dyn ControlPlaneClient, ui: &dyn Ui, vif: &VifHandle) {
    if let Err(e) = client.destroy_vif(vif).await {
        ui.error(&format!(
            "Failed to detach network '{}' (device {}) during cleanup: {}",
            vif.network, vif.device, e
        ));
    }
}
