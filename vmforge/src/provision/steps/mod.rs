//! Provisioning steps.
//!
//! Every step converts control-plane errors into a UI diagnostic plus a
//! [`StepAction`]; no error value crosses a step boundary.

mod attach_networks;
mod configure_hardware;
mod import_instance;
mod instantiate_template;
mod start_instance;

pub use attach_networks::AttachNetworksStep;
pub use configure_hardware::ConfigureHardwareStep;
pub use import_instance::ImportInstanceStep;
pub use instantiate_template::InstantiateTemplateStep;
pub use start_instance::StartInstanceStep;

use crate::client::{ControlPlaneClient, VmHandle};
use crate::pipeline::StepAction;
use crate::state::ProvisionState;
use crate::ui::Ui;

fn step_start(state: &ProvisionState, step: &str) {
    tracing::debug!(step, vm = %state.config().vm_name, "Step started");
}

/// Report a fatal failure and halt the pipeline.
fn halt(ui: &dyn Ui, step: &str, message: String) -> StepAction {
    tracing::debug!(step, "Halting: {}", message);
    ui.error(&message);
    StepAction::Halt
}

/// Best-effort destroy used by the steps that create instances.
async fn destroy_instance(client: &dyn ControlPlaneClient, ui: &dyn Ui, instance: &VmHandle) {
    ui.say(&format!("Destroying VM '{}'", instance.name_label));
    match client.destroy_vm(instance).await {
        Ok(()) => tracing::info!(vm = %instance.reference, "Destroyed VM during cleanup"),
        Err(e) => ui.error(&format!(
            "Failed to destroy VM '{}' during cleanup: {}",
            instance.name_label, e
        )),
    }
}
