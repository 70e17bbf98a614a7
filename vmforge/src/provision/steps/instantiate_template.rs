//! Step: Instantiate template - resolve the configured template and clone it.
//!
//! Resolution failures (unknown uuid, unknown or ambiguous name) are not
//! fatal: the step reports them and continues so that the import step can
//! build the instance from `source_path` instead. Anything that fails after a
//! template was identified halts the run.

use super::{destroy_instance, halt, step_start};
use crate::client::{ControlPlaneClient, VmHandle};
use crate::pipeline::{Step, StepAction};
use crate::source::SourceSpecifier;
use crate::state::ProvisionState;
use crate::ui::Ui;
use async_trait::async_trait;
use std::sync::Arc;

const STEP: &str = "instantiate_template";
const FALLBACK_NOTICE: &str = "Falling back to \"source_path\".";

#[derive(Debug, Default)]
pub struct InstantiateTemplateStep {
    /// Instance cloned by this step, destroyed on cleanup.
    instance: Option<VmHandle>,
}

impl InstantiateTemplateStep {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Step<ProvisionState> for InstantiateTemplateStep {
    async fn run(&mut self, state: &mut ProvisionState) -> StepAction {
        let config = Arc::clone(state.config());
        let source = config.source();
        if source.is_none() {
            return StepAction::Continue;
        }

        step_start(state, STEP);
        let client = Arc::clone(state.client());
        let ui = Arc::clone(state.ui());
        ui.say("Step: Instantiate template");

        let Some(template) = resolve_template(client.as_ref(), ui.as_ref(), &source).await else {
            ui.error(FALLBACK_NOTICE);
            return StepAction::Continue;
        };
        tracing::info!(template = %template.reference, source = %source, "Resolved template");

        let instance = match client.clone_vm(&template, &config.vm_name).await {
            Ok(instance) => instance,
            Err(e) => {
                return halt(
                    ui.as_ref(),
                    STEP,
                    format!("Error cloning template '{}': {}", template.name_label, e),
                );
            }
        };
        self.instance = Some(instance.clone());
        state.set_instance(instance.clone());

        let uuid = match client.get_vm_uuid(&instance).await {
            Ok(uuid) => uuid,
            Err(e) => {
                return halt(ui.as_ref(), STEP, format!("Unable to get VM uuid: {}", e));
            }
        };
        state.set_instance_uuid(uuid.clone());

        // Clones inherit the template flag and cannot be started until it is cleared.
        if let Err(e) = client.set_is_a_template(&instance, false).await {
            return halt(
                ui.as_ref(),
                STEP,
                format!("Error converting template to a VM: {}", e),
            );
        }

        if let Err(e) = client
            .set_description(&instance, &config.vm_description)
            .await
        {
            return halt(
                ui.as_ref(),
                STEP,
                format!("Error setting VM description: {}", e),
            );
        }

        ui.say(&format!("Instantiated template as VM '{}'", uuid));
        StepAction::Continue
    }

    async fn cleanup(&mut self, state: &mut ProvisionState) {
        let Some(instance) = self.instance.take() else {
            return;
        };
        destroy_instance(state.client().as_ref(), state.ui().as_ref(), &instance).await;
    }

    fn name(&self) -> &str {
        STEP
    }
}

/// Resolve a template, reporting why when it cannot be resolved.
async fn resolve_template(
    client: &dyn ControlPlaneClient,
    ui: &dyn Ui,
    source: &SourceSpecifier,
) -> Option<VmHandle> {
    match source {
        SourceSpecifier::Uuid(uuid) => match client.get_vm_by_uuid(uuid).await {
            Ok(template) => Some(template),
            Err(e) => {
                ui.error(&format!(
                    "Could not get template with uuid '{}': {}",
                    uuid, e
                ));
                None
            }
        },
        SourceSpecifier::NameLabel(name) => {
            let mut matches = match client.get_vms_by_name_label(name).await {
                Ok(matches) => matches,
                Err(e) => {
                    ui.error(&format!("Error looking up template '{}': {}", name, e));
                    return None;
                }
            };

            match matches.len() {
                0 => {
                    ui.error(&format!(
                        "Could not find a template with the name label '{}'.",
                        name
                    ));
                    None
                }
                1 => matches.pop(),
                count => {
                    ui.error(&format!(
                        "Found {} templates named '{}'. The name must be unique.",
                        count, name
                    ));
                    None
                }
            }
        }
        SourceSpecifier::None => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Operation;
    use crate::provision::steps::fixture::{Fixture, config};

    #[tokio::test]
    async fn test_empty_source_is_a_silent_noop() {
        let mut fx = Fixture::new(config(""));
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);

        assert!(fx.plane.calls().is_empty());
        assert!(fx.state.instance().is_none());
        assert!(fx.state.instance_uuid().is_none());
        assert!(fx.ui.is_empty());
    }

    #[tokio::test]
    async fn test_uuid_source_clones_and_publishes() {
        let mut fx = Fixture::new(config("uuid://abc-123"));
        fx.plane.add_template_with_uuid("golden-image", "zzz-999");
        let template = fx.plane.add_template_with_uuid("golden-image", "abc-123");
        fx.plane.add_template_with_uuid("other-image", "abc-1234");
        fx.plane.queue_uuid("def-456");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);

        assert_eq!(fx.plane.call_count(Operation::CloneVm), 1);
        assert_eq!(fx.plane.call_count(Operation::GetVmsByNameLabel), 0);
        assert_eq!(fx.state.instance_uuid(), Some("def-456"));

        let instance = fx.state.instance().unwrap();
        assert_ne!(instance.reference, template.reference);
        let record = fx.plane.vm(&instance.reference).unwrap();
        assert_eq!(record.cloned_from.as_ref(), Some(&template.reference));
        assert_eq!(record.name_label, "web-01");
        assert_eq!(record.description, "built by vmforge");
        assert!(!record.is_a_template);

        assert!(fx.ui.errors().is_empty());
        assert!(fx.ui.last().unwrap().text().contains("def-456"));
    }

    #[tokio::test]
    async fn test_uuid_lookup_failure_falls_back() {
        let mut fx = Fixture::new(config("uuid://missing-1"));
        fx.plane.add_template("golden-image");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);

        assert!(fx.state.instance().is_none());
        assert!(fx.state.instance_uuid().is_none());
        assert_eq!(fx.plane.call_count(Operation::CloneVm), 0);

        let errors = fx.ui.errors();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("missing-1"));
        assert!(errors[1].contains("source_path"));
    }

    #[tokio::test]
    async fn test_name_with_no_match_falls_back() {
        let mut fx = Fixture::new(config("golden-image"));
        fx.plane.add_template("other-image");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);

        assert_eq!(fx.plane.call_count(Operation::CloneVm), 0);
        assert!(fx.state.instance().is_none());
        assert!(fx.ui.errors()[0].contains("Could not find"));
    }

    #[tokio::test]
    async fn test_ambiguous_name_falls_back_without_cloning() {
        let mut fx = Fixture::new(config("golden-image"));
        fx.plane.add_template("golden-image");
        fx.plane.add_template("golden-image");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);

        assert_eq!(fx.plane.call_count(Operation::CloneVm), 0);
        assert!(fx.state.instance().is_none());
        let errors = fx.ui.errors();
        assert!(errors[0].contains("golden-image"));
        assert!(errors[0].contains("unique"));
        assert!(errors[1].contains("source_path"));
    }

    #[tokio::test]
    async fn test_name_lookup_error_falls_back() {
        let mut fx = Fixture::new(config("golden-image"));
        fx.plane.add_template("golden-image");
        fx.plane.fail_on(Operation::GetVmsByNameLabel, "session expired");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);

        assert_eq!(fx.plane.call_count(Operation::CloneVm), 0);
        assert!(fx.ui.errors()[0].contains("session expired"));
    }

    #[tokio::test]
    async fn test_unique_name_behaves_like_uuid() {
        let mut fx = Fixture::new(config("golden-image"));
        let template = fx.plane.add_template("golden-image");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);

        assert_eq!(fx.plane.call_count(Operation::CloneVm), 1);
        let uuid = fx.state.instance_uuid().unwrap().to_string();
        let record = fx.plane.vm_by_uuid(&uuid).unwrap();
        assert!(!record.is_a_template);
        assert!(fx.plane.vm(&template.reference).unwrap().is_a_template);
    }

    #[tokio::test]
    async fn test_clone_failure_halts_and_cleanup_is_noop() {
        let mut fx = Fixture::new(config("golden-image"));
        fx.plane.add_template("golden-image");
        fx.plane.fail_on(Operation::CloneVm, "insufficient memory");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Halt);
        assert!(fx.state.instance().is_none());
        assert!(fx.ui.errors()[0].contains("insufficient memory"));

        step.cleanup(&mut fx.state).await;
        assert_eq!(fx.plane.call_count(Operation::DestroyVm), 0);
    }

    #[tokio::test]
    async fn test_uuid_retrieval_failure_halts_and_cleanup_destroys() {
        let mut fx = Fixture::new(config("golden-image"));
        fx.plane.add_template("golden-image");
        fx.plane.fail_on(Operation::GetVmUuid, "api fault");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Halt);
        assert!(fx.state.instance().is_some());
        assert!(fx.state.instance_uuid().is_none());
        assert!(fx.ui.errors()[0].contains("uuid"));

        step.cleanup(&mut fx.state).await;
        assert_eq!(fx.plane.call_count(Operation::DestroyVm), 1);
        assert_eq!(fx.plane.vm_count(), 1);
    }

    #[tokio::test]
    async fn test_flag_failure_halts_and_cleanup_destroys() {
        let mut fx = Fixture::new(config("golden-image"));
        fx.plane.add_template("golden-image");
        fx.plane.fail_on(Operation::SetIsATemplate, "permission denied");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Halt);
        assert!(fx.state.instance_uuid().is_some());
        assert_eq!(fx.plane.call_count(Operation::SetDescription), 0);
        assert!(fx.ui.errors()[0].contains("converting template"));

        step.cleanup(&mut fx.state).await;
        assert_eq!(fx.plane.vm_count(), 1);
    }

    #[tokio::test]
    async fn test_description_failure_halts_and_cleanup_destroys() {
        let mut fx = Fixture::new(config("golden-image"));
        fx.plane.add_template("golden-image");
        fx.plane.fail_on(Operation::SetDescription, "read-only field");
        let mut step = InstantiateTemplateStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Halt);
        assert!(fx.ui.errors()[0].contains("description"));

        step.cleanup(&mut fx.state).await;
        assert_eq!(fx.plane.call_count(Operation::DestroyVm), 1);
        assert_eq!(fx.plane.vm_count(), 1);
    }

    #[tokio::test]
    async fn test_cleanup_is_idempotent() {
        let mut fx = Fixture::new(config("golden-image"));
        fx.plane.add_template("golden-image");
        let mut step = InstantiateTemplateStep::new();

        step.cleanup(&mut fx.state).await;
        assert!(fx.plane.calls().is_empty());

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);
        step.cleanup(&mut fx.state).await;
        step.cleanup(&mut fx.state).await;
        assert_eq!(fx.plane.call_count(Operation::DestroyVm), 1);
        // The published handle survives cleanup.
        assert!(fx.state.instance().is_some());
    }

    #[tokio::test]
    async fn test_cleanup_failure_is_reported_not_raised() {
        let mut fx = Fixture::new(config("golden-image"));
        fx.plane.add_template("golden-image");
        let mut step = InstantiateTemplateStep::new();
        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);

        fx.plane.fail_on(Operation::DestroyVm, "host unreachable");
        step.cleanup(&mut fx.state).await;

        assert!(fx.ui.errors()[0].contains("host unreachable"));
        assert_eq!(fx.plane.vm_count(), 2);
    }
}
