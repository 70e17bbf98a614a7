//! Step: Import instance - build the instance from `source_path`.
//!
//! Only does work when no earlier step published an instance, which makes it
//! the fallback for template resolution.

use super::{destroy_instance, halt, step_start};
use crate::client::VmHandle;
use crate::pipeline::{Step, StepAction};
use crate::state::ProvisionState;
use async_trait::async_trait;
use std::sync::Arc;

const STEP: &str = "import_instance";

#[derive(Debug, Default)]
pub struct ImportInstanceStep {
    instance: Option<VmHandle>,
}

impl ImportInstanceStep {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Step<ProvisionState> for ImportInstanceStep {
    async fn run(&mut self, state: &mut ProvisionState) -> StepAction {
        if let Some(instance) = state.instance() {
            tracing::debug!(vm = %instance.reference, "Instance already present, skipping import");
            return StepAction::Continue;
        }

        step_start(state, STEP);
        let config = Arc::clone(state.config());
        let client = Arc::clone(state.client());
        let ui = Arc::clone(state.ui());

        let Some(source_path) = config.source_path.as_deref() else {
            return halt(
                ui.as_ref(),
                STEP,
                "No instance was created from a template and no \"source_path\" is configured."
                    .to_string(),
            );
        };

        ui.say("Step: Import instance");

        match tokio::fs::metadata(source_path).await {
            Ok(meta) if meta.is_file() => {}
            Ok(_) => {
                return halt(
                    ui.as_ref(),
                    STEP,
                    format!("Source path {} is not a file", source_path.display()),
                );
            }
            Err(e) => {
                return halt(
                    ui.as_ref(),
                    STEP,
                    format!("Cannot read source path {}: {}", source_path.display(), e),
                );
            }
        }

        let instance = match client
            .import_vm(source_path, config.sr_name.as_deref())
            .await
        {
            Ok(instance) => instance,
            Err(e) => {
                return halt(
                    ui.as_ref(),
                    STEP,
                    format!("Error importing {}: {}", source_path.display(), e),
                );
            }
        };
        self.instance = Some(instance.clone());
        state.set_instance(instance.clone());

        let uuid = match client.get_vm_uuid(&instance).await {
            Ok(uuid) => uuid,
            Err(e) => return halt(ui.as_ref(), STEP, format!("Unable to get VM uuid: {}", e)),
        };
        state.set_instance_uuid(uuid.clone());

        if let Err(e) = client.set_name_label(&instance, &config.vm_name).await {
            return halt(ui.as_ref(), STEP, format!("Error setting VM name: {}", e));
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

        ui.say(&format!("Imported VM '{}'", uuid));
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::Operation;
    use crate::config::ProvisionConfig;
    use crate::provision::steps::fixture::{Fixture, config};
    use tempfile::NamedTempFile;

    fn import_config(source_path: &std::path::Path) -> ProvisionConfig {
        ProvisionConfig {
            source_path: Some(source_path.to_path_buf()),
            ..config("")
        }
    }

    #[tokio::test]
    async fn test_skips_when_instance_present() {
        let mut fx = Fixture::new(config("golden-image"));
        let vm = fx.plane.add_vm("already-there");
        fx.state.set_instance(vm);
        let mut step = ImportInstanceStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);
        assert!(fx.plane.calls().is_empty());
        assert!(fx.ui.is_empty());
    }

    #[tokio::test]
    async fn test_imports_and_publishes() {
        let artifact = NamedTempFile::new().unwrap();
        let mut fx = Fixture::new(import_config(artifact.path()));
        fx.plane.queue_uuid("imp-001");
        let mut step = ImportInstanceStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Continue);

        assert_eq!(fx.state.instance_uuid(), Some("imp-001"));
        let record = fx.plane.vm_by_uuid("imp-001").unwrap();
        assert_eq!(record.name_label, "web-01");
        assert_eq!(record.description, "built by vmforge");
        assert_eq!(record.imported_from.as_deref(), Some(artifact.path()));
        assert!(fx.ui.last().unwrap().text().contains("imp-001"));
    }

    #[tokio::test]
    async fn test_halts_without_source_path() {
        let mut fx = Fixture::new(config(""));
        let mut step = ImportInstanceStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Halt);
        assert!(fx.plane.calls().is_empty());
        assert!(fx.ui.errors()[0].contains("source_path"));
    }

    #[tokio::test]
    async fn test_halts_on_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.xva");
        let mut fx = Fixture::new(import_config(&missing));
        let mut step = ImportInstanceStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Halt);
        assert_eq!(fx.plane.call_count(Operation::ImportVm), 0);
        assert!(fx.ui.errors()[0].contains("missing.xva"));

        let mut fx = Fixture::new(import_config(dir.path()));
        assert_eq!(step.run(&mut fx.state).await, StepAction::Halt);
        assert!(fx.ui.errors()[0].contains("not a file"));
    }

    #[tokio::test]
    async fn test_unknown_storage_repository_halts() {
        let artifact = NamedTempFile::new().unwrap();
        let mut fx = Fixture::new(ProvisionConfig {
            sr_name: Some("fast-sr".into()),
            ..import_config(artifact.path())
        });
        let mut step = ImportInstanceStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Halt);
        assert!(fx.state.instance().is_none());
        assert!(fx.ui.errors()[0].contains("fast-sr"));

        step.cleanup(&mut fx.state).await;
        assert_eq!(fx.plane.call_count(Operation::DestroyVm), 0);
    }

    #[tokio::test]
    async fn test_rename_failure_halts_and_cleanup_destroys() {
        let artifact = NamedTempFile::new().unwrap();
        let mut fx = Fixture::new(import_config(artifact.path()));
        fx.plane.fail_on(Operation::SetNameLabel, "locked");
        let mut step = ImportInstanceStep::new();

        assert_eq!(step.run(&mut fx.state).await, StepAction::Halt);
        assert_eq!(fx.plane.vm_count(), 1);

        step.cleanup(&mut fx.state).await;
        step.cleanup(&mut fx.state).await;
        assert_eq!(fx.plane.vm_count(), 0);
        assert_eq!(fx.plane.call_count(Operation::DestroyVm), 1);
    }
}
