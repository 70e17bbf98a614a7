//! Shared provisioning state.
//!
//! One `ProvisionState` exists per provisioning run. Steps read what earlier
//! steps published and publish their own results. Values may be overwritten
//! but never removed, so cleanup of a late step can still see everything an
//! early step published.

use crate::client::{ControlPlaneClient, VifHandle, VmHandle};
use crate::config::ProvisionConfig;
use crate::ui::Ui;
use std::sync::Arc;
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

pub struct ProvisionState {
    config: Arc<ProvisionConfig>,
    client: Arc<dyn ControlPlaneClient>,
    ui: Arc<dyn Ui>,
    instance: Option<VmHandle>,
    instance_uuid: Option<String>,
    vifs: Vec<VifHandle>,
}

impl ProvisionState {
    pub fn new(
        config: Arc<ProvisionConfig>,
        client: Arc<dyn ControlPlaneClient>,
        ui: Arc<dyn Ui>,
    ) -> Self {
        Self {
            config,
            client,
            ui,
            instance: None,
            instance_uuid: None,
            vifs: Vec::new(),
        }
    }

    pub fn config(&self) -> &Arc<ProvisionConfig> {
        &self.config
    }

    pub fn client(&self) -> &Arc<dyn ControlPlaneClient> {
        &self.client
    }

    pub fn ui(&self) -> &Arc<dyn Ui> {
        &self.ui
    }

    pub fn instance(&self) -> Option<&VmHandle> {
        self.instance.as_ref()
    }

    /// Instance published by an earlier step.
    pub fn require_instance(&self) -> VmforgeResult<&VmHandle> {
        self.instance.as_ref().ok_or_else(|| {
            VmforgeError::InvalidState("no instance has been created or imported".into())
        })
    }

    pub fn set_instance(&mut self, instance: VmHandle) {
        self.instance = Some(instance);
    }

    pub fn instance_uuid(&self) -> Option<&str> {
        self.instance_uuid.as_deref()
    }

    pub fn set_instance_uuid(&mut self, uuid: String) {
        self.instance_uuid = Some(uuid);
    }

    pub fn vifs(&self) -> &[VifHandle] {
        &self.vifs
    }

    pub fn push_vif(&mut self, vif: VifHandle) {
        self.vifs.push(vif);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{InMemoryControlPlane, OpaqueRef};
    use crate::ui::CapturingUi;

    fn state() -> ProvisionState {
        ProvisionState::new(
            Arc::new(ProvisionConfig::default()),
            Arc::new(InMemoryControlPlane::new()),
            Arc::new(CapturingUi::new()),
        )
    }

    #[test]
    fn test_starts_empty() {
        let state = state();
        assert!(state.instance().is_none());
        assert!(state.instance_uuid().is_none());
        assert!(state.vifs().is_empty());
        assert!(matches!(
            state.require_instance(),
            Err(VmforgeError::InvalidState(_))
        ));
    }

    #[test]
    fn test_publish_and_overwrite() {
        let mut state = state();
        let first = VmHandle {
            reference: OpaqueRef::new("OpaqueRef:1"),
            name_label: "a".into(),
        };
        let second = VmHandle {
            reference: OpaqueRef::new("OpaqueRef:2"),
            name_label: "b".into(),
        };

        state.set_instance(first);
        state.set_instance(second.clone());
        state.set_instance_uuid("def-456".into());

        assert_eq!(state.require_instance().unwrap(), &second);
        assert_eq!(state.instance_uuid(), Some("def-456"));
    }
}
