//! Control-plane client contract.
//!
//! The pipeline never talks to a hypervisor directly: every remote operation
//! goes through [`ControlPlaneClient`]. Implementations own connection and
//! authentication. Handles returned here are opaque references plus cached
//! metadata; they stay valid for the lifetime of one provisioning run.

mod memory;

pub use memory::{InMemoryControlPlane, NetworkRecord, Operation, PowerState, VifRecord, VmRecord};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use vmforge_shared::errors::VmforgeResult;

/// Opaque server-side reference (e.g. `OpaqueRef:...`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpaqueRef(String);

impl OpaqueRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle to a VM or template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmHandle {
    pub reference: OpaqueRef,
    /// Name label at the time the handle was obtained.
    pub name_label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkHandle {
    pub reference: OpaqueRef,
    pub name_label: String,
}

/// Handle to a virtual network interface attached to a VM.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VifHandle {
    pub reference: OpaqueRef,
    pub device: String,
    pub network: String,
}

/// Remote operations consumed by the provisioning steps.
///
/// All calls are awaited to completion before the caller proceeds; none of
/// them yield partial results.
#[async_trait]
pub trait ControlPlaneClient: Send + Sync {
    /// Exact lookup by uuid. Fails with `NotFound` when nothing matches.
    async fn get_vm_by_uuid(&self, uuid: &str) -> VmforgeResult<VmHandle>;

    /// All VMs carrying exactly this name label. Empty when nothing matches.
    async fn get_vms_by_name_label(&self, name_label: &str) -> VmforgeResult<Vec<VmHandle>>;

    async fn clone_vm(&self, vm: &VmHandle, new_name: &str) -> VmforgeResult<VmHandle>;

    /// Import a VM from a local artifact into the given storage repository.
    async fn import_vm(&self, source: &Path, sr_name: Option<&str>) -> VmforgeResult<VmHandle>;

    async fn get_vm_uuid(&self, vm: &VmHandle) -> VmforgeResult<String>;

    async fn set_is_a_template(&self, vm: &VmHandle, is_a_template: bool) -> VmforgeResult<()>;

    async fn set_name_label(&self, vm: &VmHandle, name_label: &str) -> VmforgeResult<()>;

    async fn set_description(&self, vm: &VmHandle, description: &str) -> VmforgeResult<()>;

    async fn set_vcpus(&self, vm: &VmHandle, vcpus: u32) -> VmforgeResult<()>;

    async fn set_memory(&self, vm: &VmHandle, bytes: u64) -> VmforgeResult<()>;

    async fn get_networks_by_name_label(
        &self,
        name_label: &str,
    ) -> VmforgeResult<Vec<NetworkHandle>>;

    async fn create_vif(
        &self,
        vm: &VmHandle,
        network: &NetworkHandle,
        device: &str,
    ) -> VmforgeResult<VifHandle>;

    async fn destroy_vif(&self, vif: &VifHandle) -> VmforgeResult<()>;

    async fn start_vm(&self, vm: &VmHandle) -> VmforgeResult<()>;

    async fn hard_shutdown_vm(&self, vm: &VmHandle) -> VmforgeResult<()>;

    async fn destroy_vm(&self, vm: &VmHandle) -> VmforgeResult<()>;
}
