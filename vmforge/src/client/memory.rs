//! In-process control plane.
//!
//! Models the subset of hypervisor state the provisioning steps touch: VMs
//! and templates, storage repositories, networks and VIFs. Every call is
//! journaled so callers can assert on exactly which remote operations ran,
//! and any operation can be made to fail on demand.

use super::{ControlPlaneClient, NetworkHandle, OpaqueRef, VifHandle, VmHandle};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Remote operation kinds, one per [`ControlPlaneClient`] method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    GetVmByUuid,
    GetVmsByNameLabel,
    CloneVm,
    ImportVm,
    GetVmUuid,
    SetIsATemplate,
    SetNameLabel,
    SetDescription,
    SetVcpus,
    SetMemory,
    GetNetworksByNameLabel,
    CreateVif,
    DestroyVif,
    StartVm,
    HardShutdownVm,
    DestroyVm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Halted,
    Running,
}

#[derive(Debug, Clone)]
pub struct VmRecord {
    pub uuid: String,
    pub name_label: String,
    pub description: String,
    pub is_a_template: bool,
    pub vcpus: Option<u32>,
    pub memory_bytes: Option<u64>,
    pub power_state: PowerState,
    pub sr_name: Option<String>,
    pub imported_from: Option<PathBuf>,
    pub cloned_from: Option<OpaqueRef>,
}

impl VmRecord {
    fn new(uuid: String, name_label: &str, is_a_template: bool) -> Self {
        Self {
            uuid,
            name_label: name_label.to_string(),
            description: String::new(),
            is_a_template,
            vcpus: None,
            memory_bytes: None,
            power_state: PowerState::Halted,
            sr_name: None,
            imported_from: None,
            cloned_from: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkRecord {
    pub uuid: String,
    pub name_label: String,
}

#[derive(Debug, Clone)]
pub struct VifRecord {
    pub vm: OpaqueRef,
    pub network: OpaqueRef,
    pub device: String,
}

#[derive(Default)]
struct Inner {
    vms: BTreeMap<OpaqueRef, VmRecord>,
    networks: BTreeMap<OpaqueRef, NetworkRecord>,
    vifs: BTreeMap<OpaqueRef, VifRecord>,
    storage_repositories: BTreeSet<String>,
    calls: Vec<Operation>,
    failures: HashMap<Operation, String>,
    queued_uuids: VecDeque<String>,
}

impl Inner {
    /// Journal the call and apply any injected failure.
    fn enter(&mut self, op: Operation) -> VmforgeResult<()> {
        self.calls.push(op);
        match self.failures.get(&op) {
            Some(message) => Err(VmforgeError::Remote(message.clone())),
            None => Ok(()),
        }
    }

    /// Uuid for a newly created VM, preferring queued values.
    fn next_uuid(&mut self) -> String {
        self.queued_uuids
            .pop_front()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
    }

    fn vm_mut(&mut self, vm: &VmHandle) -> VmforgeResult<&mut VmRecord> {
        self.vms
            .get_mut(&vm.reference)
            .ok_or_else(|| VmforgeError::NotFound(format!("VM {}", vm.reference)))
    }
}

fn new_ref() -> OpaqueRef {
    OpaqueRef::new(format!("OpaqueRef:{}", uuid::Uuid::new_v4()))
}

#[derive(Default)]
pub struct InMemoryControlPlane {
    inner: Mutex<Inner>,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a template and return its handle.
    pub fn add_template(&self, name_label: &str) -> VmHandle {
        let uuid = self.inner.lock().next_uuid();
        self.insert_vm(VmRecord::new(uuid, name_label, true))
    }

    pub fn add_template_with_uuid(&self, name_label: &str, uuid: &str) -> VmHandle {
        self.insert_vm(VmRecord::new(uuid.to_string(), name_label, true))
    }

    /// Register a regular (non-template) VM.
    pub fn add_vm(&self, name_label: &str) -> VmHandle {
        let uuid = self.inner.lock().next_uuid();
        self.insert_vm(VmRecord::new(uuid, name_label, false))
    }

    /// Uuid assigned to the next VM this control plane creates.
    pub fn queue_uuid(&self, uuid: &str) {
        self.inner.lock().queued_uuids.push_back(uuid.to_string());
    }

    pub fn add_network(&self, name_label: &str) -> NetworkHandle {
        let reference = new_ref();
        self.inner.lock().networks.insert(
            reference.clone(),
            NetworkRecord {
                uuid: uuid::Uuid::new_v4().to_string(),
                name_label: name_label.to_string(),
            },
        );
        NetworkHandle {
            reference,
            name_label: name_label.to_string(),
        }
    }

    pub fn add_storage_repository(&self, name_label: &str) {
        self.inner
            .lock()
            .storage_repositories
            .insert(name_label.to_string());
    }

    /// Make every subsequent call of `op` fail with a remote error.
    pub fn fail_on(&self, op: Operation, message: &str) {
        self.inner.lock().failures.insert(op, message.to_string());
    }

    pub fn clear_failure(&self, op: Operation) {
        self.inner.lock().failures.remove(&op);
    }

    /// Operations in the order they were invoked.
    pub fn calls(&self) -> Vec<Operation> {
        self.inner.lock().calls.clone()
    }

    pub fn call_count(&self, op: Operation) -> usize {
        self.inner.lock().calls.iter().filter(|c| **c == op).count()
    }

    pub fn vm(&self, reference: &OpaqueRef) -> Option<VmRecord> {
        self.inner.lock().vms.get(reference).cloned()
    }

    pub fn vm_by_uuid(&self, uuid: &str) -> Option<VmRecord> {
        self.inner
            .lock()
            .vms
            .values()
            .find(|vm| vm.uuid == uuid)
            .cloned()
    }

    pub fn vm_count(&self) -> usize {
        self.inner.lock().vms.len()
    }

    pub fn vifs_of(&self, vm: &OpaqueRef) -> Vec<VifRecord> {
        self.inner
            .lock()
            .vifs
            .values()
            .filter(|vif| &vif.vm == vm)
            .cloned()
            .collect()
    }

    pub fn vif_count(&self) -> usize {
        self.inner.lock().vifs.len()
    }

    fn insert_vm(&self, record: VmRecord) -> VmHandle {
        let reference = new_ref();
        let name_label = record.name_label.clone();
        self.inner.lock().vms.insert(reference.clone(), record);
        VmHandle {
            reference,
            name_label,
        }
    }
}

#[async_trait]
impl ControlPlaneClient for InMemoryControlPlane {
    async fn get_vm_by_uuid(&self, uuid: &str) -> VmforgeResult<VmHandle> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::GetVmByUuid)?;
        inner
            .vms
            .iter()
            .find(|(_, vm)| vm.uuid == uuid)
            .map(|(reference, vm)| VmHandle {
                reference: reference.clone(),
                name_label: vm.name_label.clone(),
            })
            .ok_or_else(|| VmforgeError::NotFound(format!("VM with uuid '{}'", uuid)))
    }

    async fn get_vms_by_name_label(&self, name_label: &str) -> VmforgeResult<Vec<VmHandle>> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::GetVmsByNameLabel)?;
        Ok(inner
            .vms
            .iter()
            .filter(|(_, vm)| vm.name_label == name_label)
            .map(|(reference, vm)| VmHandle {
                reference: reference.clone(),
                name_label: vm.name_label.clone(),
            })
            .collect())
    }

    async fn clone_vm(&self, vm: &VmHandle, new_name: &str) -> VmforgeResult<VmHandle> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::CloneVm)?;
        let source = inner.vm_mut(vm)?.clone();

        // A clone keeps the source's template flag until it is cleared.
        let record = VmRecord {
            uuid: inner.next_uuid(),
            name_label: new_name.to_string(),
            power_state: PowerState::Halted,
            cloned_from: Some(vm.reference.clone()),
            ..source
        };
        let reference = new_ref();
        inner.vms.insert(reference.clone(), record);
        Ok(VmHandle {
            reference,
            name_label: new_name.to_string(),
        })
    }

    async fn import_vm(&self, source: &Path, sr_name: Option<&str>) -> VmforgeResult<VmHandle> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::ImportVm)?;
        if let Some(sr) = sr_name
            && !inner.storage_repositories.contains(sr)
        {
            return Err(VmforgeError::NotFound(format!(
                "storage repository '{}'",
                sr
            )));
        }

        let name_label = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "imported".to_string());
        let uuid = inner.next_uuid();
        let mut record = VmRecord::new(uuid, &name_label, false);
        record.sr_name = sr_name.map(str::to_string);
        record.imported_from = Some(source.to_path_buf());

        let reference = new_ref();
        inner.vms.insert(reference.clone(), record);
        Ok(VmHandle {
            reference,
            name_label,
        })
    }

    async fn get_vm_uuid(&self, vm: &VmHandle) -> VmforgeResult<String> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::GetVmUuid)?;
        Ok(inner.vm_mut(vm)?.uuid.clone())
    }

    async fn set_is_a_template(&self, vm: &VmHandle, is_a_template: bool) -> VmforgeResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::SetIsATemplate)?;
        inner.vm_mut(vm)?.is_a_template = is_a_template;
        Ok(())
    }

    async fn set_name_label(&self, vm: &VmHandle, name_label: &str) -> VmforgeResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::SetNameLabel)?;
        inner.vm_mut(vm)?.name_label = name_label.to_string();
        Ok(())
    }

    async fn set_description(&self, vm: &VmHandle, description: &str) -> VmforgeResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::SetDescription)?;
        inner.vm_mut(vm)?.description = description.to_string();
        Ok(())
    }

    async fn set_vcpus(&self, vm: &VmHandle, vcpus: u32) -> VmforgeResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::SetVcpus)?;
        inner.vm_mut(vm)?.vcpus = Some(vcpus);
        Ok(())
    }

    async fn set_memory(&self, vm: &VmHandle, bytes: u64) -> VmforgeResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::SetMemory)?;
        inner.vm_mut(vm)?.memory_bytes = Some(bytes);
        Ok(())
    }

    async fn get_networks_by_name_label(
        &self,
        name_label: &str,
    ) -> VmforgeResult<Vec<NetworkHandle>> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::GetNetworksByNameLabel)?;
        Ok(inner
            .networks
            .iter()
            .filter(|(_, net)| net.name_label == name_label)
            .map(|(reference, net)| NetworkHandle {
                reference: reference.clone(),
                name_label: net.name_label.clone(),
            })
            .collect())
    }

    async fn create_vif(
        &self,
        vm: &VmHandle,
        network: &NetworkHandle,
        device: &str,
    ) -> VmforgeResult<VifHandle> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::CreateVif)?;
        inner.vm_mut(vm)?;
        if !inner.networks.contains_key(&network.reference) {
            return Err(VmforgeError::NotFound(format!(
                "network {}",
                network.reference
            )));
        }
        if inner
            .vifs
            .values()
            .any(|vif| vif.vm == vm.reference && vif.device == device)
        {
            return Err(VmforgeError::Remote(format!(
                "device {} already in use on {}",
                device, vm.reference
            )));
        }

        let reference = new_ref();
        inner.vifs.insert(
            reference.clone(),
            VifRecord {
                vm: vm.reference.clone(),
                network: network.reference.clone(),
                device: device.to_string(),
            },
        );
        Ok(VifHandle {
            reference,
            device: device.to_string(),
            network: network.name_label.clone(),
        })
    }

    async fn destroy_vif(&self, vif: &VifHandle) -> VmforgeResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::DestroyVif)?;
        inner
            .vifs
            .remove(&vif.reference)
            .map(|_| ())
            .ok_or_else(|| VmforgeError::NotFound(format!("VIF {}", vif.reference)))
    }

    async fn start_vm(&self, vm: &VmHandle) -> VmforgeResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::StartVm)?;
        let record = inner.vm_mut(vm)?;
        if record.is_a_template {
            return Err(VmforgeError::Remote(format!(
                "{} is a template and cannot be started",
                vm.reference
            )));
        }
        if record.power_state == PowerState::Running {
            return Err(VmforgeError::Remote(format!(
                "{} is already running",
                vm.reference
            )));
        }
        record.power_state = PowerState::Running;
        Ok(())
    }

    async fn hard_shutdown_vm(&self, vm: &VmHandle) -> VmforgeResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::HardShutdownVm)?;
        let record = inner.vm_mut(vm)?;
        if record.power_state != PowerState::Running {
            return Err(VmforgeError::Remote(format!(
                "{} is not running",
                vm.reference
            )));
        }
        record.power_state = PowerState::Halted;
        Ok(())
    }

    async fn destroy_vm(&self, vm: &VmHandle) -> VmforgeResult<()> {
        let mut inner = self.inner.lock();
        inner.enter(Operation::DestroyVm)?;
        if inner.vm_mut(vm)?.power_state == PowerState::Running {
            return Err(VmforgeError::Remote(format!(
                "{} must be halted before it is destroyed",
                vm.reference
            )));
        }
        inner.vms.remove(&vm.reference);
        inner.vifs.retain(|_, vif| vif.vm != vm.reference);
        Ok(())
    }
}
