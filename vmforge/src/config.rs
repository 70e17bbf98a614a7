use crate::source::SourceSpecifier;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use vmforge_shared::errors::{VmforgeError, VmforgeResult};

/// Provisioning configuration (fixed for the duration of one run).
///
/// Either `source_template` or `source_path` must be set. When both are,
/// the template wins and `source_path` is only used if template resolution
/// falls back.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProvisionConfig {
    /// Name label given to the new instance.
    pub vm_name: String,
    /// Description written to the new instance.
    pub vm_description: String,
    /// Template to clone: `uuid://<id>`, a unique name label, or empty.
    pub source_template: String,
    /// Local VM artifact imported when no template produced an instance.
    pub source_path: Option<PathBuf>,
    /// Storage repository receiving imported disks.
    pub sr_name: Option<String>,
    pub vcpus: Option<u32>,
    pub memory_mib: Option<u64>,
    /// Networks to attach, in device order.
    pub network_names: Vec<String>,
    /// Boot the instance as the last provisioning step.
    pub power_on: bool,
}

impl ProvisionConfig {
    pub fn from_json_str(raw: &str) -> VmforgeResult<Self> {
        Ok(serde_json::from_str(raw)?)
    }

    pub fn from_json_file(path: &Path) -> VmforgeResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            VmforgeError::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&raw)
    }

    pub fn source(&self) -> SourceSpecifier {
        SourceSpecifier::parse(&self.source_template)
    }

    /// Reject configurations no provisioning run could satisfy.
    pub fn sanitize(&self) -> VmforgeResult<()> {
        if self.vm_name.trim().is_empty() {
            return Err(VmforgeError::Config("vm_name must not be empty".into()));
        }

        if self.source_template.is_empty() && self.source_path.is_none() {
            return Err(VmforgeError::Config(
                "either source_template or source_path must be set".into(),
            ));
        }

        if self.vcpus == Some(0) {
            return Err(VmforgeError::Config("vcpus must be at least 1".into()));
        }

        if self.memory_mib == Some(0) {
            return Err(VmforgeError::Config(
                "memory_mib must be at least 1".into(),
            ));
        }
        self.memory_bytes()?;

        if let Some(index) = self.network_names.iter().position(|n| n.trim().is_empty()) {
            return Err(VmforgeError::Config(format!(
                "network_names[{}] must not be empty",
                index
            )));
        }

        Ok(())
    }

    /// `memory_mib` in bytes; errors when the product does not fit in a `u64`.
    pub fn memory_bytes(&self) -> VmforgeResult<Option<u64>> {
        match self.memory_mib {
            None => Ok(None),
            Some(mib) => mib
                .checked_mul(1024 * 1024)
                .map(Some)
                .ok_or_else(|| VmforgeError::Config("memory_mib is too large".into())),
        }
    }
}
