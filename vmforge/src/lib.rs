//! vmforge provisions VM instances on a hypervisor control plane by running a
//! fixed pipeline of steps, rolling back remote side effects when a step halts.
//!
//! ```ignore
//! use std::sync::Arc;
//! use vmforge::{ProvisionConfig, Provisioner, TracingUi};
//!
//! let config = ProvisionConfig::from_json_file(path)?;
//! let instance = Provisioner::new(config, client, Arc::new(TracingUi))?
//!     .provision()
//!     .await?;
//! ```

pub mod client;
pub mod config;
pub mod logging;
pub mod pipeline;
pub mod provision;
pub mod source;
pub mod state;
pub mod ui;

pub use client::{ControlPlaneClient, InMemoryControlPlane, OpaqueRef, VifHandle, VmHandle};
pub use config::ProvisionConfig;
pub use logging::{LogOptions, init_logging};
pub use provision::{ProvisionedInstance, Provisioner};
pub use source::SourceSpecifier;
pub use state::ProvisionState;
pub use ui::{CapturingUi, TracingUi, Ui, UiMessage};
pub use vmforge_shared::errors::{VmforgeError, VmforgeResult};
