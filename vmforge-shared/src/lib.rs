//! Types shared between vmforge and control-plane client implementations.

pub mod errors;

pub use errors::{VmforgeError, VmforgeResult};
