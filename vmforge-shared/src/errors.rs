//! Error taxonomy for vmforge.

use thiserror::Error;

pub type VmforgeResult<T> = Result<T, VmforgeError>;

#[derive(Debug, Error)]
pub enum VmforgeError {
    /// A control-plane lookup matched nothing.
    #[error("not found: {0}")]
    NotFound(String),

    /// The control plane rejected or failed a well-formed request.
    #[error("remote error: {0}")]
    Remote(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("internal error: {0}")]
    Internal(String),

    /// A provisioning run stopped at the named step after rolling back.
    #[error("provisioning halted at step '{0}'")]
    Halted(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
