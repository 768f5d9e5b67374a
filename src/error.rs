//! Error type shared by every installer operation.

use std::path::PathBuf;

use thiserror::Error;

use crate::control::ServiceState;
use crate::nt::StatusError;

#[derive(Debug, Error)]
pub enum InstallerError {
    /// Precondition failure caught before any native call.
    #[error("invalid executable {}: {reason}", path.display())]
    Validation { path: PathBuf, reason: &'static str },

    #[error("invalid service name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    /// A native registry call failed.
    #[error("failed to {context}: {source}")]
    Status {
        context: &'static str,
        #[source]
        source: StatusError,
    },

    #[error("service '{name}' does not exist")]
    ServiceNotFound { name: String },

    /// A mandatory field write failed after the service key was created.
    /// The key is left in place with the fields written so far.
    #[error("service '{name}' is partially installed: failed to set {field}: {source}")]
    PartialInstall {
        name: String,
        field: &'static str,
        #[source]
        source: StatusError,
    },

    #[error("service '{name}' record is incomplete: {field} is missing")]
    IncompleteRecord { name: String, field: &'static str },

    /// The service control manager has no service by that name.
    #[error("service '{name}' is not known to the service control manager")]
    ServiceUnknown { name: String },

    #[error("service control for '{name}' failed: {message}")]
    Control { name: String, message: String },

    #[error("timed out waiting for service '{name}' to reach {state}")]
    Timeout { name: String, state: ServiceState },

    #[error("this program must be run as Administrator")]
    PermissionDenied,

    #[error("unsupported: {0}")]
    Unsupported(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl InstallerError {
    pub(crate) fn status(context: &'static str) -> impl FnOnce(StatusError) -> Self {
        move |source| Self::Status { context, source }
    }
}
