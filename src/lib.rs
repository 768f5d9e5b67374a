//! Register executables as Windows services by writing the service record
//! straight into the registry through ntdll, without going through the
//! Service Control Manager's create API.
//!
//! [`nt`] holds the native layer (counted wide strings, object attributes,
//! key handles and typed values) behind the [`nt::NtRegistry`] seam;
//! [`install`] builds the service-record installer on top of it.

pub mod config;
pub mod control;
pub mod error;
pub mod install;
pub mod nt;

pub use config::InstallerConfig;
pub use error::InstallerError;
pub use install::{InstallRequest, NativeInstaller, ServiceInstaller, StatusReport};
