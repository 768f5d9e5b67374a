//! Service installation through the native registry.
//!
//! [`NativeInstaller`] is the one [`ServiceInstaller`] strategy: install and
//! uninstall write or delete the service record directly with ntdll key
//! calls, while start, stop and status go through the [`ServiceControl`]
//! collaborator.

use std::path::PathBuf;

use crate::config::InstallerConfig;
use crate::control::{ServiceControl, ServiceStatus};
use crate::error::InstallerError;
use crate::nt::{Disposition, NtRegistry, StatusError};

mod installer;
mod lifecycle;
pub mod privileges;
pub mod record;
mod uninstall;

pub use record::{
    ErrorControl, LOCAL_SYSTEM, SERVICES_ROOT, ServiceRecord, ServiceType, StartMode,
    validate_service_name,
};

/// What the CLI hands over for `install`.
#[derive(Debug, Clone)]
pub struct InstallRequest {
    pub exe_path: PathBuf,
    pub service_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
}

impl InstallRequest {
    pub fn new(exe_path: impl Into<PathBuf>, service_name: impl Into<String>) -> Self {
        Self {
            exe_path: exe_path.into(),
            service_name: service_name.into(),
            display_name: None,
            description: None,
        }
    }

    /// Set display name
    pub fn display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Set description
    pub fn description(mut self, text: impl Into<String>) -> Self {
        self.description = Some(text.into());
        self
    }
}

/// Result of the optional description write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptionOutcome {
    Skipped,
    Written,
    /// Tolerated: the service is installed without a description.
    Failed(StatusError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallOutcome {
    pub record: ServiceRecord,
    pub disposition: Disposition,
    pub description: DescriptionOutcome,
}

/// Result of a start or stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlOutcome {
    AlreadyInState,
    Changed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusReport {
    /// Known to the service control manager.
    Loaded(ServiceStatus),
    /// In the store but not yet loaded by the control manager.
    RegistryOnly(ServiceRecord),
    /// In the store with mandatory fields missing.
    Incomplete { name: String, missing: &'static str },
    Missing,
}

/// Service management operations, whatever mechanism backs them.
pub trait ServiceInstaller {
    fn install(&self, request: &InstallRequest) -> Result<InstallOutcome, InstallerError>;
    fn uninstall(&self, service_name: &str) -> Result<(), InstallerError>;
    fn start(&self, service_name: &str) -> Result<ControlOutcome, InstallerError>;
    fn stop(&self, service_name: &str) -> Result<ControlOutcome, InstallerError>;
    fn status(&self, service_name: &str) -> Result<StatusReport, InstallerError>;
}

/// Installer writing the service database through native key calls.
pub struct NativeInstaller<R, C> {
    registry: R,
    control: C,
    config: InstallerConfig,
}

impl<R: NtRegistry, C: ServiceControl> NativeInstaller<R, C> {
    pub fn new(registry: R, control: C, config: InstallerConfig) -> Self {
        Self {
            registry,
            control,
            config,
        }
    }

    #[inline]
    pub fn registry(&self) -> &R {
        &self.registry
    }

    #[inline]
    pub fn control(&self) -> &C {
        &self.control
    }

    #[inline]
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// Load the stored record for `service_name`, `None` if no key exists.
    pub fn read_record(&self, service_name: &str) -> Result<Option<ServiceRecord>, InstallerError> {
        installer::read_record(&self.registry, &self.config.services_root, service_name)
    }
}

impl<R: NtRegistry, C: ServiceControl> ServiceInstaller for NativeInstaller<R, C> {
    fn install(&self, request: &InstallRequest) -> Result<InstallOutcome, InstallerError> {
        installer::install(&self.registry, &self.config.services_root, request)
    }

    fn uninstall(&self, service_name: &str) -> Result<(), InstallerError> {
        uninstall::uninstall(&self.registry, &self.control, &self.config, service_name)
    }

    fn start(&self, service_name: &str) -> Result<ControlOutcome, InstallerError> {
        lifecycle::start(&self.control, &self.config, service_name)
    }

    fn stop(&self, service_name: &str) -> Result<ControlOutcome, InstallerError> {
        lifecycle::stop(&self.control, &self.config, service_name)
    }

    fn status(&self, service_name: &str) -> Result<StatusReport, InstallerError> {
        lifecycle::status(self, service_name)
    }
}
