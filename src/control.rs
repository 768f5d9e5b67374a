//! Service control manager collaborator.
//!
//! Start, stop and status go through the control manager rather than the
//! service store:
//! - Windows: Service Control Manager (Windows API)
//! - elsewhere: [`UnsupportedControl`], which fails every request

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use crate::error::InstallerError;
use crate::install::{ServiceType, StartMode};

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        mod windows_control;
        pub use windows_control::ScmControl;
    }
}

/// `dwCurrentState` of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceState {
    Stopped,
    StartPending,
    StopPending,
    Running,
    ContinuePending,
    PausePending,
    Paused,
    Other(u32),
}

impl ServiceState {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => Self::Stopped,
            2 => Self::StartPending,
            3 => Self::StopPending,
            4 => Self::Running,
            5 => Self::ContinuePending,
            6 => Self::PausePending,
            7 => Self::Paused,
            other => Self::Other(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::Stopped => 1,
            Self::StartPending => 2,
            Self::StopPending => 3,
            Self::Running => 4,
            Self::ContinuePending => 5,
            Self::PausePending => 6,
            Self::Paused => 7,
            Self::Other(raw) => raw,
        }
    }

    pub fn is_pending(self) -> bool {
        matches!(
            self,
            Self::StartPending | Self::StopPending | Self::ContinuePending | Self::PausePending
        )
    }
}

impl fmt::Display for ServiceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("stopped"),
            Self::StartPending => f.write_str("start pending"),
            Self::StopPending => f.write_str("stop pending"),
            Self::Running => f.write_str("running"),
            Self::ContinuePending => f.write_str("continue pending"),
            Self::PausePending => f.write_str("pause pending"),
            Self::Paused => f.write_str("paused"),
            Self::Other(raw) => write!(f, "state {raw}"),
        }
    }
}

/// What the control manager reports for one service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceStatus {
    pub service_name: String,
    pub display_name: String,
    pub current_state: ServiceState,
    pub service_type: ServiceType,
    pub start: StartMode,
}

/// Operations on services loaded by the control manager. A service it does
/// not know fails with [`InstallerError::ServiceUnknown`].
pub trait ServiceControl {
    fn query(&self, service_name: &str) -> Result<ServiceStatus, InstallerError>;

    fn start(&self, service_name: &str) -> Result<(), InstallerError>;

    fn request_stop(&self, service_name: &str) -> Result<(), InstallerError>;

    /// Anything but stopped counts as running.
    fn is_running(&self, service_name: &str) -> Result<bool, InstallerError> {
        Ok(self.query(service_name)?.current_state != ServiceState::Stopped)
    }

    /// Poll until the service reaches `state`. `Ok(false)` when `timeout`
    /// elapses first.
    fn wait_for_state(
        &self,
        service_name: &str,
        state: ServiceState,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<bool, InstallerError> {
        let started = Instant::now();
        loop {
            let current = self.query(service_name)?.current_state;
            if current == state {
                return Ok(true);
            }
            if started.elapsed() >= timeout {
                log::debug!("{service_name} still {current} after {timeout:?}");
                return Ok(false);
            }
            thread::sleep(poll_interval);
        }
    }
}

impl<C: ServiceControl + ?Sized> ServiceControl for &C {
    fn query(&self, service_name: &str) -> Result<ServiceStatus, InstallerError> {
        (**self).query(service_name)
    }

    fn start(&self, service_name: &str) -> Result<(), InstallerError> {
        (**self).start(service_name)
    }

    fn request_stop(&self, service_name: &str) -> Result<(), InstallerError> {
        (**self).request_stop(service_name)
    }

    fn is_running(&self, service_name: &str) -> Result<bool, InstallerError> {
        (**self).is_running(service_name)
    }

    fn wait_for_state(
        &self,
        service_name: &str,
        state: ServiceState,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<bool, InstallerError> {
        (**self).wait_for_state(service_name, state, timeout, poll_interval)
    }
}

/// Control for targets without a control manager, and for dry runs.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsupportedControl;

impl UnsupportedControl {
    fn unsupported(&self, service_name: &str) -> InstallerError {
        InstallerError::Unsupported(format!(
            "no service control manager available to manage '{service_name}'"
        ))
    }
}

impl ServiceControl for UnsupportedControl {
    fn query(&self, service_name: &str) -> Result<ServiceStatus, InstallerError> {
        Err(self.unsupported(service_name))
    }

    fn start(&self, service_name: &str) -> Result<(), InstallerError> {
        Err(self.unsupported(service_name))
    }

    fn request_stop(&self, service_name: &str) -> Result<(), InstallerError> {
        Err(self.unsupported(service_name))
    }
}
