//! Start, stop and status through the service control manager.

use log::{debug, info};

use crate::config::InstallerConfig;
use crate::control::{ServiceControl, ServiceState};
use crate::error::InstallerError;
use crate::nt::NtRegistry;

use super::record::validate_service_name;
use super::{ControlOutcome, NativeInstaller, StatusReport};

pub(super) fn start<C: ServiceControl>(
    control: &C,
    config: &InstallerConfig,
    service_name: &str,
) -> Result<ControlOutcome, InstallerError> {
    validate_service_name(service_name)?;

    let status = control.query(service_name)?;
    if status.current_state == ServiceState::Running {
        info!("{service_name} is already running");
        return Ok(ControlOutcome::AlreadyInState);
    }

    control.start(service_name)?;
    wait(control, config, service_name, ServiceState::Running, config.timeouts.start())?;
    info!("{service_name} started");
    Ok(ControlOutcome::Changed)
}

pub(super) fn stop<C: ServiceControl>(
    control: &C,
    config: &InstallerConfig,
    service_name: &str,
) -> Result<ControlOutcome, InstallerError> {
    validate_service_name(service_name)?;

    let status = control.query(service_name)?;
    if status.current_state == ServiceState::Stopped {
        info!("{service_name} is already stopped");
        return Ok(ControlOutcome::AlreadyInState);
    }

    control.request_stop(service_name)?;
    wait(control, config, service_name, ServiceState::Stopped, config.timeouts.stop())?;
    info!("{service_name} stopped");
    Ok(ControlOutcome::Changed)
}

fn wait<C: ServiceControl>(
    control: &C,
    config: &InstallerConfig,
    service_name: &str,
    state: ServiceState,
    timeout: std::time::Duration,
) -> Result<(), InstallerError> {
    if control.wait_for_state(service_name, state, timeout, config.timeouts.poll_interval())? {
        Ok(())
    } else {
        Err(InstallerError::Timeout {
            name: service_name.to_string(),
            state,
        })
    }
}

/// Ask the control manager first; a service it does not know may still be
/// in the store, waiting for the next boot or refresh.
pub(super) fn status<R: NtRegistry, C: ServiceControl>(
    installer: &NativeInstaller<R, C>,
    service_name: &str,
) -> Result<StatusReport, InstallerError> {
    validate_service_name(service_name)?;

    match installer.control().query(service_name) {
        Ok(status) => return Ok(StatusReport::Loaded(status)),
        Err(e @ (InstallerError::ServiceUnknown { .. } | InstallerError::Unsupported(_))) => {
            debug!("falling back to the service store for {service_name}: {e}");
        }
        Err(e) => return Err(e),
    }

    match installer.read_record(service_name) {
        Ok(Some(record)) => Ok(StatusReport::RegistryOnly(record)),
        Ok(None) => Ok(StatusReport::Missing),
        Err(InstallerError::IncompleteRecord { name, field }) => {
            Ok(StatusReport::Incomplete { name, missing: field })
        }
        Err(e) => Err(e),
    }
}
