//! Removing the service key.

use log::{debug, info, warn};

use crate::config::InstallerConfig;
use crate::control::{ServiceControl, ServiceState};
use crate::error::InstallerError;
use crate::nt::{KeyAccess, KeyHandle, NtRegistry};

use super::record::validate_service_name;

/// Stop the service if the control manager reports it running, then delete
/// its key. The stop is best effort: any control failure is logged and the
/// key is deleted regardless.
pub(super) fn uninstall<R: NtRegistry, C: ServiceControl>(
    registry: &R,
    control: &C,
    config: &InstallerConfig,
    service_name: &str,
) -> Result<(), InstallerError> {
    validate_service_name(service_name)?;

    stop_before_delete(control, config, service_name);

    let services = KeyHandle::open_root(registry, &config.services_root, KeyAccess::ENUMERATE_SUB_KEYS)
        .map_err(InstallerError::status("open the services root"))?;
    let key = match services.open_child(service_name, KeyAccess::DELETE) {
        Ok(key) => key,
        Err(e) if e.is_not_found() => {
            return Err(InstallerError::ServiceNotFound {
                name: service_name.to_string(),
            });
        }
        Err(e) => return Err(InstallerError::status("open the service key")(e)),
    };

    key.delete()
        .map_err(InstallerError::status("delete the service key"))?;
    info!("service {service_name} uninstalled");
    Ok(())
}

fn stop_before_delete<C: ServiceControl>(control: &C, config: &InstallerConfig, service_name: &str) {
    let running = match control.is_running(service_name) {
        Ok(running) => running,
        Err(e) => {
            debug!("skipping stop of {service_name}: {e}");
            return;
        }
    };
    if !running {
        return;
    }

    info!("stopping {service_name} before removal");
    if let Err(e) = control.request_stop(service_name) {
        warn!("failed to stop {service_name}: {e}");
        return;
    }
    match control.wait_for_state(
        service_name,
        ServiceState::Stopped,
        config.timeouts.uninstall_stop(),
        config.timeouts.poll_interval(),
    ) {
        Ok(true) => debug!("{service_name} stopped"),
        Ok(false) => warn!("{service_name} did not stop in time, removing it anyway"),
        Err(e) => warn!("failed to wait for {service_name} to stop: {e}"),
    }
}
