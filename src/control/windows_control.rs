//! Service control using the Service Control Manager (SCM) API

use windows::Win32::Foundation::{ERROR_ACCESS_DENIED, ERROR_SERVICE_DOES_NOT_EXIST};
use windows::Win32::System::Services::{
    CloseServiceHandle, ControlService, OpenSCManagerW, OpenServiceW, QUERY_SERVICE_CONFIGW,
    QueryServiceConfigW, QueryServiceStatusEx, SC_HANDLE, SC_MANAGER_CONNECT,
    SC_STATUS_PROCESS_INFO, SERVICE_CONTROL_STOP, SERVICE_QUERY_CONFIG, SERVICE_QUERY_STATUS,
    SERVICE_START, SERVICE_STATUS, SERVICE_STATUS_PROCESS, SERVICE_STOP, StartServiceW,
};
use windows::core::PCWSTR;

use super::{ServiceControl, ServiceState, ServiceStatus};
use crate::error::InstallerError;
use crate::install::{ServiceType, StartMode};

/// RAII wrapper for SC_HANDLE (manager or service)
struct ScHandle(SC_HANDLE);

impl Drop for ScHandle {
    fn drop(&mut self) {
        if !self.0.is_invalid() {
            // SAFETY: the handle is owned by this guard and closed once.
            unsafe {
                let _ = CloseServiceHandle(self.0);
            }
        }
    }
}

/// [`ServiceControl`] backed by the Service Control Manager.
#[derive(Debug, Default, Clone, Copy)]
pub struct ScmControl;

impl ScmControl {
    fn open(&self, service_name: &str, access: u32) -> Result<(ScHandle, ScHandle), InstallerError> {
        // SAFETY: null machine and database names select the local active database.
        let manager = unsafe { OpenSCManagerW(PCWSTR::null(), PCWSTR::null(), SC_MANAGER_CONNECT) }
            .map_err(|e| InstallerError::Control {
                name: service_name.to_string(),
                message: format!("failed to open the Service Control Manager: {e}"),
            })?;
        let manager = ScHandle(manager);

        let wide: Vec<u16> = service_name.encode_utf16().chain(Some(0)).collect();
        // SAFETY: `wide` is null-terminated and outlives the call.
        match unsafe { OpenServiceW(manager.0, PCWSTR(wide.as_ptr()), access) } {
            Ok(service) => Ok((manager, ScHandle(service))),
            Err(e) => Err(classify(service_name, &e)),
        }
    }

    fn query_state(&self, service_name: &str, service: &ScHandle) -> Result<SERVICE_STATUS_PROCESS, InstallerError> {
        let mut status = SERVICE_STATUS_PROCESS::default();
        let mut bytes_needed = 0u32;
        // SAFETY: the slice covers exactly `status`, which outlives the call.
        unsafe {
            QueryServiceStatusEx(
                service.0,
                SC_STATUS_PROCESS_INFO,
                Some(std::slice::from_raw_parts_mut(
                    &mut status as *mut _ as *mut u8,
                    std::mem::size_of::<SERVICE_STATUS_PROCESS>(),
                )),
                &mut bytes_needed,
            )
        }
        .map_err(|e| classify(service_name, &e))?;
        Ok(status)
    }

    /// Display name and start type from the service configuration.
    fn query_config(&self, service_name: &str, service: &ScHandle) -> Result<(String, StartMode), InstallerError> {
        let mut bytes_needed = 0u32;
        // SAFETY: sizing call without a buffer; only `bytes_needed` is written.
        let _ = unsafe { QueryServiceConfigW(service.0, None, 0, &mut bytes_needed) };

        let minimum = std::mem::size_of::<QUERY_SERVICE_CONFIGW>();
        // u64 storage keeps the structure and its trailing strings aligned.
        let mut buffer = vec![0u64; (bytes_needed as usize).max(minimum).div_ceil(8)];
        let config = buffer.as_mut_ptr().cast::<QUERY_SERVICE_CONFIGW>();
        // SAFETY: `buffer` is writable for the length passed and outlives `config`.
        unsafe {
            QueryServiceConfigW(
                service.0,
                Some(config),
                (buffer.len() * 8) as u32,
                &mut bytes_needed,
            )
        }
        .map_err(|e| classify(service_name, &e))?;

        // SAFETY: filled by the successful call above; the strings point into `buffer`.
        let config = unsafe { &*config };
        let display_name = if config.lpDisplayName.is_null() {
            String::new()
        } else {
            // SAFETY: non-null and null-terminated inside `buffer`.
            unsafe { config.lpDisplayName.to_string() }.unwrap_or_default()
        };
        Ok((display_name, StartMode::from_raw(config.dwStartType.0)))
    }
}

/// Map a failed SCM call by the code captured in its error.
fn classify(service_name: &str, e: &windows::core::Error) -> InstallerError {
    let code = e.code();
    if code == ERROR_SERVICE_DOES_NOT_EXIST.to_hresult() {
        InstallerError::ServiceUnknown {
            name: service_name.to_string(),
        }
    } else if code == ERROR_ACCESS_DENIED.to_hresult() {
        InstallerError::PermissionDenied
    } else {
        InstallerError::Control {
            name: service_name.to_string(),
            message: e.to_string(),
        }
    }
}

impl ServiceControl for ScmControl {
    fn query(&self, service_name: &str) -> Result<ServiceStatus, InstallerError> {
        let (_manager, service) = self.open(service_name, SERVICE_QUERY_STATUS | SERVICE_QUERY_CONFIG)?;
        let status = self.query_state(service_name, &service)?;
        let (display_name, start) = self.query_config(service_name, &service)?;

        Ok(ServiceStatus {
            service_name: service_name.to_string(),
            display_name,
            current_state: ServiceState::from_raw(status.dwCurrentState.0),
            service_type: ServiceType::from_raw(status.dwServiceType.0),
            start,
        })
    }

    fn start(&self, service_name: &str) -> Result<(), InstallerError> {
        let (_manager, service) = self.open(service_name, SERVICE_START)?;
        // SAFETY: `service` was opened with SERVICE_START.
        unsafe { StartServiceW(service.0, None) }.map_err(|e| classify(service_name, &e))
    }

    fn request_stop(&self, service_name: &str) -> Result<(), InstallerError> {
        let (_manager, service) = self.open(service_name, SERVICE_STOP)?;
        let mut status = SERVICE_STATUS::default();
        // SAFETY: `service` was opened with SERVICE_STOP; `status` is a valid out pointer.
        unsafe { ControlService(service.0, SERVICE_CONTROL_STOP, &mut status) }
            .map_err(|e| classify(service_name, &e))
    }
}
