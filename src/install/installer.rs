//! Creating the service key and its values.

use log::{debug, info, warn};

use crate::error::InstallerError;
use crate::nt::{KeyAccess, KeyHandle, NtRegistry, StatusError, write_dword, write_string};

use super::record::{ServiceRecord, field, image_path, validate_service_name};
use super::{DescriptionOutcome, InstallOutcome, InstallRequest};

/// Write the service record for `request` under `root`.
///
/// The mandatory fields are written in order and the first failure stops the
/// install. The key is not deleted in that case: it stays behind with the
/// fields written so far and the error is [`InstallerError::PartialInstall`].
/// A failed description write only logs a warning.
pub(super) fn install<R: NtRegistry>(
    registry: &R,
    root: &str,
    request: &InstallRequest,
) -> Result<InstallOutcome, InstallerError> {
    let image_path = image_path(&request.exe_path)?;
    validate_service_name(&request.service_name)?;

    let record = ServiceRecord::for_install(request, image_path);
    let name = record.name.as_str();

    let services = KeyHandle::open_root(registry, root, KeyAccess::CREATE_SUB_KEY)
        .map_err(InstallerError::status("open the services root"))?;
    let (key, disposition) = services
        .create_child(name, KeyAccess::ALL_ACCESS)
        .map_err(InstallerError::status("create the service key"))?;
    info!("service key {name} ready (disposition: {disposition})");

    let partial = |field: &'static str| {
        move |source: StatusError| InstallerError::PartialInstall {
            name: name.to_string(),
            field,
            source,
        }
    };

    write_dword(&key, field::TYPE, record.service_type.as_raw()).map_err(partial(field::TYPE))?;
    write_dword(&key, field::START, record.start.as_raw()).map_err(partial(field::START))?;
    write_dword(&key, field::ERROR_CONTROL, record.error_control.as_raw())
        .map_err(partial(field::ERROR_CONTROL))?;
    write_string(&key, field::IMAGE_PATH, &record.image_path)
        .map_err(partial(field::IMAGE_PATH))?;
    write_string(&key, field::DISPLAY_NAME, &record.display_name)
        .map_err(partial(field::DISPLAY_NAME))?;
    write_string(&key, field::OBJECT_NAME, &record.object_name)
        .map_err(partial(field::OBJECT_NAME))?;

    let description = match record.description.as_deref() {
        None => DescriptionOutcome::Skipped,
        Some(text) => match write_string(&key, field::DESCRIPTION, text) {
            Ok(()) => DescriptionOutcome::Written,
            Err(e) => {
                warn!("failed to set description of {name}: {e}");
                DescriptionOutcome::Failed(e)
            }
        },
    };

    info!("service {name} installed");
    Ok(InstallOutcome {
        record,
        disposition,
        description,
    })
}

/// Read the record stored under `root`, `None` if the service key is missing.
pub(super) fn read_record<R: NtRegistry>(
    registry: &R,
    root: &str,
    service_name: &str,
) -> Result<Option<ServiceRecord>, InstallerError> {
    validate_service_name(service_name)?;

    let services = KeyHandle::open_root(registry, root, KeyAccess::ENUMERATE_SUB_KEYS)
        .map_err(InstallerError::status("open the services root"))?;
    let key = match services.open_child(service_name, KeyAccess::QUERY_VALUE) {
        Ok(key) => key,
        Err(e) if e.is_not_found() => {
            debug!("no service key for {service_name}");
            return Ok(None);
        }
        Err(e) => return Err(InstallerError::status("open the service key")(e)),
    };

    ServiceRecord::load(&key, service_name).map(Some)
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::install::SERVICES_ROOT;
    use crate::nt::{Disposition, MemoryRegistry};

    fn exe() -> tempfile::NamedTempFile {
        tempfile::Builder::new()
            .suffix(".exe")
            .tempfile()
            .unwrap()
    }

    #[test]
    fn missing_executable_fails_before_touching_the_store() {
        let registry = MemoryRegistry::with_path(SERVICES_ROOT);
        let request = InstallRequest::new(PathBuf::from("/no/such/app.exe"), "Demo");

        let err = install(&registry, SERVICES_ROOT, &request).unwrap_err();
        assert!(matches!(err, InstallerError::Validation { .. }));
        assert!(!registry.key_exists(&format!(r"{SERVICES_ROOT}\Demo")));
        assert_eq!(registry.open_handles(), 0);
    }

    #[test]
    fn nul_in_name_creates_no_key() {
        let registry = MemoryRegistry::with_path(SERVICES_ROOT);
        let exe = exe();
        let request = InstallRequest::new(exe.path(), "De\0mo");

        let err = install(&registry, SERVICES_ROOT, &request).unwrap_err();
        assert!(matches!(err, InstallerError::InvalidName { .. }));
        assert!(!registry.key_exists(&format!("{SERVICES_ROOT}\\De\0mo")));
        assert!(!registry.key_exists(&format!(r"{SERVICES_ROOT}\De")));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn non_unicode_executable_is_not_installed() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let registry = MemoryRegistry::with_path(SERVICES_ROOT);
        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join(OsStr::from_bytes(b"app\xff.exe"));
        std::fs::write(&exe, b"").unwrap();

        let err = install(&registry, SERVICES_ROOT, &InstallRequest::new(exe, "Demo")).unwrap_err();
        assert!(matches!(err, InstallerError::Validation { .. }));
        assert!(!registry.key_exists(&format!(r"{SERVICES_ROOT}\Demo")));
        assert_eq!(registry.open_handles(), 0);
    }

    #[test]
    fn invalid_name_is_rejected() {
        let registry = MemoryRegistry::with_path(SERVICES_ROOT);
        let exe = exe();
        let request = InstallRequest::new(exe.path(), r"Demo\Parameters");

        let err = install(&registry, SERVICES_ROOT, &request).unwrap_err();
        assert!(matches!(err, InstallerError::InvalidName { .. }));
    }

    #[test]
    fn install_writes_every_mandatory_field() {
        let registry = MemoryRegistry::with_path(SERVICES_ROOT);
        let exe = exe();
        let request = InstallRequest::new(exe.path(), "Demo");

        let outcome = install(&registry, SERVICES_ROOT, &request).unwrap();
        assert_eq!(outcome.disposition, Disposition::Created);
        assert_eq!(outcome.description, DescriptionOutcome::Skipped);
        assert_eq!(registry.open_handles(), 0);

        let stored = read_record(&registry, SERVICES_ROOT, "Demo").unwrap().unwrap();
        assert_eq!(stored, outcome.record);
        assert_eq!(stored.display_name, "Demo");
        assert_eq!(stored.image_path, exe.path().to_string_lossy());
    }

    #[test]
    fn missing_root_reports_status() {
        let registry = MemoryRegistry::new();
        let exe = exe();
        let request = InstallRequest::new(exe.path(), "Demo");

        let err = install(&registry, SERVICES_ROOT, &request).unwrap_err();
        assert!(matches!(err, InstallerError::Status { .. }));
        assert_eq!(registry.open_handles(), 0);
    }

    #[test]
    fn read_record_of_unknown_service_is_none() {
        let registry = MemoryRegistry::with_path(SERVICES_ROOT);
        assert_eq!(read_record(&registry, SERVICES_ROOT, "Ghost").unwrap(), None);
    }
}
