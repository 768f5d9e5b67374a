use std::cell::{Cell, RefCell};

use ntsvc::control::{ServiceControl, ServiceState, ServiceStatus};
use ntsvc::install::{
    ControlOutcome, DescriptionOutcome, SERVICES_ROOT, ServiceType, StartMode,
};
use ntsvc::nt::{
    Disposition, KeyAccess, KeyHandle, MemoryRegistry, NtRegistry, ObjectAttributes, RawKey,
    RegistryValue, STATUS_ACCESS_DENIED, STATUS_CANNOT_DELETE, StatusError, ValueType, WideString,
    read_value,
};
use ntsvc::{InstallRequest, InstallerConfig, InstallerError, NativeInstaller, ServiceInstaller, StatusReport};

/// Store wrapper that records every native call and fails writes of chosen
/// value names. Handles are tracked in the order they were opened and closed,
/// and every write keeps its value name and data length.
#[derive(Default)]
struct Recording {
    inner: MemoryRegistry,
    calls: RefCell<Vec<&'static str>>,
    opened: RefCell<Vec<RawKey>>,
    closed: RefCell<Vec<RawKey>>,
    writes: RefCell<Vec<(String, usize)>>,
    fail_writes: Vec<(&'static str, u32)>,
    fail_create: Option<u32>,
}

impl Recording {
    fn new() -> Self {
        Self {
            inner: MemoryRegistry::with_path(SERVICES_ROOT),
            ..Default::default()
        }
    }

    fn failing(value_name: &'static str, code: u32) -> Self {
        Self {
            fail_writes: vec![(value_name, code)],
            ..Self::new()
        }
    }

    fn failing_create(code: u32) -> Self {
        Self {
            fail_create: Some(code),
            ..Self::new()
        }
    }

    fn opened(&self) -> Vec<RawKey> {
        self.opened.borrow().clone()
    }

    fn closed(&self) -> Vec<RawKey> {
        self.closed.borrow().clone()
    }

    fn write_len(&self, value_name: &str) -> Option<usize> {
        self.writes
            .borrow()
            .iter()
            .find(|(name, _)| name == value_name)
            .map(|(_, len)| *len)
    }

    fn calls(&self) -> Vec<&'static str> {
        self.calls.borrow().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.borrow_mut().push(call);
    }
}

impl NtRegistry for Recording {
    fn open_key(&self, access: KeyAccess, attributes: &ObjectAttributes<'_>) -> Result<RawKey, StatusError> {
        self.record("NtOpenKey");
        let key = self.inner.open_key(access, attributes)?;
        self.opened.borrow_mut().push(key);
        Ok(key)
    }

    fn create_key(
        &self,
        access: KeyAccess,
        attributes: &ObjectAttributes<'_>,
    ) -> Result<(RawKey, Disposition), StatusError> {
        self.record("NtCreateKey");
        if let Some(code) = self.fail_create {
            return Err(StatusError::from_code(code));
        }
        let (key, disposition) = self.inner.create_key(access, attributes)?;
        self.opened.borrow_mut().push(key);
        Ok((key, disposition))
    }

    fn set_value(
        &self,
        key: RawKey,
        name: &WideString,
        value_type: ValueType,
        data: &[u8],
    ) -> Result<(), StatusError> {
        self.record("NtSetValueKey");
        let wanted = name.to_string_lossy();
        self.writes.borrow_mut().push((wanted.clone(), data.len()));
        if let Some((_, code)) = self.fail_writes.iter().find(|(value, _)| *value == wanted) {
            return Err(StatusError::from_code(*code));
        }
        self.inner.set_value(key, name, value_type, data)
    }

    fn query_value(&self, key: RawKey, name: &WideString) -> Result<(ValueType, Vec<u8>), StatusError> {
        self.record("NtQueryValueKey");
        self.inner.query_value(key, name)
    }

    fn delete_key(&self, key: RawKey) -> Result<(), StatusError> {
        self.record("NtDeleteKey");
        self.inner.delete_key(key)
    }

    fn close(&self, key: RawKey) -> Result<(), StatusError> {
        self.record("NtClose");
        self.closed.borrow_mut().push(key);
        self.inner.close(key)
    }
}

/// Control manager with one service whose state the test scripts. `None`
/// means the manager does not know the service.
#[derive(Default)]
struct Scripted {
    state: Cell<Option<ServiceState>>,
    stop_hangs: bool,
    stop_requests: Cell<u32>,
}

impl Scripted {
    fn with_state(state: ServiceState) -> Self {
        Self {
            state: Cell::new(Some(state)),
            ..Default::default()
        }
    }
}

impl ServiceControl for Scripted {
    fn query(&self, service_name: &str) -> Result<ServiceStatus, InstallerError> {
        match self.state.get() {
            Some(current_state) => Ok(ServiceStatus {
                service_name: service_name.to_string(),
                display_name: format!("{service_name} Service"),
                current_state,
                service_type: ServiceType::OwnProcess,
                start: StartMode::Auto,
            }),
            None => Err(InstallerError::ServiceUnknown {
                name: service_name.to_string(),
            }),
        }
    }

    fn start(&self, _: &str) -> Result<(), InstallerError> {
        self.state.set(Some(ServiceState::Running));
        Ok(())
    }

    fn request_stop(&self, _: &str) -> Result<(), InstallerError> {
        self.stop_requests.set(self.stop_requests.get() + 1);
        let next = if self.stop_hangs {
            ServiceState::StopPending
        } else {
            ServiceState::Stopped
        };
        self.state.set(Some(next));
        Ok(())
    }
}

fn quick_config() -> InstallerConfig {
    let mut config = InstallerConfig::default();
    config.timeouts.uninstall_stop_secs = 0;
    config.timeouts.start_secs = 0;
    config.timeouts.stop_secs = 0;
    config.timeouts.poll_interval_ms = 1;
    config
}

fn installer(registry: Recording, control: Scripted) -> NativeInstaller<Recording, Scripted> {
    NativeInstaller::new(registry, control, quick_config())
}

fn exe() -> tempfile::NamedTempFile {
    tempfile::Builder::new().suffix(".exe").tempfile().unwrap()
}

fn service_key_exists(installer: &NativeInstaller<Recording, Scripted>, name: &str) -> bool {
    installer
        .registry()
        .inner
        .key_exists(&format!(r"{SERVICES_ROOT}\{name}"))
}

#[test]
fn install_without_optional_fields() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());

    let outcome = installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();
    assert_eq!(outcome.disposition, Disposition::Created);
    assert_eq!(outcome.description, DescriptionOutcome::Skipped);

    let record = installer.read_record("Demo").unwrap().unwrap();
    assert_eq!(record.display_name, "Demo");
    assert_eq!(record.service_type.as_raw(), 0x10);
    assert_eq!(record.start, StartMode::Auto);
    assert_eq!(record.error_control.as_raw(), 1);
    assert_eq!(record.object_name, "LocalSystem");
    assert_eq!(record.image_path, exe.path().to_string_lossy());
    assert_eq!(record.description, None);

    let registry = installer.registry();
    let root = KeyHandle::open_root(registry, SERVICES_ROOT, KeyAccess::READ).unwrap();
    let key = root.open_child("Demo", KeyAccess::QUERY_VALUE).unwrap();
    assert!(read_value(&key, "Description").unwrap_err().is_not_found());
    assert_eq!(read_value(&key, "Start").unwrap(), RegistryValue::Dword(2));
    drop(key);
    drop(root);

    assert_eq!(registry.inner.open_handles(), 0);
}

#[test]
fn install_with_description_writes_it() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());
    let request = InstallRequest::new(exe.path(), "Demo")
        .display_name("Demo Service")
        .description("Runs the demo");

    let outcome = installer.install(&request).unwrap();
    assert_eq!(outcome.description, DescriptionOutcome::Written);

    let record = installer.read_record("Demo").unwrap().unwrap();
    assert_eq!(record.display_name, "Demo Service");
    assert_eq!(record.description.as_deref(), Some("Runs the demo"));
}

#[test]
fn install_closes_the_service_key_before_the_root() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());

    installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();

    let registry = installer.registry();
    let opened = registry.opened();
    assert_eq!(opened.len(), 2);
    let (root, service) = (opened[0], opened[1]);
    assert_ne!(root, service);
    assert_eq!(registry.closed(), vec![service, root]);
    assert_eq!(registry.inner.open_handles(), 0);
}

#[test]
fn uninstall_closes_the_service_key_before_the_root() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());
    installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();

    let registry = installer.registry();
    let before = registry.opened().len();
    installer.uninstall("Demo").unwrap();

    let opened = registry.opened()[before..].to_vec();
    assert_eq!(opened.len(), 2);
    let closed = registry.closed()[before..].to_vec();
    assert_eq!(closed, vec![opened[1], opened[0]]);
    assert_eq!(registry.inner.open_handles(), 0);
}

#[test]
fn uninstall_of_unknown_service_closes_only_the_root() {
    let installer = installer(Recording::new(), Scripted::default());

    installer.uninstall("Ghost").unwrap_err();

    let registry = installer.registry();
    let opened = registry.opened();
    assert_eq!(opened.len(), 1);
    assert_eq!(registry.closed(), opened);
}

#[test]
fn failed_key_creation_releases_the_root() {
    let exe = exe();
    let installer = installer(Recording::failing_create(STATUS_ACCESS_DENIED), Scripted::default());

    let err = installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap_err();
    assert!(matches!(
        err,
        InstallerError::Status { source, .. } if source.is_access_denied()
    ));

    let registry = installer.registry();
    assert_eq!(registry.calls(), vec!["NtOpenKey", "NtCreateKey", "NtClose"]);
    assert_eq!(registry.opened().len(), 1);
    assert_eq!(registry.closed(), registry.opened());
    assert_eq!(registry.inner.open_handles(), 0);
    assert!(!service_key_exists(&installer, "Demo"));
}

#[test]
fn image_path_data_carries_one_trailing_null() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());

    let outcome = installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();

    let units = outcome.record.image_path.encode_utf16().count();
    let registry = installer.registry();
    assert_eq!(registry.write_len("ImagePath"), Some(2 * units + 2));
    assert_eq!(registry.write_len("DisplayName"), Some(2 * "Demo".len() + 2));
    assert_eq!(registry.write_len("Type"), Some(4));
    assert_eq!(registry.write_len("Start"), Some(4));
    assert_eq!(registry.write_len("Description"), None);
}

#[test]
fn missing_executable_issues_no_native_call() {
    let installer = installer(Recording::new(), Scripted::default());
    let request = InstallRequest::new("/definitely/not/here/app.exe", "Demo");

    let err = installer.install(&request).unwrap_err();
    assert!(matches!(err, InstallerError::Validation { .. }));
    assert!(installer.registry().calls().is_empty());
    assert!(!service_key_exists(&installer, "Demo"));
}

#[test]
fn uninstall_of_unknown_service_does_not_delete() {
    let installer = installer(Recording::new(), Scripted::default());

    let err = installer.uninstall("Ghost").unwrap_err();
    assert!(matches!(err, InstallerError::ServiceNotFound { ref name } if name == "Ghost"));
    assert_eq!(err.to_string(), "service 'Ghost' does not exist");

    let calls = installer.registry().calls();
    assert!(!calls.contains(&"NtDeleteKey"));
    assert_eq!(installer.registry().inner.open_handles(), 0);
}

#[test]
fn install_then_uninstall_removes_the_key() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());

    installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();
    installer.uninstall("Demo").unwrap();

    let registry = installer.registry();
    let root = KeyHandle::open_root(registry, SERVICES_ROOT, KeyAccess::READ).unwrap();
    assert!(root.open_child("Demo", KeyAccess::READ).unwrap_err().is_not_found());
    drop(root);

    assert_eq!(installer.read_record("Demo").unwrap(), None);
    assert_eq!(registry.inner.open_handles(), 0);
}

#[test]
fn reinstall_overwrites_with_identical_values() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());
    let request = InstallRequest::new(exe.path(), "Demo").display_name("Demo Service");

    let first = installer.install(&request).unwrap();
    let second = installer.install(&request).unwrap();

    assert_eq!(first.disposition, Disposition::Created);
    assert_eq!(second.disposition, Disposition::Opened);
    assert_eq!(installer.read_record("Demo").unwrap(), Some(second.record));
}

#[test]
fn failed_field_write_leaves_partial_key() {
    let exe = exe();
    let installer = installer(
        Recording::failing("ImagePath", STATUS_ACCESS_DENIED),
        Scripted::default(),
    );

    let err = installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap_err();
    match err {
        InstallerError::PartialInstall { name, field, source } => {
            assert_eq!(name, "Demo");
            assert_eq!(field, "ImagePath");
            assert!(source.is_access_denied());
        }
        other => panic!("unexpected error: {other}"),
    }

    // Type, Start and ErrorControl were written, then the install stopped.
    let writes = installer
        .registry()
        .calls()
        .iter()
        .filter(|call| **call == "NtSetValueKey")
        .count();
    assert_eq!(writes, 4);
    assert!(service_key_exists(&installer, "Demo"));
    assert_eq!(installer.registry().inner.open_handles(), 0);

    assert_eq!(
        installer.status("Demo").unwrap(),
        StatusReport::Incomplete {
            name: "Demo".to_string(),
            missing: "ImagePath",
        }
    );
}

#[test]
fn failed_description_write_is_tolerated() {
    let exe = exe();
    let installer = installer(
        Recording::failing("Description", STATUS_ACCESS_DENIED),
        Scripted::default(),
    );
    let request = InstallRequest::new(exe.path(), "Demo").description("Runs the demo");

    let outcome = installer.install(&request).unwrap();
    assert!(matches!(outcome.description, DescriptionOutcome::Failed(e) if e.is_access_denied()));

    let record = installer.read_record("Demo").unwrap().unwrap();
    assert_eq!(record.description, None);
    assert_eq!(installer.registry().inner.open_handles(), 0);
}

#[test]
fn uninstall_stops_a_running_service_first() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::with_state(ServiceState::Running));

    installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();
    installer.uninstall("Demo").unwrap();

    assert_eq!(installer.control().stop_requests.get(), 1);
    assert!(!service_key_exists(&installer, "Demo"));
}

#[test]
fn uninstall_proceeds_when_stop_times_out() {
    let exe = exe();
    let control = Scripted {
        stop_hangs: true,
        ..Scripted::with_state(ServiceState::Running)
    };
    let installer = installer(Recording::new(), control);

    installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();
    installer.uninstall("Demo").unwrap();

    assert_eq!(installer.control().stop_requests.get(), 1);
    assert!(!service_key_exists(&installer, "Demo"));
}

#[test]
fn uninstall_skips_stop_for_services_unknown_to_the_manager() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());

    installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();
    installer.uninstall("Demo").unwrap();

    assert_eq!(installer.control().stop_requests.get(), 0);
}

#[test]
fn uninstall_does_not_recurse_into_subkeys() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());
    installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();
    installer
        .registry()
        .inner
        .ensure_path(&format!(r"{SERVICES_ROOT}\Demo\Parameters"));

    let err = installer.uninstall("Demo").unwrap_err();
    assert!(matches!(
        err,
        InstallerError::Status { source, .. } if source.code() == STATUS_CANNOT_DELETE
    ));
    assert!(service_key_exists(&installer, "Demo"));
    assert_eq!(installer.registry().inner.open_handles(), 0);
}

#[test]
fn status_prefers_the_control_manager() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::with_state(ServiceState::Running));
    installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();

    match installer.status("Demo").unwrap() {
        StatusReport::Loaded(status) => {
            assert_eq!(status.service_name, "Demo");
            assert_eq!(status.current_state, ServiceState::Running);
            assert_eq!(status.service_type, ServiceType::OwnProcess);
            assert_eq!(status.display_name, "Demo Service");
            assert_eq!(status.start, StartMode::Auto);
        }
        other => panic!("unexpected report: {other:?}"),
    }
}

#[test]
fn status_falls_back_to_the_store() {
    let exe = exe();
    let installer = installer(Recording::new(), Scripted::default());

    assert_eq!(installer.status("Demo").unwrap(), StatusReport::Missing);

    installer.install(&InstallRequest::new(exe.path(), "Demo")).unwrap();
    match installer.status("Demo").unwrap() {
        StatusReport::RegistryOnly(record) => assert_eq!(record.name, "Demo"),
        other => panic!("unexpected report: {other:?}"),
    }
}

#[test]
fn start_and_stop_report_already_in_state() {
    let installer = installer(Recording::new(), Scripted::with_state(ServiceState::Stopped));

    assert_eq!(installer.stop("Demo").unwrap(), ControlOutcome::AlreadyInState);
    assert_eq!(installer.start("Demo").unwrap(), ControlOutcome::Changed);
    assert_eq!(installer.start("Demo").unwrap(), ControlOutcome::AlreadyInState);
    assert_eq!(installer.stop("Demo").unwrap(), ControlOutcome::Changed);
}

#[test]
fn stop_that_never_completes_times_out() {
    let control = Scripted {
        stop_hangs: true,
        ..Scripted::with_state(ServiceState::Running)
    };
    let installer = installer(Recording::new(), control);

    let err = installer.stop("Demo").unwrap_err();
    assert!(matches!(
        err,
        InstallerError::Timeout { state: ServiceState::Stopped, .. }
    ));
}

#[test]
fn start_of_unknown_service_fails() {
    let installer = installer(Recording::new(), Scripted::default());
    assert!(matches!(
        installer.start("Demo"),
        Err(InstallerError::ServiceUnknown { .. })
    ));
}

#[test]
fn invalid_names_are_rejected_everywhere() {
    let installer = installer(Recording::new(), Scripted::default());
    for result in [
        installer.uninstall(r"Demo\Parameters").map(|_| ()),
        installer.status("").map(|_| ()),
        installer.start("a/b").map(|_| ()),
    ] {
        assert!(matches!(result, Err(InstallerError::InvalidName { .. })));
    }
    assert!(installer.registry().calls().is_empty());
}
