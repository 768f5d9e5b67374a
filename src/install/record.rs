//! The persisted service record: one key under the services root holding the
//! values the service control manager reads at boot.

use std::fmt;
use std::path::{self, Path};

use crate::error::InstallerError;
use crate::nt::{KeyHandle, MAX_WIDE_CHARS, NtRegistry, RegistryValue, StatusError, read_value};

use super::InstallRequest;

/// Native path of the service database.
pub const SERVICES_ROOT: &str = r"\Registry\Machine\SYSTEM\CurrentControlSet\Services";

/// Account the service runs under.
pub const LOCAL_SYSTEM: &str = "LocalSystem";

/// Value names inside a service key.
pub mod field {
    pub const TYPE: &str = "Type";
    pub const START: &str = "Start";
    pub const ERROR_CONTROL: &str = "ErrorControl";
    pub const IMAGE_PATH: &str = "ImagePath";
    pub const DISPLAY_NAME: &str = "DisplayName";
    pub const OBJECT_NAME: &str = "ObjectName";
    pub const DESCRIPTION: &str = "Description";
}

/// `Type` value (`SERVICE_*` type bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceType {
    KernelDriver,
    FileSystemDriver,
    OwnProcess,
    ShareProcess,
    Other(u32),
}

impl ServiceType {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0x01 => Self::KernelDriver,
            0x02 => Self::FileSystemDriver,
            0x10 => Self::OwnProcess,
            0x20 => Self::ShareProcess,
            other => Self::Other(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::KernelDriver => 0x01,
            Self::FileSystemDriver => 0x02,
            Self::OwnProcess => 0x10,
            Self::ShareProcess => 0x20,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ServiceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::KernelDriver => f.write_str("kernel driver"),
            Self::FileSystemDriver => f.write_str("file system driver"),
            Self::OwnProcess => f.write_str("own process"),
            Self::ShareProcess => f.write_str("shared process"),
            Self::Other(raw) => write!(f, "{raw:#x}"),
        }
    }
}

/// `Start` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartMode {
    Boot,
    System,
    Auto,
    Demand,
    Disabled,
    Other(u32),
}

impl StartMode {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Boot,
            1 => Self::System,
            2 => Self::Auto,
            3 => Self::Demand,
            4 => Self::Disabled,
            other => Self::Other(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::Boot => 0,
            Self::System => 1,
            Self::Auto => 2,
            Self::Demand => 3,
            Self::Disabled => 4,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for StartMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Boot => f.write_str("boot"),
            Self::System => f.write_str("system"),
            Self::Auto => f.write_str("automatic"),
            Self::Demand => f.write_str("manual"),
            Self::Disabled => f.write_str("disabled"),
            Self::Other(raw) => write!(f, "{raw:#x}"),
        }
    }
}

/// `ErrorControl` value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorControl {
    Ignore,
    Normal,
    Severe,
    Critical,
    Other(u32),
}

impl ErrorControl {
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            0 => Self::Ignore,
            1 => Self::Normal,
            2 => Self::Severe,
            3 => Self::Critical,
            other => Self::Other(other),
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::Ignore => 0,
            Self::Normal => 1,
            Self::Severe => 2,
            Self::Critical => 3,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for ErrorControl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => f.write_str("ignore"),
            Self::Normal => f.write_str("normal"),
            Self::Severe => f.write_str("severe"),
            Self::Critical => f.write_str("critical"),
            Self::Other(raw) => write!(f, "{raw:#x}"),
        }
    }
}

/// Every field of a service key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceRecord {
    pub name: String,
    pub service_type: ServiceType,
    pub start: StartMode,
    pub error_control: ErrorControl,
    pub image_path: String,
    pub display_name: String,
    pub object_name: String,
    pub description: Option<String>,
}

impl ServiceRecord {
    /// The record an install request materializes, with `image_path` from
    /// [`image_path`]. Type, start mode, error control and account are fixed;
    /// the display name falls back to the service name and an empty
    /// description is dropped.
    pub fn for_install(request: &InstallRequest, image_path: String) -> Self {
        let display_name = request
            .display_name
            .clone()
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| request.service_name.clone());

        Self {
            name: request.service_name.clone(),
            service_type: ServiceType::OwnProcess,
            start: StartMode::Auto,
            error_control: ErrorControl::Normal,
            image_path,
            display_name,
            object_name: LOCAL_SYSTEM.to_string(),
            description: request.description.clone().filter(|text| !text.is_empty()),
        }
    }

    /// Read the record stored in an open service key.
    pub fn load<R: NtRegistry + ?Sized>(
        key: &KeyHandle<'_, R>,
        name: &str,
    ) -> Result<Self, InstallerError> {
        let dword = |field: &'static str| -> Result<u32, InstallerError> {
            match optional(read_value(key, field), name)? {
                Some(RegistryValue::Dword(value)) => Ok(value),
                _ => Err(InstallerError::IncompleteRecord {
                    name: name.to_string(),
                    field,
                }),
            }
        };
        let text = |field: &'static str| -> Result<String, InstallerError> {
            match optional(read_value(key, field), name)? {
                Some(RegistryValue::String(value)) => Ok(value),
                _ => Err(InstallerError::IncompleteRecord {
                    name: name.to_string(),
                    field,
                }),
            }
        };

        let description = match optional(read_value(key, field::DESCRIPTION), name)? {
            Some(RegistryValue::String(value)) if !value.is_empty() => Some(value),
            _ => None,
        };

        Ok(Self {
            name: name.to_string(),
            service_type: ServiceType::from_raw(dword(field::TYPE)?),
            start: StartMode::from_raw(dword(field::START)?),
            error_control: ErrorControl::from_raw(dword(field::ERROR_CONTROL)?),
            image_path: text(field::IMAGE_PATH)?,
            display_name: text(field::DISPLAY_NAME)?,
            object_name: text(field::OBJECT_NAME)?,
            description,
        })
    }
}

fn optional(
    result: Result<RegistryValue, StatusError>,
    name: &str,
) -> Result<Option<RegistryValue>, InstallerError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(e) if e.is_not_found() => Ok(None),
        Err(source) => {
            log::debug!("reading record of {name} failed: {source}");
            Err(InstallerError::Status {
                context: "read service record",
                source,
            })
        }
    }
}

/// Resolve the executable to the absolute path stored as `ImagePath`. The
/// file must exist and its path must survive the UTF-16 round trip intact.
pub fn image_path(exe_path: &Path) -> Result<String, InstallerError> {
    let invalid = |reason: &'static str| InstallerError::Validation {
        path: exe_path.to_path_buf(),
        reason,
    };

    if !exe_path.is_file() {
        return Err(invalid("file not found"));
    }
    let absolute = path::absolute(exe_path).map_err(|_| invalid("cannot resolve an absolute path"))?;
    absolute
        .into_os_string()
        .into_string()
        .map_err(|_| invalid("path is not valid Unicode"))
}

/// Service names address exactly one subkey of the services root and must
/// survive the null-terminated form the control manager uses.
pub fn validate_service_name(name: &str) -> Result<(), InstallerError> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.contains(['\\', '/']) {
        "name must not contain path separators"
    } else if name.contains('\0') {
        "name must not contain NUL characters"
    } else if name.encode_utf16().count() > MAX_WIDE_CHARS {
        "name is too long"
    } else {
        return Ok(());
    };
    Err(InstallerError::InvalidName {
        name: name.to_string(),
        reason,
    })
}
