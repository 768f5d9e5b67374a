//! Native registry layer.
//!
//! Everything here speaks the ntdll vocabulary: counted UTF-16 names,
//! `OBJECT_ATTRIBUTES`, access masks and NTSTATUS codes. The [`NtRegistry`]
//! trait is the seam between the key/value logic and the store that actually
//! executes the calls: [`NtDll`] on Windows, [`MemoryRegistry`] everywhere.

use std::ffi::c_void;
use std::fmt;
use std::ptr;

use bitflags::bitflags;

mod handles;
mod memory;
mod object_attributes;
mod status;
mod unicode;
mod value;

#[cfg(target_os = "windows")]
mod ntdll;

pub use handles::KeyHandle;
pub use memory::MemoryRegistry;
pub use object_attributes::{CaseSensitivity, OBJ_CASE_INSENSITIVE, ObjectAttributes, RawObjectAttributes};
pub use status::*;
pub use unicode::{MAX_WIDE_CHARS, UnicodeString, WideString};
pub use value::{RegistryValue, decode_string, encode_dword, encode_string, read_value, write_dword, write_string};

#[cfg(target_os = "windows")]
pub use ntdll::NtDll;

/// A raw key handle as returned by the store. Ownership lives in [`KeyHandle`].
#[repr(transparent)]
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawKey(*mut c_void);

impl RawKey {
    pub const NULL: Self = Self(ptr::null_mut());

    #[inline]
    pub const fn from_raw(handle: *mut c_void) -> Self {
        Self(handle)
    }

    #[inline]
    pub fn as_raw(self) -> *mut c_void {
        self.0
    }

    #[inline]
    pub fn is_null(self) -> bool {
        self.0.is_null()
    }
}

impl fmt::Debug for RawKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RawKey({:#x})", self.0 as usize)
    }
}

bitflags! {
    /// Registry key access mask (`KEY_*` plus the standard rights keys use).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct KeyAccess: u32 {
        const QUERY_VALUE = 0x0000_0001;
        const SET_VALUE = 0x0000_0002;
        const CREATE_SUB_KEY = 0x0000_0004;
        const ENUMERATE_SUB_KEYS = 0x0000_0008;
        const NOTIFY = 0x0000_0010;
        const CREATE_LINK = 0x0000_0020;
        const DELETE = 0x0001_0000;
        const READ_CONTROL = 0x0002_0000;
        const WRITE_DAC = 0x0004_0000;
        const WRITE_OWNER = 0x0008_0000;

        const READ = 0x0002_0019;
        const WRITE = 0x0002_0006;
        const ALL_ACCESS = 0x000F_003F;
    }
}

/// Outcome reported by `NtCreateKey`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Created,
    Opened,
}

impl Disposition {
    pub const REG_CREATED_NEW_KEY: u32 = 0x0000_0001;
    pub const REG_OPENED_EXISTING_KEY: u32 = 0x0000_0002;

    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            Self::REG_CREATED_NEW_KEY => Some(Self::Created),
            Self::REG_OPENED_EXISTING_KEY => Some(Self::Opened),
            _ => None,
        }
    }

    pub fn as_raw(self) -> u32 {
        match self {
            Self::Created => Self::REG_CREATED_NEW_KEY,
            Self::Opened => Self::REG_OPENED_EXISTING_KEY,
        }
    }
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created => f.write_str("created"),
            Self::Opened => f.write_str("opened existing"),
        }
    }
}

/// Registry value type tag (`REG_*`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    None,
    String,
    ExpandString,
    Binary,
    Dword,
    DwordBigEndian,
    Link,
    MultiString,
    Qword,
    Other(u32),
}

impl ValueType {
    pub fn from_code(code: u32) -> Self {
        match code {
            0 => Self::None,
            1 => Self::String,
            2 => Self::ExpandString,
            3 => Self::Binary,
            4 => Self::Dword,
            5 => Self::DwordBigEndian,
            6 => Self::Link,
            7 => Self::MultiString,
            11 => Self::Qword,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Self::None => 0,
            Self::String => 1,
            Self::ExpandString => 2,
            Self::Binary => 3,
            Self::Dword => 4,
            Self::DwordBigEndian => 5,
            Self::Link => 6,
            Self::MultiString => 7,
            Self::Qword => 11,
            Self::Other(code) => code,
        }
    }
}

/// The six native key calls this crate issues.
///
/// Implementations return the raw status of the underlying call; they never
/// retry. Handles returned by `open_key`/`create_key` must be passed to
/// `close` exactly once, which [`KeyHandle`] takes care of.
pub trait NtRegistry {
    /// `NtOpenKey`.
    fn open_key(
        &self,
        access: KeyAccess,
        attributes: &ObjectAttributes<'_>,
    ) -> Result<RawKey, StatusError>;

    /// `NtCreateKey` with a non-volatile key and no class.
    fn create_key(
        &self,
        access: KeyAccess,
        attributes: &ObjectAttributes<'_>,
    ) -> Result<(RawKey, Disposition), StatusError>;

    /// `NtSetValueKey`.
    fn set_value(
        &self,
        key: RawKey,
        name: &WideString,
        value_type: ValueType,
        data: &[u8],
    ) -> Result<(), StatusError>;

    /// `NtQueryValueKey` with `KeyValuePartialInformation`.
    fn query_value(&self, key: RawKey, name: &WideString)
    -> Result<(ValueType, Vec<u8>), StatusError>;

    /// `NtDeleteKey`. The handle stays open and still has to be closed.
    fn delete_key(&self, key: RawKey) -> Result<(), StatusError>;

    /// `NtClose`.
    fn close(&self, key: RawKey) -> Result<(), StatusError>;
}

impl<R: NtRegistry + ?Sized> NtRegistry for &R {
    fn open_key(
        &self,
        access: KeyAccess,
        attributes: &ObjectAttributes<'_>,
    ) -> Result<RawKey, StatusError> {
        (**self).open_key(access, attributes)
    }

    fn create_key(
        &self,
        access: KeyAccess,
        attributes: &ObjectAttributes<'_>,
    ) -> Result<(RawKey, Disposition), StatusError> {
        (**self).create_key(access, attributes)
    }

    fn set_value(
        &self,
        key: RawKey,
        name: &WideString,
        value_type: ValueType,
        data: &[u8],
    ) -> Result<(), StatusError> {
        (**self).set_value(key, name, value_type, data)
    }

    fn query_value(
        &self,
        key: RawKey,
        name: &WideString,
    ) -> Result<(ValueType, Vec<u8>), StatusError> {
        (**self).query_value(key, name)
    }

    fn delete_key(&self, key: RawKey) -> Result<(), StatusError> {
        (**self).delete_key(key)
    }

    fn close(&self, key: RawKey) -> Result<(), StatusError> {
        (**self).close(key)
    }
}
