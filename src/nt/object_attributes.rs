//! `OBJECT_ATTRIBUTES` descriptors naming a key for `NtOpenKey`/`NtCreateKey`.

use std::ffi::c_void;
use std::mem;
use std::ptr;

use super::RawKey;
use super::unicode::{UnicodeString, WideString};

pub const OBJ_CASE_INSENSITIVE: u32 = 0x0000_0040;

/// How the object manager compares the name against existing keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CaseSensitivity {
    #[default]
    Insensitive,
    Sensitive,
}

impl CaseSensitivity {
    fn attribute_bits(self) -> u32 {
        match self {
            Self::Insensitive => OBJ_CASE_INSENSITIVE,
            Self::Sensitive => 0,
        }
    }
}

/// Native `OBJECT_ATTRIBUTES` layout.
#[repr(C)]
#[derive(Debug)]
pub struct RawObjectAttributes {
    pub length: u32,
    pub root_directory: *mut c_void,
    pub object_name: *const UnicodeString,
    pub attributes: u32,
    pub security_descriptor: *mut c_void,
    pub security_quality_of_service: *mut c_void,
}

/// A descriptor borrowing its name for `'a`.
///
/// The borrow keeps the [`WideString`] alive and unmoved for as long as the
/// descriptor exists, so the embedded name pointer is valid for every native
/// call that receives it. Security fields are always null: new keys inherit
/// the default security of the calling process.
#[derive(Debug)]
pub struct ObjectAttributes<'a> {
    raw: RawObjectAttributes,
    name: &'a WideString,
}

impl<'a> ObjectAttributes<'a> {
    pub fn new(name: &'a WideString, root: Option<RawKey>, case: CaseSensitivity) -> Self {
        let raw = RawObjectAttributes {
            length: mem::size_of::<RawObjectAttributes>() as u32,
            root_directory: root.map_or(ptr::null_mut(), RawKey::as_raw),
            object_name: name.as_raw(),
            attributes: case.attribute_bits(),
            security_descriptor: ptr::null_mut(),
            security_quality_of_service: ptr::null_mut(),
        };
        Self { raw, name }
    }

    /// Absolute path, case-insensitive.
    pub fn absolute(name: &'a WideString) -> Self {
        Self::new(name, None, CaseSensitivity::Insensitive)
    }

    /// Path relative to an open key, case-insensitive.
    pub fn relative(name: &'a WideString, root: RawKey) -> Self {
        Self::new(name, Some(root), CaseSensitivity::Insensitive)
    }

    /// The structure passed by pointer to ntdll.
    #[inline]
    pub fn as_raw(&self) -> &RawObjectAttributes {
        &self.raw
    }

    #[inline]
    pub fn name(&self) -> &'a WideString {
        self.name
    }

    pub fn root(&self) -> Option<RawKey> {
        let root = RawKey::from_raw(self.raw.root_directory);
        (!root.is_null()).then_some(root)
    }

    pub fn case_sensitivity(&self) -> CaseSensitivity {
        if self.raw.attributes & OBJ_CASE_INSENSITIVE != 0 {
            CaseSensitivity::Insensitive
        } else {
            CaseSensitivity::Sensitive
        }
    }
}
