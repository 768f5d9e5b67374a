//! The real store: registry calls exported by ntdll.dll.

use std::mem;
use std::ptr;

use ntapi::ntobapi::NtClose;
use ntapi::ntregapi::{
    KeyValuePartialInformation, NtCreateKey, NtDeleteKey, NtOpenKey, NtQueryValueKey,
    NtSetValueKey,
};
use winapi::shared::ntdef::{HANDLE, OBJECT_ATTRIBUTES, UNICODE_STRING};
use winapi::um::winnt::REG_OPTION_NON_VOLATILE;

use super::object_attributes::{ObjectAttributes, RawObjectAttributes};
use super::status::{STATUS_BUFFER_OVERFLOW, STATUS_BUFFER_TOO_SMALL, NtStatus, StatusError};
use super::unicode::{UnicodeString, WideString};
use super::{Disposition, KeyAccess, NtRegistry, RawKey, ValueType};

// Our descriptors are handed to ntdll by pointer cast.
const _: () = assert!(mem::size_of::<RawObjectAttributes>() == mem::size_of::<OBJECT_ATTRIBUTES>());
const _: () = assert!(mem::size_of::<UnicodeString>() == mem::size_of::<UNICODE_STRING>());

// KEY_VALUE_PARTIAL_INFORMATION: TitleIndex, Type, DataLength, then Data.
const PARTIAL_INFORMATION_HEADER: usize = 3 * mem::size_of::<u32>();
const INITIAL_QUERY_BUFFER: usize = 256;

/// Registry calls straight into ntdll, bypassing advapi32.
#[derive(Debug, Default, Clone, Copy)]
pub struct NtDll;

fn check(status: i32) -> Result<(), StatusError> {
    NtStatus::from(status).ok()
}

fn object_attributes(attributes: &ObjectAttributes<'_>) -> *mut OBJECT_ATTRIBUTES {
    (attributes.as_raw() as *const RawObjectAttributes)
        .cast_mut()
        .cast()
}

fn unicode_string(name: &WideString) -> *mut UNICODE_STRING {
    (name.as_raw() as *const UnicodeString).cast_mut().cast()
}

impl NtRegistry for NtDll {
    fn open_key(
        &self,
        access: KeyAccess,
        attributes: &ObjectAttributes<'_>,
    ) -> Result<RawKey, StatusError> {
        let mut handle: HANDLE = ptr::null_mut();
        // SAFETY: `attributes` and the name it references are alive for the
        // call; `handle` is a valid out pointer.
        check(unsafe { NtOpenKey(&mut handle, access.bits(), object_attributes(attributes)) })?;
        Ok(RawKey::from_raw(handle.cast()))
    }

    fn create_key(
        &self,
        access: KeyAccess,
        attributes: &ObjectAttributes<'_>,
    ) -> Result<(RawKey, Disposition), StatusError> {
        let mut handle: HANDLE = ptr::null_mut();
        let mut disposition: u32 = 0;
        // SAFETY: as for `open_key`; class is null and disposition is a valid
        // out pointer.
        check(unsafe {
            NtCreateKey(
                &mut handle,
                access.bits(),
                object_attributes(attributes),
                0,
                ptr::null_mut(),
                REG_OPTION_NON_VOLATILE,
                &mut disposition,
            )
        })?;

        let key = RawKey::from_raw(handle.cast());
        let disposition = Disposition::from_raw(disposition).unwrap_or(Disposition::Opened);
        Ok((key, disposition))
    }

    fn set_value(
        &self,
        key: RawKey,
        name: &WideString,
        value_type: ValueType,
        data: &[u8],
    ) -> Result<(), StatusError> {
        // SAFETY: `key` is an open handle owned by a KeyHandle; `name` and
        // `data` outlive the call, which only reads `data`.
        check(unsafe {
            NtSetValueKey(
                key.as_raw().cast(),
                unicode_string(name),
                0,
                value_type.code(),
                data.as_ptr().cast_mut().cast(),
                data.len() as u32,
            )
        })
    }

    fn query_value(
        &self,
        key: RawKey,
        name: &WideString,
    ) -> Result<(ValueType, Vec<u8>), StatusError> {
        // u32 storage keeps the information block aligned.
        let mut buffer = vec![0u32; INITIAL_QUERY_BUFFER / 4];
        loop {
            let mut needed: u32 = 0;
            let length = (buffer.len() * 4) as u32;
            // SAFETY: `buffer` is writable for `length` bytes; `needed` is a
            // valid out pointer.
            let status = NtStatus::from(unsafe {
                NtQueryValueKey(
                    key.as_raw().cast(),
                    unicode_string(name),
                    KeyValuePartialInformation,
                    buffer.as_mut_ptr().cast(),
                    length,
                    &mut needed,
                )
            });

            match status.code() {
                STATUS_BUFFER_OVERFLOW | STATUS_BUFFER_TOO_SMALL if needed > length => {
                    buffer.resize((needed as usize).div_ceil(4), 0);
                }
                _ => {
                    status.ok()?;
                    break;
                }
            }
        }

        let bytes: Vec<u8> = buffer.iter().flat_map(|word| word.to_ne_bytes()).collect();
        let value_type = u32::from_ne_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let data_length = u32::from_ne_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;
        let end = (PARTIAL_INFORMATION_HEADER + data_length).min(bytes.len());
        let data = bytes[PARTIAL_INFORMATION_HEADER..end].to_vec();
        Ok((ValueType::from_code(value_type), data))
    }

    fn delete_key(&self, key: RawKey) -> Result<(), StatusError> {
        // SAFETY: `key` is an open handle owned by a KeyHandle.
        check(unsafe { NtDeleteKey(key.as_raw().cast()) })
    }

    fn close(&self, key: RawKey) -> Result<(), StatusError> {
        // SAFETY: KeyHandle closes each handle at most once.
        check(unsafe { NtClose(key.as_raw().cast()) })
    }
}
