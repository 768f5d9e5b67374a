//! Typed registry values: encoding for `NtSetValueKey`, decoding for
//! `NtQueryValueKey`.

use log::debug;

use super::handles::KeyHandle;
use super::status::StatusError;
use super::unicode::WideString;
use super::{NtRegistry, ValueType};

/// A decoded value read back from a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryValue {
    Dword(u32),
    String(String),
    Other { value_type: ValueType, data: Vec<u8> },
}

impl RegistryValue {
    pub fn as_dword(&self) -> Option<u32> {
        match self {
            Self::Dword(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(text) => Some(text),
            _ => None,
        }
    }
}

/// `REG_DWORD` payload: four bytes, little-endian as on every Windows target.
#[inline]
pub fn encode_dword(value: u32) -> [u8; 4] {
    value.to_le_bytes()
}

/// `REG_SZ` payload: UTF-16LE followed by one null code unit.
pub fn encode_string(text: &str) -> Vec<u8> {
    text.encode_utf16()
        .chain(Some(0))
        .flat_map(u16::to_le_bytes)
        .collect()
}

/// Decode a `REG_SZ` payload, stopping at the first null code unit.
pub fn decode_string(bytes: &[u8]) -> String {
    let wide: Vec<u16> = bytes
        .chunks_exact(2)
        .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    let end = wide.iter().position(|&c| c == 0).unwrap_or(wide.len());
    String::from_utf16_lossy(&wide[..end])
}

/// Write a 32-bit value under `value_name`.
pub fn write_dword<R: NtRegistry + ?Sized>(
    key: &KeyHandle<'_, R>,
    value_name: &str,
    value: u32,
) -> Result<(), StatusError> {
    write_raw(key, value_name, ValueType::Dword, &encode_dword(value))?;
    debug!("{value_name} = {value:#x}");
    Ok(())
}

/// Write a null-terminated string under `value_name`.
pub fn write_string<R: NtRegistry + ?Sized>(
    key: &KeyHandle<'_, R>,
    value_name: &str,
    text: &str,
) -> Result<(), StatusError> {
    write_raw(key, value_name, ValueType::String, &encode_string(text))?;
    debug!("{value_name} = {text:?}");
    Ok(())
}

fn write_raw<R: NtRegistry + ?Sized>(
    key: &KeyHandle<'_, R>,
    value_name: &str,
    value_type: ValueType,
    data: &[u8],
) -> Result<(), StatusError> {
    let name = WideString::new(value_name)?;
    key.registry()
        .set_value(key.raw(), &name, value_type, data)
        .inspect_err(|e| debug!("NtSetValueKey({value_name}) failed: {e}"))
}

/// Read and decode the value stored under `value_name`.
pub fn read_value<R: NtRegistry + ?Sized>(
    key: &KeyHandle<'_, R>,
    value_name: &str,
) -> Result<RegistryValue, StatusError> {
    let name = WideString::new(value_name)?;
    let (value_type, data) = key.registry().query_value(key.raw(), &name)?;

    let value = match value_type {
        ValueType::Dword if data.len() == 4 => {
            RegistryValue::Dword(u32::from_le_bytes([data[0], data[1], data[2], data[3]]))
        }
        ValueType::String | ValueType::ExpandString => RegistryValue::String(decode_string(&data)),
        value_type => RegistryValue::Other { value_type, data },
    };
    Ok(value)
}
