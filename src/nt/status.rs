//! NTSTATUS handling for the native registry calls.
//!
//! Raw status codes are folded into a closed [`NtStatus`] set so callers can
//! branch on meaning. The raw code always survives the conversion and is what
//! diagnostics print.

use std::fmt;

use thiserror::Error;

pub const STATUS_SUCCESS: u32 = 0x0000_0000;
pub const STATUS_BUFFER_OVERFLOW: u32 = 0x8000_0005;
pub const STATUS_INVALID_HANDLE: u32 = 0xC000_0008;
pub const STATUS_INVALID_PARAMETER: u32 = 0xC000_000D;
pub const STATUS_ACCESS_DENIED: u32 = 0xC000_0022;
pub const STATUS_BUFFER_TOO_SMALL: u32 = 0xC000_0023;
pub const STATUS_OBJECT_NAME_INVALID: u32 = 0xC000_0033;
pub const STATUS_OBJECT_NAME_NOT_FOUND: u32 = 0xC000_0034;
pub const STATUS_OBJECT_PATH_NOT_FOUND: u32 = 0xC000_003A;
pub const STATUS_OBJECT_PATH_SYNTAX_BAD: u32 = 0xC000_003B;
pub const STATUS_NAME_TOO_LONG: u32 = 0xC000_0106;
pub const STATUS_CANNOT_DELETE: u32 = 0xC000_0121;
pub const STATUS_KEY_DELETED: u32 = 0xC000_017C;

/// Meaningful view over a native status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NtStatus {
    Success,
    NotFound,
    AccessDenied,
    Other(u32),
}

impl NtStatus {
    pub fn from_code(code: u32) -> Self {
        match code {
            STATUS_SUCCESS => Self::Success,
            STATUS_OBJECT_NAME_NOT_FOUND => Self::NotFound,
            STATUS_ACCESS_DENIED => Self::AccessDenied,
            other => Self::Other(other),
        }
    }

    /// The verbatim native code.
    pub fn code(self) -> u32 {
        match self {
            Self::Success => STATUS_SUCCESS,
            Self::NotFound => STATUS_OBJECT_NAME_NOT_FOUND,
            Self::AccessDenied => STATUS_ACCESS_DENIED,
            Self::Other(code) => code,
        }
    }

    #[inline]
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Turn the status into a `Result`, keeping the failure code.
    #[inline]
    pub fn ok(self) -> Result<(), StatusError> {
        if self.is_success() {
            Ok(())
        } else {
            Err(StatusError(self))
        }
    }

    fn symbol(self) -> Option<&'static str> {
        let name = match self.code() {
            STATUS_SUCCESS => "STATUS_SUCCESS",
            STATUS_BUFFER_OVERFLOW => "STATUS_BUFFER_OVERFLOW",
            STATUS_INVALID_HANDLE => "STATUS_INVALID_HANDLE",
            STATUS_INVALID_PARAMETER => "STATUS_INVALID_PARAMETER",
            STATUS_ACCESS_DENIED => "STATUS_ACCESS_DENIED",
            STATUS_BUFFER_TOO_SMALL => "STATUS_BUFFER_TOO_SMALL",
            STATUS_OBJECT_NAME_INVALID => "STATUS_OBJECT_NAME_INVALID",
            STATUS_OBJECT_NAME_NOT_FOUND => "STATUS_OBJECT_NAME_NOT_FOUND",
            STATUS_OBJECT_PATH_NOT_FOUND => "STATUS_OBJECT_PATH_NOT_FOUND",
            STATUS_OBJECT_PATH_SYNTAX_BAD => "STATUS_OBJECT_PATH_SYNTAX_BAD",
            STATUS_NAME_TOO_LONG => "STATUS_NAME_TOO_LONG",
            STATUS_CANNOT_DELETE => "STATUS_CANNOT_DELETE",
            STATUS_KEY_DELETED => "STATUS_KEY_DELETED",
            _ => return None,
        };
        Some(name)
    }
}

impl From<u32> for NtStatus {
    #[inline]
    fn from(code: u32) -> Self {
        Self::from_code(code)
    }
}

// NTSTATUS is declared as a signed LONG by the native headers.
impl From<i32> for NtStatus {
    #[inline]
    fn from(code: i32) -> Self {
        Self::from_code(code as u32)
    }
}

impl fmt::Display for NtStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.symbol() {
            Some(name) => write!(f, "{name} (0x{:08X})", self.code()),
            None => write!(f, "0x{:08X}", self.code()),
        }
    }
}

/// A native call returned something other than `STATUS_SUCCESS`.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq, Hash)]
#[error("native status {0}")]
pub struct StatusError(pub NtStatus);

impl StatusError {
    pub fn from_code(code: u32) -> Self {
        Self(NtStatus::from_code(code))
    }

    #[inline]
    pub fn status(&self) -> NtStatus {
        self.0
    }

    #[inline]
    pub fn code(&self) -> u32 {
        self.0.code()
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        self.0 == NtStatus::NotFound
    }

    #[inline]
    pub fn is_access_denied(&self) -> bool {
        self.0 == NtStatus::AccessDenied
    }
}

impl From<NtStatus> for StatusError {
    fn from(status: NtStatus) -> Self {
        Self(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_codes_map_to_variants() {
        assert_eq!(NtStatus::from_code(0), NtStatus::Success);
        assert_eq!(NtStatus::from_code(0xC000_0034), NtStatus::NotFound);
        assert_eq!(NtStatus::from_code(0xC000_0022), NtStatus::AccessDenied);
        assert_eq!(
            NtStatus::from_code(STATUS_CANNOT_DELETE),
            NtStatus::Other(STATUS_CANNOT_DELETE)
        );
    }

    #[test]
    fn code_is_preserved_verbatim() {
        for code in [0u32, 0xC000_0034, 0xC000_0022, 0xC000_0121, 0x1234_5678] {
            assert_eq!(NtStatus::from_code(code).code(), code);
        }
        // Signed form as returned by the native headers.
        assert_eq!(NtStatus::from(0xC000_0034u32 as i32), NtStatus::NotFound);
    }

    #[test]
    fn ok_only_for_success() {
        assert!(NtStatus::Success.ok().is_ok());
        let err = NtStatus::NotFound.ok().unwrap_err();
        assert!(err.is_not_found());
        assert!(!err.is_access_denied());
    }

    #[test]
    fn display_includes_raw_code() {
        assert_eq!(
            NtStatus::NotFound.to_string(),
            "STATUS_OBJECT_NAME_NOT_FOUND (0xC0000034)"
        );
        assert_eq!(NtStatus::Other(0xDEAD_BEEF).to_string(), "0xDEADBEEF");
        assert_eq!(
            StatusError::from_code(0xC000_0022).to_string(),
            "native status STATUS_ACCESS_DENIED (0xC0000022)"
        );
    }
}
