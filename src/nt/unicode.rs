//! Counted UTF-16 strings in the layout ntdll expects.
//!
//! [`WideString`] owns a heap buffer that the native call reads through a raw
//! pointer. The buffer is handed out with `Box::into_raw`, so its address stays
//! fixed however the owning value moves, and it is freed exactly once by
//! [`WideString::release`] or by `Drop`.

use std::fmt;
use std::ptr::{self, NonNull};
use std::slice;

use super::status::{STATUS_NAME_TOO_LONG, StatusError};

/// Longest string (in UTF-16 code units) whose byte length plus terminator
/// still fits the 16-bit `MaximumLength` field.
pub const MAX_WIDE_CHARS: usize = (u16::MAX as usize - 2) / 2;

/// `UNICODE_STRING`: lengths are in bytes, `length` excludes the terminator.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UnicodeString {
    pub length: u16,
    pub maximum_length: u16,
    pub buffer: *mut u16,
}

impl UnicodeString {
    pub const fn empty() -> Self {
        Self {
            length: 0,
            maximum_length: 0,
            buffer: ptr::null_mut(),
        }
    }

    /// View the counted characters.
    ///
    /// # Safety
    ///
    /// `buffer` must be null or point to at least `length` readable bytes that
    /// stay alive for the returned lifetime.
    pub unsafe fn as_wide<'a>(&self) -> &'a [u16] {
        if self.buffer.is_null() || self.length == 0 {
            return &[];
        }
        // SAFETY: guaranteed by the caller.
        unsafe { slice::from_raw_parts(self.buffer, usize::from(self.length) / 2) }
    }
}

/// An owned, null-terminated UTF-16 buffer plus its `UNICODE_STRING` header.
pub struct WideString {
    raw: UnicodeString,
    allocation: Option<NonNull<[u16]>>,
}

impl WideString {
    /// Encode `text`. Empty text yields a zero-length string with a null buffer
    /// and performs no allocation.
    pub fn new(text: &str) -> Result<Self, StatusError> {
        if text.is_empty() {
            return Ok(Self::empty());
        }

        let mut units: Vec<u16> = text.encode_utf16().collect();
        if units.len() > MAX_WIDE_CHARS {
            return Err(StatusError::from_code(STATUS_NAME_TOO_LONG));
        }
        let length = units.len() * 2;
        // One extra code unit of headroom for the terminator.
        units.push(0);

        let allocation = NonNull::from(Box::leak(units.into_boxed_slice()));
        let raw = UnicodeString {
            length: length as u16,
            maximum_length: (length + 2) as u16,
            buffer: allocation.as_ptr() as *mut u16,
        };

        Ok(Self {
            raw,
            allocation: Some(allocation),
        })
    }

    pub const fn empty() -> Self {
        Self {
            raw: UnicodeString::empty(),
            allocation: None,
        }
    }

    /// The header passed by reference to native calls.
    #[inline]
    pub fn as_raw(&self) -> &UnicodeString {
        &self.raw
    }

    /// Encoded length in bytes, terminator excluded.
    #[inline]
    pub fn len_bytes(&self) -> u16 {
        self.raw.length
    }

    #[inline]
    pub fn max_len_bytes(&self) -> u16 {
        self.raw.maximum_length
    }

    #[inline]
    pub fn is_null(&self) -> bool {
        self.raw.buffer.is_null()
    }

    pub fn as_wide(&self) -> &[u16] {
        // SAFETY: the buffer is either null or owned by `self` and holds
        // `length` bytes of characters.
        unsafe { self.raw.as_wide() }
    }

    pub fn to_string_lossy(&self) -> String {
        String::from_utf16_lossy(self.as_wide())
    }

    /// Free the buffer and null the header. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            // SAFETY: `allocation` came from `Box::leak` in `new` and `take`
            // guarantees it is reclaimed only once.
            drop(unsafe { Box::from_raw(allocation.as_ptr()) });
        }
        self.raw = UnicodeString::empty();
    }
}

impl Drop for WideString {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for WideString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WideString")
            .field("text", &self.to_string_lossy())
            .field("length", &self.raw.length)
            .field("maximum_length", &self.raw.maximum_length)
            .finish()
    }
}
