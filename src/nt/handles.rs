//! RAII ownership of registry key handles.
//!
//! A child key borrows the handle it was opened from, so the compiler rejects
//! any code that would close a parent before its children; drop order then
//! releases child keys first on every exit path.

use log::{debug, warn};

use super::object_attributes::ObjectAttributes;
use super::status::StatusError;
use super::unicode::WideString;
use super::{Disposition, KeyAccess, NtRegistry, RawKey};

/// An open key, closed exactly once when dropped or explicitly closed.
pub struct KeyHandle<'r, R: NtRegistry + ?Sized> {
    registry: &'r R,
    raw: RawKey,
}

impl<'r, R: NtRegistry + ?Sized> KeyHandle<'r, R> {
    /// Open a key by absolute native path, e.g. the services root.
    pub fn open_root(registry: &'r R, path: &str, access: KeyAccess) -> Result<Self, StatusError> {
        let name = WideString::new(path)?;
        let attributes = ObjectAttributes::absolute(&name);
        let raw = registry.open_key(access, &attributes).inspect_err(|e| {
            debug!("NtOpenKey({path}, {:#x}) failed: {e}", access.bits());
        })?;
        debug!("opened {path} as {raw:?}");
        Ok(Self { registry, raw })
    }

    /// Open an existing subkey of this key.
    pub fn open_child(&self, name: &str, access: KeyAccess) -> Result<KeyHandle<'_, R>, StatusError> {
        let wide = WideString::new(name)?;
        let attributes = ObjectAttributes::relative(&wide, self.raw);
        let raw = self.registry.open_key(access, &attributes).inspect_err(|e| {
            debug!("NtOpenKey({name} under {:?}) failed: {e}", self.raw);
        })?;
        debug!("opened subkey {name} as {raw:?}");
        Ok(KeyHandle {
            registry: self.registry,
            raw,
        })
    }

    /// Create a subkey, or open it if it already exists.
    pub fn create_child(
        &self,
        name: &str,
        access: KeyAccess,
    ) -> Result<(KeyHandle<'_, R>, Disposition), StatusError> {
        let wide = WideString::new(name)?;
        let attributes = ObjectAttributes::relative(&wide, self.raw);
        let (raw, disposition) = self.registry.create_key(access, &attributes).inspect_err(|e| {
            debug!("NtCreateKey({name} under {:?}) failed: {e}", self.raw);
        })?;
        debug!("subkey {name} {disposition} as {raw:?}");
        let child = KeyHandle {
            registry: self.registry,
            raw,
        };
        Ok((child, disposition))
    }

    /// Mark the key for deletion. The handle stays owned and is still closed
    /// on drop, whatever the outcome.
    pub fn delete(&self) -> Result<(), StatusError> {
        self.registry.delete_key(self.raw)
    }

    /// Close now and report the status instead of logging it from `Drop`.
    pub fn close(mut self) -> Result<(), StatusError> {
        self.release()
    }

    #[inline]
    pub fn raw(&self) -> RawKey {
        self.raw
    }

    #[inline]
    pub fn registry(&self) -> &'r R {
        self.registry
    }

    fn release(&mut self) -> Result<(), StatusError> {
        if self.raw.is_null() {
            return Ok(());
        }
        let raw = std::mem::replace(&mut self.raw, RawKey::NULL);
        self.registry.close(raw)
    }
}

impl<R: NtRegistry + ?Sized> Drop for KeyHandle<'_, R> {
    fn drop(&mut self) {
        let raw = self.raw;
        if let Err(e) = self.release() {
            warn!("NtClose({raw:?}) failed: {e}");
        }
    }
}

impl<R: NtRegistry + ?Sized> std::fmt::Debug for KeyHandle<'_, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("KeyHandle").field(&self.raw).finish()
    }
}
