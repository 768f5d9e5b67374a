//! Administrator check for operations against the live service store.

use crate::error::InstallerError;

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        use std::mem;

        use windows::Win32::Foundation::{CloseHandle, HANDLE};
        use windows::Win32::Security::{GetTokenInformation, TOKEN_ELEVATION, TOKEN_QUERY, TokenElevation};
        use windows::Win32::System::Threading::{GetCurrentProcess, OpenProcessToken};

        /// RAII wrapper for the process token
        struct TokenHandle(HANDLE);

        impl Drop for TokenHandle {
            fn drop(&mut self) {
                if !self.0.is_invalid() {
                    // SAFETY: the handle came from OpenProcessToken and is closed once.
                    unsafe {
                        let _ = CloseHandle(self.0);
                    }
                }
            }
        }

        /// Fails with [`InstallerError::PermissionDenied`] unless the process
        /// token is elevated.
        pub fn check_privileges() -> Result<(), InstallerError> {
            let mut raw = HANDLE::default();
            // SAFETY: the pseudo handle of the current process is always valid
            // and `raw` is a valid out pointer.
            unsafe { OpenProcessToken(GetCurrentProcess(), TOKEN_QUERY, &mut raw) }
                .map_err(|_| InstallerError::PermissionDenied)?;
            let token = TokenHandle(raw);

            let mut elevation = TOKEN_ELEVATION::default();
            let mut return_length: u32 = 0;
            // SAFETY: `elevation` is writable for the length passed.
            unsafe {
                GetTokenInformation(
                    token.0,
                    TokenElevation,
                    Some(&mut elevation as *mut _ as *mut std::ffi::c_void),
                    mem::size_of::<TOKEN_ELEVATION>() as u32,
                    &mut return_length,
                )
            }
            .map_err(|_| InstallerError::PermissionDenied)?;

            if elevation.TokenIsElevated == 0 {
                return Err(InstallerError::PermissionDenied);
            }
            Ok(())
        }
    } else {
        /// The live service store only exists on Windows.
        pub fn check_privileges() -> Result<(), InstallerError> {
            Err(InstallerError::Unsupported(
                "the service store is only available on Windows (use --dry-run)".to_string(),
            ))
        }
    }
}
