//! Page protection through the operating system (unprivileged context).
//!
//! Every `make_writable` is paired with a `restore` that reinstates the
//! protection reported by (or, on unix, assumed for) the range beforehand.

use crate::{PageProtection, PatchError};
use log::{trace, warn};

/// Page protection via `mprotect` (unix) or `VirtualProtect` (Windows).
///
/// [`make_executable`](PageProtection::make_executable) works on whole pages
/// and is never reverted. A heap trampoline therefore turns every allocation
/// sharing its pages read-write-execute for the rest of the process.
#[derive(Debug, Default, Copy, Clone)]
pub struct UserPageProtection;

/// The protection in force before [`UserPageProtection::make_writable`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct UserToken {
    address: usize,
    length: usize,
    previous: os::Protection,
}

impl PageProtection for UserPageProtection {
    type Token = UserToken;

    fn make_writable(&self, address: usize, length: usize) -> Result<UserToken, PatchError> {
        let (address, length) = os::page_span(address, length);
        let previous = os::protect(address, length, os::READ_WRITE_EXECUTE)?;
        trace!("{address:#x}+{length:#x} made writable (previous protection {previous:#x})");
        Ok(UserToken {
            address,
            length,
            previous,
        })
    }

    fn was_writable(token: &UserToken) -> bool {
        os::is_writable(token.previous)
    }

    fn restore(&self, token: UserToken) {
        if let Err(e) = os::protect(token.address, token.length, token.previous) {
            warn!("failed to restore protection: {e}");
        }
    }

    /// Sets the covering pages to read-write-execute; they must stay writable
    /// for the allocator, and nothing restores their former protection.
    fn make_executable(&self, address: usize, length: usize) -> Result<(), PatchError> {
        let (address, length) = os::page_span(address, length);
        os::protect(address, length, os::READ_WRITE_EXECUTE).map(|_| ())
    }
}

#[cfg(unix)]
mod os {
    use crate::PatchError;
    use core::ffi::c_void;

    pub type Protection = libc::c_int;

    pub const READ_WRITE_EXECUTE: Protection = libc::PROT_READ | libc::PROT_WRITE | libc::PROT_EXEC;

    /// `mprotect` does not report the old protection; code pages are `r-x`.
    const ASSUMED_CODE_PROTECTION: Protection = libc::PROT_READ | libc::PROT_EXEC;

    pub const fn is_writable(protection: Protection) -> bool {
        protection & libc::PROT_WRITE != 0
    }

    /// Page-aligned span covering `[address, address + length)`.
    pub fn page_span(address: usize, length: usize) -> (usize, usize) {
        let page = page_size();
        let start = address & !(page - 1);
        let end = address.saturating_add(length).saturating_add(page - 1) & !(page - 1);
        (start, (end - start).max(page))
    }

    /// Apply `protection`, returning the protection assumed to be in force before.
    pub fn protect(address: usize, length: usize, protection: Protection) -> Result<Protection, PatchError> {
        let ptr = core::ptr::with_exposed_provenance_mut::<c_void>(address);
        // SAFETY: only protection attributes change; the caller owns the range.
        if unsafe { libc::mprotect(ptr, length, protection) } != 0 {
            return Err(PatchError::ProtectionFailed {
                address,
                length,
                code: errno(),
            });
        }
        Ok(ASSUMED_CODE_PROTECTION)
    }

    fn page_size() -> usize {
        // SAFETY: sysconf has no preconditions.
        let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
        usize::try_from(size).ok().filter(|s| s.is_power_of_two()).unwrap_or(4096)
    }

    #[cfg(any(target_os = "linux", target_os = "android"))]
    fn errno() -> i32 {
        // SAFETY: the thread-local errno location is always valid.
        unsafe { *libc::__errno_location() }
    }

    #[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
    fn errno() -> i32 {
        // SAFETY: the thread-local errno location is always valid.
        unsafe { *libc::__error() }
    }

    #[cfg(not(any(
        target_os = "linux",
        target_os = "android",
        target_os = "macos",
        target_os = "ios",
        target_os = "freebsd"
    )))]
    const fn errno() -> i32 {
        -1
    }
}

#[cfg(windows)]
mod os {
    use crate::PatchError;
    use core::ffi::c_void;
    use windows_sys::Win32::Foundation::GetLastError;
    use windows_sys::Win32::System::Memory::{
        PAGE_EXECUTE_READWRITE, PAGE_EXECUTE_WRITECOPY, PAGE_PROTECTION_FLAGS, PAGE_READWRITE,
        PAGE_WRITECOPY, VirtualProtect,
    };

    pub type Protection = PAGE_PROTECTION_FLAGS;

    pub const READ_WRITE_EXECUTE: Protection = PAGE_EXECUTE_READWRITE;

    pub const fn is_writable(protection: Protection) -> bool {
        protection
            & (PAGE_READWRITE | PAGE_EXECUTE_READWRITE | PAGE_WRITECOPY | PAGE_EXECUTE_WRITECOPY)
            != 0
    }

    /// `VirtualProtect` rounds to pages itself.
    pub const fn page_span(address: usize, length: usize) -> (usize, usize) {
        (address, length)
    }

    /// Apply `protection`, returning the previous protection reported by the OS.
    pub fn protect(address: usize, length: usize, protection: Protection) -> Result<Protection, PatchError> {
        let ptr = core::ptr::with_exposed_provenance::<c_void>(address);
        let mut previous: Protection = 0;
        // SAFETY: only protection attributes change; the caller owns the range.
        if unsafe { VirtualProtect(ptr, length, protection, &raw mut previous) } == 0 {
            #[allow(clippy::cast_possible_wrap)]
            let code = unsafe { GetLastError() } as i32;
            return Err(PatchError::ProtectionFailed {
                address,
                length,
                code,
            });
        }
        Ok(previous)
    }
}
