//! Translation lookaside buffer maintenance.

use crate::LinearAddress;

/// Invalidate the TLB entry for the page containing `address` (`invlpg`).
///
/// Required after changing the protection bits of a live mapping; the
/// processor may otherwise keep using the cached translation.
///
/// # Safety
/// `invlpg` is privileged. The caller must run at CPL 0.
#[inline]
pub unsafe fn invalidate_page(address: LinearAddress) {
    #[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
    unsafe {
        core::arch::asm!(
            "invlpg [{}]",
            in(reg) address.as_usize(),
            options(nostack, preserves_flags)
        );
    }

    #[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
    {
        let _ = address;
        core::sync::atomic::compiler_fence(core::sync::atomic::Ordering::SeqCst);
    }
}
