//! Interrupt-flag control for privileged contexts.
//!
//! All functions here execute `cli`, `sti` or read `EFLAGS`. `cli`/`sti` are
//! only legal at CPL 0 (or with sufficient IOPL); calling them from user mode
//! raises a general-protection fault.

/// `EFLAGS.IF`, the interrupt-enable flag.
pub const EFLAGS_IF: u32 = 1 << 9;

/// Disable maskable interrupts on the current processor (`cli`).
#[inline]
pub fn disable_interrupts() {
    unsafe { core::arch::asm!("cli", options(nomem, nostack)) }
}

/// Enable maskable interrupts on the current processor (`sti`).
#[inline]
pub fn enable_interrupts() {
    unsafe { core::arch::asm!("sti", options(nomem, nostack)) }
}

/// Current `EFLAGS` (low 32 bits of `RFLAGS` on x86-64).
#[inline]
#[must_use]
pub fn eflags() -> u32 {
    #[cfg(target_arch = "x86")]
    {
        let r: u32;
        unsafe { core::arch::asm!("pushfd", "pop {}", out(reg) r, options(preserves_flags)) }
        r
    }

    #[cfg(target_arch = "x86_64")]
    {
        let r: u64;
        unsafe { core::arch::asm!("pushfq", "pop {}", out(reg) r, options(preserves_flags)) }
        #[allow(clippy::cast_possible_truncation)]
        {
            r as u32
        }
    }
}

/// Disables interrupts on creation and restores the previous state on drop.
///
/// Interrupts are re-enabled on drop only if they were enabled when the guard
/// was created, so guards nest.
pub struct IrqGuard {
    were_enabled: bool,
}

impl IrqGuard {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        let were_enabled = eflags() & EFLAGS_IF != 0;
        if were_enabled {
            disable_interrupts();
        }
        Self { were_enabled }
    }
}

impl Default for IrqGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for IrqGuard {
    fn drop(&mut self) {
        if self.were_enabled {
            enable_interrupts();
        }
    }
}
