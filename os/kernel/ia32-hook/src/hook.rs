//! # Inline Hooks
//!
//! An [`InlineHook`] redirects a function by overwriting its first bytes with
//! `jmp callback`:
//!
//! ```text
//!  before                      after install
//!  target:  55 8B EC 83 EC 10  target:      E9 <rel32 callback> 90
//!           ...                             ...
//!
//!                              trampoline:  55 8B EC 83 EC 10
//!                                           E9 <rel32 target+6>
//! ```
//!
//! The lifecycle is `Unpatched -> Patched -> Unpatched`. Installation either
//! completes or leaves the target untouched; removal (explicit or on drop)
//! copies the recorded original bytes back.
//!
//! Only the byte copies run under [`SerializationLock::global`]. Nothing stops
//! another processor from executing the entry bytes while they are rewritten.

use crate::opcode::{JUMP_LEN, NOP, encode_jump_at};
use crate::{PageProtection, PatchError, Trampoline};
use alloc::boxed::Box;
use alloc::vec;
use core::ffi::c_void;
use core::mem::ManuallyDrop;
use core::ptr::NonNull;
use ia32_sync::{ReentrancyGuard, SerializationLock};
use log::{debug, error, warn};

/// Where a hooked function is redirected to.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Callback {
    address: usize,
    context: Option<NonNull<c_void>>,
}

impl Callback {
    /// A free function with the same calling convention as the target.
    #[must_use]
    pub const fn function(address: usize) -> Self {
        Self {
            address,
            context: None,
        }
    }

    /// A member function bound to `context`.
    ///
    /// Installing a hook with such a callback fails with
    /// [`PatchError::MemberCallbackUnsupported`].
    #[must_use]
    pub const fn method(address: usize, context: NonNull<c_void>) -> Self {
        Self {
            address,
            context: Some(context),
        }
    }

    #[inline]
    #[must_use]
    pub const fn address(&self) -> usize {
        self.address
    }

    #[inline]
    #[must_use]
    pub const fn context(&self) -> Option<NonNull<c_void>> {
        self.context
    }
}

/// An active inline hook on one function.
///
/// At most one hook can be installed per target: a second install finds the
/// jump where it expects the original prologue and is refused.
pub struct InlineHook<P: PageProtection> {
    target: NonNull<u8>,
    callback: Callback,
    original: Box<[u8]>,
    // Released only once the entry bytes no longer jump into it.
    trampoline: ManuallyDrop<Trampoline>,
    protection: P,
    page_was_writable: bool,
    patched: bool,
}

// SAFETY: the raw pointers are addresses of code, not owned data; all writes
// through them happen under the global serialization lock.
unsafe impl<P: PageProtection + Send> Send for InlineHook<P> {}
unsafe impl<P: PageProtection + Sync> Sync for InlineHook<P> {}

impl<P: PageProtection> InlineHook<P> {
    /// Redirect `target` to `callback`.
    ///
    /// `expected` holds the bytes the caller knows to be at `target`; its
    /// length is the patch boundary and must cover whole instructions and at
    /// least one `jmp rel32`. Boundary bytes past the jump become `nop`.
    ///
    /// # Errors
    /// - [`PatchError::MemberCallbackUnsupported`] if `callback` carries a context.
    /// - [`PatchError::NullTarget`], [`PatchError::BoundaryTooShort`].
    /// - [`PatchError::VerificationMismatch`] if the entry bytes differ from
    ///   `expected`; nothing has been written.
    /// - [`PatchError::Busy`] if another install on `target` is in progress.
    /// - Protection errors from `protection`.
    ///
    /// # Safety
    /// - `target` must point to at least `expected.len()` bytes of code that
    ///   stay mapped for the lifetime of the hook.
    /// - The first `expected.len()` bytes must not contain relative branches
    ///   or calls; they are executed from the trampoline.
    /// - `callback` must be a function with the target's signature.
    /// - No thread may execute the entry bytes while they are rewritten here
    ///   or on removal.
    pub unsafe fn install(
        target: *mut u8,
        expected: &[u8],
        callback: Callback,
        protection: P,
    ) -> Result<Self, PatchError> {
        if callback.context.is_some() {
            return Err(PatchError::MemberCallbackUnsupported);
        }
        let target = NonNull::new(target).ok_or(PatchError::NullTarget)?;
        if expected.len() < JUMP_LEN {
            return Err(PatchError::BoundaryTooShort {
                length: expected.len(),
                minimum: JUMP_LEN,
            });
        }

        let address = target.addr().get();
        let _installing = ReentrancyGuard::try_enter(address, 0)?;

        // SAFETY: the caller guarantees `expected.len()` readable bytes.
        unsafe { verify(target, expected) }?;

        let trampoline = Trampoline::build(expected, address.wrapping_add(expected.len()));
        protection.make_executable(trampoline.entry(), trampoline.len())?;

        let mut patch = vec![NOP; expected.len()];
        if let Some(jump) = patch.first_chunk_mut::<JUMP_LEN>() {
            encode_jump_at(jump, address, callback.address);
        }
        // SAFETY: verified above; the caller guarantees the range is code we may patch.
        let page_was_writable = unsafe { write_code(&protection, target, &patch) }?;

        debug!(
            "hooked {address:#x} -> {:#x}, trampoline at {:#x}",
            callback.address,
            trampoline.entry()
        );
        Ok(Self {
            target,
            callback,
            original: expected.into(),
            trampoline: ManuallyDrop::new(trampoline),
            protection,
            page_was_writable,
            patched: true,
        })
    }

    /// Restore the original entry bytes and release the trampoline.
    ///
    /// # Errors
    /// If the page cannot be made writable again. One more restore is
    /// attempted as the hook drops; if that fails too, the entry keeps
    /// jumping to the callback and the trampoline is leaked rather than freed.
    pub fn remove(mut self) -> Result<(), PatchError> {
        self.unpatch()
    }

    #[inline]
    #[must_use]
    pub fn target(&self) -> usize {
        self.target.addr().get()
    }

    #[inline]
    #[must_use]
    pub const fn callback(&self) -> Callback {
        self.callback
    }

    /// The entry bytes as they were before the hook was installed.
    #[inline]
    #[must_use]
    pub fn original_bytes(&self) -> &[u8] {
        &self.original
    }

    /// Address to call from the callback to run the original function.
    #[inline]
    #[must_use]
    pub fn trampoline_entry(&self) -> usize {
        self.trampoline.entry()
    }

    #[inline]
    #[must_use]
    pub fn trampoline(&self) -> &Trampoline {
        &self.trampoline
    }

    /// Whether the target page was writable before installation.
    ///
    /// Informational only; whether protection is reverted is up to `P`.
    #[inline]
    #[must_use]
    pub const fn page_was_writable(&self) -> bool {
        self.page_was_writable
    }

    fn unpatch(&mut self) -> Result<(), PatchError> {
        if !self.patched {
            return Ok(());
        }
        // SAFETY: `install` established that `target` holds `original.len()`
        // patchable code bytes for the lifetime of the hook.
        unsafe { write_code(&self.protection, self.target, &self.original) }?;
        self.patched = false;
        debug!("unhooked {:#x}", self.target());
        Ok(())
    }
}

impl<P: PageProtection> Drop for InlineHook<P> {
    fn drop(&mut self) {
        match self.unpatch() {
            // SAFETY: the entry bytes are restored and nothing else refers to
            // the trampoline; it is never touched again.
            Ok(()) => unsafe { ManuallyDrop::drop(&mut self.trampoline) },
            Err(e) => error!(
                "failed to restore entry bytes of {:#x}, leaking trampoline at {:#x}: {e}",
                self.target(),
                self.trampoline.entry()
            ),
        }
    }
}

/// Compare the bytes at `target` with `expected`.
///
/// # Safety
/// `target` must be readable for `expected.len()` bytes.
unsafe fn verify(target: NonNull<u8>, expected: &[u8]) -> Result<(), PatchError> {
    for (offset, &expected) in expected.iter().enumerate() {
        // SAFETY: offset < expected.len(), readable per the caller.
        let found = unsafe { target.add(offset).read_volatile() };
        if found != expected {
            warn!(
                "entry byte {offset} of {:#x} is {found:#04x}, expected {expected:#04x}",
                target.addr()
            );
            return Err(PatchError::VerificationMismatch {
                offset,
                expected,
                found,
            });
        }
    }
    Ok(())
}

/// Copy `bytes` over the code at `at`, returning whether its page was writable before.
///
/// # Safety
/// `at` must be valid code memory of at least `bytes.len()` bytes that no
/// thread executes during the copy.
unsafe fn write_code<P: PageProtection>(
    protection: &P,
    at: NonNull<u8>,
    bytes: &[u8],
) -> Result<bool, PatchError> {
    let token = protection.make_writable(at.addr().get(), bytes.len())?;
    let was_writable = P::was_writable(&token);
    SerializationLock::global().serialize(|| {
        // SAFETY: writable now; the source is a separate allocation.
        unsafe { core::ptr::copy_nonoverlapping(bytes.as_ptr(), at.as_ptr(), bytes.len()) };
    });
    protection.restore(token);
    Ok(was_writable)
}
