use crate::RawSpin;
#[cfg(feature = "kernel")]
use crate::IrqGuard;
use core::marker::PhantomData;

static GLOBAL: SerializationLock = SerializationLock::new();

/// Mutual exclusion for the byte-overwrite steps of code patching.
///
/// The lock spins rather than blocks; sections are expected to be a handful
/// of byte copies. With the `kernel` feature, entering a section first
/// disables interrupts on the current processor so a handler cannot run
/// against half-written code or re-enter the lock; interrupts are restored
/// after the lock is released.
///
/// Other processors are only excluded from *patching*, not from executing
/// the code being patched.
pub struct SerializationLock {
    raw: RawSpin,
}

impl Default for SerializationLock {
    fn default() -> Self {
        Self::new()
    }
}

impl SerializationLock {
    #[must_use]
    pub const fn new() -> Self {
        Self { raw: RawSpin::new() }
    }

    /// The system-wide instance shared by all patch operations.
    #[inline]
    #[must_use]
    pub fn global() -> &'static Self {
        &GLOBAL
    }

    /// Enter the serialized section; it ends when the returned guard drops.
    #[inline]
    pub fn enter(&self) -> SerializedSection<'_> {
        #[cfg(feature = "kernel")]
        let irq = IrqGuard::new();
        self.raw.lock();
        SerializedSection {
            lock: self,
            #[cfg(feature = "kernel")]
            _irq: irq,
            _not_send: PhantomData,
        }
    }

    /// Run `f` inside a serialized section.
    #[inline]
    pub fn serialize<R>(&self, f: impl FnOnce() -> R) -> R {
        let _section = self.enter();
        f()
    }

    #[inline]
    #[must_use]
    pub fn is_held(&self) -> bool {
        self.raw.is_locked()
    }
}

/// Proof of being inside a [`SerializationLock`] section.
///
/// Not `Send`: with the `kernel` feature it carries the interrupt state of
/// the processor that entered.
pub struct SerializedSection<'a> {
    lock: &'a SerializationLock,
    // Dropped after the lock is released in `Drop::drop`.
    #[cfg(feature = "kernel")]
    _irq: IrqGuard,
    _not_send: PhantomData<*const ()>,
}

impl Drop for SerializedSection<'_> {
    fn drop(&mut self) {
        // SAFETY: the section exists only while the lock is held.
        unsafe { self.lock.raw.unlock() }
    }
}
