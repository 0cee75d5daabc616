//! # Page Protection Strategies
//!
//! Writing a function's entry bytes requires its page to be writable. How
//! that is achieved depends on the execution context:
//!
//! | Strategy                 | Context      | Mechanism                             | Reverted after the write |
//! |--------------------------|--------------|---------------------------------------|--------------------------|
//! | [`KernelPageProtection`] | privileged   | R/W bit in the live page tables       | no                       |
//! | [`UserPageProtection`]   | unprivileged | `mprotect` / `VirtualProtect` syscall | yes, from the OS token   |
//!
//! The patcher only talks to the [`PageProtection`] trait.

mod kernel;
#[cfg(any(unix, windows))]
mod user;

use crate::PatchError;

pub use kernel::{KernelPageProtection, KernelToken};
#[cfg(any(unix, windows))]
pub use user::{UserPageProtection, UserToken};

/// Makes code pages writable around a patch write and trampolines executable.
pub trait PageProtection {
    /// What `make_writable` changed, for [`restore`](Self::restore).
    type Token;

    /// Make every page of `[address, address + length)` writable.
    ///
    /// # Errors
    /// If a page is absent, the range cannot be addressed, or the OS refuses.
    fn make_writable(&self, address: usize, length: usize) -> Result<Self::Token, PatchError>;

    /// Whether the range was already writable before `make_writable`.
    fn was_writable(token: &Self::Token) -> bool;

    /// Undo `make_writable`, as far as this strategy reverts at all.
    fn restore(&self, token: Self::Token);

    /// Make `[address, address + length)` executable (for trampolines).
    ///
    /// # Errors
    /// If the OS refuses the change.
    fn make_executable(&self, address: usize, length: usize) -> Result<(), PatchError>;
}

impl<T: PageProtection + ?Sized> PageProtection for &T {
    type Token = T::Token;

    fn make_writable(&self, address: usize, length: usize) -> Result<Self::Token, PatchError> {
        (**self).make_writable(address, length)
    }

    fn was_writable(token: &Self::Token) -> bool {
        T::was_writable(token)
    }

    fn restore(&self, token: Self::Token) {
        (**self).restore(token);
    }

    fn make_executable(&self, address: usize, length: usize) -> Result<(), PatchError> {
        (**self).make_executable(address, length)
    }
}
