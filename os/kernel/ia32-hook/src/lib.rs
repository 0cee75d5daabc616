//! # IA32 Inline Hooking
//!
//! Redirects a function to a callback by overwriting its entry point with a
//! `jmp rel32`, keeping a [`Trampoline`] that runs the original behaviour.
//!
//! ```text
//!  caller ──► target ──jmp──► callback ──call──► trampoline ──jmp──► target+n
//! ```
//!
//! - [`opcode`]: the `jmp rel32` codec.
//! - [`Trampoline`]: the copied prologue plus the jump back.
//! - [`PageProtection`]: how code pages are made writable, either through the
//!   page tables ([`KernelPageProtection`]) or the operating system
//!   ([`UserPageProtection`]).
//! - [`InlineHook`]: install and remove, with byte verification and exact
//!   restoration.
//!
//! ## Features
//! - `kernel`: patch writes additionally run with interrupts disabled.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod error;
mod hook;
pub mod opcode;
mod protection;
mod trampoline;

pub use error::PatchError;
pub use hook::{Callback, InlineHook};
pub use protection::{KernelPageProtection, KernelToken, PageProtection};
#[cfg(any(unix, windows))]
pub use protection::{UserPageProtection, UserToken};
pub use trampoline::Trampoline;
