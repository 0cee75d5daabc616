//! # Synchronization for code patching
//!
//! - [`SerializationLock`]: the single, system-wide lock around patch writes.
//!   With the `kernel` feature it also keeps interrupts off on the current
//!   processor while held. [`irq`] exists on x86 targets only.
//! - [`ReentrancyGuard`]: refuses, rather than waits for, a second entry into
//!   a region identified by a pair of values.
//! - [`SpinMutex`] / [`RawSpin`]: the spin primitives both are built on.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

#[cfg(all(feature = "kernel", not(any(target_arch = "x86", target_arch = "x86_64"))))]
compile_error!("the `kernel` feature needs an x86 target to mask interrupts");

mod error;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub mod irq;
mod mutex;
mod raw_spin;
mod reentrancy;
mod serialization;

pub use error::SyncError;
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
pub use irq::IrqGuard;
pub use mutex::{SpinMutex, SpinMutexGuard};
pub use raw_spin::RawSpin;
pub use reentrancy::{ReentrancyGuard, RegionId};
pub use serialization::{SerializationLock, SerializedSection};
