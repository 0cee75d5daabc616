//! # Fault-Tolerant Memory Access
//!
//! Reads and writes inside a fixed [`AccessWindow`], optionally presented
//! under a relocated base address. Reads over partially unmapped ranges do
//! not fault: absent pages are synthesized with a fill byte and reported as
//! [`FragmentRange`]s.
//!
//! ```text
//!  caller address ──translate──► physical address ──PagePresence──► copy or fill
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

extern crate alloc;

mod accessor;
mod error;
mod window;

pub use accessor::{FaultTolerantAccessor, FragmentRange, MemoryAccessor};
pub use error::AccessError;
pub use window::{ABSENT_FILL, AccessWindow};
