//! # IA32 Paging Introspection
//!
//! Page-table walking and page presence queries for 32-bit x86 paging
//! **without PAE**, as used by code that needs to inspect or adjust the
//! protection of live mappings (e.g. before patching code bytes).
//!
//! ## What you get
//! - [`LinearAddress`] / [`PageSize`]: a `u32` address newtype and the two
//!   supported page sizes (4 KiB, 4 MiB).
//! - [`PageDescriptor`]: the bitfield view of one PDE/PTE.
//! - [`SelfMap`] / [`RecursiveSelfMap`]: where the paging structures are mapped.
//! - [`PageTableWalker`]: O(1) entry lookup by index arithmetic.
//! - [`MemoryPresenceManager`]: range presence, writability and page-size queries.
//! - [`PagePresence`]: the `usize`-based query surface used by memory accessors.
//!
//! ## IA32 Linear Address → Physical Address Walk
//!
//! ```text
//!  CR3 → PD ──PS=1──────────────► 4 MiB page
//!         │
//!         └──PS=0──► PT ─────────► 4 KiB page
//! ```
//!
//! | Level | Table | Entry | Indexed by |
//! |:------|:------|:------|:-----------|
//! | 2 | Page Directory | PDE | bits `[31:22]` |
//! | 1 | Page Table     | PTE | bits `[21:12]` |
//!
//! The entry that *effectively* describes an address is the PDE when it is
//! absent or maps a 4 MiB page, and the PTE otherwise; see
//! [`PageTableWalker::effective_entry`].
//!
//! ## Features
//! - `diagnostics`: [`DescriptorDump`] and [`DescriptorSlot::dump`].
//! - `testing`: [`testing::SyntheticTables`], an in-memory self-map.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code, clippy::inline_always)]

#[cfg(any(test, feature = "testing"))]
extern crate alloc;

mod addresses;
mod descriptor;
#[cfg(feature = "diagnostics")]
mod dump;
mod error;
mod presence;
pub mod tlb;
mod walker;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::addresses::{DESCRIPTOR_SIZE, ENTRIES_PER_TABLE, LinearAddress, PageSize};
pub use crate::descriptor::PageDescriptor;
#[cfg(feature = "diagnostics")]
pub use crate::dump::DescriptorDump;
pub use crate::error::PagingError;
pub use crate::presence::{MemoryPresenceManager, PagePresence};
pub use crate::walker::{DescriptorSlot, Level, PageTableWalker, RecursiveSelfMap, SelfMap};
