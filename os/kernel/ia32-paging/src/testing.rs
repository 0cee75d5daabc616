//! Heap-backed stand-in for the self-mapped paging structures.
//!
//! [`SyntheticTables`] allocates a full page directory and the complete
//! 4 MiB page-table window so the walker's index arithmetic runs unchanged
//! against ordinary memory. TLB invalidations are recorded instead of issued.

use crate::{ENTRIES_PER_TABLE, LinearAddress, PageDescriptor, PageSize, SelfMap};
use alloc::boxed::Box;
use alloc::vec::Vec;
use core::cell::{RefCell, UnsafeCell};
use core::ptr::NonNull;

/// An in-memory page directory plus page-table window.
pub struct SyntheticTables {
    directory: Box<[UnsafeCell<PageDescriptor>]>,
    tables: Box<[UnsafeCell<PageDescriptor>]>,
    invalidated: RefCell<Vec<LinearAddress>>,
}

impl Default for SyntheticTables {
    fn default() -> Self {
        Self::new()
    }
}

impl SyntheticTables {
    /// All entries not present.
    #[must_use]
    pub fn new() -> Self {
        Self {
            directory: zeroed(ENTRIES_PER_TABLE),
            tables: zeroed(ENTRIES_PER_TABLE * ENTRIES_PER_TABLE),
            invalidated: RefCell::new(Vec::new()),
        }
    }

    /// Map the 4 KiB page containing `address`, creating its page table if needed.
    pub fn map_4k(&self, address: LinearAddress, writable: bool) {
        let pde = self.directory_cell(address);
        if !pde.present() || pde.large_page() {
            self.set_directory(
                address,
                PageDescriptor::new()
                    .with_present(true)
                    .with_writable(true)
                    .with_frame(address.as_u32() >> 22),
            );
        }
        self.set_table(
            address,
            PageDescriptor::new()
                .with_present(true)
                .with_writable(writable)
                .with_frame(address.as_u32() >> 12),
        );
    }

    /// Map the 4 MiB page containing `address` directly from the directory.
    pub fn map_4m(&self, address: LinearAddress, writable: bool) {
        let base = address.align_down(PageSize::Size4M);
        self.set_directory(
            address,
            PageDescriptor::new()
                .with_present(true)
                .with_writable(writable)
                .with_large_page(true)
                .with_frame(base.as_u32() >> 12),
        );
    }

    /// Make the 4 KiB page containing `address` not present, keeping its table.
    pub fn unmap_4k(&self, address: LinearAddress) {
        self.set_table(address, PageDescriptor::new());
    }

    /// Clear the directory entry governing `address`.
    pub fn unmap_directory(&self, address: LinearAddress) {
        self.set_directory(address, PageDescriptor::new());
    }

    /// Addresses passed to [`SelfMap::invalidate`], in call order.
    #[must_use]
    pub fn invalidated(&self) -> Vec<LinearAddress> {
        self.invalidated.borrow().clone()
    }

    fn directory_cell(&self, address: LinearAddress) -> PageDescriptor {
        // SAFETY: single-threaded test helper; no outstanding &mut.
        unsafe { *self.directory[address.directory_index()].get() }
    }

    fn set_directory(&self, address: LinearAddress, d: PageDescriptor) {
        // SAFETY: single-threaded test helper; no outstanding references.
        unsafe { *self.directory[address.directory_index()].get() = d }
    }

    fn set_table(&self, address: LinearAddress, d: PageDescriptor) {
        // SAFETY: single-threaded test helper; no outstanding references.
        unsafe { *self.tables[address.self_map_index()].get() = d }
    }
}

fn zeroed(n: usize) -> Box<[UnsafeCell<PageDescriptor>]> {
    (0..n).map(|_| UnsafeCell::new(PageDescriptor::new())).collect()
}

unsafe impl SelfMap for SyntheticTables {
    fn directory(&self) -> NonNull<PageDescriptor> {
        // UnsafeCell<T> has the layout of T.
        NonNull::from(&*self.directory).cast()
    }

    fn tables(&self) -> NonNull<PageDescriptor> {
        NonNull::from(&*self.tables).cast()
    }

    fn invalidate(&self, address: LinearAddress) {
        self.invalidated.borrow_mut().push(address);
    }
}
