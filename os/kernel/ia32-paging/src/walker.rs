//! # Self-Mapped Page-Table Walker
//!
//! With a *self-map* (recursive mapping) one page-directory entry points back
//! at the page directory itself. The paging structures of the current address
//! space then appear at fixed linear addresses:
//!
//! ```text
//! table window      : table_base     + (address >> 12) * 4        (4 MiB, all PTEs)
//! directory window  : directory_base + (address >> 22) * 4        (4 KiB, all PDEs)
//! ```
//!
//! so any entry is located in O(1) by index arithmetic, without following
//! physical pointers. The price is that this is only valid for the specific
//! paging convention modelled by the [`SelfMap`] in use; the classic IA32
//! layout (`PD` at `0xC030_0000`, tables at `0xC000_0000`) is provided by
//! [`RecursiveSelfMap::ia32_default`].

use crate::{DESCRIPTOR_SIZE, ENTRIES_PER_TABLE, LinearAddress, PageDescriptor, PagingError};
use core::marker::PhantomData;
use core::ptr::NonNull;

/// Locates the self-mapped paging structures and performs TLB maintenance.
///
/// # Safety
/// Implementors guarantee that
/// - [`directory`](Self::directory) points to [`ENTRIES_PER_TABLE`] readable and
///   writable descriptors, and
/// - [`tables`](Self::tables) points to `ENTRIES_PER_TABLE²` descriptors laid
///   out so that entry `i` describes the 4 KiB page `i << 12`, and every entry
///   whose governing directory entry is present (and not a 4 MiB page) is
///   readable and writable,
///
/// for as long as the implementor is alive.
pub unsafe trait SelfMap {
    /// Base of the page-directory window.
    fn directory(&self) -> NonNull<PageDescriptor>;

    /// Base of the page-table window.
    fn tables(&self) -> NonNull<PageDescriptor>;

    /// Invalidate the cached translation of the page containing `address`.
    fn invalidate(&self, address: LinearAddress);
}

unsafe impl<T: SelfMap + ?Sized> SelfMap for &T {
    fn directory(&self) -> NonNull<PageDescriptor> {
        (**self).directory()
    }

    fn tables(&self) -> NonNull<PageDescriptor> {
        (**self).tables()
    }

    fn invalidate(&self, address: LinearAddress) {
        (**self).invalidate(address);
    }
}

/// The live self-map of the running address space at fixed linear addresses.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct RecursiveSelfMap {
    directory_base: usize,
    table_base: usize,
}

impl RecursiveSelfMap {
    /// Linear address of the page directory in the classic IA32 self-map.
    pub const PAGE_DIRECTORY_BASE: usize = 0xC030_0000;

    /// Linear address of the page-table window in the classic IA32 self-map.
    pub const PAGE_TABLE_BASE: usize = 0xC000_0000;

    /// Describe a self-map at custom bases.
    ///
    /// # Panics
    /// If either base is zero.
    ///
    /// # Safety
    /// The caller must run at CPL 0 in an address space whose paging
    /// structures are really mapped at the given bases, as required by
    /// [`SelfMap`].
    #[must_use]
    pub const unsafe fn new(directory_base: usize, table_base: usize) -> Self {
        assert!(directory_base != 0 && table_base != 0, "self-map base must be non-null");
        Self {
            directory_base,
            table_base,
        }
    }

    /// The classic IA32 (non-PAE) layout.
    ///
    /// # Safety
    /// See [`RecursiveSelfMap::new`].
    #[must_use]
    pub const unsafe fn ia32_default() -> Self {
        unsafe { Self::new(Self::PAGE_DIRECTORY_BASE, Self::PAGE_TABLE_BASE) }
    }
}

unsafe impl SelfMap for RecursiveSelfMap {
    fn directory(&self) -> NonNull<PageDescriptor> {
        // SAFETY: the constructor rejects a zero base.
        unsafe {
            NonNull::new_unchecked(core::ptr::with_exposed_provenance_mut(self.directory_base))
        }
    }

    fn tables(&self) -> NonNull<PageDescriptor> {
        // SAFETY: the constructor rejects a zero base.
        unsafe { NonNull::new_unchecked(core::ptr::with_exposed_provenance_mut(self.table_base)) }
    }

    fn invalidate(&self, address: LinearAddress) {
        // SAFETY: constructing a RecursiveSelfMap asserts CPL 0.
        unsafe { crate::tlb::invalidate_page(address) }
    }
}

/// The paging level a [`DescriptorSlot`] lives in.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Level {
    /// Page-directory entry.
    Directory,
    /// Page-table entry.
    Table,
}

/// A live view of one paging-structure entry.
///
/// Loads are volatile and always observe the current processor-visible
/// value; nothing is cached in the slot.
#[derive(Debug, Copy, Clone)]
pub struct DescriptorSlot<'m> {
    ptr: NonNull<PageDescriptor>,
    level: Level,
    _map: PhantomData<&'m ()>,
}

impl DescriptorSlot<'_> {
    /// Linear address of the entry itself (inside the self-map window).
    #[inline]
    #[must_use]
    pub fn address(self) -> usize {
        self.ptr.as_ptr().addr()
    }

    #[inline]
    #[must_use]
    pub const fn level(self) -> Level {
        self.level
    }

    /// Read the entry.
    #[inline]
    #[must_use]
    pub fn load(self) -> PageDescriptor {
        // SAFETY: the SelfMap contract guarantees the slot is readable.
        unsafe { self.ptr.read_volatile() }
    }

    /// Overwrite the entry.
    ///
    /// The caller is responsible for TLB invalidation of the affected page.
    ///
    /// # Safety
    /// Changing a live mapping may invalidate references into the affected
    /// page. The caller must ensure no such reference is used afterwards.
    #[inline]
    pub unsafe fn store(self, descriptor: PageDescriptor) {
        unsafe { self.ptr.write_volatile(descriptor) }
    }
}

/// Resolves linear addresses to their page-directory and page-table entries.
pub struct PageTableWalker<M: SelfMap> {
    map: M,
}

impl<M: SelfMap> PageTableWalker<M> {
    #[must_use]
    pub const fn new(map: M) -> Self {
        Self { map }
    }

    #[inline]
    #[must_use]
    pub const fn self_map(&self) -> &M {
        &self.map
    }

    /// The page-directory entry governing `address` (index from bits `[31:22]`).
    ///
    /// Never fails; a not-present entry is returned as-is and the caller must
    /// check [`PageDescriptor::present`].
    #[must_use]
    pub fn directory_entry(&self, address: LinearAddress) -> DescriptorSlot<'_> {
        let index = address.directory_index();
        debug_assert!(index < ENTRIES_PER_TABLE);
        // SAFETY: index < 1024 stays inside the directory window.
        let ptr = unsafe { self.map.directory().add(index) };
        self.slot(ptr, Level::Directory)
    }

    /// The page-table entry mapping `address`.
    ///
    /// The table entry lives at `tables + (directory_index * 1024 + table_index) * 4`.
    ///
    /// # Errors
    /// [`PagingError::LargePageTableLookup`] if the governing directory entry maps
    /// a 4 MiB page. If the directory entry is not present, the slot is returned
    /// but must not be loaded: its backing table page is not mapped.
    pub fn table_entry(&self, address: LinearAddress) -> Result<DescriptorSlot<'_>, PagingError> {
        if self.directory_entry(address).load().is_large_leaf() {
            return Err(PagingError::LargePageTableLookup { address });
        }
        Ok(self.table_slot(address))
    }

    /// The entry that actually describes the mapping of `address`.
    ///
    /// This is the directory entry if it is not present or maps a 4 MiB page,
    /// otherwise the page-table entry.
    #[must_use]
    pub fn effective_entry(&self, address: LinearAddress) -> DescriptorSlot<'_> {
        let pde = self.directory_entry(address);
        let d = pde.load();
        if !d.present() || d.large_page() {
            pde
        } else {
            self.table_slot(address)
        }
    }

    /// Invalidate the TLB entry for `address`.
    #[inline]
    pub fn invalidate(&self, address: LinearAddress) {
        self.map.invalidate(address);
    }

    fn table_slot(&self, address: LinearAddress) -> DescriptorSlot<'_> {
        let index = address.self_map_index();
        debug_assert!(index < ENTRIES_PER_TABLE * ENTRIES_PER_TABLE);
        // SAFETY: index < 1024² stays inside the table window.
        let ptr = unsafe { self.map.tables().add(index) };
        self.slot(ptr, Level::Table)
    }

    const fn slot(&self, ptr: NonNull<PageDescriptor>, level: Level) -> DescriptorSlot<'_> {
        DescriptorSlot {
            ptr,
            level,
            _map: PhantomData,
        }
    }
}

const _: () = assert!(size_of::<PageDescriptor>() == DESCRIPTOR_SIZE);
