//! # Linear Addresses and Page Sizes
//!
//! A 32-bit IA32 linear address (paging without PAE) splits into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```
//!
//! With `PS=1` in the page-directory entry the lower 22 bits form the offset
//! into a 4 MiB page instead, and the PT field disappears.

use core::fmt;

/// Number of entries in a page directory or page table (2¹⁰).
pub const ENTRIES_PER_TABLE: usize = 1024;

/// Size of one page-directory or page-table entry in bytes.
pub const DESCRIPTOR_SIZE: usize = 4;

/// Page sizes supported by IA32 paging without PAE.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub enum PageSize {
    /// 4 KiB page mapped by a page-table entry.
    Size4K,
    /// 4 MiB page mapped directly by a page-directory entry with `PS=1`.
    Size4M,
}

impl PageSize {
    /// Page size in bytes (always a power of two).
    #[inline]
    #[must_use]
    pub const fn bytes(self) -> u32 {
        1 << self.shift()
    }

    /// `log2` of the page size, i.e. the number of offset bits.
    #[inline]
    #[must_use]
    pub const fn shift(self) -> u32 {
        match self {
            Self::Size4K => 12,
            Self::Size4M => 22,
        }
    }

    /// Mask selecting the in-page offset bits.
    #[inline]
    #[must_use]
    pub const fn offset_mask(self) -> u32 {
        self.bytes() - 1
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Size4K => "4K",
            Self::Size4M => "4M",
        }
    }
}

impl fmt::Display for PageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A 32-bit linear (virtual) address as seen by IA32 paging.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct LinearAddress(u32);

impl LinearAddress {
    #[inline]
    #[must_use]
    pub const fn new(value: u32) -> Self {
        Self(value)
    }

    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }

    /// Page-directory index (bits `[31:22]`), in `0..1024`.
    #[inline]
    #[must_use]
    pub const fn directory_index(self) -> usize {
        (self.0 >> 22) as usize
    }

    /// Page-table index (bits `[21:12]`), in `0..1024`.
    #[inline]
    #[must_use]
    pub const fn table_index(self) -> usize {
        ((self.0 >> 12) & 0x3FF) as usize
    }

    /// Index of the page-table entry inside the self-mapped table window
    /// (bits `[31:12]`, i.e. `directory_index * 1024 + table_index`).
    #[inline]
    #[must_use]
    pub const fn self_map_index(self) -> usize {
        (self.0 >> 12) as usize
    }

    /// Align down to the start of the page of size `size` containing this address.
    #[inline]
    #[must_use]
    pub const fn align_down(self, size: PageSize) -> Self {
        Self(self.0 & !size.offset_mask())
    }

    /// Offset of this address within its page of size `size`.
    #[inline]
    #[must_use]
    pub const fn page_offset(self, size: PageSize) -> u32 {
        self.0 & size.offset_mask()
    }

    /// Checked add, returning `None` when the result leaves the 4 GiB space.
    #[inline]
    #[must_use]
    pub const fn checked_add(self, rhs: u32) -> Option<Self> {
        match self.0.checked_add(rhs) {
            Some(v) => Some(Self(v)),
            None => None,
        }
    }
}

impl From<u32> for LinearAddress {
    #[inline]
    fn from(value: u32) -> Self {
        Self(value)
    }
}

impl TryFrom<usize> for LinearAddress {
    type Error = core::num::TryFromIntError;

    #[inline]
    fn try_from(value: usize) -> Result<Self, Self::Error> {
        u32::try_from(value).map(Self)
    }
}

impl fmt::Debug for LinearAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "LinearAddress(0x{:08X})", self.0)
    }
}

impl fmt::Display for LinearAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08X}", self.0)
    }
}
