use bitfield_struct::bitfield;

/// A single 32-bit IA32 page-directory or page-table entry in its raw bitfield form.
///
/// This models the **common superset** of the two entry kinds used by IA32
/// paging without PAE: a page-directory entry (PDE) and a page-table entry
/// (PTE). The type is only ever a *value*; live entries are reached through a
/// [`DescriptorSlot`](crate::DescriptorSlot), which re-reads processor-maintained
/// memory on every load.
///
/// ### Bit layout
///
/// | Bits   | Name / Mnemonic | Meaning |
/// |--------|-----------------|---------|
/// | 0      | `P`             | Present |
/// | 1      | `R/W`           | Writable if set |
/// | 2      | `U/S`           | User-mode accessible if set |
/// | 3      | `PWT`           | Write-through caching |
/// | 4      | `PCD`           | Cache disabled |
/// | 5      | `A`             | Accessed |
/// | 6      | `D`             | Dirty (leaf only) |
/// | 7      | `PS`            | In a PDE: 4 MiB leaf if set, else pointer to a page table. In a PTE: PAT |
/// | 8      | `G`             | Global (leaf only) |
/// | 9–11   | AVL             | Available to the operating system |
/// | 12–31  | frame           | Physical frame number (address bits `[31:12]`) |
///
/// ### Notes
/// - The frame field is meaningful only while `present` is set. A not-present
///   entry may carry arbitrary OS-defined bits (e.g. a swap slot).
/// - For a 4 MiB PDE the low bits of the frame field hold PAT / reserved bits;
///   the 4 MiB-aligned base is `frame_base() & 0xFFC0_0000`.
///
/// ### Example
/// ```rust
/// # use ia32_paging::PageDescriptor;
/// let e = PageDescriptor::new()
///     .with_present(true)
///     .with_writable(true)
///     .with_frame(0x12345);
/// assert!(e.present());
/// assert_eq!(e.frame_base(), 0x1234_5000);
/// ```
#[bitfield(u32)]
pub struct PageDescriptor {
    /// Present (P, bit 0).
    pub present: bool,

    /// Read/Write (R/W, bit 1).
    ///
    /// Clear for read-only. Supervisor writes ignore it unless CR0.WP is set.
    pub writable: bool,

    /// User/Supervisor (U/S, bit 2).
    pub user_access: bool,

    /// Page Write-Through (PWT, bit 3).
    pub write_through: bool,

    /// Page Cache Disable (PCD, bit 4).
    pub cache_disabled: bool,

    /// Accessed (A, bit 5), set by the processor.
    pub accessed: bool,

    /// Dirty (D, bit 6), set by the processor on the first write to a leaf.
    pub dirty: bool,

    /// Page Size (PS, bit 7).
    ///
    /// In a PDE: **set** maps a 4 MiB page directly, **clear** points at a
    /// page table. In a PTE the same position is the PAT selector.
    pub large_page: bool,

    /// Global (G, bit 8), leaf only.
    pub global: bool,

    /// OS-available (bits 9..=11).
    #[bits(3)]
    pub os_available: u8,

    /// Physical frame number (bits 12..=31).
    #[bits(20)]
    pub frame: u32,
}

impl PageDescriptor {
    /// Physical base address of the mapped frame (or the next-level table).
    ///
    /// Only meaningful when [`present`](Self::present) is set.
    #[inline]
    #[must_use]
    pub const fn frame_base(&self) -> u32 {
        self.frame() << 12
    }

    /// `true` for a present page-directory entry that maps a 4 MiB page.
    ///
    /// Must only be asked of directory entries; in a PTE bit 7 is PAT.
    #[inline]
    #[must_use]
    pub const fn is_large_leaf(&self) -> bool {
        self.present() && self.large_page()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bit_positions_match_hardware() {
        assert_eq!(PageDescriptor::new().with_present(true).into_bits(), 1 << 0);
        assert_eq!(PageDescriptor::new().with_writable(true).into_bits(), 1 << 1);
        assert_eq!(PageDescriptor::new().with_user_access(true).into_bits(), 1 << 2);
        assert_eq!(PageDescriptor::new().with_dirty(true).into_bits(), 1 << 6);
        assert_eq!(PageDescriptor::new().with_large_page(true).into_bits(), 1 << 7);
        assert_eq!(PageDescriptor::new().with_frame(1).into_bits(), 1 << 12);
    }

    #[test]
    fn raw_entry_decodes() {
        // A typical kernel 4 MiB PDE: base 0x0040_0000, PS|A|RW|P.
        let e = PageDescriptor::from_bits(0x0040_00A3);
        assert!(e.present());
        assert!(e.writable());
        assert!(!e.user_access());
        assert!(e.accessed());
        assert!(e.is_large_leaf());
        assert_eq!(e.frame_base(), 0x0040_0000);
    }

    #[test]
    fn absent_entry_is_not_a_large_leaf() {
        let e = PageDescriptor::new().with_large_page(true);
        assert!(!e.is_large_leaf());
    }
}
