//! # Page Presence and Writability
//!
//! Range-level queries over the live page tables. Ranges are walked page by
//! page, where each step advances by the size of the page actually mapping the
//! current address, so a span crossing from a 4 MiB page into 4 KiB pages (or
//! back) is visited exactly once per mapping.
//!
//! Nothing here is internally synchronized; callers must not mutate the
//! protection bits of the same page concurrently.

use crate::{LinearAddress, PageSize, PageTableWalker, SelfMap};
use log::{trace, warn};

/// Page presence queries over plain `usize` addresses.
///
/// This is the surface consumed by fault-tolerant memory accessors. The
/// default methods derive range and alignment queries from the two
/// per-page primitives.
pub trait PagePresence {
    /// Size in bytes of the page mapping `address` (a power of two).
    fn page_size_at(&self, address: usize) -> usize;

    /// Whether the page containing `address` is present.
    fn is_page_present(&self, address: usize) -> bool;

    /// Start of the page containing `address`.
    fn align_to_page_start(&self, address: usize) -> usize {
        address & !(self.page_size_at(address) - 1)
    }

    /// `true` only if every page touched by `[start, start + length)` is present.
    ///
    /// An empty range is trivially present. A range that wraps the address
    /// space is not.
    fn is_range_present(&self, start: usize, length: usize) -> bool {
        if length == 0 {
            return true;
        }
        let Some(last) = start.checked_add(length - 1) else {
            return false;
        };
        let mut page = self.align_to_page_start(start);
        loop {
            if !self.is_page_present(page) {
                return false;
            }
            match page.checked_add(self.page_size_at(page)) {
                Some(next) if next <= last => page = next,
                _ => return true,
            }
        }
    }
}

impl<T: PagePresence + ?Sized> PagePresence for &T {
    fn page_size_at(&self, address: usize) -> usize {
        (**self).page_size_at(address)
    }

    fn is_page_present(&self, address: usize) -> bool {
        (**self).is_page_present(address)
    }
}

/// Presence, writability and page-size queries backed by the page tables.
pub struct MemoryPresenceManager<M: SelfMap> {
    walker: PageTableWalker<M>,
}

impl<M: SelfMap> MemoryPresenceManager<M> {
    #[must_use]
    pub const fn new(walker: PageTableWalker<M>) -> Self {
        Self { walker }
    }

    #[inline]
    #[must_use]
    pub const fn walker(&self) -> &PageTableWalker<M> {
        &self.walker
    }

    /// Size of the page mapping `address`.
    ///
    /// 4 MiB if the governing directory entry is a present large page,
    /// 4 KiB otherwise. An absent directory entry yields 4 KiB by policy;
    /// this is a conservative stepping size, not a statement about a mapping.
    #[must_use]
    pub fn page_size_at(&self, address: LinearAddress) -> PageSize {
        if self.walker.directory_entry(address).load().is_large_leaf() {
            PageSize::Size4M
        } else {
            PageSize::Size4K
        }
    }

    /// Start of the page containing `address`, per [`page_size_at`](Self::page_size_at).
    #[must_use]
    pub fn align_to_page_start(&self, address: LinearAddress) -> LinearAddress {
        address.align_down(self.page_size_at(address))
    }

    #[must_use]
    pub fn is_page_present(&self, address: LinearAddress) -> bool {
        self.walker.effective_entry(address).load().present()
    }

    /// `true` only if every page in `[start, start + length)` is present.
    ///
    /// Returns `false` as soon as an absent page is found. Ranges running past
    /// the end of the 4 GiB space are not present.
    #[must_use]
    pub fn is_range_present(&self, start: LinearAddress, length: u32) -> bool {
        match self.pages(start, length) {
            Some(mut pages) => pages.all(|page| self.is_page_present(page)),
            None => false,
        }
    }

    /// `true` only if every page in the range is present and writable.
    #[must_use]
    pub fn is_range_writable(&self, start: LinearAddress, length: u32) -> bool {
        match self.pages(start, length) {
            Some(mut pages) => pages.all(|page| {
                let d = self.walker.effective_entry(page).load();
                d.present() && d.writable()
            }),
            None => false,
        }
    }

    /// Set the writable flag on every page of the range.
    ///
    /// Each changed entry has its TLB entry invalidated. Returns `false` on the
    /// first absent page; pages already made writable stay writable.
    pub fn make_range_writable(&self, start: LinearAddress, length: u32) -> bool {
        let Some(pages) = self.pages(start, length) else {
            return false;
        };
        for page in pages {
            if self.set_page_writable(page, true).is_none() {
                warn!("page {page} is not present; range {start}+{length:#x} left partially writable");
                return false;
            }
        }
        true
    }

    /// Set or clear the writable flag of the single page containing `page`.
    ///
    /// Returns the previous writable flag, or `None` if the page is absent.
    pub fn set_page_writable(&self, page: LinearAddress, writable: bool) -> Option<bool> {
        let slot = self.walker.effective_entry(page);
        let d = slot.load();
        if !d.present() {
            return None;
        }
        let previous = d.writable();
        if previous != writable {
            trace!("page {page}: writable {previous} -> {writable}");
            // SAFETY: only R/W changes; presence and frame are preserved, so
            // no existing reference into the page is invalidated.
            unsafe { slot.store(d.with_writable(writable)) };
            self.walker.invalidate(page);
        }
        Some(previous)
    }

    /// Page-start addresses touched by `[start, start + length)`.
    ///
    /// `None` if the range leaves the 4 GiB space.
    fn pages(&self, start: LinearAddress, length: u32) -> Option<Pages<'_, M>> {
        let end = u64::from(start.as_u32()) + u64::from(length);
        if end > 1 << 32 {
            return None;
        }
        // An empty range touches no page.
        let next = if length == 0 {
            end
        } else {
            u64::from(self.align_to_page_start(start).as_u32())
        };
        Some(Pages {
            manager: self,
            next,
            end,
        })
    }
}

/// Iterator over page starts, stepping by the size of each page in turn.
struct Pages<'a, M: SelfMap> {
    manager: &'a MemoryPresenceManager<M>,
    next: u64,
    end: u64,
}

impl<M: SelfMap> Iterator for Pages<'_, M> {
    type Item = LinearAddress;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next >= self.end {
            return None;
        }
        // next < end <= 2^32
        let page = LinearAddress::new(u32::try_from(self.next).ok()?);
        self.next += u64::from(self.manager.page_size_at(page).bytes());
        Some(page)
    }
}

impl<M: SelfMap> PagePresence for MemoryPresenceManager<M> {
    /// Addresses beyond 32 bits step in 4 KiB units.
    fn page_size_at(&self, address: usize) -> usize {
        LinearAddress::try_from(address).map_or(4096, |a| {
            Self::page_size_at(self, a).bytes() as usize
        })
    }

    /// Addresses beyond 32 bits cannot be mapped by IA32 tables and are absent.
    fn is_page_present(&self, address: usize) -> bool {
        LinearAddress::try_from(address).is_ok_and(|a| Self::is_page_present(self, a))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SyntheticTables;

    fn manager(tables: &SyntheticTables) -> MemoryPresenceManager<&SyntheticTables> {
        MemoryPresenceManager::new(PageTableWalker::new(tables))
    }

    #[test]
    fn absent_directory_defaults_to_small_pages() {
        let tables = SyntheticTables::new();
        let m = manager(&tables);
        assert_eq!(m.page_size_at(LinearAddress::new(0x0100_0000)), PageSize::Size4K);
        assert!(!m.is_page_present(LinearAddress::new(0x0100_0000)));
    }

    #[test]
    fn alignment_follows_page_size() {
        let tables = SyntheticTables::new();
        tables.map_4m(LinearAddress::new(0x0040_0000), true);
        tables.map_4k(LinearAddress::new(0x0080_1000), true);
        let m = manager(&tables);

        assert_eq!(
            m.align_to_page_start(LinearAddress::new(0x0051_2345)),
            LinearAddress::new(0x0040_0000)
        );
        assert_eq!(
            m.align_to_page_start(LinearAddress::new(0x0080_1FFF)),
            LinearAddress::new(0x0080_1000)
        );
    }

    #[test]
    fn range_across_large_to_small_transition() {
        let tables = SyntheticTables::new();
        // 4 MiB page at 0x0040_0000 followed by two 4 KiB pages at 0x0080_0000.
        tables.map_4m(LinearAddress::new(0x0040_0000), false);
        tables.map_4k(LinearAddress::new(0x0080_0000), false);
        tables.map_4k(LinearAddress::new(0x0080_1000), false);
        let m = manager(&tables);

        assert!(m.is_range_present(LinearAddress::new(0x007F_F000), 0x2000 + 0x1000));
        assert!(!m.is_range_present(LinearAddress::new(0x007F_F000), 0x3000 + 0x1));
    }

    #[test]
    fn range_with_hole_is_not_present() {
        let tables = SyntheticTables::new();
        for page in [0x1000, 0x2000, 0x4000] {
            tables.map_4k(LinearAddress::new(page), true);
        }
        let m = manager(&tables);
        assert!(m.is_range_present(LinearAddress::new(0x1000), 0x2000));
        assert!(!m.is_range_present(LinearAddress::new(0x1000), 0x4000));
    }

    #[test]
    fn empty_and_wrapping_ranges() {
        let tables = SyntheticTables::new();
        let m = manager(&tables);
        assert!(m.is_range_present(LinearAddress::new(0x1234), 0));
        assert!(!m.is_range_present(LinearAddress::new(0xFFFF_F000), 0x2000));
    }

    #[test]
    fn empty_ranges_agree_across_surfaces() {
        let tables = SyntheticTables::new();
        tables.map_4k(LinearAddress::new(0x5000), false);
        let m = manager(&tables);

        for start in [0x1000, 0x1234, 0x5000, 0x5800] {
            let typed = m.is_range_present(LinearAddress::new(start), 0);
            let generic = PagePresence::is_range_present(&m, start as usize, 0);
            assert!(typed);
            assert_eq!(typed, generic);
            assert!(m.is_range_writable(LinearAddress::new(start), 0));
            assert!(m.make_range_writable(LinearAddress::new(start), 0));
        }
        assert!(tables.invalidated().is_empty());
        assert!(!m.is_range_writable(LinearAddress::new(0x5000), 1));
    }

    #[test]
    fn set_page_writable_reports_previous_state() {
        let tables = SyntheticTables::new();
        tables.map_4k(LinearAddress::new(0x3000), false);
        let m = manager(&tables);

        assert_eq!(m.set_page_writable(LinearAddress::new(0x3000), true), Some(false));
        assert_eq!(m.set_page_writable(LinearAddress::new(0x3000), true), Some(true));
        assert_eq!(m.set_page_writable(LinearAddress::new(0x9000), true), None);
        // Only the actual change invalidates.
        assert_eq!(tables.invalidated(), [LinearAddress::new(0x3000)]);
    }

    #[test]
    fn make_range_writable_invalidates_each_changed_page() {
        let tables = SyntheticTables::new();
        tables.map_4k(LinearAddress::new(0x5000), false);
        tables.map_4k(LinearAddress::new(0x6000), true);
        tables.map_4k(LinearAddress::new(0x7000), false);
        let m = manager(&tables);

        assert!(!m.is_range_writable(LinearAddress::new(0x5000), 0x3000));
        assert!(m.make_range_writable(LinearAddress::new(0x5800), 0x2000));
        assert!(m.is_range_writable(LinearAddress::new(0x5000), 0x3000));
        assert_eq!(
            tables.invalidated(),
            [LinearAddress::new(0x5000), LinearAddress::new(0x7000)]
        );
    }

    #[test]
    fn make_range_writable_stops_at_absent_page_without_rollback() {
        let tables = SyntheticTables::new();
        tables.map_4k(LinearAddress::new(0x5000), false);
        tables.map_4k(LinearAddress::new(0x7000), false);
        let m = manager(&tables);

        assert!(!m.make_range_writable(LinearAddress::new(0x5000), 0x3000));
        assert!(m.is_range_writable(LinearAddress::new(0x5000), 0x1000));
        assert!(!m.is_range_writable(LinearAddress::new(0x7000), 0x1000));
    }

    #[test]
    fn usize_surface_treats_wide_addresses_as_absent() {
        let tables = SyntheticTables::new();
        tables.map_4k(LinearAddress::new(0x2000), true);
        let m = manager(&tables);

        assert!(PagePresence::is_page_present(&m, 0x2000));
        assert!(PagePresence::is_range_present(&m, 0x2000, 0x1000));
        assert!(!PagePresence::is_range_present(&m, 0x2000, 0x1001));
        #[cfg(target_pointer_width = "64")]
        assert!(!PagePresence::is_page_present(&m, 0x1_0000_2000));
    }
}
