use crate::{AccessError, AccessWindow};
use alloc::vec::Vec;
use core::fmt;
use ia32_paging::PagePresence;
use log::{debug, trace};

/// A run of requested bytes that was synthesized because its page was absent.
///
/// Both bounds are inclusive and given in caller addresses.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FragmentRange {
    pub start: usize,
    pub end: usize,
}

impl fmt::Display for FragmentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:#x}, {:#x}]", self.start, self.end)
    }
}

/// Read/write access to a bounded memory range.
pub trait MemoryAccessor {
    /// Fill `buffer` from `address`.
    ///
    /// **`Ok(false)` is not a failure.** It means at least one byte of
    /// `buffer` was synthesized instead of read; the buffer is fully
    /// initialized either way and the synthesized runs are appended to
    /// `fragments`. `Ok(true)` means every byte came from memory.
    ///
    /// # Errors
    /// [`AccessError::OutOfRange`] if the range leaves the accessor's window.
    fn read(
        &self,
        address: usize,
        buffer: &mut [u8],
        fragments: Option<&mut Vec<FragmentRange>>,
    ) -> Result<bool, AccessError>;

    /// Copy `data` to `address`.
    ///
    /// # Errors
    /// [`AccessError::OutOfRange`] if the range leaves the accessor's window.
    fn write(&self, address: usize, data: &[u8]) -> Result<(), AccessError>;

    /// Whether [`write`](Self::write) is supported.
    fn is_writable(&self) -> bool;
}

/// An accessor whose reads survive absent pages.
///
/// Presence is consulted through `P` before reading; absent pages are never
/// dereferenced. Writes are plain copies: a fault on an absent page is left
/// to the execution environment.
pub struct FaultTolerantAccessor<P: PagePresence> {
    window: AccessWindow,
    presence: P,
}

impl<P: PagePresence> FaultTolerantAccessor<P> {
    /// # Safety
    /// Every page of the window's physical range that `presence` reports as
    /// present must be readable, and writable for [`write`](MemoryAccessor::write),
    /// for the lifetime of the accessor.
    #[must_use]
    pub unsafe fn new(window: AccessWindow, presence: P) -> Self {
        debug!("accessor over {window:?}");
        Self { window, presence }
    }

    #[inline]
    #[must_use]
    pub const fn window(&self) -> &AccessWindow {
        &self.window
    }

    #[inline]
    #[must_use]
    pub const fn presence(&self) -> &P {
        &self.presence
    }

    /// Copy `buffer.len()` bytes from the physical address `from`.
    ///
    /// # Safety
    /// The source range must be present.
    unsafe fn copy_out(from: usize, buffer: &mut [u8]) {
        let src = core::ptr::with_exposed_provenance::<u8>(from);
        // SAFETY: readable per the caller; `buffer` is a distinct allocation.
        unsafe { core::ptr::copy_nonoverlapping(src, buffer.as_mut_ptr(), buffer.len()) };
    }

    /// Page-by-page read starting at physical `physical` / caller `address`.
    fn read_paged(
        &self,
        address: usize,
        physical: usize,
        buffer: &mut [u8],
        mut fragments: Option<&mut Vec<FragmentRange>>,
    ) -> bool {
        let mut open: Option<FragmentRange> = None;
        let mut synthesized = false;
        let mut done = 0;

        while done < buffer.len() {
            let at = physical + done;
            let into_page = at - self.presence.align_to_page_start(at);
            let chunk = (self.presence.page_size_at(at) - into_page).min(buffer.len() - done);
            let bytes = &mut buffer[done..done + chunk];

            if self.presence.is_page_present(at) {
                // SAFETY: present, and inside the window by translation.
                unsafe { Self::copy_out(at, bytes) };
                if let (Some(fragment), Some(out)) = (open.take(), fragments.as_deref_mut()) {
                    out.push(fragment);
                }
            } else {
                trace!("page at {at:#x} absent, filling {chunk:#x} bytes");
                bytes.fill(self.window.fill());
                synthesized = true;
                let last = address + done + chunk - 1;
                match &mut open {
                    Some(fragment) => fragment.end = last,
                    None => {
                        open = Some(FragmentRange {
                            start: address + done,
                            end: last,
                        });
                    }
                }
            }
            done += chunk;
        }

        if let (Some(fragment), Some(out)) = (open, fragments) {
            out.push(fragment);
        }
        !synthesized
    }
}

impl<P: PagePresence> MemoryAccessor for FaultTolerantAccessor<P> {
    /// Reads the whole range with one copy when every page is present, and
    /// page by page otherwise. Runs of consecutive absent pages are reported
    /// as a single fragment.
    fn read(
        &self,
        address: usize,
        buffer: &mut [u8],
        fragments: Option<&mut Vec<FragmentRange>>,
    ) -> Result<bool, AccessError> {
        let physical = self.window.translate(address, buffer.len())?;
        if buffer.is_empty() {
            return Ok(true);
        }
        if self.presence.is_range_present(physical, buffer.len()) {
            // SAFETY: every page is present and inside the window.
            unsafe { Self::copy_out(physical, buffer) };
            return Ok(true);
        }
        Ok(self.read_paged(address, physical, buffer, fragments))
    }

    fn write(&self, address: usize, data: &[u8]) -> Result<(), AccessError> {
        let physical = self.window.translate(address, data.len())?;
        if data.is_empty() {
            return Ok(());
        }
        let dst = core::ptr::with_exposed_provenance_mut::<u8>(physical);
        // SAFETY: inside the window; writability is guaranteed by `new`'s contract.
        unsafe { core::ptr::copy_nonoverlapping(data.as_ptr(), dst, data.len()) };
        Ok(())
    }

    fn is_writable(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Presence that fails the test if consulted.
    struct Untouchable;

    impl PagePresence for Untouchable {
        fn page_size_at(&self, _: usize) -> usize {
            panic!("memory consulted")
        }

        fn is_page_present(&self, _: usize) -> bool {
            panic!("memory consulted")
        }
    }

    #[test]
    fn out_of_window_read_fails_before_touching_memory() {
        let accessor =
            unsafe { FaultTolerantAccessor::new(AccessWindow::flat(0x1000, 0x2000), Untouchable) };
        let mut buf = [0u8; 2];
        assert_eq!(
            accessor.read(0x1FFF, &mut buf, None),
            Err(AccessError::OutOfRange {
                address: 0x1FFF,
                length: 2
            })
        );
        assert!(accessor.write(0x0FFF, &buf).is_err());
    }

    #[test]
    fn empty_accesses_succeed_untouched() {
        let accessor =
            unsafe { FaultTolerantAccessor::new(AccessWindow::flat(0x1000, 0x2000), Untouchable) };
        assert_eq!(accessor.read(0x10, &mut [], None), Ok(true));
        assert_eq!(accessor.write(0x10, &[]), Ok(()));
        assert!(accessor.is_writable());
    }

    /// Every page absent, in 4 KiB steps.
    struct NothingMapped;

    impl PagePresence for NothingMapped {
        fn page_size_at(&self, _: usize) -> usize {
            4096
        }

        fn is_page_present(&self, _: usize) -> bool {
            false
        }
    }

    #[test]
    fn reads_at_the_top_of_the_address_space() {
        let window = AccessWindow::relocated(0x1000, 0x2000, usize::MAX - 0x1000);
        let accessor = unsafe { FaultTolerantAccessor::new(window, NothingMapped) };

        let mut buf = [0u8; 0x200];
        let mut fragments = Vec::new();
        assert_eq!(
            accessor.read(usize::MAX - 0x200, &mut buf, Some(&mut fragments)),
            Ok(false)
        );
        assert_eq!(
            fragments,
            [FragmentRange {
                start: usize::MAX - 0x200,
                end: usize::MAX - 1
            }]
        );

        fragments.clear();
        assert_eq!(
            accessor.read(usize::MAX - 0xFF, &mut buf, Some(&mut fragments)),
            Err(AccessError::OutOfRange {
                address: usize::MAX - 0xFF,
                length: 0x200
            })
        );
        assert!(fragments.is_empty());
    }

    #[test]
    fn fragment_display() {
        let f = FragmentRange {
            start: 0x1000,
            end: 0x2FFF,
        };
        assert_eq!(f.to_string(), "[0x1000, 0x2fff]");
    }
}
