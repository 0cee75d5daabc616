use crate::AccessError;
use core::fmt;

/// Byte written in place of memory on absent pages.
pub const ABSENT_FILL: u8 = 0xFF;

/// The legal range `[start, end)` of one accessor and how callers address it.
///
/// | Mode        | Caller address `a` maps to     |
/// |-------------|--------------------------------|
/// | flat        | `start + a`                    |
/// | relocated   | `start + (a - virtual_base)`   |
///
/// Every access is translated and bounds-checked before memory is touched.
#[derive(Copy, Clone, PartialEq, Eq)]
pub struct AccessWindow {
    start: usize,
    end: usize,
    virtual_base: Option<usize>,
    fill: u8,
}

impl AccessWindow {
    /// Addresses are offsets from `start`.
    ///
    /// # Panics
    /// If `end < start`.
    #[must_use]
    pub const fn flat(start: usize, end: usize) -> Self {
        assert!(start <= end, "window end precedes its start");
        Self {
            start,
            end,
            virtual_base: None,
            fill: ABSENT_FILL,
        }
    }

    /// The range is presented at `virtual_base..virtual_base + (end - start)`.
    ///
    /// # Panics
    /// If `end < start`, or if the presented range runs past `usize::MAX`.
    #[must_use]
    pub const fn relocated(start: usize, end: usize, virtual_base: usize) -> Self {
        assert!(start <= end, "window end precedes its start");
        assert!(
            virtual_base.checked_add(end - start).is_some(),
            "relocated window wraps the address space"
        );
        Self {
            start,
            end,
            virtual_base: Some(virtual_base),
            fill: ABSENT_FILL,
        }
    }

    /// Use `fill` instead of [`ABSENT_FILL`] for absent pages.
    #[must_use]
    pub const fn with_fill(mut self, fill: u8) -> Self {
        self.fill = fill;
        self
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> usize {
        self.start
    }

    /// First address past the window.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> usize {
        self.end
    }

    #[inline]
    #[must_use]
    pub const fn virtual_base(&self) -> Option<usize> {
        self.virtual_base
    }

    #[inline]
    #[must_use]
    pub const fn fill(&self) -> u8 {
        self.fill
    }

    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.end - self.start
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Physical address of the caller's `address`, if all of
    /// `[address, address + length)` lies inside the window.
    ///
    /// # Errors
    /// [`AccessError::OutOfRange`] on underflow below the virtual base, on
    /// overflow of either the caller or the physical range, or if the
    /// translated range leaves `[start, end)`.
    pub fn translate(&self, address: usize, length: usize) -> Result<usize, AccessError> {
        let out_of_range = AccessError::OutOfRange { address, length };
        address.checked_add(length).ok_or(out_of_range)?;
        let offset = match self.virtual_base {
            None => address,
            Some(base) => address.checked_sub(base).ok_or(out_of_range)?,
        };
        let physical = self.start.checked_add(offset).ok_or(out_of_range)?;
        let end = physical.checked_add(length).ok_or(out_of_range)?;
        if end > self.end {
            return Err(out_of_range);
        }
        Ok(physical)
    }
}

impl fmt::Debug for AccessWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessWindow[{:#x}, {:#x})", self.start, self.end)?;
        if let Some(base) = self.virtual_base {
            write!(f, " at {base:#x}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relocated_window_translates_into_physical_range() {
        let w = AccessWindow::relocated(0x1000, 0x2000, 0x8000);
        assert_eq!(w.translate(0x8010, 0x10), Ok(0x1010));
        assert_eq!(w.translate(0x8000, 0x1000), Ok(0x1000));
        assert_eq!(
            w.translate(0x7FFF, 1),
            Err(AccessError::OutOfRange {
                address: 0x7FFF,
                length: 1
            })
        );
    }

    #[test]
    fn flat_window_uses_offsets() {
        let w = AccessWindow::flat(0x1000, 0x2000);
        assert_eq!(w.translate(0, 0x1000), Ok(0x1000));
        assert_eq!(w.translate(0xFFF, 1), Ok(0x1FFF));
        assert!(w.translate(0xFFF, 2).is_err());
        assert_eq!(w.translate(0x1000, 0), Ok(0x2000));
    }

    #[test]
    fn overflow_is_out_of_range() {
        let w = AccessWindow::flat(0x1000, usize::MAX);
        assert!(w.translate(usize::MAX, 1).is_err());
        assert!(w.translate(0x10, usize::MAX).is_err());
    }

    #[test]
    fn caller_range_wrapping_is_out_of_range() {
        let w = AccessWindow::relocated(0x1000, 0x2000, usize::MAX - 0x1000);
        assert_eq!(w.translate(usize::MAX - 0x200, 0x200), Ok(0x1E00));
        assert_eq!(
            w.translate(usize::MAX - 0xFF, 0x200),
            Err(AccessError::OutOfRange {
                address: usize::MAX - 0xFF,
                length: 0x200
            })
        );
    }

    #[test]
    #[should_panic(expected = "wraps the address space")]
    fn relocated_window_must_not_wrap() {
        let _ = AccessWindow::relocated(0x1000, 0x2000, usize::MAX - 0xFF);
    }

    #[test]
    fn debug_and_fill() {
        let w = AccessWindow::relocated(0x1000, 0x2000, 0x8000).with_fill(0xCC);
        assert_eq!(w.fill(), 0xCC);
        assert_eq!(w.len(), 0x1000);
        assert_eq!(format!("{w:?}"), "AccessWindow[0x1000, 0x2000) at 0x8000");
    }
}
