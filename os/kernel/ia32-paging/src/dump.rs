//! Human-readable rendering of paging entries (feature `diagnostics`).

use crate::{DescriptorSlot, Level, PageDescriptor};
use core::fmt;

/// Formats one entry as, e.g., `PDE W U PS frame=0x00400` or `PTE absent raw=0x00000000`.
///
/// Purely informational; reading the entry has no side effects.
#[derive(Copy, Clone)]
pub struct DescriptorDump {
    descriptor: PageDescriptor,
    level: Level,
}

impl DescriptorDump {
    #[must_use]
    pub const fn new(descriptor: PageDescriptor, level: Level) -> Self {
        Self { descriptor, level }
    }
}

impl fmt::Display for DescriptorDump {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = self.descriptor;
        f.write_str(match self.level {
            Level::Directory => "PDE",
            Level::Table => "PTE",
        })?;
        if !d.present() {
            return write!(f, " absent raw=0x{:08X}", d.into_bits());
        }
        f.write_str(if d.writable() { " W" } else { " R" })?;
        f.write_str(if d.user_access() { " U" } else { " S" })?;
        if self.level == Level::Directory && d.large_page() {
            f.write_str(" PS")?;
        }
        write!(f, " frame=0x{:05X}", d.frame())
    }
}

impl DescriptorSlot<'_> {
    /// Render the current value of this entry into `out`.
    ///
    /// # Errors
    /// Propagates errors from `out`.
    pub fn dump(self, out: &mut impl fmt::Write) -> fmt::Result {
        writeln!(out, "{}", DescriptorDump::new(self.load(), self.level()))
    }
}
