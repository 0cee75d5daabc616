use crate::{SpinMutex, SyncError};
use alloc::vec::Vec;
use core::fmt;
use log::{debug, trace};

/// Regions currently held by a live [`ReentrancyGuard`].
///
/// Process-wide and empty at start; entries are removed by the guard's `Drop`.
static ACTIVE_REGIONS: SpinMutex<Vec<RegionId>> = SpinMutex::new(Vec::new());

/// Identifies a guarded region by a pair of caller-chosen values
/// (e.g. an object address and a method id).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct RegionId {
    pub id1: usize,
    pub id2: usize,
}

impl RegionId {
    #[must_use]
    pub const fn new(id1: usize, id2: usize) -> Self {
        Self { id1, id2 }
    }
}

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:#x}, {:#x})", self.id1, self.id2)
    }
}

/// Marks a region as entered for the guard's lifetime.
///
/// A second guard for the same region is refused while the first is alive;
/// nothing ever waits for the region to become free.
#[derive(Debug)]
pub struct ReentrancyGuard {
    region: RegionId,
}

impl ReentrancyGuard {
    /// Enter region `(id1, id2)`, or call `on_reentry` if it is already held.
    ///
    /// `on_reentry` runs after the registry lock is released.
    ///
    /// # Errors
    /// Whatever `on_reentry` returns, when the region is already held.
    pub fn enter<E>(
        id1: usize,
        id2: usize,
        on_reentry: impl FnOnce(RegionId) -> E,
    ) -> Result<Self, E> {
        let region = RegionId::new(id1, id2);
        let registered = ACTIVE_REGIONS.with_lock(|active| {
            if active.contains(&region) {
                false
            } else {
                active.push(region);
                true
            }
        });

        if registered {
            trace!("entered region {region}");
            Ok(Self { region })
        } else {
            debug!("refused re-entry into region {region}");
            Err(on_reentry(region))
        }
    }

    /// Enter region `(id1, id2)`.
    ///
    /// # Errors
    /// [`SyncError::Reentered`] if a guard for the region is alive.
    pub fn try_enter(id1: usize, id2: usize) -> Result<Self, SyncError> {
        Self::enter(id1, id2, |region| SyncError::Reentered { region })
    }

    #[must_use]
    pub const fn region(&self) -> RegionId {
        self.region
    }

    /// Whether a guard for `(id1, id2)` is currently alive.
    #[must_use]
    pub fn is_entered(id1: usize, id2: usize) -> bool {
        let region = RegionId::new(id1, id2);
        ACTIVE_REGIONS.with_lock(|active| active.contains(&region))
    }
}

impl Drop for ReentrancyGuard {
    fn drop(&mut self) {
        let region = self.region;
        ACTIVE_REGIONS.with_lock(|active| {
            if let Some(i) = active.iter().position(|r| *r == region) {
                active.swap_remove(i);
            }
        });
        trace!("left region {region}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Each test uses its own ids; the registry is shared by the test threads.

    #[test]
    fn guard_releases_region_on_drop() {
        {
            let g = ReentrancyGuard::try_enter(0x100, 1).unwrap();
            assert_eq!(g.region(), RegionId::new(0x100, 1));
            assert!(ReentrancyGuard::is_entered(0x100, 1));
        }
        assert!(!ReentrancyGuard::is_entered(0x100, 1));
        assert!(ReentrancyGuard::try_enter(0x100, 1).is_ok());
    }

    #[test]
    fn failure_callback_receives_region() {
        let _g = ReentrancyGuard::try_enter(0x200, 9).unwrap();
        let err = ReentrancyGuard::enter(0x200, 9, |region| region).unwrap_err();
        assert_eq!(err, RegionId::new(0x200, 9));
    }

    #[test]
    fn error_displays_region() {
        let _g = ReentrancyGuard::try_enter(0x300, 0x10).unwrap();
        let err = ReentrancyGuard::try_enter(0x300, 0x10).unwrap_err();
        assert_eq!(err.to_string(), "region (0x300, 0x10) is already locked");
        assert_eq!(err.code(), 0x0201);
    }
}
