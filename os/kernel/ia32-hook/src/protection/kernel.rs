use crate::{PageProtection, PatchError};
use ia32_paging::{LinearAddress, MemoryPresenceManager, SelfMap};
use log::{debug, trace};

/// Page protection through the live page tables (privileged context).
///
/// Pages made writable stay writable: [`restore`](PageProtection::restore)
/// deliberately does nothing, and the prior state is only reported through
/// [`KernelToken::was_writable`].
pub struct KernelPageProtection<'m, M: SelfMap> {
    manager: &'m MemoryPresenceManager<M>,
}

/// Prior writability of a range made writable by [`KernelPageProtection`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct KernelToken {
    start: LinearAddress,
    length: u32,
    was_writable: bool,
}

impl KernelToken {
    #[must_use]
    pub const fn was_writable(&self) -> bool {
        self.was_writable
    }
}

impl<'m, M: SelfMap> KernelPageProtection<'m, M> {
    #[must_use]
    pub const fn new(manager: &'m MemoryPresenceManager<M>) -> Self {
        Self { manager }
    }

    fn linear_range(address: usize, length: usize) -> Result<(LinearAddress, u32), PatchError> {
        let start =
            LinearAddress::try_from(address).map_err(|_| PatchError::AddressNotLinear { address })?;
        let length = u32::try_from(length).map_err(|_| PatchError::AddressNotLinear { address })?;
        Ok((start, length))
    }
}

impl<M: SelfMap> PageProtection for KernelPageProtection<'_, M> {
    type Token = KernelToken;

    fn make_writable(&self, address: usize, length: usize) -> Result<KernelToken, PatchError> {
        let (start, length) = Self::linear_range(address, length)?;
        let was_writable = self.manager.is_range_writable(start, length);
        if !was_writable {
            if !self.manager.make_range_writable(start, length) {
                return Err(PatchError::PageAbsent { address });
            }
            debug!("made {start}+{length:#x} writable");
        }
        Ok(KernelToken {
            start,
            length,
            was_writable,
        })
    }

    fn was_writable(token: &KernelToken) -> bool {
        token.was_writable
    }

    fn restore(&self, token: KernelToken) {
        // Protection is not reverted in the privileged path.
        trace!(
            "leaving {}+{:#x} writable (was writable: {})",
            token.start, token.length, token.was_writable
        );
    }

    /// Non-PAE paging has no execute-disable bit; present pages are executable.
    fn make_executable(&self, address: usize, length: usize) -> Result<(), PatchError> {
        let (start, length) = Self::linear_range(address, length)?;
        if self.manager.is_range_present(start, length) {
            Ok(())
        } else {
            Err(PatchError::PageAbsent { address })
        }
    }
}
