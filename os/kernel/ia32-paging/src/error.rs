use crate::LinearAddress;

/// Errors raised by the page-table walker.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PagingError {
    /// A page-table entry was requested for an address whose page-directory
    /// entry maps a 4 MiB page; there is no second level to walk.
    #[error("{address} is mapped by a 4 MiB page; no page-table entry exists")]
    LargePageTableLookup { address: LinearAddress },
}

impl PagingError {
    /// Stable numeric identifier for callers that report failures by code.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::LargePageTableLookup { .. } => 0x0301,
        }
    }
}
