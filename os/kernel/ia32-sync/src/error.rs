use crate::RegionId;

#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SyncError {
    /// A guard for this region is already alive.
    #[error("region {region} is already locked")]
    Reentered { region: RegionId },
}

impl SyncError {
    /// Stable numeric identifier for callers that report failures by code.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::Reentered { .. } => 0x0201,
        }
    }
}
