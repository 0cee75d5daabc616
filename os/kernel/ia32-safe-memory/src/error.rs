#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessError {
    /// The access, in caller addresses, leaves the accessor's window.
    #[error("{length} bytes at {address:#x} are outside the access window")]
    OutOfRange { address: usize, length: usize },
}

impl AccessError {
    /// Stable numeric identifier for callers that report failures by code.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::OutOfRange { .. } => 0x0401,
        }
    }
}
