/// Errors raised while installing or removing an inline hook.
#[derive(Debug, Copy, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    #[error("target function address is null")]
    NullTarget,

    /// The patched region must hold at least one jump instruction.
    #[error("patch boundary of {length} bytes is shorter than the {minimum}-byte jump")]
    BoundaryTooShort { length: usize, minimum: usize },

    /// The bytes at the target differ from the expected original bytes; the
    /// function is already patched or the expectation is wrong.
    #[error(
        "target byte {offset} is {found:#04x}, expected {expected:#04x}; refusing to patch"
    )]
    VerificationMismatch {
        offset: usize,
        expected: u8,
        found: u8,
    },

    /// Hooking with a context object (member-function callbacks) is not implemented.
    #[error("member-function callbacks with a context object are not supported")]
    MemberCallbackUnsupported,

    #[error("page at {address:#x} is not present")]
    PageAbsent { address: usize },

    /// The address or length cannot be expressed in the 32-bit linear space.
    #[error("{address:#x} is outside the 32-bit linear address space")]
    AddressNotLinear { address: usize },

    /// The operating system refused a protection change.
    #[error("changing protection of {length} bytes at {address:#x} failed with code {code}")]
    ProtectionFailed {
        address: usize,
        length: usize,
        code: i32,
    },

    /// Another install on the same target is running concurrently.
    #[error(transparent)]
    Busy(#[from] ia32_sync::SyncError),
}

impl PatchError {
    /// Stable numeric identifier for callers that report failures by code.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::NullTarget => 0x0101,
            Self::BoundaryTooShort { .. } => 0x0102,
            Self::VerificationMismatch { .. } => 0x0103,
            Self::MemberCallbackUnsupported => 0x0104,
            Self::PageAbsent { .. } => 0x0105,
            Self::AddressNotLinear { .. } => 0x0106,
            Self::ProtectionFailed { .. } => 0x0107,
            Self::Busy(_) => 0x0108,
        }
    }
}
