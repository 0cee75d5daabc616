use crate::opcode::{JUMP_LEN, encode_jump};
use alloc::boxed::Box;
use alloc::vec;

/// Copied prologue bytes followed by a jump back into the original function.
///
/// Calling [`entry`](Self::entry) behaves like the unpatched function: the
/// overwritten instructions run from the copy, then control resumes right
/// after them in the original. The copied bytes are executed at a different
/// address, so they must not contain relative branches or calls.
pub struct Trampoline {
    code: Box<[u8]>,
}

impl Trampoline {
    /// Build `prologue ++ jmp resume_at`.
    #[must_use]
    pub fn build(prologue: &[u8], resume_at: usize) -> Self {
        let mut code = vec![0u8; prologue.len() + JUMP_LEN].into_boxed_slice();
        let (head, tail) = code.split_at_mut(prologue.len());
        head.copy_from_slice(prologue);
        if let Ok(tail) = <&mut [u8; JUMP_LEN]>::try_from(tail) {
            // The boxed bytes never move, so the jump is encoded at its final address.
            encode_jump(tail, resume_at);
        }
        Self { code }
    }

    /// Address to call to reach the original behaviour.
    #[inline]
    #[must_use]
    pub fn entry(&self) -> usize {
        self.code.as_ptr().addr()
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.code
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}
