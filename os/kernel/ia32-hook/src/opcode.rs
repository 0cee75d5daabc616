//! Encoding of the single instruction the patcher emits: `jmp rel32`.
//!
//! ```text
//! E9 dd dd dd dd        jmp target     ; dd = target - (address + 5), little endian
//! ```
//!
//! The displacement is relative to the end of the instruction. In a 32-bit
//! address space every target is reachable, the arithmetic wraps modulo 2³².

/// Opcode of `jmp rel32`.
pub const JMP_REL32: u8 = 0xE9;

/// Length of an encoded `jmp rel32`.
pub const JUMP_LEN: usize = 5;

/// Single-byte `nop`.
pub const NOP: u8 = 0x90;

/// Encode a jump located at `at` that transfers control to `target`.
#[inline]
pub fn encode_jump_at(buffer: &mut [u8; JUMP_LEN], at: usize, target: usize) {
    let end = at.wrapping_add(JUMP_LEN);
    #[allow(clippy::cast_possible_truncation)]
    let displacement = target.wrapping_sub(end) as u32;
    buffer[0] = JMP_REL32;
    buffer[1..].copy_from_slice(&displacement.to_le_bytes());
}

/// Encode a jump to `target` that will execute from `buffer`'s own address.
#[inline]
pub fn encode_jump(buffer: &mut [u8; JUMP_LEN], target: usize) {
    let at = buffer.as_ptr().addr();
    encode_jump_at(buffer, at, target);
}

/// Decode a `jmp rel32` located at `at`, returning its target.
///
/// `None` if `bytes` does not start with a complete `jmp rel32`.
#[must_use]
pub fn decode_jump(bytes: &[u8], at: usize) -> Option<usize> {
    let [JMP_REL32, d0, d1, d2, d3, ..] = *bytes else {
        return None;
    };
    let displacement = i32::from_le_bytes([d0, d1, d2, d3]);
    Some(
        at.wrapping_add(JUMP_LEN)
            .wrapping_add_signed(displacement as isize),
    )
}
