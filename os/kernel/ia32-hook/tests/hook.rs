use ia32_hook::opcode::{JUMP_LEN, decode_jump};
use ia32_hook::{Callback, InlineHook, PageProtection, PatchError};
use std::cell::{Cell, RefCell};
use std::ptr::NonNull;

/// push ebp; mov ebp, esp; sub esp, 0x10
const PROLOGUE: [u8; 6] = [0x55, 0x8B, 0xEC, 0x83, 0xEC, 0x10];

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Writable(usize, usize),
    Restore(usize, usize),
    Executable(usize, usize),
}

#[derive(Default)]
struct RecordingProtection {
    calls: RefCell<Vec<Call>>,
    was_writable: bool,
}

impl RecordingProtection {
    fn calls(&self) -> Vec<Call> {
        self.calls.borrow().clone()
    }
}

impl PageProtection for RecordingProtection {
    type Token = (usize, usize, bool);

    fn make_writable(&self, address: usize, length: usize) -> Result<Self::Token, PatchError> {
        self.calls.borrow_mut().push(Call::Writable(address, length));
        Ok((address, length, self.was_writable))
    }

    fn was_writable(token: &Self::Token) -> bool {
        token.2
    }

    fn restore(&self, (address, length, _): Self::Token) {
        self.calls.borrow_mut().push(Call::Restore(address, length));
    }

    fn make_executable(&self, address: usize, length: usize) -> Result<(), PatchError> {
        self.calls.borrow_mut().push(Call::Executable(address, length));
        Ok(())
    }
}

/// A fake function body: the prologue followed by `ret`.
fn function() -> Box<[u8]> {
    let mut code = PROLOGUE.to_vec();
    code.push(0xC3);
    code.into_boxed_slice()
}

#[allow(clippy::cast_possible_truncation)]
fn target_of(bytes: &[u8], at: usize) -> u32 {
    decode_jump(bytes, at).unwrap() as u32
}

#[test]
fn install_then_remove_restores_entry_bytes() {
    let mut code = function();
    let before = code.clone();
    let protection = RecordingProtection::default();

    let hook = unsafe {
        InlineHook::install(code.as_mut_ptr(), &PROLOGUE, Callback::function(0x0050_0000), &protection)
    }
    .unwrap();
    assert_ne!(code, before);
    assert_eq!(target_of(&code, code.as_ptr().addr()), 0x0050_0000);

    hook.remove().unwrap();
    assert_eq!(code, before);
}

#[test]
fn trampoline_replays_prologue_and_resumes_after_it() {
    let mut code = function();
    let target = code.as_ptr().addr();
    let protection = RecordingProtection::default();

    let hook = unsafe {
        InlineHook::install(code.as_mut_ptr(), &PROLOGUE, Callback::function(0x0050_0000), &protection)
    }
    .unwrap();

    let trampoline = hook.trampoline().as_bytes();
    assert_eq!(hook.trampoline_entry(), trampoline.as_ptr().addr());
    assert_eq!(trampoline.len(), PROLOGUE.len() + JUMP_LEN);
    assert_eq!(&trampoline[..PROLOGUE.len()], &PROLOGUE);

    let jump_at = hook.trampoline_entry() + PROLOGUE.len();
    #[allow(clippy::cast_possible_truncation)]
    let resume = (target + PROLOGUE.len()) as u32;
    assert_eq!(target_of(&trampoline[PROLOGUE.len()..], jump_at), resume);

    assert_eq!(hook.target(), target);
    assert_eq!(hook.original_bytes(), PROLOGUE);
    assert_eq!(hook.callback(), Callback::function(0x0050_0000));
}

#[test]
fn protection_is_requested_around_each_write() {
    let mut code = function();
    let target = code.as_ptr().addr();
    let protection = RecordingProtection {
        was_writable: true,
        ..RecordingProtection::default()
    };

    let hook = unsafe {
        InlineHook::install(code.as_mut_ptr(), &PROLOGUE, Callback::function(0x0050_0000), &protection)
    }
    .unwrap();
    assert!(hook.page_was_writable());
    let trampoline = (hook.trampoline_entry(), hook.trampoline().len());
    hook.remove().unwrap();

    assert_eq!(
        protection.calls(),
        [
            Call::Executable(trampoline.0, trampoline.1),
            Call::Writable(target, PROLOGUE.len()),
            Call::Restore(target, PROLOGUE.len()),
            Call::Writable(target, PROLOGUE.len()),
            Call::Restore(target, PROLOGUE.len()),
        ]
    );
}

#[test]
fn mismatching_bytes_are_refused_without_mutation() {
    let mut code = function();
    code[3] = 0x90;
    let before = code.clone();
    let protection = RecordingProtection::default();

    let err = unsafe {
        InlineHook::install(code.as_mut_ptr(), &PROLOGUE, Callback::function(0x0050_0000), &protection)
    }
    .err()
    .unwrap();

    assert_eq!(
        err,
        PatchError::VerificationMismatch {
            offset: 3,
            expected: 0x83,
            found: 0x90
        }
    );
    assert_eq!(err.code(), 0x0103);
    assert_eq!(code, before);
    assert!(protection.calls().is_empty());
}

#[test]
fn second_hook_on_same_target_is_refused() {
    let mut code = function();
    let protection = RecordingProtection::default();

    let first = unsafe {
        InlineHook::install(code.as_mut_ptr(), &PROLOGUE, Callback::function(0x0050_0000), &protection)
    }
    .unwrap();
    let second = unsafe {
        InlineHook::install(code.as_mut_ptr(), &PROLOGUE, Callback::function(0x0060_0000), &protection)
    };
    assert!(matches!(
        second.err(),
        Some(PatchError::VerificationMismatch { offset: 0, found: 0xE9, .. })
    ));

    drop(first);
    assert_eq!(&code[..PROLOGUE.len()], &PROLOGUE);
}

#[test]
fn boundary_shorter_than_a_jump_is_refused() {
    let mut code = function();
    let protection = RecordingProtection::default();

    let err = unsafe {
        InlineHook::install(code.as_mut_ptr(), &PROLOGUE[..4], Callback::function(0x0050_0000), &protection)
    }
    .err()
    .unwrap();
    assert_eq!(
        err,
        PatchError::BoundaryTooShort {
            length: 4,
            minimum: JUMP_LEN
        }
    );
}

#[test]
fn null_target_is_refused() {
    let protection = RecordingProtection::default();
    let err = unsafe {
        InlineHook::install(std::ptr::null_mut(), &PROLOGUE, Callback::function(0x0050_0000), &protection)
    }
    .err()
    .unwrap();
    assert_eq!(err, PatchError::NullTarget);
}

#[test]
fn member_callbacks_always_fail() {
    let mut code = function();
    let before = code.clone();
    let mut context = 0u32;
    let callback = Callback::method(0x0050_0000, NonNull::from(&mut context).cast());
    let protection = RecordingProtection::default();

    let err = unsafe { InlineHook::install(code.as_mut_ptr(), &PROLOGUE, callback, &protection) }
        .err()
        .unwrap();
    assert_eq!(err, PatchError::MemberCallbackUnsupported);
    assert_eq!(code, before);
    assert!(protection.calls().is_empty());
}

#[test]
fn protection_failure_leaves_target_unpatched() {
    struct Refusing;

    impl PageProtection for Refusing {
        type Token = ();

        fn make_writable(&self, address: usize, length: usize) -> Result<(), PatchError> {
            Err(PatchError::ProtectionFailed {
                address,
                length,
                code: 13,
            })
        }

        fn was_writable((): &()) -> bool {
            false
        }

        fn restore(&self, (): ()) {}

        fn make_executable(&self, _: usize, _: usize) -> Result<(), PatchError> {
            Ok(())
        }
    }

    let mut code = function();
    let before = code.clone();
    let err = unsafe {
        InlineHook::install(code.as_mut_ptr(), &PROLOGUE, Callback::function(0x0050_0000), Refusing)
    }
    .err()
    .unwrap();
    assert_eq!(err.code(), 0x0107);
    assert_eq!(code, before);
}

#[test]
fn failed_removal_keeps_trampoline_alive() {
    /// Grants the install write, then refuses every later one.
    #[derive(Default)]
    struct GrantOnce {
        granted: Cell<bool>,
    }

    impl PageProtection for GrantOnce {
        type Token = ();

        fn make_writable(&self, address: usize, length: usize) -> Result<(), PatchError> {
            if self.granted.replace(true) {
                return Err(PatchError::ProtectionFailed {
                    address,
                    length,
                    code: 1,
                });
            }
            Ok(())
        }

        fn was_writable((): &()) -> bool {
            false
        }

        fn restore(&self, (): ()) {}

        fn make_executable(&self, _: usize, _: usize) -> Result<(), PatchError> {
            Ok(())
        }
    }

    let mut code = function();
    let protection = GrantOnce::default();
    let hook = unsafe {
        InlineHook::install(code.as_mut_ptr(), &PROLOGUE, Callback::function(0x0050_0000), &protection)
    }
    .unwrap();
    let entry = hook.trampoline_entry();
    let len = hook.trampoline().len();

    let err = hook.remove().unwrap_err();
    assert_eq!(err.code(), 0x0107);
    assert_eq!(code[0], 0xE9);

    // The entry still jumps to the callback, which may call the trampoline.
    let trampoline = unsafe { std::slice::from_raw_parts(entry as *const u8, len) };
    assert_eq!(&trampoline[..PROLOGUE.len()], &PROLOGUE);
}
