//! Call frame. One per active invocation: which block it's executing,
//! where its program counter is, which environment node it resolves/creates
//! bindings against, and — if it was entered via `POP_AND_CALL_FUNCTION` on a
//! user function — the `Function` it was entered from (`THIS_FUNCTION`'s
//! source, and what's absent at top level).

use crate::gc::{EnvHandle, FuncHandle};
use crate::vm::block::BlockRef;

#[derive(Debug, Clone)]
pub struct CallFrame {
    pub block: BlockRef,
    pub pc: usize,
    pub env: EnvHandle,
    /// `None` for the top-level frame and any frame entered by `SWITCH`ing
    /// in a fresh file-scope call; `Some` for a frame entered by calling a
    /// user `Function` value.
    pub origin: Option<FuncHandle>,
}

impl CallFrame {
    pub fn new(block: BlockRef, env: EnvHandle, origin: Option<FuncHandle>) -> Self {
        CallFrame {
            block,
            pc: 0,
            env,
            origin,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_fresh_frame_starts_at_instruction_zero() {
        let frame = CallFrame::new(BlockRef::TOP_LEVEL, any_env_handle(), None);
        assert_eq!(frame.pc, 0);
        assert!(frame.origin.is_none());
    }

    // CallFrame doesn't own a Heap, so tests here just need *some* EnvHandle;
    // the real chain-building/validity tests live in gc::heap and
    // vm::environment.
    fn any_env_handle() -> EnvHandle {
        let mut heap = crate::gc::Heap::new();
        heap.alloc_environment(None)
    }
}
