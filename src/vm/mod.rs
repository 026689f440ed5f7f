pub mod block;
pub mod environment;
pub mod errors;
pub mod frame;
pub mod machine;
pub mod opcode;
pub mod stack;
pub mod value;

pub use block::{Block, BlockRef, BlockStore};
pub use errors::{VMError, VMResult};
pub use frame::CallFrame;
pub use machine::{StepResult, Vm};
pub use opcode::Instruction;
pub use value::Value;