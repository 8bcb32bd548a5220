//! Instruction interpreter
//!
//! Executes one instruction against one heap and says where the resulting
//! heaps go. Calls of defined functions are not followed here: the
//! interpreter binds the arguments and hands a [`PendingCall`] back to the
//! scheduler, which consults the call cache.
//!
//! ```text
//! prepare(heap, insn)     concretize segments the instruction reaches into
//!   └─ exec(heap, insn)   Next | Jump | Return | Stop | Call
//! ```

mod branch;
pub mod builtins;
pub mod compare;
mod frame;
pub mod interpreter;
mod operands;

pub use builtins::Builtin;
pub use interpreter::{Interpreter, PendingCall, StepResult};
pub use operands::Place;
