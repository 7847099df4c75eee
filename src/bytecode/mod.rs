//! Code objects, frames and the interpreter loop.
//!
//! [`CodeBuilder`] assembles a [`Code`] object; the runtime executes it over a
//! frame in the vm submodule.

mod builder;
mod code;
mod frame;
mod op;
mod vm;

pub use builder::{CodeBuilder, Label};
pub use code::{Code, CodeFlags, CodeParts, Const};
pub use frame::Why;
pub(crate) use frame::Frame;
pub use op::{CompareOp, InvalidOpcodeError, Opcode};
pub(crate) use vm::{Exit, Resume, Vm};
