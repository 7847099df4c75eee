//! A stack-based bytecode interpreter for a small dynamic language.
//!
//! Programs arrive as [`bytecode::Code`] objects (assembled with
//! [`bytecode::CodeBuilder`] or produced by an external compiler) and run
//! inside a [`Runtime`], which owns the heap, the module registry and all
//! interpreter settings. Output goes through a pluggable [`PrintWriter`];
//! errors come back as [`RunError`] with full tracebacks on uncaught
//! exceptions.
//!
//! ```
//! use ophid::bytecode::{CodeBuilder, Opcode};
//! use ophid::{CollectStringPrint, Runtime, Value};
//!
//! let mut b = CodeBuilder::new("<module>");
//! let print = b.name("print");
//! let hello = b.const_str("hello");
//! b.emit_arg(Opcode::LoadName, print);
//! b.emit_arg(Opcode::LoadConst, hello);
//! b.emit_arg(Opcode::CallFunction, 1);
//! b.emit(Opcode::PopTop);
//! let none = b.const_none();
//! b.emit_arg(Opcode::LoadConst, none);
//! b.emit(Opcode::ReturnValue);
//!
//! let mut rt = Runtime::with_print(CollectStringPrint::new());
//! let result = rt.run(b.build()).unwrap();
//! assert_eq!(result, Value::None);
//! assert_eq!(rt.print_writer().output(), "hello\n");
//! ```

pub mod bytecode;

mod builtins;
mod exception;
mod heap;
mod io;
mod runtime;
mod types;
mod value;

pub use builtins::Builtins;
pub use exception::{ExcType, RunError, RunResult, SimpleException, TracebackFrame};
pub use heap::HeapId;
pub use io::{CollectStringPrint, NoPrint, PrintWriter, StdPrint};
pub use runtime::{ImportHook, Runtime};
pub use types::Type;
pub use value::Value;
