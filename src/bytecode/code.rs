use std::rc::Rc;

use num_bigint::BigInt;

use crate::heap::{Heap, HeapData};
use crate::types::{demote, Bytes, Complex, Str, Tuple};
use crate::value::Value;

/// A literal in a code object's constant pool.
///
/// Constants are plain data, not runtime values: `LOAD_CONST` realizes them
/// into `Value`s (allocating on the heap where needed) each time, which keeps
/// `Code` immutable and shareable across frames and runtimes.
#[derive(Debug, Clone)]
pub enum Const {
    None,
    Ellipsis,
    Bool(bool),
    Int(i64),
    Long(BigInt),
    Float(f64),
    Complex(f64, f64),
    Str(String),
    Bytes(Vec<u8>),
    Tuple(Vec<Const>),
    Code(Rc<Code>),
}

impl Const {
    pub(crate) fn to_value(&self, heap: &mut Heap) -> Value {
        match self {
            Self::None => Value::None,
            Self::Ellipsis => Value::Ellipsis,
            Self::Bool(b) => Value::Bool(*b),
            Self::Int(i) => Value::Int(*i),
            Self::Long(big) => demote(big.clone(), heap),
            Self::Float(f) => Value::Float(*f),
            Self::Complex(re, im) => {
                Value::Ref(heap.allocate(HeapData::Complex(Complex::new(*re, *im))))
            }
            Self::Str(s) => Value::Ref(heap.allocate(HeapData::Str(Str::from(s.as_str())))),
            Self::Bytes(b) => Value::Ref(heap.allocate(HeapData::Bytes(Bytes::new(b.clone())))),
            Self::Tuple(items) => {
                let values: Vec<Value> = items.iter().map(|c| c.to_value(heap)).collect();
                Value::Ref(heap.allocate(HeapData::Tuple(Tuple::new(values))))
            }
            Self::Code(code) => Value::Ref(heap.allocate(HeapData::Function(
                crate::types::Function::new(code.clone(), Vec::new(), Vec::new(), None),
            ))),
        }
    }
}

/// Code-object flag bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeFlags(u32);

impl CodeFlags {
    /// The code body contains `YIELD_VALUE`; calling it creates a generator.
    pub const GENERATOR: CodeFlags = CodeFlags(1 << 0);
    /// A `*args` parameter follows the fixed parameters.
    pub const VARARGS: CodeFlags = CodeFlags(1 << 1);
    /// A `**kwargs` parameter follows everything else.
    pub const VARKEYWORDS: CodeFlags = CodeFlags(1 << 2);
    /// `BINARY_DIVIDE` performs true division in this code object.
    pub const FUTURE_DIVISION: CodeFlags = CodeFlags(1 << 3);
    /// Calls get a fresh locals array (function bodies, as opposed to
    /// module-level code which binds names in its globals dict).
    pub const NEWLOCALS: CodeFlags = CodeFlags(1 << 4);

    pub fn contains(self, flag: CodeFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[must_use]
    pub fn with(self, flag: CodeFlags) -> Self {
        Self(self.0 | flag.0)
    }
}

/// The raw pieces of a compiled unit, as delivered by an external compiler.
#[derive(Debug, Clone, Default)]
pub struct CodeParts {
    pub name: String,
    pub filename: String,
    pub firstlineno: u32,
    pub argcount: usize,
    pub flags: CodeFlags,
    /// Local variable names; the first `argcount` are the parameters,
    /// followed by the `*args` name (if VARARGS) and the `**kwargs` name
    /// (if VARKEYWORDS).
    pub varnames: Vec<String>,
    pub cellvars: Vec<String>,
    pub freevars: Vec<String>,
    pub names: Vec<String>,
    pub consts: Vec<Const>,
    pub code: Vec<u8>,
    /// Delta-encoded line table: `(instruction delta, line delta)` byte
    /// pairs, cumulative from `(0, firstlineno)`.
    pub lnotab: Vec<u8>,
    pub stacksize: usize,
}

/// An immutable compiled unit: instructions plus the metadata needed to
/// execute them. Built once, shared read-only by every frame over it.
#[derive(Debug)]
pub struct Code {
    parts: CodeParts,
    /// Decoded line table: `(instruction offset, line)` pairs, ascending by
    /// offset. Queried by binary search in [`Code::addr_to_line`].
    lines: Vec<(u32, u32)>,
}

impl Code {
    pub fn new(parts: CodeParts) -> Self {
        let mut lines = Vec::with_capacity(parts.lnotab.len() / 2);
        let mut addr = 0u32;
        let mut line = parts.firstlineno;
        for pair in parts.lnotab.chunks_exact(2) {
            addr += u32::from(pair[0]);
            line += u32::from(pair[1]);
            lines.push((addr, line));
        }
        Self { parts, lines }
    }

    pub fn name(&self) -> &str {
        &self.parts.name
    }

    pub fn filename(&self) -> &str {
        &self.parts.filename
    }

    pub fn argcount(&self) -> usize {
        self.parts.argcount
    }

    pub fn flags(&self) -> CodeFlags {
        self.parts.flags
    }

    pub(crate) fn varnames(&self) -> &[String] {
        &self.parts.varnames
    }

    pub(crate) fn cellvars(&self) -> &[String] {
        &self.parts.cellvars
    }

    pub(crate) fn freevars(&self) -> &[String] {
        &self.parts.freevars
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.parts.names
    }

    pub(crate) fn consts(&self) -> &[Const] {
        &self.parts.consts
    }

    pub(crate) fn bytes(&self) -> &[u8] {
        &self.parts.code
    }

    pub fn stacksize(&self) -> usize {
        self.parts.stacksize
    }

    /// The source line active at an instruction offset, for diagnostics.
    pub fn addr_to_line(&self, addr: usize) -> u32 {
        let addr = addr as u32;
        let idx = self.lines.partition_point(|&(a, _)| a <= addr);
        if idx == 0 {
            self.parts.firstlineno
        } else {
            self.lines[idx - 1].1
        }
    }
}
