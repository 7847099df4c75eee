use std::rc::Rc;

use super::code::{Code, CodeFlags, CodeParts, Const};
use super::op::{CompareOp, Opcode};

/// A forward-referenceable jump target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Label(usize);

#[derive(Debug)]
struct Fixup {
    /// Byte position of the 16-bit operand to patch.
    pos: usize,
    label: Label,
    /// For relative jumps, the offset the operand is measured from.
    relative_from: Option<usize>,
}

/// Assembles a [`Code`] object: emits instructions, interns constants and
/// names, binds labels, and patches jump operands at build time.
///
/// Operands wider than 16 bits get an automatic `ExtendedArg` prefix. Jump
/// targets must resolve to 16-bit offsets; a label bound past that range is a
/// build error.
///
/// This is a producer-side tool — the interpreter itself never assembles
/// code — but the test suite leans on it heavily.
#[derive(Debug)]
pub struct CodeBuilder {
    parts: CodeParts,
    labels: Vec<Option<usize>>,
    fixups: Vec<Fixup>,
    lnotab_addr: u32,
    lnotab_line: u32,
}

impl CodeBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        let parts = CodeParts {
            name: name.into(),
            filename: "<code>".to_string(),
            firstlineno: 1,
            ..CodeParts::default()
        };
        Self {
            lnotab_line: parts.firstlineno,
            parts,
            labels: Vec::new(),
            fixups: Vec::new(),
            lnotab_addr: 0,
        }
    }

    /// Current instruction offset.
    pub fn offset(&self) -> usize {
        self.parts.code.len()
    }

    pub fn add_flag(&mut self, flag: CodeFlags) -> &mut Self {
        self.parts.flags = self.parts.flags.with(flag);
        self
    }

    /// Declares a positional parameter. Parameters are the leading local
    /// variable slots.
    pub fn param(&mut self, name: &str) -> &mut Self {
        debug_assert_eq!(
            self.parts.argcount,
            self.parts.varnames.len(),
            "declare parameters before other locals"
        );
        self.parts.varnames.push(name.to_string());
        self.parts.argcount += 1;
        self
    }

    /// Declares the `*args` parameter slot.
    pub fn varargs(&mut self, name: &str) -> &mut Self {
        self.add_flag(CodeFlags::VARARGS);
        self.parts.varnames.push(name.to_string());
        self
    }

    /// Declares the `**kwargs` parameter slot.
    pub fn varkeywords(&mut self, name: &str) -> &mut Self {
        self.add_flag(CodeFlags::VARKEYWORDS);
        self.parts.varnames.push(name.to_string());
        self
    }

    /// Index of a local variable, declaring it if new.
    pub fn varname(&mut self, name: &str) -> u32 {
        intern(&mut self.parts.varnames, name)
    }

    /// Index into the name table (globals, attributes), interning if new.
    pub fn name(&mut self, name: &str) -> u32 {
        intern(&mut self.parts.names, name)
    }

    /// Index of a cell variable, declaring it if new.
    pub fn cellvar(&mut self, name: &str) -> u32 {
        intern(&mut self.parts.cellvars, name)
    }

    /// Index of a free variable. Free-variable slots follow the cell slots in
    /// `LOAD_DEREF` numbering, so the returned index is offset by the current
    /// cellvar count.
    pub fn freevar(&mut self, name: &str) -> u32 {
        intern(&mut self.parts.freevars, name) + self.parts.cellvars.len() as u32
    }

    pub fn add_const(&mut self, value: Const) -> u32 {
        self.parts.consts.push(value);
        (self.parts.consts.len() - 1) as u32
    }

    pub fn const_none(&mut self) -> u32 {
        self.add_const(Const::None)
    }

    pub fn const_int(&mut self, value: i64) -> u32 {
        self.add_const(Const::Int(value))
    }

    pub fn const_str(&mut self, value: &str) -> u32 {
        self.add_const(Const::Str(value.to_string()))
    }

    pub fn const_code(&mut self, code: Rc<Code>) -> u32 {
        self.add_const(Const::Code(code))
    }

    /// Records that subsequent instructions come from `line`. Appends to the
    /// delta-encoded line table, splitting deltas that overflow a byte.
    pub fn set_line(&mut self, line: u32) {
        let mut addr_delta = self.offset() as u32 - self.lnotab_addr;
        let mut line_delta = line.saturating_sub(self.lnotab_line);
        while addr_delta > 255 {
            self.parts.lnotab.extend_from_slice(&[255, 0]);
            addr_delta -= 255;
        }
        while line_delta > 255 {
            self.parts.lnotab.extend_from_slice(&[addr_delta as u8, 255]);
            addr_delta = 0;
            line_delta -= 255;
        }
        self.parts.lnotab.extend_from_slice(&[addr_delta as u8, line_delta as u8]);
        self.lnotab_addr = self.offset() as u32;
        self.lnotab_line = line;
    }

    /// Emits an operand-less instruction.
    pub fn emit(&mut self, op: Opcode) -> &mut Self {
        debug_assert!(!op.has_arg(), "{op:?} takes an operand");
        self.parts.code.push(op as u8);
        self
    }

    /// Emits an instruction with an operand, prefixing `ExtendedArg` when the
    /// operand exceeds 16 bits.
    pub fn emit_arg(&mut self, op: Opcode, arg: u32) -> &mut Self {
        debug_assert!(op.has_arg(), "{op:?} takes no operand");
        if arg > 0xFFFF {
            self.parts.code.push(Opcode::ExtendedArg as u8);
            self.parts
                .code
                .extend_from_slice(&((arg >> 16) as u16).to_le_bytes());
        }
        self.parts.code.push(op as u8);
        self.parts
            .code
            .extend_from_slice(&(arg as u16).to_le_bytes());
        self
    }

    pub fn emit_compare(&mut self, op: CompareOp) -> &mut Self {
        self.emit_arg(Opcode::CompareOp, op as u32)
    }

    pub fn new_label(&mut self) -> Label {
        self.labels.push(None);
        Label(self.labels.len() - 1)
    }

    /// Binds a label to the current offset.
    pub fn bind(&mut self, label: Label) -> &mut Self {
        debug_assert!(self.labels[label.0].is_none(), "label bound twice");
        self.labels[label.0] = Some(self.offset());
        self
    }

    /// Emits a jump (or block-setup) instruction targeting `label`, patched
    /// at build time.
    pub fn jump(&mut self, op: Opcode, label: Label) -> &mut Self {
        debug_assert!(op.is_relative_jump() || op.is_absolute_jump());
        self.parts.code.push(op as u8);
        let pos = self.parts.code.len();
        self.parts.code.extend_from_slice(&[0, 0]);
        self.fixups.push(Fixup {
            pos,
            label,
            relative_from: op.is_relative_jump().then_some(pos + 2),
        });
        self
    }

    /// Finalizes the code object.
    ///
    /// # Panics
    /// Panics on an unbound label or a jump target that does not fit in a
    /// 16-bit operand; both are producer bugs.
    #[must_use]
    pub fn build(mut self) -> Rc<Code> {
        for fixup in &self.fixups {
            let target = self.labels[fixup.label.0].expect("CodeBuilder::build: unbound label");
            let operand = match fixup.relative_from {
                Some(from) => target
                    .checked_sub(from)
                    .expect("CodeBuilder::build: backward relative jump"),
                None => target,
            };
            let operand =
                u16::try_from(operand).expect("CodeBuilder::build: jump operand exceeds 16 bits");
            self.parts.code[fixup.pos..fixup.pos + 2].copy_from_slice(&operand.to_le_bytes());
        }
        Rc::new(Code::new(self.parts))
    }
}

fn intern(table: &mut Vec<String>, name: &str) -> u32 {
    if let Some(idx) = table.iter().position(|n| n == name) {
        return idx as u32;
    }
    table.push(name.to_string());
    (table.len() - 1) as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_jump_patching() {
        let mut b = CodeBuilder::new("jumps");
        let end = b.new_label();
        b.jump(Opcode::JumpForward, end);
        b.emit(Opcode::Nop);
        b.bind(end);
        let none = b.const_none();
        b.emit_arg(Opcode::LoadConst, none);
        b.emit(Opcode::ReturnValue);
        let code = b.build();
        // JumpForward at 0, operand at 1..3, next instruction at 3, target 4.
        assert_eq!(code.bytes()[0], Opcode::JumpForward as u8);
        assert_eq!(u16::from_le_bytes([code.bytes()[1], code.bytes()[2]]), 1);
    }

    #[test]
    fn test_extended_arg_emission() {
        let mut b = CodeBuilder::new("wide");
        b.emit_arg(Opcode::LoadConst, 0x0001_0002);
        let code = b.build();
        assert_eq!(code.bytes()[0], Opcode::ExtendedArg as u8);
        assert_eq!(u16::from_le_bytes([code.bytes()[1], code.bytes()[2]]), 1);
        assert_eq!(code.bytes()[3], Opcode::LoadConst as u8);
        assert_eq!(u16::from_le_bytes([code.bytes()[4], code.bytes()[5]]), 2);
    }

    #[test]
    fn test_interning_dedupes() {
        let mut b = CodeBuilder::new("names");
        assert_eq!(b.name("x"), 0);
        assert_eq!(b.name("y"), 1);
        assert_eq!(b.name("x"), 0);
        assert_eq!(b.varname("a"), 0);
        assert_eq!(b.varname("a"), 0);
    }

    #[test]
    fn test_line_table() {
        let mut b = CodeBuilder::new("lines");
        b.set_line(1);
        let c = b.const_none();
        b.emit_arg(Opcode::LoadConst, c);
        b.set_line(2);
        b.emit(Opcode::ReturnValue);
        let code = b.build();
        assert_eq!(code.addr_to_line(0), 1);
        assert_eq!(code.addr_to_line(3), 2);
    }
}
