use std::rc::Rc;

use crate::exception::{RunError, RunResult};
use crate::heap::{Heap, HeapData, HeapId};
use crate::value::Value;

use super::code::Code;

/// Static limit on nested blocks, matching the fixed-size block stack of the
/// bytecode format this interpreter executes.
const MAXBLOCKS: usize = 20;

/// Reason the interpreter loop is unwinding (or not).
///
/// `Not` is the steady state. Anything else makes the loop pop blocks until a
/// handler takes over or the frame exits. `END_FINALLY` re-materializes a
/// pending reason from the [`Value::Why`] sentinel a `finally` body preserved
/// on the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Why {
    Not,
    Exception,
    /// Re-raise the exception restored by `END_FINALLY`, skipping the traceback
    /// push a fresh raise would do.
    Reraise,
    Return,
    Break,
    Continue,
    Yield,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BlockKind {
    Loop,
    Except,
    Finally,
}

/// One entry of a frame's block stack, recording where to jump and how far to
/// cut the value stack when the block unwinds.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Block {
    pub kind: BlockKind,
    /// Instruction offset of the handler (loop exit, except body, finally
    /// body).
    pub handler: usize,
    /// Value-stack depth at block entry; unwinding truncates to this.
    pub level: usize,
}

/// Execution state of one code object: instruction cursor, local slots, cell
/// references, the value stack and the block stack.
///
/// Frames are plain data so a generator can box one up between resumes; the
/// interpreter loop in the vm module does all the work.
#[derive(Debug)]
pub(crate) struct Frame {
    pub code: Rc<Code>,
    /// Offset of the next instruction to fetch.
    pub lasti: usize,
    /// Local variable slots, `Undefined` until first store.
    pub locals: Vec<Value>,
    /// Cell slots: the code's cellvars (freshly allocated per call) followed
    /// by its freevars (shared with the defining scope via the closure).
    pub cells: Vec<HeapId>,
    /// The module globals dict backing `LOAD_GLOBAL`/`STORE_GLOBAL`.
    pub globals: HeapId,
    pub stack: Vec<Value>,
    pub blocks: Vec<Block>,
}

impl Frame {
    /// Creates a frame over `code` with every local unbound. `closure` supplies
    /// the freevar cells; cellvars get fresh empty cells.
    pub fn new(code: Rc<Code>, globals: HeapId, closure: &[HeapId], heap: &mut Heap) -> Self {
        let locals = vec![Value::Undefined; code.varnames().len()];
        let mut cells = Vec::with_capacity(code.cellvars().len() + closure.len());
        for _ in code.cellvars() {
            cells.push(heap.allocate(HeapData::Cell(Value::Undefined)));
        }
        cells.extend_from_slice(closure);
        Self {
            code,
            lasti: 0,
            locals,
            cells,
            globals,
            stack: Vec::new(),
            blocks: Vec::new(),
        }
    }

    /// Moves parameter values into their cells for parameters that are also
    /// cell variables (captured by a nested function). Call after binding
    /// arguments into the local slots.
    pub fn promote_cell_params(&mut self, heap: &mut Heap) {
        for (ci, name) in self.code.cellvars().iter().enumerate() {
            if let Some(slot) = self.code.varnames().iter().position(|v| v == name) {
                let value = std::mem::replace(&mut self.locals[slot], Value::Undefined);
                if value != Value::Undefined {
                    *heap.get_mut(self.cells[ci]) = HeapData::Cell(value);
                }
            }
        }
    }

    pub fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    /// Pops the top of the value stack. Underflow is a compiler or interpreter
    /// bug, surfaced as an internal error rather than a panic so the embedder
    /// sees a report.
    pub fn pop(&mut self) -> RunResult<Value> {
        self.stack
            .pop()
            .ok_or_else(|| RunError::internal("value stack underflow"))
    }

    /// A reference `depth` entries down from the top, `peek(0)` being the top.
    pub fn peek(&self, depth: usize) -> RunResult<&Value> {
        let len = self.stack.len();
        len.checked_sub(depth + 1)
            .map(|i| &self.stack[i])
            .ok_or_else(|| RunError::internal("value stack underflow"))
    }

    pub fn push_block(&mut self, kind: BlockKind, handler: usize) -> RunResult<()> {
        if self.blocks.len() >= MAXBLOCKS {
            return Err(RunError::internal("too many statically nested blocks"));
        }
        self.blocks.push(Block {
            kind,
            handler,
            level: self.stack.len(),
        });
        Ok(())
    }

    pub fn pop_block(&mut self) -> RunResult<Block> {
        self.blocks
            .pop()
            .ok_or_else(|| RunError::internal("block stack underflow"))
    }

    /// Heap ids this frame keeps alive, for the collector. Suspended generator
    /// frames are traced through here.
    pub fn trace(&self, out: &mut Vec<HeapId>) {
        out.extend(self.locals.iter().filter_map(Value::heap_id));
        out.extend(self.stack.iter().filter_map(Value::heap_id));
        out.extend_from_slice(&self.cells);
        out.push(self.globals);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::CodeBuilder;
    use crate::types::Dict;

    fn empty_frame(heap: &mut Heap) -> Frame {
        let code = CodeBuilder::new("f").build();
        let globals = heap.allocate(HeapData::Dict(Dict::new()));
        Frame::new(code, globals, &[], heap)
    }

    #[test]
    fn test_stack_underflow_is_internal() {
        let mut heap = Heap::new();
        let mut frame = empty_frame(&mut heap);
        assert!(matches!(frame.pop(), Err(RunError::Internal(_))));
        frame.push(Value::Int(1));
        assert_eq!(frame.peek(0).unwrap(), &Value::Int(1));
        assert!(frame.peek(1).is_err());
    }

    #[test]
    fn test_block_limit() {
        let mut heap = Heap::new();
        let mut frame = empty_frame(&mut heap);
        for _ in 0..MAXBLOCKS {
            frame.push_block(BlockKind::Loop, 0).unwrap();
        }
        assert!(frame.push_block(BlockKind::Loop, 0).is_err());
    }

    #[test]
    fn test_trace_includes_all_slots() {
        let mut heap = Heap::new();
        let mut frame = empty_frame(&mut heap);
        let id = heap.allocate(HeapData::Cell(Value::None));
        frame.push(Value::Ref(id));
        let mut out = Vec::new();
        frame.trace(&mut out);
        assert!(out.contains(&id));
        assert!(out.contains(&frame.globals));
    }
}
