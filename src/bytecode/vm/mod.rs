//! The interpreter loop.
//!
//! One [`Vm`] drives a whole call stack: [`Vm::run_frame`] trampolines over
//! an explicit `Vec<Frame>`, so a call into an interpreted function pushes a
//! frame instead of re-entering the interpreter on the host stack. However
//! deep the program recurses, the host stack stays flat and `recursion_limit`
//! is the only bound on call depth.
//!
//! Control flow that crosses block boundaries (`break`, `continue`, `return`,
//! raising) never jumps directly. The instruction sets a [`Why`] and the
//! unwind loop pops the frame's block stack until a loop, except handler or
//! finally body claims the transfer. A `finally` body receives the pending
//! reason as a [`Value::Why`] sentinel (plus the in-flight retval underneath,
//! for `return`/`continue`) and `END_FINALLY` resumes it afterwards, so a
//! `finally` that completes normally is invisible to the transfer it
//! interrupted.

mod binary;
mod call;

use std::rc::Rc;

use crate::builtins::Builtins;
use crate::exception::{ExcType, RunError, RunResult, SimpleException};
use crate::heap::{Heap, HeapData, HeapId};
use crate::io::PrintWriter;
use crate::runtime::Runtime;
use crate::types::{Dict, Function, List, Slice, Str, Tuple};
use crate::value::Value;

use self::call::CallOutcome;
use super::code::Code;
use super::frame::{BlockKind, Frame, Why};
use super::op::{CompareOp, Opcode};

/// How a frame finished executing.
#[derive(Debug)]
pub(crate) enum Exit {
    Return(Value),
    /// The frame suspended at a `YIELD_VALUE`; its stack stays in place for
    /// the next resume.
    Yield(Value),
}

/// What a (re)entered frame starts with.
#[derive(Debug)]
pub(crate) enum Resume {
    /// First entry; nothing pending.
    Start,
    /// Resume after a yield, pushing the sent value as the yield's result.
    Send(Value),
    /// Resume after a yield with an exception raised at the yield point.
    Throw(SimpleException),
}

/// Pending control transfer inside one `run_frame` activation.
struct LoopState {
    why: Why,
    /// The value travelling with a `Return` or `Yield`, or the absolute
    /// continue target (as `Value::Int`) for `Continue`.
    retval: Value,
    exception: Option<SimpleException>,
    /// A callee frame the last instruction produced; the trampoline pushes it
    /// onto the call stack before dispatch continues.
    pending: Option<Frame>,
}

pub(crate) struct Vm<'rt, P: PrintWriter> {
    rt: &'rt mut Runtime<P>,
    /// Current call depth, checked against the runtime's recursion limit.
    depth: usize,
}

impl<'rt, P: PrintWriter> Vm<'rt, P> {
    pub fn new(rt: &'rt mut Runtime<P>) -> Self {
        Self { rt, depth: 0 }
    }

    /// Executes `frame` until it returns, yields, or an error propagates out.
    ///
    /// Only `RunError::Exc` participates in unwinding; `SystemExit` and
    /// `Internal` return immediately without consulting any handler.
    pub fn run_frame(&mut self, frame: &mut Frame, resume: Resume) -> RunResult<Exit> {
        let mut callees = Vec::new();
        let result = self.run_stack(frame, resume, &mut callees);
        // A fatal error leaves unfinished callees behind; their depth must
        // not leak into the caller's accounting.
        self.depth -= callees.len();
        result
    }

    /// The trampoline: runs `root` and every frame it calls into on an
    /// explicit stack, so interpreted recursion never grows the host stack.
    fn run_stack(
        &mut self,
        root: &mut Frame,
        resume: Resume,
        callees: &mut Vec<Frame>,
    ) -> RunResult<Exit> {
        let mut state = LoopState {
            why: Why::Not,
            retval: Value::None,
            exception: None,
            pending: None,
        };
        match resume {
            Resume::Start => {}
            Resume::Send(value) => root.push(value),
            Resume::Throw(exc) => {
                state.why = Why::Exception;
                state.exception = Some(exc);
            }
        }

        loop {
            let frame = match callees.last_mut() {
                Some(f) => f,
                None => &mut *root,
            };
            self.run_one(frame, &mut state)?;

            if let Some(callee) = state.pending.take() {
                self.depth += 1;
                callees.push(callee);
                continue;
            }

            match state.why {
                Why::Yield => {
                    if !callees.is_empty() {
                        return Err(RunError::internal("yield outside a generator"));
                    }
                    let value = std::mem::replace(&mut state.retval, Value::None);
                    return Ok(Exit::Yield(value));
                }
                Why::Return => {
                    let value = std::mem::replace(&mut state.retval, Value::None);
                    match callees.pop() {
                        Some(_) => {
                            self.depth -= 1;
                            let caller = match callees.last_mut() {
                                Some(f) => f,
                                None => &mut *root,
                            };
                            // The caller's dispatch already consumed the call
                            // instruction; the result simply lands on its stack.
                            caller.push(value);
                            state.why = Why::Not;
                        }
                        None => {
                            root.stack.clear();
                            return Ok(Exit::Return(value));
                        }
                    }
                }
                Why::Exception => {
                    let mut exc = state
                        .exception
                        .take()
                        .ok_or_else(|| RunError::internal("frame exited without an exception"))?;
                    {
                        let frame = match callees.last_mut() {
                            Some(f) => f,
                            None => &mut *root,
                        };
                        let code = &frame.code;
                        exc.push_frame(code.name(), code.filename(), code.addr_to_line(frame.lasti));
                    }
                    match callees.pop() {
                        Some(_) => {
                            self.depth -= 1;
                            // `why` stays Exception, so the next run_one call
                            // unwinds the caller's block stack.
                            state.exception = Some(exc);
                        }
                        None => {
                            root.stack.clear();
                            return Err(RunError::Exc(exc));
                        }
                    }
                }
                _ => return Err(RunError::internal("loop control escaped the frame")),
            }
        }
    }

    /// Runs one frame until it finishes (`Return`/`Yield`/an unhandled
    /// exception, left in `state`) or produces a callee (`state.pending`).
    fn run_one(&mut self, frame: &mut Frame, state: &mut LoopState) -> RunResult<()> {
        let code = Rc::clone(&frame.code);
        loop {
            while state.why == Why::Not {
                let at = frame.lasti;
                let (op, oparg) = fetch(frame, &code)?;
                if self.rt.trace {
                    self.trace_instruction(&code, at, op, oparg);
                }
                match self.execute(frame, op, oparg, state) {
                    Ok(()) => {
                        if state.pending.is_some() {
                            return Ok(());
                        }
                    }
                    Err(RunError::Exc(exc)) => {
                        state.why = Why::Exception;
                        state.exception = Some(exc);
                    }
                    Err(fatal) => return Err(fatal),
                }
            }

            if state.why == Why::Yield {
                return Ok(());
            }
            if state.why == Why::Reraise {
                state.why = Why::Exception;
            }

            // Unwind the block stack until a handler claims the transfer.
            while state.why != Why::Not && !frame.blocks.is_empty() {
                let block = frame.pop_block()?;

                if block.kind == BlockKind::Loop && state.why == Why::Continue {
                    // The loop stays active; jump to the continue target
                    // stored in retval.
                    let Some(target) = state.retval.as_int() else {
                        return Err(RunError::internal("continue target is not an int"));
                    };
                    frame.blocks.push(block);
                    state.why = Why::Not;
                    frame.lasti = target as usize;
                    break;
                }

                frame.stack.truncate(block.level);

                if block.kind == BlockKind::Loop && state.why == Why::Break {
                    state.why = Why::Not;
                    frame.lasti = block.handler;
                    break;
                }

                if block.kind == BlockKind::Finally
                    || (block.kind == BlockKind::Except && state.why == Why::Exception)
                {
                    if state.why == Why::Exception {
                        let exc = state
                            .exception
                            .take()
                            .ok_or_else(|| RunError::internal("unwinding without an exception"))?;
                        self.rt.current_exc = Some(exc.clone());
                        // (traceback, value, exception) with the exception on
                        // top, so `except E as v` and bare `except` both find
                        // what they need at fixed depths.
                        frame.push(Value::None);
                        let arg = match exc.arg() {
                            Some(text) => {
                                Value::Ref(self.rt.heap.allocate(HeapData::Str(Str::from(text))))
                            }
                            None => Value::None,
                        };
                        frame.push(arg);
                        frame.push(Value::Ref(self.rt.heap.allocate(HeapData::Exception(exc))));
                    } else {
                        if matches!(state.why, Why::Return | Why::Continue) {
                            frame.push(state.retval.clone());
                        }
                        frame.push(Value::Why(state.why));
                    }
                    state.why = Why::Not;
                    frame.lasti = block.handler;
                    break;
                }
            }

            if state.why != Why::Not {
                return Ok(());
            }
        }
    }

    /// One trace line per instruction: code name, offset, opcode, operand.
    fn trace_instruction(&mut self, code: &Code, at: usize, op: Opcode, oparg: u32) {
        let line = if op.has_arg() {
            format!("{} {at:>4} {op:?} {oparg}\n", code.name())
        } else {
            format!("{} {at:>4} {op:?}\n", code.name())
        };
        self.rt.print.out(&line);
    }

    #[allow(clippy::too_many_lines)]
    fn execute(
        &mut self,
        frame: &mut Frame,
        op: Opcode,
        oparg: u32,
        state: &mut LoopState,
    ) -> RunResult<()> {
        let code = Rc::clone(&frame.code);
        match op {
            Opcode::Nop => {}
            Opcode::PopTop => {
                frame.pop()?;
            }
            Opcode::RotTwo => rotate(frame, 2)?,
            Opcode::RotThree => rotate(frame, 3)?,
            Opcode::RotFour => rotate(frame, 4)?,
            Opcode::DupTop => {
                let top = frame.peek(0)?.clone();
                frame.push(top);
            }
            Opcode::DupTopX => {
                let n = oparg as usize;
                let start = frame
                    .stack
                    .len()
                    .checked_sub(n)
                    .ok_or_else(|| RunError::internal("value stack underflow"))?;
                let dup = frame.stack[start..].to_vec();
                frame.stack.extend(dup);
            }

            Opcode::UnaryPositive => {
                let v = frame.pop()?;
                let result = self.unary_positive(v)?;
                frame.push(result);
            }
            Opcode::UnaryNegative => {
                let v = frame.pop()?;
                let result = self.unary_negative(v)?;
                frame.push(result);
            }
            Opcode::UnaryNot => {
                let v = frame.pop()?;
                let result = Value::Bool(!v.py_bool(&self.rt.heap));
                frame.push(result);
            }
            Opcode::UnaryInvert => {
                let v = frame.pop()?;
                let result = self.unary_invert(v)?;
                frame.push(result);
            }

            Opcode::BinaryPower
            | Opcode::BinaryMultiply
            | Opcode::BinaryTrueDivide
            | Opcode::BinaryFloorDivide
            | Opcode::BinaryModulo
            | Opcode::BinaryAdd
            | Opcode::BinarySubtract
            | Opcode::BinaryLshift
            | Opcode::BinaryRshift
            | Opcode::BinaryAnd
            | Opcode::BinaryXor
            | Opcode::BinaryOr => {
                let w = frame.pop()?;
                let v = frame.pop()?;
                let result = self.binary(op, v, w)?;
                frame.push(result);
            }
            Opcode::BinaryDivide => {
                let w = frame.pop()?;
                let v = frame.pop()?;
                let result = self.classic_div(v, w, code.flags())?;
                frame.push(result);
            }
            Opcode::BinarySubscr => {
                let w = frame.pop()?;
                let v = frame.pop()?;
                let result = self.subscr(v, w)?;
                frame.push(result);
            }
            Opcode::StoreSubscr => {
                let w = frame.pop()?;
                let v = frame.pop()?;
                let u = frame.pop()?;
                self.store_subscr(v, w, u)?;
            }
            Opcode::DeleteSubscr => {
                let w = frame.pop()?;
                let v = frame.pop()?;
                self.delete_subscr(v, w)?;
            }

            Opcode::CompareOp => {
                let op = CompareOp::from_repr(oparg as u8)
                    .ok_or_else(|| RunError::internal("invalid comparison operand"))?;
                let w = frame.pop()?;
                let v = frame.pop()?;
                let result = self.compare(op, &v, &w)?;
                frame.push(Value::Bool(result));
            }

            Opcode::GetIter => {
                let v = frame.pop()?;
                let iter = self.get_iter(v)?;
                frame.push(iter);
            }
            Opcode::ForIter => {
                let iter = frame.peek(0)?.clone();
                match self.iter_next(&iter)? {
                    Some(value) => frame.push(value),
                    None => {
                        frame.pop()?;
                        frame.lasti += oparg as usize;
                    }
                }
            }

            Opcode::JumpForward => frame.lasti += oparg as usize,
            Opcode::JumpAbsolute => frame.lasti = oparg as usize,
            Opcode::PopJumpIfFalse => {
                let v = frame.pop()?;
                if !v.py_bool(&self.rt.heap) {
                    frame.lasti = oparg as usize;
                }
            }
            Opcode::PopJumpIfTrue => {
                let v = frame.pop()?;
                if v.py_bool(&self.rt.heap) {
                    frame.lasti = oparg as usize;
                }
            }
            Opcode::JumpIfFalseOrPop => {
                if frame.peek(0)?.py_bool(&self.rt.heap) {
                    frame.pop()?;
                } else {
                    frame.lasti = oparg as usize;
                }
            }
            Opcode::JumpIfTrueOrPop => {
                if frame.peek(0)?.py_bool(&self.rt.heap) {
                    frame.lasti = oparg as usize;
                } else {
                    frame.pop()?;
                }
            }

            Opcode::LoadConst => {
                let konst = code
                    .consts()
                    .get(oparg as usize)
                    .ok_or_else(|| RunError::internal("constant index out of range"))?;
                let value = konst.to_value(&mut self.rt.heap);
                frame.push(value);
            }

            Opcode::LoadFast => {
                let value = frame
                    .locals
                    .get(oparg as usize)
                    .cloned()
                    .ok_or_else(|| RunError::internal("local index out of range"))?;
                if value == Value::Undefined {
                    return Err(ExcType::unbound_local(&code.varnames()[oparg as usize]));
                }
                frame.push(value);
            }
            Opcode::StoreFast => {
                let value = frame.pop()?;
                let slot = frame
                    .locals
                    .get_mut(oparg as usize)
                    .ok_or_else(|| RunError::internal("local index out of range"))?;
                *slot = value;
            }
            Opcode::DeleteFast => {
                let slot = frame
                    .locals
                    .get_mut(oparg as usize)
                    .ok_or_else(|| RunError::internal("local index out of range"))?;
                if *slot == Value::Undefined {
                    return Err(ExcType::unbound_local(&code.varnames()[oparg as usize]));
                }
                *slot = Value::Undefined;
            }

            // Module-level code binds names in its globals dict, so the name
            // opcodes and the global opcodes share an implementation.
            Opcode::LoadName | Opcode::LoadGlobal => {
                let name = name_at(&code, oparg)?;
                let value = dict_get_str(&self.rt.heap, frame.globals, name)
                    .or_else(|| crate::builtins::lookup(name))
                    .ok_or_else(|| ExcType::name_error(name))?;
                frame.push(value);
            }
            Opcode::StoreName | Opcode::StoreGlobal => {
                let value = frame.pop()?;
                let name = name_at(&code, oparg)?;
                dict_set_str(&mut self.rt.heap, frame.globals, name, value)?;
            }
            Opcode::DeleteName | Opcode::DeleteGlobal => {
                let name = name_at(&code, oparg)?;
                let removed = self.rt.heap.with_entry_mut(frame.globals, |heap, data| {
                    match data {
                        HeapData::Dict(dict) => Ok(dict.remove_str(heap, name)),
                        _ => Err(RunError::internal("globals is not a dict")),
                    }
                })?;
                if removed.is_none() {
                    return Err(ExcType::name_error(name));
                }
            }

            Opcode::LoadAttr => {
                let obj = frame.pop()?;
                let name = name_at(&code, oparg)?;
                let value = self.load_attr(&obj, name)?;
                frame.push(value);
            }
            Opcode::StoreAttr => {
                let obj = frame.pop()?;
                let value = frame.pop()?;
                let name = name_at(&code, oparg)?;
                self.store_attr(&obj, name, value)?;
            }
            Opcode::DeleteAttr => {
                let obj = frame.pop()?;
                let name = name_at(&code, oparg)?;
                self.delete_attr(&obj, name)?;
            }

            Opcode::LoadClosure => {
                let cell = *frame
                    .cells
                    .get(oparg as usize)
                    .ok_or_else(|| RunError::internal("cell index out of range"))?;
                frame.push(Value::Ref(cell));
            }
            Opcode::LoadDeref => {
                let cell = *frame
                    .cells
                    .get(oparg as usize)
                    .ok_or_else(|| RunError::internal("cell index out of range"))?;
                let HeapData::Cell(value) = self.rt.heap.get(cell) else {
                    return Err(RunError::internal("deref slot is not a cell"));
                };
                if *value == Value::Undefined {
                    return Err(unbound_deref(&code, oparg as usize));
                }
                let value = value.clone();
                frame.push(value);
            }
            Opcode::StoreDeref => {
                let value = frame.pop()?;
                let cell = *frame
                    .cells
                    .get(oparg as usize)
                    .ok_or_else(|| RunError::internal("cell index out of range"))?;
                *self.rt.heap.get_mut(cell) = HeapData::Cell(value);
            }

            Opcode::BuildTuple => {
                let items = pop_n(frame, oparg as usize)?;
                let id = self.rt.heap.allocate(HeapData::Tuple(Tuple::new(items)));
                frame.push(Value::Ref(id));
            }
            Opcode::BuildList => {
                let items = pop_n(frame, oparg as usize)?;
                let id = self.rt.heap.allocate(HeapData::List(List::new(items)));
                frame.push(Value::Ref(id));
            }
            Opcode::BuildMap => {
                let id = self.rt.heap.allocate(HeapData::Dict(Dict::new()));
                frame.push(Value::Ref(id));
            }
            Opcode::BuildSlice => {
                let step = if oparg == 3 {
                    slice_component(&frame.pop()?, &self.rt.heap)?
                } else {
                    None
                };
                let stop = slice_component(&frame.pop()?, &self.rt.heap)?;
                let start = slice_component(&frame.pop()?, &self.rt.heap)?;
                let id = self
                    .rt
                    .heap
                    .allocate(HeapData::Slice(Slice::new(start, stop, step)));
                frame.push(Value::Ref(id));
            }
            Opcode::UnpackSequence => {
                let v = frame.pop()?;
                let items = self.unpack(v, oparg as usize)?;
                for item in items.into_iter().rev() {
                    frame.push(item);
                }
            }

            Opcode::SetupLoop => frame.push_block(BlockKind::Loop, frame.lasti + oparg as usize)?,
            Opcode::SetupExcept => {
                frame.push_block(BlockKind::Except, frame.lasti + oparg as usize)?;
            }
            Opcode::SetupFinally => {
                frame.push_block(BlockKind::Finally, frame.lasti + oparg as usize)?;
            }
            Opcode::PopBlock => {
                let block = frame.pop_block()?;
                frame.stack.truncate(block.level);
            }

            Opcode::BreakLoop => state.why = Why::Break,
            Opcode::ContinueLoop => {
                state.retval = Value::Int(i64::from(oparg));
                state.why = Why::Continue;
            }
            Opcode::ReturnValue => {
                state.retval = frame.pop()?;
                state.why = Why::Return;
            }
            Opcode::YieldValue => {
                state.retval = frame.pop()?;
                state.why = Why::Yield;
            }

            Opcode::RaiseVarargs => self.raise_varargs(frame, oparg, state)?,

            Opcode::EndFinally => {
                let v = frame.pop()?;
                match v {
                    Value::Why(why) => {
                        state.why = why;
                        if matches!(why, Why::Return | Why::Continue) {
                            state.retval = frame.pop()?;
                        }
                    }
                    Value::Ref(id) => {
                        let HeapData::Exception(exc) = self.rt.heap.get(id) else {
                            return Err(RunError::internal("'finally' pops bad exception"));
                        };
                        let exc = exc.clone();
                        self.rt.current_exc = Some(exc.clone());
                        state.exception = Some(exc);
                        state.why = Why::Reraise;
                    }
                    Value::None => {}
                    _ => return Err(RunError::internal("'finally' pops bad exception")),
                }
            }

            Opcode::WithCleanup => self.with_cleanup(frame)?,

            Opcode::CallFunction
            | Opcode::CallFunctionVar
            | Opcode::CallFunctionKw
            | Opcode::CallFunctionVarKw => {
                let kw_dict = if matches!(op, Opcode::CallFunctionKw | Opcode::CallFunctionVarKw) {
                    Some(frame.pop()?)
                } else {
                    None
                };
                let star_args =
                    if matches!(op, Opcode::CallFunctionVar | Opcode::CallFunctionVarKw) {
                        Some(frame.pop()?)
                    } else {
                        None
                    };
                match self.call_op(frame, oparg, star_args, kw_dict)? {
                    CallOutcome::Value(result) => frame.push(result),
                    CallOutcome::Frame(callee) => state.pending = Some(callee),
                }
            }

            Opcode::MakeFunction | Opcode::MakeClosure => {
                let proto = frame.pop()?;
                let closure = if op == Opcode::MakeClosure {
                    let cells = frame.pop()?;
                    self.closure_cells(cells)?
                } else {
                    Vec::new()
                };
                let defaults = pop_n(frame, oparg as usize)?;
                let func_code = match proto.heap_id().map(|id| self.rt.heap.get(id)) {
                    Some(HeapData::Function(f)) => Rc::clone(f.code()),
                    _ => return Err(RunError::internal("MAKE_FUNCTION on a non-function")),
                };
                let id = self.rt.heap.allocate(HeapData::Function(Function::new(
                    func_code,
                    defaults,
                    closure,
                    Some(frame.globals),
                )));
                frame.push(Value::Ref(id));
            }

            Opcode::ImportName => {
                let name = name_at(&code, oparg)?;
                let _fromlist = frame.pop()?;
                let _level = frame.pop()?;
                let module = self.import_module(name)?;
                frame.push(module);
            }
            Opcode::ImportFrom => {
                let name = name_at(&code, oparg)?;
                let module = frame.peek(0)?.clone();
                let value = self.import_from(&module, name)?;
                frame.push(value);
            }
            Opcode::ImportStar => {
                let module = frame.pop()?;
                self.import_star(frame, &module)?;
            }

            Opcode::ExtendedArg => {
                return Err(RunError::internal("EXTENDED_ARG not folded by fetch"));
            }
        }
        Ok(())
    }

    fn raise_varargs(
        &mut self,
        frame: &mut Frame,
        oparg: u32,
        state: &mut LoopState,
    ) -> RunResult<()> {
        match oparg {
            0 => {
                // Bare `raise`: re-activate the most recently handled
                // exception without growing its traceback here.
                let exc = self.rt.current_exc.clone().ok_or_else(|| {
                    ExcType::runtime_error("No active exception to re-raise")
                })?;
                state.exception = Some(exc);
                state.why = Why::Reraise;
            }
            1..=3 => {
                let _traceback = if oparg == 3 { Some(frame.pop()?) } else { None };
                let value = if oparg >= 2 { Some(frame.pop()?) } else { None };
                let exc_type = frame.pop()?;
                let exc = self.build_exception(exc_type, value)?;
                self.rt.current_exc = Some(exc.clone());
                state.exception = Some(exc);
                state.why = Why::Exception;
            }
            _ => return Err(RunError::internal("bad RAISE_VARARGS oparg")),
        }
        Ok(())
    }

    /// Materializes the exception a `raise` names: either an exception class
    /// (optionally with an argument) or an existing exception instance.
    fn build_exception(
        &mut self,
        exc_type: Value,
        value: Option<Value>,
    ) -> RunResult<SimpleException> {
        match exc_type {
            Value::Builtin(Builtins::Exc(et)) => {
                let arg = match value {
                    None | Some(Value::None) => None,
                    Some(v) => Some(v.py_str(&self.rt.heap)),
                };
                Ok(SimpleException::new(et, arg))
            }
            Value::Ref(id) => match self.rt.heap.get(id) {
                HeapData::Exception(exc) => Ok(exc.clone()),
                _ => Err(ExcType::type_error(
                    "exceptions must derive from BaseException",
                )),
            },
            _ => Err(ExcType::type_error(
                "exceptions must derive from BaseException",
            )),
        }
    }

    /// `WITH_CLEANUP`: calls the `__exit__` at TOS with the pending exception
    /// (or three `None`s), optionally suppressing the exception when the call
    /// returns a true value.
    ///
    /// Stack on entry: the exit callable on top; beneath it either `None`, a
    /// `Why` sentinel (with retval below for return/continue), or the
    /// (exception, value, traceback) triple the unwind pushed.
    fn with_cleanup(&mut self, frame: &mut Frame) -> RunResult<()> {
        let exit = frame.peek(0)?.clone();
        let u = frame.peek(1)?.clone();
        let pending_exc = match &u {
            Value::Ref(id) => match self.rt.heap.get(*id) {
                HeapData::Exception(exc) => Some(exc.exc_type()),
                _ => None,
            },
            _ => None,
        };

        let args = if let Some(exc_type) = pending_exc {
            let value = frame.peek(2)?.clone();
            let traceback = frame.peek(3)?.clone();
            vec![Value::Builtin(Builtins::Exc(exc_type)), value, traceback]
        } else {
            vec![Value::None, Value::None, Value::None]
        };
        let result = self.call_value(exit, args, Vec::new())?;

        if pending_exc.is_some() && result.py_bool(&self.rt.heap) {
            // Zap the exception triple so END_FINALLY sees a plain None and
            // does not re-raise.
            for _ in 0..4 {
                frame.pop()?;
            }
            frame.push(Value::None);
        } else {
            frame.pop()?;
        }
        Ok(())
    }
}

/// Decodes the next instruction, folding any `ExtendedArg` prefixes into the
/// operand.
fn fetch(frame: &mut Frame, code: &Code) -> RunResult<(Opcode, u32)> {
    let bytes = code.bytes();
    let mut acc: u32 = 0;
    loop {
        let byte = *bytes
            .get(frame.lasti)
            .ok_or_else(|| RunError::internal("instruction pointer past end of code"))?;
        frame.lasti += 1;
        let op = Opcode::try_from(byte).map_err(|e| RunError::internal(e.to_string()))?;
        if !op.has_arg() {
            return Ok((op, 0));
        }
        let operand = bytes
            .get(frame.lasti..frame.lasti + 2)
            .ok_or_else(|| RunError::internal("truncated operand"))?;
        frame.lasti += 2;
        let operand = u32::from(u16::from_le_bytes([operand[0], operand[1]]));
        if op == Opcode::ExtendedArg {
            acc = (acc | operand) << 16;
            continue;
        }
        return Ok((op, acc | operand));
    }
}

fn rotate(frame: &mut Frame, n: usize) -> RunResult<()> {
    let start = frame
        .stack
        .len()
        .checked_sub(n)
        .ok_or_else(|| RunError::internal("value stack underflow"))?;
    frame.stack[start..].rotate_right(1);
    Ok(())
}

fn pop_n(frame: &mut Frame, n: usize) -> RunResult<Vec<Value>> {
    let start = frame
        .stack
        .len()
        .checked_sub(n)
        .ok_or_else(|| RunError::internal("value stack underflow"))?;
    Ok(frame.stack.split_off(start))
}

fn name_at(code: &Code, oparg: u32) -> RunResult<&str> {
    code.names()
        .get(oparg as usize)
        .map(String::as_str)
        .ok_or_else(|| RunError::internal("name index out of range"))
}

fn unbound_deref(code: &Code, slot: usize) -> RunError {
    if slot < code.cellvars().len() {
        ExcType::unbound_local(&code.cellvars()[slot])
    } else {
        let name = &code.freevars()[slot - code.cellvars().len()];
        ExcType::NameError
            .with_arg(format!(
                "free variable '{name}' referenced before assignment in enclosing scope"
            ))
            .into()
    }
}

fn slice_component(v: &Value, heap: &Heap) -> RunResult<Option<i64>> {
    if v.is_none() {
        return Ok(None);
    }
    match v.index_i64(heap)? {
        Some(i) => Ok(Some(i)),
        None => Err(ExcType::type_error(
            "slice indices must be integers or None",
        )),
    }
}

pub(super) fn dict_get_str(heap: &Heap, dict_id: HeapId, name: &str) -> Option<Value> {
    match heap.get(dict_id) {
        HeapData::Dict(dict) => dict.get_str(heap, name),
        _ => None,
    }
}

pub(super) fn dict_set_str(
    heap: &mut Heap,
    dict_id: HeapId,
    name: &str,
    value: Value,
) -> RunResult<()> {
    heap.with_entry_mut(dict_id, |heap, data| match data {
        HeapData::Dict(dict) => {
            dict.set_str(heap, name, value);
            Ok(())
        }
        _ => Err(RunError::internal("globals is not a dict")),
    })
}
