//! Calling conventions: binding arguments into frames, builtin dispatch,
//! iteration, generator resumption and the import machinery.

use std::rc::Rc;

use crate::builtins::Builtins;
use crate::exception::{ExcType, RunError, RunResult};
use crate::heap::{HeapData, HeapId};
use crate::io::PrintWriter;
use crate::types::{
    ByteArray, Dict, Function, GenState, Generator, Module, Range, SeqIterator, Str, Tuple,
};
use crate::value::Value;

use super::super::code::CodeFlags;
use super::super::frame::Frame;
use super::{dict_get_str, dict_set_str, Exit, Resume, Vm};

/// What dispatching a call produced: a finished value, or a bound frame for
/// the trampoline to push onto its call stack.
pub(super) enum CallOutcome {
    Value(Value),
    Frame(Frame),
}

impl<P: PrintWriter> Vm<'_, P> {
    /// `CALL_FUNCTION` and its starred variants: collects the keyword pairs
    /// and positional arguments off the stack, merges in `*args`/`**kwargs`,
    /// and dispatches the call.
    pub(super) fn call_op(
        &mut self,
        frame: &mut Frame,
        oparg: u32,
        star_args: Option<Value>,
        kw_dict: Option<Value>,
    ) -> RunResult<CallOutcome> {
        let na = (oparg & 0xff) as usize;
        let nk = ((oparg >> 8) & 0xff) as usize;

        let mut kwargs: Vec<(String, Value)> = Vec::with_capacity(nk);
        for _ in 0..nk {
            let value = frame.pop()?;
            let key = frame.pop()?;
            let name = match key.heap_id().map(|id| self.rt.heap.get(id)) {
                Some(HeapData::Str(s)) => s.as_str().to_string(),
                _ => return Err(ExcType::type_error("keywords must be strings")),
            };
            kwargs.insert(0, (name, value));
        }

        let mut args = super::pop_n(frame, na)?;
        let callable = frame.pop()?;

        if let Some(star) = star_args {
            let extra = match star.heap_id().map(|id| self.rt.heap.get(id)) {
                Some(HeapData::Tuple(t)) => t.as_vec().to_vec(),
                Some(HeapData::List(l)) => l.as_vec().to_vec(),
                _ => {
                    return Err(ExcType::type_error(format!(
                        "argument after * must be a sequence, not {}",
                        self.tname(&star)
                    )))
                }
            };
            args.extend(extra);
        }
        if let Some(dict) = kw_dict {
            let entries = match dict.heap_id().map(|id| self.rt.heap.get(id)) {
                Some(HeapData::Dict(d)) => d.entries().to_vec(),
                _ => {
                    return Err(ExcType::type_error(format!(
                        "argument after ** must be a mapping, not {}",
                        self.tname(&dict)
                    )))
                }
            };
            for entry in entries {
                let name = match entry.key.heap_id().map(|id| self.rt.heap.get(id)) {
                    Some(HeapData::Str(s)) => s.as_str().to_string(),
                    _ => return Err(ExcType::type_error("keywords must be strings")),
                };
                kwargs.push((name, entry.value));
            }
        }

        self.call_dispatch(callable, args, kwargs)
    }

    fn call_dispatch(
        &mut self,
        callable: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<CallOutcome> {
        match &callable {
            Value::Builtin(b) => self.call_builtin(*b, args, kwargs).map(CallOutcome::Value),
            Value::Ref(id) => match self.rt.heap.get(*id) {
                HeapData::Function(f) => {
                    let func = f.clone();
                    self.setup_call(&func, args, kwargs)
                }
                _ => Err(ExcType::type_error_not_callable(&self.tname(&callable))),
            },
            _ => Err(ExcType::type_error_not_callable(&self.tname(&callable))),
        }
    }

    /// Calls a value to completion on the host stack, for callers outside the
    /// trampoline (the embedder API, `WITH_CLEANUP`'s exit callable).
    pub(crate) fn call_value(
        &mut self,
        callable: Value,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        match self.call_dispatch(callable, args, kwargs)? {
            CallOutcome::Value(value) => Ok(value),
            CallOutcome::Frame(mut frame) => {
                self.depth += 1;
                let result = self.run_frame(&mut frame, Resume::Start);
                self.depth -= 1;
                match result? {
                    Exit::Return(value) => Ok(value),
                    Exit::Yield(_) => Err(RunError::internal("yield outside a generator")),
                }
            }
        }
    }

    /// Binds arguments into a fresh frame ready to run, or wraps the frame in
    /// a generator object without running anything when the code is a
    /// generator.
    fn setup_call(
        &mut self,
        func: &Function,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<CallOutcome> {
        if self.depth >= self.rt.recursion_limit {
            return Err(ExcType::recursion_error());
        }
        let code = Rc::clone(func.code());
        let globals = func
            .globals()
            .ok_or_else(|| RunError::internal("calling a function with no module binding"))?;
        let mut frame = Frame::new(Rc::clone(&code), globals, func.closure(), &mut self.rt.heap);

        let argcount = code.argcount();
        let flags = code.flags();
        let defaults = func.defaults();
        let nargs = args.len();

        let mut extra = Vec::new();
        for (slot, value) in args.into_iter().enumerate() {
            if slot < argcount {
                frame.locals[slot] = value;
            } else {
                extra.push(value);
            }
        }
        if !extra.is_empty() && !flags.contains(CodeFlags::VARARGS) {
            return Err(arg_count_error(code.name(), argcount, defaults.len(), nargs, true));
        }

        let mut kw_extra: Vec<(String, Value)> = Vec::new();
        for (key, value) in kwargs {
            match code.varnames()[..argcount].iter().position(|v| *v == key) {
                Some(slot) => {
                    if frame.locals[slot] != Value::Undefined {
                        return Err(ExcType::type_error(format!(
                            "{}() got multiple values for keyword argument '{key}'",
                            code.name()
                        )));
                    }
                    frame.locals[slot] = value;
                }
                None if flags.contains(CodeFlags::VARKEYWORDS) => kw_extra.push((key, value)),
                None => {
                    return Err(ExcType::type_error(format!(
                        "{}() got an unexpected keyword argument '{key}'",
                        code.name()
                    )))
                }
            }
        }

        for (i, default) in defaults.iter().enumerate() {
            let slot = argcount - defaults.len() + i;
            if frame.locals[slot] == Value::Undefined {
                frame.locals[slot] = default.clone();
            }
        }
        if frame.locals[..argcount].contains(&Value::Undefined) {
            return Err(arg_count_error(code.name(), argcount, defaults.len(), nargs, false));
        }

        let mut slot = argcount;
        if flags.contains(CodeFlags::VARARGS) {
            let id = self.rt.heap.allocate(HeapData::Tuple(Tuple::new(extra)));
            frame.locals[slot] = Value::Ref(id);
            slot += 1;
        }
        if flags.contains(CodeFlags::VARKEYWORDS) {
            let id = self.rt.heap.allocate(HeapData::Dict(Dict::new()));
            for (key, value) in kw_extra {
                dict_set_str(&mut self.rt.heap, id, &key, value)?;
            }
            frame.locals[slot] = Value::Ref(id);
        }

        frame.promote_cell_params(&mut self.rt.heap);

        if flags.contains(CodeFlags::GENERATOR) {
            let gen = Generator::new(code.name(), Box::new(frame));
            let id = self.rt.heap.allocate(HeapData::Generator(gen));
            return Ok(CallOutcome::Value(Value::Ref(id)));
        }

        Ok(CallOutcome::Frame(frame))
    }

    fn call_builtin(
        &mut self,
        builtin: Builtins,
        args: Vec<Value>,
        kwargs: Vec<(String, Value)>,
    ) -> RunResult<Value> {
        if !kwargs.is_empty() {
            return Err(ExcType::type_error(format!(
                "{builtin}() takes no keyword arguments"
            )));
        }
        match builtin {
            Builtins::Print => {
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        self.rt.print.out_char(' ');
                    }
                    let text = arg.py_str(&self.rt.heap);
                    self.rt.print.out(&text);
                }
                self.rt.print.out_char('\n');
                Ok(Value::None)
            }
            Builtins::Len => {
                let [v] = exact_args(args, "len")?;
                match v.py_len(&self.rt.heap) {
                    Some(len) => Ok(Value::Int(len as i64)),
                    None => Err(ExcType::type_error(format!(
                        "object of type '{}' has no len()",
                        self.tname(&v)
                    ))),
                }
            }
            Builtins::Repr => {
                let [v] = exact_args(args, "repr")?;
                let text = v.py_repr(&self.rt.heap);
                Ok(Value::Ref(self.rt.heap.allocate(HeapData::Str(Str::new(text)))))
            }
            Builtins::Iter => {
                let [v] = exact_args(args, "iter")?;
                self.get_iter(v)
            }
            Builtins::Next => {
                if args.is_empty() || args.len() > 2 {
                    return Err(ExcType::type_error(format!(
                        "next expected at most 2 arguments, got {}",
                        args.len()
                    )));
                }
                let mut args = args.into_iter();
                let iter = args.next().ok_or_else(|| RunError::internal("next without args"))?;
                let default = args.next();
                if !matches!(
                    iter.heap_id().map(|id| self.rt.heap.get(id)),
                    Some(HeapData::Iterator(_) | HeapData::Generator(_))
                ) {
                    return Err(ExcType::type_error(format!(
                        "'{}' object is not an iterator",
                        self.tname(&iter)
                    )));
                }
                match self.iter_next(&iter)? {
                    Some(value) => Ok(value),
                    None => default.ok_or_else(ExcType::stop_iteration),
                }
            }
            Builtins::Isinstance => {
                if args.len() != 2 {
                    return Err(ExcType::type_error(format!(
                        "isinstance expected 2 arguments, got {}",
                        args.len()
                    )));
                }
                let classinfo = args[1].clone();
                let obj = args[0].clone();
                self.isinstance(&obj, &classinfo).map(Value::Bool)
            }
            Builtins::Range => {
                if args.is_empty() || args.len() > 3 {
                    return Err(ExcType::type_error(format!(
                        "range expected 1 to 3 arguments, got {}",
                        args.len()
                    )));
                }
                let mut ints = Vec::with_capacity(args.len());
                for arg in &args {
                    let Some(i) = arg.index_i64(&self.rt.heap)? else {
                        return Err(ExcType::type_error(format!(
                            "range() integer argument expected, got {}",
                            self.tname(arg)
                        )));
                    };
                    ints.push(i);
                }
                let range = match ints[..] {
                    [stop] => Range::new(0, stop, 1)?,
                    [start, stop] => Range::new(start, stop, 1)?,
                    [start, stop, step] => Range::new(start, stop, step)?,
                    _ => return Err(RunError::internal("range arity already checked")),
                };
                Ok(Value::Ref(self.rt.heap.allocate(HeapData::Range(range))))
            }
            Builtins::Bytearray => {
                if args.len() > 1 {
                    return Err(ExcType::type_error(format!(
                        "bytearray() takes at most 1 argument ({} given)",
                        args.len()
                    )));
                }
                let data = match args.into_iter().next() {
                    None => Vec::new(),
                    Some(arg) => self.bytearray_source(arg)?,
                };
                let ba = ByteArray::new(data);
                Ok(Value::Ref(self.rt.heap.allocate(HeapData::ByteArray(ba))))
            }
            Builtins::Exc(exc_type) => {
                if args.len() > 1 {
                    return Err(ExcType::type_error(format!(
                        "{exc_type}() takes at most 1 argument ({} given)",
                        args.len()
                    )));
                }
                let exc = match args.first() {
                    None => exc_type.empty(),
                    Some(arg) => exc_type.with_arg(arg.py_str(&self.rt.heap)),
                };
                Ok(Value::Ref(self.rt.heap.allocate(HeapData::Exception(exc))))
            }
        }
    }

    /// `bytearray(x)`: an int is a zero-filled count, bytes-likes copy their
    /// contents, and anything else is iterated for its byte values.
    fn bytearray_source(&mut self, arg: Value) -> RunResult<Vec<u8>> {
        if let Value::Int(n) = arg {
            let n = usize::try_from(n).map_err(|_| ExcType::value_error("negative count"))?;
            return Ok(vec![0; n]);
        }
        match arg.heap_id().map(|id| self.rt.heap.get(id)) {
            Some(HeapData::Bytes(b)) => return Ok(b.as_slice().to_vec()),
            Some(HeapData::ByteArray(b)) => return Ok(b.as_slice().to_vec()),
            _ => {}
        }
        let iter = self.get_iter(arg)?;
        let mut data = Vec::new();
        while let Some(item) = self.iter_next(&iter)? {
            let Some(i) = item.index_i64(&self.rt.heap)? else {
                return Err(ExcType::type_error("an integer is required"));
            };
            let byte = u8::try_from(i)
                .map_err(|_| ExcType::value_error("byte must be in range(0, 256)"))?;
            data.push(byte);
        }
        Ok(data)
    }

    fn isinstance(&mut self, obj: &Value, classinfo: &Value) -> RunResult<bool> {
        let classes: Vec<Value> = match classinfo.heap_id().map(|id| self.rt.heap.get(id)) {
            Some(HeapData::Tuple(t)) => t.as_vec().to_vec(),
            _ => vec![classinfo.clone()],
        };
        let obj_type = match obj {
            Value::Ref(id) => match self.rt.heap.get(*id) {
                HeapData::Exception(exc) => Some(exc.exc_type()),
                _ => None,
            },
            _ => None,
        };
        for class in &classes {
            let Value::Builtin(Builtins::Exc(target)) = class else {
                return Err(ExcType::type_error(
                    "isinstance() arg 2 must be a type or tuple of types",
                ));
            };
            if let Some(et) = obj_type {
                if et.is_subclass_of(*target) {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// `GET_ITER`: wraps an iterable in an iterator, passing through values
    /// that are already iterators or generators.
    pub(super) fn get_iter(&mut self, v: Value) -> RunResult<Value> {
        let Value::Ref(id) = v else {
            return Err(ExcType::type_error_not_iterable(&self.tname(&v)));
        };
        let iter = match self.rt.heap.get(id) {
            HeapData::List(_) => SeqIterator::List { id, index: 0 },
            HeapData::Tuple(_) => SeqIterator::Tuple { id, index: 0 },
            HeapData::Str(_) => SeqIterator::Str { id, index: 0 },
            HeapData::Bytes(_) => SeqIterator::Bytes { id, index: 0 },
            HeapData::ByteArray(_) => SeqIterator::ByteArray { id, index: 0 },
            HeapData::Dict(d) => SeqIterator::Dict {
                id,
                index: 0,
                expected_len: d.len(),
            },
            HeapData::Range(r) => SeqIterator::Range {
                next: r.start,
                stop: r.stop,
                step: r.step,
            },
            HeapData::Iterator(_) | HeapData::Generator(_) => return Ok(v),
            _ => return Err(ExcType::type_error_not_iterable(&self.tname(&v))),
        };
        Ok(Value::Ref(self.rt.heap.allocate(HeapData::Iterator(iter))))
    }

    /// Advances an iterator or generator; `Ok(None)` means exhausted. A
    /// `StopIteration` raised inside a generator body also ends iteration.
    pub(super) fn iter_next(&mut self, iter: &Value) -> RunResult<Option<Value>> {
        let Value::Ref(id) = iter else {
            return Err(RunError::internal("FOR_ITER over a non-iterator"));
        };
        enum Kind {
            Iter,
            Gen,
        }
        let kind = match self.rt.heap.get(*id) {
            HeapData::Iterator(_) => Kind::Iter,
            HeapData::Generator(_) => Kind::Gen,
            _ => return Err(RunError::internal("FOR_ITER over a non-iterator")),
        };
        match kind {
            Kind::Iter => self.rt.heap.advance_iterator(*id),
            Kind::Gen => match self.resume_generator(*id, Resume::Send(Value::None)) {
                Ok(next) => Ok(next),
                Err(RunError::Exc(exc)) if exc.exc_type() == ExcType::StopIteration => Ok(None),
                Err(e) => Err(e),
            },
        }
    }

    /// `UNPACK_SEQUENCE`: exactly `n` elements out of any iterable.
    pub(super) fn unpack(&mut self, v: Value, n: usize) -> RunResult<Vec<Value>> {
        let iter = self.get_iter(v)?;
        let mut items = Vec::with_capacity(n);
        loop {
            match self.iter_next(&iter)? {
                Some(item) => {
                    if items.len() == n {
                        return Err(ExcType::value_error("too many values to unpack"));
                    }
                    items.push(item);
                }
                None => break,
            }
        }
        if items.len() < n {
            let plural = if items.len() == 1 { "value" } else { "values" };
            return Err(ExcType::value_error(format!(
                "need more than {} {plural} to unpack",
                items.len()
            )));
        }
        Ok(items)
    }

    /// `MAKE_CLOSURE`'s cell tuple: each element is a `LOAD_CLOSURE`d cell.
    pub(super) fn closure_cells(&mut self, cells: Value) -> RunResult<Vec<HeapId>> {
        let items = match cells.heap_id().map(|id| self.rt.heap.get(id)) {
            Some(HeapData::Tuple(t)) => t.as_vec().to_vec(),
            _ => return Err(RunError::internal("MAKE_CLOSURE without a cell tuple")),
        };
        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            match item.heap_id() {
                Some(id) if matches!(self.rt.heap.get(id), HeapData::Cell(_)) => ids.push(id),
                _ => return Err(RunError::internal("closure element is not a cell")),
            }
        }
        Ok(ids)
    }

    /// Moves a generator forward. `Ok(Some(v))` is a yielded value,
    /// `Ok(None)` means the generator finished (now or earlier).
    ///
    /// The frame is physically moved out of the heap while the body runs
    /// (leaving `GenState::Running`), so a generator that re-enters itself
    /// finds no frame to run rather than corrupting one.
    pub(crate) fn resume_generator(
        &mut self,
        gen_id: HeapId,
        resume: Resume,
    ) -> RunResult<Option<Value>> {
        let HeapData::Generator(gen) = self.rt.heap.get_mut(gen_id) else {
            return Err(RunError::internal("resume of a non-generator"));
        };
        let (mut frame, resume) = match (gen.take_state(), resume) {
            (GenState::Running, _) => {
                return Err(ExcType::value_error("generator already executing"));
            }
            (GenState::Done, Resume::Throw(exc)) => {
                gen.set_state(GenState::Done);
                return Err(exc.into());
            }
            (GenState::Done, _) => {
                gen.set_state(GenState::Done);
                return Ok(None);
            }
            (GenState::Created(frame), Resume::Send(value)) => {
                if !value.is_none() {
                    gen.set_state(GenState::Created(frame));
                    return Err(ExcType::type_error(
                        "can't send non-None value to a just-started generator",
                    ));
                }
                (frame, Resume::Start)
            }
            (GenState::Created(frame), Resume::Start) => (frame, Resume::Start),
            (GenState::Created(frame), Resume::Throw(exc)) => (frame, Resume::Throw(exc)),
            (GenState::Suspended(frame), resume) => (frame, resume),
        };

        if self.depth >= self.rt.recursion_limit {
            let HeapData::Generator(gen) = self.rt.heap.get_mut(gen_id) else {
                return Err(RunError::internal("generator vanished during resume"));
            };
            gen.set_state(GenState::Suspended(frame));
            return Err(ExcType::recursion_error());
        }

        self.depth += 1;
        let result = self.run_frame(&mut frame, resume);
        self.depth -= 1;

        let HeapData::Generator(gen) = self.rt.heap.get_mut(gen_id) else {
            return Err(RunError::internal("generator vanished during resume"));
        };
        match result {
            Ok(Exit::Yield(value)) => {
                gen.set_state(GenState::Suspended(frame));
                Ok(Some(value))
            }
            Ok(Exit::Return(_)) => {
                gen.set_state(GenState::Done);
                Ok(None)
            }
            Err(e) => {
                gen.set_state(GenState::Done);
                Err(e)
            }
        }
    }

    /// `IMPORT_NAME`: returns the cached module or loads, registers and
    /// executes it through the runtime's import hook.
    pub(super) fn import_module(&mut self, name: &str) -> RunResult<Value> {
        if let Some(&id) = self.rt.modules.get(name) {
            return Ok(Value::Ref(id));
        }
        let mut hook = self
            .rt
            .import_hook
            .take()
            .ok_or_else(|| ExcType::import_error(name))?;
        let loaded = hook.load(name);
        self.rt.import_hook = Some(hook);
        let code = loaded?.ok_or_else(|| ExcType::import_error(name))?;

        if self.depth >= self.rt.recursion_limit {
            return Err(ExcType::recursion_error());
        }

        let globals = self.rt.heap.allocate(HeapData::Dict(Dict::new()));
        let module_id = self
            .rt
            .heap
            .allocate(HeapData::Module(Module::new(name, globals)));
        // Registered before the body runs so circular imports find the
        // partially initialized module instead of loading it again.
        self.rt.modules.insert(name.to_string(), module_id);

        let mut frame = Frame::new(code, globals, &[], &mut self.rt.heap);
        self.depth += 1;
        let result = self.run_frame(&mut frame, Resume::Start);
        self.depth -= 1;
        match result {
            Ok(Exit::Return(_)) => Ok(Value::Ref(module_id)),
            Ok(Exit::Yield(_)) => Err(RunError::internal("module code yielded")),
            Err(e) => {
                self.rt.modules.remove(name);
                Err(e)
            }
        }
    }

    pub(super) fn import_from(&mut self, module: &Value, name: &str) -> RunResult<Value> {
        let globals = self.module_globals(module)?;
        dict_get_str(&self.rt.heap, globals, name)
            .ok_or_else(|| ExcType::ImportError.with_arg(format!("cannot import name {name}")).into())
    }

    /// `IMPORT_STAR`: copies every public (non-underscore) binding from the
    /// module into the importing frame's globals.
    pub(super) fn import_star(&mut self, frame: &mut Frame, module: &Value) -> RunResult<()> {
        let globals = self.module_globals(module)?;
        let mut pairs = Vec::new();
        if let HeapData::Dict(dict) = self.rt.heap.get(globals) {
            for entry in dict.entries() {
                if let Some(HeapData::Str(s)) = entry.key.heap_id().map(|id| self.rt.heap.get(id)) {
                    if !s.as_str().starts_with('_') {
                        pairs.push((s.as_str().to_string(), entry.value.clone()));
                    }
                }
            }
        }
        for (name, value) in pairs {
            dict_set_str(&mut self.rt.heap, frame.globals, &name, value)?;
        }
        Ok(())
    }

    fn module_globals(&self, module: &Value) -> RunResult<HeapId> {
        match module.heap_id().map(|id| self.rt.heap.get(id)) {
            Some(HeapData::Module(m)) => Ok(m.globals()),
            _ => Err(RunError::internal("import target is not a module")),
        }
    }

    /// `LOAD_ATTR`: modules expose their globals as attributes; nothing else
    /// has attributes in this object model.
    pub(super) fn load_attr(&mut self, obj: &Value, name: &str) -> RunResult<Value> {
        if let Some(HeapData::Module(m)) = obj.heap_id().map(|id| self.rt.heap.get(id)) {
            let globals = m.globals();
            return dict_get_str(&self.rt.heap, globals, name)
                .ok_or_else(|| ExcType::attribute_error("module", name));
        }
        Err(ExcType::attribute_error(&self.tname(obj), name))
    }

    pub(super) fn store_attr(&mut self, obj: &Value, name: &str, value: Value) -> RunResult<()> {
        if let Some(HeapData::Module(m)) = obj.heap_id().map(|id| self.rt.heap.get(id)) {
            let globals = m.globals();
            return dict_set_str(&mut self.rt.heap, globals, name, value);
        }
        Err(ExcType::attribute_error(&self.tname(obj), name))
    }

    pub(super) fn delete_attr(&mut self, obj: &Value, name: &str) -> RunResult<()> {
        if let Some(HeapData::Module(m)) = obj.heap_id().map(|id| self.rt.heap.get(id)) {
            let globals = m.globals();
            let removed = self.rt.heap.with_entry_mut(globals, |heap, data| match data {
                HeapData::Dict(dict) => Ok(dict.remove_str(heap, name)),
                _ => Err(RunError::internal("module globals is not a dict")),
            })?;
            return match removed {
                Some(_) => Ok(()),
                None => Err(ExcType::attribute_error("module", name)),
            };
        }
        Err(ExcType::attribute_error(&self.tname(obj), name))
    }
}

fn exact_args<const N: usize>(args: Vec<Value>, name: &str) -> RunResult<[Value; N]> {
    let got = args.len();
    args.try_into().map_err(|_| {
        ExcType::type_error(format!(
            "{name}() takes exactly {N} argument{} ({got} given)",
            if N == 1 { "" } else { "s" }
        ))
    })
}

fn arg_count_error(
    name: &str,
    argcount: usize,
    ndefaults: usize,
    given: usize,
    too_many: bool,
) -> RunError {
    let (qualifier, expected) = if ndefaults == 0 {
        ("exactly", argcount)
    } else if too_many {
        ("at most", argcount)
    } else {
        ("at least", argcount - ndefaults)
    };
    ExcType::type_error(format!(
        "{name}() takes {qualifier} {expected} argument{} ({given} given)",
        if expected == 1 { "" } else { "s" }
    ))
}
