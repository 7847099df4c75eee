use std::rc::Rc;

use ahash::AHashMap;

use crate::bytecode::{Code, Exit, Frame, Resume, Vm};
use crate::exception::{ExcType, RunError, RunResult, SimpleException};
use crate::heap::{Heap, HeapData, HeapId};
use crate::io::{PrintWriter, StdPrint};
use crate::types::{ByteArray, Dict, Module, Str};
use crate::value::Value;

/// Supplies code objects for `import` statements.
///
/// The runtime has no filesystem or compiler of its own; when executing code
/// imports a module the hook is asked for its compiled body. Returning
/// `Ok(None)` means the module does not exist (an `ImportError` for the
/// importing code).
pub trait ImportHook {
    fn load(&mut self, name: &str) -> RunResult<Option<Rc<Code>>>;
}

/// An interpreter instance: the heap, the module registry and the settings
/// shared by every frame it runs.
///
/// Single-threaded by construction; run several programs in isolation by
/// creating several runtimes.
pub struct Runtime<P: PrintWriter = StdPrint> {
    pub(crate) heap: Heap,
    /// Loaded modules by name. Entries are roots for garbage collection.
    pub(crate) modules: AHashMap<String, HeapId>,
    pub(crate) import_hook: Option<Box<dyn ImportHook>>,
    pub(crate) print: P,
    pub(crate) recursion_limit: usize,
    /// When set, the interpreter writes one line per executed instruction to
    /// the print writer.
    pub(crate) trace: bool,
    /// The most recently raised-and-handled exception, consulted by a bare
    /// `raise`.
    pub(crate) current_exc: Option<SimpleException>,
}

impl Default for Runtime<StdPrint> {
    fn default() -> Self {
        Self::new()
    }
}

impl Runtime<StdPrint> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_print(StdPrint)
    }
}

impl<P: PrintWriter> Runtime<P> {
    pub fn with_print(print: P) -> Self {
        Self {
            heap: Heap::new(),
            modules: AHashMap::new(),
            import_hook: None,
            print,
            recursion_limit: 1000,
            trace: false,
            current_exc: None,
        }
    }

    pub fn set_import_hook(&mut self, hook: Box<dyn ImportHook>) {
        self.import_hook = Some(hook);
    }

    pub fn set_recursion_limit(&mut self, limit: usize) {
        self.recursion_limit = limit;
    }

    /// Enables or disables the per-instruction execution trace. Trace lines go
    /// to the print writer, interleaved with program output.
    pub fn set_trace(&mut self, on: bool) {
        self.trace = on;
    }

    pub fn print_writer(&self) -> &P {
        &self.print
    }

    pub fn print_writer_mut(&mut self) -> &mut P {
        &mut self.print
    }

    /// Executes a code object as the `__main__` module and returns its result.
    ///
    /// An uncaught `SystemExit` is not an error report: it converts to
    /// [`RunError::SystemExit`] with the status its argument names, so
    /// embedders can exit cleanly while every other uncaught exception keeps
    /// its traceback.
    pub fn run(&mut self, code: Rc<Code>) -> RunResult<Value> {
        let globals = self.heap.allocate(HeapData::Dict(Dict::new()));
        let module_id = self
            .heap
            .allocate(HeapData::Module(Module::new("__main__", globals)));
        self.modules.insert("__main__".to_string(), module_id);

        let mut frame = Frame::new(code, globals, &[], &mut self.heap);
        let result = Vm::new(self).run_frame(&mut frame, Resume::Start);
        match result {
            Ok(Exit::Return(value)) => Ok(value),
            Ok(Exit::Yield(_)) => Err(RunError::internal("module code yielded")),
            Err(RunError::Exc(exc)) if exc.exc_type() == ExcType::SystemExit => {
                let status = match exc.arg() {
                    None => 0,
                    Some(arg) => arg.parse::<i32>().unwrap_or(1),
                };
                Err(RunError::SystemExit(status))
            }
            Err(e) => Err(e),
        }
    }

    /// Calls a callable value with positional arguments, outside any frame.
    pub fn call(&mut self, callable: Value, args: Vec<Value>) -> RunResult<Value> {
        Vm::new(self).call_value(callable, args, Vec::new())
    }

    /// Resumes a generator with a value (`None` for plain `next`). Exhaustion
    /// surfaces as `StopIteration`, matching the in-language protocol.
    pub fn gen_send(&mut self, gen: &Value, value: Value) -> RunResult<Value> {
        let id = self.gen_id(gen)?;
        match Vm::new(self).resume_generator(id, Resume::Send(value))? {
            Some(yielded) => Ok(yielded),
            None => Err(ExcType::stop_iteration()),
        }
    }

    /// Raises an exception at the generator's suspension point.
    pub fn gen_throw(&mut self, gen: &Value, exc: SimpleException) -> RunResult<Value> {
        let id = self.gen_id(gen)?;
        match Vm::new(self).resume_generator(id, Resume::Throw(exc))? {
            Some(yielded) => Ok(yielded),
            None => Err(ExcType::stop_iteration()),
        }
    }

    /// Closes a generator by throwing `GeneratorExit` into it. A generator
    /// that swallows the exception and yields anyway is an error.
    pub fn gen_close(&mut self, gen: &Value) -> RunResult<()> {
        let id = self.gen_id(gen)?;
        match Vm::new(self).resume_generator(id, Resume::Throw(ExcType::GeneratorExit.empty())) {
            Ok(None) => Ok(()),
            Ok(Some(_)) => Err(ExcType::runtime_error("generator ignored GeneratorExit")),
            Err(RunError::Exc(exc))
                if matches!(
                    exc.exc_type(),
                    ExcType::GeneratorExit | ExcType::StopIteration
                ) =>
            {
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn gen_id(&self, gen: &Value) -> RunResult<HeapId> {
        match gen.heap_id() {
            Some(id) if matches!(self.heap.get(id), HeapData::Generator(_)) => Ok(id),
            _ => Err(RunError::internal("not a generator")),
        }
    }

    /// The `repr()` of a value, for embedders inspecting results.
    pub fn repr(&self, value: &Value) -> String {
        value.py_repr(&self.heap)
    }

    /// Allocates a string value, for embedders building arguments.
    pub fn alloc_str(&mut self, text: &str) -> Value {
        Value::Ref(self.heap.allocate(HeapData::Str(Str::from(text))))
    }

    /// Allocates a bytearray value, for embedders building arguments.
    pub fn alloc_bytearray(&mut self, data: &[u8]) -> Value {
        let ba = ByteArray::new(data.to_vec());
        Value::Ref(self.heap.allocate(HeapData::ByteArray(ba)))
    }

    /// Registers a raw view of a bytearray's storage. While any view is
    /// outstanding, operations that would resize or reallocate the storage
    /// fail with `BufferError`; element writes stay legal.
    pub fn export_bytearray(&mut self, value: &Value) -> RunResult<()> {
        match value.heap_id().map(|id| self.heap.get_mut(id)) {
            Some(HeapData::ByteArray(b)) => {
                b.acquire_export();
                Ok(())
            }
            _ => Err(RunError::internal("not a bytearray")),
        }
    }

    /// Releases one view taken with [`Self::export_bytearray`].
    pub fn release_bytearray(&mut self, value: &Value) -> RunResult<()> {
        match value.heap_id().map(|id| self.heap.get_mut(id)) {
            Some(HeapData::ByteArray(b)) => b.release_export(),
            _ => Err(RunError::internal("not a bytearray")),
        }
    }

    /// Copies out a bytearray's current contents.
    pub fn bytearray_contents(&self, value: &Value) -> RunResult<Vec<u8>> {
        match value.heap_id().map(|id| self.heap.get(id)) {
            Some(HeapData::ByteArray(b)) => Ok(b.as_slice().to_vec()),
            _ => Err(RunError::internal("not a bytearray")),
        }
    }

    /// Runs a garbage collection with the module registry (plus any values the
    /// embedder is still holding) as roots. Returns how many heap objects were
    /// freed.
    ///
    /// Only call between runs: a collection while an interpreter is mid-flight
    /// would miss the values on its host stack.
    pub fn collect_garbage(&mut self, extra_roots: &[Value]) -> usize {
        let roots: Vec<HeapId> = self
            .modules
            .values()
            .copied()
            .chain(extra_roots.iter().filter_map(Value::heap_id))
            .collect();
        self.heap.collect(roots)
    }

    /// Number of live heap objects, for tests and leak diagnostics.
    pub fn live_objects(&self) -> usize {
        self.heap.live_count()
    }
}
