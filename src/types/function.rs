use std::rc::Rc;

use crate::bytecode::Code;
use crate::heap::HeapId;
use crate::value::Value;

/// A callable built from a code object, together with evaluated default
/// arguments, any cells captured from enclosing scopes, and the globals dict
/// of the module that defined it.
///
/// The code object is shared: calling the function many times creates many
/// frames over the same `Rc<Code>`. `globals` is `None` only for the bare
/// function a `Code` constant loads as, before `MAKE_FUNCTION` binds it to
/// its module.
#[derive(Debug, Clone)]
pub(crate) struct Function {
    code: Rc<Code>,
    defaults: Vec<Value>,
    closure: Vec<HeapId>,
    globals: Option<HeapId>,
}

impl Function {
    pub fn new(
        code: Rc<Code>,
        defaults: Vec<Value>,
        closure: Vec<HeapId>,
        globals: Option<HeapId>,
    ) -> Self {
        Self {
            code,
            defaults,
            closure,
            globals,
        }
    }

    pub fn code(&self) -> &Rc<Code> {
        &self.code
    }

    pub fn name(&self) -> &str {
        self.code.name()
    }

    pub fn defaults(&self) -> &[Value] {
        &self.defaults
    }

    pub fn closure(&self) -> &[HeapId] {
        &self.closure
    }

    pub fn globals(&self) -> Option<HeapId> {
        self.globals
    }
}

/// A loaded module: a name plus the dict that backs both its attributes and
/// the globals of any frame executing its code. The two alias the same heap
/// dict, so `module.attr` observes assignments made by module-level code.
#[derive(Debug, Clone)]
pub(crate) struct Module {
    name: String,
    globals: HeapId,
}

impl Module {
    pub fn new(name: impl Into<String>, globals: HeapId) -> Self {
        Self {
            name: name.into(),
            globals,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn globals(&self) -> HeapId {
        self.globals
    }
}
