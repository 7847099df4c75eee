use std::fmt::{self, Write as _};

use strum::{Display, EnumString, IntoStaticStr};

/// Result alias used by every fallible runtime operation.
pub type RunResult<T> = Result<T, RunError>;

/// The kinds of exception the runtime can raise.
///
/// These form a fixed class hierarchy (see [`ExcType::parent`]); `except`
/// clauses match via [`ExcType::is_subclass_of`]. The string representation of
/// each variant is the user-visible class name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum ExcType {
    BaseException,
    Exception,
    SystemExit,
    KeyboardInterrupt,
    GeneratorExit,
    StopIteration,
    ArithmeticError,
    ZeroDivisionError,
    OverflowError,
    LookupError,
    IndexError,
    KeyError,
    TypeError,
    ValueError,
    NameError,
    UnboundLocalError,
    AttributeError,
    ImportError,
    BufferError,
    RuntimeError,
    RecursionError,
}

impl ExcType {
    /// The immediate base class, or `None` for `BaseException`.
    pub fn parent(self) -> Option<Self> {
        match self {
            Self::BaseException => None,
            Self::SystemExit | Self::KeyboardInterrupt | Self::GeneratorExit | Self::Exception => {
                Some(Self::BaseException)
            }
            Self::StopIteration
            | Self::ArithmeticError
            | Self::LookupError
            | Self::TypeError
            | Self::ValueError
            | Self::NameError
            | Self::AttributeError
            | Self::ImportError
            | Self::BufferError
            | Self::RuntimeError => Some(Self::Exception),
            Self::ZeroDivisionError | Self::OverflowError => Some(Self::ArithmeticError),
            Self::IndexError | Self::KeyError => Some(Self::LookupError),
            Self::UnboundLocalError => Some(Self::NameError),
            Self::RecursionError => Some(Self::RuntimeError),
        }
    }

    /// Whether `self` is `other` or a (transitive) subclass of it.
    pub fn is_subclass_of(self, other: Self) -> bool {
        let mut cur = Some(self);
        while let Some(t) = cur {
            if t == other {
                return true;
            }
            cur = t.parent();
        }
        false
    }

    /// Creates an exception of this kind with no argument.
    pub fn empty(self) -> SimpleException {
        SimpleException::new(self, None)
    }

    /// Creates an exception of this kind with a message argument.
    pub fn with_arg(self, arg: impl Into<String>) -> SimpleException {
        SimpleException::new(self, Some(arg.into()))
    }

    // Constructors for the errors the interpreter raises itself. Each returns
    // a `RunError` so call sites can write `Err(ExcType::zero_division())?`.

    pub(crate) fn zero_division() -> RunError {
        Self::ZeroDivisionError
            .with_arg("integer division or modulo by zero")
            .into()
    }

    pub(crate) fn zero_division_float() -> RunError {
        Self::ZeroDivisionError.with_arg("float division by zero").into()
    }

    pub(crate) fn type_error(msg: impl Into<String>) -> RunError {
        Self::TypeError.with_arg(msg).into()
    }

    pub(crate) fn type_error_binary(op: &str, left: &str, right: &str) -> RunError {
        Self::TypeError
            .with_arg(format!(
                "unsupported operand type(s) for {op}: '{left}' and '{right}'"
            ))
            .into()
    }

    pub(crate) fn type_error_unary(op: &str, operand: &str) -> RunError {
        Self::TypeError
            .with_arg(format!("bad operand type for unary {op}: '{operand}'"))
            .into()
    }

    pub(crate) fn type_error_not_callable(type_name: &str) -> RunError {
        Self::TypeError
            .with_arg(format!("'{type_name}' object is not callable"))
            .into()
    }

    pub(crate) fn type_error_not_iterable(type_name: &str) -> RunError {
        Self::TypeError
            .with_arg(format!("'{type_name}' object is not iterable"))
            .into()
    }

    pub(crate) fn type_error_unhashable(type_name: &str) -> RunError {
        Self::TypeError
            .with_arg(format!("unhashable type: '{type_name}'"))
            .into()
    }

    pub(crate) fn type_error_not_subscriptable(type_name: &str) -> RunError {
        Self::TypeError
            .with_arg(format!("'{type_name}' object is not subscriptable"))
            .into()
    }

    pub(crate) fn value_error(msg: impl Into<String>) -> RunError {
        Self::ValueError.with_arg(msg).into()
    }

    pub(crate) fn overflow(msg: impl Into<String>) -> RunError {
        Self::OverflowError.with_arg(msg).into()
    }

    pub(crate) fn index_error(kind: &str) -> RunError {
        Self::IndexError.with_arg(format!("{kind} index out of range")).into()
    }

    pub(crate) fn key_error(key_repr: impl Into<String>) -> RunError {
        Self::KeyError.with_arg(key_repr).into()
    }

    pub(crate) fn name_error(name: &str) -> RunError {
        Self::NameError
            .with_arg(format!("name '{name}' is not defined"))
            .into()
    }

    pub(crate) fn unbound_local(name: &str) -> RunError {
        Self::UnboundLocalError
            .with_arg(format!("local variable '{name}' referenced before assignment"))
            .into()
    }

    pub(crate) fn attribute_error(type_name: &str, attr: &str) -> RunError {
        Self::AttributeError
            .with_arg(format!("'{type_name}' object has no attribute '{attr}'"))
            .into()
    }

    pub(crate) fn import_error(name: &str) -> RunError {
        Self::ImportError.with_arg(format!("No module named {name}")).into()
    }

    pub(crate) fn stop_iteration() -> RunError {
        Self::StopIteration.empty().into()
    }

    pub(crate) fn buffer_error_resize() -> RunError {
        Self::BufferError
            .with_arg("Existing exports of data: object cannot be re-sized")
            .into()
    }

    pub(crate) fn recursion_error() -> RunError {
        Self::RecursionError
            .with_arg("maximum recursion depth exceeded")
            .into()
    }

    pub(crate) fn runtime_error(msg: impl Into<String>) -> RunError {
        Self::RuntimeError.with_arg(msg).into()
    }
}

/// One level of an exception's traceback: the code object's name and the
/// source line active when the exception passed through it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracebackFrame {
    pub code_name: String,
    pub filename: String,
    pub line: u32,
}

/// A raised exception: its kind, an optional string argument, and the
/// traceback accumulated while it propagated out of frames.
#[derive(Debug, Clone)]
pub struct SimpleException {
    exc_type: ExcType,
    arg: Option<String>,
    traceback: Vec<TracebackFrame>,
}

impl SimpleException {
    pub fn new(exc_type: ExcType, arg: Option<String>) -> Self {
        Self {
            exc_type,
            arg,
            traceback: Vec::new(),
        }
    }

    pub fn exc_type(&self) -> ExcType {
        self.exc_type
    }

    pub fn arg(&self) -> Option<&str> {
        self.arg.as_deref()
    }

    pub fn traceback(&self) -> &[TracebackFrame] {
        &self.traceback
    }

    /// Records that the exception propagated out of a frame. Called by the
    /// interpreter as the exception leaves each activation, innermost first.
    pub(crate) fn push_frame(&mut self, code_name: &str, filename: &str, line: u32) {
        self.traceback.push(TracebackFrame {
            code_name: code_name.to_string(),
            filename: filename.to_string(),
            line,
        });
    }

    /// Renders the uncaught-exception report: a traceback (outermost frame
    /// first) followed by `Kind: message`.
    #[must_use]
    pub fn report(&self) -> String {
        let mut out = String::new();
        if !self.traceback.is_empty() {
            out.push_str("Traceback (most recent call last):\n");
            for tb in self.traceback.iter().rev() {
                let _ = writeln!(
                    out,
                    "  File \"{}\", line {}, in {}",
                    tb.filename, tb.line, tb.code_name
                );
            }
        }
        out.push_str(&self.exc_type.to_string());
        if let Some(arg) = &self.arg {
            if !arg.is_empty() {
                let _ = write!(out, ": {arg}");
            }
        }
        out
    }
}

impl fmt::Display for SimpleException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.exc_type)?;
        match &self.arg {
            Some(arg) if !arg.is_empty() => write!(f, ": {arg}"),
            _ => Ok(()),
        }
    }
}

/// An error propagating out of the interpreter.
///
/// Only the `Exc` variant participates in the block-stack unwind protocol;
/// `SystemExit` and `Internal` pass straight through every handler. `Internal`
/// marks a contract violation by the code-object producer (corrupt bytecode,
/// stack underflow) and is deliberately uncatchable.
#[derive(Debug, Clone)]
pub enum RunError {
    Exc(SimpleException),
    SystemExit(i32),
    Internal(String),
}

impl RunError {
    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// The exception payload, if this error is a catchable exception.
    pub fn as_exc(&self) -> Option<&SimpleException> {
        match self {
            Self::Exc(exc) => Some(exc),
            _ => None,
        }
    }
}

impl From<SimpleException> for RunError {
    fn from(exc: SimpleException) -> Self {
        Self::Exc(exc)
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exc(exc) => write!(f, "{exc}"),
            Self::SystemExit(status) => write!(f, "SystemExit: {status}"),
            Self::Internal(msg) => write!(f, "internal error: {msg}"),
        }
    }
}

impl std::error::Error for RunError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subclass_hierarchy() {
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::ArithmeticError));
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::Exception));
        assert!(ExcType::ZeroDivisionError.is_subclass_of(ExcType::BaseException));
        assert!(ExcType::KeyError.is_subclass_of(ExcType::LookupError));
        assert!(ExcType::UnboundLocalError.is_subclass_of(ExcType::NameError));
        assert!(ExcType::RecursionError.is_subclass_of(ExcType::RuntimeError));
        assert!(!ExcType::KeyError.is_subclass_of(ExcType::IndexError));
        assert!(!ExcType::Exception.is_subclass_of(ExcType::ValueError));
    }

    #[test]
    fn test_system_exit_not_an_exception_subclass() {
        assert!(ExcType::SystemExit.is_subclass_of(ExcType::BaseException));
        assert!(!ExcType::SystemExit.is_subclass_of(ExcType::Exception));
        assert!(ExcType::GeneratorExit.is_subclass_of(ExcType::BaseException));
        assert!(!ExcType::GeneratorExit.is_subclass_of(ExcType::Exception));
    }

    #[test]
    fn test_display_names() {
        assert_eq!(ExcType::ZeroDivisionError.to_string(), "ZeroDivisionError");
        assert_eq!(
            "StopIteration".parse::<ExcType>().unwrap(),
            ExcType::StopIteration
        );
    }

    #[test]
    fn test_report_format() {
        let mut exc = ExcType::ValueError.with_arg("bad value");
        exc.push_frame("inner", "<code>", 3);
        exc.push_frame("<module>", "<code>", 10);
        let report = exc.report();
        assert_eq!(
            report,
            "Traceback (most recent call last):\n  File \"<code>\", line 10, in <module>\n  File \"<code>\", line 3, in inner\nValueError: bad value"
        );
    }
}
