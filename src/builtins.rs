use std::str::FromStr;

use strum::Display;

use crate::exception::ExcType;
use crate::value::Value;

/// The native functions and exception classes available to every frame
/// without an import.
///
/// These are values (`Value::Builtin`), resolved by `LOAD_GLOBAL` when a name
/// is missing from the module globals. Exception classes double as callables
/// (constructing an exception instance) and as the patterns `except` clauses
/// match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "lowercase")]
pub enum Builtins {
    Print,
    Len,
    Repr,
    Iter,
    Next,
    Isinstance,
    Range,
    Bytearray,
    #[strum(to_string = "{0}")]
    Exc(ExcType),
}

/// Resolves a builtin by name, the final step of global lookup.
pub(crate) fn lookup(name: &str) -> Option<Value> {
    let builtin = match name {
        "print" => Builtins::Print,
        "len" => Builtins::Len,
        "repr" => Builtins::Repr,
        "iter" => Builtins::Iter,
        "next" => Builtins::Next,
        "isinstance" => Builtins::Isinstance,
        "range" => Builtins::Range,
        "bytearray" => Builtins::Bytearray,
        _ => Builtins::Exc(ExcType::from_str(name).ok()?),
    };
    Some(Value::Builtin(builtin))
}
