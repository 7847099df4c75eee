//! The builtin type library: everything the numeric, sequence and mapping
//! opcodes operate on.

mod bytes;
mod complex;
mod dict;
mod function;
mod generator;
mod iterator;
mod list;
mod long;
mod range;
mod slice;
mod str;

pub(crate) use bytes::{ByteArray, Bytes};
pub(crate) use complex::Complex;
pub(crate) use dict::Dict;
pub(crate) use function::{Function, Module};
pub(crate) use generator::{GenState, Generator};
pub(crate) use iterator::SeqIterator;
pub(crate) use list::{List, Tuple};
pub(crate) use long::{
    big_floordiv, big_mod, big_pow, big_shl, big_shr, big_to_f64, big_truediv, cmp_big_f64, demote,
    hash_big, hash_i64, LongInt,
};
pub(crate) use range::Range;
pub(crate) use slice::Slice;
pub(crate) use str::Str;

use strum::Display;

/// The user-visible type of a value, as it appears in error messages and
/// reprs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Type {
    #[strum(serialize = "NoneType")]
    NoneType,
    #[strum(serialize = "ellipsis")]
    Ellipsis,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "int")]
    Int,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "complex")]
    Complex,
    #[strum(serialize = "str")]
    Str,
    #[strum(serialize = "bytes")]
    Bytes,
    #[strum(serialize = "bytearray")]
    ByteArray,
    #[strum(serialize = "tuple")]
    Tuple,
    #[strum(serialize = "list")]
    List,
    #[strum(serialize = "dict")]
    Dict,
    #[strum(serialize = "slice")]
    Slice,
    #[strum(serialize = "range")]
    Range,
    #[strum(serialize = "function")]
    Function,
    #[strum(serialize = "builtin_function_or_method")]
    Builtin,
    #[strum(serialize = "type")]
    ExcClass,
    #[strum(serialize = "cell")]
    Cell,
    #[strum(serialize = "exception")]
    Exception,
    #[strum(serialize = "iterator")]
    Iterator,
    #[strum(serialize = "generator")]
    Generator,
    #[strum(serialize = "module")]
    Module,
    /// Interpreter-internal sentinels; never observable from user code.
    #[strum(serialize = "<internal>")]
    Internal,
}
