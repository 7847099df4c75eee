use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::fmt::Write;
use std::hash::{Hash, Hasher};

use ahash::AHashSet;
use num_bigint::BigInt;
use num_traits::FromPrimitive;

use crate::builtins::Builtins;
use crate::bytecode::Why;
use crate::exception::{ExcType, RunError, RunResult};
use crate::heap::{Heap, HeapData, HeapId};
use crate::types::{cmp_big_f64, hash_big, hash_i64, Type};

/// A runtime value.
///
/// Small immutable kinds live inline; everything else is a handle into the
/// heap arena. `Value` is cheap to clone — heap kinds clone the handle, giving
/// containers reference/aliasing semantics.
///
/// Two variants never reach user code: `Undefined` marks an unbound local or
/// cell slot, and `Why` is the unwind sentinel the interpreter pushes for
/// `END_FINALLY` (see the interpreter loop).
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    None,
    Ellipsis,
    Undefined,
    Bool(bool),
    Int(i64),
    Float(f64),
    Builtin(Builtins),
    Why(Why),
    Ref(HeapId),
}

impl Value {
    pub(crate) fn heap_id(&self) -> Option<HeapId> {
        match self {
            Self::Ref(id) => Some(*id),
            _ => None,
        }
    }

    /// Convenience for tests and embedders.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::Bool(b) => Some(i64::from(*b)),
            _ => None,
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub(crate) fn type_of(&self, heap: &Heap) -> Type {
        match self {
            Self::None => Type::NoneType,
            Self::Ellipsis => Type::Ellipsis,
            Self::Undefined | Self::Why(_) => Type::Internal,
            Self::Bool(_) => Type::Bool,
            Self::Int(_) => Type::Int,
            Self::Float(_) => Type::Float,
            Self::Builtin(Builtins::Exc(_)) => Type::ExcClass,
            Self::Builtin(_) => Type::Builtin,
            Self::Ref(id) => heap.get(*id).py_type(),
        }
    }

    pub(crate) fn py_bool(&self, heap: &Heap) -> bool {
        match self {
            Self::None => false,
            Self::Bool(b) => *b,
            Self::Int(i) => *i != 0,
            Self::Float(f) => *f != 0.0,
            Self::Ellipsis | Self::Undefined | Self::Why(_) | Self::Builtin(_) => true,
            Self::Ref(id) => heap.get(*id).py_bool(),
        }
    }

    pub(crate) fn py_len(&self, heap: &Heap) -> Option<usize> {
        match self {
            Self::Ref(id) => heap.get(*id).py_len(),
            _ => None,
        }
    }

    /// Converts to a machine index for subscripting.
    pub(crate) fn index_i64(&self, heap: &Heap) -> RunResult<Option<i64>> {
        match self {
            Self::Int(i) => Ok(Some(*i)),
            Self::Bool(b) => Ok(Some(i64::from(*b))),
            Self::Ref(id) => match heap.get(*id) {
                HeapData::Long(_) => Err(ExcType::IndexError
                    .with_arg("cannot fit 'int' into an index-sized integer")
                    .into()),
                _ => Ok(None),
            },
            _ => Ok(None),
        }
    }

    /// Equality with cross-kind numeric agreement: `1 == 1.0 == True`, and a
    /// heap long equals the float/int it mathematically equals.
    pub(crate) fn py_eq(&self, other: &Value, heap: &mut Heap) -> bool {
        if let Some(ord) = numeric_cmp(self, other, heap) {
            return ord == Some(Ordering::Equal);
        }
        match (self, other) {
            (Self::None, Self::None) | (Self::Ellipsis, Self::Ellipsis) => true,
            (Self::Builtin(a), Self::Builtin(b)) => a == b,
            (Self::Ref(a), Self::Ref(b)) => {
                if a == b {
                    return true;
                }
                heap.with_two(*a, *b, |heap, left, right| match (left, right) {
                    (HeapData::Str(x), HeapData::Str(y)) => x.as_str() == y.as_str(),
                    (HeapData::Bytes(x), HeapData::Bytes(y)) => x.as_slice() == y.as_slice(),
                    (HeapData::Bytes(x), HeapData::ByteArray(y)) => x.as_slice() == y.as_slice(),
                    (HeapData::ByteArray(x), HeapData::Bytes(y)) => x.as_slice() == y.as_slice(),
                    (HeapData::ByteArray(x), HeapData::ByteArray(y)) => {
                        x.as_slice() == y.as_slice()
                    }
                    (HeapData::Complex(x), HeapData::Complex(y)) => x == y,
                    (HeapData::Tuple(x), HeapData::Tuple(y)) => {
                        eq_values(x.as_vec(), y.as_vec(), heap)
                    }
                    (HeapData::List(x), HeapData::List(y)) => {
                        eq_values(x.as_vec(), y.as_vec(), heap)
                    }
                    (HeapData::Dict(x), HeapData::Dict(y)) => x.eq(y, heap),
                    (HeapData::Slice(x), HeapData::Slice(y)) => x == y,
                    (HeapData::Range(x), HeapData::Range(y)) => x == y,
                    _ => false,
                })
            }
            _ => false,
        }
    }

    /// Hash agreeing with `py_eq`: values that compare equal hash equally,
    /// including across Int/Long/Float/Bool.
    pub(crate) fn py_hash(&self, heap: &mut Heap) -> RunResult<u64> {
        match self {
            Self::None => Ok(const_hash("None")),
            Self::Ellipsis => Ok(const_hash("Ellipsis")),
            Self::Bool(b) => Ok(hash_i64(i64::from(*b))),
            Self::Int(i) => Ok(hash_i64(*i)),
            Self::Float(f) => Ok(hash_f64(*f)),
            Self::Builtin(b) => {
                let mut hasher = DefaultHasher::new();
                std::mem::discriminant(b).hash(&mut hasher);
                if let Builtins::Exc(et) = b {
                    et.hash(&mut hasher);
                }
                Ok(hasher.finish())
            }
            Self::Ref(id) => heap
                .get_or_compute_hash(*id)
                .ok_or_else(|| ExcType::type_error_unhashable(&heap.get(*id).py_type().to_string())),
            Self::Undefined | Self::Why(_) => {
                Err(RunError::internal("hash of interpreter-internal sentinel"))
            }
        }
    }

    pub(crate) fn py_repr(&self, heap: &Heap) -> String {
        let mut out = String::new();
        let mut seen = AHashSet::new();
        let _ = self.repr_fmt(&mut out, heap, &mut seen);
        out
    }

    /// `str()` form: strings unquoted, exceptions render their message.
    pub(crate) fn py_str(&self, heap: &Heap) -> String {
        match self {
            Self::Ref(id) => match heap.get(*id) {
                HeapData::Str(s) => s.as_str().to_string(),
                HeapData::Exception(e) => e.arg().unwrap_or_default().to_string(),
                _ => self.py_repr(heap),
            },
            _ => self.py_repr(heap),
        }
    }

    pub(crate) fn repr_fmt(
        &self,
        f: &mut impl Write,
        heap: &Heap,
        seen: &mut AHashSet<HeapId>,
    ) -> std::fmt::Result {
        match self {
            Self::None => f.write_str("None"),
            Self::Ellipsis => f.write_str("Ellipsis"),
            Self::Undefined => f.write_str("<undefined>"),
            Self::Why(_) => f.write_str("<why>"),
            Self::Bool(true) => f.write_str("True"),
            Self::Bool(false) => f.write_str("False"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(v) => f.write_str(&float_repr(*v)),
            Self::Builtin(Builtins::Exc(et)) => write!(f, "<class '{et}'>"),
            Self::Builtin(b) => write!(f, "<built-in function {b}>"),
            Self::Ref(id) => repr_heap(*id, f, heap, seen),
        }
    }
}

fn repr_heap(
    id: HeapId,
    f: &mut impl Write,
    heap: &Heap,
    seen: &mut AHashSet<HeapId>,
) -> std::fmt::Result {
    match heap.get(id) {
        HeapData::Long(l) => write!(f, "{l}"),
        HeapData::Complex(c) => write!(f, "{c}"),
        HeapData::Str(s) => s.repr_fmt(f),
        HeapData::Bytes(b) => b.repr_fmt(f),
        HeapData::ByteArray(b) => b.repr_fmt(f),
        HeapData::Tuple(t) => {
            if !seen.insert(id) {
                return f.write_str("(...)");
            }
            f.write_char('(')?;
            for (i, item) in t.as_vec().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                item.repr_fmt(f, heap, seen)?;
            }
            if t.len() == 1 {
                f.write_char(',')?;
            }
            seen.remove(&id);
            f.write_char(')')
        }
        HeapData::List(l) => {
            if !seen.insert(id) {
                return f.write_str("[...]");
            }
            f.write_char('[')?;
            for (i, item) in l.as_vec().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                item.repr_fmt(f, heap, seen)?;
            }
            seen.remove(&id);
            f.write_char(']')
        }
        HeapData::Dict(d) => {
            if !seen.insert(id) {
                return f.write_str("{...}");
            }
            f.write_char('{')?;
            for (i, entry) in d.entries().iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                entry.key.repr_fmt(f, heap, seen)?;
                f.write_str(": ")?;
                entry.value.repr_fmt(f, heap, seen)?;
            }
            seen.remove(&id);
            f.write_char('}')
        }
        HeapData::Slice(s) => {
            let part = |v: Option<i64>| v.map_or_else(|| "None".to_string(), |i| i.to_string());
            write!(
                f,
                "slice({}, {}, {})",
                part(s.start),
                part(s.stop),
                part(s.step)
            )
        }
        HeapData::Range(r) => write!(f, "{r}"),
        HeapData::Function(func) => write!(f, "<function {}>", func.name()),
        HeapData::Cell(_) => f.write_str("<cell>"),
        HeapData::Exception(e) => {
            write!(f, "{}(", e.exc_type())?;
            if let Some(arg) = e.arg() {
                crate::types::Str::from(arg).repr_fmt(f)?;
            }
            f.write_char(')')
        }
        HeapData::Iterator(_) => f.write_str("<iterator>"),
        HeapData::Generator(g) => write!(f, "<generator {}>", g.name()),
        HeapData::Module(m) => write!(f, "<module '{}'>", m.name()),
    }
}

fn eq_values(a: &[Value], b: &[Value], heap: &mut Heap) -> bool {
    if a.len() != b.len() {
        return false;
    }
    // Clone to release the borrows on the two container payloads before
    // recursing into the heap.
    let a: Vec<Value> = a.to_vec();
    let b: Vec<Value> = b.to_vec();
    a.iter().zip(b.iter()).all(|(x, y)| x.py_eq(y, heap))
}

/// Three-way numeric comparison across Int/Bool/Float and heap longs.
///
/// Returns `None` when either operand is not numeric; `Some(None)` when both
/// are numeric but unordered (NaN). Comparisons involving a long and a float
/// are exact — the long is never truncated to fit the float.
pub(crate) fn numeric_cmp(a: &Value, b: &Value, heap: &Heap) -> Option<Option<Ordering>> {
    enum Num {
        Small(i64),
        Big(BigInt),
        Float(f64),
    }
    fn num_of(v: &Value, heap: &Heap) -> Option<Num> {
        match v {
            Value::Bool(b) => Some(Num::Small(i64::from(*b))),
            Value::Int(i) => Some(Num::Small(*i)),
            Value::Float(f) => Some(Num::Float(*f)),
            Value::Ref(id) => match heap.get(*id) {
                HeapData::Long(l) => Some(Num::Big(l.inner().clone())),
                _ => None,
            },
            _ => None,
        }
    }
    let x = num_of(a, heap)?;
    let y = num_of(b, heap)?;
    let ord = match (x, y) {
        (Num::Small(p), Num::Small(q)) => Some(p.cmp(&q)),
        (Num::Small(p), Num::Big(q)) => Some(BigInt::from(p).cmp(&q)),
        (Num::Big(p), Num::Small(q)) => Some(p.cmp(&BigInt::from(q))),
        (Num::Big(p), Num::Big(q)) => Some(p.cmp(&q)),
        (Num::Float(p), Num::Float(q)) => p.partial_cmp(&q),
        (Num::Small(p), Num::Float(q)) => cmp_big_f64(&BigInt::from(p), q),
        (Num::Float(p), Num::Small(q)) => cmp_big_f64(&BigInt::from(q), p).map(Ordering::reverse),
        (Num::Big(p), Num::Float(q)) => cmp_big_f64(&p, q),
        (Num::Float(p), Num::Big(q)) => cmp_big_f64(&q, p).map(Ordering::reverse),
    };
    Some(ord)
}

/// Hash for floats, agreeing with integer hashing on integral values.
pub(crate) fn hash_f64(f: f64) -> u64 {
    if f.is_finite() && f.fract() == 0.0 {
        if let Some(big) = BigInt::from_f64(f) {
            return hash_big(&big);
        }
    }
    let mut hasher = DefaultHasher::new();
    // Normalize -0.0 to 0.0 so the two equal floats hash equally.
    let f = if f == 0.0 { 0.0 } else { f };
    f.to_bits().hash(&mut hasher);
    hasher.finish()
}

/// Content hash for text, shared by heap `Str` keys and bare `&str` lookups.
pub(crate) fn hash_str(s: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    s.hash(&mut hasher);
    hasher.finish()
}

fn const_hash(tag: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    tag.hash(&mut hasher);
    hasher.finish()
}

fn float_repr(f: f64) -> String {
    if f.is_nan() {
        "nan".to_string()
    } else if f == f64::INFINITY {
        "inf".to_string()
    } else if f == f64::NEG_INFINITY {
        "-inf".to_string()
    } else {
        format!("{f:?}")
    }
}
