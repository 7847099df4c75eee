//! Numeric and sequence operator dispatch for the interpreter loop.
//!
//! Integers follow a two-level representation: `i64` fast paths with checked
//! arithmetic, promoting through `BigInt` on overflow and demoting results
//! that fit back (see the types module). Mixed-kind operands coerce upward
//! through int -> big -> float -> complex before dispatch.

use std::cmp::Ordering;

use num_bigint::BigInt;

use crate::builtins::Builtins;
use crate::exception::{ExcType, RunError, RunResult};
use crate::heap::{Heap, HeapData};
use crate::io::PrintWriter;
use crate::types::{
    big_floordiv, big_mod, big_pow, big_shl, big_shr, big_to_f64, big_truediv, demote, ByteArray,
    Bytes, Complex, List, Str, Tuple,
};
use crate::value::{numeric_cmp, Value};

use super::super::code::CodeFlags;
use super::super::op::{CompareOp, Opcode};
use super::Vm;

enum Coerced {
    Ints(i64, i64),
    Bigs(BigInt, BigInt),
    Floats(f64, f64),
    Complexes(Complex, Complex),
}

enum Operand {
    Int(i64),
    Big(BigInt),
    Float(f64),
    Complex(Complex),
    Other,
}

fn operand_of(v: &Value, heap: &Heap) -> Operand {
    match v {
        Value::Bool(b) => Operand::Int(i64::from(*b)),
        Value::Int(i) => Operand::Int(*i),
        Value::Float(f) => Operand::Float(*f),
        Value::Ref(id) => match heap.get(*id) {
            HeapData::Long(l) => Operand::Big(l.inner().clone()),
            HeapData::Complex(c) => Operand::Complex(*c),
            _ => Operand::Other,
        },
        _ => Operand::Other,
    }
}

/// Coerces two values to a common numeric kind, or `None` if either is not
/// numeric.
fn coerce(v: &Value, w: &Value, heap: &Heap) -> RunResult<Option<Coerced>> {
    use Operand::{Big, Complex, Float, Int, Other};

    fn as_f64(op: Operand) -> RunResult<f64> {
        match op {
            Int(i) => Ok(i as f64),
            Big(b) => big_to_f64(&b),
            Float(f) => Ok(f),
            Complex(_) | Other => Err(RunError::internal("numeric coercion")),
        }
    }
    fn as_complex(op: Operand) -> RunResult<crate::types::Complex> {
        match op {
            Complex(c) => Ok(c),
            other => Ok(crate::types::Complex::new(as_f64(other)?, 0.0)),
        }
    }

    let a = operand_of(v, heap);
    let b = operand_of(w, heap);
    Ok(Some(match (a, b) {
        (Other, _) | (_, Other) => return Ok(None),
        (Complex(x), y) => Coerced::Complexes(x, as_complex(y)?),
        (x, Complex(y)) => Coerced::Complexes(as_complex(x)?, y),
        (Float(x), y) => Coerced::Floats(x, as_f64(y)?),
        (x, Float(y)) => Coerced::Floats(as_f64(x)?, y),
        (Big(x), Big(y)) => Coerced::Bigs(x, y),
        (Big(x), Int(y)) => Coerced::Bigs(x, BigInt::from(y)),
        (Int(x), Big(y)) => Coerced::Bigs(BigInt::from(x), y),
        (Int(x), Int(y)) => Coerced::Ints(x, y),
    }))
}

fn op_symbol(op: Opcode) -> &'static str {
    match op {
        Opcode::BinaryPower => "** or pow()",
        Opcode::BinaryMultiply => "*",
        Opcode::BinaryDivide | Opcode::BinaryTrueDivide => "/",
        Opcode::BinaryFloorDivide => "//",
        Opcode::BinaryModulo => "%",
        Opcode::BinaryAdd => "+",
        Opcode::BinarySubtract => "-",
        Opcode::BinaryLshift => "<<",
        Opcode::BinaryRshift => ">>",
        Opcode::BinaryAnd => "&",
        Opcode::BinaryXor => "^",
        Opcode::BinaryOr => "|",
        _ => "?",
    }
}

impl<P: PrintWriter> Vm<'_, P> {
    pub(super) fn tname(&self, v: &Value) -> String {
        v.type_of(&self.rt.heap).to_string()
    }

    fn type_err(&self, op: Opcode, v: &Value, w: &Value) -> RunError {
        ExcType::type_error_binary(op_symbol(op), &self.tname(v), &self.tname(w))
    }

    pub(super) fn unary_positive(&mut self, v: Value) -> RunResult<Value> {
        match operand_of(&v, &self.rt.heap) {
            Operand::Int(i) => Ok(Value::Int(i)),
            Operand::Big(_) | Operand::Float(_) | Operand::Complex(_) => Ok(v),
            Operand::Other => Err(ExcType::type_error_unary("+", &self.tname(&v))),
        }
    }

    pub(super) fn unary_negative(&mut self, v: Value) -> RunResult<Value> {
        match operand_of(&v, &self.rt.heap) {
            Operand::Int(i) => Ok(match i.checked_neg() {
                Some(r) => Value::Int(r),
                None => demote(-BigInt::from(i), &mut self.rt.heap),
            }),
            Operand::Big(b) => Ok(demote(-b, &mut self.rt.heap)),
            Operand::Float(f) => Ok(Value::Float(-f)),
            Operand::Complex(c) => Ok(self.alloc_complex(c.neg())),
            Operand::Other => Err(ExcType::type_error_unary("-", &self.tname(&v))),
        }
    }

    pub(super) fn unary_invert(&mut self, v: Value) -> RunResult<Value> {
        match operand_of(&v, &self.rt.heap) {
            Operand::Int(i) => Ok(Value::Int(!i)),
            Operand::Big(b) => Ok(demote(-(b + BigInt::from(1)), &mut self.rt.heap)),
            _ => Err(ExcType::type_error_unary("~", &self.tname(&v))),
        }
    }

    /// Dispatch for the always-true-division binary opcodes.
    #[allow(clippy::too_many_lines)]
    pub(super) fn binary(&mut self, op: Opcode, v: Value, w: Value) -> RunResult<Value> {
        // `&` / `^` / `|` on two bools stay bool.
        if let (Value::Bool(a), Value::Bool(b)) = (&v, &w) {
            match op {
                Opcode::BinaryAnd => return Ok(Value::Bool(*a && *b)),
                Opcode::BinaryOr => return Ok(Value::Bool(*a || *b)),
                Opcode::BinaryXor => return Ok(Value::Bool(a != b)),
                _ => {}
            }
        }

        if let Some(pair) = coerce(&v, &w, &self.rt.heap)? {
            return self.binary_numeric(op, pair, &v, &w);
        }

        match op {
            Opcode::BinaryAdd => self.seq_concat(&v, &w),
            Opcode::BinaryMultiply => self.seq_repeat(&v, &w),
            _ => Err(self.type_err(op, &v, &w)),
        }
    }

    #[allow(clippy::too_many_lines)]
    fn binary_numeric(
        &mut self,
        op: Opcode,
        pair: Coerced,
        v: &Value,
        w: &Value,
    ) -> RunResult<Value> {
        let heap = &mut self.rt.heap;
        match (op, pair) {
            (Opcode::BinaryAdd, Coerced::Ints(a, b)) => Ok(match a.checked_add(b) {
                Some(r) => Value::Int(r),
                None => demote(BigInt::from(a) + b, heap),
            }),
            (Opcode::BinaryAdd, Coerced::Bigs(a, b)) => Ok(demote(a + b, heap)),
            (Opcode::BinaryAdd, Coerced::Floats(a, b)) => Ok(Value::Float(a + b)),
            (Opcode::BinaryAdd, Coerced::Complexes(a, b)) => Ok(self.alloc_complex(a.add(b))),

            (Opcode::BinarySubtract, Coerced::Ints(a, b)) => Ok(match a.checked_sub(b) {
                Some(r) => Value::Int(r),
                None => demote(BigInt::from(a) - b, heap),
            }),
            (Opcode::BinarySubtract, Coerced::Bigs(a, b)) => Ok(demote(a - b, heap)),
            (Opcode::BinarySubtract, Coerced::Floats(a, b)) => Ok(Value::Float(a - b)),
            (Opcode::BinarySubtract, Coerced::Complexes(a, b)) => Ok(self.alloc_complex(a.sub(b))),

            (Opcode::BinaryMultiply, Coerced::Ints(a, b)) => Ok(match a.checked_mul(b) {
                Some(r) => Value::Int(r),
                None => demote(BigInt::from(a) * b, heap),
            }),
            (Opcode::BinaryMultiply, Coerced::Bigs(a, b)) => Ok(demote(a * b, heap)),
            (Opcode::BinaryMultiply, Coerced::Floats(a, b)) => Ok(Value::Float(a * b)),
            (Opcode::BinaryMultiply, Coerced::Complexes(a, b)) => Ok(self.alloc_complex(a.mul(b))),

            (Opcode::BinaryTrueDivide, Coerced::Ints(a, b)) => {
                if b == 0 {
                    return Err(ExcType::zero_division_float());
                }
                Ok(Value::Float(a as f64 / b as f64))
            }
            (Opcode::BinaryTrueDivide, Coerced::Bigs(a, b)) => {
                Ok(Value::Float(big_truediv(&a, &b)?))
            }
            (Opcode::BinaryTrueDivide, Coerced::Floats(a, b)) => {
                if b == 0.0 {
                    return Err(ExcType::zero_division_float());
                }
                Ok(Value::Float(a / b))
            }

            (Opcode::BinaryFloorDivide, Coerced::Ints(a, b)) => {
                if b == 0 {
                    return Err(ExcType::zero_division());
                }
                if a == i64::MIN && b == -1 {
                    return Ok(demote(BigInt::from(a) / b, heap));
                }
                Ok(Value::Int(num_integer::Integer::div_floor(&a, &b)))
            }
            (Opcode::BinaryFloorDivide, Coerced::Bigs(a, b)) => big_floordiv(&a, &b, heap),
            (Opcode::BinaryFloorDivide, Coerced::Floats(a, b)) => {
                if b == 0.0 {
                    return Err(ExcType::ZeroDivisionError
                        .with_arg("float floor division by zero")
                        .into());
                }
                Ok(Value::Float((a / b).floor()))
            }

            (Opcode::BinaryModulo, Coerced::Ints(a, b)) => {
                if b == 0 {
                    return Err(ExcType::zero_division());
                }
                if b == -1 {
                    return Ok(Value::Int(0));
                }
                Ok(Value::Int(num_integer::Integer::mod_floor(&a, &b)))
            }
            (Opcode::BinaryModulo, Coerced::Bigs(a, b)) => big_mod(&a, &b, heap),
            (Opcode::BinaryModulo, Coerced::Floats(a, b)) => {
                if b == 0.0 {
                    return Err(ExcType::ZeroDivisionError.with_arg("float modulo").into());
                }
                let mut r = a % b;
                // The result carries the divisor's sign.
                if r != 0.0 && (r < 0.0) != (b < 0.0) {
                    r += b;
                }
                Ok(Value::Float(r))
            }

            (Opcode::BinaryPower, Coerced::Ints(a, b)) => {
                big_pow(&BigInt::from(a), &BigInt::from(b), None, heap)
            }
            (Opcode::BinaryPower, Coerced::Bigs(a, b)) => big_pow(&a, &b, None, heap),
            (Opcode::BinaryPower, Coerced::Floats(a, b)) => {
                if a == 0.0 && b < 0.0 {
                    return Err(ExcType::ZeroDivisionError
                        .with_arg("0.0 cannot be raised to a negative power")
                        .into());
                }
                if a < 0.0 && b.fract() != 0.0 {
                    return Err(ExcType::value_error(
                        "negative number cannot be raised to a fractional power",
                    ));
                }
                Ok(Value::Float(a.powf(b)))
            }

            (Opcode::BinaryLshift, Coerced::Ints(a, b)) => {
                big_shl(&BigInt::from(a), &BigInt::from(b), heap)
            }
            (Opcode::BinaryLshift, Coerced::Bigs(a, b)) => big_shl(&a, &b, heap),
            (Opcode::BinaryRshift, Coerced::Ints(a, b)) => {
                big_shr(&BigInt::from(a), &BigInt::from(b), heap)
            }
            (Opcode::BinaryRshift, Coerced::Bigs(a, b)) => big_shr(&a, &b, heap),

            (Opcode::BinaryAnd, Coerced::Ints(a, b)) => Ok(Value::Int(a & b)),
            (Opcode::BinaryAnd, Coerced::Bigs(a, b)) => Ok(demote(a & b, heap)),
            (Opcode::BinaryXor, Coerced::Ints(a, b)) => Ok(Value::Int(a ^ b)),
            (Opcode::BinaryXor, Coerced::Bigs(a, b)) => Ok(demote(a ^ b, heap)),
            (Opcode::BinaryOr, Coerced::Ints(a, b)) => Ok(Value::Int(a | b)),
            (Opcode::BinaryOr, Coerced::Bigs(a, b)) => Ok(demote(a | b, heap)),

            // Floats and complexes reaching a bitwise/shift op, complex
            // division and the like.
            _ => Err(self.type_err(op, v, w)),
        }
    }

    /// Classic division: floor for two integers, true division otherwise,
    /// unless the code object opted in to future division.
    pub(super) fn classic_div(&mut self, v: Value, w: Value, flags: CodeFlags) -> RunResult<Value> {
        if flags.contains(CodeFlags::FUTURE_DIVISION) {
            return self.binary(Opcode::BinaryTrueDivide, v, w);
        }
        match coerce(&v, &w, &self.rt.heap)? {
            Some(Coerced::Ints(..) | Coerced::Bigs(..)) => {
                self.binary(Opcode::BinaryFloorDivide, v, w)
            }
            Some(_) => self.binary(Opcode::BinaryTrueDivide, v, w),
            None => Err(self.type_err(Opcode::BinaryDivide, &v, &w)),
        }
    }

    fn seq_concat(&mut self, v: &Value, w: &Value) -> RunResult<Value> {
        let (Value::Ref(a), Value::Ref(b)) = (v, w) else {
            return Err(self.type_err(Opcode::BinaryAdd, v, w));
        };
        enum Out {
            Str(String),
            Bytes(Vec<u8>),
            ByteArray(Vec<u8>),
            List(Vec<Value>),
            Tuple(Vec<Value>),
        }
        let out = match (self.rt.heap.get(*a), self.rt.heap.get(*b)) {
            (HeapData::Str(x), HeapData::Str(y)) => Out::Str(x.concat(y)),
            (HeapData::Bytes(x), HeapData::Bytes(y)) => Out::Bytes(x.concat(y.as_slice())),
            (HeapData::Bytes(x), HeapData::ByteArray(y)) => Out::Bytes(x.concat(y.as_slice())),
            (HeapData::ByteArray(x), HeapData::Bytes(y)) => {
                let mut data = x.as_slice().to_vec();
                data.extend_from_slice(y.as_slice());
                Out::ByteArray(data)
            }
            (HeapData::ByteArray(x), HeapData::ByteArray(y)) => {
                let mut data = x.as_slice().to_vec();
                data.extend_from_slice(y.as_slice());
                Out::ByteArray(data)
            }
            (HeapData::List(x), HeapData::List(y)) => Out::List(x.concat(y)),
            (HeapData::Tuple(x), HeapData::Tuple(y)) => Out::Tuple(x.concat(y)),
            _ => return Err(self.type_err(Opcode::BinaryAdd, v, w)),
        };
        Ok(Value::Ref(match out {
            Out::Str(s) => self.rt.heap.allocate(HeapData::Str(Str::new(s))),
            Out::Bytes(b) => self.rt.heap.allocate(HeapData::Bytes(Bytes::new(b))),
            Out::ByteArray(b) => self.rt.heap.allocate(HeapData::ByteArray(ByteArray::new(b))),
            Out::List(l) => self.rt.heap.allocate(HeapData::List(List::new(l))),
            Out::Tuple(t) => self.rt.heap.allocate(HeapData::Tuple(Tuple::new(t))),
        }))
    }

    fn seq_repeat(&mut self, v: &Value, w: &Value) -> RunResult<Value> {
        // Either order: seq * n or n * seq.
        let (seq, count) = match (v.index_i64(&self.rt.heap)?, w.index_i64(&self.rt.heap)?) {
            (None, Some(n)) => (v, n),
            (Some(n), None) => (w, n),
            _ => return Err(self.type_err(Opcode::BinaryMultiply, v, w)),
        };
        let count = usize::try_from(count).unwrap_or(0);
        let Value::Ref(id) = seq else {
            return Err(self.type_err(Opcode::BinaryMultiply, v, w));
        };
        enum Out {
            Str(String),
            Bytes(Vec<u8>),
            ByteArray(Vec<u8>),
            List(Vec<Value>),
            Tuple(Vec<Value>),
        }
        let out = match self.rt.heap.get(*id) {
            HeapData::Str(s) => Out::Str(s.repeat(count)),
            HeapData::Bytes(b) => Out::Bytes(b.repeat(count)),
            HeapData::ByteArray(b) => Out::ByteArray(b.as_slice().repeat(count)),
            HeapData::List(l) => Out::List(l.repeat(count)),
            HeapData::Tuple(t) => Out::Tuple(t.repeat(count)),
            _ => return Err(self.type_err(Opcode::BinaryMultiply, v, w)),
        };
        Ok(Value::Ref(match out {
            Out::Str(s) => self.rt.heap.allocate(HeapData::Str(Str::new(s))),
            Out::Bytes(b) => self.rt.heap.allocate(HeapData::Bytes(Bytes::new(b))),
            Out::ByteArray(b) => self.rt.heap.allocate(HeapData::ByteArray(ByteArray::new(b))),
            Out::List(l) => self.rt.heap.allocate(HeapData::List(List::new(l))),
            Out::Tuple(t) => self.rt.heap.allocate(HeapData::Tuple(Tuple::new(t))),
        }))
    }

    pub(super) fn compare(&mut self, op: CompareOp, v: &Value, w: &Value) -> RunResult<bool> {
        match op {
            CompareOp::Is => Ok(identical(v, w)),
            CompareOp::IsNot => Ok(!identical(v, w)),
            CompareOp::Eq => Ok(v.py_eq(w, &mut self.rt.heap)),
            CompareOp::Ne => Ok(!v.py_eq(w, &mut self.rt.heap)),
            CompareOp::In => self.contains(v, w),
            CompareOp::NotIn => Ok(!self.contains(v, w)?),
            CompareOp::ExcMatch => self.exc_match(v, w),
            CompareOp::Lt | CompareOp::Le | CompareOp::Gt | CompareOp::Ge => {
                match self.try_cmp(v, w, op.symbol())? {
                    Some(ord) => Ok(match op {
                        CompareOp::Lt => ord == Ordering::Less,
                        CompareOp::Le => ord != Ordering::Greater,
                        CompareOp::Gt => ord == Ordering::Greater,
                        CompareOp::Ge => ord != Ordering::Less,
                        _ => unreachable!(),
                    }),
                    // Unordered (NaN involved): every ordering comparison is
                    // false.
                    None => Ok(false),
                }
            }
        }
    }

    /// Three-way comparison for the ordering operators. `Ok(None)` means the
    /// operands are numeric but unordered; incomparable types are a TypeError.
    fn try_cmp(&mut self, v: &Value, w: &Value, symbol: &str) -> RunResult<Option<Ordering>> {
        if let Some(ord) = numeric_cmp(v, w, &self.rt.heap) {
            return Ok(ord);
        }
        if let (Value::Ref(a), Value::Ref(b)) = (v, w) {
            enum Seq {
                Ordered(Ordering),
                Elems(Vec<Value>, Vec<Value>),
            }
            let found = match (self.rt.heap.get(*a), self.rt.heap.get(*b)) {
                (HeapData::Str(x), HeapData::Str(y)) => Some(Seq::Ordered(x.cmp(y))),
                (HeapData::Bytes(x), HeapData::Bytes(y)) => Some(Seq::Ordered(x.cmp(y.as_slice()))),
                (HeapData::Bytes(x), HeapData::ByteArray(y)) => {
                    Some(Seq::Ordered(x.cmp(y.as_slice())))
                }
                (HeapData::ByteArray(x), HeapData::Bytes(y)) => {
                    Some(Seq::Ordered(x.as_slice().cmp(y.as_slice())))
                }
                (HeapData::ByteArray(x), HeapData::ByteArray(y)) => {
                    Some(Seq::Ordered(x.as_slice().cmp(y.as_slice())))
                }
                (HeapData::List(x), HeapData::List(y)) => {
                    Some(Seq::Elems(x.as_vec().to_vec(), y.as_vec().to_vec()))
                }
                (HeapData::Tuple(x), HeapData::Tuple(y)) => {
                    Some(Seq::Elems(x.as_vec().to_vec(), y.as_vec().to_vec()))
                }
                _ => None,
            };
            match found {
                Some(Seq::Ordered(ord)) => return Ok(Some(ord)),
                Some(Seq::Elems(xs, ys)) => {
                    // Lexicographic: first unequal pair decides, then length.
                    for (x, y) in xs.iter().zip(ys.iter()) {
                        if !x.py_eq(y, &mut self.rt.heap) {
                            return self.try_cmp(x, y, symbol);
                        }
                    }
                    return Ok(Some(xs.len().cmp(&ys.len())));
                }
                None => {}
            }
        }
        Err(ExcType::type_error(format!(
            "'{symbol}' not supported between instances of '{}' and '{}'",
            self.tname(v),
            self.tname(w)
        )))
    }

    /// `v in w`.
    fn contains(&mut self, v: &Value, w: &Value) -> RunResult<bool> {
        let Value::Ref(id) = w else {
            return Err(ExcType::type_error(format!(
                "argument of type '{}' is not iterable",
                self.tname(w)
            )));
        };
        enum Probe {
            Found(bool),
            Elems(Vec<Value>),
            Dict,
        }
        let probe = match self.rt.heap.get(*id) {
            HeapData::Str(haystack) => match v {
                Value::Ref(vid) => match self.rt.heap.get(*vid) {
                    HeapData::Str(needle) => Probe::Found(haystack.contains(needle)),
                    _ => {
                        return Err(ExcType::type_error(
                            "'in <string>' requires string as left operand",
                        ))
                    }
                },
                _ => {
                    return Err(ExcType::type_error(
                        "'in <string>' requires string as left operand",
                    ))
                }
            },
            HeapData::Bytes(b) => Probe::Found(bytes_contains(b.as_slice(), v, &self.rt.heap)?),
            HeapData::ByteArray(b) => {
                Probe::Found(bytes_contains(b.as_slice(), v, &self.rt.heap)?)
            }
            HeapData::List(l) => Probe::Elems(l.as_vec().to_vec()),
            HeapData::Tuple(t) => Probe::Elems(t.as_vec().to_vec()),
            HeapData::Dict(_) => Probe::Dict,
            HeapData::Range(r) => {
                let r = *r;
                match v.index_i64(&self.rt.heap)? {
                    Some(i) => {
                        let in_bounds = if r.step > 0 {
                            i >= r.start && i < r.stop
                        } else {
                            i <= r.start && i > r.stop
                        };
                        Probe::Found(in_bounds && (i - r.start) % r.step == 0)
                    }
                    None => Probe::Found(false),
                }
            }
            _ => {
                return Err(ExcType::type_error(format!(
                    "argument of type '{}' is not iterable",
                    self.tname(w)
                )))
            }
        };
        match probe {
            Probe::Found(found) => Ok(found),
            Probe::Elems(items) => {
                Ok(items.iter().any(|item| v.py_eq(item, &mut self.rt.heap)))
            }
            Probe::Dict => self.rt.heap.with_entry_mut(*id, |heap, data| match data {
                HeapData::Dict(d) => d.contains(heap, v),
                _ => Err(RunError::internal("dict vanished during lookup")),
            }),
        }
    }

    /// `COMPARE_OP exc_match`: does the raised exception `v` match the class
    /// (or tuple of classes) `w`?
    fn exc_match(&mut self, v: &Value, w: &Value) -> RunResult<bool> {
        let raised = match v {
            Value::Builtin(Builtins::Exc(et)) => *et,
            Value::Ref(id) => match self.rt.heap.get(*id) {
                HeapData::Exception(exc) => exc.exc_type(),
                _ => return Ok(false),
            },
            _ => return Ok(false),
        };
        let classes: Vec<Value> = match w {
            Value::Ref(id) => match self.rt.heap.get(*id) {
                HeapData::Tuple(t) => t.as_vec().to_vec(),
                _ => vec![w.clone()],
            },
            _ => vec![w.clone()],
        };
        for class in &classes {
            let Value::Builtin(Builtins::Exc(target)) = class else {
                return Err(ExcType::type_error(
                    "catching classes that do not inherit from BaseException is not allowed",
                ));
            };
            if raised.is_subclass_of(*target) {
                return Ok(true);
            }
        }
        Ok(false)
    }

    /// `BINARY_SUBSCR`: `v[w]`.
    #[allow(clippy::too_many_lines)]
    pub(super) fn subscr(&mut self, v: Value, w: Value) -> RunResult<Value> {
        let Value::Ref(id) = v else {
            return Err(ExcType::type_error_not_subscriptable(&self.tname(&v)));
        };
        let index = w.index_i64(&self.rt.heap)?;
        let slice = match &w {
            Value::Ref(wid) => match self.rt.heap.get(*wid) {
                HeapData::Slice(s) => Some(*s),
                _ => None,
            },
            _ => None,
        };

        enum Out {
            Done(Value),
            Str(String),
            Bytes(Vec<u8>),
            ByteArray(Vec<u8>),
            List(Vec<Value>),
            Tuple(Vec<Value>),
        }
        let out = match self.rt.heap.get(id) {
            HeapData::Str(s) => match (index, slice) {
                (Some(i), _) => Out::Str(s.index(i)?.to_string()),
                (None, Some(sl)) => Out::Str(s.slice(&sl)?),
                _ => return Err(ExcType::type_error("string indices must be integers")),
            },
            HeapData::Bytes(b) => match (index, slice) {
                (Some(i), _) => Out::Done(Value::Int(i64::from(b.index(i)?))),
                (None, Some(sl)) => Out::Bytes(b.slice(&sl)?),
                _ => return Err(ExcType::type_error("bytes indices must be integers")),
            },
            HeapData::ByteArray(b) => match (index, slice) {
                (Some(i), _) => Out::Done(Value::Int(i64::from(b.index(i)?))),
                (None, Some(sl)) => Out::ByteArray(b.slice(&sl)?),
                _ => return Err(ExcType::type_error("bytearray indices must be integers")),
            },
            HeapData::List(l) => match (index, slice) {
                (Some(i), _) => Out::Done(l.get(i)?),
                (None, Some(sl)) => Out::List(l.slice(&sl)?),
                _ => {
                    return Err(ExcType::type_error(format!(
                        "list indices must be integers, not {}",
                        self.tname(&w)
                    )))
                }
            },
            HeapData::Tuple(t) => match (index, slice) {
                (Some(i), _) => Out::Done(t.get(i)?),
                (None, Some(sl)) => Out::Tuple(t.slice(&sl)?),
                _ => {
                    return Err(ExcType::type_error(format!(
                        "tuple indices must be integers, not {}",
                        self.tname(&w)
                    )))
                }
            },
            HeapData::Range(r) => match index {
                Some(i) => Out::Done(Value::Int(r.get(i)?)),
                None => {
                    return Err(ExcType::type_error(format!(
                        "range indices must be integers, not {}",
                        self.tname(&w)
                    )))
                }
            },
            HeapData::Dict(_) => {
                let found = self.rt.heap.with_entry_mut(id, |heap, data| match data {
                    HeapData::Dict(d) => d.get(heap, &w),
                    _ => Err(RunError::internal("dict vanished during lookup")),
                })?;
                match found {
                    Some(value) => Out::Done(value),
                    None => return Err(ExcType::key_error(w.py_repr(&self.rt.heap))),
                }
            }
            _ => return Err(ExcType::type_error_not_subscriptable(&self.tname(&v))),
        };
        Ok(match out {
            Out::Done(value) => value,
            Out::Str(s) => Value::Ref(self.rt.heap.allocate(HeapData::Str(Str::new(s)))),
            Out::Bytes(b) => Value::Ref(self.rt.heap.allocate(HeapData::Bytes(Bytes::new(b)))),
            Out::ByteArray(b) => {
                Value::Ref(self.rt.heap.allocate(HeapData::ByteArray(ByteArray::new(b))))
            }
            Out::List(l) => Value::Ref(self.rt.heap.allocate(HeapData::List(List::new(l)))),
            Out::Tuple(t) => Value::Ref(self.rt.heap.allocate(HeapData::Tuple(Tuple::new(t)))),
        })
    }

    /// `STORE_SUBSCR`: `v[w] = u`.
    pub(super) fn store_subscr(&mut self, v: Value, w: Value, u: Value) -> RunResult<()> {
        let Value::Ref(id) = v else {
            return Err(ExcType::type_error(format!(
                "'{}' object does not support item assignment",
                self.tname(&v)
            )));
        };
        let index = w.index_i64(&self.rt.heap)?;
        match self.rt.heap.get(id) {
            HeapData::List(_) => {
                let Some(i) = index else {
                    return Err(ExcType::type_error(format!(
                        "list indices must be integers, not {}",
                        self.tname(&w)
                    )));
                };
                match self.rt.heap.get_mut(id) {
                    HeapData::List(l) => l.set(i, u),
                    _ => Err(RunError::internal("list vanished during store")),
                }
            }
            HeapData::ByteArray(_) => {
                let Some(i) = index else {
                    return Err(ExcType::type_error(format!(
                        "bytearray indices must be integers, not {}",
                        self.tname(&w)
                    )));
                };
                let Some(byte) = u.index_i64(&self.rt.heap)? else {
                    return Err(ExcType::type_error(
                        "an integer is required",
                    ));
                };
                match self.rt.heap.get_mut(id) {
                    HeapData::ByteArray(b) => b.set_index(i, byte),
                    _ => Err(RunError::internal("bytearray vanished during store")),
                }
            }
            HeapData::Dict(_) => self.rt.heap.with_entry_mut(id, |heap, data| match data {
                HeapData::Dict(d) => d.set(heap, w, u),
                _ => Err(RunError::internal("dict vanished during store")),
            }),
            _ => Err(ExcType::type_error(format!(
                "'{}' object does not support item assignment",
                self.tname(&v)
            ))),
        }
    }

    /// `DELETE_SUBSCR`: `del v[w]`.
    pub(super) fn delete_subscr(&mut self, v: Value, w: Value) -> RunResult<()> {
        let Value::Ref(id) = v else {
            return Err(ExcType::type_error(format!(
                "'{}' object doesn't support item deletion",
                self.tname(&v)
            )));
        };
        match self.rt.heap.get(id) {
            HeapData::List(_) => {
                let Some(i) = w.index_i64(&self.rt.heap)? else {
                    return Err(ExcType::type_error(format!(
                        "list indices must be integers, not {}",
                        self.tname(&w)
                    )));
                };
                match self.rt.heap.get_mut(id) {
                    HeapData::List(l) => l.remove(i).map(|_| ()),
                    _ => Err(RunError::internal("list vanished during delete")),
                }
            }
            HeapData::ByteArray(_) => {
                let Some(i) = w.index_i64(&self.rt.heap)? else {
                    return Err(ExcType::type_error(format!(
                        "bytearray indices must be integers, not {}",
                        self.tname(&w)
                    )));
                };
                match self.rt.heap.get_mut(id) {
                    HeapData::ByteArray(b) => b.remove_index(i),
                    _ => Err(RunError::internal("bytearray vanished during delete")),
                }
            }
            HeapData::Dict(_) => {
                let removed = self.rt.heap.with_entry_mut(id, |heap, data| match data {
                    HeapData::Dict(d) => d.remove(heap, &w),
                    _ => Err(RunError::internal("dict vanished during delete")),
                })?;
                match removed {
                    Some(_) => Ok(()),
                    None => Err(ExcType::key_error(w.py_repr(&self.rt.heap))),
                }
            }
            _ => Err(ExcType::type_error(format!(
                "'{}' object doesn't support item deletion",
                self.tname(&v)
            ))),
        }
    }

    fn alloc_complex(&mut self, c: Complex) -> Value {
        Value::Ref(self.rt.heap.allocate(HeapData::Complex(c)))
    }
}

fn bytes_contains(haystack: &[u8], v: &Value, heap: &Heap) -> RunResult<bool> {
    // An int probes for a single byte; bytes probe for a subsequence.
    if let Some(i) = v.index_i64(heap)? {
        let Ok(byte) = u8::try_from(i) else {
            return Err(ExcType::value_error("byte must be in range(0, 256)"));
        };
        return Ok(haystack.contains(&byte));
    }
    if let Value::Ref(id) = v {
        let needle = match heap.get(*id) {
            HeapData::Bytes(b) => Some(b.as_slice()),
            HeapData::ByteArray(b) => Some(b.as_slice()),
            _ => None,
        };
        if let Some(needle) = needle {
            if needle.is_empty() {
                return Ok(true);
            }
            return Ok(haystack.windows(needle.len()).any(|win| win == needle));
        }
    }
    Err(ExcType::type_error(
        "a bytes-like object or integer is required",
    ))
}

fn identical(v: &Value, w: &Value) -> bool {
    v == w
}
