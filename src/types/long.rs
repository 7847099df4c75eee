use std::cmp::Ordering;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use num_bigint::{BigInt, Sign};
use num_integer::Integer;
use num_traits::{FromPrimitive, Pow, Signed, ToPrimitive, Zero};

use crate::exception::{ExcType, RunResult};
use crate::heap::{Heap, HeapData};
use crate::value::Value;

/// An arbitrary-precision integer stored on the heap.
///
/// The runtime has a single integer type: values that fit in `i64` live
/// inline as `Value::Int`, anything larger is promoted to a heap `LongInt`.
/// Results that fit back in `i64` are demoted again by [`demote`], so a
/// canonical `LongInt` on the heap is always outside `i64` range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LongInt(BigInt);

impl LongInt {
    pub fn new(value: BigInt) -> Self {
        Self(value)
    }

    pub fn inner(&self) -> &BigInt {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// Hash of the numeric value, consistent with how `Value::Int` and
    /// integral floats hash (see `Value::py_hash`).
    pub fn hash(&self) -> u64 {
        hash_big(&self.0)
    }
}

impl std::fmt::Display for LongInt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hashes an integer value by sign and little-endian magnitude bytes.
///
/// `hash_i64` must produce the same result for values in `i64` range, so both
/// go through the same byte representation.
pub(crate) fn hash_big(value: &BigInt) -> u64 {
    let mut hasher = DefaultHasher::new();
    let (sign, bytes) = value.to_bytes_le();
    (sign == Sign::Minus).hash(&mut hasher);
    bytes.hash(&mut hasher);
    hasher.finish()
}

pub(crate) fn hash_i64(value: i64) -> u64 {
    hash_big(&BigInt::from(value))
}

/// Wraps a `BigInt` result as a `Value`, demoting to an inline `Value::Int`
/// when it fits in `i64`.
pub(crate) fn demote(value: BigInt, heap: &mut Heap) -> Value {
    match value.to_i64() {
        Some(small) => Value::Int(small),
        None => Value::Ref(heap.allocate(HeapData::Long(LongInt(value)))),
    }
}

/// Floor division: the quotient rounds toward negative infinity.
pub(crate) fn big_floordiv(a: &BigInt, b: &BigInt, heap: &mut Heap) -> RunResult<Value> {
    if b.is_zero() {
        return Err(ExcType::zero_division());
    }
    Ok(demote(a.div_floor(b), heap))
}

/// Modulo with the divisor's sign: `a == (a // b) * b + a % b` for `b != 0`.
pub(crate) fn big_mod(a: &BigInt, b: &BigInt, heap: &mut Heap) -> RunResult<Value> {
    if b.is_zero() {
        return Err(ExcType::zero_division());
    }
    Ok(demote(a.mod_floor(b), heap))
}

/// True division producing a float; fails with OverflowError when either
/// operand is too large for a finite `f64` quotient.
pub(crate) fn big_truediv(a: &BigInt, b: &BigInt) -> RunResult<f64> {
    if b.is_zero() {
        return Err(ExcType::zero_division_float());
    }
    let fa = big_to_f64(a)?;
    let fb = big_to_f64(b)?;
    Ok(fa / fb)
}

/// `pow` with an optional modulus.
///
/// A negative exponent promotes to a float result (ZeroDivisionError for a
/// zero base) unless a modulus is given, which is a TypeError. With a modulus,
/// performs modular exponentiation; a negative modulus normalizes the result
/// into `(modulus, 0]`.
pub(crate) fn big_pow(
    a: &BigInt,
    b: &BigInt,
    modulus: Option<&BigInt>,
    heap: &mut Heap,
) -> RunResult<Value> {
    if b.is_negative() {
        if modulus.is_some() {
            return Err(ExcType::type_error(
                "pow() 2nd argument cannot be negative when 3rd argument specified",
            ));
        }
        if a.is_zero() {
            return Err(ExcType::ZeroDivisionError
                .with_arg("0.0 cannot be raised to a negative power")
                .into());
        }
        let base = big_to_f64(a)?;
        let exp = big_to_f64(b)?;
        return Ok(Value::Float(base.powf(exp)));
    }
    if let Some(m) = modulus {
        if m.is_zero() {
            return Err(ExcType::value_error("pow() 3rd argument cannot be 0"));
        }
        let m_abs = m.abs();
        let mut r = a.modpow(b, &m_abs);
        if m.is_negative() && !r.is_zero() {
            r += m;
        }
        return Ok(demote(r, heap));
    }
    let exp = b
        .to_u32()
        .ok_or_else(|| ExcType::overflow("exponent too large"))?;
    Ok(demote(a.pow(exp), heap))
}

pub(crate) fn big_shl(a: &BigInt, shift: &BigInt, heap: &mut Heap) -> RunResult<Value> {
    if shift.is_negative() {
        return Err(ExcType::value_error("negative shift count"));
    }
    let n = shift
        .to_u32()
        .ok_or_else(|| ExcType::overflow("shift count too large"))?;
    Ok(demote(a.clone() << n, heap))
}

pub(crate) fn big_shr(a: &BigInt, shift: &BigInt, heap: &mut Heap) -> RunResult<Value> {
    if shift.is_negative() {
        return Err(ExcType::value_error("negative shift count"));
    }
    // Shifting further than the magnitude floors to -1 / 0 like an arithmetic
    // shift of a two's-complement value of unbounded width.
    let n = match shift.to_u64() {
        Some(n) if n < 0x1_0000_0000 => n as u32,
        _ => return Ok(Value::Int(if a.is_negative() { -1 } else { 0 })),
    };
    Ok(demote(a.div_floor(&(BigInt::from(1) << n)), heap))
}

/// Conversion to a float; OverflowError only for infinite results, never a
/// silent wrap.
pub(crate) fn big_to_f64(value: &BigInt) -> RunResult<f64> {
    match value.to_f64() {
        Some(f) if f.is_finite() => Ok(f),
        _ => Err(ExcType::overflow("int too large to convert to float")),
    }
}

/// Exact comparison of an integer against a float.
///
/// The float is never allowed to truncate the integer: the comparison goes
/// through the float's exact integral part, so integers outside `f64`'s
/// precise range still compare correctly.
pub(crate) fn cmp_big_f64(a: &BigInt, b: f64) -> Option<Ordering> {
    if b.is_nan() {
        return None;
    }
    if b == f64::INFINITY {
        return Some(Ordering::Less);
    }
    if b == f64::NEG_INFINITY {
        return Some(Ordering::Greater);
    }
    let b_floor = BigInt::from_f64(b.floor())?;
    match a.cmp(&b_floor) {
        Ordering::Equal => {
            // a == floor(b); any fractional part makes b strictly larger.
            if b.fract() == 0.0 {
                Some(Ordering::Equal)
            } else {
                Some(Ordering::Less)
            }
        }
        other => Some(other),
    }
}
