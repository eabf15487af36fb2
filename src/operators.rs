//! Relational operators and the comparison policies behind them.
//!
//! Every pair of numeric scalars is compared by one of three policies picked
//! from the static signedness of the two operand types:
//! * [`cmp`] when both sides share a comparability class (or either is floating),
//! * [`us_cmp`] for unsigned against signed, flooring the signed side at zero,
//! * [`su_cmp`] for signed against unsigned, the mirror image.
//!
//! Strings and URLs use [`str_cmp`], which adds the `=~` regular expression
//! operator. [`compare_values`] is the double dispatch over two runtime values.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Mutex;

use lazy_static::lazy_static;
use regex::Regex;

use crate::datatype::{TypeTag, Value};
use crate::error::{DapError, Result};
use crate::reader::NameHasher;

lazy_static! {
    // compiled =~ patterns, keyed by the pattern text as written by the client
    static ref PATTERNS: Mutex<HashMap<String, Regex, NameHasher>> = Mutex::new(HashMap::default());
}
const PATTERN_CACHE_LIMIT: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Less,
    LessEqual,
    Regexp,
}

impl RelOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            RelOp::Equal => "=",
            RelOp::NotEqual => "!=",
            RelOp::Greater => ">",
            RelOp::GreaterEqual => ">=",
            RelOp::Less => "<",
            RelOp::LessEqual => "<=",
            RelOp::Regexp => "=~",
        }
    }
    /// The operator that gives the same answer with the operands swapped.
    pub fn flip(&self) -> RelOp {
        match self {
            RelOp::Greater => RelOp::Less,
            RelOp::GreaterEqual => RelOp::LessEqual,
            RelOp::Less => RelOp::Greater,
            RelOp::LessEqual => RelOp::GreaterEqual,
            other => *other,
        }
    }
}

impl fmt::Display for RelOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.symbol())
    }
}

impl FromStr for RelOp {
    type Err = DapError;
    fn from_str(s: &str) -> Result<RelOp> {
        let op = match s {
            "=" => RelOp::Equal,
            "!=" => RelOp::NotEqual,
            ">" => RelOp::Greater,
            ">=" => RelOp::GreaterEqual,
            "<" => RelOp::Less,
            "<=" => RelOp::LessEqual,
            "=~" => RelOp::Regexp,
            _ => return Err(DapError::malformed(format!("Unrecognized operator `{s}'."))),
        };
        Ok(op)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signedness {
    Unsigned,
    Signed,
    Floating,
}

/// A numeric scalar that can take part in relational comparisons.
pub trait Scalar: Copy {
    const TYPE: TypeTag;
    const SIGNEDNESS: Signedness;
    fn as_i64(self) -> i64;
    fn as_f32(self) -> f32;
    fn as_f64(self) -> f64;
}

macro_rules! scalar {
    ($t:ty, $tag:ident, $sign:ident) => {
        impl Scalar for $t {
            const TYPE: TypeTag = TypeTag::$tag;
            const SIGNEDNESS: Signedness = Signedness::$sign;
            fn as_i64(self) -> i64 {
                self as i64
            }
            fn as_f32(self) -> f32 {
                self as f32
            }
            fn as_f64(self) -> f64 {
                self as f64
            }
        }
    };
}
scalar!(u8, Byte, Unsigned);
scalar!(i16, Int16, Signed);
scalar!(u16, UInt16, Unsigned);
scalar!(i32, Int32, Signed);
scalar!(u32, UInt32, Unsigned);
scalar!(f32, Float32, Floating);
scalar!(f64, Float64, Floating);

/// Compares two operands of the same comparability class.
pub fn cmp<T: PartialOrd + ?Sized>(op: RelOp, a: &T, b: &T) -> Result<bool> {
    match op {
        RelOp::Equal => Ok(a == b),
        RelOp::NotEqual => Ok(a != b),
        RelOp::Greater => Ok(a > b),
        RelOp::GreaterEqual => Ok(a >= b),
        RelOp::Less => Ok(a < b),
        RelOp::LessEqual => Ok(a <= b),
        RelOp::Regexp => Err(DapError::malformed("Regular expressions are supported for strings only.")),
    }
}

fn floor_zero(v: i64) -> i64 {
    if v < 0 { 0 } else { v }
}

/// Unsigned `a` against signed `b`; a negative `b` counts as zero.
pub fn us_cmp<U: Scalar, S: Scalar>(op: RelOp, a: U, b: S) -> Result<bool> {
    cmp(op, &a.as_i64(), &floor_zero(b.as_i64()))
}

/// Signed `a` against unsigned `b`; a negative `a` counts as zero.
pub fn su_cmp<S: Scalar, U: Scalar>(op: RelOp, a: S, b: U) -> Result<bool> {
    cmp(op, &floor_zero(a.as_i64()), &b.as_i64())
}

/// Picks the policy for a pair of numeric types and applies it.
///
/// Mixed integer/floating pairs follow the usual arithmetic conversions: both
/// sides become Float64 when either is Float64, otherwise Float32.
pub fn compare<A: Scalar, B: Scalar>(op: RelOp, a: A, b: B) -> Result<bool> {
    use Signedness::*;
    match (A::SIGNEDNESS, B::SIGNEDNESS) {
        (Unsigned, Signed) => us_cmp(op, a, b),
        (Signed, Unsigned) => su_cmp(op, a, b),
        (Floating, _) | (_, Floating) => {
            if A::TYPE == TypeTag::Float64 || B::TYPE == TypeTag::Float64 {
                cmp(op, &a.as_f64(), &b.as_f64())
            } else {
                cmp(op, &a.as_f32(), &b.as_f32())
            }
        }
        _ => cmp(op, &a.as_i64(), &b.as_i64()),
    }
}

/// String comparison, plus `=~` where `b` is a pattern that must match a
/// non-empty prefix of `a`.
pub fn str_cmp(op: RelOp, a: &str, b: &str) -> Result<bool> {
    match op {
        RelOp::Regexp => prefix_match(a, b),
        _ => cmp(op, a, b),
    }
}

fn prefix_match(text: &str, pattern: &str) -> Result<bool> {
    let mut patterns = PATTERNS
        .lock()
        .map_err(|e| DapError::invariant(format!("pattern cache poisoned: {e}")))?;
    if !patterns.contains_key(pattern) {
        let compiled = Regex::new(&format!("^(?:{pattern})"))
            .map_err(|e| DapError::malformed(format!("Invalid regular expression `{pattern}': {e}")))?;
        if patterns.len() >= PATTERN_CACHE_LIMIT {
            patterns.clear();
        }
        patterns.insert(pattern.to_string(), compiled);
    }
    let matched = patterns
        .get(pattern)
        .and_then(|re| re.find(text))
        .is_some_and(|m| m.end() > 0);
    Ok(matched)
}

/// Compares two scalar values, dispatching on both runtime types.
///
/// A number compared with a string (or the other way round) is not an error,
/// the operator simply does not apply and the answer is false.
pub fn compare_values(op: RelOp, left: &Value, right: &Value) -> Result<bool> {
    if op == RelOp::Regexp && (left.as_str().is_none() || right.as_str().is_none()) {
        return Err(DapError::malformed("Regular expressions are supported for strings only."));
    }
    macro_rules! against {
        ($a:expr) => {
            match right {
                Value::Byte(b) => compare(op, $a, *b),
                Value::Int16(b) => compare(op, $a, *b),
                Value::UInt16(b) => compare(op, $a, *b),
                Value::Int32(b) => compare(op, $a, *b),
                Value::UInt32(b) => compare(op, $a, *b),
                Value::Float32(b) => compare(op, $a, *b),
                Value::Float64(b) => compare(op, $a, *b),
                Value::Str(_) | Value::Url(_) => Ok(false),
            }
        };
    }
    match left {
        Value::Byte(a) => against!(*a),
        Value::Int16(a) => against!(*a),
        Value::UInt16(a) => against!(*a),
        Value::Int32(a) => against!(*a),
        Value::UInt32(a) => against!(*a),
        Value::Float32(a) => against!(*a),
        Value::Float64(a) => against!(*a),
        Value::Str(a) | Value::Url(a) => match right {
            Value::Str(b) | Value::Url(b) => str_cmp(op, a, b),
            _ => Ok(false),
        },
    }
}
