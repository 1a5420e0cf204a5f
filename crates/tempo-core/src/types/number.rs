//! Numeric value representation.
//!
//! The `Number` enum represents numeric values that can be either integers
//! or floating point numbers, handled uniformly while preserving type
//! information.

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Number {
    /// Integer value (64-bit signed integer).
    Integer(i64),
    /// Floating-point value (64-bit float).
    Float(f64),
}

impl Number {
    /// Converts the number to an `f64` value.
    ///
    /// Integers are converted to floats without loss of precision for
    /// magnitudes below 2^53.
    pub fn as_f64(&self) -> f64 {
        match self {
            Number::Integer(i) => *i as f64,
            Number::Float(f) => *f,
        }
    }

    /// Returns the integer value, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Number::Integer(i) => Some(*i),
            Number::Float(_) => None,
        }
    }
}

impl From<i64> for Number {
    fn from(value: i64) -> Self {
        Number::Integer(value)
    }
}

impl From<i32> for Number {
    fn from(value: i32) -> Self {
        Number::Integer(value as i64)
    }
}

impl From<f64> for Number {
    fn from(value: f64) -> Self {
        Number::Float(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_f64() {
        assert_eq!(Number::Integer(42).as_f64(), 42.0);
        assert_eq!(Number::Float(2.5).as_f64(), 2.5);
    }

    #[test]
    fn test_as_i64() {
        assert_eq!(Number::Integer(-3).as_i64(), Some(-3));
        assert_eq!(Number::Float(3.0).as_i64(), None);
    }
}
