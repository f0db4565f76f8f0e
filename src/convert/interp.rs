//! Conversions at the interpreter boundary.
//!
//! The interpreter evaluates constant expressions in its own value domain;
//! these functions move values across the boundary in both directions.
//! Tuples and arrays keep their tags, so a value survives a round trip
//! unchanged.

use crate::ir::{Bits, Value};
use crate::{ConversionError, Result};

/// A value in the interpreter's domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpValue {
    UBits(Bits),
    SBits(Bits),
    Enum(Bits),
    Tuple(Vec<InterpValue>),
    Array(Vec<InterpValue>),
    /// Function values exist only inside the interpreter and cannot cross
    /// into the IR.
    Function(String),
}

/// Lowers an interpreter value to an IR literal value. Signedness and enum
/// tags erase to plain bits.
pub fn interp_value_to_value(value: &InterpValue) -> Result<Value> {
    match value {
        InterpValue::UBits(bits) | InterpValue::SBits(bits) | InterpValue::Enum(bits) => {
            Ok(Value::Bits(bits.clone()))
        }
        InterpValue::Tuple(members) => Ok(Value::Tuple(
            members
                .iter()
                .map(interp_value_to_value)
                .collect::<Result<_>>()?,
        )),
        InterpValue::Array(elements) => Ok(Value::Array(
            elements
                .iter()
                .map(interp_value_to_value)
                .collect::<Result<_>>()?,
        )),
        InterpValue::Function(name) => Err(ConversionError::invalid_argument(
            None,
            format!("cannot convert interpreter function value `{name}` to IR"),
        )),
    }
}

/// Raises an IR literal value into the interpreter's domain. Bits surface
/// unsigned; aggregate tags are preserved.
pub fn value_to_interp_value(value: &Value) -> InterpValue {
    match value {
        Value::Bits(bits) => InterpValue::UBits(bits.clone()),
        Value::Tuple(members) => {
            InterpValue::Tuple(members.iter().map(value_to_interp_value).collect())
        }
        Value::Array(elements) => {
            InterpValue::Array(elements.iter().map(value_to_interp_value).collect())
        }
    }
}
