//! Compile-time-known IR values.

use std::fmt;

use itertools::Itertools;

use super::bits::Bits;
use super::IrType;
use crate::{ConversionError, Result};

/// A literal value in the IR domain: packed bits or an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Bits(Bits),
    Tuple(Vec<Value>),
    Array(Vec<Value>),
}

impl Value {
    pub fn bits(&self) -> Result<&Bits> {
        match self {
            Value::Bits(b) => Ok(b),
            other => Err(ConversionError::internal(
                None,
                format!("value is not bits: {other}"),
            )),
        }
    }

    /// IR type of this value. Errors on an empty array, whose element type
    /// is unknowable.
    pub fn ir_type(&self) -> Result<IrType> {
        match self {
            Value::Bits(b) => Ok(IrType::Bits { width: b.width() }),
            Value::Tuple(members) => Ok(IrType::Tuple {
                members: members.iter().map(|m| m.ir_type()).try_collect()?,
            }),
            Value::Array(elements) => {
                let first = elements.first().ok_or_else(|| {
                    ConversionError::internal(None, "empty array literal has no element type")
                })?;
                Ok(IrType::Array {
                    element: Box::new(first.ir_type()?),
                    size: elements.len() as u64,
                })
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bits(b) => write!(f, "{b}"),
            Value::Tuple(members) => write!(f, "({})", members.iter().join(", ")),
            Value::Array(elements) => write!(f, "[{}]", elements.iter().join(", ")),
        }
    }
}
