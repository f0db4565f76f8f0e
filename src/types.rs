//! Concrete (fully checked) Weft types and the type-information oracle.
//!
//! Types reach this crate with every node already annotated by the type
//! checker. Dimensions may still be symbolic inside parametric functions;
//! the converter resolves them against the instantiation's symbolic
//! bindings before lowering.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;
use itertools::Itertools;

use crate::ast::{AstNodeId, Module};
use crate::{ConversionError, Result};

/// Symbolic expression over parametric identifiers, e.g. `N + 1`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParametricExpr {
    Symbol(String),
    Literal(u64),
    Add(Box<ParametricExpr>, Box<ParametricExpr>),
    Sub(Box<ParametricExpr>, Box<ParametricExpr>),
    Mul(Box<ParametricExpr>, Box<ParametricExpr>),
}

impl ParametricExpr {
    pub fn evaluate(&self, env: &SymbolicBindings) -> Result<u64> {
        match self {
            ParametricExpr::Symbol(name) => env.get(name).ok_or_else(|| {
                ConversionError::internal(
                    None,
                    format!("no binding for parametric symbol `{name}`"),
                )
            }),
            ParametricExpr::Literal(v) => Ok(*v),
            ParametricExpr::Add(a, b) => Ok(a.evaluate(env)? + b.evaluate(env)?),
            ParametricExpr::Sub(a, b) => {
                let (a, b) = (a.evaluate(env)?, b.evaluate(env)?);
                a.checked_sub(b).ok_or_else(|| {
                    ConversionError::internal(
                        None,
                        format!("parametric subtraction underflow: {a} - {b}"),
                    )
                })
            }
            ParametricExpr::Mul(a, b) => Ok(a.evaluate(env)? * b.evaluate(env)?),
        }
    }
}

impl fmt::Display for ParametricExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParametricExpr::Symbol(s) => write!(f, "{s}"),
            ParametricExpr::Literal(v) => write!(f, "{v}"),
            ParametricExpr::Add(a, b) => write!(f, "({a}+{b})"),
            ParametricExpr::Sub(a, b) => write!(f, "({a}-{b})"),
            ParametricExpr::Mul(a, b) => write!(f, "({a}*{b})"),
        }
    }
}

/// A width or array-size dimension: either a resolved literal or a
/// parametric expression awaiting substitution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDim {
    Literal(u64),
    Parametric(ParametricExpr),
}

impl TypeDim {
    pub fn as_literal(&self) -> Result<u64> {
        match self {
            TypeDim::Literal(v) => Ok(*v),
            TypeDim::Parametric(expr) => Err(ConversionError::internal(
                None,
                format!("dimension is not resolved to a literal: {expr}"),
            )),
        }
    }
}

impl fmt::Display for TypeDim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDim::Literal(v) => write!(f, "{v}"),
            TypeDim::Parametric(expr) => write!(f, "{expr}"),
        }
    }
}

/// A fully checked Weft type. Struct member names survive until IR
/// lowering erases them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConcreteType {
    Bits { signed: bool, size: TypeDim },
    Enum { size: TypeDim },
    Array { element: Box<ConcreteType>, size: TypeDim },
    Tuple { members: Vec<ConcreteType> },
    Struct { members: Vec<(String, ConcreteType)> },
}

impl ConcreteType {
    pub fn ubits(width: u64) -> Self {
        ConcreteType::Bits {
            signed: false,
            size: TypeDim::Literal(width),
        }
    }

    pub fn sbits(width: u64) -> Self {
        ConcreteType::Bits {
            signed: true,
            size: TypeDim::Literal(width),
        }
    }

    pub fn array_of(element: ConcreteType, size: u64) -> Self {
        ConcreteType::Array {
            element: Box::new(element),
            size: TypeDim::Literal(size),
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(self, ConcreteType::Bits { signed: true, .. })
    }

    /// Total packed bit count. All dimensions must be resolved.
    pub fn total_bit_count(&self) -> Result<u64> {
        match self {
            ConcreteType::Bits { size, .. } | ConcreteType::Enum { size } => size.as_literal(),
            ConcreteType::Array { element, size } => {
                Ok(element.total_bit_count()? * size.as_literal()?)
            }
            ConcreteType::Tuple { members } => {
                members.iter().map(|m| m.total_bit_count()).sum()
            }
            ConcreteType::Struct { members } => {
                members.iter().map(|(_, m)| m.total_bit_count()).sum()
            }
        }
    }

    /// Declaration-order index of a struct member.
    pub fn member_index(&self, name: &str) -> Option<usize> {
        match self {
            ConcreteType::Struct { members } => members.iter().position(|(n, _)| n == name),
            _ => None,
        }
    }

    /// Rebuilds the type with every dimension passed through `f`.
    pub fn map_dims(&self, f: &mut impl FnMut(&TypeDim) -> Result<TypeDim>) -> Result<ConcreteType> {
        Ok(match self {
            ConcreteType::Bits { signed, size } => ConcreteType::Bits {
                signed: *signed,
                size: f(size)?,
            },
            ConcreteType::Enum { size } => ConcreteType::Enum { size: f(size)? },
            ConcreteType::Array { element, size } => ConcreteType::Array {
                element: Box::new(element.map_dims(f)?),
                size: f(size)?,
            },
            ConcreteType::Tuple { members } => ConcreteType::Tuple {
                members: members.iter().map(|m| m.map_dims(f)).try_collect()?,
            },
            ConcreteType::Struct { members } => ConcreteType::Struct {
                members: members
                    .iter()
                    .map(|(n, m)| Ok((n.clone(), m.map_dims(f)?)))
                    .try_collect()?,
            },
        })
    }
}

impl fmt::Display for ConcreteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcreteType::Bits { signed: false, size } => write!(f, "uN[{size}]"),
            ConcreteType::Bits { signed: true, size } => write!(f, "sN[{size}]"),
            ConcreteType::Enum { size } => write!(f, "enum[{size}]"),
            ConcreteType::Array { element, size } => write!(f, "{element}[{size}]"),
            ConcreteType::Tuple { members } => {
                write!(f, "({})", members.iter().join(", "))
            }
            ConcreteType::Struct { members } => {
                write!(
                    f,
                    "{{{}}}",
                    members.iter().map(|(n, t)| format!("{n}: {t}")).join(", ")
                )
            }
        }
    }
}

/// Parametric identifier → integer value, in binding-declaration order.
/// Order is load-bearing: mangled names append values in this order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SymbolicBindings {
    bindings: IndexMap<String, u64>,
}

impl SymbolicBindings {
    pub fn new(pairs: impl IntoIterator<Item = (String, u64)>) -> Self {
        SymbolicBindings {
            bindings: pairs.into_iter().collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<u64> {
        self.bindings.get(name).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.bindings.keys().map(String::as_str)
    }

    pub fn values(&self) -> impl Iterator<Item = u64> + '_ {
        self.bindings.values().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u64)> {
        self.bindings.iter().map(|(k, v)| (k.as_str(), *v))
    }

    /// Hashable key form, used to index per-instantiation tables.
    pub fn to_key(&self) -> Vec<(String, u64)> {
        self.bindings
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }
}

impl fmt::Display for SymbolicBindings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{{}}}",
            self.bindings
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .join(", ")
        )
    }
}

/// Resolved bounds of a constant slice expression.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartAndWidth {
    pub start: u64,
    pub width: u64,
}

/// An imported module together with its own type information.
#[derive(Debug, Clone)]
pub struct ImportedInfo {
    pub module: Rc<Module>,
    pub type_info: Rc<TypeInfo>,
}

/// Read-only oracle produced by the type checker: concrete types per node,
/// resolved slice bounds, per-invocation symbolic bindings, and resolved
/// imports.
#[derive(Debug, Clone, Default)]
pub struct TypeInfo {
    types: HashMap<AstNodeId, ConcreteType>,
    slices: HashMap<(AstNodeId, Vec<(String, u64)>), StartAndWidth>,
    invocation_bindings: HashMap<AstNodeId, SymbolicBindings>,
    imports: HashMap<AstNodeId, ImportedInfo>,
}

impl TypeInfo {
    pub fn new() -> Self {
        TypeInfo::default()
    }

    pub fn set_type(&mut self, node: AstNodeId, ty: ConcreteType) {
        self.types.insert(node, ty);
    }

    pub fn get_type(&self, node: AstNodeId) -> Option<&ConcreteType> {
        self.types.get(&node)
    }

    pub fn add_slice_bounds(
        &mut self,
        node: AstNodeId,
        bindings: &SymbolicBindings,
        bounds: StartAndWidth,
    ) {
        self.slices.insert((node, bindings.to_key()), bounds);
    }

    pub fn slice_bounds(
        &self,
        node: AstNodeId,
        bindings: &SymbolicBindings,
    ) -> Option<StartAndWidth> {
        self.slices.get(&(node, bindings.to_key())).copied()
    }

    pub fn set_invocation_bindings(&mut self, node: AstNodeId, bindings: SymbolicBindings) {
        self.invocation_bindings.insert(node, bindings);
    }

    pub fn invocation_bindings(&self, node: AstNodeId) -> Option<&SymbolicBindings> {
        self.invocation_bindings.get(&node)
    }

    pub fn add_import(&mut self, import_name_def: AstNodeId, info: ImportedInfo) {
        self.imports.insert(import_name_def, info);
    }

    pub fn get_imported(&self, import_name_def: AstNodeId) -> Option<&ImportedInfo> {
        self.imports.get(&import_name_def)
    }
}
