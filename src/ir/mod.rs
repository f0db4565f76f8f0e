//! SSA-style pure-dataflow IR: packages, functions, and the node graph.
//!
//! Nodes are pure operators over fixed-width bit vectors, tuples, and
//! arrays. Construction goes through [`FunctionBuilder`], which computes
//! the result type of every operator it appends.

pub mod bits;
pub mod builder;
pub mod value;

pub use bits::Bits;
pub use builder::{BValue, FunctionBuilder};
pub use value::Value;

use std::fmt;

use itertools::Itertools;

use crate::{ConversionError, Result};

/// An IR type: packed bits, an array, or a tuple. Struct field names and
/// enum tags do not survive into the IR.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrType {
    Bits { width: u64 },
    Array { element: Box<IrType>, size: u64 },
    Tuple { members: Vec<IrType> },
}

impl IrType {
    pub fn bits(width: u64) -> Self {
        IrType::Bits { width }
    }

    pub fn array_of(element: IrType, size: u64) -> Self {
        IrType::Array {
            element: Box::new(element),
            size,
        }
    }

    pub fn bit_count(&self) -> u64 {
        match self {
            IrType::Bits { width } => *width,
            IrType::Array { element, size } => element.bit_count() * size,
            IrType::Tuple { members } => members.iter().map(IrType::bit_count).sum(),
        }
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Bits { width } => write!(f, "bits[{width}]"),
            IrType::Array { element, size } => write!(f, "{element}[{size}]"),
            IrType::Tuple { members } => write!(f, "({})", members.iter().join(", ")),
        }
    }
}

/// Index into a [`Package`]'s file table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fileno(pub u32);

/// Source location attached to a node when position emission is enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub fileno: Fileno,
    pub lineno: u32,
    pub colno: u32,
}

/// Whether `one_hot` prioritizes the least or most significant set bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LsbOrMsb {
    Lsb,
    Msb,
}

/// Operator of an IR node. Operand lists live on the node itself; payloads
/// here carry the operator's compile-time attributes.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Param { name: String },
    Literal { value: Value },
    Add,
    Sub,
    UMul,
    SMul,
    UDiv,
    Eq,
    Ne,
    UGe,
    UGt,
    ULe,
    ULt,
    SGe,
    SGt,
    SLe,
    SLt,
    Shrl,
    Shll,
    Shra,
    And,
    Or,
    Xor,
    Not,
    Neg,
    BitSlice { start: u64, width: u64 },
    DynamicBitSlice { width: u64 },
    SignExtend { new_width: u64 },
    ZeroExtend { new_width: u64 },
    Concat,
    ArrayConcat,
    Tuple,
    TupleIndex { index: u64 },
    Array,
    ArrayIndex,
    ArrayUpdate,
    OneHot { priority: LsbOrMsb },
    OneHotSelect,
    MatchTrue { num_arms: usize },
    Clz,
    Ctz,
    Reverse,
    AndReduce,
    OrReduce,
    XorReduce,
    Map { callee: String },
    Invoke { callee: String },
    CountedFor { trip_count: u64, stride: u64, body: String },
    Select,
    Identity,
}

impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Op::Param { .. } => "param",
            Op::Literal { .. } => "literal",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::UMul => "umul",
            Op::SMul => "smul",
            Op::UDiv => "udiv",
            Op::Eq => "eq",
            Op::Ne => "ne",
            Op::UGe => "uge",
            Op::UGt => "ugt",
            Op::ULe => "ule",
            Op::ULt => "ult",
            Op::SGe => "sge",
            Op::SGt => "sgt",
            Op::SLe => "sle",
            Op::SLt => "slt",
            Op::Shrl => "shrl",
            Op::Shll => "shll",
            Op::Shra => "shra",
            Op::And => "and",
            Op::Or => "or",
            Op::Xor => "xor",
            Op::Not => "not",
            Op::Neg => "neg",
            Op::BitSlice { .. } => "bit_slice",
            Op::DynamicBitSlice { .. } => "dynamic_bit_slice",
            Op::SignExtend { .. } => "sign_ext",
            Op::ZeroExtend { .. } => "zero_ext",
            Op::Concat => "concat",
            Op::ArrayConcat => "array_concat",
            Op::Tuple => "tuple",
            Op::TupleIndex { .. } => "tuple_index",
            Op::Array => "array",
            Op::ArrayIndex => "array_index",
            Op::ArrayUpdate => "array_update",
            Op::OneHot { .. } => "one_hot",
            Op::OneHotSelect => "one_hot_sel",
            Op::MatchTrue { .. } => "match_true",
            Op::Clz => "clz",
            Op::Ctz => "ctz",
            Op::Reverse => "reverse",
            Op::AndReduce => "and_reduce",
            Op::OrReduce => "or_reduce",
            Op::XorReduce => "xor_reduce",
            Op::Map { .. } => "map",
            Op::Invoke { .. } => "invoke",
            Op::CountedFor { .. } => "counted_for",
            Op::Select => "sel",
            Op::Identity => "identity",
        }
    }

    /// Extra `key=value` attributes rendered in the text dump.
    fn attributes(&self) -> Vec<String> {
        match self {
            Op::Literal { value } => vec![format!("value={value}")],
            Op::BitSlice { start, width } => {
                vec![format!("start={start}"), format!("width={width}")]
            }
            Op::DynamicBitSlice { width } => vec![format!("width={width}")],
            Op::SignExtend { new_width } | Op::ZeroExtend { new_width } => {
                vec![format!("new_bit_count={new_width}")]
            }
            Op::TupleIndex { index } => vec![format!("index={index}")],
            Op::OneHot { priority } => vec![format!(
                "lsb_prio={}",
                matches!(priority, LsbOrMsb::Lsb)
            )],
            Op::Map { callee } | Op::Invoke { callee } => {
                vec![format!("to_apply={callee}")]
            }
            Op::CountedFor {
                trip_count,
                stride,
                body,
            } => vec![
                format!("trip_count={trip_count}"),
                format!("stride={stride}"),
                format!("body={body}"),
            ],
            _ => Vec::new(),
        }
    }
}

/// One node of a function's dataflow graph.
#[derive(Debug, Clone)]
pub struct Node {
    pub id: usize,
    pub op: Op,
    pub operands: Vec<usize>,
    pub ty: IrType,
    /// Debug name, usually derived from a source-level identifier.
    pub name: Option<String>,
    pub loc: Option<SourceLocation>,
}

impl Node {
    /// Short name used to reference this node in the text dump.
    pub fn ref_name(&self) -> String {
        match (&self.name, &self.op) {
            (Some(name), _) => format!("{}.{}", name, self.id),
            (None, Op::Param { name }) => name.clone(),
            (None, op) => format!("{}.{}", op.mnemonic(), self.id),
        }
    }
}

/// A finished IR function.
#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub nodes: Vec<Node>,
    pub params: Vec<usize>,
    pub ret: usize,
}

impl Function {
    pub fn return_type(&self) -> &IrType {
        &self.nodes[self.ret].ty
    }

    pub fn node(&self, id: usize) -> &Node {
        &self.nodes[id]
    }

    pub fn dump_ir(&self) -> String {
        let params = self
            .params
            .iter()
            .map(|&p| {
                let node = &self.nodes[p];
                match &node.op {
                    Op::Param { name } => format!("{}: {}", name, node.ty),
                    _ => format!("{}: {}", node.ref_name(), node.ty),
                }
            })
            .join(", ");
        let mut out = format!("fn {}({}) -> {} {{\n", self.name, params, self.return_type());
        for node in &self.nodes {
            if matches!(node.op, Op::Param { .. }) {
                continue;
            }
            let operands = node.operands.iter().map(|&o| self.nodes[o].ref_name());
            let args = operands.chain(node.op.attributes()).join(", ");
            out.push_str(&format!(
                "  {}: {} = {}({})\n",
                node.ref_name(),
                node.ty,
                node.op.mnemonic(),
                args
            ));
        }
        out.push_str(&format!("  ret {}\n}}\n", self.nodes[self.ret].ref_name()));
        out
    }
}

/// A collection of IR functions plus the file table used by source
/// locations. Function names are the mangled instantiation names and are
/// unique within the package.
#[derive(Debug, Clone)]
pub struct Package {
    pub name: String,
    functions: Vec<Function>,
    files: Vec<String>,
}

impl Package {
    pub fn new(name: impl Into<String>) -> Self {
        Package {
            name: name.into(),
            functions: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn get_or_create_fileno(&mut self, path: &str) -> Fileno {
        if let Some(i) = self.files.iter().position(|f| f == path) {
            return Fileno(i as u32);
        }
        self.files.push(path.to_string());
        Fileno((self.files.len() - 1) as u32)
    }

    pub fn file_path(&self, fileno: Fileno) -> Option<&str> {
        self.files.get(fileno.0 as usize).map(String::as_str)
    }

    pub fn add_function(&mut self, function: Function) -> Result<()> {
        if self.has_function(&function.name) {
            return Err(ConversionError::internal(
                None,
                format!("package already has a function named `{}`", function.name),
            ));
        }
        self.functions.push(function);
        Ok(())
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.get_function(name).is_some()
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn dump_ir(&self) -> String {
        let mut out = format!("package {}\n", self.name);
        for f in &self.functions {
            out.push('\n');
            out.push_str(&f.dump_ir());
        }
        out
    }
}
