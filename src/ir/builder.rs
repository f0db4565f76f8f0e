//! Builder that appends typed operator nodes to an IR function.
//!
//! Each constructor computes the result type of the node it appends, so a
//! finished function is fully typed by construction. Constructors that can
//! observe a malformed request (indexing a non-tuple, concatenating
//! non-bits) return an error; the rest are infallible.

use super::{Function, IrType, LsbOrMsb, Node, Op, SourceLocation, Value};
use crate::{ConversionError, Result};

/// Handle to a node under construction. Cheap to copy; only meaningful for
/// the builder that produced it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BValue {
    index: usize,
}

impl BValue {
    pub fn index(&self) -> usize {
        self.index
    }
}

#[derive(Debug)]
pub struct FunctionBuilder {
    name: String,
    nodes: Vec<Node>,
    params: Vec<usize>,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        FunctionBuilder {
            name: name.into(),
            nodes: Vec::new(),
            params: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn add_node(
        &mut self,
        op: Op,
        operands: Vec<BValue>,
        ty: IrType,
        loc: Option<SourceLocation>,
    ) -> BValue {
        let id = self.nodes.len();
        self.nodes.push(Node {
            id,
            op,
            operands: operands.into_iter().map(|v| v.index).collect(),
            ty,
            name: None,
            loc,
        });
        BValue { index: id }
    }

    pub fn get_type(&self, value: BValue) -> &IrType {
        &self.nodes[value.index].ty
    }

    pub fn set_name(&mut self, value: BValue, name: impl Into<String>) {
        self.nodes[value.index].name = Some(name.into());
    }

    pub fn get_name(&self, value: BValue) -> Option<&str> {
        let node = &self.nodes[value.index];
        match (&node.name, &node.op) {
            (Some(name), _) => Some(name),
            (None, Op::Param { name }) => Some(name),
            (None, _) => None,
        }
    }

    pub fn param(
        &mut self,
        name: impl Into<String>,
        ty: IrType,
        loc: Option<SourceLocation>,
    ) -> BValue {
        let name = name.into();
        let value = self.add_node(Op::Param { name }, Vec::new(), ty, loc);
        self.params.push(value.index);
        value
    }

    pub fn literal(&mut self, value: Value, loc: Option<SourceLocation>) -> Result<BValue> {
        let ty = value.ir_type()?;
        Ok(self.add_node(Op::Literal { value }, Vec::new(), ty, loc))
    }

    fn binop_same_width(
        &mut self,
        op: Op,
        lhs: BValue,
        rhs: BValue,
        loc: Option<SourceLocation>,
    ) -> BValue {
        let ty = self.get_type(lhs).clone();
        self.add_node(op, vec![lhs, rhs], ty, loc)
    }

    fn comparison(
        &mut self,
        op: Op,
        lhs: BValue,
        rhs: BValue,
        loc: Option<SourceLocation>,
    ) -> BValue {
        self.add_node(op, vec![lhs, rhs], IrType::bits(1), loc)
    }

    pub fn add(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::Add, lhs, rhs, loc)
    }

    pub fn subtract(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::Sub, lhs, rhs, loc)
    }

    pub fn umul(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::UMul, lhs, rhs, loc)
    }

    pub fn smul(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::SMul, lhs, rhs, loc)
    }

    pub fn udiv(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::UDiv, lhs, rhs, loc)
    }

    pub fn eq(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::Eq, lhs, rhs, loc)
    }

    pub fn ne(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::Ne, lhs, rhs, loc)
    }

    pub fn uge(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::UGe, lhs, rhs, loc)
    }

    pub fn ugt(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::UGt, lhs, rhs, loc)
    }

    pub fn ule(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::ULe, lhs, rhs, loc)
    }

    pub fn ult(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::ULt, lhs, rhs, loc)
    }

    pub fn sge(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::SGe, lhs, rhs, loc)
    }

    pub fn sgt(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::SGt, lhs, rhs, loc)
    }

    pub fn sle(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::SLe, lhs, rhs, loc)
    }

    pub fn slt(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.comparison(Op::SLt, lhs, rhs, loc)
    }

    pub fn shrl(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::Shrl, lhs, rhs, loc)
    }

    pub fn shll(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::Shll, lhs, rhs, loc)
    }

    pub fn shra(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::Shra, lhs, rhs, loc)
    }

    pub fn and(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::And, lhs, rhs, loc)
    }

    pub fn or(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::Or, lhs, rhs, loc)
    }

    pub fn xor(&mut self, lhs: BValue, rhs: BValue, loc: Option<SourceLocation>) -> BValue {
        self.binop_same_width(Op::Xor, lhs, rhs, loc)
    }

    /// N-ary `or` over same-width operands.
    pub fn nary_or(&mut self, values: Vec<BValue>, loc: Option<SourceLocation>) -> Result<BValue> {
        let first = values.first().ok_or_else(|| {
            ConversionError::internal(None, "nary_or requires at least one operand")
        })?;
        let ty = self.get_type(*first).clone();
        Ok(self.add_node(Op::Or, values, ty, loc))
    }

    pub fn not(&mut self, value: BValue, loc: Option<SourceLocation>) -> BValue {
        let ty = self.get_type(value).clone();
        self.add_node(Op::Not, vec![value], ty, loc)
    }

    pub fn neg(&mut self, value: BValue, loc: Option<SourceLocation>) -> BValue {
        let ty = self.get_type(value).clone();
        self.add_node(Op::Neg, vec![value], ty, loc)
    }

    pub fn bit_slice(
        &mut self,
        value: BValue,
        start: u64,
        width: u64,
        loc: Option<SourceLocation>,
    ) -> BValue {
        self.add_node(
            Op::BitSlice { start, width },
            vec![value],
            IrType::bits(width),
            loc,
        )
    }

    pub fn dynamic_bit_slice(
        &mut self,
        value: BValue,
        start: BValue,
        width: u64,
        loc: Option<SourceLocation>,
    ) -> BValue {
        self.add_node(
            Op::DynamicBitSlice { width },
            vec![value, start],
            IrType::bits(width),
            loc,
        )
    }

    pub fn sign_extend(
        &mut self,
        value: BValue,
        new_width: u64,
        loc: Option<SourceLocation>,
    ) -> BValue {
        self.add_node(
            Op::SignExtend { new_width },
            vec![value],
            IrType::bits(new_width),
            loc,
        )
    }

    pub fn zero_extend(
        &mut self,
        value: BValue,
        new_width: u64,
        loc: Option<SourceLocation>,
    ) -> BValue {
        self.add_node(
            Op::ZeroExtend { new_width },
            vec![value],
            IrType::bits(new_width),
            loc,
        )
    }

    /// Concatenation of bits operands, first operand most significant.
    pub fn concat(&mut self, values: Vec<BValue>, loc: Option<SourceLocation>) -> Result<BValue> {
        let mut width = 0;
        for v in &values {
            match self.get_type(*v) {
                IrType::Bits { width: w } => width += w,
                other => {
                    return Err(ConversionError::internal(
                        None,
                        format!("concat operand must be bits; got {other}"),
                    ))
                }
            }
        }
        Ok(self.add_node(Op::Concat, values, IrType::bits(width), loc))
    }

    pub fn array_concat(
        &mut self,
        values: Vec<BValue>,
        loc: Option<SourceLocation>,
    ) -> Result<BValue> {
        let mut element = None;
        let mut size = 0;
        for v in &values {
            match self.get_type(*v) {
                IrType::Array { element: e, size: n } => {
                    if element.is_none() {
                        element = Some(e.clone());
                    }
                    size += n;
                }
                other => {
                    return Err(ConversionError::internal(
                        None,
                        format!("array_concat operand must be an array; got {other}"),
                    ))
                }
            }
        }
        let element = element.ok_or_else(|| {
            ConversionError::internal(None, "array_concat requires at least one operand")
        })?;
        Ok(self.add_node(
            Op::ArrayConcat,
            values,
            IrType::Array { element, size },
            loc,
        ))
    }

    pub fn tuple(&mut self, values: Vec<BValue>, loc: Option<SourceLocation>) -> BValue {
        let members = values.iter().map(|v| self.get_type(*v).clone()).collect();
        self.add_node(Op::Tuple, values, IrType::Tuple { members }, loc)
    }

    pub fn tuple_index(
        &mut self,
        value: BValue,
        index: u64,
        loc: Option<SourceLocation>,
    ) -> Result<BValue> {
        let ty = match self.get_type(value) {
            IrType::Tuple { members } => members.get(index as usize).cloned().ok_or_else(|| {
                ConversionError::internal(
                    None,
                    format!("tuple index {index} out of range for {} members", members.len()),
                )
            })?,
            other => {
                return Err(ConversionError::internal(
                    None,
                    format!("tuple_index requires a tuple operand; got {other}"),
                ))
            }
        };
        Ok(self.add_node(Op::TupleIndex { index }, vec![value], ty, loc))
    }

    pub fn array(
        &mut self,
        values: Vec<BValue>,
        element_type: IrType,
        loc: Option<SourceLocation>,
    ) -> BValue {
        let size = values.len() as u64;
        self.add_node(
            Op::Array,
            values,
            IrType::Array {
                element: Box::new(element_type),
                size,
            },
            loc,
        )
    }

    pub fn array_index(
        &mut self,
        value: BValue,
        indices: Vec<BValue>,
        loc: Option<SourceLocation>,
    ) -> Result<BValue> {
        let mut ty = self.get_type(value).clone();
        for _ in 0..indices.len() {
            ty = match ty {
                IrType::Array { element, .. } => *element,
                other => {
                    return Err(ConversionError::internal(
                        None,
                        format!("array_index requires an array operand; got {other}"),
                    ))
                }
            };
        }
        let mut operands = vec![value];
        operands.extend(indices);
        Ok(self.add_node(Op::ArrayIndex, operands, ty, loc))
    }

    pub fn array_update(
        &mut self,
        value: BValue,
        new_value: BValue,
        indices: Vec<BValue>,
        loc: Option<SourceLocation>,
    ) -> BValue {
        let ty = self.get_type(value).clone();
        let mut operands = vec![value, new_value];
        operands.extend(indices);
        self.add_node(Op::ArrayUpdate, operands, ty, loc)
    }

    /// One-hot encoding; the output is one bit wider than the input so the
    /// all-zeros case has its own lane.
    pub fn one_hot(
        &mut self,
        value: BValue,
        priority: LsbOrMsb,
        loc: Option<SourceLocation>,
    ) -> Result<BValue> {
        let width = match self.get_type(value) {
            IrType::Bits { width } => *width,
            other => {
                return Err(ConversionError::internal(
                    None,
                    format!("one_hot requires a bits operand; got {other}"),
                ))
            }
        };
        Ok(self.add_node(
            Op::OneHot { priority },
            vec![value],
            IrType::bits(width + 1),
            loc,
        ))
    }

    pub fn one_hot_select(
        &mut self,
        selector: BValue,
        cases: Vec<BValue>,
        loc: Option<SourceLocation>,
    ) -> Result<BValue> {
        let first = cases.first().ok_or_else(|| {
            ConversionError::internal(None, "one_hot_select requires at least one case")
        })?;
        let ty = self.get_type(*first).clone();
        let mut operands = vec![selector];
        operands.extend(cases);
        Ok(self.add_node(Op::OneHotSelect, operands, ty, loc))
    }

    /// Selects the value whose 1-bit selector is true; `default` is chosen
    /// when every selector is false. Selector i guards value i.
    pub fn match_true(
        &mut self,
        selectors: Vec<BValue>,
        values: Vec<BValue>,
        default: BValue,
        loc: Option<SourceLocation>,
    ) -> Result<BValue> {
        if selectors.len() != values.len() {
            return Err(ConversionError::internal(
                None,
                format!(
                    "match_true selector/value arity mismatch: {} vs {}",
                    selectors.len(),
                    values.len()
                ),
            ));
        }
        let ty = self.get_type(default).clone();
        let num_arms = selectors.len();
        let mut operands = selectors;
        operands.extend(values);
        operands.push(default);
        Ok(self.add_node(Op::MatchTrue { num_arms }, operands, ty, loc))
    }

    pub fn clz(&mut self, value: BValue, loc: Option<SourceLocation>) -> BValue {
        let ty = self.get_type(value).clone();
        self.add_node(Op::Clz, vec![value], ty, loc)
    }

    pub fn ctz(&mut self, value: BValue, loc: Option<SourceLocation>) -> BValue {
        let ty = self.get_type(value).clone();
        self.add_node(Op::Ctz, vec![value], ty, loc)
    }

    pub fn reverse(&mut self, value: BValue, loc: Option<SourceLocation>) -> BValue {
        let ty = self.get_type(value).clone();
        self.add_node(Op::Reverse, vec![value], ty, loc)
    }

    pub fn and_reduce(&mut self, value: BValue, loc: Option<SourceLocation>) -> BValue {
        self.add_node(Op::AndReduce, vec![value], IrType::bits(1), loc)
    }

    pub fn or_reduce(&mut self, value: BValue, loc: Option<SourceLocation>) -> BValue {
        self.add_node(Op::OrReduce, vec![value], IrType::bits(1), loc)
    }

    pub fn xor_reduce(&mut self, value: BValue, loc: Option<SourceLocation>) -> BValue {
        self.add_node(Op::XorReduce, vec![value], IrType::bits(1), loc)
    }

    /// Applies `callee` elementwise over an array argument.
    pub fn map(
        &mut self,
        arg: BValue,
        callee: &Function,
        loc: Option<SourceLocation>,
    ) -> Result<BValue> {
        let size = match self.get_type(arg) {
            IrType::Array { size, .. } => *size,
            other => {
                return Err(ConversionError::internal(
                    None,
                    format!("map requires an array operand; got {other}"),
                ))
            }
        };
        let ty = IrType::Array {
            element: Box::new(callee.return_type().clone()),
            size,
        };
        Ok(self.add_node(
            Op::Map {
                callee: callee.name.clone(),
            },
            vec![arg],
            ty,
            loc,
        ))
    }

    pub fn select(
        &mut self,
        cond: BValue,
        on_true: BValue,
        on_false: BValue,
        loc: Option<SourceLocation>,
    ) -> BValue {
        let ty = self.get_type(on_true).clone();
        self.add_node(Op::Select, vec![cond, on_true, on_false], ty, loc)
    }

    pub fn invoke(
        &mut self,
        args: Vec<BValue>,
        callee: &Function,
        loc: Option<SourceLocation>,
    ) -> BValue {
        let ty = callee.return_type().clone();
        self.add_node(
            Op::Invoke {
                callee: callee.name.clone(),
            },
            args,
            ty,
            loc,
        )
    }

    pub fn counted_for(
        &mut self,
        init: BValue,
        trip_count: u64,
        stride: u64,
        body: &Function,
        invariant_args: Vec<BValue>,
        loc: Option<SourceLocation>,
    ) -> BValue {
        let ty = self.get_type(init).clone();
        let mut operands = vec![init];
        operands.extend(invariant_args);
        self.add_node(
            Op::CountedFor {
                trip_count,
                stride,
                body: body.name.clone(),
            },
            operands,
            ty,
            loc,
        )
    }

    pub fn identity(&mut self, value: BValue, loc: Option<SourceLocation>) -> BValue {
        let ty = self.get_type(value).clone();
        self.add_node(Op::Identity, vec![value], ty, loc)
    }

    /// Finalizes the function with `ret` as its return value.
    pub fn build(self, ret: BValue) -> Result<Function> {
        if ret.index >= self.nodes.len() {
            return Err(ConversionError::internal(
                None,
                format!("return value #{} is not a node of `{}`", ret.index, self.name),
            ));
        }
        Ok(Function {
            name: self.name,
            nodes: self.nodes,
            params: self.params,
            ret: ret.index,
        })
    }
}
