//! Expression lowering: one exhaustive dispatch over AST node kinds.
//!
//! Children are lowered before their parent is bound, preserving the
//! read-after-write discipline of the value table.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{
    ArrayExpr, AstNodeId, AstNodeKind, Attr, Binop, BinopKind, Cast, ColonRef, EnumDef, IndexExpr,
    IndexRhs, Let, Module, NameDefTree, Number, SplatStructInstance, StructDef, StructInstance,
    Ternary, TupleExpr, TypeDefinition, Unop, UnopKind,
};
use crate::ir::{Bits, IrType, Value};
use crate::types::{ConcreteType, ImportedInfo, TypeInfo};
use crate::{ConversionError, Result};

use super::context::IrConverter;

/// Result of dereferencing a nominal type through typedef/import chains:
/// the definition plus the module context it lives in.
pub(super) enum StructOrEnum {
    Struct(StructDef, Rc<Module>, Rc<TypeInfo>),
    Enum(EnumDef, Rc<Module>, Rc<TypeInfo>),
}

impl<'p> IrConverter<'p> {
    /// Lowers the expression at `node`, leaving its IR value bound in the
    /// value table.
    pub(super) fn visit(&mut self, node: AstNodeId) -> Result<()> {
        let module = Rc::clone(&self.module);
        let ast_node = module.node(node).ok_or_else(|| {
            ConversionError::internal(
                None,
                format!("AST node {node:?} is not part of module `{}`", module.name),
            )
        })?;
        trace!(kind = ast_node.kind.name(), "visiting node");
        match &ast_node.kind {
            AstNodeKind::Number(n) => self.handle_number(node, n),
            AstNodeKind::NameDef(_) | AstNodeKind::Wildcard => Ok(()),
            AstNodeKind::NameRef(name_ref) => {
                self.def_alias(name_ref.name_def, node)?;
                Ok(())
            }
            AstNodeKind::ColonRef(colon_ref) => self.handle_colon_ref(node, colon_ref),
            AstNodeKind::Unop(unop) => {
                self.visit(unop.operand)?;
                self.handle_unop(node, unop)
            }
            AstNodeKind::Binop(binop) => {
                self.visit(binop.lhs)?;
                self.visit(binop.rhs)?;
                self.handle_binop(node, binop)
            }
            AstNodeKind::Ternary(ternary) => {
                self.visit(ternary.test)?;
                self.visit(ternary.consequent)?;
                self.visit(ternary.alternate)?;
                self.handle_ternary(node, ternary)
            }
            AstNodeKind::Cast(cast) => self.handle_cast(node, cast),
            AstNodeKind::Tuple(tuple) => {
                for member in &tuple.members {
                    self.visit(*member)?;
                }
                self.handle_tuple(node, tuple)
            }
            AstNodeKind::Array(array) => self.handle_array(node, array),
            AstNodeKind::ConstantArray(array) => {
                for member in &array.members {
                    self.visit(*member)?;
                }
                self.handle_constant_array(node, array)
            }
            AstNodeKind::Index(index) => self.handle_index(node, index),
            AstNodeKind::Attr(attr) => {
                self.visit(attr.lhs)?;
                self.handle_attr(node, attr)
            }
            AstNodeKind::Invocation(invocation) => self.handle_invocation(node, invocation),
            AstNodeKind::Let(let_) => self.handle_let(node, let_),
            AstNodeKind::Match(match_) => self.handle_match(node, match_),
            AstNodeKind::For(for_) => self.handle_for(node, for_),
            AstNodeKind::StructInstance(instance) => self.handle_struct_instance(node, instance),
            AstNodeKind::SplatStructInstance(splat) => {
                self.handle_splat_struct_instance(node, splat)
            }
            AstNodeKind::Slice(_) | AstNodeKind::WidthSlice(_) | AstNodeKind::NameDefTree(_) => {
                Err(self.internal_at(
                    node,
                    format!("cannot lower {} node directly", ast_node.kind.name()),
                ))
            }
        }
    }

    fn handle_number(&mut self, node: AstNodeId, number: &Number) -> Result<()> {
        let ty = self.resolve_type(node)?;
        let bit_count = ty.total_bit_count()?;
        let bits = Bits::from_i128(number.value, bit_count)?;
        self.def_const(node, Value::Bits(bits))?;
        Ok(())
    }

    fn handle_unop(&mut self, node: AstNodeId, unop: &Unop) -> Result<()> {
        let operand = self.use_value(unop.operand)?;
        let loc = self.loc(node);
        let result = match unop.kind {
            UnopKind::Negate => self.fb.neg(operand, loc),
            UnopKind::Invert => self.fb.not(operand, loc),
        };
        self.def(node, result)?;
        Ok(())
    }

    fn handle_binop(&mut self, node: AstNodeId, binop: &Binop) -> Result<()> {
        // Signedness discipline comes from the left operand's bits type.
        let signed_input = matches!(
            self.type_info.get_type(binop.lhs),
            Some(ConcreteType::Bits { signed: true, .. })
        );
        let lhs = self.use_value(binop.lhs)?;
        let rhs = self.use_value(binop.rhs)?;
        let loc = self.loc(node);
        let result = match binop.kind {
            // Concat makes different IR ops for bits and array operands.
            BinopKind::Concat => return self.handle_concat(node, lhs, rhs),
            BinopKind::Add => self.fb.add(lhs, rhs, loc),
            BinopKind::Sub => self.fb.subtract(lhs, rhs, loc),
            BinopKind::Mul => {
                if signed_input {
                    self.fb.smul(lhs, rhs, loc)
                } else {
                    self.fb.umul(lhs, rhs, loc)
                }
            }
            BinopKind::Div => {
                if signed_input {
                    return Err(self.unimplemented_at(
                        node,
                        "signed division is not supported for IR conversion",
                    ));
                }
                self.fb.udiv(lhs, rhs, loc)
            }
            BinopKind::Eq => self.fb.eq(lhs, rhs, loc),
            BinopKind::Ne => self.fb.ne(lhs, rhs, loc),
            BinopKind::Ge => {
                if signed_input {
                    self.fb.sge(lhs, rhs, loc)
                } else {
                    self.fb.uge(lhs, rhs, loc)
                }
            }
            BinopKind::Gt => {
                if signed_input {
                    self.fb.sgt(lhs, rhs, loc)
                } else {
                    self.fb.ugt(lhs, rhs, loc)
                }
            }
            BinopKind::Le => {
                if signed_input {
                    self.fb.sle(lhs, rhs, loc)
                } else {
                    self.fb.ule(lhs, rhs, loc)
                }
            }
            BinopKind::Lt => {
                if signed_input {
                    self.fb.slt(lhs, rhs, loc)
                } else {
                    self.fb.ult(lhs, rhs, loc)
                }
            }
            BinopKind::Shrl => self.fb.shrl(lhs, rhs, loc),
            BinopKind::Shll => self.fb.shll(lhs, rhs, loc),
            BinopKind::Shra => self.fb.shra(lhs, rhs, loc),
            BinopKind::Xor => self.fb.xor(lhs, rhs, loc),
            // Logical forms arrive on 1-bit operands, so the bitwise ops fit.
            BinopKind::And | BinopKind::LogicalAnd => self.fb.and(lhs, rhs, loc),
            BinopKind::Or | BinopKind::LogicalOr => self.fb.or(lhs, rhs, loc),
        };
        self.def(node, result)?;
        Ok(())
    }

    fn handle_concat(
        &mut self,
        node: AstNodeId,
        lhs: crate::ir::BValue,
        rhs: crate::ir::BValue,
    ) -> Result<()> {
        let output_type = self.resolve_type(node)?;
        let loc = self.loc(node);
        let result = match output_type {
            ConcreteType::Bits { .. } => self.fb.concat(vec![lhs, rhs], loc)?,
            ConcreteType::Array { .. } => self.fb.array_concat(vec![lhs, rhs], loc)?,
            other => {
                return Err(self.internal_at(
                    node,
                    format!("concat produces bits or an array; got {other}"),
                ))
            }
        };
        self.def(node, result)?;
        Ok(())
    }

    fn handle_ternary(&mut self, node: AstNodeId, ternary: &Ternary) -> Result<()> {
        let test = self.use_value(ternary.test)?;
        let consequent = self.use_value(ternary.consequent)?;
        let alternate = self.use_value(ternary.alternate)?;
        let loc = self.loc(node);
        let result = self.fb.select(test, consequent, alternate, loc);
        self.def(node, result)?;
        Ok(())
    }

    fn handle_cast(&mut self, node: AstNodeId, cast: &Cast) -> Result<()> {
        self.visit(cast.expr)?;
        let output_type = self.resolve_type(node)?;
        if matches!(output_type, ConcreteType::Array { .. }) {
            return self.cast_to_array(node, cast, &output_type);
        }
        let input_type = self.resolve_type(cast.expr)?;
        if matches!(input_type, ConcreteType::Array { .. }) {
            return self.cast_from_array(node, cast);
        }
        let new_bit_count = output_type.total_bit_count()?;
        let old_bit_count = input_type.total_bit_count()?;
        let input = self.use_value(cast.expr)?;
        let loc = self.loc(node);
        let result = if new_bit_count < old_bit_count {
            self.fb.bit_slice(input, 0, new_bit_count, loc)
        } else if input_type.is_signed() {
            self.fb.sign_extend(input, new_bit_count, loc)
        } else {
            self.fb.zero_extend(input, new_bit_count, loc)
        };
        self.def(node, result)?;
        Ok(())
    }

    /// Slices packed bits into consecutive chunks; the most significant
    /// chunk becomes array element 0.
    fn cast_to_array(
        &mut self,
        node: AstNodeId,
        cast: &Cast,
        output_type: &ConcreteType,
    ) -> Result<()> {
        let bits = self.use_value(cast.expr)?;
        let ConcreteType::Array { element, size } = output_type else {
            return Err(self.internal_at(node, "cast-to-array requires an array output type"));
        };
        let element_bit_count = element.total_bit_count()?;
        let array_size = size.as_literal()?;
        let mut slices = Vec::new();
        for i in 0..array_size {
            slices.push(
                self.fb
                    .bit_slice(bits, i * element_bit_count, element_bit_count, None),
            );
        }
        slices.reverse();
        let loc = self.loc(node);
        let result = self.fb.array(slices, IrType::bits(element_bit_count), loc);
        self.def(node, result)?;
        Ok(())
    }

    /// Indexes out every element and concatenates, element 0 most
    /// significant.
    fn cast_from_array(&mut self, node: AstNodeId, cast: &Cast) -> Result<()> {
        let array = self.use_value(cast.expr)?;
        let input_type = self.resolve_type_to_ir(cast.expr)?;
        let IrType::Array { size, .. } = input_type else {
            return Err(self.internal_at(node, "cast-from-array requires an array input type"));
        };
        let mut pieces = Vec::new();
        for i in 0..size {
            let index = self.fb.literal(Value::Bits(Bits::ubits(i, 32)?), None)?;
            pieces.push(self.fb.array_index(array, vec![index], None)?);
        }
        let loc = self.loc(node);
        let result = self.fb.concat(pieces, loc)?;
        self.def(node, result)?;
        Ok(())
    }

    fn handle_index(&mut self, node: AstNodeId, index: &IndexExpr) -> Result<()> {
        self.visit(index.lhs)?;
        let lhs = self.use_value(index.lhs)?;
        let lhs_type = self
            .type_info
            .get_type(index.lhs)
            .ok_or_else(|| self.internal_at(index.lhs, "index subject has no recorded type"))?
            .clone();
        match (&lhs_type, index.rhs) {
            // Tuple indexing requires a compile-time-constant index.
            (ConcreteType::Tuple { .. } | ConcreteType::Struct { .. }, IndexRhs::Value(rhs)) => {
                self.visit(rhs)?;
                let i = self.get_const_u64(rhs)?;
                let loc = self.loc(node);
                let result = self.fb.tuple_index(lhs, i, loc)?;
                self.def(node, result)?;
                Ok(())
            }
            (ConcreteType::Bits { .. }, IndexRhs::Width(width_slice)) => {
                let module = Rc::clone(&self.module);
                let Some(AstNodeKind::WidthSlice(ws)) =
                    module.node(width_slice).map(|n| &n.kind)
                else {
                    return Err(self.internal_at(width_slice, "expected a width-slice node"));
                };
                self.visit(ws.start)?;
                let start = self.use_value(ws.start)?;
                let width = self.resolve_type(node)?.total_bit_count()?;
                let loc = self.loc(node);
                let result = self.fb.dynamic_bit_slice(lhs, start, width, loc);
                self.def(node, result)?;
                Ok(())
            }
            (ConcreteType::Bits { .. }, IndexRhs::Slice(slice)) => {
                let bounds = self
                    .type_info
                    .slice_bounds(slice, &self.symbolic_bindings_tuple())
                    .ok_or_else(|| {
                        self.internal_at(slice, "slice has no resolved start/width bounds")
                    })?;
                let loc = self.loc(node);
                let result = self.fb.bit_slice(lhs, bounds.start, bounds.width, loc);
                self.def(node, result)?;
                Ok(())
            }
            (ConcreteType::Bits { .. }, IndexRhs::Value(_)) => Err(self.internal_at(
                node,
                "bits indexing requires a slice or width-slice subscript",
            )),
            (_, IndexRhs::Value(rhs)) => {
                self.visit(rhs)?;
                let i = self.use_value(rhs)?;
                let loc = self.loc(node);
                let result = self.fb.array_index(lhs, vec![i], loc)?;
                self.def(node, result)?;
                Ok(())
            }
            (_, _) => Err(self.internal_at(node, "slice subscript requires a bits subject")),
        }
    }

    fn handle_array(&mut self, node: AstNodeId, array: &ArrayExpr) -> Result<()> {
        let ty = self.resolve_type(node)?;
        let ConcreteType::Array { element, size } = &ty else {
            return Err(self.internal_at(node, "array literal must have an array type"));
        };
        let size = size.as_literal()?;
        let mut members = Vec::new();
        for member in &array.members {
            self.visit(*member)?;
            members.push(self.use_value(*member)?);
        }
        if array.has_ellipsis {
            let last = *members.last().ok_or_else(|| {
                self.internal_at(node, "array literal with ellipsis has no elements to repeat")
            })?;
            while (members.len() as u64) < size {
                members.push(last);
            }
        }
        let element_type = self.type_to_ir(element)?;
        let loc = self.loc(node);
        let result = self.fb.array(members, element_type, loc);
        self.def(node, result)?;
        Ok(())
    }

    /// All members are constants, so the whole array binds as one literal.
    fn handle_constant_array(&mut self, node: AstNodeId, array: &ArrayExpr) -> Result<()> {
        let ty = self.resolve_type(node)?;
        let ConcreteType::Array { size, .. } = &ty else {
            return Err(self.internal_at(node, "constant array must have an array type"));
        };
        let size = size.as_literal()?;
        let mut values = Vec::new();
        for member in &array.members {
            if !self.is_constant(*member) {
                return Err(self.internal_at(*member, "constant array member is not a constant"));
            }
            values.push(self.get_const_value(*member)?);
        }
        if array.has_ellipsis {
            let last = values
                .last()
                .cloned()
                .ok_or_else(|| {
                    self.internal_at(
                        node,
                        "array literal with ellipsis has no elements to repeat",
                    )
                })?;
            while (values.len() as u64) < size {
                values.push(last.clone());
            }
        }
        self.def_const(node, Value::Array(values))?;
        Ok(())
    }

    fn handle_tuple(&mut self, node: AstNodeId, tuple: &TupleExpr) -> Result<()> {
        let mut operands = Vec::new();
        for member in &tuple.members {
            operands.push(self.use_value(*member)?);
        }
        let loc = self.loc(node);
        let result = self.fb.tuple(operands, loc);
        self.def(node, result)?;
        Ok(())
    }

    fn handle_struct_instance(&mut self, node: AstNodeId, instance: &StructInstance) -> Result<()> {
        let struct_def = self.deref_struct(instance.struct_ref)?;
        let mut operands = Vec::new();
        let mut all_constant = true;
        let mut constant_values = Vec::new();
        for member_name in &struct_def.members {
            let expr = instance
                .members
                .iter()
                .find(|(name, _)| name == member_name)
                .map(|(_, expr)| *expr)
                .ok_or_else(|| {
                    self.internal_at(
                        node,
                        format!("struct instance is missing member `{member_name}`"),
                    )
                })?;
            self.visit(expr)?;
            operands.push(self.use_value(expr)?);
            if !self.is_constant(expr) {
                all_constant = false;
            }
            if all_constant {
                constant_values.push(self.get_const_value(expr)?);
            }
        }
        let loc = self.loc(node);
        let result = self.fb.tuple(operands, loc);
        if all_constant {
            self.bind_constant(node, Value::Tuple(constant_values), result)?;
        } else {
            self.def(node, result)?;
        }
        Ok(())
    }

    /// Splat update: overridden members take their new value, the rest are
    /// indexed out of the original, all in declaration order.
    fn handle_splat_struct_instance(
        &mut self,
        node: AstNodeId,
        splat: &SplatStructInstance,
    ) -> Result<()> {
        self.visit(splat.splatted)?;
        let original = self.use_value(splat.splatted)?;

        let mut updates = HashMap::new();
        for (name, expr) in &splat.members {
            self.visit(*expr)?;
            updates.insert(name.clone(), self.use_value(*expr)?);
        }

        let struct_def = self.deref_struct(splat.struct_ref)?;
        let mut members = Vec::new();
        for (i, member_name) in struct_def.members.iter().enumerate() {
            match updates.get(member_name) {
                Some(value) => members.push(*value),
                None => members.push(self.fb.tuple_index(original, i as u64, None)?),
            }
        }
        let loc = self.loc(node);
        let result = self.fb.tuple(members, loc);
        self.def(node, result)?;
        Ok(())
    }

    fn handle_attr(&mut self, node: AstNodeId, attr: &Attr) -> Result<()> {
        let lhs_type = self.resolve_type(attr.lhs)?;
        let index = lhs_type.member_index(&attr.attr).ok_or_else(|| {
            self.internal_at(node, format!("no struct member named `{}`", attr.attr))
        })? as u64;
        let lhs = self.use_value(attr.lhs)?;
        let loc = self.loc(node);
        let result = self.fb.tuple_index(lhs, index, loc)?;
        // Name the tuple-index after the accessed field for readable IR.
        let name = match self.fb.get_name(lhs) {
            Some(base) => format!("{base}_{}", attr.attr),
            None => attr.attr.clone(),
        };
        self.fb.set_name(result, name);
        self.def(node, result)?;
        Ok(())
    }

    fn handle_let(&mut self, node: AstNodeId, let_: &Let) -> Result<()> {
        self.visit(let_.rhs)?;
        let module = Rc::clone(&self.module);
        let tree = module.name_def_tree(let_.name_def_tree).ok_or_else(|| {
            self.internal_at(let_.name_def_tree, "let binding is not a name-def tree")
        })?;
        match tree {
            NameDefTree::Leaf(leaf) => {
                self.def_alias(let_.rhs, leaf.node())?;
            }
            NameDefTree::Interior(_) => {
                let rhs = self.use_value(let_.rhs)?;
                self.destructure_tuple(let_.name_def_tree, rhs)?;
            }
        }
        self.visit(let_.body)?;
        self.def_alias(let_.body, node)?;
        if self.last_expression.is_none() {
            self.last_expression = Some(let_.body);
        }
        Ok(())
    }

    /// Walks a nested tuple pattern, emitting a tuple-index per level and
    /// aliasing leaves to their names.
    fn destructure_tuple(&mut self, tree: AstNodeId, value: crate::ir::BValue) -> Result<()> {
        let module = Rc::clone(&self.module);
        let Some(NameDefTree::Interior(children)) = module.name_def_tree(tree) else {
            return Err(self.internal_at(tree, "expected an interior pattern node"));
        };
        for (i, child) in children.iter().enumerate() {
            let leaf = match module.name_def_tree(*child) {
                Some(NameDefTree::Leaf(leaf)) => Some(*leaf),
                Some(NameDefTree::Interior(_)) => None,
                None => {
                    return Err(self.internal_at(*child, "expected a pattern node"));
                }
            };
            let loc = match leaf {
                Some(leaf) => self.loc(leaf.node()),
                None => self.loc(*child),
            };
            let member = self.fb.tuple_index(value, i as u64, loc)?;
            self.def(*child, member)?;
            match leaf {
                Some(leaf) => {
                    self.def_alias(*child, leaf.node())?;
                }
                None => self.destructure_tuple(*child, member)?,
            }
        }
        Ok(())
    }

    fn handle_colon_ref(&mut self, node: AstNodeId, colon_ref: &ColonRef) -> Result<()> {
        // Invocations through a colon-ref are handled at the call site by
        // resolving the mangled callee name; this path covers imported
        // constants and enum members.
        if let Some(imported) = self.resolve_import_subject(colon_ref)? {
            let constant_def = *imported
                .module
                .get_constant_def(&colon_ref.attr)
                .ok_or_else(|| {
                    ConversionError::not_found(
                        self.span_of(node),
                        format!(
                            "module `{}` has no constant `{}`",
                            imported.module.name, colon_ref.attr
                        ),
                    )
                })?;
            let (module, type_info) = (Rc::clone(&imported.module), Rc::clone(&imported.type_info));
            self.with_context(module, type_info, |conv| {
                conv.handle_constant_def(constant_def)
            })?;
            self.def_alias(constant_def.name_def, node)?;
            return Ok(());
        }

        // Enum member: dereference the typedef chain to the enum
        // definition, then lower its value expression in the defining
        // module's context.
        let type_definition = self.colon_ref_type_definition(colon_ref)?;
        let deref = self.deref_struct_or_enum(
            Rc::clone(&self.module),
            Rc::clone(&self.type_info),
            type_definition,
        )?;
        let StructOrEnum::Enum(enum_def, module, type_info) = deref else {
            return Err(self.internal_at(node, "colon-ref subject is not an enum"));
        };
        let value_expr = enum_def.get_value(&colon_ref.attr).ok_or_else(|| {
            ConversionError::not_found(
                self.span_of(node),
                format!("enum has no member `{}`", colon_ref.attr),
            )
        })?;
        // The same member may be referenced more than once per function;
        // its value expression is lowered on first use only.
        if !self.is_bound(value_expr) {
            self.with_context(module, type_info, |conv| conv.visit(value_expr))?;
        }
        self.def_alias(value_expr, node)?;
        Ok(())
    }

    /// If the colon-ref subject names an import, returns the imported
    /// module context.
    pub(super) fn resolve_import_subject(
        &self,
        colon_ref: &ColonRef,
    ) -> Result<Option<ImportedInfo>> {
        let Some(node) = self.module.node(colon_ref.subject) else {
            return Err(self.internal_at(colon_ref.subject, "colon-ref subject is unknown"));
        };
        let AstNodeKind::NameRef(name_ref) = &node.kind else {
            return Ok(None);
        };
        if self.module.import_for_name_def(name_ref.name_def).is_none() {
            return Ok(None);
        }
        let info = self
            .type_info
            .get_imported(name_ref.name_def)
            .ok_or_else(|| {
                self.internal_at(colon_ref.subject, "import is not resolved in type information")
            })?;
        Ok(Some(info.clone()))
    }

    /// Type definition named by a colon-ref subject in the current module.
    fn colon_ref_type_definition(&self, colon_ref: &ColonRef) -> Result<TypeDefinition> {
        let Some(node) = self.module.node(colon_ref.subject) else {
            return Err(self.internal_at(colon_ref.subject, "colon-ref subject is unknown"));
        };
        let AstNodeKind::NameRef(name_ref) = &node.kind else {
            return Err(self.internal_at(colon_ref.subject, "colon-ref subject must be a name"));
        };
        self.module
            .get_type_definition(&name_ref.identifier)
            .ok_or_else(|| {
                ConversionError::not_found(
                    self.span_of(colon_ref.subject),
                    format!("no type definition named `{}`", name_ref.identifier),
                )
            })
    }

    /// Follows typedef chains (crossing imports as needed) until a struct
    /// or enum definition is reached.
    pub(super) fn deref_struct_or_enum(
        &self,
        module: Rc<Module>,
        type_info: Rc<TypeInfo>,
        type_definition: TypeDefinition,
    ) -> Result<StructOrEnum> {
        match type_definition {
            TypeDefinition::TypeDef(i) => {
                let target = module
                    .type_defs
                    .get(i)
                    .ok_or_else(|| {
                        ConversionError::internal(None, format!("typedef #{i} out of range"))
                    })?
                    .target;
                self.deref_struct_or_enum(module, type_info, target)
            }
            TypeDefinition::Struct(i) => {
                let def = module
                    .struct_defs
                    .get(i)
                    .ok_or_else(|| {
                        ConversionError::internal(None, format!("struct #{i} out of range"))
                    })?
                    .clone();
                Ok(StructOrEnum::Struct(def, module, type_info))
            }
            TypeDefinition::Enum(i) => {
                let def = module
                    .enum_defs
                    .get(i)
                    .ok_or_else(|| {
                        ConversionError::internal(None, format!("enum #{i} out of range"))
                    })?
                    .clone();
                Ok(StructOrEnum::Enum(def, module, type_info))
            }
            TypeDefinition::ColonRef(colon_ref_node) => {
                let Some(node) = module.node(colon_ref_node) else {
                    return Err(ConversionError::internal(
                        None,
                        "imported type reference is unknown",
                    ));
                };
                let AstNodeKind::ColonRef(colon_ref) = &node.kind else {
                    return Err(ConversionError::internal(
                        None,
                        "imported type reference must be a colon-ref",
                    ));
                };
                let Some(subject) = module.node(colon_ref.subject) else {
                    return Err(ConversionError::internal(
                        None,
                        "imported type reference subject is unknown",
                    ));
                };
                let AstNodeKind::NameRef(name_ref) = &subject.kind else {
                    return Err(ConversionError::internal(
                        None,
                        "imported type reference subject must be a name",
                    ));
                };
                let info = type_info.get_imported(name_ref.name_def).ok_or_else(|| {
                    ConversionError::internal(None, "import is not resolved in type information")
                })?;
                let target = info
                    .module
                    .get_type_definition(&colon_ref.attr)
                    .ok_or_else(|| {
                        ConversionError::not_found(
                            node.span.into(),
                            format!(
                                "module `{}` has no type definition `{}`",
                                info.module.name, colon_ref.attr
                            ),
                        )
                    })?;
                self.deref_struct_or_enum(
                    Rc::clone(&info.module),
                    Rc::clone(&info.type_info),
                    target,
                )
            }
        }
    }

    /// Dereferences a struct reference to its definition.
    pub(super) fn deref_struct(&self, type_definition: TypeDefinition) -> Result<StructDef> {
        let deref = self.deref_struct_or_enum(
            Rc::clone(&self.module),
            Rc::clone(&self.type_info),
            type_definition,
        )?;
        match deref {
            StructOrEnum::Struct(def, _, _) => Ok(def),
            StructOrEnum::Enum(_, _, _) => Err(ConversionError::internal(
                None,
                "expected a struct definition; found an enum",
            )),
        }
    }
}
