//! Converter state shared by every lowering handler.

use std::collections::HashMap;
use std::mem;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{AstNodeId, AstNodeKind, ConstantDef, Function as AstFunction, Module, Span};
use crate::ir::{
    BValue, Bits, Fileno, FunctionBuilder, IrType, Package, SourceLocation, Value,
};
use crate::types::{ConcreteType, SymbolicBindings, TypeDim, TypeInfo};
use crate::{ConversionError, Result};

use super::ConvertOptions;

/// IR value bound to an AST node: purely dynamic, or a compile-time-known
/// literal paired with its IR materialization.
#[derive(Debug, Clone)]
pub(super) enum IrValue {
    Dynamic(BValue),
    Constant { value: Value, node: BValue },
}

impl IrValue {
    pub(super) fn bvalue(&self) -> BValue {
        match self {
            IrValue::Dynamic(b) => *b,
            IrValue::Constant { node, .. } => *node,
        }
    }
}

/// Node-identity-keyed map from AST nodes to IR values.
///
/// Fresh bindings are write-once; re-binding a node is a programmer error.
/// Aliases may overwrite, which makes re-lowering of shared module
/// constants idempotent.
#[derive(Debug, Default)]
struct ValueTable {
    map: HashMap<AstNodeId, IrValue>,
}

impl ValueTable {
    fn bind(&mut self, node: AstNodeId, value: IrValue) -> Result<()> {
        if self.map.contains_key(&node) {
            return Err(ConversionError::internal(
                None,
                format!("AST node {node:?} is already bound to an IR value"),
            ));
        }
        self.map.insert(node, value);
        Ok(())
    }

    fn alias(&mut self, node: AstNodeId, value: IrValue) {
        self.map.insert(node, value);
    }

    fn lookup(&self, node: AstNodeId) -> Option<&IrValue> {
        self.map.get(&node)
    }
}

/// Converts one function's AST into IR nodes appended to a package.
///
/// The converter walks the body post-order; every emission binds the
/// originating AST node in the value table, and aliasing lets
/// name definitions share nodes without re-emission.
pub(super) struct IrConverter<'p> {
    pub(super) package: &'p mut Package,
    pub(super) module: Rc<Module>,
    pub(super) type_info: Rc<TypeInfo>,
    pub(super) options: ConvertOptions,
    pub(super) fileno: Fileno,
    pub(super) fb: FunctionBuilder,
    values: ValueTable,
    pub(super) symbolic_bindings: SymbolicBindings,
    constant_deps: Vec<ConstantDef>,
    pub(super) last_expression: Option<AstNodeId>,
    pub(super) counted_for_count: usize,
}

impl<'p> IrConverter<'p> {
    pub(super) fn new(
        package: &'p mut Package,
        module: Rc<Module>,
        type_info: Rc<TypeInfo>,
        options: ConvertOptions,
        function_name: &str,
    ) -> Self {
        let fileno = package.get_or_create_fileno(&module.fs_path);
        IrConverter {
            package,
            module,
            type_info,
            options,
            fileno,
            fb: FunctionBuilder::new(function_name),
            values: ValueTable::default(),
            symbolic_bindings: SymbolicBindings::default(),
            constant_deps: Vec::new(),
            last_expression: None,
            counted_for_count: 0,
        }
    }

    pub(super) fn add_constant_dep(&mut self, def: ConstantDef) {
        self.constant_deps.push(def);
    }

    pub(super) fn span_of(&self, node: AstNodeId) -> Option<Span> {
        self.module.span_of(node)
    }

    /// Source location for a node, honoring the position-emission option.
    pub(super) fn loc(&self, node: AstNodeId) -> Option<SourceLocation> {
        self.loc_of_span(self.span_of(node)?)
    }

    pub(super) fn loc_of_span(&self, span: Span) -> Option<SourceLocation> {
        if !self.options.emit_positions {
            return None;
        }
        Some(SourceLocation {
            fileno: self.fileno,
            lineno: span.start.lineno,
            colno: span.start.colno,
        })
    }

    pub(super) fn internal_at(&self, node: AstNodeId, message: impl Into<String>) -> ConversionError {
        ConversionError::internal(self.span_of(node), message)
    }

    pub(super) fn unimplemented_at(
        &self,
        node: AstNodeId,
        message: impl Into<String>,
    ) -> ConversionError {
        ConversionError::unimplemented(self.span_of(node), message)
    }

    /// Binds `node` to a freshly emitted IR value.
    pub(super) fn def(&mut self, node: AstNodeId, value: BValue) -> Result<BValue> {
        trace!(?node, ?value, "defined node");
        self.values.bind(node, IrValue::Dynamic(value))?;
        Ok(value)
    }

    /// Materializes a literal and binds `node` to it as a known constant.
    pub(super) fn def_const(&mut self, node: AstNodeId, value: Value) -> Result<BValue> {
        let loc = self.loc(node);
        let b = self.fb.literal(value.clone(), loc)?;
        self.values.bind(node, IrValue::Constant { value, node: b })?;
        Ok(b)
    }

    /// Binds `node` as a known constant whose materialization already
    /// exists (e.g. an aggregate of constant operands).
    pub(super) fn bind_constant(&mut self, node: AstNodeId, value: Value, b: BValue) -> Result<()> {
        self.values.bind(node, IrValue::Constant { value, node: b })
    }

    /// Copies `from`'s binding to `to`. A name definition aliased to a
    /// dynamic value also names the underlying IR node.
    pub(super) fn def_alias(&mut self, from: AstNodeId, to: AstNodeId) -> Result<BValue> {
        let value = self
            .values
            .lookup(from)
            .cloned()
            .ok_or_else(|| {
                ConversionError::not_found(
                    self.span_of(from),
                    format!("could not find AST node for aliasing: {from:?}"),
                )
            })?;
        if let IrValue::Dynamic(b) = &value {
            if let Some(node) = self.module.node(to) {
                if let AstNodeKind::NameDef(def) = &node.kind {
                    self.fb.set_name(*b, def.identifier.clone());
                }
            }
        }
        trace!(?from, ?to, "aliased node");
        let b = value.bvalue();
        self.values.alias(to, value);
        Ok(b)
    }

    /// IR handle of a bound node, from either binding shape.
    pub(super) fn use_value(&self, node: AstNodeId) -> Result<BValue> {
        self.values
            .lookup(node)
            .map(IrValue::bvalue)
            .ok_or_else(|| {
                let kind = self
                    .module
                    .node(node)
                    .map(|n| n.kind.name())
                    .unwrap_or("unknown");
                ConversionError::not_found(
                    self.span_of(node),
                    format!("could not resolve {kind} node to an IR value"),
                )
            })
    }

    pub(super) fn is_bound(&self, node: AstNodeId) -> bool {
        self.values.lookup(node).is_some()
    }

    pub(super) fn is_constant(&self, node: AstNodeId) -> bool {
        matches!(self.values.lookup(node), Some(IrValue::Constant { .. }))
    }

    pub(super) fn get_const_value(&self, node: AstNodeId) -> Result<Value> {
        match self.values.lookup(node) {
            Some(IrValue::Constant { value, .. }) => Ok(value.clone()),
            Some(IrValue::Dynamic(_)) => Err(self.internal_at(
                node,
                "AST node has a non-constant IR value where a constant is required",
            )),
            None => Err(self.internal_at(node, "AST node has no associated IR value")),
        }
    }

    pub(super) fn get_const_bits(&self, node: AstNodeId) -> Result<Bits> {
        Ok(self.get_const_value(node)?.bits()?.clone())
    }

    pub(super) fn get_const_u64(&self, node: AstNodeId) -> Result<u64> {
        self.get_const_bits(node)?.to_u64()
    }

    /// Resolves a dimension to a literal under the current symbolic
    /// bindings.
    pub(super) fn resolve_dim(&self, dim: &TypeDim) -> Result<TypeDim> {
        match dim {
            TypeDim::Literal(v) => Ok(TypeDim::Literal(*v)),
            TypeDim::Parametric(expr) => {
                Ok(TypeDim::Literal(expr.evaluate(&self.symbolic_bindings)?))
            }
        }
    }

    /// Concrete type of a node with every dimension resolved.
    pub(super) fn resolve_type(&self, node: AstNodeId) -> Result<ConcreteType> {
        let ty = self.type_info.get_type(node).ok_or_else(|| {
            self.internal_at(
                node,
                "failed to convert to IR because type information was missing for AST node",
            )
        })?;
        ty.map_dims(&mut |dim| self.resolve_dim(dim))
    }

    pub(super) fn resolve_type_to_ir(&self, node: AstNodeId) -> Result<IrType> {
        let concrete = self.resolve_type(node)?;
        self.type_to_ir(&concrete)
    }

    /// Lowers a concrete type to its IR shape: enums erase to bits, structs
    /// erase to tuples.
    pub(super) fn type_to_ir(&self, ty: &ConcreteType) -> Result<IrType> {
        match ty {
            ConcreteType::Bits { size, .. } | ConcreteType::Enum { size } => {
                Ok(IrType::bits(size.as_literal()?))
            }
            ConcreteType::Array { element, size } => Ok(IrType::Array {
                element: Box::new(self.type_to_ir(element)?),
                size: size.as_literal()?,
            }),
            ConcreteType::Tuple { members } => Ok(IrType::Tuple {
                members: members
                    .iter()
                    .map(|m| self.type_to_ir(m))
                    .collect::<Result<_>>()?,
            }),
            ConcreteType::Struct { members } => Ok(IrType::Tuple {
                members: members
                    .iter()
                    .map(|(_, m)| self.type_to_ir(m))
                    .collect::<Result<_>>()?,
            }),
        }
    }

    /// Current symbolic bindings with module-level constants filtered out;
    /// this is the tuple used for instantiation keying.
    pub(super) fn symbolic_bindings_tuple(&self) -> SymbolicBindings {
        let constants = self.module.constant_identifiers();
        SymbolicBindings::new(
            self.symbolic_bindings
                .iter()
                .filter(|(k, _)| !constants.contains(*k))
                .map(|(k, v)| (k.to_string(), v)),
        )
    }

    pub(super) fn get_symbolic_binding(&self, name: &str, at: AstNodeId) -> Result<u64> {
        self.symbolic_bindings.get(name).ok_or_else(|| {
            self.internal_at(at, format!("no symbolic binding for parametric `{name}`"))
        })
    }

    /// Runs `f` with the module/type-info context swapped (used when
    /// lowering nodes that live in an imported module).
    pub(super) fn with_context<R>(
        &mut self,
        module: Rc<Module>,
        type_info: Rc<TypeInfo>,
        f: impl FnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let saved_module = mem::replace(&mut self.module, module);
        let saved_type_info = mem::replace(&mut self.type_info, type_info);
        let result = f(self);
        self.module = saved_module;
        self.type_info = saved_type_info;
        result
    }

    /// Lowers a module-level constant definition and aliases its name.
    /// Idempotent: a constant whose name is already bound is left alone.
    pub(super) fn handle_constant_def(&mut self, def: ConstantDef) -> Result<()> {
        if self.is_bound(def.name_def) {
            return Ok(());
        }
        trace!(?def, "lowering constant definition");
        self.visit(def.value)?;
        self.def_alias(def.value, def.name_def)?;
        Ok(())
    }

    /// Converts one function body into a finished IR function in the
    /// package.
    pub(super) fn convert_function(
        mut self,
        function: &AstFunction,
        symbolic_bindings: Option<&SymbolicBindings>,
    ) -> Result<()> {
        self.symbolic_bindings = symbolic_bindings.cloned().unwrap_or_default();
        let module = Rc::clone(&self.module);

        for param in &function.params {
            let name = module
                .identifier_of(param.name_def)
                .ok_or_else(|| self.internal_at(param.name_def, "parameter has no name"))?
                .to_string();
            let ty = self.resolve_type_to_ir(param.name_def)?;
            let loc = self.loc(param.name_def);
            let b = self.fb.param(name, ty, loc);
            self.def(param.name_def, b)?;
        }

        for pb in &function.parametric_bindings {
            let name = module
                .identifier_of(pb.name_def)
                .ok_or_else(|| self.internal_at(pb.name_def, "parametric binding has no name"))?
                .to_string();
            let value = self.get_symbolic_binding(&name, pb.name_def)?;
            let width = self.resolve_type(pb.name_def)?.total_bit_count()?;
            let bits = Bits::ubits(value, width)?;
            self.def_const(pb.name_def, Value::Bits(bits))?;
        }

        let deps = mem::take(&mut self.constant_deps);
        for def in deps {
            self.handle_constant_def(def)?;
        }

        self.visit(function.body)?;

        // A function whose final expression is a bare name reference gets
        // an identity node, so the built function returns a node of its
        // own rather than (say) a parameter.
        let last = self.last_expression.unwrap_or(function.body);
        let last_is_name_ref = matches!(
            module.node(last).map(|n| &n.kind),
            Some(AstNodeKind::NameRef(_))
        );
        let ret = if last_is_name_ref {
            let v = self.use_value(last)?;
            let loc = self.loc(last);
            self.fb.identity(v, loc)
        } else {
            self.use_value(function.body)?
        };

        let IrConverter { package, fb, .. } = self;
        let f = fb.build(ret)?;
        trace!(name = %f.name, "built function");
        package.add_function(f)
    }

    /// Finalizes a nested conversion (loop body) into the package.
    pub(super) fn build_and_add(self, ret: BValue) -> Result<()> {
        let IrConverter { package, fb, .. } = self;
        let f = fb.build(ret)?;
        trace!(name = %f.name, "built function");
        package.add_function(f)
    }
}
