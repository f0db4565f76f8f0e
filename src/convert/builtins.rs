//! Invocation lowering: parametric builtins with fixed semantics, plus
//! calls to previously converted functions.

use std::collections::BTreeSet;
use std::rc::Rc;

use crate::ast::{AstNodeId, AstNodeKind, Invocation};
use crate::ir::{BValue, FunctionBuilder, IrType, LsbOrMsb};
use crate::types::SymbolicBindings;
use crate::{ConversionError, Result};

use super::context::IrConverter;
use super::mangle_name;

/// Builtins whose signatures are parameterized over widths; they never
/// resolve to module functions.
const PARAMETRIC_BUILTINS: &[&str] = &[
    "and_reduce",
    "bit_slice",
    "clz",
    "ctz",
    "map",
    "one_hot",
    "one_hot_sel",
    "or_reduce",
    "rev",
    "signex",
    "update",
    "xor_reduce",
];

impl<'p> IrConverter<'p> {
    pub(super) fn handle_invocation(&mut self, node: AstNodeId, inv: &Invocation) -> Result<()> {
        let callee_name = self.get_callee_identifier(node, inv)?;
        match callee_name.as_str() {
            // Diagnostics pass their value through unchanged.
            "fail!" | "trace" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 1)?;
                let loc = self.loc(node);
                let result = self.fb.identity(args[0], loc);
                self.def(node, result)?;
                Ok(())
            }
            "and_reduce" | "or_reduce" | "xor_reduce" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 1)?;
                let loc = self.loc(node);
                let result = match callee_name.as_str() {
                    "and_reduce" => self.fb.and_reduce(args[0], loc),
                    "or_reduce" => self.fb.or_reduce(args[0], loc),
                    _ => self.fb.xor_reduce(args[0], loc),
                };
                self.def(node, result)?;
                Ok(())
            }
            "clz" | "ctz" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 1)?;
                let loc = self.loc(node);
                let result = if callee_name == "clz" {
                    self.fb.clz(args[0], loc)
                } else {
                    self.fb.ctz(args[0], loc)
                };
                self.def(node, result)?;
                Ok(())
            }
            "rev" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 1)?;
                let loc = self.loc(node);
                let result = self.fb.reverse(args[0], loc);
                self.def(node, result)?;
                Ok(())
            }
            "bit_slice" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 3)?;
                let start = self.get_const_u64(inv.args[1])?;
                let width = self.get_const_u64(inv.args[2])?;
                let loc = self.loc(node);
                let result = self.fb.bit_slice(args[0], start, width, loc);
                self.def(node, result)?;
                Ok(())
            }
            "one_hot" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 2)?;
                let lsb_priority = !self.get_const_bits(inv.args[1])?.is_zero();
                let priority = if lsb_priority {
                    LsbOrMsb::Lsb
                } else {
                    LsbOrMsb::Msb
                };
                let loc = self.loc(node);
                let result = self.fb.one_hot(args[0], priority, loc)?;
                self.def(node, result)?;
                Ok(())
            }
            "one_hot_sel" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 2)?;
                self.handle_builtin_one_hot_sel(node, inv, args[0])
            }
            "signex" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 2)?;
                self.handle_builtin_signex(node, inv, args[0])
            }
            "update" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 3)?;
                let loc = self.loc(node);
                let result = self.fb.array_update(args[0], args[2], vec![args[1]], loc);
                self.def(node, result)?;
                Ok(())
            }
            "map" => self.handle_map(node, inv),
            "sge" | "sgt" | "sle" | "slt" => {
                let args = self.visit_args(&inv.args)?;
                self.check_arity(node, &callee_name, &args, 2)?;
                let loc = self.loc(node);
                let result = match callee_name.as_str() {
                    "sge" => self.fb.sge(args[0], args[1], loc),
                    "sgt" => self.fb.sgt(args[0], args[1], loc),
                    "sle" => self.fb.sle(args[0], args[1], loc),
                    _ => self.fb.slt(args[0], args[1], loc),
                };
                self.def(node, result)?;
                Ok(())
            }
            _ => {
                // Ordinary call: the callee identifier is already the
                // mangled name of a previously converted function.
                let args = self.visit_args(&inv.args)?;
                let loc = self.loc(node);
                let callee = self.package.get_function(&callee_name).ok_or_else(|| {
                    ConversionError::not_found(
                        self.module.span_of(node),
                        format!(
                            "failed to resolve invocation of `{callee_name}`; \
                             callees must be converted before their callers"
                        ),
                    )
                })?;
                let result = self.fb.invoke(args, callee, loc);
                self.def(node, result)?;
                Ok(())
            }
        }
    }

    /// Resolves the callee of an invocation to either a builtin name or
    /// the mangled name of the target instantiation.
    fn get_callee_identifier(&self, node: AstNodeId, inv: &Invocation) -> Result<String> {
        let module = Rc::clone(&self.module);
        let callee = module
            .node(inv.callee)
            .ok_or_else(|| self.internal_at(inv.callee, "invocation callee is unknown"))?;
        let (callee_name, callee_module) = match &callee.kind {
            AstNodeKind::NameRef(name_ref) => {
                (name_ref.identifier.clone(), Rc::clone(&self.module))
            }
            AstNodeKind::ColonRef(colon_ref) => {
                let imported = self.resolve_import_subject(colon_ref)?.ok_or_else(|| {
                    self.internal_at(inv.callee, "invocation colon-ref does not name an import")
                })?;
                (colon_ref.attr.clone(), imported.module)
            }
            _ => return Err(self.internal_at(inv.callee, "invalid invocation callee")),
        };

        let Some(function) = callee_module.get_function(&callee_name) else {
            // Builtins are not module functions; the bare name selects the
            // dispatch branch.
            return Ok(callee_name);
        };
        let free_keys = function.free_parametric_keys(&callee_module);
        if !function.is_parametric() {
            return mangle_name(&callee_name, &free_keys, &callee_module, None);
        }
        let bindings = self.type_info.invocation_bindings(node).ok_or_else(|| {
            self.internal_at(node, "parametric invocation has no symbolic bindings recorded")
        })?;
        if bindings.is_empty() {
            return Err(self.internal_at(node, "parametric invocation has empty symbolic bindings"));
        }
        mangle_name(&callee_name, &free_keys, &callee_module, Some(bindings))
    }

    fn visit_args(&mut self, args: &[AstNodeId]) -> Result<Vec<BValue>> {
        for arg in args {
            self.visit(*arg)?;
        }
        args.iter().map(|arg| self.use_value(*arg)).collect()
    }

    fn check_arity(
        &self,
        node: AstNodeId,
        callee: &str,
        args: &[BValue],
        expected: usize,
    ) -> Result<()> {
        if args.len() != expected {
            return Err(self.internal_at(
                node,
                format!(
                    "expected {expected} argument(s) to `{callee}`; got {}",
                    args.len()
                ),
            ));
        }
        Ok(())
    }

    /// The cases argument must be an array literal; its members become the
    /// selector cases directly.
    fn handle_builtin_one_hot_sel(
        &mut self,
        node: AstNodeId,
        inv: &Invocation,
        selector: BValue,
    ) -> Result<()> {
        let module = Rc::clone(&self.module);
        let cases_arg = inv.args[1];
        let members = match module.node(cases_arg).map(|n| &n.kind) {
            Some(AstNodeKind::Array(array)) | Some(AstNodeKind::ConstantArray(array)) => {
                &array.members
            }
            _ => {
                return Err(
                    self.internal_at(cases_arg, "one_hot_sel cases must be an array literal")
                )
            }
        };
        let cases = members
            .iter()
            .map(|m| self.use_value(*m))
            .collect::<Result<Vec<_>>>()?;
        let loc = self.loc(node);
        let result = self.fb.one_hot_select(selector, cases, loc)?;
        self.def(node, result)?;
        Ok(())
    }

    /// The new width is the *type annotation* of the second argument, not
    /// its value.
    fn handle_builtin_signex(
        &mut self,
        node: AstNodeId,
        inv: &Invocation,
        arg: BValue,
    ) -> Result<()> {
        let module = Rc::clone(&self.module);
        let new_width = match module.node(inv.args[1]).map(|n| &n.kind) {
            Some(AstNodeKind::Number(number)) => number
                .type_annotation
                .map(|annotation| annotation.bit_count),
            _ => None,
        };
        let Some(new_width) = new_width else {
            return Err(self.internal_at(
                inv.args[1],
                "signex width operand must be a literal with a type annotation",
            ));
        };
        let loc = self.loc(node);
        let result = self.fb.sign_extend(arg, new_width, loc);
        self.def(node, result)?;
        Ok(())
    }

    /// `map(arr, f)` — `f` may be a local or imported function, or a
    /// mappable parametric builtin.
    fn handle_map(&mut self, node: AstNodeId, inv: &Invocation) -> Result<()> {
        if inv.args.len() != 2 {
            return Err(self.internal_at(node, "expected 2 arguments to `map`"));
        }
        self.visit(inv.args[0])?;
        let arg = self.use_value(inv.args[0])?;
        let bindings = self
            .type_info
            .invocation_bindings(node)
            .cloned()
            .unwrap_or_default();

        let module = Rc::clone(&self.module);
        let fn_node = inv.args[1];
        let (map_fn_name, lookup_module) = match module.node(fn_node).map(|n| &n.kind) {
            Some(AstNodeKind::NameRef(name_ref)) => {
                if PARAMETRIC_BUILTINS.contains(&name_ref.identifier.as_str()) {
                    let identifier = name_ref.identifier.clone();
                    return self.def_map_with_builtin(node, &identifier, inv.args[0], &bindings);
                }
                (name_ref.identifier.clone(), Rc::clone(&self.module))
            }
            Some(AstNodeKind::ColonRef(colon_ref)) => {
                let imported = self.resolve_import_subject(colon_ref)?.ok_or_else(|| {
                    self.internal_at(fn_node, "mapped colon-ref does not name an import")
                })?;
                (colon_ref.attr.clone(), imported.module)
            }
            _ => return Err(self.unimplemented_at(fn_node, "unhandled function mapping")),
        };

        let mapped = lookup_module.get_function(&map_fn_name).ok_or_else(|| {
            ConversionError::not_found(
                self.span_of(fn_node),
                format!(
                    "no function named `{map_fn_name}` in module `{}`",
                    lookup_module.name
                ),
            )
        })?;
        let free_keys = mapped.free_parametric_keys(&lookup_module);
        let mangled = mangle_name(&map_fn_name, &free_keys, &lookup_module, Some(&bindings))?;
        let loc = self.loc(node);
        let callee = self.package.get_function(&mangled).ok_or_else(|| {
            ConversionError::not_found(
                self.module.span_of(node),
                format!(
                    "failed to resolve mapped function `{mangled}`; \
                     mapped functions must be converted before their callers"
                ),
            )
        })?;
        let result = self.fb.map(arg, callee, loc)?;
        self.def(node, result)?;
        Ok(())
    }

    /// Maps a builtin over an array by materializing (once per mangled
    /// name) a helper function applying the builtin to one element.
    fn def_map_with_builtin(
        &mut self,
        node: AstNodeId,
        builtin_name: &str,
        arg_node: AstNodeId,
        bindings: &SymbolicBindings,
    ) -> Result<()> {
        let mangled = mangle_name(builtin_name, &BTreeSet::new(), &self.module, Some(bindings))?;
        let arg = self.use_value(arg_node)?;
        let element_type = match self.fb.get_type(arg) {
            IrType::Array { element, .. } => (**element).clone(),
            other => {
                return Err(
                    self.internal_at(arg_node, format!("map argument must be an array; got {other}"))
                )
            }
        };
        if !self.package.has_function(&mangled) {
            let mut helper = FunctionBuilder::new(&mangled);
            let param = helper.param("arg", element_type, None);
            let result = match builtin_name {
                "clz" => helper.clz(param, None),
                "ctz" => helper.ctz(param, None),
                _ => {
                    return Err(self.internal_at(
                        node,
                        format!("invalid builtin for map: `{builtin_name}`"),
                    ))
                }
            };
            let helper = helper.build(result)?;
            self.package.add_function(helper)?;
        }
        let loc = self.loc(node);
        let callee = self
            .package
            .get_function(&mangled)
            .ok_or_else(|| self.internal_at(node, "map helper vanished from package"))?;
        let result = self.fb.map(arg, callee, loc)?;
        self.def(node, result)?;
        Ok(())
    }
}
