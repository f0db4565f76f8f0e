//! Counted-for lowering: the loop body becomes its own IR function.

use std::collections::HashSet;
use std::rc::Rc;

use tracing::trace;

use crate::ast::{
    free_name_defs, name_defs_within, AstNodeId, AstNodeKind, For, LeafPattern, NameDefTree,
};
use crate::Result;

use super::context::IrConverter;

impl<'p> IrConverter<'p> {
    /// Lowers `for (i, carry) in range(0, N) { body }(init)` to a
    /// `counted_for` node over a freshly converted body function.
    ///
    /// The body function's parameters are: the induction variable, the
    /// loop carry (destructured on entry when it is a tuple pattern), then
    /// one parameter per free variable of the body; the free variables'
    /// values in the enclosing function are passed as invariant args.
    pub(super) fn handle_for(&mut self, node: AstNodeId, for_: &For) -> Result<()> {
        self.visit(for_.init)?;
        let trip_count = self.query_const_range_call(node, for_)?;
        trace!(trip_count, "converting counted for-loop");

        let body_fn_name = format!(
            "__{}_counted_for_{}_body",
            self.fb.name(),
            self.counted_for_count
        )
        .replace('.', "_");
        self.counted_for_count += 1;

        let module = Rc::clone(&self.module);
        let Some(NameDefTree::Interior(children)) = module.name_def_tree(for_.names) else {
            return Err(self.internal_at(
                for_.names,
                "expected an induction binding and a loop carry binding",
            ));
        };
        let [induction, carry] = children.as_slice() else {
            return Err(self.internal_at(
                for_.names,
                format!(
                    "expected an induction binding and a loop carry binding; got {}",
                    children.len()
                ),
            ));
        };

        // Free variables of the body feed in as invariant parameters.
        // Names bound by the loop header, functions, type-level names, and
        // untyped (builtin) names are not materializable values.
        let bound_by_loop: HashSet<AstNodeId> = name_defs_within(&module, for_.names);
        let mut relevant = Vec::new();
        for def in free_name_defs(&module, for_.body) {
            if bound_by_loop.contains(&def) {
                continue;
            }
            if self.type_info.get_type(def).is_none() {
                continue;
            }
            if module.function_for_name_def(def).is_some()
                || module.is_type_definition_name(def)
                || module.import_for_name_def(def).is_some()
            {
                continue;
            }
            relevant.push(def);
        }

        {
            let mut body = IrConverter::new(
                &mut *self.package,
                Rc::clone(&module),
                Rc::clone(&self.type_info),
                self.options,
                &body_fn_name,
            );
            body.symbolic_bindings = self.symbolic_bindings.clone();

            let Some(NameDefTree::Leaf(LeafPattern::NameDef(induction_def))) =
                module.name_def_tree(*induction)
            else {
                return Err(
                    body.internal_at(*induction, "loop induction variable must be a plain name")
                );
            };
            let induction_name = module
                .identifier_of(*induction_def)
                .ok_or_else(|| body.internal_at(*induction_def, "induction variable has no name"))?
                .to_string();
            let ty = body.resolve_type_to_ir(*induction_def)?;
            let param = body.fb.param(induction_name, ty, None);
            body.def(*induction_def, param)?;

            match module.name_def_tree(*carry) {
                Some(NameDefTree::Leaf(LeafPattern::NameDef(carry_def))) => {
                    let carry_name = module
                        .identifier_of(*carry_def)
                        .ok_or_else(|| body.internal_at(*carry_def, "loop carry has no name"))?
                        .to_string();
                    let ty = body.resolve_type_to_ir(*carry_def)?;
                    let param = body.fb.param(carry_name, ty, None);
                    body.def(*carry_def, param)?;
                }
                Some(_) => {
                    // Tuple carries destructure their names on entry.
                    let ty = body.resolve_type_to_ir(*carry)?;
                    let param = body.fb.param("__loop_carry", ty, None);
                    body.def(*carry, param)?;
                    let carry_type = body.resolve_type(*carry)?;
                    body.handle_matcher(*carry, param, &carry_type)?;
                }
                None => {
                    return Err(body.internal_at(*carry, "loop carry binding is not a pattern"));
                }
            }

            for def in &relevant {
                let name = module
                    .identifier_of(*def)
                    .ok_or_else(|| body.internal_at(*def, "free variable has no name"))?
                    .to_string();
                let ty = body.resolve_type_to_ir(*def)?;
                let param = body.fb.param(name, ty, None);
                body.def(*def, param)?;
            }

            body.visit(for_.body)?;
            let ret = body.use_value(for_.body)?;
            body.build_and_add(ret)?;
        }

        let init = self.use_value(for_.init)?;
        let invariant_args = relevant
            .iter()
            .map(|def| self.use_value(*def))
            .collect::<Result<Vec<_>>>()?;
        let loc = self.loc(node);
        let body_fn = self
            .package
            .get_function(&body_fn_name)
            .ok_or_else(|| self.internal_at(node, "loop body function vanished from package"))?;
        let result = self
            .fb
            .counted_for(init, trip_count, 1, body_fn, invariant_args, loc);
        self.def(node, result)?;
        Ok(())
    }

    /// Trip count of the only supported iterable form, `range(0, const)`.
    fn query_const_range_call(&mut self, node: AstNodeId, for_: &For) -> Result<u64> {
        let module = Rc::clone(&self.module);
        let unsupported = |conv: &Self, detail: &str| {
            conv.unimplemented_at(
                node,
                format!(
                    "for-loop is of an unsupported form for IR conversion; \
                     only a `range(0, const)` iterable is supported ({detail})"
                ),
            )
        };
        let Some(AstNodeKind::Invocation(inv)) = module.node(for_.iterable).map(|n| &n.kind)
        else {
            return Err(unsupported(self, "iterable is not a range call"));
        };
        let callee_is_range = matches!(
            module.node(inv.callee).map(|n| &n.kind),
            Some(AstNodeKind::NameRef(name_ref)) if name_ref.identifier == "range"
        );
        if !callee_is_range {
            return Err(unsupported(self, "found a non-range callee"));
        }
        if inv.args.len() != 2 {
            return Err(unsupported(self, "found an inappropriate number of arguments"));
        }
        let starts_at_zero = matches!(
            module.node(inv.args[0]).map(|n| &n.kind),
            Some(AstNodeKind::Number(number)) if number.value == 0
        );
        if !starts_at_zero {
            return Err(unsupported(self, "range must start at literal zero"));
        }
        let limit = inv.args[1];
        self.visit(limit)?;
        if !self.is_constant(limit) {
            return Err(unsupported(self, "did not find a constant trip count"));
        }
        self.get_const_u64(limit)
    }
}
