//! Match lowering: arms compile to a selector/value vector plus a default.

use std::rc::Rc;

use crate::ast::{AstNodeId, AstNodeKind, LeafPattern, Match, NameDefTree};
use crate::ir::{BValue, Bits, Value};
use crate::types::ConcreteType;
use crate::Result;

use super::context::IrConverter;

impl<'p> IrConverter<'p> {
    pub(super) fn handle_match(&mut self, node: AstNodeId, match_: &Match) -> Result<()> {
        let trailing_irrefutable = match_.arms.last().is_some_and(|arm| {
            arm.patterns
                .first()
                .is_some_and(|p| self.module.pattern_is_irrefutable(*p))
        });
        if !trailing_irrefutable {
            return Err(self.unimplemented_at(
                node,
                "only matches with trailing irrefutable patterns are supported for IR conversion",
            ));
        }

        self.visit(match_.matched)?;
        let matched = self.use_value(match_.matched)?;
        let matched_type = self.resolve_type(match_.matched)?;

        let default_arm = &match_.arms[match_.arms.len() - 1];
        if default_arm.patterns.len() != 1 {
            return Err(self.unimplemented_at(
                node,
                "multiple patterns in a default arm are not supported for IR conversion",
            ));
        }
        // Compiled for its binding side effects; the default arm needs no
        // selector.
        self.handle_matcher(default_arm.patterns[0], matched, &matched_type)?;
        self.visit(default_arm.expr)?;

        let mut arm_selectors = Vec::new();
        let mut arm_values = Vec::new();
        for arm in &match_.arms[..match_.arms.len() - 1] {
            let mut selectors = Vec::new();
            for pattern in &arm.patterns {
                selectors.push(self.handle_matcher(*pattern, matched, &matched_type)?);
            }
            if selectors.len() > 1 {
                let loc = self.loc_of_span(arm.span);
                arm_selectors.push(self.fb.nary_or(selectors, loc)?);
            } else {
                let selector = selectors
                    .first()
                    .copied()
                    .ok_or_else(|| self.internal_at(node, "match arm has no patterns"))?;
                arm_selectors.push(selector);
            }
            self.visit(arm.expr)?;
            arm_values.push(self.use_value(arm.expr)?);
        }

        let default_value = self.use_value(default_arm.expr)?;
        let result = self
            .fb
            .match_true(arm_selectors, arm_values, default_value, None)?;
        self.def(node, result)?;
        self.last_expression = Some(node);
        Ok(())
    }

    /// Compiles one pattern against the scrutinee, returning a 1-bit
    /// selector. Name-binding leaves bind as a side effect.
    pub(super) fn handle_matcher(
        &mut self,
        matcher: AstNodeId,
        matched: BValue,
        matched_type: &ConcreteType,
    ) -> Result<BValue> {
        let module = Rc::clone(&self.module);
        let Some(tree) = module.name_def_tree(matcher) else {
            return Err(self.internal_at(matcher, "match pattern is not a name-def tree"));
        };
        match tree {
            NameDefTree::Leaf(LeafPattern::Wildcard(_)) => {
                let loc = self.loc(matcher);
                let one = self.fb.literal(Value::Bits(Bits::ubits(1, 1)?), loc)?;
                self.def(matcher, one)
            }
            NameDefTree::Leaf(LeafPattern::Number(leaf)) | NameDefTree::Leaf(LeafPattern::ColonRef(leaf)) => {
                self.visit(*leaf)?;
                let to_match = self.use_value(*leaf)?;
                let loc = self.loc(matcher);
                let eq = self.fb.eq(to_match, matched, loc);
                self.def(matcher, eq)
            }
            NameDefTree::Leaf(LeafPattern::NameRef(leaf)) => {
                // Equality against a previously bound name.
                let Some(AstNodeKind::NameRef(name_ref)) = module.node(*leaf).map(|n| &n.kind)
                else {
                    return Err(self.internal_at(*leaf, "pattern leaf is not a name reference"));
                };
                let to_match = self.use_value(name_ref.name_def)?;
                let loc = self.loc(matcher);
                let eq = self.fb.eq(to_match, matched, loc);
                let result = self.def(matcher, eq)?;
                self.def_alias(name_ref.name_def, *leaf)?;
                Ok(result)
            }
            NameDefTree::Leaf(LeafPattern::NameDef(leaf)) => {
                // Fresh binding: the name takes the scrutinee's value and
                // the pattern always matches.
                self.def(*leaf, matched)?;
                self.def(matcher, matched)?;
                let one = self.fb.literal(Value::Bits(Bits::ubits(1, 1)?), None)?;
                Ok(one)
            }
            NameDefTree::Interior(children) => {
                let ConcreteType::Tuple { members } = matched_type else {
                    return Err(self.internal_at(
                        matcher,
                        format!("tuple pattern requires a tuple scrutinee; got {matched_type}"),
                    ));
                };
                if children.len() != members.len() {
                    return Err(self.internal_at(
                        matcher,
                        format!(
                            "tuple pattern arity mismatch: {} patterns vs {} members",
                            children.len(),
                            members.len()
                        ),
                    ));
                }
                let mut ok = self.fb.literal(Value::Bits(Bits::ubits(1, 1)?), None)?;
                for (i, (child, member_type)) in children.iter().zip(members).enumerate() {
                    let member = self.fb.tuple_index(matched, i as u64, None)?;
                    let cond = self.handle_matcher(*child, member, member_type)?;
                    ok = self.fb.and(ok, cond, None);
                }
                Ok(ok)
            }
        }
    }

}
