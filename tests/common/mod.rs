//! Shared scaffolding: hand-built type-checked modules for conversion
//! tests, standing in for the upstream parser and type checker.

#![allow(dead_code)]

use std::rc::Rc;

use weft_compiler::ast::{
    ArrayExpr, AstNodeId, AstNodeKind, Binop, BinopKind, Cast, ColonRef, ConstantDef, EnumDef,
    Function, Invocation, LeafPattern, Let, Match, MatchArm, Module, ModuleId, NameDef,
    NameDefTree, NameRef, Number, Param, ParametricBinding, Span, TupleExpr, Unop, UnopKind,
};
use weft_compiler::types::{ConcreteType, TypeInfo};

pub fn u(width: u64) -> ConcreteType {
    ConcreteType::ubits(width)
}

pub fn s(width: u64) -> ConcreteType {
    ConcreteType::sbits(width)
}

/// A module under construction together with its type table.
pub struct TestModule {
    pub module: Module,
    pub type_info: TypeInfo,
}

impl TestModule {
    pub fn new(name: &str) -> Self {
        TestModule::with_id(0, name)
    }

    pub fn with_id(id: u32, name: &str) -> Self {
        TestModule {
            module: Module::new(ModuleId(id), name, format!("{name}.x")),
            type_info: TypeInfo::new(),
        }
    }

    pub fn node(&mut self, kind: AstNodeKind, ty: Option<ConcreteType>) -> AstNodeId {
        let id = self.module.add_node(Span::default(), kind);
        if let Some(ty) = ty {
            self.type_info.set_type(id, ty);
        }
        id
    }

    pub fn name_def(&mut self, name: &str, ty: ConcreteType) -> AstNodeId {
        self.node(
            AstNodeKind::NameDef(NameDef {
                identifier: name.to_string(),
            }),
            Some(ty),
        )
    }

    /// An untyped name definition (function names, builtins, imports).
    pub fn bare_name_def(&mut self, name: &str) -> AstNodeId {
        self.node(
            AstNodeKind::NameDef(NameDef {
                identifier: name.to_string(),
            }),
            None,
        )
    }

    pub fn name_ref(&mut self, def: AstNodeId, name: &str, ty: ConcreteType) -> AstNodeId {
        self.node(
            AstNodeKind::NameRef(NameRef {
                identifier: name.to_string(),
                name_def: def,
            }),
            Some(ty),
        )
    }

    /// A reference to a builtin function name (no definition, no type).
    pub fn builtin_ref(&mut self, name: &str) -> AstNodeId {
        let def = self.bare_name_def(name);
        self.untyped_ref(def, name)
    }

    /// An untyped name reference (function names, import names).
    pub fn untyped_ref(&mut self, def: AstNodeId, name: &str) -> AstNodeId {
        self.node(
            AstNodeKind::NameRef(NameRef {
                identifier: name.to_string(),
                name_def: def,
            }),
            None,
        )
    }

    pub fn number(&mut self, value: i128, ty: ConcreteType) -> AstNodeId {
        self.node(
            AstNodeKind::Number(Number {
                value,
                type_annotation: None,
            }),
            Some(ty),
        )
    }

    pub fn unop(&mut self, kind: UnopKind, operand: AstNodeId, ty: ConcreteType) -> AstNodeId {
        self.node(AstNodeKind::Unop(Unop { kind, operand }), Some(ty))
    }

    pub fn binop(
        &mut self,
        kind: BinopKind,
        lhs: AstNodeId,
        rhs: AstNodeId,
        ty: ConcreteType,
    ) -> AstNodeId {
        self.node(AstNodeKind::Binop(Binop { kind, lhs, rhs }), Some(ty))
    }

    pub fn cast(&mut self, expr: AstNodeId, ty: ConcreteType) -> AstNodeId {
        self.node(AstNodeKind::Cast(Cast { expr }), Some(ty))
    }

    pub fn tuple(&mut self, members: Vec<AstNodeId>, ty: ConcreteType) -> AstNodeId {
        self.node(AstNodeKind::Tuple(TupleExpr { members }), Some(ty))
    }

    pub fn array(&mut self, members: Vec<AstNodeId>, ty: ConcreteType) -> AstNodeId {
        self.node(
            AstNodeKind::Array(ArrayExpr {
                members,
                has_ellipsis: false,
            }),
            Some(ty),
        )
    }

    pub fn invocation(
        &mut self,
        callee: AstNodeId,
        args: Vec<AstNodeId>,
        ty: Option<ConcreteType>,
    ) -> AstNodeId {
        self.node(AstNodeKind::Invocation(Invocation { callee, args }), ty)
    }

    pub fn let_expr(
        &mut self,
        name_def_tree: AstNodeId,
        rhs: AstNodeId,
        body: AstNodeId,
    ) -> AstNodeId {
        self.node(
            AstNodeKind::Let(Let {
                name_def_tree,
                rhs,
                body,
            }),
            None,
        )
    }

    pub fn name_pattern(&mut self, def: AstNodeId) -> AstNodeId {
        self.node(
            AstNodeKind::NameDefTree(NameDefTree::Leaf(LeafPattern::NameDef(def))),
            None,
        )
    }

    pub fn number_pattern(&mut self, number: AstNodeId) -> AstNodeId {
        self.node(
            AstNodeKind::NameDefTree(NameDefTree::Leaf(LeafPattern::Number(number))),
            None,
        )
    }

    pub fn wildcard_pattern(&mut self) -> AstNodeId {
        let wildcard = self.node(AstNodeKind::Wildcard, None);
        self.node(
            AstNodeKind::NameDefTree(NameDefTree::Leaf(LeafPattern::Wildcard(wildcard))),
            None,
        )
    }

    pub fn tuple_pattern(
        &mut self,
        children: Vec<AstNodeId>,
        ty: Option<ConcreteType>,
    ) -> AstNodeId {
        self.node(AstNodeKind::NameDefTree(NameDefTree::Interior(children)), ty)
    }

    pub fn match_expr(
        &mut self,
        matched: AstNodeId,
        arms: Vec<(Vec<AstNodeId>, AstNodeId)>,
        ty: ConcreteType,
    ) -> AstNodeId {
        let arms = arms
            .into_iter()
            .map(|(patterns, expr)| MatchArm {
                patterns,
                expr,
                span: Span::default(),
            })
            .collect();
        self.node(AstNodeKind::Match(Match { matched, arms }), Some(ty))
    }

    /// Declares a function whose parameters are the given (typed) name
    /// definitions.
    pub fn func(&mut self, name: &str, params: Vec<AstNodeId>, body: AstNodeId) -> AstNodeId {
        self.parametric_func(name, params, Vec::new(), body)
    }

    pub fn parametric_func(
        &mut self,
        name: &str,
        params: Vec<AstNodeId>,
        parametrics: Vec<AstNodeId>,
        body: AstNodeId,
    ) -> AstNodeId {
        let name_def = self.bare_name_def(name);
        self.module.functions.push(Function {
            name_def,
            params: params
                .into_iter()
                .map(|name_def| Param { name_def })
                .collect(),
            parametric_bindings: parametrics
                .into_iter()
                .map(|name_def| ParametricBinding { name_def })
                .collect(),
            body,
            span: Span::default(),
        });
        name_def
    }

    pub fn constant(&mut self, name: &str, ty: ConcreteType, value: AstNodeId) -> AstNodeId {
        let name_def = self.name_def(name, ty);
        self.module
            .constant_defs
            .push(ConstantDef { name_def, value });
        name_def
    }

    pub fn enum_def(&mut self, name: &str, values: Vec<(&str, AstNodeId)>) -> AstNodeId {
        let name_def = self.bare_name_def(name);
        self.module.enum_defs.push(EnumDef {
            name_def,
            values: values
                .into_iter()
                .map(|(n, v)| (n.to_string(), v))
                .collect(),
        });
        name_def
    }

    pub fn colon_ref(
        &mut self,
        subject: AstNodeId,
        attr: &str,
        ty: Option<ConcreteType>,
    ) -> AstNodeId {
        self.node(
            AstNodeKind::ColonRef(ColonRef {
                subject,
                attr: attr.to_string(),
            }),
            ty,
        )
    }

    pub fn finish(self) -> (Rc<Module>, Rc<TypeInfo>) {
        (Rc::new(self.module), Rc::new(self.type_info))
    }
}
