mod common;

use common::*;

use std::rc::Rc;

use weft_compiler::ast::{
    AstNodeKind, Attr, BinopKind, BuiltinTypeAnnotation, For, Import, IndexExpr, IndexRhs, Number,
    Slice, SplatStructInstance, StructDef, StructInstance, TypeDefinition, UnopKind, WidthSlice,
};
use weft_compiler::ir::{Fileno, IrType, Op, Package, Value};
use weft_compiler::types::{ConcreteType, ImportedInfo, StartAndWidth, SymbolicBindings};
use weft_compiler::{
    convert_module_to_package, convert_one_function, ConversionRecord, ConvertOptions,
};

fn convert(t: TestModule, function: &str) -> Package {
    let (module, type_info) = t.finish();
    let mut package = Package::new(module.name.clone());
    convert_one_function(
        &mut package,
        &module,
        &type_info,
        function,
        None,
        ConvertOptions::default(),
    )
    .expect("conversion should succeed");
    package
}

// ── Basic expression shapes ──────────────────────────────────────────────

#[test]
fn unary_negate_of_param() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(8));
    let x_ref = t.name_ref(x, "x", u(8));
    let neg = t.unop(UnopKind::Negate, x_ref, u(8));
    t.func("f", vec![x], neg);

    let package = convert(t, "f");
    let dump = package.dump_ir();
    assert!(dump.contains("fn __test_module__f(x: bits[8]) -> bits[8]"), "{dump}");
    assert!(dump.contains("= neg(x)"), "{dump}");
}

#[test]
fn concat_of_two_params_widens() {
    let mut t = TestModule::new("test_module");
    let a = t.name_def("a", u(4));
    let b = t.name_def("b", u(4));
    let a_ref = t.name_ref(a, "a", u(4));
    let b_ref = t.name_ref(b, "b", u(4));
    let concat = t.binop(BinopKind::Concat, a_ref, b_ref, u(8));
    t.func("g", vec![a, b], concat);

    let package = convert(t, "g");
    let dump = package.dump_ir();
    assert!(dump.contains("-> bits[8]"), "{dump}");
    assert!(dump.contains("= concat(a, b)"), "{dump}");
}

#[test]
fn narrowing_cast_is_a_zero_based_slice() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(8));
    let x_ref = t.name_ref(x, "x", u(8));
    let cast = t.cast(x_ref, u(4));
    t.func("h", vec![x], cast);

    let package = convert(t, "h");
    let f = package.get_function("__test_module__h").unwrap();
    assert!(
        f.nodes
            .iter()
            .any(|n| matches!(n.op, Op::BitSlice { start: 0, width: 4 })),
        "{}",
        f.dump_ir()
    );
}

#[test]
fn widening_cast_respects_signedness() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", s(4));
    let x_ref = t.name_ref(x, "x", s(4));
    let cast = t.cast(x_ref, s(8));
    t.func("w", vec![x], cast);

    let package = convert(t, "w");
    let f = package.get_function("__test_module__w").unwrap();
    assert!(
        f.nodes
            .iter()
            .any(|n| matches!(n.op, Op::SignExtend { new_width: 8 })),
        "{}",
        f.dump_ir()
    );
}

#[test]
fn signedness_discipline_comes_from_lhs() {
    let mut t = TestModule::new("test_module");
    let a = t.name_def("a", s(8));
    let b = t.name_def("b", s(8));
    let a_ref = t.name_ref(a, "a", s(8));
    let b_ref = t.name_ref(b, "b", s(8));
    let lt = t.binop(BinopKind::Lt, a_ref, b_ref, u(1));
    t.func("cmp", vec![a, b], lt);

    let package = convert(t, "cmp");
    let dump = package.dump_ir();
    assert!(dump.contains("= slt(a, b)"), "{dump}");
    assert!(dump.contains("-> bits[1]"), "{dump}");
}

#[test]
fn logical_ops_lower_to_bitwise_on_one_bit() {
    let mut t = TestModule::new("test_module");
    let a = t.name_def("a", u(1));
    let b = t.name_def("b", u(1));
    let a_ref = t.name_ref(a, "a", u(1));
    let b_ref = t.name_ref(b, "b", u(1));
    let and = t.binop(BinopKind::LogicalAnd, a_ref, b_ref, u(1));
    t.func("l", vec![a, b], and);

    let dump = convert(t, "l").dump_ir();
    assert!(dump.contains("= and(a, b)"), "{dump}");
}

#[test]
fn ternary_lowers_to_select() {
    let mut t = TestModule::new("test_module");
    let c = t.name_def("c", u(1));
    let c_ref = t.name_ref(c, "c", u(1));
    let on_true = t.number(3, u(8));
    let on_false = t.number(4, u(8));
    let ternary = t.node(
        AstNodeKind::Ternary(weft_compiler::ast::Ternary {
            test: c_ref,
            consequent: on_true,
            alternate: on_false,
        }),
        Some(u(8)),
    );
    t.func("t", vec![c], ternary);

    let dump = convert(t, "t").dump_ir();
    assert!(dump.contains("= sel("), "{dump}");
}

#[test]
fn let_binding_names_the_bound_node() {
    let mut t = TestModule::new("test_module");
    let a = t.name_def("a", u(8));
    let a_ref = t.name_ref(a, "a", u(8));
    let one = t.number(1, u(8));
    let add = t.binop(BinopKind::Add, a_ref, one, u(8));
    let x = t.name_def("x", u(8));
    let pattern = t.name_pattern(x);
    let x_ref = t.name_ref(x, "x", u(8));
    let two = t.number(2, u(8));
    let mul = t.binop(BinopKind::Mul, x_ref, two, u(8));
    let let_node = t.let_expr(pattern, add, mul);
    t.func("f", vec![a], let_node);

    let package = convert(t, "f");
    let f = package.get_function("__test_module__f").unwrap();
    assert!(
        f.nodes.iter().any(|n| n.name.as_deref() == Some("x")),
        "{}",
        f.dump_ir()
    );
    assert!(f.dump_ir().contains("umul"), "{}", f.dump_ir());
}

// ── Destructuring and aggregate construction ─────────────────────────────

#[test]
fn tuple_destructuring_emits_tuple_indexes() {
    let mut t = TestModule::new("test_module");
    let pair = ConcreteType::Tuple {
        members: vec![u(4), u(4)],
    };
    let tup = t.name_def("t", pair.clone());
    let tup_ref = t.name_ref(tup, "t", pair.clone());
    let p = t.name_def("p", u(4));
    let q = t.name_def("q", u(4));
    let p_leaf = t.name_pattern(p);
    let q_leaf = t.name_pattern(q);
    let pattern = t.tuple_pattern(vec![p_leaf, q_leaf], Some(pair));
    let p_ref = t.name_ref(p, "p", u(4));
    let q_ref = t.name_ref(q, "q", u(4));
    let add = t.binop(BinopKind::Add, p_ref, q_ref, u(4));
    let let_node = t.let_expr(pattern, tup_ref, add);
    t.func("f", vec![tup], let_node);

    let package = convert(t, "f");
    let f = package.get_function("__test_module__f").unwrap();
    let index_types: Vec<&IrType> = f
        .nodes
        .iter()
        .filter(|n| matches!(n.op, Op::TupleIndex { .. }))
        .map(|n| &n.ty)
        .collect();
    assert_eq!(index_types.len(), 2, "{}", f.dump_ir());
    assert!(index_types.iter().all(|ty| **ty == IrType::bits(4)));
    assert!(f.dump_ir().contains("= add("), "{}", f.dump_ir());
}

#[test]
fn array_literal_with_ellipsis_pads_with_last_element() {
    let mut t = TestModule::new("test_module");
    let seven = t.number(7, u(8));
    let array = t.node(
        AstNodeKind::Array(weft_compiler::ast::ArrayExpr {
            members: vec![seven],
            has_ellipsis: true,
        }),
        Some(ConcreteType::array_of(u(8), 3)),
    );
    t.func("a", vec![], array);

    let package = convert(t, "a");
    let f = package.get_function("__test_module__a").unwrap();
    let array_node = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::Array))
        .expect("array node");
    assert_eq!(array_node.operands.len(), 3);
    assert!(array_node.operands.windows(2).all(|w| w[0] == w[1]));
}

#[test]
fn constant_array_binds_as_a_single_literal() {
    let mut t = TestModule::new("test_module");
    let one = t.number(1, u(8));
    let two = t.number(2, u(8));
    let array = t.node(
        AstNodeKind::ConstantArray(weft_compiler::ast::ArrayExpr {
            members: vec![one, two],
            has_ellipsis: false,
        }),
        Some(ConcreteType::array_of(u(8), 2)),
    );
    t.func("c", vec![], array);

    let dump = convert(t, "c").dump_ir();
    assert!(dump.contains("literal(value=[1, 2])"), "{dump}");
}

#[test]
fn struct_instance_reorders_members_to_declaration_order() {
    let mut t = TestModule::new("test_module");
    let point_def = t.bare_name_def("Point");
    t.module.struct_defs.push(StructDef {
        name_def: point_def,
        members: vec!["x".to_string(), "y".to_string()],
    });
    let point_type = ConcreteType::Struct {
        members: vec![("x".to_string(), u(4)), ("y".to_string(), u(4))],
    };
    let x_value = t.number(1, u(4));
    let y_value = t.number(2, u(4));
    // Written y-first; lowering must emit x first.
    let instance = t.node(
        AstNodeKind::StructInstance(StructInstance {
            struct_ref: TypeDefinition::Struct(0),
            members: vec![("y".to_string(), y_value), ("x".to_string(), x_value)],
        }),
        Some(point_type),
    );
    t.func("mk", vec![], instance);

    let package = convert(t, "mk");
    let f = package.get_function("__test_module__mk").unwrap();
    let tuple = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::Tuple))
        .expect("tuple node");
    let values: Vec<u64> = tuple
        .operands
        .iter()
        .map(|&o| match &f.nodes[o].op {
            Op::Literal {
                value: Value::Bits(bits),
            } => bits.to_u64().unwrap(),
            other => panic!("expected literal operand, got {other:?}"),
        })
        .collect();
    assert_eq!(values, vec![1, 2]);
}

#[test]
fn empty_splat_reproduces_the_original_memberwise() {
    let mut t = TestModule::new("test_module");
    let point_def = t.bare_name_def("Point");
    t.module.struct_defs.push(StructDef {
        name_def: point_def,
        members: vec!["x".to_string(), "y".to_string()],
    });
    let point_type = ConcreteType::Struct {
        members: vec![("x".to_string(), u(4)), ("y".to_string(), u(4))],
    };
    let p = t.name_def("p", point_type.clone());
    let p_ref = t.name_ref(p, "p", point_type.clone());
    let splat = t.node(
        AstNodeKind::SplatStructInstance(SplatStructInstance {
            struct_ref: TypeDefinition::Struct(0),
            members: vec![],
            splatted: p_ref,
        }),
        Some(point_type),
    );
    t.func("same", vec![p], splat);

    let package = convert(t, "same");
    let f = package.get_function("__test_module__same").unwrap();
    let tuple = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::Tuple))
        .expect("tuple node");
    let indices: Vec<u64> = tuple
        .operands
        .iter()
        .map(|&o| match f.nodes[o].op {
            Op::TupleIndex { index } => index,
            ref other => panic!("expected tuple_index operand, got {other:?}"),
        })
        .collect();
    assert_eq!(indices, vec![0, 1]);
}

#[test]
fn splat_override_replaces_only_named_members() {
    let mut t = TestModule::new("test_module");
    let point_def = t.bare_name_def("Point");
    t.module.struct_defs.push(StructDef {
        name_def: point_def,
        members: vec!["x".to_string(), "y".to_string()],
    });
    let point_type = ConcreteType::Struct {
        members: vec![("x".to_string(), u(4)), ("y".to_string(), u(4))],
    };
    let p = t.name_def("p", point_type.clone());
    let p_ref = t.name_ref(p, "p", point_type.clone());
    let new_y = t.number(9, u(4));
    let splat = t.node(
        AstNodeKind::SplatStructInstance(SplatStructInstance {
            struct_ref: TypeDefinition::Struct(0),
            members: vec![("y".to_string(), new_y)],
            splatted: p_ref,
        }),
        Some(point_type),
    );
    t.func("bump", vec![p], splat);

    let package = convert(t, "bump");
    let f = package.get_function("__test_module__bump").unwrap();
    let tuple = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::Tuple))
        .expect("tuple node");
    assert!(matches!(
        f.nodes[tuple.operands[0]].op,
        Op::TupleIndex { index: 0 }
    ));
    assert!(matches!(
        f.nodes[tuple.operands[1]].op,
        Op::Literal { .. }
    ));
}

#[test]
fn attr_access_names_the_tuple_index_after_the_field() {
    let mut t = TestModule::new("test_module");
    let point_type = ConcreteType::Struct {
        members: vec![("x".to_string(), u(4)), ("y".to_string(), u(4))],
    };
    let p = t.name_def("p", point_type.clone());
    let p_ref = t.name_ref(p, "p", point_type);
    let attr = t.node(
        AstNodeKind::Attr(Attr {
            lhs: p_ref,
            attr: "y".to_string(),
        }),
        Some(u(4)),
    );
    t.func("get_y", vec![p], attr);

    let package = convert(t, "get_y");
    let f = package.get_function("__test_module__get_y").unwrap();
    let index = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::TupleIndex { index: 1 }))
        .expect("tuple_index node");
    assert_eq!(index.name.as_deref(), Some("p_y"));
}

// ── Indexing and slicing ─────────────────────────────────────────────────

#[test]
fn array_index_uses_the_dynamic_subscript() {
    let mut t = TestModule::new("test_module");
    let arr_type = ConcreteType::array_of(u(8), 4);
    let arr = t.name_def("arr", arr_type.clone());
    let i = t.name_def("i", u(32));
    let arr_ref = t.name_ref(arr, "arr", arr_type);
    let i_ref = t.name_ref(i, "i", u(32));
    let index = t.node(
        AstNodeKind::Index(IndexExpr {
            lhs: arr_ref,
            rhs: IndexRhs::Value(i_ref),
        }),
        Some(u(8)),
    );
    t.func("at", vec![arr, i], index);

    let dump = convert(t, "at").dump_ir();
    assert!(dump.contains("= array_index(arr, i)"), "{dump}");
}

#[test]
fn tuple_index_requires_and_uses_a_constant_subscript() {
    let mut t = TestModule::new("test_module");
    let pair = ConcreteType::Tuple {
        members: vec![u(4), u(8)],
    };
    let tup = t.name_def("t", pair.clone());
    let tup_ref = t.name_ref(tup, "t", pair);
    let one = t.number(1, u(32));
    let index = t.node(
        AstNodeKind::Index(IndexExpr {
            lhs: tup_ref,
            rhs: IndexRhs::Value(one),
        }),
        Some(u(8)),
    );
    t.func("snd", vec![tup], index);

    let package = convert(t, "snd");
    let f = package.get_function("__test_module__snd").unwrap();
    let index_node = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::TupleIndex { index: 1 }))
        .expect("tuple_index node");
    assert_eq!(index_node.ty, IrType::bits(8));
}

#[test]
fn constant_slice_reads_resolved_bounds_from_type_info() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(8));
    let x_ref = t.name_ref(x, "x", u(8));
    let slice = t.node(
        AstNodeKind::Slice(Slice {
            start: None,
            limit: None,
        }),
        None,
    );
    let index = t.node(
        AstNodeKind::Index(IndexExpr {
            lhs: x_ref,
            rhs: IndexRhs::Slice(slice),
        }),
        Some(u(4)),
    );
    t.type_info.add_slice_bounds(
        slice,
        &SymbolicBindings::default(),
        StartAndWidth { start: 2, width: 4 },
    );
    t.func("mid", vec![x], index);

    let package = convert(t, "mid");
    let f = package.get_function("__test_module__mid").unwrap();
    assert!(
        f.nodes
            .iter()
            .any(|n| matches!(n.op, Op::BitSlice { start: 2, width: 4 })),
        "{}",
        f.dump_ir()
    );
}

#[test]
fn width_slice_lowers_to_a_dynamic_bit_slice() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(8));
    let start = t.name_def("start", u(4));
    let x_ref = t.name_ref(x, "x", u(8));
    let start_ref = t.name_ref(start, "start", u(4));
    let width_slice = t.node(AstNodeKind::WidthSlice(WidthSlice { start: start_ref }), None);
    let index = t.node(
        AstNodeKind::Index(IndexExpr {
            lhs: x_ref,
            rhs: IndexRhs::Width(width_slice),
        }),
        Some(u(4)),
    );
    t.func("dyn_slice", vec![x, start], index);

    let package = convert(t, "dyn_slice");
    let f = package.get_function("__test_module__dyn_slice").unwrap();
    assert!(
        f.nodes
            .iter()
            .any(|n| matches!(n.op, Op::DynamicBitSlice { width: 4 })),
        "{}",
        f.dump_ir()
    );
}

// ── Casts between bits and arrays ────────────────────────────────────────

#[test]
fn bits_to_array_cast_puts_the_msbs_at_element_zero() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(8));
    let x_ref = t.name_ref(x, "x", u(8));
    let cast = t.cast(x_ref, ConcreteType::array_of(u(2), 4));
    t.func("split", vec![x], cast);

    let package = convert(t, "split");
    let f = package.get_function("__test_module__split").unwrap();
    let array_node = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::Array))
        .expect("array node");
    let starts: Vec<u64> = array_node
        .operands
        .iter()
        .map(|&o| match f.nodes[o].op {
            Op::BitSlice { start, .. } => start,
            ref other => panic!("expected bit_slice operand, got {other:?}"),
        })
        .collect();
    assert_eq!(starts, vec![6, 4, 2, 0]);
}

#[test]
fn bits_array_bits_round_trip_restores_the_width() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(8));
    let x_ref = t.name_ref(x, "x", u(8));
    let to_array = t.cast(x_ref, ConcreteType::array_of(u(2), 4));
    let back = t.cast(to_array, u(8));
    t.func("rt", vec![x], back);

    let package = convert(t, "rt");
    let f = package.get_function("__test_module__rt").unwrap();
    assert_eq!(*f.return_type(), IrType::bits(8));
    assert!(
        f.nodes.iter().any(|n| matches!(n.op, Op::Concat)),
        "{}",
        f.dump_ir()
    );
    let array_index_count = f
        .nodes
        .iter()
        .filter(|n| matches!(n.op, Op::ArrayIndex))
        .count();
    assert_eq!(array_index_count, 4);
}

// ── Match lowering ───────────────────────────────────────────────────────

#[test]
fn match_compiles_to_selectors_values_and_default() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(2));
    let x_ref = t.name_ref(x, "x", u(2));
    let zero = t.number(0, u(2));
    let one = t.number(1, u(2));
    let p0 = t.number_pattern(zero);
    let p1 = t.number_pattern(one);
    let wild = t.wildcard_pattern();
    let v10 = t.number(10, u(8));
    let v20 = t.number(20, u(8));
    let v30 = t.number(30, u(8));
    let match_node = t.match_expr(
        x_ref,
        vec![(vec![p0], v10), (vec![p1], v20), (vec![wild], v30)],
        u(8),
    );
    t.func("pick", vec![x], match_node);

    let package = convert(t, "pick");
    let f = package.get_function("__test_module__pick").unwrap();
    let match_true = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::MatchTrue { num_arms: 2 }))
        .expect("match_true node");
    // Operands: two selectors, two values, then the default.
    assert_eq!(match_true.operands.len(), 5);
    for selector in &match_true.operands[..2] {
        assert!(matches!(f.nodes[*selector].op, Op::Eq));
        assert_eq!(f.nodes[*selector].ty, IrType::bits(1));
    }
    let default = match_true.operands[4];
    match &f.nodes[default].op {
        Op::Literal {
            value: Value::Bits(bits),
        } => assert_eq!(bits.to_u64().unwrap(), 30),
        other => panic!("expected literal default, got {other:?}"),
    }
    assert_eq!(match_true.ty, IrType::bits(8));
}

#[test]
fn match_arm_with_multiple_patterns_ors_the_selectors() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(2));
    let x_ref = t.name_ref(x, "x", u(2));
    let zero = t.number(0, u(2));
    let one = t.number(1, u(2));
    let p0 = t.number_pattern(zero);
    let p1 = t.number_pattern(one);
    let wild = t.wildcard_pattern();
    let v1 = t.number(7, u(8));
    let v2 = t.number(9, u(8));
    let match_node = t.match_expr(x_ref, vec![(vec![p0, p1], v1), (vec![wild], v2)], u(8));
    t.func("either", vec![x], match_node);

    let package = convert(t, "either");
    let f = package.get_function("__test_module__either").unwrap();
    let or_node = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::Or) && n.operands.len() == 2)
        .expect("or node over the arm's selectors");
    assert!(or_node
        .operands
        .iter()
        .all(|&o| matches!(f.nodes[o].op, Op::Eq)));
}

#[test]
fn match_binding_pattern_passes_the_scrutinee_through() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(8));
    let x_ref = t.name_ref(x, "x", u(8));
    let zero = t.number(0, u(8));
    let p0 = t.number_pattern(zero);
    let v0 = t.number(1, u(8));
    let y = t.name_def("y", u(8));
    let bind = t.name_pattern(y);
    let y_ref = t.name_ref(y, "y", u(8));
    let match_node = t.match_expr(x_ref, vec![(vec![p0], v0), (vec![bind], y_ref)], u(8));
    t.func("through", vec![x], match_node);

    let package = convert(t, "through");
    let f = package.get_function("__test_module__through").unwrap();
    let match_true = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::MatchTrue { .. }))
        .expect("match_true node");
    // The default value is the bound name, i.e. the parameter itself.
    let default = *match_true.operands.last().unwrap();
    assert!(matches!(f.nodes[default].op, Op::Param { .. }));
}

// ── Builtins ─────────────────────────────────────────────────────────────

#[test]
fn reductions_produce_single_bits() {
    for (builtin, mnemonic) in [
        ("and_reduce", "and_reduce"),
        ("or_reduce", "or_reduce"),
        ("xor_reduce", "xor_reduce"),
    ] {
        let mut t = TestModule::new("test_module");
        let x = t.name_def("x", u(8));
        let x_ref = t.name_ref(x, "x", u(8));
        let callee = t.builtin_ref(builtin);
        let call = t.invocation(callee, vec![x_ref], Some(u(1)));
        t.func("r", vec![x], call);

        let package = convert(t, "r");
        let f = package.get_function("__test_module__r").unwrap();
        assert!(f.dump_ir().contains(mnemonic), "{}", f.dump_ir());
        assert_eq!(*f.return_type(), IrType::bits(1));
    }
}

#[test]
fn clz_ctz_rev_keep_the_operand_width() {
    for builtin in ["clz", "ctz", "rev"] {
        let mut t = TestModule::new("test_module");
        let x = t.name_def("x", u(8));
        let x_ref = t.name_ref(x, "x", u(8));
        let callee = t.builtin_ref(builtin);
        let call = t.invocation(callee, vec![x_ref], Some(u(8)));
        t.func("b", vec![x], call);

        let package = convert(t, "b");
        let f = package.get_function("__test_module__b").unwrap();
        assert_eq!(*f.return_type(), IrType::bits(8));
    }
}

#[test]
fn bit_slice_builtin_takes_literal_bounds() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(8));
    let x_ref = t.name_ref(x, "x", u(8));
    let start = t.number(2, u(32));
    let width = t.number(3, u(32));
    let callee = t.builtin_ref("bit_slice");
    let call = t.invocation(callee, vec![x_ref, start, width], Some(u(3)));
    t.func("bs", vec![x], call);

    let package = convert(t, "bs");
    let f = package.get_function("__test_module__bs").unwrap();
    assert!(
        f.nodes
            .iter()
            .any(|n| matches!(n.op, Op::BitSlice { start: 2, width: 3 })),
        "{}",
        f.dump_ir()
    );
}

#[test]
fn one_hot_is_one_bit_wider_than_its_input() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(3));
    let x_ref = t.name_ref(x, "x", u(3));
    let lsb = t.number(1, u(1));
    let callee = t.builtin_ref("one_hot");
    let call = t.invocation(callee, vec![x_ref, lsb], Some(u(4)));
    t.func("oh", vec![x], call);

    let package = convert(t, "oh");
    let dump = package.dump_ir();
    assert!(dump.contains("one_hot("), "{dump}");
    assert!(dump.contains("lsb_prio=true"), "{dump}");
    let f = package.get_function("__test_module__oh").unwrap();
    assert_eq!(*f.return_type(), IrType::bits(4));
}

#[test]
fn one_hot_sel_spreads_the_array_literal_cases() {
    let mut t = TestModule::new("test_module");
    let sel = t.name_def("sel", u(2));
    let sel_ref = t.name_ref(sel, "sel", u(2));
    let c0 = t.number(5, u(8));
    let c1 = t.number(6, u(8));
    let cases = t.array(vec![c0, c1], ConcreteType::array_of(u(8), 2));
    let callee = t.builtin_ref("one_hot_sel");
    let call = t.invocation(callee, vec![sel_ref, cases], Some(u(8)));
    t.func("ohs", vec![sel], call);

    let package = convert(t, "ohs");
    let f = package.get_function("__test_module__ohs").unwrap();
    let node = f
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::OneHotSelect))
        .expect("one_hot_sel node");
    // Selector plus the two cases, spread from the literal array.
    assert_eq!(node.operands.len(), 3);
}

#[test]
fn signex_width_comes_from_the_type_annotation_not_the_value() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(4));
    let x_ref = t.name_ref(x, "x", u(4));
    // The second argument's *value* is zero; only its annotation matters.
    let width_operand = t.node(
        AstNodeKind::Number(Number {
            value: 0,
            type_annotation: Some(BuiltinTypeAnnotation {
                signed: true,
                bit_count: 8,
            }),
        }),
        Some(s(8)),
    );
    let callee = t.builtin_ref("signex");
    let call = t.invocation(callee, vec![x_ref, width_operand], Some(s(8)));
    t.func("sx", vec![x], call);

    let package = convert(t, "sx");
    let f = package.get_function("__test_module__sx").unwrap();
    assert!(
        f.nodes
            .iter()
            .any(|n| matches!(n.op, Op::SignExtend { new_width: 8 })),
        "{}",
        f.dump_ir()
    );
}

#[test]
fn update_builtin_lowers_to_array_update() {
    let mut t = TestModule::new("test_module");
    let arr_type = ConcreteType::array_of(u(8), 4);
    let arr = t.name_def("arr", arr_type.clone());
    let arr_ref = t.name_ref(arr, "arr", arr_type.clone());
    let index = t.number(1, u(32));
    let value = t.number(7, u(8));
    let callee = t.builtin_ref("update");
    let call = t.invocation(callee, vec![arr_ref, index, value], Some(arr_type));
    t.func("up", vec![arr], call);

    let dump = convert(t, "up").dump_ir();
    assert!(dump.contains("array_update"), "{dump}");
}

#[test]
fn scmp_builtins_compare_signed() {
    let mut t = TestModule::new("test_module");
    let a = t.name_def("a", s(8));
    let b = t.name_def("b", s(8));
    let a_ref = t.name_ref(a, "a", s(8));
    let b_ref = t.name_ref(b, "b", s(8));
    let callee = t.builtin_ref("sgt");
    let call = t.invocation(callee, vec![a_ref, b_ref], Some(u(1)));
    t.func("gt", vec![a, b], call);

    let dump = convert(t, "gt").dump_ir();
    assert!(dump.contains("= sgt("), "{dump}");
}

#[test]
fn trace_passes_its_value_through_identity() {
    let mut t = TestModule::new("test_module");
    let x = t.name_def("x", u(8));
    let x_ref = t.name_ref(x, "x", u(8));
    let callee = t.builtin_ref("trace");
    let call = t.invocation(callee, vec![x_ref], Some(u(8)));
    t.func("tr", vec![x], call);

    let dump = convert(t, "tr").dump_ir();
    assert!(dump.contains("= identity(x)"), "{dump}");
}

// ── map ──────────────────────────────────────────────────────────────────

#[test]
fn map_of_builtin_materializes_a_memoized_helper() {
    let mut t = TestModule::new("test_module");
    let arr_type = ConcreteType::array_of(u(8), 3);
    let arr = t.name_def("arr", arr_type.clone());
    let arr_ref = t.name_ref(arr, "arr", arr_type.clone());
    let clz_ref = t.builtin_ref("clz");
    let map_callee = t.builtin_ref("map");
    let call = t.invocation(map_callee, vec![arr_ref, clz_ref], Some(arr_type));
    t.func("m", vec![arr], call);

    let package = convert(t, "m");
    let helper = package
        .get_function("__test_module__clz")
        .expect("memoized clz helper");
    assert_eq!(*helper.return_type(), IrType::bits(8));
    let dump = package.get_function("__test_module__m").unwrap().dump_ir();
    assert!(dump.contains("to_apply=__test_module__clz"), "{dump}");
}

#[test]
fn map_of_module_function_resolves_the_mangled_name() {
    let mut t = TestModule::new("test_module");
    // fn double(e: u8) -> u8 { e + e }
    let e = t.name_def("e", u(8));
    let e_ref_a = t.name_ref(e, "e", u(8));
    let e_ref_b = t.name_ref(e, "e", u(8));
    let add = t.binop(BinopKind::Add, e_ref_a, e_ref_b, u(8));
    let double_def = t.func("double", vec![e], add);
    // fn m(arr: u8[3]) -> u8[3] { map(arr, double) }
    let arr_type = ConcreteType::array_of(u(8), 3);
    let arr = t.name_def("arr", arr_type.clone());
    let arr_ref = t.name_ref(arr, "arr", arr_type.clone());
    let double_ref = t.untyped_ref(double_def, "double");
    let map_callee = t.builtin_ref("map");
    let call = t.invocation(map_callee, vec![arr_ref, double_ref], Some(arr_type));
    t.func("m", vec![arr], call);

    let (module, type_info) = t.finish();
    let mut package = Package::new("test_module");
    convert_one_function(
        &mut package,
        &module,
        &type_info,
        "double",
        None,
        ConvertOptions::default(),
    )
    .unwrap();
    convert_one_function(
        &mut package,
        &module,
        &type_info,
        "m",
        None,
        ConvertOptions::default(),
    )
    .unwrap();

    let dump = package.get_function("__test_module__m").unwrap().dump_ir();
    assert!(dump.contains("to_apply=__test_module__double"), "{dump}");
}

// ── Invocations and parametric instantiation ─────────────────────────────

#[test]
fn parametric_call_resolves_the_mangled_instantiation() {
    let mut t = TestModule::new("test_module");
    // fn f<N>(x: u8) -> u8 { x }
    let n = t.name_def("N", u(32));
    let x = t.name_def("x", u(8));
    let x_ref = t.name_ref(x, "x", u(8));
    let f_def = t.parametric_func("f", vec![x], vec![n], x_ref);
    // fn g(y: u8) -> u8 { f<N=8>(y) }
    let y = t.name_def("y", u(8));
    let y_ref = t.name_ref(y, "y", u(8));
    let f_ref = t.untyped_ref(f_def, "f");
    let call = t.invocation(f_ref, vec![y_ref], Some(u(8)));
    t.type_info
        .set_invocation_bindings(call, SymbolicBindings::new([("N".to_string(), 8)]));
    t.func("g", vec![y], call);

    let (module, type_info) = t.finish();
    let records = [
        ConversionRecord {
            module: Rc::clone(&module),
            type_info: Rc::clone(&type_info),
            function: "f".to_string(),
            symbolic_bindings: Some(SymbolicBindings::new([("N".to_string(), 8)])),
        },
        ConversionRecord {
            module: Rc::clone(&module),
            type_info: Rc::clone(&type_info),
            function: "g".to_string(),
            symbolic_bindings: None,
        },
    ];
    let package =
        convert_module_to_package(&module, &records, ConvertOptions::default()).unwrap();

    let f = package
        .get_function("__test_module__f__8")
        .expect("parametric instantiation emitted under its mangled name");
    // The parametric binding is materialized as a constant of its
    // annotated width.
    assert!(f
        .nodes
        .iter()
        .any(|n| matches!(&n.op, Op::Literal { value: Value::Bits(b) } if b.width() == 32)));
    // `x` as final expression gets an identity wrapper.
    assert!(matches!(f.nodes[f.ret].op, Op::Identity));

    let g = package.get_function("__test_module__g").unwrap();
    assert!(
        g.dump_ir().contains("to_apply=__test_module__f__8"),
        "{}",
        g.dump_ir()
    );
}

#[test]
fn constants_are_hoisted_before_the_body_in_dependency_order() {
    let mut t = TestModule::new("test_module");
    // const A = u8:3; const B = A + 1; fn f() -> u8 { B }
    let a_value = t.number(3, u(8));
    let a_def = t.constant("A", u(8), a_value);
    let a_ref = t.name_ref(a_def, "A", u(8));
    let one = t.number(1, u(8));
    let b_value = t.binop(BinopKind::Add, a_ref, one, u(8));
    let b_def = t.constant("B", u(8), b_value);
    let b_ref = t.name_ref(b_def, "B", u(8));
    t.func("f", vec![], b_ref);

    let package = convert(t, "f");
    let f = package.get_function("__test_module__f").unwrap();
    let dump = f.dump_ir();
    assert!(dump.contains("literal(value=3)"), "{dump}");
    assert!(dump.contains("= add("), "{dump}");
    // Final expression is a name reference, so the return value is an
    // identity node.
    assert!(matches!(f.nodes[f.ret].op, Op::Identity));
}

// ── Enums and imports ────────────────────────────────────────────────────

#[test]
fn enum_member_reference_lowers_its_value_expression() {
    let mut t = TestModule::new("test_module");
    let enum_type = ConcreteType::Enum {
        size: weft_compiler::types::TypeDim::Literal(2),
    };
    let a_value = t.number(0, enum_type.clone());
    let b_value = t.number(1, enum_type.clone());
    let e_def = t.enum_def("E", vec![("A", a_value), ("B", b_value)]);
    let e_ref = t.untyped_ref(e_def, "E");
    let colon_ref = t.colon_ref(e_ref, "B", Some(enum_type));
    t.func("which", vec![], colon_ref);

    let package = convert(t, "which");
    let f = package.get_function("__test_module__which").unwrap();
    assert_eq!(*f.return_type(), IrType::bits(2));
    assert!(f.dump_ir().contains("literal(value=1)"), "{}", f.dump_ir());
}

#[test]
fn imported_constant_lowers_in_its_defining_module() {
    // Module `lib`: const W = u8:42
    let mut lib = TestModule::with_id(1, "lib");
    let w_value = lib.number(42, u(8));
    lib.constant("W", u(8), w_value);
    let (lib_module, lib_type_info) = lib.finish();

    // Module `main`: import lib; fn f() -> u8 { lib::W }
    let mut main = TestModule::new("main");
    let lib_name = main.bare_name_def("lib");
    main.module.imports.push(Import {
        name_def: lib_name,
        subject: "lib".to_string(),
    });
    main.type_info.add_import(
        lib_name,
        ImportedInfo {
            module: Rc::clone(&lib_module),
            type_info: Rc::clone(&lib_type_info),
        },
    );
    let lib_ref = main.untyped_ref(lib_name, "lib");
    let colon_ref = main.colon_ref(lib_ref, "W", Some(u(8)));
    main.func("f", vec![], colon_ref);

    let package = convert(main, "f");
    let f = package.get_function("__main__f").unwrap();
    assert!(f.dump_ir().contains("literal(value=42)"), "{}", f.dump_ir());
}

// ── Counted for-loops ────────────────────────────────────────────────────

#[test]
fn counted_for_emits_a_body_function_and_loop_node() {
    let mut t = TestModule::new("test_module");
    // fn count(x: u32) -> u32 { for (i, accum) in range(0, 4) { accum + i }(x) }
    let x = t.name_def("x", u(32));
    let x_ref = t.name_ref(x, "x", u(32));
    let i = t.name_def("i", u(32));
    let accum = t.name_def("accum", u(32));
    let i_leaf = t.name_pattern(i);
    let accum_leaf = t.name_pattern(accum);
    let names = t.tuple_pattern(vec![i_leaf, accum_leaf], None);
    let range_ref = t.builtin_ref("range");
    let zero = t.number(0, u(32));
    let four = t.number(4, u(32));
    let iterable = t.invocation(range_ref, vec![zero, four], None);
    let accum_ref = t.name_ref(accum, "accum", u(32));
    let i_ref = t.name_ref(i, "i", u(32));
    let body = t.binop(BinopKind::Add, accum_ref, i_ref, u(32));
    let for_node = t.node(
        AstNodeKind::For(For {
            names,
            iterable,
            body,
            init: x_ref,
        }),
        Some(u(32)),
    );
    t.func("count", vec![x], for_node);

    let package = convert(t, "count");
    let body_fn = package
        .get_function("____test_module__count_counted_for_0_body")
        .expect("loop body function");
    let body_dump = body_fn.dump_ir();
    assert!(body_dump.contains("i: bits[32]"), "{body_dump}");
    assert!(body_dump.contains("accum: bits[32]"), "{body_dump}");
    assert!(body_dump.contains("= add("), "{body_dump}");

    let main = package.get_function("__test_module__count").unwrap();
    let dump = main.dump_ir();
    assert!(dump.contains("counted_for"), "{dump}");
    assert!(dump.contains("trip_count=4"), "{dump}");
    assert!(
        dump.contains("body=____test_module__count_counted_for_0_body"),
        "{dump}"
    );
}

#[test]
fn counted_for_passes_free_variables_as_invariant_args() {
    let mut t = TestModule::new("test_module");
    // fn scale(x: u32, k: u32) -> u32 { for (i, accum) in range(0, 2) { accum + k }(x) }
    let x = t.name_def("x", u(32));
    let k = t.name_def("k", u(32));
    let x_ref = t.name_ref(x, "x", u(32));
    let i = t.name_def("i", u(32));
    let accum = t.name_def("accum", u(32));
    let i_leaf = t.name_pattern(i);
    let accum_leaf = t.name_pattern(accum);
    let names = t.tuple_pattern(vec![i_leaf, accum_leaf], None);
    let range_ref = t.builtin_ref("range");
    let zero = t.number(0, u(32));
    let two = t.number(2, u(32));
    let iterable = t.invocation(range_ref, vec![zero, two], None);
    let accum_ref = t.name_ref(accum, "accum", u(32));
    let k_ref = t.name_ref(k, "k", u(32));
    let body = t.binop(BinopKind::Add, accum_ref, k_ref, u(32));
    let for_node = t.node(
        AstNodeKind::For(For {
            names,
            iterable,
            body,
            init: x_ref,
        }),
        Some(u(32)),
    );
    t.func("scale", vec![x, k], for_node);

    let package = convert(t, "scale");
    let body_fn = package
        .get_function("____test_module__scale_counted_for_0_body")
        .unwrap();
    // Params: induction, carry, then the free variable `k`.
    assert_eq!(body_fn.params.len(), 3);
    assert!(body_fn.dump_ir().contains("k: bits[32]"), "{}", body_fn.dump_ir());

    let main = package.get_function("__test_module__scale").unwrap();
    let loop_node = main
        .nodes
        .iter()
        .find(|n| matches!(n.op, Op::CountedFor { .. }))
        .unwrap();
    // Operands: init plus one invariant arg.
    assert_eq!(loop_node.operands.len(), 2);
}

// ── Source positions ─────────────────────────────────────────────────────

#[test]
fn positions_are_emitted_only_when_requested() {
    let build = |emit_positions: bool| {
        let mut t = TestModule::new("test_module");
        let x = t.name_def("x", u(8));
        let x_ref = t.name_ref(x, "x", u(8));
        let neg = t.unop(UnopKind::Negate, x_ref, u(8));
        t.func("f", vec![x], neg);
        let (module, type_info) = t.finish();
        let mut package = Package::new("test_module");
        convert_one_function(
            &mut package,
            &module,
            &type_info,
            "f",
            None,
            ConvertOptions { emit_positions },
        )
        .unwrap();
        package
    };

    let with_positions = build(true);
    assert_eq!(with_positions.file_path(Fileno(0)), Some("test_module.x"));
    let f = with_positions.get_function("__test_module__f").unwrap();
    assert!(f.nodes.iter().any(|n| n.loc.is_some()));

    let without_positions = build(false);
    let f = without_positions.get_function("__test_module__f").unwrap();
    assert!(f.nodes.iter().all(|n| n.loc.is_none()));
}

// ── Width preservation ───────────────────────────────────────────────────

#[test]
fn emitted_nodes_carry_the_resolved_widths() {
    let mut t = TestModule::new("test_module");
    let a = t.name_def("a", u(16));
    let b = t.name_def("b", u(16));
    let a_ref = t.name_ref(a, "a", u(16));
    let b_ref = t.name_ref(b, "b", u(16));
    let mul = t.binop(BinopKind::Mul, a_ref, b_ref, u(16));
    t.func("f", vec![a, b], mul);

    let package = convert(t, "f");
    let f = package.get_function("__test_module__f").unwrap();
    for node in &f.nodes {
        assert_eq!(node.ty, IrType::bits(16), "{}", f.dump_ir());
    }
    assert!(matches!(f.nodes[f.ret].op, Op::UMul));
}
