//! End-to-end tests for the trace analysis
//!
//! Each test builds a small typed module by hand, runs the visitor over
//! it, and asserts on the final bindings, the summary cache, or the
//! recorded diagnostics.

use crate::tast::{
    Binding, Callee, CondArm, DeclaredTarget, FunctionId, FunctionTable, LiteralValue, TypeId,
    TypeKind, TypeTable, TypedExpression, TypedExpressionKind, TypedFunction, TypedModule,
    TypedParameter, TypedStatement,
};
use crate::trace::{MemoryVisitor, TraceDiagnosticKind};

// ---------------------------------------------------------------------
// fixture

struct Fx {
    types: TypeTable,
    functions: FunctionTable,
    boolean: TypeId,
    obj: TypeId,
    fn_t: TypeId,
    create: FunctionId,
    pass: FunctionId,
    consume: FunctionId,
    set_peer: FunctionId,
    touch: FunctionId,
    noop: FunctionId,
    apply_cb: FunctionId,
    recurse: FunctionId,
}

fn fixture() -> Fx {
    let mut types = TypeTable::new();
    let int = types.add(TypeKind::Primitive {
        name: "int".to_string(),
    });
    let boolean = types.add(TypeKind::Primitive {
        name: "bool".to_string(),
    });
    let obj = TypeId::from_raw(3);
    let added = types.add(TypeKind::Struct {
        name: "obj".to_string(),
        attributes: vec![
            crate::tast::StructAttribute {
                name: "val".to_string(),
                ty: int,
                binding: Binding::New,
            },
            crate::tast::StructAttribute {
                name: "peer".to_string(),
                ty: obj,
                binding: Binding::Var,
            },
            crate::tast::StructAttribute {
                name: "own".to_string(),
                ty: obj,
                binding: Binding::New,
            },
        ],
    });
    assert_eq!(added, obj);
    let fn_t = types.add(TypeKind::Function {
        parameters: vec![obj],
        returns: vec![],
    });

    let mut functions = FunctionTable::new();
    let recurse_id = FunctionId::from_raw(7);

    let create = functions.add(func(
        "create",
        vec![],
        vec![("self", obj, Binding::RetNew)],
        vec![],
        1,
    ));
    let pass = functions.add(func(
        "pass",
        vec![("x", obj, Binding::Fixed)],
        vec![("r", obj, Binding::Var)],
        vec![s_ret(vec![e_ref("x", obj, 2)], 2)],
        1,
    ));
    let consume = functions.add(func(
        "consume",
        vec![("x", obj, Binding::Move)],
        vec![],
        vec![],
        1,
    ));
    let set_peer = functions.add(func(
        "set_peer",
        vec![("x", obj, Binding::Fixed), ("y", obj, Binding::Fixed)],
        vec![],
        vec![s_assign(
            e_attr(e_ref("x", obj, 2), "peer", obj, 2),
            e_ref("y", obj, 2),
            2,
        )],
        1,
    ));
    let touch = functions.add(func(
        "touch",
        vec![("x", obj, Binding::Fixed)],
        vec![],
        vec![
            s_let("p", obj, Binding::Var, e_attr(e_ref("x", obj, 2), "peer", obj, 2), 2),
            s_let("q", obj, Binding::Var, e_attr(e_ref("x", obj, 3), "peer", obj, 3), 3),
        ],
        1,
    ));
    let noop = functions.add(func(
        "noop",
        vec![("x", obj, Binding::Fixed)],
        vec![],
        vec![],
        1,
    ));
    let apply_cb = functions.add(func(
        "apply_cb",
        vec![("f", fn_t, Binding::Var), ("x", obj, Binding::Fixed)],
        vec![],
        vec![s_expr(TypedExpression {
            kind: TypedExpressionKind::Call {
                callee: Callee::Dynamic {
                    expr: Box::new(e_ref("f", fn_t, 2)),
                },
                arguments: vec![e_ref("x", obj, 2)],
            },
            ty: TypeId::from_raw(0),
            line: 2,
        })],
        1,
    ));
    let recurse = functions.add(func(
        "recurse",
        vec![("x", obj, Binding::Fixed)],
        vec![],
        vec![s_expr(e_call(recurse_id, vec![e_ref("x", obj, 2)], TypeId::from_raw(0), 2))],
        1,
    ));
    assert_eq!(recurse, recurse_id);

    Fx {
        types,
        functions,
        boolean,
        obj,
        fn_t,
        create,
        pass,
        consume,
        set_peer,
        touch,
        noop,
        apply_cb,
        recurse,
    }
}

impl Fx {
    fn with_main(mut self, body: Vec<TypedStatement>) -> (TypedModule, FunctionId) {
        let main = self.functions.add(func("main", vec![], vec![], body, 10));
        (
            TypedModule {
                types: self.types,
                functions: self.functions,
            },
            main,
        )
    }
}

fn func(
    name: &str,
    parameters: Vec<(&str, TypeId, Binding)>,
    returns: Vec<(&str, TypeId, Binding)>,
    body: Vec<TypedStatement>,
    line: usize,
) -> TypedFunction {
    TypedFunction {
        id: FunctionId::invalid(),
        name: name.to_string(),
        qualified_name: name.to_string(),
        parameters: parameters
            .into_iter()
            .map(|(n, ty, binding)| TypedParameter {
                name: n.to_string(),
                ty,
                binding,
            })
            .collect(),
        returns: returns
            .into_iter()
            .map(|(n, ty, binding)| TypedParameter {
                name: n.to_string(),
                ty,
                binding,
            })
            .collect(),
        body,
        line,
    }
}

fn e_ref(name: &str, ty: TypeId, line: usize) -> TypedExpression {
    TypedExpression {
        kind: TypedExpressionKind::Ref {
            name: name.to_string(),
        },
        ty,
        line,
    }
}

fn e_attr(object: TypedExpression, attribute: &str, ty: TypeId, line: usize) -> TypedExpression {
    TypedExpression {
        kind: TypedExpressionKind::Attribute {
            object: Box::new(object),
            attribute: attribute.to_string(),
        },
        ty,
        line,
    }
}

fn e_call(function: FunctionId, arguments: Vec<TypedExpression>, ty: TypeId, line: usize) -> TypedExpression {
    TypedExpression {
        kind: TypedExpressionKind::Call {
            callee: Callee::Direct { function },
            arguments,
        },
        ty,
        line,
    }
}

fn e_fn_lit(function: FunctionId, ty: TypeId, line: usize) -> TypedExpression {
    TypedExpression {
        kind: TypedExpressionKind::FunctionLiteral { function },
        ty,
        line,
    }
}

fn e_bool(ty: TypeId, line: usize) -> TypedExpression {
    TypedExpression {
        kind: TypedExpressionKind::Literal(LiteralValue::Bool(true)),
        ty,
        line,
    }
}

fn s_let(name: &str, ty: TypeId, binding: Binding, value: TypedExpression, line: usize) -> TypedStatement {
    TypedStatement::DeclareAssign {
        targets: vec![DeclaredTarget {
            name: name.to_string(),
            ty,
            binding,
        }],
        value,
        line,
    }
}

fn s_assign(target: TypedExpression, value: TypedExpression, line: usize) -> TypedStatement {
    TypedStatement::Assign {
        targets: vec![target],
        value,
        line,
    }
}

fn s_if1(condition: TypedExpression, body: Vec<TypedStatement>, line: usize) -> TypedStatement {
    TypedStatement::If {
        arms: vec![CondArm {
            condition: Some(condition),
            body,
        }],
        line,
    }
}

fn s_if_else(
    condition: TypedExpression,
    then_body: Vec<TypedStatement>,
    else_body: Vec<TypedStatement>,
    line: usize,
) -> TypedStatement {
    TypedStatement::If {
        arms: vec![
            CondArm {
                condition: Some(condition),
                body: then_body,
            },
            CondArm {
                condition: None,
                body: else_body,
            },
        ],
        line,
    }
}

fn s_while(condition: TypedExpression, body: Vec<TypedStatement>, line: usize) -> TypedStatement {
    TypedStatement::While {
        condition,
        body,
        line,
    }
}

fn s_ret(values: Vec<TypedExpression>, line: usize) -> TypedStatement {
    TypedStatement::Return { values, line }
}

fn s_expr(expr: TypedExpression) -> TypedStatement {
    TypedStatement::Expression(expr)
}

fn impression_names(memory: &crate::trace::Memory) -> Vec<String> {
    let mut names: Vec<String> = memory
        .impressions
        .iter()
        .map(|i| i.shadow.entity.name.to_string())
        .collect();
    names.sort();
    names
}

// ---------------------------------------------------------------------
// scenarios

#[test]
fn test_rebinding_a_reference_leaves_the_old_target_alone() {
    crate::logging::init_test();
    let fx = fixture();
    let create = fx.create;
    let obj = fx.obj;
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let("b", obj, Binding::Var, e_ref("a", obj, 12), 12),
        s_assign(e_ref("b", obj, 13), e_call(create, vec![], obj, 13), 13),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check.diagnostics.is_empty());
    // `a` still points at its original allocation
    assert_eq!(impression_names(check.memory_of("a").unwrap()), vec!["a"]);
    // `b` was rebound to the new allocation, not grafted onto `a`
    let b_names = impression_names(check.memory_of("b").unwrap());
    assert_eq!(b_names.len(), 1);
    assert_ne!(b_names[0], "a");
}

#[test]
fn test_summary_returns_are_expressed_in_parameter_terms() {
    crate::logging::init_test();
    let fx = fixture();
    let (module, _main) = fx.with_main(vec![]);

    let mut visitor = MemoryVisitor::new(&module);
    visitor.check_module().unwrap();

    let delta = visitor.db.get("pass").unwrap();
    assert_eq!(delta.ret_memories.len(), 1);
    let names: Vec<String> = delta.ret_memories[0]
        .impressions
        .iter()
        .map(|i| i.shadow.entity.name.to_string())
        .collect();
    assert_eq!(names, vec!["x"]);
}

#[test]
fn test_call_remaps_summary_into_caller_terms() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, pass, obj) = (fx.create, fx.pass, fx.obj);
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let(
            "b",
            obj,
            Binding::Var,
            e_call(pass, vec![e_ref("a", obj, 12)], obj, 12),
            12,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check.diagnostics.is_empty());
    assert_eq!(impression_names(check.memory_of("b").unwrap()), vec!["a"]);
}

#[test]
fn test_non_exhaustive_conditional_keeps_prior_reality() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, obj, boolean) = (fx.create, fx.obj, fx.boolean);
    let (module, main) = fx.with_main(vec![
        s_let("q", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let("r", obj, Binding::New, e_call(create, vec![], obj, 12), 12),
        s_let("p", obj, Binding::Var, e_ref("q", obj, 13), 13),
        s_if1(
            e_bool(boolean, 14),
            vec![s_assign(e_ref("p", obj, 15), e_ref("r", obj, 15), 15)],
            14,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check.diagnostics.is_empty());
    assert_eq!(
        impression_names(check.memory_of("p").unwrap()),
        vec!["q", "r"]
    );
    // a name untouched by the conditional is untouched by fusion
    assert_eq!(impression_names(check.memory_of("q").unwrap()), vec!["q"]);
}

#[test]
fn test_exhaustive_conditional_drops_prior_reality() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, obj, boolean) = (fx.create, fx.obj, fx.boolean);
    let (module, main) = fx.with_main(vec![
        s_let("q", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let("r", obj, Binding::New, e_call(create, vec![], obj, 12), 12),
        s_let("s", obj, Binding::New, e_call(create, vec![], obj, 13), 13),
        s_let("p", obj, Binding::Var, e_ref("q", obj, 14), 14),
        s_if_else(
            e_bool(boolean, 15),
            vec![s_assign(e_ref("p", obj, 16), e_ref("r", obj, 16), 16)],
            vec![s_assign(e_ref("p", obj, 18), e_ref("s", obj, 18), 18)],
            15,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check.diagnostics.is_empty());
    assert_eq!(
        impression_names(check.memory_of("p").unwrap()),
        vec!["r", "s"]
    );
}

#[test]
fn test_escaping_nested_allocation_is_reported_and_healed() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, obj, boolean) = (fx.create, fx.obj, fx.boolean);
    let (module, main) = fx.with_main(vec![
        TypedStatement::Declare {
            name: "p".to_string(),
            ty: obj,
            binding: Binding::Var,
            line: 11,
        },
        s_if1(
            e_bool(boolean, 12),
            vec![
                s_let("t", obj, Binding::New, e_call(create, vec![], obj, 13), 13),
                s_assign(e_ref("p", obj, 14), e_ref("t", obj, 14), 14),
            ],
            12,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert_eq!(check.diagnostics.len(), 1);
    assert_eq!(check.diagnostics[0].kind, TraceDiagnosticKind::ObjectLifetime);
    assert_eq!(check.diagnostics[0].line(), 14);
    // healed: the dangling impression is gone
    assert!(check.memory_of("p").unwrap().impressions.is_empty());
}

#[test]
fn test_use_after_move() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, consume, obj) = (fx.create, fx.consume, fx.obj);
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_expr(e_call(
            consume,
            vec![e_ref("a", obj, 12)],
            TypeId::from_raw(0),
            12,
        )),
        s_let("b", obj, Binding::Var, e_ref("a", obj, 13), 13),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert_eq!(check.diagnostics.len(), 1);
    assert_eq!(check.diagnostics[0].kind, TraceDiagnosticKind::UseAfterMove);
    assert_eq!(check.diagnostics[0].line(), 13);
}

#[test]
fn test_summaries_are_cached_per_function() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, pass, obj) = (fx.create, fx.pass, fx.obj);
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let(
            "b",
            obj,
            Binding::Var,
            e_call(pass, vec![e_ref("a", obj, 12)], obj, 12),
            12,
        ),
        s_let(
            "c",
            obj,
            Binding::Var,
            e_call(pass, vec![e_ref("a", obj, 13)], obj, 13),
            13,
        ),
        s_let(
            "d",
            obj,
            Binding::Var,
            e_call(pass, vec![e_ref("a", obj, 14)], obj, 14),
            14,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();
    assert!(check.diagnostics.is_empty());

    // main itself, create once, pass once; the repeat calls hit the cache
    assert_eq!(visitor.db.build_count(), 3);
    assert_eq!(impression_names(check.memory_of("d").unwrap()), vec!["a"]);
}

#[test]
fn test_attribute_writes_through_calls_reach_the_caller() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, set_peer, obj) = (fx.create, fx.set_peer, fx.obj);
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let("c", obj, Binding::New, e_call(create, vec![], obj, 12), 12),
        s_expr(e_call(
            set_peer,
            vec![e_ref("a", obj, 13), e_ref("c", obj, 13)],
            TypeId::from_raw(0),
            13,
        )),
        s_let(
            "p",
            obj,
            Binding::Var,
            e_attr(e_ref("a", obj, 14), "peer", obj, 14),
            14,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check.diagnostics.is_empty());
    assert_eq!(impression_names(check.memory_of("p").unwrap()), vec!["c"]);
}

#[test]
fn test_repeated_external_attribute_reads_share_one_angel() {
    crate::logging::init_test();
    let fx = fixture();
    let touch = fx.touch;
    let (module, _main) = fx.with_main(vec![]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(touch).unwrap();

    assert!(check.diagnostics.is_empty());
    let delta = visitor.db.get("touch").unwrap();
    assert_eq!(delta.angels.len(), 1);
    assert_eq!(&*delta.angels[0].name, "x.peer");

    // both reads resolve to the same placeholder entity
    assert_eq!(
        impression_names(check.memory_of("p").unwrap()),
        impression_names(check.memory_of("q").unwrap())
    );
    assert_eq!(impression_names(check.memory_of("p").unwrap()), vec!["x.peer"]);
}

#[test]
fn test_blessed_summaries_are_not_cached() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, apply_cb, noop, obj, fn_t) = (fx.create, fx.apply_cb, fx.noop, fx.obj, fx.fn_t);
    let (module, _main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_expr(e_call(
            apply_cb,
            vec![e_fn_lit(noop, fn_t, 12), e_ref("a", obj, 12)],
            TypeId::from_raw(0),
            12,
        )),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let diagnostics = visitor.check_module().unwrap();
    assert!(diagnostics.is_empty());

    // the blessed callee was summarized but never cached; its concrete
    // callee was
    assert!(visitor.db.get("apply_cb").is_none());
    assert!(visitor.db.get("noop").is_some());
}

#[test]
fn test_recursion_falls_back_to_identity_summary() {
    crate::logging::init_test();
    let fx = fixture();
    let recurse = fx.recurse;
    let (module, _main) = fx.with_main(vec![]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(recurse).unwrap();
    assert!(check.diagnostics.is_empty());
}

#[test]
fn test_while_loop_reaches_a_fixed_point() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, obj, boolean) = (fx.create, fx.obj, fx.boolean);
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let("b", obj, Binding::New, e_call(create, vec![], obj, 12), 12),
        s_let("p", obj, Binding::Var, e_ref("a", obj, 13), 13),
        s_while(
            e_bool(boolean, 14),
            vec![s_assign(e_ref("p", obj, 15), e_ref("b", obj, 15), 15)],
            14,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check.diagnostics.is_empty());
    // the loop may run zero or more times
    assert_eq!(
        impression_names(check.memory_of("p").unwrap()),
        vec!["a", "b"]
    );
}

#[test]
fn test_non_converging_loop_is_capped_and_reported() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, obj, boolean) = (fx.create, fx.obj, fx.boolean);
    let (module, main) = fx.with_main(vec![
        TypedStatement::Declare {
            name: "p".to_string(),
            ty: obj,
            binding: Binding::Var,
            line: 11,
        },
        s_while(
            e_bool(boolean, 12),
            vec![s_assign(
                e_ref("p", obj, 13),
                e_call(create, vec![], obj, 13),
                13,
            )],
            12,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check
        .diagnostics
        .iter()
        .any(|d| d.kind == TraceDiagnosticKind::NonConvergence && d.line() == 12));
}

#[test]
fn test_correlated_branch_divergence_tags_realities() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, obj, boolean) = (fx.create, fx.obj, fx.boolean);
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let("b", obj, Binding::New, e_call(create, vec![], obj, 12), 12),
        s_let("p", obj, Binding::Var, e_ref("a", obj, 13), 13),
        s_let("q", obj, Binding::Var, e_ref("a", obj, 14), 14),
        s_if1(
            e_bool(boolean, 15),
            vec![
                s_assign(e_ref("p", obj, 16), e_ref("b", obj, 16), 16),
                s_assign(e_ref("q", obj, 17), e_ref("b", obj, 17), 17),
            ],
            15,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check.diagnostics.is_empty());
    let p = check.memory_of("p").unwrap();
    assert_eq!(p.impressions.len(), 2);
    // both names diverged together, so their facts carry reality tags
    assert!(p.first_entanglement().is_some());
    assert!(check.memory_of("q").unwrap().first_entanglement().is_some());
}

#[test]
fn test_while_fusion_keeps_every_iteration_state() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, obj, boolean) = (fx.create, fx.obj, fx.boolean);
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let("b", obj, Binding::New, e_call(create, vec![], obj, 12), 12),
        s_let("cc", obj, Binding::New, e_call(create, vec![], obj, 13), 13),
        s_let("p", obj, Binding::Var, e_ref("a", obj, 14), 14),
        s_let("q", obj, Binding::Var, e_ref("b", obj, 15), 15),
        s_while(
            e_bool(boolean, 16),
            vec![
                s_assign(e_ref("p", obj, 17), e_ref("q", obj, 17), 17),
                s_assign(e_ref("q", obj, 18), e_ref("cc", obj, 18), 18),
            ],
            16,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check.diagnostics.is_empty());
    // the loop may exit after zero, one, or more iterations; `p` picked
    // up `q`'s one-iteration value on the way to the fixed point
    assert_eq!(
        impression_names(check.memory_of("p").unwrap()),
        vec!["a", "b", "cc"]
    );
    assert_eq!(
        impression_names(check.memory_of("q").unwrap()),
        vec!["b", "cc"]
    );
}

#[test]
fn test_tagged_realities_never_recombine_at_a_call_site() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, obj, boolean) = (fx.create, fx.obj, fx.boolean);
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let("b", obj, Binding::New, e_call(create, vec![], obj, 12), 12),
        s_let("p", obj, Binding::Var, e_ref("a", obj, 13), 13),
        s_let("q", obj, Binding::Var, e_ref("a", obj, 14), 14),
        s_if1(
            e_bool(boolean, 15),
            vec![
                s_assign(e_ref("p", obj, 16), e_ref("b", obj, 16), 16),
                s_assign(e_ref("q", obj, 17), e_ref("b", obj, 17), 17),
            ],
            15,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();
    assert!(check.diagnostics.is_empty());

    let p = check.memory_of("p").unwrap().clone();
    let q = check.memory_of("q").unwrap().clone();
    // the not-taken state is tagged too, so splitting by reality yields
    // exactly the two consistent pairings: (b, b) and (a, a)
    let realities = crate::trace::call::divide_by_entanglement(vec![p, q]);
    assert_eq!(realities.len(), 2);
    for (params, tag) in &realities {
        assert!(tag.is_some());
        assert_eq!(params[0].impressions.len(), 1);
        assert_eq!(
            impression_names(&params[0]),
            impression_names(&params[1])
        );
    }
}

#[test]
fn test_function_identity_carried_by_a_struct_attribute() {
    crate::logging::init_test();
    let mut fx = fixture();
    let fn_t0 = fx.types.add(TypeKind::Function {
        parameters: vec![],
        returns: vec![],
    });
    let holder = fx.types.add(TypeKind::Struct {
        name: "holder".to_string(),
        attributes: vec![crate::tast::StructAttribute {
            name: "cb".to_string(),
            ty: fn_t0,
            binding: Binding::Var,
        }],
    });
    let unit = fx.functions.add(func("unit", vec![], vec![], vec![], 1));
    let make_holder = fx.functions.add(func(
        "make_holder",
        vec![],
        vec![("self", holder, Binding::RetNew)],
        vec![s_assign(
            e_attr(e_ref("self", holder, 2), "cb", fn_t0, 2),
            e_fn_lit(unit, fn_t0, 2),
            2,
        )],
        1,
    ));
    let invoke = fx.functions.add(func(
        "invoke",
        vec![("h", holder, Binding::Fixed)],
        vec![],
        vec![s_expr(TypedExpression {
            kind: TypedExpressionKind::Call {
                callee: Callee::Dynamic {
                    expr: Box::new(e_attr(e_ref("h", holder, 2), "cb", fn_t0, 2)),
                },
                arguments: vec![],
            },
            ty: TypeId::from_raw(0),
            line: 2,
        })],
        1,
    ));
    let (module, _main) = fx.with_main(vec![
        s_let(
            "h",
            holder,
            Binding::New,
            e_call(make_holder, vec![], holder, 11),
            11,
        ),
        s_expr(e_call(
            invoke,
            vec![e_ref("h", holder, 12)],
            TypeId::from_raw(0),
            12,
        )),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let diagnostics = visitor.check_module().unwrap();
    assert!(diagnostics.is_empty());

    // the function stored in the argument's attribute was resolved and
    // summarized inside the blessed callee; the wrapper itself stays
    // uncached
    assert!(visitor.db.get("unit").is_some());
    assert!(visitor.db.get("invoke").is_none());
}

#[test]
fn test_returning_a_local_allocation_is_reported() {
    crate::logging::init_test();
    let mut fx = fixture();
    let (create, obj) = (fx.create, fx.obj);
    let leak = fx.functions.add(func(
        "leak",
        vec![],
        vec![("r", obj, Binding::Var)],
        vec![
            s_let("t", obj, Binding::New, e_call(create, vec![], obj, 2), 2),
            s_ret(vec![e_ref("t", obj, 3)], 3),
        ],
        1,
    ));
    let (module, _main) = fx.with_main(vec![]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(leak).unwrap();

    // the return slot outlives the body-scoped allocation
    assert_eq!(check.diagnostics.len(), 1);
    assert_eq!(check.diagnostics[0].kind, TraceDiagnosticKind::ObjectLifetime);
    assert_eq!(check.diagnostics[0].line(), 3);

    // the summary's return memory is healed to empty
    let delta = visitor.db.get("leak").unwrap();
    assert!(delta.ret_memories[0].impressions.is_empty());
}

#[test]
fn test_returning_branch_contributes_nothing() {
    crate::logging::init_test();
    let fx = fixture();
    let (create, obj, boolean) = (fx.create, fx.obj, fx.boolean);
    let (module, main) = fx.with_main(vec![
        s_let("a", obj, Binding::New, e_call(create, vec![], obj, 11), 11),
        s_let("b", obj, Binding::New, e_call(create, vec![], obj, 12), 12),
        s_let("p", obj, Binding::Var, e_ref("a", obj, 13), 13),
        s_if1(
            e_bool(boolean, 14),
            vec![
                s_assign(e_ref("p", obj, 15), e_ref("b", obj, 15), 15),
                s_ret(vec![], 16),
            ],
            14,
        ),
    ]);

    let mut visitor = MemoryVisitor::new(&module);
    let check = visitor.check_function(main).unwrap();

    assert!(check.diagnostics.is_empty());
    // on every path that falls through, `p` still points at `a`
    assert_eq!(impression_names(check.memory_of("p").unwrap()), vec!["a"]);
}
