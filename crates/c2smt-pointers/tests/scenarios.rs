//! End-to-end encoding scenarios over several edges and paths.

use c2smt_formula::{Model, Sort, Term, Value};
use c2smt_pointers::{
    CompositeField, EncodingError, FieldClassification, HeapEncoding, MemoryRegion, PathState,
    PointerAliasingConfig, PointerAliasingEncoder,
};
use c2smt_types::{BinOp, CExpr, CType, StructField};
use std::sync::Once;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    });
}

fn s_type() -> CType {
    CType::structure(
        "S",
        vec![
            StructField::new("f", CType::int()),
            StructField::new("g", CType::long()),
        ],
    )
}

fn int(v: i128) -> CExpr {
    CExpr::int(v, CType::int())
}

fn var(name: &str, ty: CType) -> CExpr {
    CExpr::id(name, ty)
}

fn bv(v: u128, w: u32) -> Value {
    Value::BitVec(v, w)
}

#[test]
fn test_write_through_pointer_with_array_heap() {
    init_tracing();
    let config = PointerAliasingConfig {
        heap_encoding: HeapEncoding::Arrays,
        ..PointerAliasingConfig::default()
    };
    let classification = FieldClassification::new()
        .with_addressed_variable("main::x")
        .with_addressed_variable("main::a");
    let enc = PointerAliasingEncoder::new(config, classification);

    let x = var("main::x", CType::int());
    let a = var("main::a", CType::int());
    let p = var("main::p", CType::ptr(CType::int()));
    let y = var("main::y", CType::int());

    let mut formulas = Vec::new();
    let mut state = PathState::default();
    for (name, ty) in [("main::x", CType::int()), ("main::a", CType::int())] {
        let edge = enc.declare_variable(name, &ty, &state).unwrap();
        formulas.push(edge.formula);
        state = edge.state;
    }
    let steps = [
        (x.clone(), int(1)),
        (a.clone(), int(9)),
        (p.clone(), CExpr::address_of(x.clone())),
        (CExpr::deref(p.clone()), int(7)),
        (y.clone(), a.clone()),
    ];
    for (i, (lhs, rhs)) in steps.iter().enumerate() {
        let edge = enc
            .encode_assignment(&format!("e{i}"), lhs, rhs, &state)
            .unwrap();
        formulas.push(edge.formula);
        state = edge.state;
    }

    let mut model = Model::completing();
    model.assign("__ADDRESS_OF_main::x", bv(64, 64));
    model.assign("__ADDRESS_OF_main::a", bv(128, 64));
    for formula in &formulas {
        model.define(formula).unwrap();
    }
    assert_eq!(model.value_of("main::y@2"), Some(&bv(9, 32)));
    assert_eq!(model.value_of("main::p@2"), Some(&bv(64, 64)));

    let heap = Term::var(
        format!("*int@{}", state.ssa.index("*int")),
        Sort::array(Sort::BitVec(64), Sort::BitVec(32)),
    );
    let x_cell = Term::select(heap, Term::bv(64, 64)).unwrap();
    assert_eq!(model.eval(&x_cell).unwrap(), bv(7, 32));
}

#[test]
fn test_field_regions_follow_classification() {
    init_tracing();
    let config = PointerAliasingConfig {
        use_memory_regions: true,
        ..PointerAliasingConfig::default()
    };
    let classification = FieldClassification::new()
        .with_relevant(CompositeField::new(&s_type(), "f"))
        .with_relevant(CompositeField::new(&s_type(), "g"))
        .with_addressed(CompositeField::new(&s_type(), "f"))
        .with_addressed_variable("main::s");
    let enc = PointerAliasingEncoder::new(config, classification);

    let state = enc
        .declare_variable("main::s", &s_type(), &PathState::default())
        .unwrap()
        .state;
    let s = var("main::s", s_type());
    let state = enc
        .encode_assignment("e1", &CExpr::field(s.clone(), "g"), &int(1), &state)
        .unwrap()
        .state;
    let state = enc
        .encode_assignment("e2", &CExpr::field(s, "f"), &int(2), &state)
        .unwrap()
        .state;

    let g_region = MemoryRegion::Field {
        owner: s_type(),
        field_type: CType::long(),
        field_name: "g".to_string(),
    }
    .symbol();
    assert_eq!(state.ssa.index(&g_region), 2);
    assert_eq!(state.ssa.index("*int"), 2);
    assert_eq!(state.pts.all_targets(&g_region).len(), 1);
    assert_eq!(state.pts.all_targets("*int").len(), 1);
    assert!(state.pts.all_targets("*long").is_empty());

    let mut report = String::new();
    enc.print_statistics(&mut report).unwrap();
    assert!(report.contains(&g_region));
}

#[test]
fn test_deferred_pools_join_across_paths() {
    init_tracing();
    let enc = PointerAliasingEncoder::new(PointerAliasingConfig::default(), FieldClassification::new());
    let p = var("main::p", CType::void_ptr());
    let q = var("main::q", CType::void_ptr());
    let malloc = CExpr::call("malloc", vec![CExpr::int(8, CType::size_t())], CType::void_ptr());

    let start = PathState::default();
    let left = enc.encode_assignment("l1", &p, &malloc, &start).unwrap().state;
    let left = enc.encode_assignment("l2", &q, &p, &left).unwrap().state;
    let right = enc.encode_assignment("r1", &q, &malloc, &start).unwrap().state;

    let merged = enc.merge_states(&left, &right).unwrap();
    let pool = merged.state.pts.deferred_pool("main::p").unwrap();
    assert!(pool.pointer_variables().contains("main::q"));
    assert_eq!(pool.base_variables().len(), 2);
    assert_eq!(pool.size(), Some(8));
    // each side constrains the base only the other side allocated
    assert!(merged
        .left_formula
        .to_string()
        .contains("|__ADDRESS_OF_r1::malloc#1|"));
    assert!(merged
        .right_formula
        .to_string()
        .contains("|__ADDRESS_OF_l1::malloc#1|"));

    let r = var("main::r", CType::ptr(CType::int()));
    let cast = CExpr::cast(CType::ptr(CType::int()), p);
    let resolved = enc
        .encode_assignment("m1", &r, &cast, &merged.state)
        .unwrap()
        .state;
    for base in ["l1::malloc#1", "r1::malloc#1"] {
        assert_eq!(
            resolved.pts.bases().get(base),
            Some(&CType::array(CType::int(), 2))
        );
    }
    assert!(!resolved.pts.is_deferred_allocation_pointer("main::q"));
    assert_eq!(resolved.pts.all_targets("*int").len(), 4);
}

#[test]
fn test_reassigned_pointer_leaves_its_resolved_allocation() {
    init_tracing();
    let enc = PointerAliasingEncoder::new(PointerAliasingConfig::default(), FieldClassification::new());
    let p = var("main::p", CType::void_ptr());
    let q = var("main::q", CType::void_ptr());
    let malloc = |n| CExpr::call("malloc", vec![CExpr::int(n, CType::size_t())], CType::void_ptr());

    let start = PathState::default();
    let start = enc.encode_assignment("e1", &p, &malloc(16), &start).unwrap().state;
    let start = enc.encode_assignment("e2", &q, &malloc(8), &start).unwrap().state;

    let s_ptr = CType::ptr(s_type());
    let r = var("main::r", s_ptr.clone());
    let typed = enc
        .encode_assignment("a1", &r, &CExpr::cast(s_ptr, p.clone()), &start)
        .unwrap()
        .state;
    let aliased = enc.encode_assignment("b1", &p, &q, &start).unwrap().state;

    let merged = enc.merge_states(&typed, &aliased).unwrap().state;
    assert_eq!(merged.pts.bases().get("e1::malloc#1"), Some(&s_type()));
    let pool = merged.pts.deferred_pool("main::q").unwrap();
    assert_eq!(merged.pts.deferred_pool("main::p"), Some(pool));
    assert_eq!(pool.pointer_variables().len(), 2);
    assert_eq!(pool.base_variables().len(), 1);
    assert!(pool.base_variables().contains("e2::malloc#2"));

    let t = var("main::t", CType::ptr(CType::int()));
    let resolved = enc
        .encode_assignment("m1", &t, &CExpr::cast(CType::ptr(CType::int()), p), &merged)
        .unwrap()
        .state;
    assert_eq!(
        resolved.pts.bases().get("e2::malloc#2"),
        Some(&CType::array(CType::int(), 2))
    );
    assert_eq!(resolved.pts.bases().get("e1::malloc#1"), Some(&s_type()));
    assert!(!resolved.pts.is_deferred_allocation_pointer("main::p"));
    assert!(!resolved.pts.is_deferred_allocation_pointer("main::q"));
}

#[test]
fn test_cast_after_join_with_resolved_branch() {
    init_tracing();
    let enc = PointerAliasingEncoder::new(PointerAliasingConfig::default(), FieldClassification::new());
    let p = var("main::p", CType::void_ptr());
    let malloc = CExpr::call("malloc", vec![CExpr::int(16, CType::size_t())], CType::void_ptr());
    let start = enc
        .encode_assignment("e1", &p, &malloc, &PathState::default())
        .unwrap()
        .state;

    let s_ptr = CType::ptr(s_type());
    let r = var("main::r", s_ptr.clone());
    let typed = enc
        .encode_assignment("a1", &r, &CExpr::cast(s_ptr, p.clone()), &start)
        .unwrap()
        .state;
    let merged = enc.merge_states(&typed, &start).unwrap().state;
    assert!(!merged.pts.is_deferred_allocation_pointer("main::p"));

    let c_ptr = CType::ptr(CType::char());
    let c = var("main::c", c_ptr.clone());
    let after = enc
        .encode_assignment("m1", &c, &CExpr::cast(c_ptr, p), &merged)
        .unwrap()
        .state;
    assert_eq!(after.pts.bases().get("e1::malloc#1"), Some(&s_type()));
}

#[test]
fn test_sibling_paths_share_a_snapshot() {
    init_tracing();
    let enc = PointerAliasingEncoder::new(
        PointerAliasingConfig::default(),
        FieldClassification::new().with_addressed_variable("main::x"),
    );
    let shared = enc
        .declare_variable("main::x", &CType::int(), &PathState::default())
        .unwrap()
        .state;
    let x = var("main::x", CType::int());

    let states: Vec<PathState> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let (enc, shared, x) = (&enc, &shared, &x);
                scope.spawn(move || {
                    enc.encode_assignment(&format!("t{i}"), x, &int(i), shared)
                        .unwrap()
                        .state
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(shared.ssa.index("*int"), 1);
    for state in &states {
        assert_eq!(state.ssa.index("*int"), 2);
        assert_eq!(state.pts, shared.pts);
    }
    let stats = enc.regions().statistics();
    for i in 0..4 {
        assert_eq!(stats.usage_count(&format!("t{i}"), "*int"), 1);
    }
    assert_eq!(stats.target_count("*int"), 1);
}

#[test]
fn test_path_state_survives_serialization() {
    let enc = PointerAliasingEncoder::new(
        PointerAliasingConfig::default(),
        FieldClassification::new().with_addressed_variable("main::s"),
    );
    let state = enc
        .declare_variable("main::s", &s_type(), &PathState::default())
        .unwrap()
        .state;
    let g = CExpr::field(var("main::s", s_type()), "g");
    let state = enc
        .encode_assignment("e1", &g, &int(3), &state)
        .unwrap()
        .state;
    let p = var("main::p", CType::void_ptr());
    let malloc = CExpr::call("malloc", vec![CExpr::int(4, CType::size_t())], CType::void_ptr());
    let state = enc.encode_assignment("e2", &p, &malloc, &state).unwrap().state;

    let json = serde_json::to_string(&state).unwrap();
    let back: PathState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, state);
    assert_eq!(back.pts.all_targets("*long"), state.pts.all_targets("*long"));
    assert_eq!(back.ssa.sort("main::p"), Some(&Sort::BitVec(64)));
    assert!(back.pts.is_deferred_allocation_pointer("main::p"));
}

#[test]
fn test_error_kinds_surface_to_callers() {
    let enc = PointerAliasingEncoder::new(PointerAliasingConfig::default(), FieldClassification::new());
    let state = PathState::default();

    // address of a variable that was not declared as addressed
    let p = var("main::p", CType::ptr(CType::int()));
    let err = enc
        .encode_assignment("e1", &p, &CExpr::address_of(var("main::x", CType::int())), &state)
        .unwrap_err();
    assert!(err.is_invariant_violation());

    // assigning to a value
    let sum = CExpr::binary(BinOp::Add, int(1), int(2), CType::int());
    let err = enc.encode_assignment("e2", &sum, &int(3), &state).unwrap_err();
    assert!(matches!(err, EncodingError::UnrecognizedCode(_)));

    // dereferencing an unknown pointer
    let unknown = CExpr::call("get", vec![], CType::ptr(CType::int()));
    let y = var("main::y", CType::int());
    let err = enc
        .encode_assignment("e3", &y, &CExpr::deref(unknown), &state)
        .unwrap_err();
    assert!(err.is_unsupported());
}
