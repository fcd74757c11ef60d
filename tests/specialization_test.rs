// These tests run the whole pass, specialization enabled, over modules whose functions are called
// with annotated arguments. They check that distinct argument metadata yields distinct clones with
// every call rewritten to its own clone, that identical contexts share one clone, that clone
// parameters restart as roots at distance zero, that recursive call graphs are cloned once per
// outer context and terminate, and that indirect calls and disabled specialization leave the
// program's call graph untouched.

//! Function specialization tests.

use taffo_init::test_ir::{TestIR, TestIRAdaptor};
use taffo_init::{InitConfig, InitReport, MdInfo, TaffoInitializer};

const MARKER_DECL: &str = "declare @llvm.var.annotation(i8* %p, i8* %s) -> void\n";

fn run_with(text: &str, config: InitConfig) -> (TestIR, InitReport) {
    let _ = env_logger::builder().is_test(true).try_init();
    let source = format!("{}{}", text, MARKER_DECL);
    let mut ir = TestIR::parse(&source).unwrap_or_else(|e| panic!("parse failed: {e}"));
    let report = {
        let mut adaptor = TestIRAdaptor::new(&mut ir);
        TaffoInitializer::new(config)
            .run(&mut adaptor)
            .unwrap_or_else(|e| panic!("pass failed: {e}"))
    };
    (ir, report)
}

fn run(text: &str) -> (TestIR, InitReport) {
    run_with(text, InitConfig::default())
}

/// Name of the function a call instruction targets.
fn callee_of(ir: &TestIR, func: &str, call: &str) -> String {
    let call = ir
        .find_value(func, call)
        .unwrap_or_else(|| panic!("no call %{call} in @{func}"));
    let callee = *ir.values[call as usize].operands.last().unwrap();
    ir.values[callee as usize].name.clone()
}

fn param_range(ir: &TestIR, func: &str, idx: usize) -> Option<(f64, f64)> {
    let func = &ir.functions[ir.find_function(func)? as usize];
    let md = ir.metadata_of(func.args[idx])?;
    match &md.info {
        Some(MdInfo::Scalar(scalar)) => scalar.range.map(|r| (r.min, r.max)),
        _ => None,
    }
}

const TWO_CONTEXTS: &str = r#"
define @scale(float %x) -> float {
entry:
  %y = fmul %x, 2.0
  ret %y
}
define @main() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 0 1")
  %b = alloca float
  call @llvm.var.annotation(%b, "range -50 50")
  %va = load %a
  %vb = load %b
  %ra = call @scale(%va)
  %rb = call @scale(%vb)
  ret
}
"#;

#[test]
fn test_distinct_contexts_get_distinct_clones() {
    let (ir, report) = run(TWO_CONTEXTS);

    assert_eq!(report.stats.clones_created, 2);
    assert_eq!(report.stats.clones_reused, 0);

    let ra_callee = callee_of(&ir, "main", "ra");
    let rb_callee = callee_of(&ir, "main", "rb");
    assert_eq!(ra_callee, "scale_fixp");
    assert_eq!(rb_callee, "scale_fixp.1");

    assert_eq!(param_range(&ir, "scale_fixp", 0), Some((0.0, 1.0)));
    assert_eq!(param_range(&ir, "scale_fixp.1", 0), Some((-50.0, 50.0)));
    // The original body is left without records.
    assert_eq!(param_range(&ir, "scale", 0), None);

    for clone in ["scale_fixp", "scale_fixp.1"] {
        let func = &ir.functions[ir.find_function(clone).unwrap() as usize];
        assert!(func.internal);
        assert_eq!(func.cloned_from, ir.find_function("scale"));
        let y = ir.find_value(clone, "y").unwrap();
        assert_eq!(ir.metadata_of(y).map(|md| md.init_weight), Some(1));
    }
}

#[test]
fn test_specialized_parameters_are_rerooted() {
    let (ir, _) = run(TWO_CONTEXTS);

    // At the call site the argument sits one hop below its root.
    let va = ir.find_value("main", "va").unwrap();
    assert_eq!(ir.metadata_of(va).map(|md| md.init_weight), Some(1));

    for clone in ["scale_fixp", "scale_fixp.1"] {
        let func = &ir.functions[ir.find_function(clone).unwrap() as usize];
        let md = ir.metadata_of(func.args[0]).unwrap();
        assert!(md.is_root);
        assert_eq!(md.init_weight, 0);
    }
}

#[test]
fn test_identical_contexts_share_a_clone() {
    let (ir, report) = run(
        r#"
define @scale(float %x) -> float {
entry:
  %y = fmul %x, 2.0
  ret %y
}
define @main() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 0 1")
  %v1 = load %a
  %v2 = load %a
  %r1 = call @scale(%v1)
  %r2 = call @scale(%v2)
  ret
}
"#,
    );

    assert_eq!(report.stats.clones_created, 1);
    assert_eq!(report.stats.clones_reused, 1);
    assert_eq!(callee_of(&ir, "main", "r1"), "scale_fixp");
    assert_eq!(callee_of(&ir, "main", "r2"), "scale_fixp");
}

#[test]
fn test_recursive_function_terminates() {
    let (ir, report) = run(
        r#"
define @fact(float %x) -> float {
entry:
  %c = fcmp %x, 1.0
  condbr %c, ^base, ^rec
base:
  ret %x
rec:
  %m = fsub %x, 1.0
  %r = call @fact(%m)
  %p = fmul %x, %r
  ret %p
}
define @main() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 1 10")
  %v = load %a
  %out = call @fact(%v)
  ret
}
"#,
    );

    assert_eq!(report.stats.clones_created, 1);
    assert_eq!(callee_of(&ir, "main", "out"), "fact_fixp");
    // The recursive call inside the clone keeps its original target.
    assert_eq!(callee_of(&ir, "fact_fixp", "r"), "fact");
    assert!(ir
        .metadata_of(ir.find_value("fact_fixp", "m").unwrap())
        .is_some());
}

#[test]
fn test_nested_calls_are_specialized() {
    let (ir, report) = run(
        r#"
define @inner(float %x) -> float {
entry:
  %y = fadd %x, 1.0
  ret %y
}
define @outer(float %x) -> float {
entry:
  %r = call @inner(%x)
  ret %r
}
define @main() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 0 3")
  %v = load %a
  %out = call @outer(%v)
  ret
}
"#,
    );

    assert_eq!(report.stats.clones_created, 2);
    assert_eq!(callee_of(&ir, "main", "out"), "outer_fixp");
    assert_eq!(callee_of(&ir, "outer_fixp", "r"), "inner_fixp");
    // The original outer still calls the original inner.
    assert_eq!(callee_of(&ir, "outer", "r"), "inner");
    assert_eq!(param_range(&ir, "inner_fixp", 0), Some((0.0, 3.0)));
}

#[test]
fn test_indirect_call_is_left_alone() {
    let (ir, report) = run(
        r#"
define @main(i8* %fp) -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 0 1")
  %v = load %a
  %r = call %fp(%v) -> float
  ret
}
"#,
    );

    assert_eq!(report.stats.clones_created, 0);
    assert_eq!(ir.functions.len(), 2);
    assert!(ir.metadata_of(ir.find_value("main", "r").unwrap()).is_some());
}

#[test]
fn test_disabled_specialization_keeps_call_graph() {
    let config = InitConfig {
        specialize: false,
        ..InitConfig::default()
    };
    let (ir, report) = run_with(TWO_CONTEXTS, config);

    assert_eq!(report.stats.clones_created, 0);
    assert_eq!(callee_of(&ir, "main", "ra"), "scale");
    assert_eq!(callee_of(&ir, "main", "rb"), "scale");
    assert!(ir.find_function("scale_fixp").is_none());
}

#[test]
fn test_clone_suffix_is_configurable() {
    let config = InitConfig {
        clone_suffix: "q16".to_string(),
        ..InitConfig::default()
    };
    let (ir, _) = run_with(TWO_CONTEXTS, config);

    assert_eq!(callee_of(&ir, "main", "ra"), "scale_q16");
    assert_eq!(callee_of(&ir, "main", "rb"), "scale_q16.1");
}

#[test]
fn test_callee_local_roots_are_copied() {
    let (ir, _) = run(
        r#"
define @step(float %x) -> float {
entry:
  %tmp = alloca float
  call @llvm.var.annotation(%tmp, "range 0 8")
  %l = load %tmp
  %s = fadd %x, %l
  ret %s
}
define @main() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 0 1")
  %v = load %a
  %r = call @step(%v)
  ret
}
"#,
    );

    let clone = &ir.functions[ir.find_function("step_fixp").unwrap() as usize];
    assert!(clone.starting_point);
    let tmp = ir.find_value("step_fixp", "tmp").unwrap();
    let md = ir.metadata_of(tmp).unwrap();
    assert!(md.is_root);
    assert_eq!(md.init_weight, 0);
    // Every marker is gone, the copied one included.
    assert!(!ir.print().contains("call @llvm.var.annotation"));
}

#[test]
fn test_parameter_spill_slot_is_rerooted() {
    let (ir, report) = run(
        r#"
define @f(float %x) -> float {
entry:
  %x.addr = alloca float
  store %x, %x.addr
  %v = load %x.addr
  %y = fmul %v, 2.0
  ret %y
}
define @main() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 0 1")
  %va = load %a
  %r = call @f(%va)
  ret
}
"#,
    );

    assert_eq!(report.stats.clones_created, 1);
    let slot = ir.find_value("f_fixp", "x.addr").unwrap();
    let md = ir.metadata_of(slot).unwrap();
    assert!(md.is_root);
    assert_eq!(md.init_weight, 0);
    let Some(MdInfo::Scalar(scalar)) = &md.info else {
        panic!("expected scalar metadata, got {:?}", md.info);
    };
    assert_eq!(scalar.range.map(|r| (r.min, r.max)), Some((0.0, 1.0)));

    // Reading the slot back is one hop from the new root.
    let v = ir.find_value("f_fixp", "v").unwrap();
    assert_eq!(ir.metadata_of(v).map(|md| md.init_weight), Some(1));
    // The original body is untouched.
    assert!(ir.metadata_of(ir.find_value("f", "x.addr").unwrap()).is_none());
}
