// These tests exercise annotation reading end to end: strings taken from marker calls and from
// the module annotation table are parsed, rejected strings surface as warnings without stopping
// the pass, duplicate annotations on one declaration are reported once, and annotated globals
// and functions become roots of the propagation.

//! Annotation collection tests.

use taffo_init::test_ir::{TestIR, TestIRAdaptor};
use taffo_init::{
    AnnotationParser, InitConfig, InitReport, InitWarning, MdInfo, ParseFailure,
    TaffoInitializer,
};

const MARKER_DECL: &str = "declare @llvm.var.annotation(i8* %p, i8* %s) -> void\n";

fn run(text: &str) -> (TestIR, InitReport) {
    let _ = env_logger::builder().is_test(true).try_init();
    let source = format!("{}{}", text, MARKER_DECL);
    let mut ir = TestIR::parse(&source).unwrap_or_else(|e| panic!("parse failed: {e}"));
    let report = TaffoInitializer::new(InitConfig::default())
        .run(&mut TestIRAdaptor::new(&mut ir))
        .unwrap_or_else(|e| panic!("pass failed: {e}"));
    (ir, report)
}

#[test]
fn test_malformed_annotation_warns_and_attaches_nothing() {
    let (ir, report) = run(
        r#"
define @main() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "scalar(disabled range(-3000,3000))")
  ret
}
"#,
    );

    assert_eq!(report.warnings.len(), 1);
    let InitWarning::Syntax {
        declaration,
        failure,
        ..
    } = &report.warnings[0]
    else {
        panic!("expected a syntax warning, got {:?}", report.warnings[0]);
    };
    assert_eq!(declaration, "a");
    assert!(matches!(failure, ParseFailure::UnrecognizedHead { .. }));

    assert_eq!(report.stats.annotation_count, 0);
    assert!(ir.metadata.is_empty());
    // The rejected marker is still a marker.
    assert_eq!(report.stats.markers_erased, 1);
}

#[test]
fn test_range_only_annotation_round_trips() {
    let md = AnnotationParser::parse("range -4000 4000").unwrap();
    assert!(md.is_range_only);
    assert!(md.numeric_type.is_none());
    let range = md.range.unwrap();
    assert_eq!((range.min, range.max), (-4000.0, 4000.0));

    let reparsed = AnnotationParser::parse(&md.to_string()).unwrap();
    assert_eq!(reparsed, md);
}

#[test]
fn test_bad_annotation_skips_only_its_declaration() {
    let (ir, report) = run(
        r#"
define @main() -> void {
entry:
  %bad = alloca float
  call @llvm.var.annotation(%bad, "wide 3")
  %good = alloca float
  call @llvm.var.annotation(%good, "range 0 1")
  ret
}
"#,
    );

    assert_eq!(report.warnings.len(), 1);
    assert_eq!(report.stats.annotation_count, 1);
    assert!(ir.metadata_of(ir.find_value("main", "good").unwrap()).is_some());
    assert!(ir.metadata_of(ir.find_value("main", "bad").unwrap()).is_none());
}

#[test]
fn test_duplicate_annotation_reported_once() {
    let (ir, report) = run(
        r#"
define @main() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 0 1")
  call @llvm.var.annotation(%a, "range 5 6")
  ret
}
"#,
    );

    assert_eq!(report.warnings.len(), 1);
    assert!(matches!(
        &report.warnings[0],
        InitWarning::Duplicate { declaration, annotation } if declaration == "a" && annotation == "range 5 6"
    ));
    assert_eq!(report.stats.roots, 1);

    let md = ir.metadata_of(ir.find_value("main", "a").unwrap()).unwrap();
    let Some(MdInfo::Scalar(scalar)) = &md.info else {
        panic!("expected scalar metadata");
    };
    assert_eq!(scalar.range.map(|r| r.max), Some(1.0));
}

#[test]
fn test_same_name_in_two_functions_is_not_a_duplicate() {
    let (_, report) = run(
        r#"
define @f() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 0 1")
  ret
}
define @g() -> void {
entry:
  %a = alloca float
  call @llvm.var.annotation(%a, "range 0 2")
  ret
}
"#,
    );

    assert!(report.warnings.is_empty());
    assert_eq!(report.stats.annotation_count, 2);
    assert_eq!(report.stats.roots, 2);
}

#[test]
fn test_global_annotation_roots_the_global() {
    let (ir, report) = run(
        r#"
@gain = global double
annotate @gain "target:filter 4 12 unsigned 0 8"

define @main() -> double {
entry:
  %g = load @gain
  %h = fmul %g, %g
  ret %h
}
"#,
    );

    assert_eq!(report.stats.roots, 1);
    let gain = ir.find_global("gain").unwrap();
    let md = ir.metadata_of(gain).unwrap();
    assert!(md.is_root);
    assert_eq!(md.target.as_deref(), Some("filter"));

    let h = ir.metadata_of(ir.find_value("main", "h").unwrap()).unwrap();
    assert_eq!(h.init_weight, 2);
    assert_eq!(h.target.as_deref(), Some("filter"));
    assert!(ir.print().contains("@gain = global double ; !taffo{weight=0 root target=filter"));
}

#[test]
fn test_function_annotation_roots_its_calls() {
    let (ir, report) = run(
        r#"
declare @sensor() -> float
annotate @sensor "range -5 5"

define @main() -> float {
entry:
  %s = call @sensor()
  %d = fadd %s, %s
  ret %d
}
"#,
    );

    assert_eq!(report.enabled_functions, vec!["sensor".to_string()]);
    let s = ir.metadata_of(ir.find_value("main", "s").unwrap()).unwrap();
    assert!(s.is_root);
    let d = ir.metadata_of(ir.find_value("main", "d").unwrap()).unwrap();
    assert_eq!(d.init_weight, 1);
}
