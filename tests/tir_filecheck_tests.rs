//! FileCheck-style tests for TIR files
//!
//! This test suite runs the pass over the TIR files under `tests/filetest`
//! and validates the output against their CHECK directives, similar to how
//! LLVM's FileCheck works but implemented in Rust.

use std::fs;
use std::path::Path;
use taffo_init::test_ir::{TestRunner, TestSpec};

/// Test helper that runs a TIR file through FileCheck validation
fn run_filecheck_test(tir_file: &str) {
    let _ = env_logger::builder().is_test(true).try_init();
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/filetest")
        .join(tir_file);
    let contents = fs::read_to_string(&path)
        .unwrap_or_else(|e| panic!("Failed to read {}: {}", path.display(), e));

    let spec = TestSpec::parse(&contents)
        .unwrap_or_else(|e| panic!("Failed to parse test spec from {}: {}", tir_file, e));

    let runner = TestRunner::new(false);
    runner
        .run_test(&spec)
        .unwrap_or_else(|e| panic!("Test {} failed: {}", tir_file, e));
}

#[test]
fn test_specialize_filecheck() {
    run_filecheck_test("specialize.tir");
}

#[test]
fn test_queue_filecheck() {
    run_filecheck_test("queue.tir");
}

#[test]
fn test_backtracking_filecheck() {
    run_filecheck_test("backtracking.tir");
}

#[test]
fn test_global_filecheck() {
    run_filecheck_test("global.tir");
}

#[test]
fn test_malformed_filecheck() {
    run_filecheck_test("malformed.tir");
}

#[test]
fn test_all_filetests_have_run_lines() {
    let dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/filetest");
    let mut count = 0;
    for entry in fs::read_dir(&dir).unwrap() {
        let path = entry.unwrap().path();
        if path.extension().is_some_and(|ext| ext == "tir") {
            let contents = fs::read_to_string(&path).unwrap();
            assert!(
                TestSpec::parse(&contents).is_ok(),
                "{} has no RUN line",
                path.display()
            );
            count += 1;
        }
    }
    assert!(count >= 5);
}
