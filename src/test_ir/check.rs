//! FileCheck-style test validation for TIR files.
//!
//! This module provides functionality to parse CHECK directives from TIR files
//! and validate pass output against expected patterns, similar to LLVM's
//! FileCheck tool but implemented in a Rust-native way.

use super::{TestIR, TestIRAdaptor};
use crate::core::InitConfig;
use crate::init::{TaffoInitializer, ValueInfo};

/// A CHECK directive extracted from a TIR file
#[derive(Debug, Clone)]
pub enum CheckDirective {
    /// CHECK: pattern - Match exact pattern
    Check(String),
    /// CHECK-LABEL: pattern - Label for a section
    CheckLabel(String),
    /// CHECK-NEXT: pattern - Match on the next line
    CheckNext(String),
    /// CHECK-NOT: pattern - Pattern absent until the next positive match
    CheckNot(String),
    /// CHECK-EMPTY - Match empty line
    CheckEmpty,
    /// COM: comment - Comment, ignored
    Comment(String),
}

/// A RUN directive specifying how to execute the test
#[derive(Debug, Clone)]
pub struct RunDirective {
    pub command: String,
    pub args: Vec<String>,
}

/// Test specification extracted from a TIR file
#[derive(Debug)]
pub struct TestSpec {
    pub run_directives: Vec<RunDirective>,
    pub check_directives: Vec<CheckDirective>,
    pub tir_content: String,
}

impl TestSpec {
    /// Parse a TIR file to extract test specifications
    pub fn parse(content: &str) -> Result<Self, String> {
        let mut run_directives = Vec::new();
        let mut check_directives = Vec::new();
        let mut tir_lines = Vec::new();

        for line in content.lines() {
            let trimmed = line.trim();

            if let Some(run_cmd) = trimmed.strip_prefix("; RUN:") {
                let parts: Vec<&str> = run_cmd.split_whitespace().collect();
                if let Some((command, args)) = parts.split_first() {
                    run_directives.push(RunDirective {
                        command: command.to_string(),
                        args: args.iter().map(|s| s.to_string()).collect(),
                    });
                }
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-LABEL:") {
                check_directives.push(CheckDirective::CheckLabel(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NEXT:") {
                check_directives.push(CheckDirective::CheckNext(pattern.trim().to_string()));
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK-NOT:") {
                check_directives.push(CheckDirective::CheckNot(pattern.trim().to_string()));
            } else if trimmed.starts_with("; CHECK-EMPTY") {
                check_directives.push(CheckDirective::CheckEmpty);
            } else if let Some(pattern) = trimmed.strip_prefix("; CHECK:") {
                check_directives.push(CheckDirective::Check(pattern.trim().to_string()));
            } else if let Some(comment) = trimmed.strip_prefix("; COM:") {
                check_directives.push(CheckDirective::Comment(comment.trim().to_string()));
            } else {
                // Regular TIR content
                tir_lines.push(line);
            }
        }

        if run_directives.is_empty() {
            return Err("no RUN directive found".to_string());
        }

        Ok(TestSpec {
            run_directives,
            check_directives,
            tir_content: tir_lines.join("\n"),
        })
    }
}

/// What a pass run prints besides the collected warnings.
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub config: InitConfig,
    pub print_ir: bool,
    pub print_queue: bool,
    pub print_stats: bool,
}

impl PipelineOptions {
    /// Options from RUN-line style flags; unknown flags are ignored.
    pub fn from_args(args: &[String]) -> Self {
        let mut options = PipelineOptions::default();
        let mut iter = args.iter();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--print-ir" => options.print_ir = true,
                "--print-queue" => options.print_queue = true,
                "--stats" => options.print_stats = true,
                "--no-specialize" => options.config.specialize = false,
                "--keep-markers" => options.config.erase_markers = false,
                "--clone-suffix" => {
                    if let Some(suffix) = iter.next() {
                        options.config.clone_suffix = suffix.clone();
                    }
                }
                "--fixp-bits" => {
                    if let Some(bits) = iter.next().and_then(|s| s.parse().ok()) {
                        options.config.fixp_bits = bits;
                    }
                }
                "--fixp-frac-bits" => {
                    if let Some(bits) = iter.next().and_then(|s| s.parse().ok()) {
                        options.config.fixp_frac_bits = bits;
                    }
                }
                _ => {}
            }
        }
        options
    }
}

fn describe_entry(ir: &TestIR, val: u32, info: &ValueInfo<super::ValueRef>) -> String {
    let mut line = format!("{} distance={}", ir.qualified_name(val), info.distance);
    if info.is_root {
        line.push_str(" root");
    }
    if info.is_backtracking_node {
        line.push_str(" backtracking");
    }
    let roots: Vec<String> = info.root_set.iter().map(|r| ir.qualified_name(r.0)).collect();
    line.push_str(&format!(" roots=[{}]", roots.join(", ")));
    if let Some(md) = &info.metadata {
        line.push_str(&format!(" info={}", md));
    }
    line
}

/// Run the pass over `ir` and render the requested output.
pub fn run_pipeline(ir: &mut TestIR, options: &PipelineOptions) -> Result<String, String> {
    let output = {
        let mut adaptor = TestIRAdaptor::new(ir);
        TaffoInitializer::new(options.config.clone())
            .run_with_queue(&mut adaptor)
            .map_err(|e| e.to_string())?
    };

    let mut lines = Vec::new();
    for warning in &output.report.warnings {
        lines.push(format!("warning: {}", warning));
    }

    if options.print_queue {
        lines.push("Conversion queue".to_string());
        for (val, info) in output.queue.iter() {
            lines.push(format!("  {}", describe_entry(ir, val.0, info)));
        }
        lines.push("End queue".to_string());
    }

    if options.print_ir {
        lines.push(ir.print());
    }

    if options.print_stats {
        lines.push(output.report.stats.to_string());
    }

    Ok(lines.join("\n"))
}

/// Test runner that executes TIR tests
pub struct TestRunner {
    verbose: bool,
}

impl TestRunner {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Run a TIR test and validate output
    pub fn run_test(&self, spec: &TestSpec) -> Result<(), String> {
        for run_dir in &spec.run_directives {
            // Every RUN line starts from the unmodified module.
            let mut ir = TestIR::parse(&spec.tir_content)?;
            let output = run_pipeline(&mut ir, &PipelineOptions::from_args(&run_dir.args))?;
            if self.verbose {
                println!("{} output:\n{}", run_dir.command, output);
            }
            self.validate_output(&output, &spec.check_directives)?;
        }
        Ok(())
    }

    fn find_from(lines: &[&str], start: usize, pattern: &str) -> Option<usize> {
        lines
            .iter()
            .skip(start)
            .position(|line| line.contains(pattern))
            .map(|idx| start + idx)
    }

    /// Validate output against CHECK directives
    pub fn validate_output(
        &self,
        output: &str,
        directives: &[CheckDirective],
    ) -> Result<(), String> {
        let output_lines: Vec<&str> = output.lines().collect();
        let mut line_idx = 0;
        let mut pending_not: Vec<&str> = Vec::new();

        for directive in directives {
            match directive {
                CheckDirective::Comment(_) => continue,

                CheckDirective::CheckNot(pattern) => pending_not.push(pattern),

                CheckDirective::Check(pattern) | CheckDirective::CheckLabel(pattern) => {
                    let Some(found) = Self::find_from(&output_lines, line_idx, pattern) else {
                        let kind = match directive {
                            CheckDirective::CheckLabel(_) => "CHECK-LABEL",
                            _ => "CHECK",
                        };
                        return Err(format!("{}: pattern '{}' not found in output", kind, pattern));
                    };
                    Self::check_absent(&output_lines[line_idx..found], &pending_not)?;
                    pending_not.clear();
                    if self.verbose {
                        println!("CHECK: '{}' found at line {}", pattern, found);
                    }
                    line_idx = found + 1;
                }

                CheckDirective::CheckNext(pattern) => {
                    let Some(line) = output_lines.get(line_idx) else {
                        return Err(format!("CHECK-NEXT: no more lines, expected '{}'", pattern));
                    };
                    if !line.contains(pattern.as_str()) {
                        return Err(format!(
                            "CHECK-NEXT: expected '{}' but got '{}'",
                            pattern, line
                        ));
                    }
                    if self.verbose {
                        println!("CHECK-NEXT: '{}' matches at line {}", pattern, line_idx);
                    }
                    line_idx += 1;
                }

                CheckDirective::CheckEmpty => {
                    let Some(line) = output_lines.get(line_idx) else {
                        continue; // End of output counts as empty
                    };
                    if !line.trim().is_empty() {
                        return Err(format!(
                            "CHECK-EMPTY: expected empty line but got '{}'",
                            line
                        ));
                    }
                    line_idx += 1;
                }
            }
        }

        let rest = output_lines.get(line_idx..).unwrap_or(&[]);
        Self::check_absent(rest, &pending_not)
    }

    fn check_absent(lines: &[&str], patterns: &[&str]) -> Result<(), String> {
        for pattern in patterns {
            if let Some(line) = lines.iter().find(|line| line.contains(pattern)) {
                return Err(format!("CHECK-NOT: pattern '{}' found in '{}'", pattern, line));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_directives() {
        let content = r#"; RUN: %taffo-init --print-ir %s
; CHECK: define @main
; CHECK-NEXT: entry:
; CHECK-NOT: llvm.var.annotation
; COM: This is a comment
define @main() -> void {
entry:
  ret
}"#;

        let spec = TestSpec::parse(content).unwrap();
        assert_eq!(spec.run_directives.len(), 1);
        assert_eq!(spec.run_directives[0].args, vec!["--print-ir", "%s"]);
        assert_eq!(spec.check_directives.len(), 4);
        assert!(spec.tir_content.contains("define @main"));
    }

    #[test]
    fn test_check_matching() {
        let runner = TestRunner::new(false);
        let output = "define @main() -> void {\nentry:\n  ret\n}\n";

        let directives = vec![
            CheckDirective::CheckLabel("define @main".to_string()),
            CheckDirective::CheckNext("entry:".to_string()),
            CheckDirective::CheckNot("alloca".to_string()),
            CheckDirective::Check("ret".to_string()),
        ];

        runner.validate_output(output, &directives).unwrap();
    }

    #[test]
    fn test_check_next_failure() {
        let runner = TestRunner::new(false);
        let output = "Line 1\nLine 2\nLine 3\n";

        let directives = vec![
            CheckDirective::Check("Line 1".to_string()),
            CheckDirective::CheckNext("Line 3".to_string()), // Should fail
        ];

        let result = runner.validate_output(output, &directives);
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("CHECK-NEXT"));
    }

    #[test]
    fn test_check_not_failure() {
        let runner = TestRunner::new(false);
        let output = "start\nevil\nend\n";
        let directives = vec![
            CheckDirective::Check("start".to_string()),
            CheckDirective::CheckNot("evil".to_string()),
            CheckDirective::Check("end".to_string()),
        ];
        let err = runner.validate_output(output, &directives).unwrap_err();
        assert!(err.contains("CHECK-NOT"));
    }

    #[test]
    fn test_pipeline_flags() {
        let args: Vec<String> = [
            "--print-queue",
            "--no-specialize",
            "--clone-suffix",
            "q16",
            "--fixp-frac-bits",
            "24",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let options = PipelineOptions::from_args(&args);
        assert!(options.print_queue);
        assert!(!options.config.specialize);
        assert_eq!(options.config.clone_suffix, "q16");
        assert!(options.config.erase_markers);
        assert_eq!(options.config.fixp_frac_bits, 24);
        assert_eq!(options.config.fixp_bits, 32);
    }
}
