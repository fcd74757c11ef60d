//! Command-line driver: runs the initialization pass over a `.tir` module.

use clap::Parser;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::process::ExitCode;
use taffo_init::test_ir::{run_pipeline, PipelineOptions, TestIR};
use taffo_init::InitConfig;

#[derive(Parser, Debug)]
#[command(name = "taffo-init", about = "Propagate numeric annotations through a TIR module")]
struct Args {
    /// Input module; standard input when omitted or `-`
    input: Option<PathBuf>,

    /// Stop after writing module-level metadata
    #[arg(long)]
    no_specialize: bool,

    /// Leave annotation marker calls in place
    #[arg(long)]
    keep_markers: bool,

    /// Suffix of specialized function names
    #[arg(long, default_value = "fixp")]
    clone_suffix: String,

    /// Default fixed-point width
    #[arg(long, default_value_t = 32)]
    fixp_bits: u32,

    /// Fractional bits of the default fixed-point layout
    #[arg(long, default_value_t = 16)]
    fixp_frac_bits: u32,

    /// Dump the module conversion queue
    #[arg(long)]
    print_queue: bool,

    /// Do not print the annotated module
    #[arg(long)]
    no_print_ir: bool,

    /// Print run statistics
    #[arg(long)]
    stats: bool,

    /// Log propagation decisions (RUST_LOG overrides)
    #[arg(short, long)]
    verbose: bool,
}

fn read_input(input: Option<&PathBuf>) -> io::Result<String> {
    match input {
        Some(path) if path.as_os_str() != "-" => fs::read_to_string(path),
        _ => {
            let mut buffer = String::new();
            io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    let default_level = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let text = match read_input(args.input.as_ref()) {
        Ok(text) => text,
        Err(e) => {
            eprintln!("Error: cannot read input: {}", e);
            return ExitCode::from(2);
        }
    };

    let mut ir = match TestIR::parse(&text) {
        Ok(ir) => ir,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::from(1);
        }
    };

    let options = PipelineOptions {
        config: InitConfig {
            specialize: !args.no_specialize,
            erase_markers: !args.keep_markers,
            clone_suffix: args.clone_suffix,
            fixp_bits: args.fixp_bits,
            fixp_frac_bits: args.fixp_frac_bits,
        },
        print_ir: !args.no_print_ir,
        print_queue: args.print_queue,
        print_stats: args.stats,
    };

    match run_pipeline(&mut ir, &options) {
        Ok(output) => {
            println!("{}", output);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::from(1)
        }
    }
}
