//! `mlispc`: compiles a Lisp-flavored source file to the instruction-set
//! reference's binary program format, alongside a `.hex` listing sidecar.
//!
//! Usage: `mlispc <source-file> <out-binary>`

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use mlisp_core::binary::{write_hex_listing, write_program};
use mlisp_core::codegen::compile;
use mlisp_core::parser::parse_program;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (Some(source_path), Some(out_path)) = (args.get(1), args.get(2)) else {
        eprintln!("Usage: mlispc <source-file> <out-binary>");
        return ExitCode::FAILURE;
    };

    match run(source_path, out_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("mlispc: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(source_path: &str, out_path: &str) -> Result<(), String> {
    tracing::info!(source = source_path, "compile started");

    let source = fs::read_to_string(source_path).map_err(|e| format!("reading {source_path}: {e}"))?;
    let nodes = parse_program(&source).map_err(|e| format!("parse error: {e}"))?;
    let program = compile(&nodes).map_err(|e| format!("compile error: {e}"))?;

    let out_file = fs::File::create(out_path).map_err(|e| format!("writing {out_path}: {e}"))?;
    write_program(&program, out_file).map_err(|e| format!("writing {out_path}: {e}"))?;

    let hex_path = Path::new(out_path).with_extension("hex");
    let hex_file =
        fs::File::create(&hex_path).map_err(|e| format!("writing {}: {e}", hex_path.display()))?;
    write_hex_listing(&program, hex_file).map_err(|e| format!("writing {}: {e}", hex_path.display()))?;

    tracing::info!(
        instructions = program.instructions.len(),
        data_words = program.data.len(),
        "compile finished"
    );
    Ok(())
}
