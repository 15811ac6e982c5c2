//! `mlisp-sim`: runs a compiled program binary on the microcoded simulator.
//!
//! Usage: `mlisp-sim <program.bin> <input.txt> <output.txt>`
//!
//! A byte-exact trace log (format pinned by the instruction-set reference)
//! is always written alongside the output file, at `<output.txt>` with its
//! extension replaced by `.trace`.

use std::fs;
use std::path::Path;
use std::process::ExitCode;

use mlisp_core::binary::read_program;
use mlisp_core::cpu::Cpu;
use mlisp_core::machine::Machine;
use mlisp_core::trace::TraceSink;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args: Vec<String> = std::env::args().collect();
    let (Some(program_path), Some(input_path), Some(output_path)) =
        (args.get(1), args.get(2), args.get(3))
    else {
        eprintln!("Usage: mlisp-sim <program.bin> <input.txt> <output.txt>");
        return ExitCode::FAILURE;
    };

    match run(program_path, input_path, output_path) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("mlisp-sim: {message}");
            ExitCode::FAILURE
        }
    }
}

fn run(program_path: &str, input_path: &str, output_path: &str) -> Result<(), String> {
    let bytes = fs::read(program_path).map_err(|e| format!("reading {program_path}: {e}"))?;
    let program = read_program(&bytes).map_err(|e| format!("{program_path}: {e}"))?;
    let input = fs::read_to_string(input_path).map_err(|e| format!("reading {input_path}: {e}"))?;

    let mut machine = Machine::new();
    machine.instructions = program.instructions;
    for (addr, value) in program.data {
        machine.data.write(addr, value as u32);
    }
    machine.io.load_input(&input);

    let trace_path = Path::new(output_path).with_extension("trace");
    let trace_file =
        fs::File::create(&trace_path).map_err(|e| format!("writing {}: {e}", trace_path.display()))?;
    let mut trace_sink = TraceSink::new(trace_file);

    tracing::info!(program = program_path, "run started");
    Cpu::new()
        .run(&mut machine, Some(&mut trace_sink))
        .map_err(|e| format!("running {program_path}: {e}"))?;
    tracing::info!(ticks = machine.regs.macro_cnt, "program halted");

    fs::write(output_path, machine.io.output())
        .map_err(|e| format!("writing {output_path}: {e}"))?;
    Ok(())
}
