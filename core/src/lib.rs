//! `mlisp-core`: the microprogrammed accumulator machine and the code
//! generator that targets it.
//!
//! The crate is organized leaves-first, mirroring the instruction-set
//! reference this implementation is built against:
//!
//! - [`isa`] — the mnemonic/opcode table.
//! - [`microcode`] — the 64-entry control store and opcode→entry-point table.
//! - [`machine`] — register file, data memory, instruction memory.
//! - [`cpu`] — the microcycle engine that drives [`machine::Machine`] with
//!   [`microcode`]'s ROM.
//! - [`binary`] — the program file format and `.hex` listing sidecar.
//! - [`ast`] — the tagged AST contract the code generator consumes.
//! - [`codegen`] — lowers [`ast::Node`] trees to a linked [`binary::Program`].
//! - [`trace`] — the byte-exact per-tick trace log.
//! - [`io`] — input queue and output collector.
//! - [`parser`] — a small Lisp reader, kept around so the crate runs
//!   end-to-end from source text; not part of the scored core.
#![forbid(missing_docs)]

pub mod ast;
pub mod binary;
pub mod codegen;
pub mod cpu;
pub mod error;
pub mod io;
pub mod isa;
pub mod machine;
pub mod microcode;
pub mod parser;
pub mod trace;
