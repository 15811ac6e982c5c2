//! Error types shared across the compiler and the simulator.
//!
//! Runtime faults that the instruction set itself defines as halt
//! transitions (an opcode outside the table, an empty input queue on `in`)
//! are *not* represented here — they flow through [`crate::machine::Registers::halted`]
//! instead, per the propagation rules of the machine's error-handling design.
//! This enum only covers the faults that abort translation or reject a
//! malformed binary outright.

use thiserror::Error;

/// Crate-local result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A fatal error raised while compiling source or reading/writing a program
/// binary.
#[derive(Error, Debug)]
pub enum Error {
    /// The program file was truncated or otherwise malformed.
    #[error("bad program format: {0}")]
    BadFormat(String),

    /// The AST contract was given a node tag it does not recognize.
    #[error("unknown AST node: {0}")]
    UnknownNode(String),

    /// A `var`/`set`/`funcall` referenced a name with no matching
    /// declaration in scope.
    #[error("undefined variable or function: {0}")]
    UndefinedVar(String),

    /// A `funcall` supplied a different number of arguments than its
    /// `defunc` declares parameters.
    #[error("arity mismatch calling {name}: expected {expected}, got {got}")]
    ArityMismatch {
        /// The function being called.
        name: String,
        /// The number of parameters its `defunc` declares.
        expected: usize,
        /// The number of arguments the `funcall` supplied.
        got: usize,
    },

    /// A computed branch displacement or data address does not fit in the
    /// 27-bit signed argument field.
    #[error("address or displacement {0} overflows the 27-bit signed argument field")]
    OverflowAddr(i64),

    /// An I/O failure while reading or writing a file.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
