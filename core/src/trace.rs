//! The trace sink: a byte-exact, per-tick log of machine state.
//!
//! This format is golden-tested downstream and must match field widths,
//! spacing, and separators exactly — including the double space between
//! `TICK` and the tick number on a FETCH record, which the per-microstep
//! record does not have. Resist the urge to "clean up" the asymmetry; it is
//! the pinned contract, not an accident.

use std::io::{self, Write};

use arbitrary_int::Number;

use crate::machine::Registers;

/// Width of the dashed separator line following every trace record.
const SEPARATOR_WIDTH: usize = 40;

/// Writes trace records to an underlying [`Write`] sink.
pub struct TraceSink<W> {
    out: W,
}

impl<W: Write> TraceSink<W> {
    /// Wrap a writer as a trace sink.
    pub fn new(out: W) -> Self {
        Self { out }
    }

    /// Emit a FETCH record: the tick at which a new macro-instruction was
    /// fetched, its `IP`, and its decoded opcode.
    ///
    /// # Errors
    /// Propagates any I/O failure writing to the underlying sink.
    pub fn record_fetch(&mut self, macro_cnt: u64, ip: u32, opcode: u8) -> io::Result<()> {
        writeln!(self.out, "[TICK  {macro_cnt} (FETCH)] IP={ip:04} OPCODE={opcode:02}")?;
        self.separator()
    }

    /// Emit a per-microstep record of the full register file.
    ///
    /// # Errors
    /// Propagates any I/O failure writing to the underlying sink.
    pub fn record_step(&mut self, regs: &Registers) -> io::Result<()> {
        writeln!(
            self.out,
            "[TICK {}] uPC={:02} IR={:08X}",
            regs.macro_cnt,
            regs.u_pc.value(),
            regs.ir
        )?;
        writeln!(
            self.out,
            "ACC={:11} DR={:11} IP={:08X} SP={:08X}",
            regs.acc, regs.dr, regs.ip, regs.sp
        )?;
        writeln!(
            self.out,
            "DataA={} Z={} N={}",
            regs.data_a,
            u8::from(regs.z),
            u8::from(regs.n)
        )?;
        self.separator()
    }

    fn separator(&mut self) -> io::Result<()> {
        writeln!(self.out, "{}", "-".repeat(SEPARATOR_WIDTH))
    }

    /// Consume the sink and return the underlying writer.
    pub fn into_inner(self) -> W {
        self.out
    }
}
