//! Machine state: the register file, data memory, and instruction memory.
//!
//! Construction is total — there is no way to build a [`Machine`] that
//! fails, matching the reference design's "no failure" contract for this
//! component. Loading a program into it can fail (see [`crate::binary`]),
//! but the empty machine itself cannot.

use std::collections::HashMap;

use arbitrary_int::u6;

/// Initial stack pointer value. The stack grows downward from here toward
/// smaller addresses and shares the address space with the data section.
pub const INITIAL_SP: u32 = 0x7FFF_FFFC;

/// The register file.
///
/// Every field here is part of the observable machine state a [`crate::trace::TraceSink`]
/// record captures; none of it is scratch local to an individual method.
#[derive(Debug, Clone)]
pub struct Registers {
    /// Accumulator: primary ALU operand and I/O staging register.
    pub acc: u32,
    /// Stack pointer.
    pub sp: u32,
    /// Instruction pointer (word index into instruction memory).
    pub ip: u32,
    /// Data register: ALU's right-hand operand, latched from memory.
    pub dr: u32,
    /// Data-memory address latch.
    pub data_a: u32,
    /// Micro-program counter: a 6-bit register, so out-of-range values are
    /// unrepresentable rather than merely unexpected.
    pub u_pc: u6,
    /// Instruction register: the raw 32-bit word fetched at the start of
    /// the current macro-instruction.
    pub ir: u32,
    /// Sign-extended 27-bit argument of the current macro-instruction.
    pub arg: i32,
    /// Zero flag, reflecting the most recent ALU result.
    pub z: bool,
    /// Negative flag, reflecting bit 31 of the most recent ALU result.
    pub n: bool,
    /// Set once the machine has halted; no further ticks run.
    pub halted: bool,
    /// Monotonic tick counter, incremented on every tick (both the FETCH
    /// tick and each microstep tick), matching the numbering the trace sink
    /// prints on `[TICK n]` records.
    pub macro_cnt: u64,
}

impl Default for Registers {
    fn default() -> Self {
        Self {
            acc: 0,
            sp: INITIAL_SP,
            ip: 0,
            dr: 0,
            data_a: 0,
            u_pc: u6::new(0),
            ir: 0,
            arg: 0,
            z: false,
            n: false,
            halted: false,
            macro_cnt: 0,
        }
    }
}

/// Data memory: a sparse mapping from word address to word value.
///
/// Unwritten addresses read as 0, as required by the "never read before
/// write" invariant — a `HashMap` gives this for free without pre-sizing a
/// dense array to the address space's nominal 32-bit extent.
#[derive(Debug, Clone, Default)]
pub struct DataMemory {
    cells: HashMap<u32, u32>,
}

impl DataMemory {
    /// Create an empty data memory.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the word at `addr`, defaulting to 0 if never written.
    #[must_use]
    pub fn read(&self, addr: u32) -> u32 {
        self.cells.get(&addr).copied().unwrap_or(0)
    }

    /// Write `value` at `addr`.
    pub fn write(&mut self, addr: u32, value: u32) {
        self.cells.insert(addr, value);
    }

    /// Iterate over every written `(addr, value)` pair, in ascending address
    /// order — used by the binary writer to emit the initial data section.
    pub fn iter_sorted(&self) -> impl Iterator<Item = (u32, u32)> + '_ {
        let mut pairs: Vec<(u32, u32)> = self.cells.iter().map(|(&a, &v)| (a, v)).collect();
        pairs.sort_unstable_by_key(|&(a, _)| a);
        pairs.into_iter()
    }
}

/// The full machine: registers, data memory, instruction memory, and I/O
/// ports.
#[derive(Debug, Clone, Default)]
pub struct Machine {
    /// The register file.
    pub regs: Registers,
    /// Data memory.
    pub data: DataMemory,
    /// Instruction memory: an ordered, immutable-after-load sequence of
    /// 32-bit words, addressed by `regs.ip`.
    pub instructions: Vec<u32>,
    /// Input/output ports.
    pub io: crate::io::Ports,
}

impl Machine {
    /// Create an empty machine with no program loaded.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the instruction word at the current `IP`, or `None` if `IP`
    /// has run past the end of instruction memory.
    #[must_use]
    pub fn current_instruction(&self) -> Option<u32> {
        self.instructions.get(self.regs.ip as usize).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_machine_has_spec_initial_registers() {
        let m = Machine::new();
        assert_eq!(m.regs.sp, INITIAL_SP);
        assert_eq!(m.regs.ip, 0);
        assert!(!m.regs.halted);
    }

    #[test]
    fn data_memory_defaults_unwritten_cells_to_zero() {
        let mem = DataMemory::new();
        assert_eq!(mem.read(12345), 0);
    }

    #[test]
    fn data_memory_round_trips_a_write() {
        let mut mem = DataMemory::new();
        mem.write(4, 99);
        assert_eq!(mem.read(4), 99);
        assert_eq!(mem.read(5), 0);
    }
}
