//! The microcycle engine: decodes one microword per tick, drives the ALU,
//! applies latches in the fixed order the architecture specifies, updates
//! flags and the micro-PC, and re-enters fetch when the micro-PC wraps back
//! to the control store's entry point.
//!
//! All register contents stay in `0..2^32` throughout — a subtraction that
//! goes "negative" lives on as its two's-complement bit pattern, the same
//! way dedicated hardware would hold it. `Z`/`N` are the only window onto
//! sign; the ALU itself never reinterprets an operand as signed, including
//! in `div`, which is plain unsigned floor division on whatever bits a
//! register holds.

use std::io::Write;

use arbitrary_int::{u6, Number};

use crate::binary::decode_instruction;
use crate::error::Result;
use crate::isa::Mnemonic;
use crate::machine::Machine;
use crate::microcode::{self, alu_op, cond, Microword};
use crate::trace::TraceSink;

/// The microcycle engine: an immutable ROM and opcode table, reusable across
/// any number of [`Machine`] runs.
pub struct Cpu {
    rom: [Microword; microcode::ROM_SIZE],
    opcode_table: [u8; microcode::OPCODE_TABLE_SIZE],
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

impl Cpu {
    /// Build the engine, constructing its ROM and opcode table once.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rom: microcode::build_rom(),
            opcode_table: microcode::build_opcode_table(),
        }
    }

    /// Run `machine` to completion, optionally emitting a trace record for
    /// every fetch and every microstep.
    ///
    /// # Errors
    /// Propagates any I/O failure from the trace sink.
    pub fn run<W: Write>(&self, machine: &mut Machine, trace: Option<&mut TraceSink<W>>) -> Result<()> {
        let mut trace = trace;
        self.fetch_next_instruction(machine, &mut trace)?;
        while !machine.regs.halted {
            let wrapped = self.tick(machine, &mut trace)?;
            if wrapped {
                self.fetch_next_instruction(machine, &mut trace)?;
            }
        }
        Ok(())
    }

    /// Load `IR`/`ARG`/`uPC` for the instruction at the current `IP` and
    /// emit its FETCH trace record. Halts if `IP` has run past the end of
    /// instruction memory, or names an opcode outside the table.
    fn fetch_next_instruction<W: Write>(
        &self,
        m: &mut Machine,
        trace: &mut Option<&mut TraceSink<W>>,
    ) -> Result<()> {
        let Some(word) = m.current_instruction() else {
            m.regs.halted = true;
            return Ok(());
        };
        let (opcode, arg) = decode_instruction(word);
        if Mnemonic::from_opcode(opcode).is_none() {
            // kUnknownOpcode: surfaces as halt, not a propagated fault.
            m.regs.halted = true;
            return Ok(());
        }
        m.regs.ir = word;
        m.regs.arg = arg;
        m.regs.u_pc = u6::new(self.opcode_table[opcode as usize]);
        m.regs.macro_cnt += 1;
        if let Some(sink) = trace.as_mut() {
            sink.record_fetch(m.regs.macro_cnt, m.regs.ip, opcode)?;
        }
        Ok(())
    }

    /// Run exactly one microcycle tick. Returns `true` if the micro-PC
    /// wrapped back to the fetch entry point, meaning the caller must
    /// invoke [`Self::fetch_next_instruction`] before the next tick.
    fn tick<W: Write>(&self, m: &mut Machine, trace: &mut Option<&mut TraceSink<W>>) -> Result<bool> {
        let word = self.rom[m.regs.u_pc.value() as usize];

        let l = match word.cla() {
            microcode::ALU_LEFT_ACC => m.regs.acc,
            microcode::ALU_LEFT_SP => m.regs.sp,
            _ => 0,
        };
        let r = match word.cld() {
            microcode::ALU_RIGHT_DR => m.regs.dr,
            microcode::ALU_RIGHT_IP => m.regs.ip,
            _ => 0,
        };
        let alu = Self::alu(word.alu_op(), l, r);

        if word.acc_l() {
            if word.io_sel() {
                match m.io.read_char() {
                    Some(byte) => m.regs.acc = u32::from(byte),
                    None => m.regs.halted = true,
                }
            } else {
                m.regs.acc = alu;
            }
        }
        if word.dal() {
            m.regs.data_a = if word.adr_sel() { m.regs.arg as u32 } else { alu };
        }
        if word.mem_l() {
            m.data.write(m.regs.data_a, m.regs.acc);
        }
        if word.dr_l() {
            m.regs.dr = m.data.read(m.regs.data_a);
        }
        if word.sp_l() {
            m.regs.sp = alu;
        }
        if word.out_l() {
            m.io.write_char((m.regs.acc & 0xFF) as u8);
        }
        if word.ip_l() {
            m.regs.ip = if word.ip_sel() { m.regs.arg as u32 } else { alu };
        }

        m.regs.z = alu == 0;
        m.regs.n = alu & 0x8000_0000 != 0;

        let cond_true = match word.cond() {
            cond::ALWAYS => true,
            cond::IF_Z => m.regs.z,
            cond::IF_N => m.regs.n,
            cond::IF_NZ => !m.regs.z,
            cond::IF_GT => !m.regs.n && !m.regs.z,
            _ => false,
        };

        m.regs.macro_cnt += 1;
        if let Some(sink) = trace.as_mut() {
            sink.record_step(&m.regs)?;
        }

        let last_u_pc = m.regs.u_pc;
        m.regs.u_pc = u6::new(if cond_true { word.next_u() } else { (m.regs.u_pc.value() + 1) & 0x3F });

        if word.halted() {
            m.regs.halted = true;
        }

        Ok(m.regs.u_pc.value() == 0 && !m.regs.halted && last_u_pc.value() != 0)
    }

    /// Evaluate the ALU for one tick. `l`/`r` are raw register contents;
    /// they are never reinterpreted as signed here — `Z`/`N` are derived
    /// from the result afterward, not consulted by the op itself.
    fn alu(op: u8, l: u32, r: u32) -> u32 {
        match op {
            alu_op::ADD => l.wrapping_add(r),
            alu_op::SUB => l.wrapping_sub(r),
            alu_op::MUL => l.wrapping_mul(r),
            alu_op::DIV => {
                if r == 0 {
                    0
                } else {
                    l / r
                }
            }
            alu_op::INC => l.wrapping_add(r).wrapping_add(1),
            alu_op::DEC => l.wrapping_add(r).wrapping_sub(1),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binary::encode_instruction;

    fn assemble(words: &[(Mnemonic, i32)]) -> Vec<u32> {
        words
            .iter()
            .map(|&(m, arg)| encode_instruction(m.opcode(), arg).unwrap())
            .collect()
    }

    #[test]
    fn halt_program_halts_immediately() {
        let mut m = Machine::new();
        m.instructions = assemble(&[(Mnemonic::Halt, 0)]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert!(m.regs.halted);
        assert_eq!(m.regs.macro_cnt, 2); // one FETCH tick, one microstep tick
    }

    #[test]
    fn running_past_the_end_of_instructions_halts() {
        let mut m = Machine::new();
        m.instructions = vec![];
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert!(m.regs.halted);
    }

    #[test]
    fn load_then_halt_reads_a_data_word_into_acc() {
        let mut m = Machine::new();
        m.data.write(10, 42);
        m.instructions = assemble(&[(Mnemonic::Load, 10), (Mnemonic::Halt, 0)]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert_eq!(m.regs.acc, 42);
    }

    #[test]
    fn store_then_load_round_trips_through_memory() {
        let mut m = Machine::new();
        m.data.write(0, 7); // seed ACC's eventual source via LOAD below
        m.instructions = assemble(&[
            (Mnemonic::Load, 0),
            (Mnemonic::Store, 1),
            (Mnemonic::Load, 1),
            (Mnemonic::Halt, 0),
        ]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert_eq!(m.regs.acc, 7);
        assert_eq!(m.data.read(1), 7);
    }

    #[test]
    fn add_accumulates_into_acc() {
        let mut m = Machine::new();
        m.data.write(0, 2);
        m.data.write(1, 3);
        m.instructions = assemble(&[
            (Mnemonic::Load, 0),
            (Mnemonic::Add, 1),
            (Mnemonic::Halt, 0),
        ]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert_eq!(m.regs.acc, 5);
    }

    #[test]
    fn div_by_zero_yields_zero_not_a_fault() {
        let mut m = Machine::new();
        m.data.write(0, 9);
        m.data.write(1, 0);
        m.instructions = assemble(&[
            (Mnemonic::Load, 0),
            (Mnemonic::Div, 1),
            (Mnemonic::Halt, 0),
        ]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert_eq!(m.regs.acc, 0);
    }

    #[test]
    fn in_on_empty_queue_halts_instead_of_blocking() {
        let mut m = Machine::new();
        m.instructions = assemble(&[(Mnemonic::In, 0), (Mnemonic::Halt, 0)]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert!(m.regs.halted);
    }

    #[test]
    fn call_then_ret_returns_ip_to_the_instruction_after_call() {
        let mut m = Machine::new();
        // The JMP/CALL microprogram lands at IP := (pc + 1) + arg, where pc
        // is the branching instruction's own address; arg=1 from pc=0
        // reaches the RET at index 2.
        // 0: call 1
        // 1: halt
        // 2: ret
        m.instructions = assemble(&[
            (Mnemonic::Call, 1),
            (Mnemonic::Halt, 0),
            (Mnemonic::Ret, 0),
        ]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert!(m.regs.halted);
        assert_eq!(m.regs.ip, 1); // RET popped the address right after CALL, then halted there
    }

    #[test]
    fn conditional_jump_branches_on_the_sub_result_left_in_acc() {
        let mut m = Machine::new();
        m.data.write(0, 5);
        m.data.write(1, 5);
        // 0: load 0     -> ACC = 5
        // 1: sub 1      -> ACC = 5 - 5 = 0
        // 2: jz 1        -> IP := (pc(2) + 1) + arg(1) = 4, taken since ACC == 0
        // 3: halt (skipped)
        // 4: halt (landed on)
        m.instructions = assemble(&[
            (Mnemonic::Load, 0),
            (Mnemonic::Sub, 1),
            (Mnemonic::Jz, 1),
            (Mnemonic::Halt, 0),
            (Mnemonic::Halt, 0),
        ]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert_eq!(m.regs.ip, 4);
    }

    #[test]
    fn conditional_jump_falls_through_when_condition_is_false() {
        let mut m = Machine::new();
        m.data.write(0, 5);
        m.data.write(1, 3);
        // 0: load 0     -> ACC = 5
        // 1: sub 1      -> ACC = 5 - 3 = 2, not zero
        // 2: jz 5        -> not taken, IP advances to 3
        // 3: halt (landed on)
        m.instructions = assemble(&[
            (Mnemonic::Load, 0),
            (Mnemonic::Sub, 1),
            (Mnemonic::Jz, 5),
            (Mnemonic::Halt, 0),
        ]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert_eq!(m.regs.ip, 3);
    }

    #[test]
    fn jgt_takes_the_branch_when_acc_is_strictly_positive() {
        let mut m = Machine::new();
        m.data.write(0, 9);
        m.data.write(1, 4);
        // 0: load 0     -> ACC = 9
        // 1: sub 1      -> ACC = 5, positive
        // 2: jgt 1       -> IP := (pc(2) + 1) + arg(1) = 4
        // 3: halt (skipped)
        // 4: halt (landed on)
        m.instructions = assemble(&[
            (Mnemonic::Load, 0),
            (Mnemonic::Sub, 1),
            (Mnemonic::Jgt, 1),
            (Mnemonic::Halt, 0),
            (Mnemonic::Halt, 0),
        ]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert_eq!(m.regs.ip, 4);
    }

    #[test]
    fn jump_target_is_computed_relative_to_the_branch_instructions_own_address() {
        let mut m = Machine::new();
        // 0: jmp 1 -> IP := (pc(0) + 1) + arg(1) = 2
        // 1: halt (skipped)
        // 2: halt (landed on)
        m.instructions = assemble(&[(Mnemonic::Jmp, 1), (Mnemonic::Halt, 0), (Mnemonic::Halt, 0)]);
        Cpu::new().run(&mut m, None::<&mut TraceSink<Vec<u8>>>).unwrap();
        assert_eq!(m.regs.ip, 2);
    }
}
