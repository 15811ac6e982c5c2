//! The microcode ROM: a 64-entry control store plus the opcode→entry-point
//! lookup table, built once by a pure constructor and immutable thereafter.
//!
//! Each macro-instruction is a short linear microprogram; the last step in
//! each microprogram arms `next_u = 0` with `cond = ALWAYS` so the control
//! sequencer falls back to the fetch entry point. This mirrors a textbook
//! horizontal microarchitecture: every signal in [`Microword`] drives exactly
//! one latch or mux for exactly one tick.

use bitfield::bitfield;

/// The ALU's left operand selector (`cla` field).
pub const ALU_LEFT_ZERO: u8 = 0b00;
/// Select `ACC` as the ALU's left operand.
pub const ALU_LEFT_ACC: u8 = 0b01;
/// Select `SP` as the ALU's left operand.
pub const ALU_LEFT_SP: u8 = 0b10;

/// The ALU's right operand selector (`cld` field).
pub const ALU_RIGHT_ZERO: u8 = 0b00;
/// Select `DR` as the ALU's right operand.
pub const ALU_RIGHT_DR: u8 = 0b01;
/// Select `IP` as the ALU's right operand.
pub const ALU_RIGHT_IP: u8 = 0b10;

/// ALU operation codes (`alu_op` field).
pub mod alu_op {
    /// `L + R`.
    pub const ADD: u8 = 0;
    /// `L - R`.
    pub const SUB: u8 = 1;
    /// `L * R`.
    pub const MUL: u8 = 2;
    /// `L / R` (0 when `R == 0`).
    pub const DIV: u8 = 3;
    /// `L + R + 1`.
    pub const INC: u8 = 4;
    /// `L + R - 1`.
    pub const DEC: u8 = 5;
}

/// Branch condition codes (`cond` field).
pub mod cond {
    /// Never take `next_u`; always fall through to `uPC + 1`.
    pub const NEVER: u8 = 0b000;
    /// Always take `next_u`.
    pub const ALWAYS: u8 = 0b001;
    /// Take `next_u` if `Z`.
    pub const IF_Z: u8 = 0b010;
    /// Take `next_u` if `N`.
    pub const IF_N: u8 = 0b011;
    /// Take `next_u` if `!Z`.
    pub const IF_NZ: u8 = 0b100;
    /// Take `next_u` if `!N && !Z`.
    pub const IF_GT: u8 = 0b101;
}

bitfield! {
    /// A single 27-bit microword, packed into the low bits of a `u32`.
    ///
    /// Bit layout, MSB to LSB, matches §3 of the machine's instruction set
    /// reference exactly:
    ///
    /// ```text
    /// 26 halted    25 acc_l    24 dal      23 mem_l    22 sp_l
    /// 21 dr_l      20 out_l    19 ip_l     18 adr_sel  17 io_sel
    /// 16-15 cla(2) 14-13 cld(2) 12 ip_sel  11-9 alu_op(3)
    /// 8-6 cond(3)  5-0 next_u(6)
    /// ```
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Microword(u32);
    impl Debug;
    u8;
    /// Set the `halted` flag once this microword's latches are applied.
    pub halted, set_halted: 26;
    /// Latch the ALU result (or an input character) into `ACC`.
    pub acc_l, set_acc_l: 25;
    /// Latch `DataA`, the data-memory address register.
    pub dal, set_dal: 24;
    /// Write `ACC` to `mem[DataA]`.
    pub mem_l, set_mem_l: 23;
    /// Latch the ALU result into `SP`.
    pub sp_l, set_sp_l: 22;
    /// Latch `mem[DataA]` into `DR`.
    pub dr_l, set_dr_l: 21;
    /// Emit the low byte of `ACC` to the output stream.
    pub out_l, set_out_l: 20;
    /// Latch `IP` from either the ALU result or `ARG`, per `ip_sel`.
    pub ip_l, set_ip_l: 19;
    /// When set, `DataA` latches from `ARG` rather than the ALU result.
    pub adr_sel, set_adr_sel: 18;
    /// When set, `ACC` latches the next input character instead of the ALU
    /// result (and halts the machine on an empty input queue).
    pub io_sel, set_io_sel: 17;
    /// ALU left-operand selector: `{0: 0, 1: ACC, 2: SP}`.
    pub cla, set_cla: 16, 15;
    /// ALU right-operand selector: `{0: 0, 1: DR, 2: IP}`.
    pub cld, set_cld: 14, 13;
    /// When set, `IP` latches from `ARG` rather than the ALU result.
    pub ip_sel, set_ip_sel: 12;
    /// The ALU operation; see [`alu_op`].
    pub alu_op, set_alu_op: 11, 9;
    /// The branch condition gating `next_u`; see [`cond`].
    pub cond, set_cond: 8, 6;
    /// The micro-PC to jump to when [`Microword::cond`] is satisfied.
    pub next_u, set_next_u: 5, 0;
}

impl Microword {
    /// The empty (all-zero) microword. `cla`/`cld` default to selecting 0 on
    /// both ALU inputs, `cond` defaults to `NEVER`, and `next_u` to 0.
    const EMPTY: Self = Self(0);

    /// Build a microword from named fields, leaving unspecified fields at
    /// their zero default. Mirrors the reference encoder's keyword-argument
    /// constructor one field at a time.
    #[must_use]
    #[allow(clippy::fn_params_excessive_bools, clippy::too_many_arguments)]
    fn new(
        halted: bool,
        acc_l: bool,
        dal: bool,
        mem_l: bool,
        sp_l: bool,
        dr_l: bool,
        out_l: bool,
        ip_l: bool,
        adr_sel: bool,
        io_sel: bool,
        cla: u8,
        cld: u8,
        ip_sel: bool,
        alu_op: u8,
        cond: u8,
        next_u: u8,
    ) -> Self {
        let mut w = Self::EMPTY;
        w.set_halted(halted);
        w.set_acc_l(acc_l);
        w.set_dal(dal);
        w.set_mem_l(mem_l);
        w.set_sp_l(sp_l);
        w.set_dr_l(dr_l);
        w.set_out_l(out_l);
        w.set_ip_l(ip_l);
        w.set_adr_sel(adr_sel);
        w.set_io_sel(io_sel);
        w.set_cla(cla);
        w.set_cld(cld);
        w.set_ip_sel(ip_sel);
        w.set_alu_op(alu_op);
        w.set_cond(cond);
        w.set_next_u(next_u);
        w
    }
}

/// A builder for [`Microword`]s that defaults every field to its identity
/// value and only asks for the ones a given microstep actually drives.
///
/// This exists because the reference ROM encoder calls its constructor with
/// a handful of keyword arguments per step out of sixteen possible fields;
/// naming all sixteen positionally at every one of the ~55 ROM entries below
/// would bury the signal that actually matters for each step.
#[derive(Default, Clone, Copy)]
struct U {
    halted: bool,
    acc_l: bool,
    dal: bool,
    mem_l: bool,
    sp_l: bool,
    dr_l: bool,
    out_l: bool,
    ip_l: bool,
    adr_sel: bool,
    io_sel: bool,
    cla: u8,
    cld: u8,
    ip_sel: bool,
    alu_op: u8,
    cond: u8,
    next_u: u8,
}

impl U {
    fn build(self) -> Microword {
        Microword::new(
            self.halted,
            self.acc_l,
            self.dal,
            self.mem_l,
            self.sp_l,
            self.dr_l,
            self.out_l,
            self.ip_l,
            self.adr_sel,
            self.io_sel,
            self.cla,
            self.cld,
            self.ip_sel,
            self.alu_op,
            self.cond,
            self.next_u,
        )
    }
}

/// Number of entries in the microcode ROM.
pub const ROM_SIZE: usize = 64;

/// Number of entries in the opcode→micro-entry-point table (5-bit opcode
/// space).
pub const OPCODE_TABLE_SIZE: usize = 32;

/// Build the 64-entry microcode ROM.
///
/// The layout below is the canonical one pinned by the instruction set
/// reference; it is transcribed entry-for-entry from the reference
/// microcode assembler rather than re-derived, since hand-deriving 64
/// control words independently of the source of truth is exactly how these
/// things drift.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn build_rom() -> [Microword; ROM_SIZE] {
    let mut rom = [Microword::EMPTY; ROM_SIZE];
    let mut set = |addr: usize, u: U| rom[addr] = u.build();

    // FETCH (placeholder; the real fetch work happens in the engine's
    // fetch_next_instruction, ahead of running this entry's latches).
    set(0, U { ip_l: true, ..U::default() });

    // LOAD
    set(1, U { adr_sel: true, dal: true, dr_l: true, ..U::default() });
    set(2, U { cld: ALU_RIGHT_DR, io_sel: false, acc_l: true, ..U::default() });
    set(3, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, ..U::default() });
    set(4, U { cond: cond::ALWAYS, next_u: 0, ..U::default() });

    // STORE
    set(5, U { adr_sel: true, dal: true, mem_l: true, ..U::default() });
    set(6, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, ..U::default() });
    set(7, U { cond: cond::ALWAYS, next_u: 0, ..U::default() });

    // CALL
    set(8, U { cla: ALU_LEFT_ZERO, cld: ALU_RIGHT_IP, alu_op: alu_op::INC, acc_l: true, ..U::default() });
    set(9, U { cla: ALU_LEFT_SP, cld: ALU_RIGHT_ZERO, alu_op: alu_op::DEC, sp_l: true, dal: true, mem_l: true, ..U::default() });
    set(10, U { cond: cond::ALWAYS, next_u: 42, ..U::default() });

    // RET
    set(11, U { cla: ALU_LEFT_SP, alu_op: alu_op::ADD, dal: true, adr_sel: false, dr_l: true, ..U::default() });
    set(12, U { cld: ALU_RIGHT_DR, alu_op: alu_op::ADD, ip_l: true, ip_sel: false, ..U::default() });
    set(13, U { cla: ALU_LEFT_SP, alu_op: alu_op::INC, sp_l: true, ..U::default() });
    set(14, U { cond: cond::ALWAYS, next_u: 0, ..U::default() });

    // ADD
    set(15, U { adr_sel: true, dal: true, dr_l: true, ..U::default() });
    set(16, U { cla: ALU_LEFT_ACC, cld: ALU_RIGHT_DR, alu_op: alu_op::ADD, acc_l: true, ..U::default() });
    set(17, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, ..U::default() });
    set(18, U { cond: cond::ALWAYS, next_u: 0, ..U::default() });

    // SUB
    set(19, U { adr_sel: true, dal: true, dr_l: true, ..U::default() });
    set(20, U { cla: ALU_LEFT_ACC, cld: ALU_RIGHT_DR, alu_op: alu_op::SUB, acc_l: true, ..U::default() });
    set(21, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, ..U::default() });
    set(22, U { cond: cond::ALWAYS, next_u: 0, ..U::default() });

    // MUL
    set(23, U { adr_sel: true, dal: true, dr_l: true, ..U::default() });
    set(24, U { cla: ALU_LEFT_ACC, cld: ALU_RIGHT_DR, alu_op: alu_op::MUL, acc_l: true, ..U::default() });
    set(25, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, ..U::default() });
    set(26, U { cond: cond::ALWAYS, next_u: 0, ..U::default() });

    // DIV
    set(27, U { adr_sel: true, dal: true, dr_l: true, ..U::default() });
    set(28, U { cla: ALU_LEFT_ACC, cld: ALU_RIGHT_DR, alu_op: alu_op::DIV, acc_l: true, ..U::default() });
    set(29, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, ..U::default() });
    set(30, U { cond: cond::ALWAYS, next_u: 0, ..U::default() });

    // PUSH
    set(31, U { cla: ALU_LEFT_SP, alu_op: alu_op::DEC, sp_l: true, ..U::default() });
    set(32, U { cla: ALU_LEFT_SP, alu_op: alu_op::ADD, dal: true, ..U::default() });
    set(33, U { mem_l: true, ..U::default() });
    set(34, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, cond: cond::ALWAYS, next_u: 0 });

    // POP
    set(35, U { cla: ALU_LEFT_SP, alu_op: alu_op::ADD, dal: true, ..U::default() });
    set(36, U { dr_l: true, ..U::default() });
    set(37, U { cld: ALU_RIGHT_DR, alu_op: alu_op::ADD, acc_l: true, ..U::default() });
    set(38, U { cla: ALU_LEFT_SP, alu_op: alu_op::INC, sp_l: true, ..U::default() });
    set(39, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, cond: cond::ALWAYS, next_u: 0 });

    // IN / OUT
    set(40, U { io_sel: true, cld: ALU_RIGHT_IP, alu_op: alu_op::INC, acc_l: true, ip_l: true, cond: cond::ALWAYS, next_u: 0 });
    set(41, U { out_l: true, cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, cond: cond::ALWAYS, next_u: 0 });

    // JMP base, reused by all conditional jumps once the condition is true.
    // Saves pc+1 (not pc) into ACC: the assembler's displacement is
    // target - (pc + 1), so the final IP := ACC + ARG step below lands
    // exactly on target.
    set(42, U { cla: ALU_LEFT_ZERO, cld: ALU_RIGHT_IP, alu_op: alu_op::INC, acc_l: true, ..U::default() });
    set(43, U { ip_sel: true, ip_l: true, ..U::default() });
    set(44, U { cla: ALU_LEFT_ACC, cld: ALU_RIGHT_IP, alu_op: alu_op::ADD, ip_l: true, ..U::default() });
    set(45, U { cond: cond::ALWAYS, next_u: 0, ..U::default() });

    // JZ / JNZ / JLT / JGT: re-derive Z/N from the live ACC (left operand,
    // zero right operand, ADD) so the condition reflects whatever comparison
    // last left its result sitting in ACC, then take the branch to uaddr 42
    // on condition, else fall through to plain IP += 1 and return.
    //
    // Without selecting ACC here, cla/cld default to the zero operand and
    // the ALU computes 0+0 on every one of these entries: Z is then always
    // true and N always false, independent of ACC, so JZ would always take
    // the branch and JNZ/JLT/JGT would never take it. Folding the re-derive
    // into the same tick as the condition check keeps the control store
    // single-pass; a standalone "re-test ACC" macro-instruction would need
    // its own fetch cycle and opcode.
    set(46, U { cla: ALU_LEFT_ACC, cond: cond::IF_Z, next_u: 42, ..U::default() });
    set(47, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, cond: cond::ALWAYS, next_u: 0 });
    set(48, U { cla: ALU_LEFT_ACC, cond: cond::IF_NZ, next_u: 42, ..U::default() });
    set(49, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, cond: cond::ALWAYS, next_u: 0 });
    set(50, U { cla: ALU_LEFT_ACC, cond: cond::IF_N, next_u: 42, ..U::default() });
    set(51, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, cond: cond::ALWAYS, next_u: 0 });
    set(52, U { cla: ALU_LEFT_ACC, cond: cond::IF_GT, next_u: 42, ..U::default() });
    set(53, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, cond: cond::ALWAYS, next_u: 0 });

    // HALT
    set(54, U { halted: true, ..U::default() });

    // LOAD_ADDR (indirect load: ACC := mem[mem[ARG]])
    set(55, U { adr_sel: true, dal: true, dr_l: true, ..U::default() });
    set(56, U { cla: ALU_LEFT_ZERO, cld: ALU_RIGHT_DR, alu_op: alu_op::ADD, dal: true, ..U::default() });
    set(57, U { dr_l: true, ..U::default() });
    set(58, U { cld: ALU_RIGHT_DR, io_sel: false, acc_l: true, ..U::default() });
    set(59, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, cond: cond::ALWAYS, next_u: 0 });

    // STORE_ADDR (indirect store: mem[mem[ARG]] := ACC)
    set(60, U { adr_sel: true, dal: true, dr_l: true, ..U::default() });
    set(61, U { cla: ALU_LEFT_ZERO, cld: ALU_RIGHT_DR, alu_op: alu_op::ADD, dal: true, ..U::default() });
    set(62, U { mem_l: true, ..U::default() });
    set(63, U { cld: ALU_RIGHT_IP, alu_op: alu_op::INC, ip_l: true, cond: cond::ALWAYS, next_u: 0 });

    rom
}

/// Build the opcode→micro-entry-point lookup table.
///
/// Unassigned opcodes map to 0 (the fetch entry); [`crate::cpu`] treats
/// fetching an unassigned opcode as an unknown-opcode fault and halts before
/// this table is ever consulted for one.
#[must_use]
pub fn build_opcode_table() -> [u8; OPCODE_TABLE_SIZE] {
    use crate::isa::Mnemonic;

    let mut table = [0u8; OPCODE_TABLE_SIZE];
    let entries: [(Mnemonic, u8); 19] = [
        (Mnemonic::Halt, 54),
        (Mnemonic::LoadAddr, 55),
        (Mnemonic::Load, 1),
        (Mnemonic::Store, 5),
        (Mnemonic::Push, 31),
        (Mnemonic::Pop, 35),
        (Mnemonic::Add, 15),
        (Mnemonic::Sub, 19),
        (Mnemonic::Mul, 23),
        (Mnemonic::Div, 27),
        (Mnemonic::Call, 8),
        (Mnemonic::Ret, 11),
        (Mnemonic::In, 40),
        (Mnemonic::Out, 41),
        (Mnemonic::Jmp, 42),
        (Mnemonic::Jz, 46),
        (Mnemonic::Jnz, 48),
        (Mnemonic::Jlt, 50),
        (Mnemonic::Jgt, 52),
        (Mnemonic::StoreAddr, 60),
    ];
    for (mnemonic, uaddr) in entries {
        table[mnemonic.opcode() as usize] = uaddr;
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rom_entries_stay_in_range() {
        let rom = build_rom();
        for word in rom {
            assert!(word.next_u() < ROM_SIZE as u8);
        }
    }

    #[test]
    fn every_branch_mnemonic_has_a_nonzero_entry_point() {
        let table = build_opcode_table();
        for m in crate::isa::Mnemonic::ALL {
            if m.opcode() != crate::isa::Mnemonic::Halt.opcode() {
                assert_ne!(
                    table[m.opcode() as usize],
                    0,
                    "{} has no micro-entry point",
                    m.name()
                );
            }
        }
    }

    #[test]
    fn fetch_entry_latches_ip_only() {
        let rom = build_rom();
        assert!(rom[0].ip_l());
        assert!(!rom[0].acc_l());
        assert!(!rom[0].mem_l());
    }

    #[test]
    fn halt_entry_sets_halted() {
        let rom = build_rom();
        assert!(rom[54].halted());
    }

    #[test]
    fn load_microprogram_ends_with_unconditional_return_to_fetch() {
        let rom = build_rom();
        assert_eq!(rom[4].cond(), cond::ALWAYS);
        assert_eq!(rom[4].next_u(), 0);
    }
}
