//! The program binary format: big-endian instruction stream plus an initial
//! data-memory image, and the human-readable `.hex` listing sidecar.

use std::io::Write;

use crate::error::{Error, Result};
use crate::isa::Mnemonic;

/// Sign-extend the low 27 bits of `raw` to a signed 32-bit value.
#[must_use]
pub const fn sign_extend_27(raw: u32) -> i32 {
    let bits = raw & 0x07FF_FFFF;
    if bits & 0x0400_0000 != 0 {
        (bits | 0xF800_0000) as i32
    } else {
        bits as i32
    }
}

/// Pack an opcode and a signed 27-bit argument into one instruction word.
///
/// # Errors
/// Returns [`Error::OverflowAddr`] if `arg` does not fit in 27 bits signed.
pub fn encode_instruction(opcode: u8, arg: i32) -> Result<u32> {
    const MIN: i32 = -(1 << 26);
    const MAX: i32 = (1 << 26) - 1;
    if !(MIN..=MAX).contains(&arg) {
        return Err(Error::OverflowAddr(i64::from(arg)));
    }
    let arg_bits = (arg as u32) & 0x07FF_FFFF;
    Ok((u32::from(opcode) << 27) | arg_bits)
}

/// Split an instruction word into its opcode and sign-extended argument.
#[must_use]
pub fn decode_instruction(word: u32) -> (u8, i32) {
    let opcode = ((word >> 27) & 0x1F) as u8;
    (opcode, sign_extend_27(word))
}

/// A fully assembled program: the instruction stream plus the initial data
/// section.
#[derive(Debug, Clone, Default)]
pub struct Program {
    /// Instruction words, in address (IP) order.
    pub instructions: Vec<u32>,
    /// Initial `(address, value)` data-memory contents, in the order they
    /// should be applied.
    pub data: Vec<(u32, i32)>,
}

/// Serialize `program` to the big-endian binary format of the external
/// interface.
///
/// # Errors
/// Propagates any I/O failure writing to `out`.
pub fn write_program<W: Write>(program: &Program, mut out: W) -> Result<()> {
    let count = u32::try_from(program.instructions.len())
        .map_err(|_| Error::BadFormat("instruction count exceeds u32".into()))?;
    out.write_all(&count.to_be_bytes())?;
    for &word in &program.instructions {
        out.write_all(&word.to_be_bytes())?;
    }
    for &(addr, value) in &program.data {
        out.write_all(&addr.to_be_bytes())?;
        out.write_all(&value.to_be_bytes())?;
    }
    Ok(())
}

/// Deserialize a program from the big-endian binary format.
///
/// # Errors
/// Returns [`Error::BadFormat`] if any length-prefixed field or trailing
/// data-pair record would run past the end of `bytes`.
pub fn read_program(bytes: &[u8]) -> Result<Program> {
    let mut cursor = 0usize;
    let count = read_u32(bytes, &mut cursor)?;
    let mut instructions = Vec::with_capacity(count as usize);
    for _ in 0..count {
        instructions.push(read_u32(bytes, &mut cursor)?);
    }
    let mut data = Vec::new();
    while cursor < bytes.len() {
        let addr = read_u32(bytes, &mut cursor)?;
        let value = read_u32(bytes, &mut cursor)? as i32;
        data.push((addr, value));
    }
    Ok(Program { instructions, data })
}

fn read_u32(bytes: &[u8], cursor: &mut usize) -> Result<u32> {
    let end = *cursor + 4;
    let chunk = bytes
        .get(*cursor..end)
        .ok_or_else(|| Error::BadFormat("word runs past end of file".into()))?;
    *cursor = end;
    Ok(u32::from_be_bytes(chunk.try_into().expect("slice of length 4")))
}

/// Write the `.hex` listing sidecar: one `"%04d - %08X - <mnemonic> [<arg>]"`
/// line per instruction.
///
/// # Errors
/// Propagates any I/O failure writing to `out`.
pub fn write_hex_listing<W: Write>(program: &Program, mut out: W) -> Result<()> {
    for (i, &word) in program.instructions.iter().enumerate() {
        let (opcode, arg) = decode_instruction(word);
        let name = Mnemonic::from_opcode(opcode).map_or("???", Mnemonic::name);
        writeln!(out, "{i:04} - {word:08X} - {name} [{arg}]")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instruction_round_trips_opcode_and_signed_argument() {
        for (opcode, arg) in [(0x02u8, -5i32), (0x0Fu8, 12345), (0x00u8, 0)] {
            let word = encode_instruction(opcode, arg).unwrap();
            assert_eq!(decode_instruction(word), (opcode, arg));
        }
    }

    #[test]
    fn argument_overflowing_27_bits_signed_is_rejected() {
        assert!(encode_instruction(0x02, 1 << 26).is_err());
        assert!(encode_instruction(0x02, -(1 << 26) - 1).is_err());
        assert!(encode_instruction(0x02, (1 << 26) - 1).is_ok());
        assert!(encode_instruction(0x02, -(1 << 26)).is_ok());
    }

    #[test]
    fn program_round_trips_through_binary_format() {
        let program = Program {
            instructions: vec![
                encode_instruction(Mnemonic::Load.opcode(), 4).unwrap(),
                encode_instruction(Mnemonic::Halt.opcode(), 0).unwrap(),
            ],
            data: vec![(4, 99), (5, -1)],
        };
        let mut bytes = Vec::new();
        write_program(&program, &mut bytes).unwrap();
        let back = read_program(&bytes).unwrap();
        assert_eq!(back.instructions, program.instructions);
        assert_eq!(back.data, program.data);
    }

    #[test]
    fn truncated_instruction_count_prefix_is_bad_format() {
        assert!(read_program(&[0, 0]).is_err());
    }

    #[test]
    fn truncated_data_pair_is_bad_format() {
        let mut bytes = vec![0, 0, 0, 0]; // zero instructions
        bytes.extend_from_slice(&4u32.to_be_bytes()); // addr
        bytes.extend_from_slice(&[0, 0]); // truncated value
        assert!(read_program(&bytes).is_err());
    }
}
