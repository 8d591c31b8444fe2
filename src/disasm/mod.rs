// This module turns raw method code and invoke stubs into text for the archive report.
// The report only needs "disassemble these bytes, mapped at this address"; which backend
// serves the request depends on the container's instruction set. x86 and x86-64 code is
// decoded and formatted with iced-x86 (NASM syntax, one instruction per line with its
// address and encoding bytes). Every other instruction set falls back to a raw dump of
// instruction-sized words, which is still enough to line code up with the GC map and
// mapping table addresses printed above it.

//! Disassembly service used by the archive report.

use crate::container::InstructionSet;
use iced_x86::{Decoder, DecoderOptions, Formatter, Instruction, NasmFormatter};
use std::fmt::Write as _;

/// Renders a code range as text, one line per instruction, each ending in `\n`.
pub trait Disassembler {
    fn disassemble(&self, code: &[u8], address: u64) -> String;
}

/// iced-x86 backed disassembler for 32- and 64-bit x86.
#[derive(Debug, Clone, Copy)]
pub struct X86Disassembler {
    bitness: u32,
}

impl X86Disassembler {
    pub fn new(bitness: u32) -> Self {
        Self { bitness }
    }
}

impl Disassembler for X86Disassembler {
    fn disassemble(&self, code: &[u8], address: u64) -> String {
        let mut decoder = Decoder::with_ip(self.bitness, code, address, DecoderOptions::NONE);
        let mut formatter = NasmFormatter::new();
        formatter.options_mut().set_space_after_operand_separator(true);

        let mut text = String::new();
        let mut mnemonic = String::new();
        let mut instruction = Instruction::default();
        while decoder.can_decode() {
            decoder.decode_out(&mut instruction);
            mnemonic.clear();
            formatter.format(&instruction, &mut mnemonic);

            let start = (instruction.ip() - address) as usize;
            let end = (start + instruction.len()).min(code.len());
            let _ = writeln!(
                text,
                "0x{:08x}: {:<24}{}",
                instruction.ip(),
                hex_bytes(&code[start..end]),
                mnemonic
            );
        }
        text
    }
}

/// Fallback for instruction sets without a decoder: little-endian words of
/// the instruction set's minimum instruction width.
#[derive(Debug, Clone, Copy)]
pub struct RawDisassembler {
    word_size: usize,
}

impl RawDisassembler {
    pub fn new(word_size: usize) -> Self {
        Self { word_size }
    }
}

impl Disassembler for RawDisassembler {
    fn disassemble(&self, code: &[u8], address: u64) -> String {
        let mut text = String::new();
        for (i, word) in code.chunks(self.word_size).enumerate() {
            let value = word
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | b as u32);
            let _ = writeln!(
                text,
                "0x{:08x}: {:0width$x}",
                address + (i * self.word_size) as u64,
                value,
                width = word.len() * 2
            );
        }
        text
    }
}

/// Pick the disassembler for a container's instruction set.
pub fn create_disassembler(isa: InstructionSet) -> Box<dyn Disassembler> {
    match isa {
        InstructionSet::X86 => Box::new(X86Disassembler::new(32)),
        InstructionSet::X86_64 => Box::new(X86Disassembler::new(64)),
        InstructionSet::Thumb2 => Box::new(RawDisassembler::new(2)),
        InstructionSet::Arm
        | InstructionSet::Arm64
        | InstructionSet::Mips
        | InstructionSet::None => Box::new(RawDisassembler::new(4)),
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use iced_x86::code_asm::*;

    #[test]
    fn ret_disassembles() {
        let text = create_disassembler(InstructionSet::X86_64).disassemble(&[0xc3], 0x1000);
        assert_eq!(text, format!("0x00001000: {:<24}ret\n", "c3"));
    }

    #[test]
    fn assembled_prologue_round_trips() {
        let mut a = CodeAssembler::new(64).unwrap();
        a.push(rbp).unwrap();
        a.mov(rbp, rsp).unwrap();
        a.pop(rbp).unwrap();
        a.ret().unwrap();
        let code = a.assemble(0x2000).unwrap();

        let text = X86Disassembler::new(64).disassemble(&code, 0x2000);
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert!(lines[0].starts_with("0x00002000: 55"));
        assert!(lines[0].ends_with("push rbp"));
        assert!(lines[1].ends_with("mov rbp, rsp"));
        assert!(lines[3].ends_with("ret"));
    }

    #[test]
    fn x86_uses_32_bit_decoding() {
        // 0x48 is `dec eax` in 32-bit mode and a REX prefix in 64-bit mode.
        let text = create_disassembler(InstructionSet::X86).disassemble(&[0x48, 0xc3], 0);
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().unwrap().ends_with("dec eax"));
    }

    #[test]
    fn raw_dump_uses_instruction_words() {
        let text = create_disassembler(InstructionSet::Arm).disassemble(
            &[0x1e, 0xff, 0x2f, 0xe1, 0x00, 0x00],
            0x100,
        );
        assert_eq!(text, "0x00000100: e12fff1e\n0x00000104: 0000\n");

        let thumb = create_disassembler(InstructionSet::Thumb2).disassemble(&[0x70, 0x47], 0);
        assert_eq!(thumb, "0x00000000: 4770\n");
    }
}
