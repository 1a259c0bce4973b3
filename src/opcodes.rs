//! Intel 8080 Opcode Table
//!
//! A static table of all 256 opcode slots, indexed by the opcode byte. Each
//! entry carries the source mnemonic exactly as the tokenizer matches it
//! (register operands included, a trailing comma where an immediate operand
//! follows) and the encoded instruction length in bytes.
//!
//! Slots the 8080 does not define use the mnemonic `-` and length 0. They are
//! never matched against source text and never resolve through [`lookup`].

/// Mnemonic used for undefined opcode slots.
pub const INVALID_MNEMONIC: &str = "-";

/// One opcode slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    /// Source mnemonic, uppercase, e.g. `"MOV A,B"` or `"MVI B,"`.
    pub mnemonic: &'static str,
    /// Encoded length in bytes (1, 2 or 3), or 0 for an undefined slot.
    pub length: u8,
}

impl Opcode {
    const fn new(mnemonic: &'static str, length: u8) -> Self {
        Self { mnemonic, length }
    }

    /// Returns true if this slot is a real 8080 instruction.
    pub fn is_valid(&self) -> bool {
        self.length != 0
    }
}

const fn op(mnemonic: &'static str, length: u8) -> Opcode {
    Opcode::new(mnemonic, length)
}

const NONE: Opcode = Opcode::new(INVALID_MNEMONIC, 0);

// ============================================================================
// TABLE
// ============================================================================

/// The full 8080 table, index = opcode byte.
pub static OPCODES: [Opcode; 256] = [
    // 0x00
    op("NOP", 1), op("LXI B,", 3), op("STAX B", 1), op("INX B", 1),
    op("INR B", 1), op("DCR B", 1), op("MVI B,", 2), op("RLC", 1),
    NONE, op("DAD B", 1), op("LDAX B", 1), op("DCX B", 1),
    op("INR C", 1), op("DCR C", 1), op("MVI C,", 2), op("RRC", 1),
    // 0x10
    NONE, op("LXI D,", 3), op("STAX D", 1), op("INX D", 1),
    op("INR D", 1), op("DCR D", 1), op("MVI D,", 2), op("RAL", 1),
    NONE, op("DAD D", 1), op("LDAX D", 1), op("DCX D", 1),
    op("INR E", 1), op("DCR E", 1), op("MVI E,", 2), op("RAR", 1),
    // 0x20
    NONE, op("LXI H,", 3), op("SHLD", 3), op("INX H", 1),
    op("INR H", 1), op("DCR H", 1), op("MVI H,", 2), op("DAA", 1),
    NONE, op("DAD H", 1), op("LHLD", 3), op("DCX H", 1),
    op("INR L", 1), op("DCR L", 1), op("MVI L,", 2), op("CMA", 1),
    // 0x30
    NONE, op("LXI SP,", 3), op("STA", 3), op("INX SP", 1),
    op("INR M", 1), op("DCR M", 1), op("MVI M,", 2), op("STC", 1),
    NONE, op("DAD SP", 1), op("LDA", 3), op("DCX SP", 1),
    op("INR A", 1), op("DCR A", 1), op("MVI A,", 2), op("CMC", 1),
    // 0x40
    op("MOV B,B", 1), op("MOV B,C", 1), op("MOV B,D", 1), op("MOV B,E", 1),
    op("MOV B,H", 1), op("MOV B,L", 1), op("MOV B,M", 1), op("MOV B,A", 1),
    op("MOV C,B", 1), op("MOV C,C", 1), op("MOV C,D", 1), op("MOV C,E", 1),
    op("MOV C,H", 1), op("MOV C,L", 1), op("MOV C,M", 1), op("MOV C,A", 1),
    // 0x50
    op("MOV D,B", 1), op("MOV D,C", 1), op("MOV D,D", 1), op("MOV D,E", 1),
    op("MOV D,H", 1), op("MOV D,L", 1), op("MOV D,M", 1), op("MOV D,A", 1),
    op("MOV E,B", 1), op("MOV E,C", 1), op("MOV E,D", 1), op("MOV E,E", 1),
    op("MOV E,H", 1), op("MOV E,L", 1), op("MOV E,M", 1), op("MOV E,A", 1),
    // 0x60
    op("MOV H,B", 1), op("MOV H,C", 1), op("MOV H,D", 1), op("MOV H,E", 1),
    op("MOV H,H", 1), op("MOV H,L", 1), op("MOV H,M", 1), op("MOV H,A", 1),
    op("MOV L,B", 1), op("MOV L,C", 1), op("MOV L,D", 1), op("MOV L,E", 1),
    op("MOV L,H", 1), op("MOV L,L", 1), op("MOV L,M", 1), op("MOV L,A", 1),
    // 0x70
    op("MOV M,B", 1), op("MOV M,C", 1), op("MOV M,D", 1), op("MOV M,E", 1),
    op("MOV M,H", 1), op("MOV M,L", 1), op("HLT", 1), op("MOV M,A", 1),
    op("MOV A,B", 1), op("MOV A,C", 1), op("MOV A,D", 1), op("MOV A,E", 1),
    op("MOV A,H", 1), op("MOV A,L", 1), op("MOV A,M", 1), op("MOV A,A", 1),
    // 0x80
    op("ADD B", 1), op("ADD C", 1), op("ADD D", 1), op("ADD E", 1),
    op("ADD H", 1), op("ADD L", 1), op("ADD M", 1), op("ADD A", 1),
    op("ADC B", 1), op("ADC C", 1), op("ADC D", 1), op("ADC E", 1),
    op("ADC H", 1), op("ADC L", 1), op("ADC M", 1), op("ADC A", 1),
    // 0x90
    op("SUB B", 1), op("SUB C", 1), op("SUB D", 1), op("SUB E", 1),
    op("SUB H", 1), op("SUB L", 1), op("SUB M", 1), op("SUB A", 1),
    op("SBB B", 1), op("SBB C", 1), op("SBB D", 1), op("SBB E", 1),
    op("SBB H", 1), op("SBB L", 1), op("SBB M", 1), op("SBB A", 1),
    // 0xA0
    op("ANA B", 1), op("ANA C", 1), op("ANA D", 1), op("ANA E", 1),
    op("ANA H", 1), op("ANA L", 1), op("ANA M", 1), op("ANA A", 1),
    op("XRA B", 1), op("XRA C", 1), op("XRA D", 1), op("XRA E", 1),
    op("XRA H", 1), op("XRA L", 1), op("XRA M", 1), op("XRA A", 1),
    // 0xB0
    op("ORA B", 1), op("ORA C", 1), op("ORA D", 1), op("ORA E", 1),
    op("ORA H", 1), op("ORA L", 1), op("ORA M", 1), op("ORA A", 1),
    op("CMP B", 1), op("CMP C", 1), op("CMP D", 1), op("CMP E", 1),
    op("CMP H", 1), op("CMP L", 1), op("CMP M", 1), op("CMP A", 1),
    // 0xC0
    op("RNZ", 1), op("POP B", 1), op("JNZ", 3), op("JMP", 3),
    op("CNZ", 3), op("PUSH B", 1), op("ADI", 2), op("RST 0", 1),
    op("RZ", 1), op("RET", 1), op("JZ", 3), NONE,
    op("CZ", 3), op("CALL", 3), op("ACI", 2), op("RST 1", 1),
    // 0xD0
    op("RNC", 1), op("POP D", 1), op("JNC", 3), op("OUT", 2),
    op("CNC", 3), op("PUSH D", 1), op("SUI", 2), op("RST 2", 1),
    op("RC", 1), NONE, op("JC", 3), op("IN", 2),
    op("CC", 3), NONE, op("SBI", 2), op("RST 3", 1),
    // 0xE0
    op("RPO", 1), op("POP H", 1), op("JPO", 3), op("XTHL", 1),
    op("CPO", 3), op("PUSH H", 1), op("ANI", 2), op("RST 4", 1),
    op("RPE", 1), op("PCHL", 1), op("JPE", 3), op("XCHG", 1),
    op("CPE", 3), NONE, op("XRI", 2), op("RST 5", 1),
    // 0xF0
    op("RP", 1), op("POP PSW", 1), op("JP", 3), op("DI", 1),
    op("CP", 3), op("PUSH PSW", 1), op("ORI", 2), op("RST 6", 1),
    op("RM", 1), op("SPHL", 1), op("JM", 3), op("EI", 1),
    op("CM", 3), NONE, op("CPI", 2), op("RST 7", 1),
];

// ============================================================================
// LOOKUP
// ============================================================================

/// Looks up a defined instruction by index.
///
/// Indices outside 0..=255 and undefined slots both yield `None`, so a
/// malformed operand decoded as an index never panics.
pub fn lookup(index: usize) -> Option<&'static Opcode> {
    OPCODES.get(index).filter(|op| op.is_valid())
}

/// Returns the mnemonic for an opcode byte (the `-` sentinel for undefined slots).
pub fn mnemonic_for(byte: u8) -> &'static str {
    OPCODES[byte as usize].mnemonic
}

/// Returns every defined `(byte, opcode)` pair ordered longest mnemonic first.
///
/// Ties keep table order. The tokenizer relies on this ordering so that
/// `MOV A,B` wins over any shorter mnemonic sharing its prefix.
pub fn by_length_desc() -> Vec<(u8, &'static Opcode)> {
    let mut entries: Vec<(u8, &'static Opcode)> = OPCODES
        .iter()
        .enumerate()
        .filter(|(_, op)| op.is_valid())
        .map(|(i, op)| (i as u8, op))
        .collect();
    entries.sort_by(|a, b| b.1.mnemonic.len().cmp(&a.1.mnemonic.len()));
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_known_entries() {
        assert_eq!(OPCODES[0x00], Opcode { mnemonic: "NOP", length: 1 });
        assert_eq!(OPCODES[0x3E], Opcode { mnemonic: "MVI A,", length: 2 });
        assert_eq!(OPCODES[0x76], Opcode { mnemonic: "HLT", length: 1 });
        assert_eq!(OPCODES[0xC3], Opcode { mnemonic: "JMP", length: 3 });
        assert_eq!(OPCODES[0xFF], Opcode { mnemonic: "RST 7", length: 1 });
    }

    #[test]
    fn test_invalid_slots() {
        // 0x08/0x10/.../0x38, CB, D9, DD, ED, FD
        let invalid: Vec<usize> = OPCODES
            .iter()
            .enumerate()
            .filter(|(_, op)| !op.is_valid())
            .map(|(i, _)| i)
            .collect();
        assert_eq!(
            invalid,
            vec![0x08, 0x10, 0x18, 0x20, 0x28, 0x30, 0x38, 0xCB, 0xD9, 0xDD, 0xED, 0xFD]
        );
        for i in invalid {
            assert_eq!(OPCODES[i].mnemonic, INVALID_MNEMONIC);
            assert!(lookup(i).is_none());
        }
    }

    #[test]
    fn test_lookup_is_bounds_checked() {
        assert!(lookup(0x100).is_none());
        assert!(lookup(0xBEEF).is_none());
        assert_eq!(lookup(0xCD).map(|op| op.mnemonic), Some("CALL"));
    }

    #[test]
    fn test_mnemonics_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (_, op) in by_length_desc() {
            assert!(seen.insert(op.mnemonic), "duplicate mnemonic {}", op.mnemonic);
        }
        assert_eq!(seen.len(), 244);
    }

    #[test]
    fn test_by_length_desc_ordering() {
        let entries = by_length_desc();
        for pair in entries.windows(2) {
            assert!(pair[0].1.mnemonic.len() >= pair[1].1.mnemonic.len());
        }
        // No undefined slot leaks into the substitution list
        assert!(entries.iter().all(|(_, op)| op.mnemonic != INVALID_MNEMONIC));
    }

    #[test]
    fn test_mnemonic_for() {
        assert_eq!(mnemonic_for(0x21), "LXI H,");
        assert_eq!(mnemonic_for(0xCB), "-");
    }
}
