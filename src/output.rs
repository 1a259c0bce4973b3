//! Output formatting for assembled code.
//!
//! [`ObjectWriter`] accumulates emitted bytes in three forms at once: the raw
//! byte image, a contiguous uppercase hex string for CPU-core loaders, and an
//! octal dump for front-panel toggling (address header every 8 bytes).
//!
//! [`Listing`] builds the human-readable listing. Every line starts with the
//! four-digit hex address, followed by a tab-indented body.
//!
//! [`decode_hex`] turns the hex string back into bytes for loaders.

use std::fmt::Write;

use thiserror::Error;

// ============================================================================
// OBJECT WRITER
// ============================================================================

/// Accumulates emitted object bytes.
#[derive(Debug, Default, Clone)]
pub struct ObjectWriter {
    hex: String,
    octal: String,
    bytes: Vec<u8>,
    /// Address the next byte is expected at, if any byte was written.
    next: Option<u32>,
}

impl ObjectWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Emits one byte at `pc`.
    ///
    /// The octal dump gets a new `\nAAA: ` header when `pc` is a multiple of
    /// 8, and also whenever the byte does not follow the previous one (the
    /// first byte, or a jump made by `ORG`).
    pub fn push(&mut self, pc: u32, byte: u8) {
        if pc % 8 == 0 || self.next != Some(pc) {
            let _ = write!(self.octal, "\n{pc:03o}: ");
        }
        let _ = write!(self.octal, "{byte:03o} ");
        let _ = write!(self.hex, "{byte:02X}");
        self.bytes.push(byte);
        self.next = Some(pc + 1);
    }

    /// Appends a trailing note to the octal dump.
    pub fn annotate_octal(&mut self, note: &str) {
        self.octal.push_str(note);
    }

    pub fn hex(&self) -> &str {
        &self.hex
    }

    pub fn octal(&self) -> &str {
        &self.octal
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Consumes the writer, returning `(hex, octal, bytes)`.
    pub fn finish(self) -> (String, String, Vec<u8>) {
        (self.hex, self.octal, self.bytes)
    }
}

// ============================================================================
// LISTING
// ============================================================================

/// Listing text builder.
#[derive(Debug, Default, Clone)]
pub struct Listing {
    text: String,
}

impl Listing {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts an entry with its address column.
    pub fn address(&mut self, pc: u32) {
        let _ = write!(self.text, "{:04X}: ", pc & 0xFFFF);
    }

    /// A label definition line.
    pub fn label(&mut self, label: &str) {
        let _ = writeln!(self.text, "\t\t\t{}", label.to_lowercase());
    }

    /// A directive line, keyword lowercase.
    pub fn directive(&mut self, keyword: &str, operand: &str) {
        let _ = writeln!(self.text, "\t\t\t\t{} {}", keyword.to_lowercase(), operand);
    }

    /// The `org` line, one tab deeper than other directives.
    pub fn org(&mut self, address: u16) {
        let _ = writeln!(self.text, "\t\t\t\t\torg {address:04X}h");
    }

    /// The closing `end` line.
    pub fn end(&mut self) {
        self.text.push_str("\t\t\t\t\tend");
    }

    /// An EQU binding.
    pub fn equ(&mut self, label: &str, value: u16) {
        let _ = writeln!(self.text, "\t\t\t{} equ {value:04X}h", label.to_lowercase());
    }

    /// An encoded instruction: bytes in hex, then mnemonic and operand.
    pub fn instruction(&mut self, encoded: &[u8], mnemonic: &str, operand: Option<&str>) {
        for byte in encoded {
            let _ = write!(self.text, "{byte:02X}");
        }
        // Pad the byte column to the width of a 3-byte instruction
        let pad = 6usize.saturating_sub(encoded.len() * 2);
        self.text.push_str(&" ".repeat(pad));
        self.text.push_str("\t\t\t");
        self.text.push_str(&mnemonic.to_lowercase());
        if let Some(operand) = operand {
            self.text.push(' ');
            self.text.push_str(operand);
        }
        self.text.push('\n');
    }

    /// Raw text, for error annotations.
    pub fn push_str(&mut self, text: &str) {
        self.text.push_str(text);
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    pub fn into_string(self) -> String {
        self.text
    }
}

/// Formats a byte operand the way the listing shows it (`05h`).
pub fn byte_operand(value: u8) -> String {
    format!("{value:02X}h")
}

/// Formats a word operand the way the listing shows it (`1234h`).
pub fn word_operand(value: u16) -> String {
    format!("{value:04X}h")
}

// ============================================================================
// HEX IMAGE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum HexError {
    #[error("hex image has odd length {0}")]
    OddLength(usize),
    #[error("invalid hex digit at offset {0}")]
    InvalidDigit(usize),
}

/// Decodes a contiguous hex string (two digits per byte) into bytes.
pub fn decode_hex(hex: &str) -> Result<Vec<u8>, HexError> {
    if hex.len() % 2 != 0 {
        return Err(HexError::OddLength(hex.len()));
    }
    hex.as_bytes()
        .chunks(2)
        .enumerate()
        .map(|(i, pair)| {
            std::str::from_utf8(pair)
                .ok()
                .filter(|digits| digits.bytes().all(|b| b.is_ascii_hexdigit()))
                .and_then(|digits| u8::from_str_radix(digits, 16).ok())
                .ok_or(HexError::InvalidDigit(i * 2))
        })
        .collect()
}
