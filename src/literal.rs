//! Numeric literal parsing shared by both assembler passes.
//!
//! Recognised forms, tried in this order:
//! - anything containing `:` is a label and never a literal
//! - `'X'` character literal (ASCII code of X)
//! - hexadecimal, any token containing `H`/`h` (`0FFH`, `1234h`)
//! - octal, any token containing `O` (`377O`)
//! - binary, any token containing `B` (`1010B`)
//! - decimal
//!
//! The suffix letters are located by containment, not position, so a decimal
//! looking token with a stray `B` in it is parsed (and rejected) as binary.

use thiserror::Error;

/// Why a token did not yield a 16-bit literal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LiteralError {
    #[error("label, not a literal")]
    Label,
    #[error("malformed number")]
    Malformed,
    #[error("value {0} out of range")]
    OutOfRange(u32),
}

/// Radix of a numeric literal, picked from its suffix letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Radix {
    Binary,
    Octal,
    Decimal,
    Hexadecimal,
}

impl Radix {
    fn base(self) -> u32 {
        match self {
            Radix::Binary => 2,
            Radix::Octal => 8,
            Radix::Decimal => 10,
            Radix::Hexadecimal => 16,
        }
    }

    /// Picks the radix for a token by the documented precedence.
    pub fn classify(token: &str) -> Self {
        if token.contains(['H', 'h']) {
            Radix::Hexadecimal
        } else if token.contains('O') {
            Radix::Octal
        } else if token.contains('B') {
            Radix::Binary
        } else {
            Radix::Decimal
        }
    }
}

/// Parses a literal operand into a 16-bit value.
pub fn parse_literal(token: &str) -> Result<u16, LiteralError> {
    if token.contains(':') {
        return Err(LiteralError::Label);
    }

    if let Some(ch) = char_literal(token) {
        return if ch.is_ascii() {
            Ok(ch as u16)
        } else {
            Err(LiteralError::Malformed)
        };
    }

    let radix = Radix::classify(token);
    let digits: String = match radix {
        Radix::Hexadecimal => token.chars().filter(|c| !matches!(c, 'H' | 'h')).collect(),
        Radix::Octal => token.replace('O', ""),
        Radix::Binary => token.replace('B', ""),
        Radix::Decimal => token.to_string(),
    };

    let value = parse_digits(&digits, radix.base())?;
    u16::try_from(value).map_err(|_| LiteralError::OutOfRange(value))
}

/// Parses a literal that must fit in one byte.
pub fn parse_byte(token: &str) -> Result<u8, LiteralError> {
    let value = parse_literal(token)?;
    u8::try_from(value).map_err(|_| LiteralError::OutOfRange(value as u32))
}

/// Returns the character inside a `'X'` literal.
fn char_literal(token: &str) -> Option<char> {
    let mut chars = token.chars();
    match (chars.next(), chars.next(), chars.next(), chars.next()) {
        (Some('\''), Some(ch), Some('\''), None) => Some(ch),
        _ => None,
    }
}

/// Folds digits in `base`. A value too wide for `u32` saturates into
/// `OutOfRange` rather than reading as malformed.
fn parse_digits(digits: &str, base: u32) -> Result<u32, LiteralError> {
    if digits.is_empty() {
        return Err(LiteralError::Malformed);
    }
    let digits = digits
        .chars()
        .map(|c| c.to_digit(base).ok_or(LiteralError::Malformed))
        .collect::<Result<Vec<u32>, _>>()?;
    digits
        .into_iter()
        .try_fold(0u32, |value, digit| value.checked_mul(base)?.checked_add(digit))
        .ok_or(LiteralError::OutOfRange(u32::MAX))
}

/// Returns true if every character is a hex digit (an opcode token).
pub fn is_hex_token(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| c.is_ascii_hexdigit())
}
