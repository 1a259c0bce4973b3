//! Two-pass assembler for the Intel 8080.
//!
//! Works on the token stream produced by [`crate::lexer::tokenize`], where
//! every mnemonic has already been replaced by its opcode byte in hex:
//!
//! - Pass 1 walks the tokens to assign addresses to labels and to account
//!   for the size of every instruction and data directive.
//! - Pass 2 walks the identical tokens again, resolves operands against the
//!   label table, emits object bytes and writes the listing.
//!
//! Both passes share one walker, so they consume tokens and advance the
//! program counter the same way by construction. Errors never stop a pass:
//! each one is written into the listing where it occurs, recorded as a
//! [`Diagnostic`] and clears the success flag. Where an erroneous statement
//! still occupies space, zero placeholder bytes are emitted so addresses
//! after it stay in step with pass 1.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use crate::lexer::Directive;
use crate::literal::{self, LiteralError};
use crate::opcodes::{self, Opcode};
use crate::output::{self, Listing, ObjectWriter};

/// Listing returned when there is nothing to assemble.
pub const NO_CODE: &str = "\n\nNo code to assemble.";

const NO_ERRORS: &str = "\n\n; No errors found.";
const LISTING_WARNING: &str = "\n\nWarning, contains error(s)";
const OCTAL_WARNING: &str = "\n\nWarning: contains error(s)";

/// One past the highest addressable byte.
const ADDRESS_LIMIT: u32 = 0x1_0000;

// ============================================================================
// ERRORS
// ============================================================================

/// Assembly errors. None of them abort assembly.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("{} is already defined.", .0.to_lowercase())]
    DuplicateLabel(String),
    #[error("Unknown opcode: {0}")]
    UnknownOpcode(String),
    #[error("Unknown instruction: {0}")]
    UnknownInstruction(String),
    #[error("No value for org.")]
    MissingOrigin,
    #[error("No count.")]
    MissingCount,
    #[error("Invalid data.")]
    InvalidData,
    #[error("No value for equ.")]
    MissingEquValue,
    #[error("No label for equ.")]
    MissingEquLabel,
    #[error("Invalid operand")]
    InvalidOperand,
    #[error("Out of range")]
    OutOfRange,
    #[error("Label not found.")]
    LabelNotFound,
    #[error("Address overflow.")]
    AddressOverflow,
}

/// An error and the address it was reported at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub address: u16,
    pub error: AsmError,
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:04X}h: {}", self.address, self.error)
    }
}

// ============================================================================
// LABEL TABLE
// ============================================================================

/// Label name (trailing `:` included) to address.
///
/// Each entry also keeps the index of the token that defined it, so a
/// lookup can be limited to labels defined earlier in the source.
#[derive(Debug, Default, Clone)]
pub struct LabelTable {
    labels: HashMap<String, (u16, usize)>,
}

impl LabelTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defines a label at token `index`. The first definition wins.
    pub fn define(&mut self, name: &str, value: u16, index: usize) -> Result<(), AsmError> {
        if self.labels.contains_key(name) {
            return Err(AsmError::DuplicateLabel(name.to_string()));
        }
        self.labels.insert(name.to_string(), (value, index));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.labels.get(name).map(|&(value, _)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.labels.contains_key(name)
    }

    /// Resolves an operand reference, which is written without the colon.
    pub fn resolve(&self, reference: &str) -> Option<u16> {
        self.entry(reference).map(|(value, _)| value)
    }

    /// Resolves a reference to a label defined before token `index`.
    ///
    /// Pass 1 has seen exactly these labels when it reaches `index`, so
    /// both passes get the same answer.
    pub fn resolve_before(&self, reference: &str, index: usize) -> Option<u16> {
        self.entry(reference)
            .filter(|&(_, defined_at)| defined_at < index)
            .map(|(value, _)| value)
    }

    fn entry(&self, reference: &str) -> Option<(u16, usize)> {
        if reference.ends_with(':') {
            self.labels.get(reference).copied()
        } else {
            self.labels.get(&format!("{reference}:")).copied()
        }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

// ============================================================================
// PASS STATE
// ============================================================================

/// Which pass is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pass {
    First,
    Second,
}

/// Program counter and token cursor of one pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PassState {
    pub pc: u32,
    pub cursor: usize,
}

impl PassState {
    fn advance(&mut self, bytes: u32) {
        self.pc = self.pc.saturating_add(bytes);
    }
}

/// Where a pass finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PassSummary {
    pub pass: Pass,
    pub end_pc: u32,
    /// Tokens walked, the `END` directive included.
    pub tokens_consumed: usize,
    /// True if the pass stopped at an `END` directive.
    pub ended: bool,
}

// ============================================================================
// RESULT
// ============================================================================

/// Everything one assembly run produces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assembly {
    /// Octal dump, 8 bytes per address-tagged line.
    pub octal: String,
    /// Annotated listing with inline errors.
    pub listing: String,
    /// Contiguous hex string of all emitted bytes.
    pub hex: String,
    /// False if any error was recorded.
    pub success: bool,
    /// Value of the first `ORG`, 0 if there was none.
    pub origin: u16,
    /// Emitted bytes in emission order.
    pub bytes: Vec<u8>,
    /// Every error, in listing order.
    pub diagnostics: Vec<Diagnostic>,
}

impl Assembly {
    fn empty() -> Self {
        Self {
            octal: String::new(),
            listing: NO_CODE.to_string(),
            hex: String::new(),
            success: true,
            origin: 0,
            bytes: Vec::new(),
            diagnostics: Vec::new(),
        }
    }

    /// Splits into `(octal, listing, hex, success, origin)`.
    pub fn into_parts(self) -> (String, String, String, bool, u16) {
        (self.octal, self.listing, self.hex, self.success, self.origin)
    }

    /// True if nothing was emitted.
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

// ============================================================================
// DATA OPERANDS
// ============================================================================

/// Splits a `DB`/`DW` operand on commas outside quotes.
fn split_values(list: &str) -> Vec<&str> {
    let mut values = Vec::new();
    let mut in_string = false;
    let mut start = 0;

    for (i, c) in list.char_indices() {
        match c {
            '\'' => in_string = !in_string,
            ',' if !in_string => {
                let value = list[start..i].trim();
                if !value.is_empty() {
                    values.push(value);
                }
                start = i + 1;
            }
            _ => {}
        }
    }

    let value = list[start..].trim();
    if !value.is_empty() {
        values.push(value);
    }
    values
}

fn quoted_body(value: &str) -> Option<&str> {
    if value.len() >= 2 && value.starts_with('\'') && value.ends_with('\'') {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

/// Bytes a `DB` operand occupies: one per string character, one per value.
fn db_span(list: &str) -> u32 {
    split_values(list)
        .iter()
        .map(|v| quoted_body(v).map_or(1, |body| body.chars().count() as u32))
        .sum()
}

/// Decodes a `DB` operand into bytes and the listing rendition of each value.
fn parse_db(list: &str, labels: &LabelTable) -> Result<(Vec<u8>, Vec<String>), AsmError> {
    let mut bytes = Vec::new();
    let mut parts = Vec::new();

    for value in split_values(list) {
        if let Some(body) = quoted_body(value) {
            if body.is_empty() {
                continue;
            }
            if !body.is_ascii() {
                return Err(AsmError::InvalidData);
            }
            bytes.extend(body.bytes());
            parts.push(format!("'{body}'"));
        } else {
            let (byte, shown) = byte_value(value, labels).map_err(|_| AsmError::InvalidData)?;
            bytes.push(byte);
            parts.push(shown);
        }
    }

    if bytes.is_empty() {
        return Err(AsmError::InvalidData);
    }
    Ok((bytes, parts))
}

/// Resolves an 8-bit operand: a label first, then a literal.
///
/// Returns the value and how the listing shows it.
fn byte_value(operand: &str, labels: &LabelTable) -> Result<(u8, String), LiteralError> {
    match labels.resolve(operand) {
        Some(value) => {
            let byte = u8::try_from(value).map_err(|_| LiteralError::OutOfRange(value as u32))?;
            Ok((byte, operand.trim_end_matches(':').to_lowercase()))
        }
        None => literal::parse_byte(operand).map(|byte| (byte, output::byte_operand(byte))),
    }
}

fn is_label_definition(token: &str) -> bool {
    token.ends_with(':') && !token.starts_with('\'')
}

// ============================================================================
// ASSEMBLER
// ============================================================================

/// Two-pass 8080 assembler.
///
/// All state is reset at the start of every [`Assembler::assemble`] call. The
/// label table and pass summaries of the last run stay readable afterwards.
#[derive(Debug, Default)]
pub struct Assembler {
    labels: LabelTable,
    origin: Option<u16>,
    object: ObjectWriter,
    listing: Listing,
    diagnostics: Vec<Diagnostic>,
    /// Token indices of label definitions that repeat an earlier one.
    duplicates: HashSet<usize>,
    summaries: Vec<PassSummary>,
    overflow_reported: bool,
}

impl Assembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label table of the last run.
    pub fn labels(&self) -> &LabelTable {
        &self.labels
    }

    /// End state of each pass of the last run.
    pub fn pass_summaries(&self) -> &[PassSummary] {
        &self.summaries
    }

    fn reset(&mut self) {
        *self = Self::default();
    }

    /// Assembles a token stream.
    pub fn assemble(&mut self, tokens: &[String]) -> Assembly {
        self.reset();

        if tokens.is_empty() {
            tracing::debug!("no tokens, nothing to assemble");
            return Assembly::empty();
        }

        tracing::trace!("starting pass 1");
        let first = self.run_pass(Pass::First, tokens);
        self.summaries.push(first);
        tracing::debug!(labels = self.labels.len(), end_pc = first.end_pc, "pass 1 done");

        tracing::trace!("starting pass 2");
        let second = self.run_pass(Pass::Second, tokens);
        self.summaries.push(second);
        tracing::debug!(
            bytes = self.object.len(),
            errors = self.diagnostics.len(),
            end_pc = second.end_pc,
            "pass 2 done"
        );

        self.finish()
    }

    fn finish(&mut self) -> Assembly {
        let success = self.diagnostics.is_empty();
        let mut listing = std::mem::take(&mut self.listing);
        let mut object = std::mem::take(&mut self.object);

        if success {
            listing.push_str(NO_ERRORS);
        } else {
            listing.push_str(LISTING_WARNING);
            object.annotate_octal(OCTAL_WARNING);
        }

        let (hex, octal, bytes) = object.finish();
        Assembly {
            octal,
            listing: listing.into_string(),
            hex,
            success,
            origin: self.origin.unwrap_or(0),
            bytes,
            diagnostics: std::mem::take(&mut self.diagnostics),
        }
    }

    fn fail(&mut self, pc: u32, error: AsmError) {
        tracing::debug!(address = pc, %error, "assembly error");
        self.diagnostics.push(Diagnostic {
            address: pc as u16,
            error,
        });
    }

    fn emit(&mut self, pc: u32, byte: u8) {
        self.object.push(pc, byte);
    }

    fn run_pass(&mut self, pass: Pass, tokens: &[String]) -> PassSummary {
        let mut state = PassState::default();
        let mut ended = false;

        while state.cursor < tokens.len() {
            let token = tokens[state.cursor].as_str();
            let next_is_equ = tokens
                .get(state.cursor + 1)
                .is_some_and(|t| Directive::from_token(t) == Some(Directive::Equ));

            if pass == Pass::Second {
                self.listing.address(state.pc);
            }

            if is_label_definition(token) || (next_is_equ && !token.starts_with('\'')) {
                self.label(pass, &mut state, tokens, next_is_equ);
            } else {
                match Directive::from_token(token) {
                    Some(Directive::End) => {
                        if pass == Pass::Second {
                            self.listing.end();
                        }
                        ended = true;
                        state.cursor += 1;
                        break;
                    }
                    Some(Directive::Org) => self.org(pass, &mut state, tokens),
                    Some(Directive::Db) => self.db(pass, &mut state, tokens),
                    Some(Directive::Ds) => self.ds(pass, &mut state, tokens),
                    Some(Directive::Dw) => self.dw(pass, &mut state, tokens),
                    Some(Directive::Equ) => self.stray_equ(pass, &mut state, tokens),
                    None => self.instruction(pass, &mut state, tokens),
                }
            }

            if pass == Pass::Second && state.pc > ADDRESS_LIMIT && !self.overflow_reported {
                self.overflow_reported = true;
                self.listing.push_str("Error. Address overflow.\n");
                self.fail(state.pc, AsmError::AddressOverflow);
            }
        }

        PassSummary {
            pass,
            end_pc: state.pc,
            tokens_consumed: state.cursor.min(tokens.len()),
            ended,
        }
    }

    // ------------------------------------------------------------------------
    // Labels
    // ------------------------------------------------------------------------

    /// A label definition, optionally bound by a following `EQU`.
    fn label(&mut self, pass: Pass, state: &mut PassState, tokens: &[String], equ: bool) {
        let index = state.cursor;
        let token = tokens[index].as_str();
        let name = if token.ends_with(':') {
            token.to_string()
        } else {
            format!("{token}:")
        };
        state.cursor += 1;

        let equ_value = if equ {
            // Skip EQU, then take its operand
            state.cursor += 1;
            let operand = tokens.get(state.cursor);
            if operand.is_some() {
                state.cursor += 1;
            }
            Some(operand.and_then(|t| self.value_before(t, index).ok()))
        } else {
            None
        };

        match pass {
            Pass::First => {
                let value = match equ_value {
                    Some(Some(value)) => value,
                    Some(None) => {
                        if self.labels.contains(&name) {
                            self.duplicates.insert(index);
                        }
                        return;
                    }
                    None => state.pc as u16,
                };
                if let Err(error) = self.labels.define(&name, value, index) {
                    tracing::trace!(%error, index, "label not redefined");
                    self.duplicates.insert(index);
                }
            }
            Pass::Second => {
                if self.duplicates.contains(&index) {
                    let error = AsmError::DuplicateLabel(name);
                    self.listing.push_str(&format!("\t\t\t Error: {error}\n"));
                    self.fail(state.pc, error);
                    return;
                }
                match equ_value {
                    None => self.listing.label(&name),
                    Some(Some(value)) => self.listing.equ(&name, value),
                    Some(None) => {
                        let error = AsmError::MissingEquValue;
                        self.listing.push_str(&format!(
                            "\t\t\t{} equ ???? Error. {error}\n",
                            name.to_lowercase()
                        ));
                        self.fail(state.pc, error);
                    }
                }
            }
        }
    }

    /// `EQU` with no name in front of it.
    fn stray_equ(&mut self, pass: Pass, state: &mut PassState, tokens: &[String]) {
        state.cursor += 1;
        if state.cursor < tokens.len() {
            state.cursor += 1;
        }
        if pass == Pass::Second {
            let error = AsmError::MissingEquLabel;
            self.listing.push_str(&format!("\t\t\t\tequ ???? Error. {error}\n"));
            self.fail(state.pc, error);
        }
    }

    // ------------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------------

    /// Takes the directive's operand token, if there is one.
    fn directive_operand<'t>(state: &mut PassState, tokens: &'t [String]) -> Option<&'t str> {
        state.cursor += 1;
        let operand = tokens.get(state.cursor).map(String::as_str);
        if operand.is_some() {
            state.cursor += 1;
        }
        operand
    }

    fn org(&mut self, pass: Pass, state: &mut PassState, tokens: &[String]) {
        let index = state.cursor;
        let operand = Self::directive_operand(state, tokens);
        match operand.map(|t| self.value_before(t, index)) {
            Some(Ok(address)) => {
                state.pc = address as u32;
                if pass == Pass::First && self.origin.is_none() {
                    self.origin = Some(address);
                }
                if pass == Pass::Second {
                    self.listing.org(address);
                }
            }
            _ => {
                if pass == Pass::Second {
                    let error = AsmError::MissingOrigin;
                    self.listing
                        .push_str(&format!("\t\t\t\torg ???? Error. {error}\n"));
                    self.fail(state.pc, error);
                }
            }
        }
    }

    fn db(&mut self, pass: Pass, state: &mut PassState, tokens: &[String]) {
        let operand = Self::directive_operand(state, tokens);
        let span = operand.map_or(0, db_span);

        if pass == Pass::Second {
            let start = state.pc;
            let decoded = operand
                .ok_or(AsmError::InvalidData)
                .and_then(|list| parse_db(list, &self.labels));
            match decoded {
                Ok((bytes, parts)) => {
                    self.listing.directive("db", &parts.join(", "));
                    for (offset, byte) in (0u32..).zip(bytes) {
                        self.emit(start + offset, byte);
                    }
                }
                Err(error) => {
                    self.listing
                        .push_str(&format!("\t\t\t\tdb ???? Error. {error}\n"));
                    self.fail(start, error);
                    for offset in 0..span {
                        self.emit(start + offset, 0);
                    }
                }
            }
        }

        state.advance(span);
    }

    fn ds(&mut self, pass: Pass, state: &mut PassState, tokens: &[String]) {
        let index = state.cursor;
        let operand = Self::directive_operand(state, tokens);
        match operand.map(|t| self.value_before(t, index)) {
            Some(Ok(count)) => {
                if pass == Pass::Second {
                    self.listing.directive("ds", &count.to_string());
                    for offset in 0..count as u32 {
                        self.emit(state.pc + offset, 0);
                    }
                }
                state.advance(count as u32);
            }
            _ => {
                if pass == Pass::Second {
                    let error = AsmError::MissingCount;
                    self.listing
                        .push_str(&format!("\t\t\t\tds ???? Error. {error}\n"));
                    self.fail(state.pc, error);
                }
            }
        }
    }

    fn dw(&mut self, pass: Pass, state: &mut PassState, tokens: &[String]) {
        let operand = Self::directive_operand(state, tokens);
        let values = operand.map(split_values).unwrap_or_default();
        let span = 2 * values.len() as u32;

        if pass == Pass::Second {
            let start = state.pc;
            let words: Result<Vec<(u16, String)>, AsmError> = values
                .iter()
                .map(|value| self.resolve_word(value))
                .collect();
            match words {
                Ok(words) if !words.is_empty() => {
                    let parts: Vec<&str> = words.iter().map(|(_, shown)| shown.as_str()).collect();
                    self.listing.directive("dw", &parts.join(", "));
                    let mut pc = start;
                    for (word, _) in &words {
                        let [low, high] = word.to_le_bytes();
                        self.emit(pc, low);
                        self.emit(pc + 1, high);
                        pc += 2;
                    }
                }
                _ => {
                    let error = AsmError::InvalidData;
                    self.listing
                        .push_str(&format!("\t\t\t\tdw ???? Error. {error}\n"));
                    self.fail(start, error);
                    for offset in 0..span {
                        self.emit(start + offset, 0);
                    }
                }
            }
        }

        state.advance(span);
    }

    /// Value of an `ORG`, `DS` or `EQU` operand at token `index`.
    ///
    /// These operands decide addresses during pass 1, so only labels
    /// defined at an earlier token are visible to them.
    fn value_before(&self, operand: &str, index: usize) -> Result<u16, LiteralError> {
        match self.labels.resolve_before(operand, index) {
            Some(value) => Ok(value),
            None => literal::parse_literal(operand),
        }
    }

    /// Resolves a 16-bit operand: a label first, then a literal.
    ///
    /// Returns the value and how the listing shows it.
    fn resolve_word(&self, operand: &str) -> Result<(u16, String), AsmError> {
        if let Some(address) = self.labels.resolve(operand) {
            return Ok((address, operand.trim_end_matches(':').to_lowercase()));
        }
        match literal::parse_literal(operand) {
            Ok(value) => Ok((value, output::word_operand(value))),
            Err(LiteralError::OutOfRange(_)) => Err(AsmError::OutOfRange),
            Err(_) => Err(AsmError::LabelNotFound),
        }
    }

    // ------------------------------------------------------------------------
    // Instructions
    // ------------------------------------------------------------------------

    fn instruction(&mut self, pass: Pass, state: &mut PassState, tokens: &[String]) {
        let token = tokens[state.cursor].as_str();

        let opcode = if literal::is_hex_token(token) {
            u32::from_str_radix(token, 16)
                .ok()
                .and_then(|value| opcodes::lookup(value as usize).map(|op| (value as u8, op)))
        } else {
            if pass == Pass::Second {
                if self.labels.resolve(token).is_some() {
                    self.listing.label(token);
                } else {
                    let error = AsmError::UnknownOpcode(token.to_string());
                    self.listing.push_str(&format!("Error. {error}\n"));
                    self.fail(state.pc, error);
                }
            }
            state.cursor += 1;
            return;
        };

        let Some((byte, op)) = opcode else {
            if pass == Pass::Second {
                let error = AsmError::UnknownInstruction(token.to_string());
                self.listing.push_str(&format!("Error. {error}\n"));
                self.fail(state.pc, error);
            }
            state.cursor += 1;
            return;
        };

        let operand = tokens.get(state.cursor + 1).map(String::as_str);
        match op.length {
            1 => {
                if pass == Pass::Second {
                    self.emit(state.pc, byte);
                    self.listing.instruction(&[byte], op.mnemonic, None);
                }
                state.cursor += 1;
                state.advance(1);
            }
            2 => {
                if pass == Pass::Second {
                    self.byte_instruction(state.pc, byte, op, operand);
                }
                state.cursor += 2;
                state.advance(2);
            }
            _ => {
                if pass == Pass::Second {
                    self.word_instruction(state.pc, byte, op, operand);
                }
                state.cursor += 2;
                state.advance(3);
            }
        }
    }

    /// Emits an instruction with an 8-bit immediate operand.
    fn byte_instruction(&mut self, pc: u32, byte: u8, op: &Opcode, operand: Option<&str>) {
        self.emit(pc, byte);
        let value = operand
            .ok_or(AsmError::InvalidOperand)
            .and_then(|t| match byte_value(t, &self.labels) {
                Ok(value) => Ok(value),
                Err(LiteralError::OutOfRange(_)) => Err(AsmError::OutOfRange),
                Err(_) => Err(AsmError::InvalidOperand),
            });

        match value {
            Ok((value, shown)) => {
                self.emit(pc + 1, value);
                self.listing
                    .instruction(&[byte, value], op.mnemonic, Some(&shown));
            }
            Err(error) => {
                self.emit(pc + 1, 0);
                self.listing.push_str(&format!(
                    "{byte:02X}??  \t\t\t Error: {error} {}\n",
                    op.mnemonic.to_lowercase()
                ));
                self.fail(pc, error);
            }
        }
    }

    /// Emits an instruction with a 16-bit address or immediate operand,
    /// low byte first.
    fn word_instruction(&mut self, pc: u32, byte: u8, op: &Opcode, operand: Option<&str>) {
        self.emit(pc, byte);
        let resolved = operand
            .ok_or(AsmError::LabelNotFound)
            .and_then(|t| self.resolve_word(t));

        match resolved {
            Ok((value, shown)) => {
                let [low, high] = value.to_le_bytes();
                self.emit(pc + 1, low);
                self.emit(pc + 2, high);
                self.listing
                    .instruction(&[byte, low, high], op.mnemonic, Some(&shown));
            }
            Err(error) => {
                self.emit(pc + 1, 0);
                self.emit(pc + 2, 0);
                self.listing.push_str(&format!(
                    "{byte:02X}?? ?? \t\t\t{}????\n Error: {error}\n",
                    op.mnemonic.to_lowercase()
                ));
                self.fail(pc, error);
            }
        }
    }
}

/// Assembles a token stream with a fresh assembler.
pub fn assemble(tokens: &[String]) -> Assembly {
    Assembler::new().assemble(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;
    use rand::{Rng, SeedableRng};

    fn asm(source: &str) -> Assembly {
        assemble(&tokenize(source))
    }

    fn tokens(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    // ------------------------------------------------------------------------
    // Basic encoding
    // ------------------------------------------------------------------------

    #[test]
    fn test_immediate_and_halt() {
        let out = asm("MVI A,05H\nHLT\nEND");
        assert!(out.success);
        assert_eq!(out.origin, 0);
        assert_eq!(out.hex, "3E0576");
        assert_eq!(out.bytes, vec![0x3E, 0x05, 0x76]);
        assert_eq!(out.octal, "\n000: 076 005 166 ");
    }

    #[test]
    fn test_org_and_word_operand() {
        let out = asm("ORG 100H\nLDA 1234H\nEND");
        assert!(out.success);
        assert_eq!(out.origin, 0x0100);
        assert_eq!(out.hex, "3A3412");
    }

    #[test]
    fn test_forward_label_reference() {
        let out = asm("JMP target\ntarget:\nHLT\nEND");
        assert!(out.success, "{}", out.listing);
        assert_eq!(out.hex, "C3030076");
    }

    #[test]
    fn test_backward_label_reference() {
        let mut assembler = Assembler::new();
        let out = assembler.assemble(&tokenize("ORG 10H\nloop: NOP\nJNZ loop\nEND"));
        assert!(out.success);
        assert_eq!(out.hex, "00C21000");
        assert_eq!(assembler.labels().get("LOOP:"), Some(0x10));
    }

    #[test]
    fn test_all_lengths_listing() {
        let out = asm("MVI B,0AH\nMOV A,B\nLXI H,0200H\nEND");
        assert!(out.success);
        assert_eq!(
            out.listing,
            "0000: 060A  \t\t\tmvi b, 0Ah\n\
             0002: 78    \t\t\tmov a,b\n\
             0003: 210002\t\t\tlxi h, 0200h\n\
             0006: \t\t\t\t\tend\n\n; No errors found."
        );
    }

    #[test]
    fn test_label_operand_listing() {
        let out = asm("start: JMP start\nEND");
        assert!(out.listing.contains("0000: \t\t\tstart:\n"));
        assert!(out.listing.contains("0000: C30000\t\t\tjmp start\n"));
    }

    #[test]
    fn test_no_end_directive() {
        let out = asm("NOP");
        assert!(out.success);
        assert_eq!(out.hex, "00");
        assert!(out.listing.ends_with("\t\t\tnop\n\n\n; No errors found."));
    }

    #[test]
    fn test_tokens_after_end_ignored() {
        let out = asm("NOP\nEND\nHLT\nbogus");
        assert!(out.success);
        assert_eq!(out.hex, "00");
    }

    // ------------------------------------------------------------------------
    // Directives
    // ------------------------------------------------------------------------

    #[test]
    fn test_db_mixed_values() {
        let out = asm("DB 'AB',41H\nEND");
        assert!(out.success);
        assert_eq!(out.bytes, vec![b'A', b'B', 0x41]);
        assert_eq!(out.hex, "414241");
        assert_eq!(out.octal, "\n000: 101 102 101 ");
        assert!(out.listing.contains("\t\t\t\tdb 'AB', 41h\n"));
    }

    #[test]
    fn test_db_string_kept_verbatim() {
        let out = asm("DB 'Hello, World'\nEND");
        assert!(out.success);
        assert!(out.listing.contains("'Hello, World'"));
        assert_eq!(out.bytes, b"Hello, World".to_vec());
    }

    #[test]
    fn test_db_advances_labels() {
        let out = asm("DB 1,2,3\nafter: HLT\nJMP after\nEND");
        assert!(out.success);
        assert_eq!(out.hex, "01020376C30300");
    }

    #[test]
    fn test_db_errors() {
        for source in ["DB\nEND", "DB 100H\nEND", "DB ''\nEND", "DB BAD\nEND"] {
            let out = asm(source);
            assert!(!out.success, "{source}");
            assert!(out.listing.contains("db ???? Error. Invalid data."), "{source}");
        }
    }

    #[test]
    fn test_db_error_keeps_addresses() {
        // The bad value still occupies its byte, so the label lands at 2
        let out = asm("DB 1,300\nhere: JMP here\nEND");
        assert!(!out.success);
        assert_eq!(out.hex, "0000C30200");
    }

    #[test]
    fn test_ds_reserves_zeroes() {
        let out = asm("DS 3\nnext: JMP next\nEND");
        assert!(out.success);
        assert_eq!(out.hex, "000000C30300");
        assert!(out.listing.contains("\t\t\t\tds 3\n"));
    }

    #[test]
    fn test_ds_missing_count() {
        let out = asm("DS\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("ds ???? Error. No count."));
    }

    #[test]
    fn test_org_missing_value() {
        let out = asm("ORG\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("org ???? Error. No value for org."));
        assert_eq!(out.origin, 0);
    }

    #[test]
    fn test_first_org_is_origin() {
        let out = asm("ORG 200H\nNOP\nORG 300H\nNOP\nEND");
        assert!(out.success);
        assert_eq!(out.origin, 0x200);
        assert!(out.listing.contains("0301: \t\t\t\t\tend"));
        assert_eq!(out.octal, "\n1000: 000 \n1400: 000 ");
    }

    #[test]
    fn test_dw_words() {
        let out = asm("ORG 10H\nvec: DW 1234H,vec\nEND");
        assert!(out.success, "{}", out.listing);
        assert_eq!(out.hex, "34121000");
        assert!(out.listing.contains("\t\t\t\tdw 1234h, vec\n"));
    }

    #[test]
    fn test_equ_binds_value() {
        let out = asm("COUNT EQU 0AH\nport: equ 10h\nMVI B,COUNT\nLXI H,COUNT\nOUT port\nLDA port\nEND");
        assert!(out.success, "{}", out.listing);
        assert_eq!(out.hex, "060A210A00D3103A1000");
        assert!(out.listing.contains("count: equ 000Ah"));
        assert!(out.listing.contains("060A  \t\t\tmvi b, count\n"));
        assert!(out.listing.contains("D310  \t\t\tout port\n"));
    }

    #[test]
    fn test_equ_in_byte_operands() {
        let out = asm("PORT EQU 10H\nOUT PORT\nEND");
        assert!(out.success, "{}", out.listing);
        assert_eq!(out.hex, "D310");

        let out = asm("CR EQU 0DH\nDB CR,0AH\nMVI A,CR\nEND");
        assert!(out.success, "{}", out.listing);
        assert_eq!(out.bytes, vec![0x0D, 0x0A, 0x3E, 0x0D]);
        assert!(out.listing.contains("\t\t\t\tdb cr, 0Ah\n"));
    }

    #[test]
    fn test_equ_too_wide_for_byte() {
        let out = asm("BIG EQU 100H\nMVI A,BIG\nDB BIG\nEND");
        assert!(!out.success);
        let kinds: Vec<&AsmError> = out.diagnostics.iter().map(|d| &d.error).collect();
        assert_eq!(kinds, vec![&AsmError::OutOfRange, &AsmError::InvalidData]);
        assert_eq!(out.hex, "3E0000");
    }

    #[test]
    fn test_equ_sizes_ds_and_org() {
        let out = asm("N EQU 3\nBASE EQU 100H\nORG BASE\nDS N\nhere: JMP here\nEND");
        assert!(out.success, "{}", out.listing);
        assert_eq!(out.origin, 0x100);
        assert_eq!(out.hex, "000000C30301");
        assert!(out.listing.contains("\t\t\t\tds 3\n"));

        // One EQU may name another defined above it
        let out = asm("SIZE EQU 4\nSPAN EQU SIZE\nDS SPAN\nEND");
        assert!(out.success, "{}", out.listing);
        assert!(out.listing.contains("span: equ 0004h"));
        assert_eq!(out.hex, "00000000");
    }

    #[test]
    fn test_forward_equ_cannot_size() {
        let source = "DS N\nN EQU 3\nafter: JMP after\nEND";
        let mut assembler = Assembler::new();
        let out = assembler.assemble(&tokenize(source));
        assert!(!out.success);
        assert!(out.listing.contains("ds ???? Error. No count."));
        // DS reserved nothing in either pass
        assert_eq!(out.hex, "C30000");
        let summaries = assembler.pass_summaries();
        assert_eq!(summaries[0].end_pc, summaries[1].end_pc);

        let out = asm("ORG START\nSTART EQU 100H\nNOP\nEND");
        assert!(!out.success);
        assert_eq!(out.diagnostics[0].error, AsmError::MissingOrigin);
        assert_eq!(out.origin, 0);

        // A label cannot be its own value
        let out = asm("SELF EQU SELF\nEND");
        assert_eq!(out.diagnostics[0].error, AsmError::MissingEquValue);
    }

    #[test]
    fn test_label_table_resolve_before() {
        let mut labels = LabelTable::new();
        assert_eq!(labels.define("N:", 3, 5), Ok(()));
        assert_eq!(
            labels.define("N:", 4, 9),
            Err(AsmError::DuplicateLabel("N:".to_string()))
        );
        assert_eq!(labels.resolve("N"), Some(3));
        assert_eq!(labels.resolve_before("N", 5), None);
        assert_eq!(labels.resolve_before("N", 6), Some(3));
        assert_eq!(labels.resolve_before("M", 99), None);
    }

    #[test]
    fn test_equ_without_value_or_label() {
        let out = asm("COUNT EQU\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("equ ???? Error. No value for equ."));

        let out = asm("EQU 5\nNOP\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("equ ???? Error. No label for equ."));
        assert_eq!(out.hex, "00");
    }

    // ------------------------------------------------------------------------
    // Errors
    // ------------------------------------------------------------------------

    #[test]
    fn test_duplicate_label() {
        let out = asm("foo: HLT\nfoo: HLT\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("foo: is already defined."));
        assert_eq!(
            out.diagnostics,
            vec![Diagnostic {
                address: 1,
                error: AsmError::DuplicateLabel("FOO:".to_string())
            }]
        );
        assert!(out.listing.ends_with("\n\nWarning, contains error(s)"));
        assert!(out.octal.ends_with("\n\nWarning: contains error(s)"));
    }

    #[test]
    fn test_duplicate_equ() {
        let out = asm("X EQU 1\nX EQU 2\nLXI H,X\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("x: is already defined."));
        assert_eq!(out.hex, "210100");

        let out = asm("X: NOP\nX EQU\nEND");
        assert_eq!(
            out.diagnostics[0].error,
            AsmError::DuplicateLabel("X:".to_string())
        );
    }

    #[test]
    fn test_duplicate_label_first_definition_wins() {
        let out = asm("foo: NOP\nfoo: NOP\nJMP foo\nEND");
        assert!(!out.success);
        assert_eq!(out.hex, "0000C30000");
    }

    #[test]
    fn test_unknown_opcode() {
        let out = asm("NOP\nFROB\nHLT\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("Error. Unknown opcode: FROB\n"));
        // Assembly carried on past the error
        assert_eq!(out.hex, "0076");
    }

    #[test]
    fn test_unknown_instruction_hex() {
        // ADD with a bad register is valid hex but not an opcode
        let out = asm("ADD X\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("Error. Unknown instruction: ADD"));

        let out = assemble(&tokens(&["08", "76"]));
        assert!(!out.success);
        assert!(out.listing.contains("Error. Unknown instruction: 08"));
        assert_eq!(out.hex, "76");
    }

    #[test]
    fn test_directive_that_looks_like_hex() {
        // DB is valid hex (IN) but must be treated as the directive
        let out = assemble(&tokens(&["DB", "5", "END"]));
        assert!(out.success);
        assert_eq!(out.hex, "05");
    }

    #[test]
    fn test_label_not_found() {
        let out = asm("JMP nowhere\nHLT\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("C3?? ?? \t\t\tjmp????\n Error: Label not found.\n"));
        // Placeholder keeps HLT at address 3
        assert_eq!(out.hex, "C3000076");
        assert_eq!(out.diagnostics[0].error, AsmError::LabelNotFound);
    }

    #[test]
    fn test_word_out_of_range() {
        let out = asm("LXI H,70000\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("Error: Out of range"));

        // Too wide even for the accumulator
        let out = asm("LXI H,99999999999\nEND");
        assert_eq!(out.diagnostics[0].error, AsmError::OutOfRange);
        assert!(out.listing.contains("Error: Out of range"));
    }

    #[test]
    fn test_byte_operand_errors() {
        let out = asm("MVI A,100H\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("3E??  \t\t\t Error: Out of range mvi a,\n"));
        assert_eq!(out.hex, "3E00");

        let out = asm("ADI\n");
        assert!(!out.success);
        assert_eq!(out.diagnostics[0].error, AsmError::InvalidOperand);
    }

    #[test]
    fn test_missing_word_operand_at_end() {
        let out = asm("JMP");
        assert!(!out.success);
        assert_eq!(out.hex, "C30000");
    }

    #[test]
    fn test_all_errors_reported_in_one_run() {
        let out = asm("FROB\nJMP nowhere\nMVI A,999\nORG\nEND");
        assert!(!out.success);
        assert_eq!(out.diagnostics.len(), 4);
    }

    #[test]
    fn test_address_overflow() {
        let out = asm("ORG 0FFFFH\nNOP\nNOP\nEND");
        assert!(!out.success);
        assert!(out.listing.contains("Error. Address overflow."));
        assert_eq!(out.diagnostics.len(), 1);
    }

    // ------------------------------------------------------------------------
    // Properties
    // ------------------------------------------------------------------------

    #[test]
    fn test_empty_input() {
        let out = assemble(&[]);
        assert_eq!(out.listing, "\n\nNo code to assemble.");
        assert_eq!(out.hex, "");
        assert_eq!(out.octal, "");
        assert_eq!(out.origin, 0);
        assert!(out.success);
        assert!(out.is_empty());
    }

    #[test]
    fn test_deterministic() {
        let source = "ORG 100H\nstart: MVI C,'x'\nCALL sub\nJMP start\nsub: RET\nDB 'ok',0\nEND";
        let mut assembler = Assembler::new();
        let a = assembler.assemble(&tokenize(source));
        let b = assembler.assemble(&tokenize(source));
        assert_eq!(a, b);
        assert_eq!(a.clone().into_parts(), b.into_parts());
    }

    #[test]
    fn test_label_table_reset_between_runs() {
        let mut assembler = Assembler::new();
        assembler.assemble(&tokenize("first: NOP\nEND"));
        assert!(assembler.labels().contains("FIRST:"));

        let out = assembler.assemble(&tokenize("JMP first\nEND"));
        assert!(!out.success);
        assert!(assembler.labels().is_empty());
    }

    #[test]
    fn test_pass_agreement() {
        let sources = [
            "ORG 100H\nMVI A,1\nloop: DCR A\nJNZ loop\nDB 'abc',1\nDS 4\nDW loop\nHLT\nEND",
            "JMP nowhere\nDB 1,999\nMVI A\n",
            "foo: NOP\nfoo: NOP\nORG\nDS\nFROB\n08\nEND",
        ];
        for source in sources {
            let mut assembler = Assembler::new();
            assembler.assemble(&tokenize(source));
            let summaries = assembler.pass_summaries();
            assert_eq!(summaries.len(), 2);
            assert_eq!(summaries[0].pass, Pass::First);
            assert_eq!(summaries[1].pass, Pass::Second);
            assert_eq!(summaries[0].end_pc, summaries[1].end_pc, "{source}");
            assert_eq!(summaries[0].ended, summaries[1].ended);
            assert_eq!(summaries[0].tokens_consumed, summaries[1].tokens_consumed);
        }
    }

    #[test]
    fn test_garbage_terminates() {
        let garbage: Vec<Vec<String>> = vec![
            tokens(&["ORG"]),
            tokens(&["DB"]),
            tokens(&["DS", "DS", "DS"]),
            tokens(&["C3"]),
            tokens(&["3E"]),
            tokens(&["EQU"]),
            tokens(&["X:", "X:", "X:", "EQU"]),
            tokens(&["FFFF", "CB", "'", "'a:b'", ":", ",", "EQU", "EQU"]),
            tokens(&["ORG", "0FFFFH", "DS", "0FFFFH", "DS", "0FFFFH", "DW", "1,2,3"]),
        ];
        for list in garbage {
            let out = assemble(&list);
            assert!(out.listing.contains("Warning") || out.success, "{list:?}");
        }
    }

    #[test]
    fn test_random_token_streams_terminate() {
        const POOL: &[&str] = &[
            "ORG", "END", "DB", "DS", "DW", "EQU", "L1:", "L1", "L2:", "L2", "N", "0FFFFH",
            "300", "'a,b'", "''", "'", ":", ",", "1,2", "FROB", "10H", "N:", "0DB",
        ];
        let seed = 0x8080_c0de_0000_0001_u64.to_le_bytes();
        let mut random = rand_xoshiro::Xoroshiro64Star::from_seed(seed);

        for _ in 0..500 {
            let len = random.gen_range(0, 24);
            let list: Vec<String> = (0..len)
                .map(|_| {
                    if random.gen::<bool>() {
                        // Opcode bytes, defined or not
                        format!("{:02X}", random.gen::<u8>())
                    } else {
                        POOL[random.gen_range(0, POOL.len())].to_string()
                    }
                })
                .collect();

            let mut assembler = Assembler::new();
            let out = assembler.assemble(&list);
            assert!(out.success || !out.diagnostics.is_empty(), "{list:?}");
            if let [first, second] = assembler.pass_summaries() {
                assert_eq!(first.end_pc, second.end_pc, "{list:?}");
                assert_eq!(first.tokens_consumed, second.tokens_consumed, "{list:?}");
                assert!(second.tokens_consumed <= list.len());
            } else {
                assert!(list.is_empty());
            }
        }
    }

    #[test]
    fn test_pass_summary_counts_tokens() {
        let mut assembler = Assembler::new();
        assembler.assemble(&tokenize("MVI A,1\nEND\nNOP"));
        let first = assembler.pass_summaries()[0];
        assert_eq!(first.end_pc, 2);
        assert_eq!(first.tokens_consumed, 3);
        assert!(first.ended);
    }

    #[test]
    fn test_split_values() {
        assert_eq!(split_values("'a,b',1, 2"), vec!["'a,b'", "1", "2"]);
        assert_eq!(split_values(",,"), Vec::<&str>::new());
        assert_eq!(db_span("'abc',1,'',2"), 5);
    }

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic {
            address: 0x100,
            error: AsmError::UnknownOpcode("FROB".to_string()),
        };
        assert_eq!(d.to_string(), "0100h: Unknown opcode: FROB");
    }
}
