//! Tokenizer for 8080 assembly source.
//!
//! The tokenizer resolves as much as it can up front: every recognised
//! mnemonic (register operands included, e.g. `MOV A,B` or `MVI C,`) is
//! replaced by its two-hex-digit opcode byte, so the assembler passes only
//! ever see opcode bytes, directives, labels and operands.
//!
//! Processing runs as a fixed pipeline:
//!
//! 1. comment stripping (quote aware)
//! 2. string protection: quoted literals are swapped for placeholders
//! 3. uppercasing and whitespace collapse outside literals
//! 4. `", "` → `","`
//! 5. opcode substitution, longest mnemonic first, whole words only
//! 6. tab removal and label-marker insertion after every `:`
//! 7. string restoration
//! 8. splitting on space, label marker and newline, keeping `'…'` atomic

use std::sync::OnceLock;

use crate::opcodes::{self, Opcode};

/// Separates a label definition from whatever follows it on the line.
const LABEL_MARKER: char = '\u{E000}';
/// Opens a protected string placeholder.
const STR_OPEN: char = '\u{E001}';
/// Closes a protected string placeholder.
const STR_CLOSE: char = '\u{E002}';

// ============================================================================
// DIRECTIVES
// ============================================================================

/// Assembler directives. These keywords are never substituted by opcodes,
/// even where they are valid hex (`DB`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    Org,
    End,
    Db,
    Ds,
    Dw,
    Equ,
}

impl Directive {
    pub const ALL: [Directive; 6] = [
        Directive::Org,
        Directive::End,
        Directive::Db,
        Directive::Ds,
        Directive::Dw,
        Directive::Equ,
    ];

    /// Classifies a token as a directive keyword.
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "ORG" => Some(Directive::Org),
            "END" => Some(Directive::End),
            "DB" => Some(Directive::Db),
            "DS" => Some(Directive::Ds),
            "DW" => Some(Directive::Dw),
            "EQU" => Some(Directive::Equ),
            _ => None,
        }
    }

    /// Uppercase source keyword.
    pub fn keyword(self) -> &'static str {
        match self {
            Directive::Org => "ORG",
            Directive::End => "END",
            Directive::Db => "DB",
            Directive::Ds => "DS",
            Directive::Dw => "DW",
            Directive::Equ => "EQU",
        }
    }
}

// ============================================================================
// STRING PROTECTION
// ============================================================================

/// Side table of quoted literals lifted out of the source by [`protect`].
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StringTable {
    strings: Vec<String>,
}

impl StringTable {
    pub fn len(&self) -> usize {
        self.strings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strings.is_empty()
    }

    /// Literal text (quotes included) for a placeholder index.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.strings.get(index).map(String::as_str)
    }
}

/// Replaces each complete `'…'` literal with a placeholder.
///
/// The literal, quotes included, is stored in the returned table under the
/// placeholder's index. An unterminated quote is left in the text as is.
pub fn protect(text: &str) -> (String, StringTable) {
    let mut masked = String::with_capacity(text.len());
    let mut table = StringTable::default();
    let mut current = String::new();
    let mut in_string = false;

    for c in text.chars() {
        if c == '\'' {
            if in_string {
                current.push(c);
                let index = table.strings.len();
                table.strings.push(std::mem::take(&mut current));
                masked.push(STR_OPEN);
                masked.push_str(&index.to_string());
                masked.push(STR_CLOSE);
                in_string = false;
            } else {
                in_string = true;
                current.push(c);
            }
        } else if in_string {
            current.push(c);
        } else {
            masked.push(c);
        }
    }

    if in_string {
        masked.push_str(&current);
    }

    (masked, table)
}

/// Puts protected literals back in place of their placeholders.
pub fn restore(masked: &str, table: &StringTable) -> String {
    let mut restored = String::with_capacity(masked.len());
    let mut chars = masked.chars();

    while let Some(c) = chars.next() {
        if c != STR_OPEN {
            restored.push(c);
            continue;
        }
        let mut digits = String::new();
        for d in chars.by_ref() {
            if d == STR_CLOSE {
                break;
            }
            digits.push(d);
        }
        match digits.parse::<usize>().ok().and_then(|i| table.get(i)) {
            Some(literal) => restored.push_str(literal),
            None => {
                restored.push(STR_OPEN);
                restored.push_str(&digits);
                restored.push(STR_CLOSE);
            }
        }
    }

    restored
}

// ============================================================================
// PIPELINE STAGES
// ============================================================================

/// Drops comment lines and trailing comments. Every kept line ends in `\n`.
pub fn strip_comments(source: &str) -> String {
    let mut code = String::with_capacity(source.len());

    for line in source.split('\n') {
        if line.trim().starts_with(';') {
            continue;
        }

        let mut in_string = false;
        let mut end = line.len();
        for (i, c) in line.char_indices() {
            match c {
                '\'' => in_string = !in_string,
                ';' if !in_string => {
                    end = i;
                    break;
                }
                _ => {}
            }
        }

        code.push_str(&line[..end]);
        code.push('\n');
    }

    code
}

fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r')
}

/// Uppercases the text and collapses blank runs outside quotes to one space.
///
/// Newlines are kept. Only an unterminated quote can still be present once
/// literals are protected; text after it is left uncollapsed.
pub fn normalize(masked: &str) -> String {
    let mut result = String::with_capacity(masked.len());
    let mut in_string = false;
    let mut pending_space = false;

    for c in masked.chars() {
        if c == '\'' {
            if pending_space {
                result.push(' ');
                pending_space = false;
            }
            in_string = !in_string;
            result.push(c);
            continue;
        }

        if !in_string && is_blank(c) {
            pending_space = true;
            continue;
        }

        if pending_space {
            result.push(' ');
            pending_space = false;
        }
        result.extend(c.to_uppercase());
    }

    if pending_space {
        result.push(' ');
    }

    result
}

fn substitution_order() -> &'static [(u8, &'static Opcode)] {
    static ORDER: OnceLock<Vec<(u8, &'static Opcode)>> = OnceLock::new();
    ORDER.get_or_init(|| {
        opcodes::by_length_desc()
            .into_iter()
            .filter(|(_, op)| Directive::from_token(op.mnemonic).is_none())
            .collect()
    })
}

/// Finds the longest mnemonic matching at the start of `rest`.
fn match_mnemonic(rest: &str) -> Option<(u8, usize)> {
    substitution_order().iter().find_map(|&(byte, op)| {
        let tail = rest.strip_prefix(op.mnemonic)?;
        let bounded = op.mnemonic.ends_with(',')
            || tail.chars().next().map_or(true, char::is_whitespace);
        bounded.then_some((byte, op.mnemonic.len()))
    })
}

/// Replaces whole-word mnemonics with `"XX "` opcode bytes.
///
/// An opcode byte that spells a directive keyword gets a leading zero.
///
/// A match must start the text or follow whitespace or a label colon. The
/// scan runs once from left to right, so opcode text it has written is
/// never matched again.
pub fn substitute_opcodes(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut at_boundary = true;
    let mut i = 0;

    while i < text.len() {
        let rest = &text[i..];
        if at_boundary {
            if let Some((byte, len)) = match_mnemonic(rest) {
                let hex = format!("{byte:02X}");
                // IN is DBh, which must not read back as the DB directive
                if Directive::from_token(&hex).is_some() {
                    out.push('0');
                }
                out.push_str(&hex);
                out.push(' ');
                i += len;
                continue;
            }
        }
        let Some(c) = rest.chars().next() else {
            break;
        };
        out.push(c);
        at_boundary = c.is_whitespace() || c == ':';
        i += c.len_utf8();
    }

    out
}

/// Drops tabs and appends the label marker after every colon.
fn mark_labels(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\t' => {}
            ':' => {
                out.push(':');
                out.push(LABEL_MARKER);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Splits restored text into tokens. Quoted spans are never split.
fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_string = false;

    for c in text.chars() {
        if c == '\'' {
            in_string = !in_string;
            current.push(c);
        } else if !in_string && matches!(c, ' ' | '\n' | LABEL_MARKER) {
            if !current.is_empty() {
                tokens.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() {
        tokens.push(current);
    }

    tokens
}

// ============================================================================
// ENTRY POINT
// ============================================================================

/// Tokenizes assembly source into the flat token stream both passes walk.
pub fn tokenize(source: &str) -> Vec<String> {
    let uncommented = strip_comments(source);
    let (masked, strings) = protect(&uncommented);
    let normalized = normalize(&masked).replace(", ", ",");
    let substituted = substitute_opcodes(&normalized);
    let marked = mark_labels(&substituted);
    let restored = restore(&marked, &strings);
    let tokens = split_tokens(&restored);

    tracing::trace!(
        tokens = tokens.len(),
        strings = strings.len(),
        "tokenized source"
    );
    tokens
}
