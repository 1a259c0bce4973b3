//! Intel 8080 two-pass assembler with a boundary to an external CPU core.
//!
//! Source text flows through [`lexer::tokenize`] into
//! [`assembler::Assembler`], which produces an [`Assembly`]: the object
//! bytes, their hex and octal renditions, an annotated listing, the success
//! flag and the origin address. A [`machine::Session`] hands a successful
//! assembly to a core implementing [`machine::CpuCore`].

pub mod assembler;
pub mod cli;
pub mod lexer;
pub mod literal;
pub mod machine;
pub mod opcodes;
pub mod output;
pub mod samples;

use std::io;
use std::process::ExitCode;

use clap::Parser;

pub use assembler::{AsmError, Assembler, Assembly, Diagnostic};

use cli::{Cli, Sections};

/// Tokenizes and assembles source text.
pub fn assemble_source(source: &str) -> Assembly {
    let tokens = lexer::tokenize(source);
    Assembler::new().assemble(&tokens)
}

/// Serializable summary of an assembly run
#[derive(Debug, serde::Serialize)]
pub struct AssemblyReport {
    pub origin: u16,
    pub success: bool,
    /// Bytes emitted
    pub size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hex: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub octal: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub listing: Option<String>,
    pub errors: Vec<String>,
}

impl AssemblyReport {
    pub fn new(assembly: &Assembly, sections: Sections) -> Self {
        Self {
            origin: assembly.origin,
            success: assembly.success,
            size: assembly.bytes.len(),
            hex: sections.hex.then(|| assembly.hex.clone()),
            octal: sections.octal.then(|| assembly.octal.clone()),
            listing: sections.listing.then(|| assembly.listing.clone()),
            errors: assembly.diagnostics.iter().map(ToString::to_string).collect(),
        }
    }
}

/// Command-line entry point.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    tracing_subscriber::fmt()
        .with_max_level(cli.log_level)
        .with_writer(io::stderr)
        .init();

    if let Err(e) = cli::execute(&cli) {
        tracing::error!("{e}");
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
