//! Command-line front end.
//!
//! Assembles one source file (or a bundled sample) and prints the listing,
//! octal dump, hex image and origin, as text or JSON.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use thiserror::Error;
use tracing::Level;

use crate::assembler::Assembly;
use crate::{assemble_source, samples, AssemblyReport};

const LONG_ABOUT: &str = "Two-pass Intel 8080 assembler.

Prints the annotated listing, an octal dump for toggling the program in from
a front panel, and a hex image for loaders. Select sections with --listing,
--octal and --hex; with none given, all three are printed. The exit status is
non-zero if the source has errors, but the output is still written.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "altair80", version, about = "Intel 8080 assembler", long_about = LONG_ABOUT)]
pub struct Cli {
    /// Assembly source file
    #[arg(required_unless_present = "sample", conflicts_with = "sample")]
    pub source: Option<PathBuf>,

    /// Assemble a bundled sample program instead of a file
    #[arg(short, long, value_name = "NAME")]
    pub sample: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    pub format: OutputFormat,

    /// Print the listing
    #[arg(short, long)]
    pub listing: bool,

    /// Print the octal dump
    #[arg(long)]
    pub octal: bool,

    /// Print the hex image
    #[arg(short = 'x', long)]
    pub hex: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// One of `TRACE`, `DEBUG`, `INFO`, `WARN`, or `ERROR`
    #[arg(long, default_value_t = Level::WARN)]
    pub log_level: Level,
}

/// Which output sections to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections {
    pub listing: bool,
    pub octal: bool,
    pub hex: bool,
}

impl Sections {
    pub const ALL: Sections = Sections {
        listing: true,
        octal: true,
        hex: true,
    };
}

impl Cli {
    /// Requested sections. No flag at all means every section.
    pub fn sections(&self) -> Sections {
        if self.listing || self.octal || self.hex {
            Sections {
                listing: self.listing,
                octal: self.octal,
                hex: self.hex,
            }
        } else {
            Sections::ALL
        }
    }
}

#[derive(Debug, Error)]
pub enum CliError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("cannot write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unknown sample `{name}` (available: {available})")]
    UnknownSample { name: String, available: String },
    #[error("failed to write output: {0}")]
    Io(#[from] io::Error),
    #[error("failed to serialize report: {0}")]
    Json(#[from] serde_json::Error),
    #[error("{0} error(s) in {1}")]
    AssemblyFailed(usize, String),
}

/// Loads the source named on the command line, with a name for messages.
fn load_source(cli: &Cli) -> Result<(String, String), CliError> {
    if let Some(name) = &cli.sample {
        let sample = samples::sample(name).ok_or_else(|| CliError::UnknownSample {
            name: name.clone(),
            available: samples::names().join(", "),
        })?;
        return Ok((sample.name.to_string(), sample.source.to_string()));
    }

    let path = cli.source.clone().unwrap_or_default();
    let source = fs::read_to_string(&path).map_err(|source| CliError::Read {
        path: path.clone(),
        source,
    })?;
    Ok((path.display().to_string(), source))
}

/// Renders the assembly the way the editor's output pane shows it.
pub fn render_text(assembly: &Assembly, sections: Sections) -> String {
    let mut text = String::new();
    if sections.listing {
        text.push_str("; Assembled code\n\n");
        text.push_str(&assembly.listing);
    }
    if sections.octal {
        text.push_str("\n\n; Octal");
        text.push_str(&assembly.octal);
    }
    if sections.hex {
        text.push_str("\n\n; Hex\n");
        text.push_str(&assembly.hex);
    }
    text.push_str(&format!("\n\n; ORG address: {:04X}h\n", assembly.origin));
    text
}

/// Renders the assembly as pretty-printed JSON.
pub fn render_json(assembly: &Assembly, sections: Sections) -> Result<String, CliError> {
    let report = AssemblyReport::new(assembly, sections);
    let mut json = serde_json::to_string_pretty(&report)?;
    json.push('\n');
    Ok(json)
}

fn write_output(path: Option<&Path>, text: &str) -> Result<(), CliError> {
    match path {
        Some(path) => fs::write(path, text).map_err(|source| CliError::Write {
            path: path.to_path_buf(),
            source,
        }),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()?;
            Ok(())
        }
    }
}

/// Runs one invocation. Output is written even when assembly fails.
pub fn execute(cli: &Cli) -> Result<(), CliError> {
    let (name, source) = load_source(cli)?;
    tracing::info!("assembling {name}");

    let assembly = assemble_source(&source);
    for diagnostic in &assembly.diagnostics {
        tracing::warn!("{name}: {diagnostic}");
    }

    let sections = cli.sections();
    let rendered = match cli.format {
        OutputFormat::Text => render_text(&assembly, sections),
        OutputFormat::Json => render_json(&assembly, sections)?,
    };

    tracing::trace!("writing");
    write_output(cli.output.as_deref(), &rendered)?;

    if assembly.success {
        tracing::debug!(bytes = assembly.bytes.len(), "assembled {name}");
        Ok(())
    } else {
        Err(CliError::AssemblyFailed(assembly.diagnostics.len(), name))
    }
}
