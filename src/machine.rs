//! Boundary to the CPU core that runs assembled programs.
//!
//! The core itself (fetch, decode, execute) lives outside this crate and is
//! reached through [`CpuCore`]. [`Session`] owns a shared handle to one core
//! and drives it: it only accepts a program from a successful, non-empty
//! assembly, and it collects console output as the program runs.

use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::assembler::Assembly;

/// Console text kept before trimming kicks in.
pub const CONSOLE_LIMIT: usize = 5000;
/// Console text kept after trimming.
pub const CONSOLE_KEEP: usize = 4000;

/// Highest program counter a run slice may stop at before it is considered
/// to have run off the end of memory.
const PC_LIMIT: u32 = 0x1_0000;

// ============================================================================
// CORE TRAIT
// ============================================================================

/// Calls an external 8080 core exposes.
pub trait CpuCore {
    /// Loads a hex image (two digits per byte) at `origin`.
    fn load(&mut self, hex: &str, origin: u16);
    fn reset(&mut self);
    /// Executes one instruction.
    fn step(&mut self);
    /// Executes a batch of instructions.
    fn run(&mut self);
    /// Program counter. May exceed 16 bits once a program runs off the end.
    fn current_address(&self) -> u32;
    fn address_bus(&self) -> u16;
    fn data_bus(&self) -> u8;
    /// Queues one character of console input.
    fn put_char(&mut self, ch: u8);
    /// Takes one character of console output, if any is pending.
    fn get_char(&mut self) -> Option<u8>;
    fn waiting_for_input(&self) -> bool;
}

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("assembly contains errors")]
    AssemblyFailed,
    #[error("no code to run")]
    EmptyProgram,
    #[error("no program launched")]
    NotLaunched,
    #[error("machine lock poisoned")]
    Poisoned,
}

// ============================================================================
// FRONT PANEL
// ============================================================================

/// Address and data lamps of the front panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct Panel {
    pub address: u16,
    pub data: u8,
}

impl Panel {
    /// True if address lamp `bit` (0..16) is lit.
    pub fn address_lamp(&self, bit: u8) -> bool {
        bit < 16 && self.address & (1 << bit) != 0
    }

    /// True if data lamp `bit` (0..8) is lit.
    pub fn data_lamp(&self, bit: u8) -> bool {
        bit < 8 && self.data & (1 << bit) != 0
    }
}

/// Outcome of one run slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// The program counter moved; keep running.
    Running,
    /// The program counter did not move, or left the address space.
    Stopped,
}

// ============================================================================
// SESSION
// ============================================================================

/// A launched program on a shared core.
pub struct Session<C: CpuCore> {
    core: Arc<Mutex<C>>,
    listing: Option<String>,
    console: String,
}

impl<C: CpuCore> Session<C> {
    pub fn new(core: C) -> Self {
        Self::shared(Arc::new(Mutex::new(core)))
    }

    /// Wraps a core that other owners also hold.
    pub fn shared(core: Arc<Mutex<C>>) -> Self {
        Self {
            core,
            listing: None,
            console: String::new(),
        }
    }

    pub fn core(&self) -> Arc<Mutex<C>> {
        Arc::clone(&self.core)
    }

    fn lock(&self) -> Result<MutexGuard<'_, C>, SessionError> {
        self.core.lock().map_err(|_| SessionError::Poisoned)
    }

    /// Like [`Session::lock`], but only once a program is launched.
    fn launched(&self) -> Result<MutexGuard<'_, C>, SessionError> {
        if self.listing.is_none() {
            return Err(SessionError::NotLaunched);
        }
        self.lock()
    }

    pub fn is_launched(&self) -> bool {
        self.listing.is_some()
    }

    /// Loads an assembled program into the core and resets it.
    ///
    /// Refuses assemblies that failed or produced no bytes.
    pub fn launch(&mut self, assembly: &Assembly) -> Result<(), SessionError> {
        if !assembly.success {
            return Err(SessionError::AssemblyFailed);
        }
        if assembly.hex.is_empty() {
            return Err(SessionError::EmptyProgram);
        }

        {
            let mut core = self.lock()?;
            core.load(&assembly.hex, assembly.origin);
            core.reset();
        }

        tracing::debug!(
            origin = assembly.origin,
            bytes = assembly.bytes.len(),
            "program launched"
        );
        self.listing = Some(assembly.listing.clone());
        self.console.clear();
        Ok(())
    }

    /// Executes one instruction and returns the new program counter.
    pub fn step(&mut self) -> Result<u32, SessionError> {
        let pc = {
            let mut core = self.launched()?;
            core.step();
            core.current_address()
        };
        self.collect_console()?;
        Ok(pc)
    }

    pub fn reset(&mut self) -> Result<(), SessionError> {
        self.launched()?.reset();
        Ok(())
    }

    /// Runs one batch of instructions.
    ///
    /// Reports [`RunState::Stopped`] when the program counter ends where it
    /// started (a halt or a tight self-loop) or beyond the address space.
    pub fn run_slice(&mut self) -> Result<RunState, SessionError> {
        let (before, after) = {
            let mut core = self.launched()?;
            let before = core.current_address();
            core.run();
            (before, core.current_address())
        };
        self.collect_console()?;

        if before == after || after > PC_LIMIT {
            tracing::debug!(pc = after, "run stopped");
            Ok(RunState::Stopped)
        } else {
            Ok(RunState::Running)
        }
    }

    /// Pulls pending output from the core into the console buffer.
    fn collect_console(&mut self) -> Result<(), SessionError> {
        let mut core = self.core.lock().map_err(|_| SessionError::Poisoned)?;
        while let Some(ch) = core.get_char() {
            self.console.push(char::from(ch));
        }
        drop(core);

        let count = self.console.chars().count();
        if count > CONSOLE_LIMIT {
            let skip = count - CONSOLE_KEEP;
            self.console = self.console.chars().skip(skip).collect();
        }
        Ok(())
    }

    /// Console output so far, without consuming it.
    pub fn console(&self) -> &str {
        &self.console
    }

    /// Takes all console output gathered so far.
    pub fn drain_console(&mut self) -> Result<String, SessionError> {
        self.collect_console()?;
        Ok(std::mem::take(&mut self.console))
    }

    /// Queues text as console input, one byte per character.
    pub fn send_input(&mut self, text: &str) -> Result<(), SessionError> {
        let mut core = self.launched()?;
        for byte in text.bytes() {
            core.put_char(byte);
        }
        Ok(())
    }

    pub fn waiting_for_input(&self) -> Result<bool, SessionError> {
        Ok(self.launched()?.waiting_for_input())
    }

    pub fn current_address(&self) -> Result<u32, SessionError> {
        Ok(self.launched()?.current_address())
    }

    /// Front panel readout. While running the address lamps follow the
    /// address bus, otherwise they show the program counter.
    pub fn panel(&self, running: bool) -> Result<Panel, SessionError> {
        let core = self.launched()?;
        let address = if running {
            core.address_bus()
        } else {
            core.current_address() as u16
        };
        Ok(Panel {
            address,
            data: core.data_bus(),
        })
    }

    /// The launched listing with the line at the current address marked.
    pub fn highlighted_listing(&self) -> Result<String, SessionError> {
        let listing = self.listing.as_deref().ok_or(SessionError::NotLaunched)?;
        let pc = self.lock()?.current_address();
        Ok(highlight(listing, pc as u16))
    }
}

/// Marks every listing line at `pc` by turning `"AAAA: "` into `"AAAA:>"`.
pub fn highlight(listing: &str, pc: u16) -> String {
    let prefix = format!("{pc:04X}: ");
    listing.replace(&prefix, &format!("{pc:04X}:>"))
}
