//! Bundled demo programs.
//!
//! Each sample's source carries its title in a comment. [`next_sample`] uses
//! that to cycle through them from whatever source is currently loaded.

/// A demo program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sample {
    /// Short name used on the command line.
    pub name: &'static str,
    /// Title that appears in the source header.
    pub title: &'static str,
    pub source: &'static str,
}

const KILL_THE_BIT: &str = "\
; Kill the Bit, a front panel game by Dean McDaniel (1975)
;
; A lit bit rotates through the upper address lamps. Flip the matching
; sense switch up and back down to knock it out. Miss, and a second bit
; lights up. Start with every switch down.

        org 0h

        lxi     h,0         ; display counter
        mvi     d,080h      ; starting bit pattern
        lxi     b,0fe00h    ; counter step, sets the display speed
beg:
        ldax    d           ; put the pattern on the address lamps
        ldax    d
        ldax    d
        ldax    d
        dad     b           ; advance the counter
        jnc     beg
        in      0ffh        ; read the sense switches
        xra     d           ; toggle matching bits
        rrc                 ; rotate one place right
        mov     d,a
        jmp     beg
        end
";

const ECHO: &str = "\
; Console Echo
; Reads a character through BDOS and writes it straight back.

        org 100h            ; transient programs load at 0100h

; Jump vector for the BDOS entry at 0005h
        db 0C3h
        db 05h
        db 00h

loop:
        mvi c, 01h          ; function 1, console input
        call 0005h
        mov e, a            ; character to print
        mvi c, 02h          ; function 2, console output
        call 0005h
        jmp loop

        end
";

const DISK_TEST: &str = "\
; Disk Test
; Writes a sector through the disk ports and reads it back.
; Ends with A=FFh on success, A=00h on failure.

        org 100h

; Fill the buffer with a pattern
        lxi h, 0200h
        mvi b, 080h
        mvi a, 0AAh
fill:
        mov m, a
        inx h
        dcr b
        jnz fill

; Select drive, track and sector, set the DMA address, then write
        mvi a, 00h
        out 10h
        out 11h
        mvi a, 01h
        out 12h
        mvi a, 00h
        out 13h
        mvi a, 02h
        out 14h
        mvi a, 01h
        out 15h

; Wipe the buffer
        lxi h, 0200h
        mvi b, 080h
        mvi a, 00h
clr:
        mov m, a
        inx h
        dcr b
        jnz clr

; Read the sector back
        mvi a, 00h
        out 15h

; Compare the first byte
        lxi h, 0200h
        mov a, m
        xri 0AAh
        jnz err

        mvi a, 0FFh
        hlt

err:
        mvi a, 00h
        hlt

        end
";

/// Every bundled sample, in cycling order.
pub static SAMPLES: &[Sample] = &[
    Sample {
        name: "kill-the-bit",
        title: "Kill the Bit",
        source: KILL_THE_BIT,
    },
    Sample {
        name: "echo",
        title: "Echo",
        source: ECHO,
    },
    Sample {
        name: "disk-test",
        title: "Disk Test",
        source: DISK_TEST,
    },
];

/// Finds a sample by name, ignoring case.
pub fn sample(name: &str) -> Option<&'static Sample> {
    SAMPLES.iter().find(|s| s.name.eq_ignore_ascii_case(name))
}

/// Picks the sample after the one `current_source` holds.
///
/// Sources that are not a sample start the cycle at the first one.
pub fn next_sample(current_source: &str) -> &'static Sample {
    let current = SAMPLES
        .iter()
        .position(|s| current_source.contains(s.title));
    match current {
        Some(i) => &SAMPLES[(i + 1) % SAMPLES.len()],
        None => &SAMPLES[0],
    }
}

/// Names of all samples, for help text.
pub fn names() -> Vec<&'static str> {
    SAMPLES.iter().map(|s| s.name).collect()
}
