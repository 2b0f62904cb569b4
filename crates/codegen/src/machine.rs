//! Target machine descriptions.

use crate::Mflpt5;
use octet_config::Target;
use std::ops::RangeInclusive;

/// A float constant in the machine's ROM.
#[derive(Clone, Copy, Debug)]
pub struct RomFloat {
    /// Assembler name of the constant.
    pub name: &'static str,
    /// The encoded value.
    pub bytes: [u8; 5],
}

/// The float constants of the C64 BASIC ROM.
const C64_ROM_FLOATS: &[RomFloat] = &[
    RomFloat { name: "floats.FL_ZERO", bytes: [0x00, 0x00, 0x00, 0x00, 0x00] },
    RomFloat { name: "floats.FL_PIVAL", bytes: [0x82, 0x49, 0x0f, 0xda, 0xa1] },
    RomFloat { name: "floats.FL_N32768", bytes: [0x90, 0x80, 0x00, 0x00, 0x00] },
    RomFloat { name: "floats.FL_FONE", bytes: [0x81, 0x00, 0x00, 0x00, 0x00] },
    RomFloat { name: "floats.FL_SQRHLF", bytes: [0x80, 0x35, 0x04, 0xf3, 0x34] },
    RomFloat { name: "floats.FL_SQRTWO", bytes: [0x81, 0x35, 0x04, 0xf3, 0x34] },
    RomFloat { name: "floats.FL_NEGHLF", bytes: [0x80, 0x80, 0x00, 0x00, 0x00] },
    RomFloat { name: "floats.FL_LOG2", bytes: [0x80, 0x31, 0x72, 0x17, 0xf8] },
    RomFloat { name: "floats.FL_TENC", bytes: [0x84, 0x20, 0x00, 0x00, 0x00] },
    RomFloat { name: "floats.FL_NZMIL", bytes: [0x9e, 0x6e, 0x6b, 0x28, 0x00] },
    RomFloat { name: "floats.FL_FHALF", bytes: [0x80, 0x00, 0x00, 0x00, 0x00] },
    RomFloat { name: "floats.FL_LOGEB2", bytes: [0x81, 0x38, 0xaa, 0x3b, 0x29] },
    RomFloat { name: "floats.FL_PIHALF", bytes: [0x81, 0x49, 0x0f, 0xda, 0xa2] },
    RomFloat { name: "floats.FL_TWOPI", bytes: [0x83, 0x49, 0x0f, 0xda, 0xa2] },
    RomFloat { name: "floats.FL_FR4", bytes: [0x7f, 0x00, 0x00, 0x00, 0x00] },
];

/// ROM constants whose encoding differs from ours in the last mantissa bit, matched by their value
/// rounded to 10 decimals instead.
const C64_ROUNDED_ROM_FLOATS: &[(f64, &str)] = &[
    (3.1415926536, "floats.FL_PIVAL"),
    (1.4142135624, "floats.FL_SQRTWO"),
    (0.7071067812, "floats.FL_SQRHLF"),
    (0.6931471806, "floats.FL_LOG2"),
];

/// Zero page scratch locations used by generated code and the runtime library.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZeroPageScratch {
    pub b1: u8,
    pub reg: u8,
    pub w1: u8,
    pub w2: u8,
}

/// A machine that code is generated for.
#[derive(Clone, Debug)]
pub struct Machine {
    name: &'static str,
    cpu: &'static str,
    estack_lo: u16,
    estack_hi: u16,
    basic_load_address: u16,
    raw_load_address: u16,
    scratch: ZeroPageScratch,
    io: Vec<RangeInclusive<u16>>,
    rom_floats: &'static [RomFloat],
    rounded_rom_floats: &'static [(f64, &'static str)],
}

impl Machine {
    /// The Commodore 64.
    pub fn c64() -> Self {
        Self {
            name: "c64",
            cpu: "6502",
            estack_lo: 0xce00,
            estack_hi: 0xcf00,
            basic_load_address: 0x0801,
            raw_load_address: 0xc000,
            scratch: ZeroPageScratch { b1: 0x02, reg: 0x03, w1: 0xfb, w2: 0xfd },
            // the processor port, and the VIC, SID, color RAM and CIA chips
            io: vec![0x0000..=0x0001, 0xd000..=0xdfff],
            rom_floats: C64_ROM_FLOATS,
            rounded_rom_floats: C64_ROUNDED_ROM_FLOATS,
        }
    }

    /// The register virtual machine. It has no memory-mapped I/O and no ROM.
    pub fn virtual_machine() -> Self {
        Self {
            name: "virtual",
            cpu: "virtual",
            estack_lo: 0,
            estack_hi: 0,
            basic_load_address: 0,
            raw_load_address: 0,
            scratch: ZeroPageScratch { b1: 0, reg: 0, w1: 0, w2: 0 },
            io: Vec::new(),
            rom_floats: &[],
            rounded_rom_floats: &[],
        }
    }

    /// Returns the description of the given target.
    pub fn for_target(target: Target) -> Self {
        match target {
            Target::C64 => Self::c64(),
            Target::Virtual => Self::virtual_machine(),
        }
    }

    #[inline]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    #[inline]
    pub const fn cpu(&self) -> &'static str {
        self.cpu
    }

    /// Base address of the low bytes of the evaluation stack.
    #[inline]
    pub const fn estack_lo(&self) -> u16 {
        self.estack_lo
    }

    /// Base address of the high bytes of the evaluation stack.
    #[inline]
    pub const fn estack_hi(&self) -> u16 {
        self.estack_hi
    }

    /// The load address a BASIC launcher program must have.
    #[inline]
    pub const fn basic_load_address(&self) -> u16 {
        self.basic_load_address
    }

    /// The default load address of programs without a BASIC launcher.
    #[inline]
    pub const fn raw_load_address(&self) -> u16 {
        self.raw_load_address
    }

    #[inline]
    pub const fn scratch(&self) -> ZeroPageScratch {
        self.scratch
    }

    /// Returns `true` if accessing `address` has hardware side effects.
    pub fn is_io_address(&self, address: u16) -> bool {
        self.io.iter().any(|range| range.contains(&address))
    }

    /// Returns the name of the ROM constant holding `value`, if there is one.
    pub fn rom_float(&self, value: f64, encoded: Mflpt5) -> Option<&'static str> {
        if let Some(rom) = self.rom_floats.iter().find(|rom| rom.bytes == encoded.bytes()) {
            return Some(rom.name);
        }
        let rounded = (value * 1e10).round() / 1e10;
        self.rounded_rom_floats.iter().find(|(v, _)| *v == rounded).map(|&(_, name)| name)
    }
}
