//! Per-target configuration: memory layout defaults, standard symbols, and
//! the packager that turns raw emitted bytes into a platform file format
//! (component H, spec.md §4.6).

use crate::error::CodegenResult;
use std::collections::HashMap;

/// Raw bytes plus the address they were assembled to load at; the input to
/// every packager.
#[derive(Clone, Debug)]
pub struct RawImage {
    /// The emitted bytes.
    pub bytes: Vec<u8>,
    /// The address `bytes[0]` loads at.
    pub origin: u16,
}

/// A packager function: consumes a [`RawImage`] plus its owning
/// [`TargetConfig`] and returns final file bytes, or a [`CodegenError`]
/// for a constraint violation (`OutputFormatError`/`MemoryLayoutError`).
pub type PackagerFn = fn(&TargetConfig, &RawImage) -> CodegenResult<Vec<u8>>;

/// Static memory-layout and file-format configuration for one generation
/// target, per spec.md §3's "Target configuration" data model entry.
#[derive(Clone, Debug)]
pub struct TargetConfig {
    /// Canonical backend name this configuration belongs to.
    pub name: &'static str,
    /// Output file extension, case-sensitive, including the leading dot
    /// (spec.md §6).
    pub file_extension: &'static str,
    /// Default origin/load address.
    pub default_origin: u16,
    /// Start of RAM.
    pub ram_start: u16,
    /// Size of RAM in bytes.
    pub ram_size: u32,
    /// Start of ROM, if the target has a distinct ROM region.
    pub rom_start: Option<u16>,
    /// Size of ROM in bytes, if any.
    pub rom_size: Option<u32>,
    /// Base address of screen/video memory, if the target maps one.
    pub screen_base: Option<u16>,
    /// Default stack-top address.
    pub stack_top: u16,
    /// Platform-standard symbols pre-populated into the assembler's symbol
    /// table before assembling this target's output (e.g. `BDOS=0x0005`).
    pub standard_symbols: &'static [(&'static str, i64)],
    /// Packages a [`RawImage`] into this target's final file bytes.
    pub packager: PackagerFn,
}

impl TargetConfig {
    /// `standard_symbols` as an owned map, ready to seed an assembler
    /// symbol table.
    pub fn standard_symbols_map(&self) -> HashMap<String, i64> {
        self.standard_symbols.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    /// `true` if `addr..addr+len` falls within this target's screen memory,
    /// if it has any (used by the memory-layout validation in spec.md
    /// §4.6 to emit — not fail — a warning).
    pub fn overlaps_screen(&self, addr: u16, len: u32) -> bool {
        match self.screen_base {
            Some(base) => {
                let end = addr as u32 + len;
                let screen_end = base as u32 + 0x1800; // ZX Spectrum screen+attrs size
                (addr as u32) < screen_end && end > base as u32
            }
            None => false,
        }
    }

    /// `true` if `addr..addr+len` lies entirely below this target's RAM
    /// start (i.e. in ROM/BASIC system area).
    pub fn below_ram(&self, addr: u16, _len: u32) -> bool {
        addr < self.ram_start
    }
}
