//! The two-pass driver (spec.md §4.8): pass one assigns every label an
//! address from instruction *shapes* alone; pass two evaluates every
//! expression and emits final bytes.

use crate::directives::{classify, DataItem, Directive};
use crate::error::{AsmError, AsmResult};
use crate::expr::{self};
use crate::lexer::{parse_line, RawLine};
use crate::macros::{expand_invocations, extract_definitions};
use crate::preprocess::preprocess;
use crate::symbol::SymbolTable;
use crate::table;
use log::{debug, trace, warn};

/// One resolved line of output: either machine-code bytes or a blank entry
/// for a label-only/comment-only/directive-only line, paired with its
/// address and source line number for listing output.
#[derive(Clone, Debug, PartialEq)]
pub struct ListingEntry {
    /// Address this entry starts at.
    pub address: u16,
    /// Emitted bytes, if any.
    pub bytes: Vec<u8>,
    /// 1-based source line number.
    pub source_line: u32,
    /// The original source text, for display.
    pub source_text: String,
}

/// The result of a successful assembly: the final byte image plus enough
/// bookkeeping to produce a listing or feed a packager.
#[derive(Clone, Debug, Default)]
pub struct AssembledProgram {
    /// Every byte emitted, starting at `origin`.
    pub bytes: Vec<u8>,
    /// The address the first byte loads at (set by the first `ORG`, or 0).
    pub origin: u16,
    /// The finished symbol table, for diagnostics and external tooling.
    pub symbols: SymbolTable,
    /// Per-line listing entries, in source order (SPEC_FULL.md §4.11's
    /// "listing as a `Display` impl").
    pub listing: Vec<ListingEntry>,
    /// The `TARGET` directive's argument, if the source used one.
    pub target: Option<String>,
    /// The `MODEL` directive's argument, if the source used one.
    pub model: Option<String>,
}

impl std::fmt::Display for AssembledProgram {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for entry in &self.listing {
            let hex: String = entry.bytes.iter().map(|b| format!("{:02X} ", b)).collect();
            writeln!(f, "{:04X}  {:<12} {}", entry.address, hex, entry.source_text)?;
        }
        Ok(())
    }
}

struct PlannedLine {
    raw: RawLine,
    address: u16,
    kind: PlannedKind,
}

enum PlannedKind {
    Blank,
    Instruction,
    Data(Vec<DataItem>),
    Words(Vec<crate::expr::Expr>),
    Space { count: crate::expr::Expr, fill: Option<crate::expr::Expr> },
}

/// Assemble `source` into a finished [`AssembledProgram`], seeding the
/// symbol table with `platform_symbols` before pass one begins (the way a
/// `minz-codegen::TargetConfig`'s `standard_symbols` populate `BDOS`,
/// `screen memory base`, etc. ahead of time).
pub fn assemble(source: &str, platform_symbols: &[(&str, i64)]) -> AsmResult<AssembledProgram> {
    let raw_lines: Vec<RawLine> = source
        .lines()
        .enumerate()
        .map(|(i, text)| parse_line(text, i as u32 + 1))
        .collect();

    let (without_macro_defs, macro_table) = extract_definitions(raw_lines)?;
    let expanded = expand_invocations(without_macro_defs, &macro_table)?;
    let lines = preprocess(expanded);

    let mut symbols = SymbolTable::new();
    for (name, value) in platform_symbols {
        symbols.seed(name, *value);
    }

    let mut origin_seen = false;
    let mut origin = 0u16;
    let mut pc: u32 = 0;
    let mut planned = Vec::with_capacity(lines.len());
    let mut target = None;
    let mut model = None;
    let mut ended = false;

    for line in lines {
        if ended {
            break;
        }
        let is_equ = line.mnemonic.as_deref() == Some("EQU");
        if let Some(label) = &line.label {
            if !is_equ {
                symbols.define(label, origin as i64 + pc as i64, line.line)?;
            }
        }

        let line_start_pc = pc;

        let kind = match &line.mnemonic {
            None => PlannedKind::Blank,
            Some(mnemonic) => match classify(line.line, mnemonic, &line.operands)? {
                Some(Directive::Org(expr)) => {
                    let addr = expr::eval(&expr, &symbols, (origin as u32 + pc) as u16, line.line)? as u16;
                    if !origin_seen {
                        origin = addr;
                        origin_seen = true;
                        pc = 0;
                    } else {
                        pc = addr as u32 - origin as u32;
                    }
                    PlannedKind::Blank
                }
                Some(Directive::Equ(expr)) => {
                    let name = line
                        .label
                        .clone()
                        .ok_or_else(|| AsmError::Directive { line: line.line, message: "EQU requires a label".into() })?;
                    let value = expr::eval(&expr, &symbols, (origin as u32 + pc) as u16, line.line)?;
                    symbols.define(&name, value, line.line)?;
                    PlannedKind::Blank
                }
                Some(Directive::DefB(items)) => {
                    for item in &items {
                        pc += match item {
                            DataItem::Bytes(b) => b.len() as u32,
                            DataItem::Value(_) => 1,
                        };
                    }
                    PlannedKind::Data(items)
                }
                Some(Directive::DefW(values)) => {
                    pc += values.len() as u32 * 2;
                    PlannedKind::Words(values)
                }
                Some(Directive::DefS { count, fill }) => {
                    let n = expr::eval(&count, &symbols, (origin as u32 + pc) as u16, line.line)? as u32;
                    pc += n;
                    PlannedKind::Space { count, fill }
                }
                Some(Directive::End) => {
                    ended = true;
                    PlannedKind::Blank
                }
                Some(Directive::Target(name)) => {
                    target = Some(name);
                    PlannedKind::Blank
                }
                Some(Directive::Model(name)) => {
                    model = Some(name);
                    PlannedKind::Blank
                }
                None => {
                    let len = table::length(line.line, mnemonic, &line.operands)?;
                    pc += len;
                    PlannedKind::Instruction
                }
            },
        };

        let address = origin.wrapping_add(line_start_pc as u16);
        planned.push(PlannedLine { raw: line, address, kind });
    }

    debug!("pass one complete: {} bytes, {} symbols", pc, symbols.names().len());

    let mut bytes = Vec::with_capacity(pc as usize);
    let mut listing = Vec::with_capacity(planned.len());
    let base = origin;

    for entry in planned {
        let here = entry.address;
        let emitted: Vec<u8> = match &entry.kind {
            PlannedKind::Blank => Vec::new(),
            PlannedKind::Instruction => {
                let mnemonic = entry.raw.mnemonic.as_ref().expect("instruction line always has a mnemonic");
                table::encode(entry.raw.line, mnemonic, &entry.raw.operands, &symbols, here)?
            }
            PlannedKind::Data(items) => {
                let mut out = Vec::new();
                for item in items {
                    match item {
                        DataItem::Bytes(raw) => out.extend_from_slice(raw),
                        DataItem::Value(expr) => out.push(expr::eval(expr, &symbols, here, entry.raw.line)? as u8),
                    }
                }
                out
            }
            PlannedKind::Words(values) => {
                let mut out = Vec::new();
                for expr in values {
                    let v = expr::eval(expr, &symbols, here, entry.raw.line)? as u16;
                    out.extend_from_slice(&v.to_le_bytes());
                }
                out
            }
            PlannedKind::Space { count, fill } => {
                let n = expr::eval(count, &symbols, here, entry.raw.line)? as usize;
                let fill_value = match fill {
                    Some(e) => expr::eval(e, &symbols, here, entry.raw.line)? as u8,
                    None => 0,
                };
                vec![fill_value; n]
            }
        };

        trace!("{:04X}: {} bytes", here, emitted.len());
        let source_text = render_source(&entry.raw);
        if !emitted.is_empty() || entry.raw.mnemonic.is_some() || entry.raw.label.is_some() {
            listing.push(ListingEntry {
                address: here,
                bytes: emitted.clone(),
                source_line: entry.raw.line,
                source_text,
            });
        }
        bytes.extend(emitted);
    }

    if bytes.len() > u16::MAX as usize {
        warn!("assembled image of {} bytes exceeds the 64K address space", bytes.len());
    }

    Ok(AssembledProgram { bytes, origin: base, symbols, listing, target, model })
}

fn render_source(line: &RawLine) -> String {
    let mut out = String::new();
    if let Some(label) = &line.label {
        out.push_str(label);
        out.push(':');
        out.push(' ');
    }
    if let Some(mnemonic) = &line.mnemonic {
        out.push_str(mnemonic);
        out.push(' ');
        out.push_str(&line.operands.join(", "));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assembles_a_tiny_program() {
        let source = "    ORG 0x8000\nstart:\n    LD A, 5\n    RET\n";
        let program = assemble(source, &[]).unwrap();
        assert_eq!(program.origin, 0x8000);
        assert_eq!(program.bytes, vec![0x3E, 5, 0xC9]);
        assert_eq!(program.symbols.get("start"), Some(0x8000));
    }

    #[test]
    fn forward_reference_resolves_correctly() {
        let source = "    ORG 0x8000\n    JP skip\n    NOP\nskip:\n    RET\n";
        let program = assemble(source, &[]).unwrap();
        assert_eq!(program.bytes, vec![0xC3, 0x04, 0x80, 0x00, 0xC9]);
    }

    #[test]
    fn equ_defines_a_constant_usable_before_and_after() {
        let source = "BDOS EQU 5\n    ORG 0x100\n    LD A, BDOS\n";
        let program = assemble(source, &[]).unwrap();
        assert_eq!(program.symbols.get("BDOS"), Some(5));
        assert_eq!(program.bytes, vec![0x3E, 5]);
    }

    #[test]
    fn platform_symbols_are_visible_without_a_defining_line() {
        let source = "    ORG 0x100\n    LD A, BDOS\n";
        let program = assemble(source, &[("BDOS", 5)]).unwrap();
        assert_eq!(program.bytes, vec![0x3E, 5]);
    }

    #[test]
    fn target_and_model_directives_are_captured() {
        let source = "    TARGET zxspectrum\n    MODEL 48k\n    ORG 0x8000\n    NOP\n";
        let program = assemble(source, &[]).unwrap();
        assert_eq!(program.target.as_deref(), Some("zxspectrum"));
        assert_eq!(program.model.as_deref(), Some("48k"));
    }

    #[test]
    fn ds_reserves_space_with_a_fill_value() {
        let source = "    ORG 0x8000\n    DS 3, 0xFF\n";
        let program = assemble(source, &[]).unwrap();
        assert_eq!(program.bytes, vec![0xFF, 0xFF, 0xFF]);
    }

    #[test]
    fn local_labels_scope_correctly_across_two_functions() {
        let source = "f:\n.loop: DJNZ .loop\n    RET\ng:\n.loop: DJNZ .loop\n    RET\n";
        let program = assemble(source, &[]).unwrap();
        assert!(program.symbols.contains("f.loop"));
        assert!(program.symbols.contains("g.loop"));
    }

    #[test]
    fn display_renders_a_listing() {
        let source = "    ORG 0x8000\nstart:\n    LD A, 5\n";
        let program = assemble(source, &[]).unwrap();
        let text = program.to_string();
        assert!(text.contains("8000"));
        assert!(text.contains("LD"));
    }
}
