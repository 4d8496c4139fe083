//! Source-level rewrites applied before the two-pass assembler sees a
//! line: local-label scoping, multi-argument expansion, and the classic
//! "fake" 16-bit register-to-register move (SPEC_FULL.md §4.11, spec.md
//! §4.8/§9).

use crate::lexer::RawLine;

const UNARY_MNEMONICS: &[&str] = &[
    "INC", "DEC", "PUSH", "POP", "OR", "AND", "XOR", "CP", "SUB", "ADD", "RLC", "RRC", "RL", "RR", "SLA", "SRA",
    "SLL", "SRL",
];
/// Rotates with no operand of their own (spec.md §4.7.3): a comma-list
/// after one of these means "repeat this instruction N times", not
/// "apply to each of these N operands" the way [`UNARY_MNEMONICS`] works.
const NO_OPERAND_ROTATES: &[&str] = &["RLA", "RRA", "RLCA", "RRCA"];
const WIDE_PAIRS: &[&str] = &["BC", "DE", "HL"];

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

/// Rewrite every `.local` reference in `text` to `global.local`, leaving
/// anything else untouched. Used both for the label itself and for operand
/// text that references a local label.
fn qualify_locals(text: &str, global: &str) -> String {
    let mut out = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '.' && (i == 0 || !is_ident_char(chars[i - 1])) {
            let start = i;
            i += 1;
            while i < chars.len() && is_ident_char(chars[i]) {
                i += 1;
            }
            out.push_str(global);
            out.extend(&chars[start..i]);
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

/// Expand local labels (`.name`, scoped to the nearest preceding global
/// label) into fully-qualified names, so the rest of the assembler never
/// has to reason about scoping.
pub fn expand_local_labels(lines: Vec<RawLine>) -> Vec<RawLine> {
    let mut global = String::new();
    let mut out = Vec::with_capacity(lines.len());
    for mut line in lines {
        if let Some(label) = &line.label {
            if !label.starts_with('.') {
                global = label.clone();
            }
        }
        if !global.is_empty() {
            if let Some(label) = &line.label {
                if label.starts_with('.') {
                    line.label = Some(qualify_locals(label, &global));
                }
            }
            line.operands = line.operands.iter().map(|op| qualify_locals(op, &global)).collect();
        }
        out.push(line);
    }
    out
}

/// Expand `MNEMONIC a, b, c` for single-operand mnemonics into one
/// instruction per operand, in order (SPEC_FULL.md §4.11's "multi-arg
/// expansion"): `INC A, B` becomes `INC A` followed by `INC B`. For a
/// rotate that takes no operand of its own (`RLA`/`RRA`/`RLCA`/`RRCA`,
/// spec.md §4.7.3), a comma-list instead means "repeat this instruction
/// once per comma-separated item": `RLCA x, x` becomes `RLCA` twice, with
/// the listed items themselves discarded.
pub fn expand_multi_arg(lines: Vec<RawLine>) -> Vec<RawLine> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let is_repeat = line
            .mnemonic
            .as_deref()
            .map(|m| NO_OPERAND_ROTATES.contains(&m))
            .unwrap_or(false)
            && line.operands.len() > 1;
        if is_repeat {
            for i in 0..line.operands.len() {
                out.push(RawLine {
                    line: line.line,
                    label: if i == 0 { line.label.clone() } else { None },
                    mnemonic: line.mnemonic.clone(),
                    operands: vec![],
                    comment: if i == 0 { line.comment.clone() } else { None },
                });
            }
            continue;
        }

        let is_multi = line
            .mnemonic
            .as_deref()
            .map(|m| UNARY_MNEMONICS.contains(&m))
            .unwrap_or(false)
            && line.operands.len() > 1;
        if !is_multi {
            out.push(line);
            continue;
        }
        for (i, operand) in line.operands.iter().enumerate() {
            out.push(RawLine {
                line: line.line,
                label: if i == 0 { line.label.clone() } else { None },
                mnemonic: line.mnemonic.clone(),
                operands: vec![operand.clone()],
                comment: if i == 0 { line.comment.clone() } else { None },
            });
        }
    }
    out
}

/// Expand the non-existent `LD ddst, dsrc` 16-bit register-pair move (Z80
/// has no such opcode) into its two real 8-bit half-register moves:
/// `LD HL, DE` becomes `LD H, D` then `LD L, E`.
pub fn expand_fake_moves(lines: Vec<RawLine>) -> Vec<RawLine> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        let is_fake_move = line.mnemonic.as_deref() == Some("LD")
            && line.operands.len() == 2
            && WIDE_PAIRS.contains(&line.operands[0].as_str())
            && WIDE_PAIRS.contains(&line.operands[1].as_str());
        if !is_fake_move {
            out.push(line);
            continue;
        }
        let (dst_hi, dst_lo) = half_registers(&line.operands[0]);
        let (src_hi, src_lo) = half_registers(&line.operands[1]);
        out.push(RawLine {
            line: line.line,
            label: line.label.clone(),
            mnemonic: Some("LD".into()),
            operands: vec![dst_hi.to_string(), src_hi.to_string()],
            comment: line.comment.clone(),
        });
        out.push(RawLine {
            line: line.line,
            label: None,
            mnemonic: Some("LD".into()),
            operands: vec![dst_lo.to_string(), src_lo.to_string()],
            comment: None,
        });
    }
    out
}

fn half_registers(pair: &str) -> (&'static str, &'static str) {
    match pair {
        "BC" => ("B", "C"),
        "DE" => ("D", "E"),
        "HL" => ("H", "L"),
        _ => unreachable!("half_registers called with a non-wide-pair operand"),
    }
}

/// Run every source-level rewrite in the order the assembler relies on:
/// local labels first (so later expansions see fully-qualified names),
/// then multi-arg, then fake-move expansion.
pub fn preprocess(lines: Vec<RawLine>) -> Vec<RawLine> {
    let lines = expand_local_labels(lines);
    let lines = expand_multi_arg(lines);
    expand_fake_moves(lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::parse_line;

    #[test]
    fn local_labels_are_qualified_by_the_preceding_global_label() {
        let lines = vec![
            parse_line("main:", 1),
            parse_line(".loop: DJNZ .loop", 2),
        ];
        let out = expand_local_labels(lines);
        assert_eq!(out[1].label.as_deref(), Some("main.loop"));
        assert_eq!(out[1].operands, vec!["main.loop"]);
    }

    #[test]
    fn multi_arg_expands_into_one_instruction_per_operand() {
        let lines = vec![parse_line("    INC A, B, C", 1)];
        let out = expand_multi_arg(lines);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].operands, vec!["A"]);
        assert_eq!(out[1].operands, vec!["B"]);
        assert_eq!(out[2].operands, vec!["C"]);
    }

    #[test]
    fn fake_16bit_move_expands_to_two_8bit_moves() {
        let lines = vec![parse_line("    LD HL, DE", 1)];
        let out = expand_fake_moves(lines);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].operands, vec!["H", "D"]);
        assert_eq!(out[1].operands, vec!["L", "E"]);
    }

    #[test]
    fn no_operand_rotate_comma_list_repeats_the_instruction() {
        let lines = vec![parse_line("    RLCA x, x, x", 1)];
        let out = expand_multi_arg(lines);
        assert_eq!(out.len(), 3);
        for line in &out {
            assert_eq!(line.mnemonic.as_deref(), Some("RLCA"));
            assert!(line.operands.is_empty());
        }
    }

    #[test]
    fn add_and_shift_mnemonics_also_expand() {
        let lines = vec![parse_line("    ADD A, B, C", 1)];
        let out = expand_multi_arg(lines);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].operands, vec!["A"]);
        assert_eq!(out[1].operands, vec!["B"]);
        assert_eq!(out[2].operands, vec!["C"]);
    }

    #[test]
    fn real_ld_is_left_alone() {
        let lines = vec![parse_line("    LD HL, 0x1234", 1)];
        let out = expand_fake_moves(lines);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].operands, vec!["HL", "0x1234"]);
    }
}
