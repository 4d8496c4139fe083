//! `MACRO`/`ENDM` definition and expansion, plus a small built-in macro
//! library (spec.md §4.8, SPEC_FULL.md §4.11).

use crate::error::{AsmError, AsmResult};
use crate::lexer::RawLine;
use std::collections::HashMap;

/// One macro definition: its formal parameter names and body, recorded
/// verbatim from the source between `MACRO` and `ENDM`.
#[derive(Clone, Debug)]
pub struct MacroDef {
    params: Vec<String>,
    body: Vec<RawLine>,
}

/// The set of macros known to one assembly run: user-defined plus the
/// built-in standard library.
#[derive(Clone, Debug, Default)]
pub struct MacroTable {
    macros: HashMap<String, MacroDef>,
}

fn substitute(text: &str, bindings: &HashMap<String, String>) -> String {
    let mut out = String::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i].is_ascii_alphabetic() || chars[i] == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().collect();
            match bindings.get(&word) {
                Some(value) => out.push_str(value),
                None => out.push_str(&word),
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

impl MacroTable {
    /// An empty table with no macros defined.
    pub fn new() -> MacroTable {
        MacroTable::default()
    }

    /// A table preloaded with the standard macro library: small,
    /// frequently hand-rolled conveniences (save/restore every
    /// general-purpose register pair, and a zeroing idiom) that a real
    /// Z80 program usually reaches for immediately.
    pub fn with_standard_library() -> MacroTable {
        let mut table = MacroTable::new();
        table.define(
            "PUSH_ALL",
            vec![],
            vec!["PUSH AF", "PUSH BC", "PUSH DE", "PUSH HL"],
        );
        table.define(
            "POP_ALL",
            vec![],
            vec!["POP HL", "POP DE", "POP BC", "POP AF"],
        );
        table.define("CLEAR_HL", vec![], vec!["LD HL, 0"]);
        table
    }

    fn define(&mut self, name: &str, params: Vec<&str>, body_lines: Vec<&str>) {
        let body = body_lines
            .into_iter()
            .enumerate()
            .map(|(i, text)| crate::lexer::parse_line(text, i as u32 + 1))
            .collect();
        self.macros.insert(
            name.to_string(),
            MacroDef { params: params.into_iter().map(String::from).collect(), body },
        );
    }

    /// `true` if `name` names a defined macro.
    pub fn contains(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Expand an invocation of macro `name` with `args`, substituting
    /// parameters textually into the body's operand and label fields.
    pub fn expand(&self, name: &str, args: &[String], call_line: u32) -> AsmResult<Vec<RawLine>> {
        let def = self
            .macros
            .get(name)
            .ok_or_else(|| AsmError::Macro { line: call_line, message: format!("unknown macro `{}`", name) })?;
        if args.len() != def.params.len() {
            return Err(AsmError::Macro {
                line: call_line,
                message: format!("macro `{}` expects {} argument(s), got {}", name, def.params.len(), args.len()),
            });
        }
        let bindings: HashMap<String, String> =
            def.params.iter().cloned().zip(args.iter().cloned()).collect();
        Ok(def
            .body
            .iter()
            .map(|line| RawLine {
                line: call_line,
                label: line.label.as_deref().map(|l| substitute(l, &bindings)),
                mnemonic: line.mnemonic.clone(),
                operands: line.operands.iter().map(|op| substitute(op, &bindings)).collect(),
                comment: line.comment.clone(),
            })
            .collect())
    }
}

/// Scan `lines` for `name: MACRO p1, p2` ... `ENDM` blocks, removing them
/// from the stream and recording them in a fresh [`MacroTable`] (seeded
/// with the standard library). Returns the remaining lines plus the table
/// used to expand any subsequent invocation.
pub fn extract_definitions(lines: Vec<RawLine>) -> AsmResult<(Vec<RawLine>, MacroTable)> {
    let mut table = MacroTable::with_standard_library();
    let mut out = Vec::with_capacity(lines.len());
    let mut iter = lines.into_iter().peekable();

    while let Some(line) = iter.next() {
        if line.mnemonic.as_deref() == Some("MACRO") {
            let name = line
                .label
                .clone()
                .ok_or_else(|| AsmError::Macro { line: line.line, message: "MACRO requires a name label".into() })?;
            let params = line.operands.clone();
            let mut body = Vec::new();
            loop {
                let next = iter.next().ok_or_else(|| AsmError::Macro {
                    line: line.line,
                    message: format!("MACRO `{}` has no matching ENDM", name),
                })?;
                if next.mnemonic.as_deref() == Some("ENDM") {
                    break;
                }
                body.push(next);
            }
            table.macros.insert(name, MacroDef { params, body });
        } else {
            out.push(line);
        }
    }
    Ok((out, table))
}

/// Expand every macro invocation in `lines` against `table`, once
/// (bodies may reference other macros only through the standard library,
/// which never recurses, so a single pass is sufficient for spec.md's
/// macro model).
pub fn expand_invocations(lines: Vec<RawLine>, table: &MacroTable) -> AsmResult<Vec<RawLine>> {
    let mut out = Vec::with_capacity(lines.len());
    for line in lines {
        match &line.mnemonic {
            Some(mnemonic) if table.contains(mnemonic) => {
                let expanded = table.expand(mnemonic, &line.operands, line.line)?;
                if let Some(label) = &line.label {
                    out.push(RawLine { line: line.line, label: Some(label.clone()), ..Default::default() });
                }
                out.extend(expanded);
            }
            _ => out.push(line),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::parse_line;

    #[test]
    fn user_macro_is_extracted_and_expanded() {
        let lines = vec![
            parse_line("double: MACRO reg", 1),
            parse_line("    ADD A, reg", 2),
            parse_line("ENDM", 3),
            parse_line("    double B", 4),
        ];
        let (remaining, table) = extract_definitions(lines).unwrap();
        assert_eq!(remaining.len(), 1);
        let expanded = expand_invocations(remaining, &table).unwrap();
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0].mnemonic.as_deref(), Some("ADD"));
        assert_eq!(expanded[0].operands, vec!["A", "B"]);
    }

    #[test]
    fn standard_library_macro_expands_without_a_user_definition() {
        let table = MacroTable::with_standard_library();
        let expanded = table.expand("PUSH_ALL", &[], 1).unwrap();
        assert_eq!(expanded.len(), 4);
        assert_eq!(expanded[0].operands, vec!["AF"]);
    }

    #[test]
    fn wrong_argument_count_is_an_error() {
        let table = MacroTable::with_standard_library();
        let err = table.expand("CLEAR_HL", &["extra".into()], 1).unwrap_err();
        assert!(matches!(err, AsmError::Macro { .. }));
    }
}
