//! Assembler directives: `ORG`, `EQU`, `DB`/`DW`/`DS`, `END`, and the
//! platform-selection pair `TARGET`/`MODEL` (SPEC_FULL.md §4.11).

use crate::error::{AsmError, AsmResult};
use crate::expr::{self, Expr};

/// The directive keywords this assembler recognizes, classified from a
/// raw mnemonic string.
#[derive(Clone, Debug, PartialEq)]
pub enum Directive {
    /// `ORG expr` — set the output address.
    Org(Expr),
    /// `name EQU expr` — define a constant (the name is the line's label,
    /// not an operand, so this variant only carries the value).
    Equ(Expr),
    /// `DB`/`DEFB` — byte data; each item is either a string literal's
    /// encoded bytes or a single evaluable expression.
    DefB(Vec<DataItem>),
    /// `DW`/`DEFW` — word data, each item a 16-bit expression.
    DefW(Vec<Expr>),
    /// `DS`/`DEFS` — reserve `count` bytes, optionally filled with `fill`.
    DefS { count: Expr, fill: Option<Expr> },
    /// `END` — stop assembling (trailing source is ignored, matching the
    /// classic assemblers' behavior).
    End,
    /// `TARGET name` — select a named platform's standard symbols and
    /// default origin (SPEC_FULL.md §4.11; consumed by the driver, which
    /// owns the platform table).
    Target(String),
    /// `MODEL name` — platform sub-variant (e.g. a CP/M memory model); the
    /// driver decides what, if anything, this changes.
    Model(String),
}

fn parse_data_items(line: u32, operands: &[String]) -> AsmResult<Vec<DataItem>> {
    let mut items = Vec::new();
    for operand in operands {
        let trimmed = operand.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('"') && trimmed.ends_with('"') {
            items.push(DataItem::Bytes(trimmed[1..trimmed.len() - 1].bytes().collect()));
        } else {
            items.push(DataItem::Value(expr::parse(trimmed, line)?));
        }
    }
    Ok(items)
}

/// One item in a `DB` list: either a literal byte run (a string) or a
/// single expression to be evaluated to a byte.
#[derive(Clone, Debug, PartialEq)]
pub enum DataItem {
    /// Raw bytes from a string literal.
    Bytes(Vec<u8>),
    /// A single byte-valued expression.
    Value(Expr),
}

/// Classify `mnemonic` as a directive and parse its operands, or return
/// `None` if it names a CPU instruction instead.
pub fn classify(line: u32, mnemonic: &str, operands: &[String]) -> AsmResult<Option<Directive>> {
    let directive = match mnemonic {
        "ORG" => {
            require_operands(line, operands, 1)?;
            Directive::Org(expr::parse(&operands[0], line)?)
        }
        "EQU" => {
            require_operands(line, operands, 1)?;
            Directive::Equ(expr::parse(&operands[0], line)?)
        }
        "DB" | "DEFB" => Directive::DefB(parse_data_items(line, operands)?),
        "DW" | "DEFW" => {
            let mut values = Vec::with_capacity(operands.len());
            for operand in operands {
                values.push(expr::parse(operand, line)?);
            }
            Directive::DefW(values)
        }
        "DS" | "DEFS" => {
            if operands.is_empty() || operands.len() > 2 {
                return Err(AsmError::Directive { line, message: "DS takes a count and an optional fill value".into() });
            }
            let count = expr::parse(&operands[0], line)?;
            let fill = if operands.len() == 2 { Some(expr::parse(&operands[1], line)?) } else { None };
            Directive::DefS { count, fill }
        }
        "END" => Directive::End,
        "TARGET" => {
            require_operands(line, operands, 1)?;
            Directive::Target(operands[0].trim_matches('"').to_string())
        }
        "MODEL" => {
            require_operands(line, operands, 1)?;
            Directive::Model(operands[0].trim_matches('"').to_string())
        }
        _ => return Ok(None),
    };
    Ok(Some(directive))
}

fn require_operands(line: u32, operands: &[String], count: usize) -> AsmResult<()> {
    if operands.len() != count {
        return Err(AsmError::Directive {
            line,
            message: format!("expected {} operand(s), got {}", count, operands.len()),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn org_and_equ_parse_their_expression() {
        assert!(matches!(classify(1, "ORG", &["0x8000".into()]).unwrap(), Some(Directive::Org(_))));
        assert!(matches!(classify(1, "EQU", &["5".into()]).unwrap(), Some(Directive::Equ(_))));
    }

    #[test]
    fn db_accepts_mixed_strings_and_values() {
        let d = classify(1, "DB", &["\"hi\"".into(), "0".into()]).unwrap().unwrap();
        match d {
            Directive::DefB(items) => {
                assert_eq!(items.len(), 2);
                assert!(matches!(&items[0], DataItem::Bytes(b) if b == b"hi"));
                assert!(matches!(&items[1], DataItem::Value(_)));
            }
            _ => panic!("expected DefB"),
        }
    }

    #[test]
    fn non_directive_mnemonic_is_none() {
        assert!(classify(1, "LD", &["A".into(), "5".into()]).unwrap().is_none());
    }

    #[test]
    fn target_and_model_capture_the_platform_name() {
        assert_eq!(classify(1, "TARGET", &["zxspectrum".into()]).unwrap(), Some(Directive::Target("zxspectrum".into())));
        assert_eq!(classify(1, "MODEL", &["cpm".into()]).unwrap(), Some(Directive::Model("cpm".into())));
    }
}
