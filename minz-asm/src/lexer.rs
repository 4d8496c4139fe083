//! Splits one line of source text into its label, mnemonic, and
//! comma-separated operand fields. Z80 assembly is line-oriented, so a
//! full tokenizer would be overkill (spec.md §9); this is the same
//! shallow split every classic Z80 assembler's front end performs.

/// One source line split into its syntactic fields. `line` is 1-based.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawLine {
    /// 1-based source line number.
    pub line: u32,
    /// A label defined on this line, if any, including a leading `.` for a
    /// local label.
    pub label: Option<String>,
    /// The mnemonic or directive keyword, uppercased.
    pub mnemonic: Option<String>,
    /// Operand text, comma-split, each entry trimmed but not otherwise
    /// parsed.
    pub operands: Vec<String>,
    /// Trailing comment text, if any (without the leading `;`).
    pub comment: Option<String>,
}

fn split_commas_respecting_strings(text: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut depth = 0i32;
    let mut in_quote: Option<char> = None;
    for c in text.chars() {
        match in_quote {
            Some(q) => {
                current.push(c);
                if c == q {
                    in_quote = None;
                }
            }
            None => match c {
                '\'' | '"' => {
                    in_quote = Some(c);
                    current.push(c);
                }
                '(' => {
                    depth += 1;
                    current.push(c);
                }
                ')' => {
                    depth -= 1;
                    current.push(c);
                }
                ',' if depth <= 0 => {
                    fields.push(current.trim().to_string());
                    current = String::new();
                }
                _ => current.push(c),
            },
        }
    }
    if !current.trim().is_empty() || !fields.is_empty() {
        fields.push(current.trim().to_string());
    }
    fields
}

fn strip_comment(text: &str) -> (String, Option<String>) {
    let mut in_quote: Option<char> = None;
    for (i, c) in text.char_indices() {
        match in_quote {
            Some(q) => {
                if c == q {
                    in_quote = None;
                }
            }
            None => {
                if c == '\'' || c == '"' {
                    in_quote = Some(c);
                } else if c == ';' {
                    return (text[..i].to_string(), Some(text[i + 1..].trim().to_string()));
                }
            }
        }
    }
    (text.to_string(), None)
}

/// Parse one raw source line. Never fails: an unrecognized shape is simply
/// represented as best-effort fields, and the assembler driver is what
/// turns a bad mnemonic into an [`crate::AsmError`].
pub fn parse_line(text: &str, line: u32) -> RawLine {
    let (code, comment) = strip_comment(text);
    let code = code.trim_end();

    if code.trim().is_empty() {
        return RawLine { line, comment, ..Default::default() };
    }

    let starts_with_space = code.starts_with(' ') || code.starts_with('\t');
    let trimmed = code.trim_start();

    let mut label = None;
    let mut rest = trimmed;

    if !starts_with_space {
        let label_end = trimmed
            .find(|c: char| c.is_whitespace() || c == ':')
            .unwrap_or(trimmed.len());
        let candidate = &trimmed[..label_end];
        if !candidate.is_empty()
            && (candidate.starts_with('.') || candidate.chars().next().unwrap().is_ascii_alphabetic() || candidate.starts_with('_'))
        {
            label = Some(candidate.to_string());
            rest = trimmed[label_end..].trim_start();
            if let Some(stripped) = rest.strip_prefix(':') {
                rest = stripped.trim_start();
            }
        }
    }

    if rest.is_empty() {
        return RawLine { line, label, comment, ..Default::default() };
    }

    let mnemonic_end = rest.find(|c: char| c.is_whitespace()).unwrap_or(rest.len());
    let mnemonic = rest[..mnemonic_end].to_uppercase();
    let operand_text = rest[mnemonic_end..].trim();
    let operands = if operand_text.is_empty() {
        Vec::new()
    } else {
        split_commas_respecting_strings(operand_text)
    };

    RawLine { line, label, mnemonic: Some(mnemonic), operands, comment }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_mnemonic_and_operands() {
        let l = parse_line("start: LD A, 5 ; load", 1);
        assert_eq!(l.label.as_deref(), Some("start"));
        assert_eq!(l.mnemonic.as_deref(), Some("LD"));
        assert_eq!(l.operands, vec!["A", "5"]);
        assert_eq!(l.comment.as_deref(), Some("load"));
    }

    #[test]
    fn mnemonic_only_line_with_leading_whitespace_has_no_label() {
        let l = parse_line("    RET", 2);
        assert_eq!(l.label, None);
        assert_eq!(l.mnemonic.as_deref(), Some("RET"));
    }

    #[test]
    fn label_only_line() {
        let l = parse_line("loop:", 3);
        assert_eq!(l.label.as_deref(), Some("loop"));
        assert_eq!(l.mnemonic, None);
    }

    #[test]
    fn commas_inside_indexed_operand_do_not_split() {
        let l = parse_line("    LD A, (IX+5)", 4);
        assert_eq!(l.operands, vec!["A", "(IX+5)"]);
    }

    #[test]
    fn local_label_starts_with_dot() {
        let l = parse_line(".loop: DJNZ .loop", 5);
        assert_eq!(l.label.as_deref(), Some(".loop"));
    }

    #[test]
    fn semicolon_inside_quotes_is_not_a_comment() {
        let l = parse_line("    DB 'a;b'", 6);
        assert_eq!(l.operands, vec!["'a;b'"]);
        assert_eq!(l.comment, None);
    }
}
