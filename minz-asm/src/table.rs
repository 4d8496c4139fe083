//! The Z80 instruction pattern table: operand parsing plus the encoder
//! that turns a mnemonic and its operands into opcode bytes (spec.md §4.8,
//! "full documented and undocumented instruction set").
//!
//! Z80 instruction *lengths* never depend on an operand's resolved value
//! (unlike x86's variable-width immediates), only on its syntactic shape —
//! a register, `(HL)`, `(IX+d)`, an 8-bit immediate, a 16-bit immediate, a
//! relative branch. That lets pass one compute every label's address from
//! shapes alone, with no forward-reference problem; pass two then just
//! evaluates the already-shaped operands to bytes.

use crate::error::{AsmError, AsmResult};
use crate::expr::{self, Expr};
use crate::symbol::SymbolTable;

/// An 8-bit register operand, numbered the way Z80 opcode bytes encode
/// them in their 3-bit register fields (`(HL)` itself is represented
/// separately as [`Operand::RegIndirect`], not as a `Reg8`).
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg8 {
    B,
    C,
    D,
    E,
    H,
    L,
    A,
}

impl Reg8 {
    fn field(self) -> u8 {
        match self {
            Reg8::B => 0,
            Reg8::C => 1,
            Reg8::D => 2,
            Reg8::E => 3,
            Reg8::H => 4,
            Reg8::L => 5,
            Reg8::A => 7,
        }
    }

    fn parse(name: &str) -> Option<Reg8> {
        Some(match name {
            "B" => Reg8::B,
            "C" => Reg8::C,
            "D" => Reg8::D,
            "E" => Reg8::E,
            "H" => Reg8::H,
            "L" => Reg8::L,
            "A" => Reg8::A,
            _ => return None,
        })
    }
}

/// An undocumented `IXH`/`IXL`/`IYH`/`IYL` half-index register.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Half {
    High,
    Low,
}

/// A 16-bit register pair, numbered per the `dd`/`ss`/`qq` opcode fields.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Reg16 {
    Bc,
    De,
    Hl,
    SpOrAf,
}

impl Reg16 {
    fn field(self) -> u8 {
        match self {
            Reg16::Bc => 0,
            Reg16::De => 1,
            Reg16::Hl => 2,
            Reg16::SpOrAf => 3,
        }
    }

    fn parse(name: &str) -> Option<Reg16> {
        Some(match name {
            "BC" => Reg16::Bc,
            "DE" => Reg16::De,
            "HL" => Reg16::Hl,
            "SP" => Reg16::SpOrAf,
            "AF" => Reg16::SpOrAf,
            _ => return None,
        })
    }
}

/// `IX` or `IY`, selecting the `0xDD`/`0xFD` prefix byte.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum IndexPrefix {
    Ix,
    Iy,
}

impl IndexPrefix {
    fn byte(self) -> u8 {
        match self {
            IndexPrefix::Ix => 0xDD,
            IndexPrefix::Iy => 0xFD,
        }
    }
}

/// A condition code, numbered per the opcode's 3-bit `cc` field.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Cond {
    Nz,
    Z,
    Nc,
    C,
    Po,
    Pe,
    P,
    M,
}

impl Cond {
    fn field(self) -> u8 {
        match self {
            Cond::Nz => 0,
            Cond::Z => 1,
            Cond::Nc => 2,
            Cond::C => 3,
            Cond::Po => 4,
            Cond::Pe => 5,
            Cond::P => 6,
            Cond::M => 7,
        }
    }

    /// Only `NZ`/`Z`/`NC`/`C` are valid with `JR`'s shorter encoding.
    fn is_jr_condition(self) -> bool {
        matches!(self, Cond::Nz | Cond::Z | Cond::Nc | Cond::C)
    }

    fn parse(name: &str) -> Option<Cond> {
        Some(match name {
            "NZ" => Cond::Nz,
            "Z" => Cond::Z,
            "NC" => Cond::Nc,
            "C" => Cond::C,
            "PO" => Cond::Po,
            "PE" => Cond::Pe,
            "P" => Cond::P,
            "M" => Cond::M,
            _ => return None,
        })
    }
}

/// One parsed operand. Carries enough shape information for pass one to
/// size the instruction without evaluating any [`Expr`].
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    Reg(Reg8),
    IndexedHalf(IndexPrefix, Half),
    RegIndirectHl,
    RegIndirectBc,
    RegIndirectDe,
    RegIndirectSp,
    Indexed(IndexPrefix, Expr),
    Reg16(Reg16),
    IndexReg(IndexPrefix),
    Condition(Cond),
    Port,
    Immediate(Expr),
    IndirectImmediate(Expr),
    A,
    I,
    R,
    AfShadow,
}

fn strip_plus_prefix(text: &str) -> &str {
    text.strip_prefix('+').unwrap_or(text)
}

/// Parse one operand's source text.
pub fn parse_operand(text: &str, line: u32) -> AsmResult<Operand> {
    let text = text.trim();
    let upper = text.to_uppercase();

    if upper == "A" {
        return Ok(Operand::A);
    }
    if upper == "I" {
        return Ok(Operand::I);
    }
    if upper == "R" {
        return Ok(Operand::R);
    }
    if upper == "AF'" {
        return Ok(Operand::AfShadow);
    }
    if upper == "IX" {
        return Ok(Operand::IndexReg(IndexPrefix::Ix));
    }
    if upper == "IY" {
        return Ok(Operand::IndexReg(IndexPrefix::Iy));
    }
    if upper == "IXH" {
        return Ok(Operand::IndexedHalf(IndexPrefix::Ix, Half::High));
    }
    if upper == "IXL" {
        return Ok(Operand::IndexedHalf(IndexPrefix::Ix, Half::Low));
    }
    if upper == "IYH" {
        return Ok(Operand::IndexedHalf(IndexPrefix::Iy, Half::High));
    }
    if upper == "IYL" {
        return Ok(Operand::IndexedHalf(IndexPrefix::Iy, Half::Low));
    }
    if let Some(r) = Reg8::parse(&upper) {
        return Ok(Operand::Reg(r));
    }
    if let Some(r) = Reg16::parse(&upper) {
        return Ok(Operand::Reg16(r));
    }
    if let Some(c) = Cond::parse(&upper) {
        return Ok(Operand::Condition(c));
    }

    if text.starts_with('(') && text.ends_with(')') {
        let inner = text[1..text.len() - 1].trim();
        let inner_upper = inner.to_uppercase();
        if inner_upper == "HL" {
            return Ok(Operand::RegIndirectHl);
        }
        if inner_upper == "BC" {
            return Ok(Operand::RegIndirectBc);
        }
        if inner_upper == "DE" {
            return Ok(Operand::RegIndirectDe);
        }
        if inner_upper == "C" {
            return Ok(Operand::Port);
        }
        if inner_upper == "SP" {
            return Ok(Operand::RegIndirectSp);
        }
        if let Some(rest) = inner_upper.strip_prefix("IX") {
            let offset = if rest.trim().is_empty() { Expr::Number(0) } else { expr::parse(strip_plus_prefix(rest.trim()), line)? };
            return Ok(Operand::Indexed(IndexPrefix::Ix, offset));
        }
        if let Some(rest) = inner_upper.strip_prefix("IY") {
            let offset = if rest.trim().is_empty() { Expr::Number(0) } else { expr::parse(strip_plus_prefix(rest.trim()), line)? };
            return Ok(Operand::Indexed(IndexPrefix::Iy, offset));
        }
        return Ok(Operand::IndirectImmediate(expr::parse(inner, line)?));
    }

    Ok(Operand::Immediate(expr::parse(text, line)?))
}

fn parse_all(operands: &[String], line: u32) -> AsmResult<Vec<Operand>> {
    operands.iter().map(|op| parse_operand(op, line)).collect()
}

/// Bytes that still need their immediate appended: shared shape between
/// pass one (length only) and pass two (full value).
struct Encoded {
    prefix_and_opcode: Vec<u8>,
    immediate: Immediate,
}

enum Immediate {
    None,
    Byte(Expr),
    Word(Expr),
    RelativeByte(Expr),
    /// `DD CB <d> <op>` / `FD CB <d> <op>`: a displacement byte followed
    /// by a fixed opcode byte, the one shape where the trailing field
    /// isn't the value of an operand the caller wrote.
    DdCb(Expr, u8),
    /// `LD (IX+d), n`: a displacement byte followed by the immediate
    /// value being stored.
    IndexedStore(Expr, Expr),
}

fn encoded_len(e: &Encoded) -> u32 {
    e.prefix_and_opcode.len() as u32
        + match e.immediate {
            Immediate::None => 0,
            Immediate::Byte(_) | Immediate::RelativeByte(_) => 1,
            Immediate::Word(_) => 2,
            Immediate::DdCb(_, _) | Immediate::IndexedStore(_, _) => 2,
        }
}

/// Compute this instruction's length in bytes without evaluating any
/// expression, by parsing its operand shapes.
pub fn length(line: u32, mnemonic: &str, operand_text: &[String]) -> AsmResult<u32> {
    let operands = parse_all(operand_text, line)?;
    let encoded = build(line, mnemonic, &operands)?;
    Ok(encoded_len(&encoded))
}

/// Encode this instruction to final bytes. `here` is the address of the
/// first byte of this instruction (used for `$` and relative branches).
pub fn encode(line: u32, mnemonic: &str, operand_text: &[String], symbols: &SymbolTable, here: u16) -> AsmResult<Vec<u8>> {
    let operands = parse_all(operand_text, line)?;
    let encoded = build(line, mnemonic, &operands)?;
    let mut out = encoded.prefix_and_opcode;
    match encoded.immediate {
        Immediate::None => {}
        Immediate::Byte(expr) => out.push(expr::eval(&expr, symbols, here, line)? as u8),
        Immediate::Word(expr) => {
            let value = expr::eval(&expr, symbols, here, line)? as u16;
            out.extend_from_slice(&value.to_le_bytes());
        }
        Immediate::RelativeByte(expr) => {
            let target = expr::eval(&expr, symbols, here, line)? as i64;
            let next_pc = here as i64 + out.len() as i64 + 1;
            let displacement = target - next_pc;
            if !(-128..=127).contains(&displacement) {
                return Err(AsmError::RelativeRangeExceeded { line, target: target as u16, displacement: displacement as i32 });
            }
            out.push(displacement as u8);
        }
        Immediate::DdCb(offset, op) => {
            let d = expr::eval(&offset, symbols, here, line)? as u8;
            out.push(d);
            out.push(op);
        }
        Immediate::IndexedStore(offset, value) => {
            let d = expr::eval(&offset, symbols, here, line)? as u8;
            let n = expr::eval(&value, symbols, here, line)? as u8;
            out.push(d);
            out.push(n);
        }
    }
    Ok(out)
}

fn fixed(bytes: Vec<u8>) -> Encoded {
    Encoded { prefix_and_opcode: bytes, immediate: Immediate::None }
}

fn with_byte(bytes: Vec<u8>, e: Expr) -> Encoded {
    Encoded { prefix_and_opcode: bytes, immediate: Immediate::Byte(e) }
}

fn with_word(bytes: Vec<u8>, e: Expr) -> Encoded {
    Encoded { prefix_and_opcode: bytes, immediate: Immediate::Word(e) }
}

fn with_relative(bytes: Vec<u8>, e: Expr) -> Encoded {
    Encoded { prefix_and_opcode: bytes, immediate: Immediate::RelativeByte(e) }
}

/// `true` if `op` addresses `(HL)` (the "register" slot 6 in the 3-bit
/// field), used to reject `(IX+d)`/half-register combinations that have
/// no real encoding (`LD IXH, (HL)` doesn't exist).
fn reg8_field(op: &Operand) -> Option<u8> {
    match op {
        Operand::Reg(r) => Some(r.field()),
        Operand::RegIndirectHl => Some(6),
        _ => None,
    }
}

fn unknown(line: u32, mnemonic: &str, operands: &[Operand]) -> AsmError {
    AsmError::UnknownMnemonic {
        line,
        mnemonic: mnemonic.to_string(),
        operands: operands.iter().map(|o| format!("{:?}", o)).collect::<Vec<_>>().join(", "),
    }
}

fn build(line: u32, mnemonic: &str, ops: &[Operand]) -> AsmResult<Encoded> {
    use Operand::*;

    let err = || unknown(line, mnemonic, ops);

    match (mnemonic, ops) {
        ("NOP", []) => Ok(fixed(vec![0x00])),
        ("HALT", []) => Ok(fixed(vec![0x76])),
        ("DI", []) => Ok(fixed(vec![0xF3])),
        ("EI", []) => Ok(fixed(vec![0xFB])),
        ("RLCA", []) => Ok(fixed(vec![0x07])),
        ("RRCA", []) => Ok(fixed(vec![0x0F])),
        ("RLA", []) => Ok(fixed(vec![0x17])),
        ("RRA", []) => Ok(fixed(vec![0x1F])),
        ("DAA", []) => Ok(fixed(vec![0x27])),
        ("CPL", []) => Ok(fixed(vec![0x2F])),
        ("SCF", []) => Ok(fixed(vec![0x37])),
        ("CCF", []) => Ok(fixed(vec![0x3F])),
        ("EXX", []) => Ok(fixed(vec![0xD9])),
        ("NEG", []) => Ok(fixed(vec![0xED, 0x44])),
        ("RETN", []) => Ok(fixed(vec![0xED, 0x45])),
        ("RETI", []) => Ok(fixed(vec![0xED, 0x4D])),
        ("RLD", []) => Ok(fixed(vec![0xED, 0x6F])),
        ("RRD", []) => Ok(fixed(vec![0xED, 0x67])),
        ("LDI", []) => Ok(fixed(vec![0xED, 0xA0])),
        ("LDIR", []) => Ok(fixed(vec![0xED, 0xB0])),
        ("LDD", []) => Ok(fixed(vec![0xED, 0xA8])),
        ("LDDR", []) => Ok(fixed(vec![0xED, 0xB8])),
        ("CPI", []) => Ok(fixed(vec![0xED, 0xA1])),
        ("CPIR", []) => Ok(fixed(vec![0xED, 0xB1])),
        ("CPD", []) => Ok(fixed(vec![0xED, 0xA9])),
        ("CPDR", []) => Ok(fixed(vec![0xED, 0xB9])),
        ("INI", []) => Ok(fixed(vec![0xED, 0xA2])),
        ("INIR", []) => Ok(fixed(vec![0xED, 0xB2])),
        ("IND", []) => Ok(fixed(vec![0xED, 0xAA])),
        ("INDR", []) => Ok(fixed(vec![0xED, 0xBA])),
        ("OUTI", []) => Ok(fixed(vec![0xED, 0xA3])),
        ("OTIR", []) => Ok(fixed(vec![0xED, 0xB3])),
        ("OUTD", []) => Ok(fixed(vec![0xED, 0xAB])),
        ("OTDR", []) => Ok(fixed(vec![0xED, 0xBB])),
        ("RET", []) => Ok(fixed(vec![0xC9])),
        ("RET", [Condition(c)]) => Ok(fixed(vec![0xC0 | (c.field() << 3)])),

        ("IM", [Immediate(Expr::Number(0))]) => Ok(fixed(vec![0xED, 0x46])),
        ("IM", [Immediate(Expr::Number(1))]) => Ok(fixed(vec![0xED, 0x56])),
        ("IM", [Immediate(Expr::Number(2))]) => Ok(fixed(vec![0xED, 0x5E])),

        ("EX", [Reg16(Reg16::De), Reg16(Reg16::Hl)]) => Ok(fixed(vec![0xEB])),
        ("EX", [A, AfShadow]) => Ok(fixed(vec![0x08])),
        ("EX", [Reg16(Reg16::SpOrAf), AfShadow]) => Ok(fixed(vec![0x08])),
        ("EX", [RegIndirectSp, Reg16(Reg16::Hl)]) => Ok(fixed(vec![0xE3])),
        ("EX", [RegIndirectSp, IndexReg(p)]) => Ok(fixed(vec![p.byte(), 0xE3])),

        ("PUSH", [Reg16(r)]) => Ok(fixed(vec![0xC5 | (r.field() << 4)])),
        ("POP", [Reg16(r)]) => Ok(fixed(vec![0xC1 | (r.field() << 4)])),
        ("PUSH", [IndexReg(p)]) => Ok(fixed(vec![p.byte(), 0xE5])),
        ("POP", [IndexReg(p)]) => Ok(fixed(vec![p.byte(), 0xE1])),

        ("JP", [Immediate(e)]) => Ok(with_word(vec![0xC3], e.clone())),
        ("JP", [Condition(c), Immediate(e)]) => Ok(with_word(vec![0xC2 | (c.field() << 3)], e.clone())),
        ("JP", [RegIndirectHl]) => Ok(fixed(vec![0xE9])),
        ("JP", [IndexReg(p)]) => Ok(fixed(vec![p.byte(), 0xE9])),
        ("JR", [Immediate(e)]) => Ok(with_relative(vec![0x18], e.clone())),
        ("JR", [Condition(c), Immediate(e)]) if c.is_jr_condition() => {
            Ok(with_relative(vec![0x20 | (c.field() << 3)], e.clone()))
        }
        ("DJNZ", [Immediate(e)]) => Ok(with_relative(vec![0x10], e.clone())),
        ("CALL", [Immediate(e)]) => Ok(with_word(vec![0xCD], e.clone())),
        ("CALL", [Condition(c), Immediate(e)]) => Ok(with_word(vec![0xC4 | (c.field() << 3)], e.clone())),
        ("RST", [Immediate(Expr::Number(n))]) if [0, 8, 0x10, 0x18, 0x20, 0x28, 0x30, 0x38].contains(n) => {
            Ok(fixed(vec![0xC7 | (*n as u8)]))
        }

        ("IN", [A, Port]) => Ok(fixed(vec![0xED, 0x78])),
        ("IN", [A, IndirectImmediate(e)]) => Ok(with_byte(vec![0xDB], e.clone())),
        ("IN", [Reg(r), Port]) => Ok(fixed(vec![0xED, 0x40 | (r.field() << 3)])),
        ("OUT", [Port, A]) => Ok(fixed(vec![0xED, 0x79])),
        ("OUT", [IndirectImmediate(e), A]) => Ok(with_byte(vec![0xD3], e.clone())),
        ("OUT", [Port, Reg(r)]) => Ok(fixed(vec![0xED, 0x41 | (r.field() << 3)])),

        ("LD", [A, I]) => Ok(fixed(vec![0xED, 0x57])),
        ("LD", [A, R]) => Ok(fixed(vec![0xED, 0x5F])),
        ("LD", [I, A]) => Ok(fixed(vec![0xED, 0x47])),
        ("LD", [R, A]) => Ok(fixed(vec![0xED, 0x4F])),
        ("LD", [Reg16(Reg16::SpOrAf), Reg16(Reg16::Hl)]) => Ok(fixed(vec![0xF9])),
        ("LD", [Reg16(Reg16::SpOrAf), IndexReg(p)]) => Ok(fixed(vec![p.byte(), 0xF9])),
        ("LD", [a, b]) if reg8_field(a).is_some() && reg8_field(b).is_some() => {
            let (da, db) = (reg8_field(a).unwrap(), reg8_field(b).unwrap());
            if da == 6 && db == 6 {
                return Err(err()); // (HL),(HL) is HALT, not a load
            }
            Ok(fixed(vec![0x40 | (da << 3) | db]))
        }
        ("LD", [a, Immediate(e)]) if reg8_field(a).is_some() => {
            Ok(with_byte(vec![0x06 | (reg8_field(a).unwrap() << 3)], e.clone()))
        }
        ("LD", [IndexedHalf(p, h), Immediate(e)]) => {
            let reg_field = half_field(*h);
            Ok(with_byte(vec![p.byte(), 0x06 | (reg_field << 3)], e.clone()))
        }
        ("LD", [IndexedHalf(p, dst), IndexedHalf(q, src)]) if p == q => {
            Ok(fixed(vec![p.byte(), 0x40 | (half_field(*dst) << 3) | half_field(*src)]))
        }
        ("LD", [a, IndexedHalf(p, src)]) if matches!(a, Reg(_)) => {
            let da = reg8_field(a).unwrap();
            Ok(fixed(vec![p.byte(), 0x40 | (da << 3) | half_field(*src)]))
        }
        ("LD", [IndexedHalf(p, dst), b]) if matches!(b, Reg(_)) => {
            let db = reg8_field(b).unwrap();
            Ok(fixed(vec![p.byte(), 0x40 | (half_field(*dst) << 3) | db]))
        }
        ("LD", [Indexed(p, off), Immediate(e)]) => {
            Ok(Encoded { prefix_and_opcode: vec![p.byte(), 0x36], immediate: Immediate::IndexedStore(off.clone(), e.clone()) })
        }
        ("LD", [a, Indexed(p, off)]) if matches!(a, Reg(_)) => {
            Ok(Encoded {
                prefix_and_opcode: vec![p.byte(), 0x46 | (reg8_field(a).unwrap() << 3)],
                immediate: Immediate::Byte(off.clone()),
            })
        }
        ("LD", [Indexed(p, off), b]) if matches!(b, Reg(_)) => Ok(Encoded {
            prefix_and_opcode: vec![p.byte(), 0x70 | reg8_field(b).unwrap()],
            immediate: Immediate::Byte(off.clone()),
        }),
        ("LD", [RegIndirectBc, A]) => Ok(fixed(vec![0x02])),
        ("LD", [RegIndirectDe, A]) => Ok(fixed(vec![0x12])),
        ("LD", [A, RegIndirectBc]) => Ok(fixed(vec![0x0A])),
        ("LD", [A, RegIndirectDe]) => Ok(fixed(vec![0x1A])),
        ("LD", [A, IndirectImmediate(e)]) => Ok(with_word(vec![0x3A], e.clone())),
        ("LD", [IndirectImmediate(e), A]) => Ok(with_word(vec![0x32], e.clone())),
        ("LD", [Reg16(Reg16::Hl), IndirectImmediate(e)]) => Ok(with_word(vec![0x2A], e.clone())),
        ("LD", [IndirectImmediate(e), Reg16(Reg16::Hl)]) => Ok(with_word(vec![0x22], e.clone())),
        ("LD", [Reg16(r), IndirectImmediate(e)]) => Ok(with_word(vec![0xED, 0x4B | (r.field() << 4)], e.clone())),
        ("LD", [IndirectImmediate(e), Reg16(r)]) => Ok(with_word(vec![0xED, 0x43 | (r.field() << 4)], e.clone())),
        ("LD", [IndexReg(p), IndirectImmediate(e)]) => Ok(with_word(vec![p.byte(), 0x2A], e.clone())),
        ("LD", [IndirectImmediate(e), IndexReg(p)]) => Ok(with_word(vec![p.byte(), 0x22], e.clone())),
        ("LD", [Reg16(r), Immediate(e)]) => Ok(with_word(vec![0x01 | (r.field() << 4)], e.clone())),
        ("LD", [IndexReg(p), Immediate(e)]) => Ok(with_word(vec![p.byte(), 0x21], e.clone())),

        ("ADD", [A, b]) if reg8_field(b).is_some() => Ok(fixed(vec![0x80 | reg8_field(b).unwrap()])),
        ("ADD", [A, Immediate(e)]) => Ok(with_byte(vec![0xC6], e.clone())),
        ("ADD", [A, IndexedHalf(p, h)]) => Ok(fixed(vec![p.byte(), 0x80 | half_field(*h)])),
        ("ADD", [A, Indexed(p, off)]) => Ok(Encoded { prefix_and_opcode: vec![p.byte(), 0x86], immediate: Immediate::Byte(off.clone()) }),
        ("ADC", [A, b]) if reg8_field(b).is_some() => Ok(fixed(vec![0x88 | reg8_field(b).unwrap()])),
        ("ADC", [A, Immediate(e)]) => Ok(with_byte(vec![0xCE], e.clone())),
        ("SUB", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0x90 | reg8_field(b).unwrap()])),
        ("SUB", [Immediate(e)]) => Ok(with_byte(vec![0xD6], e.clone())),
        ("SBC", [A, b]) if reg8_field(b).is_some() => Ok(fixed(vec![0x98 | reg8_field(b).unwrap()])),
        ("SBC", [A, Immediate(e)]) => Ok(with_byte(vec![0xDE], e.clone())),
        ("AND", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xA0 | reg8_field(b).unwrap()])),
        ("AND", [Immediate(e)]) => Ok(with_byte(vec![0xE6], e.clone())),
        ("XOR", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xA8 | reg8_field(b).unwrap()])),
        ("XOR", [Immediate(e)]) => Ok(with_byte(vec![0xEE], e.clone())),
        ("OR", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xB0 | reg8_field(b).unwrap()])),
        ("OR", [Immediate(e)]) => Ok(with_byte(vec![0xF6], e.clone())),
        ("CP", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xB8 | reg8_field(b).unwrap()])),
        ("CP", [Immediate(e)]) => Ok(with_byte(vec![0xFE], e.clone())),

        ("INC", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0x04 | (reg8_field(b).unwrap() << 3)])),
        ("DEC", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0x05 | (reg8_field(b).unwrap() << 3)])),
        ("INC", [Reg16(r)]) => Ok(fixed(vec![0x03 | (r.field() << 4)])),
        ("DEC", [Reg16(r)]) => Ok(fixed(vec![0x0B | (r.field() << 4)])),
        ("INC", [IndexReg(p)]) => Ok(fixed(vec![p.byte(), 0x23])),
        ("DEC", [IndexReg(p)]) => Ok(fixed(vec![p.byte(), 0x2B])),
        ("INC", [Indexed(p, off)]) => Ok(Encoded { prefix_and_opcode: vec![p.byte(), 0x34], immediate: Immediate::Byte(off.clone()) }),
        ("DEC", [Indexed(p, off)]) => Ok(Encoded { prefix_and_opcode: vec![p.byte(), 0x35], immediate: Immediate::Byte(off.clone()) }),
        ("INC", [IndexedHalf(p, h)]) => Ok(fixed(vec![p.byte(), 0x04 | (half_field(*h) << 3)])),
        ("DEC", [IndexedHalf(p, h)]) => Ok(fixed(vec![p.byte(), 0x05 | (half_field(*h) << 3)])),

        ("ADD", [Reg16(Reg16::Hl), Reg16(r)]) => Ok(fixed(vec![0x09 | (r.field() << 4)])),
        ("ADC", [Reg16(Reg16::Hl), Reg16(r)]) => Ok(fixed(vec![0xED, 0x4A | (r.field() << 4)])),
        ("SBC", [Reg16(Reg16::Hl), Reg16(r)]) => Ok(fixed(vec![0xED, 0x42 | (r.field() << 4)])),
        ("ADD", [IndexReg(p), Reg16(r)]) => Ok(fixed(vec![p.byte(), 0x09 | (r.field() << 4)])),
        ("ADD", [IndexReg(p), IndexReg(q)]) if *p == *q => Ok(fixed(vec![p.byte(), 0x29])),

        ("RLC", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xCB, reg8_field(b).unwrap()])),
        ("RRC", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xCB, 0x08 | reg8_field(b).unwrap()])),
        ("RL", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xCB, 0x10 | reg8_field(b).unwrap()])),
        ("RR", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xCB, 0x18 | reg8_field(b).unwrap()])),
        ("SLA", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xCB, 0x20 | reg8_field(b).unwrap()])),
        ("SRA", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xCB, 0x28 | reg8_field(b).unwrap()])),
        ("SLL", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xCB, 0x30 | reg8_field(b).unwrap()])),
        ("SRL", [b]) if reg8_field(b).is_some() => Ok(fixed(vec![0xCB, 0x38 | reg8_field(b).unwrap()])),
        ("RLC", [Indexed(p, off)]) => Ok(ddcb(*p, off.clone(), 0x06)),
        ("RRC", [Indexed(p, off)]) => Ok(ddcb(*p, off.clone(), 0x0E)),
        ("RL", [Indexed(p, off)]) => Ok(ddcb(*p, off.clone(), 0x16)),
        ("RR", [Indexed(p, off)]) => Ok(ddcb(*p, off.clone(), 0x1E)),
        ("SLA", [Indexed(p, off)]) => Ok(ddcb(*p, off.clone(), 0x26)),
        ("SRA", [Indexed(p, off)]) => Ok(ddcb(*p, off.clone(), 0x2E)),
        ("SLL", [Indexed(p, off)]) => Ok(ddcb(*p, off.clone(), 0x36)),
        ("SRL", [Indexed(p, off)]) => Ok(ddcb(*p, off.clone(), 0x3E)),

        ("BIT", [Immediate(Expr::Number(bit)), b]) if (0..8).contains(bit) && reg8_field(b).is_some() => {
            Ok(fixed(vec![0xCB, 0x40 | ((*bit as u8) << 3) | reg8_field(b).unwrap()]))
        }
        ("SET", [Immediate(Expr::Number(bit)), b]) if (0..8).contains(bit) && reg8_field(b).is_some() => {
            Ok(fixed(vec![0xCB, 0xC0 | ((*bit as u8) << 3) | reg8_field(b).unwrap()]))
        }
        ("RES", [Immediate(Expr::Number(bit)), b]) if (0..8).contains(bit) && reg8_field(b).is_some() => {
            Ok(fixed(vec![0xCB, 0x80 | ((*bit as u8) << 3) | reg8_field(b).unwrap()]))
        }
        ("BIT", [Immediate(Expr::Number(bit)), Indexed(p, off)]) if (0..8).contains(bit) => {
            Ok(ddcb(*p, off.clone(), 0x40 | ((*bit as u8) << 3)))
        }
        ("SET", [Immediate(Expr::Number(bit)), Indexed(p, off)]) if (0..8).contains(bit) => {
            Ok(ddcb(*p, off.clone(), 0xC0 | ((*bit as u8) << 3)))
        }
        ("RES", [Immediate(Expr::Number(bit)), Indexed(p, off)]) if (0..8).contains(bit) => {
            Ok(ddcb(*p, off.clone(), 0x80 | ((*bit as u8) << 3)))
        }

        _ => Err(err()),
    }
}

fn half_field(h: Half) -> u8 {
    match h {
        Half::High => 4,
        Half::Low => 5,
    }
}

/// `DD CB <d> <op>` / `FD CB <d> <op>`: the one shape where the
/// displacement byte precedes the opcode byte instead of following it, so
/// it needs its own two-byte [`Immediate::DdCb`] variant rather than the
/// ordinary single trailing field.
fn ddcb(prefix: IndexPrefix, offset: Expr, op: u8) -> Encoded {
    Encoded {
        prefix_and_opcode: vec![prefix.byte(), 0xCB],
        immediate: Immediate::DdCb(offset, op),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn syms() -> SymbolTable {
        SymbolTable::new()
    }

    fn enc(mnemonic: &str, operands: &[&str]) -> Vec<u8> {
        let operands: Vec<String> = operands.iter().map(|s| s.to_string()).collect();
        encode(1, mnemonic, &operands, &syms(), 0x8000).unwrap()
    }

    #[test]
    fn nop_and_halt() {
        assert_eq!(enc("NOP", &[]), vec![0x00]);
        assert_eq!(enc("HALT", &[]), vec![0x76]);
    }

    #[test]
    fn ld_register_to_register() {
        assert_eq!(enc("LD", &["A", "B"]), vec![0x78]);
        assert_eq!(enc("LD", &["B", "C"]), vec![0x41]);
    }

    #[test]
    fn ld_register_immediate() {
        assert_eq!(enc("LD", &["A", "5"]), vec![0x3E, 5]);
    }

    #[test]
    fn ld_reg16_immediate() {
        assert_eq!(enc("LD", &["HL", "0x1234"]), vec![0x21, 0x34, 0x12]);
    }

    #[test]
    fn push_and_pop() {
        assert_eq!(enc("PUSH", &["BC"]), vec![0xC5]);
        assert_eq!(enc("POP", &["HL"]), vec![0xE1]);
    }

    #[test]
    fn call_and_ret() {
        assert_eq!(enc("CALL", &["0x8100"]), vec![0xCD, 0x00, 0x81]);
        assert_eq!(enc("RET", &[]), vec![0xC9]);
    }

    #[test]
    fn bit_set_res_on_register() {
        assert_eq!(enc("BIT", &["7", "A"]), vec![0xCB, 0x7F]);
        assert_eq!(enc("SET", &["0", "B"]), vec![0xCB, 0xC0]);
        assert_eq!(enc("RES", &["3", "C"]), vec![0xCB, 0x99]);
    }

    #[test]
    fn undocumented_half_index_registers() {
        assert_eq!(enc("LD", &["A", "IXH"]), vec![0xDD, 0x7C]);
        assert_eq!(enc("LD", &["IYL", "3"]), vec![0xFD, 0x2E, 3]);
    }

    #[test]
    fn indexed_load_with_displacement() {
        assert_eq!(enc("LD", &["A", "(IX+5)"]), vec![0xDD, 0x7E, 5]);
    }

    #[test]
    fn relative_jump_computes_signed_displacement() {
        let operands = vec!["0x8002".to_string()];
        let out = encode(1, "JR", &operands, &syms(), 0x8000).unwrap();
        assert_eq!(out, vec![0x18, 0x00]);
    }

    #[test]
    fn relative_jump_out_of_range_is_an_error() {
        let operands = vec!["0x9000".to_string()];
        let err = encode(1, "JR", &operands, &syms(), 0x8000).unwrap_err();
        assert!(matches!(err, AsmError::RelativeRangeExceeded { .. }));
    }

    #[test]
    fn unknown_shape_is_an_error() {
        let operands = vec!["BC".to_string(), "DE".to_string()];
        assert!(encode(1, "LD", &operands, &syms(), 0).is_err());
    }
}
