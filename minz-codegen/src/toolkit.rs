//! The backend toolkit: a fluent builder producing the five tables spec.md
//! §3/§4.2 describes, plus the generic driver that consumes them.
//!
//! This is deliberately the *cheap* way to stand up a new backend (spec.md
//! §4.2: "sufficient to stand up a minimal new backend in under ~200
//! lines"); Z80 and 6502 need richer SMC-aware emitters and so bypass the
//! generic driver entirely (see `isa::z80` / `isa::mos6502`).

use minz_ir::{Function, Instruction, Module, Op};
use std::collections::HashMap;

/// One placeholder recognized by [`Template`]. This is a small, fixed
/// grammar (spec.md §9's "tiny typed formatter, not generic string
/// search-and-replace") so a malformed template is caught when the
/// backend is built, not when it's first used to emit a function.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Placeholder {
    /// `%reg%`
    Reg,
    /// `%addr%`
    Addr,
    /// `%src1%`
    Src1,
    /// `%src2%`
    Src2,
    /// `%dest%`
    Dest,
    /// `%value%`
    Value,
}

impl Placeholder {
    fn token(self) -> &'static str {
        match self {
            Placeholder::Reg => "%reg%",
            Placeholder::Addr => "%addr%",
            Placeholder::Src1 => "%src1%",
            Placeholder::Src2 => "%src2%",
            Placeholder::Dest => "%dest%",
            Placeholder::Value => "%value%",
        }
    }

    const ALL: [Placeholder; 6] = [
        Placeholder::Reg,
        Placeholder::Addr,
        Placeholder::Src1,
        Placeholder::Src2,
        Placeholder::Dest,
        Placeholder::Value,
    ];
}

/// A parsed template: literal text interspersed with placeholders, built
/// once at backend-construction time so a typo like `%dst%` is a panic at
/// `TemplateMap::insert` rather than a silently-unreplaced token in
/// emitted assembly.
#[derive(Clone, Debug)]
pub struct Template {
    parts: Vec<TemplatePart>,
}

#[derive(Clone, Debug)]
enum TemplatePart {
    Literal(String),
    Hole(Placeholder),
}

impl Template {
    /// Parse `source`, recognizing the fixed placeholder grammar. Panics
    /// on an unrecognized `%...%` token — this is a backend-construction
    /// time error, not a runtime one.
    pub fn parse(source: &str) -> Template {
        let mut parts = Vec::new();
        let mut rest = source;
        'outer: while !rest.is_empty() {
            if let Some(pos) = rest.find('%') {
                if pos > 0 {
                    parts.push(TemplatePart::Literal(rest[..pos].to_string()));
                }
                let after = &rest[pos..];
                for ph in Placeholder::ALL {
                    if after.starts_with(ph.token()) {
                        parts.push(TemplatePart::Hole(ph));
                        rest = &after[ph.token().len()..];
                        continue 'outer;
                    }
                }
                panic!("malformed backend template: unrecognized placeholder at `{}`", after);
            } else {
                parts.push(TemplatePart::Literal(rest.to_string()));
                break;
            }
        }
        Template { parts }
    }

    /// Substitute every hole using `lookup`, concatenating literal runs
    /// verbatim.
    pub fn render(&self, lookup: impl Fn(Placeholder) -> String) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                TemplatePart::Literal(s) => out.push_str(s),
                TemplatePart::Hole(ph) => out.push_str(&lookup(*ph)),
            }
        }
        out
    }
}

/// How a target formats integer constants in assembly text (spec.md
/// §4.2).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum IntegerIdiom {
    /// `$1234`
    DollarHex,
    /// `0x1234`
    CHex,
    /// `1234H` (with a leading `0` if the first hex digit is a letter).
    HSuffixHex,
    /// Plain decimal.
    Decimal,
}

impl IntegerIdiom {
    /// Format `value` per this idiom.
    pub fn format(&self, value: i64) -> String {
        match self {
            IntegerIdiom::DollarHex => format!("${:X}", value),
            IntegerIdiom::CHex => format!("{:#X}", value).replacen("0X", "0x", 1),
            IntegerIdiom::HSuffixHex => {
                let hex = format!("{:X}", value);
                if hex.as_bytes()[0].is_ascii_alphabetic() {
                    format!("0{}H", hex)
                } else {
                    format!("{}H", hex)
                }
            }
            IntegerIdiom::Decimal => value.to_string(),
        }
    }
}

/// A calling-convention descriptor (spec.md §3).
#[derive(Clone, Debug)]
pub struct CallingConvention {
    /// `true` if parameters pass in registers; `false` for stack-only
    /// targets.
    pub registers_for_params: bool,
    /// Name of the register the return value comes back in, for display
    /// purposes only.
    pub return_register: &'static str,
    /// Prologue template, rendered with no placeholders bound (a function
    /// header has no operand context yet).
    pub prologue: Template,
    /// Epilogue template.
    pub epilogue: Template,
}

/// The five tables a backend built from [`ToolkitBuilder`] owns, per
/// spec.md §3 "Backend toolkit tables".
#[derive(Clone, Debug)]
pub struct BackendToolkit {
    mnemonics: HashMap<&'static str, &'static str>,
    patterns: HashMap<&'static str, Template>,
    physical_names: HashMap<u32, &'static str>,
    calling_convention: CallingConvention,
    type_sizes: HashMap<&'static str, u32>,
    integer_idiom: IntegerIdiom,
}

/// Fluent builder for [`BackendToolkit`].
#[derive(Default)]
pub struct ToolkitBuilder {
    mnemonics: HashMap<&'static str, &'static str>,
    patterns: HashMap<&'static str, Template>,
    physical_names: HashMap<u32, &'static str>,
    calling_convention: Option<CallingConvention>,
    type_sizes: HashMap<&'static str, u32>,
    integer_idiom: IntegerIdiom,
}

impl ToolkitBuilder {
    /// A fresh builder defaulting to decimal integer formatting.
    pub fn new() -> ToolkitBuilder {
        ToolkitBuilder { integer_idiom: IntegerIdiom::Decimal, ..Default::default() }
    }

    /// Map opcode name `op` to `mnemonic` in the instruction-to-mnemonic
    /// map.
    pub fn mnemonic(mut self, op: &'static str, mnemonic: &'static str) -> Self {
        self.mnemonics.insert(op, mnemonic);
        self
    }

    /// Register a named pattern template, parsed eagerly so a malformed
    /// placeholder panics here rather than at emission time.
    pub fn pattern(mut self, name: &'static str, template: &str) -> Self {
        self.patterns.insert(name, Template::parse(template));
        self
    }

    /// Map virtual register number `vreg` to the physical register name
    /// `name`.
    pub fn physical_reg(mut self, vreg: u32, name: &'static str) -> Self {
        self.physical_names.insert(vreg, name);
        self
    }

    /// Set the calling-convention descriptor.
    pub fn calling_convention(mut self, cc: CallingConvention) -> Self {
        self.calling_convention = Some(cc);
        self
    }

    /// Record the byte size of primitive type `name`.
    pub fn type_size(mut self, name: &'static str, size: u32) -> Self {
        self.type_sizes.insert(name, size);
        self
    }

    /// Set the integer-literal formatting idiom.
    pub fn integer_idiom(mut self, idiom: IntegerIdiom) -> Self {
        self.integer_idiom = idiom;
        self
    }

    /// Finish building. Panics if no calling convention was set — every
    /// backend needs one.
    pub fn build(self) -> BackendToolkit {
        BackendToolkit {
            mnemonics: self.mnemonics,
            patterns: self.patterns,
            physical_names: self.physical_names,
            calling_convention: self
                .calling_convention
                .expect("ToolkitBuilder::build: no calling convention set"),
            type_sizes: self.type_sizes,
            integer_idiom: self.integer_idiom,
        }
    }
}

impl BackendToolkit {
    /// Look up the mnemonic for an opcode name, keyed the same way
    /// [`opcode_key`] names it.
    pub fn mnemonic(&self, op_key: &str) -> Option<&'static str> {
        self.mnemonics.get(op_key).copied()
    }

    /// Look up a named pattern template.
    pub fn pattern(&self, name: &str) -> Option<&Template> {
        self.patterns.get(name)
    }

    /// Look up the physical register name for virtual register `vreg`.
    pub fn physical_reg(&self, vreg: u32) -> Option<&'static str> {
        self.physical_names.get(&vreg).copied()
    }

    /// The calling-convention descriptor.
    pub fn calling_convention(&self) -> &CallingConvention {
        &self.calling_convention
    }

    /// Format an integer constant per this target's idiom.
    pub fn format_integer(&self, value: i64) -> String {
        self.integer_idiom.format(value)
    }

    /// The recorded size of primitive type `name`, if known.
    pub fn type_size(&self, name: &str) -> Option<u32> {
        self.type_sizes.get(name).copied()
    }
}

/// A stable string key for an [`Op`] variant, used to index
/// [`BackendToolkit`]'s mnemonic map (the map is keyed by `&'static str`
/// rather than `Op` itself so it can be a plain `HashMap` built from
/// string literals at backend-construction time).
pub fn opcode_key(op: &Op) -> &'static str {
    match op {
        Op::Const => "const",
        Op::Move => "move",
        Op::Add => "add",
        Op::Sub => "sub",
        Op::Mul => "mul",
        Op::Div => "div",
        Op::Rem => "rem",
        Op::And => "and",
        Op::Or => "or",
        Op::Xor => "xor",
        Op::Shl => "shl",
        Op::Shr => "shr",
        Op::Not => "not",
        Op::Neg => "neg",
        Op::Cmp(_) => "cmp",
        Op::Jump => "jump",
        Op::JumpIfTrue => "jump_if_true",
        Op::JumpIfFalse => "jump_if_false",
        Op::Label => "label",
        Op::Call => "call",
        Op::Return => "return",
        Op::LoadVar => "load_var",
        Op::StoreVar => "store_var",
        Op::LoadParam => "load_param",
        Op::LoadIndex => "load_index",
        Op::LoadAddr => "load_addr",
        Op::LoadString => "load_string",
        Op::Print(_) => "print",
        Op::SmcLoadConst => "smc_load_const",
        Op::SmcStoreConst => "smc_store_const",
        Op::InlineAsm => "inline_asm",
    }
}

/// The generic driver (spec.md §4.2): consumes only a [`BackendToolkit`]
/// and a [`Module`], producing target text for every function by looking
/// up each instruction's opcode in the mnemonic map. Unmapped opcodes emit
/// a `TODO` comment and are reported via `on_unsupported`, matching spec.md
/// §7's warn-and-continue policy for `UnsupportedOpcode`.
pub fn generic_drive(
    toolkit: &BackendToolkit,
    module: &Module,
    mut on_unsupported: impl FnMut(&Function, &Instruction),
) -> String {
    let mut out = String::new();
    out.push_str(&format!("; module: {}\n", module.name));

    for func in &module.functions {
        out.push_str(&format!("; function {}\n", func.name));
        out.push_str(&format!("{}:\n", func.label_safe_name()));
        out.push_str(&toolkit.calling_convention().prologue.render(|_| String::new()));
        out.push('\n');

        for inst in &func.instructions {
            let key = opcode_key(&inst.op);
            match toolkit.mnemonic(key) {
                Some(mnemonic) => {
                    out.push_str("    ");
                    out.push_str(mnemonic);
                    if let Some(imm) = inst.imm {
                        out.push(' ');
                        out.push_str(&toolkit.format_integer(imm));
                    }
                    out.push('\n');
                }
                None => {
                    out.push_str(&format!("    ; TODO: unsupported opcode {:?}\n", inst.op));
                    on_unsupported(func, inst);
                }
            }
        }

        out.push_str(&toolkit.calling_convention().epilogue.render(|_| String::new()));
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_renders_known_holes() {
        let t = Template::parse("ld %dest%, %src1%");
        let rendered = t.render(|ph| match ph {
            Placeholder::Dest => "a".into(),
            Placeholder::Src1 => "b".into(),
            _ => "?".into(),
        });
        assert_eq!(rendered, "ld a, b");
    }

    #[test]
    #[should_panic(expected = "malformed backend template")]
    fn template_panics_on_unknown_placeholder() {
        Template::parse("ld %dst%, %src1%");
    }

    #[test]
    fn integer_idioms() {
        assert_eq!(IntegerIdiom::DollarHex.format(0x1234), "$1234");
        assert_eq!(IntegerIdiom::Decimal.format(42), "42");
        assert_eq!(IntegerIdiom::HSuffixHex.format(0xA0), "0A0H");
        assert_eq!(IntegerIdiom::HSuffixHex.format(0x20), "20H");
    }

    #[test]
    fn generic_drive_emits_todo_for_unmapped_opcode() {
        use minz_ir::{Function, Instruction, Module, Op, Type};
        let toolkit = ToolkitBuilder::new()
            .mnemonic("return", "ret")
            .calling_convention(CallingConvention {
                registers_for_params: false,
                return_register: "r0",
                prologue: Template::parse("push frame"),
                epilogue: Template::parse("pop frame"),
            })
            .build();
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![], Type::void());
        f.instructions.push(Instruction::new(Op::Add));
        f.instructions.push(Instruction::new(Op::Return));
        module.functions.push(f);

        let mut unsupported = Vec::new();
        let text = generic_drive(&toolkit, &module, |_f, i| unsupported.push(i.op.clone()));
        assert!(text.contains("TODO"));
        assert!(text.contains("ret"));
        assert_eq!(unsupported, vec![Op::Add]);
    }
}
