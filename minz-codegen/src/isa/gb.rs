//! The Game Boy LR35902 backend (spec.md §4.5): Z80-like mnemonics, but no
//! shadow registers, no `IX`/`IY`, and a cartridge header at 0x0150 instead
//! of a frame-pointer-relative origin.

use crate::backend::Backend;
use crate::error::CodegenResult;
use crate::features::{Feature, FeatureSet};
use crate::options::GenOptions;
use crate::packager;
use crate::target_config::TargetConfig;
use minz_ir::{CmpOp, Function, Instruction, Module, Op, PrintKind, VReg};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::OnceLock;

fn target_config() -> &'static TargetConfig {
    static CONFIG: OnceLock<TargetConfig> = OnceLock::new();
    CONFIG.get_or_init(|| TargetConfig {
        name: "gb",
        file_extension: ".gb.s",
        default_origin: 0x0150,
        ram_start: 0xC000,
        ram_size: 0x2000,
        rom_start: Some(0x0000),
        rom_size: Some(0x8000),
        screen_base: None,
        stack_top: 0xFFFE,
        standard_symbols: &[],
        packager: packager::raw,
    })
}

/// The Game Boy backend. Per spec.md's resolved REDESIGN FLAG, this refuses
/// SMC: the program lives in banked ROM, which cannot be patched at runtime
/// the way a Spectrum's RAM-resident code can.
#[derive(Default)]
pub struct GbBackend;

impl Backend for GbBackend {
    fn name(&self) -> &'static str {
        "gb"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet::none()
            .with(Feature::Pointer16)
            .with(Feature::InlineAssembly)
            .with(Feature::IndirectCalls)
            .with(Feature::BitManipulation)
            .with(Feature::BlockInstructions)
    }

    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String> {
        let text = emit_module(module);
        if options.debug {
            log::debug!("gb: generated {} bytes for module `{}`", text.len(), module.name);
        }
        Ok(text)
    }

    fn file_extension(&self) -> &'static str {
        ".gb.s"
    }

    fn target_config(&self) -> &TargetConfig {
        target_config()
    }
}

pub(super) fn factory() -> Box<dyn Backend> {
    Box::new(GbBackend)
}

/// Per-function spill storage: unlike the Z80 backend, every slot is a
/// fixed absolute WRAM address rather than an `(IX+n)` offset, since this
/// backend grants neither `IX` nor `IY`.
struct FrameLayout {
    addresses: HashMap<u32, u16>,
}

impl FrameLayout {
    fn build(func: &Function, base: u16) -> FrameLayout {
        let mut addresses = HashMap::new();
        let mut next = base;
        let mut note = |id: u32, addresses: &mut HashMap<u32, u16>, next: &mut u16| {
            if id != 0 && !addresses.contains_key(&id) {
                addresses.insert(id, *next);
                *next += 2;
            }
        };
        for inst in &func.instructions {
            note(inst.dest.index(), &mut addresses, &mut next);
            note(inst.src1.index(), &mut addresses, &mut next);
            note(inst.src2.index(), &mut addresses, &mut next);
            for a in &inst.args {
                note(a.index(), &mut addresses, &mut next);
            }
        }
        FrameLayout { addresses }
    }

    fn slot(&self, reg: VReg) -> String {
        match self.addresses.get(&reg.index()) {
            Some(addr) => format!("${:04X}", addr),
            None => "$C000".to_string(),
        }
    }
}

fn emit_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "SECTION \"header\", ROM0[$0150]");
    let _ = writeln!(out, "; module: {}", module.name);
    let mut base = 0xC000u16;
    for func in &module.functions {
        emit_function(func, base, &mut out);
        base = base.wrapping_add(0x0200);
    }
    out
}

fn emit_function(func: &Function, base: u16, out: &mut String) {
    let _ = writeln!(out, "; function {}", func.name);
    let frame = FrameLayout::build(func, base);
    let label = func.label_safe_name();
    let _ = writeln!(out, "{}:", label);

    for (i, param) in func.params.iter().enumerate() {
        let _ = writeln!(out, "    ; parameter {} at stack offset {}", param.name, i * 2);
    }

    for inst in &func.instructions {
        emit_instruction(inst, &frame, out);
    }
    let _ = writeln!(out, "    RET");
}

fn emit_instruction(inst: &Instruction, frame: &FrameLayout, out: &mut String) {
    match &inst.op {
        Op::Const => {
            let _ = writeln!(out, "    LD HL, {}", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    LD A, L");
            let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
            let _ = writeln!(out, "    LD A, H");
            let _ = writeln!(out, "    LD [{}+1], A", frame.slot(inst.dest));
        }
        Op::Move => {
            let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src1));
            let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
            let _ = writeln!(out, "    LD A, [{}+1]", frame.slot(inst.src1));
            let _ = writeln!(out, "    LD [{}+1], A", frame.slot(inst.dest));
        }
        Op::Add | Op::Sub | Op::And | Op::Or | Op::Xor => {
            let mnemonic = match inst.op {
                Op::Add => "ADD",
                Op::Sub => "SUB",
                Op::And => "AND",
                Op::Or => "OR",
                Op::Xor => "XOR",
                _ => unreachable!(),
            };
            let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src1));
            let _ = writeln!(out, "    {} A, [{}]", mnemonic, frame.slot(inst.src2));
            let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
        }
        Op::Mul | Op::Div | Op::Rem | Op::Shl | Op::Shr | Op::Not | Op::Neg => {
            let _ = writeln!(out, "    ; TODO: unsupported opcode {:?}", inst.op);
        }
        Op::Cmp(cmp) => emit_compare(*cmp, inst, frame, out),
        Op::Jump => {
            let _ = writeln!(out, "    JP {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfTrue => {
            let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src1));
            let _ = writeln!(out, "    OR A");
            let _ = writeln!(out, "    JP NZ, {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfFalse => {
            let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src1));
            let _ = writeln!(out, "    OR A");
            let _ = writeln!(out, "    JP Z, {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Label => {
            let _ = writeln!(out, "{}:", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Call => {
            let _ = writeln!(out, "    CALL {}", inst.symbol.as_deref().unwrap_or("?"));
            if !inst.dest.is_none() {
                let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
            }
        }
        Op::Return => {
            if !inst.src1.is_none() {
                let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src1));
            }
        }
        Op::LoadVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LD A, [{}]", sym);
            let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
        }
        Op::StoreVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src1));
            let _ = writeln!(out, "    LD [{}], A", sym);
        }
        Op::LoadParam => {
            let _ = writeln!(out, "    ; parameter {} loaded from the caller's stack frame", inst.symbol.as_deref().unwrap_or("?"));
        }
        Op::LoadIndex => {
            let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src1));
            let _ = writeln!(out, "    LD L, A");
            let _ = writeln!(out, "    LD A, [{}+1]", frame.slot(inst.src1));
            let _ = writeln!(out, "    LD H, A");
            let _ = writeln!(out, "    LD BC, {}", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    ADD HL, BC");
            let _ = writeln!(out, "    LD A, [HL]");
            let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
        }
        Op::LoadAddr => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LD HL, {}", sym);
            let _ = writeln!(out, "    LD A, L");
            let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
            let _ = writeln!(out, "    LD A, H");
            let _ = writeln!(out, "    LD [{}+1], A", frame.slot(inst.dest));
        }
        Op::LoadString => {
            let sym = inst.string.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(out, "    LD HL, {}", sym);
            let _ = writeln!(out, "    LD A, L");
            let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
        }
        Op::Print(kind) => emit_print(*kind, inst, frame, out),
        Op::SmcLoadConst | Op::SmcStoreConst => {
            let _ = writeln!(out, "    ; TODO: unsupported opcode {:?} (gb grants no SMC feature)", inst.op);
        }
        Op::InlineAsm => {
            let _ = writeln!(out, "{}", inst.symbol.as_deref().unwrap_or(""));
        }
    }
    if let Some(comment) = &inst.comment {
        let _ = writeln!(out, "    ; {}", comment);
    }
}

fn emit_compare(cmp: CmpOp, inst: &Instruction, frame: &FrameLayout, out: &mut String) {
    let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src1));
    let _ = writeln!(out, "    LD B, A");
    let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src2));
    let _ = writeln!(out, "    CP B");
    let true_label = format!(".cmp_true_{}", inst.dest.index());
    let end_label = format!(".cmp_end_{}", inst.dest.index());
    let branch = match cmp {
        CmpOp::Eq => "JP Z,",
        CmpOp::Ne => "JP NZ,",
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => "JP C,",
        CmpOp::Ult | CmpOp::Ule | CmpOp::Ugt | CmpOp::Uge => "JP NC,",
    };
    let _ = writeln!(out, "    {} {}", branch, true_label);
    let _ = writeln!(out, "    XOR A");
    let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
    let _ = writeln!(out, "    JP {}", end_label);
    let _ = writeln!(out, "{}:", true_label);
    let _ = writeln!(out, "    LD A, 1");
    let _ = writeln!(out, "    LD [{}], A", frame.slot(inst.dest));
    let _ = writeln!(out, "{}:", end_label);
}

fn emit_print(kind: PrintKind, inst: &Instruction, frame: &FrameLayout, out: &mut String) {
    let routine = match kind {
        PrintKind::U8 => "print_u8",
        PrintKind::U16 => "print_u16",
        PrintKind::I8 => "print_i8",
        PrintKind::I16 => "print_i16",
        PrintKind::Bool => "print_bool",
        PrintKind::Str => "print_string",
    };
    let _ = writeln!(out, "    LD A, [{}]", frame.slot(inst.src1));
    let _ = writeln!(out, "    CALL {}", routine);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_section_is_pinned_to_0150() {
        let module = Module::new("m");
        let text = emit_module(&module);
        assert!(text.contains("ROM0[$0150]"));
    }

    #[test]
    fn no_smc_feature_is_granted() {
        let backend = GbBackend;
        assert!(!backend.supports(Feature::SelfModifyingCode));
        assert!(!backend.supports(Feature::ShadowRegisters));
    }

    #[test]
    fn emitted_text_never_mentions_index_registers() {
        let mut module = Module::new("m");
        let f = Function::new("f", vec![], minz_ir::Type::void());
        module.functions.push(f);
        let text = emit_module(&module);
        assert!(!text.contains("IX"));
        assert!(!text.contains("IY"));
    }
}
