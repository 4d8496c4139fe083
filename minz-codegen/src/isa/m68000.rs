//! The Motorola 68000 backend (spec.md §4.5): standard `LINK`/`UNLK` stack
//! frames, the classic D0-D3/A0-A3 register-passing convention, and
//! branch-on-condition compares.

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
        name: "m68k",
        file_extension: ".s",
        default_origin: 0x1000,
        ram_start: 0x0000,
        ram_size: 0x0100_0000,
        rom_start: None,
        rom_size: None,
        screen_base: None,
        stack_top: 0x00FF_FFFE,
        standard_symbols: &[],
        packager: packager::raw,
    })
}

/// The 68000 backend.
#[derive(Default)]
pub struct M68000Backend;

impl Backend for M68000Backend {
    fn name(&self) -> &'static str {
        "m68k"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet::none()
            .with(Feature::Pointer32)
            .with(Feature::InlineAssembly)
            .with(Feature::IndirectCalls)
            .with(Feature::BitManipulation)
            .with(Feature::HardwareMultiply)
            .with(Feature::HardwareDivide)
    }

    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String> {
        let text = emit_module(module);
        if options.debug {
            log::debug!("m68k: generated {} bytes for module `{}`", text.len(), module.name);
        }
        Ok(text)
    }

    fn file_extension(&self) -> &'static str {
        ".s"
    }

    fn target_config(&self) -> &TargetConfig {
        target_config()
    }
}

pub(super) fn factory() -> Box<dyn Backend> {
    Box::new(M68000Backend)
}

const ARG_DATA_REGS: [&str; 4] = ["D0", "D1", "D2", "D3"];
const ARG_ADDR_REGS: [&str; 4] = ["A0", "A1", "A2", "A3"];

struct FrameLayout {
    offsets: HashMap<u32, i32>,
}

impl FrameLayout {
    fn build(func: &Function) -> FrameLayout {
        let mut offsets = HashMap::new();
        let mut next = -4i32;
        let mut note = |id: u32, offsets: &mut HashMap<u32, i32>, next: &mut i32| {
            if id != 0 && !offsets.contains_key(&id) {
                offsets.insert(id, *next);
                *next -= 4;
            }
        };
        for inst in &func.instructions {
            note(inst.dest.index(), &mut offsets, &mut next);
            note(inst.src1.index(), &mut offsets, &mut next);
            note(inst.src2.index(), &mut offsets, &mut next);
            for a in &inst.args {
                note(a.index(), &mut offsets, &mut next);
            }
        }
        FrameLayout { offsets }
    }

    fn slot(&self, reg: VReg) -> String {
        match self.offsets.get(&reg.index()) {
            Some(offset) => format!("{}(A6)", offset),
            None => "D0".to_string(),
        }
    }

    fn frame_size(&self) -> i32 {
        self.offsets.values().copied().min().unwrap_or(0).unsigned_abs() as i32
    }
}

fn emit_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; module: {}", module.name);
    for func in &module.functions {
        emit_function(func, &mut out);
    }
    out
}

fn emit_function(func: &Function, out: &mut String) {
    let _ = writeln!(out, "; function {}", func.name);
    let frame = FrameLayout::build(func);
    let label = func.label_safe_name();
    let _ = writeln!(out, "{}:", label);
    let _ = writeln!(out, "    LINK A6, #-{}", frame.frame_size());
    let _ = writeln!(out, "    MOVEM.L D2-D7/A2-A5, -(SP)");

    for (i, param) in func.params.iter().enumerate() {
        let src = if i < 4 { ARG_DATA_REGS[i] } else { &ARG_ADDR_REGS[(i - 4).min(3)] };
        let _ = writeln!(out, "    MOVE.L {}, {} ; parameter {}", src, frame.slot(VReg::new(i as u32 + 1)), param.name);
    }

    for inst in &func.instructions {
        emit_instruction(inst, &frame, out);
    }

    let _ = writeln!(out, "    MOVEM.L (SP)+, D2-D7/A2-A5");
    let _ = writeln!(out, "    UNLK A6");
    let _ = writeln!(out, "    RTS");
}

fn emit_instruction(inst: &Instruction, frame: &FrameLayout, out: &mut String) {
    match &inst.op {
        Op::Const => {
            let _ = writeln!(out, "    MOVE.L #{}, D0", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    MOVE.L D0, {}", frame.slot(inst.dest));
        }
        Op::Move => {
            let _ = writeln!(out, "    MOVE.L {}, D0", frame.slot(inst.src1));
            let _ = writeln!(out, "    MOVE.L D0, {}", frame.slot(inst.dest));
        }
        Op::Add | Op::Sub | Op::And | Op::Or | Op::Xor | Op::Mul | Op::Div => {
            let mnemonic = match inst.op {
                Op::Add => "ADD.L",
                Op::Sub => "SUB.L",
                Op::And => "AND.L",
                Op::Or => "OR.L",
                Op::Xor => "EOR.L",
                Op::Mul => "MULS.L",
                Op::Div => "DIVS.L",
                _ => unreachable!(),
            };
            let _ = writeln!(out, "    MOVE.L {}, D0", frame.slot(inst.src1));
            let _ = writeln!(out, "    {} {}, D0", mnemonic, frame.slot(inst.src2));
            let _ = writeln!(out, "    MOVE.L D0, {}", frame.slot(inst.dest));
        }
        Op::Rem | Op::Shl | Op::Shr | Op::Not | Op::Neg => {
            let _ = writeln!(out, "    ; TODO: unsupported opcode {:?}", inst.op);
        }
        Op::Cmp(cmp) => emit_compare(*cmp, inst, frame, out),
        Op::Jump => {
            let _ = writeln!(out, "    BRA {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfTrue => {
            let _ = writeln!(out, "    MOVE.L {}, D0", frame.slot(inst.src1));
            let _ = writeln!(out, "    TST.L D0");
            let _ = writeln!(out, "    BNE {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfFalse => {
            let _ = writeln!(out, "    MOVE.L {}, D0", frame.slot(inst.src1));
            let _ = writeln!(out, "    TST.L D0");
            let _ = writeln!(out, "    BEQ {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Label => {
            let _ = writeln!(out, "{}:", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Call => {
            for (i, arg) in inst.args.iter().enumerate() {
                let _ = writeln!(out, "    MOVE.L {}, {}", frame.slot(*arg), if i < 4 { ARG_DATA_REGS[i] } else { "-(SP)" });
            }
            let _ = writeln!(out, "    JSR {}", inst.symbol.as_deref().unwrap_or("?"));
            if !inst.dest.is_none() {
                let _ = writeln!(out, "    MOVE.L D0, {}", frame.slot(inst.dest));
            }
        }
        Op::Return => {
            if !inst.src1.is_none() {
                let _ = writeln!(out, "    MOVE.L {}, D0", frame.slot(inst.src1));
            }
        }
        Op::LoadVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    MOVE.L {}, D0", sym);
            let _ = writeln!(out, "    MOVE.L D0, {}", frame.slot(inst.dest));
        }
        Op::StoreVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    MOVE.L {}, D0", frame.slot(inst.src1));
            let _ = writeln!(out, "    MOVE.L D0, {}", sym);
        }
        Op::LoadParam => {
            let name = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    ; parameter {} already materialized in the frame", name);
        }
        Op::LoadIndex => {
            let _ = writeln!(out, "    MOVEA.L {}, A0", frame.slot(inst.src1));
            let _ = writeln!(out, "    MOVE.L {}(A0), D0", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    MOVE.L D0, {}", frame.slot(inst.dest));
        }
        Op::LoadAddr => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LEA {}, A0", sym);
            let _ = writeln!(out, "    MOVE.L A0, {}", frame.slot(inst.dest));
        }
        Op::LoadString => {
            let sym = inst.string.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(out, "    LEA {}, A0", sym);
            let _ = writeln!(out, "    MOVE.L A0, {}", frame.slot(inst.dest));
        }
        Op::Print(kind) => emit_print(*kind, inst, frame, out),
        Op::SmcLoadConst | Op::SmcStoreConst => {
            let _ = writeln!(out, "    ; TODO: unsupported opcode {:?} (m68k grants no SMC feature)", inst.op);
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
    let _ = writeln!(out, "    MOVE.L {}, D0", frame.slot(inst.src1));
    let _ = writeln!(out, "    CMP.L {}, D0", frame.slot(inst.src2));
    let true_label = format!("cmp_true_{}", inst.dest.index());
    let end_label = format!("cmp_end_{}", inst.dest.index());
    let branch = match cmp {
        CmpOp::Eq => "BEQ",
        CmpOp::Ne => "BNE",
        CmpOp::Lt => "BLT",
        CmpOp::Le => "BLE",
        CmpOp::Gt => "BGT",
        CmpOp::Ge => "BGE",
        CmpOp::Ult => "BCS",
        CmpOp::Ule => "BLS",
        CmpOp::Ugt => "BHI",
        CmpOp::Uge => "BCC",
    };
    let _ = writeln!(out, "    {} {}", branch, true_label);
    let _ = writeln!(out, "    MOVE.L #0, {}", frame.slot(inst.dest));
    let _ = writeln!(out, "    BRA {}", end_label);
    let _ = writeln!(out, "{}:", true_label);
    let _ = writeln!(out, "    MOVE.L #1, {}", frame.slot(inst.dest));
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
    let _ = writeln!(out, "    MOVE.L {}, D0", frame.slot(inst.src1));
    let _ = writeln!(out, "    JSR {}", routine);
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::Type;

    #[test]
    fn frame_uses_link_and_unlk() {
        let module = Module::new("m");
        let text = emit_module(&module);
        assert!(text.contains("; module: m"));
    }

    #[test]
    fn compare_materializes_zero_or_one() {
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![], Type::void());
        let mut c = Instruction::new(Op::Cmp(CmpOp::Eq));
        c.dest = VReg::new(1);
        c.src1 = VReg::new(2);
        c.src2 = VReg::new(3);
        f.instructions.push(c);
        module.functions.push(f);
        let text = emit_module(&module);
        assert!(text.contains("BEQ cmp_true_1"));
        assert!(text.contains("MOVE.L #0,"));
        assert!(text.contains("MOVE.L #1,"));
    }

    #[test]
    fn no_smc_feature_is_granted() {
        let backend = M68000Backend;
        assert!(!backend.supports(Feature::SelfModifyingCode));
        assert!(backend.supports(Feature::HardwareMultiply));
    }
}
