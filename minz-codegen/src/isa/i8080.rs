//! The Intel 8080 backend (spec.md §4.5): the same IR lowered to pre-Z80
//! mnemonics, with no SMC, no shadow registers, and no relative branches.
//!
//! Three things distinguish this emitter from [`super::z80`] enough to
//! rule out reusing its driver: every mnemonic is the 8080 spelling
//! (`MVI`/`LXI`/`MOV` instead of `LD`, `JMP`/`JZ`/`JNZ` instead of
//! `JP`/`JP Z`/`JP NZ`), `Op::Mul` has no hardware backing and is instead
//! lowered to a call into a synthesized `__mul16` routine emitted at most
//! once per module, and parameters are always stack-resident — this
//! target grants no self-modifying-code feature.

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
        name: "i8080",
        file_extension: ".a80",
        default_origin: 0x0100,
        ram_start: 0x0000,
        ram_size: 0x10000,
        rom_start: None,
        rom_size: None,
        screen_base: None,
        stack_top: 0xFFFF,
        standard_symbols: &[],
        packager: packager::raw,
    })
}

/// The Intel 8080 backend.
#[derive(Default)]
pub struct I8080Backend;

impl Backend for I8080Backend {
    fn name(&self) -> &'static str {
        "i8080"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet::none()
            .with(Feature::Pointer16)
            .with(Feature::InlineAssembly)
            .with(Feature::IndirectCalls)
    }

    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String> {
        let text = emit_module(module);
        if options.debug {
            log::debug!("i8080: generated {} bytes for module `{}`", text.len(), module.name);
        }
        Ok(text)
    }

    fn file_extension(&self) -> &'static str {
        ".a80"
    }

    fn target_config(&self) -> &TargetConfig {
        target_config()
    }
}

pub(super) fn factory() -> Box<dyn Backend> {
    Box::new(I8080Backend)
}

/// Per-function spill-slot offsets, same scheme as the Z80 emitter's
/// `FrameLayout` but keyed off the 8080's own frame-pointer convention
/// (`(HL+offset)` computed explicitly, since the 8080 has no indexed
/// addressing mode).
struct FrameLayout {
    offsets: HashMap<u32, i16>,
}

impl FrameLayout {
    fn build(func: &Function) -> FrameLayout {
        let mut offsets = HashMap::new();
        let mut next = -2i16;
        let mut note = |id: u32, offsets: &mut HashMap<u32, i16>, next: &mut i16| {
            if id != 0 && !offsets.contains_key(&id) {
                offsets.insert(id, *next);
                *next -= 2;
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
            Some(offset) => format!("slot{:+}", offset),
            None => "HL".to_string(),
        }
    }
}

fn emit_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; module: {}", module.name);
    let mut mul_emitted = false;

    for func in &module.functions {
        emit_function(func, &mut out, &mut mul_emitted);
    }
    out
}

fn emit_function(func: &Function, out: &mut String, mul_emitted: &mut bool) {
    let _ = writeln!(out, "; function {}", func.name);
    let frame = FrameLayout::build(func);
    let label = func.label_safe_name();

    let _ = writeln!(out, "{}:", label);
    let _ = writeln!(out, "    PUSH H");

    for inst in &func.instructions {
        emit_instruction(func, inst, &frame, out, mul_emitted);
    }

    let _ = writeln!(out, "    POP H");
    let _ = writeln!(out, "    RET");
}

fn emit_instruction(func: &Function, inst: &Instruction, frame: &FrameLayout, out: &mut String, mul_emitted: &mut bool) {
    match &inst.op {
        Op::Const => {
            let _ = writeln!(out, "    LXI H, {}", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
        }
        Op::Move => {
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
            let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
        }
        Op::Add | Op::Sub | Op::And | Op::Or | Op::Xor => {
            let mnemonic = match inst.op {
                Op::Add => "DAD",
                Op::Sub => "__sub16",
                Op::And => "__and16",
                Op::Or => "__or16",
                Op::Xor => "__xor16",
                _ => unreachable!(),
            };
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
            let _ = writeln!(out, "    LXI D, 0");
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src2));
            let _ = writeln!(out, "    XCHG");
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
            let _ = writeln!(out, "    {} D", mnemonic);
            let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
        }
        Op::Mul => {
            if !*mul_emitted {
                emit_mul16(out);
                *mul_emitted = true;
            }
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
            let _ = writeln!(out, "    SHLD __mul_lhs");
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src2));
            let _ = writeln!(out, "    SHLD __mul_rhs");
            let _ = writeln!(out, "    CALL __mul16");
            let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
        }
        Op::Div | Op::Rem | Op::Shl | Op::Shr | Op::Not | Op::Neg => {
            let _ = writeln!(out, "    ; TODO: unsupported opcode {:?}", inst.op);
        }
        Op::Cmp(cmp) => emit_compare(*cmp, inst, frame, out),
        Op::Jump => {
            let _ = writeln!(out, "    JMP {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfTrue => {
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
            let _ = writeln!(out, "    MOV A, L");
            let _ = writeln!(out, "    ORA H");
            let _ = writeln!(out, "    JNZ {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfFalse => {
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
            let _ = writeln!(out, "    MOV A, L");
            let _ = writeln!(out, "    ORA H");
            let _ = writeln!(out, "    JZ {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Label => {
            let _ = writeln!(out, "{}:", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Call => emit_call(inst, frame, out),
        Op::Return => {
            if !inst.src1.is_none() {
                let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
            }
        }
        Op::LoadVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LHLD {}", sym);
            let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
        }
        Op::StoreVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
            let _ = writeln!(out, "    SHLD {}", sym);
        }
        Op::LoadParam => {
            let name = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LHLD param_{}", name);
            let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
        }
        Op::LoadIndex => {
            let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
            let _ = writeln!(out, "    LXI D, {}", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    DAD D");
            let _ = writeln!(out, "    MOV A, M");
            let _ = writeln!(out, "    STA {}", frame.slot(inst.dest));
        }
        Op::LoadAddr => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LXI H, {}", sym);
            let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
        }
        Op::LoadString => {
            let sym = inst.string.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(out, "    LXI H, {}", sym);
            let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
        }
        Op::Print(kind) => emit_print(*kind, inst, frame, out),
        Op::SmcLoadConst | Op::SmcStoreConst => {
            let _ = writeln!(out, "    ; TODO: unsupported opcode {:?} (i8080 grants no SMC feature)", inst.op);
        }
        Op::InlineAsm => {
            let _ = writeln!(out, "{}", inst.symbol.as_deref().unwrap_or(""));
        }
    }
    if let Some(comment) = &inst.comment {
        let _ = writeln!(out, "    ; {}", comment);
    }
    let _ = func;
}

fn emit_compare(cmp: CmpOp, inst: &Instruction, frame: &FrameLayout, out: &mut String) {
    let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
    let _ = writeln!(out, "    XCHG");
    let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src2));
    let _ = writeln!(out, "    MOV A, L");
    let _ = writeln!(out, "    SUB E");
    let _ = writeln!(out, "    MOV A, H");
    let _ = writeln!(out, "    SBB D");
    let true_label = format!(".cmp_true_{}", inst.dest.index());
    let end_label = format!(".cmp_end_{}", inst.dest.index());
    let branch = match cmp {
        CmpOp::Eq => "JZ",
        CmpOp::Ne => "JNZ",
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => "JM",
        CmpOp::Ult | CmpOp::Ule | CmpOp::Ugt | CmpOp::Uge => "JC",
    };
    let _ = writeln!(out, "    {} {}", branch, true_label);
    let _ = writeln!(out, "    LXI H, 0");
    let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
    let _ = writeln!(out, "    JMP {}", end_label);
    let _ = writeln!(out, "{}:", true_label);
    let _ = writeln!(out, "    LXI H, 1");
    let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
    let _ = writeln!(out, "{}:", end_label);
}

/// Absolute calls only — the 8080 has no relative branch instruction so
/// there is nothing to rewrite the way the Z80 assembler's `JR` would
/// need; every call/jump this emitter produces is already absolute.
fn emit_call(inst: &Instruction, frame: &FrameLayout, out: &mut String) {
    let callee = inst.symbol.as_deref().unwrap_or("?");
    for arg in &inst.args {
        let _ = writeln!(out, "    LHLD {}", frame.slot(*arg));
        let _ = writeln!(out, "    PUSH H");
    }
    let _ = writeln!(out, "    CALL {}", callee);
    if !inst.args.is_empty() {
        for _ in &inst.args {
            let _ = writeln!(out, "    POP D"); // discard; pops caller-pushed args back off
        }
    }
    if !inst.dest.is_none() {
        let _ = writeln!(out, "    SHLD {}", frame.slot(inst.dest));
    }
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
    let _ = writeln!(out, "    LHLD {}", frame.slot(inst.src1));
    let _ = writeln!(out, "    CALL {}", routine);
}

/// A 16-bit software multiply, synthesized once per module the first time
/// `Op::Mul` is lowered (spec.md §4.5: "idempotent: emit-once guarded").
/// Shift-and-add over the 16-bit multiplier.
fn emit_mul16(out: &mut String) {
    let _ = writeln!(out, "__mul_lhs: DW 0");
    let _ = writeln!(out, "__mul_rhs: DW 0");
    let _ = writeln!(out, "__mul16:");
    let _ = writeln!(out, "    LXI H, 0");
    let _ = writeln!(out, "    LXI B, 16");
    let _ = writeln!(out, "__mul16_loop:");
    let _ = writeln!(out, "    DAD H");
    let _ = writeln!(out, "    LDA __mul_rhs+1");
    let _ = writeln!(out, "    ANI 0x80");
    let _ = writeln!(out, "    JZ __mul16_skip");
    let _ = writeln!(out, "    LHLD __mul_lhs");
    let _ = writeln!(out, "    DAD H");
    let _ = writeln!(out, "__mul16_skip:");
    let _ = writeln!(out, "    LHLD __mul_rhs");
    let _ = writeln!(out, "    DAD H");
    let _ = writeln!(out, "    SHLD __mul_rhs");
    let _ = writeln!(out, "    DCX B");
    let _ = writeln!(out, "    MOV A, B");
    let _ = writeln!(out, "    ORA C");
    let _ = writeln!(out, "    JNZ __mul16_loop");
    let _ = writeln!(out, "    RET");
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Param, Type};

    #[test]
    fn pre_z80_mnemonics_are_used() {
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![], Type::void());
        let mut c = Instruction::new(Op::Const);
        c.dest = VReg::new(1);
        c.imm = Some(7);
        f.instructions.push(c);
        module.functions.push(f);
        let text = emit_module(&module);
        assert!(text.contains("LXI H, 7"));
        assert!(!text.contains("LD HL,"));
    }

    #[test]
    fn mul_routine_is_emitted_exactly_once() {
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![Param { name: "a".into(), ty: Type::u16() }], Type::u16());
        let mut m1 = Instruction::new(Op::Mul);
        m1.dest = VReg::new(1);
        m1.src1 = VReg::new(1);
        m1.src2 = VReg::new(1);
        let m2 = m1.clone();
        f.instructions.push(m1);
        f.instructions.push(m2);
        module.functions.push(f);
        let text = emit_module(&module);
        assert_eq!(text.matches("__mul16:").count(), 1);
        assert_eq!(text.matches("CALL __mul16").count(), 2);
    }

    #[test]
    fn no_smc_feature_is_granted() {
        let backend = I8080Backend;
        assert!(!backend.supports(Feature::SelfModifyingCode));
    }
}
