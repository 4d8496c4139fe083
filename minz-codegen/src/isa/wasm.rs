//! The WebAssembly text backend (spec.md §4.5): every integer lowers to
//! `i32`, one local per virtual register, `memory` and `print_char`/
//! `print_i32` imported, `main` exported.

use crate::backend::Backend;
use crate::error::CodegenResult;
use crate::features::{Feature, FeatureSet};
use crate::options::GenOptions;
use crate::packager;
use crate::target_config::TargetConfig;
use minz_ir::{CmpOp, Function, Instruction, Module, Op, PrintKind, VReg};
use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::OnceLock;

fn target_config() -> &'static TargetConfig {
    static CONFIG: OnceLock<TargetConfig> = OnceLock::new();
    CONFIG.get_or_init(|| TargetConfig {
        name: "wasm",
        file_extension: ".wat",
        default_origin: 0,
        ram_start: 0,
        ram_size: 0x0001_0000,
        rom_start: None,
        rom_size: None,
        screen_base: None,
        stack_top: 0,
        standard_symbols: &[],
        packager: packager::raw,
    })
}

/// The WASM text backend.
#[derive(Default)]
pub struct WasmBackend;

impl Backend for WasmBackend {
    fn name(&self) -> &'static str {
        "wasm"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet::none()
            .with(Feature::Pointer32)
            .with(Feature::IndirectCalls)
            .with(Feature::HardwareMultiply)
            .with(Feature::HardwareDivide)
    }

    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String> {
        let text = emit_module(module);
        if options.debug {
            log::debug!("wasm: generated {} bytes for module `{}`", text.len(), module.name);
        }
        Ok(text)
    }

    fn file_extension(&self) -> &'static str {
        ".wat"
    }

    fn target_config(&self) -> &TargetConfig {
        target_config()
    }
}

pub(super) fn factory() -> Box<dyn Backend> {
    Box::new(WasmBackend)
}

fn local_name(reg: VReg) -> String {
    format!("$r{}", reg.index())
}

fn used_vregs(func: &Function) -> BTreeSet<u32> {
    let mut set = BTreeSet::new();
    for inst in &func.instructions {
        for id in [inst.dest.index(), inst.src1.index(), inst.src2.index()] {
            if id != 0 {
                set.insert(id);
            }
        }
        for a in &inst.args {
            if a.index() != 0 {
                set.insert(a.index());
            }
        }
    }
    set
}

fn emit_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "(module");
    let _ = writeln!(out, "  ;; module: {}", module.name);
    let _ = writeln!(out, "  (import \"env\" \"memory\" (memory 1))");
    let _ = writeln!(out, "  (import \"env\" \"print_char\" (func $print_char (param i32)))");
    let _ = writeln!(out, "  (import \"env\" \"print_i32\" (func $print_i32 (param i32)))");
    for func in &module.functions {
        emit_function(func, &mut out);
    }
    if module.function("main").is_some() {
        let _ = writeln!(out, "  (export \"main\" (func $main))");
    }
    let _ = writeln!(out, ")");
    out
}

fn emit_function(func: &Function, out: &mut String) {
    let name = func.label_safe_name();
    let _ = write!(out, "  (func ${}", name);
    for param in &func.params {
        let _ = write!(out, " (param ${} i32)", param.name);
    }
    if !matches!(func.return_type, minz_ir::Type::Basic(minz_ir::Basic::Void)) {
        let _ = write!(out, " (result i32)");
    }
    let _ = writeln!(out);

    let params: BTreeSet<u32> = (1..=func.params.len() as u32).collect();
    for id in used_vregs(func).difference(&params) {
        let _ = writeln!(out, "    (local {} i32)", local_name(VReg::new(*id)));
    }

    for inst in &func.instructions {
        emit_instruction(func, inst, out);
    }
    let _ = writeln!(out, "  )");
}

fn local_ref(func: &Function, reg: VReg) -> String {
    if reg.index() != 0 && (reg.index() as usize) <= func.params.len() {
        format!("${}", func.params[(reg.index() - 1) as usize].name)
    } else {
        local_name(reg)
    }
}

fn emit_instruction(func: &Function, inst: &Instruction, out: &mut String) {
    match &inst.op {
        Op::Const => {
            let _ = writeln!(out, "    i32.const {}", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::Move => {
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::Add | Op::Sub | Op::Mul | Op::And | Op::Or | Op::Xor | Op::Shl => {
            let mnemonic = match inst.op {
                Op::Add => "i32.add",
                Op::Sub => "i32.sub",
                Op::Mul => "i32.mul",
                Op::And => "i32.and",
                Op::Or => "i32.or",
                Op::Xor => "i32.xor",
                Op::Shl => "i32.shl",
                _ => unreachable!(),
            };
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src2));
            let _ = writeln!(out, "    {}", mnemonic);
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::Div | Op::Rem | Op::Shr => {
            let signed = inst.ty.as_ref().map(is_signed).unwrap_or(false);
            let mnemonic = match (&inst.op, signed) {
                (Op::Div, true) => "i32.div_s",
                (Op::Div, false) => "i32.div_u",
                (Op::Rem, true) => "i32.rem_s",
                (Op::Rem, false) => "i32.rem_u",
                (Op::Shr, true) => "i32.shr_s",
                (Op::Shr, false) => "i32.shr_u",
                _ => unreachable!(),
            };
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src2));
            let _ = writeln!(out, "    {}", mnemonic);
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::Not => {
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    i32.const -1");
            let _ = writeln!(out, "    i32.xor");
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::Neg => {
            let _ = writeln!(out, "    i32.const 0");
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    i32.sub");
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::Cmp(cmp) => {
            let mnemonic = cmp_mnemonic(*cmp);
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src2));
            let _ = writeln!(out, "    {}", mnemonic);
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::Jump => {
            let _ = writeln!(out, "    br ${}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfTrue => {
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    br_if ${}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfFalse => {
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    i32.eqz");
            let _ = writeln!(out, "    br_if ${}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Label => {
            let _ = writeln!(out, "    ;; label ${}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Call => {
            for arg in &inst.args {
                let _ = writeln!(out, "    local.get {}", local_ref(func, *arg));
            }
            let _ = writeln!(out, "    call ${}", inst.symbol.as_deref().unwrap_or("?"));
            if !inst.dest.is_none() {
                let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
            }
        }
        Op::Return => {
            if !inst.src1.is_none() {
                let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            }
            let _ = writeln!(out, "    return");
        }
        Op::LoadVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    global.get ${}", sym);
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::StoreVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    global.set ${}", sym);
        }
        Op::LoadParam => {
            let _ = writeln!(out, "    ;; parameter {} already bound by name", inst.symbol.as_deref().unwrap_or("?"));
        }
        Op::LoadIndex => {
            let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
            let _ = writeln!(out, "    i32.load offset={}", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::LoadAddr => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    ;; address-of {} has no WASM linear-memory analogue here", sym);
        }
        Op::LoadString => {
            let offset = inst.string.map(|s| s.index()).unwrap_or(0);
            let _ = writeln!(out, "    i32.const {}", offset);
            let _ = writeln!(out, "    local.set {}", local_ref(func, inst.dest));
        }
        Op::Print(kind) => emit_print(func, *kind, inst, out),
        Op::SmcLoadConst | Op::SmcStoreConst => {
            let _ = writeln!(out, "    ;; TODO: unsupported opcode {:?} (wasm grants no SMC feature)", inst.op);
        }
        Op::InlineAsm => {
            let _ = writeln!(out, "    {}", inst.symbol.as_deref().unwrap_or(""));
        }
    }
    if let Some(comment) = &inst.comment {
        let _ = writeln!(out, "    ;; {}", comment);
    }
}

fn is_signed(ty: &minz_ir::Type) -> bool {
    matches!(
        ty,
        minz_ir::Type::Basic(minz_ir::Basic::I8 | minz_ir::Basic::I16 | minz_ir::Basic::I24)
    )
}

fn cmp_mnemonic(cmp: CmpOp) -> &'static str {
    match cmp {
        CmpOp::Eq => "i32.eq",
        CmpOp::Ne => "i32.ne",
        CmpOp::Lt => "i32.lt_s",
        CmpOp::Le => "i32.le_s",
        CmpOp::Gt => "i32.gt_s",
        CmpOp::Ge => "i32.ge_s",
        CmpOp::Ult => "i32.lt_u",
        CmpOp::Ule => "i32.le_u",
        CmpOp::Ugt => "i32.gt_u",
        CmpOp::Uge => "i32.ge_u",
    }
}

fn emit_print(func: &Function, kind: PrintKind, inst: &Instruction, out: &mut String) {
    let routine = match kind {
        PrintKind::U8 | PrintKind::U16 | PrintKind::I8 | PrintKind::I16 | PrintKind::Bool => "$print_i32",
        PrintKind::Str => "$print_char",
    };
    let _ = writeln!(out, "    local.get {}", local_ref(func, inst.src1));
    let _ = writeln!(out, "    call {}", routine);
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Param, Type};

    #[test]
    fn every_integer_lowers_to_i32() {
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![Param { name: "n".into(), ty: Type::u16() }], Type::u16());
        let mut c = Instruction::new(Op::Const);
        c.dest = VReg::new(2);
        c.imm = Some(5);
        f.instructions.push(c);
        module.functions.push(f);
        let text = emit_module(&module);
        assert!(text.contains("(param $n i32)"));
        assert!(text.contains("(result i32)"));
        assert!(text.contains("i32.const 5"));
    }

    #[test]
    fn memory_and_print_are_imported() {
        let module = Module::new("m");
        let text = emit_module(&module);
        assert!(text.contains("(import \"env\" \"memory\""));
        assert!(text.contains("(import \"env\" \"print_char\""));
        assert!(text.contains("(import \"env\" \"print_i32\""));
    }

    #[test]
    fn main_is_exported_when_present() {
        let mut module = Module::new("m");
        module.functions.push(Function::new("main", vec![], Type::void()));
        let text = emit_module(&module);
        assert!(text.contains("(export \"main\""));
    }
}
