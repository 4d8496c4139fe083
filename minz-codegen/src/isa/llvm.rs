//! The LLVM IR backend (spec.md §4.5): `i8`/`i16`/`i1` primitives, mangled
//! dotted function names, an `alloca` per local, and unsigned vs signed
//! compares chosen by opcode.

use crate::backend::Backend;
use crate::error::CodegenResult;
use crate::features::{Feature, FeatureSet};
use crate::options::GenOptions;
use crate::packager;
use crate::target_config::TargetConfig;
use minz_ir::{Basic, CmpOp, Function, Instruction, Module, Op, PrintKind, Type, VReg};
use std::fmt::Write as _;
use std::sync::OnceLock;

fn target_config() -> &'static TargetConfig {
    static CONFIG: OnceLock<TargetConfig> = OnceLock::new();
    CONFIG.get_or_init(|| TargetConfig {
        name: "llvm",
        file_extension: ".ll",
        default_origin: 0,
        ram_start: 0,
        ram_size: 0,
        rom_start: None,
        rom_size: None,
        screen_base: None,
        stack_top: 0,
        standard_symbols: &[],
        packager: packager::raw,
    })
}

/// The LLVM IR backend.
#[derive(Default)]
pub struct LlvmBackend;

impl Backend for LlvmBackend {
    fn name(&self) -> &'static str {
        "llvm"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet::none()
            .with(Feature::Pointer32)
            .with(Feature::IndirectCalls)
            .with(Feature::HardwareMultiply)
            .with(Feature::HardwareDivide)
            .with(Feature::FloatingPoint)
    }

    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String> {
        let text = emit_module(module);
        if options.debug {
            log::debug!("llvm: generated {} bytes for module `{}`", text.len(), module.name);
        }
        Ok(text)
    }

    fn file_extension(&self) -> &'static str {
        ".ll"
    }

    fn target_config(&self) -> &TargetConfig {
        target_config()
    }
}

pub(super) fn factory() -> Box<dyn Backend> {
    Box::new(LlvmBackend)
}

/// Mangled function name (spec.md §4.5: "names functions with mangled
/// dots"), the inverse of [`Function::label_safe_name`]'s `.` → `_`
/// rewrite: here dots in the module-qualified name are kept and simply
/// prefixed, since LLVM identifiers tolerate `.`.
fn mangled_name(module: &Module, func: &Function) -> String {
    format!("{}.{}", module.name, func.name)
}

fn llvm_type(ty: &Type) -> &'static str {
    match ty {
        Type::Basic(Basic::Bool) => "i1",
        Type::Basic(Basic::U8 | Basic::I8) => "i8",
        Type::Basic(Basic::U16 | Basic::I16 | Basic::Fixed8_8) => "i16",
        Type::Basic(Basic::Void) => "void",
        Type::Pointer(_) => "i32",
        _ => "i32",
    }
}

fn reg_ref(reg: VReg) -> String {
    format!("%r{}", reg.index())
}

fn is_signed(ty: &Type) -> bool {
    matches!(ty, Type::Basic(Basic::I8 | Basic::I16 | Basic::I24))
}

fn emit_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; module: {}", module.name);
    for func in &module.functions {
        emit_function(module, func, &mut out);
    }
    out
}

fn emit_function(module: &Module, func: &Function, out: &mut String) {
    let name = mangled_name(module, func);
    let ret_ty = llvm_type(&func.return_type);
    let params = func
        .params
        .iter()
        .enumerate()
        .map(|(i, p)| format!("{} %p{}", llvm_type(&p.ty), i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(out, "define {} @\"{}\"({}) {{", ret_ty, name, params);
    let _ = writeln!(out, "entry:");

    for (i, local) in func.locals.iter().enumerate() {
        let _ = writeln!(out, "  %local.{} = alloca {}", i, llvm_type(&local.ty));
    }
    for (i, param) in func.params.iter().enumerate() {
        let _ = writeln!(out, "  {} = alloca {}", reg_ref(VReg::new(i as u32 + 1)), llvm_type(&param.ty));
        let _ = writeln!(out, "  store {} %p{}, {}* {}", llvm_type(&param.ty), i + 1, llvm_type(&param.ty), reg_ref(VReg::new(i as u32 + 1)));
    }

    for inst in &func.instructions {
        emit_instruction(inst, out);
    }

    if matches!(func.return_type, Type::Basic(Basic::Void)) {
        let _ = writeln!(out, "  ret void");
    }
    let _ = writeln!(out, "}}");
}

fn emit_instruction(inst: &Instruction, out: &mut String) {
    let ty = inst.ty.as_ref().map(llvm_type).unwrap_or("i16");
    match &inst.op {
        Op::Const => {
            let _ = writeln!(out, "  {} = add {} 0, {}", reg_ref(inst.dest), ty, inst.imm.unwrap_or(0));
        }
        Op::Move => {
            let _ = writeln!(out, "  {} = add {} 0, {}", reg_ref(inst.dest), ty, reg_ref(inst.src1));
        }
        Op::Add | Op::Sub | Op::And | Op::Or | Op::Xor | Op::Shl => {
            let mnemonic = match inst.op {
                Op::Add => "add",
                Op::Sub => "sub",
                Op::And => "and",
                Op::Or => "or",
                Op::Xor => "xor",
                Op::Shl => "shl",
                _ => unreachable!(),
            };
            let _ = writeln!(out, "  {} = {} {} {}, {}", reg_ref(inst.dest), mnemonic, ty, reg_ref(inst.src1), reg_ref(inst.src2));
        }
        Op::Mul | Op::Div | Op::Rem | Op::Shr => {
            let signed = inst.ty.as_ref().map(is_signed).unwrap_or(false);
            let mnemonic = match (&inst.op, signed) {
                (Op::Mul, _) => "mul",
                (Op::Div, true) => "sdiv",
                (Op::Div, false) => "udiv",
                (Op::Rem, true) => "srem",
                (Op::Rem, false) => "urem",
                (Op::Shr, true) => "ashr",
                (Op::Shr, false) => "lshr",
                _ => unreachable!(),
            };
            let _ = writeln!(out, "  {} = {} {} {}, {}", reg_ref(inst.dest), mnemonic, ty, reg_ref(inst.src1), reg_ref(inst.src2));
        }
        Op::Not => {
            let _ = writeln!(out, "  {} = xor {} {}, -1", reg_ref(inst.dest), ty, reg_ref(inst.src1));
        }
        Op::Neg => {
            let _ = writeln!(out, "  {} = sub {} 0, {}", reg_ref(inst.dest), ty, reg_ref(inst.src1));
        }
        Op::Cmp(cmp) => {
            let signed = inst.ty.as_ref().map(is_signed).unwrap_or(false);
            let pred = cmp_predicate(*cmp, signed);
            let _ = writeln!(out, "  {} = icmp {} {} {}, {}", reg_ref(inst.dest), pred, ty, reg_ref(inst.src1), reg_ref(inst.src2));
        }
        Op::Jump => {
            let _ = writeln!(out, "  br label %{}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfTrue => {
            let target = inst.label.as_deref().unwrap_or("?");
            let _ = writeln!(out, "  br i1 {}, label %{}, label %{}.fallthrough", reg_ref(inst.src1), target, target);
        }
        Op::JumpIfFalse => {
            let target = inst.label.as_deref().unwrap_or("?");
            let _ = writeln!(out, "  br i1 {}, label %{}.fallthrough, label %{}", reg_ref(inst.src1), target, target);
        }
        Op::Label => {
            let _ = writeln!(out, "{}:", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Call => {
            let args = inst.args.iter().map(|a| format!("{} {}", ty, reg_ref(*a))).collect::<Vec<_>>().join(", ");
            let callee = inst.symbol.as_deref().unwrap_or("?");
            if inst.dest.is_none() {
                let _ = writeln!(out, "  call {} @\"{}\"({})", ty, callee, args);
            } else {
                let _ = writeln!(out, "  {} = call {} @\"{}\"({})", reg_ref(inst.dest), ty, callee, args);
            }
        }
        Op::Return => {
            if inst.src1.is_none() {
                let _ = writeln!(out, "  ret void");
            } else {
                let _ = writeln!(out, "  ret {} {}", ty, reg_ref(inst.src1));
            }
        }
        Op::LoadVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "  {} = load {}, {}* @{}", reg_ref(inst.dest), ty, ty, sym);
        }
        Op::StoreVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "  store {} {}, {}* @{}", ty, reg_ref(inst.src1), ty, sym);
        }
        Op::LoadParam => {
            let _ = writeln!(out, "  ; parameter {} already bound by %p<n>/alloca above", inst.symbol.as_deref().unwrap_or("?"));
        }
        Op::LoadIndex => {
            let _ = writeln!(
                out,
                "  {} = getelementptr {}, {}* {}, i32 {}",
                reg_ref(inst.dest),
                ty,
                ty,
                reg_ref(inst.src1),
                inst.imm.unwrap_or(0)
            );
        }
        Op::LoadAddr => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "  {} = getelementptr {}, {}* @{}, i32 0", reg_ref(inst.dest), ty, ty, sym);
        }
        Op::LoadString => {
            let sym = inst.string.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(out, "  {} = getelementptr [0 x i8], [0 x i8]* @{}, i32 0, i32 0", reg_ref(inst.dest), sym);
        }
        Op::Print(kind) => emit_print(*kind, inst, out),
        Op::SmcLoadConst | Op::SmcStoreConst => {
            let _ = writeln!(out, "  ; TODO: unsupported opcode {:?} (llvm grants no SMC feature)", inst.op);
        }
        Op::InlineAsm => {
            let _ = writeln!(out, "  call void asm sideeffect \"{}\", \"\"()", inst.symbol.as_deref().unwrap_or(""));
        }
    }
    if let Some(comment) = &inst.comment {
        let _ = writeln!(out, "  ; {}", comment);
    }
}

fn cmp_predicate(cmp: CmpOp, signed: bool) -> &'static str {
    match (cmp, signed) {
        (CmpOp::Eq, _) => "eq",
        (CmpOp::Ne, _) => "ne",
        (CmpOp::Lt, true) => "slt",
        (CmpOp::Lt, false) | (CmpOp::Ult, _) => "ult",
        (CmpOp::Le, true) => "sle",
        (CmpOp::Le, false) | (CmpOp::Ule, _) => "ule",
        (CmpOp::Gt, true) => "sgt",
        (CmpOp::Gt, false) | (CmpOp::Ugt, _) => "ugt",
        (CmpOp::Ge, true) => "sge",
        (CmpOp::Ge, false) | (CmpOp::Uge, _) => "uge",
    }
}

fn emit_print(kind: PrintKind, inst: &Instruction, out: &mut String) {
    let routine = match kind {
        PrintKind::U8 => "print_u8",
        PrintKind::U16 => "print_u16",
        PrintKind::I8 => "print_i8",
        PrintKind::I16 => "print_i16",
        PrintKind::Bool => "print_bool",
        PrintKind::Str => "print_string",
    };
    let ty = inst.ty.as_ref().map(llvm_type).unwrap_or("i16");
    let _ = writeln!(out, "  call void @\"{}\"({} {})", routine, ty, reg_ref(inst.src1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Param, Type};

    #[test]
    fn primitives_map_to_llvm_integer_widths() {
        assert_eq!(llvm_type(&Type::u8()), "i8");
        assert_eq!(llvm_type(&Type::u16()), "i16");
        assert_eq!(llvm_type(&Type::Basic(Basic::Bool)), "i1");
    }

    #[test]
    fn function_names_are_mangled_with_dots() {
        let module = Module::new("geometry");
        let func = Function::new("area", vec![], Type::void());
        assert_eq!(mangled_name(&module, &func), "geometry.area");
    }

    #[test]
    fn unsigned_and_signed_compares_choose_distinct_predicates() {
        assert_eq!(cmp_predicate(CmpOp::Lt, true), "slt");
        assert_eq!(cmp_predicate(CmpOp::Lt, false), "ult");
        assert_eq!(cmp_predicate(CmpOp::Ult, true), "ult");
    }

    #[test]
    fn locals_get_an_alloca() {
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![Param { name: "x".into(), ty: Type::u16() }], Type::void());
        f.locals.push(minz_ir::Local { name: "y".into(), ty: Type::u8() });
        module.functions.push(f);
        let text = emit_module(&module);
        assert!(text.contains("alloca i8"));
        assert!(text.contains("alloca i16"));
    }
}
