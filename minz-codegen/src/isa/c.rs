//! The portable C backend (spec.md §4.5): every virtual register is a
//! `uintptr_t` local, prototypes precede definitions, and the module's
//! `main` function (if any) is wrapped in a standard C `main`.

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
        name: "c",
        file_extension: ".c",
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

/// The portable-C backend.
#[derive(Default)]
pub struct CBackend;

impl Backend for CBackend {
    fn name(&self) -> &'static str {
        "c"
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
            log::debug!("c: generated {} bytes for module `{}`", text.len(), module.name);
        }
        Ok(text)
    }

    fn file_extension(&self) -> &'static str {
        ".c"
    }

    fn target_config(&self) -> &TargetConfig {
        target_config()
    }
}

pub(super) fn factory() -> Box<dyn Backend> {
    Box::new(CBackend)
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

fn reg(reg: VReg) -> String {
    format!("r{}", reg.index())
}

fn emit_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "/* module: {} */", module.name);
    let _ = writeln!(out, "#include <stdint.h>");
    let _ = writeln!(out, "#include <stdio.h>");
    out.push('\n');

    for func in &module.functions {
        let _ = writeln!(out, "{};", signature(func));
    }
    out.push('\n');

    for func in &module.functions {
        emit_function(func, &mut out);
        out.push('\n');
    }

    if let Some(entry) = module.function("main") {
        let _ = writeln!(out, "int main(void) {{");
        if matches!(entry.return_type, minz_ir::Type::Basic(minz_ir::Basic::Void)) {
            let _ = writeln!(out, "    {}();", c_name(entry));
        } else {
            let _ = writeln!(out, "    return (int) {}();", c_name(entry));
        }
        let _ = writeln!(out, "    return 0;");
        let _ = writeln!(out, "}}");
    }
    out
}

/// The C identifier a function is emitted under. The module's entry point
/// is renamed out from under `main`, since that name is reserved for the
/// wrapping standard C `main` this backend generates.
fn c_name(func: &Function) -> String {
    if func.name == "main" {
        "minz_main".to_string()
    } else {
        func.name.clone()
    }
}

fn signature(func: &Function) -> String {
    let params = func
        .params
        .iter()
        .map(|p| format!("uintptr_t {}", p.name))
        .collect::<Vec<_>>()
        .join(", ");
    format!("uintptr_t {}({})", c_name(func), if params.is_empty() { "void".to_string() } else { params })
}

fn emit_function(func: &Function, out: &mut String) {
    let _ = writeln!(out, "{} {{", signature(func));
    let params: BTreeSet<u32> = (1..=func.params.len() as u32).collect();
    for id in used_vregs(func).difference(&params) {
        let _ = writeln!(out, "    uintptr_t {};", reg(VReg::new(*id)));
    }
    for inst in &func.instructions {
        emit_instruction(func, inst, out);
    }
    if matches!(func.return_type, minz_ir::Type::Basic(minz_ir::Basic::Void)) {
        let _ = writeln!(out, "    return 0;");
    }
    let _ = writeln!(out, "}}");
}

fn operand(func: &Function, r: VReg) -> String {
    if r.index() != 0 && (r.index() as usize) <= func.params.len() {
        func.params[(r.index() - 1) as usize].name.clone()
    } else {
        reg(r)
    }
}

fn emit_instruction(func: &Function, inst: &Instruction, out: &mut String) {
    match &inst.op {
        Op::Const => {
            let _ = writeln!(out, "    {} = {};", operand(func, inst.dest), inst.imm.unwrap_or(0));
        }
        Op::Move => {
            let _ = writeln!(out, "    {} = {};", operand(func, inst.dest), operand(func, inst.src1));
        }
        Op::Add | Op::Sub | Op::Mul | Op::Div | Op::Rem | Op::And | Op::Or | Op::Xor | Op::Shl | Op::Shr => {
            let op_sym = match inst.op {
                Op::Add => "+",
                Op::Sub => "-",
                Op::Mul => "*",
                Op::Div => "/",
                Op::Rem => "%",
                Op::And => "&",
                Op::Or => "|",
                Op::Xor => "^",
                Op::Shl => "<<",
                Op::Shr => ">>",
                _ => unreachable!(),
            };
            let _ = writeln!(
                out,
                "    {} = {} {} {};",
                operand(func, inst.dest),
                operand(func, inst.src1),
                op_sym,
                operand(func, inst.src2)
            );
        }
        Op::Not => {
            let _ = writeln!(out, "    {} = ~{};", operand(func, inst.dest), operand(func, inst.src1));
        }
        Op::Neg => {
            let _ = writeln!(out, "    {} = -{};", operand(func, inst.dest), operand(func, inst.src1));
        }
        Op::Cmp(cmp) => {
            let op_sym = match cmp {
                CmpOp::Eq => "==",
                CmpOp::Ne => "!=",
                CmpOp::Lt | CmpOp::Ult => "<",
                CmpOp::Le | CmpOp::Ule => "<=",
                CmpOp::Gt | CmpOp::Ugt => ">",
                CmpOp::Ge | CmpOp::Uge => ">=",
            };
            let _ = writeln!(
                out,
                "    {} = ({} {} {}) ? 1 : 0;",
                operand(func, inst.dest),
                operand(func, inst.src1),
                op_sym,
                operand(func, inst.src2)
            );
        }
        Op::Jump => {
            let _ = writeln!(out, "    goto {};", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfTrue => {
            let _ = writeln!(out, "    if ({}) goto {};", operand(func, inst.src1), inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfFalse => {
            let _ = writeln!(out, "    if (!{}) goto {};", operand(func, inst.src1), inst.label.as_deref().unwrap_or("?"));
        }
        Op::Label => {
            let _ = writeln!(out, "{}:;", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Call => {
            let args = inst.args.iter().map(|a| operand(func, *a)).collect::<Vec<_>>().join(", ");
            let callee = inst.symbol.as_deref().unwrap_or("?");
            if inst.dest.is_none() {
                let _ = writeln!(out, "    {}({});", callee, args);
            } else {
                let _ = writeln!(out, "    {} = {}({});", operand(func, inst.dest), callee, args);
            }
        }
        Op::Return => {
            if inst.src1.is_none() {
                let _ = writeln!(out, "    return 0;");
            } else {
                let _ = writeln!(out, "    return {};", operand(func, inst.src1));
            }
        }
        Op::LoadVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    {} = {};", operand(func, inst.dest), sym);
        }
        Op::StoreVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    {} = {};", sym, operand(func, inst.src1));
        }
        Op::LoadParam => {
            let _ = writeln!(out, "    /* parameter {} already bound by name */", inst.symbol.as_deref().unwrap_or("?"));
        }
        Op::LoadIndex => {
            let _ = writeln!(
                out,
                "    {} = *(uintptr_t *)({} + {});",
                operand(func, inst.dest),
                operand(func, inst.src1),
                inst.imm.unwrap_or(0)
            );
        }
        Op::LoadAddr => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    {} = (uintptr_t) &{};", operand(func, inst.dest), sym);
        }
        Op::LoadString => {
            let sym = inst.string.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(out, "    {} = (uintptr_t) {};", operand(func, inst.dest), sym);
        }
        Op::Print(kind) => emit_print(func, *kind, inst, out),
        Op::SmcLoadConst | Op::SmcStoreConst => {
            let _ = writeln!(out, "    /* TODO: unsupported opcode {:?} (c grants no SMC feature) */", inst.op);
        }
        Op::InlineAsm => {
            let _ = writeln!(out, "    __asm__(\"{}\");", inst.symbol.as_deref().unwrap_or(""));
        }
    }
    if let Some(comment) = &inst.comment {
        let _ = writeln!(out, "    /* {} */", comment);
    }
}

fn emit_print(func: &Function, kind: PrintKind, inst: &Instruction, out: &mut String) {
    let (fmt, cast) = match kind {
        PrintKind::U8 | PrintKind::U16 => ("%u", "unsigned"),
        PrintKind::I8 | PrintKind::I16 => ("%d", "int"),
        PrintKind::Bool => ("%d", "int"),
        PrintKind::Str => ("%s", "char *"),
    };
    let _ = writeln!(out, "    printf(\"{}\\n\", ({}) {});", fmt, cast, operand(func, inst.src1));
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Param, Type};

    #[test]
    fn locals_are_uintptr_t() {
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![], Type::void());
        let mut c = Instruction::new(Op::Const);
        c.dest = VReg::new(1);
        c.imm = Some(3);
        f.instructions.push(c);
        module.functions.push(f);
        let text = emit_module(&module);
        assert!(text.contains("uintptr_t r1;"));
    }

    #[test]
    fn prototypes_precede_definitions() {
        let mut module = Module::new("m");
        module.functions.push(Function::new("f", vec![Param { name: "x".into(), ty: Type::u16() }], Type::u16()));
        let text = emit_module(&module);
        let proto_pos = text.find("uintptr_t f(uintptr_t x);").expect("prototype present");
        let def_pos = text.find("uintptr_t f(uintptr_t x) {").expect("definition present");
        assert!(proto_pos < def_pos);
    }

    #[test]
    fn main_entry_point_is_wrapped_without_name_collision() {
        let mut module = Module::new("m");
        module.functions.push(Function::new("main", vec![], Type::void()));
        let text = emit_module(&module);
        assert!(text.contains("int main(void) {"));
        assert!(text.contains("minz_main();"));
        assert_eq!(text.matches("int main(void)").count(), 1);
    }
}
