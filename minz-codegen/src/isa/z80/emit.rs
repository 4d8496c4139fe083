//! The Z80 emitter (component E, spec.md §4.3).

use super::smc::{anchor_labels, plan_anchors};
use minz_ir::{CmpOp, Function, Instruction, Module, Op, PrintKind, Type, VReg, Z80Reg};
use std::collections::HashMap;
use std::fmt::Write as _;

/// A non-fatal condition surfaced while emitting one module; callers turn
/// these into `log::warn!` lines and, for `UnsupportedOpcode`, a
/// `CodegenError` report (spec.md §7's warn-and-continue policy).
#[derive(Clone, Debug, PartialEq)]
pub enum EmitWarning {
    /// An opcode had no Z80 lowering; a `TODO` comment was emitted.
    UnsupportedOpcode { function: String, op: Op },
}

/// Per-function register allocation: every virtual register used in the
/// body gets a spill slot at a negative offset from the frame pointer
/// (spec.md §4.3: "a straightforward spill slot per register").
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

    fn offset(&self, reg: VReg) -> i16 {
        *self.offsets.get(&reg.index()).unwrap_or(&0)
    }

    fn slot_count(&self) -> usize {
        self.offsets.len()
    }
}

fn push_if_modified(out: &mut String, mask: minz_ir::RegMask, reg: Z80Reg, name: &str) {
    if mask.contains(reg) {
        let _ = writeln!(out, "    PUSH {}", name);
    }
}

fn pop_if_modified(out: &mut String, mask: minz_ir::RegMask, reg: Z80Reg, name: &str) {
    if mask.contains(reg) {
        let _ = writeln!(out, "    POP {}", name);
    }
}

/// Which platform's runtime conventions `Op::Print` should target. The
/// native Z80 backend calls a linked `print_*` routine; the CP/M variant
/// instead inlines a BDOS function-2 console-output call (spec.md §4.3's
/// CP/M variant).
#[derive(Copy, Clone, PartialEq, Eq)]
pub enum Platform {
    /// Call out to a linked `print_*` runtime routine.
    Native,
    /// Inline a BDOS function 2 (console output) call per character.
    Cpm,
}

/// Emit one module's functions as Z80 assembly text, returning the text
/// plus any non-fatal warnings encountered along the way.
pub fn emit_module(module: &Module) -> (String, Vec<EmitWarning>) {
    emit_module_for(module, Platform::Native)
}

/// As [`emit_module`], but lowering `Op::Print` to inline CP/M BDOS calls
/// instead of calls to a linked runtime routine.
pub fn emit_module_for(module: &Module, platform: Platform) -> (String, Vec<EmitWarning>) {
    let mut out = String::new();
    let mut warnings = Vec::new();
    let _ = writeln!(out, "; module: {}", module.name);

    for func in &module.functions {
        let mut func = func.clone();
        emit_function(&mut func, platform, &mut out, &mut warnings);
    }
    (out, warnings)
}

fn emit_function(func: &mut Function, platform: Platform, out: &mut String, warnings: &mut Vec<EmitWarning>) {
    let _ = writeln!(out, "; function {}", func.name);
    let label = func.label_safe_name();

    let frame = FrameLayout::build(func);
    let needs_frame = frame.slot_count() > 0 || !func.params.is_empty() || !func.locals.is_empty();

    let anchor_plan = if func.flags.smc_enabled { plan_anchors(func) } else { Vec::new() };
    let anchors = anchor_labels(&func.name, &anchor_plan);

    let _ = writeln!(out, "{}:", label);

    if func.flags.is_interrupt {
        emit_interrupt_prologue(func, out);
    } else {
        emit_lean_prologue(func, out, needs_frame);
        for (param, anchor, width) in &anchor_plan {
            emit_anchor_definition(out, anchor, *width);
            let _ = write!(out, "; anchor for parameter {}", param);
            let _ = writeln!(out);
        }
    }

    for inst in &func.instructions {
        emit_instruction(func, inst, &frame, &anchors, platform, out, warnings);
    }

    if func.flags.is_interrupt {
        emit_interrupt_epilogue(func, out);
    } else {
        emit_lean_epilogue(func, out, needs_frame);
    }
    out.push('\n');
}

fn emit_lean_prologue(func: &Function, out: &mut String, needs_frame: bool) {
    let mask = func.modified_registers;
    push_if_modified(out, mask, Z80Reg::B, "BC");
    push_if_modified(out, mask, Z80Reg::D, "DE");
    push_if_modified(out, mask, Z80Reg::Ix, "IX");
    if mask.uses_shadow_registers() {
        let _ = writeln!(out, "    EXX");
        let _ = writeln!(out, "    EX AF, AF'");
    }
    if needs_frame {
        let _ = writeln!(out, "    PUSH IX");
        let _ = writeln!(out, "    LD IX, 0");
        let _ = writeln!(out, "    ADD IX, SP");
    }
}

fn emit_lean_epilogue(func: &Function, out: &mut String, needs_frame: bool) {
    let mask = func.modified_registers;
    if needs_frame {
        let _ = writeln!(out, "    POP IX");
    }
    if mask.uses_shadow_registers() {
        let _ = writeln!(out, "    EX AF, AF'");
        let _ = writeln!(out, "    EXX");
    }
    pop_if_modified(out, mask, Z80Reg::Ix, "IX");
    pop_if_modified(out, mask, Z80Reg::D, "DE");
    pop_if_modified(out, mask, Z80Reg::B, "BC");
    let _ = writeln!(out, "    RET");
}

fn emit_interrupt_prologue(func: &Function, out: &mut String) {
    let _ = writeln!(out, "    PUSH IX");
    let _ = writeln!(out, "    PUSH IY");
    let mask = func.modified_registers;
    if mask.uses_shadow_registers() || mask.contains(Z80Reg::A) || mask.contains(Z80Reg::B) {
        let _ = writeln!(out, "    EX AF, AF'");
        let _ = writeln!(out, "    EXX");
    }
}

fn emit_interrupt_epilogue(func: &Function, out: &mut String) {
    let mask = func.modified_registers;
    if mask.uses_shadow_registers() || mask.contains(Z80Reg::A) || mask.contains(Z80Reg::B) {
        let _ = writeln!(out, "    EXX");
        let _ = writeln!(out, "    EX AF, AF'");
    }
    let _ = writeln!(out, "    POP IY");
    let _ = writeln!(out, "    POP IX");
    let _ = writeln!(out, "    EI");
    let _ = writeln!(out, "    RETI");
}

fn emit_anchor_definition(out: &mut String, anchor: &str, width: u32) {
    let _ = writeln!(out, "{}:", anchor);
    if width <= 1 {
        let _ = writeln!(out, "    LD A, 0");
    } else {
        let _ = writeln!(out, "    LD HL, 0");
    }
}

fn reg16(frame: &FrameLayout, reg: VReg) -> String {
    if reg.is_none() {
        "HL".to_string()
    } else {
        format!("(IX{:+})", frame.offset(reg))
    }
}

fn emit_instruction(
    func: &Function,
    inst: &Instruction,
    frame: &FrameLayout,
    anchors: &HashMap<String, String>,
    platform: Platform,
    out: &mut String,
    warnings: &mut Vec<EmitWarning>,
) {
    let is_wide = inst.ty.as_ref().map(|t| t.size_of() > 1).unwrap_or(true);

    match &inst.op {
        Op::Const => {
            let imm = inst.imm.unwrap_or(0);
            if is_wide {
                let _ = writeln!(out, "    LD HL, {}", imm);
            } else {
                let _ = writeln!(out, "    LD A, {}", imm);
            }
            let _ = writeln!(out, "    LD {}, {}", reg16(frame, inst.dest), if is_wide { "HL" } else { "A" });
        }
        Op::Move => {
            let width_reg = if is_wide { "HL" } else { "A" };
            let _ = writeln!(out, "    LD {}, {}", width_reg, reg16(frame, inst.src1));
            let _ = writeln!(out, "    LD {}, {}", reg16(frame, inst.dest), width_reg);
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
            let _ = writeln!(out, "    LD HL, {}", reg16(frame, inst.src1));
            let _ = writeln!(out, "    {} HL, {}", mnemonic, reg16(frame, inst.src2));
            let _ = writeln!(out, "    LD {}, HL", reg16(frame, inst.dest));
        }
        Op::Mul | Op::Div | Op::Rem | Op::Shl | Op::Shr | Op::Not | Op::Neg => {
            warnings.push(EmitWarning::UnsupportedOpcode { function: func.name.clone(), op: inst.op.clone() });
            let _ = writeln!(out, "    ; TODO: unsupported opcode {:?}", inst.op);
        }
        Op::Cmp(cmp) => emit_compare(*cmp, inst, frame, out),
        Op::Jump => {
            let _ = writeln!(out, "    JP {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfTrue => {
            let _ = writeln!(out, "    LD A, {}", reg16(frame, inst.src1));
            let _ = writeln!(out, "    OR A");
            let _ = writeln!(out, "    JP NZ, {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::JumpIfFalse => {
            let _ = writeln!(out, "    LD A, {}", reg16(frame, inst.src1));
            let _ = writeln!(out, "    OR A");
            let _ = writeln!(out, "    JP Z, {}", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Label => {
            let _ = writeln!(out, "{}:", inst.label.as_deref().unwrap_or("?"));
        }
        Op::Call => emit_call(func, inst, frame, anchors, out),
        Op::Return => {
            if !inst.src1.is_none() {
                let _ = writeln!(out, "    LD HL, {}", reg16(frame, inst.src1));
            }
        }
        Op::LoadVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LD HL, ({})", sym);
            let _ = writeln!(out, "    LD {}, HL", reg16(frame, inst.dest));
        }
        Op::StoreVar => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LD HL, {}", reg16(frame, inst.src1));
            let _ = writeln!(out, "    LD ({}), HL", sym);
        }
        Op::LoadParam => emit_load_param(inst, frame, anchors, out),
        Op::LoadIndex => {
            let _ = writeln!(out, "    LD HL, {}", reg16(frame, inst.src1));
            let _ = writeln!(out, "    LD DE, {}", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    ADD HL, DE");
            let _ = writeln!(out, "    LD A, (HL)");
            let _ = writeln!(out, "    LD {}, A", reg16(frame, inst.dest));
        }
        Op::LoadAddr => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LD HL, {}", sym);
            let _ = writeln!(out, "    LD {}, HL", reg16(frame, inst.dest));
        }
        Op::LoadString => {
            let sym = inst.string.map(|s| s.to_string()).unwrap_or_default();
            let _ = writeln!(out, "    LD HL, {}", sym);
            let _ = writeln!(out, "    LD {}, HL", reg16(frame, inst.dest));
        }
        Op::Print(kind) => match platform {
            Platform::Native => emit_print(*kind, inst, frame, out),
            Platform::Cpm => emit_print_cpm(*kind, inst, frame, out),
        },
        Op::SmcLoadConst => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "{}:", sym);
            let _ = writeln!(out, "    LD HL, {}", inst.imm.unwrap_or(0));
            let _ = writeln!(out, "    LD {}, HL", reg16(frame, inst.dest));
        }
        Op::SmcStoreConst => {
            let sym = inst.symbol.as_deref().unwrap_or("?");
            let _ = writeln!(out, "    LD HL, {}", reg16(frame, inst.src1));
            let _ = writeln!(out, "    LD ({}+1), HL", sym);
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
    let _ = writeln!(out, "    LD HL, {}", reg16(frame, inst.src1));
    let _ = writeln!(out, "    LD DE, {}", reg16(frame, inst.src2));
    let _ = writeln!(out, "    OR A");
    let _ = writeln!(out, "    SBC HL, DE");
    let true_label = format!(".cmp_true_{}", inst.dest.index());
    let end_label = format!(".cmp_end_{}", inst.dest.index());
    let branch = match cmp {
        CmpOp::Eq => "JP Z,",
        CmpOp::Ne => "JP NZ,",
        CmpOp::Lt | CmpOp::Le | CmpOp::Gt | CmpOp::Ge => "JP M,",
        CmpOp::Ult | CmpOp::Ule | CmpOp::Ugt | CmpOp::Uge => "JP C,",
    };
    let _ = writeln!(out, "    {} {}", branch, true_label);
    let _ = writeln!(out, "    LD {}, 0", reg16(frame, inst.dest));
    let _ = writeln!(out, "    JP {}", end_label);
    let _ = writeln!(out, "{}:", true_label);
    let _ = writeln!(out, "    LD {}, 1", reg16(frame, inst.dest));
    let _ = writeln!(out, "{}:", end_label);
}

fn emit_load_param(inst: &Instruction, frame: &FrameLayout, anchors: &HashMap<String, String>, out: &mut String) {
    let name = inst.symbol.as_deref().unwrap_or("?");
    match anchors.get(name) {
        Some(anchor) => {
            let _ = writeln!(out, "    LD HL, ({})", anchor);
        }
        None => {
            let _ = writeln!(out, "    LD HL, (IX+4) ; stack parameter {}", name);
        }
    }
    let _ = writeln!(out, "    LD {}, HL", reg16(frame, inst.dest));
}

/// Emit a call, including the Z80/SMC argument-passing and recursive
/// self-call save/restore sequence described in spec.md §4.3 and the
/// concrete scenario in spec.md §8 item 8.
fn emit_call(func: &Function, inst: &Instruction, frame: &FrameLayout, anchors: &HashMap<String, String>, out: &mut String) {
    let callee = inst.symbol.as_deref().unwrap_or("?");
    let is_self_call = callee == func.name || callee == func.label_safe_name();

    if is_self_call && !anchors.is_empty() {
        // Save every anchor (declaration order), patch in the new
        // argument values, call, then restore in reverse order.
        let mut anchor_list: Vec<&String> = anchors.values().collect();
        anchor_list.sort();
        for anchor in &anchor_list {
            let _ = writeln!(out, "    LD HL, ({})", anchor);
            let _ = writeln!(out, "    PUSH HL");
        }
        for (param, arg) in func.params.iter().zip(inst.args.iter()) {
            if let Some(anchor) = anchors.get(&param.name) {
                let _ = writeln!(out, "    LD HL, {}", reg16(frame, *arg));
                let _ = writeln!(out, "    LD ({}), HL", anchor);
            }
        }
        let _ = writeln!(out, "    CALL {}", callee);
        for anchor in anchor_list.iter().rev() {
            let _ = writeln!(out, "    POP HL");
            let _ = writeln!(out, "    LD ({}), HL", anchor);
        }
    } else {
        for arg in &inst.args {
            let _ = writeln!(out, "    LD HL, {}", reg16(frame, *arg));
            let _ = writeln!(out, "    PUSH HL");
        }
        let _ = writeln!(out, "    CALL {}", callee);
        if !inst.args.is_empty() {
            let _ = writeln!(out, "    LD DE, {}", inst.args.len() * 2);
            let _ = writeln!(out, "    ADD IX, DE");
        }
    }
    if !inst.dest.is_none() {
        let _ = writeln!(out, "    LD {}, HL", reg16(frame, inst.dest));
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
    let width = if matches!(kind, PrintKind::U16 | PrintKind::I16) { "HL" } else { "A" };
    let _ = writeln!(out, "    LD {}, {}", width, reg16(frame, inst.src1));
    let _ = writeln!(out, "    CALL {}", routine);
}

/// As [`emit_print`], but for the CP/M platform (spec.md §4.5: "console
/// output is function 2; all print helpers route through a single
/// `print_char` that calls address 5"). `Str` and `Bool` are inlined
/// directly against BDOS function 2 since they need no digit conversion;
/// numeric kinds still need one and so fall back to the same linked
/// `print_*` call the native backend uses — that routine is itself
/// expected to bottom out in `print_char`, which is a runtime-library
/// concern outside this emitter.
fn emit_print_cpm(kind: PrintKind, inst: &Instruction, frame: &FrameLayout, out: &mut String) {
    match kind {
        PrintKind::Str => {
            let id = inst.dest.index();
            let _ = writeln!(out, "    LD HL, {}", reg16(frame, inst.src1));
            let _ = writeln!(out, "    LD B, (HL)");
            let _ = writeln!(out, "    INC HL");
            let _ = writeln!(out, ".str_loop_{}:", id);
            let _ = writeln!(out, "    LD A, B");
            let _ = writeln!(out, "    OR A");
            let _ = writeln!(out, "    JR Z, .str_done_{}", id);
            let _ = writeln!(out, "    LD E, (HL)");
            let _ = writeln!(out, "    LD C, 2");
            let _ = writeln!(out, "    CALL BDOS");
            let _ = writeln!(out, "    INC HL");
            let _ = writeln!(out, "    DEC B");
            let _ = writeln!(out, "    JR .str_loop_{}", id);
            let _ = writeln!(out, ".str_done_{}:", id);
        }
        PrintKind::Bool => {
            let id = inst.dest.index();
            let _ = writeln!(out, "    LD A, {}", reg16(frame, inst.src1));
            let _ = writeln!(out, "    OR A");
            let _ = writeln!(out, "    LD E, '0'");
            let _ = writeln!(out, "    JR Z, .bool_skip_{}", id);
            let _ = writeln!(out, "    LD E, '1'");
            let _ = writeln!(out, ".bool_skip_{}:", id);
            let _ = writeln!(out, "    LD C, 2");
            let _ = writeln!(out, "    CALL BDOS");
        }
        PrintKind::U8 | PrintKind::U16 | PrintKind::I8 | PrintKind::I16 => {
            emit_print(kind, inst, frame, out);
        }
    }
}

/// `true` if `ty` is a pointer (used by the portable-C/LLVM backends; kept
/// here since it is the same classification the Z80 emitter uses for
/// address-sized loads).
pub fn is_pointer(ty: &Type) -> bool {
    matches!(ty, Type::Pointer(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use minz_ir::{Function, Instruction, Module, Op, Param, Type};

    fn recursive_smc_function() -> Function {
        let mut f = Function::new("f", vec![Param { name: "n".into(), ty: Type::u16() }], Type::u16());
        f.flags.smc_enabled = true;
        f.flags.recursive = true;
        let mut call = Instruction::new(Op::Call);
        call.symbol = Some("f".into());
        call.args = smallvec::smallvec![VReg::new(1)];
        f.instructions.push(Instruction::new(Op::LoadParam));
        f.instructions[0].symbol = Some("n".into());
        f.instructions[0].dest = VReg::new(1);
        f.instructions.push(call);
        f
    }

    #[test]
    fn smc_recursive_call_emits_save_restore_sequence() {
        let mut module = Module::new("m");
        module.functions.push(recursive_smc_function());
        let (text, _warnings) = emit_module(&module);

        let anchor = "f_param_n";
        let load_anchor = format!("LD HL, ({})", anchor);
        let push = "PUSH HL";
        let call = "CALL f";
        let pop = "POP HL";
        let store_anchor = format!("LD ({}), HL", anchor);

        let load_pos = text.find(&load_anchor).expect("anchor load present");
        let push_pos = text[load_pos..].find(push).map(|p| p + load_pos).expect("push present");
        let call_pos = text[push_pos..].find(call).map(|p| p + push_pos).expect("call present");
        let pop_pos = text[call_pos..].find(pop).map(|p| p + call_pos).expect("pop present");
        let store_pos = text[pop_pos..].find(&store_anchor).map(|p| p + pop_pos).expect("store present");
        assert!(load_pos < push_pos && push_pos < call_pos && call_pos < pop_pos && pop_pos <= store_pos);
    }

    #[test]
    fn anchor_is_defined_exactly_once_per_parameter() {
        let mut module = Module::new("m");
        module.functions.push(recursive_smc_function());
        let (text, _warnings) = emit_module(&module);
        assert_eq!(text.matches("f_param_n:").count(), 1);
    }

    #[test]
    fn unsupported_opcode_emits_todo_and_warning() {
        let mut module = Module::new("m");
        let mut f = Function::new("g", vec![], Type::void());
        f.instructions.push(Instruction::new(Op::Mul));
        module.functions.push(f);
        let (text, warnings) = emit_module(&module);
        assert!(text.contains("TODO"));
        assert_eq!(warnings.len(), 1);
        assert!(matches!(&warnings[0], EmitWarning::UnsupportedOpcode { op: Op::Mul, .. }));
    }

    #[test]
    fn lean_prologue_skips_unclobbered_registers() {
        let mut module = Module::new("m");
        let f = Function::new("h", vec![], Type::void());
        module.functions.push(f);
        let (text, _) = emit_module(&module);
        assert!(!text.contains("PUSH BC"));
        assert!(!text.contains("PUSH DE"));
    }
}
