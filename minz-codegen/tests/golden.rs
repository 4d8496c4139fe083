//! End-to-end codegen scenarios, driven through the public [`generate`]
//! entry point rather than any backend's internal emitter, the way a real
//! caller would use this crate.

use minz_codegen::{generate, GenOptions};
use minz_ir::{Function, Instruction, Module, Op, Param, Type, VReg};

fn recursive_smc_function() -> Function {
    let mut f = Function::new("f", vec![Param { name: "n".into(), ty: Type::u16() }], Type::u16());
    f.flags.recursive = true;
    let mut load_param = Instruction::new(Op::LoadParam);
    load_param.symbol = Some("n".into());
    load_param.dest = VReg::new(1);
    let mut call = Instruction::new(Op::Call);
    call.symbol = Some("f".into());
    call.args = smallvec::smallvec![VReg::new(1)];
    f.instructions.push(load_param);
    f.instructions.push(call);
    f
}

#[test]
fn z80_smc_recursive_self_call_saves_and_restores_anchors() {
    let mut module = Module::new("m");
    module.functions.push(recursive_smc_function());
    let options = GenOptions::new().with_smc(true);
    let text = generate(&module, "z80", &options).expect("z80 generation succeeds");

    let anchor = "f_param_n";
    let load_pos = text.find(&format!("LD HL, ({})", anchor)).expect("anchor load present");
    let push_pos = text[load_pos..].find("PUSH HL").map(|p| p + load_pos).expect("push present");
    let call_pos = text[push_pos..].find("CALL f").map(|p| p + push_pos).expect("call present");
    let pop_pos = text[call_pos..].find("POP HL").map(|p| p + call_pos).expect("pop present");
    let store_pos = text[pop_pos..].find(&format!("LD ({}), HL", anchor)).map(|p| p + pop_pos).expect("store present");
    assert!(load_pos < push_pos && push_pos < call_pos && call_pos < pop_pos && pop_pos <= store_pos);
}

#[test]
fn smc_request_against_a_non_smc_backend_is_rejected_before_any_text_is_emitted() {
    let module = Module::new("m");
    let options = GenOptions::new().with_smc(true);
    let err = generate(&module, "gb", &options).unwrap_err();
    assert!(format!("{}", err).contains("does not support"));
}

#[test]
fn every_backend_lowers_a_trivial_module_without_panicking() {
    let mut module = Module::new("m");
    module.functions.push(Function::new("f", vec![], Type::void()));

    for target in ["z80", "z80cpm", "i8080", "6502", "m68k", "gb", "wasm", "llvm", "c", "crystal"] {
        let text = generate(&module, target, &GenOptions::new())
            .unwrap_or_else(|e| panic!("backend `{}` failed: {}", target, e));
        assert!(!text.trim().is_empty(), "backend `{}` emitted nothing", target);
    }
}

#[test]
fn target_name_aliases_agree_with_their_canonical_backend() {
    let mut module = Module::new("m");
    module.functions.push(Function::new("f", vec![], Type::void()));
    let options = GenOptions::new();

    let canonical = generate(&module, "m68k", &options).unwrap();
    for alias in ["68000", "68k"] {
        assert_eq!(generate(&module, alias, &options).unwrap(), canonical);
    }

    let canonical = generate(&module, "i8080", &options).unwrap();
    for alias in ["8080", "intel8080"] {
        assert_eq!(generate(&module, alias, &options).unwrap(), canonical);
    }
}

#[test]
fn unknown_target_is_a_typed_error() {
    let module = Module::new("m");
    let err = generate(&module, "vax", &GenOptions::new()).unwrap_err();
    assert!(format!("{}", err).contains("vax"));
}
