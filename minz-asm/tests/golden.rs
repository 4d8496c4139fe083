//! End-to-end assembly scenarios exercising the classic assembler
//! conveniences together, the way a real `.z80` source file would.

#[test]
fn org_labels_and_forward_jump() {
    let source = "\
    ORG 0x8000
start:
    JP main
message:
    DB \"HI\", 0
main:
    LD HL, message
    RET
";
    let program = minz_asm::assemble(source, &[]).unwrap();
    assert_eq!(program.origin, 0x8000);
    assert_eq!(program.symbols.get("message"), Some(0x8003));
    assert_eq!(program.symbols.get("main"), Some(0x8006));
    assert_eq!(&program.bytes[0..3], &[0xC3, 0x06, 0x80]);
}

#[test]
fn multi_arg_and_fake_move_expansion_compose() {
    let source = "\
    ORG 0x8000
    INC A, B
    LD HL, DE
";
    let program = minz_asm::assemble(source, &[]).unwrap();
    // INC A ; INC B ; LD H,D ; LD L,E
    assert_eq!(program.bytes, vec![0x3C, 0x04, 0x62, 0x6B]);
}

#[test]
fn macro_expansion_with_standard_library() {
    let source = "\
    ORG 0x8000
    PUSH_ALL
    POP_ALL
";
    let program = minz_asm::assemble(source, &[]).unwrap();
    assert_eq!(program.bytes, vec![0xF5, 0xC5, 0xD5, 0xE5, 0xE1, 0xD1, 0xC1, 0xF1]);
}

#[test]
fn user_defined_macro_with_parameter_substitution() {
    let source = "\
square: MACRO r
    LD A, r
    ADD A, r
ENDM
    ORG 0x8000
    square B
";
    let program = minz_asm::assemble(source, &[]).unwrap();
    assert_eq!(program.bytes, vec![0x78, 0x80]);
}

#[test]
fn platform_symbols_seed_cpm_bdos_calls() {
    let source = "\
    ORG 0x100
    LD C, 2
    CALL BDOS
    RET
";
    let program = minz_asm::assemble(source, &[("BDOS", 0x0005)]).unwrap();
    assert_eq!(&program.bytes[2..5], &[0xCD, 0x05, 0x00]);
}

#[test]
fn high_low_byte_operators_split_a_16bit_address() {
    let source = "\
    ORG 0x8000
target: EQU 0x1234
    LD A, ^H target
    LD A, ^L target
";
    let program = minz_asm::assemble(source, &[]).unwrap();
    assert_eq!(program.bytes, vec![0x3E, 0x12, 0x3E, 0x34]);
}

#[test]
fn target_and_model_directives_survive_to_the_assembled_program() {
    let source = "\
    TARGET zxspectrum
    MODEL 48k
    ORG 0x8000
    NOP
";
    let program = minz_asm::assemble(source, &[]).unwrap();
    assert_eq!(program.target.as_deref(), Some("zxspectrum"));
    assert_eq!(program.model.as_deref(), Some("48k"));
    assert_eq!(program.bytes, vec![0x00]);
}

#[test]
fn undocumented_sll_assembles_in_register_and_indexed_form() {
    let source = "\
    ORG 0x8000
    SLL A
    SLL (IX+5)
";
    let program = minz_asm::assemble(source, &[]).unwrap();
    assert_eq!(program.bytes, vec![0xCB, 0x37, 0xDD, 0xCB, 0x05, 0x36]);
}

#[test]
fn alignment_operator_rounds_an_address_up_to_the_next_256_byte_boundary() {
    let source = "\
    ORG 0x8000
    LD HL, $1234^^
";
    let program = minz_asm::assemble(source, &[]).unwrap();
    assert_eq!(program.bytes, vec![0x21, 0x00, 0x13]);
}

#[test]
fn undefined_symbol_is_reported_with_its_source_line() {
    let source = "    ORG 0x8000\n    LD A, (MISSING)\n";
    let err = minz_asm::assemble(source, &[]).unwrap_err();
    match err {
        minz_asm::AsmError::UndefinedSymbol { line, name } => {
            assert_eq!(line, 2);
            assert_eq!(name, "MISSING");
        }
        other => panic!("expected UndefinedSymbol, got {:?}", other),
    }
}
