use super::*;

#[test]
fn decode_reads_little_endian_operands() {
    let bytes = encode_a_imm16(Opcode::MovU16, 3, 0x1234);
    let instr = decode(&bytes, 0);
    assert_eq!(instr.op, Opcode::MovU16);
    assert_eq!(instr.a, 3);
    assert_eq!(instr.imm16(), 0x1234);
}

#[test]
fn decode_unknown_opcode_falls_back_to_nop() {
    let bytes = [0xff, 1, 2, 3];
    let instr = decode(&bytes, 0);
    assert_eq!(instr.op, Opcode::Nop);
}

#[test]
fn encode_abc_round_trips_three_operands() {
    let bytes = encode_abc(Opcode::Not, 5, 6, 7);
    let instr = decode(&bytes, 0);
    assert_eq!(instr.a, 5);
    assert_eq!(instr.b, 6);
    assert_eq!(instr.c, 7);
}

#[test]
fn encode_imm16_leaves_a_zero() {
    let bytes = encode_imm16(Opcode::Import, 42);
    let instr = decode(&bytes, 0);
    assert_eq!(instr.a, 0);
    assert_eq!(instr.imm16(), 42);
}

#[test]
fn patch_imm16_overwrites_only_trailing_bytes() {
    let mut bc = encode_a_imm16(Opcode::Jif, 9, 0).to_vec();
    patch_imm16(&mut bc, 0, 7);
    let instr = decode(&bc, 0);
    assert_eq!(instr.a, 9);
    assert_eq!(instr.rel16(), 7);
}

#[test]
fn rewrite_opcode_preserves_operand_bytes() {
    let mut bc = encode_abc(Opcode::Add, 1, 2, 3).to_vec();
    rewrite_opcode(&mut bc, 0, Opcode::AddInt);
    let instr = decode(&bc, 0);
    assert_eq!(instr.op, Opcode::AddInt);
    assert_eq!((instr.a, instr.b, instr.c), (1, 2, 3));
}

#[test]
fn opcode_from_u8_round_trips_every_discriminant() {
    for b in 0..OPCODE_COUNT as u8 {
        let op = Opcode::from_u8(b).expect("every discriminant below OPCODE_COUNT must decode");
        assert_eq!(op as u8, b);
    }
    assert!(Opcode::from_u8(OPCODE_COUNT as u8).is_none());
}

#[test]
fn is_jump_covers_exactly_the_branching_opcodes() {
    let jumps = [
        Opcode::Jif,
        Opcode::Jnif,
        Opcode::Jrel,
        Opcode::Jrelb,
        Opcode::JifBool,
        Opcode::JnifBool,
    ];
    for op in jumps {
        assert!(op.is_jump());
    }
    assert!(!Opcode::Add.is_jump());
    assert!(!Opcode::Call.is_jump());
}
