use super::*;
use super::ops_arith;
use crate::bytecode::{encode_a_imm16, encode_abc, Opcode};
use crate::function::{Function, FunctionFlags};
use crate::program::ConstEntry;
use crate::resolver::{ModuleResolver, ResolvedModule};
use std::cell::RefCell;
use std::rc::Rc;

struct NullResolver;

impl ModuleResolver for NullResolver {
    fn resolve(&self, relpath: &str, _cwd: &str) -> Result<ResolvedModule, RuntimeError> {
        Err(RuntimeError::UnknownImportTarget(relpath.to_string()))
    }
}

fn new_tl(config: VmConfig) -> ThreadLocal {
    ThreadLocal::new(config, Box::new(NullResolver), Box::new(|_: &Value| {}))
}

fn empty_pdata() -> SharedProgramData {
    Rc::new(RefCell::new(ProgramData::new(
        "test".to_string(),
        ".".to_string(),
    )))
}

fn make_storage(bc: Vec<u8>, num_registers: usize, num_locals: usize) -> SharedStorage {
    Rc::new(RefCell::new(BytecodeStorage {
        bc,
        num_registers,
        num_locals,
    }))
}

#[test]
fn int_addition_specializes_its_own_opcode() {
    let mut tl = new_tl(VmConfig::default());
    let pdata = empty_pdata();
    let bc = [
        encode_a_imm16(Opcode::MovU16, 0, 5),
        encode_a_imm16(Opcode::MovU16, 1, 3),
        encode_abc(Opcode::Add, 0, 1, 2),
        encode_abc(Opcode::Ret, 2, 0, 0),
    ]
    .concat();
    let storage = make_storage(bc, 3, 0);

    let result = exec(&mut tl, &storage, &pdata, &[], None).unwrap();
    assert!(matches!(result, Value::Int(8)));

    let rewritten = crate::bytecode::decode(&storage.borrow().bc, 8);
    assert_eq!(rewritten.op, Opcode::AddInt);
}

#[test]
fn specialized_opcode_deoptimizes_when_operand_types_change() {
    // Pre-specialized AddInt at pc=0, but the registers now hold doubles.
    let bc = [
        encode_abc(Opcode::AddInt, 0, 1, 2),
        encode_abc(Opcode::Ret, 2, 0, 0),
    ]
    .concat();
    let storage = make_storage(bc, 3, 0);

    let mut frame = Frame {
        regs: vec![Value::Double(1.5), Value::Double(2.5), Value::None],
        locals: vec![],
        arg_stack: vec![],
        self_instance: None,
    };
    let instr = crate::bytecode::decode(&storage.borrow().bc, 0);
    let step = ops_arith::op_int_binop(&storage, &mut frame, 0, instr).unwrap();
    assert!(matches!(step, StepResult::Continue));
    assert!(matches!(frame.regs[2], Value::Double(d) if (d - 4.0).abs() < f64::EPSILON));

    let rewritten = crate::bytecode::decode(&storage.borrow().bc, 0);
    assert_eq!(rewritten.op, Opcode::Add);
}

#[test]
fn incompatible_binop_operands_raise_a_runtime_error() {
    let mut tl = new_tl(VmConfig::default());
    let pdata = empty_pdata();
    let bc = [
        encode_a_imm16(Opcode::MovBool, 0, 1),
        encode_a_imm16(Opcode::MovU16, 1, 5),
        encode_abc(Opcode::Add, 0, 1, 2),
        encode_abc(Opcode::Ret, 2, 0, 0),
    ]
    .concat();
    let storage = make_storage(bc, 3, 0);

    let err = exec(&mut tl, &storage, &pdata, &[], None).unwrap_err();
    assert!(matches!(err, RuntimeError::IncompatBinOp { .. }));
}

/// Mirrors what `exec_main`/`ops_import::op_import` do to register a
/// module's constants before its bytecode can run `LOAD_CONST` against them.
fn register_consts(tl: &mut ThreadLocal, pdata: &SharedProgramData) {
    let start = tl.const_len;
    let n = pdata.borrow().data_val.len();
    pdata.borrow_mut().tl_constant_start = start;
    tl.const_len = start + n;
    tl.const_cache.resize(tl.const_len, Value::None);
}

#[test]
fn mov_reg_local_and_mov_local_reg_round_trip_a_heap_value() {
    let mut tl = new_tl(VmConfig::default());
    let pdata = empty_pdata();
    {
        let mut data = pdata.borrow_mut();
        data.data_buf = b"hi".to_vec();
        data.data_val.push(ConstEntry::StrLiteral {
            buf_idx: 0,
            buf_len: 2,
        });
    }
    register_consts(&mut tl, &pdata);

    let bc = [
        encode_a_imm16(Opcode::LoadConst, 0, 0),
        encode_a_imm16(Opcode::MovRegLocal, 0, 0),
        encode_a_imm16(Opcode::MovLocalReg, 1, 0),
        encode_abc(Opcode::Ret, 1, 0, 0),
    ]
    .concat();
    let storage = make_storage(bc, 2, 1);

    let result = exec(&mut tl, &storage, &pdata, &[], None).unwrap();
    assert_eq!(result.display_string(), "hi");
    match &result {
        Value::Str(r) => assert_eq!(r.rc(), 1),
        other => panic!("expected Str, got {other:?}"),
    }
}

fn bytecode_fn(num_args: usize, func_idx: usize, storage: BytecodeStorage) -> Function {
    Function::Bytecode {
        num_args,
        flags: FunctionFlags::default(),
        class_idx: None,
        storage: Rc::new(RefCell::new(storage)),
        source_map_start: 0,
        func_idx,
    }
}

#[test]
fn call1_invokes_a_function_and_returns_its_value() {
    let mut tl = new_tl(VmConfig::default());
    let pdata = empty_pdata();

    // fn(x) { return x * 2 }
    let callee_bc = [
        encode_a_imm16(Opcode::MovLocalReg, 0, 0),
        encode_a_imm16(Opcode::MovU16, 1, 2),
        encode_abc(Opcode::Mul, 0, 1, 2),
        encode_abc(Opcode::Ret, 2, 0, 0),
    ]
    .concat();
    pdata.borrow_mut().fns.push(bytecode_fn(
        1,
        0,
        BytecodeStorage {
            bc: callee_bc,
            num_registers: 3,
            num_locals: 1,
        },
    ));

    let main_bc = [
        encode_a_imm16(Opcode::MovU16, 0, 5),
        encode_a_imm16(Opcode::Call1, 0, 0),
        encode_abc(Opcode::Ret, 0, 0, 0),
    ]
    .concat();
    let main_storage = make_storage(main_bc, 1, 0);

    let result = exec(&mut tl, &main_storage, &pdata, &[], None).unwrap();
    assert!(matches!(result, Value::Int(10)));
}

#[test]
fn ret_local_returns_a_local_slot_directly() {
    let mut tl = new_tl(VmConfig::default());
    let pdata = empty_pdata();
    let slot: u16 = 0;
    let slot_bytes = slot.to_le_bytes();
    let bc = [
        encode_a_imm16(Opcode::MovU16, 0, 9),
        encode_a_imm16(Opcode::MovRegLocal, 0, 0),
        [Opcode::RetLocal as u8, slot_bytes[0], slot_bytes[1], 0],
    ]
    .concat();
    let storage = make_storage(bc, 1, 1);

    let result = exec(&mut tl, &storage, &pdata, &[], None).unwrap();
    assert!(matches!(result, Value::Int(9)));
}

#[test]
fn raise_unwinds_as_a_runtime_error_carrying_its_value() {
    let mut tl = new_tl(VmConfig::default());
    let pdata = empty_pdata();
    let bc = [
        encode_a_imm16(Opcode::MovU16, 0, 7),
        encode_abc(Opcode::Raise, 0, 0, 0),
    ]
    .concat();
    let storage = make_storage(bc, 1, 0);

    match exec(&mut tl, &storage, &pdata, &[], None).unwrap_err() {
        RuntimeError::Raised(Value::Int(7)) => {}
        other => panic!("expected Raised(Int(7)), got {other:?}"),
    }
}

#[test]
fn deep_recursion_trips_the_frame_depth_guard() {
    let mut config = VmConfig::default();
    config.stack_max_bytes = APPROX_FRAME_BYTES * 3;
    let mut tl = new_tl(config);
    let pdata = empty_pdata();

    // fn() { return self() } -- recurses until the frame budget is spent.
    let bc = [
        encode_a_imm16(Opcode::Call, 0, 0),
        encode_abc(Opcode::Ret, 0, 0, 0),
    ]
    .concat();
    pdata.borrow_mut().fns.push(bytecode_fn(
        0,
        0,
        BytecodeStorage {
            bc,
            num_registers: 1,
            num_locals: 0,
        },
    ));

    let main_storage = match &pdata.borrow().fns[0] {
        Function::Bytecode { storage, .. } => storage.clone(),
        _ => unreachable!(),
    };

    let result = exec(&mut tl, &main_storage, &pdata, &[], None);
    assert!(matches!(result, Err(RuntimeError::StackOverflow)));
}

#[test]
fn compound_assign_applies_the_base_operator_to_a_local() {
    let mut frame = Frame {
        regs: vec![Value::Int(3)],
        locals: vec![Value::Int(10)],
        arg_stack: vec![],
        self_instance: None,
    };
    let instr = crate::bytecode::decode(&encode_a_imm16(Opcode::AddAsg, 0, 0), 0);
    let step = ops_arith::op_compound_asg(&mut frame, instr).unwrap();
    assert!(matches!(step, StepResult::Continue));
    assert!(matches!(frame.locals[0], Value::Int(13)));
}

#[test]
fn unmarked_reference_cycle_is_collected_even_though_its_rc_never_hits_zero() {
    let mut tl = new_tl(VmConfig::default());

    // An array holding a handle to itself: a genuine cycle whose rc header
    // can never reach zero through ref_dec alone.
    let obj = crate::heap::ObjBox::new(StructObj::Array(crate::structs::Array {
        items: Vec::new(),
    }));
    let self_ref = Value::Struct(obj.clone());
    self_ref.value_ref();
    obj.payload.borrow_mut().push(self_ref);
    assert_eq!(obj.rc(), 2);

    tl.heap
        .register_and_account(crate::heap::GcPayload::Struct(obj.clone()), 64, || {});
    assert_eq!(tl.heap.object_count(), 1);

    // No live frame references this object; an empty mark_roots leaves it
    // unmarked, so the sweep reclaims it despite rc() staying above zero.
    tl.heap.account_alloc(2_000_000, || {});
    assert_eq!(tl.heap.object_count(), 0);
    assert_eq!(tl.heap.collections(), 1);
}

#[test]
fn marked_object_survives_a_collection_pass() {
    let mut tl = new_tl(VmConfig::default());

    let obj = crate::heap::ObjBox::new(StructObj::Array(crate::structs::Array {
        items: Vec::new(),
    }));
    tl.heap
        .register_and_account(crate::heap::GcPayload::Struct(obj.clone()), 64, || {});
    assert_eq!(tl.heap.object_count(), 1);

    let marker = obj.clone();
    tl.heap
        .account_alloc(2_000_000, || crate::heap::mark_struct_obj(&marker));
    assert_eq!(tl.heap.object_count(), 1);
    assert_eq!(tl.heap.collections(), 1);
}

#[test]
fn not_negates_truthiness() {
    let mut frame = Frame {
        regs: vec![Value::Bool(false)],
        locals: vec![],
        arg_stack: vec![],
        self_instance: None,
    };
    let instr = crate::bytecode::decode(&encode_abc(Opcode::Not, 0, 0, 0), 0);
    ops_arith::op_not(&mut frame, instr).unwrap();
    assert!(matches!(frame.regs[0], Value::Bool(true)));
}
