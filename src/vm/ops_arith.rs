//! # Binary arithmetic/comparison and their Int/Double specializations
//!
//! A binop opcode starts out generic (`Mul`, `Add`, ...). The first time
//! it runs against two `Int`s or two `Double`s, the handler rewrites its
//! own opcode byte in place to the matching specialization (`MulInt`,
//! `MulDouble`, ...) so every subsequent execution of that instruction
//! skips the type dispatch. A specialized instruction that later sees
//! operands outside its assumed type pair deoptimizes back to the
//! generic form rather than erroring — the generic handler is always
//! correct, just slower.

use crate::bytecode::{rewrite_opcode, Instr, Opcode};
use crate::error::RuntimeError;
use crate::value::Value;

use super::{Frame, SharedStorage, StepResult};

/// Apply the operator named by `op` (generic or specialized, they all
/// mean the same arithmetic) to `left`/`right`.
fn apply(op: Opcode, left: &Value, right: &Value) -> Value {
    use Opcode::*;
    match op {
        Mul | MulInt | MulDouble => left.mul(right),
        Div | DivInt | DivDouble => left.div(right),
        Add | AddInt | AddDouble => left.add(right),
        Sub | SubInt | SubDouble => left.sub(right),
        Mod | ModInt => left.rem(right),
        Eq | EqInt | EqDouble => left.eq_value(right),
        Neq | NeqInt | NeqDouble => left.neq_value(right),
        Lt | LtInt | LtDouble => left.lt_value(right),
        Gt | GtInt | GtDouble => left.gt_value(right),
        Leq | LeqInt | LeqDouble => left.leq_value(right),
        Geq | GeqInt | GeqDouble => left.geq_value(right),
        other => unreachable!("apply called with non-arithmetic opcode {other:?}"),
    }
}

fn int_specialization(op: Opcode) -> Option<Opcode> {
    use Opcode::*;
    Some(match op {
        Mul => MulInt,
        Div => DivInt,
        Add => AddInt,
        Sub => SubInt,
        Mod => ModInt,
        Eq => EqInt,
        Neq => NeqInt,
        Lt => LtInt,
        Gt => GtInt,
        Leq => LeqInt,
        Geq => GeqInt,
        _ => return None,
    })
}

fn double_specialization(op: Opcode) -> Option<Opcode> {
    use Opcode::*;
    Some(match op {
        Mul => MulDouble,
        Div => DivDouble,
        Add => AddDouble,
        Sub => SubDouble,
        Eq => EqDouble,
        Neq => NeqDouble,
        Lt => LtDouble,
        Gt => GtDouble,
        Leq => LeqDouble,
        Geq => GeqDouble,
        _ => return None,
    })
}

fn deopt_to_generic(op: Opcode) -> Opcode {
    use Opcode::*;
    match op {
        MulInt | MulDouble => Mul,
        DivInt | DivDouble => Div,
        AddInt | AddDouble => Add,
        SubInt | SubDouble => Sub,
        ModInt => Mod,
        EqInt | EqDouble => Eq,
        NeqInt | NeqDouble => Neq,
        LtInt | LtDouble => Lt,
        GtInt | GtDouble => Gt,
        LeqInt | LeqDouble => Leq,
        GeqInt | GeqDouble => Geq,
        other => other,
    }
}

fn incompat(left: &Value, right: &Value) -> RuntimeError {
    RuntimeError::IncompatBinOp {
        left: left.type_name().to_string(),
        right: right.type_name().to_string(),
    }
}

pub(super) fn op_generic_binop(
    storage: &SharedStorage,
    frame: &mut Frame,
    pc: usize,
    instr: Instr,
) -> Result<StepResult, RuntimeError> {
    let left = frame.regs[instr.a as usize].clone();
    let right = frame.regs[instr.b as usize].clone();

    let result = apply(instr.op, &left, &right);
    if matches!(result, Value::Error) {
        return Err(incompat(&left, &right));
    }

    let spec = match (&left, &right) {
        (Value::Int(_), Value::Int(_)) => int_specialization(instr.op),
        (Value::Double(_), Value::Double(_)) => double_specialization(instr.op),
        _ => None,
    };
    if let Some(spec_op) = spec {
        rewrite_opcode(&mut storage.borrow_mut().bc, pc, spec_op);
        log::trace!("specialized {:?} -> {:?} at pc={pc}", instr.op, spec_op);
    }

    frame.set_reg(instr.c, result);
    Ok(StepResult::Continue)
}

pub(super) fn op_int_binop(
    storage: &SharedStorage,
    frame: &mut Frame,
    pc: usize,
    instr: Instr,
) -> Result<StepResult, RuntimeError> {
    let left = &frame.regs[instr.a as usize];
    let right = &frame.regs[instr.b as usize];
    if !matches!((left, right), (Value::Int(_), Value::Int(_))) {
        let generic = deopt_to_generic(instr.op);
        rewrite_opcode(&mut storage.borrow_mut().bc, pc, generic);
        log::trace!("deoptimized {:?} -> {:?} at pc={pc}", instr.op, generic);
        return op_generic_binop(storage, frame, pc, Instr { op: generic, ..instr });
    }
    let result = apply(instr.op, left, right);
    frame.set_reg(instr.c, result);
    Ok(StepResult::Continue)
}

pub(super) fn op_double_binop(
    storage: &SharedStorage,
    frame: &mut Frame,
    pc: usize,
    instr: Instr,
) -> Result<StepResult, RuntimeError> {
    let left = &frame.regs[instr.a as usize];
    let right = &frame.regs[instr.b as usize];
    if !matches!((left, right), (Value::Double(_), Value::Double(_))) {
        let generic = deopt_to_generic(instr.op);
        rewrite_opcode(&mut storage.borrow_mut().bc, pc, generic);
        log::trace!("deoptimized {:?} -> {:?} at pc={pc}", instr.op, generic);
        return op_generic_binop(storage, frame, pc, Instr { op: generic, ..instr });
    }
    let result = apply(instr.op, left, right);
    frame.set_reg(instr.c, result);
    Ok(StepResult::Continue)
}

/// `*_ASG reg, local_imm16`: `locals[slot] = locals[slot] <op> regs[a]`.
pub(super) fn op_compound_asg(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    use Opcode::*;
    let base = match instr.op {
        MulAsg => Mul,
        DivAsg => Div,
        AddAsg => Add,
        SubAsg => Sub,
        ModAsg => Mod,
        other => unreachable!("op_compound_asg called with {other:?}"),
    };
    let slot = instr.imm16();
    let rhs = frame.regs[instr.a as usize].clone();
    let lhs = frame.locals[slot as usize].clone();

    let result = apply(base, &lhs, &rhs);
    if matches!(result, Value::Error) {
        return Err(incompat(&lhs, &rhs));
    }
    frame.set_local(slot, result);
    Ok(StepResult::Continue)
}

/// `NOT reg, _, reg`: logical negation, source and destination share one
/// register per the code generator.
pub(super) fn op_not(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let v = Value::Bool(!frame.regs[instr.a as usize].is_truthy());
    frame.set_reg(instr.c, v);
    Ok(StepResult::Continue)
}
