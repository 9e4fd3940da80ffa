//! # Moves, constants, jumps, calls, and returns
//!
//! One handler per non-arithmetic, non-structural opcode. Every handler
//! takes the already-decoded [`Instr`] and returns a [`StepResult`]; the
//! dispatch loop in the parent module owns `pc` advancement.

use crate::bytecode::Instr;
use crate::error::RuntimeError;
use crate::function::FnValue;
use crate::heap::{GcPayload, ObjBox};
use crate::program::ConstEntry;
use crate::value::Value;

use super::{call_function, Frame, RootChain, SharedProgramData, StepResult, ThreadLocal};

pub(super) fn op_load_self(frame: &mut Frame) -> Result<StepResult, RuntimeError> {
    match &frame.locals[0] {
        Value::Struct(obj) => {
            frame.self_instance = Some(obj.clone());
            Ok(StepResult::Continue)
        }
        other => crate::error::FatalError::InvariantViolation(format!(
            "LOAD_SELF on a non-struct local: {}",
            other.type_name()
        ))
        .abort(),
    }
}

pub(super) fn op_mov_u16(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let n = instr.imm16() as i16 as i32;
    frame.set_reg(instr.a, Value::Int(n));
    Ok(StepResult::Continue)
}

pub(super) fn op_mov_bool(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    frame.set_reg(instr.a, Value::Bool(instr.b != 0));
    Ok(StepResult::Continue)
}

/// Materialize constant-pool entry `instr.imm16()` into `tl.const_cache`
/// on first touch (string literals become a heap `Str`; scalars are
/// already a `Value`), then copy it into register `instr.a`.
pub(super) fn op_load_const(
    tl: &mut ThreadLocal,
    pdata: &SharedProgramData,
    frame: &mut Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let rel_idx = instr.imm16() as usize;
    let start = pdata.borrow().tl_constant_start;
    let abs_idx = start + rel_idx;

    if matches!(tl.const_cache[abs_idx], Value::None) {
        let data = pdata.borrow();
        let v = match &data.data_val[rel_idx] {
            ConstEntry::Scalar(v) => v.clone(),
            ConstEntry::StrLiteral { buf_idx, buf_len } => {
                let bytes = &data.data_buf[*buf_idx as usize..(*buf_idx + *buf_len) as usize];
                let s = String::from_utf8_lossy(bytes).into_owned();
                let len = s.len();
                let obj = ObjBox::new(s);
                let chain = RootChain::new(frame, roots);
                tl.heap
                    .register_and_account(GcPayload::Str(obj.clone()), len, || chain.mark());
                Value::Str(obj)
            }
        };
        drop(data);
        v.value_ref();
        tl.const_cache[abs_idx] = v;
    }

    let v = tl.const_cache[abs_idx].clone();
    v.value_ref();
    frame.set_reg(instr.a, v);
    Ok(StepResult::Continue)
}

/// `MOV_REG_LOCAL reg, local_imm16`: write register `a`'s value into a
/// local slot (variable declaration/assignment).
pub(super) fn op_mov_reg_local(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let slot = instr.imm16();
    let v = frame.regs[instr.a as usize].clone();
    v.value_ref();
    frame.set_local(slot, v);
    Ok(StepResult::Continue)
}

/// `MOV_LOCAL_REG reg, local_imm16`: read a local slot into register `a`
/// (variable reference).
pub(super) fn op_mov_local_reg(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let slot = instr.imm16() as usize;
    let v = frame.locals[slot].clone();
    v.value_ref();
    frame.set_reg(instr.a, v);
    Ok(StepResult::Continue)
}

pub(super) fn op_load_nil(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    frame.set_reg(instr.a, Value::None);
    Ok(StepResult::Continue)
}

/// `SET_CONST`: same first-touch latch as `LOAD_CONST`, but the result is
/// never copied anywhere — it exists so an exported constant's
/// initializer runs exactly once regardless of how many modules import
/// it, with the value retrievable later purely through the const cache.
pub(super) fn op_set_const(
    tl: &mut ThreadLocal,
    pdata: &SharedProgramData,
    frame: &mut Frame,
    instr: Instr,
) -> Result<StepResult, RuntimeError> {
    let rel_idx = instr.imm16() as usize;
    let start = pdata.borrow().tl_constant_start;
    let abs_idx = start + rel_idx;

    if matches!(tl.const_cache[abs_idx], Value::None) {
        let v = frame.regs[instr.a as usize].clone();
        v.value_ref();
        tl.const_cache[abs_idx] = v;
    }
    Ok(StepResult::Continue)
}

pub(super) fn op_jif(frame: &Frame, pc: usize, instr: Instr) -> Result<StepResult, RuntimeError> {
    if frame.regs[instr.a as usize].is_truthy() {
        Ok(StepResult::Jump(pc + 4 + instr.rel16() as usize * 4))
    } else {
        Ok(StepResult::Continue)
    }
}

pub(super) fn op_jnif(frame: &Frame, pc: usize, instr: Instr) -> Result<StepResult, RuntimeError> {
    if !frame.regs[instr.a as usize].is_truthy() {
        Ok(StepResult::Jump(pc + 4 + instr.rel16() as usize * 4))
    } else {
        Ok(StepResult::Continue)
    }
}

pub(super) fn op_push_arg(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let v = frame.regs[instr.a as usize].clone();
    v.value_ref();
    frame.arg_stack.push(v);
    Ok(StepResult::Continue)
}

pub(super) fn op_call(
    tl: &mut ThreadLocal,
    pdata: &SharedProgramData,
    frame: &mut Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let fn_idx = instr.imm16() as usize;
    let n = pdata.borrow().fns[fn_idx].num_args();
    let len = frame.arg_stack.len();
    if len < n {
        return Err(RuntimeError::IncompatCall);
    }
    let args = frame.arg_stack.split_off(len - n);
    let chain = RootChain::new(frame, roots);
    let result = call_function(tl, pdata, fn_idx, args, Some(&chain))?;
    frame.set_reg(instr.a, result);
    Ok(StepResult::Continue)
}

/// The single-argument fast path the code generator rewrites a `PushArg`
/// immediately followed by a one-arg `Call` into: the argument moves
/// straight out of its register by value instead of going through
/// `arg_stack`.
pub(super) fn op_call1(
    tl: &mut ThreadLocal,
    pdata: &SharedProgramData,
    frame: &mut Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let fn_idx = instr.imm16() as usize;
    let arg = std::mem::replace(&mut frame.regs[instr.a as usize], Value::None);
    let chain = RootChain::new(frame, roots);
    let result = call_function(tl, pdata, fn_idx, vec![arg], Some(&chain))?;
    frame.set_reg(instr.a, result);
    Ok(StepResult::Continue)
}

pub(super) fn op_load_func(
    tl: &mut ThreadLocal,
    frame: &mut Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let fn_idx = instr.imm16() as usize;
    let obj = ObjBox::new(FnValue::from_bytecode(fn_idx));
    let chain = RootChain::new(frame, roots);
    tl.heap.register_and_account(
        GcPayload::Fn(obj.clone()),
        std::mem::size_of::<FnValue>(),
        || chain.mark(),
    );
    frame.set_reg(instr.a, Value::Fn(obj));
    Ok(StepResult::Continue)
}

pub(super) fn op_bind_arg_to_func(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let arg = frame.regs[instr.b as usize].clone();
    match &frame.regs[instr.a as usize] {
        Value::Fn(obj) => {
            obj.payload.borrow_mut().add_arg(arg);
            Ok(StepResult::Continue)
        }
        _ => Err(RuntimeError::IncompatCall),
    }
}

/// Calling a first-class function value: combine its already-bound
/// arguments with `instr.b` freshly-pushed unbound ones (popped off
/// `arg_stack`), check total arity against the target's declared arity,
/// then call through like any other indexed call.
pub(super) fn op_call_func_value(
    tl: &mut ThreadLocal,
    pdata: &SharedProgramData,
    frame: &mut Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let n_unbound = instr.b as usize;
    let len = frame.arg_stack.len();
    let unbound = frame.arg_stack.split_off(len - n_unbound);

    let fn_val = match &frame.regs[instr.a as usize] {
        Value::Fn(obj) => obj.clone(),
        _ => return Err(RuntimeError::IncompatCall),
    };

    let (fn_idx, mut args) = {
        let payload = fn_val.payload.borrow();
        let bound = payload.bound_args.clone();
        for a in &bound {
            a.value_ref();
        }
        (payload.fn_idx, bound)
    };
    args.extend(unbound);

    let expected = pdata.borrow().fns[fn_idx].num_args();
    if args.len() != expected {
        for a in &args {
            a.value_deref();
        }
        return Err(RuntimeError::IncompatCall);
    }

    let chain = RootChain::new(frame, roots);
    let result = call_function(tl, pdata, fn_idx, args, Some(&chain))?;
    frame.set_reg(instr.c, result);
    Ok(StepResult::Continue)
}

pub(super) fn op_ret(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let v = std::mem::replace(&mut frame.regs[instr.a as usize], Value::None);
    Ok(StepResult::Return(v))
}

/// `RET_LOCAL` is produced only by the `emit_ret` peephole rewrite of a
/// trailing `MovLocalReg` into a direct return; the local slot it
/// operates on is encoded across `instr.a`/`instr.b` (not the usual
/// `imm16` which reads `instr.b`/`instr.c`), matching how that rewrite
/// overwrites the opcode byte in place without touching the rest of the
/// original `MovLocalReg` operand bytes.
pub(super) fn op_ret_local(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let slot = u16::from_le_bytes([instr.a, instr.b]) as usize;
    let v = std::mem::replace(&mut frame.locals[slot], Value::None);
    Ok(StepResult::Return(v))
}

pub(super) fn op_raise(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let v = std::mem::replace(&mut frame.regs[instr.a as usize], Value::None);
    Err(RuntimeError::Raised(v))
}
