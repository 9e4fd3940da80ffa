//! # Array/tuple/class construction, indexing, and printing

use crate::bytecode::Instr;
use crate::error::RuntimeError;
use crate::heap::{GcPayload, ObjBox};
use crate::structs::{Array, ClassInstance, StructObj, Tuple};
use crate::value::Value;

use super::{Frame, RootChain, SharedProgramData, StepResult, ThreadLocal};

pub(super) fn op_array_new(
    tl: &mut ThreadLocal,
    frame: &mut Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let cap = instr.imm16() as usize;
    let obj = ObjBox::new(StructObj::Array(Array {
        items: Vec::with_capacity(cap),
    }));
    let chain = RootChain::new(frame, roots);
    tl.heap.register_and_account(
        GcPayload::Struct(obj.clone()),
        cap * std::mem::size_of::<Value>(),
        || chain.mark(),
    );
    frame.set_reg(instr.a, Value::Struct(obj));
    Ok(StepResult::Continue)
}

pub(super) fn op_array_push(
    tl: &mut ThreadLocal,
    frame: &mut Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let item = frame.regs[instr.b as usize].clone();
    item.value_ref();
    match &frame.regs[instr.a as usize] {
        Value::Struct(obj) => {
            obj.payload.borrow_mut().push(item);
            Ok(())
        }
        other => Err(RuntimeError::IndexingNonCollection(other.type_name().to_string())),
    }?;
    let chain = RootChain::new(frame, roots);
    tl.heap
        .account_alloc(std::mem::size_of::<Value>(), || chain.mark());
    Ok(StepResult::Continue)
}

fn expect_int_index(v: &Value, collection: &str) -> Result<i32, RuntimeError> {
    match v {
        Value::Int(i) => Ok(*i),
        other => Err(RuntimeError::InvalidIndex {
            collection: collection.to_string(),
            idx: other.display_string(),
        }),
    }
}

pub(super) fn op_idx_get(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    match &frame.regs[instr.a as usize] {
        Value::Struct(obj) => {
            let collection = obj.payload.borrow().type_name().to_string();
            let idx = expect_int_index(&frame.regs[instr.b as usize], &collection)?;
            let result = obj
                .payload
                .borrow()
                .idx_get(idx)
                .ok_or_else(|| RuntimeError::InvalidIndex {
                    collection: collection.clone(),
                    idx: idx.to_string(),
                })?;
            result.value_ref();
            frame.set_reg(instr.c, result);
            Ok(StepResult::Continue)
        }
        other => Err(RuntimeError::IndexingNonCollection(other.type_name().to_string())),
    }
}

pub(super) fn op_idx_set(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let new_val = frame.regs[instr.c as usize].clone();
    new_val.value_ref();
    match &frame.regs[instr.a as usize] {
        Value::Struct(obj) => {
            let collection = obj.payload.borrow().type_name().to_string();
            let idx = expect_int_index(&frame.regs[instr.b as usize], &collection)?;
            let old = obj.payload.borrow().idx_get(idx);
            let ok = obj.payload.borrow_mut().idx_set(idx, new_val);
            if !ok {
                return Err(RuntimeError::InvalidIndex {
                    collection,
                    idx: idx.to_string(),
                });
            }
            if let Some(old) = old {
                old.value_deref();
            }
            Ok(StepResult::Continue)
        }
        other => Err(RuntimeError::IndexingNonCollection(other.type_name().to_string())),
    }
}

pub(super) fn op_tuple_new(
    tl: &mut ThreadLocal,
    frame: &mut Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let len = instr.imm16() as usize;
    let obj = ObjBox::new(StructObj::Tuple(Tuple {
        items: vec![Value::None; len],
    }));
    let chain = RootChain::new(frame, roots);
    tl.heap.register_and_account(
        GcPayload::Struct(obj.clone()),
        len * std::mem::size_of::<Value>(),
        || chain.mark(),
    );
    frame.set_reg(instr.a, Value::Struct(obj));
    Ok(StepResult::Continue)
}

/// `IDX_SET_STATIC tuple_reg, static_idx_u8, val_reg`: used only to
/// populate a freshly-built tuple literal, so unlike `IDX_SET` there is
/// no old value at that slot to release.
pub(super) fn op_idx_set_static(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let new_val = frame.regs[instr.c as usize].clone();
    new_val.value_ref();
    match &frame.regs[instr.a as usize] {
        Value::Struct(obj) => {
            obj.payload.borrow_mut().idx_set(instr.b as i32, new_val);
            Ok(StepResult::Continue)
        }
        other => Err(RuntimeError::IndexingNonCollection(other.type_name().to_string())),
    }
}

pub(super) fn op_class_new(
    tl: &mut ThreadLocal,
    pdata: &SharedProgramData,
    frame: &mut Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let class_idx = instr.imm16() as usize;
    let iface = pdata.borrow().classes[class_idx].clone().unwrap_or_else(|| {
        crate::error::FatalError::InvariantViolation(format!(
            "CLASS_NEW referenced unresolved class slot {class_idx}"
        ))
        .abort()
    });
    let n_fields = iface.field_map.len();
    let obj = ObjBox::new(StructObj::Class(ClassInstance::new(iface)));
    let chain = RootChain::new(frame, roots);
    tl.heap.register_and_account(
        GcPayload::Struct(obj.clone()),
        n_fields * std::mem::size_of::<Value>(),
        || chain.mark(),
    );
    frame.set_reg(instr.a, Value::Struct(obj));
    Ok(StepResult::Continue)
}

pub(super) fn op_class_get_inner(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let field_idx = instr.imm16() as usize;
    let obj = frame.self_instance.clone().unwrap_or_else(|| {
        crate::error::FatalError::InvariantViolation(
            "CLASS_GET_INNER with no bound receiver".to_string(),
        )
        .abort()
    });
    match &*obj.payload.borrow() {
        StructObj::Class(c) => {
            let v = c.fields[field_idx].clone();
            v.value_ref();
            frame.set_reg(instr.a, v);
            Ok(StepResult::Continue)
        }
        other => Err(RuntimeError::IndexingNonCollection(other.type_name().to_string())),
    }
}

pub(super) fn op_class_set_inner(frame: &mut Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    let field_idx = instr.imm16() as usize;
    let new_val = frame.regs[instr.a as usize].clone();
    new_val.value_ref();
    let obj = frame.self_instance.clone().unwrap_or_else(|| {
        crate::error::FatalError::InvariantViolation(
            "CLASS_SET_INNER with no bound receiver".to_string(),
        )
        .abort()
    });
    match &mut *obj.payload.borrow_mut() {
        StructObj::Class(c) => {
            let old = std::mem::replace(&mut c.fields[field_idx], new_val);
            old.value_deref();
            Ok(StepResult::Continue)
        }
        other => Err(RuntimeError::IndexingNonCollection(other.type_name().to_string())),
    }
}

/// `PRINT reg, _, is_last`: render one value through the pluggable sink;
/// `is_last` (0/1) controls only the trailing newline, routed through
/// `print_raw_fn` alongside `PRINT_SEP`'s separator so an embedder with a
/// custom sink sees the exact punctuation a real terminal would.
pub(super) fn op_print(tl: &mut ThreadLocal, frame: &Frame, instr: Instr) -> Result<StepResult, RuntimeError> {
    (tl.print_fn)(&frame.regs[instr.a as usize]);
    if instr.c == 1 {
        (tl.print_raw_fn)("\n");
    }
    Ok(StepResult::Continue)
}

pub(super) fn op_print_sep(tl: &mut ThreadLocal) -> Result<StepResult, RuntimeError> {
    (tl.print_raw_fn)(" ");
    Ok(StepResult::Continue)
}
