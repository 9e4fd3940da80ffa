//! # Multi-dispatch resolution
//!
//! A `Function::Dispatch` entry picks which concrete implementation to
//! run by the class of its first argument. Resolution is a direct linear
//! scan over `instances` comparing integer class indices — cheap for the
//! handful of instances a real dispatch function declares, so the
//! `DispatchInstance::class_interface_cache` slot exists on the type but
//! is intentionally left unused rather than built out into an
//! identity-cache fast path.

use crate::error::RuntimeError;
use crate::structs::StructObj;
use crate::value::Value;

pub(super) fn resolve_class_idx(args: &[Value]) -> Result<usize, RuntimeError> {
    match args.first() {
        Some(Value::Struct(obj)) => match &*obj.payload.borrow() {
            StructObj::Class(c) => Ok(c.class_idx()),
            _ => Err(RuntimeError::IncompatCall),
        },
        _ => Err(RuntimeError::IncompatCall),
    }
}
