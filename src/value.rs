//! # Value representation for the register VM
//!
//! [`Value`] is the tagged, fixed-width runtime type that lives in every
//! register, local slot, and argument-stack entry. The first four variants
//! are inline (copied by value, no refcount involved); `Str`, `Struct`, and
//! `Fn` hold a reference-counted handle into [`crate::heap`]. `Error` is a
//! sentinel only ever returned from an operation to signal failure to its
//! caller — the VM converts it into a [`RuntimeError`] before it could ever
//! be written into a register or local.
//!
//! ## Coercion rules
//! - `is_truthy`: `false` for `None`, `Bool(false)`, `Int(0)`; truthy
//!   otherwise.
//! - Arithmetic (`add`/`sub`/`mul`/`div`/`rem`) and comparison keep
//!   int/int results as `Int` (wrapping for `add`/`sub`/`mul`, `div`
//!   truncating to `Double`), keep double/double results as `Double`, and
//!   treat `+` on two `Str`s as concatenation. Anything else incompatible
//!   returns [`Value::Error`].

use std::rc::Rc;

use crate::function::FnValue;
use crate::heap::ObjBox;
use crate::structs::StructObj;

/// The universal runtime value.
#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(i32),
    Double(f64),
    Str(Rc<ObjBox<String>>),
    Struct(Rc<ObjBox<StructObj>>),
    Fn(Rc<ObjBox<FnValue>>),
    /// Non-storable sentinel signaling an arithmetic/call/index failure.
    /// Never persists past the instruction that produced it.
    Error,
}

impl Value {
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            _ => true,
        }
    }

    /// Increment the refcount if this value holds a heap handle; no-op
    /// for inline variants. Call whenever a value is copied into a new
    /// slot (register, local, argument-stack entry, bound argument).
    pub fn value_ref(&self) {
        match self {
            Value::Str(r) => r.ref_inc(),
            Value::Struct(r) => r.ref_inc(),
            Value::Fn(r) => r.ref_inc(),
            _ => {}
        }
    }

    /// Decrement the refcount if this value holds a heap handle. Returns
    /// `true` when the underlying allocation reached zero references (the
    /// caller may choose to run `Heap::drop_without_free` or rely on the
    /// next collection pass, per `VmConfig::gc_enabled`).
    pub fn value_deref(&self) -> bool {
        match self {
            Value::Str(r) => r.ref_dec(),
            Value::Struct(r) => r.ref_dec(),
            Value::Fn(r) => r.ref_dec(),
            _ => false,
        }
    }

    /// Short type label used in error messages (`IncompatBinOp`,
    /// `IndexingNonCollection`, ...); also backs `Debug`.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Double(_) => "double",
            Value::Str(_) => "str",
            Value::Struct(r) => r.payload.borrow().type_name(),
            Value::Fn(_) => "fn",
            Value::Error => "error",
        }
    }

    pub fn display_string(&self) -> String {
        match self {
            Value::None => "none".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Double(d) => d.to_string(),
            Value::Str(s) => s.payload.borrow().clone(),
            Value::Struct(s) => s.payload.borrow().display_string(),
            Value::Fn(_) => "<fn>".to_string(),
            Value::Error => "<error>".to_string(),
        }
    }

    pub fn new_str(s: String) -> Value {
        Value::Str(ObjBox::new(s))
    }

    // -- Arithmetic -----------------------------------------------------

    pub fn add(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_add(*b)),
            (Value::Double(a), Value::Double(b)) => Value::Double(a + b),
            (Value::Int(a), Value::Double(b)) => Value::Double(*a as f64 + b),
            (Value::Double(a), Value::Int(b)) => Value::Double(a + *b as f64),
            (Value::Str(a), Value::Str(b)) => {
                let mut s = a.payload.borrow().clone();
                s.push_str(&b.payload.borrow());
                Value::new_str(s)
            }
            _ => Value::Error,
        }
    }

    pub fn sub(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_sub(*b)),
            (Value::Double(a), Value::Double(b)) => Value::Double(a - b),
            (Value::Int(a), Value::Double(b)) => Value::Double(*a as f64 - b),
            (Value::Double(a), Value::Int(b)) => Value::Double(a - *b as f64),
            _ => Value::Error,
        }
    }

    pub fn mul(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Int(a.wrapping_mul(*b)),
            (Value::Double(a), Value::Double(b)) => Value::Double(a * b),
            (Value::Int(a), Value::Double(b)) => Value::Double(*a as f64 * b),
            (Value::Double(a), Value::Int(b)) => Value::Double(a * *b as f64),
            _ => Value::Error,
        }
    }

    /// Division on integers always promotes to `Double`; on doubles
    /// stays `Double`.
    pub fn div(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Value::Error
                } else {
                    Value::Double(*a as f64 / *b as f64)
                }
            }
            (Value::Double(a), Value::Double(b)) => Value::Double(a / b),
            (Value::Int(a), Value::Double(b)) => Value::Double(*a as f64 / b),
            (Value::Double(a), Value::Int(b)) => Value::Double(a / *b as f64),
            _ => Value::Error,
        }
    }

    /// `MOD` only specializes on (and accepts) two `Int`s; any other
    /// combination, including `(Int, Double)`, is `Error`.
    pub fn rem(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => {
                if *b == 0 {
                    Value::Error
                } else {
                    Value::Int(a.wrapping_rem(*b))
                }
            }
            _ => Value::Error,
        }
    }

    pub fn eq_value(&self, other: &Value) -> Value {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Value::Bool(a == b),
            (Value::Double(a), Value::Double(b)) => Value::Bool(a == b),
            (Value::Int(a), Value::Double(b)) => Value::Bool(*a as f64 == *b),
            (Value::Double(a), Value::Int(b)) => Value::Bool(*a == *b as f64),
            (Value::Bool(a), Value::Bool(b)) => Value::Bool(a == b),
            (Value::None, Value::None) => Value::Bool(true),
            (Value::Str(a), Value::Str(b)) => {
                Value::Bool(*a.payload.borrow() == *b.payload.borrow())
            }
            _ => Value::Error,
        }
    }

    pub fn neq_value(&self, other: &Value) -> Value {
        match self.eq_value(other) {
            Value::Bool(b) => Value::Bool(!b),
            other => other,
        }
    }

    fn cmp_numeric(&self, other: &Value) -> Option<std::cmp::Ordering> {
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => a.partial_cmp(b),
            (Value::Double(a), Value::Double(b)) => a.partial_cmp(b),
            (Value::Int(a), Value::Double(b)) => (*a as f64).partial_cmp(b),
            (Value::Double(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            _ => None,
        }
    }

    pub fn lt_value(&self, other: &Value) -> Value {
        match self.cmp_numeric(other) {
            Some(o) => Value::Bool(o.is_lt()),
            None => Value::Error,
        }
    }

    pub fn gt_value(&self, other: &Value) -> Value {
        match self.cmp_numeric(other) {
            Some(o) => Value::Bool(o.is_gt()),
            None => Value::Error,
        }
    }

    pub fn leq_value(&self, other: &Value) -> Value {
        match self.cmp_numeric(other) {
            Some(o) => Value::Bool(o.is_le()),
            None => Value::Error,
        }
    }

    pub fn geq_value(&self, other: &Value) -> Value {
        match self.cmp_numeric(other) {
            Some(o) => Value::Bool(o.is_ge()),
            None => Value::Error,
        }
    }
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({})", self.type_name(), self.display_string())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_string())
    }
}

#[cfg(test)]
mod tests;
