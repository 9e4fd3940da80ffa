//! # Struct-kind heap objects: array, tuple, class instance
//!
//! The small `del`/`idx_get`/`idx_set`/`len` operation set each kind
//! supports is modeled here as a plain enum with a `match`-dispatched
//! method set rather than a `dyn Trait`, since the variant set is closed
//! and small and a plain `match` on `Value` already dispatches the same
//! way elsewhere in this crate.

use std::rc::Rc;

use crate::class::ClassInterface;
use crate::value::Value;

/// Array: growable, indexable.
pub struct Array {
    pub items: Vec<Value>,
}

/// Tuple: fixed-length, indexable, built once at `TUPLE_NEW` and never
/// resized.
pub struct Tuple {
    pub items: Vec<Value>,
}

/// Class instance: an inline array of field values plus a shared handle
/// to the class's field-name/index map. Per the historical implementation,
/// class instances are **not** indexable with `[]`; field access goes
/// through `CLASS_GET_INNER`/`CLASS_SET_INNER` by field index instead.
pub struct ClassInstance {
    pub interface: Rc<ClassInterface>,
    pub fields: Vec<Value>,
}

impl ClassInstance {
    pub fn new(interface: Rc<ClassInterface>) -> Self {
        let n = interface.field_map.len();
        ClassInstance {
            interface,
            fields: vec![Value::None; n],
        }
    }

    pub fn class_idx(&self) -> usize {
        self.interface.class_idx
    }
}

/// The concrete struct kinds a `Value::Struct` handle can hold.
pub enum StructObj {
    Array(Array),
    Tuple(Tuple),
    Class(ClassInstance),
}

impl StructObj {
    pub fn type_name(&self) -> &'static str {
        match self {
            StructObj::Array(_) => "array",
            StructObj::Tuple(_) => "tuple",
            StructObj::Class(_) => "struct",
        }
    }

    pub fn len(&self) -> i32 {
        match self {
            StructObj::Array(a) => a.items.len() as i32,
            StructObj::Tuple(t) => t.items.len() as i32,
            StructObj::Class(c) => c.fields.len() as i32,
        }
    }

    /// Returns `None` both for an out-of-range index and for class
    /// instances, which do not support `[]` indexing at all.
    pub fn idx_get(&self, idx: i32) -> Option<Value> {
        match self {
            StructObj::Array(a) => idx_get_vec(&a.items, idx),
            StructObj::Tuple(t) => idx_get_vec(&t.items, idx),
            StructObj::Class(_) => None,
        }
    }

    /// Returns `false` to signal an invalid index (or, for class
    /// instances, that indexed assignment is simply unsupported); the VM
    /// turns that into a runtime error.
    pub fn idx_set(&mut self, idx: i32, value: Value) -> bool {
        match self {
            StructObj::Array(a) => idx_set_vec(&mut a.items, idx, value),
            StructObj::Tuple(t) => idx_set_vec(&mut t.items, idx, value),
            StructObj::Class(_) => false,
        }
    }

    pub fn push(&mut self, value: Value) -> bool {
        match self {
            StructObj::Array(a) => {
                a.items.push(value);
                true
            }
            _ => false,
        }
    }

    pub fn display_string(&self) -> String {
        match self {
            StructObj::Array(a) => format_items('[', ']', &a.items),
            StructObj::Tuple(t) => format_items('(', ')', &t.items),
            StructObj::Class(c) => format!("<{} instance>", c.interface.name),
        }
    }
}

fn idx_get_vec(items: &[Value], idx: i32) -> Option<Value> {
    if idx < 0 {
        return None;
    }
    items.get(idx as usize).cloned()
}

fn idx_set_vec(items: &mut [Value], idx: i32, value: Value) -> bool {
    if idx < 0 {
        return false;
    }
    match items.get_mut(idx as usize) {
        Some(slot) => {
            *slot = value;
            true
        }
        None => false,
    }
}

fn format_items(open: char, close: char, items: &[Value]) -> String {
    let inner: Vec<String> = items.iter().map(|v| v.display_string()).collect();
    format!("{open}{}{close}", inner.join(", "))
}
