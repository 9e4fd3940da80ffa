//! # Class interfaces
//!
//! A `ClassInterface` is the immutable description of a `struct` declaration:
//! its name, its field-name-to-index map, and whether it was declared
//! `export`ed. It is shared by reference (`Rc`) so that a class defined in
//! one module and imported into several others is the same instance
//! everywhere — there is no per-module copy to keep in sync.

use std::collections::HashMap;

pub struct ClassInterface {
    pub name: String,
    pub exported: bool,
    pub field_map: HashMap<String, usize>,
    /// Index of this interface within `ProgramData::classes`, stable for
    /// the lifetime of the program. Used by multi-dispatch to key
    /// `Dispatch::instances`.
    pub class_idx: usize,
}

impl ClassInterface {
    pub fn new(name: String, fields: &[String], exported: bool, class_idx: usize) -> Self {
        let field_map = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.clone(), i))
            .collect();
        ClassInterface {
            name,
            exported,
            field_map,
            class_idx,
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.field_map.get(name).copied()
    }
}
