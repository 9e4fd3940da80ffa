//! # Function table entries and first-class function values
//!
//! [`Function`] is the tagged union stored in `ProgramData::fns`; every
//! call site resolves to one of its variants by integer index, never by
//! pointer, so the table can keep growing while the parser is still
//! emitting code for functions defined later in the same module.
//!
//! [`FnValue`] is the *value* a `LOAD_FUNC`/`BIND_ARG_TO_FUNC` sequence
//! builds on the register stack: a function reference plus zero or more
//! bound arguments, a closure over bound arguments.

use std::cell::RefCell;
use std::rc::Rc;

use crate::native::NativeFn;
use crate::value::Value;

#[derive(Clone, Copy, Default)]
pub struct FunctionFlags {
    pub exported: bool,
    pub has_class: bool,
    pub may_fail: bool,
}

/// One instance in a multi-dispatch table: which function implements the
/// name for receivers of `class_idx`, plus a cache slot filled in lazily
/// the first time a call matches (see `vm::dispatch`).
pub struct DispatchInstance {
    pub function_idx: usize,
    pub class_idx: usize,
    pub class_interface_cache: Option<usize>,
}

/// A function-table entry. `Bytecode` carries its own mutable bytecode
/// buffer (see `program::BytecodeStorage`); `Imported` is a stub patched
/// in place once its owning module is loaded and linked; `Placeholder`
/// exists only mid-parse and is a `BytecodeGen`-class parse error if any
/// remain once parsing finishes.
pub enum Function {
    Bytecode {
        num_args: usize,
        flags: FunctionFlags,
        class_idx: Option<usize>,
        /// Shared so that opcode specialization (which rewrites `bc` in
        /// place) is visible to every future call of this function,
        /// mirroring how `Value::Str`/`Struct` share one heap allocation
        /// through `Rc<ObjBox<T>>` rather than copying on every read.
        storage: Rc<RefCell<crate::program::BytecodeStorage>>,
        source_map_start: usize,
        func_idx: usize,
    },
    Native {
        num_args: usize,
        name: String,
        func_ptr: NativeFn,
    },
    Imported {
        num_args: usize,
        module_idx: usize,
        name: String,
        /// Lazily filled once the referring `IMPORT` links; index of the
        /// real function inside the loaded module's `fns` table.
        fn_cached: Option<usize>,
        /// Index of the loaded `ProgramData` inside
        /// `ThreadLocal::loaded_modules`, filled alongside `fn_cached`.
        program_data_cached: Option<usize>,
    },
    Dispatch {
        num_args: usize,
        instances: Vec<DispatchInstance>,
        fallback_fn: Option<usize>,
    },
    Placeholder {
        num_args: usize,
        name_token: String,
    },
}

impl Function {
    pub fn num_args(&self) -> usize {
        match self {
            Function::Bytecode { num_args, .. } => *num_args,
            Function::Native { num_args, .. } => *num_args,
            Function::Imported { num_args, .. } => *num_args,
            Function::Dispatch { num_args, .. } => *num_args,
            Function::Placeholder { num_args, .. } => *num_args,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, Function::Placeholder { .. })
    }
}

/// A first-class function value: a reference to a function-table entry
/// plus any arguments already bound via `BIND_ARG_TO_FUNC`.
pub struct FnValue {
    pub fn_idx: usize,
    pub bound_args: Vec<Value>,
}

impl FnValue {
    pub fn from_bytecode(fn_idx: usize) -> Self {
        FnValue {
            fn_idx,
            bound_args: Vec::new(),
        }
    }

    pub fn from_native(fn_idx: usize) -> Self {
        FnValue {
            fn_idx,
            bound_args: Vec::new(),
        }
    }

    pub fn add_arg(&mut self, v: Value) {
        v.value_ref();
        self.bound_args.push(v);
    }

    /// Total arity once bound and unbound arguments are combined. Callers
    /// must check this against the target function's declared arity
    /// before invoking (`call_vm` in `vm::ops_control`).
    pub fn total_arity(&self, n_unbound: usize) -> usize {
        self.bound_args.len() + n_unbound
    }
}
