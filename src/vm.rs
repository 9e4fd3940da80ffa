//! # The register-machine virtual machine
//!
//! `exec` interprets one function's bytecode to completion (a return, an
//! unhandled `raise`, or a fatal error) and returns the resulting `Value`.
//! `exec_main` is the entry point an embedder calls once per top-level
//! program; everything else (function calls, imports) re-enters `exec`
//! recursively rather than maintaining its own call-stack data structure —
//! the native Rust call stack *is* the interpreter's call stack, with
//! `ThreadLocal::frame_depth` standing in for the historical
//! pointer-delta stack-overflow check (Rust gives no portable way to
//! compare raw stack addresses safely).
//!
//! Two dispatch strategies share one set of per-opcode handler bodies
//! (`dispatch_one`, below): a plain `match` by default, or a
//! function-pointer jump table behind the `dispatch_table` feature. Both
//! read `VmConfig::dispatch` only for logging/diagnostics; the `match`
//! form already compiles to a jump table on any half-decent codegen
//! backend, so the feature exists to offer both strategies explicitly
//! rather than to win a benchmark.

mod dispatch;
mod ops_arith;
mod ops_control;
mod ops_import;
mod ops_struct;

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::bytecode::Instr;
use crate::error::RuntimeError;
use crate::function::Function;
use crate::heap::{Heap, ObjBox, VmConfig};
use crate::program::{BytecodeStorage, Program, ProgramData};
use crate::resolver::ModuleResolver;
use crate::structs::StructObj;
use crate::value::Value;

pub(crate) type SharedProgramData = Rc<RefCell<ProgramData>>;
pub(crate) type SharedStorage = Rc<RefCell<BytecodeStorage>>;

/// Rough per-frame stack cost used to turn `VmConfig::stack_max_bytes`
/// into a frame-count budget. Rust's own stack frames for `exec`'s
/// recursion are the thing actually being bounded; this is a
/// deliberately coarse stand-in for the historical pointer-delta check.
const APPROX_FRAME_BYTES: usize = 512;

/// Two-phase marker used to detect an import cycle: a module is
/// `InProgress` from the moment its `IMPORT` starts resolving until its
/// `main` finishes running, at which point it becomes `Complete`.
enum ImportReservation {
    InProgress,
    Complete,
}

/// Everything shared across every frame of one program's execution:
/// heap/GC state, the constant cache, the module table, and the pluggable
/// I/O/resolver seams.
pub struct ThreadLocal {
    pub config: VmConfig,
    pub heap: Heap,

    /// Flattened across every loaded module: `ProgramData::tl_constant_start`
    /// is the offset a module's own const-pool indices are added to here.
    const_cache: Vec<Value>,
    const_len: usize,

    /// `abspath -> module_table index`, so `Function::Imported::program_data_cached`
    /// (typed as a plain index) has a stable table to point into.
    loaded_modules: HashMap<String, usize>,
    module_table: Vec<SharedProgramData>,
    reservation_table: HashMap<String, ImportReservation>,

    /// Rendering sink for `PRINT`; takes the value itself rather than a
    /// pre-formatted string so an embedder can special-case rendering
    /// (e.g. a REPL echoing with quotes around strings) without this
    /// crate committing to one text format.
    pub print_fn: Box<dyn FnMut(&Value)>,
    /// Sink for the punctuation a `print` statement emits around its
    /// values: the space between comma-separated expressions and the
    /// trailing newline. Kept separate from `print_fn` so an embedder
    /// collecting output through one sink (a string buffer, a test
    /// harness) sees the exact bytes a real terminal would, rather than
    /// missing the separator/newline that used to go straight to stdout.
    pub print_raw_fn: Box<dyn FnMut(&str)>,
    pub resolver: Box<dyn ModuleResolver>,

    frame_depth: usize,
    max_frame_depth: usize,
}

impl ThreadLocal {
    pub fn new(
        config: VmConfig,
        resolver: Box<dyn ModuleResolver>,
        print_fn: Box<dyn FnMut(&Value)>,
    ) -> Self {
        Self::with_raw_sink(config, resolver, print_fn, Box::new(|s: &str| print!("{s}")))
    }

    /// Like [`Self::new`], but lets the caller also control where
    /// `print`'s separator/newline punctuation goes instead of defaulting
    /// to stdout.
    pub fn with_raw_sink(
        config: VmConfig,
        resolver: Box<dyn ModuleResolver>,
        print_fn: Box<dyn FnMut(&Value)>,
        print_raw_fn: Box<dyn FnMut(&str)>,
    ) -> Self {
        let max_frame_depth = (config.stack_max_bytes / APPROX_FRAME_BYTES).max(1);
        ThreadLocal {
            heap: Heap::new(config.clone()),
            config,
            const_cache: Vec::new(),
            const_len: 0,
            loaded_modules: HashMap::new(),
            module_table: Vec::new(),
            reservation_table: HashMap::new(),
            print_fn,
            print_raw_fn,
            resolver,
            frame_depth: 0,
            max_frame_depth,
        }
    }

    fn enter_frame(&mut self) -> Result<(), RuntimeError> {
        if self.frame_depth >= self.max_frame_depth {
            return Err(RuntimeError::StackOverflow);
        }
        self.frame_depth += 1;
        log::trace!("enter frame depth={}", self.frame_depth);
        Ok(())
    }

    fn exit_frame(&mut self) {
        self.frame_depth -= 1;
        log::trace!("exit frame depth={}", self.frame_depth);
    }
}

/// Per-call mutable state: registers, locals, the pending-argument stack
/// built up by `PUSH_ARG`, and (for a `HasClass` function) the receiver
/// bound by `LOAD_SELF`.
pub struct Frame {
    pub regs: Vec<Value>,
    pub locals: Vec<Value>,
    pub arg_stack: Vec<Value>,
    pub self_instance: Option<Rc<ObjBox<StructObj>>>,
}

impl Frame {
    /// Overwrite register `idx`, releasing whatever it held first so a
    /// reused register never leaks the reference its previous occupant
    /// was holding.
    fn set_reg(&mut self, idx: u8, v: Value) {
        self.regs[idx as usize].value_deref();
        self.regs[idx as usize] = v;
    }

    fn set_local(&mut self, idx: u16, v: Value) {
        self.locals[idx as usize].value_deref();
        self.locals[idx as usize] = v;
    }

    /// Mark every value this frame can currently reach: registers, locals,
    /// the pending-argument stack, and a bound `self` receiver if any.
    pub(crate) fn mark_roots(&self) {
        for v in self
            .regs
            .iter()
            .chain(self.locals.iter())
            .chain(self.arg_stack.iter())
        {
            crate::heap::mark_value(v);
        }
        if let Some(obj) = &self.self_instance {
            crate::heap::mark_struct_obj(obj);
        }
    }
}

/// A borrowed cons-list of every live frame in the current call chain,
/// from the innermost frame out to the top level. Marking walks the whole
/// chain rather than just the current frame, since a genuine reference
/// cycle never reaches a zero refcount on its own and can only be
/// collected by a sweep that first marks every object still reachable
/// from *any* frame still on the call stack — not just the one a given
/// opcode handler happens to be running in.
pub(crate) struct RootChain<'a> {
    frame: &'a Frame,
    parent: Option<&'a RootChain<'a>>,
}

impl<'a> RootChain<'a> {
    pub(crate) fn new(frame: &'a Frame, parent: Option<&'a RootChain<'a>>) -> Self {
        RootChain { frame, parent }
    }

    pub(crate) fn mark(&self) {
        self.frame.mark_roots();
        if let Some(p) = self.parent {
            p.mark();
        }
    }
}

/// What a single opcode handler did to control flow; `exec`'s loop turns
/// this into the next `pc`.
pub(crate) enum StepResult {
    Continue,
    Jump(usize),
    Return(Value),
}

/// Run `storage` to completion with `args` bound to its leading locals,
/// returning the function's result. `pdata` is the owning module's table
/// set — needed for constants, the function table (calls), and classes.
/// `roots` is the chain of frames already on the call stack above this
/// one (`None` at the top level); this call's own frame is threaded onto
/// that chain before any opcode runs, so a collection triggered anywhere
/// inside it marks the whole live call stack, not just this frame.
pub fn exec(
    tl: &mut ThreadLocal,
    storage: &SharedStorage,
    pdata: &SharedProgramData,
    args: &[Value],
    roots: Option<&RootChain>,
) -> Result<Value, RuntimeError> {
    let (num_registers, num_locals) = {
        let s = storage.borrow();
        (s.num_registers, s.num_locals)
    };
    log::trace!(
        "exec: nargs={} nregs={} nlocals={}",
        args.len(),
        num_registers,
        num_locals
    );

    let mut frame = Frame {
        regs: vec![Value::None; num_registers],
        locals: vec![Value::None; num_locals.max(args.len())],
        arg_stack: Vec::new(),
        self_instance: None,
    };
    for (i, a) in args.iter().enumerate() {
        a.value_ref();
        frame.locals[i] = a.clone();
    }

    let mut pc = 0usize;
    let outcome: Result<Value, RuntimeError> = loop {
        let instr = {
            let s = storage.borrow();
            if pc >= s.bc.len() {
                crate::error::FatalError::InvariantViolation(
                    "program counter ran past the end of a function's bytecode".to_string(),
                )
                .abort();
            }
            crate::bytecode::decode(&s.bc, pc)
        };

        match dispatch_one(tl, pdata, storage, &mut frame, pc, instr, roots) {
            Ok(StepResult::Continue) => pc += 4,
            Ok(StepResult::Jump(target)) => pc = target,
            Ok(StepResult::Return(v)) => break Ok(v),
            Err(e) => break Err(e),
        }
    };

    for v in frame
        .regs
        .iter()
        .chain(frame.locals.iter())
        .chain(frame.arg_stack.iter())
    {
        v.value_deref();
    }

    outcome
}

/// Entry point for a freshly-parsed top-level program: registers its
/// module data (so its own `import`s have a module-table slot to link
/// against, and so it participates in the shared constant cache) then
/// runs `main`.
pub fn exec_main(tl: &mut ThreadLocal, program: Program) -> Result<Value, RuntimeError> {
    let mut data = program.data;
    data.tl_constant_start = tl.const_len;
    tl.const_len += data.data_val.len();
    tl.const_cache.resize(tl.const_len, Value::None);

    let module_idx = tl.module_table.len();
    let pdata: SharedProgramData = Rc::new(RefCell::new(data));
    tl.module_table.push(pdata.clone());
    let abspath = pdata.borrow().file.clone();
    tl.loaded_modules.insert(abspath, module_idx);

    let storage: SharedStorage = Rc::new(RefCell::new(program.main));
    exec(tl, &storage, &pdata, &[], None)
}

fn dispatch_one(
    tl: &mut ThreadLocal,
    pdata: &SharedProgramData,
    storage: &SharedStorage,
    frame: &mut Frame,
    pc: usize,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    use crate::bytecode::Opcode::*;
    match instr.op {
        LoadSelf => ops_control::op_load_self(frame),
        MovU16 => ops_control::op_mov_u16(frame, instr),
        MovBool => ops_control::op_mov_bool(frame, instr),
        LoadConst => ops_control::op_load_const(tl, pdata, frame, instr, roots),
        MovRegLocal => ops_control::op_mov_reg_local(frame, instr),
        MovLocalReg => ops_control::op_mov_local_reg(frame, instr),
        LoadNil => ops_control::op_load_nil(frame, instr),
        SetConst => ops_control::op_set_const(tl, pdata, frame, instr),

        Mul | Div | Add | Sub | Mod | Eq | Neq | Lt | Gt | Leq | Geq => {
            ops_arith::op_generic_binop(storage, frame, pc, instr)
        }
        MulInt | DivInt | AddInt | SubInt | ModInt | EqInt | NeqInt | LtInt | GtInt | LeqInt
        | GeqInt => ops_arith::op_int_binop(storage, frame, pc, instr),
        MulDouble | DivDouble | AddDouble | SubDouble | EqDouble | NeqDouble | LtDouble
        | GtDouble | LeqDouble | GeqDouble => ops_arith::op_double_binop(storage, frame, pc, instr),
        MulAsg | DivAsg | AddAsg | SubAsg | ModAsg => ops_arith::op_compound_asg(frame, instr),
        Not => ops_arith::op_not(frame, instr),

        Jif => ops_control::op_jif(frame, pc, instr),
        Jnif => ops_control::op_jnif(frame, pc, instr),
        Jrel => Ok(StepResult::Jump(pc + 4 + instr.rel16() as usize * 4)),
        Jrelb => Ok(StepResult::Jump(pc + 4 - instr.rel16() as usize * 4)),
        // Not emitted by the current grammar (no surface syntax needs an
        // unconditional-truthiness-test jump distinct from `Jif`/`Jnif`),
        // but part of the canonical opcode set and identical in semantics.
        JifBool => ops_control::op_jif(frame, pc, instr),
        JnifBool => ops_control::op_jnif(frame, pc, instr),

        PushArg => ops_control::op_push_arg(frame, instr),
        Call => ops_control::op_call(tl, pdata, frame, instr, roots),
        Call1 => ops_control::op_call1(tl, pdata, frame, instr, roots),
        LoadFunc => ops_control::op_load_func(tl, frame, instr, roots),
        // Reachable only via a hypothetical future closure-literal surface
        // syntax; the current grammar never emits these two, but the
        // runtime behavior is implemented per the canonical operation list.
        BindArgToFunc => ops_control::op_bind_arg_to_func(frame, instr),
        CallFuncValue => ops_control::op_call_func_value(tl, pdata, frame, instr, roots),
        Ret => ops_control::op_ret(frame, instr),
        RetLocal => ops_control::op_ret_local(frame, instr),
        RetNull => Ok(StepResult::Return(Value::None)),
        Raise => ops_control::op_raise(frame, instr),

        ArrayNew => ops_struct::op_array_new(tl, frame, instr, roots),
        ArrayPush => ops_struct::op_array_push(tl, frame, instr, roots),
        IdxGet => ops_struct::op_idx_get(frame, instr),
        IdxSet => ops_struct::op_idx_set(frame, instr),
        TupleNew => ops_struct::op_tuple_new(tl, frame, instr, roots),
        IdxSetStatic => ops_struct::op_idx_set_static(frame, instr),

        ClassNew => ops_struct::op_class_new(tl, pdata, frame, instr, roots),
        ClassGetInner => ops_struct::op_class_get_inner(frame, instr),
        ClassSetInner => ops_struct::op_class_set_inner(frame, instr),

        Print => ops_struct::op_print(tl, frame, instr),
        PrintSep => ops_struct::op_print_sep(tl),

        Import => ops_import::op_import(tl, pdata, frame, instr, roots),

        Nop => Ok(StepResult::Continue),
        Halt => Ok(StepResult::Return(Value::None)),
    }
}

/// Resolve and invoke function-table entry `fn_idx`, taking ownership of
/// `args`. Branches on the callee's kind for the native/bytecode deref
/// asymmetry documented on [`crate::native::NativeFn`]: a native callee
/// derefs its own arguments before returning, while a bytecode callee's
/// frame teardown only derefs the copies *it* made (via `value_ref` in
/// `exec`'s prologue) — so this function must still release the copies
/// *it* made when it called in.
pub(crate) fn call_function(
    tl: &mut ThreadLocal,
    pdata: &SharedProgramData,
    fn_idx: usize,
    args: Vec<Value>,
    roots: Option<&RootChain>,
) -> Result<Value, RuntimeError> {
    tl.enter_frame()?;
    let result = call_function_inner(tl, pdata, fn_idx, &args, roots);
    tl.exit_frame();
    result
}

enum CallTarget {
    Bytecode(SharedStorage),
    Native(crate::native::NativeFn),
    Imported {
        target_pdata: SharedProgramData,
        target_fn_idx: usize,
    },
    Dispatch {
        instances: Vec<(usize, usize)>,
        fallback_fn: Option<usize>,
    },
}

fn call_function_inner(
    tl: &mut ThreadLocal,
    pdata: &SharedProgramData,
    fn_idx: usize,
    args: &[Value],
    roots: Option<&RootChain>,
) -> Result<Value, RuntimeError> {
    // Snapshot the dispatch decision under a short-lived borrow: calling
    // back into `exec`/`call_function_inner` below may need to borrow
    // `pdata` (or some other module's `ProgramData`) again, and a borrow
    // held across that recursive call would panic on any self- or
    // mutually-recursive program.
    let target = {
        let data = pdata.borrow();
        match &data.fns[fn_idx] {
            Function::Bytecode { storage, .. } => CallTarget::Bytecode(storage.clone()),
            Function::Native { func_ptr, .. } => CallTarget::Native(*func_ptr),
            Function::Imported {
                fn_cached: Some(f),
                program_data_cached: Some(p),
                ..
            } => CallTarget::Imported {
                target_pdata: tl.module_table[*p].clone(),
                target_fn_idx: *f,
            },
            Function::Imported { name, .. } => {
                return Err(RuntimeError::UnknownImportTarget(name.clone()));
            }
            Function::Dispatch {
                instances,
                fallback_fn,
                ..
            } => CallTarget::Dispatch {
                instances: instances.iter().map(|d| (d.class_idx, d.function_idx)).collect(),
                fallback_fn: *fallback_fn,
            },
            Function::Placeholder { name_token, .. } => {
                crate::error::FatalError::InvariantViolation(format!(
                    "called unresolved placeholder function '{name_token}'"
                ))
                .abort();
            }
        }
    };

    match target {
        CallTarget::Native(func_ptr) => Ok(func_ptr(tl, args)),
        CallTarget::Bytecode(storage) => {
            let result = exec(tl, &storage, pdata, args, roots)?;
            for a in args {
                a.value_deref();
            }
            Ok(result)
        }
        CallTarget::Imported {
            target_pdata,
            target_fn_idx,
        } => call_function_inner(tl, &target_pdata, target_fn_idx, args, roots),
        CallTarget::Dispatch {
            instances,
            fallback_fn,
        } => {
            let class_idx = dispatch::resolve_class_idx(args)?;
            let target_idx = instances
                .iter()
                .find(|(ci, _)| *ci == class_idx)
                .map(|(_, f)| *f)
                .or(fallback_fn)
                .ok_or(RuntimeError::IncompatCall)?;
            call_function_inner(tl, pdata, target_idx, args, roots)
        }
    }
}

#[cfg(test)]
mod tests;
