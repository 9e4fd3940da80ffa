//! # Compiled program containers
//!
//! Everything the parser produces and the VM consumes lives here: the
//! function/class/constant tables, the import table, and the source map.
//! Indexes into these tables are stable once assigned, so cross-references
//! between functions (a call site, a `Dispatch` instance, an `Imported`
//! stub) are plain integers rather than pointers — the function table can
//! keep growing while later functions in the same module are still being
//! parsed.

use std::collections::HashMap;
use std::rc::Rc;

use crate::class::ClassInterface;
use crate::function::Function;
use crate::value::Value;

/// A function's mutable bytecode buffer plus the register/local-frame
/// sizes the parser computed for it. Bytecode is mutated in place by the
/// VM for opcode specialization; see `vm::ops_arith`.
pub struct BytecodeStorage {
    pub bc: Vec<u8>,
    pub num_registers: usize,
    pub num_locals: usize,
}

impl BytecodeStorage {
    pub fn new() -> Self {
        BytecodeStorage {
            bc: Vec::new(),
            num_registers: 0,
            num_locals: 0,
        }
    }

    /// Frames whose combined register+local count stays under 256 use the
    /// VM's small-stack fast path; larger ones fall back to a heap
    /// allocation. See `vm::Frame::alloc`.
    pub fn num_values(&self) -> usize {
        self.num_registers + self.num_locals
    }
}

impl Default for BytecodeStorage {
    fn default() -> Self {
        Self::new()
    }
}

/// A constant-pool entry. String literals are stored as a `(buf_idx,
/// buf_len)` view into `ProgramData::data_buf` and materialized into a
/// heap string on first `LOAD_CONST`, then latched into the thread's
/// constant cache (`ThreadLocal::const_cache`). Every other literal is
/// already the real value.
pub enum ConstEntry {
    Scalar(Value),
    StrLiteral { buf_idx: u32, buf_len: u32 },
}

/// One entry in a module's import table: a relative path plus the local
/// module-table slot reserved for it, if the import carried an alias
/// (`import "..." as m`). Imports without an alias run the target's
/// `main` but do not reserve a module slot.
pub struct ImportEntry {
    pub path: String,
    pub module_idx: Option<usize>,
}

/// Bookkeeping attached to a successfully-linked `import ... as alias`:
/// which local function/class-table slots are `Imported`/reserved
/// placeholders waiting to be patched against the loaded module's
/// exports, keyed by the name used on the importer's side of `::`.
#[derive(Default)]
pub struct ImportedModule {
    pub fn_map: HashMap<String, usize>,
    pub class_map: HashMap<String, usize>,
    pub const_map: HashMap<String, usize>,
}

#[derive(Clone, Copy)]
pub struct SourceMapEntry {
    pub bc_from: usize,
    pub bc_to: usize,
    pub source_start: usize,
    pub func_idx: usize,
}

/// Everything about a parsed module except its `main` entry point, which
/// is kept separately on [`Program`] so the VM can start executing it
/// without indexing through `fns`.
pub struct ProgramData {
    pub fns: Vec<Function>,
    pub fn_map: HashMap<String, usize>,
    pub fn_names: Vec<String>,

    pub classes: Vec<Option<Rc<ClassInterface>>>,
    pub class_map: HashMap<String, usize>,

    pub data_val: Vec<ConstEntry>,
    pub data_buf: Vec<u8>,
    /// Offset of this program's constants within the thread-global
    /// constant cache; assigned when the module is loaded (see
    /// `vm::ops_import`).
    pub tl_constant_start: usize,

    pub imports: Vec<ImportEntry>,
    pub imported_modules: Vec<ImportedModule>,
    pub imported_module_map: HashMap<String, usize>,

    pub source_map: Vec<SourceMapEntry>,
    pub exported_consts: HashMap<String, usize>,

    pub file: String,
    pub cwd: String,
}

impl ProgramData {
    pub fn new(file: String, cwd: String) -> Self {
        ProgramData {
            fns: Vec::new(),
            fn_map: HashMap::new(),
            fn_names: Vec::new(),
            classes: Vec::new(),
            class_map: HashMap::new(),
            data_val: Vec::new(),
            data_buf: Vec::new(),
            tl_constant_start: 0,
            imports: Vec::new(),
            imported_modules: Vec::new(),
            imported_module_map: HashMap::new(),
            source_map: Vec::new(),
            exported_consts: HashMap::new(),
            file,
            cwd,
        }
    }

    /// Translate a bytecode offset within `func_idx`'s storage into the
    /// source byte offset recorded for diagnostics. Used only for error
    /// reporting, never for control flow.
    pub fn locate_pc(&self, func_idx: usize, bc_offset: usize) -> Option<usize> {
        self.source_map
            .iter()
            .find(|e| e.func_idx == func_idx && bc_offset >= e.bc_from && bc_offset < e.bc_to)
            .map(|e| e.source_start)
    }
}

pub struct Program {
    pub main: BytecodeStorage,
    pub data: ProgramData,
}
