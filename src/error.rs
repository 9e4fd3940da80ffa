//! # Error taxonomy for the bytecode engine
//!
//! Three tiers, matching how failure is handled at each layer:
//!
//! - [`ParseError`] — returned by the parser/codegen; stops parsing at the
//!   first offense and carries the offending token for highlighting.
//! - [`RuntimeError`] — produced while executing bytecode; unwinds the
//!   current VM invocation at a single well-defined point.
//! - [`FatalError`] — a condition the engine cannot recover from at all
//!   (unknown opcode, allocator failure, broken invariant); propagation
//!   policy is to abort the process after logging the cause.
//!
//! [`ErrorKind`] is the compact, `repr(u8)` category carried by the
//! source-level `raise` construct; it is encoded directly into bytecode
//! operand bytes, so its discriminants must stay stable.

use crate::value::Value;

/// Compact category used by the `RAISE reg` opcode and the source `raise`
/// statement. Kept small and `repr(u8)` because it is stored as an operand
/// byte in the 4-byte instruction encoding.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Generic = 0,
    Type = 1,
    Index = 2,
    Import = 3,
    Arity = 4,
}

impl TryFrom<u8> for ErrorKind {
    type Error = ();
    fn try_from(v: u8) -> Result<Self, ()> {
        use ErrorKind::*;
        Ok(match v {
            0 => Generic,
            1 => Type,
            2 => Index,
            3 => Import,
            4 => Arity,
            _ => return Err(()),
        })
    }
}

/// Errors surfaced while parsing and generating bytecode. Parsing stops at
/// the first one encountered.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("unexpected token: got {got}, expected {expected}")]
    UnexpectedToken { got: String, expected: String },
    #[error("statement only allowed at global scope")]
    ExpectGlobalScope,
    #[error("duplicate class: {0}")]
    DuplicateClass(String),
    #[error("duplicate property: {0}")]
    DuplicateProp(String),
    #[error("duplicate argument: {0}")]
    DuplicateArg(String),
    #[error("duplicate module alias: {0}")]
    DuplicateModule(String),
    #[error("duplicate constant: {0}")]
    DuplicateConst(String),
    #[error("unknown module: {0}")]
    UnknownModule(String),
    #[error("unknown class: {0}")]
    UnknownClass(String),
    #[error("unknown variable: {0}")]
    UnknownVar(String),
    #[error("unknown function: {0}")]
    UnknownFunction(String),
    #[error("wrong number of arguments: got {got}, expected {expected}")]
    WrongArgs {
        got: usize,
        expected: usize,
        at: String,
    },
    #[error("construct only allowed inside a class-receiver function")]
    ClassScopeOnly,
    #[error("bytecode generation failed: {0}")]
    BytecodeGen(String),
    #[error(transparent)]
    Runtime(#[from] RuntimeError),
}

/// Errors produced while executing bytecode. Propagation unwinds the
/// currently-running frame chain, releasing every live register, local,
/// and argument-stack slot, then returns to the caller of `exec`/`exec_main`.
#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error("incompatible operand types for binary operation: {left} and {right}")]
    IncompatBinOp { left: String, right: String },
    #[error("value is not callable")]
    IncompatCall,
    #[error("cannot index a value of type {0}")]
    IndexingNonCollection(String),
    #[error("invalid index into {collection}: {idx}")]
    InvalidIndex { collection: String, idx: String },
    #[error("stack overflow")]
    StackOverflow,
    #[error("unknown import target: {0}")]
    UnknownImportTarget(String),
    #[error("circular import detected: {0}")]
    CircularImport(String),
    #[error("arity mismatch linking import {name}: expected {expected}, found {found}")]
    ArityMismatchOnImport {
        name: String,
        expected: usize,
        found: usize,
    },
    #[error("raised: {0}")]
    Raised(Value),
}

impl ErrorKind {
    /// Promote a bare category (as carried by `RAISE`) into a full
    /// [`RuntimeError`], pairing it with the value the source program
    /// raised. The category itself only matters for the `raise` variant
    /// selection the parser performed; at runtime every `raise` collapses
    /// to the same carrier so the unwinder has one shape to handle.
    pub fn into_runtime(self, payload: Value) -> RuntimeError {
        RuntimeError::Raised(payload)
    }
}

/// Conditions the engine cannot recover from: a violated internal
/// invariant, an allocator failure, or bytecode referencing an opcode the
/// running build does not know. Propagation policy aborts the process
/// after a `log::error!` of the cause.
#[derive(Debug, thiserror::Error)]
pub enum FatalError {
    #[error("unknown opcode byte: {0}")]
    UnknownOpcode(u8),
    #[error("out of memory")]
    OutOfMemory,
    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

impl FatalError {
    /// Log the cause and terminate the process. Called from the few sites
    /// that observe a condition this engine treats as unrecoverable.
    pub fn abort(self) -> ! {
        log::error!("fatal engine error: {}", self);
        std::process::abort();
    }
}
