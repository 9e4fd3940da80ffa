//! # Native-call ABI
//!
//! The uniform calling convention the core exposes for standard-library
//! primitives (arrays, strings, I/O) without needing to know anything
//! about how they are implemented: a native callee receives ownership of
//! its arguments (it must `value_deref` each one before returning, the
//! same discipline a bytecode callee's frame teardown would apply) and
//! returns a single `Value`, or `Value::Error` to signal failure.

use crate::value::Value;
use crate::vm::ThreadLocal;

pub type NativeFn = fn(&mut ThreadLocal, &[Value]) -> Value;
