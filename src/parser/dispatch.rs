//! # Multi-dispatch merge at parse time
//!
//! A `func` whose head carries a class receiver `(self: Class)` has flag
//! `HasClass`; within one scope, a name may be declared more than once
//! only if the declarations merge into a dispatch table: at most one
//! non-class "fallback" plus any number of distinct-class instances.
//! This module is where that merge decision happens, each time a
//! function declaration finishes parsing its body.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::error::ParseError;
use crate::function::{DispatchInstance, Function, FunctionFlags};
use crate::program::BytecodeStorage;

/// Tracks function-table slots during one module's parse: supports
/// forward references (a call site records a `Placeholder` before the
/// real definition is seen) and the dispatch-merge rule above.
pub struct FunctionRegistry {
    pub fns: Vec<Function>,
    pub fn_map: HashMap<String, usize>,
    pub fn_names: Vec<String>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        FunctionRegistry {
            fns: Vec::new(),
            fn_map: HashMap::new(),
            fn_names: Vec::new(),
        }
    }

    /// Resolve `name` to a function-table index for a call site, creating
    /// a `Placeholder` if this is the first reference (forward call). If
    /// `name` already names a concrete (non-placeholder) function, the
    /// call site's argument count is checked against its declared arity
    /// right away instead of waiting for a runtime arity mismatch.
    pub fn reference(&mut self, name: &str, num_args: usize) -> Result<usize, ParseError> {
        if let Some(&idx) = self.fn_map.get(name) {
            if !self.fns[idx].is_placeholder() {
                let expected = self.fns[idx].num_args();
                if expected != num_args {
                    return Err(ParseError::WrongArgs {
                        got: num_args,
                        expected,
                        at: name.to_string(),
                    });
                }
            }
            return Ok(idx);
        }
        let idx = self.fns.len();
        self.fns.push(Function::Placeholder {
            num_args,
            name_token: name.to_string(),
        });
        self.fn_names.push(name.to_string());
        self.fn_map.insert(name.to_string(), idx);
        Ok(idx)
    }

    /// Reserve the function-table index a declaration's body should be
    /// compiled into, so recursive calls inside the body resolve to the
    /// right index before the body finishes parsing. Reuses an existing
    /// `Placeholder` slot for `name` (the forward-reference case), but a
    /// second declaration under an already-concrete name always gets a
    /// fresh slot — `finish_decl` needs that name's previous mapping
    /// intact to build a `Dispatch` merging the two instead of clobbering
    /// the first declaration in place.
    pub fn reserve_for_decl(&mut self, name: &str, num_args: usize) -> usize {
        if let Some(&idx) = self.fn_map.get(name) {
            if self.fns[idx].is_placeholder() {
                return idx;
            }
        }
        let idx = self.fns.len();
        self.fns.push(Function::Placeholder {
            num_args,
            name_token: name.to_string(),
        });
        self.fn_names.push(name.to_string());
        idx
    }

    /// Install a fully-compiled function body at `idx` (previously
    /// returned by [`Self::reserve_for_decl`]), then apply the
    /// dispatch-merge rule against any prior declaration sharing `name`.
    #[allow(clippy::too_many_arguments)]
    pub fn finish_decl(
        &mut self,
        idx: usize,
        name: &str,
        num_args: usize,
        flags: FunctionFlags,
        class_idx: Option<usize>,
        storage: BytecodeStorage,
        source_map_start: usize,
    ) -> Result<(), ParseError> {
        if let Function::Placeholder {
            num_args: expected, ..
        } = &self.fns[idx]
        {
            if *expected != num_args {
                return Err(ParseError::WrongArgs {
                    got: num_args,
                    expected: *expected,
                    at: name.to_string(),
                });
            }
        }
        self.fns[idx] = Function::Bytecode {
            num_args,
            flags,
            class_idx,
            storage: Rc::new(RefCell::new(storage)),
            source_map_start,
            func_idx: idx,
        };

        // `fn_map[name]` not yet pointing at `idx` means either this is
        // the name's first declaration (no mapping yet) or a second
        // concrete declaration collided with an existing mapping, which
        // `reserve_for_decl` always routes to a fresh slot so the earlier
        // declaration is still there to merge against.
        match self.fn_map.get(name).copied() {
            None => {
                self.fn_map.insert(name.to_string(), idx);
                Ok(())
            }
            Some(mapped_idx) if mapped_idx == idx => Ok(()),
            Some(mapped_idx) => match &mut self.fns[mapped_idx] {
                Function::Dispatch {
                    instances,
                    fallback_fn,
                    ..
                } => add_to_dispatch(instances, fallback_fn, idx, class_idx, name),
                Function::Bytecode {
                    class_idx: existing_class,
                    num_args: existing_args,
                    ..
                } => {
                    if *existing_args != num_args {
                        return Err(ParseError::BytecodeGen(format!(
                            "redefinition of '{name}' with different arity"
                        )));
                    }
                    let existing_idx = mapped_idx;
                    let existing_class_idx = *existing_class;
                    let mut instances = Vec::new();
                    let mut fallback_fn = None;
                    add_to_dispatch(&mut instances, &mut fallback_fn, existing_idx, existing_class_idx, name)?;
                    add_to_dispatch(&mut instances, &mut fallback_fn, idx, class_idx, name)?;
                    let disp_idx = self.fns.len();
                    self.fns.push(Function::Dispatch {
                        num_args,
                        instances,
                        fallback_fn,
                    });
                    self.fn_names.push(name.to_string());
                    self.fn_map.insert(name.to_string(), disp_idx);
                    Ok(())
                }
                _ => Err(ParseError::BytecodeGen(format!(
                    "redefinition of '{name}' is not dispatch-compatible"
                ))),
            },
        }
    }
}

fn add_to_dispatch(
    instances: &mut Vec<DispatchInstance>,
    fallback_fn: &mut Option<usize>,
    function_idx: usize,
    class_idx: Option<usize>,
    name: &str,
) -> Result<(), ParseError> {
    match class_idx {
        Some(ci) => {
            if instances.iter().any(|d| d.class_idx == ci) {
                return Err(ParseError::BytecodeGen(format!(
                    "duplicate dispatch instance of '{name}' for the same class"
                )));
            }
            instances.push(DispatchInstance {
                function_idx,
                class_idx: ci,
                class_interface_cache: None,
            });
            Ok(())
        }
        None => {
            if fallback_fn.is_some() {
                return Err(ParseError::BytecodeGen(format!(
                    "duplicate non-class fallback for '{name}'"
                )));
            }
            *fallback_fn = Some(function_idx);
            Ok(())
        }
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::new()
    }
}
