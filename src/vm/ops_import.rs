//! # Lazy module loading and linking
//!
//! `import "path" [as alias]` only records an entry in the importing
//! module's import table at parse time; the actual resolve/parse/execute/
//! link sequence happens here, the first time the `IMPORT` instruction
//! that statement compiled to is actually reached. Running a module's
//! top level exactly once, no matter how many places import it, is
//! enforced by [`ThreadLocal::loaded_modules`] (dedup by canonical path)
//! plus the reservation table (cycle detection).

use std::cell::RefCell;
use std::rc::Rc;

use crate::bytecode::Instr;
use crate::error::RuntimeError;
use crate::function::Function;
use crate::program::ProgramData;

use super::{
    exec, Frame, ImportReservation, RootChain, SharedProgramData, SharedStorage, StepResult,
    ThreadLocal,
};

pub(super) fn op_import(
    tl: &mut ThreadLocal,
    importer_pdata: &SharedProgramData,
    frame: &Frame,
    instr: Instr,
    roots: Option<&RootChain>,
) -> Result<StepResult, RuntimeError> {
    let import_idx = instr.imm16() as usize;
    let (path, cwd, module_idx) = {
        let data = importer_pdata.borrow();
        let entry = &data.imports[import_idx];
        (entry.path.clone(), data.cwd.clone(), entry.module_idx)
    };

    let resolved = tl.resolver.resolve(&path, &cwd)?;
    log::debug!("import: resolved '{path}' -> {}", resolved.abspath);

    if let Some(&loaded_idx) = tl.loaded_modules.get(&resolved.abspath) {
        if let Some(local_slot) = module_idx {
            let loaded_pdata = tl.module_table[loaded_idx].clone();
            link_module(importer_pdata, local_slot, &loaded_pdata, loaded_idx)?;
        }
        return Ok(StepResult::Continue);
    }

    if let Some(ImportReservation::InProgress) = tl.reservation_table.get(&resolved.abspath) {
        return Err(RuntimeError::CircularImport(resolved.abspath));
    }
    tl.reservation_table
        .insert(resolved.abspath.clone(), ImportReservation::InProgress);

    let program = crate::parser::parse(&resolved.source, resolved.abspath.clone(), resolved.cwd)
        .map_err(|e| RuntimeError::UnknownImportTarget(format!("{path}: {e}")))?;

    let mut data: ProgramData = program.data;
    data.tl_constant_start = tl.const_len;
    tl.const_len += data.data_val.len();
    tl.const_cache.resize(tl.const_len, crate::value::Value::None);

    let loaded_idx = tl.module_table.len();
    let loaded_pdata: SharedProgramData = Rc::new(RefCell::new(data));
    tl.module_table.push(loaded_pdata.clone());
    tl.loaded_modules.insert(resolved.abspath.clone(), loaded_idx);

    let main_storage: SharedStorage = Rc::new(RefCell::new(program.main));
    log::debug!("import: executing top level of {}", resolved.abspath);
    let chain = RootChain::new(frame, roots);
    exec(tl, &main_storage, &loaded_pdata, &[], Some(&chain))?;

    tl.reservation_table
        .insert(resolved.abspath, ImportReservation::Complete);

    if let Some(local_slot) = module_idx {
        link_module(importer_pdata, local_slot, &loaded_pdata, loaded_idx)?;
    }

    Ok(StepResult::Continue)
}

/// Patch the `Imported`/reserved-class stubs an `import ... as alias`
/// registered at parse time against the now-loaded module's real
/// function/class tables, checking exported-ness and arity.
fn link_module(
    importer_pdata: &SharedProgramData,
    local_slot: usize,
    loaded_pdata: &SharedProgramData,
    loaded_idx: usize,
) -> Result<(), RuntimeError> {
    let loaded = loaded_pdata.borrow();
    let mut importer = importer_pdata.borrow_mut();

    let fn_names: Vec<(String, usize)> = importer.imported_modules[local_slot]
        .fn_map
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();

    for (name, stub_idx) in fn_names {
        let target_idx = *loaded
            .fn_map
            .get(&name)
            .ok_or_else(|| RuntimeError::UnknownImportTarget(name.clone()))?;

        let (expected, exported) = match &loaded.fns[target_idx] {
            Function::Bytecode { num_args, flags, .. } => (*num_args, flags.exported),
            // Multi-dispatch functions are linkable without an exported-ness
            // check: each individual instance's own `export` carried the
            // declaration, and a dispatch stub only exists because at least
            // one concrete instance was declared `export`.
            Function::Dispatch { num_args, .. } => (*num_args, true),
            Function::Native { num_args, .. } => (*num_args, true),
            _ => (0, false),
        };
        if !exported {
            return Err(RuntimeError::UnknownImportTarget(name));
        }

        if let Function::Imported {
            num_args,
            fn_cached,
            program_data_cached,
            ..
        } = &mut importer.fns[stub_idx]
        {
            if *num_args != expected {
                return Err(RuntimeError::ArityMismatchOnImport {
                    name,
                    expected,
                    found: *num_args,
                });
            }
            *fn_cached = Some(target_idx);
            *program_data_cached = Some(loaded_idx);
        }
    }

    let class_names: Vec<(String, usize)> = importer.imported_modules[local_slot]
        .class_map
        .iter()
        .map(|(k, v)| (k.clone(), *v))
        .collect();

    for (name, local_class_idx) in class_names {
        let target_idx = *loaded
            .class_map
            .get(&name)
            .ok_or_else(|| RuntimeError::UnknownImportTarget(name.clone()))?;
        let iface = loaded.classes[target_idx].clone().ok_or_else(|| {
            RuntimeError::UnknownImportTarget(name.clone())
        })?;
        if !iface.exported {
            return Err(RuntimeError::UnknownImportTarget(name));
        }
        importer.classes[local_class_idx] = Some(iface);
    }

    log::debug!(
        "import: linked module slot {local_slot} against loaded module index {loaded_idx}"
    );
    Ok(())
}
