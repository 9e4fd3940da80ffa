//! # Module resolution
//!
//! `import "path"` / `import "path" as alias` names a module by a path
//! relative to the importing module's directory. [`ModuleResolver`] is the
//! seam between that path and actual source bytes, so an embedder can swap
//! in an in-memory resolver (tests, a bundled script pack) without
//! reimplementing `vm::ops_import`'s load/link algorithm. [`FsResolver`] is
//! the default, filesystem-backed implementation.

use crate::error::RuntimeError;

/// The result of resolving one `import` path: enough to parse and execute
/// the target module and to resolve any imports *it* makes in turn.
pub struct ResolvedModule {
    /// Canonical path, used as the dedup key in `ThreadLocal::loaded_modules`
    /// so the same file reached via two different relative paths loads once.
    pub abspath: String,
    pub source: String,
    /// Directory the resolved module's own imports are relative to.
    pub cwd: String,
}

pub trait ModuleResolver {
    fn resolve(&self, relpath: &str, cwd: &str) -> Result<ResolvedModule, RuntimeError>;
}

/// Resolves `relpath` against `cwd` on the local filesystem.
pub struct FsResolver;

impl ModuleResolver for FsResolver {
    fn resolve(&self, relpath: &str, cwd: &str) -> Result<ResolvedModule, RuntimeError> {
        let joined = std::path::Path::new(cwd).join(relpath);
        let abspath = joined
            .canonicalize()
            .map_err(|_| RuntimeError::UnknownImportTarget(relpath.to_string()))?;
        let source = std::fs::read_to_string(&abspath)
            .map_err(|_| RuntimeError::UnknownImportTarget(relpath.to_string()))?;
        let cwd = abspath
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_else(|| ".".to_string());
        Ok(ResolvedModule {
            abspath: abspath.to_string_lossy().into_owned(),
            source,
            cwd,
        })
    }
}
