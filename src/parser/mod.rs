//! # Recursive-descent parser and code generator
//!
//! `parse` drives a single module's source text through: tokenize (internal
//! lexer, see [`lexer`]), then a recursive-descent pass over
//! `Program := { Statement }` that both declares functions/classes/imports
//! as it meets them and emits bytecode for executable statements directly
//! into the implicit top-level function (`main`). There is no separate AST
//! stage — each grammar production emits its bytecode as it is recognized,
//! with register allocation interleaved into the recursive descent and
//! forward-reference placeholders resolved once the real declaration is
//! seen.

pub mod codegen;
pub mod dispatch;
pub mod expr;
pub mod lexer;
pub mod locals;
pub mod registers;
pub mod stmt;

use std::collections::HashMap;
use std::rc::Rc;

use crate::class::ClassInterface;
use crate::error::ParseError;
use crate::parser::codegen::FuncBuilder;
use crate::parser::dispatch::FunctionRegistry;
use crate::parser::lexer::{tokenize, Tok, Token};
use crate::program::{ConstEntry, ImportEntry, ImportedModule, Program, ProgramData, SourceMapEntry};

/// Index reserved for the implicit top-level function; never appears in
/// `ProgramData::fns` (the top-level body lives on `Program::main`
/// instead), but statements inside it still need *a* `func_idx` to stamp
/// onto their source-map entries.
pub const MAIN_FUNC_IDX: usize = usize::MAX;

pub(crate) struct Parser {
    toks: Vec<Token>,
    pos: usize,

    funcs: FunctionRegistry,

    classes: Vec<Option<Rc<ClassInterface>>>,
    class_map: HashMap<String, usize>,

    data_val: Vec<ConstEntry>,
    data_buf: Vec<u8>,
    const_map: HashMap<String, usize>,
    exported_consts: HashMap<String, usize>,

    imports: Vec<ImportEntry>,
    imported_modules: Vec<ImportedModule>,
    imported_module_map: HashMap<String, usize>,

    source_map: Vec<SourceMapEntry>,

    /// The class interface of the function currently being compiled, if
    /// it carries a `(self: Class)` receiver. Consulted by `@field`
    /// reads/writes; `None` outside a `HasClass` function body.
    cur_class: Option<Rc<ClassInterface>>,
}

impl Parser {
    fn new(src: &str) -> Self {
        Parser {
            toks: tokenize(src),
            pos: 0,
            funcs: FunctionRegistry::new(),
            classes: Vec::new(),
            class_map: HashMap::new(),
            data_val: Vec::new(),
            data_buf: Vec::new(),
            const_map: HashMap::new(),
            exported_consts: HashMap::new(),
            imports: Vec::new(),
            imported_modules: Vec::new(),
            imported_module_map: HashMap::new(),
            source_map: Vec::new(),
            cur_class: None,
        }
    }

    fn peek(&self) -> &Tok {
        &self.toks[self.pos].tok
    }

    fn peek_at(&self, offset: usize) -> &Tok {
        let idx = (self.pos + offset).min(self.toks.len() - 1);
        &self.toks[idx].tok
    }

    fn peek_pos(&self) -> usize {
        self.toks[self.pos].pos
    }

    fn peek_is(&self, tok: &Tok) -> bool {
        self.peek() == tok
    }

    fn advance(&mut self) -> Tok {
        let t = self.toks[self.pos].tok.clone();
        if self.pos + 1 < self.toks.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, tok: Tok, name: &str) -> Result<(), ParseError> {
        if self.peek() == &tok {
            self.advance();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken {
                got: format!("{:?}", self.peek()),
                expected: name.to_string(),
            })
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Tok::Ident(s) => Ok(s),
            other => Err(ParseError::UnexpectedToken {
                got: format!("{other:?}"),
                expected: "identifier".to_string(),
            }),
        }
    }

    fn expect_str(&mut self) -> Result<String, ParseError> {
        match self.advance() {
            Tok::Str(s) => Ok(s),
            other => Err(ParseError::UnexpectedToken {
                got: format!("{other:?}"),
                expected: "string literal".to_string(),
            }),
        }
    }

    fn is_assign_op(tok: &Tok) -> bool {
        matches!(
            tok,
            Tok::Assign
                | Tok::PlusAssign
                | Tok::MinusAssign
                | Tok::StarAssign
                | Tok::SlashAssign
                | Tok::PercentAssign
        )
    }

    /// Intern a non-string scalar constant, returning its pool index.
    fn intern_const(&mut self, v: crate::value::Value) -> u16 {
        let idx = self.data_val.len();
        self.data_val.push(ConstEntry::Scalar(v));
        idx as u16
    }

    /// Intern a string literal's bytes into the data buffer, returning the
    /// constant-pool index whose entry describes the `(buf_idx, buf_len)`
    /// view the VM materializes on first `LOAD_CONST`.
    fn intern_str(&mut self, s: &str) -> u16 {
        let buf_idx = self.data_buf.len() as u32;
        self.data_buf.extend_from_slice(s.as_bytes());
        let buf_len = s.len() as u32;
        let idx = self.data_val.len();
        self.data_val.push(ConstEntry::StrLiteral { buf_idx, buf_len });
        idx as u16
    }

    /// Resolve `module::member` as a call target, registering an
    /// `Imported` stub the first time this module/name pair is seen.
    fn resolve_imported_call(
        &mut self,
        module: &str,
        member: &str,
        argc: usize,
    ) -> Result<usize, ParseError> {
        let mod_idx = *self
            .imported_module_map
            .get(module)
            .ok_or_else(|| ParseError::UnknownModule(module.to_string()))?;
        if let Some(&idx) = self.imported_modules[mod_idx].fn_map.get(member) {
            return Ok(idx);
        }
        let idx = self.funcs.fns.len();
        self.funcs.fns.push(crate::function::Function::Imported {
            num_args: argc,
            module_idx: mod_idx,
            name: member.to_string(),
            fn_cached: None,
            program_data_cached: None,
        });
        self.funcs.fn_names.push(format!("{module}::{member}"));
        self.imported_modules[mod_idx]
            .fn_map
            .insert(member.to_string(), idx);
        Ok(idx)
    }

    /// Resolve `module::Class` as the class receiver of a dispatch
    /// instance, reserving an empty `classes[]` slot the first time this
    /// module/name pair is named so that forward references type-check
    /// before the import is ever linked; `vm::ops_import::link_module`
    /// fills the slot once the target module actually loads.
    fn resolve_imported_class(&mut self, module: &str, name: &str) -> Result<usize, ParseError> {
        let mod_idx = *self
            .imported_module_map
            .get(module)
            .ok_or_else(|| ParseError::UnknownModule(module.to_string()))?;
        if let Some(&idx) = self.imported_modules[mod_idx].class_map.get(name) {
            return Ok(idx);
        }
        let idx = self.classes.len();
        self.classes.push(None);
        self.imported_modules[mod_idx]
            .class_map
            .insert(name.to_string(), idx);
        Ok(idx)
    }

    fn into_program(self, file: String, cwd: String, main: FuncBuilder) -> Program {
        let mut data = ProgramData::new(file, cwd);
        data.fns = self.funcs.fns;
        data.fn_map = self.funcs.fn_map;
        data.fn_names = self.funcs.fn_names;
        data.classes = self.classes;
        data.class_map = self.class_map;
        data.data_val = self.data_val;
        data.data_buf = self.data_buf;
        data.imports = self.imports;
        data.imported_modules = self.imported_modules;
        data.imported_module_map = self.imported_module_map;
        data.exported_consts = self.exported_consts;
        data.source_map = self.source_map;
        Program {
            main: main.into_storage(),
            data,
        }
    }
}

/// Parse one module's source text into a linkable [`Program`]. `file`/`cwd`
/// are stamped onto the resulting `ProgramData` for module-resolution and
/// diagnostics purposes; they are not inspected during parsing itself.
pub fn parse(src: &str, file: String, cwd: String) -> Result<Program, ParseError> {
    let mut p = Parser::new(src);
    let mut main_fb = FuncBuilder::new(MAIN_FUNC_IDX);
    while !p.peek_is(&Tok::Eof) {
        p.parse_stmt(&mut main_fb, true)?;
    }
    main_fb.emit_ret_null();

    for name in p.funcs.fn_names.iter() {
        if let Some(idx) = p.funcs.fn_map.get(name) {
            if p.funcs.fns[*idx].is_placeholder() {
                return Err(ParseError::UnknownFunction(name.clone()));
            }
        }
    }

    let main_source_map = std::mem::take(&mut main_fb.source_map);
    p.source_map.extend(main_source_map);
    Ok(p.into_program(file, cwd, main_fb))
}

#[cfg(test)]
mod tests;
