//! # Statement parsing and code generation
//!
//! `Statement := FuncDecl | ClassDecl | Import | Export ... | LetDecl ';' |
//! ConstDecl ';' | If | While | Print ';' | Return ';' | Raise ';' | Block
//! | ExprStmt ';'`. Declarations (`func`, `struct`, `import`, `export`)
//! are only legal where `top_level` is `true`; everywhere else they are an
//! `ExpectGlobalScope` parse error, matching the historical implementation
//! restricting module-shape statements to the outermost scope.

use std::rc::Rc;

use crate::bytecode::Opcode;
use crate::class::ClassInterface;
use crate::error::ParseError;
use crate::function::FunctionFlags;
use crate::parser::codegen::FuncBuilder;
use crate::parser::lexer::Tok;
use crate::parser::Parser;
use crate::program::{ConstEntry, ImportEntry, ImportedModule};
use crate::value::Value;

impl Parser {
    pub(crate) fn parse_stmt(
        &mut self,
        fb: &mut FuncBuilder,
        top_level: bool,
    ) -> Result<(), ParseError> {
        let source_start = self.peek_pos();
        match self.peek().clone() {
            Tok::Func => {
                if !top_level {
                    return Err(ParseError::ExpectGlobalScope);
                }
                self.parse_func_decl(false)?;
            }
            Tok::Struct => {
                if !top_level {
                    return Err(ParseError::ExpectGlobalScope);
                }
                self.parse_class_decl(false)?;
            }
            Tok::Import => {
                if !top_level {
                    return Err(ParseError::ExpectGlobalScope);
                }
                self.parse_import(fb)?;
            }
            Tok::Export => {
                if !top_level {
                    return Err(ParseError::ExpectGlobalScope);
                }
                self.advance();
                match self.peek().clone() {
                    Tok::Func => self.parse_func_decl(true)?,
                    Tok::Struct => self.parse_class_decl(true)?,
                    Tok::Const => self.parse_const_decl(fb, true)?,
                    other => {
                        return Err(ParseError::UnexpectedToken {
                            got: format!("{other:?}"),
                            expected: "func, struct, or const".to_string(),
                        })
                    }
                }
            }
            Tok::Let => self.parse_let_decl(fb)?,
            Tok::Const => self.parse_const_decl(fb, false)?,
            Tok::If => self.parse_if(fb)?,
            Tok::While => self.parse_while(fb)?,
            Tok::Print => self.parse_print(fb)?,
            Tok::Return => self.parse_return(fb)?,
            Tok::Raise => self.parse_raise(fb)?,
            Tok::LBrace => self.parse_block(fb)?,
            _ => self.parse_expr_stmt(fb)?,
        }
        fb.close_statement(source_start);
        Ok(())
    }

    fn parse_block(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        self.expect(Tok::LBrace, "{")?;
        fb.locals.push_scope();
        while !self.peek_is(&Tok::RBrace) {
            self.parse_stmt(fb, false)?;
        }
        self.expect(Tok::RBrace, "}")?;
        fb.locals.pop_scope();
        Ok(())
    }

    /// Like [`Self::parse_block`] but reuses the function's root local
    /// scope instead of pushing a fresh one, since parameters (and `self`)
    /// already live in it and the function ends when the body does.
    fn parse_func_body(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        self.expect(Tok::LBrace, "{")?;
        while !self.peek_is(&Tok::RBrace) {
            self.parse_stmt(fb, false)?;
        }
        self.expect(Tok::RBrace, "}")?;
        Ok(())
    }

    fn parse_if(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        self.expect(Tok::If, "if")?;
        self.expect(Tok::LParen, "(")?;
        let cond = self.parse_logical(fb)?;
        self.expect(Tok::RParen, ")")?;
        let jskip = fb.emit_jump_placeholder(Opcode::Jnif, cond);
        fb.regs.release(cond);
        self.parse_block(fb)?;
        if self.peek_is(&Tok::Else) {
            self.advance();
            let jend = fb.emit_imm16(Opcode::Jrel, 0);
            let else_start = fb.pc();
            fb.patch_jump(jskip, else_start)?;
            if self.peek_is(&Tok::If) {
                self.parse_if(fb)?;
            } else {
                self.parse_block(fb)?;
            }
            let end = fb.pc();
            fb.patch_jump(jend, end)?;
        } else {
            let end = fb.pc();
            fb.patch_jump(jskip, end)?;
        }
        Ok(())
    }

    fn parse_while(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        self.expect(Tok::While, "while")?;
        let c_label = fb.pc();
        self.expect(Tok::LParen, "(")?;
        let cond = self.parse_logical(fb)?;
        self.expect(Tok::RParen, ")")?;
        let jend = fb.emit_jump_placeholder(Opcode::Jnif, cond);
        fb.regs.release(cond);
        self.parse_block(fb)?;
        fb.emit_jump_back(c_label)?;
        let end = fb.pc();
        fb.patch_jump(jend, end)?;
        Ok(())
    }

    fn parse_print(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        self.expect(Tok::Print, "print")?;
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.parse_logical(fb)?);
            if self.peek_is(&Tok::Comma) {
                self.advance();
                continue;
            }
            break;
        }
        self.expect(Tok::Semi, ";")?;
        let n = exprs.len();
        for (i, r) in exprs.into_iter().enumerate() {
            if i > 0 {
                fb.emit_abc(Opcode::PrintSep, 0, 0, 0);
            }
            let is_last = if i + 1 == n { 1 } else { 0 };
            fb.emit_abc(Opcode::Print, r, 0, is_last);
            fb.regs.release(r);
        }
        Ok(())
    }

    fn parse_return(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        self.expect(Tok::Return, "return")?;
        if self.peek_is(&Tok::Semi) {
            self.advance();
            fb.emit_ret_null();
        } else {
            let r = self.parse_logical(fb)?;
            self.expect(Tok::Semi, ";")?;
            fb.emit_ret(r);
            fb.regs.release(r);
        }
        Ok(())
    }

    fn parse_raise(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        self.expect(Tok::Raise, "raise")?;
        let r = self.parse_logical(fb)?;
        self.expect(Tok::Semi, ";")?;
        fb.emit_abc(Opcode::Raise, r, 0, 0);
        fb.regs.release(r);
        Ok(())
    }

    fn parse_let_decl(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        self.expect(Tok::Let, "let")?;
        let name = self.expect_ident()?;
        let val = if self.peek_is(&Tok::Assign) {
            self.advance();
            Some(self.parse_logical(fb)?)
        } else {
            None
        };
        self.expect(Tok::Semi, ";")?;
        let slot = fb.locals.declare(&name)?;
        match val {
            Some(r) => {
                fb.emit_a_imm16(Opcode::MovRegLocal, r, slot);
                fb.regs.release(r);
            }
            None => {
                let r = fb.regs.new_reg()?;
                fb.emit_abc(Opcode::LoadNil, r, 0, 0);
                fb.emit_a_imm16(Opcode::MovRegLocal, r, slot);
                fb.regs.release(r);
            }
        }
        Ok(())
    }

    /// `const IDENT = Expr ';'`, legal at global scope only. The value is
    /// computed once into a register and latched via `SET_CONST` into a
    /// freshly reserved constant-pool slot (see §4.4's "first-use latch").
    fn parse_const_decl(&mut self, fb: &mut FuncBuilder, exported: bool) -> Result<(), ParseError> {
        self.expect(Tok::Const, "const")?;
        let name = self.expect_ident()?;
        self.expect(Tok::Assign, "=")?;
        let val = self.parse_logical(fb)?;
        self.expect(Tok::Semi, ";")?;

        let const_idx = self.data_val.len();
        self.data_val.push(ConstEntry::Scalar(Value::None));
        fb.emit_a_imm16(Opcode::SetConst, val, const_idx as u16);
        fb.regs.release(val);

        if self.const_map.insert(name.clone(), const_idx).is_some() {
            return Err(ParseError::DuplicateConst(name));
        }
        if exported {
            self.exported_consts.insert(name, const_idx);
        }
        Ok(())
    }

    fn parse_import(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        self.expect(Tok::Import, "import")?;
        let path = self.expect_str()?;
        let module_idx = if self.peek_is(&Tok::As) {
            self.advance();
            let alias = self.expect_ident()?;
            if self.imported_module_map.contains_key(&alias) {
                return Err(ParseError::DuplicateModule(alias));
            }
            let idx = self.imported_modules.len();
            self.imported_modules.push(ImportedModule::default());
            self.imported_module_map.insert(alias, idx);
            Some(idx)
        } else {
            None
        };
        self.imports.push(ImportEntry { path, module_idx });
        // The VM resolves/loads/links the module lazily, the first time
        // this instruction is actually reached, rather than eagerly at
        // parse time.
        let import_idx = (self.imports.len() - 1) as u16;
        fb.emit_a_imm16(Opcode::Import, 0, import_idx);
        Ok(())
    }

    fn parse_class_decl(&mut self, exported: bool) -> Result<(), ParseError> {
        self.expect(Tok::Struct, "struct")?;
        let name = self.expect_ident()?;
        if self.class_map.contains_key(&name) {
            return Err(ParseError::DuplicateClass(name));
        }
        let mut fields = Vec::new();
        if self.peek_is(&Tok::LBrace) {
            self.advance();
            if !self.peek_is(&Tok::RBrace) {
                loop {
                    let f = self.expect_ident()?;
                    if fields.contains(&f) {
                        return Err(ParseError::DuplicateProp(f));
                    }
                    fields.push(f);
                    if self.peek_is(&Tok::Comma) {
                        self.advance();
                        continue;
                    }
                    break;
                }
            }
            self.expect(Tok::RBrace, "}")?;
        } else {
            self.expect(Tok::Semi, ";")?;
        }
        let idx = self.classes.len();
        let iface = Rc::new(ClassInterface::new(name.clone(), &fields, exported, idx));
        self.classes.push(Some(iface));
        self.class_map.insert(name, idx);
        Ok(())
    }

    fn parse_func_decl(&mut self, exported: bool) -> Result<(), ParseError> {
        self.expect(Tok::Func, "func")?;

        let mut class_idx: Option<usize> = None;
        let mut class_iface: Option<Rc<ClassInterface>> = None;
        let mut receiver_name: Option<String> = None;
        if self.peek_is(&Tok::LParen) {
            self.advance();
            let self_name = self.expect_ident()?;
            self.expect(Tok::Colon, ":")?;
            let first = self.expect_ident()?;
            let (module, cls_name) = if self.peek_is(&Tok::ColonColon) {
                self.advance();
                let second = self.expect_ident()?;
                (Some(first), second)
            } else {
                (None, first)
            };
            self.expect(Tok::RParen, ")")?;
            let idx = match module {
                Some(m) => self.resolve_imported_class(&m, &cls_name)?,
                None => *self
                    .class_map
                    .get(&cls_name)
                    .ok_or_else(|| ParseError::UnknownClass(cls_name.clone()))?,
            };
            class_idx = Some(idx);
            class_iface = self.classes[idx].clone();
            receiver_name = Some(self_name);
        }

        let name = self.expect_ident()?;
        self.expect(Tok::LParen, "(")?;
        let mut param_names = Vec::new();
        if !self.peek_is(&Tok::RParen) {
            loop {
                let p = self.expect_ident()?;
                if param_names.contains(&p) {
                    return Err(ParseError::DuplicateArg(p));
                }
                param_names.push(p);
                if self.peek_is(&Tok::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(Tok::RParen, ")")?;

        let num_args = param_names.len() + if class_idx.is_some() { 1 } else { 0 };
        let fn_idx = self.funcs.reserve_for_decl(&name, num_args);

        let mut fb = FuncBuilder::new(fn_idx);
        let saved_class = self.cur_class.take();
        self.cur_class = class_iface;

        if class_idx.is_some() {
            let bind_name = receiver_name.as_deref().unwrap_or("self");
            fb.locals.declare(bind_name)?;
            fb.emit_abc(Opcode::LoadSelf, 0, 0, 0);
        }
        for p in &param_names {
            fb.locals.declare(p)?;
        }

        self.parse_func_body(&mut fb)?;
        fb.emit_ret_null();

        self.cur_class = saved_class;

        let flags = FunctionFlags {
            exported,
            has_class: class_idx.is_some(),
            may_fail: false,
        };
        let source_map_start = self.source_map.len();
        let source_map_entries = std::mem::take(&mut fb.source_map);
        let storage = fb.into_storage();
        self.funcs
            .finish_decl(fn_idx, &name, num_args, flags, class_idx, storage, source_map_start)?;
        self.source_map.extend(source_map_entries);
        Ok(())
    }

    /// `(IDENT | '@'IDENT) ('=' | '*=' | '/=' | '+=' | '-=' | '%=') Expr`,
    /// or, failing that lookahead, a bare expression statement (a call
    /// made for its side effects, most commonly).
    fn parse_expr_stmt(&mut self, fb: &mut FuncBuilder) -> Result<(), ParseError> {
        if let Tok::Ident(name) = self.peek().clone() {
            if Self::is_assign_op(self.peek_at(1)) {
                self.advance();
                let op = self.advance();
                let slot = fb
                    .locals
                    .lookup(&name)
                    .ok_or_else(|| ParseError::UnknownVar(name.clone()))?;
                let val = self.parse_logical(fb)?;
                self.expect(Tok::Semi, ";")?;
                let opcode = match op {
                    Tok::Assign => Opcode::MovRegLocal,
                    Tok::PlusAssign => Opcode::AddAsg,
                    Tok::MinusAssign => Opcode::SubAsg,
                    Tok::StarAssign => Opcode::MulAsg,
                    Tok::SlashAssign => Opcode::DivAsg,
                    Tok::PercentAssign => Opcode::ModAsg,
                    _ => unreachable!("checked by is_assign_op"),
                };
                fb.emit_a_imm16(opcode, val, slot);
                fb.regs.release(val);
                return Ok(());
            }
        } else if self.peek_is(&Tok::At) && Self::is_assign_op(self.peek_at(2)) {
            self.advance();
            let fname = self.expect_ident()?;
            let class = self.cur_class.clone().ok_or(ParseError::ClassScopeOnly)?;
            let fidx = class
                .field_index(&fname)
                .ok_or_else(|| ParseError::UnknownVar(format!("@{fname}")))?;
            let op = self.advance();
            if op != Tok::Assign {
                return Err(ParseError::UnexpectedToken {
                    got: format!("{op:?}"),
                    expected: "= (compound assignment on fields is not supported)".to_string(),
                });
            }
            let val = self.parse_logical(fb)?;
            self.expect(Tok::Semi, ";")?;
            fb.emit_a_imm16(Opcode::ClassSetInner, val, fidx as u16);
            fb.regs.release(val);
            return Ok(());
        }

        let r = self.parse_logical(fb)?;
        fb.regs.release(r);
        self.expect(Tok::Semi, ";")?;
        Ok(())
    }
}
