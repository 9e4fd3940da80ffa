//! # Expression parsing and code generation
//!
//! One method per precedence level of the expression grammar:
//! `Logical → Eq → Cmp → AddSub → MulDiv → Unary → Index → Val`. Every
//! method follows the same discipline: on return, exactly one register —
//! the expression's result — is left allocated on `fb.regs`; any
//! temporaries used along the way are released before returning.

use crate::bytecode::Opcode;
use crate::error::ParseError;
use crate::parser::codegen::FuncBuilder;
use crate::parser::lexer::Tok;
use crate::parser::Parser;
use crate::value::Value;

/// Literal ints in `[-32767, 32768]` fit `MOV_U16`'s 16-bit immediate
/// (reinterpreted as a signed value by the VM); anything wider goes
/// through the constant pool.
fn small_int(n: i64) -> Option<u16> {
    if (-32767..=32768).contains(&n) {
        Some(n as i16 as u16)
    } else {
        None
    }
}

impl Parser {
    pub(crate) fn parse_logical(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        let mut left = self.parse_eq(fb)?;
        loop {
            let is_and = match self.peek() {
                Tok::AndAnd => true,
                Tok::OrOr => false,
                _ => break,
            };
            self.advance();
            left = self.emit_short_circuit(fb, left, is_and)?;
        }
        Ok(left)
    }

    /// `&&`/`||` short-circuit: materializes a `0`/`1` bool in a result
    /// register via `MOV_BOOL` plus `JIF`/`JNIF`, per §4.3's codegen note.
    fn emit_short_circuit(
        &mut self,
        fb: &mut FuncBuilder,
        left: u8,
        is_and: bool,
    ) -> Result<u8, ParseError> {
        let short_jump = if is_and {
            fb.emit_jump_placeholder(Opcode::Jnif, left)
        } else {
            fb.emit_jump_placeholder(Opcode::Jif, left)
        };
        fb.regs.release(left);
        let right = self.parse_eq(fb)?;
        let dst = right;

        let jfalse = fb.emit_jump_placeholder(Opcode::Jnif, right);
        let true_block = fb.pc();
        fb.emit_abc(Opcode::MovBool, dst, 1, 0);
        let jend = fb.emit_imm16(Opcode::Jrel, 0);
        let false_block = fb.pc();
        fb.emit_abc(Opcode::MovBool, dst, 0, 0);
        let end = fb.pc();

        fb.patch_jump(jend, end)?;
        fb.patch_jump(jfalse, false_block)?;
        if is_and {
            fb.patch_jump(short_jump, false_block)?;
        } else {
            fb.patch_jump(short_jump, true_block)?;
        }
        Ok(dst)
    }

    fn parse_eq(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        let mut left = self.parse_cmp(fb)?;
        loop {
            let op = match self.peek() {
                Tok::Eq => Opcode::Eq,
                Tok::Neq => Opcode::Neq,
                _ => break,
            };
            self.advance();
            let right = self.parse_cmp(fb)?;
            left = self.emit_binop(fb, op, left, right);
        }
        Ok(left)
    }

    fn parse_cmp(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        let mut left = self.parse_addsub(fb)?;
        loop {
            let op = match self.peek() {
                Tok::Lt => Opcode::Lt,
                Tok::Gt => Opcode::Gt,
                Tok::Leq => Opcode::Leq,
                Tok::Geq => Opcode::Geq,
                _ => break,
            };
            self.advance();
            let right = self.parse_addsub(fb)?;
            left = self.emit_binop(fb, op, left, right);
        }
        Ok(left)
    }

    fn parse_addsub(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        let mut left = self.parse_muldiv(fb)?;
        loop {
            let op = match self.peek() {
                Tok::Plus => Opcode::Add,
                Tok::Minus => Opcode::Sub,
                _ => break,
            };
            self.advance();
            let right = self.parse_muldiv(fb)?;
            left = self.emit_binop(fb, op, left, right);
        }
        Ok(left)
    }

    fn parse_muldiv(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        let mut left = self.parse_unary(fb)?;
        loop {
            let op = match self.peek() {
                Tok::Star => Opcode::Mul,
                Tok::Slash => Opcode::Div,
                Tok::Percent => Opcode::Mod,
                _ => break,
            };
            self.advance();
            let right = self.parse_unary(fb)?;
            left = self.emit_binop(fb, op, left, right);
        }
        Ok(left)
    }

    /// Combine `left`/`right` with a generic arithmetic/compare opcode,
    /// reusing `left`'s register as the destination and releasing `right`.
    /// Specialization into the `_INT`/`_DOUBLE` variants happens at run
    /// time (`vm::ops_arith`), never here.
    fn emit_binop(&mut self, fb: &mut FuncBuilder, op: Opcode, left: u8, right: u8) -> u8 {
        fb.regs.release(right);
        fb.emit_abc(op, left, right, left);
        left
    }

    fn parse_unary(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        if self.peek_is(&Tok::Bang) {
            self.advance();
            let r = self.parse_unary(fb)?;
            fb.emit_abc(Opcode::Not, r, 0, r);
            Ok(r)
        } else {
            self.parse_index(fb)
        }
    }

    fn parse_index(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        let mut col = self.parse_val(fb)?;
        while self.peek_is(&Tok::LBracket) {
            self.advance();
            let idx = self.parse_logical(fb)?;
            self.expect(Tok::RBracket, "]")?;
            if self.peek_is(&Tok::Assign) {
                self.advance();
                let val = self.parse_logical(fb)?;
                fb.emit_abc(Opcode::IdxSet, col, idx, val);
                fb.regs.release(idx);
                fb.regs.release(col);
                col = val;
                break;
            } else {
                let dst = fb.regs.new_reg()?;
                fb.emit_abc(Opcode::IdxGet, col, idx, dst);
                fb.regs.release(idx);
                fb.regs.release(col);
                col = dst;
            }
        }
        Ok(col)
    }

    fn parse_val(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        match self.peek().clone() {
            Tok::Int(n) => {
                self.advance();
                let dst = fb.regs.new_reg()?;
                if let Some(u) = small_int(n) {
                    fb.emit_a_imm16(Opcode::MovU16, dst, u);
                } else {
                    let c = self.intern_const(Value::Int(n as i32));
                    fb.emit_a_imm16(Opcode::LoadConst, dst, c);
                }
                Ok(dst)
            }
            Tok::Double(d) => {
                self.advance();
                let dst = fb.regs.new_reg()?;
                let c = self.intern_const(Value::Double(d));
                fb.emit_a_imm16(Opcode::LoadConst, dst, c);
                Ok(dst)
            }
            Tok::Str(s) => {
                self.advance();
                let dst = fb.regs.new_reg()?;
                let c = self.intern_str(&s);
                fb.emit_a_imm16(Opcode::LoadConst, dst, c);
                Ok(dst)
            }
            Tok::True => {
                self.advance();
                let dst = fb.regs.new_reg()?;
                fb.emit_abc(Opcode::MovBool, dst, 1, 0);
                Ok(dst)
            }
            Tok::False => {
                self.advance();
                let dst = fb.regs.new_reg()?;
                fb.emit_abc(Opcode::MovBool, dst, 0, 0);
                Ok(dst)
            }
            Tok::LParen => {
                self.advance();
                let r = self.parse_logical(fb)?;
                self.expect(Tok::RParen, ")")?;
                Ok(r)
            }
            Tok::LBracket => self.parse_array_literal(fb),
            Tok::HashLBracket => self.parse_tuple_literal(fb),
            Tok::New => {
                self.advance();
                let cname = self.expect_ident()?;
                let idx = *self
                    .class_map
                    .get(&cname)
                    .ok_or_else(|| ParseError::UnknownClass(cname.clone()))?;
                let dst = fb.regs.new_reg()?;
                fb.emit_a_imm16(Opcode::ClassNew, dst, idx as u16);
                Ok(dst)
            }
            Tok::At => {
                self.advance();
                let fname = self.expect_ident()?;
                let class = self
                    .cur_class
                    .clone()
                    .ok_or(ParseError::ClassScopeOnly)?;
                let fidx = class
                    .field_index(&fname)
                    .ok_or_else(|| ParseError::UnknownVar(format!("@{fname}")))?;
                let dst = fb.regs.new_reg()?;
                fb.emit_a_imm16(Opcode::ClassGetInner, dst, fidx as u16);
                Ok(dst)
            }
            Tok::Ident(name) => self.parse_ident_val(fb, name),
            other => Err(ParseError::UnexpectedToken {
                got: format!("{other:?}"),
                expected: "expression".to_string(),
            }),
        }
    }

    fn parse_array_literal(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        self.expect(Tok::LBracket, "[")?;
        let mut items = Vec::new();
        if !self.peek_is(&Tok::RBracket) {
            loop {
                items.push(self.parse_logical(fb)?);
                if self.peek_is(&Tok::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(Tok::RBracket, "]")?;
        let dst = fb.regs.new_reg()?;
        fb.emit_a_imm16(Opcode::ArrayNew, dst, items.len() as u16);
        for it in items {
            fb.emit_abc(Opcode::ArrayPush, dst, it, 0);
            fb.regs.release(it);
        }
        Ok(dst)
    }

    fn parse_tuple_literal(&mut self, fb: &mut FuncBuilder) -> Result<u8, ParseError> {
        self.expect(Tok::HashLBracket, "#[")?;
        let mut items = Vec::new();
        if !self.peek_is(&Tok::RBracket) {
            loop {
                items.push(self.parse_logical(fb)?);
                if self.peek_is(&Tok::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        self.expect(Tok::RBracket, "]")?;
        let dst = fb.regs.new_reg()?;
        fb.emit_a_imm16(Opcode::TupleNew, dst, items.len() as u16);
        for (i, it) in items.into_iter().enumerate() {
            fb.emit_abc(Opcode::IdxSetStatic, dst, i as u8, it);
            fb.regs.release(it);
        }
        Ok(dst)
    }

    /// `IDENT ['::' IDENT] ['(' ArgList ')']`: a qualified or unqualified
    /// function call, a bare local-variable read, or a bare function name
    /// used as a first-class value (`LOAD_FUNC`).
    fn parse_ident_val(&mut self, fb: &mut FuncBuilder, name: String) -> Result<u8, ParseError> {
        self.advance();
        let mut module = None;
        let mut member = name.clone();
        if self.peek_is(&Tok::ColonColon) {
            self.advance();
            module = Some(name.clone());
            member = self.expect_ident()?;
        }

        if self.peek_is(&Tok::LParen) {
            self.advance();
            let argc = self.parse_arg_list(fb)?;
            self.expect(Tok::RParen, ")")?;
            let fn_idx = match &module {
                Some(m) => self.resolve_imported_call(m, &member, argc)?,
                None => self.funcs.reference(&member, argc)?,
            };
            let dst = fb.regs.new_reg()?;
            let result = fb.emit_call(argc, fn_idx as u16, dst);
            if result != dst {
                fb.regs.release(dst);
                fb.regs.claim(result);
            }
            Ok(result)
        } else if let Some(m) = module {
            Err(ParseError::UnknownVar(format!("{m}::{member}")))
        } else if let Some(slot) = fb.locals.lookup(&name) {
            let dst = fb.regs.new_reg()?;
            fb.emit_a_imm16(Opcode::MovLocalReg, dst, slot);
            Ok(dst)
        } else if let Some(&fidx) = self.funcs.fn_map.get(&name) {
            let dst = fb.regs.new_reg()?;
            fb.emit_a_imm16(Opcode::LoadFunc, dst, fidx as u16);
            Ok(dst)
        } else {
            Err(ParseError::UnknownVar(name))
        }
    }

    /// Parses a comma-separated argument list, emitting `PUSH_ARG` for
    /// each as it is evaluated (the args live on the VM's argument stack,
    /// not in registers, by the time the call opcode runs).
    fn parse_arg_list(&mut self, fb: &mut FuncBuilder) -> Result<usize, ParseError> {
        let mut argc = 0usize;
        if !self.peek_is(&Tok::RParen) {
            loop {
                let r = self.parse_logical(fb)?;
                fb.emit_abc(Opcode::PushArg, r, 0, 0);
                fb.regs.release(r);
                argc += 1;
                if self.peek_is(&Tok::Comma) {
                    self.advance();
                    continue;
                }
                break;
            }
        }
        Ok(argc)
    }
}
