//! # Bytecode emission, jump backpatching, and peephole optimizations
//!
//! `FuncBuilder` owns one function's in-progress [`BytecodeStorage`] plus
//! its register stack and local table, and is where its two peephole
//! optimizations live: they look at the most recently emitted 4-byte slot
//! and, when the pattern matches, rewrite it in place instead of appending
//! a new instruction.

use crate::bytecode::{encode_a_imm16, encode_abc, encode_imm16, patch_imm16, Opcode};
use crate::error::ParseError;
use crate::parser::locals::LocalTable;
use crate::parser::registers::RegisterStack;
use crate::program::{BytecodeStorage, SourceMapEntry};

pub struct FuncBuilder {
    pub bc: Vec<u8>,
    pub regs: RegisterStack,
    pub locals: LocalTable,
    pub func_idx: usize,
    pub source_map: Vec<SourceMapEntry>,
    stmt_start: usize,
}

impl FuncBuilder {
    pub fn new(func_idx: usize) -> Self {
        FuncBuilder {
            bc: Vec::new(),
            regs: RegisterStack::new(),
            locals: LocalTable::new(),
            func_idx,
            source_map: Vec::new(),
            stmt_start: 0,
        }
    }

    pub fn pc(&self) -> usize {
        self.bc.len()
    }

    fn push_instr(&mut self, bytes: [u8; 4]) -> usize {
        let pc = self.bc.len();
        self.bc.extend_from_slice(&bytes);
        pc
    }

    pub fn emit_abc(&mut self, op: Opcode, a: u8, b: u8, c: u8) -> usize {
        self.push_instr(encode_abc(op, a, b, c))
    }

    pub fn emit_a_imm16(&mut self, op: Opcode, a: u8, imm16: u16) -> usize {
        self.push_instr(encode_a_imm16(op, a, imm16))
    }

    pub fn emit_imm16(&mut self, op: Opcode, imm16: u16) -> usize {
        self.push_instr(encode_imm16(op, imm16))
    }

    /// Emit a jump with a placeholder offset, returning the pc to pass to
    /// [`Self::patch_jump`] once the target is known.
    pub fn emit_jump_placeholder(&mut self, op: Opcode, a: u8) -> usize {
        self.emit_a_imm16(op, a, 0)
    }

    /// Resolve a previously-emitted jump: writes
    /// `(target - (jump_pc + 4)) / 4` as the little-endian `rel16`,
    /// forward or backward as the sign requires. `Jrelb` stores the
    /// magnitude of a backward jump; the VM subtracts it at dispatch time.
    pub fn patch_jump(&mut self, jump_pc: usize, target: usize) -> Result<(), ParseError> {
        let origin = jump_pc + 4;
        let delta: i64 = target as i64 - origin as i64;
        let rel_bytes = delta.unsigned_abs();
        if rel_bytes % 4 != 0 {
            return Err(ParseError::BytecodeGen(
                "jump target not aligned to instruction boundary".to_string(),
            ));
        }
        let rel16 = rel_bytes / 4;
        if rel16 > u16::MAX as u64 {
            return Err(ParseError::BytecodeGen(
                "jump distance exceeds 16-bit relative offset".to_string(),
            ));
        }
        patch_imm16(&mut self.bc, jump_pc, rel16 as u16);
        Ok(())
    }

    /// Emit an unconditional backward jump to `target` (already known,
    /// used by `while`'s loop-back edge), choosing `Jrelb`.
    pub fn emit_jump_back(&mut self, target: usize) -> Result<(), ParseError> {
        let jump_pc = self.pc();
        let origin = jump_pc + 4;
        let delta = origin - target;
        if delta % 4 != 0 {
            return Err(ParseError::BytecodeGen(
                "backward jump target not aligned".to_string(),
            ));
        }
        let rel16 = delta / 4;
        if rel16 > u16::MAX as usize {
            return Err(ParseError::BytecodeGen(
                "backward jump distance exceeds 16-bit relative offset".to_string(),
            ));
        }
        self.emit_imm16(Opcode::Jrelb, rel16 as u16);
        Ok(())
    }

    fn last_instr(&self) -> Option<(usize, Opcode, u8, u8, u8)> {
        if self.bc.len() < 4 {
            return None;
        }
        let pc = self.bc.len() - 4;
        let op = Opcode::from_u8(self.bc[pc])?;
        Some((pc, op, self.bc[pc + 1], self.bc[pc + 2], self.bc[pc + 3]))
    }

    /// Peephole 1: *local return*. If the last-emitted instruction is
    /// `MOV_LOCAL_REG r, L` and the statement being closed is `return r`
    /// for that same register, rewrite the slot in place to
    /// `RET_LOCAL L` instead of appending a separate `RET`.
    pub fn emit_ret(&mut self, reg: u8) {
        if let Some((pc, Opcode::MovLocalReg, dst_reg, local_lo, local_hi)) = self.last_instr() {
            if dst_reg == reg {
                self.bc[pc] = Opcode::RetLocal as u8;
                self.bc[pc + 1] = local_lo;
                self.bc[pc + 2] = local_hi;
                self.bc[pc + 3] = 0;
                return;
            }
        }
        self.emit_abc(Opcode::Ret, reg, 0, 0);
    }

    pub fn emit_ret_null(&mut self) {
        self.emit_abc(Opcode::RetNull, 0, 0, 0);
    }

    /// Peephole 2: *unary call*. If the call has exactly one argument and
    /// the immediately preceding instruction is `PUSH_ARG r`, rewrite that
    /// slot to `CALL1 r, fn_idx`: the register holds the sole argument on
    /// entry and the return value on exit, and no separate `CALL` is
    /// emitted.
    /// Returns the register that ends up holding the call's result: `dst`
    /// for a normal `CALL`, or the argument register itself when the
    /// `CALL1` peephole fires (the caller should treat that register as
    /// the expression's result register from here on).
    pub fn emit_call(&mut self, argc: usize, fn_idx: u16, dst: u8) -> u8 {
        if argc == 1 {
            if let Some((pc, Opcode::PushArg, arg_reg, _, _)) = self.last_instr() {
                self.bc[pc] = Opcode::Call1 as u8;
                self.bc[pc + 1] = arg_reg;
                let bytes = fn_idx.to_le_bytes();
                self.bc[pc + 2] = bytes[0];
                self.bc[pc + 3] = bytes[1];
                return arg_reg;
            }
        }
        self.emit_a_imm16(Opcode::Call, dst, fn_idx);
        dst
    }

    /// Record the source-position mapping for the statement that just
    /// finished emitting bytecode, covering `[stmt_start, pc())`.
    pub fn close_statement(&mut self, source_start: usize) {
        let from = self.stmt_start;
        let to = self.pc();
        if to > from {
            self.source_map.push(SourceMapEntry {
                bc_from: from,
                bc_to: to,
                source_start,
                func_idx: self.func_idx,
            });
        }
        self.stmt_start = to;
    }

    pub fn into_storage(self) -> BytecodeStorage {
        BytecodeStorage {
            bc: self.bc,
            num_registers: self.regs.high_water(),
            num_locals: self.locals.num_locals(),
        }
    }
}
