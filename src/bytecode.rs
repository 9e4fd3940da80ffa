//! # Bytecode encoding
//!
//! Every instruction is exactly 4 bytes: an opcode byte followed by three
//! operand bytes, interpreted according to the opcode (three single-byte
//! operands, or one byte plus a little-endian `u16`). All multi-byte
//! operands are explicit little-endian, decoded through the safe accessors
//! below rather than an unaligned native-endian pointer cast — this
//! resolves the endianness Open Question in favor of a portable,
//! `unsafe`-free encoding.
//!
//! [`Opcode`] is the larger, canonical instruction set (`LOAD_SELF = 0`,
//! paired `_INT`/`_DOUBLE` specializations, function values) that one
//! module owns end to end: the discriminant list, the decoder, and the
//! encode helpers used by the code generator.

/// Number of opcode discriminants; used to size the `dispatch_table`
/// feature's function-pointer table.
pub const OPCODE_COUNT: usize = 76;

#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    // -- Moves --------------------------------------------------------
    LoadSelf = 0,
    MovU16 = 1,
    MovBool = 2,
    LoadConst = 3,
    MovRegLocal = 4,
    MovLocalReg = 5,
    LoadNil = 6,
    SetConst = 7,

    // -- Generic arithmetic/compare ------------------------------------
    Mul = 8,
    Div = 9,
    Add = 10,
    Sub = 11,
    Mod = 12,
    Eq = 13,
    Neq = 14,
    Lt = 15,
    Gt = 16,
    Leq = 17,
    Geq = 18,

    // -- Int-specialized ------------------------------------------------
    MulInt = 19,
    DivInt = 20,
    AddInt = 21,
    SubInt = 22,
    ModInt = 23,
    EqInt = 24,
    NeqInt = 25,
    LtInt = 26,
    GtInt = 27,
    LeqInt = 28,
    GeqInt = 29,

    // -- Double-specialized (no ModDouble: MOD is Int-only) -------------
    MulDouble = 30,
    DivDouble = 31,
    AddDouble = 32,
    SubDouble = 33,
    EqDouble = 34,
    NeqDouble = 35,
    LtDouble = 36,
    GtDouble = 37,
    LeqDouble = 38,
    GeqDouble = 39,

    // -- Compound assignment --------------------------------------------
    MulAsg = 40,
    DivAsg = 41,
    AddAsg = 42,
    SubAsg = 43,
    ModAsg = 44,

    // -- Unary ------------------------------------------------------------
    Not = 45,

    // -- Control ----------------------------------------------------------
    Jif = 46,
    Jnif = 47,
    Jrel = 48,
    Jrelb = 49,
    JifBool = 50,
    JnifBool = 51,

    // -- Calls --------------------------------------------------------------
    PushArg = 52,
    Call = 53,
    Call1 = 54,
    LoadFunc = 55,
    BindArgToFunc = 56,
    CallFuncValue = 57,
    Ret = 58,
    RetLocal = 59,
    RetNull = 60,
    Raise = 61,

    // -- Collections --------------------------------------------------------
    ArrayNew = 62,
    ArrayPush = 63,
    IdxGet = 64,
    IdxSet = 65,
    TupleNew = 66,
    IdxSetStatic = 67,

    // -- Classes --------------------------------------------------------------
    ClassNew = 68,
    ClassGetInner = 69,
    ClassSetInner = 70,

    // -- Print (concrete syntax `print` statement; not in the abstract
    // instruction-set table but required to implement it) ------------------
    Print = 71,
    PrintSep = 72,

    // -- Modules ----------------------------------------------------------
    Import = 73,
    Nop = 74,
    Halt = 75,
}

impl Opcode {
    pub fn from_u8(b: u8) -> Option<Opcode> {
        use Opcode::*;
        Some(match b {
            0 => LoadSelf,
            1 => MovU16,
            2 => MovBool,
            3 => LoadConst,
            4 => MovRegLocal,
            5 => MovLocalReg,
            6 => LoadNil,
            7 => SetConst,
            8 => Mul,
            9 => Div,
            10 => Add,
            11 => Sub,
            12 => Mod,
            13 => Eq,
            14 => Neq,
            15 => Lt,
            16 => Gt,
            17 => Leq,
            18 => Geq,
            19 => MulInt,
            20 => DivInt,
            21 => AddInt,
            22 => SubInt,
            23 => ModInt,
            24 => EqInt,
            25 => NeqInt,
            26 => LtInt,
            27 => GtInt,
            28 => LeqInt,
            29 => GeqInt,
            30 => MulDouble,
            31 => DivDouble,
            32 => AddDouble,
            33 => SubDouble,
            34 => EqDouble,
            35 => NeqDouble,
            36 => LtDouble,
            37 => GtDouble,
            38 => LeqDouble,
            39 => GeqDouble,
            40 => MulAsg,
            41 => DivAsg,
            42 => AddAsg,
            43 => SubAsg,
            44 => ModAsg,
            45 => Not,
            46 => Jif,
            47 => Jnif,
            48 => Jrel,
            49 => Jrelb,
            50 => JifBool,
            51 => JnifBool,
            52 => PushArg,
            53 => Call,
            54 => Call1,
            55 => LoadFunc,
            56 => BindArgToFunc,
            57 => CallFuncValue,
            58 => Ret,
            59 => RetLocal,
            60 => RetNull,
            61 => Raise,
            62 => ArrayNew,
            63 => ArrayPush,
            64 => IdxGet,
            65 => IdxSet,
            66 => TupleNew,
            67 => IdxSetStatic,
            68 => ClassNew,
            69 => ClassGetInner,
            70 => ClassSetInner,
            71 => Print,
            72 => PrintSep,
            73 => Import,
            74 => Nop,
            75 => Halt,
            _ => return None,
        })
    }

    pub fn is_jump(self) -> bool {
        matches!(
            self,
            Opcode::Jif | Opcode::Jnif | Opcode::Jrel | Opcode::Jrelb | Opcode::JifBool | Opcode::JnifBool
        )
    }
}

/// A decoded view over one 4-byte instruction slot. Operand accessors
/// read straight from the underlying bytes so that a specialized opcode
/// (which shares operand layout with its generic form, per the
/// self-modifying-bytecode invariant) can be reinterpreted without
/// re-encoding.
#[derive(Clone, Copy)]
pub struct Instr {
    pub op: Opcode,
    pub a: u8,
    pub b: u8,
    pub c: u8,
}

impl Instr {
    pub fn rel16(self) -> u16 {
        u16::from_le_bytes([self.b, self.c])
    }

    pub fn imm16(self) -> u16 {
        u16::from_le_bytes([self.b, self.c])
    }
}

/// Decode the 4-byte instruction at `bc[pc..pc + 4]`. An opcode byte this
/// build does not recognize is unrecoverable: it means the bytecode was
/// built against a different opcode table, so this aborts rather than
/// silently treating it as a no-op.
pub fn decode(bc: &[u8], pc: usize) -> Instr {
    let op = match Opcode::from_u8(bc[pc]) {
        Some(op) => op,
        None => crate::error::FatalError::UnknownOpcode(bc[pc]).abort(),
    };
    Instr {
        op,
        a: bc[pc + 1],
        b: bc[pc + 2],
        c: bc[pc + 3],
    }
}

/// Overwrite the opcode byte of the instruction at `pc`, keeping its
/// operand bytes untouched. Used by the specializer/deoptimizer; the
/// spec requires operand layout to be invariant between a generic opcode
/// and its specialized variants, which this preserves by construction.
pub fn rewrite_opcode(bc: &mut [u8], pc: usize, op: Opcode) {
    bc[pc] = op as u8;
}

/// Emit a 3-operand-byte instruction.
pub fn encode_abc(op: Opcode, a: u8, b: u8, c: u8) -> [u8; 4] {
    [op as u8, a, b, c]
}

/// Emit a register + 16-bit-immediate/jump instruction.
pub fn encode_a_imm16(op: Opcode, a: u8, imm16: u16) -> [u8; 4] {
    let bytes = imm16.to_le_bytes();
    [op as u8, a, bytes[0], bytes[1]]
}

/// Emit a padding + 16-bit-immediate instruction (no meaningful `a` byte).
pub fn encode_imm16(op: Opcode, imm16: u16) -> [u8; 4] {
    encode_a_imm16(op, 0, imm16)
}

/// Overwrite only the `rel16`/`imm16` bytes of an already-emitted
/// instruction, used by jump backpatching once a forward label resolves.
pub fn patch_imm16(bc: &mut [u8], pc: usize, imm16: u16) {
    let bytes = imm16.to_le_bytes();
    bc[pc + 2] = bytes[0];
    bc[pc + 3] = bytes[1];
}

#[cfg(test)]
mod tests;
