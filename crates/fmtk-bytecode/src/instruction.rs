//! Instruction word layout and opcodes.
//!
//! ```text
//! 31       23       14        6      0
//! |   B:9   |  C:9   |  A:8   | op:6 |
//! |      Bx:18       |  A:8   | op:6 |
//! |            Ax:26          | op:6 |
//! ```

use std::fmt;

use crate::error::{BytecodeError, Result};

const MAXARG_SBX: i32 = 0x1FFFF;

/// Set on a B/C operand when it indexes the constant table instead of a
/// register.
pub const BITRK: u32 = 1 << 8;

pub const FIELDS_PER_FLUSH: u32 = 50;

macro_rules! opcodes {
    ($($name:ident => $mnemonic:literal,)*) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[repr(u8)]
        pub enum OpCode {
            $($name,)*
        }

        impl OpCode {
            const ALL: &'static [OpCode] = &[$(OpCode::$name,)*];

            pub fn mnemonic(self) -> &'static str {
                match self {
                    $(OpCode::$name => $mnemonic,)*
                }
            }
        }
    };
}

opcodes! {
    Move => "MOVE",
    LoadK => "LOADK",
    LoadKx => "LOADKX",
    LoadBool => "LOADBOOL",
    LoadNil => "LOADNIL",
    GetUpval => "GETUPVAL",
    GetTabUp => "GETTABUP",
    GetTable => "GETTABLE",
    SetTabUp => "SETTABUP",
    SetUpval => "SETUPVAL",
    SetTable => "SETTABLE",
    NewTable => "NEWTABLE",
    SelfOp => "SELF",
    Add => "ADD",
    Sub => "SUB",
    Mul => "MUL",
    Div => "DIV",
    Mod => "MOD",
    Pow => "POW",
    Unm => "UNM",
    Not => "NOT",
    Len => "LEN",
    Concat => "CONCAT",
    Jmp => "JMP",
    Eq => "EQ",
    Lt => "LT",
    Le => "LE",
    Test => "TEST",
    TestSet => "TESTSET",
    Call => "CALL",
    TailCall => "TAILCALL",
    Return => "RETURN",
    ForLoop => "FORLOOP",
    ForPrep => "FORPREP",
    TForCall => "TFORCALL",
    TForLoop => "TFORLOOP",
    SetList => "SETLIST",
    Closure => "CLOSURE",
    VarArg => "VARARG",
    ExtraArg => "EXTRAARG",
}

impl TryFrom<u8> for OpCode {
    type Error = BytecodeError;

    fn try_from(raw: u8) -> Result<Self> {
        OpCode::ALL
            .get(usize::from(raw))
            .copied()
            .ok_or(BytecodeError::InvalidOpcode(raw))
    }
}

impl fmt::Display for OpCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.mnemonic())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Instruction(pub u32);

impl Instruction {
    pub fn raw_opcode(self) -> u8 {
        (self.0 & 0x3F) as u8
    }

    pub fn opcode(self) -> Result<OpCode> {
        OpCode::try_from(self.raw_opcode())
    }

    pub fn a(self) -> u32 {
        (self.0 >> 6) & 0xFF
    }

    pub fn c(self) -> u32 {
        (self.0 >> 14) & 0x1FF
    }

    pub fn b(self) -> u32 {
        (self.0 >> 23) & 0x1FF
    }

    pub fn bx(self) -> u32 {
        self.0 >> 14
    }

    pub fn sbx(self) -> i32 {
        self.bx() as i32 - MAXARG_SBX
    }

    pub fn ax(self) -> u32 {
        self.0 >> 6
    }

    pub fn abc(op: OpCode, a: u32, b: u32, c: u32) -> Self {
        Self(op as u32 | (a & 0xFF) << 6 | (c & 0x1FF) << 14 | (b & 0x1FF) << 23)
    }

    pub fn abx(op: OpCode, a: u32, bx: u32) -> Self {
        Self(op as u32 | (a & 0xFF) << 6 | (bx & 0x3FFFF) << 14)
    }

    pub fn asbx(op: OpCode, a: u32, sbx: i32) -> Self {
        Self::abx(op, a, (sbx + MAXARG_SBX) as u32)
    }

    pub fn ax_form(op: OpCode, ax: u32) -> Self {
        Self(op as u32 | (ax & 0x3FF_FFFF) << 6)
    }
}

/// Whether an RK operand refers to the constant table.
pub fn is_constant(rk: u32) -> bool {
    rk & BITRK != 0
}

/// Decode the "floating point byte" used by `NEWTABLE` sizes:
/// `eeeeexxx` is `xxx` when `eeeee` is zero, else `(1xxx) * 2^(eeeee - 1)`.
pub fn fb2int(x: u32) -> u32 {
    let e = (x >> 3) & 0x1F;
    if e == 0 {
        x
    } else {
        ((x & 7) + 8) << (e - 1)
    }
}
