//! The abstract instruction set that lowering produces and the encoders consume.
//!
//! Instructions are register based: `add.b r1,r2` means `r1 = r1 + r2`. Registers are virtual and
//! unbounded; the register VM uses them directly, while the native encoder maps them onto its
//! memory-resident evaluation stack.

use crate::DataType;

mod inst;
pub use inst::{Instruction, MemRef, Operand};

mod chunk;
pub use chunk::{Chunk, Routine};

index_vec::define_index_type! {
    /// A virtual integer register.
    pub struct VReg = u32;
    DISPLAY_FORMAT = "r{}";
}

index_vec::define_index_type! {
    /// A virtual float register.
    pub struct FpReg = u32;
    DISPLAY_FORMAT = "fr{}";
}

/// The width an instruction operates on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::IntoStaticStr)]
pub enum DataWidth {
    #[strum(serialize = "b")]
    Byte,
    #[strum(serialize = "w")]
    Word,
    #[strum(serialize = "f")]
    Float,
}

impl DataWidth {
    /// Returns the width used for values of `ty`. Strings and arrays are handled as pointers.
    pub const fn of(ty: DataType) -> Self {
        match ty {
            DataType::UByte | DataType::Byte => Self::Byte,
            DataType::Float => Self::Float,
            _ => Self::Word,
        }
    }

    /// Returns the suffix used in the text forms, e.g. `b` in `load.b`.
    #[inline]
    pub fn suffix(self) -> &'static str {
        self.into()
    }
}

/// The opcodes of the abstract instruction set.
///
/// Operands are listed as `r` for integer registers, `fr` for float registers, `imm` for
/// immediates, `mem` for memory references and `label` for code labels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Opcode {
    // Loads
    /// `r1 = imm`, or `fr1 = imm`
    Load,
    /// `r1 = mem`
    LoadM,
    /// `r1 = r2`
    LoadR,
    /// `r1 = mem[r2]`
    LoadX,
    /// `r1 = @(mem + r2)`, where `mem` holds a pointer
    LoadIx,
    /// `r1 = @(r2)`
    LoadI,

    // Stores
    /// `mem = r1`
    StoreM,
    /// `mem[r2] = r1`
    StoreX,
    /// `@(mem + r2) = r1`, where `mem` holds a pointer
    StoreIx,
    /// `@(r2) = r1`
    StoreI,
    /// `mem = 0`
    StoreZM,
    /// `mem[r1] = 0`
    StoreZX,
    /// `@(r1) = 0`
    StoreZI,

    // Register arithmetic
    /// `r1 = r1 + r2`
    Add,
    /// `r1 = r1 - r2`
    Sub,
    /// `r1 = r1 * r2`
    Mul,
    /// Unsigned `r1 = r1 / r2`
    Div,
    /// Signed `r1 = r1 / r2`
    DivS,
    /// Unsigned `r1 = r1 % r2`
    Mod,
    /// Signed `r1 = r1 % r2`
    ModS,
    /// `r1 = r1 & r2`
    And,
    /// `r1 = r1 | r2`
    Or,
    /// `r1 = r1 ^ r2`
    Xor,
    /// `r1 = r1 << r2`
    Lsl,
    /// Logical `r1 = r1 >> r2`
    Lsr,
    /// Arithmetic `r1 = r1 >> r2`
    Asr,
    /// `r1 = -r1`
    Neg,
    /// `r1 = ~r1`
    Inv,
    /// `r1 = r1 + 1`
    Inc,
    /// `r1 = r1 - 1`
    Dec,
    /// Rotate left through the carry.
    Rol,
    /// Rotate right through the carry.
    Ror,
    /// Swaps the bytes of `r1`.
    Swap,
    /// Zero-extends the byte in `r1` to a word.
    Ext,
    /// Sign-extends the byte in `r1` to a word.
    ExtS,
    /// `r1 = r2 << 8 | r3`
    Concat,

    // In-place memory arithmetic
    /// `mem = mem + r1`
    AddM,
    /// `mem = mem - r1`
    SubM,
    /// `mem = mem * r1`
    MulM,
    /// Unsigned `mem = mem / r1`
    DivM,
    /// Signed `mem = mem / r1`
    DivSM,
    /// `mem = mem & r1`
    AndM,
    /// `mem = mem | r1`
    OrM,
    /// `mem = mem ^ r1`
    XorM,
    /// `mem = mem << r1`
    LslM,
    /// Logical `mem = mem >> r1`
    LsrM,
    /// Arithmetic `mem = mem >> r1`
    AsrM,
    /// `mem = -mem`
    NegM,
    /// `mem = mem + 1`
    IncM,
    /// `mem = mem - 1`
    DecM,

    // Comparisons into a register: `r1 = r1 <cond> r2`, 1 if true and 0 otherwise
    Seq,
    Sne,
    Slt,
    Slts,
    Sgt,
    Sgts,
    Sle,
    Sles,
    Sge,
    Sges,

    // Conditional branches: `if r1 <cond> r2 goto label`
    Beq,
    Bne,
    Blt,
    Blts,
    Bgt,
    Bgts,
    Ble,
    Bles,
    Bge,
    Bges,

    // Control flow
    /// `goto label`
    Jump,
    /// Calls the subroutine at `label`.
    Call,
    /// Returns from the subroutine, with an optional result register.
    Return,
    /// Calls the system routine `imm`, with its arguments in the listed registers.
    Syscall,
    /// Saves `r1` on the CPU stack.
    Push,
    /// Restores `r1` from the CPU stack.
    Pop,

    // Float conversions
    /// `r1 = fr1 as ubyte`
    FtoUb,
    /// `r1 = fr1 as byte`
    FtoSb,
    /// `r1 = fr1 as uword`
    FtoUw,
    /// `r1 = fr1 as word`
    FtoSw,
    /// `fr1 = r1 as float`, unsigned byte
    FfromUb,
    /// `fr1 = r1 as float`, signed byte
    FfromSb,
    /// `fr1 = r1 as float`, unsigned word
    FfromUw,
    /// `fr1 = r1 as float`, signed word
    FfromSw,
    /// `r1 = sign(fr1 - fr2)`, as a signed byte
    FComp,
}

impl Opcode {
    /// Returns `true` if the first register operand is only written, not read.
    pub const fn defines_first(self) -> bool {
        matches!(
            self,
            Self::Load
                | Self::LoadM
                | Self::LoadR
                | Self::LoadX
                | Self::LoadIx
                | Self::LoadI
                | Self::Concat
                | Self::Pop
                | Self::FtoUb
                | Self::FtoSb
                | Self::FtoUw
                | Self::FtoSw
                | Self::FComp
                | Self::FfromUb
                | Self::FfromSb
                | Self::FfromUw
                | Self::FfromSw
        )
    }

    /// Returns `true` if the first register operand is read and then written.
    pub const fn modifies_first(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Div
                | Self::DivS
                | Self::Mod
                | Self::ModS
                | Self::And
                | Self::Or
                | Self::Xor
                | Self::Lsl
                | Self::Lsr
                | Self::Asr
                | Self::Neg
                | Self::Inv
                | Self::Inc
                | Self::Dec
                | Self::Rol
                | Self::Ror
                | Self::Swap
                | Self::Ext
                | Self::ExtS
        ) || self.is_set()
    }

    /// Returns `true` for the comparisons into a register.
    pub const fn is_set(self) -> bool {
        matches!(
            self,
            Self::Seq
                | Self::Sne
                | Self::Slt
                | Self::Slts
                | Self::Sgt
                | Self::Sgts
                | Self::Sle
                | Self::Sles
                | Self::Sge
                | Self::Sges
        )
    }

    /// Returns `true` for the conditional branches.
    pub const fn is_branch(self) -> bool {
        matches!(
            self,
            Self::Beq
                | Self::Bne
                | Self::Blt
                | Self::Blts
                | Self::Bgt
                | Self::Bgts
                | Self::Ble
                | Self::Bles
                | Self::Bge
                | Self::Bges
        )
    }

    /// Returns `true` if control may continue somewhere other than the next instruction.
    pub const fn is_control_flow(self) -> bool {
        self.is_branch() || matches!(self, Self::Jump | Self::Return)
    }
}

/// The condition of a comparison or branch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Condition {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl Opcode {
    /// Returns the condition and signedness of a comparison or branch.
    pub const fn condition(self) -> Option<(Condition, bool)> {
        let cond = match self {
            Self::Seq | Self::Beq => (Condition::Eq, false),
            Self::Sne | Self::Bne => (Condition::Ne, false),
            Self::Slt | Self::Blt => (Condition::Lt, false),
            Self::Slts | Self::Blts => (Condition::Lt, true),
            Self::Sgt | Self::Bgt => (Condition::Gt, false),
            Self::Sgts | Self::Bgts => (Condition::Gt, true),
            Self::Sle | Self::Ble => (Condition::Le, false),
            Self::Sles | Self::Bles => (Condition::Le, true),
            Self::Sge | Self::Bge => (Condition::Ge, false),
            Self::Sges | Self::Bges => (Condition::Ge, true),
            _ => return None,
        };
        Some(cond)
    }
}

/// System routines with a fixed number.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::FromRepr, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum Syscall {
    Exit = 0,
    PrintChr = 1,
    PrintStr = 2,
    PrintU8 = 3,
    PrintU16 = 4,
    Input = 5,
    Sleep = 6,
    Rnd = 7,
    Rndw = 8,
}

impl Syscall {
    #[inline]
    pub const fn number(self) -> u8 {
        self as u8
    }

    /// Returns the width of the value left in the first register, if any.
    pub const fn result_width(self) -> Option<DataWidth> {
        match self {
            Self::Rnd | Self::Input => Some(DataWidth::Byte),
            Self::Rndw => Some(DataWidth::Word),
            _ => None,
        }
    }
}
