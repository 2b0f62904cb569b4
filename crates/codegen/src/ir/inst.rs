//! Instructions and their operands.

use super::{DataWidth, FpReg, Opcode, VReg};
use smallvec::SmallVec;
use std::fmt;

/// A memory location.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum MemRef {
    /// An absolute address.
    Address(u16),
    /// A symbol plus a byte offset.
    Symbol { name: String, offset: u16 },
}

impl MemRef {
    /// Creates a reference to the start of a symbol.
    pub fn symbol(name: impl Into<String>) -> Self {
        Self::Symbol { name: name.into(), offset: 0 }
    }

    /// Returns the same location moved by `delta` bytes.
    pub fn offset_by(&self, delta: u16) -> Self {
        match self {
            Self::Address(address) => Self::Address(address.wrapping_add(delta)),
            Self::Symbol { name, offset } => {
                Self::Symbol { name: name.clone(), offset: offset.wrapping_add(delta) }
            }
        }
    }
}

impl fmt::Display for MemRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) if *address < 0x100 => write!(f, "${address:02x}"),
            Self::Address(address) => write!(f, "${address:04x}"),
            Self::Symbol { name, offset: 0 } => f.write_str(name),
            Self::Symbol { name, offset } => write!(f, "{name}+{offset}"),
        }
    }
}

/// An instruction operand.
#[derive(Clone, Debug, PartialEq, derive_more::From)]
pub enum Operand {
    Reg(VReg),
    FpReg(FpReg),
    /// An integer immediate. Encoders truncate it to the instruction width.
    Imm(i32),
    FpImm(f64),
    Mem(MemRef),
    /// A code label, by its fully qualified name.
    Label(String),
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => reg.fmt(f),
            Self::FpReg(reg) => reg.fmt(f),
            Self::Imm(value) => write!(f, "{value}"),
            Self::FpImm(value) => write!(f, "{value:?}"),
            Self::Mem(mem) => mem.fmt(f),
            Self::Label(label) => f.write_str(label),
        }
    }
}

/// An instruction of the abstract instruction set.
#[derive(Clone, Debug, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    /// The width operated on. Control flow instructions have none.
    pub width: Option<DataWidth>,
    pub operands: SmallVec<[Operand; 3]>,
}

impl Instruction {
    /// Creates a new instruction with a width.
    #[must_use]
    pub fn new(
        opcode: Opcode,
        width: DataWidth,
        operands: impl IntoIterator<Item = Operand>,
    ) -> Self {
        Self { opcode, width: Some(width), operands: operands.into_iter().collect() }
    }

    /// Creates a new instruction without a width.
    #[must_use]
    pub fn untyped(opcode: Opcode, operands: impl IntoIterator<Item = Operand>) -> Self {
        Self { opcode, width: None, operands: operands.into_iter().collect() }
    }

    /// Returns the width, defaulting to a byte.
    #[inline]
    pub fn width(&self) -> DataWidth {
        self.width.unwrap_or(DataWidth::Byte)
    }

    /// Returns the `n`th integer register operand.
    pub fn reg(&self, n: usize) -> Option<VReg> {
        self.operands
            .iter()
            .filter_map(|op| match op {
                Operand::Reg(reg) => Some(*reg),
                _ => None,
            })
            .nth(n)
    }

    /// Returns the `n`th float register operand.
    pub fn fp_reg(&self, n: usize) -> Option<FpReg> {
        self.operands
            .iter()
            .filter_map(|op| match op {
                Operand::FpReg(reg) => Some(*reg),
                _ => None,
            })
            .nth(n)
    }

    /// Returns the memory operand, if any.
    pub fn mem(&self) -> Option<&MemRef> {
        self.operands.iter().find_map(|op| match op {
            Operand::Mem(mem) => Some(mem),
            _ => None,
        })
    }

    /// Returns the first immediate operand, if any.
    pub fn imm(&self) -> Option<i32> {
        self.operands.iter().find_map(|op| match op {
            Operand::Imm(value) => Some(*value),
            _ => None,
        })
    }

    /// Returns the label operand, if any.
    pub fn label(&self) -> Option<&str> {
        self.operands.iter().find_map(|op| match op {
            Operand::Label(label) => Some(label.as_str()),
            _ => None,
        })
    }

    /// Returns the integer register written by this instruction.
    pub fn defined_reg(&self) -> Option<VReg> {
        let first = self.operands.first()?;
        match first {
            Operand::Reg(reg)
                if self.opcode.defines_first() || self.opcode.modifies_first() =>
            {
                Some(*reg)
            }
            _ => None,
        }
    }

    /// Returns the integer registers read by this instruction.
    pub fn used_regs(&self) -> SmallVec<[VReg; 3]> {
        let skip = matches!(self.operands.first(), Some(Operand::Reg(_)))
            && self.opcode.defines_first();
        self.operands
            .iter()
            .skip(skip as usize)
            .filter_map(|op| match op {
                Operand::Reg(reg) => Some(*reg),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode)?;
        if let Some(width) = self.width {
            write!(f, ".{}", width.suffix())?;
        }
        for (i, operand) in self.operands.iter().enumerate() {
            f.write_str(if i == 0 { " " } else { "," })?;
            operand.fmt(f)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: usize) -> VReg {
        VReg::from_usize(n)
    }

    #[test]
    fn display() {
        let inst = Instruction::new(
            Opcode::StoreM,
            DataWidth::Word,
            [Operand::Reg(r(1)), Operand::Mem(MemRef::symbol("main.x").offset_by(2))],
        );
        assert_eq!(inst.to_string(), "storem.w r1,main.x+2");

        let inst = Instruction::new(Opcode::IncM, DataWidth::Byte, [MemRef::Address(0xd020).into()]);
        assert_eq!(inst.to_string(), "incm.b $d020");
        assert_eq!(Instruction::untyped(Opcode::Return, []).to_string(), "return");
        assert_eq!(MemRef::Address(0x02).to_string(), "$02");
    }

    #[test]
    fn register_roles() {
        let load = Instruction::new(Opcode::LoadX, DataWidth::Byte, [
            Operand::Reg(r(0)),
            Operand::Reg(r(1)),
            Operand::Mem(MemRef::symbol("main.arr")),
        ]);
        assert_eq!(load.defined_reg(), Some(r(0)));
        assert_eq!(load.used_regs().as_slice(), &[r(1)]);

        let add = Instruction::new(Opcode::Add, DataWidth::Byte, [r(0).into(), r(1).into()]);
        assert_eq!(add.defined_reg(), Some(r(0)));
        assert_eq!(add.used_regs().as_slice(), &[r(0), r(1)]);

        let store = Instruction::new(Opcode::StoreM, DataWidth::Byte, [
            r(2).into(),
            MemRef::symbol("main.x").into(),
        ]);
        assert_eq!(store.defined_reg(), None);
        assert_eq!(store.used_regs().as_slice(), &[r(2)]);
    }
}
