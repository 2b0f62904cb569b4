//! Portable IR output.

use crate::{DataType, Routine, Value};
use std::fmt;

/// A variable of an IR program.
#[derive(Clone, Debug, PartialEq)]
pub struct IrVariable {
    /// Fully qualified name.
    pub name: String,
    pub ty: DataType,
    /// Size of the storage in bytes.
    pub size: usize,
    pub init: Option<Value>,
    /// Fixed address, for memory-mapped and pre-allocated variables.
    pub address: Option<u16>,
}

impl fmt::Display for IrVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.ty, self.name)?;
        if self.ty.element_type().is_some() || self.ty == DataType::Str {
            write!(f, "[{}]", self.size)?;
        }
        if let Some(init) = &self.init {
            write!(f, " = {init}")?;
        }
        if let Some(address) = self.address {
            write!(f, " @${address:04x}")?;
        }
        Ok(())
    }
}

/// A program in the portable IR: its variables and the lowered routines, unchanged.
///
/// The text form lists the variables and then every routine as its name followed by its chunks.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct IrProgram {
    pub name: String,
    pub variables: Vec<IrVariable>,
    pub routines: Vec<Routine>,
}

impl IrProgram {
    /// Creates a new, empty program.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }

    /// Returns the routine with the given fully qualified name.
    pub fn routine(&self, name: &str) -> Option<&Routine> {
        self.routines.iter().find(|routine| routine.name == name)
    }

    /// Returns the total number of instructions.
    pub fn instruction_count(&self) -> usize {
        self.routines.iter().map(|routine| routine.instructions().count()).sum()
    }
}

impl fmt::Display for IrProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; IR for program '{}'", self.name)?;
        writeln!(f, "[variables]")?;
        for var in &self.variables {
            writeln!(f, "{var}")?;
        }
        writeln!(f, "[code]")?;
        for routine in &self.routines {
            writeln!(f, "{}:", routine.name)?;
            for chunk in &routine.chunks {
                chunk.fmt(f)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chunk, DataWidth, Instruction, MemRef, Opcode, Operand, VReg};
    use octet_interface::Pos;

    #[test]
    fn text_form() {
        let mut chunk = Chunk::new(Pos::dummy());
        chunk.push(Instruction::new(Opcode::Load, DataWidth::Byte, [
            Operand::Reg(VReg::from_usize(0)),
            Operand::Imm(1),
        ]));
        chunk.push(Instruction::new(Opcode::StoreM, DataWidth::Byte, [
            Operand::Reg(VReg::from_usize(0)),
            Operand::Mem(MemRef::symbol("main.x")),
        ]));
        let mut program = IrProgram::new("test");
        program.variables.push(IrVariable {
            name: "main.x".into(),
            ty: DataType::UByte,
            size: 1,
            init: Some(Value::UByte(5)),
            address: None,
        });
        program.variables.push(IrVariable {
            name: "main.arr".into(),
            ty: DataType::ArrayUW,
            size: 20,
            init: None,
            address: Some(0xc000),
        });
        program.routines.push(Routine { name: "main.start".into(), chunks: vec![chunk] });

        assert_eq!(program.instruction_count(), 2);
        assert!(program.routine("main.start").is_some());
        assert_eq!(program.to_string(), "\
; IR for program 'test'
[variables]
ubyte main.x = 5
uword[] main.arr[20] @$c000
[code]
main.start:
    load.b r0,1
    storem.b r0,main.x
");
    }
}
