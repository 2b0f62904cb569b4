//! Register VM bytecode.
//!
//! The VM executes the abstract instructions directly. Encoding assigns every instruction an index,
//! resolves labels to those indices and symbols to memory addresses, and narrows register ids to
//! the VM's 8-bit register fields.

use crate::{
    CodegenError, CodegenResult, DataWidth, Instruction, MemRef, Opcode, Operand, Routine,
    SymbolTable, Value,
};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use std::fmt;

/// First address of the variables that the symbol table did not place.
const VARIABLES_START: u16 = 0x1000;

/// A resolved operand.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum VmOperand {
    Reg(u8),
    FpReg(u8),
    Imm(i32),
    FpImm(f64),
    Address(u16),
    /// Index of the target instruction.
    Target(usize),
}

impl fmt::Display for VmOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Reg(reg) => write!(f, "r{reg}"),
            Self::FpReg(reg) => write!(f, "fr{reg}"),
            Self::Imm(value) => write!(f, "{value}"),
            Self::FpImm(value) => write!(f, "{value:?}"),
            Self::Address(address) => write!(f, "${address:04x}"),
            Self::Target(index) => write!(f, "@{index}"),
        }
    }
}

/// A VM instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct VmInstruction {
    pub opcode: Opcode,
    pub width: Option<DataWidth>,
    pub operands: SmallVec<[VmOperand; 3]>,
}

impl fmt::Display for VmInstruction {
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

/// A variable placed in VM memory.
#[derive(Clone, Debug, PartialEq)]
pub struct VmVariable {
    pub name: String,
    pub address: u16,
    pub size: usize,
    pub init: Option<Value>,
}

/// A program for the register VM.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct VmProgram {
    pub name: String,
    pub instructions: Vec<VmInstruction>,
    /// Index of the first instruction to execute.
    pub entry: usize,
    pub variables: Vec<VmVariable>,
}

impl fmt::Display for VmProgram {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "; VM program '{}', entry @{}", self.name, self.entry)?;
        for var in &self.variables {
            writeln!(f, "; ${:04x} {} ({} bytes)", var.address, var.name, var.size)?;
        }
        for (i, inst) in self.instructions.iter().enumerate() {
            writeln!(f, "{i:5}  {inst}")?;
        }
        Ok(())
    }
}

/// Encodes routines into a [`VmProgram`].
///
/// Routines are added in order; labels and symbols are resolved in [`finish`](Self::finish), so
/// forward references are allowed.
pub struct VmEncoder<'a> {
    symbols: &'a dyn SymbolTable,
    instructions: Vec<Instruction>,
    labels: FxHashMap<String, usize>,
    variables: Vec<VmVariable>,
    addresses: FxHashMap<String, u16>,
    next_address: u16,
}

impl<'a> VmEncoder<'a> {
    /// Creates a new encoder.
    pub fn new(symbols: &'a dyn SymbolTable) -> Self {
        Self {
            symbols,
            instructions: Vec::new(),
            labels: FxHashMap::default(),
            variables: Vec::new(),
            addresses: FxHashMap::default(),
            next_address: VARIABLES_START,
        }
    }

    /// Places a variable in memory: at its address in the symbol table if it has one, otherwise
    /// after the previously placed variables.
    pub fn allocate(&mut self, name: &str, size: usize, init: Option<Value>) -> CodegenResult<u16> {
        let address = match self.symbols.resolve(name) {
            Some(address) => address,
            None => {
                let address = self.next_address;
                self.next_address = u16::try_from(size)
                    .ok()
                    .and_then(|size| address.checked_add(size))
                    .ok_or_else(|| {
                        CodegenError::assembly(format!("no VM memory left for variable {name}"))
                    })?;
                address
            }
        };
        trace!(name, address, size, "placed variable");
        self.addresses.insert(name.to_string(), address);
        self.variables.push(VmVariable { name: name.to_string(), address, size, init });
        Ok(address)
    }

    /// Adds a routine, labelled with its name.
    pub fn add_routine(&mut self, routine: &Routine) {
        self.labels.insert(routine.name.clone(), self.instructions.len());
        for chunk in &routine.chunks {
            if let Some(label) = &chunk.label {
                self.labels.insert(label.clone(), self.instructions.len());
            }
            self.instructions.extend(chunk.iter().cloned());
        }
    }

    /// Resolves all operands and returns the program, starting at the routine `entry`.
    #[instrument(level = "debug", skip_all, fields(instructions = self.instructions.len()))]
    pub fn finish(self, name: &str, entry: &str) -> CodegenResult<VmProgram> {
        let entry = self.target(entry)?;
        let instructions = self
            .instructions
            .iter()
            .map(|inst| {
                let operands =
                    inst.operands.iter().map(|op| self.resolve(op)).collect::<CodegenResult<_>>()?;
                Ok(VmInstruction { opcode: inst.opcode, width: inst.width, operands })
            })
            .collect::<CodegenResult<Vec<_>>>()?;
        debug!(labels = self.labels.len(), variables = self.variables.len(), "resolved");
        Ok(VmProgram { name: name.to_string(), instructions, entry, variables: self.variables })
    }

    fn resolve(&self, operand: &Operand) -> CodegenResult<VmOperand> {
        Ok(match operand {
            Operand::Reg(reg) => VmOperand::Reg(narrow(reg.index(), "register")?),
            Operand::FpReg(reg) => VmOperand::FpReg(narrow(reg.index(), "float register")?),
            Operand::Imm(value) => VmOperand::Imm(*value),
            Operand::FpImm(value) => VmOperand::FpImm(*value),
            Operand::Mem(MemRef::Address(address)) => VmOperand::Address(*address),
            Operand::Mem(MemRef::Symbol { name, offset }) => {
                let base = self
                    .addresses
                    .get(name)
                    .copied()
                    .or_else(|| self.symbols.resolve(name))
                    .ok_or_else(|| CodegenError::assembly(format!("unresolved symbol {name}")))?;
                let address = base.checked_add(*offset).ok_or_else(|| {
                    CodegenError::assembly(format!("address of {name}+{offset} out of range"))
                })?;
                VmOperand::Address(address)
            }
            Operand::Label(label) => VmOperand::Target(self.target(label)?),
        })
    }

    fn target(&self, label: &str) -> CodegenResult<usize> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| CodegenError::assembly(format!("undefined label {label}")))
    }
}

fn narrow(index: usize, what: &str) -> CodegenResult<u8> {
    u8::try_from(index)
        .map_err(|_| CodegenError::assembly(format!("{what} {index} does not fit the VM")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chunk, StaticSymbolTable, StorageClass, VReg};
    use octet_interface::Pos;

    fn r(n: usize) -> Operand {
        Operand::Reg(VReg::from_usize(n))
    }

    fn routine(name: &str, chunks: Vec<Chunk>) -> Routine {
        Routine { name: name.into(), chunks }
    }

    #[test]
    fn resolves_labels_and_symbols() {
        let symbols = StaticSymbolTable::new().with(
            "main.border",
            StorageClass::MemoryMapped,
            Some(0xd020),
        );
        let mut encoder = VmEncoder::new(&symbols);
        assert_eq!(encoder.allocate("main.x", 1, None).unwrap(), 0x1000);
        assert_eq!(encoder.allocate("main.w", 2, Some(Value::UWord(7))).unwrap(), 0x1001);
        assert_eq!(encoder.allocate("main.border", 1, None).unwrap(), 0xd020);

        let mut entry = Chunk::new(Pos::dummy());
        entry.push(Instruction::untyped(Opcode::Jump, [Operand::Label("main.start".into())]));
        let mut body = Chunk::labelled("main.start.again", Pos::dummy());
        body.push(Instruction::new(Opcode::LoadM, DataWidth::Word, [
            r(0),
            MemRef::symbol("main.w").into(),
        ]));
        body.push(Instruction::new(Opcode::StoreM, DataWidth::Byte, [
            r(0),
            MemRef::symbol("main.x").into(),
        ]));
        body.push(Instruction::new(Opcode::IncM, DataWidth::Byte, [
            MemRef::symbol("main.border").into(),
        ]));
        body.push(Instruction::untyped(Opcode::Jump, [Operand::Label(
            "main.start.again".into(),
        )]));

        encoder.add_routine(&routine("octet_entrypoint", vec![entry]));
        encoder.add_routine(&routine("main.start", vec![body]));
        let program = encoder.finish("test", "octet_entrypoint").unwrap();

        assert_eq!(program.entry, 0);
        let text: Vec<String> = program.instructions.iter().map(ToString::to_string).collect();
        assert_eq!(text, [
            "jump @1",
            "loadm.w r0,$1001",
            "storem.b r0,$1000",
            "incm.b $d020",
            "jump @1",
        ]);
        assert_eq!(program.variables.len(), 3);
    }

    #[test]
    fn unresolved() {
        let symbols = StaticSymbolTable::new();
        let mut chunk = Chunk::new(Pos::dummy());
        chunk.push(Instruction::untyped(Opcode::Call, [Operand::Label("main.nowhere".into())]));
        let mut encoder = VmEncoder::new(&symbols);
        encoder.add_routine(&routine("main.start", vec![chunk.clone()]));
        assert!(encoder.finish("test", "main.start").is_err());

        let mut chunk = Chunk::new(Pos::dummy());
        chunk.push(Instruction::new(Opcode::IncM, DataWidth::Byte, [
            MemRef::symbol("main.unknown").into(),
        ]));
        let mut encoder = VmEncoder::new(&symbols);
        encoder.add_routine(&routine("main.start", vec![chunk]));
        assert!(encoder.finish("test", "main.start").is_err());

        let mut chunk = Chunk::new(Pos::dummy());
        chunk.push(Instruction::new(Opcode::Inc, DataWidth::Byte, [r(300)]));
        let mut encoder = VmEncoder::new(&symbols);
        encoder.add_routine(&routine("main.start", vec![chunk]));
        assert!(encoder.finish("test", "main.start").is_err());
    }
}
