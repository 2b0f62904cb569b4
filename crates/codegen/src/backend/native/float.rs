//! Float instructions, all of which call the runtime float library.

use super::{FLOAT_REG_PREFIX, FpLoc, NativeEncoder, fp_reg_at, mem_at, operand_at, reg_at};
use crate::{CodegenError, CodegenResult, DataWidth, FpReg, Instruction, Opcode, Operand};

const FLOAT_ZERO: &str = "floats.FL_ZERO";

/// Returns the operands loading the low and high byte of an address into A and Y.
fn address_bytes(address: &str) -> (String, String) {
    if address.contains('+') {
        (format!("#<({address})"), format!("#>({address})"))
    } else {
        (format!("#<{address}"), format!("#>{address}"))
    }
}

impl NativeEncoder<'_> {
    pub(super) fn encode_float(&mut self, inst: &Instruction) -> CodegenResult<()> {
        match inst.opcode {
            Opcode::Load => {
                let reg = fp_reg_at(inst, 0)?;
                let Some(Operand::FpImm(value)) = inst.operands.get(1) else {
                    return Err(CodegenError::assembly(format!("missing float value of {inst}")));
                };
                let name = self.session.float_const(self.machine, *value)?;
                self.fp_regs.insert(reg, FpLoc::Mem(name));
            }
            Opcode::LoadM => {
                let reg = fp_reg_at(inst, 0)?;
                let mem = mem_at(inst)?;
                self.fp_regs.insert(reg, FpLoc::Mem(mem.to_string()));
            }
            Opcode::LoadX => {
                let reg = fp_reg_at(inst, 0)?;
                let mem = mem_at(inst)?.to_string();
                let index = operand_at(inst, 1)?.clone();
                self.element_address(&mem, &index)?;
                self.emit("sta", "ZP_SCRATCH_W2");
                self.emit("sty", "ZP_SCRATCH_W2+1");
                let own = float_reg_storage(reg);
                self.address_to_ay(&own);
                self.emit("jsr", "floats.copy_float");
                self.fp_regs.insert(reg, FpLoc::Own);
            }
            Opcode::StoreM => {
                let source = self.fp_address(fp_reg_at(inst, 0)?)?;
                let mem = mem_at(inst)?.to_string();
                self.copy_float(&source, &mem);
            }
            Opcode::StoreZM => {
                let mem = mem_at(inst)?.to_string();
                self.copy_float(FLOAT_ZERO, &mem);
            }
            Opcode::StoreX | Opcode::StoreZX => {
                let (source, index) = if inst.opcode == Opcode::StoreZX {
                    (FLOAT_ZERO.to_string(), operand_at(inst, 0)?.clone())
                } else {
                    (self.fp_address(fp_reg_at(inst, 0)?)?, operand_at(inst, 1)?.clone())
                };
                let mem = mem_at(inst)?.to_string();
                self.address_to_ay(&source);
                self.emit("sta", "ZP_SCRATCH_W2");
                self.emit("sty", "ZP_SCRATCH_W2+1");
                self.element_address(&mem, &index)?;
                self.emit("jsr", "floats.copy_float");
            }
            Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div => {
                let target = fp_reg_at(inst, 0)?;
                let source = self.fp_address(fp_reg_at(inst, 1)?)?;
                self.materialize_fp(target)?;
                self.float_in_place(inst.opcode, &float_reg_storage(target), &source)?;
            }
            Opcode::AddM | Opcode::SubM | Opcode::MulM | Opcode::DivM => {
                let source = self.fp_address(fp_reg_at(inst, 0)?)?;
                let mem = mem_at(inst)?.to_string();
                self.float_in_place(inst.opcode, &mem, &source)?;
            }
            Opcode::Neg => {
                let reg = fp_reg_at(inst, 0)?;
                self.materialize_fp(reg)?;
                self.address_to_ay(&float_reg_storage(reg));
                self.emit("jsr", "floats.negate_inplace");
            }
            Opcode::NegM | Opcode::IncM | Opcode::DecM => {
                let routine = match inst.opcode {
                    Opcode::NegM => "floats.negate_inplace",
                    Opcode::IncM => "floats.inc_inplace",
                    _ => "floats.dec_inplace",
                };
                let mem = mem_at(inst)?.to_string();
                self.address_to_ay(&mem);
                self.emit("jsr", routine);
            }
            Opcode::FComp => {
                let result = reg_at(inst, 0)?;
                let a = self.fp_address(fp_reg_at(inst, 1)?)?;
                let b = self.fp_address(fp_reg_at(inst, 2)?)?;
                self.address_to_scratch_w1(&a);
                self.address_to_ay(&b);
                self.emit("jsr", "floats.compare");
                self.set(result, DataWidth::Byte)?;
            }
            Opcode::FfromUb | Opcode::FfromSb | Opcode::FfromUw | Opcode::FfromSw => {
                let reg = fp_reg_at(inst, 0)?;
                let value = operand_at(inst, 1)?.clone();
                let (routine, width) = match inst.opcode {
                    Opcode::FfromUb => ("floats.cast_from_ub", DataWidth::Byte),
                    Opcode::FfromSb => ("floats.cast_from_b", DataWidth::Byte),
                    Opcode::FfromUw => ("floats.cast_from_uw", DataWidth::Word),
                    _ => ("floats.cast_from_w", DataWidth::Word),
                };
                self.address_to_scratch_w1(&float_reg_storage(reg));
                self.load_value(&value, width)?;
                self.emit("jsr", routine);
                self.fp_regs.insert(reg, FpLoc::Own);
            }
            Opcode::Return => {
                let source = self.fp_address(fp_reg_at(inst, 0)?)?;
                self.address_to_ay(&source);
                self.emit("jsr", "floats.MOVFM");
                self.drop_stack();
                self.emit0("rts");
            }
            op => return Err(CodegenError::assembly(format!("no native code for {op}.f"))),
        }
        Ok(())
    }

    /// `r1 = fr1 as <int>`, returned in A (and Y) by the runtime library.
    pub(super) fn float_to_int(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let source = self.fp_address(fp_reg_at(inst, 1)?)?;
        let routine = match inst.opcode {
            Opcode::FtoUb => "floats.cast_to_ub",
            Opcode::FtoSb => "floats.cast_to_b",
            Opcode::FtoUw => "floats.cast_to_uw",
            _ => "floats.cast_to_w",
        };
        self.address_to_ay(&source);
        self.emit("jsr", routine);
        self.set(reg, width)
    }

    /// Returns the address of the float held by a register.
    fn fp_address(&self, reg: FpReg) -> CodegenResult<String> {
        match self.fp_regs.get(&reg) {
            Some(FpLoc::Mem(name)) => Ok(name.clone()),
            Some(FpLoc::Own) => Ok(float_reg_storage(reg)),
            None => Err(CodegenError::assembly(format!("register {reg} used before it is set"))),
        }
    }

    /// Copies an aliased float into the register's own storage, before it is modified.
    fn materialize_fp(&mut self, reg: FpReg) -> CodegenResult<()> {
        let source = self.fp_address(reg)?;
        if let Some(FpLoc::Mem(_)) = self.fp_regs.get(&reg) {
            self.copy_float(&source, &float_reg_storage(reg));
            self.fp_regs.insert(reg, FpLoc::Own);
        }
        Ok(())
    }

    fn float_in_place(&mut self, opcode: Opcode, target: &str, source: &str) -> CodegenResult<()> {
        let routine = match opcode {
            Opcode::Add | Opcode::AddM => "floats.add_inplace",
            Opcode::Sub | Opcode::SubM => "floats.sub_inplace",
            Opcode::Mul | Opcode::MulM => "floats.mul_inplace",
            Opcode::Div | Opcode::DivM => "floats.div_inplace",
            op => return Err(CodegenError::assembly(format!("no float code for {op}"))),
        };
        self.address_to_scratch_w1(target);
        self.address_to_ay(source);
        self.emit("jsr", routine);
        Ok(())
    }

    fn copy_float(&mut self, source: &str, target: &str) {
        self.address_to_ay(source);
        self.emit("sta", "ZP_SCRATCH_W2");
        self.emit("sty", "ZP_SCRATCH_W2+1");
        self.address_to_ay(target);
        self.emit("jsr", "floats.copy_float");
    }

    /// Loads the address of the element at byte offset `index` of an array into A and Y.
    fn element_address(&mut self, array: &str, index: &Operand) -> CodegenResult<()> {
        let index = self.lo(index)?;
        self.address_to_ay(array);
        self.emit0("clc");
        self.emit("adc", index);
        self.emit("bcc", "+");
        self.emit0("iny");
        self.plus_label();
        Ok(())
    }

    fn address_to_ay(&mut self, address: &str) {
        let (lo, hi) = address_bytes(address);
        self.emit("lda", lo);
        self.emit("ldy", hi);
    }

    fn address_to_scratch_w1(&mut self, address: &str) {
        self.address_to_ay(address);
        self.emit("sta", "ZP_SCRATCH_W1");
        self.emit("sty", "ZP_SCRATCH_W1+1");
    }
}

/// Returns the name of the storage of a float register.
fn float_reg_storage(reg: FpReg) -> String {
    format!("{FLOAT_REG_PREFIX}{}", reg.index())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chunk, CodegenSession, Machine, MemRef, StaticSymbolTable};
    use octet_interface::Pos;

    fn fr(n: usize) -> Operand {
        Operand::FpReg(FpReg::from_usize(n))
    }

    fn float(opcode: Opcode, operands: impl IntoIterator<Item = Operand>) -> Instruction {
        Instruction::new(opcode, DataWidth::Float, operands)
    }

    fn encode(instructions: Vec<Instruction>) -> (Vec<String>, CodegenSession) {
        let machine = Machine::c64();
        let symbols = StaticSymbolTable::new();
        let mut session = CodegenSession::new();
        let mut encoder = NativeEncoder::new(&mut session, &symbols, &machine);
        let chunk = Chunk { label: None, pos: Pos::dummy(), instructions };
        encoder.encode_chunks("main.start", &[chunk]).unwrap();
        let lines = encoder.finish();
        (lines, session)
    }

    #[test]
    fn address_operands() {
        assert_eq!(address_bytes("main.f"), ("#<main.f".to_string(), "#>main.f".to_string()));
        assert_eq!(address_bytes("main.f+5").0, "#<(main.f+5)");
    }

    #[test]
    fn copies_through_aliases() {
        let (lines, session) = encode(vec![
            float(Opcode::Load, [fr(0), Operand::FpImm(1.5)]),
            float(Opcode::StoreM, [fr(0), Operand::Mem(MemRef::symbol("main.f"))]),
        ]);
        assert_eq!(lines, [
            "\tlda  #<octet_float_const_1",
            "\tldy  #>octet_float_const_1",
            "\tsta  ZP_SCRATCH_W2",
            "\tsty  ZP_SCRATCH_W2+1",
            "\tlda  #<main.f",
            "\tldy  #>main.f",
            "\tjsr  floats.copy_float",
        ]);
        assert_eq!(session.float_consts().len(), 1);
    }

    #[test]
    fn arithmetic_in_register_storage() {
        let (lines, _) = encode(vec![
            float(Opcode::LoadM, [fr(0), Operand::Mem(MemRef::symbol("main.a"))]),
            float(Opcode::Load, [fr(1), Operand::FpImm(1.0)]),
            float(Opcode::Mul, [fr(0), fr(1)]),
            float(Opcode::StoreM, [fr(0), Operand::Mem(MemRef::symbol("main.b"))]),
        ]);
        assert_eq!(lines, [
            "\tlda  #<main.a",
            "\tldy  #>main.a",
            "\tsta  ZP_SCRATCH_W2",
            "\tsty  ZP_SCRATCH_W2+1",
            "\tlda  #<octet_float_reg_0",
            "\tldy  #>octet_float_reg_0",
            "\tjsr  floats.copy_float",
            "\tlda  #<octet_float_reg_0",
            "\tldy  #>octet_float_reg_0",
            "\tsta  ZP_SCRATCH_W1",
            "\tsty  ZP_SCRATCH_W1+1",
            "\tlda  #<floats.FL_FONE",
            "\tldy  #>floats.FL_FONE",
            "\tjsr  floats.mul_inplace",
            "\tlda  #<octet_float_reg_0",
            "\tldy  #>octet_float_reg_0",
            "\tsta  ZP_SCRATCH_W2",
            "\tsty  ZP_SCRATCH_W2+1",
            "\tlda  #<main.b",
            "\tldy  #>main.b",
            "\tjsr  floats.copy_float",
        ]);
    }

    #[test]
    fn unset_register() {
        let machine = Machine::c64();
        let symbols = StaticSymbolTable::new();
        let mut session = CodegenSession::new();
        let mut encoder = NativeEncoder::new(&mut session, &symbols, &machine);
        let mut chunk = Chunk::new(Pos::dummy());
        chunk.push(float(Opcode::StoreM, [fr(2), Operand::Mem(MemRef::symbol("main.f"))]));
        assert!(encoder.encode_chunks("main.start", &[chunk]).is_err());
    }
}
