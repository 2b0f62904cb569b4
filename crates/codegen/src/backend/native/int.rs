//! Integer instructions.

use super::{NativeEncoder, RegLoc, high_byte, label_at, mem_at, operand_at, reg_at};
use crate::{
    CodegenError, CodegenResult, DataWidth, Instruction, MemRef, Opcode, Operand, SlotByte,
    ir::Condition,
};
use rustc_hash::FxHashMap;

const SCRATCH_REG: &str = "ZP_SCRATCH_REG";
const SCRATCH_B1: &str = "ZP_SCRATCH_B1";
const SCRATCH_W1: &str = "ZP_SCRATCH_W1";
const SCRATCH_W2: &str = "ZP_SCRATCH_W2";

/// Carry setup and mnemonic of the byte operation behind an arithmetic or logic opcode.
fn alu(opcode: Opcode) -> Option<(Option<&'static str>, &'static str)> {
    Some(match opcode {
        Opcode::Add | Opcode::AddM => (Some("clc"), "adc"),
        Opcode::Sub | Opcode::SubM => (Some("sec"), "sbc"),
        Opcode::And | Opcode::AndM => (None, "and"),
        Opcode::Or | Opcode::OrM => (None, "ora"),
        Opcode::Xor | Opcode::XorM => (None, "eor"),
        _ => return None,
    })
}

/// Kind of shift, for both the register and the in-place variants.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Shift {
    Left,
    Right,
    RightSigned,
}

impl Shift {
    fn of(opcode: Opcode) -> Option<Self> {
        match opcode {
            Opcode::Lsl | Opcode::LslM => Some(Self::Left),
            Opcode::Lsr | Opcode::LsrM => Some(Self::Right),
            Opcode::Asr | Opcode::AsrM => Some(Self::RightSigned),
            _ => None,
        }
    }

    /// Returns the runtime library routine shifting A (and Y) by `ZP_SCRATCH_B1` bits.
    fn routine(self, width: DataWidth) -> &'static str {
        match (self, width) {
            (Self::Left, DataWidth::Word) => "math.lsl_word",
            (Self::Right, DataWidth::Word) => "math.lsr_word",
            (Self::RightSigned, DataWidth::Word) => "math.asr_word",
            (Self::Left, _) => "math.lsl_byte",
            (Self::Right, _) => "math.lsr_byte",
            (Self::RightSigned, _) => "math.asr_byte",
        }
    }
}

/// Returns the runtime library routine for a multiplication or division, operating on A (and Y)
/// with the second operand in Y for bytes and `ZP_SCRATCH_W1` for words.
///
/// Divisions leave the quotient in A (and Y) and the remainder in Y for bytes and in
/// `ZP_SCRATCH_W2` for words.
fn muldiv_routine(opcode: Opcode, width: DataWidth) -> Option<&'static str> {
    let word = width == DataWidth::Word;
    Some(match opcode {
        Opcode::Mul | Opcode::MulM if word => "math.multiply_words",
        Opcode::Mul | Opcode::MulM => "math.multiply_bytes",
        Opcode::Div | Opcode::Mod | Opcode::DivM if word => "math.divmod_uw",
        Opcode::Div | Opcode::Mod | Opcode::DivM => "math.divmod_ub",
        Opcode::DivS | Opcode::ModS | Opcode::DivSM if word => "math.divmod_w",
        Opcode::DivS | Opcode::ModS | Opcode::DivSM => "math.divmod_b",
        _ => return None,
    })
}

fn bits(width: DataWidth) -> i32 {
    if width == DataWidth::Word { 16 } else { 8 }
}

impl NativeEncoder<'_> {
    // --- loads

    pub(super) fn load_immediate(
        &mut self,
        inst: &Instruction,
        width: DataWidth,
    ) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let value = inst
            .imm()
            .ok_or_else(|| CodegenError::assembly(format!("missing immediate of {inst}")))?;
        if self.stack.contains(reg) {
            self.load_value(&Operand::Imm(value), width)?;
            return self.set(reg, width);
        }
        self.regs.insert(reg, RegLoc::Const(value));
        Ok(())
    }

    pub(super) fn load_memory(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let mem = mem_at(inst)?;
        self.emit("lda", &mem);
        if width == DataWidth::Word {
            self.emit("ldy", high_byte(&mem));
        }
        self.set(reg, width)
    }

    pub(super) fn load_indexed(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let index = self.lo(operand_at(inst, 1)?)?;
        let mem = mem_at(inst)?;
        self.emit("ldy", index);
        if width == DataWidth::Word {
            self.emit("lda", format_args!("{},y", high_byte(&mem)));
            self.emit("sta", SCRATCH_REG);
            self.emit("lda", format_args!("{mem},y"));
            self.emit("ldy", SCRATCH_REG);
        } else {
            self.emit("lda", format_args!("{mem},y"));
        }
        self.set(reg, width)
    }

    pub(super) fn load_pointer_indexed(&mut self, inst: &Instruction) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let pointer = self.pointer(&mem_at(inst)?);
        let index = self.lo(operand_at(inst, 1)?)?;
        self.emit("ldy", index);
        self.emit("lda", format_args!("{pointer},y"));
        self.set(reg, DataWidth::Byte)
    }

    pub(super) fn load_indirect(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let address = operand_at(inst, 1)?;
        let word = width == DataWidth::Word;
        if let Some(mem) = self.absolute(address) {
            self.emit("lda", &mem);
            if word {
                self.emit("ldy", high_byte(&mem));
            }
        } else {
            self.address_to_scratch(address)?;
            let pointer = format!("({SCRATCH_W1}),y");
            if word {
                self.emit("ldy", "#1");
                self.emit("lda", &pointer);
                self.emit("sta", SCRATCH_REG);
                self.emit0("dey");
                self.emit("lda", &pointer);
                self.emit("ldy", SCRATCH_REG);
            } else {
                self.emit("ldy", "#0");
                self.emit("lda", &pointer);
            }
        }
        self.set(reg, width)
    }

    // --- stores

    pub(super) fn store_memory(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let mem = mem_at(inst)?;
        let value = self.stored_value(inst)?;
        let word = width == DataWidth::Word;
        if inst.opcode == Opcode::StoreZM {
            let zero = self.lo(&value)?;
            self.emit("lda", zero);
            self.emit("sta", &mem);
            if word {
                self.emit("sta", high_byte(&mem));
            }
            return Ok(());
        }
        self.load_value(&value, width)?;
        self.emit("sta", &mem);
        if word {
            self.emit("sty", high_byte(&mem));
        }
        Ok(())
    }

    pub(super) fn store_indexed(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let mem = mem_at(inst)?;
        let value = self.stored_value(inst)?;
        let index = if inst.opcode == Opcode::StoreZX { 0 } else { 1 };
        let index = self.lo(operand_at(inst, index)?)?;
        self.emit("ldy", index);
        let lo = self.lo(&value)?;
        self.emit("lda", lo);
        self.emit("sta", format_args!("{mem},y"));
        if width == DataWidth::Word {
            let hi = self.hi(&value)?;
            self.emit("lda", hi);
            self.emit("sta", format_args!("{},y", high_byte(&mem)));
        }
        Ok(())
    }

    pub(super) fn store_pointer_indexed(&mut self, inst: &Instruction) -> CodegenResult<()> {
        let pointer = self.pointer(&mem_at(inst)?);
        let index = self.lo(operand_at(inst, 1)?)?;
        let value = self.lo(operand_at(inst, 0)?)?;
        self.emit("ldy", index);
        self.emit("lda", value);
        self.emit("sta", format_args!("{pointer},y"));
        Ok(())
    }

    pub(super) fn store_indirect(&mut self, inst: &Instruction) -> CodegenResult<()> {
        let (value, address) = if inst.opcode == Opcode::StoreZI {
            (Operand::Imm(0), operand_at(inst, 0)?)
        } else {
            (operand_at(inst, 0)?.clone(), operand_at(inst, 1)?)
        };
        if let Some(mem) = self.absolute(address) {
            let value = self.lo(&value)?;
            self.emit("lda", value);
            self.emit("sta", mem);
        } else {
            self.address_to_scratch(address)?;
            let value = self.lo(&value)?;
            self.emit("ldy", "#0");
            self.emit("lda", value);
            self.emit("sta", format_args!("({SCRATCH_W1}),y"));
        }
        Ok(())
    }

    /// Returns the value stored by a store instruction; the zeroing stores store immediate zero.
    fn stored_value(&self, inst: &Instruction) -> CodegenResult<Operand> {
        match inst.opcode {
            Opcode::StoreZM | Opcode::StoreZX | Opcode::StoreZI => Ok(Operand::Imm(0)),
            _ => Ok(Operand::Reg(reg_at(inst, 0)?)),
        }
    }

    /// Returns the indirect operand of a pointer variable, copying it to the zero page first if it
    /// does not live there.
    fn pointer(&mut self, mem: &MemRef) -> String {
        let zero_page = match mem {
            MemRef::Address(address) => *address < 0x100,
            MemRef::Symbol { name, offset: 0 } => self.symbols.is_fast_storage(name),
            MemRef::Symbol { .. } => false,
        };
        if zero_page {
            return format!("({mem})");
        }
        self.emit("lda", mem);
        self.emit("ldy", high_byte(mem));
        self.emit("sta", SCRATCH_W1);
        self.emit("sty", format_args!("{SCRATCH_W1}+1"));
        format!("({SCRATCH_W1})")
    }

    /// Returns the absolute location of a constant address operand.
    fn absolute(&self, address: &Operand) -> Option<MemRef> {
        self.const_value(address).map(|value| MemRef::Address(value as u16))
    }

    fn address_to_scratch(&mut self, address: &Operand) -> CodegenResult<()> {
        self.load_value(address, DataWidth::Word)?;
        self.emit("sta", SCRATCH_W1);
        self.emit("sty", format_args!("{SCRATCH_W1}+1"));
        Ok(())
    }

    // --- register arithmetic

    pub(super) fn arithmetic(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let other = operand_at(inst, 1)?;
        let (carry, op) = alu(inst.opcode)
            .ok_or_else(|| CodegenError::assembly(format!("{} is not arithmetic", inst.opcode)))?;
        let target = Operand::Reg(reg);

        let lo = self.lo(&target)?;
        let other_lo = self.lo(other)?;
        self.emit("lda", lo);
        if let Some(carry) = carry {
            self.emit0(carry);
        }
        self.emit(op, other_lo);
        if width == DataWidth::Word {
            let hi = self.hi(&target)?;
            let other_hi = self.hi(other)?;
            self.emit0("pha");
            self.emit("lda", hi);
            self.emit(op, other_hi);
            self.emit0("tay");
            self.emit0("pla");
        }
        self.set(reg, width)
    }

    pub(super) fn multiply_divide(
        &mut self,
        inst: &Instruction,
        width: DataWidth,
    ) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let other = operand_at(inst, 1)?;
        let routine = muldiv_routine(inst.opcode, width)
            .ok_or_else(|| CodegenError::assembly(format!("{} is not a division", inst.opcode)))?;
        let remainder = matches!(inst.opcode, Opcode::Mod | Opcode::ModS);

        if width == DataWidth::Word {
            self.load_value(other, DataWidth::Word)?;
            self.emit("sta", SCRATCH_W1);
            self.emit("sty", format_args!("{SCRATCH_W1}+1"));
            self.load_value(&Operand::Reg(reg), DataWidth::Word)?;
            self.emit("jsr", routine);
            if remainder {
                self.emit("lda", SCRATCH_W2);
                self.emit("ldy", format_args!("{SCRATCH_W2}+1"));
            }
        } else {
            let value = self.lo(&Operand::Reg(reg))?;
            let other = self.lo(other)?;
            self.emit("lda", value);
            self.emit("ldy", other);
            self.emit("jsr", routine);
            if remainder {
                self.emit0("tya");
            }
        }
        self.set(reg, width)
    }

    pub(super) fn shift(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let count = operand_at(inst, 1)?;
        let shift = Shift::of(inst.opcode)
            .ok_or_else(|| CodegenError::assembly(format!("{} is not a shift", inst.opcode)))?;
        let value = Operand::Reg(reg);
        let word = width == DataWidth::Word;

        match self.const_value(count) {
            Some(n) if (0..bits(width)).contains(&n) => {
                if word {
                    let (lo, hi) = (self.lo(&value)?, self.hi(&value)?);
                    self.emit("lda", lo);
                    self.emit("sta", SCRATCH_W1);
                    self.emit("lda", hi);
                    self.emit("sta", format_args!("{SCRATCH_W1}+1"));
                    let w1 = MemRef::symbol(SCRATCH_W1);
                    for _ in 0..n {
                        self.shift_word_once(shift, &w1);
                    }
                    self.emit("lda", SCRATCH_W1);
                    self.emit("ldy", format_args!("{SCRATCH_W1}+1"));
                } else {
                    let lo = self.lo(&value)?;
                    self.emit("lda", lo);
                    for _ in 0..n {
                        match shift {
                            Shift::Left => self.emit("asl", "a"),
                            Shift::Right => self.emit("lsr", "a"),
                            Shift::RightSigned => {
                                self.emit("cmp", "#$80");
                                self.emit("ror", "a");
                            }
                        }
                    }
                }
            }
            _ => {
                let count = self.lo(count)?;
                self.emit("lda", count);
                self.emit("sta", SCRATCH_B1);
                self.load_value(&value, width)?;
                self.emit("jsr", shift.routine(width));
            }
        }
        self.set(reg, width)
    }

    fn shift_word_once(&mut self, shift: Shift, mem: &MemRef) {
        let hi = high_byte(mem);
        match shift {
            Shift::Left => {
                self.emit("asl", mem);
                self.emit("rol", hi);
            }
            Shift::Right => {
                self.emit("lsr", hi);
                self.emit("ror", mem);
            }
            Shift::RightSigned => {
                self.emit("lda", &hi);
                self.emit("asl", "a");
                self.emit("ror", hi);
                self.emit("ror", mem);
            }
        }
    }

    pub(super) fn unary(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let value = Operand::Reg(reg);
        let word = width == DataWidth::Word;
        match inst.opcode {
            Opcode::Neg => {
                let lo = self.lo(&value)?;
                self.emit("lda", "#0");
                self.emit0("sec");
                self.emit("sbc", lo);
                if word {
                    let hi = self.hi(&value)?;
                    self.emit0("pha");
                    self.emit("lda", "#0");
                    self.emit("sbc", hi);
                    self.emit0("tay");
                    self.emit0("pla");
                }
            }
            Opcode::Inv => {
                if word {
                    let hi = self.hi(&value)?;
                    self.emit("lda", hi);
                    self.emit("eor", "#$ff");
                    self.emit0("tay");
                }
                let lo = self.lo(&value)?;
                self.emit("lda", lo);
                self.emit("eor", "#$ff");
            }
            Opcode::Inc | Opcode::Dec => {
                let inc = inst.opcode == Opcode::Inc;
                if let RegLoc::Const(v) = self.reg_loc(reg)? {
                    let mask = if word { 0xffff } else { 0xff };
                    let v = if inc { v.wrapping_add(1) } else { v.wrapping_sub(1) };
                    self.regs.insert(reg, RegLoc::Const(v & mask));
                    return Ok(());
                }
                let lo = self.slot(reg, SlotByte::Lo)?;
                match (inc, word) {
                    (true, false) => self.emit("inc", lo),
                    (false, false) => self.emit("dec", lo),
                    (true, true) => {
                        let hi = self.slot(reg, SlotByte::Hi)?;
                        self.emit("inc", lo);
                        self.emit("bne", "+");
                        self.emit("inc", hi);
                        self.plus_label();
                    }
                    (false, true) => {
                        let hi = self.slot(reg, SlotByte::Hi)?;
                        self.emit("lda", &lo);
                        self.emit("bne", "+");
                        self.emit("dec", hi);
                        self.plus_label();
                        self.emit("dec", lo);
                    }
                }
                return Ok(());
            }
            Opcode::Rol | Opcode::Ror => {
                self.materialize(reg, width)?;
                let lo = self.slot(reg, SlotByte::Lo)?;
                let op = if inst.opcode == Opcode::Rol { "rol" } else { "ror" };
                if word {
                    let hi = self.slot(reg, SlotByte::Hi)?;
                    // the carry moves from the low byte up, or from the high byte down
                    if inst.opcode == Opcode::Rol {
                        self.emit(op, lo);
                        self.emit(op, hi);
                    } else {
                        self.emit(op, hi);
                        self.emit(op, lo);
                    }
                } else {
                    self.emit(op, lo);
                }
                return Ok(());
            }
            Opcode::Swap => {
                let (lo, hi) = (self.lo(&value)?, self.hi(&value)?);
                self.emit("lda", hi);
                self.emit("ldy", lo);
                return self.set(reg, DataWidth::Word);
            }
            Opcode::Ext | Opcode::ExtS => {
                let lo = self.lo(&value)?;
                self.emit("lda", lo);
                self.emit("ldy", "#0");
                if inst.opcode == Opcode::ExtS {
                    self.emit("cmp", "#$80");
                    self.emit("bcc", "+");
                    self.emit0("dey");
                    self.plus_label();
                }
                return self.set(reg, DataWidth::Word);
            }
            op => return Err(CodegenError::assembly(format!("{op} is not a unary operation"))),
        }
        self.set(reg, width)
    }

    // --- in-place memory arithmetic

    pub(super) fn in_place(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let mem = mem_at(inst)?;
        let hi = high_byte(&mem);
        let word = width == DataWidth::Word;
        match inst.opcode {
            Opcode::IncM => {
                self.emit("inc", &mem);
                if word {
                    self.emit("bne", "+");
                    self.emit("inc", hi);
                    self.plus_label();
                }
            }
            Opcode::DecM => {
                if word {
                    self.emit("lda", &mem);
                    self.emit("bne", "+");
                    self.emit("dec", hi);
                    self.plus_label();
                }
                self.emit("dec", &mem);
            }
            Opcode::NegM => {
                self.emit("lda", "#0");
                self.emit0("sec");
                self.emit("sbc", &mem);
                self.emit("sta", &mem);
                if word {
                    self.emit("lda", "#0");
                    self.emit("sbc", &hi);
                    self.emit("sta", hi);
                }
            }
            Opcode::MulM | Opcode::DivM | Opcode::DivSM => {
                let routine = muldiv_routine(inst.opcode, width).ok_or_else(|| {
                    CodegenError::assembly(format!("{} is not a division", inst.opcode))
                })?;
                let other = operand_at(inst, 0)?;
                if word {
                    self.load_value(other, DataWidth::Word)?;
                    self.emit("sta", SCRATCH_W1);
                    self.emit("sty", format_args!("{SCRATCH_W1}+1"));
                    self.emit("lda", &mem);
                    self.emit("ldy", &hi);
                } else {
                    let other = self.lo(other)?;
                    self.emit("lda", &mem);
                    self.emit("ldy", other);
                }
                self.emit("jsr", routine);
                self.emit("sta", &mem);
                if word {
                    self.emit("sty", hi);
                }
            }
            Opcode::LslM | Opcode::LsrM | Opcode::AsrM => {
                let shift = Shift::of(inst.opcode).ok_or_else(|| {
                    CodegenError::assembly(format!("{} is not a shift", inst.opcode))
                })?;
                let count = operand_at(inst, 0)?;
                match self.const_value(count) {
                    Some(n) if (0..bits(width)).contains(&n) => {
                        for _ in 0..n {
                            if word {
                                self.shift_word_once(shift, &mem);
                            } else {
                                match shift {
                                    Shift::Left => self.emit("asl", &mem),
                                    Shift::Right => self.emit("lsr", &mem),
                                    Shift::RightSigned => {
                                        self.emit("lda", &mem);
                                        self.emit("asl", "a");
                                        self.emit("ror", &mem);
                                    }
                                }
                            }
                        }
                    }
                    _ => {
                        let count = self.lo(count)?;
                        self.emit("lda", count);
                        self.emit("sta", SCRATCH_B1);
                        self.emit("lda", &mem);
                        if word {
                            self.emit("ldy", &hi);
                        }
                        self.emit("jsr", shift.routine(width));
                        self.emit("sta", &mem);
                        if word {
                            self.emit("sty", hi);
                        }
                    }
                }
            }
            opcode => {
                let (carry, op) = alu(opcode).ok_or_else(|| {
                    CodegenError::assembly(format!("{opcode} is not an in-place operation"))
                })?;
                let other = operand_at(inst, 0)?;
                let other_lo = self.lo(other)?;
                self.emit("lda", &mem);
                if let Some(carry) = carry {
                    self.emit0(carry);
                }
                self.emit(op, other_lo);
                self.emit("sta", &mem);
                if word {
                    let other_hi = self.hi(other)?;
                    self.emit("lda", &hi);
                    self.emit(op, other_hi);
                    self.emit("sta", hi);
                }
            }
        }
        Ok(())
    }

    // --- comparisons

    /// `r1 = r1 <cond> r2`, as 1 or 0.
    pub(super) fn compare_set(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let reg = reg_at(inst, 0)?;
        let other = operand_at(inst, 1)?;
        let (cond, signed) = condition_of(inst)?;
        let is_true = self.session.make_label("true");
        self.branch_if(cond, signed, width, &Operand::Reg(reg), other, &is_true)?;
        self.emit("lda", "#0");
        self.emit("beq", "+");
        self.define_label(&is_true);
        self.emit("lda", "#1");
        self.plus_label();
        self.set(reg, DataWidth::Byte)
    }

    /// `if r1 <cond> r2 goto label`.
    ///
    /// Slots still on the stack are dropped at the target, which must be reached with the same
    /// stack depth from every branch.
    pub(super) fn branch(&mut self, inst: &Instruction, width: DataWidth) -> CodegenResult<()> {
        let target = label_at(inst)?.to_string();
        let (cond, signed) = condition_of(inst)?;
        record_depth(&mut self.pending_pops, &target, self.stack.depth())?;
        let a = operand_at(inst, 0)?.clone();
        let b = operand_at(inst, 1)?.clone();
        self.branch_if(cond, signed, width, &a, &b, &target)
    }

    /// Emits a jump to `target` taken if `a <cond> b`.
    ///
    /// Unsigned byte comparisons and (in)equality use `cmp` directly. Other orderings call the
    /// runtime library, which leaves $ff, 0 or 1 in A for less, equal and greater.
    fn branch_if(
        &mut self,
        cond: Condition,
        signed: bool,
        width: DataWidth,
        a: &Operand,
        b: &Operand,
        target: &str,
    ) -> CodegenResult<()> {
        let word = width == DataWidth::Word;
        let equality = matches!(cond, Condition::Eq | Condition::Ne);
        let jump = if cond == Condition::Eq { "beq" } else { "bne" };

        if equality && word {
            let (a_lo, b_lo, a_hi, b_hi) = (self.lo(a)?, self.lo(b)?, self.hi(a)?, self.hi(b)?);
            self.emit("lda", a_lo);
            self.emit("cmp", b_lo);
            self.emit("bne", "+");
            self.emit("lda", a_hi);
            self.emit("cmp", b_hi);
            self.plus_label();
            self.emit(jump, target);
            return Ok(());
        }
        if equality || (!signed && !word) {
            let (a_lo, b_lo) = (self.lo(a)?, self.lo(b)?);
            self.emit("lda", a_lo);
            self.emit("cmp", b_lo);
            match cond {
                Condition::Eq | Condition::Ne => self.emit(jump, target),
                Condition::Lt => self.emit("bcc", target),
                Condition::Ge => self.emit("bcs", target),
                Condition::Gt => {
                    self.emit("beq", "+");
                    self.emit("bcs", target);
                    self.plus_label();
                }
                Condition::Le => {
                    self.emit("bcc", target);
                    self.emit("beq", target);
                }
            }
            return Ok(());
        }

        if word {
            self.load_value(b, DataWidth::Word)?;
            self.emit("sta", SCRATCH_W2);
            self.emit("sty", format_args!("{SCRATCH_W2}+1"));
            self.load_value(a, DataWidth::Word)?;
            self.emit("jsr", if signed { "math.compare_w" } else { "math.compare_uw" });
        } else {
            let (a_lo, b_lo) = (self.lo(a)?, self.lo(b)?);
            self.emit("lda", a_lo);
            self.emit("ldy", b_lo);
            self.emit("jsr", "math.compare_b");
        }
        let (value, jump) = match cond {
            Condition::Lt => ("#$ff", "beq"),
            Condition::Ge => ("#$ff", "bne"),
            Condition::Gt => ("#1", "beq"),
            Condition::Le => ("#1", "bne"),
            Condition::Eq | Condition::Ne => ("#0", jump),
        };
        self.emit("cmp", value);
        self.emit(jump, target);
        Ok(())
    }
}

fn condition_of(inst: &Instruction) -> CodegenResult<(Condition, bool)> {
    inst.opcode
        .condition()
        .ok_or_else(|| CodegenError::assembly(format!("{} has no condition", inst.opcode)))
}

/// Records the stack depth a label is branched to with.
fn record_depth(
    pending: &mut FxHashMap<String, usize>,
    label: &str,
    depth: usize,
) -> CodegenResult<()> {
    match pending.get(label) {
        Some(&recorded) if recorded != depth => Err(CodegenError::assembly(format!(
            "label {label} is reached with different evaluation stack depths"
        ))),
        Some(_) => Ok(()),
        None => {
            pending.insert(label.to_string(), depth);
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Chunk, CodegenSession, Machine, StaticSymbolTable, VReg, backend::native::immediate};
    use octet_interface::Pos;

    fn r(n: usize) -> Operand {
        Operand::Reg(VReg::from_usize(n))
    }

    fn sym(name: &str) -> Operand {
        Operand::Mem(MemRef::symbol(name))
    }

    fn encode(instructions: Vec<Instruction>) -> Vec<String> {
        let machine = Machine::c64();
        let symbols = StaticSymbolTable::new();
        let mut session = CodegenSession::new();
        let mut encoder = NativeEncoder::new(&mut session, &symbols, &machine);
        let chunk = Chunk { label: None, pos: Pos::dummy(), instructions };
        encoder.encode_chunks("main.start", &[chunk]).unwrap();
        encoder.finish()
    }

    #[test]
    fn immediates() {
        assert_eq!(immediate(-1, SlotByte::Lo), "#$ff");
        assert_eq!(immediate(0x1234, SlotByte::Hi), "#$12");
    }

    #[test]
    fn word_addition() {
        let lines = encode(vec![
            Instruction::new(Opcode::LoadM, DataWidth::Word, [r(0), sym("main.w")]),
            Instruction::new(Opcode::Add, DataWidth::Word, [r(0), Operand::Imm(0x0102)]),
            Instruction::new(Opcode::StoreM, DataWidth::Word, [r(0), sym("main.w")]),
        ]);
        assert_eq!(lines, [
            "\tlda  main.w",
            "\tldy  main.w+1",
            "\tsta  ESTACK_LO,x",
            "\ttya",
            "\tsta  ESTACK_HI,x",
            "\tdex",
            "\tlda  ESTACK_LO+1,x",
            "\tclc",
            "\tadc  #$02",
            "\tpha",
            "\tlda  ESTACK_HI+1,x",
            "\tadc  #$01",
            "\ttay",
            "\tpla",
            "\tsta  ESTACK_LO+1,x",
            "\ttya",
            "\tsta  ESTACK_HI+1,x",
            "\tinx",
            "\tlda  ESTACK_LO,x",
            "\tldy  ESTACK_HI,x",
            "\tsta  main.w",
            "\tsty  main.w+1",
        ]);
    }

    #[test]
    fn division_uses_runtime() {
        let lines = encode(vec![
            Instruction::new(Opcode::LoadM, DataWidth::Byte, [r(0), sym("main.x")]),
            Instruction::new(Opcode::Mod, DataWidth::Byte, [r(0), Operand::Imm(10)]),
            Instruction::new(Opcode::StoreM, DataWidth::Byte, [r(0), sym("main.x")]),
        ]);
        assert_eq!(&lines[3..8], [
            "\tlda  ESTACK_LO+1,x",
            "\tldy  #$0a",
            "\tjsr  math.divmod_ub",
            "\ttya",
            "\tsta  ESTACK_LO+1,x",
        ]);
    }

    #[test]
    fn shifts() {
        let lines = encode(vec![
            Instruction::new(Opcode::Load, DataWidth::Byte, [r(0), Operand::Imm(1)]),
            Instruction::new(Opcode::Lsl, DataWidth::Byte, [r(0), Operand::Imm(3)]),
            Instruction::new(Opcode::StoreM, DataWidth::Byte, [r(0), sym("main.x")]),
        ]);
        assert_eq!(&lines[..4], ["\tlda  #$01", "\tasl  a", "\tasl  a", "\tasl  a"]);

        let lines = encode(vec![
            Instruction::new(Opcode::LoadM, DataWidth::Byte, [r(1), sym("main.n")]),
            Instruction::new(Opcode::LsrM, DataWidth::Byte, [r(1), sym("main.x")]),
        ]);
        assert_eq!(lines, [
            "\tlda  main.n",
            "\tsta  ESTACK_LO,x",
            "\tdex",
            "\tinx",
            "\tlda  ESTACK_LO,x",
            "\tsta  ZP_SCRATCH_B1",
            "\tlda  main.x",
            "\tjsr  math.lsr_byte",
            "\tsta  main.x",
        ]);
    }

    #[test]
    fn set_on_compare() {
        let lines = encode(vec![
            Instruction::new(Opcode::LoadM, DataWidth::Byte, [r(0), sym("main.x")]),
            Instruction::new(Opcode::Slts, DataWidth::Byte, [r(0), Operand::Imm(5)]),
            Instruction::new(Opcode::StoreM, DataWidth::Byte, [r(0), sym("main.b")]),
        ]);
        assert_eq!(&lines[3..12], [
            "\tlda  ESTACK_LO+1,x",
            "\tldy  #$05",
            "\tjsr  math.compare_b",
            "\tcmp  #$ff",
            "\tbeq  octet_label_1_true",
            "\tlda  #0",
            "\tbeq  +",
            "octet_label_1_true",
            "\tlda  #1",
        ]);
    }

    #[test]
    fn conflicting_branch_depths() {
        let mut pending = FxHashMap::default();
        record_depth(&mut pending, "l", 1).unwrap();
        record_depth(&mut pending, "l", 1).unwrap();
        assert!(record_depth(&mut pending, "l", 2).is_err());
    }
}
