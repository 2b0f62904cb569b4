//! Native 6502 assembly encoder.
//!
//! Integer registers live in the evaluation stack, two 256-byte pages indexed by the X register.
//! A register gets its slot when it is first written; constants stay immediate operands until an
//! instruction needs them in memory. A register read for the last time while it is on top of the
//! stack is popped before the reading instruction, so that its slot is addressed as
//! `ESTACK_LO,x`. Whatever is left is dropped at the end of the chunk.
//!
//! Float registers are either an alias of a float in memory, which is never written through, or
//! their own 5-byte storage `octet_float_reg_N`.
//!
//! Multiplication, division, variable shifts and float arithmetic call into the runtime library
//! (`math.*`, `floats.*`), system calls into `sys.*`.

use crate::{
    Chunk, CodegenError, CodegenResult, CodegenSession, DataWidth, EvalStack, FpReg, Instruction,
    Machine, MemRef, Opcode, Operand, Routine, SlotByte, SymbolTable, Syscall, VReg,
};
use rustc_hash::FxHashMap;
use std::fmt;

mod float;
mod int;

/// Prefix of the storage of float registers.
pub const FLOAT_REG_PREFIX: &str = "octet_float_reg_";

/// Where the value of an integer register is.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RegLoc {
    /// A constant that has not been stored anywhere.
    Const(i32),
    /// A slot of the evaluation stack.
    Stack,
    /// The free slot above the stack, after the register was popped for its last use.
    Popped,
}

/// Where the value of a float register is.
#[derive(Clone, Debug, PartialEq, Eq)]
enum FpLoc {
    /// A float in memory, by its assembler name.
    Mem(String),
    /// The register's own storage.
    Own,
}

/// Encodes abstract instruction chunks as 6502 assembly lines for the 64tass assembler.
pub struct NativeEncoder<'a> {
    session: &'a mut CodegenSession,
    symbols: &'a dyn SymbolTable,
    machine: &'a Machine,
    lines: Vec<String>,
    /// Fully qualified name of the routine being encoded.
    routine: String,

    regs: FxHashMap<VReg, RegLoc>,
    fp_regs: FxHashMap<FpReg, FpLoc>,
    stack: EvalStack,
    /// Whether each `push` emitted code, so that the matching `pop` does too.
    saved: Vec<bool>,
    /// Index of the last instruction reading each register in the current chunk.
    last_use: FxHashMap<VReg, usize>,
    /// Evaluation stack slots to drop at labels that are branched to with live registers.
    pending_pops: FxHashMap<String, usize>,
    /// Whether control can fall through from the previous chunk.
    falls_through: bool,
    max_depth: usize,
}

impl<'a> NativeEncoder<'a> {
    /// Creates a new encoder.
    pub fn new(
        session: &'a mut CodegenSession,
        symbols: &'a dyn SymbolTable,
        machine: &'a Machine,
    ) -> Self {
        Self {
            session,
            symbols,
            machine,
            lines: Vec::new(),
            routine: String::new(),
            regs: FxHashMap::default(),
            fp_regs: FxHashMap::default(),
            stack: EvalStack::new(),
            saved: Vec::new(),
            last_use: FxHashMap::default(),
            pending_pops: FxHashMap::default(),
            falls_through: true,
            max_depth: 0,
        }
    }

    /// Encodes a routine as a `.proc` scope named after the last part of its name.
    #[instrument(level = "debug", skip_all, fields(routine = %routine.name))]
    pub fn encode_routine(&mut self, routine: &Routine) -> CodegenResult<()> {
        let local = routine.name.rsplit('.').next().unwrap_or(&routine.name);
        self.lines.push(format!("{local}\t.proc"));
        self.encode_chunks(&routine.name, &routine.chunks)?;
        self.lines.push("\t.pend".into());
        self.lines.push(String::new());
        Ok(())
    }

    /// Encodes chunks in the current scope.
    pub fn encode_chunks(&mut self, routine: &str, chunks: &[Chunk]) -> CodegenResult<()> {
        self.routine = routine.to_string();
        self.falls_through = true;
        for chunk in chunks {
            self.encode_chunk(chunk)?;
        }
        if let Some(label) = self.pending_pops.keys().next() {
            return Err(CodegenError::assembly(format!("branch to undefined label {label}")));
        }
        debug!(max_stack_depth = self.max_depth, "encoded");
        Ok(())
    }

    /// Appends a line that is not an instruction, such as a directive or a comment.
    pub fn raw(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Returns the lines emitted so far.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Returns the emitted lines.
    pub fn finish(self) -> Vec<String> {
        self.lines
    }

    fn encode_chunk(&mut self, chunk: &Chunk) -> CodegenResult<()> {
        if let Some(label) = &chunk.label {
            let local = self.local_label(label).to_string();
            self.lines.push(local);
            if let Some(depth) = self.pending_pops.remove(label) {
                if self.falls_through && depth > 0 {
                    return Err(CodegenError::assembly(format!(
                        "label {label} is reached with different evaluation stack depths"
                    )));
                }
                for _ in 0..depth {
                    self.emit0("inx");
                }
            }
            self.falls_through = true;
        }
        if chunk.is_empty() {
            return Ok(());
        }
        if !chunk.pos.is_dummy() {
            self.lines.push(format!("; src line: {}", chunk.pos));
        }

        self.begin_chunk(chunk);
        for (i, inst) in chunk.iter().enumerate() {
            self.pop_if_last_use(inst, i);
            self.encode(inst)?;
            self.regs.retain(|_, loc| *loc != RegLoc::Popped);
        }
        self.drop_stack();
        self.falls_through = !chunk
            .instructions
            .last()
            .is_some_and(|inst| matches!(inst.opcode, Opcode::Jump | Opcode::Return));
        Ok(())
    }

    fn begin_chunk(&mut self, chunk: &Chunk) {
        self.regs.clear();
        self.fp_regs.clear();
        self.stack.clear();
        self.saved.clear();
        self.last_use.clear();
        for (i, inst) in chunk.iter().enumerate() {
            for reg in inst.used_regs() {
                self.last_use.insert(reg, i);
            }
        }
    }

    /// Pops the register on top of the stack if `inst` reads it for the last time.
    ///
    /// Not done before control flow, which needs the same stack depth on every path, nor before
    /// instructions that push a new slot over the popped one.
    fn pop_if_last_use(&mut self, inst: &Instruction, index: usize) {
        let Some(top) = self.stack.top() else { return };
        if inst.opcode.is_control_flow()
            || self.last_use.get(&top) != Some(&index)
            || !inst.used_regs().contains(&top)
        {
            return;
        }
        if let Some(def) = self.defined_reg(inst)
            && (def == top || !self.stack.contains(def))
        {
            return;
        }
        self.emit0("inx");
        self.stack.pop();
        self.regs.insert(top, RegLoc::Popped);
    }

    /// Returns the register written by `inst`, including the result of a system call.
    fn defined_reg(&self, inst: &Instruction) -> Option<VReg> {
        match inst.opcode {
            Opcode::Syscall => syscall_of(inst)
                .and_then(Syscall::result_width)
                .map(|_| VReg::from_usize(0)),
            _ => inst.defined_reg(),
        }
    }

    fn encode(&mut self, inst: &Instruction) -> CodegenResult<()> {
        trace!(%inst, depth = self.stack.depth(), "encode");
        if inst.width == Some(DataWidth::Float) {
            return self.encode_float(inst);
        }
        let width = inst.width();
        match inst.opcode {
            Opcode::Load => self.load_immediate(inst, width),
            Opcode::LoadM => self.load_memory(inst, width),
            Opcode::LoadR => {
                let reg = reg_at(inst, 0)?;
                self.load_value(operand_at(inst, 1)?, width)?;
                self.set(reg, width)
            }
            Opcode::LoadX => self.load_indexed(inst, width),
            Opcode::LoadIx => self.load_pointer_indexed(inst),
            Opcode::LoadI => self.load_indirect(inst, width),
            Opcode::StoreM | Opcode::StoreZM => self.store_memory(inst, width),
            Opcode::StoreX | Opcode::StoreZX => self.store_indexed(inst, width),
            Opcode::StoreIx => self.store_pointer_indexed(inst),
            Opcode::StoreI | Opcode::StoreZI => self.store_indirect(inst),

            Opcode::Add | Opcode::Sub | Opcode::And | Opcode::Or | Opcode::Xor => {
                self.arithmetic(inst, width)
            }
            Opcode::Mul | Opcode::Div | Opcode::DivS | Opcode::Mod | Opcode::ModS => {
                self.multiply_divide(inst, width)
            }
            Opcode::Lsl | Opcode::Lsr | Opcode::Asr => self.shift(inst, width),
            Opcode::Neg
            | Opcode::Inv
            | Opcode::Inc
            | Opcode::Dec
            | Opcode::Rol
            | Opcode::Ror
            | Opcode::Swap
            | Opcode::Ext
            | Opcode::ExtS => self.unary(inst, width),
            Opcode::Concat => {
                let reg = reg_at(inst, 0)?;
                let lsb = self.lo(operand_at(inst, 2)?)?;
                let msb = self.lo(operand_at(inst, 1)?)?;
                self.emit("lda", lsb);
                self.emit("ldy", msb);
                self.set(reg, DataWidth::Word)
            }

            Opcode::AddM
            | Opcode::SubM
            | Opcode::MulM
            | Opcode::DivM
            | Opcode::DivSM
            | Opcode::AndM
            | Opcode::OrM
            | Opcode::XorM
            | Opcode::LslM
            | Opcode::LsrM
            | Opcode::AsrM
            | Opcode::NegM
            | Opcode::IncM
            | Opcode::DecM => self.in_place(inst, width),

            op if op.is_set() => self.compare_set(inst, width),
            op if op.is_branch() => self.branch(inst, width),

            Opcode::Jump => {
                let target = label_at(inst)?.to_string();
                self.drop_stack();
                self.emit("jmp", target);
                Ok(())
            }
            Opcode::Call => {
                let target = label_at(inst)?.to_string();
                self.emit("jsr", target);
                Ok(())
            }
            Opcode::Return => {
                if let Some(value) = inst.operands.first() {
                    self.load_value(value, width)?;
                }
                self.drop_stack();
                self.emit0("rts");
                Ok(())
            }
            Opcode::Syscall => self.syscall(inst),
            Opcode::Push => {
                let reg = reg_at(inst, 0)?;
                let defined = self.regs.contains_key(&reg);
                if defined {
                    let lo = self.lo(&Operand::Reg(reg))?;
                    self.emit("lda", lo);
                    self.emit0("pha");
                    if width == DataWidth::Word {
                        let hi = self.hi(&Operand::Reg(reg))?;
                        self.emit("lda", hi);
                        self.emit0("pha");
                    }
                }
                self.saved.push(defined);
                Ok(())
            }
            Opcode::Pop => {
                let reg = reg_at(inst, 0)?;
                if self.saved.pop() != Some(true) {
                    return Ok(());
                }
                if width == DataWidth::Word {
                    self.emit0("pla");
                    self.emit0("tay");
                }
                self.emit0("pla");
                self.set(reg, width)
            }
            Opcode::FtoUb | Opcode::FtoSb | Opcode::FtoUw | Opcode::FtoSw => {
                self.float_to_int(inst, width)
            }
            op => Err(CodegenError::assembly(format!("no native code for {op}.{}", width.suffix()))),
        }
    }

    fn syscall(&mut self, inst: &Instruction) -> CodegenResult<()> {
        let number = inst
            .imm()
            .ok_or_else(|| CodegenError::assembly("syscall without a number"))?;
        let args = &inst.operands[1..];
        if args.len() > 3 {
            return Err(CodegenError::assembly("a syscall takes at most 3 arguments"));
        }
        // the first argument goes in A and Y, the others in the scratch words
        let scratch = ["ZP_SCRATCH_W1", "ZP_SCRATCH_W2"];
        for (arg, zp) in args.iter().skip(1).zip(scratch) {
            self.load_value(arg, DataWidth::Word)?;
            self.emit("sta", zp);
            self.emit("sty", format_args!("{zp}+1"));
        }
        if let Some(arg) = args.first() {
            self.load_value(arg, DataWidth::Word)?;
        }
        match syscall_of(inst) {
            Some(syscall) => {
                self.emit("jsr", format_args!("sys.{}", <&str>::from(syscall)));
                if let Some(width) = syscall.result_width() {
                    self.set(VReg::from_usize(0), width)?;
                }
            }
            None => self.emit("jsr", format_args!("sys.syscall_{number}")),
        }
        Ok(())
    }

    // --- registers

    fn reg_loc(&self, reg: VReg) -> CodegenResult<RegLoc> {
        self.regs
            .get(&reg)
            .copied()
            .ok_or_else(|| CodegenError::assembly(format!("register {reg} used before it is set")))
    }

    /// Returns the address of a byte of the slot holding `reg`.
    fn slot(&self, reg: VReg, byte: SlotByte) -> CodegenResult<String> {
        match self.reg_loc(reg)? {
            RegLoc::Popped => Ok(EvalStack::address(0, byte)),
            RegLoc::Stack => self
                .stack
                .slot(reg, byte)
                .ok_or_else(|| CodegenError::assembly(format!("register {reg} lost its slot"))),
            RegLoc::Const(_) => {
                Err(CodegenError::assembly(format!("register {reg} has no slot")))
            }
        }
    }

    /// Returns the operand text of a byte of a register or immediate.
    fn byte_of(&self, operand: &Operand, byte: SlotByte) -> CodegenResult<String> {
        match operand {
            Operand::Imm(value) => Ok(immediate(*value, byte)),
            Operand::Reg(reg) => match self.reg_loc(*reg)? {
                RegLoc::Const(value) => Ok(immediate(value, byte)),
                _ => self.slot(*reg, byte),
            },
            other => Err(CodegenError::assembly(format!("{other} is not an integer value"))),
        }
    }

    fn lo(&self, operand: &Operand) -> CodegenResult<String> {
        self.byte_of(operand, SlotByte::Lo)
    }

    fn hi(&self, operand: &Operand) -> CodegenResult<String> {
        self.byte_of(operand, SlotByte::Hi)
    }

    /// Returns the value of a constant operand.
    fn const_value(&self, operand: &Operand) -> Option<i32> {
        match operand {
            Operand::Imm(value) => Some(*value),
            Operand::Reg(reg) => match self.regs.get(reg) {
                Some(RegLoc::Const(value)) => Some(*value),
                _ => None,
            },
            _ => None,
        }
    }

    /// Loads a value into A, and its high byte into Y for words.
    fn load_value(&mut self, operand: &Operand, width: DataWidth) -> CodegenResult<()> {
        let lo = self.lo(operand)?;
        self.emit("lda", lo);
        if width == DataWidth::Word {
            let hi = self.hi(operand)?;
            self.emit("ldy", hi);
        }
        Ok(())
    }

    /// Makes the value in A (and Y for the high byte of words) the value of `reg`, pushing a new
    /// slot if the register has none.
    fn set(&mut self, reg: VReg, width: DataWidth) -> CodegenResult<()> {
        let word = width == DataWidth::Word;
        if self.regs.get(&reg) == Some(&RegLoc::Stack) {
            let lo = self.slot(reg, SlotByte::Lo)?;
            self.emit("sta", lo);
            if word {
                let hi = self.slot(reg, SlotByte::Hi)?;
                self.emit0("tya");
                self.emit("sta", hi);
            }
            return Ok(());
        }
        self.emit("sta", EvalStack::address(0, SlotByte::Lo));
        if word {
            self.emit0("tya");
            self.emit("sta", EvalStack::address(0, SlotByte::Hi));
        }
        self.emit0("dex");
        self.stack.push(reg);
        self.max_depth = self.max_depth.max(self.stack.depth());
        self.regs.insert(reg, RegLoc::Stack);
        Ok(())
    }

    /// Gives a constant register a slot.
    fn materialize(&mut self, reg: VReg, width: DataWidth) -> CodegenResult<()> {
        if let RegLoc::Const(_) = self.reg_loc(reg)? {
            self.load_value(&Operand::Reg(reg), width)?;
            self.set(reg, width)?;
        }
        Ok(())
    }

    /// Drops all slots of the evaluation stack.
    fn drop_stack(&mut self) {
        for _ in 0..self.stack.depth() {
            self.emit0("inx");
        }
        self.stack.clear();
        self.regs.retain(|_, loc| matches!(loc, RegLoc::Const(_)));
    }

    /// Returns the name a label is defined with: local labels lose the routine prefix.
    fn local_label<'l>(&self, label: &'l str) -> &'l str {
        label
            .strip_prefix(self.routine.as_str())
            .and_then(|rest| rest.strip_prefix('.'))
            .unwrap_or(label)
    }

    // --- output

    fn emit(&mut self, mnemonic: &str, operand: impl fmt::Display) {
        self.lines.push(format!("\t{mnemonic}  {operand}"));
    }

    fn emit0(&mut self, mnemonic: &str) {
        self.lines.push(format!("\t{mnemonic}"));
    }

    /// Emits an anonymous forward label, the target of `+`.
    fn plus_label(&mut self) {
        self.lines.push("+".into());
    }

    fn define_label(&mut self, label: &str) {
        self.lines.push(label.to_string());
    }
}

/// Returns the immediate operand of a byte of `value`.
fn immediate(value: i32, byte: SlotByte) -> String {
    let shift = if byte == SlotByte::Hi { 8 } else { 0 };
    format!("#${:02x}", (value >> shift) & 0xff)
}

/// Returns the address expression of the byte after `mem`.
fn high_byte(mem: &MemRef) -> MemRef {
    mem.offset_by(1)
}

fn operand_at(inst: &Instruction, n: usize) -> CodegenResult<&Operand> {
    inst.operands
        .get(n)
        .ok_or_else(|| CodegenError::assembly(format!("missing operand {n} of {inst}")))
}

fn reg_at(inst: &Instruction, n: usize) -> CodegenResult<VReg> {
    match operand_at(inst, n)? {
        Operand::Reg(reg) => Ok(*reg),
        other => Err(CodegenError::assembly(format!("expected a register in {inst}, got {other}"))),
    }
}

fn fp_reg_at(inst: &Instruction, n: usize) -> CodegenResult<FpReg> {
    match operand_at(inst, n)? {
        Operand::FpReg(reg) => Ok(*reg),
        other => Err(CodegenError::assembly(format!(
            "expected a float register in {inst}, got {other}"
        ))),
    }
}

fn mem_at(inst: &Instruction) -> CodegenResult<MemRef> {
    inst.mem()
        .cloned()
        .ok_or_else(|| CodegenError::assembly(format!("missing memory operand of {inst}")))
}

fn label_at(inst: &Instruction) -> CodegenResult<&str> {
    inst.label().ok_or_else(|| CodegenError::assembly(format!("missing label of {inst}")))
}

fn syscall_of(inst: &Instruction) -> Option<Syscall> {
    inst.imm().and_then(|n| u8::try_from(n).ok()).and_then(Syscall::from_repr)
}
