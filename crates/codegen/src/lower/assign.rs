//! Assignment lowering.

use super::{Lowerer, expr::element_offset, inst};
use crate::{
    AssignTarget, Assignment, BinOp, Chunk, CodegenError, CodegenResult, DataType, DataWidth,
    Expr, ExprKind, MemRef, Opcode, Operand, PrefixOp,
};

impl Lowerer<'_> {
    /// Lowers an assignment.
    ///
    /// Augmentable assignments to variables and to constant addresses are done in place, as a
    /// read-modify-write of the target; everything else evaluates the value and stores it.
    #[instrument(level = "trace", skip_all, fields(pos = %assignment.pos))]
    pub fn lower_assignment(&mut self, assignment: &Assignment) -> CodegenResult<Chunk> {
        if let AssignTarget::MachineRegister(reg) = assignment.target {
            return Err(CodegenError::assembly(format!(
                "assignment to register {reg} is not supported"
            )));
        }
        if assignment.target.is_same_as(&assignment.value) {
            return self.lower_self_assignment(assignment);
        }
        let float = assignment.value.ty.is_float();
        if assignment.augmentable && (!float || self.opts.optimize_float_expressions) {
            self.lower_in_place(assignment)
        } else {
            self.lower_store(assignment)
        }
    }

    /// `x = x` is a no-op, except at a known I/O address where the read and the write both count.
    fn lower_self_assignment(&mut self, assignment: &Assignment) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(assignment.pos.clone());
        let address = match &assignment.target {
            AssignTarget::Ident(name) => match self.symbol_ref(name) {
                MemRef::Address(address) => Some(address),
                _ => None,
            },
            AssignTarget::Memory(address) => self.const_address(address)?,
            _ => None,
        };
        let Some(address) = address else { return Ok(code) };
        if !self.machine.is_io_address(address) {
            return Ok(code);
        }
        let ty = assignment.value.ty;
        let width = DataWidth::of(ty);
        let reg: Operand =
            if ty.is_float() { self.next_fp_reg().into() } else { self.next_reg().into() };
        let target = MemRef::Address(address);
        code.push(inst(Opcode::LoadM, width, [reg.clone(), target.clone().into()]));
        code.push(inst(Opcode::StoreM, width, [reg, target.into()]));
        Ok(code)
    }

    fn lower_in_place(&mut self, assignment: &Assignment) -> CodegenResult<Chunk> {
        match &assignment.target {
            AssignTarget::Ident(name) => {
                let target = self.symbol_ref(name);
                self.lower_in_place_at(target, assignment)
            }
            AssignTarget::Memory(address) => match self.const_address(address)? {
                Some(address) => self.lower_in_place_at(MemRef::Address(address), assignment),
                None => self.lower_in_place_fallback(assignment),
            },
            _ => self.lower_in_place_fallback(assignment),
        }
    }

    /// In-place modification of the memory at `target`.
    fn lower_in_place_at(
        &mut self,
        target: MemRef,
        assignment: &Assignment,
    ) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(assignment.pos.clone());
        let value = &assignment.value;
        let ty = value.ty;

        match &value.kind {
            ExprKind::Prefix(op, _) => code.append(self.lower_in_place_prefix(*op, ty, target)?),
            ExprKind::Binary(_, op, right) => {
                match self.lower_in_place_binary(*op, right, ty, target)? {
                    Some(chunk) => code.append(chunk),
                    None => return self.lower_in_place_fallback(assignment),
                }
            }
            _ => return self.lower_in_place_fallback(assignment),
        }
        Ok(code)
    }

    fn lower_in_place_prefix(
        &mut self,
        op: PrefixOp,
        ty: DataType,
        target: MemRef,
    ) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(Default::default());
        let width = DataWidth::of(ty);
        match op {
            PrefixOp::Plus => {}
            PrefixOp::Neg => code.push(inst(Opcode::NegM, width, [target.into()])),
            PrefixOp::Inv if ty.is_integer() => {
                let mask = if ty.is_byte() { 0xff } else { 0xffff };
                let reg = self.next_reg();
                code.push(inst(Opcode::Load, width, [reg.into(), Operand::Imm(mask)]));
                code.push(inst(Opcode::XorM, width, [reg.into(), target.into()]));
            }
            PrefixOp::Inv | PrefixOp::Not => {
                return Err(CodegenError::assembly(format!("weird prefix operator {op}")));
            }
        }
        Ok(code)
    }

    /// Returns `None` if the operator has no in-place form.
    fn lower_in_place_binary(
        &mut self,
        op: BinOp,
        operand: &Expr,
        ty: DataType,
        target: MemRef,
    ) -> CodegenResult<Option<Chunk>> {
        let mut code = Chunk::new(operand.pos.clone());
        let width = DataWidth::of(ty);
        let signed = ty.is_signed();

        if matches!(op, BinOp::Add | BinOp::Sub) && self.const_int(operand)? == Some(1) {
            let opcode = if op == BinOp::Add { Opcode::IncM } else { Opcode::DecM };
            code.push(inst(opcode, width, [target.into()]));
            return Ok(Some(code));
        }

        let opcode = match op {
            BinOp::Add => Opcode::AddM,
            BinOp::Sub => Opcode::SubM,
            BinOp::Mul => Opcode::MulM,
            BinOp::Div if signed => Opcode::DivSM,
            BinOp::Div => Opcode::DivM,
            BinOp::BitOr => Opcode::OrM,
            BinOp::BitAnd => Opcode::AndM,
            BinOp::BitXor => Opcode::XorM,
            BinOp::Shl => Opcode::LslM,
            BinOp::Shr if signed => Opcode::AsrM,
            BinOp::Shr => Opcode::LsrM,
            _ => return Ok(None),
        };
        if ty.is_float() {
            let reg = self.next_fp_reg();
            code.append(self.lower_float_expr(operand, reg)?);
            code.push(inst(opcode, width, [reg.into(), target.into()]));
        } else {
            let reg = self.next_reg();
            code.append(self.lower_expr(operand, reg)?);
            code.push(inst(opcode, width, [reg.into(), target.into()]));
        }
        Ok(Some(code))
    }

    fn lower_in_place_fallback(&mut self, assignment: &Assignment) -> CodegenResult<Chunk> {
        if self.opts.slow_codegen_warnings {
            self.dcx.warn("indirect code for in-place assignment", assignment.pos.clone());
        }
        self.lower_store(assignment)
    }

    /// Evaluates the value and stores it into the target.
    fn lower_store(&mut self, assignment: &Assignment) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(assignment.pos.clone());
        let value = &assignment.value;
        let width = DataWidth::of(value.ty);

        // a zero value is stored with the zeroing stores and needs no register
        let source: Option<Operand> = if self.is_zero(value)? {
            None
        } else if value.ty.is_float() {
            let reg = self.next_fp_reg();
            code.append(self.lower_float_expr(value, reg)?);
            Some(reg.into())
        } else if let ExprKind::MachineRegister(reg) = value.kind {
            Some(reg.into())
        } else {
            let reg = self.next_reg();
            code.append(self.lower_expr(value, reg)?);
            Some(reg.into())
        };

        match &assignment.target {
            AssignTarget::MachineRegister(_) => unreachable!("rejected before lowering"),
            AssignTarget::Ident(name) => {
                let target = self.symbol_ref(name);
                code.push(store(source, width, target));
            }
            AssignTarget::Array(indexer) if indexer.is_pointer() => {
                if !value.ty.is_byte() {
                    return Err(CodegenError::assembly("non-array var indexing requires bytes dt"));
                }
                if indexer.index.ty != DataType::UByte {
                    return Err(CodegenError::assembly(
                        "non-array var indexing requires bytes index",
                    ));
                }
                let variable = self.symbol_ref(&indexer.variable);
                let index = self.next_reg();
                code.append(self.lower_expr(&indexer.index, index)?);
                let source = match source {
                    Some(source) => source,
                    None => {
                        let zero = self.next_reg();
                        code.push(inst(Opcode::Load, DataWidth::Byte, [zero.into(), Operand::Imm(0)]));
                        zero.into()
                    }
                };
                code.push(inst(Opcode::StoreIx, DataWidth::Byte, [
                    source,
                    index.into(),
                    variable.into(),
                ]));
            }
            AssignTarget::Array(indexer) => {
                let variable = self.symbol_ref(&indexer.variable);
                if let Some(index) = self.const_int(&indexer.index)? {
                    let offset = element_offset(index, indexer.item_size())?;
                    code.push(store(source, width, variable.offset_by(offset)));
                } else {
                    let index = self.next_reg();
                    code.append(self.lower_index(indexer, index)?);
                    code.push(match source {
                        Some(source) => {
                            inst(Opcode::StoreX, width, [source, index.into(), variable.into()])
                        }
                        None => inst(Opcode::StoreZX, width, [index.into(), variable.into()]),
                    });
                }
            }
            AssignTarget::Memory(address) => {
                if let Some(address) = self.const_address(address)? {
                    code.push(store(source, DataWidth::Byte, MemRef::Address(address)));
                } else {
                    let address_reg = self.next_reg();
                    code.append(self.lower_expr(address, address_reg)?);
                    code.push(match source {
                        Some(source) => {
                            inst(Opcode::StoreI, DataWidth::Byte, [source, address_reg.into()])
                        }
                        None => inst(Opcode::StoreZI, DataWidth::Byte, [address_reg.into()]),
                    });
                }
            }
        }
        Ok(code)
    }
}

/// A store of `source` into `target`, or of zero if there is no source.
fn store(source: Option<Operand>, width: DataWidth, target: MemRef) -> crate::Instruction {
    match source {
        Some(source) => inst(Opcode::StoreM, width, [source, target.into()]),
        None => inst(Opcode::StoreZM, width, [target.into()]),
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        ArrayIndexer, AssignTarget, Assignment, BinOp, CodegenError, CodegenResult,
        CodegenSession, DataType, Expr, ExprKind, Lowerer, Machine, PrefixOp, StaticSymbolTable,
        StorageClass, Value,
    };
    use octet_config::Opts;
    use octet_interface::{
        DiagCtxt, Pos,
        diagnostics::{DiagBuffer, Level},
    };

    fn pos() -> Pos {
        Pos::new("test.oct", 3, 5)
    }

    fn num(value: Value) -> Expr {
        Expr::number(value, pos())
    }

    fn ubyte(name: &str) -> Expr {
        Expr::ident(name, DataType::UByte, pos())
    }

    /// Lowers one assignment, returning its instructions as text and the emitted diagnostics.
    fn try_lower(
        opts: &Opts,
        target: AssignTarget,
        value: Expr,
    ) -> (CodegenResult<Vec<String>>, DiagBuffer) {
        let symbols = StaticSymbolTable::new()
            .with("main.x", StorageClass::Memory, None)
            .with("main.border", StorageClass::MemoryMapped, Some(0xd020));
        let machine = Machine::c64();
        let (dcx, buffer) = DiagCtxt::with_buffer_emitter();
        let mut session = CodegenSession::new();
        let mut lowerer = Lowerer::new(&mut session, &symbols, &machine, &dcx, opts);
        let assignment = Assignment::new(target, value, pos());
        let lines = lowerer
            .lower_assignment(&assignment)
            .map(|chunk| chunk.iter().map(ToString::to_string).collect());
        (lines, buffer)
    }

    fn lower_with(opts: &Opts, target: AssignTarget, value: Expr) -> Vec<String> {
        try_lower(opts, target, value).0.unwrap()
    }

    fn lower(target: AssignTarget, value: Expr) -> Vec<String> {
        lower_with(&Opts::default(), target, value)
    }

    fn x() -> AssignTarget {
        AssignTarget::Ident("main.x".into())
    }

    #[test]
    fn in_place() {
        assert_eq!(lower(x(), Expr::binary(ubyte("main.x"), BinOp::Add, num(Value::UByte(1)))), [
            "incm.b main.x"
        ]);
        assert_eq!(lower(x(), Expr::binary(ubyte("main.x"), BinOp::Add, num(Value::UByte(5)))), [
            "load.b r0,5",
            "addm.b r0,main.x"
        ]);
        assert_eq!(lower(x(), Expr::prefix(PrefixOp::Inv, ubyte("main.x"))), [
            "load.b r0,255",
            "xorm.b r0,main.x"
        ]);
        let signed = Expr::ident("main.x", DataType::Byte, pos());
        assert_eq!(lower(x(), Expr::binary(signed, BinOp::Shr, num(Value::UByte(2)))), [
            "load.b r0,2",
            "asrm.b r0,main.x"
        ]);
    }

    #[test]
    fn self_assignment() {
        // target and value come from different columns of `x = x`
        let at = |col| Pos::new("test.oct", 1, col);
        let target = AssignTarget::Ident("main.x".into());
        assert!(lower(target, Expr::ident("main.x", DataType::UByte, at(5))).is_empty());

        let address = |value, col| Box::new(Expr::number(Value::UWord(value), at(col)));
        let memory = |value, col| Expr::memory(*address(value, col), at(col - 2));
        assert!(lower(AssignTarget::Memory(address(0xc000, 3)), memory(0xc000, 14)).is_empty());
        assert_eq!(lower(AssignTarget::Memory(address(0xd020, 3)), memory(0xd020, 14)), [
            "loadm.b r0,$d020",
            "storem.b r0,$d020"
        ]);

        // memory-mapped variables resolve to their address
        let border = AssignTarget::Ident("main.border".into());
        assert_eq!(lower(border, Expr::ident("main.border", DataType::UByte, at(10))), [
            "loadm.b r0,$d020",
            "storem.b r0,$d020"
        ]);

        let pointer = || Box::new(Expr::ident("main.p", DataType::UWord, at(3)));
        let through = Expr::memory(Expr::ident("main.p", DataType::UWord, at(12)), at(10));
        assert!(lower(AssignTarget::Memory(pointer()), through).is_empty());

        let element = |col| {
            let index = Expr::ident("main.i", DataType::UByte, at(col));
            ArrayIndexer::new("main.arr", DataType::ArrayUB, index)
        };
        let value = Expr::new(ExprKind::ArrayIndex(element(18)), DataType::UByte, at(14));
        assert!(lower(AssignTarget::Array(element(7)), value).is_empty());
    }

    #[test]
    fn float_self_assignment() {
        let f = |col| Expr::ident("main.x", DataType::Float, Pos::new("test.oct", 2, col));
        assert!(lower(x(), f(5)).is_empty());
        let opts = Opts { optimize_float_expressions: true, ..Default::default() };
        assert!(lower_with(&opts, x(), f(5)).is_empty());
    }

    #[test]
    fn memory_in_place() {
        let at = |col| Pos::new("test.oct", 4, col);
        let target = AssignTarget::Memory(Box::new(Expr::number(Value::UWord(0xc000), at(3))));
        let read = Expr::memory(Expr::number(Value::UWord(0xc000), at(14)), at(12));
        let value = Expr::binary(read, BinOp::Add, Expr::number(Value::UByte(1), at(22)));
        assert_eq!(lower(target, value), ["incm.b $c000"]);
    }

    #[test]
    fn in_place_negation() {
        let signed = || Expr::ident("main.x", DataType::Byte, pos());
        let negate = || lower(x(), Expr::prefix(PrefixOp::Neg, signed()));
        assert_eq!(negate(), ["negm.b main.x"]);
        // negating twice in place leaves the value unchanged
        let twice = [negate(), negate()].concat();
        assert_eq!(twice, ["negm.b main.x", "negm.b main.x"]);
        for v in [i8::MIN, -1, 0, 1, i8::MAX] {
            assert_eq!(Value::Byte(v).neg().and_then(Value::neg).unwrap(), Value::Byte(v));
        }

        let float = Expr::prefix(PrefixOp::Neg, Expr::ident("main.x", DataType::Float, pos()));
        let opts = Opts { optimize_float_expressions: true, ..Default::default() };
        assert_eq!(lower_with(&opts, x(), float), ["negm.f main.x"]);
    }

    #[test]
    fn slow_in_place_warning() {
        let element = || ArrayIndexer::new("main.arr", DataType::ArrayUB, ubyte("main.i"));
        let read = Expr::new(ExprKind::ArrayIndex(element()), DataType::UByte, pos());
        let value = || Expr::binary(read.clone(), BinOp::Add, num(Value::UByte(3)));

        let opts = Opts { slow_codegen_warnings: true, ..Default::default() };
        let (lines, buffer) = try_lower(&opts, AssignTarget::Array(element()), value());
        assert!(lines.unwrap().last().unwrap().starts_with("storex.b"));
        assert_eq!(buffer.messages(Level::Warning), ["indirect code for in-place assignment"]);

        let (_, buffer) = try_lower(&Opts::default(), AssignTarget::Array(element()), value());
        assert!(buffer.is_empty());

        let pointer = Box::new(Expr::ident("main.p", DataType::UWord, pos()));
        let through = Expr::memory(Expr::ident("main.p", DataType::UWord, pos()), pos());
        let value = Expr::binary(through, BinOp::BitOr, num(Value::UByte(0x80)));
        let (_, buffer) = try_lower(&opts, AssignTarget::Memory(pointer), value);
        assert_eq!(buffer.messages(Level::Warning), ["indirect code for in-place assignment"]);
    }

    #[test]
    fn stores() {
        assert_eq!(lower(x(), num(Value::UByte(0))), ["storezm.b main.x"]);
        assert_eq!(lower(x(), num(Value::UWord(0x1234))), [
            "load.w r0,4660",
            "storem.w r0,main.x"
        ]);

        let words = |index| AssignTarget::Array(ArrayIndexer::new("main.w", DataType::ArrayUW, index));
        assert_eq!(lower(words(num(Value::UByte(3))), num(Value::UWord(7))), [
            "load.w r0,7",
            "storem.w r0,main.w+6"
        ]);
        assert_eq!(lower(words(ubyte("main.i")), num(Value::UWord(0))), [
            "loadm.b r0,main.i",
            "load.b r1,2",
            "mul.b r0,r1",
            "storezx.w r0,main.w"
        ]);

        let memory = AssignTarget::Memory(Box::new(Expr::ident("main.p", DataType::UWord, pos())));
        assert_eq!(lower(memory, num(Value::UByte(0))), ["loadm.w r0,main.p", "storezi.b r0"]);
    }

    #[test]
    fn pointer_indexing() {
        let ptr = AssignTarget::Array(ArrayIndexer::new("main.p", DataType::UWord, ubyte("main.i")));
        assert_eq!(lower(ptr, num(Value::UByte(0))), [
            "loadm.b r0,main.i",
            "load.b r1,0",
            "storeix.b r1,r0,main.p"
        ]);
    }

    #[test]
    fn pointer_indexing_errors() {
        let assembly = |result: CodegenResult<Vec<String>>| match result {
            Err(CodegenError::Assembly(msg)) => msg,
            other => panic!("expected an assembly error, got {other:?}"),
        };
        let ptr = |index| AssignTarget::Array(ArrayIndexer::new("main.p", DataType::UWord, index));

        let (result, _) = try_lower(&Opts::default(), ptr(ubyte("main.i")), num(Value::UWord(300)));
        assert_eq!(assembly(result), "non-array var indexing requires bytes dt");

        let index = Expr::ident("main.i", DataType::UWord, pos());
        let (result, _) = try_lower(&Opts::default(), ptr(index), num(Value::UByte(1)));
        assert_eq!(assembly(result), "non-array var indexing requires bytes index");
    }

    #[test]
    fn float_in_place_needs_opt_in() {
        let f = || Expr::ident("main.x", DataType::Float, pos());
        let value = || Expr::binary(f(), BinOp::Mul, num(Value::Float(2.0)));
        assert_eq!(lower(x(), value()), [
            "loadm.f fr0,main.x",
            "load.f fr1,2.0",
            "mul.f fr0,fr1",
            "storem.f fr0,main.x"
        ]);
        let opts = Opts { optimize_float_expressions: true, ..Default::default() };
        assert_eq!(lower_with(&opts, x(), value()), ["load.f fr0,2.0", "mulm.f fr0,main.x"]);
    }

    #[test]
    fn machine_register_value() {
        let r = crate::VReg::from_usize(4);
        let value = Expr::new(ExprKind::MachineRegister(r), DataType::UByte, pos());
        assert_eq!(lower(x(), value), ["storem.b r4,main.x"]);
    }
}
