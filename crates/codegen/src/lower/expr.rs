//! Expression lowering.

use super::{Lowerer, fold_constant, inst};
use crate::{
    ArrayIndexer, BinOp, Chunk, CodegenError, CodegenResult, DataType, DataWidth, Expr, ExprKind,
    FpReg, MemRef, Opcode, Operand, PrefixOp, VReg, Value,
};

impl Lowerer<'_> {
    /// Lowers an integer expression so that its value ends up in `result`.
    pub fn lower_expr(&mut self, expr: &Expr, result: VReg) -> CodegenResult<Chunk> {
        if expr.ty.is_float() {
            return Err(CodegenError::assembly("float expression evaluated into an integer register"));
        }
        let mut code = Chunk::new(expr.pos.clone());
        let width = DataWidth::of(expr.ty);

        if let Some(value) = fold_constant(expr)? {
            let imm = immediate(&value)?;
            code.push(inst(Opcode::Load, width, [result.into(), imm]));
            return Ok(code);
        }

        match &expr.kind {
            ExprKind::Number(_) => unreachable!("numbers are folded"),
            ExprKind::Ident(name) => {
                code.push(inst(Opcode::LoadM, width, [result.into(), self.symbol_ref(name).into()]));
            }
            ExprKind::MachineRegister(reg) => {
                if *reg != result {
                    code.push(inst(Opcode::LoadR, width, [result.into(), (*reg).into()]));
                }
            }
            ExprKind::Memory(address) => {
                if let Some(address) = self.const_address(address)? {
                    code.push(inst(Opcode::LoadM, DataWidth::Byte, [
                        result.into(),
                        MemRef::Address(address).into(),
                    ]));
                } else {
                    let address_reg = self.next_reg();
                    code.append(self.lower_expr(address, address_reg)?);
                    code.push(inst(Opcode::LoadI, DataWidth::Byte, [
                        result.into(),
                        address_reg.into(),
                    ]));
                }
            }
            ExprKind::ArrayIndex(indexer) => {
                code.append(self.lower_array_read(indexer, Operand::Reg(result))?);
            }
            ExprKind::Prefix(op, operand) => {
                if *op == PrefixOp::Not {
                    code.append(self.lower_bool(operand, result)?);
                    code.push(inst(Opcode::Seq, DataWidth::Byte, [result.into(), Operand::Imm(0)]));
                } else {
                    code.append(self.lower_expr(operand, result)?);
                    match op {
                        PrefixOp::Neg => code.push(inst(Opcode::Neg, width, [result.into()])),
                        PrefixOp::Inv => code.push(inst(Opcode::Inv, width, [result.into()])),
                        PrefixOp::Plus | PrefixOp::Not => {}
                    }
                }
            }
            ExprKind::Binary(left, op, right) => {
                code.append(self.lower_binary(left, *op, right, result)?);
            }
            ExprKind::Cast(operand) => code.append(self.lower_cast(operand, expr.ty, result)?),
            ExprKind::Builtin(func, args) => {
                code.append(self.lower_builtin(*func, args, result, &expr.pos)?);
            }
        }
        Ok(code)
    }

    /// Lowers a float expression so that its value ends up in `result`.
    pub fn lower_float_expr(&mut self, expr: &Expr, result: FpReg) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(expr.pos.clone());
        if let Some(value) = fold_constant(expr)? {
            let value = value
                .as_f64()
                .ok_or_else(|| CodegenError::assembly(format!("{value} is not a number")))?;
            code.push(inst(Opcode::Load, DataWidth::Float, [result.into(), Operand::FpImm(value)]));
            return Ok(code);
        }

        match &expr.kind {
            ExprKind::Ident(name) => code.push(inst(Opcode::LoadM, DataWidth::Float, [
                result.into(),
                self.symbol_ref(name).into(),
            ])),
            ExprKind::ArrayIndex(indexer) => {
                code.append(self.lower_array_read(indexer, Operand::FpReg(result))?);
            }
            ExprKind::Prefix(PrefixOp::Plus, operand) => {
                code.append(self.lower_float_expr(operand, result)?);
            }
            ExprKind::Prefix(PrefixOp::Neg, operand) => {
                code.append(self.lower_float_expr(operand, result)?);
                code.push(inst(Opcode::Neg, DataWidth::Float, [result.into()]));
            }
            ExprKind::Binary(left, op, right) => {
                let opcode = match op {
                    BinOp::Add => Opcode::Add,
                    BinOp::Sub => Opcode::Sub,
                    BinOp::Mul => Opcode::Mul,
                    BinOp::Div => Opcode::Div,
                    _ => {
                        return Err(CodegenError::assembly(format!(
                            "operator {op} not supported on floats"
                        )));
                    }
                };
                code.append(self.lower_float_expr(left, result)?);
                let other = self.next_fp_reg();
                code.append(self.lower_float_expr(right, other)?);
                code.push(inst(opcode, DataWidth::Float, [result.into(), other.into()]));
            }
            ExprKind::Cast(operand) if operand.ty.is_float() => {
                code.append(self.lower_float_expr(operand, result)?);
            }
            ExprKind::Cast(operand) => {
                let opcode = match operand.ty {
                    DataType::UByte => Opcode::FfromUb,
                    DataType::Byte => Opcode::FfromSb,
                    DataType::UWord => Opcode::FfromUw,
                    DataType::Word => Opcode::FfromSw,
                    ty => return Err(CodegenError::assembly(format!("cannot convert {ty} to float"))),
                };
                let reg = self.next_reg();
                code.append(self.lower_expr(operand, reg)?);
                code.push(inst(opcode, DataWidth::Float, [result.into(), reg.into()]));
            }
            _ => {
                return Err(CodegenError::assembly(format!(
                    "no float code for expression at {}",
                    expr.pos
                )));
            }
        }
        Ok(code)
    }

    /// Lowers `expr` into `result` as a boolean: 1 if it is nonzero, 0 otherwise.
    pub(super) fn lower_bool(&mut self, expr: &Expr, result: VReg) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(expr.pos.clone());
        if expr.ty.is_float() {
            let value = self.next_fp_reg();
            let zero = self.next_fp_reg();
            code.append(self.lower_float_expr(expr, value)?);
            code.push(inst(Opcode::Load, DataWidth::Float, [zero.into(), Operand::FpImm(0.0)]));
            code.push(inst(Opcode::FComp, DataWidth::Float, [
                result.into(),
                value.into(),
                zero.into(),
            ]));
            code.push(inst(Opcode::Sne, DataWidth::Byte, [result.into(), Operand::Imm(0)]));
        } else {
            code.append(self.lower_expr(expr, result)?);
            code.push(inst(Opcode::Sne, DataWidth::of(expr.ty), [result.into(), Operand::Imm(0)]));
        }
        Ok(code)
    }

    fn lower_binary(
        &mut self,
        left: &Expr,
        op: BinOp,
        right: &Expr,
        result: VReg,
    ) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(left.pos.clone());

        if op.is_logical() {
            let other = self.next_reg();
            code.append(self.lower_bool(left, result)?);
            code.append(self.lower_bool(right, other)?);
            let opcode = match op {
                BinOp::And => Opcode::And,
                BinOp::Or => Opcode::Or,
                _ => Opcode::Xor,
            };
            code.push(inst(opcode, DataWidth::Byte, [result.into(), other.into()]));
            return Ok(code);
        }

        if left.ty.is_float() {
            if !op.is_comparison() {
                return Err(CodegenError::assembly("float arithmetic into an integer register"));
            }
            let (a, b) = (self.next_fp_reg(), self.next_fp_reg());
            code.append(self.lower_float_expr(left, a)?);
            code.append(self.lower_float_expr(right, b)?);
            code.push(inst(Opcode::FComp, DataWidth::Float, [result.into(), a.into(), b.into()]));
            // the comparison result is a signed byte: -1, 0 or 1
            let opcode = set_opcode(op, true);
            code.push(inst(opcode, DataWidth::Byte, [result.into(), Operand::Imm(0)]));
            return Ok(code);
        }

        let width = DataWidth::of(left.ty);
        let signed = left.ty.is_signed();
        code.append(self.lower_expr(left, result)?);

        if matches!(op, BinOp::Add | BinOp::Sub) && self.const_int(right)? == Some(1) {
            let opcode = if op == BinOp::Add { Opcode::Inc } else { Opcode::Dec };
            code.push(inst(opcode, width, [result.into()]));
            return Ok(code);
        }

        let other = self.next_reg();
        code.append(self.lower_expr(right, other)?);
        let opcode = match op {
            BinOp::Add => Opcode::Add,
            BinOp::Sub => Opcode::Sub,
            BinOp::Mul => Opcode::Mul,
            BinOp::Div if signed => Opcode::DivS,
            BinOp::Div => Opcode::Div,
            BinOp::Rem if signed => Opcode::ModS,
            BinOp::Rem => Opcode::Mod,
            BinOp::BitAnd => Opcode::And,
            BinOp::BitOr => Opcode::Or,
            BinOp::BitXor => Opcode::Xor,
            BinOp::Shl => Opcode::Lsl,
            BinOp::Shr if signed => Opcode::Asr,
            BinOp::Shr => Opcode::Lsr,
            _ => set_opcode(op, signed),
        };
        code.push(inst(opcode, width, [result.into(), other.into()]));
        Ok(code)
    }

    fn lower_cast(&mut self, operand: &Expr, to: DataType, result: VReg) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(operand.pos.clone());
        let from = operand.ty;
        if from.is_float() {
            let opcode = match to {
                DataType::UByte => Opcode::FtoUb,
                DataType::Byte => Opcode::FtoSb,
                DataType::UWord => Opcode::FtoUw,
                DataType::Word => Opcode::FtoSw,
                ty => return Err(CodegenError::assembly(format!("cannot convert float to {ty}"))),
            };
            let fp = self.next_fp_reg();
            code.append(self.lower_float_expr(operand, fp)?);
            code.push(inst(opcode, DataWidth::of(to), [result.into(), fp.into()]));
            return Ok(code);
        }

        code.append(self.lower_expr(operand, result)?);
        if from.is_byte() && !to.is_byte() {
            let opcode = if from.is_signed() { Opcode::ExtS } else { Opcode::Ext };
            code.push(inst(opcode, DataWidth::Word, [result.into()]));
        }
        Ok(code)
    }

    /// Lowers a read of an array element or of a byte through a pointer variable into `result`,
    /// which is an integer or float register.
    fn lower_array_read(&mut self, indexer: &ArrayIndexer, result: Operand) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(indexer.index.pos.clone());
        let variable = self.symbol_ref(&indexer.variable);
        let width = DataWidth::of(indexer.element_type());

        if indexer.is_pointer() {
            let index_reg = self.next_reg();
            code.append(self.lower_expr(&indexer.index, index_reg)?);
            code.push(inst(Opcode::LoadIx, DataWidth::Byte, [
                result,
                index_reg.into(),
                variable.into(),
            ]));
        } else if let Some(index) = self.const_int(&indexer.index)? {
            let offset = element_offset(index, indexer.item_size())?;
            code.push(inst(Opcode::LoadM, width, [result, variable.offset_by(offset).into()]));
        } else {
            let index_reg = self.next_reg();
            code.append(self.lower_index(indexer, index_reg)?);
            code.push(inst(Opcode::LoadX, width, [result, index_reg.into(), variable.into()]));
        }
        Ok(code)
    }

    /// Lowers the byte offset of an array element into `result`: the index times the element size.
    pub(super) fn lower_index(
        &mut self,
        indexer: &ArrayIndexer,
        result: VReg,
    ) -> CodegenResult<Chunk> {
        let item_size = indexer.item_size();
        if item_size == 1 {
            return self.lower_expr(&indexer.index, result);
        }
        let index = (*indexer.index).clone();
        let size = Value::wrapping(index.ty, item_size as i64)?;
        let pos = index.pos.clone();
        let offset = Expr::binary(index, BinOp::Mul, Expr::number(size, pos));
        self.lower_expr(&offset, result)
    }

    /// Returns the value of `expr` if it is an integer constant.
    pub(super) fn const_int(&self, expr: &Expr) -> CodegenResult<Option<i64>> {
        Ok(fold_constant(expr)?.and_then(|v| v.as_i64()))
    }

    /// Returns `true` if `expr` is the constant zero.
    pub(super) fn is_zero(&self, expr: &Expr) -> CodegenResult<bool> {
        Ok(fold_constant(expr)?.is_some_and(|v| v.is_zero()))
    }

    /// Returns the address of a memory access if it is constant.
    pub(super) fn const_address(&self, address: &Expr) -> CodegenResult<Option<u16>> {
        match self.const_int(address)? {
            Some(address) => u16::try_from(address).map(Some).map_err(|_| {
                CodegenError::assembly(format!("address {address} out of range"))
            }),
            None => Ok(None),
        }
    }
}

/// Returns the comparison opcode for a comparison operator.
fn set_opcode(op: BinOp, signed: bool) -> Opcode {
    match (op, signed) {
        (BinOp::Eq, _) => Opcode::Seq,
        (BinOp::Ne, _) => Opcode::Sne,
        (BinOp::Lt, false) => Opcode::Slt,
        (BinOp::Lt, true) => Opcode::Slts,
        (BinOp::Le, false) => Opcode::Sle,
        (BinOp::Le, true) => Opcode::Sles,
        (BinOp::Gt, false) => Opcode::Sgt,
        (BinOp::Gt, true) => Opcode::Sgts,
        (BinOp::Ge, false) => Opcode::Sge,
        (BinOp::Ge, true) => Opcode::Sges,
        _ => unreachable!("not a comparison: {op}"),
    }
}

/// Returns the immediate operand for a constant integer.
fn immediate(value: &Value) -> CodegenResult<Operand> {
    value
        .as_i64()
        .map(|v| Operand::Imm(v as i32))
        .ok_or_else(|| CodegenError::assembly(format!("cannot load {value} into a register")))
}

/// Returns the byte offset of element `index`.
pub(super) fn element_offset(index: i64, item_size: usize) -> CodegenResult<u16> {
    u16::try_from(index * item_size as i64)
        .map_err(|_| CodegenError::assembly(format!("array index {index} out of range")))
}
