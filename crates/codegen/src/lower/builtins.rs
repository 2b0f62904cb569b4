//! Builtin function calls expanded inline.

use super::{Lowerer, inst};
use crate::{
    BuiltinFn, Chunk, CodegenError, CodegenResult, DataWidth, Expr, Instruction, MemRef, Opcode,
    Operand, Syscall, VReg,
};
use octet_interface::Pos;

impl Lowerer<'_> {
    pub(super) fn lower_builtin(
        &mut self,
        func: BuiltinFn,
        args: &[Expr],
        result: VReg,
        pos: &Pos,
    ) -> CodegenResult<Chunk> {
        let mut code = Chunk::new(pos.clone());
        match (func, args) {
            (BuiltinFn::Syscall, [number]) => {
                let number = self.syscall_number(number)?;
                code.push(Instruction::untyped(Opcode::Syscall, [number]));
            }
            (BuiltinFn::Syscall1 | BuiltinFn::Syscall2 | BuiltinFn::Syscall3, [number, rest @ ..])
                if rest.len() == syscall_arity(func) =>
            {
                let number = self.syscall_number(number)?;
                let arg_regs: Vec<VReg> = (0..rest.len()).map(VReg::from_usize).collect();

                // the argument registers may hold values of the enclosing expression
                for &reg in &arg_regs {
                    code.push(inst(Opcode::Push, DataWidth::Word, [reg.into()]));
                }
                if let Some(&last) = arg_regs.last() {
                    self.session.registers().reserve_until(last);
                }
                for (arg, &reg) in rest.iter().zip(&arg_regs) {
                    code.append(self.lower_expr(arg, reg)?);
                }
                let operands = std::iter::once(number).chain(arg_regs.iter().map(|&r| r.into()));
                code.push(Instruction::untyped(Opcode::Syscall, operands));
                for &reg in arg_regs.iter().rev() {
                    code.push(inst(Opcode::Pop, DataWidth::Word, [reg.into()]));
                }
            }
            (BuiltinFn::Msb, [arg]) => {
                code.append(self.lower_expr(arg, result)?);
                code.push(inst(Opcode::Swap, DataWidth::Byte, [result.into()]));
            }
            (BuiltinFn::Lsb, [arg]) => code.append(self.lower_expr(arg, result)?),
            (BuiltinFn::Rnd, []) => {
                code.push(Instruction::untyped(Opcode::Syscall, [Operand::Imm(
                    Syscall::Rnd.number().into(),
                )]));
                let r0 = VReg::from_usize(0);
                if result != r0 {
                    code.push(inst(Opcode::LoadR, DataWidth::Byte, [result.into(), r0.into()]));
                }
            }
            (BuiltinFn::Peek | BuiltinFn::Peekw, [address]) => {
                let width = if func == BuiltinFn::Peek { DataWidth::Byte } else { DataWidth::Word };
                if let Some(address) = self.const_address(address)? {
                    code.push(inst(Opcode::LoadM, width, [
                        result.into(),
                        MemRef::Address(address).into(),
                    ]));
                } else {
                    let address_reg = self.next_reg();
                    code.append(self.lower_expr(address, address_reg)?);
                    code.push(inst(Opcode::LoadI, width, [result.into(), address_reg.into()]));
                }
            }
            (BuiltinFn::Mkword, [msb, lsb]) => {
                let (msb_reg, lsb_reg) = (self.next_reg(), self.next_reg());
                code.append(self.lower_expr(msb, msb_reg)?);
                code.append(self.lower_expr(lsb, lsb_reg)?);
                code.push(inst(Opcode::Concat, DataWidth::Byte, [
                    result.into(),
                    msb_reg.into(),
                    lsb_reg.into(),
                ]));
            }
            _ => {
                return Err(CodegenError::assembly(format!(
                    "wrong number of arguments for builtin {func}: {}",
                    args.len()
                )));
            }
        }
        Ok(code)
    }

    fn syscall_number(&self, number: &Expr) -> CodegenResult<Operand> {
        match self.const_int(number)? {
            Some(n @ 0..=255) => Ok(Operand::Imm(n as i32)),
            _ => Err(CodegenError::assembly("syscall number must be a constant byte")),
        }
    }
}

fn syscall_arity(func: BuiltinFn) -> usize {
    match func {
        BuiltinFn::Syscall1 => 1,
        BuiltinFn::Syscall2 => 2,
        BuiltinFn::Syscall3 => 3,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        BuiltinFn, CodegenSession, DataType, Expr, ExprKind, Lowerer, Machine, StaticSymbolTable,
        Value, VReg,
    };
    use octet_config::Opts;
    use octet_interface::{DiagCtxt, Pos};

    fn call(func: BuiltinFn, args: Vec<Expr>, ty: DataType) -> Expr {
        Expr::new(ExprKind::Builtin(func, args), ty, Pos::dummy())
    }

    fn num(value: Value) -> Expr {
        Expr::number(value, Pos::dummy())
    }

    fn lower(expr: &Expr, result: usize) -> Vec<String> {
        let symbols = StaticSymbolTable::new();
        let machine = Machine::c64();
        let dcx = DiagCtxt::with_silent_emitter();
        let opts = Opts::default();
        let mut session = CodegenSession::new();
        session.registers().reserve_until(VReg::from_usize(result));
        let mut lowerer = Lowerer::new(&mut session, &symbols, &machine, &dcx, &opts);
        let chunk = lowerer.lower_expr(expr, VReg::from_usize(result)).unwrap();
        chunk.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn syscalls() {
        let e = call(BuiltinFn::Syscall, vec![num(Value::UByte(0))], DataType::UByte);
        assert_eq!(lower(&e, 0), ["syscall 0"]);

        let word = Expr::ident("main.w", DataType::UWord, Pos::dummy());
        let e = call(
            BuiltinFn::Syscall2,
            vec![num(Value::UByte(6)), word, num(Value::UByte(1))],
            DataType::UByte,
        );
        assert_eq!(lower(&e, 0), [
            "push.w r0",
            "push.w r1",
            "loadm.w r0,main.w",
            "load.b r1,1",
            "syscall 6,r0,r1",
            "pop.w r1",
            "pop.w r0",
        ]);
    }

    #[test]
    fn byte_access() {
        let word = || Expr::ident("main.w", DataType::UWord, Pos::dummy());
        assert_eq!(lower(&call(BuiltinFn::Msb, vec![word()], DataType::UByte), 0), [
            "loadm.w r0,main.w",
            "swap.b r0",
        ]);
        assert_eq!(lower(&call(BuiltinFn::Peek, vec![num(Value::UWord(0xd020))], DataType::UByte), 0), [
            "loadm.b r0,$d020"
        ]);
        assert_eq!(lower(&call(BuiltinFn::Peekw, vec![word()], DataType::UWord), 0), [
            "loadm.w r1,main.w",
            "loadi.w r0,r1",
        ]);
        assert_eq!(lower(&call(BuiltinFn::Rnd, vec![], DataType::UByte), 2), [
            "syscall 7",
            "loadr.b r2,r0"
        ]);
    }
}
