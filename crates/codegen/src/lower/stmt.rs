//! Statement lowering.

use super::{Lowerer, inst};
use crate::{
    Chunk, CodegenError, CodegenResult, DataWidth, Expr, Instruction, Opcode, Operand, Stmt,
    WhenChoice,
};
use octet_interface::Pos;

impl Lowerer<'_> {
    /// Lowers a statement to one or more chunks.
    ///
    /// Registers are allocated from scratch for every statement.
    pub fn lower_stmt(&mut self, stmt: &Stmt) -> CodegenResult<Vec<Chunk>> {
        self.session.registers().reset();
        let chunk = match stmt {
            Stmt::Assign(assignment) => self.lower_assignment(assignment)?,
            Stmt::Expr(expr) => self.lower_discarded(expr)?,
            Stmt::Call { name, pos } => {
                let mut chunk = Chunk::new(pos.clone());
                chunk.push(Instruction::untyped(Opcode::Call, [Operand::Label(name.clone())]));
                chunk
            }
            Stmt::Return { value, pos } => self.lower_return(value.as_ref(), pos)?,
            Stmt::When { subject, choices, else_body, pos } => {
                return self.lower_when(subject, choices, else_body, pos);
            }
            Stmt::Label { name, pos } => Chunk::labelled(self.qualify_label(name), pos.clone()),
            Stmt::Jump { target, pos } => {
                let mut chunk = Chunk::new(pos.clone());
                chunk.push(Instruction::untyped(Opcode::Jump, [Operand::Label(
                    self.qualify_label(target),
                )]));
                chunk
            }
        };
        Ok(vec![chunk])
    }

    /// Evaluates an expression whose value is not used.
    fn lower_discarded(&mut self, expr: &Expr) -> CodegenResult<Chunk> {
        if expr.ty.is_float() {
            let reg = self.next_fp_reg();
            self.lower_float_expr(expr, reg)
        } else {
            let reg = self.next_reg();
            self.lower_expr(expr, reg)
        }
    }

    fn lower_return(&mut self, value: Option<&Expr>, pos: &Pos) -> CodegenResult<Chunk> {
        let mut chunk = Chunk::new(pos.clone());
        match value {
            None => chunk.push(Instruction::untyped(Opcode::Return, [])),
            Some(value) if value.ty.is_float() => {
                let reg = self.next_fp_reg();
                chunk.append(self.lower_float_expr(value, reg)?);
                chunk.push(inst(Opcode::Return, DataWidth::Float, [reg.into()]));
            }
            Some(value) => {
                let reg = self.next_reg();
                chunk.append(self.lower_expr(value, reg)?);
                chunk.push(inst(Opcode::Return, DataWidth::of(value.ty), [reg.into()]));
            }
        }
        Ok(chunk)
    }

    /// Lowers a `when` statement.
    ///
    /// The subject is compared against every choice value in the first chunk, which falls through
    /// into the else branch. Each choice body follows under its own label, and all paths meet at
    /// a common end label.
    fn lower_when(
        &mut self,
        subject: &Expr,
        choices: &[WhenChoice],
        else_body: &[Stmt],
        pos: &Pos,
    ) -> CodegenResult<Vec<Chunk>> {
        if !subject.ty.is_integer() {
            return Err(CodegenError::assembly(format!(
                "when subject must be an integer, not {}",
                subject.ty
            )));
        }
        let width = DataWidth::of(subject.ty);
        let subject_reg = self.next_reg();
        let mut head = Chunk::new(pos.clone());
        head.append(self.lower_expr(subject, subject_reg)?);

        let end = self.session.make_label("when_end");
        let labels: Vec<String> =
            choices.iter().map(|_| self.session.make_label("choice")).collect();
        for (choice, label) in choices.iter().zip(&labels) {
            for value in &choice.values {
                let value = value.as_i64().ok_or_else(|| {
                    CodegenError::assembly(format!("when choice {value} is not an integer"))
                })?;
                head.push(inst(Opcode::Beq, width, [
                    subject_reg.into(),
                    Operand::Imm(value as i32),
                    Operand::Label(label.clone()),
                ]));
            }
        }

        let mut chunks = vec![head];
        for stmt in else_body {
            chunks.extend(self.lower_stmt(stmt)?);
        }
        chunks.push(jump(&end, pos));

        for (i, (choice, label)) in choices.iter().zip(labels).enumerate() {
            chunks.push(Chunk::labelled(label, pos.clone()));
            for stmt in &choice.body {
                chunks.extend(self.lower_stmt(stmt)?);
            }
            if i + 1 < choices.len() {
                chunks.push(jump(&end, pos));
            }
        }
        chunks.push(Chunk::labelled(end, pos.clone()));
        Ok(chunks)
    }
}

fn jump(label: &str, pos: &Pos) -> Chunk {
    let mut chunk = Chunk::new(pos.clone());
    chunk.push(Instruction::untyped(Opcode::Jump, [Operand::Label(label.to_string())]));
    chunk
}

#[cfg(test)]
mod tests {
    use crate::{
        AssignTarget, Assignment, CodegenSession, DataType, Expr, Lowerer, Machine,
        StaticSymbolTable, Stmt, Subroutine, Value, WhenChoice,
    };
    use octet_config::Opts;
    use octet_interface::{DiagCtxt, Pos};

    fn lower(sub: &Subroutine) -> String {
        let symbols = StaticSymbolTable::new();
        let machine = Machine::c64();
        let dcx = DiagCtxt::with_silent_emitter();
        let opts = Opts::default();
        let mut session = CodegenSession::new();
        let mut lowerer = Lowerer::new(&mut session, &symbols, &machine, &dcx, &opts);
        let routine = lowerer.lower_subroutine("main", sub).unwrap();
        routine.chunks.iter().map(ToString::to_string).collect()
    }

    fn set_x(value: u8) -> Stmt {
        Stmt::Assign(Assignment::new(
            AssignTarget::Ident("main.x".into()),
            Expr::number(Value::UByte(value), Pos::dummy()),
            Pos::dummy(),
        ))
    }

    #[test]
    fn labels_and_jumps() {
        let sub = Subroutine {
            name: "start".into(),
            body: vec![
                Stmt::Label { name: "again".into(), pos: Pos::dummy() },
                set_x(1),
                Stmt::Jump { target: "again".into(), pos: Pos::dummy() },
            ],
            pos: Pos::dummy(),
        };
        assert_eq!(
            lower(&sub),
            "main.start.again:\n    load.b r0,1\n    storem.b r0,main.x\n    jump main.start.again\n    return\n"
        );
    }

    #[test]
    fn when_statement() {
        let sub = Subroutine {
            name: "start".into(),
            body: vec![Stmt::When {
                subject: Expr::ident("main.y", DataType::UByte, Pos::dummy()),
                choices: vec![
                    WhenChoice { values: vec![Value::UByte(1), Value::UByte(2)], body: vec![set_x(1)] },
                    WhenChoice { values: vec![Value::UByte(3)], body: vec![set_x(2)] },
                ],
                else_body: vec![set_x(0)],
                pos: Pos::dummy(),
            }],
            pos: Pos::dummy(),
        };
        let expected = "\
    loadm.b r0,main.y
    beq.b r0,1,octet_label_2_choice
    beq.b r0,2,octet_label_2_choice
    beq.b r0,3,octet_label_3_choice
    storezm.b main.x
    jump octet_label_1_when_end
octet_label_2_choice:
    load.b r0,1
    storem.b r0,main.x
    jump octet_label_1_when_end
octet_label_3_choice:
    load.b r0,2
    storem.b r0,main.x
octet_label_1_when_end:
    return
";
        assert_eq!(lower(&sub), expected);
    }
}
