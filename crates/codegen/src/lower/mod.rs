//! Lowering from the program tree to abstract instruction chunks.
//!
//! Each statement becomes one or more [`Chunk`]s. Register allocation starts over at every
//! statement, so registers never live across chunk boundaries.

use crate::{
    AssignTarget, Assignment, Block, Chunk, CodegenError, CodegenResult, CodegenSession,
    DataWidth, Expr, FpReg, Instruction, Machine, MemRef, Opcode, Operand, Routine, StorageClass,
    Stmt, Subroutine, SymbolTable, VReg,
};
use octet_config::Opts;
use octet_interface::{DiagCtxt, Pos};

mod assign;
mod builtins;
mod expr;
mod fold;
mod stmt;

pub use fold::fold_constant;

/// Name of the routine that re-initializes the variables of a block.
pub const INIT_VARS_ROUTINE: &str = "init_vars";

/// Name of the program entry routine.
pub const ENTRYPOINT: &str = "octet_entrypoint";

/// Lowers the program tree to abstract instruction chunks.
///
/// This is the explicit context of lowering: the session with its register pool, the symbol table,
/// the target machine, the diagnostics context and the options.
pub struct Lowerer<'a> {
    session: &'a mut CodegenSession,
    symbols: &'a dyn SymbolTable,
    machine: &'a Machine,
    dcx: &'a DiagCtxt,
    opts: &'a Opts,
    /// Fully qualified name of the routine being lowered.
    routine: String,
}

impl<'a> Lowerer<'a> {
    /// Creates a new lowerer.
    pub fn new(
        session: &'a mut CodegenSession,
        symbols: &'a dyn SymbolTable,
        machine: &'a Machine,
        dcx: &'a DiagCtxt,
        opts: &'a Opts,
    ) -> Self {
        Self { session, symbols, machine, dcx, opts, routine: String::new() }
    }

    /// Returns the session.
    #[inline]
    pub fn session(&mut self) -> &mut CodegenSession {
        self.session
    }

    /// Sets the routine that labels are qualified with.
    pub fn enter_routine(&mut self, name: impl Into<String>) {
        self.routine = name.into();
    }

    /// Lowers a subroutine of `block`.
    #[instrument(level = "debug", skip_all, fields(block = %block, sub = %sub.name))]
    pub fn lower_subroutine(&mut self, block: &str, sub: &Subroutine) -> CodegenResult<Routine> {
        let name = format!("{block}.{}", sub.name);
        self.enter_routine(name.clone());

        let mut chunks = Vec::new();
        for stmt in &sub.body {
            chunks.extend(self.lower_stmt(stmt)?);
        }
        if !matches!(sub.body.last(), Some(Stmt::Return { .. })) {
            let mut ret = Chunk::new(sub.pos.clone());
            ret.push(Instruction::untyped(Opcode::Return, []));
            chunks.push(ret);
        }
        debug!(chunks = chunks.len(), "lowered subroutine");
        Ok(Routine { name, chunks })
    }

    /// Lowers the routine assigning the initial values of the variables of `block`.
    ///
    /// Returns `None` if no variable has an initial value.
    pub fn lower_var_inits(&mut self, block: &Block) -> CodegenResult<Option<Routine>> {
        if !block.has_initializers() {
            return Ok(None);
        }
        let name = format!("{}.{INIT_VARS_ROUTINE}", block.name);
        self.enter_routine(name.clone());

        let mut chunks = Vec::new();
        for var in &block.vars {
            let Some(init) = var.init else { continue };
            if !init.ty().is_numeric() {
                return Err(CodegenError::assembly(format!(
                    "variable {} can only be initialized with a number",
                    var.name
                )));
            }
            self.session.registers().reset();
            let assignment = Assignment::new(
                AssignTarget::Ident(format!("{}.{}", block.name, var.name)),
                Expr::number(init, var.pos.clone()),
                var.pos.clone(),
            );
            chunks.push(self.lower_assignment(&assignment)?);
        }
        let mut ret = Chunk::new(block.pos.clone());
        ret.push(Instruction::untyped(Opcode::Return, []));
        chunks.push(ret);
        Ok(Some(Routine { name, chunks }))
    }

    /// Lowers the program entry: variable initialization followed by a jump to `main.start`.
    pub fn lower_entrypoint(&mut self, init_routines: &[&str], pos: Pos) -> Routine {
        let mut chunk = Chunk::new(pos);
        for routine in init_routines {
            chunk.push(Instruction::untyped(Opcode::Call, [Operand::Label(routine.to_string())]));
        }
        chunk.push(Instruction::untyped(Opcode::Jump, [Operand::Label("main.start".into())]));
        Routine { name: ENTRYPOINT.into(), chunks: vec![chunk] }
    }

    fn next_reg(&mut self) -> VReg {
        self.session.registers().next_free()
    }

    fn next_fp_reg(&mut self) -> FpReg {
        self.session.registers().next_free_float()
    }

    /// Qualifies a label that is local to the current routine.
    fn qualify_label(&self, label: &str) -> String {
        format!("{}.{label}", self.routine)
    }

    /// Returns the memory operand for a symbol, or for the symbol's fixed address if it is
    /// memory-mapped.
    fn symbol_ref(&self, name: &str) -> MemRef {
        match (self.symbols.storage_class(name), self.symbols.resolve(name)) {
            (Some(StorageClass::MemoryMapped), Some(address)) => MemRef::Address(address),
            _ => MemRef::symbol(name),
        }
    }
}

/// Shorthand for an instruction with a width.
fn inst<const N: usize>(opcode: Opcode, width: DataWidth, operands: [Operand; N]) -> Instruction {
    Instruction::new(opcode, width, operands)
}
