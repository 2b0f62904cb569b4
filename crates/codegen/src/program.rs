//! Whole-program code generation.

use crate::{
    Block, CodegenError, CodegenResult, CodegenSession, IrProgram, IrVariable, Lowerer, Machine,
    Mflpt5, NativeEncoder, PeepholeOptimizer, Program, Routine, StorageClass, SymbolTable, Value,
    VarDecl, VmEncoder, VmProgram, backend::native::FLOAT_REG_PREFIX, lower::ENTRYPOINT,
};
use octet_config::{Backend, Launcher, Opts, OutputType};
use octet_interface::{DiagCtxt, VERSION};

/// Label at the end of the native program.
const PROGRAM_END: &str = "octet_program_end";

/// The result of generating a program.
#[derive(Clone, Debug, PartialEq)]
pub enum Output {
    /// Assembly source lines for the 64tass cross-assembler.
    Asm(Vec<String>),
    Ir(IrProgram),
    Vm(VmProgram),
}

impl Output {
    /// Returns the assembly lines of native output.
    pub fn as_asm(&self) -> Option<&[String]> {
        match self {
            Self::Asm(lines) => Some(lines),
            _ => None,
        }
    }

    /// Returns the program of IR output.
    pub fn as_ir(&self) -> Option<&IrProgram> {
        match self {
            Self::Ir(program) => Some(program),
            _ => None,
        }
    }

    /// Returns the program of VM output.
    pub fn as_vm(&self) -> Option<&VmProgram> {
        match self {
            Self::Vm(program) => Some(program),
            _ => None,
        }
    }
}

/// Lowers a whole program and encodes it with the backend selected in the options.
pub struct ProgramGen<'a> {
    program: &'a Program,
    symbols: &'a dyn SymbolTable,
    machine: &'a Machine,
    dcx: &'a DiagCtxt,
    opts: &'a Opts,
    session: CodegenSession,
}

/// The lowered routines of a block.
struct LoweredBlock<'p> {
    block: &'p Block,
    init_vars: Option<Routine>,
    routines: Vec<Routine>,
}

impl<'a> ProgramGen<'a> {
    /// Creates a new program generator.
    pub fn new(
        program: &'a Program,
        symbols: &'a dyn SymbolTable,
        machine: &'a Machine,
        dcx: &'a DiagCtxt,
        opts: &'a Opts,
    ) -> Self {
        Self { program, symbols, machine, dcx, opts, session: CodegenSession::new() }
    }

    /// Generates the program.
    ///
    /// Errors reported to the diagnostics context during generation fail the whole program.
    #[instrument(
        name = "generate",
        level = "debug",
        skip_all,
        fields(program = %self.program.name, backend = %self.opts.backend)
    )]
    pub fn generate(&mut self) -> CodegenResult<Output> {
        self.session.reset();
        if self.program.blocks.first().is_none_or(|block| block.name != "main") {
            return Err(CodegenError::assembly("first block should be 'main'"));
        }

        let (blocks, entry) = self.lower()?;
        let output = match self.opts.backend {
            Backend::Native => Output::Asm(self.native(&blocks, &entry)?),
            Backend::Ir => Output::Ir(self.ir(&blocks, entry)),
            Backend::Vm => Output::Vm(self.vm(&blocks, &entry)?),
        };
        self.dcx.has_errors()?;
        Ok(output)
    }

    fn lower(&mut self) -> CodegenResult<(Vec<LoweredBlock<'a>>, Routine)> {
        let program = self.program;
        let mut lowerer =
            Lowerer::new(&mut self.session, self.symbols, self.machine, self.dcx, self.opts);
        let mut blocks = Vec::with_capacity(program.blocks.len());
        for block in &program.blocks {
            let init_vars = if self.opts.reinit_globals() {
                lowerer.lower_var_inits(block)?
            } else {
                None
            };
            let routines = block
                .subroutines
                .iter()
                .map(|sub| lowerer.lower_subroutine(&block.name, sub))
                .collect::<CodegenResult<Vec<_>>>()?;
            blocks.push(LoweredBlock { block, init_vars, routines });
        }

        let inits: Vec<&str> = blocks
            .iter()
            .filter_map(|lowered| lowered.init_vars.as_ref())
            .map(|routine| routine.name.as_str())
            .collect();
        let entry = lowerer.lower_entrypoint(&inits, program.pos.clone());
        debug!(blocks = blocks.len(), init_routines = inits.len(), "lowered program");
        Ok((blocks, entry))
    }

    fn native(
        &mut self,
        blocks: &[LoweredBlock<'_>],
        entry: &Routine,
    ) -> CodegenResult<Vec<String>> {
        let header = self.native_header();
        let block_lines: Vec<_> =
            blocks.iter().map(|lowered| self.block_header(lowered.block)).collect();

        let mut encoder = NativeEncoder::new(&mut self.session, self.symbols, self.machine);
        for line in header {
            encoder.raw(line);
        }
        encoder.raw(format!("{ENTRYPOINT}\t; assembly code starts here"));
        encoder.raw("\tldx  #$ff\t; init estack pointer");
        encoder.encode_chunks(ENTRYPOINT, &entry.chunks)?;
        encoder.raw("");

        for (lowered, lines) in blocks.iter().zip(block_lines) {
            for line in lines {
                encoder.raw(line);
            }
            encoder.raw("; subroutines in this block");
            if let Some(init_vars) = &lowered.init_vars {
                encoder.encode_routine(init_vars)?;
            }
            for routine in &lowered.routines {
                encoder.encode_routine(routine)?;
            }
            encoder.raw("\t.pend");
            encoder.raw("");
        }
        let mut lines = encoder.finish();

        lines.extend(self.session.footer_lines());
        lines.extend(
            (0..self.session.registers().high_water_mark_float())
                .map(|n| format!("{FLOAT_REG_PREFIX}{n}\t.fill  5")),
        );
        lines.push(format!("{PROGRAM_END}\t; end of program label"));

        if self.opts.optimize {
            let removed = PeepholeOptimizer::optimize(&mut lines);
            debug!(removed, lines = lines.len(), "optimized assembly");
        }
        Ok(lines)
    }

    fn native_header(&self) -> Vec<String> {
        let program = self.program;
        let opts = self.opts;
        let scratch = self.machine.scratch();
        let mut lines = vec![
            format!("; {} assembly code for '{}'", self.machine.cpu(), program.name),
            format!("; generated by octet-codegen {VERSION}"),
            "; assembler syntax is for the 64tass cross-assembler".to_string(),
            format!("; output options: output={} launcher={}", opts.output, opts.launcher),
            String::new(),
            format!(".cpu  '{}'", self.machine.cpu()),
            ".enc  'none'".to_string(),
            String::new(),
            format!("ZP_SCRATCH_B1 = ${:02x}", scratch.b1),
            format!("ZP_SCRATCH_REG = ${:02x}", scratch.reg),
            format!("ZP_SCRATCH_W1 = ${:02x}", scratch.w1),
            format!("ZP_SCRATCH_W2 = ${:02x}", scratch.w2),
            format!("ESTACK_LO = ${:04x}", self.machine.estack_lo()),
            format!("ESTACK_HI = ${:04x}", self.machine.estack_hi()),
            String::new(),
        ];

        let basic = self.machine.basic_load_address();
        let load_address = match (opts.load_address, opts.output, opts.launcher) {
            (Some(address), ..) => address,
            (None, OutputType::Prg, Launcher::Basic) => basic,
            (None, ..) => self.machine.raw_load_address(),
        };
        match (opts.output, opts.launcher) {
            (OutputType::Raw, _) => {
                lines.push("; ---- raw assembler program ----".into());
                lines.push(format!("* = ${load_address:04x}"));
            }
            (OutputType::Prg, Launcher::Basic) => {
                if load_address != basic {
                    self.dcx.err(
                        format!("BASIC output must have load address ${basic:04x}"),
                        program.pos.clone(),
                    );
                }
                lines.push("; ---- basic program with sys call ----".into());
                lines.push(format!("* = ${load_address:04x}"));
                lines.push("\t.word  (+), 10".into());
                lines.push(format!(
                    "\t.null  $9e, format(' %d ', {ENTRYPOINT}), $3a, $8f, ' octet'"
                ));
                lines.push("+\t.word  0".into());
            }
            (OutputType::Prg, Launcher::None) => {
                lines.push("; ---- program without basic sys call ----".into());
                lines.push(format!("* = ${load_address:04x}"));
            }
        }
        lines.push(String::new());
        lines
    }

    /// Returns the lines opening a block scope: its address and its variables.
    fn block_header(&self, block: &Block) -> Vec<String> {
        let mut lines = vec![format!("; ---- block: '{}' ----", block.name)];
        if let Some(address) = block.address {
            lines.push(format!(
                "\t.cerror * > ${address:04x}, \"block address overlaps by \", \
                 *-${address:04x}, \" bytes\""
            ));
            lines.push(format!("* = ${address:04x}"));
        }
        lines.push(format!("{}\t.proc", block.name));
        lines.push(String::new());
        for var in &block.vars {
            let qualified = format!("{}.{}", block.name, var.name);
            let class = self.symbols.storage_class(&qualified);
            if class == Some(StorageClass::Constant) {
                continue;
            }
            let fixed = matches!(class, Some(StorageClass::MemoryMapped | StorageClass::ZeroPage));
            match self.symbols.resolve(&qualified) {
                Some(address) if fixed => lines.push(format!("{} = ${address:04x}", var.name)),
                _ => lines.push(self.var_storage(var)),
            }
        }
        lines.push(String::new());
        lines
    }

    /// Returns the line reserving the storage of a variable.
    fn var_storage(&self, var: &VarDecl) -> String {
        // Re-initialized variables get their value at program start.
        let init = var.init.filter(|_| !self.opts.reinit_globals());
        let data = match init {
            Some(Value::UByte(v)) => format!(".byte  ${v:02x}"),
            Some(Value::Byte(v)) => format!(".char  {v}"),
            Some(Value::UWord(v)) => format!(".word  ${v:04x}"),
            Some(Value::Word(v)) => format!(".sint  {v}"),
            Some(Value::Float(v)) => match Mflpt5::from_f64(v) {
                Ok(encoded) => format!(".byte  {encoded}  ; float {v:?}"),
                Err(err) => {
                    self.dcx.err(err.to_string(), var.pos.clone());
                    format!(".fill  {}", var.storage_size())
                }
            },
            Some(Value::Str(_) | Value::Array(..)) | None => {
                format!(".fill  {}", var.storage_size())
            }
        };
        format!("{}\t{data}", var.name)
    }

    fn ir(&self, blocks: &[LoweredBlock<'_>], entry: Routine) -> IrProgram {
        let mut program = IrProgram::new(self.program.name.clone());
        for lowered in blocks {
            for var in &lowered.block.vars {
                let name = format!("{}.{}", lowered.block.name, var.name);
                if self.symbols.storage_class(&name) == Some(StorageClass::Constant) {
                    continue;
                }
                program.variables.push(IrVariable {
                    address: self.symbols.resolve(&name),
                    name,
                    ty: var.ty,
                    size: var.storage_size(),
                    init: var.init,
                });
            }
        }
        program.routines.push(entry);
        for lowered in blocks {
            program.routines.extend(lowered.init_vars.iter().cloned());
            program.routines.extend(lowered.routines.iter().cloned());
        }
        debug!(instructions = program.instruction_count(), "IR program");
        program
    }

    fn vm(&self, blocks: &[LoweredBlock<'_>], entry: &Routine) -> CodegenResult<VmProgram> {
        let mut encoder = VmEncoder::new(self.symbols);
        for lowered in blocks {
            for var in &lowered.block.vars {
                let name = format!("{}.{}", lowered.block.name, var.name);
                if self.symbols.storage_class(&name) == Some(StorageClass::Constant) {
                    continue;
                }
                encoder.allocate(&name, var.storage_size(), var.init)?;
            }
        }
        encoder.add_routine(entry);
        for lowered in blocks {
            if let Some(init_vars) = &lowered.init_vars {
                encoder.add_routine(init_vars);
            }
            for routine in &lowered.routines {
                encoder.add_routine(routine);
            }
        }
        encoder.finish(&self.program.name, ENTRYPOINT)
    }
}
