//! State shared by all code generation of one program.

use crate::{Machine, Mflpt5, NumericResult, RegisterPool};
use rustc_hash::FxHashMap;

/// A float constant emitted at the end of the program.
#[derive(Clone, Debug, PartialEq)]
pub struct FloatConst {
    pub name: String,
    pub value: f64,
    pub encoded: Mflpt5,
}

/// Code generation state for one program.
///
/// Owns the register pool, the table of float constants and the counter for generated labels.
/// Nothing in here is global; a session is created per program.
#[derive(Debug, Default)]
pub struct CodegenSession {
    registers: RegisterPool,
    float_consts: Vec<FloatConst>,
    /// Index into `float_consts` by the bits of the value.
    float_const_index: FxHashMap<u64, usize>,
    label_counter: u32,
}

impl CodegenSession {
    /// Creates a new session.
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn registers(&mut self) -> &mut RegisterPool {
        &mut self.registers
    }

    /// Returns the assembler name of a memory location holding `value`.
    ///
    /// Values available in the machine's ROM use the ROM constant; all others are added to the
    /// program's constant table once.
    pub fn float_const(&mut self, machine: &Machine, value: f64) -> NumericResult<String> {
        let encoded = Mflpt5::from_f64(value)?;
        if let Some(name) = machine.rom_float(value, encoded) {
            return Ok(name.to_string());
        }

        let key = value.to_bits();
        if let Some(&index) = self.float_const_index.get(&key) {
            return Ok(self.float_consts[index].name.clone());
        }
        let name = format!("octet_float_const_{}", self.float_consts.len() + 1);
        trace!(%name, value, "new float constant");
        self.float_const_index.insert(key, self.float_consts.len());
        self.float_consts.push(FloatConst { name: name.clone(), value, encoded });
        Ok(name)
    }

    /// Returns the float constants in the order they were created.
    pub fn float_consts(&self) -> &[FloatConst] {
        &self.float_consts
    }

    /// Returns a new, unique label name.
    pub fn make_label(&mut self, postfix: &str) -> String {
        self.label_counter += 1;
        format!("octet_label_{}_{postfix}", self.label_counter)
    }

    /// Returns the assembly lines defining the float constants.
    pub fn footer_lines(&self) -> Vec<String> {
        let mut lines = vec!["; global float constants".to_string()];
        lines.extend(
            self.float_consts
                .iter()
                .map(|c| format!("{}\t.byte  {}  ; float {:?}", c.name, c.encoded, c.value)),
        );
        lines
    }

    /// Forgets all state, for the next program.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
