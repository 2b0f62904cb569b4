//! Backend encoders.
//!
//! All backends consume the same abstract instruction chunks produced by lowering:
//! - [`NativeEncoder`] emits 6502 assembly text for the 64tass assembler,
//! - [`IrProgram`] keeps the chunks as a portable, printable instruction list,
//! - [`VmEncoder`] resolves labels and symbols into a [`VmProgram`] for the register VM.

mod ir;
pub use ir::{IrProgram, IrVariable};

pub mod native;
pub use native::NativeEncoder;

mod vm;
pub use vm::{VmEncoder, VmInstruction, VmOperand, VmProgram, VmVariable};
