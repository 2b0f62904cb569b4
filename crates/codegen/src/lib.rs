#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![cfg_attr(test, allow(unused_crate_dependencies))]

#[macro_use]
extern crate tracing;

pub use rustc_hash::FxHashMap;

pub mod error;
pub use error::{CodegenError, CodegenResult, NumericError, NumericResult};

pub mod value;
pub use value::{DataType, Mflpt5, StorageId, Value};

pub mod symbols;
pub use symbols::{StaticSymbolTable, StorageClass, Symbol, SymbolTable};

pub mod machine;
pub use machine::{Machine, ZeroPageScratch};

pub mod tree;
pub use tree::{
    ArrayIndexer, AssignTarget, Assignment, BinOp, Block, BuiltinFn, Expr, ExprKind, PrefixOp,
    Program, Stmt, Subroutine, VarDecl, WhenChoice,
};

pub mod ir;
pub use ir::{
    Chunk, Condition, DataWidth, FpReg, Instruction, MemRef, Opcode, Operand, Routine, Syscall,
    VReg,
};

pub mod alloc;
pub use alloc::{EvalStack, RegisterPool, SlotByte};

pub mod session;
pub use session::{CodegenSession, FloatConst};

pub mod lower;
pub use lower::{ENTRYPOINT, Lowerer, fold_constant};

pub mod backend;
pub use backend::{
    IrProgram, IrVariable, NativeEncoder, VmEncoder, VmInstruction, VmOperand, VmProgram,
    VmVariable,
};

pub mod peephole;
pub use peephole::{EditKind, Modification, PeepholeOptimizer};

pub mod program;
pub use program::{Output, ProgramGen};
