//! The type-checked program tree consumed by the backend.
//!
//! Every expression carries its inferred type and source position. Names are fully qualified by
//! the front end, except for labels, which are local to their subroutine.

use crate::{DataType, VReg, Value};
use octet_interface::Pos;

/// A typed expression.
#[derive(Clone, Debug, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub ty: DataType,
    pub pos: Pos,
}

impl Expr {
    pub fn new(kind: ExprKind, ty: DataType, pos: Pos) -> Self {
        Self { kind, ty, pos }
    }

    /// Creates a numeric literal.
    pub fn number(value: Value, pos: Pos) -> Self {
        Self::new(ExprKind::Number(value), value.ty(), pos)
    }

    /// Creates a variable reference.
    pub fn ident(name: impl Into<String>, ty: DataType, pos: Pos) -> Self {
        Self::new(ExprKind::Ident(name.into()), ty, pos)
    }

    /// Creates a binary expression with the type of its left operand.
    pub fn binary(left: Self, op: BinOp, right: Self) -> Self {
        let ty = if op.is_comparison() || op.is_logical() { DataType::UByte } else { left.ty };
        let pos = left.pos.clone();
        Self::new(ExprKind::Binary(Box::new(left), op, Box::new(right)), ty, pos)
    }

    /// Creates a prefix expression.
    pub fn prefix(op: PrefixOp, operand: Self) -> Self {
        let ty = if op == PrefixOp::Not { DataType::UByte } else { operand.ty };
        let pos = operand.pos.clone();
        Self::new(ExprKind::Prefix(op, Box::new(operand)), ty, pos)
    }

    /// Creates a memory read of a single byte.
    pub fn memory(address: Self, pos: Pos) -> Self {
        Self::new(ExprKind::Memory(Box::new(address)), DataType::UByte, pos)
    }

    pub fn cast(operand: Self, ty: DataType) -> Self {
        let pos = operand.pos.clone();
        Self::new(ExprKind::Cast(Box::new(operand)), ty, pos)
    }

    /// Returns the literal value, if this is a number.
    pub fn as_number(&self) -> Option<&Value> {
        match &self.kind {
            ExprKind::Number(v) => Some(v),
            _ => None,
        }
    }

    /// Returns `true` if this expression is a reference to the variable `name`.
    pub fn is_ident(&self, name: &str) -> bool {
        matches!(&self.kind, ExprKind::Ident(n) if n == name)
    }

    /// Returns `true` if both expressions compute the same value, ignoring source positions.
    ///
    /// Calls of builtins with side effects are never the same value.
    pub fn is_same_value(&self, other: &Self) -> bool {
        if self.ty != other.ty {
            return false;
        }
        match (&self.kind, &other.kind) {
            (ExprKind::Number(a), ExprKind::Number(b)) => a == b,
            (ExprKind::Ident(a), ExprKind::Ident(b)) => a == b,
            (ExprKind::MachineRegister(a), ExprKind::MachineRegister(b)) => a == b,
            (ExprKind::Memory(a), ExprKind::Memory(b)) => a.is_same_value(b),
            (ExprKind::ArrayIndex(a), ExprKind::ArrayIndex(b)) => a.is_same_element(b),
            (ExprKind::Prefix(op_a, a), ExprKind::Prefix(op_b, b)) => {
                op_a == op_b && a.is_same_value(b)
            }
            (ExprKind::Binary(la, op_a, ra), ExprKind::Binary(lb, op_b, rb)) => {
                op_a == op_b && la.is_same_value(lb) && ra.is_same_value(rb)
            }
            (ExprKind::Cast(a), ExprKind::Cast(b)) => a.is_same_value(b),
            (ExprKind::Builtin(fa, a), ExprKind::Builtin(fb, b)) => {
                fa == fb
                    && fa.is_pure()
                    && a.len() == b.len()
                    && a.iter().zip(b).all(|(a, b)| a.is_same_value(b))
            }
            _ => false,
        }
    }

    /// Returns `true` if the variable `name` is referenced anywhere in this expression.
    pub fn references(&self, name: &str) -> bool {
        match &self.kind {
            ExprKind::Number(_) | ExprKind::MachineRegister(_) => false,
            ExprKind::Ident(n) => n == name,
            ExprKind::Memory(address) => address.references(name),
            ExprKind::ArrayIndex(indexer) => {
                indexer.variable == name || indexer.index.references(name)
            }
            ExprKind::Prefix(_, operand) | ExprKind::Cast(operand) => operand.references(name),
            ExprKind::Binary(left, _, right) => left.references(name) || right.references(name),
            ExprKind::Builtin(_, args) => args.iter().any(|arg| arg.references(name)),
        }
    }
}

/// The kinds of expressions.
#[derive(Clone, Debug, PartialEq)]
pub enum ExprKind {
    /// A numeric literal.
    Number(Value),
    /// A variable, by its fully qualified name.
    Ident(String),
    /// A value that is already held in a register.
    MachineRegister(VReg),
    /// A single byte read from a computed address.
    Memory(Box<Expr>),
    ArrayIndex(ArrayIndexer),
    Prefix(PrefixOp, Box<Expr>),
    Binary(Box<Expr>, BinOp, Box<Expr>),
    /// A conversion to the type of the enclosing expression.
    Cast(Box<Expr>),
    /// A call of a builtin function.
    Builtin(BuiltinFn, Vec<Expr>),
}

/// An indexed element of an array, or of the memory a `uword` pointer variable points to.
#[derive(Clone, Debug, PartialEq)]
pub struct ArrayIndexer {
    /// Fully qualified name of the array or pointer variable.
    pub variable: String,
    /// Type of the variable.
    pub var_ty: DataType,
    pub index: Box<Expr>,
}

impl ArrayIndexer {
    pub fn new(variable: impl Into<String>, var_ty: DataType, index: Expr) -> Self {
        Self { variable: variable.into(), var_ty, index: Box::new(index) }
    }

    /// Returns `true` if both index the same element, ignoring source positions.
    pub fn is_same_element(&self, other: &Self) -> bool {
        self.variable == other.variable
            && self.var_ty == other.var_ty
            && self.index.is_same_value(&other.index)
    }

    /// Returns `true` if the variable is a pointer rather than an array.
    #[inline]
    pub fn is_pointer(&self) -> bool {
        self.var_ty == DataType::UWord
    }

    /// Returns the type of the elements.
    pub fn element_type(&self) -> DataType {
        if self.is_pointer() {
            DataType::UByte
        } else {
            self.var_ty.element_type().unwrap_or(self.var_ty)
        }
    }

    /// Returns the size in bytes of one element.
    pub fn item_size(&self) -> usize {
        self.element_type().memory_size()
    }
}

/// Prefix operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum PrefixOp {
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Neg,
    #[strum(serialize = "~")]
    Inv,
    #[strum(serialize = "not")]
    Not,
}

/// Binary operators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum BinOp {
    #[strum(serialize = "+")]
    Add,
    #[strum(serialize = "-")]
    Sub,
    #[strum(serialize = "*")]
    Mul,
    #[strum(serialize = "/")]
    Div,
    #[strum(serialize = "%")]
    Rem,
    #[strum(serialize = "&")]
    BitAnd,
    #[strum(serialize = "|")]
    BitOr,
    #[strum(serialize = "^")]
    BitXor,
    #[strum(serialize = "<<")]
    Shl,
    #[strum(serialize = ">>")]
    Shr,
    #[strum(serialize = "and")]
    And,
    #[strum(serialize = "or")]
    Or,
    #[strum(serialize = "xor")]
    Xor,
    #[strum(serialize = "==")]
    Eq,
    #[strum(serialize = "!=")]
    Ne,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    Le,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    Ge,
}

impl BinOp {
    #[inline]
    pub const fn is_comparison(self) -> bool {
        matches!(self, Self::Eq | Self::Ne | Self::Lt | Self::Le | Self::Gt | Self::Ge)
    }

    #[inline]
    pub const fn is_logical(self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor)
    }

    /// Returns `true` if `x = x op y` can be done as a read-modify-write of `x`.
    #[inline]
    pub const fn is_augmentable(self) -> bool {
        matches!(
            self,
            Self::Add
                | Self::Sub
                | Self::Mul
                | Self::Div
                | Self::BitAnd
                | Self::BitOr
                | Self::BitXor
                | Self::Shl
                | Self::Shr
        )
    }
}

/// Builtin functions that the backend expands inline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum BuiltinFn {
    Msb,
    Lsb,
    Peek,
    Peekw,
    Mkword,
    Rnd,
    Syscall,
    Syscall1,
    Syscall2,
    Syscall3,
}

impl BuiltinFn {
    /// Returns `true` if the call only computes a value from its arguments and memory.
    #[inline]
    pub const fn is_pure(self) -> bool {
        matches!(self, Self::Msb | Self::Lsb | Self::Peek | Self::Peekw | Self::Mkword)
    }
}

/// The destination of an assignment.
#[derive(Clone, Debug, PartialEq)]
pub enum AssignTarget {
    /// A variable, by its fully qualified name.
    Ident(String),
    Array(ArrayIndexer),
    /// A single byte at a computed address.
    Memory(Box<Expr>),
    MachineRegister(VReg),
}

impl AssignTarget {
    /// Returns `true` if `expr` reads exactly this target.
    pub fn is_same_as(&self, expr: &Expr) -> bool {
        match (self, &expr.kind) {
            (Self::Ident(a), ExprKind::Ident(b)) => a == b,
            (Self::Array(a), ExprKind::ArrayIndex(b)) => a.is_same_element(b),
            (Self::Memory(a), ExprKind::Memory(b)) => a.is_same_value(b),
            (Self::MachineRegister(a), ExprKind::MachineRegister(b)) => a == b,
            _ => false,
        }
    }

    fn name(&self) -> Option<&str> {
        match self {
            Self::Ident(name) => Some(name),
            Self::Array(indexer) => Some(&indexer.variable),
            _ => None,
        }
    }
}

/// An assignment `target = value`.
#[derive(Clone, Debug, PartialEq)]
pub struct Assignment {
    pub target: AssignTarget,
    pub value: Expr,
    /// Whether the value is the target combined with a single operation, so that the assignment
    /// can be done in place.
    pub augmentable: bool,
    pub pos: Pos,
}

impl Assignment {
    /// Creates a new assignment, deriving whether it is augmentable.
    pub fn new(target: AssignTarget, value: Expr, pos: Pos) -> Self {
        let augmentable = Self::is_augmentation(&target, &value);
        Self { target, value, augmentable, pos }
    }

    fn is_augmentation(target: &AssignTarget, value: &Expr) -> bool {
        if target.is_same_as(value) {
            return true;
        }
        match &value.kind {
            ExprKind::Binary(left, op, right) => {
                op.is_augmentable()
                    && target.is_same_as(left)
                    && !target.name().is_some_and(|name| right.references(name))
            }
            ExprKind::Prefix(op, operand) => *op != PrefixOp::Not && target.is_same_as(operand),
            _ => false,
        }
    }
}

/// One `values -> body` arm of a `when` statement.
#[derive(Clone, Debug, PartialEq)]
pub struct WhenChoice {
    pub values: Vec<Value>,
    pub body: Vec<Stmt>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Stmt {
    Assign(Assignment),
    /// An expression evaluated for its side effects.
    Expr(Expr),
    /// A subroutine call, by fully qualified name.
    Call { name: String, pos: Pos },
    Return { value: Option<Expr>, pos: Pos },
    When { subject: Expr, choices: Vec<WhenChoice>, else_body: Vec<Stmt>, pos: Pos },
    Label { name: String, pos: Pos },
    Jump { target: String, pos: Pos },
}

impl Stmt {
    pub fn pos(&self) -> &Pos {
        match self {
            Self::Assign(assign) => &assign.pos,
            Self::Expr(expr) => &expr.pos,
            Self::Call { pos, .. }
            | Self::Return { pos, .. }
            | Self::When { pos, .. }
            | Self::Label { pos, .. }
            | Self::Jump { pos, .. } => pos,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Subroutine {
    /// Name within its block.
    pub name: String,
    pub body: Vec<Stmt>,
    pub pos: Pos,
}

/// A variable declared in a block.
#[derive(Clone, Debug, PartialEq)]
pub struct VarDecl {
    /// Name within its block.
    pub name: String,
    pub ty: DataType,
    /// Initial value, re-assigned at program start.
    pub init: Option<Value>,
    /// Number of elements, for arrays.
    pub array_size: Option<usize>,
    pub pos: Pos,
}

impl VarDecl {
    /// Returns the number of bytes of storage the variable needs.
    pub fn storage_size(&self) -> usize {
        match (self.ty.element_type(), self.array_size) {
            (Some(element), Some(len)) => element.memory_size() * len,
            _ => self.ty.memory_size(),
        }
    }
}

/// A top-level block: a named scope of variables and subroutines.
#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub name: String,
    /// Fixed load address, if any.
    pub address: Option<u16>,
    pub vars: Vec<VarDecl>,
    pub subroutines: Vec<Subroutine>,
    pub pos: Pos,
}

impl Block {
    /// Returns `true` if some variable has an initial value.
    pub fn has_initializers(&self) -> bool {
        self.vars.iter().any(|var| var.init.is_some())
    }
}

/// A whole program. The first block must be `main`, with a `start` subroutine.
#[derive(Clone, Debug, PartialEq)]
pub struct Program {
    pub name: String,
    pub blocks: Vec<Block>,
    pub pos: Pos,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos() -> Pos {
        Pos::new("test.oct", 1, 1)
    }

    fn x() -> Expr {
        Expr::ident("main.x", DataType::UByte, pos())
    }

    fn num(v: u8) -> Expr {
        Expr::number(Value::UByte(v), pos())
    }

    #[test]
    fn augmentable_forms() {
        let target = || AssignTarget::Ident("main.x".into());

        assert!(Assignment::new(target(), x(), pos()).augmentable);
        assert!(Assignment::new(target(), Expr::binary(x(), BinOp::Add, num(1)), pos()).augmentable);
        assert!(Assignment::new(target(), Expr::prefix(PrefixOp::Inv, x()), pos()).augmentable);

        // `x = 1 + x` is not, and neither is `x = x + x`
        assert!(!Assignment::new(target(), Expr::binary(num(1), BinOp::Add, x()), pos()).augmentable);
        assert!(!Assignment::new(target(), Expr::binary(x(), BinOp::Add, x()), pos()).augmentable);
        // comparisons don't modify in place
        assert!(!Assignment::new(target(), Expr::binary(x(), BinOp::Lt, num(1)), pos()).augmentable);
        assert!(!Assignment::new(target(), num(3), pos()).augmentable);
    }

    #[test]
    fn same_target_at_other_positions() {
        let at = |col| Pos::new("test.oct", 1, col);
        let address = |col| Expr::number(Value::UWord(0xc000), at(col));
        let target = AssignTarget::Memory(Box::new(address(3)));
        assert!(target.is_same_as(&Expr::memory(address(14), at(12))));
        let other = Expr::number(Value::UWord(0xc001), at(14));
        assert!(!target.is_same_as(&Expr::memory(other, at(12))));

        let element = |col| {
            let index = Expr::ident("main.i", DataType::UByte, at(col));
            ArrayIndexer::new("main.arr", DataType::ArrayUB, index)
        };
        let value = Expr::new(ExprKind::ArrayIndex(element(20)), DataType::UByte, at(16));
        assert!(AssignTarget::Array(element(6)).is_same_as(&value));

        let rnd = |col| {
            Expr::new(ExprKind::Builtin(BuiltinFn::Rnd, Vec::new()), DataType::UByte, at(col))
        };
        assert!(!rnd(1).is_same_value(&rnd(9)));

        let augmented = Expr::binary(Expr::memory(address(14), at(12)), BinOp::Add, num(1));
        assert!(Assignment::new(target, augmented, at(1)).augmentable);
    }

    #[test]
    fn references() {
        let e = Expr::binary(num(2), BinOp::Mul, Expr::prefix(PrefixOp::Neg, x()));
        assert!(e.references("main.x"));
        assert!(!e.references("main.y"));
        let indexed = Expr::new(
            ExprKind::ArrayIndex(ArrayIndexer::new("main.arr", DataType::ArrayUB, x())),
            DataType::UByte,
            pos(),
        );
        assert!(indexed.references("main.arr"));
        assert!(indexed.references("main.x"));
    }

    #[test]
    fn indexers() {
        let arr = ArrayIndexer::new("main.arr", DataType::ArrayW, num(1));
        assert_eq!(arr.item_size(), 2);
        assert!(!arr.is_pointer());
        let ptr = ArrayIndexer::new("main.ptr", DataType::UWord, num(1));
        assert!(ptr.is_pointer());
        assert_eq!(ptr.element_type(), DataType::UByte);
        assert_eq!(ArrayIndexer::new("main.f", DataType::ArrayF, num(0)).item_size(), 5);
    }
}
