//! Error types.

use crate::DataType;
use octet_interface::ErrorGuaranteed;

/// A violation of the numeric value contract.
///
/// These indicate that the front end let an invalid combination of types through and are always
/// fatal to the compilation.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum NumericError {
    /// The operands have a different width or signedness.
    #[error("type mismatch: {left} and {right}")]
    TypeMismatch {
        /// The left operand's type.
        left: DataType,
        /// The right operand's type.
        right: DataType,
    },
    /// A float was combined with a non-float operand.
    #[error("precision loss: {left} combined with {right} needs an explicit cast")]
    PrecisionLoss {
        /// The left operand's type.
        left: DataType,
        /// The right operand's type.
        right: DataType,
    },
    /// A float does not fit in the integer type it is cast to.
    #[error("cast overflow: {value} does not fit in {target}")]
    CastOverflow {
        /// The float being cast.
        value: f64,
        /// The target type.
        target: DataType,
    },
    /// An integer literal does not fit in its declared type.
    #[error("value {value} out of range for {ty}")]
    OutOfRange {
        /// The literal.
        value: i64,
        /// The declared type.
        ty: DataType,
    },
    /// A float outside the range of the 40-bit float format.
    #[error("float {0} out of range for the 5-byte float format")]
    FloatOutOfRange(f64),
    /// The operation is not defined for the operand type.
    #[error("invalid operation: {0}")]
    InvalidOperation(&'static str),
}

/// Result type for the numeric value model.
pub type NumericResult<T> = Result<T, NumericError>;

/// An internal error of the code generator.
#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum CodegenError {
    /// The tree has a shape that the front end should never produce.
    #[error("assembly error: {0}")]
    Assembly(String),
    /// A numeric contract violation during constant folding.
    #[error(transparent)]
    Numeric(#[from] NumericError),
    /// A user-facing error has already been reported through the diagnostics context.
    #[error("aborting due to previous errors")]
    Reported(#[from] ErrorGuaranteed),
}

impl CodegenError {
    /// Creates a new [`CodegenError::Assembly`].
    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }
}

/// Result type for lowering and encoding.
pub type CodegenResult<T> = Result<T, CodegenError>;
