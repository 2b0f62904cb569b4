//! The fixed-width numeric value model.
//!
//! Values behave exactly as they would on the target CPU: every integer result is wrapped to the
//! width of its type on construction, and floats are limited to the range of the 5-byte float
//! format. The model is the ground truth for constant folding in all backends.

use crate::{NumericError, NumericResult};
use std::{cmp::Ordering, fmt};

mod mflpt5;
pub use mflpt5::Mflpt5;

mod ops;

index_vec::define_index_type! {
    /// Identifies the backing storage of a string or array value.
    pub struct StorageId = u32;
}

/// The type of a value or storage location.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display, strum::IntoStaticStr)]
pub enum DataType {
    /// Unsigned 8-bit integer.
    #[strum(serialize = "ubyte")]
    UByte,
    /// Signed 8-bit integer.
    #[strum(serialize = "byte")]
    Byte,
    /// Unsigned 16-bit integer.
    #[strum(serialize = "uword")]
    UWord,
    /// Signed 16-bit integer.
    #[strum(serialize = "word")]
    Word,
    /// 5-byte float.
    #[strum(serialize = "float")]
    Float,
    /// Zero-terminated string.
    #[strum(serialize = "str")]
    Str,
    /// Array of `ubyte`.
    #[strum(serialize = "ubyte[]")]
    ArrayUB,
    /// Array of `byte`.
    #[strum(serialize = "byte[]")]
    ArrayB,
    /// Array of `uword`.
    #[strum(serialize = "uword[]")]
    ArrayUW,
    /// Array of `word`.
    #[strum(serialize = "word[]")]
    ArrayW,
    /// Array of `float`.
    #[strum(serialize = "float[]")]
    ArrayF,
}

impl DataType {
    /// Returns `true` for the four integer types.
    #[inline]
    pub const fn is_integer(self) -> bool {
        matches!(self, Self::UByte | Self::Byte | Self::UWord | Self::Word)
    }

    /// Returns `true` for the integer types and `float`.
    #[inline]
    pub const fn is_numeric(self) -> bool {
        self.is_integer() || self.is_float()
    }

    #[inline]
    pub const fn is_float(self) -> bool {
        matches!(self, Self::Float)
    }

    #[inline]
    pub const fn is_signed(self) -> bool {
        matches!(self, Self::Byte | Self::Word | Self::Float)
    }

    #[inline]
    pub const fn is_byte(self) -> bool {
        matches!(self, Self::UByte | Self::Byte)
    }

    #[inline]
    pub const fn is_word(self) -> bool {
        matches!(self, Self::UWord | Self::Word)
    }

    /// Returns `true` for strings and arrays.
    #[inline]
    pub const fn is_iterable(self) -> bool {
        matches!(
            self,
            Self::Str | Self::ArrayUB | Self::ArrayB | Self::ArrayUW | Self::ArrayW | Self::ArrayF
        )
    }

    /// Returns the element type of a string or array.
    pub const fn element_type(self) -> Option<Self> {
        match self {
            Self::Str | Self::ArrayUB => Some(Self::UByte),
            Self::ArrayB => Some(Self::Byte),
            Self::ArrayUW => Some(Self::UWord),
            Self::ArrayW => Some(Self::Word),
            Self::ArrayF => Some(Self::Float),
            _ => None,
        }
    }

    /// Returns the number of bytes a value of this type occupies in memory.
    ///
    /// Strings and arrays are passed around as a 2-byte pointer.
    pub const fn memory_size(self) -> usize {
        match self {
            Self::UByte | Self::Byte => 1,
            Self::Float => 5,
            _ => 2,
        }
    }

    /// Returns the width in bits.
    pub const fn bits(self) -> u32 {
        match self {
            Self::UByte | Self::Byte => 8,
            Self::Float => 40,
            _ => 16,
        }
    }

    /// Returns the inclusive range of an integer type.
    pub const fn int_range(self) -> Option<(i64, i64)> {
        match self {
            Self::UByte => Some((0, u8::MAX as i64)),
            Self::Byte => Some((i8::MIN as i64, i8::MAX as i64)),
            Self::UWord => Some((0, u16::MAX as i64)),
            Self::Word => Some((i16::MIN as i64, i16::MAX as i64)),
            _ => None,
        }
    }
}

/// A typed value.
///
/// Numeric values compare by value, also across types; strings and arrays compare by the identity
/// of their backing storage.
#[derive(Clone, Copy, Debug)]
pub enum Value {
    UByte(u8),
    Byte(i8),
    UWord(u16),
    Word(i16),
    /// A float in the range of the 5-byte format. Rounding to the 32-bit mantissa happens when the
    /// value is encoded.
    Float(f64),
    Str(StorageId),
    /// An array, with its array type.
    Array(DataType, StorageId),
}

impl Value {
    /// Creates an integer value, failing if `value` is outside the range of `ty`.
    pub fn int(ty: DataType, value: i64) -> NumericResult<Self> {
        match ty.int_range() {
            Some((min, max)) if (min..=max).contains(&value) => Self::wrapping(ty, value),
            Some(_) => Err(NumericError::OutOfRange { value, ty }),
            None => Err(NumericError::InvalidOperation("not an integer type")),
        }
    }

    /// Creates an integer value, wrapping `value` to the width of `ty`.
    pub fn wrapping(ty: DataType, value: i64) -> NumericResult<Self> {
        Ok(match ty {
            DataType::UByte => Self::UByte(value as u8),
            DataType::Byte => Self::Byte(value as i8),
            DataType::UWord => Self::UWord(value as u16),
            DataType::Word => Self::Word(value as i16),
            _ => return Err(NumericError::InvalidOperation("not an integer type")),
        })
    }

    /// Creates a float value, failing outside the range of the 5-byte format.
    pub fn float(value: f64) -> NumericResult<Self> {
        if (-Mflpt5::MAX..=Mflpt5::MAX).contains(&value) {
            Ok(Self::Float(value))
        } else {
            Err(NumericError::FloatOutOfRange(value))
        }
    }

    /// Creates a boolean, which is a `ubyte` 0 or 1.
    #[inline]
    pub const fn bool(value: bool) -> Self {
        Self::UByte(value as u8)
    }

    /// Returns the type of this value.
    pub const fn ty(&self) -> DataType {
        match *self {
            Self::UByte(_) => DataType::UByte,
            Self::Byte(_) => DataType::Byte,
            Self::UWord(_) => DataType::UWord,
            Self::Word(_) => DataType::Word,
            Self::Float(_) => DataType::Float,
            Self::Str(_) => DataType::Str,
            Self::Array(ty, _) => ty,
        }
    }

    /// Returns the value of an integer.
    pub const fn as_i64(&self) -> Option<i64> {
        match *self {
            Self::UByte(v) => Some(v as i64),
            Self::Byte(v) => Some(v as i64),
            Self::UWord(v) => Some(v as i64),
            Self::Word(v) => Some(v as i64),
            _ => None,
        }
    }

    /// Returns the value of a number.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Self::Float(v) => Some(v),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    /// Returns the unsigned bit pattern of an integer.
    pub const fn as_bits(&self) -> Option<u16> {
        match *self {
            Self::UByte(v) => Some(v as u16),
            Self::Byte(v) => Some(v as u8 as u16),
            Self::UWord(v) => Some(v),
            Self::Word(v) => Some(v as u16),
            _ => None,
        }
    }

    /// Returns `true` if this is a numeric zero.
    pub fn is_zero(&self) -> bool {
        self.as_f64() == Some(0.0)
    }

    /// Returns the truthiness of this value: numbers are true when nonzero, strings and arrays are
    /// always true.
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::Str(_) | Self::Array(..) => true,
            _ => !self.is_zero(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Str(a), Self::Str(b)) | (Self::Array(_, a), Self::Array(_, b)) => a == b,
            _ => match (self.as_i64(), other.as_i64()) {
                (Some(a), Some(b)) => a == b,
                _ => match (self.as_f64(), other.as_f64()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                },
            },
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self.as_i64(), other.as_i64()) {
            (Some(a), Some(b)) => Some(a.cmp(&b)),
            _ => self.as_f64()?.partial_cmp(&other.as_f64()?),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UByte(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::UWord(v) => write!(f, "{v}"),
            Self::Word(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v:?}"),
            Self::Str(id) => write!(f, "str#{}", id.index()),
            Self::Array(ty, id) => write!(f, "{ty}#{}", id.index()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn construction() {
        assert_eq!(Value::int(DataType::UByte, 255).unwrap(), Value::UByte(255));
        assert_eq!(
            Value::int(DataType::UByte, 256),
            Err(NumericError::OutOfRange { value: 256, ty: DataType::UByte })
        );
        assert!(Value::int(DataType::Byte, -129).is_err());
        assert!(Value::int(DataType::Float, 1).is_err());

        assert_eq!(Value::wrapping(DataType::UByte, 256).unwrap(), Value::UByte(0));
        assert_eq!(Value::wrapping(DataType::Byte, 128).unwrap(), Value::Byte(-128));
        assert_eq!(Value::wrapping(DataType::UWord, -1).unwrap(), Value::UWord(65535));

        assert!(Value::float(1.7e38).is_ok());
        assert_eq!(Value::float(1.8e38), Err(NumericError::FloatOutOfRange(1.8e38)));
        assert!(Value::float(f64::NAN).is_err());
    }

    #[test]
    fn equality_by_value_or_identity() {
        assert_eq!(Value::UByte(5), Value::Word(5));
        assert_eq!(Value::UWord(2), Value::Float(2.0));
        assert_ne!(Value::Byte(-1), Value::UByte(255));

        let a = StorageId::from_usize(0);
        let b = StorageId::from_usize(1);
        assert_eq!(Value::Str(a), Value::Str(a));
        assert_ne!(Value::Str(a), Value::Str(b));
        assert_eq!(Value::Array(DataType::ArrayUB, b), Value::Array(DataType::ArrayUB, b));
        assert_ne!(Value::Str(a), Value::UByte(0));
    }

    #[test]
    fn ordering_only_for_numbers() {
        assert!(Value::Byte(-1) < Value::UByte(0));
        assert!(Value::Float(2.5) > Value::UWord(2));
        let s = Value::Str(StorageId::from_usize(0));
        assert_eq!(s.partial_cmp(&Value::UByte(1)), None);
        assert_eq!(s.partial_cmp(&s), None);
    }

    #[test]
    fn data_types() {
        assert_eq!(DataType::ArrayW.element_type(), Some(DataType::Word));
        assert_eq!(DataType::Str.element_type(), Some(DataType::UByte));
        assert_eq!(DataType::Float.memory_size(), 5);
        assert_eq!(DataType::ArrayF.memory_size(), 2);
        assert_eq!(DataType::ArrayUW.to_string(), "uword[]");
        assert!(DataType::Float.is_signed());
        assert!(!DataType::Float.is_integer());
    }

    #[test]
    fn truthiness() {
        assert!(!Value::UByte(0).is_truthy());
        assert!(Value::Float(0.5).is_truthy());
        assert!(Value::Str(StorageId::from_usize(3)).is_truthy());
        assert_eq!(Value::bool(true), Value::UByte(1));
        assert_eq!(Value::Byte(-1).as_bits(), Some(0xff));
    }
}
