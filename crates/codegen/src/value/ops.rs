//! Arithmetic on [`Value`]s.

use super::{DataType, Value};
use crate::{NumericError, NumericResult};
use std::cmp::Ordering;

/// The operands of a binary operation after type checking.
enum Operands {
    Int(DataType, i64, i64),
    Float(f64, f64),
}

#[allow(clippy::should_implement_trait)]
impl Value {
    fn operands(&self, rhs: &Self) -> NumericResult<Operands> {
        let (left, right) = (self.ty(), rhs.ty());
        match (*self, *rhs) {
            (Self::Float(a), Self::Float(b)) => Ok(Operands::Float(a, b)),
            (Self::Float(_), _) | (_, Self::Float(_)) if left.is_numeric() && right.is_numeric() => {
                Err(NumericError::PrecisionLoss { left, right })
            }
            _ => match (self.as_i64(), rhs.as_i64()) {
                (Some(a), Some(b)) if left == right => Ok(Operands::Int(left, a, b)),
                _ => Err(NumericError::TypeMismatch { left, right }),
            },
        }
    }

    fn integer(&self, what: &'static str) -> NumericResult<(DataType, i64)> {
        self.as_i64().map(|v| (self.ty(), v)).ok_or(NumericError::InvalidOperation(what))
    }

    /// Folds `self op rhs` after casting `rhs` to the type of `self`.
    ///
    /// This is the mixed-width literal folding that the front end opts into for expressions such
    /// as `uword + ubyte literal`.
    pub fn fold_mixed(
        self,
        rhs: Self,
        op: impl FnOnce(Self, Self) -> NumericResult<Self>,
    ) -> NumericResult<Self> {
        let rhs = if rhs.ty() == self.ty() { rhs } else { rhs.cast(self.ty())? };
        op(self, rhs)
    }

    pub fn add(self, rhs: Self) -> NumericResult<Self> {
        match self.operands(&rhs)? {
            Operands::Int(ty, a, b) => Self::wrapping(ty, a + b),
            Operands::Float(a, b) => Self::float(a + b),
        }
    }

    pub fn sub(self, rhs: Self) -> NumericResult<Self> {
        match self.operands(&rhs)? {
            Operands::Int(ty, a, b) => Self::wrapping(ty, a - b),
            Operands::Float(a, b) => Self::float(a - b),
        }
    }

    pub fn mul(self, rhs: Self) -> NumericResult<Self> {
        match self.operands(&rhs)? {
            Operands::Int(ty, a, b) => Self::wrapping(ty, a * b),
            Operands::Float(a, b) => Self::float(a * b),
        }
    }

    /// Divides, truncating toward zero.
    ///
    /// Integer division by zero does not fail: it yields the largest value of the type, like the
    /// runtime division routines do.
    pub fn div(self, rhs: Self) -> NumericResult<Self> {
        match self.operands(&rhs)? {
            Operands::Int(ty, _, 0) => Self::wrapping(ty, Self::division_by_zero_result(ty)),
            Operands::Int(ty, a, b) => Self::wrapping(ty, a / b),
            Operands::Float(_, b) if b == 0.0 => {
                Err(NumericError::InvalidOperation("float division by zero"))
            }
            Operands::Float(a, b) => Self::float(a / b),
        }
    }

    /// Remainder with the sign of the dividend. The remainder of a division by zero is 0.
    pub fn rem(self, rhs: Self) -> NumericResult<Self> {
        match self.operands(&rhs)? {
            Operands::Int(ty, _, 0) => Self::wrapping(ty, 0),
            Operands::Int(ty, a, b) => Self::wrapping(ty, a % b),
            Operands::Float(_, b) if b == 0.0 => {
                Err(NumericError::InvalidOperation("float division by zero"))
            }
            Operands::Float(a, b) => Self::float(a % b),
        }
    }

    pub fn pow(self, rhs: Self) -> NumericResult<Self> {
        match self.operands(&rhs)? {
            Operands::Int(ty, a, b) if b < 0 => Self::wrapping(ty, (a as f64).powi(b as i32) as i64),
            Operands::Int(ty, a, b) => Self::wrapping(ty, a.wrapping_pow(b as u32)),
            Operands::Float(a, b) => Self::float(a.powf(b)),
        }
    }

    /// Shifts left by `count` bits. Shifting out all bits yields 0.
    pub fn shl(self, count: u32) -> NumericResult<Self> {
        let (ty, a) = self.integer("shift of a non-integer")?;
        if count >= ty.bits() {
            return Self::wrapping(ty, 0);
        }
        Self::wrapping(ty, a << count)
    }

    /// Shifts right by `count` bits: logical for unsigned types, arithmetic for signed types.
    pub fn shr(self, count: u32) -> NumericResult<Self> {
        let (ty, a) = self.integer("shift of a non-integer")?;
        if count >= ty.bits() {
            return Self::wrapping(ty, if a < 0 { -1 } else { 0 });
        }
        Self::wrapping(ty, a >> count)
    }

    fn rotate_parts(&self) -> NumericResult<(DataType, u32, u32)> {
        let (ty, a) = self.integer("rotate of a non-integer")?;
        let width = ty.bits();
        let bits = (a as u32) & ((1 << width) - 1);
        Ok((ty, width, bits))
    }

    /// Rotates left through the carry: a 9-bit rotate for bytes and a 17-bit rotate for words.
    ///
    /// Returns the result and the carry out, which is the old top bit.
    pub fn rol(self, carry: bool) -> NumericResult<(Self, bool)> {
        let (ty, width, bits) = self.rotate_parts()?;
        let carry_out = bits & (1 << (width - 1)) != 0;
        let result = (bits << 1) | carry as u32;
        Ok((Self::wrapping(ty, result as i64)?, carry_out))
    }

    /// Rotates right through the carry: a 9-bit rotate for bytes and a 17-bit rotate for words.
    ///
    /// Returns the result and the carry out, which is the old bit 0.
    pub fn ror(self, carry: bool) -> NumericResult<(Self, bool)> {
        let (ty, width, bits) = self.rotate_parts()?;
        let carry_out = bits & 1 != 0;
        let result = (bits >> 1) | ((carry as u32) << (width - 1));
        Ok((Self::wrapping(ty, result as i64)?, carry_out))
    }

    /// Rotates left within the width of the type, without carry.
    pub fn rol2(self) -> NumericResult<Self> {
        let (ty, width, bits) = self.rotate_parts()?;
        Self::wrapping(ty, ((bits << 1) | (bits >> (width - 1))) as i64)
    }

    /// Rotates right within the width of the type, without carry.
    pub fn ror2(self) -> NumericResult<Self> {
        let (ty, width, bits) = self.rotate_parts()?;
        Self::wrapping(ty, ((bits >> 1) | ((bits & 1) << (width - 1))) as i64)
    }

    fn bitwise(self, rhs: Self, f: impl FnOnce(i64, i64) -> i64) -> NumericResult<Self> {
        match self.operands(&rhs)? {
            Operands::Int(ty, a, b) => Self::wrapping(ty, f(a, b)),
            Operands::Float(..) => Err(NumericError::InvalidOperation("bitwise operation on float")),
        }
    }

    pub fn bitand(self, rhs: Self) -> NumericResult<Self> {
        self.bitwise(rhs, |a, b| a & b)
    }

    pub fn bitor(self, rhs: Self) -> NumericResult<Self> {
        self.bitwise(rhs, |a, b| a | b)
    }

    pub fn bitxor(self, rhs: Self) -> NumericResult<Self> {
        self.bitwise(rhs, |a, b| a ^ b)
    }

    /// Logical and of the truthiness of both values.
    pub fn and(self, rhs: Self) -> Self {
        Self::bool(self.is_truthy() && rhs.is_truthy())
    }

    pub fn or(self, rhs: Self) -> Self {
        Self::bool(self.is_truthy() || rhs.is_truthy())
    }

    pub fn xor(self, rhs: Self) -> Self {
        Self::bool(self.is_truthy() != rhs.is_truthy())
    }

    pub fn not(self) -> Self {
        Self::bool(!self.is_truthy())
    }

    /// Bitwise complement.
    pub fn inv(self) -> NumericResult<Self> {
        let (ty, a) = self.integer("bitwise complement of a non-integer")?;
        Self::wrapping(ty, !a)
    }

    /// Negates. The most negative value of a signed type maps to itself.
    pub fn neg(self) -> NumericResult<Self> {
        match self {
            Self::Byte(v) => Ok(Self::Byte(v.wrapping_neg())),
            Self::Word(v) => Ok(Self::Word(v.wrapping_neg())),
            Self::Float(v) => Ok(Self::Float(-v)),
            Self::UByte(_) | Self::UWord(_) => {
                Err(NumericError::InvalidOperation("negation of an unsigned value"))
            }
            Self::Str(_) | Self::Array(..) => {
                Err(NumericError::InvalidOperation("negation of a non-numeric value"))
            }
        }
    }

    /// Absolute value. The most negative value of a signed type maps to itself.
    pub fn abs(self) -> NumericResult<Self> {
        match self {
            Self::Byte(v) => Ok(Self::Byte(v.wrapping_abs())),
            Self::Word(v) => Ok(Self::Word(v.wrapping_abs())),
            Self::Float(v) => Ok(Self::Float(v.abs())),
            Self::UByte(_) | Self::UWord(_) => {
                Err(NumericError::InvalidOperation("absolute value of an unsigned value"))
            }
            Self::Str(_) | Self::Array(..) => {
                Err(NumericError::InvalidOperation("absolute value of a non-numeric value"))
            }
        }
    }

    pub fn inc(self) -> NumericResult<Self> {
        match self {
            Self::Float(v) => Self::float(v + 1.0),
            _ => {
                let (ty, a) = self.integer("increment of a non-numeric value")?;
                Self::wrapping(ty, a + 1)
            }
        }
    }

    pub fn dec(self) -> NumericResult<Self> {
        match self {
            Self::Float(v) => Self::float(v - 1.0),
            _ => {
                let (ty, a) = self.integer("decrement of a non-numeric value")?;
                Self::wrapping(ty, a - 1)
            }
        }
    }

    /// The most significant byte of a word, as a `ubyte`. Bytes have an msb of 0.
    pub fn msb(self) -> NumericResult<Self> {
        let bits = self.as_bits().ok_or(NumericError::InvalidOperation("msb of a non-integer"))?;
        Ok(Self::UByte(if self.ty().is_byte() { 0 } else { (bits >> 8) as u8 }))
    }

    /// The least significant byte, as a `ubyte`.
    pub fn lsb(self) -> NumericResult<Self> {
        let bits = self.as_bits().ok_or(NumericError::InvalidOperation("lsb of a non-integer"))?;
        Ok(Self::UByte(bits as u8))
    }

    /// Casts to `target`.
    ///
    /// Integer casts never fail: widening extends according to the signedness of the source and
    /// narrowing keeps the low bits. A float cast to an integer type is truncated and must fit.
    pub fn cast(self, target: DataType) -> NumericResult<Self> {
        let source = self.ty();
        if source == target {
            return Ok(self);
        }
        let mismatch = NumericError::TypeMismatch { left: source, right: target };
        match self {
            Self::Float(v) => {
                let (min, max) = target.int_range().ok_or(mismatch)?;
                let truncated = v.trunc();
                if truncated.is_nan() || truncated < min as f64 || truncated > max as f64 {
                    return Err(NumericError::CastOverflow { value: v, target });
                }
                Self::wrapping(target, truncated as i64)
            }
            _ => {
                let v = self.as_i64().ok_or_else(|| mismatch.clone())?;
                if target.is_float() {
                    Ok(Self::Float(v as f64))
                } else if target.is_integer() {
                    Self::wrapping(target, v)
                } else {
                    Err(mismatch)
                }
            }
        }
    }

    /// Compares two numbers of the same type.
    pub fn compare(self, rhs: Self) -> NumericResult<Ordering> {
        match self.operands(&rhs)? {
            Operands::Int(_, a, b) => Ok(a.cmp(&b)),
            Operands::Float(a, b) => {
                a.partial_cmp(&b).ok_or(NumericError::InvalidOperation("comparison with NaN"))
            }
        }
    }

    const fn division_by_zero_result(ty: DataType) -> i64 {
        match ty.int_range() {
            Some((_, max)) => max,
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::StorageId;

    const INTS: [DataType; 4] = [DataType::UByte, DataType::Byte, DataType::UWord, DataType::Word];

    #[test]
    fn wraparound() {
        for a in 0..=255i64 {
            for b in (0..=255i64).step_by(7) {
                let sum = Value::UByte(a as u8).add(Value::UByte(b as u8)).unwrap();
                assert_eq!(sum.as_i64(), Some((a + b) % 256));
                let diff = Value::UByte(a as u8).sub(Value::UByte(b as u8)).unwrap();
                assert_eq!(diff.as_i64(), Some((a - b).rem_euclid(256)));
            }
        }
        let sum = Value::UWord(65000).add(Value::UWord(1000)).unwrap();
        assert_eq!(sum, Value::UWord(464));
        assert_eq!(Value::Byte(127).add(Value::Byte(1)).unwrap().as_i64(), Some(-128));
        assert_eq!(Value::Word(-32768).sub(Value::Word(1)).unwrap().as_i64(), Some(32767));
        assert_eq!(Value::Word(300).mul(Value::Word(300)).unwrap().as_i64(), Some(90000 - 65536));
    }

    #[test]
    fn division_by_zero_saturates() {
        let expected = [255, 127, 65535, 32767];
        for (ty, expected) in INTS.into_iter().zip(expected) {
            let a = Value::int(ty, 5).unwrap();
            let zero = Value::int(ty, 0).unwrap();
            assert_eq!(a.div(zero).unwrap().as_i64(), Some(expected), "{ty}");
            assert_eq!(a.rem(zero).unwrap().as_i64(), Some(0), "{ty}");
        }
        assert!(Value::Float(1.0).div(Value::Float(0.0)).is_err());
    }

    #[test]
    fn division_truncates() {
        assert_eq!(Value::Byte(-7).div(Value::Byte(2)).unwrap(), Value::Byte(-3));
        assert_eq!(Value::Byte(-7).rem(Value::Byte(2)).unwrap(), Value::Byte(-1));
        assert_eq!(Value::Byte(-128).div(Value::Byte(-1)).unwrap(), Value::Byte(-128));
        assert_eq!(Value::UWord(1000).div(Value::UWord(7)).unwrap(), Value::UWord(142));
    }

    #[test]
    fn mismatches() {
        assert_eq!(
            Value::UByte(1).add(Value::UWord(1)),
            Err(NumericError::TypeMismatch { left: DataType::UByte, right: DataType::UWord })
        );
        assert_eq!(
            Value::Float(1.0).add(Value::UByte(1)),
            Err(NumericError::PrecisionLoss { left: DataType::Float, right: DataType::UByte })
        );
        assert!(matches!(
            Value::Word(1).mul(Value::Float(1.0)),
            Err(NumericError::PrecisionLoss { .. })
        ));
        let s = Value::Str(StorageId::from_usize(0));
        assert!(matches!(s.add(s), Err(NumericError::TypeMismatch { .. })));
        assert!(Value::Float(1.0).bitand(Value::Float(1.0)).is_err());
    }

    #[test]
    fn mixed_folding() {
        let sum = Value::UWord(1000).fold_mixed(Value::UByte(24), Value::add).unwrap();
        assert_eq!(sum, Value::UWord(1024));
        assert!(matches!(sum, Value::UWord(_)));
        let product = Value::Float(1.5).fold_mixed(Value::UByte(2), Value::mul).unwrap();
        assert!(matches!(product, Value::Float(v) if v == 3.0));
    }

    #[test]
    fn power() {
        assert_eq!(Value::UByte(2).pow(Value::UByte(9)).unwrap(), Value::UByte(0));
        assert_eq!(Value::UWord(3).pow(Value::UWord(4)).unwrap(), Value::UWord(81));
        assert_eq!(Value::Byte(2).pow(Value::Byte(-1)).unwrap(), Value::Byte(0));
        assert_eq!(Value::Byte(-1).pow(Value::Byte(-3)).unwrap(), Value::Byte(-1));
        assert!(matches!(Value::Float(2.0).pow(Value::Float(0.5)), Ok(Value::Float(_))));
    }

    #[test]
    fn shifts() {
        assert_eq!(Value::UByte(0x81).shl(1).unwrap(), Value::UByte(0x02));
        assert_eq!(Value::UByte(0x81).shr(1).unwrap(), Value::UByte(0x40));
        assert_eq!(Value::Byte(-128).shr(1).unwrap(), Value::Byte(-64));
        assert_eq!(Value::Word(-2).shr(20).unwrap(), Value::Word(-1));
        assert_eq!(Value::Word(2).shr(20).unwrap(), Value::Word(0));
        assert_eq!(Value::UWord(1).shl(16).unwrap(), Value::UWord(0));
        assert!(Value::Float(1.0).shl(1).is_err());
    }

    #[test]
    fn rotates() {
        assert_eq!(Value::UByte(0x80).rol(false).unwrap(), (Value::UByte(0), true));
        assert_eq!(Value::UByte(0x40).rol(true).unwrap(), (Value::UByte(0x81), false));
        assert_eq!(Value::UByte(0x01).ror(false).unwrap(), (Value::UByte(0), true));
        assert_eq!(Value::UWord(0x0002).ror(true).unwrap(), (Value::UWord(0x8001), false));
        assert_eq!(Value::UByte(0x81).rol2().unwrap(), Value::UByte(0x03));
        assert_eq!(Value::UWord(0x0001).ror2().unwrap(), Value::UWord(0x8000));
        // nine rotates through the carry restore a byte
        let mut state = (Value::UByte(0xa5), false);
        for _ in 0..9 {
            state = state.0.rol(state.1).unwrap();
        }
        assert_eq!(state, (Value::UByte(0xa5), false));
        let (rotated, _) = Value::Byte(-1).rol(false).unwrap();
        assert!(matches!(rotated, Value::Byte(-2)));
    }

    #[test]
    fn bitwise_and_logical() {
        assert_eq!(Value::UByte(0xf0).bitand(Value::UByte(0x3c)).unwrap(), Value::UByte(0x30));
        assert_eq!(Value::Word(-1).bitxor(Value::Word(0x00ff)).unwrap(), Value::Word(-256));
        assert_eq!(Value::UByte(0x0f).inv().unwrap(), Value::UByte(0xf0));
        assert_eq!(Value::UByte(3).and(Value::Word(0)), Value::UByte(0));
        assert_eq!(Value::UByte(3).or(Value::Word(0)), Value::UByte(1));
        assert_eq!(Value::UByte(3).xor(Value::Float(2.0)), Value::UByte(0));
        assert_eq!(Value::UWord(0).not(), Value::UByte(1));
    }

    #[test]
    fn negation() {
        assert_eq!(Value::Byte(5).neg().unwrap(), Value::Byte(-5));
        assert_eq!(Value::Byte(-128).neg().unwrap(), Value::Byte(-128));
        assert_eq!(Value::Word(i16::MIN).abs().unwrap(), Value::Word(i16::MIN));
        assert!(Value::UByte(1).neg().is_err());
        assert!(Value::UWord(1).abs().is_err());
        // double negation is the identity, including the most negative value
        for v in i8::MIN..=i8::MAX {
            assert_eq!(Value::Byte(v).neg().unwrap().neg().unwrap(), Value::Byte(v));
        }
    }

    #[test]
    fn inc_dec_msb_lsb() {
        assert_eq!(Value::UByte(255).inc().unwrap(), Value::UByte(0));
        assert_eq!(Value::Word(i16::MIN).dec().unwrap(), Value::Word(i16::MAX));
        assert_eq!(Value::UWord(0x1234).msb().unwrap(), Value::UByte(0x12));
        assert_eq!(Value::UWord(0x1234).lsb().unwrap(), Value::UByte(0x34));
        assert_eq!(Value::UByte(0xff).msb().unwrap(), Value::UByte(0));
        assert_eq!(Value::Word(-1).lsb().unwrap(), Value::UByte(0xff));
    }

    #[test]
    fn casts() {
        // ubyte -> byte -> ubyte only round-trips for 0..=127
        for v in 0..=255u8 {
            let back = Value::UByte(v).cast(DataType::Byte).unwrap().cast(DataType::UByte).unwrap();
            assert!(matches!(back, Value::UByte(b) if b == v));
            let signed = Value::UByte(v).cast(DataType::Byte).unwrap();
            assert_eq!(signed == Value::UByte(v), v <= 127);
        }
        assert_eq!(Value::Byte(-1).cast(DataType::UWord).unwrap(), Value::UWord(0xffff));
        assert_eq!(Value::Byte(-1).cast(DataType::Word).unwrap(), Value::Word(-1));
        assert_eq!(Value::UWord(0x1280).cast(DataType::Byte).unwrap(), Value::Byte(-128));
        assert_eq!(Value::UWord(300).cast(DataType::Float).unwrap(), Value::Float(300.0));

        assert_eq!(Value::Float(255.9).cast(DataType::UByte).unwrap(), Value::UByte(255));
        assert_eq!(Value::Float(-1.5).cast(DataType::Byte).unwrap(), Value::Byte(-1));
        assert_eq!(
            Value::Float(256.0).cast(DataType::UByte),
            Err(NumericError::CastOverflow { value: 256.0, target: DataType::UByte })
        );
        assert!(Value::Float(-0.5).cast(DataType::UWord).is_ok());
        assert!(Value::Float(-1.0).cast(DataType::UWord).is_err());
        assert!(Value::UByte(1).cast(DataType::Str).is_err());
    }

    #[test]
    fn comparisons() {
        assert_eq!(Value::Byte(-1).compare(Value::Byte(1)).unwrap(), Ordering::Less);
        assert_eq!(Value::Float(2.0).compare(Value::Float(2.0)).unwrap(), Ordering::Equal);
        assert!(Value::UByte(1).compare(Value::Byte(1)).is_err());
    }
}
