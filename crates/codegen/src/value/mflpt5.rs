use crate::{NumericError, NumericResult};
use std::fmt;

/// A float in the 5-byte format of the 6502 BASIC ROMs.
///
/// Byte 0 is the exponent with a bias of 128, where 0 encodes the value zero. Bytes 1 to 4 hold
/// the 32-bit mantissa, most significant byte first; its top bit is always set, so that position
/// stores the sign instead.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Mflpt5(pub [u8; 5]);

impl Mflpt5 {
    /// The largest magnitude the format can hold.
    pub const MAX: f64 = 1.7014118345e38;

    /// The encoding of zero.
    pub const ZERO: Self = Self([0; 5]);

    /// Encodes a float, truncating the mantissa to 32 bits.
    ///
    /// Values too small for the format become zero.
    pub fn from_f64(num: f64) -> NumericResult<Self> {
        if num == 0.0 {
            return Ok(Self::ZERO);
        }
        if !(-Self::MAX..=Self::MAX).contains(&num) {
            return Err(NumericError::FloatOutOfRange(num));
        }

        let sign = if num < 0.0 { 0x80 } else { 0 };
        // 128 is the exponent bias, 32 the number of mantissa bits
        let mut exponent: i32 = 128 + 32;
        let mut mantissa = num.abs();
        while mantissa >= 4_294_967_296.0 {
            exponent += 1;
            mantissa /= 2.0;
        }
        while mantissa < 2_147_483_648.0 {
            exponent -= 1;
            mantissa *= 2.0;
        }

        if exponent <= 0 {
            return Ok(Self::ZERO);
        }
        if exponent > 255 {
            return Err(NumericError::FloatOutOfRange(num));
        }
        let m = mantissa as u32;
        Ok(Self([
            exponent as u8,
            ((m >> 24) as u8 & 0x7f) | sign,
            (m >> 16) as u8,
            (m >> 8) as u8,
            m as u8,
        ]))
    }

    /// Decodes to a float.
    pub fn to_f64(self) -> f64 {
        let [exponent, b1, b2, b3, b4] = self.0;
        if exponent == 0 {
            return 0.0;
        }
        let sign = if b1 & 0x80 != 0 { -1.0 } else { 1.0 };
        let mantissa = 0x8000_0000
            | (u32::from(b1 & 0x7f) << 24)
            | (u32::from(b2) << 16)
            | (u32::from(b3) << 8)
            | u32::from(b4);
        sign * f64::from(mantissa) * 2f64.powi(i32::from(exponent) - 128 - 32)
    }

    /// Returns the raw bytes.
    #[inline]
    pub const fn bytes(&self) -> [u8; 5] {
        self.0
    }
}

/// Formats the bytes as assembler data: `$81, $00, $00, $00, $00`.
impl fmt::Display for Mflpt5 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, byte) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "${byte:02x}")?;
        }
        Ok(())
    }
}
