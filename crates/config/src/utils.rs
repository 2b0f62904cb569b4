/// Deserializes an option enum from any of its names.
#[cfg(feature = "serde")]
pub(crate) struct NameVisitor<T>(std::marker::PhantomData<T>);

#[cfg(feature = "serde")]
impl<T: std::str::FromStr + strum::VariantNames> NameVisitor<T> {
    pub(crate) fn new() -> Self {
        Self(std::marker::PhantomData)
    }
}

#[cfg(feature = "serde")]
impl<T: std::str::FromStr + strum::VariantNames> serde::de::Visitor<'_> for NameVisitor<T> {
    type Value = T;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = std::any::type_name::<T>();
        let name = name.rsplit("::").next().unwrap_or(name);
        write!(f, "one of the {name} names: {}", T::VARIANTS.join(", "))
    }

    fn visit_str<E: serde::de::Error>(self, v: &str) -> Result<Self::Value, E> {
        T::from_str(v).map_err(|_| serde::de::Error::unknown_variant(v, T::VARIANTS))
    }
}

/// Parses an address written in decimal, `0x` hexadecimal or `$` hexadecimal notation.
pub fn parse_address(s: &str) -> Result<u16, String> {
    let s = s.trim();
    let (digits, radix) = if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix('$')) {
        (hex, 16)
    } else {
        (s, 10)
    };
    u16::from_str_radix(digits, radix).map_err(|e| format!("invalid address `{s}`: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addresses() {
        assert_eq!(parse_address("2049"), Ok(0x0801));
        assert_eq!(parse_address("0x0801"), Ok(0x0801));
        assert_eq!(parse_address("$c000"), Ok(0xc000));
        assert!(parse_address("$10000").is_err());
        assert!(parse_address("main").is_err());
    }
}
