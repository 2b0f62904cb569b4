#![doc = include_str!("../README.md")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![cfg_attr(test, allow(unused_crate_dependencies))]

#[macro_use]
mod macros;

mod opts;
pub use opts::Opts;

mod utils;
pub use utils::parse_address;

str_enum! {
    /// Which instruction encoding the backend produces.
    #[derive(Default)]
    #[derive(strum::EnumIs)]
    #[strum(serialize_all = "lowercase")]
    pub enum Backend {
        /// Assembly source text for the 6502 family, in 64tass syntax.
        #[default]
        #[strum(to_string = "native", serialize = "6502")]
        Native,
        /// Portable intermediate representation: labelled instruction chunks.
        Ir,
        /// Bytecode for the register virtual machine.
        Vm,
    }
}

str_enum! {
    /// The machine the program is generated for.
    #[derive(Default)]
    #[strum(serialize_all = "lowercase")]
    pub enum Target {
        #[default]
        C64,
        /// The register virtual machine.
        Virtual,
    }
}

str_enum! {
    /// Program file format.
    #[derive(Default)]
    #[derive(strum::EnumIs)]
    #[strum(serialize_all = "lowercase")]
    pub enum OutputType {
        /// A raw memory image without a load address header.
        Raw,
        /// A CBM program file, prefixed with its load address.
        #[default]
        Prg,
    }
}

str_enum! {
    /// How a program file is started on the target machine.
    #[derive(Default)]
    #[derive(strum::EnumIs)]
    #[strum(serialize_all = "lowercase")]
    pub enum Launcher {
        /// A one-line BASIC stub that `SYS`es into the program.
        #[default]
        Basic,
        /// No launcher; the program is started by jumping to its load address.
        None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn string_enum() {
        for value in Backend::iter() {
            let s = value.to_str();
            assert_eq!(value.to_string(), s);
            assert_eq!(value, s.parse().unwrap());
        }
        assert_eq!("6502".parse::<Backend>().unwrap(), Backend::Native);
        assert_eq!(Launcher::default(), Launcher::Basic);
        assert_eq!(OutputType::Raw.to_str(), "raw");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_roundtrip() {
        for value in Target::iter() {
            let json_s = format!("\"{value}\"");
            assert_eq!(serde_json::to_string(&value).unwrap(), json_s);
            assert_eq!(serde_json::from_str::<Target>(&json_s).unwrap(), value);
        }
        assert!(serde_json::from_str::<Target>("\"pet\"").is_err());
    }
}
