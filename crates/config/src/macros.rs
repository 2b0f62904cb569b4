/// Declares an option enum that is parsed from and printed as its `strum` name.
///
/// Every other `#[strum(serialize = "..")]` name is accepted as an alias on the command line, and
/// the variant's doc comment becomes its help text.
macro_rules! str_enum {
    ($(#[$attr:meta])* $vis:vis enum $name:ident { $( $(#[$var_attr:meta])* $var:ident),* $(,)? }) => {
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
        #[derive(strum::IntoStaticStr, strum::EnumIter, strum::EnumString, strum::VariantNames)]
        #[derive(strum::EnumMessage)]
        $(#[$attr])*
        $vis enum $name {
            $(
                $(#[$var_attr])*
                $var
            ),*
        }

        impl $name {
            /// Returns the canonical name of `self`.
            pub fn to_str(self) -> &'static str {
                self.into()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.to_str())
            }
        }

        #[cfg(feature = "clap")]
        impl clap::ValueEnum for $name {
            fn value_variants<'a>() -> &'a [Self] {
                &[$(Self::$var),*]
            }

            fn to_possible_value(&self) -> Option<clap::builder::PossibleValue> {
                use strum::EnumMessage;
                let name = self.to_str();
                let aliases = self.get_serializations().iter().copied().filter(|alias| *alias != name);
                let value = clap::builder::PossibleValue::new(name).aliases(aliases);
                Some(match self.get_documentation() {
                    Some(help) => value.help(help.trim()),
                    None => value,
                })
            }
        }

        #[cfg(feature = "serde")]
        impl serde::Serialize for $name {
            fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serializer.serialize_str(self.to_str())
            }
        }

        #[cfg(feature = "serde")]
        impl<'de> serde::Deserialize<'de> for $name {
            fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                deserializer.deserialize_str(crate::utils::NameVisitor::<Self>::new())
            }
        }
    };
}
