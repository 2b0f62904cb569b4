//! Code generation options.

use crate::{Backend, Launcher, OutputType, Target};

#[cfg(feature = "clap")]
use clap::{ColorChoice, Parser};

/// Options consumed by the code generation backend.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "clap", derive(Parser))]
#[cfg_attr(feature = "clap", command(name = "octet", arg_required_else_help = false))]
#[allow(clippy::manual_non_exhaustive)]
pub struct Opts {
    /// Instruction encoding to produce.
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t))]
    pub backend: Backend,
    /// Machine to generate code for.
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t))]
    pub target: Target,
    /// Program file format.
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t))]
    pub output: OutputType,
    /// How the program is launched.
    #[cfg_attr(feature = "clap", arg(long, value_enum, default_value_t))]
    pub launcher: Launcher,
    /// Program load address. Defaults to the target's BASIC or raw load address.
    #[cfg_attr(feature = "clap", arg(long, value_parser = crate::parse_address))]
    pub load_address: Option<u16>,

    /// Run the peephole optimizer over the generated assembly.
    #[cfg_attr(feature = "clap", arg(help_heading = "Code generation", long, short = 'O'))]
    pub optimize: bool,
    /// Allow float expressions to be split into in-place operations.
    #[cfg_attr(feature = "clap", arg(help_heading = "Code generation", long))]
    pub optimize_float_expressions: bool,
    /// Do not emit code that re-initializes block variables at program start.
    #[cfg_attr(feature = "clap", arg(help_heading = "Code generation", long))]
    pub dont_reinit_globals: bool,
    /// Warn when an in-place assignment needs the slower indirect code.
    #[cfg_attr(feature = "clap", arg(help_heading = "Code generation", long))]
    pub slow_codegen_warnings: bool,

    /// Coloring.
    #[cfg(feature = "clap")]
    #[cfg_attr(
        feature = "clap",
        arg(help_heading = "Display options", long, value_enum, default_value = "auto")
    )]
    pub color: ColorChoice,
    /// Whether to disable warnings.
    #[cfg_attr(feature = "clap", arg(help_heading = "Display options", long))]
    pub no_warnings: bool,

    // Allows `Opts { x: y, ..Default::default() }`.
    #[doc(hidden)]
    #[cfg_attr(feature = "clap", arg(skip))]
    pub _non_exhaustive: (),
}

impl Opts {
    /// Returns `true` if block variables are re-initialized when the program starts.
    #[inline]
    pub fn reinit_globals(&self) -> bool {
        !self.dont_reinit_globals
    }
}

#[cfg(all(test, feature = "clap"))]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Opts::command().debug_assert();
        let _ = Opts::default();
        let _ = Opts { backend: Backend::Vm, ..Default::default() };
    }

    #[test]
    fn parse_flags() {
        let opts = Opts::try_parse_from([
            "octet",
            "--backend",
            "ir",
            "--load-address",
            "$c000",
            "-O",
            "--dont-reinit-globals",
        ])
        .unwrap();
        assert_eq!(opts.backend, Backend::Ir);
        assert_eq!(opts.load_address, Some(0xc000));
        assert!(opts.optimize);
        assert!(!opts.reinit_globals());

        assert!(Opts::try_parse_from(["octet", "--load-address", "main"]).is_err());
    }
}
