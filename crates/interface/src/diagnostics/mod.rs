//! Diagnostics implementation.
//!
//! A much reduced version of the `rustc_errors` design: a diagnostic is a level, a message and an
//! optional source position, and the [`DiagCtxt`] decides whether it is emitted and keeps count.

use crate::Pos;
use std::fmt;

mod context;
pub use context::DiagCtxt;

mod emitter;
pub use emitter::{DiagBuffer, DynEmitter, Emitter, HumanEmitter, InMemoryEmitter, SilentEmitter};

/// Useful type to use with [`Result`] indicate that an error has already been reported to the user,
/// so no need to continue checking.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct ErrorGuaranteed(());

impl ErrorGuaranteed {
    /// Creates a new `ErrorGuaranteed`.
    ///
    /// Use of this method is discouraged; errors should be reported through a [`DiagCtxt`], which
    /// hands out the guarantee.
    #[doc(hidden)]
    #[deprecated = "errors should be created through a `DiagCtxt`"]
    pub const fn new_unchecked() -> Self {
        Self(())
    }
}

impl fmt::Display for ErrorGuaranteed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("an error has already been reported")
    }
}

impl std::error::Error for ErrorGuaranteed {}

/// Diagnostic level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Level {
    /// An error in the program being compiled, which prevents code generation from finishing.
    Error,

    /// A warning about the program being compiled. Does not prevent code generation from
    /// finishing.
    Warning,

    /// A message giving additional context.
    Note,

    /// A message suggesting how to fix something.
    Help,
}

impl Level {
    /// Returns the string representation of the level.
    pub const fn to_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::Warning => "warning",
            Self::Note => "note",
            Self::Help => "help",
        }
    }

    /// Returns whether this level is an error.
    #[inline]
    pub const fn is_error(self) -> bool {
        matches!(self, Self::Error)
    }

    /// Returns the style of this level.
    pub const fn style(self) -> anstyle::Style {
        let color = match self {
            Self::Error => anstyle::AnsiColor::BrightRed,
            Self::Warning => anstyle::AnsiColor::BrightYellow,
            Self::Note => anstyle::AnsiColor::BrightGreen,
            Self::Help => anstyle::AnsiColor::BrightCyan,
        };
        anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(color))).bold()
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

/// A diagnostic message.
#[must_use]
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Diag {
    pub(crate) level: Level,
    msg: String,
    pos: Option<Pos>,
}

impl Diag {
    /// Creates a new diagnostic without a position.
    pub fn new(level: Level, msg: impl Into<String>) -> Self {
        Self { level, msg: msg.into(), pos: None }
    }

    /// Attaches a source position.
    pub fn at(mut self, pos: Pos) -> Self {
        self.pos = Some(pos);
        self
    }

    /// Returns the level of this diagnostic.
    #[inline]
    pub const fn level(&self) -> Level {
        self.level
    }

    /// Returns the message.
    #[inline]
    pub fn message(&self) -> &str {
        &self.msg
    }

    /// Returns the source position, if any.
    #[inline]
    pub const fn pos(&self) -> Option<&Pos> {
        self.pos.as_ref()
    }

    /// Returns `true` if this diagnostic is an error.
    #[inline]
    pub const fn is_error(&self) -> bool {
        self.level.is_error()
    }
}

impl fmt::Display for Diag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.level, self.msg)?;
        if let Some(pos) = &self.pos {
            write!(f, " ({pos})")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diag_display() {
        let diag = Diag::new(Level::Warning, "slow").at(Pos::new("a.src", 3, 1));
        assert_eq!(diag.to_string(), "warning: slow (a.src:3:1)");
        assert!(!diag.is_error());
        assert!(Diag::new(Level::Error, "x").is_error());
    }
}
