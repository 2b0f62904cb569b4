use std::{fmt, sync::Arc};

/// A position in a source file: file name, 1-based line and column.
///
/// The backend receives an already type-checked tree, so positions are carried along only for
/// diagnostics and for the source-line comments in generated output.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Pos {
    file: Arc<str>,
    line: u32,
    col: u32,
}

impl Pos {
    /// Creates a new position.
    pub fn new(file: impl Into<Arc<str>>, line: u32, col: u32) -> Self {
        Self { file: file.into(), line, col }
    }

    /// A position for code that does not originate from any source file.
    pub fn dummy() -> Self {
        Self::new("<generated>", 0, 0)
    }

    /// Returns `true` if this is a [dummy](Self::dummy) position.
    #[must_use]
    pub fn is_dummy(&self) -> bool {
        self.line == 0
    }

    /// Returns the file name.
    #[must_use]
    pub fn file(&self) -> &str {
        &self.file
    }

    /// Returns the 1-based line number.
    #[must_use]
    pub const fn line(&self) -> u32 {
        self.line
    }

    /// Returns the 1-based column number.
    #[must_use]
    pub const fn col(&self) -> u32 {
        self.col
    }
}

impl Default for Pos {
    fn default() -> Self {
        Self::dummy()
    }
}

impl fmt::Display for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.col)
    }
}

impl fmt::Debug for Pos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pos({self})")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display() {
        let pos = Pos::new("main.src", 12, 5);
        assert_eq!(pos.to_string(), "main.src:12:5");
        assert_eq!(format!("{pos:?}"), "Pos(main.src:12:5)");
        assert!(!pos.is_dummy());
        assert!(Pos::default().is_dummy());
    }
}
