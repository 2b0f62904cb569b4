use super::{
    Diag, DiagBuffer, DynEmitter, ErrorGuaranteed, HumanEmitter, InMemoryEmitter, Level,
    SilentEmitter,
};
use crate::Pos;
use anstream::ColorChoice;
use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use std::hash::{Hash, Hasher};

/// A handler deals with errors and other compiler output.
///
/// Errors are logged for later reporting; the code generator checks [`has_errors`](Self::has_errors)
/// before producing output.
pub struct DiagCtxt {
    inner: Mutex<DiagCtxtInner>,
}

struct DiagCtxtInner {
    emitter: Box<DynEmitter>,

    /// The number of errors that have been emitted, including duplicates.
    err_count: usize,
    warn_count: usize,

    /// This set contains a hash of every diagnostic that has been emitted by this `DiagCtxt`.
    /// These hashes are used to avoid emitting the same diagnostic twice.
    emitted_diagnostics: FxHashSet<u64>,

    can_emit_warnings: bool,
}

impl DiagCtxt {
    /// Creates a new `DiagCtxt` with the given diagnostics emitter.
    pub fn new(emitter: Box<DynEmitter>) -> Self {
        Self {
            inner: Mutex::new(DiagCtxtInner {
                emitter,
                err_count: 0,
                warn_count: 0,
                emitted_diagnostics: FxHashSet::default(),
                can_emit_warnings: true,
            }),
        }
    }

    /// Creates a new `DiagCtxt` with a test emitter.
    pub fn with_test_emitter() -> Self {
        Self::new(Box::new(HumanEmitter::test()))
    }

    /// Creates a new `DiagCtxt` with a TTY emitter.
    pub fn with_stderr_emitter(color_choice: ColorChoice) -> Self {
        Self::new(Box::new(HumanEmitter::stderr(color_choice)))
    }

    /// Creates a new `DiagCtxt` with a silent emitter.
    pub fn with_silent_emitter() -> Self {
        Self::new(Box::new(SilentEmitter)).disable_warnings()
    }

    /// Creates a new `DiagCtxt` that collects diagnostics into the returned buffer.
    pub fn with_buffer_emitter() -> (Self, DiagBuffer) {
        let (emitter, buffer) = InMemoryEmitter::new();
        (Self::new(Box::new(emitter)), buffer)
    }

    /// Disables emitting warnings.
    pub fn disable_warnings(mut self) -> Self {
        self.inner.get_mut().can_emit_warnings = false;
        self
    }

    /// Emits the given diagnostic with this context.
    ///
    /// Returns the error guarantee if the diagnostic is an error.
    pub fn emit_diagnostic(&self, diagnostic: Diag) -> Option<ErrorGuaranteed> {
        self.inner.lock().emit_diagnostic(diagnostic)
    }

    /// Emits an error at the given position.
    pub fn err(&self, msg: impl Into<String>, pos: Pos) -> ErrorGuaranteed {
        let guar = self.emit_diagnostic(Diag::new(Level::Error, msg).at(pos));
        #[allow(deprecated)]
        guar.unwrap_or(ErrorGuaranteed::new_unchecked())
    }

    /// Emits a warning at the given position.
    ///
    /// Does nothing if warnings are disabled.
    pub fn warn(&self, msg: impl Into<String>, pos: Pos) {
        self.emit_diagnostic(Diag::new(Level::Warning, msg).at(pos));
    }

    /// Emits a note at the given position.
    pub fn note(&self, msg: impl Into<String>, pos: Pos) {
        self.emit_diagnostic(Diag::new(Level::Note, msg).at(pos));
    }

    /// Returns the number of errors that have been emitted, including duplicates.
    #[inline]
    pub fn err_count(&self) -> usize {
        self.inner.lock().err_count
    }

    /// Returns the number of warnings that have been emitted, including duplicates.
    #[inline]
    pub fn warn_count(&self) -> usize {
        self.inner.lock().warn_count
    }

    /// Returns `Err` if any errors have been emitted.
    pub fn has_errors(&self) -> Result<(), ErrorGuaranteed> {
        if self.inner.lock().err_count > 0 {
            #[allow(deprecated)]
            Err(ErrorGuaranteed::new_unchecked())
        } else {
            Ok(())
        }
    }

    /// Emits a final summary note if any errors were emitted, and returns `Err` in that case.
    pub fn print_error_count(&self) -> Result<(), ErrorGuaranteed> {
        let (errors, warnings) = {
            let inner = self.inner.lock();
            (inner.err_count, inner.warn_count)
        };
        if errors == 0 {
            return Ok(());
        }
        let mut msg = format!(
            "aborting due to {errors} previous error{}",
            crate::pluralize!(errors)
        );
        if warnings > 0 {
            msg.push_str(&format!("; {warnings} warning{} emitted", crate::pluralize!(warnings)));
        }
        self.inner.lock().emitter.emit_diagnostic(&mut Diag::new(Level::Error, msg));
        self.has_errors()
    }
}

impl DiagCtxtInner {
    fn emit_diagnostic(&mut self, mut diagnostic: Diag) -> Option<ErrorGuaranteed> {
        if diagnostic.level == Level::Warning && !self.can_emit_warnings {
            return None;
        }

        let already_emitted = !self.emitted_diagnostics.insert(hash_diagnostic(&diagnostic));
        if already_emitted {
            trace!(%diagnostic, "skipping duplicate diagnostic");
        } else {
            self.emitter.emit_diagnostic(&mut diagnostic);
        }

        match diagnostic.level {
            Level::Error => {
                self.err_count += 1;
                #[allow(deprecated)]
                Some(ErrorGuaranteed::new_unchecked())
            }
            Level::Warning => {
                self.warn_count += 1;
                None
            }
            Level::Note | Level::Help => None,
        }
    }
}

fn hash_diagnostic(diagnostic: &Diag) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    diagnostic.hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counts_and_guarantee() {
        let (dcx, buffer) = DiagCtxt::with_buffer_emitter();
        assert!(dcx.has_errors().is_ok());

        dcx.warn("indirect code", Pos::new("a.src", 1, 1));
        assert!(dcx.has_errors().is_ok());
        assert_eq!(dcx.warn_count(), 1);

        let _guar = dcx.err("bad load address", Pos::new("a.src", 2, 1));
        assert!(dcx.has_errors().is_err());
        assert_eq!(dcx.err_count(), 1);

        let diags = buffer.diags();
        assert_eq!(diags.len(), 2);
        assert_eq!(diags[0].level(), Level::Warning);
        assert_eq!(diags[1].message(), "bad load address");
    }

    #[test]
    fn duplicates_are_counted_once_emitted() {
        let (dcx, buffer) = DiagCtxt::with_buffer_emitter();
        let pos = Pos::new("a.src", 5, 3);
        dcx.warn("same", pos.clone());
        dcx.warn("same", pos);
        assert_eq!(buffer.len(), 1);
        assert_eq!(dcx.warn_count(), 2);
    }

    #[test]
    fn disabled_warnings() {
        let (dcx, buffer) = DiagCtxt::with_buffer_emitter();
        let dcx = dcx.disable_warnings();
        dcx.warn("ignored", Pos::dummy());
        assert!(buffer.is_empty());
        assert_eq!(dcx.warn_count(), 0);
    }

    #[test]
    fn error_summary() {
        let (dcx, buffer) = DiagCtxt::with_buffer_emitter();
        assert!(dcx.print_error_count().is_ok());
        dcx.err("first", Pos::dummy());
        dcx.err("second", Pos::dummy());
        assert!(dcx.print_error_count().is_err());
        let errors = buffer.messages(Level::Error);
        assert_eq!(errors, ["first", "second", "aborting due to 2 previous errors"]);
        assert_eq!(buffer.take().len(), 3);
        assert!(buffer.is_empty());
    }
}
