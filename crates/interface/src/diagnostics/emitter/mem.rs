use crate::diagnostics::{Diag, Emitter, Level};
use parking_lot::Mutex;
use std::sync::Arc;

/// Collects the diagnostics of a code generation run, for inspection afterwards.
pub struct InMemoryEmitter {
    buffer: DiagBuffer,
}

impl InMemoryEmitter {
    /// Creates a new emitter and a handle to the diagnostics it collects.
    pub fn new() -> (Self, DiagBuffer) {
        let buffer = DiagBuffer::default();
        (Self { buffer: buffer.clone() }, buffer)
    }
}

impl Emitter for InMemoryEmitter {
    fn emit_diagnostic(&mut self, diagnostic: &mut Diag) {
        self.buffer.0.lock().push(diagnostic.clone());
    }
}

/// Shared handle to the diagnostics collected by an [`InMemoryEmitter`], in emission order.
#[derive(Clone, Debug, Default)]
pub struct DiagBuffer(Arc<Mutex<Vec<Diag>>>);

impl DiagBuffer {
    /// Returns a copy of the collected diagnostics.
    pub fn diags(&self) -> Vec<Diag> {
        self.0.lock().clone()
    }

    /// Returns the messages of the collected diagnostics at `level`.
    pub fn messages(&self, level: Level) -> Vec<String> {
        self.0
            .lock()
            .iter()
            .filter(|diag| diag.level() == level)
            .map(|diag| diag.message().to_string())
            .collect()
    }

    /// Removes and returns the collected diagnostics.
    pub fn take(&self) -> Vec<Diag> {
        std::mem::take(&mut *self.0.lock())
    }

    pub fn len(&self) -> usize {
        self.0.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.lock().is_empty()
    }
}
