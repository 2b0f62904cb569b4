use super::{Diag, Emitter, io_panic};
use anstream::{AutoStream, ColorChoice};
use std::{
    io::{self, Write},
    sync::OnceLock,
};

type Writer = dyn Write + Send + 'static;

/// Diagnostic emitter that emits to an arbitrary [`io::Write`] writer in human-readable format.
///
/// ```text
/// warning: indirect code for in-place assignment
///   --> main.src:12:5
/// ```
pub struct HumanEmitter {
    writer: AutoStream<Box<Writer>>,
}

impl Emitter for HumanEmitter {
    fn emit_diagnostic(&mut self, diagnostic: &mut Diag) {
        self.write_diagnostic(diagnostic).unwrap_or_else(|e| io_panic(e));
    }

    fn supports_color(&self) -> bool {
        match self.writer.current_choice() {
            ColorChoice::AlwaysAnsi | ColorChoice::Always => true,
            ColorChoice::Auto | ColorChoice::Never => false,
        }
    }
}

impl HumanEmitter {
    /// Creates a new `HumanEmitter` that writes to given writer.
    ///
    /// Note that a color choice of `Auto` will be treated as `Never` because the writer opaque
    /// at this point. Prefer calling [`AutoStream::choice`] on the writer if it is known
    /// before-hand.
    pub fn new<W: Write + Send + 'static>(writer: W, color: ColorChoice) -> Self {
        Self { writer: AutoStream::new(Box::new(writer), color) }
    }

    /// Creates a new `HumanEmitter` that writes to stderr, for use in tests.
    pub fn test() -> Self {
        struct TestWriter;

        impl Write for TestWriter {
            fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
                // The main difference between `stderr`: use the `eprint!` macro so that the output
                // can get captured by the test harness.
                eprint!("{}", String::from_utf8_lossy(buf));
                Ok(buf.len())
            }

            fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
                self.write(buf).map(drop)
            }

            fn flush(&mut self) -> io::Result<()> {
                io::stderr().flush()
            }
        }

        Self::new(TestWriter, ColorChoice::Always)
    }

    /// Creates a new `HumanEmitter` that writes to stderr.
    pub fn stderr(color_choice: ColorChoice) -> Self {
        // `io::Stderr` is not buffered.
        Self::new(io::BufWriter::new(io::stderr()), stderr_choice(color_choice))
    }

    fn write_diagnostic(&mut self, diagnostic: &Diag) -> io::Result<()> {
        let level = diagnostic.level();
        let style = level.style();
        let bold = anstyle::Style::new().bold();
        writeln!(
            self.writer,
            "{style}{level}{style:#}{bold}: {}{bold:#}",
            diagnostic.message()
        )?;
        if let Some(pos) = diagnostic.pos().filter(|pos| !pos.is_dummy()) {
            let arrow = anstyle::Style::new()
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::BrightBlue)))
                .bold();
            writeln!(self.writer, "  {arrow}-->{arrow:#} {pos}")?;
        }
        writeln!(self.writer)?;
        self.writer.flush()
    }
}

fn stderr_choice(color_choice: ColorChoice) -> ColorChoice {
    static AUTO: OnceLock<ColorChoice> = OnceLock::new();
    if color_choice == ColorChoice::Auto {
        *AUTO.get_or_init(|| anstream::AutoStream::choice(&std::io::stderr()))
    } else {
        color_choice
    }
}
