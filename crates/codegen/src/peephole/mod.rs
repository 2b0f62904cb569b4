//! Peephole optimizer for native assembly.
//!
//! Performs pattern-based rewrites on sliding windows of assembly lines. Blank lines and comments
//! are not part of the windows; labels are, so no pattern matches across a jump target.
//!
//! Each pass collects its edits for the whole program and applies them in one batch, and the
//! windows are rebuilt before the next pass. The pass list repeats until nothing changes.

use rustc_hash::FxHashSet;

mod patterns;

/// Upper bound on the number of times the pass list is repeated.
const MAX_ITERATIONS: usize = 100;

/// What to do with a line.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EditKind {
    Remove,
    Replace(String),
}

/// An edit of one line, by its index in the program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Modification {
    pub index: usize,
    pub kind: EditKind,
}

impl Modification {
    pub const fn remove(index: usize) -> Self {
        Self { index, kind: EditKind::Remove }
    }

    pub fn replace(index: usize, text: impl Into<String>) -> Self {
        Self { index, kind: EditKind::Replace(text.into()) }
    }
}

/// The edits of one pass.
///
/// Edits are added in groups, one per matched pattern. A group touching a line that an earlier
/// group already edits is dropped; overlapping windows match the same lines more than once.
#[derive(Debug, Default)]
pub(crate) struct Edits {
    mods: Vec<Modification>,
    claimed: FxHashSet<usize>,
}

impl Edits {
    /// Adds a group of edits. Returns `false` if it overlaps an earlier group and was dropped.
    pub(crate) fn add(&mut self, group: impl IntoIterator<Item = Modification>) -> bool {
        let group: Vec<Modification> = group.into_iter().collect();
        if group.iter().any(|m| self.claimed.contains(&m.index)) {
            return false;
        }
        self.claimed.extend(group.iter().map(|m| m.index));
        self.mods.extend(group);
        true
    }

    /// Adds a group removing the given lines.
    pub(crate) fn remove(&mut self, lines: &[Line<'_>]) -> bool {
        self.add(lines.iter().map(|line| Modification::remove(line.index)))
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.mods.is_empty()
    }

    pub(crate) fn len(&self) -> usize {
        self.mods.len()
    }

    /// Applies the edits, highest index first so that removals do not shift pending indices.
    fn apply(mut self, lines: &mut Vec<String>) -> usize {
        self.mods.sort_by(|a, b| b.index.cmp(&a.index));
        let count = self.mods.len();
        for modification in self.mods {
            match modification.kind {
                EditKind::Remove => {
                    lines.remove(modification.index);
                }
                EditKind::Replace(text) => lines[modification.index] = text,
            }
        }
        count
    }
}

/// A line taking part in the windows: an instruction, a directive or a label.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Line<'a> {
    /// Index in the program.
    pub(crate) index: usize,
    text: &'a str,
}

impl<'a> Line<'a> {
    /// Returns `true` for instructions and directives, which are indented. Labels are not.
    pub(crate) fn is_instruction(&self) -> bool {
        self.text.starts_with(char::is_whitespace)
    }

    /// Returns the mnemonic, or the empty string for labels.
    pub(crate) fn mnemonic(&self) -> &'a str {
        if !self.is_instruction() {
            return "";
        }
        self.text.split_whitespace().next().unwrap_or("")
    }

    /// Returns the operand without a trailing comment.
    pub(crate) fn operand(&self) -> &'a str {
        if !self.is_instruction() {
            return "";
        }
        let body = self.text.trim_start();
        let rest = &body[self.mnemonic().len()..];
        rest.split(';').next().unwrap_or("").trim()
    }

    /// Returns the register of a load or store, e.g. `y` for `sty`.
    pub(crate) fn register(&self) -> Option<char> {
        let mnemonic = self.mnemonic();
        if mnemonic.len() == 3 && (mnemonic.starts_with("ld") || mnemonic.starts_with("st")) {
            mnemonic.chars().nth(2)
        } else {
            None
        }
    }

    pub(crate) fn is_load(&self) -> bool {
        self.register().is_some() && self.mnemonic().starts_with("ld")
    }

    pub(crate) fn is_store(&self) -> bool {
        self.register().is_some() && self.mnemonic().starts_with("st")
    }

    pub(crate) fn is_branch(&self) -> bool {
        matches!(self.mnemonic(), "bcc" | "bcs" | "beq" | "bmi" | "bne" | "bpl" | "bvc" | "bvs")
    }
}

/// Returns the lines that take part in the windows.
fn real_lines(lines: &[String]) -> Vec<Line<'_>> {
    lines
        .iter()
        .enumerate()
        .filter(|(_, text)| {
            let trimmed = text.trim_start();
            !trimmed.is_empty() && !trimmed.starts_with(';')
        })
        .map(|(index, text)| Line { index, text })
        .collect()
}

type Pass = fn(&[Line<'_>]) -> Edits;

/// The passes, in the order they run.
const PASSES: &[(&str, Pass)] = &[
    ("useless_stack_byte_writes", patterns::useless_stack_byte_writes),
    ("inc_dec", patterns::inc_dec),
    ("cmp_sequence", patterns::cmp_sequence),
    ("store_load_same", patterns::store_load_same),
    ("jsr_rts", patterns::jsr_rts),
    ("same_assignments", patterns::same_assignments),
];

/// Peephole optimizer for native assembly lines.
pub struct PeepholeOptimizer;

impl PeepholeOptimizer {
    /// Optimizes the lines in place until no pattern matches.
    ///
    /// Returns the number of modified lines.
    #[instrument(name = "peephole", level = "debug", skip_all, fields(lines = lines.len()))]
    pub fn optimize(lines: &mut Vec<String>) -> usize {
        let mut total = 0;
        for iteration in 1..=MAX_ITERATIONS {
            let count = Self::run_once(lines);
            total += count;
            if count == 0 {
                debug!(iteration, total, "fixed point");
                return total;
            }
        }
        debug!(total, "iteration limit reached");
        total
    }

    /// Runs every pass once. Returns the number of modified lines.
    pub fn run_once(lines: &mut Vec<String>) -> usize {
        let mut count = 0;
        for &(name, pass) in PASSES {
            let edits = pass(&real_lines(lines));
            if edits.is_empty() {
                continue;
            }
            trace!(pass = name, edits = edits.len(), "applying");
            count += edits.apply(lines);
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(text: &[&str]) -> Vec<String> {
        text.iter().map(|line| line.to_string()).collect()
    }

    #[test]
    fn line_parts() {
        let text = lines(&["\tldx  #$ff\t; init estack pointer", "label", "; comment", "", "+"]);
        let real = real_lines(&text);
        assert_eq!(real.len(), 3);
        assert_eq!(real[0].mnemonic(), "ldx");
        assert_eq!(real[0].operand(), "#$ff");
        assert_eq!(real[0].register(), Some('x'));
        assert!(real[0].is_load());
        assert!(!real[1].is_instruction());
        assert_eq!(real[1].mnemonic(), "");
        assert_eq!(real[2].index, 4);
    }

    #[test]
    fn overlapping_groups() {
        let mut edits = Edits::default();
        assert!(edits.add([Modification::remove(1), Modification::remove(2)]));
        assert!(!edits.add([Modification::remove(2), Modification::remove(3)]));
        assert!(edits.add([Modification::replace(3, "\ttax")]));
        assert_eq!(edits.len(), 3);

        let mut text = lines(&["a", "b", "c", "d"]);
        assert_eq!(edits.apply(&mut text), 3);
        assert_eq!(text, ["a", "\ttax"]);
    }

    #[test]
    fn useless_stack_write() {
        let mut text = lines(&[
            "\tlda  main.x",
            "\tsta  ESTACK_LO,x",
            "\tdex",
            "\tinx",
            "\tlda  ESTACK_LO,x",
            "\tsta  main.y",
        ]);
        let count = PeepholeOptimizer::optimize(&mut text);
        assert_eq!(count, 3);
        assert_eq!(text, ["\tlda  main.x", "\tsta  ESTACK_LO,x", "\tsta  main.y"]);
    }

    #[test]
    fn jsr_rts() {
        let mut text = lines(&["sub\t.proc", "\tjsr  sys.print_u8", "\trts", "\t.pend"]);
        PeepholeOptimizer::optimize(&mut text);
        assert_eq!(text, ["sub\t.proc", "\tjmp  sys.print_u8", "\t.pend"]);
    }

    #[test]
    fn labels_break_windows() {
        let mut text = lines(&["\tinx", "there", "\tdex", "\trts"]);
        assert_eq!(PeepholeOptimizer::optimize(&mut text), 0);
        assert_eq!(text.len(), 4);
    }

    #[test]
    fn idempotent() {
        let mut text = lines(&[
            "\tlda  main.a",
            "\tsta  ESTACK_LO,x",
            "\tdex",
            "\tinx",
            "\tlda  ESTACK_LO,x",
            "\tsta  main.b",
            "\tlda  main.b",
            "\tjsr  floats.print",
            "\trts",
        ]);
        PeepholeOptimizer::optimize(&mut text);
        let once = text.clone();
        assert_eq!(PeepholeOptimizer::optimize(&mut text), 0);
        assert_eq!(text, once);
    }
}
