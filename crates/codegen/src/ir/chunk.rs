use super::Instruction;
use octet_interface::Pos;
use std::fmt;

/// A straight-line group of instructions produced by lowering one statement or expression.
///
/// A chunk may carry a label, in which case it is a jump target.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    pub label: Option<String>,
    pub pos: Pos,
    pub instructions: Vec<Instruction>,
}

impl Chunk {
    /// Creates a new, empty chunk.
    pub fn new(pos: Pos) -> Self {
        Self { label: None, pos, instructions: Vec::new() }
    }

    /// Creates a new, empty chunk with a label.
    pub fn labelled(label: impl Into<String>, pos: Pos) -> Self {
        Self { label: Some(label.into()), pos, instructions: Vec::new() }
    }

    #[inline]
    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Appends the instructions of another, unlabelled chunk.
    pub fn append(&mut self, other: Self) {
        debug_assert!(other.label.is_none(), "appending a labelled chunk loses its label");
        self.instructions.extend(other.instructions);
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }
}

impl<'a> IntoIterator for &'a Chunk {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl fmt::Display for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(label) = &self.label {
            writeln!(f, "{label}:")?;
        }
        for inst in &self.instructions {
            writeln!(f, "    {inst}")?;
        }
        Ok(())
    }
}

/// A lowered subroutine. Its fully qualified name labels the first instruction.
#[derive(Clone, Debug, PartialEq)]
pub struct Routine {
    pub name: String,
    pub chunks: Vec<Chunk>,
}

impl Routine {
    /// Returns all instructions, in order.
    pub fn instructions(&self) -> impl Iterator<Item = &Instruction> {
        self.chunks.iter().flat_map(|chunk| chunk.iter())
    }
}
