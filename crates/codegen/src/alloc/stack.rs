//! Model of the native evaluation stack.
//!
//! The evaluation stack lives in two 256-byte pages, one for the low and one for the high bytes of
//! each slot, indexed by the X register. Pushing stores at `ESTACK_LO,x` and decrements X, so the
//! slot at depth `d` is addressed as `ESTACK_LO+1+d,x`.

use crate::VReg;
use smallvec::SmallVec;

/// Number of slots in the evaluation stack.
pub(crate) const MAX_STACK_DEPTH: usize = 256;

/// Which byte of a slot to address.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotByte {
    Lo,
    Hi,
}

impl SlotByte {
    const fn base(self) -> &'static str {
        match self {
            Self::Lo => "ESTACK_LO",
            Self::Hi => "ESTACK_HI",
        }
    }
}

/// The registers held in the evaluation stack.
///
/// Stack positions are 0-indexed from the top:
/// - Position 0 = top of stack
/// - Position 1 = second from top
/// - etc.
#[derive(Clone, Debug, Default)]
pub struct EvalStack {
    /// The stack, with index 0 being the top.
    stack: SmallVec<[VReg; 16]>,
    max_depth: usize,
}

impl EvalStack {
    /// Creates a new empty stack model.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current stack depth.
    #[must_use]
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Returns the largest depth reached.
    #[must_use]
    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Pushes a register onto the stack.
    pub fn push(&mut self, reg: VReg) {
        debug_assert!(self.stack.len() < MAX_STACK_DEPTH, "evaluation stack overflow");
        self.stack.insert(0, reg);
        self.max_depth = self.max_depth.max(self.stack.len());
    }

    /// Pops the top register from the stack.
    pub fn pop(&mut self) -> Option<VReg> {
        debug_assert!(!self.stack.is_empty(), "evaluation stack underflow");
        if self.stack.is_empty() { None } else { Some(self.stack.remove(0)) }
    }

    /// Returns the register at the given stack depth (0 = top).
    #[must_use]
    pub fn peek(&self, depth: usize) -> Option<VReg> {
        self.stack.get(depth).copied()
    }

    #[must_use]
    pub fn top(&self) -> Option<VReg> {
        self.peek(0)
    }

    /// Finds the depth of a register on the stack.
    #[must_use]
    pub fn find(&self, reg: VReg) -> Option<usize> {
        self.stack.iter().position(|&r| r == reg)
    }

    #[must_use]
    pub fn contains(&self, reg: VReg) -> bool {
        self.find(reg).is_some()
    }

    /// Returns `true` if the register is at the top of the stack.
    #[must_use]
    pub fn is_on_top(&self, reg: VReg) -> bool {
        self.top() == Some(reg)
    }

    /// Clears the stack. The largest depth is kept.
    pub fn clear(&mut self) {
        self.stack.clear();
    }

    /// Returns an iterator over all registers on the stack (top to bottom).
    pub fn iter(&self) -> impl Iterator<Item = VReg> + '_ {
        self.stack.iter().copied()
    }

    /// Returns the operand text addressing the slot of `reg`.
    #[must_use]
    pub fn slot(&self, reg: VReg, byte: SlotByte) -> Option<String> {
        self.find(reg).map(|depth| Self::address(depth + 1, byte))
    }

    /// Returns the operand text addressing the slot `offset` bytes above X.
    ///
    /// Offset 0 is the free slot that the next push stores into.
    #[must_use]
    pub fn address(offset: usize, byte: SlotByte) -> String {
        match offset {
            0 => format!("{},x", byte.base()),
            n => format!("{}+{n},x", byte.base()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(n: usize) -> VReg {
        VReg::from_usize(n)
    }

    #[test]
    fn push_pop() {
        let mut stack = EvalStack::new();
        stack.push(r(0));
        stack.push(r(1));

        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.top(), Some(r(1)));
        assert!(stack.is_on_top(r(1)));
        assert_eq!(stack.pop(), Some(r(1)));
        assert_eq!(stack.pop(), Some(r(0)));
        assert!(stack.is_empty());
        assert_eq!(stack.max_depth(), 2);
    }

    #[test]
    fn find_and_address() {
        let mut stack = EvalStack::new();
        stack.push(r(0));
        stack.push(r(1));
        stack.push(r(2));

        assert_eq!(stack.find(r(2)), Some(0));
        assert_eq!(stack.find(r(0)), Some(2));
        assert_eq!(stack.find(r(9)), None);
        assert_eq!(stack.slot(r(2), SlotByte::Lo).as_deref(), Some("ESTACK_LO+1,x"));
        assert_eq!(stack.slot(r(0), SlotByte::Hi).as_deref(), Some("ESTACK_HI+3,x"));
        assert_eq!(EvalStack::address(0, SlotByte::Lo), "ESTACK_LO,x");

        stack.clear();
        assert!(!stack.contains(r(1)));
        assert_eq!(stack.max_depth(), 3);
        assert_eq!(stack.iter().count(), 0);
    }
}
