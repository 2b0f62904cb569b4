//! Register allocation.
//!
//! Lowering allocates virtual registers from a [`RegisterPool`]. The native encoder then places
//! them in slots of the evaluation stack, tracked by an [`EvalStack`].

mod registers;
pub use registers::RegisterPool;

mod stack;
pub use stack::{EvalStack, SlotByte};
