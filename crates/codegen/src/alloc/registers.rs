use crate::{FpReg, VReg};

/// Hands out virtual registers.
///
/// The allocation cursors are reset at every chunk boundary, so the same registers are reused by
/// consecutive statements. The high-water marks are kept across resets.
#[derive(Clone, Debug, Default)]
pub struct RegisterPool {
    next: usize,
    next_float: usize,
    high_water: usize,
    high_water_float: usize,
}

impl RegisterPool {
    /// Creates a new register pool.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a fresh integer register.
    pub fn next_free(&mut self) -> VReg {
        let reg = VReg::from_usize(self.next);
        self.next += 1;
        self.high_water = self.high_water.max(self.next);
        reg
    }

    /// Returns a fresh float register.
    pub fn next_free_float(&mut self) -> FpReg {
        let reg = FpReg::from_usize(self.next_float);
        self.next_float += 1;
        self.high_water_float = self.high_water_float.max(self.next_float);
        reg
    }

    /// Returns the integer register that [`next_free`](Self::next_free) would return, without
    /// allocating it.
    #[must_use]
    pub fn peek_next(&self) -> VReg {
        VReg::from_usize(self.next)
    }

    /// Allocates registers until `reg` and all registers below it are taken.
    pub fn reserve_until(&mut self, reg: VReg) {
        while self.next <= reg.index() {
            self.next_free();
        }
    }

    /// Starts a new chunk: all registers become free again.
    pub fn reset(&mut self) {
        self.next = 0;
        self.next_float = 0;
    }

    /// Returns the number of integer registers in use at most.
    #[must_use]
    pub fn high_water_mark(&self) -> usize {
        self.high_water
    }

    /// Returns the number of float registers in use at most.
    #[must_use]
    pub fn high_water_mark_float(&self) -> usize {
        self.high_water_float
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation() {
        let mut pool = RegisterPool::new();
        assert_eq!(pool.next_free(), VReg::from_usize(0));
        assert_eq!(pool.next_free(), VReg::from_usize(1));
        assert_eq!(pool.peek_next(), VReg::from_usize(2));
        assert_eq!(pool.next_free_float(), FpReg::from_usize(0));

        pool.reset();
        assert_eq!(pool.next_free(), VReg::from_usize(0));
        assert_eq!(pool.high_water_mark(), 2);
        assert_eq!(pool.high_water_mark_float(), 1);
    }

    #[test]
    fn reserve() {
        let mut pool = RegisterPool::new();
        pool.reserve_until(VReg::from_usize(2));
        assert_eq!(pool.next_free(), VReg::from_usize(3));

        // already past it
        pool.reserve_until(VReg::from_usize(1));
        assert_eq!(pool.peek_next(), VReg::from_usize(4));
        assert_eq!(pool.high_water_mark(), 4);
    }
}
