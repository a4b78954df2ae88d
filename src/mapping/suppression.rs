//! Cursor freeze after button-down
//!
//! Pressing a button on a wearable moves the wearer's hand, so cursor updates
//! are held for a window of quaternion samples after every button-down.

/// Samples to hold after a button-down, about 250 ms at 128 Hz
pub const SUPPRESSION_WINDOW: u64 = 32;

/// `true` once more than [`SUPPRESSION_WINDOW`] samples passed since `mark`
pub fn allowed(sample_count: u64, mark: u64) -> bool {
    sample_count > mark.saturating_add(SUPPRESSION_WINDOW)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuppressionGate {
    mark: u64,
}

impl SuppressionGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark(&self) -> u64 {
        self.mark
    }

    pub fn is_open(&self, sample_count: u64) -> bool {
        allowed(sample_count, self.mark)
    }

    /// Starts a new window at `sample_count`
    pub fn arm(&mut self, sample_count: u64) {
        self.mark = sample_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_closes_strictly_after_threshold() {
        for mark in [0u64, 5, 1000] {
            for count in mark..=mark + SUPPRESSION_WINDOW {
                assert!(!allowed(count, mark), "count {} mark {}", count, mark);
            }
            assert!(allowed(mark + SUPPRESSION_WINDOW + 1, mark));
        }
    }

    #[test]
    fn predicate_matches_definition() {
        for mark in 0..50u64 {
            for count in 0..120u64 {
                assert_eq!(allowed(count, mark), count > mark + 32);
            }
        }
    }

    #[test]
    fn fresh_gate_holds_first_samples() {
        let gate = SuppressionGate::new();
        assert_eq!(gate.mark(), 0);
        assert!(!gate.is_open(32));
        assert!(gate.is_open(33));
    }

    #[test]
    fn arming_moves_the_window() {
        let mut gate = SuppressionGate::new();
        gate.arm(100);
        assert_eq!(gate.mark(), 100);
        assert!(!gate.is_open(132));
        assert!(gate.is_open(133));
    }
}
