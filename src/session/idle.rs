/// Declares a session dead when the total packet count stops advancing
/// between two polls
#[derive(Debug, Clone, Copy)]
pub struct IdleDetector {
    last_total: u64,
}

impl IdleDetector {
    pub fn new(initial_total: u64) -> Self {
        Self {
            last_total: initial_total,
        }
    }

    /// Returns `true` when `total` did not change since the previous poll
    pub fn is_stalled(&mut self, total: u64) -> bool {
        let stalled = total == self.last_total;
        self.last_total = total;
        stalled
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unchanged_counter_is_idle() {
        let mut idle = IdleDetector::new(120);
        assert!(idle.is_stalled(120));
    }

    #[test]
    fn advancing_counter_is_alive() {
        let mut idle = IdleDetector::new(120);
        assert!(!idle.is_stalled(121));
        assert!(!idle.is_stalled(250));
        assert!(idle.is_stalled(250));
    }
}
