use std::fmt;

use crate::inst::Pc;

/// Fetch-time direction oracle for conditional branches. The core never
/// hardcodes a policy; the decoded record carries whatever this trait
/// predicted, and commit judges it against the actual outcome.
pub trait BranchPredictor: fmt::Debug {
    fn predict_taken(&self, pc: Pc, target: Pc) -> bool;
}

/// Static backward-taken, forward-not-taken.
#[derive(Debug, Clone, Default)]
pub struct StaticPredictor;

impl StaticPredictor {
    pub fn new() -> Self {
        Self
    }
}

impl BranchPredictor for StaticPredictor {
    fn predict_taken(&self, pc: Pc, target: Pc) -> bool {
        // BTFNT
        target < pc
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_btfnt() {
        let p = StaticPredictor::new();
        assert!(p.predict_taken(10, 2));
        assert!(!p.predict_taken(10, 11));
        assert!(!p.predict_taken(10, 10));
    }
}
