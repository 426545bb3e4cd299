//! Decoding strategies shared by translation backends.

mod beam;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub use beam::{beam_search, BeamSearchParams, StepScorer};

/// Cooperative cancellation signal checked between decoding steps.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_is_visible_through_clones() {
        let flag = CancellationFlag::new();
        let observer = flag.clone();
        assert!(!observer.is_cancelled());
        flag.cancel();
        assert!(observer.is_cancelled());
    }
}
