//! One-way boolean latch.

use std::sync::atomic::{AtomicBool, Ordering};

/// A flag that can be set but never cleared.
///
/// A latch has no `reset`; the only way back is a new process.
#[derive(Debug, Default)]
pub struct Latch {
    set: AtomicBool,
}

impl Latch {
    pub const fn new() -> Self {
        Self {
            set: AtomicBool::new(false),
        }
    }

    pub fn is_set(&self) -> bool {
        self.set.load(Ordering::Acquire)
    }

    /// Set the latch. Returns `true` only for the call that flipped it.
    pub fn set(&self) -> bool {
        !self.set.swap(true, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn starts_clear() {
        assert!(!Latch::new().is_set());
    }

    #[test]
    fn first_set_wins() {
        let latch = Latch::new();
        assert!(latch.set());
        assert!(!latch.set());
        assert!(latch.is_set());
    }

    #[test]
    fn exactly_one_thread_flips_it() {
        let latch = Arc::new(Latch::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let latch = Arc::clone(&latch);
                std::thread::spawn(move || latch.set())
            })
            .collect();
        let flips = handles
            .into_iter()
            .filter_map(|h| h.join().ok())
            .filter(|flipped| *flipped)
            .count();
        assert_eq!(flips, 1);
        assert!(latch.is_set());
    }
}
