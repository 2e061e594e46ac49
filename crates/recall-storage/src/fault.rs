//! Insert fault injection.
//!
//! Only armed through `DurableStore::fail_inserts_after`, which is compiled
//! for tests and the `testing` feature.

use std::sync::atomic::{AtomicUsize, Ordering};

/// Fails every insert once `remaining` successful ones have been spent.
#[derive(Debug)]
pub(crate) struct FaultPlan {
    remaining: AtomicUsize,
}

impl Default for FaultPlan {
    fn default() -> Self {
        Self {
            remaining: AtomicUsize::new(usize::MAX),
        }
    }
}

impl FaultPlan {
    #[cfg(any(test, feature = "testing"))]
    pub(crate) fn arm(&self, successes: usize) {
        self.remaining.store(successes, Ordering::SeqCst);
    }

    /// Returns false if this insert must fail.
    pub(crate) fn allow_insert(&self) -> bool {
        self.remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                if n == usize::MAX {
                    Some(n)
                } else {
                    n.checked_sub(1)
                }
            })
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disarmed_plan_allows_everything() {
        let plan = FaultPlan::default();
        for _ in 0..1000 {
            assert!(plan.allow_insert());
        }
    }

    #[test]
    fn test_armed_plan_fails_after_budget() {
        let plan = FaultPlan::default();
        plan.arm(2);
        assert!(plan.allow_insert());
        assert!(plan.allow_insert());
        assert!(!plan.allow_insert());
        assert!(!plan.allow_insert());
    }
}
