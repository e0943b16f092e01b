//! Monotonic fence timeline and pollable completion tokens.
//!
//! Command buffers signal monotonically increasing fence values as the device
//! retires them. A [`CompletionToken`] wraps one such value; polling it is a
//! single atomic load. Nothing in this crate ever blocks on a token: an
//! allocation that would need an incomplete generation allocates fresh
//! storage instead of waiting.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug)]
struct TimelineShared {
    /// Highest fence value the device has reported complete.
    completed: AtomicU64,
}

/// Process-wide fence timeline, shared by cloning.
///
/// Stands in for the device queue's fence: opening a command list assigns the
/// next fence value, and the driver of the timeline advances `completed` as
/// submissions retire (always monotonically, mirroring how a completed fence
/// only ever moves forward).
#[derive(Debug, Clone)]
pub struct FenceTimeline {
    shared: Arc<TimelineShared>,
    next_value: Arc<AtomicU64>,
}

impl FenceTimeline {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(TimelineShared {
                completed: AtomicU64::new(0),
            }),
            // Value 0 is the "nothing submitted" state, so real fences start at 1.
            next_value: Arc::new(AtomicU64::new(1)),
        }
    }

    /// The highest fence value known to be complete.
    pub fn completed_value(&self) -> u64 {
        self.shared.completed.load(Ordering::Acquire)
    }

    /// Advance the completed counter to at least `value`.
    ///
    /// Values below the current counter are ignored; completion never moves
    /// backwards.
    pub fn signal_completed(&self, value: u64) {
        self.shared.completed.fetch_max(value, Ordering::AcqRel);
    }

    /// Reserve the next fence value and hand back its token.
    pub(crate) fn issue_token(&self) -> CompletionToken {
        let value = self.next_value.fetch_add(1, Ordering::Relaxed);
        CompletionToken {
            shared: Arc::clone(&self.shared),
            value,
        }
    }
}

impl Default for FenceTimeline {
    fn default() -> Self {
        Self::new()
    }
}

/// A pollable "has that submission finished" handle.
#[derive(Debug, Clone)]
pub struct CompletionToken {
    shared: Arc<TimelineShared>,
    value: u64,
}

impl CompletionToken {
    /// The fence value this token waits on.
    pub fn value(&self) -> u64 {
        self.value
    }

    /// Non-blocking completion check.
    pub fn is_complete(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire) >= self.value
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_complete_in_fence_order() {
        let timeline = FenceTimeline::new();
        let a = timeline.issue_token();
        let b = timeline.issue_token();

        assert!(!a.is_complete());
        assert!(!b.is_complete());

        timeline.signal_completed(a.value());
        assert!(a.is_complete());
        assert!(!b.is_complete());

        timeline.signal_completed(b.value());
        assert!(b.is_complete());
    }

    #[test]
    fn completion_never_regresses() {
        let timeline = FenceTimeline::new();
        let token = timeline.issue_token();

        timeline.signal_completed(token.value());
        timeline.signal_completed(0);

        assert!(token.is_complete());
        assert_eq!(timeline.completed_value(), token.value());
    }
}
