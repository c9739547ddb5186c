//! Cancellation tokens for timers and scheduled callbacks
//!
//! A token is shared between the party that scheduled some deferred work and
//! the host that will eventually run it. The host checks the token right
//! before invoking the callback, so cancelling is enough to guarantee the
//! callback never runs.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

/// Shared cancellation flag
///
/// Clones observe the same state. Cancelling is idempotent.
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::CancellationToken;
///
/// let token = CancellationToken::new();
/// let host_side = token.clone();
///
/// assert!(token.cancel());
/// assert!(!token.cancel());
/// assert!(host_side.is_cancelled());
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    /// Create a token in the non-cancelled state
    pub fn new() -> Self {
        Self::default()
    }

    /// Cancel the token
    ///
    /// Returns `true` only for the call that actually flipped the flag.
    pub fn cancel(&self) -> bool {
        !self.cancelled.swap(true, Ordering::AcqRel)
    }

    /// Check whether `cancel()` was called on this token or any clone
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// Handle to a timer registered with a [`TimerHost`](crate::TimerHost)
///
/// Dropping the handle does not cancel the timer; call [`TimerHandle::cancel`].
#[derive(Debug, Clone, Default)]
pub struct TimerHandle {
    token: CancellationToken,
}

impl TimerHandle {
    /// Create a fresh, armed handle
    pub fn new() -> Self {
        Self::default()
    }

    /// Disarm the timer. Safe to call any number of times.
    pub fn cancel(&self) -> bool {
        self.token.cancel()
    }

    /// Whether the timer has been disarmed
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Token the host consults before firing
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
