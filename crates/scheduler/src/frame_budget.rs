//! Frame budget tracking for drain passes
//!
//! A drain pass runs inside one idle/animation opportunity. The budget says
//! how much of that frame the pass may use before input handling starts to
//! lag; the render queue stamps every pass with one and logs passes that
//! overrun it.
//!
//! # Target Frame Times
//! - 120 FPS (ProMotion): 8.33ms per frame
//! - 60 FPS (standard): 16.67ms per frame

use crate::host::Clock;
use std::rc::Rc;
use std::time::Duration;

/// Default frame budget for 60 FPS displays (16.67ms)
pub const FRAME_BUDGET_60FPS: Duration = Duration::from_micros(16_667);

/// Frame budget for 120 FPS displays (8.33ms)
pub const FRAME_BUDGET_120FPS: Duration = Duration::from_micros(8_333);

/// Time reserved for event processing inside each frame (5ms)
pub const EVENT_PROCESSING_RESERVE: Duration = Duration::from_millis(5);

/// Budget tracker for one frame, measured on the injected clock
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::{FrameBudget, ManualHost, FRAME_BUDGET_60FPS};
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let host = ManualHost::new();
/// let budget = FrameBudget::start(Rc::new(host.clone()), FRAME_BUDGET_60FPS);
///
/// host.advance(Duration::from_millis(5));
/// assert!(!budget.is_exceeded());
///
/// host.advance(Duration::from_millis(10));
/// assert!(budget.is_exceeded());
/// ```
#[derive(Clone)]
pub struct FrameBudget {
    clock: Rc<dyn Clock>,

    /// When this frame started, on `clock`
    frame_start: Duration,

    budget: Duration,

    /// Time held back for event processing
    reserved: Duration,
}

impl FrameBudget {
    /// Start measuring a frame now
    pub fn start(clock: Rc<dyn Clock>, budget: Duration) -> Self {
        let frame_start = clock.now();
        Self { clock, frame_start, budget, reserved: EVENT_PROCESSING_RESERVE }
    }

    /// Override the event-processing reserve
    pub fn with_reserved(mut self, reserved: Duration) -> Self {
        self.reserved = reserved;
        self
    }

    /// Restart the measurement for a new frame
    pub fn reset(&mut self) {
        self.frame_start = self.clock.now();
    }

    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.frame_start)
    }

    /// Budget left in this frame, `Duration::ZERO` once exceeded
    pub fn remaining(&self) -> Duration {
        self.available_budget().saturating_sub(self.elapsed())
    }

    pub fn is_exceeded(&self) -> bool {
        self.remaining() == Duration::ZERO
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn reserved(&self) -> Duration {
        self.reserved
    }

    /// Total budget minus the reserve
    pub fn available_budget(&self) -> Duration {
        self.budget.saturating_sub(self.reserved)
    }
}

impl std::fmt::Debug for FrameBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameBudget")
            .field("frame_start", &self.frame_start)
            .field("budget", &self.budget)
            .field("reserved", &self.reserved)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::ManualHost;

    fn budget_on(host: &ManualHost, budget: Duration) -> FrameBudget {
        FrameBudget::start(Rc::new(host.clone()), budget)
    }

    #[test]
    fn test_constants() {
        assert_eq!(FRAME_BUDGET_60FPS.as_micros(), 16_667);
        assert_eq!(FRAME_BUDGET_120FPS.as_micros(), 8_333);
        assert_eq!(EVENT_PROCESSING_RESERVE.as_millis(), 5);
    }

    #[test]
    fn test_available_budget_subtracts_reserve() {
        let host = ManualHost::new();
        let budget = budget_on(&host, FRAME_BUDGET_60FPS);

        assert_eq!(budget.available_budget(), Duration::from_micros(11_667));
        assert_eq!(budget.remaining(), Duration::from_micros(11_667));
    }

    #[test]
    fn test_remaining_tracks_clock() {
        let host = ManualHost::new();
        let budget = budget_on(&host, Duration::from_millis(20)).with_reserved(Duration::ZERO);

        host.advance(Duration::from_millis(8));
        assert_eq!(budget.elapsed(), Duration::from_millis(8));
        assert_eq!(budget.remaining(), Duration::from_millis(12));

        host.advance(Duration::from_millis(30));
        assert_eq!(budget.remaining(), Duration::ZERO);
        assert!(budget.is_exceeded());
    }

    #[test]
    fn test_reset_restarts_frame() {
        let host = ManualHost::new();
        let mut budget = budget_on(&host, FRAME_BUDGET_120FPS);

        host.advance(Duration::from_millis(50));
        assert!(budget.is_exceeded());

        budget.reset();
        assert!(!budget.is_exceeded());
        assert_eq!(budget.elapsed(), Duration::ZERO);
    }

    #[test]
    fn test_reserve_larger_than_budget_is_always_exceeded() {
        let host = ManualHost::new();
        let budget =
            budget_on(&host, Duration::from_millis(2)).with_reserved(Duration::from_millis(5));

        assert_eq!(budget.available_budget(), Duration::ZERO);
        assert!(budget.is_exceeded());
    }
}
