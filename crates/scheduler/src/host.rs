//! Host capabilities consumed by the render core
//!
//! The core never touches a platform directly. Time, timers and frame/idle
//! callbacks come in through the small traits below, injected at construction.
//! [`ManualHost`] implements all of them over a virtual clock so the whole
//! core runs deterministically in tests and in the CLI simulator.

use crate::cancel::TimerHandle;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::pin;
use std::rc::Rc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Deferred unit of host work
pub type Callback = Box<dyn FnOnce()>;

/// Monotonic time source
pub trait Clock {
    /// Time elapsed since an arbitrary, fixed origin
    fn now(&self) -> Duration;
}

/// One-shot timers
pub trait TimerHost {
    /// Run `callback` once after `delay`, unless the returned handle is cancelled first
    fn after(&self, delay: Duration, callback: Callback) -> TimerHandle;
}

/// Idle / animation-frame opportunities
pub trait FrameScheduler {
    /// Run `callback` when the host judges the thread free, or before the next paint
    fn run_when_idle_or_before_paint(&self, callback: Callback);
}

/// Wall clock backed by [`Instant`]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Frame scheduler that runs callbacks synchronously, in the caller's stack
///
/// Used where no real idle primitive exists.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImmediateFrames;

impl FrameScheduler for ImmediateFrames {
    fn run_when_idle_or_before_paint(&self, callback: Callback) {
        callback();
    }
}

struct PendingTimer {
    due: Duration,
    seq: u64,
    handle: TimerHandle,
    callback: Callback,
}

#[derive(Default)]
struct ManualState {
    now: Duration,
    next_seq: u64,
    timers: Vec<PendingTimer>,
    frames: VecDeque<Callback>,
}

impl ManualState {
    /// Remove and return the earliest live timer due at or before `limit`
    fn take_due(&mut self, limit: Duration) -> Option<PendingTimer> {
        self.timers.retain(|timer| !timer.handle.is_cancelled());

        let position = self
            .timers
            .iter()
            .enumerate()
            .filter(|(_, timer)| timer.due <= limit)
            .min_by_key(|(_, timer)| (timer.due, timer.seq))
            .map(|(index, _)| index)?;

        Some(self.timers.swap_remove(position))
    }
}

/// Deterministic host with a virtual clock
///
/// Time only moves when [`ManualHost::advance`] is called; frame callbacks only
/// run from [`ManualHost::run_frame`]. Cloning yields another handle to the
/// same host.
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::{ManualHost, TimerHost, Clock};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let host = ManualHost::new();
/// let fired = Rc::new(Cell::new(false));
/// let flag = fired.clone();
/// host.after(Duration::from_millis(16), Box::new(move || flag.set(true)));
///
/// host.advance(Duration::from_millis(15));
/// assert!(!fired.get());
/// host.advance(Duration::from_millis(1));
/// assert!(fired.get());
/// assert_eq!(host.now(), Duration::from_millis(16));
/// ```
#[derive(Clone, Default)]
pub struct ManualHost {
    state: Rc<RefCell<ManualState>>,
}

impl ManualHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move the clock forward, firing every timer that falls due on the way
    ///
    /// Timers fire in due-time order (registration order on ties) with the
    /// clock set to their due time. Timers scheduled by a firing callback also
    /// fire if they fall inside the advanced span. Returns the number fired.
    pub fn advance(&self, by: Duration) -> usize {
        let target = self.state.borrow().now + by;
        let mut fired = 0;

        loop {
            let next = self.state.borrow_mut().take_due(target);
            let Some(timer) = next else {
                break;
            };

            self.state.borrow_mut().now = timer.due;
            if !timer.handle.is_cancelled() {
                (timer.callback)();
                fired += 1;
            }
        }

        self.state.borrow_mut().now = target;
        fired
    }

    /// Jump to the next live timer and fire it (plus any due at the same instant)
    ///
    /// Returns `false` when no timer is pending.
    pub fn advance_to_next_timer(&self) -> bool {
        let next_due = {
            let mut state = self.state.borrow_mut();
            state.timers.retain(|timer| !timer.handle.is_cancelled());
            state.timers.iter().map(|timer| timer.due).min()
        };

        match next_due {
            Some(due) => {
                let now = self.now();
                self.advance(due.saturating_sub(now));
                true
            }
            None => false,
        }
    }

    /// Run the frame callbacks queued before this call
    ///
    /// Callbacks queued while running are left for the next frame. Returns
    /// the number of callbacks run.
    pub fn run_frame(&self) -> usize {
        let batch: Vec<Callback> = self.state.borrow_mut().frames.drain(..).collect();
        let count = batch.len();

        for callback in batch {
            callback();
        }

        count
    }

    /// Run frames until none are queued. Returns the number of frames run.
    pub fn run_until_idle(&self) -> usize {
        let mut frames = 0;
        while self.run_frame() > 0 {
            frames += 1;
        }
        frames
    }

    /// Number of queued frame callbacks
    pub fn pending_frames(&self) -> usize {
        self.state.borrow().frames.len()
    }

    /// Number of armed timers
    pub fn pending_timers(&self) -> usize {
        self.state.borrow().timers.iter().filter(|timer| !timer.handle.is_cancelled()).count()
    }

    /// Drive a future to completion by alternating polls with host work
    ///
    /// Between polls the host runs one frame; when no frame is queued it jumps
    /// to the next timer. Returns `None` if the future is still pending once
    /// the host has nothing left to run.
    pub fn run_to_completion<F: Future>(&self, future: F) -> Option<F::Output> {
        let mut future = pin!(future);
        let waker = futures::task::noop_waker();
        let mut cx = Context::from_waker(&waker);

        loop {
            if let Poll::Ready(output) = future.as_mut().poll(&mut cx) {
                return Some(output);
            }

            if self.run_frame() == 0 && !self.advance_to_next_timer() {
                return None;
            }
        }
    }
}

impl Clock for ManualHost {
    fn now(&self) -> Duration {
        self.state.borrow().now
    }
}

impl TimerHost for ManualHost {
    fn after(&self, delay: Duration, callback: Callback) -> TimerHandle {
        let handle = TimerHandle::new();
        let mut state = self.state.borrow_mut();
        let seq = state.next_seq;
        state.next_seq += 1;
        let due = state.now + delay;
        state.timers.push(PendingTimer { due, seq, handle: handle.clone(), callback });
        handle
    }
}

impl FrameScheduler for ManualHost {
    fn run_when_idle_or_before_paint(&self, callback: Callback) {
        self.state.borrow_mut().frames.push_back(callback);
    }
}

/// Bundle of host capabilities handed to a viewer session
///
/// `frames` is optional: without an idle primitive the render queue drains
/// synchronously.
#[derive(Clone)]
pub struct HostServices {
    pub clock: Rc<dyn Clock>,
    pub timers: Rc<dyn TimerHost>,
    pub frames: Option<Rc<dyn FrameScheduler>>,
}

impl HostServices {
    pub fn new(
        clock: Rc<dyn Clock>,
        timers: Rc<dyn TimerHost>,
        frames: Option<Rc<dyn FrameScheduler>>,
    ) -> Self {
        Self { clock, timers, frames }
    }

    /// All capabilities served by one [`ManualHost`]
    pub fn manual(host: &ManualHost) -> Self {
        let shared = Rc::new(host.clone());
        Self { clock: shared.clone(), timers: shared.clone(), frames: Some(shared) }
    }

    /// Frame scheduler to yield on, falling back to [`ImmediateFrames`]
    pub fn frames_or_immediate(&self) -> Rc<dyn FrameScheduler> {
        self.frames.clone().unwrap_or_else(|| Rc::new(ImmediateFrames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn recorder() -> (Rc<RefCell<Vec<&'static str>>>, impl Fn(&'static str) -> Callback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        let make = move |label: &'static str| -> Callback {
            let sink = sink.clone();
            Box::new(move || sink.borrow_mut().push(label))
        };
        (log, make)
    }

    #[test]
    fn test_timers_fire_in_due_order() {
        let host = ManualHost::new();
        let (log, make) = recorder();

        host.after(Duration::from_millis(30), make("late"));
        host.after(Duration::from_millis(10), make("early"));
        host.after(Duration::from_millis(10), make("early-second"));

        assert_eq!(host.advance(Duration::from_millis(50)), 3);
        assert_eq!(*log.borrow(), vec!["early", "early-second", "late"]);
    }

    #[test]
    fn test_cancelled_timer_never_fires() {
        let host = ManualHost::new();
        let (log, make) = recorder();

        let handle = host.after(Duration::from_millis(5), make("cancelled"));
        handle.cancel();

        assert_eq!(host.pending_timers(), 0);
        host.advance(Duration::from_millis(10));
        assert!(log.borrow().is_empty());
    }

    #[test]
    fn test_timer_sees_its_due_time() {
        let host = ManualHost::new();
        let seen = Rc::new(Cell::new(Duration::ZERO));
        let clock = host.clone();
        let slot = seen.clone();

        host.after(Duration::from_millis(7), Box::new(move || slot.set(clock.now())));
        host.advance(Duration::from_millis(20));

        assert_eq!(seen.get(), Duration::from_millis(7));
        assert_eq!(host.now(), Duration::from_millis(20));
    }

    #[test]
    fn test_nested_timer_fires_within_span() {
        let host = ManualHost::new();
        let (log, make) = recorder();
        let inner_host = host.clone();
        let nested = make("nested");

        host.after(
            Duration::from_millis(5),
            Box::new(move || {
                inner_host.after(Duration::from_millis(5), nested);
            }),
        );

        host.advance(Duration::from_millis(10));
        assert_eq!(*log.borrow(), vec!["nested"]);
    }

    #[test]
    fn test_frame_callbacks_queued_during_frame_wait() {
        let host = ManualHost::new();
        let (log, make) = recorder();
        let inner_host = host.clone();
        let second = make("second");

        host.run_when_idle_or_before_paint(Box::new(move || {
            inner_host.run_when_idle_or_before_paint(second);
        }));

        assert_eq!(host.run_frame(), 1);
        assert!(log.borrow().is_empty());
        assert_eq!(host.pending_frames(), 1);

        host.run_frame();
        assert_eq!(*log.borrow(), vec!["second"]);
    }

    #[test]
    fn test_run_to_completion_stalls_without_work() {
        let host = ManualHost::new();
        let output = host.run_to_completion(futures::future::pending::<()>());
        assert!(output.is_none());
    }

    #[test]
    fn test_immediate_frames_run_inline() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        ImmediateFrames.run_when_idle_or_before_paint(Box::new(move || flag.set(true)));
        assert!(ran.get());
    }
}
