//! Render gates: debounce and throttle
//!
//! Both wrap a render callback and turn a high-frequency stream of trigger
//! requests (scroll pixels, resize pixels, zoom steps) into a bounded number
//! of executions. Timers come from the injected [`TimerHost`].
//!
//! Once cancelled (explicitly or by dropping the gate) the callback never
//! runs again and no timer stays armed.

use crate::cancel::TimerHandle;
use crate::host::TimerHost;
use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Default debounce delay, one 60 Hz frame
pub const DEFAULT_DEBOUNCE_DELAY: Duration = Duration::from_millis(16);

/// Default throttle window, one 60 Hz frame
pub const DEFAULT_THROTTLE_LIMIT: Duration = Duration::from_millis(16);

type RenderFn = RefCell<Box<dyn FnMut()>>;

struct DebounceInner {
    timers: Rc<dyn TimerHost>,
    delay: Duration,
    render: RenderFn,
    pending: RefCell<Option<TimerHandle>>,
    cancelled: Cell<bool>,
    runs: Cell<u64>,
}

impl DebounceInner {
    fn fire(&self) {
        self.pending.borrow_mut().take();
        if self.cancelled.get() {
            return;
        }

        self.runs.set(self.runs.get() + 1);
        (self.render.borrow_mut())();
    }
}

/// Trailing-edge debounce
///
/// Every [`Debounce::request`] restarts the delay; the callback runs once,
/// `delay` after the last request of a burst.
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::{Debounce, ManualHost};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let host = ManualHost::new();
/// let runs = Rc::new(Cell::new(0));
/// let counter = runs.clone();
/// let relayout = Debounce::new(Rc::new(host.clone()), Duration::from_millis(100), move || {
///     counter.set(counter.get() + 1)
/// });
///
/// for _ in 0..10 {
///     relayout.request();
///     host.advance(Duration::from_millis(20));
/// }
/// host.advance(Duration::from_millis(100));
/// assert_eq!(runs.get(), 1);
/// ```
pub struct Debounce {
    inner: Rc<DebounceInner>,
}

impl Debounce {
    pub fn new(timers: Rc<dyn TimerHost>, delay: Duration, render: impl FnMut() + 'static) -> Self {
        Self {
            inner: Rc::new(DebounceInner {
                timers,
                delay,
                render: RefCell::new(Box::new(render)),
                pending: RefCell::new(None),
                cancelled: Cell::new(false),
                runs: Cell::new(0),
            }),
        }
    }

    /// Request a run, restarting the delay
    pub fn request(&self) {
        if self.inner.cancelled.get() {
            return;
        }

        if let Some(previous) = self.inner.pending.borrow_mut().take() {
            previous.cancel();
        }

        let weak: Weak<DebounceInner> = Rc::downgrade(&self.inner);
        let handle = self.inner.timers.after(
            self.inner.delay,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.fire();
                }
            }),
        );
        *self.inner.pending.borrow_mut() = Some(handle);
    }

    /// Release the pending timer and disable the gate. Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.set(true);
        if let Some(pending) = self.inner.pending.borrow_mut().take() {
            pending.cancel();
        }
    }

    pub fn is_pending(&self) -> bool {
        self.inner.pending.borrow().is_some()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
    }

    /// Number of times the callback has run
    pub fn runs(&self) -> u64 {
        self.inner.runs.get()
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }
}

impl Drop for Debounce {
    fn drop(&mut self) {
        self.cancel();
    }
}

struct ThrottleInner {
    timers: Rc<dyn TimerHost>,
    limit: Duration,
    render: RenderFn,
    window: RefCell<Option<TimerHandle>>,
    trailing: Cell<bool>,
    cancelled: Cell<bool>,
    runs: Cell<u64>,
}

impl ThrottleInner {
    /// Run now and open a fresh window of `limit`
    fn run_and_open_window(self: &Rc<Self>) {
        let weak = Rc::downgrade(self);
        let handle = self.timers.after(
            self.limit,
            Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    inner.close_window();
                }
            }),
        );
        // Window is open before the callback runs so re-entrant requests coalesce.
        *self.window.borrow_mut() = Some(handle);

        self.runs.set(self.runs.get() + 1);
        (self.render.borrow_mut())();
    }

    fn close_window(self: &Rc<Self>) {
        self.window.borrow_mut().take();
        if self.cancelled.get() {
            return;
        }

        if self.trailing.replace(false) {
            self.run_and_open_window();
        }
    }
}

/// Leading-edge throttle with one coalesced trailing run
///
/// The first request runs the callback immediately and opens a window of
/// `limit`. Requests inside the window are dropped, but if any arrived the
/// callback runs exactly once more when the window closes (which opens a new
/// window).
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::{ManualHost, Throttle};
/// use std::cell::Cell;
/// use std::rc::Rc;
/// use std::time::Duration;
///
/// let host = ManualHost::new();
/// let runs = Rc::new(Cell::new(0));
/// let counter = runs.clone();
/// let on_scroll = Throttle::new(Rc::new(host.clone()), Duration::from_millis(16), move || {
///     counter.set(counter.get() + 1)
/// });
///
/// for _ in 0..5 {
///     on_scroll.request();
/// }
/// assert_eq!(runs.get(), 1);
///
/// host.advance(Duration::from_millis(16));
/// assert_eq!(runs.get(), 2);
/// ```
pub struct Throttle {
    inner: Rc<ThrottleInner>,
}

impl Throttle {
    pub fn new(timers: Rc<dyn TimerHost>, limit: Duration, render: impl FnMut() + 'static) -> Self {
        Self {
            inner: Rc::new(ThrottleInner {
                timers,
                limit,
                render: RefCell::new(Box::new(render)),
                window: RefCell::new(None),
                trailing: Cell::new(false),
                cancelled: Cell::new(false),
                runs: Cell::new(0),
            }),
        }
    }

    /// Request a run
    ///
    /// Runs immediately when no window is open, otherwise marks a trailing run.
    pub fn request(&self) {
        if self.inner.cancelled.get() {
            return;
        }

        if self.inner.window.borrow().is_some() {
            self.inner.trailing.set(true);
            return;
        }

        self.inner.run_and_open_window();
    }

    /// Release the window timer, drop any trailing run and disable the gate.
    /// Idempotent.
    pub fn cancel(&self) {
        self.inner.cancelled.set(true);
        self.inner.trailing.set(false);
        if let Some(window) = self.inner.window.borrow_mut().take() {
            window.cancel();
        }
    }

    /// Whether a throttle window is currently open
    pub fn is_throttling(&self) -> bool {
        self.inner.window.borrow().is_some()
    }

    /// Whether a trailing run is owed when the window closes
    pub fn has_trailing_run(&self) -> bool {
        self.inner.trailing.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.get()
    }

    pub fn runs(&self) -> u64 {
        self.inner.runs.get()
    }

    pub fn limit(&self) -> Duration {
        self.inner.limit
    }
}

impl Drop for Throttle {
    fn drop(&mut self) {
        self.cancel();
    }
}
