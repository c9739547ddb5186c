//! Two-lane priority render queue
//!
//! Render jobs wait in a high or a low lane (FIFO within each lane) and are
//! drained on idle/animation opportunities provided by the host. Each drain
//! pass runs every pending high-priority job, then at most one low-priority
//! job, and only when no high-priority job is left. Background work therefore
//! never starves visible-region renders.
//!
//! The queue is an explicit per-session object. Cloning the handle shares the
//! same lanes; [`PriorityRenderQueue::teardown`] discards everything pending.

use crate::frame_budget::{FrameBudget, FRAME_BUDGET_60FPS};
use crate::host::{Clock, FrameScheduler, HostServices};
use crate::priority::{JobFailure, RenderJob, RenderPriority};
use crossbeam_channel::{Receiver, Sender};
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

/// Undrained failure reports kept before new ones are dropped
pub const FAILURE_CHANNEL_CAPACITY: usize = 256;

/// Queue lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Both lanes empty, no pass scheduled
    Idle,
    /// A drain pass is scheduled or running
    Draining,
}

/// Counters accumulated over the queue's lifetime
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DrainStats {
    /// Drain passes run
    pub passes: u64,

    /// High-priority jobs executed
    pub high_run: u64,

    /// Low-priority jobs executed
    pub low_run: u64,

    /// Executed jobs that reported an error or panicked
    pub failures: u64,

    /// Failure reports not delivered because the channel was full
    pub failures_dropped: u64,

    /// Jobs dropped by teardown or submitted after it
    pub discarded: u64,

    /// Passes that ran past the frame budget
    pub over_budget_passes: u64,
}

impl DrainStats {
    pub fn jobs_run(&self) -> u64 {
        self.high_run + self.low_run
    }
}

#[derive(Default)]
struct Lanes {
    high: VecDeque<RenderJob>,
    low: VecDeque<RenderJob>,
}

struct QueueInner {
    lanes: RefCell<Lanes>,
    state: Cell<QueueState>,
    torn_down: Cell<bool>,
    clock: Rc<dyn Clock>,
    frames: Option<Rc<dyn FrameScheduler>>,
    frame_budget: Duration,
    stats: RefCell<DrainStats>,
    failures_tx: Sender<JobFailure>,
    failures_rx: Receiver<JobFailure>,
}

/// Priority render queue
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::{
///     HostServices, ManualHost, PriorityRenderQueue, RenderJob, RenderPriority,
/// };
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// let host = ManualHost::new();
/// let queue = PriorityRenderQueue::from_host(&HostServices::manual(&host));
/// let order = Rc::new(RefCell::new(Vec::new()));
///
/// for (label, priority) in [
///     ("prefetch", RenderPriority::Low),
///     ("page-1", RenderPriority::High),
///     ("page-2", RenderPriority::High),
/// ] {
///     let order = order.clone();
///     queue.add(RenderJob::infallible(priority, move || order.borrow_mut().push(label)));
/// }
///
/// host.run_frame();
/// assert_eq!(*order.borrow(), vec!["page-1", "page-2", "prefetch"]);
/// ```
#[derive(Clone)]
pub struct PriorityRenderQueue {
    inner: Rc<QueueInner>,
}

impl PriorityRenderQueue {
    /// Create a queue draining on `frames`
    ///
    /// With `frames = None` no idle primitive exists and each enqueue drains
    /// synchronously, still honoring lane order.
    pub fn new(
        clock: Rc<dyn Clock>,
        frames: Option<Rc<dyn FrameScheduler>>,
        frame_budget: Duration,
    ) -> Self {
        let (failures_tx, failures_rx) = crossbeam_channel::bounded(FAILURE_CHANNEL_CAPACITY);

        if frames.is_none() {
            tracing::warn!("no idle scheduling primitive; render queue drains synchronously");
        }

        Self {
            inner: Rc::new(QueueInner {
                lanes: RefCell::new(Lanes::default()),
                state: Cell::new(QueueState::Idle),
                torn_down: Cell::new(false),
                clock,
                frames,
                frame_budget,
                stats: RefCell::new(DrainStats::default()),
                failures_tx,
                failures_rx,
            }),
        }
    }

    /// Queue wired to a host bundle with the 60 FPS budget
    pub fn from_host(host: &HostServices) -> Self {
        Self::new(host.clock.clone(), host.frames.clone(), FRAME_BUDGET_60FPS)
    }

    pub fn add_high_priority(&self, job: RenderJob) {
        self.enqueue(RenderPriority::High, job);
    }

    pub fn add_low_priority(&self, job: RenderJob) {
        self.enqueue(RenderPriority::Low, job);
    }

    /// Enqueue a job into the lane its own priority names
    pub fn add(&self, job: RenderJob) {
        self.enqueue(job.priority(), job);
    }

    fn enqueue(&self, lane: RenderPriority, job: RenderJob) {
        let inner = &self.inner;

        if inner.torn_down.get() {
            inner.stats.borrow_mut().discarded += 1;
            tracing::debug!(%lane, "render queue torn down; discarding job");
            return;
        }

        {
            let mut lanes = inner.lanes.borrow_mut();
            match lane {
                RenderPriority::High => lanes.high.push_back(job),
                RenderPriority::Low => lanes.low.push_back(job),
            }
        }

        if inner.state.get() == QueueState::Idle {
            inner.state.set(QueueState::Draining);
            tracing::trace!("render queue idle -> draining");
            QueueInner::schedule_pass(inner);
        }
    }

    /// Discard every pending job in both lanes
    ///
    /// A job already running finishes. Jobs submitted afterwards are dropped.
    /// Safe to call repeatedly.
    pub fn teardown(&self) {
        let inner = &self.inner;
        let first = !inner.torn_down.replace(true);

        // Moved out first so job destructors run after the borrow ends.
        let discarded = std::mem::take(&mut *inner.lanes.borrow_mut());
        let dropped = discarded.high.len() + discarded.low.len();
        drop(discarded);

        inner.stats.borrow_mut().discarded += dropped as u64;
        inner.state.set(QueueState::Idle);

        if first {
            tracing::debug!(dropped, "render queue torn down");
        }
    }

    pub fn state(&self) -> QueueState {
        self.inner.state.get()
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.torn_down.get()
    }

    pub fn high_pending(&self) -> usize {
        self.inner.lanes.borrow().high.len()
    }

    pub fn low_pending(&self) -> usize {
        self.inner.lanes.borrow().low.len()
    }

    pub fn pending(&self) -> usize {
        let lanes = self.inner.lanes.borrow();
        lanes.high.len() + lanes.low.len()
    }

    pub fn stats(&self) -> DrainStats {
        self.inner.stats.borrow().clone()
    }

    /// Error channel: one [`JobFailure`] per failed job
    ///
    /// Every receiver clone shares the same stream. At most
    /// [`FAILURE_CHANNEL_CAPACITY`] reports wait undrained; later ones are
    /// counted in [`DrainStats::failures_dropped`] and discarded.
    pub fn failures(&self) -> Receiver<JobFailure> {
        self.inner.failures_rx.clone()
    }
}

impl QueueInner {
    fn schedule_pass(inner: &Rc<Self>) {
        match &inner.frames {
            Some(frames) => {
                let weak: Weak<Self> = Rc::downgrade(inner);
                frames.run_when_idle_or_before_paint(Box::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        if Self::drain_pass(&inner) {
                            Self::schedule_pass(&inner);
                        }
                    }
                }));
            }
            None => while Self::drain_pass(inner) {},
        }
    }

    /// Run one drain pass. Returns `true` when another pass is needed.
    fn drain_pass(inner: &Rc<Self>) -> bool {
        if inner.torn_down.get() {
            inner.state.set(QueueState::Idle);
            return false;
        }

        let budget = FrameBudget::start(inner.clock.clone(), inner.frame_budget);
        let pass = {
            let mut stats = inner.stats.borrow_mut();
            stats.passes += 1;
            stats.passes
        };

        let mut high_run = 0u64;
        loop {
            let next = inner.lanes.borrow_mut().high.pop_front();
            let Some(job) = next else {
                break;
            };
            inner.run_job(job, pass);
            high_run += 1;
        }

        let low = {
            let mut lanes = inner.lanes.borrow_mut();
            if lanes.high.is_empty() {
                lanes.low.pop_front()
            } else {
                None
            }
        };
        let low_run = u64::from(low.is_some());
        if let Some(job) = low {
            inner.run_job(job, pass);
        }

        let more = {
            let lanes = inner.lanes.borrow();
            !(lanes.high.is_empty() && lanes.low.is_empty())
        };

        {
            let mut stats = inner.stats.borrow_mut();
            stats.high_run += high_run;
            stats.low_run += low_run;
            if budget.is_exceeded() {
                stats.over_budget_passes += 1;
                tracing::warn!(
                    pass,
                    elapsed_ms = budget.elapsed().as_secs_f64() * 1000.0,
                    budget_ms = budget.budget().as_secs_f64() * 1000.0,
                    high_run,
                    low_run,
                    "render drain pass exceeded frame budget"
                );
            }
        }

        if !more || inner.torn_down.get() {
            inner.state.set(QueueState::Idle);
            tracing::trace!(pass, "render queue draining -> idle");
            return false;
        }

        true
    }

    fn run_job(&self, job: RenderJob, pass: u64) {
        let priority = job.priority();
        if let Err(error) = job.run() {
            tracing::warn!(pass, %priority, %error, "render job failed");
            let mut stats = self.stats.borrow_mut();
            stats.failures += 1;
            // The queue owns a receiver, so only a full channel can refuse.
            if self.failures_tx.try_send(JobFailure { priority, pass, error }).is_err() {
                stats.failures_dropped += 1;
            }
        }
    }
}
