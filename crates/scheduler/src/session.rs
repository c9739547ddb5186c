//! Viewer session
//!
//! Ties the pieces together for one scrolling document view: scroll events
//! pass through a throttle, resize events through a debounce, and each
//! recompute turns the current window into render jobs. Items entering the
//! window go to the high lane; the `overscan` items just past each edge are
//! prefetched on the low lane. Jobs for items that have since left both
//! regions are skipped when their turn comes.

use crate::batch::{process_in_chunks, BatchError};
use crate::config::SchedulerConfig;
use crate::gate::{Debounce, Throttle};
use crate::host::{FrameScheduler, HostServices};
use crate::priority::{JobError, JobFailure, RenderJob, RenderPriority};
use crate::queue::PriorityRenderQueue;
use crate::viewport::{compute_window, ViewportState, VisibleWindow, WindowConfig, WindowError};
use crossbeam_channel::Receiver;
use futures::future::ready;
use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

/// Document engine as seen by the scheduler
pub trait PageSource {
    type Thumbnail;
    type Error: std::error::Error + 'static;

    /// Number of items in the document; read on every recompute
    fn item_count(&self) -> usize;

    /// Render one item; `priority` tells prefetches apart from visible work
    fn render_item(&self, index: usize, priority: RenderPriority) -> Result<(), Self::Error>;

    fn render_thumbnail(&self, index: usize) -> Result<Self::Thumbnail, Self::Error>;
}

#[derive(Debug, Clone, Copy)]
struct Scheduled {
    ticket: u64,
    priority: RenderPriority,
    rendered: bool,
}

struct SessionInner<S> {
    source: Rc<S>,
    window_config: WindowConfig,
    chunk_size: usize,
    state: Cell<ViewportState>,
    window: RefCell<Option<VisibleWindow>>,
    queue: PriorityRenderQueue,
    frames: Rc<dyn FrameScheduler>,
    scheduled: RefCell<HashMap<usize, Scheduled>>,
    next_ticket: Cell<u64>,
}

impl<S: PageSource + 'static> SessionInner<S> {
    fn recompute(self: &Rc<Self>) {
        let mut state = self.state.get();
        state.total_items = self.source.item_count();
        self.state.set(state);

        let window = match state.window(&self.window_config) {
            Ok(window) => window,
            Err(error) => {
                tracing::warn!(%error, "skipping recompute");
                return;
            }
        };

        let mut wanted: Vec<(usize, RenderPriority)> =
            window.indices().map(|index| (index, RenderPriority::High)).collect();
        wanted.extend(
            prefetch_indices(&window, self.window_config.overscan, state.total_items)
                .into_iter()
                .map(|index| (index, RenderPriority::Low)),
        );

        let jobs = self.plan(&wanted);
        tracing::debug!(
            start = window.start_index(),
            end = window.end_index(),
            scroll_offset = state.scroll_offset,
            new_jobs = jobs.len(),
            "render window recomputed"
        );
        *self.window.borrow_mut() = Some(window);

        // Enqueued after all borrows end: without frames the queue drains inline.
        for job in jobs {
            self.queue.add(job);
        }
    }

    /// Update bookkeeping for the wanted items and build their jobs
    fn plan(self: &Rc<Self>, wanted: &[(usize, RenderPriority)]) -> Vec<RenderJob> {
        let mut scheduled = self.scheduled.borrow_mut();
        let keep: HashSet<usize> = wanted.iter().map(|&(index, _)| index).collect();
        scheduled.retain(|index, _| keep.contains(index));

        let mut jobs = Vec::new();
        for &(index, priority) in wanted {
            let upgrade = match scheduled.get(&index) {
                None => false,
                Some(entry) if entry.rendered || entry.priority >= priority => continue,
                Some(_) => true,
            };

            let ticket = self.next_ticket.get();
            self.next_ticket.set(ticket + 1);
            scheduled.insert(index, Scheduled { ticket, priority, rendered: false });

            if upgrade {
                tracing::trace!(index, "prefetch promoted to visible render");
            }
            jobs.push(self.render_job(index, priority, ticket));
        }
        jobs
    }

    fn render_job(
        self: &Rc<Self>,
        index: usize,
        priority: RenderPriority,
        ticket: u64,
    ) -> RenderJob {
        let weak: Weak<Self> = Rc::downgrade(self);
        RenderJob::new(priority, move || {
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            if !inner.is_current(index, ticket) {
                tracing::trace!(index, %priority, "skipping stale render");
                return Ok(());
            }

            inner
                .source
                .render_item(index, priority)
                .map_err(|error| JobError::from_error(&error))?;

            if let Some(entry) = inner.scheduled.borrow_mut().get_mut(&index) {
                if entry.ticket == ticket {
                    entry.rendered = true;
                }
            }
            Ok(())
        })
    }

    fn is_current(&self, index: usize, ticket: u64) -> bool {
        self.scheduled.borrow().get(&index).is_some_and(|entry| entry.ticket == ticket)
    }
}

/// Items within `overscan` of either window edge, outside the window
fn prefetch_indices(window: &VisibleWindow, overscan: usize, total_items: usize) -> Vec<usize> {
    let Some(range) = window.range() else {
        return Vec::new();
    };
    let (start, end) = (*range.start(), *range.end());

    let before = start.saturating_sub(overscan)..start;
    let after = end + 1..(end + 1 + overscan).min(total_items);
    before.chain(after).collect()
}

/// Render scheduling for one document view
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::{
///     HostServices, ManualHost, PageSource, RenderPriority, SchedulerConfig, ViewerSession,
/// };
/// use std::cell::RefCell;
/// use std::rc::Rc;
///
/// struct Pages(RefCell<Vec<usize>>);
///
/// impl PageSource for Pages {
///     type Thumbnail = ();
///     type Error = std::io::Error;
///
///     fn item_count(&self) -> usize {
///         50
///     }
///     fn render_item(&self, index: usize, _: RenderPriority) -> Result<(), Self::Error> {
///         self.0.borrow_mut().push(index);
///         Ok(())
///     }
///     fn render_thumbnail(&self, _: usize) -> Result<(), Self::Error> {
///         Ok(())
///     }
/// }
///
/// let host = ManualHost::new();
/// let pages = Rc::new(Pages(RefCell::new(Vec::new())));
/// let config = SchedulerConfig::default().with_overscan(0);
/// let services = HostServices::manual(&host);
/// let session = ViewerSession::new(pages.clone(), &services, &config, 100.0, 300.0).unwrap();
///
/// session.on_scroll(1000.0).unwrap();
/// host.run_until_idle();
/// assert_eq!(*pages.0.borrow(), vec![10, 11, 12, 13]);
/// ```
pub struct ViewerSession<S: PageSource + 'static> {
    inner: Rc<SessionInner<S>>,
    scroll_gate: Throttle,
    resize_gate: Debounce,
}

impl<S: PageSource + 'static> ViewerSession<S> {
    pub fn new(
        source: Rc<S>,
        host: &HostServices,
        config: &SchedulerConfig,
        item_extent: f64,
        container_extent: f64,
    ) -> Result<Self, WindowError> {
        let window_config =
            WindowConfig::new(item_extent, container_extent).with_overscan(config.overscan);
        compute_window(0.0, 0, &window_config)?;

        let total_items = source.item_count();
        let inner = Rc::new(SessionInner {
            source,
            window_config,
            chunk_size: config.chunk_size,
            state: Cell::new(ViewportState::new(0.0, container_extent, total_items)),
            window: RefCell::new(None),
            queue: PriorityRenderQueue::new(
                host.clock.clone(),
                host.frames.clone(),
                config.frame_budget,
            ),
            frames: host.frames_or_immediate(),
            scheduled: RefCell::new(HashMap::new()),
            next_ticket: Cell::new(0),
        });

        let scroll_target = Rc::downgrade(&inner);
        let scroll_gate = Throttle::new(host.timers.clone(), config.throttle_limit, move || {
            if let Some(inner) = scroll_target.upgrade() {
                inner.recompute();
            }
        });

        let resize_target = Rc::downgrade(&inner);
        let resize_gate = Debounce::new(host.timers.clone(), config.debounce_delay, move || {
            if let Some(inner) = resize_target.upgrade() {
                inner.recompute();
            }
        });

        Ok(Self { inner, scroll_gate, resize_gate })
    }

    /// Record a scroll position and request a throttled recompute
    pub fn on_scroll(&self, scroll_offset: f64) -> Result<(), WindowError> {
        if !scroll_offset.is_finite() || scroll_offset < 0.0 {
            return Err(WindowError::InvalidScrollOffset(scroll_offset));
        }

        let mut state = self.inner.state.get();
        state.scroll_offset = scroll_offset;
        self.inner.state.set(state);
        self.scroll_gate.request();
        Ok(())
    }

    /// Record a container size and request a debounced recompute
    pub fn on_resize(&self, container_extent: f64) -> Result<(), WindowError> {
        if !container_extent.is_finite() || container_extent <= 0.0 {
            return Err(WindowError::InvalidContainerExtent(container_extent));
        }

        let mut state = self.inner.state.get();
        state.container_extent = container_extent;
        self.inner.state.set(state);
        self.resize_gate.request();
        Ok(())
    }

    /// Recompute immediately, bypassing both gates
    pub fn refresh(&self) {
        if self.is_torn_down() {
            return;
        }
        self.inner.recompute();
    }

    /// Produce a thumbnail for every item, yielding to the host between chunks
    ///
    /// Fails with [`BatchError::Cancelled`] once the session is torn down.
    pub async fn build_thumbnails(&self) -> Result<Vec<S::Thumbnail>, BatchError<S::Error>> {
        if self.is_torn_down() {
            return Err(BatchError::Cancelled);
        }

        let source = self.inner.source.clone();
        let indices: Vec<usize> = (0..source.item_count()).collect();

        process_in_chunks(&indices, self.inner.chunk_size, self.inner.frames.as_ref(), |&index| {
            ready(source.render_thumbnail(index))
        })
        .await
    }

    /// Cancel both gates and discard queued renders. Idempotent.
    pub fn teardown(&self) {
        self.scroll_gate.cancel();
        self.resize_gate.cancel();
        self.inner.queue.teardown();
        self.inner.scheduled.borrow_mut().clear();
    }

    pub fn is_torn_down(&self) -> bool {
        self.inner.queue.is_torn_down()
    }

    /// Window from the most recent recompute
    pub fn window(&self) -> Option<VisibleWindow> {
        self.inner.window.borrow().clone()
    }

    pub fn state(&self) -> ViewportState {
        self.inner.state.get()
    }

    pub fn queue(&self) -> &PriorityRenderQueue {
        &self.inner.queue
    }

    pub fn failures(&self) -> Receiver<JobFailure> {
        self.inner.queue.failures()
    }
}

impl<S: PageSource + 'static> Drop for ViewerSession<S> {
    fn drop(&mut self) {
        self.teardown();
    }
}
