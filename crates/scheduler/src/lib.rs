//! PDF Render Scheduler Library
//!
//! Adaptive render scheduling and virtual windowing for a paged document
//! viewer.
//!
//! The crate decides *which* items of a long document (pages, thumbnails,
//! annotation rows) get rendered, *when*, and in *what order*:
//!
//! - [`compute_window`] maps a scroll position onto the index range to render.
//! - [`Debounce`] and [`Throttle`] coalesce bursts of scroll and resize events.
//! - [`PriorityRenderQueue`] drains visible work before prefetch work, one
//!   idle/animation opportunity at a time.
//! - [`process_in_chunks`] runs bulk work such as thumbnail generation while
//!   yielding to the host between chunks.
//! - [`FeatureGate`] keeps optional features unloaded unless wanted.
//!
//! Everything runs on one cooperative thread. Host capabilities (clock,
//! timers, frame callbacks, preference storage) are injected as traits, with
//! [`ManualHost`] as a deterministic stand-in for tests and simulations.
//!
//! # Example
//!
//! ```
//! use pdf_render_scheduler::{ManualHost, PriorityRenderQueue, RenderJob, HostServices};
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! let host = ManualHost::new();
//! let queue = PriorityRenderQueue::from_host(&HostServices::manual(&host));
//! let order = Rc::new(RefCell::new(Vec::new()));
//!
//! let log = order.clone();
//! queue.add_low_priority(RenderJob::low(move || {
//!     log.borrow_mut().push("prefetch page 9");
//!     Ok(())
//! }));
//! let log = order.clone();
//! queue.add_high_priority(RenderJob::high(move || {
//!     log.borrow_mut().push("visible page 3");
//!     Ok(())
//! }));
//!
//! host.run_until_idle();
//! assert_eq!(*order.borrow(), vec!["visible page 3", "prefetch page 9"]);
//! ```

mod batch;
mod cancel;
mod config;
mod features;
mod frame_budget;
mod gate;
mod host;
mod priority;
mod queue;
mod session;
mod viewport;

// Re-export public API
pub use batch::{
    process_in_chunks, yield_to_host, BatchError, ChunkProgress, YieldToHost, DEFAULT_CHUNK_SIZE,
};
pub use cancel::{CancellationToken, TimerHandle};
pub use config::{
    ConfigError, SchedulerConfig, ENV_CHUNK_SIZE, ENV_DEBOUNCE_MS, ENV_FRAME_BUDGET_US,
    ENV_OVERSCAN, ENV_THROTTLE_MS,
};
pub use features::{
    FeatureError, FeatureGate, HostEnvironment, MemoryPreferenceStore, PreferenceStore,
    Preferences, StoreError, PREFERENCES_KEY,
};
pub use frame_budget::{
    FrameBudget, EVENT_PROCESSING_RESERVE, FRAME_BUDGET_120FPS, FRAME_BUDGET_60FPS,
};
pub use gate::{Debounce, Throttle, DEFAULT_DEBOUNCE_DELAY, DEFAULT_THROTTLE_LIMIT};
pub use host::{
    Callback, Clock, FrameScheduler, HostServices, ImmediateFrames, ManualHost, SystemClock,
    TimerHost,
};
pub use priority::{JobError, JobFailure, JobResult, RenderJob, RenderPriority};
pub use queue::{DrainStats, PriorityRenderQueue, QueueState, FAILURE_CHANNEL_CAPACITY};
pub use session::{PageSource, ViewerSession};
pub use viewport::{
    compute_window, Axis, ViewportState, VisibleWindow, WindowConfig, WindowError,
    DEFAULT_OVERSCAN,
};
