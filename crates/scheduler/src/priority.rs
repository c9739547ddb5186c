//! Render jobs and their priority lanes
//!
//! A render job is nothing more than a zero-argument closure tagged with the
//! lane it belongs to. Jobs carry no identity: callers that want duplicate
//! suppression track it themselves.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

/// Render lane
///
/// `High` is for interactive, on-screen work; `Low` is for background work
/// such as prefetching off-screen pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum RenderPriority {
    Low = 0,
    High = 1,
}

impl fmt::Display for RenderPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => f.write_str("high"),
            Self::Low => f.write_str("low"),
        }
    }
}

/// Failure of a single render job
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum JobError {
    #[error("render job failed: {0}")]
    Failed(String),
    #[error("render job panicked: {0}")]
    Panicked(String),
}

impl JobError {
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed(message.into())
    }

    /// Wrap any error, keeping its full source chain in the message
    pub fn from_error(error: &(dyn std::error::Error + 'static)) -> Self {
        let mut message = error.to_string();
        let mut source = error.source();
        while let Some(cause) = source {
            message.push_str(": ");
            message.push_str(&cause.to_string());
            source = cause.source();
        }
        Self::Failed(message)
    }

    fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(text) = payload.downcast_ref::<&str>() {
            (*text).to_string()
        } else if let Some(text) = payload.downcast_ref::<String>() {
            text.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

/// Outcome of running a render job
pub type JobResult = Result<(), JobError>;

/// A unit of render work owned by the queue until it runs or is discarded
pub struct RenderJob {
    priority: RenderPriority,
    execute: Box<dyn FnOnce() -> JobResult>,
}

impl RenderJob {
    pub fn new(priority: RenderPriority, execute: impl FnOnce() -> JobResult + 'static) -> Self {
        Self { priority, execute: Box::new(execute) }
    }

    pub fn high(execute: impl FnOnce() -> JobResult + 'static) -> Self {
        Self::new(RenderPriority::High, execute)
    }

    pub fn low(execute: impl FnOnce() -> JobResult + 'static) -> Self {
        Self::new(RenderPriority::Low, execute)
    }

    /// Job whose body cannot fail
    pub fn infallible(priority: RenderPriority, execute: impl FnOnce() + 'static) -> Self {
        Self::new(priority, move || {
            execute();
            Ok(())
        })
    }

    pub fn priority(&self) -> RenderPriority {
        self.priority
    }

    /// Run the job, converting a panic into [`JobError::Panicked`]
    pub fn run(self) -> JobResult {
        panic::catch_unwind(AssertUnwindSafe(self.execute)).unwrap_or_else(|payload| {
            Err(JobError::from_panic(payload))
        })
    }
}

impl fmt::Debug for RenderJob {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RenderJob").field("priority", &self.priority).finish_non_exhaustive()
    }
}

/// Report emitted on the queue's error channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobFailure {
    /// Lane the failing job came from
    pub priority: RenderPriority,

    /// Drain pass during which the job ran (1-based)
    pub pass: u64,

    pub error: JobError,
}
