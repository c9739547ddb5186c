//! Chunked batch processing
//!
//! Bulk work such as "generate a thumbnail for all 500 pages" is split into
//! fixed-size chunks. One chunk runs per host opportunity; between chunks the
//! processor yields back to the host so pending high-priority renders and
//! input events are serviced before the next chunk starts.
//!
//! The result is delivered only once every chunk has completed: the first
//! failing item fails the whole batch and no partial output escapes.

use crate::host::FrameScheduler;
use futures::future::try_join_all;
use futures::TryFutureExt;
use std::cell::{Cell, RefCell};
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll, Waker};

/// Default number of items per chunk
pub const DEFAULT_CHUNK_SIZE: usize = 10;

/// Failure of a chunked batch
#[derive(Debug, thiserror::Error)]
pub enum BatchError<E> {
    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    /// The owner was torn down before the batch started
    #[error("batch cancelled")]
    Cancelled,

    #[error("batch item {index} failed")]
    Item {
        /// Position of the failing item in the input
        index: usize,
        #[source]
        source: E,
    },
}

/// Progress through a chunked batch
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::ChunkProgress;
///
/// let mut progress = ChunkProgress::new(25, 10);
/// assert_eq!(progress.next_chunk(), Some(0..10));
/// progress.complete_chunk();
/// assert_eq!(progress.next_chunk(), Some(10..20));
/// progress.complete_chunk();
/// assert_eq!(progress.next_chunk(), Some(20..25));
/// progress.complete_chunk();
/// assert!(progress.is_complete());
/// assert_eq!(progress.chunks_completed(), 3);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkProgress {
    total: usize,
    processed: usize,
    chunk_size: usize,
    chunks_completed: usize,
}

impl ChunkProgress {
    /// `chunk_size` must be non-zero; [`process_in_chunks`] checks it before
    /// building a tracker.
    pub fn new(total: usize, chunk_size: usize) -> Self {
        Self { total, processed: 0, chunk_size: chunk_size.max(1), chunks_completed: 0 }
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn processed(&self) -> usize {
        self.processed
    }

    pub fn remaining(&self) -> usize {
        self.total - self.processed
    }

    pub fn is_complete(&self) -> bool {
        self.processed >= self.total
    }

    pub fn chunks_completed(&self) -> usize {
        self.chunks_completed
    }

    /// Number of chunks the whole batch needs
    pub fn chunk_count(&self) -> usize {
        self.total.div_ceil(self.chunk_size)
    }

    /// Input range of the next chunk, `None` when complete
    pub fn next_chunk(&self) -> Option<std::ops::Range<usize>> {
        if self.is_complete() {
            return None;
        }
        Some(self.processed..(self.processed + self.chunk_size).min(self.total))
    }

    /// Mark the chunk returned by [`ChunkProgress::next_chunk`] as done
    pub fn complete_chunk(&mut self) {
        self.processed = (self.processed + self.chunk_size).min(self.total);
        self.chunks_completed += 1;
    }

    /// Progress as a percentage (0.0 to 100.0)
    pub fn progress_percent(&self) -> f32 {
        if self.total == 0 {
            return 100.0;
        }
        (self.processed as f32 / self.total as f32) * 100.0
    }
}

#[derive(Default)]
struct YieldState {
    resumed: Cell<bool>,
    waker: RefCell<Option<Waker>>,
}

/// Future that completes on the host's next idle/animation opportunity
pub struct YieldToHost<'a> {
    frames: &'a dyn FrameScheduler,
    state: Option<Rc<YieldState>>,
}

impl Future for YieldToHost<'_> {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        let this = self.get_mut();

        match &this.state {
            Some(state) if state.resumed.get() => Poll::Ready(()),
            Some(state) => {
                *state.waker.borrow_mut() = Some(cx.waker().clone());
                Poll::Pending
            }
            None => {
                let state = Rc::new(YieldState::default());
                *state.waker.borrow_mut() = Some(cx.waker().clone());
                this.state = Some(state.clone());

                this.frames.run_when_idle_or_before_paint(Box::new(move || {
                    state.resumed.set(true);
                    let waker = state.waker.borrow_mut().take();
                    if let Some(waker) = waker {
                        waker.wake();
                    }
                }));

                match &this.state {
                    Some(state) if state.resumed.get() => Poll::Ready(()),
                    _ => Poll::Pending,
                }
            }
        }
    }
}

/// Suspend until the host's next idle/animation opportunity
pub fn yield_to_host(frames: &dyn FrameScheduler) -> YieldToHost<'_> {
    YieldToHost { frames, state: None }
}

/// Apply `transform` to every item, one chunk per host opportunity
///
/// Items inside a chunk are driven concurrently and may finish in any order;
/// the output always follows input order. Control returns to the host
/// between chunks, never inside one.
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::{process_in_chunks, BatchError, ManualHost};
/// use futures::future::ready;
///
/// let host = ManualHost::new();
/// let pages = vec![1, 2, 3, 4, 5];
/// let batch = process_in_chunks(&pages, 2, &host, |page| {
///     ready(Ok::<_, std::io::Error>(page * 10))
/// });
///
/// let thumbnails = host.run_to_completion(batch).unwrap().unwrap();
/// assert_eq!(thumbnails, vec![10, 20, 30, 40, 50]);
/// ```
pub async fn process_in_chunks<T, R, E, F, Fut>(
    items: &[T],
    chunk_size: usize,
    frames: &dyn FrameScheduler,
    mut transform: F,
) -> Result<Vec<R>, BatchError<E>>
where
    F: FnMut(&T) -> Fut,
    Fut: Future<Output = Result<R, E>>,
{
    if chunk_size == 0 {
        return Err(BatchError::InvalidChunkSize);
    }

    let mut progress = ChunkProgress::new(items.len(), chunk_size);
    let mut output = Vec::with_capacity(items.len());

    while let Some(range) = progress.next_chunk() {
        if progress.chunks_completed() > 0 {
            yield_to_host(frames).await;
        }

        let start = range.start;
        let chunk = try_join_all(items[range].iter().enumerate().map(|(offset, item)| {
            let index = start + offset;
            transform(item).map_err(move |source| BatchError::Item { index, source })
        }))
        .await;

        let results = match chunk {
            Ok(results) => results,
            Err(error) => {
                if let BatchError::Item { index, .. } = &error {
                    tracing::debug!(index, processed = progress.processed(), "batch item failed");
                }
                return Err(error);
            }
        };

        output.extend(results);
        progress.complete_chunk();
        tracing::trace!(
            chunk = progress.chunks_completed(),
            of = progress.chunk_count(),
            processed = progress.processed(),
            "batch chunk complete"
        );
    }

    tracing::debug!(items = output.len(), chunks = progress.chunks_completed(), "batch complete");
    Ok(output)
}
