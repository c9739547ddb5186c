//! Virtual windowing
//!
//! Maps a scroll position and viewport geometry onto the contiguous run of
//! item indices that must be rendered, padded with overscan on both sides.
//! Items are laid out back to back with a uniform extent along one axis, so
//! the same calculation serves page columns, thumbnail rows and annotation
//! lists alike.

use std::ops::RangeInclusive;

/// Default number of items rendered past each viewport edge
pub const DEFAULT_OVERSCAN: usize = 3;

/// Scroll axis of a virtual list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Axis {
    Horizontal,
    #[default]
    Vertical,
}

/// Geometry of a virtual list
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowConfig {
    /// Extent of one item along the scroll axis
    pub item_extent: f64,

    /// Extent of the scroll container along the scroll axis
    pub container_extent: f64,

    /// Items rendered beyond each edge of the viewport
    pub overscan: usize,

    pub axis: Axis,
}

impl WindowConfig {
    /// Vertical list with the default overscan
    pub fn new(item_extent: f64, container_extent: f64) -> Self {
        Self { item_extent, container_extent, overscan: DEFAULT_OVERSCAN, axis: Axis::Vertical }
    }

    pub fn with_overscan(mut self, overscan: usize) -> Self {
        self.overscan = overscan;
        self
    }

    pub fn with_axis(mut self, axis: Axis) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_container_extent(mut self, container_extent: f64) -> Self {
        self.container_extent = container_extent;
        self
    }
}

/// Scroll state owned by the scroll/resize handler
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportState {
    pub scroll_offset: f64,
    pub container_extent: f64,
    pub total_items: usize,
}

impl ViewportState {
    pub fn new(scroll_offset: f64, container_extent: f64, total_items: usize) -> Self {
        Self { scroll_offset, container_extent, total_items }
    }

    /// Window for this state, taking the container extent from the state
    pub fn window(&self, config: &WindowConfig) -> Result<VisibleWindow, WindowError> {
        compute_window(
            self.scroll_offset,
            self.total_items,
            &config.with_container_extent(self.container_extent),
        )
    }
}

/// Rejected windowing input
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum WindowError {
    #[error("scroll offset must be finite and non-negative, got {0}")]
    InvalidScrollOffset(f64),
    #[error("item extent must be finite and positive, got {0}")]
    InvalidItemExtent(f64),
    #[error("container extent must be finite and positive, got {0}")]
    InvalidContainerExtent(f64),
}

/// Items eligible for rendering, derived from one scroll position
#[derive(Debug, Clone, PartialEq)]
pub struct VisibleWindow {
    /// Inclusive index range; `None` when the list is empty
    range: Option<RangeInclusive<usize>>,

    /// Layout offset of the first windowed item
    pub offset: f64,

    /// Extent of the whole list
    pub total_extent: f64,
}

impl VisibleWindow {
    fn empty() -> Self {
        Self { range: None, offset: 0.0, total_extent: 0.0 }
    }

    pub fn start_index(&self) -> Option<usize> {
        self.range.as_ref().map(|range| *range.start())
    }

    pub fn end_index(&self) -> Option<usize> {
        self.range.as_ref().map(|range| *range.end())
    }

    pub fn range(&self) -> Option<RangeInclusive<usize>> {
        self.range.clone()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_none()
    }

    pub fn len(&self) -> usize {
        self.range.as_ref().map_or(0, |range| range.end() - range.start() + 1)
    }

    pub fn contains(&self, index: usize) -> bool {
        self.range.as_ref().is_some_and(|range| range.contains(&index))
    }

    /// Windowed indices in ascending order
    pub fn indices(&self) -> impl Iterator<Item = usize> {
        self.range.clone().into_iter().flatten()
    }

    pub fn visible_indices(&self) -> Vec<usize> {
        self.indices().collect()
    }
}

/// Compute the render window for a scroll position
///
/// `start = max(0, floor(scroll / item) - overscan)` and
/// `end = min(total - 1, start + ceil(container / item) + 2 * overscan)`.
/// Scrolling past the end of the list pins `start` to the last item so the
/// window is never inverted.
///
/// # Example
///
/// ```
/// use pdf_render_scheduler::{compute_window, WindowConfig};
///
/// let config = WindowConfig::new(150.0, 600.0).with_overscan(3);
/// let window = compute_window(320.0, 1000, &config).unwrap();
///
/// assert_eq!(window.start_index(), Some(0));
/// assert_eq!(window.end_index(), Some(10));
/// assert_eq!(window.total_extent, 150_000.0);
/// ```
pub fn compute_window(
    scroll_offset: f64,
    total_items: usize,
    config: &WindowConfig,
) -> Result<VisibleWindow, WindowError> {
    if !scroll_offset.is_finite() || scroll_offset < 0.0 {
        return Err(WindowError::InvalidScrollOffset(scroll_offset));
    }
    if !config.item_extent.is_finite() || config.item_extent <= 0.0 {
        return Err(WindowError::InvalidItemExtent(config.item_extent));
    }
    if !config.container_extent.is_finite() || config.container_extent <= 0.0 {
        return Err(WindowError::InvalidContainerExtent(config.container_extent));
    }

    if total_items == 0 {
        return Ok(VisibleWindow::empty());
    }

    let last = total_items - 1;
    let visible_count = (config.container_extent / config.item_extent).ceil() as usize;
    let first_visible = (scroll_offset / config.item_extent).floor() as usize;

    let start = first_visible.saturating_sub(config.overscan).min(last);
    let span = visible_count.saturating_add(config.overscan.saturating_mul(2));
    let end = start.saturating_add(span).min(last);

    Ok(VisibleWindow {
        range: Some(start..=end),
        offset: start as f64 * config.item_extent,
        total_extent: total_items as f64 * config.item_extent,
    })
}
