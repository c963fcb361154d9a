use std::collections::VecDeque;

use serde::Serialize;

// ─── Configuration ───────────────────────────────────────────────

/// Hard ceiling on the visualization window, whatever the caller asks for.
pub const MAX_WINDOW: usize = 50_000;

// ─── Public types ────────────────────────────────────────────────

/// One point on the live latency chart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Point {
    /// Stream index of the sample (the cursor value when it arrived)
    pub index: u64,
    /// Latency in milliseconds
    pub latency: i64,
}

/// Domains the renderer should use for its axes after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AxisBounds {
    pub x_min: u64,
    pub x_max: u64,
    pub y_min: i64,
    pub y_max: i64,
}

/// Sliding window of the most recent latency points.
///
/// Holds at most `window + 1` points; older points fall off the front.
/// `max_value` covers the whole stream, not just what is still in the window,
/// so the y axis never shrinks.
#[derive(Debug, Clone)]
pub struct VisualizationBuffer {
    points: VecDeque<Point>,
    window: usize,
    max_value: i64,
}

impl VisualizationBuffer {
    /// `window` is clamped to `1..=MAX_WINDOW`.
    pub fn new(window: usize) -> Self {
        let window = window.clamp(1, MAX_WINDOW);
        Self {
            points: VecDeque::with_capacity(window + 1),
            window,
            max_value: 0,
        }
    }

    pub fn push(&mut self, index: u64, latency: i64) {
        self.max_value = self.max_value.max(latency);
        self.points.push_back(Point { index, latency });
        if self.points.len() > self.window + 1 {
            self.points.pop_front();
        }
    }

    pub fn window(&self) -> usize {
        self.window
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn max_value(&self) -> i64 {
        self.max_value
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }

    /// Axis domains once `cursor` samples have been consumed: the x axis
    /// scrolls to keep the latest `window` indexes visible.
    pub fn axis_bounds(&self, cursor: u64) -> AxisBounds {
        let window = self.window as u64;
        let x_min = cursor.saturating_sub(window);
        AxisBounds {
            x_min,
            x_max: x_min + window - 1,
            y_min: 0,
            y_max: self.max_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_evicts_oldest_beyond_window_plus_one() {
        let mut buf = VisualizationBuffer::new(3);
        for i in 0..10 {
            buf.push(i, i as i64);
        }
        assert_eq!(buf.len(), 4);
        let idx: Vec<u64> = buf.points().map(|p| p.index).collect();
        assert_eq!(idx, vec![6, 7, 8, 9]);
    }

    #[test]
    fn test_max_value_outlives_eviction() {
        let mut buf = VisualizationBuffer::new(2);
        buf.push(0, 500);
        for i in 1..20 {
            buf.push(i, 1);
        }
        assert!(buf.points().all(|p| p.latency == 1));
        assert_eq!(buf.max_value(), 500);
    }

    #[test]
    fn test_window_is_capped() {
        assert_eq!(VisualizationBuffer::new(1_000_000).window(), MAX_WINDOW);
        assert_eq!(VisualizationBuffer::new(0).window(), 1);
    }

    #[test]
    fn test_axis_bounds_scroll_with_cursor() {
        let mut buf = VisualizationBuffer::new(100);
        buf.push(0, 42);

        let early = buf.axis_bounds(30);
        assert_eq!((early.x_min, early.x_max), (0, 99));
        assert_eq!(early.y_max, 42);

        let late = buf.axis_bounds(250);
        assert_eq!((late.x_min, late.x_max), (150, 249));
    }
}
