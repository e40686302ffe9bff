//! Turns viewport scroll samples into "load the next page" intents.

use std::time::Duration;

use tokio::time::Instant;

use crate::scheduler::Debounce;

/// Distance from the bottom of the content below which the next page is
/// requested.
pub const DEFAULT_THRESHOLD: f64 = 1000.0;
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(150);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScrollSample {
    /// Offset of the top of the viewport.
    pub scroll_y: f64,
    pub viewport_height: f64,
    pub content_height: f64,
}

impl ScrollSample {
    pub fn distance_to_bottom(&self) -> f64 {
        self.content_height - (self.scroll_y + self.viewport_height)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollIntent {
    LoadMore,
    Nothing,
}

/// The undebounced decision for a single sample.
pub fn intent(
    previous_y: f64,
    sample: &ScrollSample,
    in_flight: bool,
    threshold: f64,
) -> ScrollIntent {
    let downward = sample.scroll_y > previous_y;
    if downward && !in_flight && sample.distance_to_bottom() < threshold {
        ScrollIntent::LoadMore
    } else {
        ScrollIntent::Nothing
    }
}

/// Debounced scroll handling.
///
/// Feed every scroll event into [ScrollController::on_scroll] and call
/// [ScrollController::poll] when the debounce deadline may have passed.
/// At most one intent is produced per quiet period.
#[derive(Debug, Clone)]
pub struct ScrollController {
    threshold: f64,
    debounce: Debounce,
    last_y: f64,
    /// Latest downward sample and the position it moved away from.
    pending: Option<(f64, ScrollSample)>,
}

impl Default for ScrollController {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD, DEFAULT_DEBOUNCE)
    }
}

impl ScrollController {
    pub fn new(threshold: f64, debounce: Duration) -> Self {
        Self {
            threshold,
            debounce: Debounce::new(debounce),
            last_y: 0.0,
            pending: None,
        }
    }

    /// Returns whether the sample was a downward scroll.
    pub fn on_scroll(&mut self, sample: ScrollSample, now: Instant) -> bool {
        let previous_y = self.last_y;
        self.last_y = sample.scroll_y;
        if sample.scroll_y <= previous_y {
            return false;
        }
        // keep the origin of a burst of downward events
        let origin = self.pending.map_or(previous_y, |(origin, _)| origin);
        self.pending = Some((origin, sample));
        self.debounce.record(now);
        true
    }

    /// When the next [ScrollController::poll] may produce an intent.
    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    pub fn poll(&mut self, now: Instant, in_flight: bool) -> ScrollIntent {
        if !self.debounce.take_due(now) {
            return ScrollIntent::Nothing;
        }
        match self.pending.take() {
            Some((origin, sample)) => intent(origin, &sample, in_flight, self.threshold),
            None => ScrollIntent::Nothing,
        }
    }
}
