use std::io::{self, Write};
use std::time::{Duration, Instant};

use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::ExecutableCommand;

use crate::scheduler::Coalescer;

pub const DEFAULT_THRESHOLD: usize = 1;

/// Geometry of the scrollable product list, in terminal rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub height: usize,
    pub offset: usize,
    pub content_height: usize,
}

impl Viewport {
    pub fn max_offset(&self) -> usize {
        self.content_height.saturating_sub(self.height)
    }

    pub fn is_near_bottom(&self, threshold: usize) -> bool {
        self.height
            .saturating_add(self.offset)
            .saturating_add(threshold)
            >= self.content_height
    }
}

/// Turns raw scroll events into a debounced "near the bottom" signal.
#[derive(Debug, Clone)]
pub struct ScrollObserver {
    gate: Coalescer,
    threshold: usize,
}

impl ScrollObserver {
    pub fn new(window: Duration, threshold: usize) -> Self {
        Self {
            gate: Coalescer::new(window),
            threshold,
        }
    }

    pub fn on_scroll(&mut self, now: Instant) {
        self.gate.trigger(now);
    }

    /// Evaluates the viewport at most once per coalesced burst.
    pub fn poll(&mut self, now: Instant, viewport: Viewport) -> bool {
        if !self.gate.take_ready(now) {
            return false;
        }
        viewport.is_near_bottom(self.threshold)
    }

    pub fn time_until_ready(&self, now: Instant) -> Option<Duration> {
        self.gate.time_until_ready(now)
    }

    pub fn cancel(&mut self) {
        self.gate.cancel();
    }
}

/// Terminal mouse reporting, held for as long as the list wants wheel events.
pub struct MouseCapture<W: Write> {
    writer: W,
}

impl<W: Write> MouseCapture<W> {
    pub fn acquire(mut writer: W) -> io::Result<Self> {
        writer.execute(EnableMouseCapture)?;
        Ok(Self { writer })
    }
}

impl<W: Write> Drop for MouseCapture<W> {
    fn drop(&mut self) {
        let _ = self.writer.execute(DisableMouseCapture);
    }
}
