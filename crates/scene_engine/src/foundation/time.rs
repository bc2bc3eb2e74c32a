//! Frame time tracking
//!
//! The engine writes the elapsed time into the `Time` global semantic once per
//! frame. Headless runs can drive the clock manually with [`FrameClock::advance`]
//! so frames stay deterministic.

use std::time::Instant;

/// Frame clock feeding the `Time` shader semantic
#[derive(Debug, Clone)]
pub struct FrameClock {
    last_frame: Option<Instant>,
    delta_time: f32,
    total_time: f32,
    frame_count: u64,
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameClock {
    /// Create a new clock; the first wall-clock tick starts measuring
    pub const fn new() -> Self {
        Self {
            last_frame: None,
            delta_time: 0.0,
            total_time: 0.0,
            frame_count: 0,
        }
    }

    /// Advance using wall-clock time (call once per frame)
    pub fn tick(&mut self) {
        let now = Instant::now();
        let delta = self
            .last_frame
            .map_or(0.0, |last| now.duration_since(last).as_secs_f32());
        self.last_frame = Some(now);
        self.advance(delta);
    }

    /// Advance by an explicit delta in seconds
    pub fn advance(&mut self, delta_seconds: f32) {
        self.delta_time = delta_seconds.max(0.0);
        self.total_time += self.delta_time;
        self.frame_count += 1;
    }

    /// Get the time since the last frame in seconds
    pub const fn delta_time(&self) -> f32 {
        self.delta_time
    }

    /// Get the total elapsed time in seconds
    pub const fn total_time(&self) -> f32 {
        self.total_time
    }

    /// Get the number of frames advanced so far
    pub const fn frame_count(&self) -> u64 {
        self.frame_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_advance_accumulates() {
        let mut clock = FrameClock::new();
        clock.advance(0.5);
        clock.advance(0.25);
        assert_eq!(clock.frame_count(), 2);
        assert!((clock.total_time() - 0.75).abs() < 1e-6);
        assert!((clock.delta_time() - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_negative_delta_is_clamped() {
        let mut clock = FrameClock::new();
        clock.advance(-1.0);
        assert_eq!(clock.total_time(), 0.0);
    }
}
