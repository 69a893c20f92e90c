//! Playback clock
//!
//! Wall-clock anchored position source driving block rendering. The clock
//! runs at a configurable speed ratio and can be paused, sought and reset
//! from any thread.

use parking_lot::Mutex;
use std::time::Instant;

struct ClockState {
    /// Wall-clock anchor while running; `None` when paused
    anchor: Option<Instant>,

    /// Position at the anchor, in microseconds
    base_us: i64,

    /// Speed ratio; 1.0 is realtime
    speed: f64,
}

/// Monotonic playback position in microseconds
pub struct RealTimeClock {
    state: Mutex<ClockState>,
}

impl RealTimeClock {
    /// Create a paused clock at position zero
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ClockState {
                anchor: None,
                base_us: 0,
                speed: 1.0,
            }),
        }
    }

    /// Current position in microseconds
    pub fn position_us(&self) -> i64 {
        let state = self.state.lock();
        match state.anchor {
            Some(anchor) => {
                let elapsed_us = anchor.elapsed().as_micros() as i64;
                state.base_us + (elapsed_us as f64 * state.speed) as i64
            }
            None => state.base_us,
        }
    }

    /// Whether the clock is advancing
    pub fn is_running(&self) -> bool {
        self.state.lock().anchor.is_some()
    }

    /// Start or resume the clock
    pub fn play(&self) {
        let mut state = self.state.lock();
        if state.anchor.is_none() {
            state.anchor = Some(Instant::now());
        }
    }

    /// Freeze the clock at its current position
    pub fn pause(&self) {
        let mut state = self.state.lock();
        if let Some(anchor) = state.anchor.take() {
            let elapsed_us = anchor.elapsed().as_micros() as i64;
            state.base_us += (elapsed_us as f64 * state.speed) as i64;
        }
    }

    /// Jump to a position, keeping the running state
    pub fn seek(&self, position_us: i64) {
        let mut state = self.state.lock();
        state.base_us = position_us;
        if state.anchor.is_some() {
            state.anchor = Some(Instant::now());
        }
    }

    /// Current speed ratio
    pub fn speed(&self) -> f64 {
        self.state.lock().speed
    }

    /// Change the speed ratio, re-anchoring so position stays continuous
    pub fn set_speed(&self, speed: f64) {
        let mut state = self.state.lock();
        if let Some(anchor) = state.anchor.take() {
            let elapsed_us = anchor.elapsed().as_micros() as i64;
            state.base_us += (elapsed_us as f64 * state.speed) as i64;
            state.anchor = Some(Instant::now());
        }
        state.speed = speed.clamp(0.1, 8.0);
    }

    /// Stop the clock and return to position zero
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.anchor = None;
        state.base_us = 0;
        state.speed = 1.0;
    }
}

impl Default for RealTimeClock {
    fn default() -> Self {
        Self::new()
    }
}
