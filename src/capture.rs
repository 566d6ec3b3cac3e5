//! Capture control bridge
//!
//! Boundary to the external camera/recording pipeline. This crate never
//! touches media: it reads a monotonic recording clock from the capture
//! side and forwards start/pause/stop intents as `control` frames.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Recording-control intent forwarded to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlAction {
    Start,
    Pause,
    Stop,
}

impl ControlAction {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Pause => "pause",
            Self::Stop => "stop",
        }
    }
}

/// Authoritative recording clock, owned by the capture pipeline. Must be
/// monotonically non-decreasing while recording.
pub trait RecordingClock: Send + Sync {
    fn current_time_ms(&self) -> u64;
}

/// Wall-time clock for the demo binary: elapsed time since construction.
pub struct MonotonicClock {
    started: Instant,
}

impl MonotonicClock {
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl RecordingClock for MonotonicClock {
    fn current_time_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests and for hosts that own their own transport
/// of the capture pipeline's time signal.
#[derive(Clone, Default)]
pub struct ManualClock {
    now_ms: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_ms(&self, t_ms: u64) {
        self.now_ms.store(t_ms, Ordering::Relaxed);
    }

    pub fn advance_ms(&self, delta_ms: u64) {
        self.now_ms.fetch_add(delta_ms, Ordering::Relaxed);
    }
}

impl RecordingClock for ManualClock {
    fn current_time_ms(&self) -> u64 {
        self.now_ms.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_reads_back_what_was_set() {
        let clock = ManualClock::new();
        assert_eq!(clock.current_time_ms(), 0);
        clock.set_ms(1500);
        assert_eq!(clock.current_time_ms(), 1500);
        clock.advance_ms(250);
        assert_eq!(clock.current_time_ms(), 1750);
    }

    #[test]
    fn control_actions_match_wire_spelling() {
        assert_eq!(ControlAction::Start.as_str(), "start");
        assert_eq!(ControlAction::Pause.as_str(), "pause");
        assert_eq!(ControlAction::Stop.as_str(), "stop");
    }
}
