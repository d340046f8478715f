//! Cycle state machine and shared device status.
//!
//! [`CycleState`] is the phase the device is in.  [`DeviceStatus`] adds
//! counters and the last error so the status can be logged or inspected by
//! tests.  [`SharedState`] is an `Arc<Mutex<DeviceStatus>>`, cheap to clone
//! and safe to share across threads.

use std::sync::{Arc, Mutex, PoisonError};

// ---------------------------------------------------------------------------
// CycleState
// ---------------------------------------------------------------------------

/// Phases of the record → transmit → play cycle.
///
/// ```text
/// Idle ──warm-up──▶ Recording ──buffer full──▶ Transmitting
///                       ▲                          │
///                       │                          ▼
///                       └──────── buffer reset ── Playing
/// ```
///
/// A failed transfer skips `Playing` and goes straight back to `Recording`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CycleState {
    /// Sampler detached; nothing in flight.
    #[default]
    Idle,
    /// Sampler attached; the buffer is filling.
    Recording,
    /// Buffer frozen; upload in progress.
    Transmitting,
    /// Response asset being decoded to the speaker.
    Playing,
}

impl CycleState {
    /// Short label for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            CycleState::Idle => "Idle",
            CycleState::Recording => "Recording",
            CycleState::Transmitting => "Transmitting",
            CycleState::Playing => "Playing",
        }
    }
}

// ---------------------------------------------------------------------------
// DeviceStatus
// ---------------------------------------------------------------------------

/// Everything the device knows about its own progress.
#[derive(Debug, Clone, Default)]
pub struct DeviceStatus {
    /// Current phase.
    pub cycle: CycleState,
    /// Cycles that ran through to the reset, regardless of outcome.
    pub completed_cycles: u64,
    /// Cycles whose transfer exhausted its attempts.
    pub failed_transfers: u64,
    /// Playbacks that ended on a decode or sink error rather than a clean end.
    pub interrupted_playbacks: u64,
    /// Times the sampler trigger could not be started.
    pub capture_failures: u64,
    /// Description of the most recent swallowed failure.
    pub last_error: Option<String>,
}

// ---------------------------------------------------------------------------
// SharedState
// ---------------------------------------------------------------------------

/// Thread-safe handle to [`DeviceStatus`].
pub type SharedState = Arc<Mutex<DeviceStatus>>;

/// Construct a new [`SharedState`] in the `Idle` phase.
pub fn new_shared_state() -> SharedState {
    Arc::new(Mutex::new(DeviceStatus::default()))
}

/// Set the current phase, logging the transition.
pub fn set_cycle(state: &SharedState, next: CycleState) {
    let mut st = state.lock().unwrap_or_else(PoisonError::into_inner);
    if st.cycle != next {
        log::debug!("cycle: {} -> {}", st.cycle.label(), next.label());
    }
    st.cycle = next;
}

/// Read the current phase.
pub fn current_cycle(state: &SharedState) -> CycleState {
    state.lock().unwrap_or_else(PoisonError::into_inner).cycle
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cycle_state_is_idle() {
        assert_eq!(CycleState::default(), CycleState::Idle);
    }

    #[test]
    fn labels() {
        assert_eq!(CycleState::Idle.label(), "Idle");
        assert_eq!(CycleState::Recording.label(), "Recording");
        assert_eq!(CycleState::Transmitting.label(), "Transmitting");
        assert_eq!(CycleState::Playing.label(), "Playing");
    }

    #[test]
    fn fresh_status_has_no_history() {
        let status = DeviceStatus::default();
        assert_eq!(status.cycle, CycleState::Idle);
        assert_eq!(status.completed_cycles, 0);
        assert_eq!(status.failed_transfers, 0);
        assert_eq!(status.capture_failures, 0);
        assert!(status.last_error.is_none());
    }

    #[test]
    fn shared_state_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<SharedState>();
    }

    #[test]
    fn set_cycle_is_visible_through_clones() {
        let state = new_shared_state();
        let other = Arc::clone(&state);

        set_cycle(&state, CycleState::Transmitting);
        assert_eq!(current_cycle(&other), CycleState::Transmitting);
    }
}
