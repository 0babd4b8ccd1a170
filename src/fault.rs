//! Sensor-fault window tracking and timed watering escalation.
//!
//! While the sensor reports invalid readings the tracker holds an open fault
//! window.  Once the window has been open for a full day the plant is watered
//! blind rather than left to dry out, and the window restarts so a still-dead
//! sensor forces at most one watering per day.

/// Continuous invalidity after which watering is forced, seconds.
pub const FORCED_WATERING_AFTER_SECS: i64 = 86_400;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultState {
    Valid,
    /// Sensor has been continuously invalid since this epoch second.
    Invalid { since: i64 },
}

#[derive(Debug)]
pub struct FaultTracker {
    state: FaultState,
}

impl FaultTracker {
    pub fn new() -> Self {
        Self {
            state: FaultState::Valid,
        }
    }

    pub fn state(&self) -> FaultState {
        self.state
    }

    /// Seconds the sensor has been continuously invalid, if it is.
    pub fn downtime_secs(&self, now: i64) -> Option<i64> {
        match self.state {
            FaultState::Valid => None,
            FaultState::Invalid { since } => Some(now - since),
        }
    }

    /// Feed one reading's validity at `now` (epoch seconds).  Returns `true`
    /// when this cycle must force a watering.
    ///
    /// The very first invalid reading only opens the window; a window must
    /// exist before its age can reach the threshold.  On trigger the window
    /// restarts at `now` instead of closing, so the escalation repeats once
    /// per threshold period until the sensor recovers.
    pub fn update(&mut self, now: i64, valid: bool) -> bool {
        match (self.state, valid) {
            (FaultState::Valid, true) => false,
            (FaultState::Valid, false) => {
                tracing::warn!("sensor fault detected");
                self.state = FaultState::Invalid { since: now };
                false
            }
            (FaultState::Invalid { since }, false) => {
                let downtime = now - since;
                if downtime >= FORCED_WATERING_AFTER_SECS {
                    tracing::warn!(
                        downtime_secs = downtime,
                        "sensor invalid for a full day, forcing watering"
                    );
                    self.state = FaultState::Invalid { since: now };
                    true
                } else {
                    false
                }
            }
            (FaultState::Invalid { since }, true) => {
                tracing::info!(downtime_secs = now - since, "sensor recovered");
                self.state = FaultState::Valid;
                false
            }
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
