//! Pump actuator: Idle/Running state machine with polled auto-off.
//!
//! The relay drive is gated behind the `gpio` feature (rppal); without it a
//! mock implementation logs state changes to the tracing output.  Auto-off is
//! not a timer callback — the driving loop calls `poll_auto_off` every tick.

use std::time::{Duration, Instant};

#[cfg(feature = "gpio")]
use rppal::gpio::{Gpio, OutputPin};

// ---------------------------------------------------------------------------
// Relay drive (real GPIO behind the `gpio` feature, mock otherwise)
// ---------------------------------------------------------------------------

#[cfg(feature = "gpio")]
pub struct Relay {
    pin: OutputPin,
    active_low: bool, // many relay boards are active-low
}

#[cfg(feature = "gpio")]
impl Relay {
    pub fn new(pin_num: u8, active_low: bool) -> anyhow::Result<Self> {
        let mut pin = Gpio::new()?.get(pin_num)?.into_output();

        // Fail-safe: ensure "OFF" at startup.
        if active_low {
            pin.set_high();
        } else {
            pin.set_low();
        }

        Ok(Self { pin, active_low })
    }

    fn set(&mut self, on: bool) {
        // Active-low relay: LOW = ON, HIGH = OFF.
        if on != self.active_low {
            self.pin.set_high();
        } else {
            self.pin.set_low();
        }
        tracing::debug!(on, "pump relay set");
    }
}

#[cfg(not(feature = "gpio"))]
pub struct Relay {
    on: bool,
}

#[cfg(not(feature = "gpio"))]
impl Relay {
    pub fn new(pin_num: u8, _active_low: bool) -> anyhow::Result<Self> {
        tracing::info!(pin = pin_num, "[mock-gpio] pump relay registered (not wired)");
        Ok(Self { on: false })
    }

    fn set(&mut self, on: bool) {
        self.on = on;
        tracing::debug!(on, "[mock-gpio] pump relay set");
    }
}

// ---------------------------------------------------------------------------
// Actuator state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
enum PumpState {
    Idle,
    Running {
        started_at: Instant,
        duration: Duration,
    },
}

pub struct PumpActuator {
    state: PumpState,
    activation_count: u32,
    relay: Relay,
}

impl PumpActuator {
    pub fn new(relay: Relay) -> Self {
        Self {
            state: PumpState::Idle,
            activation_count: 0,
            relay,
        }
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, PumpState::Running { .. })
    }

    pub fn activation_count(&self) -> u32 {
        self.activation_count
    }

    /// Time left until auto-off.  Zero when idle.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.state {
            PumpState::Idle => Duration::ZERO,
            PumpState::Running {
                started_at,
                duration,
            } => duration.saturating_sub(now.saturating_duration_since(started_at)),
        }
    }

    /// Start the pump for `duration`.  Ignored (logged) when already running
    /// or when the duration is zero.  Returns whether the pump was started.
    pub fn activate(&mut self, now: Instant, duration: Duration) -> bool {
        if self.is_running() {
            tracing::warn!("pump already running, ignoring activation");
            return false;
        }
        if duration.is_zero() {
            tracing::warn!("zero watering duration, ignoring activation");
            return false;
        }

        self.relay.set(true);
        self.state = PumpState::Running {
            started_at: now,
            duration,
        };
        self.activation_count += 1;
        tracing::info!(
            duration_sec = duration.as_secs(),
            activations = self.activation_count,
            "pump on"
        );
        true
    }

    /// Stop the pump, cancelling any pending auto-off.  Ignored when idle.
    pub fn deactivate(&mut self) -> bool {
        let PumpState::Running { started_at, .. } = self.state else {
            tracing::debug!("pump already off, ignoring deactivation");
            return false;
        };

        self.relay.set(false);
        self.state = PumpState::Idle;
        tracing::info!(
            ran_for_sec = started_at.elapsed().as_secs(),
            "pump off"
        );
        true
    }

    /// Driving-loop tick: turn the pump off once its running duration has
    /// elapsed.  Returns whether an auto-off happened.
    pub fn poll_auto_off(&mut self, now: Instant) -> bool {
        if let PumpState::Running {
            started_at,
            duration,
        } = self.state
        {
            if now.saturating_duration_since(started_at) >= duration {
                tracing::info!("watering time elapsed, auto-off");
                self.deactivate();
                return true;
            }
        }
        false
    }
}

// ===========================================================================
// Tests
// ===========================================================================
