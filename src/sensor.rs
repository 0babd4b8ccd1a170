//! Temperature/humidity acquisition.
//!
//! Two sources implement one capability trait: a DHT11 on a GPIO pin (behind
//! the `gpio` feature) and a bounded-random-walk simulator for development.
//! `SensorAcquisition` wraps the chosen source with the retry policy; each
//! quantity is acquired independently and a reading is valid only when both
//! succeed.

use std::time::Duration;

use tokio::time::sleep;

/// A single temperature/humidity sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub valid: bool,
}

/// One attempt at reading a quantity.  `None` means the attempt failed; the
/// retry policy lives in `SensorAcquisition`, not in the source.
pub trait SensorSource: Send {
    fn read_temperature(&mut self) -> Option<f32>;
    fn read_humidity(&mut self) -> Option<f32>;
    fn describe(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// Simulated source: bounded random walk
// ---------------------------------------------------------------------------

/// Humidity walk: step size and the band it is clamped back into.
const SIM_HUMIDITY_START: f32 = 55.0;
const SIM_HUMIDITY_STEP: f32 = 2.0;
const SIM_HUMIDITY_BAND: (f32, f32) = (30.0, 95.0);
const SIM_HUMIDITY_REENTRY: f32 = 5.0;

/// Temperature walk, °C.
const SIM_TEMPERATURE_START: f32 = 25.0;
const SIM_TEMPERATURE_STEP: f32 = 1.0;
const SIM_TEMPERATURE_BAND: (f32, f32) = (15.0, 35.0);
const SIM_TEMPERATURE_REENTRY: f32 = 2.0;

/// Perturb `value` by a uniform delta within `±step`; when the walk leaves
/// `band` it re-enters at a random point within `reentry` of the crossed edge.
fn walk(value: f32, step: f32, band: (f32, f32), reentry: f32) -> f32 {
    let delta = (fastrand::f32() * 2.0 - 1.0) * step;
    let next = value + delta;
    if next < band.0 {
        band.0 + fastrand::f32() * reentry
    } else if next > band.1 {
        band.1 - fastrand::f32() * reentry
    } else {
        next
    }
}

/// Stateful simulator: each call evolves the previous value, so consecutive
/// readings stay coherent instead of jumping across the whole range.
pub struct SimulatedSensor {
    humidity: f32,
    temperature: f32,
}

impl SimulatedSensor {
    pub fn new() -> Self {
        Self {
            humidity: SIM_HUMIDITY_START,
            temperature: SIM_TEMPERATURE_START,
        }
    }
}

impl SensorSource for SimulatedSensor {
    fn read_temperature(&mut self) -> Option<f32> {
        self.temperature = walk(
            self.temperature,
            SIM_TEMPERATURE_STEP,
            SIM_TEMPERATURE_BAND,
            SIM_TEMPERATURE_REENTRY,
        );
        Some(self.temperature)
    }

    fn read_humidity(&mut self) -> Option<f32> {
        self.humidity = walk(
            self.humidity,
            SIM_HUMIDITY_STEP,
            SIM_HUMIDITY_BAND,
            SIM_HUMIDITY_REENTRY,
        );
        Some(self.humidity)
    }

    fn describe(&self) -> &'static str {
        "simulated"
    }
}

// ---------------------------------------------------------------------------
// DHT11 source (real GPIO behind the `gpio` feature, mock otherwise)
// ---------------------------------------------------------------------------

#[cfg(feature = "gpio")]
mod dht {
    use std::thread;
    use std::time::{Duration, Instant};

    use rppal::gpio::{Gpio, IoPin, Level, Mode};

    use super::SensorSource;

    // ── DHT11 single-wire timing ────────────────────────────────────────
    //
    // Host start signal: pull low ≥18 ms, release.  Sensor answers with
    // 80 µs low + 80 µs high, then 40 data bits.  Each bit is a ~50 µs low
    // preamble followed by a high pulse: ~27 µs for a 0, ~70 µs for a 1.
    // Frame: humidity int, humidity frac, temp int, temp frac, checksum.

    /// Host start-signal low time.
    const START_LOW: Duration = Duration::from_millis(18);
    /// High pulses longer than this decode as a 1 bit.
    const BIT_THRESHOLD: Duration = Duration::from_micros(50);
    /// Any single line level lasting longer than this aborts the read.
    const LEVEL_TIMEOUT: Duration = Duration::from_micros(1000);

    pub struct DhtSensor {
        pin: IoPin,
    }

    impl DhtSensor {
        pub fn new(pin_num: u8) -> anyhow::Result<Self> {
            let pin = Gpio::new()?.get(pin_num)?.into_io(Mode::Input);
            tracing::info!(pin = pin_num, "dht11 initialised");
            Ok(Self { pin })
        }

        /// Busy-wait while the line stays at `level`, returning how long it
        /// did.  `None` on timeout (sensor absent or frame lost).
        fn level_duration(&self, level: Level) -> Option<Duration> {
            let start = Instant::now();
            while self.pin.read() == level {
                if start.elapsed() > LEVEL_TIMEOUT {
                    return None;
                }
            }
            Some(start.elapsed())
        }

        /// One full frame read.  `None` on timeout or checksum mismatch.
        fn read_frame(&mut self) -> Option<(f32, f32)> {
            // Start signal, then hand the line back to the sensor.
            self.pin.set_mode(Mode::Output);
            self.pin.set_low();
            thread::sleep(START_LOW);
            self.pin.set_high();
            self.pin.set_mode(Mode::Input);

            // Sensor response preamble.
            self.level_duration(Level::High)?;
            self.level_duration(Level::Low)?;
            self.level_duration(Level::High)?;

            // 40 data bits.
            let mut data = [0u8; 5];
            for i in 0..40 {
                self.level_duration(Level::Low)?;
                let width = self.level_duration(Level::High)?;
                if width > BIT_THRESHOLD {
                    data[i / 8] |= 1 << (7 - i % 8);
                }
            }

            let sum = data[0]
                .wrapping_add(data[1])
                .wrapping_add(data[2])
                .wrapping_add(data[3]);
            if sum != data[4] {
                tracing::warn!("dht11 checksum mismatch");
                return None;
            }

            let humidity = f32::from(data[0]) + f32::from(data[1]) / 10.0;
            let magnitude = f32::from(data[2]) + f32::from(data[3] & 0x7f) / 10.0;
            let temperature = if data[3] & 0x80 != 0 {
                -magnitude
            } else {
                magnitude
            };
            Some((temperature, humidity))
        }
    }

    impl SensorSource for DhtSensor {
        fn read_temperature(&mut self) -> Option<f32> {
            self.read_frame().map(|(t, _)| t)
        }

        fn read_humidity(&mut self) -> Option<f32> {
            self.read_frame().map(|(_, h)| h)
        }

        fn describe(&self) -> &'static str {
            "dht11"
        }
    }
}

#[cfg(feature = "gpio")]
pub use dht::DhtSensor;

#[cfg(not(feature = "gpio"))]
pub struct DhtSensor;

#[cfg(not(feature = "gpio"))]
impl DhtSensor {
    pub fn new(pin_num: u8) -> anyhow::Result<Self> {
        tracing::warn!(
            pin = pin_num,
            "[mock-gpio] dht11 not wired — hardware reads will fail"
        );
        Ok(Self)
    }
}

#[cfg(not(feature = "gpio"))]
impl SensorSource for DhtSensor {
    fn read_temperature(&mut self) -> Option<f32> {
        None
    }

    fn read_humidity(&mut self) -> Option<f32> {
        None
    }

    fn describe(&self) -> &'static str {
        "dht11 (mock)"
    }
}

// ---------------------------------------------------------------------------
// Acquisition: bounded retry around a source
// ---------------------------------------------------------------------------

/// `attempts` tries per quantity, separated by `delay`.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay: Duration::from_millis(500),
        }
    }
}

pub struct SensorAcquisition {
    source: Box<dyn SensorSource>,
    retry: RetryPolicy,
}

impl SensorAcquisition {
    pub fn new(source: Box<dyn SensorSource>, retry: RetryPolicy) -> Self {
        Self { source, retry }
    }

    /// Acquire one reading.  Failed attempts are retried with an awaitable
    /// delay; exhausting the attempts for either quantity yields an invalid
    /// reading, never an error.
    pub async fn read(&mut self) -> SensorReading {
        let humidity = self.acquire("humidity", |s| s.read_humidity()).await;
        let temperature = self.acquire("temperature", |s| s.read_temperature()).await;
        let valid = humidity.is_some() && temperature.is_some();
        if !valid {
            tracing::warn!(source = self.source.describe(), "sensor reading invalid");
        }
        SensorReading {
            temperature,
            humidity,
            valid,
        }
    }

    async fn acquire(
        &mut self,
        quantity: &'static str,
        read: impl Fn(&mut dyn SensorSource) -> Option<f32>,
    ) -> Option<f32> {
        for attempt in 1..=self.retry.attempts {
            if let Some(value) = read(self.source.as_mut()) {
                return Some(value);
            }
            if attempt < self.retry.attempts {
                tracing::warn!(quantity, attempt, "sensor read failed, retrying");
                sleep(self.retry.delay).await;
            }
        }
        tracing::error!(
            quantity,
            attempts = self.retry.attempts,
            "sensor read failed after retries"
        );
        None
    }
}

// ---------------------------------------------------------------------------
// Derived metrics
// ---------------------------------------------------------------------------

/// Vapour-pressure deficit in kPa (Tetens saturation curve).
pub fn vpd(temperature: f32, humidity: f32) -> f32 {
    let clamped = humidity.min(100.0);
    let svp = 0.6108 * ((17.27 * temperature) / (temperature + 237.3)).exp();
    let avp = (clamped / 100.0) * svp;
    (svp - avp).max(0.0)
}

// ===========================================================================
// Tests
// ===========================================================================
