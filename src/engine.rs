//! The irrigation decision engine.
//!
//! `Engine` is one explicit context object owning every piece of core state:
//! stage catalog and selection, sensor acquisition, fault tracker, pump,
//! measurement history, and the persisted settings.  The driver loop and the
//! web layer share it through one `SharedEngine`, so core state is only ever
//! touched from a single execution context at a time.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::config::Config;
use crate::fault::FaultTracker;
use crate::persist::DataDir;
use crate::pump::PumpActuator;
use crate::sensor::{vpd, SensorAcquisition, SensorReading};
use crate::stage::{Stage, StageCatalog, StageSelection};
use crate::store::{MeasurementRecord, MeasurementStore, HISTORY_CAPACITY};

/// Valid measurement interval, hours (one hour up to one week minus one).
pub const INTERVAL_HOURS_RANGE: std::ops::RangeInclusive<i64> = 1..=167;
/// Valid manual pump-run duration, seconds.
pub const PUMP_SEC_RANGE: std::ops::RangeInclusive<i64> = 1..=600;

pub type SharedEngine = Arc<Mutex<Engine>>;

/// Current wall-clock time as epoch milliseconds.
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// Round to one decimal place, the precision everything is reported at.
pub fn round1(v: f32) -> f32 {
    (v * 10.0).round() / 10.0
}

fn interval_ms(hours: u32) -> i64 {
    i64::from(hours) * 3_600_000
}

fn rfc3339(epoch_ms: i64) -> Option<String> {
    time::OffsetDateTime::from_unix_timestamp_nanos(i128::from(epoch_ms) * 1_000_000)
        .ok()
        .and_then(|t| t.format(&time::format_description::well_known::Rfc3339).ok())
}

// ---------------------------------------------------------------------------
// Snapshots returned to the web layer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StageInfo {
    pub index: usize,
    pub name: String,
    pub humidity_threshold: u8,
    pub watering_time_sec: u32,
    pub manual_override: bool,
    pub elapsed_days: u64,
}

#[derive(Debug, Serialize)]
pub struct PumpStatus {
    pub running: bool,
    pub remaining_sec: u64,
    pub activations: u32,
}

#[derive(Debug, Serialize)]
pub struct Status {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub sensor_valid: bool,
    pub vpd_kpa: Option<f32>,
    /// Seconds the sensor has been continuously invalid, if it is.
    pub sensor_down_secs: Option<i64>,
    pub pump: PumpStatus,
    pub stage: StageInfo,
    pub interval_hours: u32,
    pub last_measurement_ms: Option<i64>,
    pub next_due_ms: i64,
    pub next_due: Option<String>,
    pub uptime_secs: u64,
    pub history_len: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct Engine {
    catalog: StageCatalog,
    selection: StageSelection,
    sensor: SensorAcquisition,
    fault: FaultTracker,
    pump: PumpActuator,
    store: MeasurementStore,
    data: DataDir,
    interval_hours: u32,
    /// Reference epoch (seconds) the growth schedule counts from.
    start_epoch: i64,
    last_measurement_ms: Option<i64>,
    next_due_ms: i64,
    last_reading: Option<SensorReading>,
    started_at: Instant,
}

impl Engine {
    /// Assemble the engine from config and whatever state survived on disk.
    /// Persisted settings win over config defaults; the reference epoch is
    /// minted on first boot and kept forever after.
    pub fn bootstrap(
        config: &Config,
        data: DataDir,
        sensor: SensorAcquisition,
        pump: PumpActuator,
        now_ms: i64,
    ) -> Self {
        let mut catalog = config.catalog();
        if let Some(params) = data.load_stage_params() {
            catalog.apply_params(&params);
        }

        let selection = match data.load_manual_stage(catalog.len()) {
            Some(index) => StageSelection::manual(index),
            None => StageSelection::automatic(),
        };

        let interval_hours = data.load_interval().unwrap_or(config.interval_hours);

        let start_epoch = match data.load_start_epoch() {
            Some(epoch) => epoch,
            None => {
                let epoch = now_ms / 1000;
                tracing::info!(epoch, "first boot, starting the growth schedule now");
                data.save_start_epoch(epoch);
                epoch
            }
        };

        let store = MeasurementStore::from_encoded(&data.load_history(), HISTORY_CAPACITY);
        if !store.is_empty() {
            tracing::info!(records = store.len(), "measurement history loaded");
        }

        // The first due time anchors on the last persisted measurement so a
        // restart does not drift the schedule.
        let last_measurement_ms = store.last().map(|r| r.epoch_ms);
        let anchor = last_measurement_ms.unwrap_or(start_epoch * 1000);

        Self {
            catalog,
            selection,
            sensor,
            fault: FaultTracker::new(),
            pump,
            store,
            data,
            interval_hours,
            start_epoch,
            last_measurement_ms,
            next_due_ms: anchor + interval_ms(interval_hours),
            last_reading: None,
            started_at: Instant::now(),
        }
    }

    /// Whole days elapsed since the reference epoch.
    pub fn elapsed_days(&self, now_ms: i64) -> u64 {
        ((now_ms / 1000 - self.start_epoch).max(0) / 86_400) as u64
    }

    // ── one control cycle ───────────────────────────────────────────────

    /// Acquire → fault-update → stage-resolve → decide → actuate → record.
    ///
    /// The measurement timestamp advances whether or not the reading is
    /// valid, and a cycle that lands mid-irrigation never re-decides: the
    /// running pump finishes its current watering undisturbed.
    pub async fn run_cycle(&mut self, now_ms: i64, now: Instant) {
        let elapsed_days = self.elapsed_days(now_ms);

        let reading = self.sensor.read().await;
        self.last_measurement_ms = Some(now_ms);
        self.last_reading = Some(reading);

        let forced = self.fault.update(now_ms / 1000, reading.valid);

        let index = self.catalog.resolve(self.selection, elapsed_days);
        let stage = self.catalog.get(index).clone();

        if !self.pump.is_running() {
            let duration = Duration::from_secs(u64::from(stage.watering_time_sec));
            let below = match (reading.valid, reading.humidity) {
                (true, Some(h)) if h < f32::from(stage.humidity_threshold) => Some(h),
                _ => None,
            };
            if let Some(h) = below {
                tracing::info!(
                    humidity = format!("{h:.1}"),
                    threshold = stage.humidity_threshold,
                    stage = %stage.name,
                    "humidity below threshold, watering"
                );
                self.pump.activate(now, duration);
            } else if forced {
                tracing::warn!(
                    stage = %stage.name,
                    watering_sec = stage.watering_time_sec,
                    "watering blind after a day without the sensor"
                );
                self.pump.activate(now, duration);
            }
        }

        self.store.append(MeasurementRecord {
            epoch_ms: now_ms,
            temperature: reading.temperature,
            humidity: reading.humidity,
            pump_activated: self.pump.is_running(),
            stage: stage.name,
        });
        self.data.save_history(&self.store.encode());

        self.next_due_ms = now_ms + interval_ms(self.interval_hours);
        tracing::debug!(elapsed_days, valid = reading.valid, "cycle complete");
    }

    /// Whether a scheduled cycle is due.  Checked by the driver loop tick.
    pub fn cycle_due(&self, now_ms: i64) -> bool {
        now_ms >= self.next_due_ms
    }

    /// Driver-loop tick: auto-off the pump once its watering time elapses.
    pub fn poll_auto_off(&mut self, now: Instant) -> bool {
        self.pump.poll_auto_off(now)
    }

    // ── measurement interval ────────────────────────────────────────────

    pub fn interval_hours(&self) -> u32 {
        self.interval_hours
    }

    /// Update the interval and re-anchor the next due cycle on the last
    /// measurement's timestamp, not on "now".
    pub fn set_interval(&mut self, hours: i64) -> Result<()> {
        if !INTERVAL_HOURS_RANGE.contains(&hours) {
            bail!("interval {hours}h out of range [1, 167]");
        }
        let hours = hours as u32;
        self.interval_hours = hours;
        self.data.save_interval(hours);
        let anchor = self.last_measurement_ms.unwrap_or(self.start_epoch * 1000);
        self.next_due_ms = anchor + interval_ms(hours);
        tracing::info!(hours, "measurement interval updated");
        Ok(())
    }

    // ── stage selection and parameters ──────────────────────────────────

    pub fn stages(&self) -> &[Stage] {
        self.catalog.stages()
    }

    pub fn stage_info(&self, now_ms: i64) -> StageInfo {
        let elapsed_days = self.elapsed_days(now_ms);
        let index = self.catalog.resolve(self.selection, elapsed_days);
        let stage = self.catalog.get(index);
        StageInfo {
            index,
            name: stage.name.clone(),
            humidity_threshold: stage.humidity_threshold,
            watering_time_sec: stage.watering_time_sec,
            manual_override: self.selection.manual_override,
            elapsed_days,
        }
    }

    pub fn set_manual_stage(&mut self, index: i64) -> Result<()> {
        if index < 0 || index as usize >= self.catalog.len() {
            bail!("stage index {index} out of range (0-{})", self.catalog.len() - 1);
        }
        self.selection = StageSelection::manual(index as usize);
        self.data.save_manual_stage(index as usize);
        tracing::info!(index, "manual stage override set");
        Ok(())
    }

    pub fn clear_manual_stage(&mut self) {
        self.selection = StageSelection::automatic();
        self.data.clear_manual_stage();
        tracing::info!("manual stage override cleared, back on the schedule");
    }

    pub fn update_stage_params(
        &mut self,
        index: i64,
        humidity_threshold: Option<i64>,
        watering_time_sec: Option<i64>,
    ) -> Result<()> {
        if index < 0 {
            bail!("stage index {index} out of range");
        }
        self.catalog
            .update_params(index as usize, humidity_threshold, watering_time_sec)?;
        self.data.save_stage_params(&self.catalog.params());
        Ok(())
    }

    // ── manual pump control ─────────────────────────────────────────────

    pub fn pump_on(&mut self, now: Instant, duration_sec: i64) -> Result<()> {
        if !PUMP_SEC_RANGE.contains(&duration_sec) {
            bail!("pump duration {duration_sec}s out of range [1, 600]");
        }
        self.pump.activate(now, Duration::from_secs(duration_sec as u64));
        Ok(())
    }

    pub fn pump_off(&mut self) {
        self.pump.deactivate();
    }

    // ── history ─────────────────────────────────────────────────────────

    pub fn history(&self) -> impl Iterator<Item = &MeasurementRecord> {
        self.store.iter()
    }

    pub fn clear_history(&mut self) {
        self.store.clear();
        self.data.clear_history();
        tracing::info!("measurement history cleared");
    }

    // ── status snapshot ─────────────────────────────────────────────────

    pub fn status(&self, now_ms: i64, now: Instant) -> Status {
        let reading = self.last_reading;
        let temperature = reading.and_then(|r| r.temperature);
        let humidity = reading.and_then(|r| r.humidity);
        let vpd_kpa = match (temperature, humidity) {
            (Some(t), Some(h)) => Some(round1(vpd(t, h))),
            _ => None,
        };
        Status {
            temperature: temperature.map(round1),
            humidity: humidity.map(round1),
            sensor_valid: reading.is_some_and(|r| r.valid),
            vpd_kpa,
            sensor_down_secs: self.fault.downtime_secs(now_ms / 1000),
            pump: PumpStatus {
                running: self.pump.is_running(),
                remaining_sec: self.pump.remaining(now).as_secs(),
                activations: self.pump.activation_count(),
            },
            stage: self.stage_info(now_ms),
            interval_hours: self.interval_hours,
            last_measurement_ms: self.last_measurement_ms,
            next_due_ms: self.next_due_ms,
            next_due: rfc3339(self.next_due_ms),
            uptime_secs: self.started_at.elapsed().as_secs(),
            history_len: self.store.len(),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pump::Relay;
    use crate::sensor::{RetryPolicy, SensorSource};

    const HOUR_MS: i64 = 3_600_000;
    const DAY_MS: i64 = 86_400_000;
    const T0_MS: i64 = 1_700_000_000_000;

    /// Source that returns the same values on every attempt.  `None` for a
    /// quantity makes the whole reading invalid.
    struct FixedSource {
        temperature: Option<f32>,
        humidity: Option<f32>,
    }

    impl SensorSource for FixedSource {
        fn read_temperature(&mut self) -> Option<f32> {
            self.temperature
        }

        fn read_humidity(&mut self) -> Option<f32> {
            self.humidity
        }

        fn describe(&self) -> &'static str {
            "fixed"
        }
    }

    fn acquisition(temperature: Option<f32>, humidity: Option<f32>) -> SensorAcquisition {
        SensorAcquisition::new(
            Box::new(FixedSource {
                temperature,
                humidity,
            }),
            RetryPolicy {
                attempts: 3,
                delay: Duration::ZERO,
            },
        )
    }

    fn engine_at(
        dir: &std::path::Path,
        temperature: Option<f32>,
        humidity: Option<f32>,
        now_ms: i64,
    ) -> Engine {
        Engine::bootstrap(
            &Config::default(),
            DataDir::open(dir).unwrap(),
            acquisition(temperature, humidity),
            PumpActuator::new(Relay::new(17, true).unwrap()),
            now_ms,
        )
    }

    fn test_engine(temperature: Option<f32>, humidity: Option<f32>) -> (Engine, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let engine = engine_at(tmp.path(), temperature, humidity, T0_MS);
        (engine, tmp)
    }

    // -- run_cycle: watering decision --------------------------------------

    #[tokio::test]
    async fn dry_reading_waters_for_the_stage_duration() {
        // Day 0 → Germination (threshold 65, watering 15s); humidity 50 is dry.
        let (mut engine, _tmp) = test_engine(Some(24.0), Some(50.0));
        let now = Instant::now();
        engine.run_cycle(T0_MS, now).await;

        let status = engine.status(T0_MS, now);
        assert!(status.pump.running);
        assert!(status.pump.remaining_sec <= 15);
        assert_eq!(status.pump.activations, 1);

        let record = engine.history().last().unwrap();
        assert!(record.pump_activated);
        assert_eq!(record.stage, "Germination");
        assert_eq!(record.humidity, Some(50.0));
    }

    #[tokio::test]
    async fn humid_reading_does_not_water() {
        let (mut engine, _tmp) = test_engine(Some(24.0), Some(80.0));
        let now = Instant::now();
        engine.run_cycle(T0_MS, now).await;

        assert!(!engine.status(T0_MS, now).pump.running);
        assert!(!engine.history().last().unwrap().pump_activated);
    }

    #[tokio::test]
    async fn threshold_boundary_is_exclusive() {
        // Humidity exactly at the threshold is not "below".
        let (mut engine, _tmp) = test_engine(Some(24.0), Some(65.0));
        engine.run_cycle(T0_MS, Instant::now()).await;
        assert_eq!(engine.status(T0_MS, Instant::now()).pump.activations, 0);
    }

    #[tokio::test]
    async fn cycle_mid_irrigation_never_redecides() {
        let (mut engine, _tmp) = test_engine(Some(24.0), Some(50.0));
        let now = Instant::now();
        engine.pump_on(now, 300).unwrap();

        engine.run_cycle(T0_MS, now).await;
        // Still the manual watering, not a second activation.
        let status = engine.status(T0_MS, now);
        assert_eq!(status.pump.activations, 1);
        assert!(status.pump.remaining_sec > 15);
        // The record reflects the pump's current running state.
        assert!(engine.history().last().unwrap().pump_activated);
    }

    #[tokio::test]
    async fn invalid_reading_records_nulls_and_updates_timestamp() {
        let (mut engine, _tmp) = test_engine(None, None);
        engine.run_cycle(T0_MS, Instant::now()).await;

        let record = engine.history().last().unwrap();
        assert_eq!(record.temperature, None);
        assert_eq!(record.humidity, None);
        assert!(!record.pump_activated);
        // The measurement timestamp advances even for an invalid reading.
        assert_eq!(engine.status(T0_MS, Instant::now()).last_measurement_ms, Some(T0_MS));
    }

    #[tokio::test]
    async fn partial_reading_is_invalid_but_keeps_the_good_quantity() {
        let (mut engine, _tmp) = test_engine(Some(24.0), None);
        engine.run_cycle(T0_MS, Instant::now()).await;

        let record = engine.history().last().unwrap();
        assert_eq!(record.temperature, Some(24.0));
        assert_eq!(record.humidity, None);
        assert!(!record.pump_activated);
    }

    // -- run_cycle: forced watering on sensor downtime ---------------------

    #[tokio::test]
    async fn day_of_invalid_readings_forces_exactly_one_watering() {
        let (mut engine, _tmp) = test_engine(None, None);
        let now = Instant::now();

        engine.run_cycle(T0_MS, now).await;
        engine.run_cycle(T0_MS + DAY_MS / 2, now).await;
        assert_eq!(engine.status(T0_MS, now).pump.activations, 0);

        engine.run_cycle(T0_MS + DAY_MS, now).await;
        let status = engine.status(T0_MS + DAY_MS, now);
        assert_eq!(status.pump.activations, 1);
        assert!(engine.history().last().unwrap().pump_activated);

        // The window restarted: another cycle shortly after must not
        // double-trigger within the same day.
        engine.pump_off();
        engine.run_cycle(T0_MS + DAY_MS + HOUR_MS, now).await;
        assert_eq!(engine.status(T0_MS + DAY_MS, now).pump.activations, 1);
    }

    #[tokio::test]
    async fn forced_watering_repeats_after_another_full_day() {
        let (mut engine, _tmp) = test_engine(None, None);
        let now = Instant::now();

        engine.run_cycle(T0_MS, now).await;
        engine.run_cycle(T0_MS + DAY_MS, now).await;
        engine.pump_off();
        engine.run_cycle(T0_MS + 2 * DAY_MS, now).await;
        assert_eq!(engine.status(T0_MS, now).pump.activations, 2);
    }

    // -- scheduling ---------------------------------------------------------

    #[tokio::test]
    async fn cycle_advances_next_due_by_the_interval() {
        let (mut engine, _tmp) = test_engine(Some(24.0), Some(80.0));
        assert!(engine.cycle_due(T0_MS + 6 * HOUR_MS));

        engine.run_cycle(T0_MS, Instant::now()).await;
        assert!(!engine.cycle_due(T0_MS + 6 * HOUR_MS - 1));
        assert!(engine.cycle_due(T0_MS + 6 * HOUR_MS));
    }

    #[tokio::test]
    async fn set_interval_reanchors_on_last_measurement() {
        let (mut engine, _tmp) = test_engine(Some(24.0), Some(80.0));
        engine.run_cycle(T0_MS, Instant::now()).await;

        // Re-anchor two hours after the measurement, not after "now".
        engine.set_interval(2).unwrap();
        assert!(!engine.cycle_due(T0_MS + 2 * HOUR_MS - 1));
        assert!(engine.cycle_due(T0_MS + 2 * HOUR_MS));
    }

    #[test]
    fn set_interval_without_measurements_anchors_on_start_epoch() {
        let (mut engine, _tmp) = test_engine(Some(24.0), Some(80.0));
        engine.set_interval(1).unwrap();
        assert!(engine.cycle_due(T0_MS + HOUR_MS));
        assert!(!engine.cycle_due(T0_MS + HOUR_MS - 1));
    }

    #[test]
    fn set_interval_rejects_out_of_range() {
        let (mut engine, _tmp) = test_engine(Some(24.0), Some(80.0));
        assert!(engine.set_interval(0).is_err());
        assert!(engine.set_interval(168).is_err());
        assert_eq!(engine.interval_hours(), 6);
    }

    // -- stage selection ------------------------------------------------------

    #[test]
    fn elapsed_days_resolves_the_schedule() {
        let (engine, _tmp) = test_engine(None, None);
        assert_eq!(engine.stage_info(T0_MS).index, 0);
        assert_eq!(engine.stage_info(T0_MS + 7 * DAY_MS).index, 0);
        assert_eq!(engine.stage_info(T0_MS + 8 * DAY_MS).index, 1);
        assert_eq!(engine.stage_info(T0_MS + 8 * DAY_MS).name, "Vegetative");
    }

    #[test]
    fn manual_stage_overrides_the_schedule() {
        let (mut engine, _tmp) = test_engine(None, None);
        engine.set_manual_stage(3).unwrap();
        let info = engine.stage_info(T0_MS);
        assert_eq!(info.index, 3);
        assert!(info.manual_override);

        engine.clear_manual_stage();
        let info = engine.stage_info(T0_MS);
        assert_eq!(info.index, 0);
        assert!(!info.manual_override);
    }

    #[test]
    fn manual_stage_rejects_out_of_range_index() {
        let (mut engine, _tmp) = test_engine(None, None);
        assert!(engine.set_manual_stage(5).is_err());
        assert!(engine.set_manual_stage(-1).is_err());
        assert!(!engine.stage_info(T0_MS).manual_override);
    }

    // -- manual pump control ---------------------------------------------------

    #[test]
    fn pump_on_validates_duration() {
        let (mut engine, _tmp) = test_engine(None, None);
        assert!(engine.pump_on(Instant::now(), 0).is_err());
        assert!(engine.pump_on(Instant::now(), 601).is_err());
        assert!(!engine.status(T0_MS, Instant::now()).pump.running);

        engine.pump_on(Instant::now(), 600).unwrap();
        assert!(engine.status(T0_MS, Instant::now()).pump.running);
    }

    #[test]
    fn redundant_pump_on_is_not_an_error() {
        let (mut engine, _tmp) = test_engine(None, None);
        engine.pump_on(Instant::now(), 30).unwrap();
        engine.pump_on(Instant::now(), 30).unwrap();
        assert_eq!(engine.status(T0_MS, Instant::now()).pump.activations, 1);
    }

    // -- persistence across restarts -------------------------------------------

    #[tokio::test]
    async fn bootstrap_restores_persisted_state() {
        let tmp = tempfile::tempdir().unwrap();

        let mut engine = engine_at(tmp.path(), Some(24.0), Some(50.0), T0_MS);
        engine.run_cycle(T0_MS, Instant::now()).await;
        engine.set_interval(12).unwrap();
        engine.set_manual_stage(2).unwrap();
        engine.update_stage_params(2, Some(40), None).unwrap();
        drop(engine);

        // "Reboot" a day later: everything comes back from disk.
        let engine = engine_at(tmp.path(), Some(24.0), Some(50.0), T0_MS + DAY_MS);
        assert_eq!(engine.interval_hours(), 12);
        assert_eq!(engine.history().count(), 1);
        let info = engine.stage_info(T0_MS + DAY_MS);
        assert!(info.manual_override);
        assert_eq!(info.index, 2);
        assert_eq!(info.humidity_threshold, 40);
        // The reference epoch survived, so a day has elapsed on the schedule.
        assert_eq!(info.elapsed_days, 1);
        // Next due anchors on the persisted measurement: T0 + 12h.
        assert!(engine.cycle_due(T0_MS + 12 * HOUR_MS));
        assert!(!engine.cycle_due(T0_MS + 12 * HOUR_MS - 1));
    }

    #[tokio::test]
    async fn clear_history_empties_store_and_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let mut engine = engine_at(tmp.path(), Some(24.0), Some(80.0), T0_MS);
        engine.run_cycle(T0_MS, Instant::now()).await;
        assert_eq!(engine.history().count(), 1);

        engine.clear_history();
        assert_eq!(engine.history().count(), 0);
        drop(engine);

        let engine = engine_at(tmp.path(), Some(24.0), Some(80.0), T0_MS);
        assert_eq!(engine.history().count(), 0);
    }

    // -- status -------------------------------------------------------------------

    #[tokio::test]
    async fn status_reports_rounded_reading_and_vpd() {
        let (mut engine, _tmp) = test_engine(Some(24.46), Some(80.04));
        let now = Instant::now();
        engine.run_cycle(T0_MS, now).await;

        let status = engine.status(T0_MS, now);
        assert_eq!(status.temperature, Some(24.5));
        assert_eq!(status.humidity, Some(80.0));
        assert!(status.sensor_valid);
        assert!(status.vpd_kpa.unwrap() > 0.0);
        assert_eq!(status.sensor_down_secs, None);
        assert_eq!(status.history_len, 1);
        assert!(status.next_due.unwrap().starts_with("20"));
    }

    #[tokio::test]
    async fn status_reports_sensor_downtime() {
        let (mut engine, _tmp) = test_engine(None, None);
        engine.run_cycle(T0_MS, Instant::now()).await;

        let status = engine.status(T0_MS + 3_600_000, Instant::now());
        assert_eq!(status.temperature, None);
        assert!(!status.sensor_valid);
        assert_eq!(status.vpd_kpa, None);
        assert_eq!(status.sensor_down_secs, Some(3600));
    }

    #[test]
    fn rfc3339_renders_epoch_ms() {
        assert_eq!(
            rfc3339(1_700_000_000_000).unwrap(),
            "2023-11-14T22:13:20Z"
        );
    }
}
