//! TOML config file loading and validation.

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::stage::{Stage, StageCatalog, THRESHOLD_RANGE};

// ---------------------------------------------------------------------------
// Config file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory for all persisted state (settings + history).
    pub data_dir: String,
    pub web_port: u16,
    pub sensor: SensorMode,
    pub dht_pin: i64,
    pub pump_pin: i64,
    pub relay_active_low: bool,
    /// Default measurement interval, hours; the persisted value wins.
    pub interval_hours: u32,
    pub diagnostics_min: u64,
    /// Optional stage catalog override; the built-in schedule when empty.
    pub stages: Vec<StageEntry>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: "data".into(),
            web_port: 8080,
            sensor: SensorMode::Simulated,
            dht_pin: 4,
            pump_pin: 17,
            relay_active_low: true,
            interval_hours: 6,
            diagnostics_min: 10,
            stages: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SensorMode {
    Simulated,
    Hardware,
}

#[derive(Debug, Deserialize)]
pub struct StageEntry {
    pub name: String,
    pub duration_days: i64,
    pub humidity_threshold: i64,
    pub watering_time_sec: i64,
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
/// GPIO 28+ are not exposed on the standard header.
const VALID_GPIO_PINS: &[i64] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Config {
    /// Validate all config entries. Returns `Ok(())` or an error describing
    /// every violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        if self.data_dir.trim().is_empty() {
            errors.push("data_dir is empty".into());
        }
        if self.web_port == 0 {
            errors.push("web_port must be nonzero".into());
        }
        if !(1..=167).contains(&self.interval_hours) {
            errors.push(format!(
                "interval_hours {} out of range [1, 167]",
                self.interval_hours
            ));
        }
        if !(1..=1440).contains(&self.diagnostics_min) {
            errors.push(format!(
                "diagnostics_min {} out of range [1, 1440]",
                self.diagnostics_min
            ));
        }

        self.validate_pins(&mut errors);
        self.validate_stages(&mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "config validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_pins(&self, errors: &mut Vec<String>) {
        if !VALID_GPIO_PINS.contains(&self.dht_pin) {
            errors.push(format!(
                "dht_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.dht_pin
            ));
        }
        if !VALID_GPIO_PINS.contains(&self.pump_pin) {
            errors.push(format!(
                "pump_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.pump_pin
            ));
        }
        if self.dht_pin == self.pump_pin {
            errors.push(format!(
                "dht_pin and pump_pin are both {} — pins must differ",
                self.dht_pin
            ));
        }
    }

    fn validate_stages(&self, errors: &mut Vec<String>) {
        let mut seen_names: std::collections::HashSet<&str> = std::collections::HashSet::new();

        for (i, s) in self.stages.iter().enumerate() {
            let ctx = || {
                if s.name.is_empty() {
                    format!("stages[{i}]")
                } else {
                    format!("stage '{}'", s.name)
                }
            };

            // ── Identity ────────────────────────────────────────
            if s.name.trim().is_empty() {
                errors.push(format!("{}: name is empty", ctx()));
            } else if !seen_names.insert(&s.name) {
                errors.push(format!("{}: duplicate stage name", ctx()));
            }
            // Names end up inside history record fragments.
            if s.name.contains(['{', '}', '"']) {
                errors.push(format!(
                    "{}: name contains a reserved character ({{, }} or \")",
                    ctx()
                ));
            }

            // ── Schedule and watering bounds ────────────────────
            if s.duration_days < 1 {
                errors.push(format!(
                    "{}: duration_days must be positive, got {}",
                    ctx(),
                    s.duration_days
                ));
            }
            if !THRESHOLD_RANGE.contains(&s.humidity_threshold) {
                errors.push(format!(
                    "{}: humidity_threshold {} out of range [0, 100]",
                    ctx(),
                    s.humidity_threshold
                ));
            }
            if !(1..=600).contains(&s.watering_time_sec) {
                errors.push(format!(
                    "{}: watering_time_sec {} out of range [1, 600]",
                    ctx(),
                    s.watering_time_sec
                ));
            }
        }
    }

    /// Build the stage catalog: the `[[stages]]` override when present, the
    /// built-in schedule otherwise.  Call only after `validate`.
    pub fn catalog(&self) -> StageCatalog {
        if self.stages.is_empty() {
            return StageCatalog::default_catalog();
        }
        StageCatalog::new(
            self.stages
                .iter()
                .map(|s| Stage {
                    name: s.name.clone(),
                    duration_days: s.duration_days as u32,
                    humidity_threshold: s.humidity_threshold as u8,
                    watering_time_sec: s.watering_time_sec as u32,
                })
                .collect(),
        )
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML config file.  A missing file is not an
/// error — the defaults describe a working simulated setup.
pub fn load(path: &str) -> Result<Config> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::info!(path, "no config file, using defaults");
            return Ok(Config::default());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("failed to read config: {path}"));
        }
    };
    let config: Config =
        toml::from_str(&contents).with_context(|| format!("failed to parse config: {path}"))?;
    config
        .validate()
        .with_context(|| format!("invalid config: {path}"))?;
    Ok(config)
}

// ===========================================================================
// Tests
// ===========================================================================
