//! File-backed persistence for settings and history.
//!
//! Each setting is one logical value in one file under the data directory.
//! Loads fall back to defaults on missing or invalid content; writes are
//! best-effort — a failed write is logged and skipped, leaving the in-memory
//! state authoritative for the rest of the session.  Only opening the data
//! directory itself is fatal.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::stage::StageParams;

const INTERVAL_FILE: &str = "interval.txt";
const MANUAL_STAGE_FILE: &str = "manual_stage.txt";
const HISTORY_FILE: &str = "measurements.txt";
const STAGE_PARAMS_FILE: &str = "stages.json";
const START_EPOCH_FILE: &str = "start_epoch.txt";

pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    /// Create or open the data directory.  Failure here means persistence
    /// semantics would be undefined, so the caller should treat it as fatal.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create data dir: {}", root.display()))?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    // ── best-effort primitives ──────────────────────────────────────────

    fn write(&self, name: &str, contents: &str) {
        if let Err(e) = fs::write(self.path(name), contents) {
            tracing::error!(file = name, "write failed, keeping in-memory state: {e}");
        }
    }

    fn read(&self, name: &str) -> Option<String> {
        match fs::read_to_string(self.path(name)) {
            Ok(s) => Some(s),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => {
                tracing::error!(file = name, "read failed: {e}");
                None
            }
        }
    }

    fn remove(&self, name: &str) {
        match fs::remove_file(self.path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::error!(file = name, "remove failed: {e}"),
        }
    }

    // ── measurement interval ─────────────────────────────────────────────

    pub fn load_interval(&self) -> Option<u32> {
        let raw = self.read(INTERVAL_FILE)?;
        match raw.trim().parse::<u32>() {
            Ok(hours) if (1..=167).contains(&hours) => {
                tracing::info!(hours, "interval loaded");
                Some(hours)
            }
            _ => {
                tracing::warn!(raw = raw.trim(), "invalid persisted interval, using default");
                None
            }
        }
    }

    pub fn save_interval(&self, hours: u32) {
        self.write(INTERVAL_FILE, &format!("{hours}\n"));
    }

    // ── manual stage selection ──────────────────────────────────────────

    /// Load the manual stage index, validating against the catalog size.
    /// An invalid file is removed so the next boot starts clean.
    pub fn load_manual_stage(&self, num_stages: usize) -> Option<usize> {
        let raw = self.read(MANUAL_STAGE_FILE)?;
        match raw.trim().parse::<usize>() {
            Ok(index) if index < num_stages => {
                tracing::info!(index, "manual stage selection loaded");
                Some(index)
            }
            _ => {
                tracing::warn!(
                    raw = raw.trim(),
                    "invalid persisted manual stage, reverting to automatic"
                );
                self.remove(MANUAL_STAGE_FILE);
                None
            }
        }
    }

    pub fn save_manual_stage(&self, index: usize) {
        self.write(MANUAL_STAGE_FILE, &format!("{index}\n"));
    }

    pub fn clear_manual_stage(&self) {
        self.remove(MANUAL_STAGE_FILE);
    }

    // ── reference start epoch ─────────────────────────────────────────────

    pub fn load_start_epoch(&self) -> Option<i64> {
        let raw = self.read(START_EPOCH_FILE)?;
        match raw.trim().parse::<i64>() {
            Ok(epoch) if epoch > 0 => Some(epoch),
            _ => {
                tracing::warn!(raw = raw.trim(), "invalid persisted start epoch");
                None
            }
        }
    }

    pub fn save_start_epoch(&self, epoch: i64) {
        self.write(START_EPOCH_FILE, &format!("{epoch}\n"));
    }

    // ── measurement history ───────────────────────────────────────────────

    pub fn load_history(&self) -> String {
        self.read(HISTORY_FILE).unwrap_or_default()
    }

    pub fn save_history(&self, encoded: &str) {
        self.write(HISTORY_FILE, encoded);
    }

    pub fn clear_history(&self) {
        self.remove(HISTORY_FILE);
    }

    // ── stage parameter overrides ─────────────────────────────────────────

    pub fn load_stage_params(&self) -> Option<Vec<StageParams>> {
        let raw = self.read(STAGE_PARAMS_FILE)?;
        match serde_json::from_str(&raw) {
            Ok(params) => Some(params),
            Err(e) => {
                tracing::warn!("invalid persisted stage parameters, using defaults: {e}");
                None
            }
        }
    }

    pub fn save_stage_params(&self, params: &[StageParams]) {
        match serde_json::to_string(params) {
            Ok(json) => self.write(STAGE_PARAMS_FILE, &json),
            Err(e) => tracing::error!("failed to serialize stage parameters: {e}"),
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn test_dir() -> (DataDir, tempfile::TempDir) {
        let tmp = tempfile::tempdir().unwrap();
        let data = DataDir::open(tmp.path()).unwrap();
        (data, tmp)
    }

    // -- interval ----------------------------------------------------------

    #[test]
    fn interval_round_trips() {
        let (data, _tmp) = test_dir();
        assert_eq!(data.load_interval(), None);
        data.save_interval(6);
        assert_eq!(data.load_interval(), Some(6));
    }

    #[test]
    fn out_of_range_interval_is_rejected() {
        let (data, _tmp) = test_dir();
        fs::write(data.path(INTERVAL_FILE), "0\n").unwrap();
        assert_eq!(data.load_interval(), None);
        fs::write(data.path(INTERVAL_FILE), "168\n").unwrap();
        assert_eq!(data.load_interval(), None);
    }

    #[test]
    fn garbage_interval_is_rejected() {
        let (data, _tmp) = test_dir();
        fs::write(data.path(INTERVAL_FILE), "six hours").unwrap();
        assert_eq!(data.load_interval(), None);
    }

    // -- manual stage --------------------------------------------------------

    #[test]
    fn manual_stage_round_trips() {
        let (data, _tmp) = test_dir();
        data.save_manual_stage(2);
        assert_eq!(data.load_manual_stage(5), Some(2));
    }

    #[test]
    fn clear_manual_stage_reverts_to_automatic() {
        let (data, _tmp) = test_dir();
        data.save_manual_stage(2);
        data.clear_manual_stage();
        assert_eq!(data.load_manual_stage(5), None);
    }

    #[test]
    fn out_of_range_manual_stage_is_rejected_and_removed() {
        let (data, _tmp) = test_dir();
        data.save_manual_stage(7);
        assert_eq!(data.load_manual_stage(5), None);
        // The invalid file was deleted, not left to warn on every boot.
        assert!(!data.path(MANUAL_STAGE_FILE).exists());
    }

    // -- start epoch ----------------------------------------------------------

    #[test]
    fn start_epoch_round_trips() {
        let (data, _tmp) = test_dir();
        assert_eq!(data.load_start_epoch(), None);
        data.save_start_epoch(1_700_000_000);
        assert_eq!(data.load_start_epoch(), Some(1_700_000_000));
    }

    #[test]
    fn non_positive_start_epoch_is_rejected() {
        let (data, _tmp) = test_dir();
        fs::write(data.path(START_EPOCH_FILE), "0").unwrap();
        assert_eq!(data.load_start_epoch(), None);
    }

    // -- history ---------------------------------------------------------------

    #[test]
    fn history_round_trips() {
        let (data, _tmp) = test_dir();
        assert_eq!(data.load_history(), "");
        data.save_history("{\"epoch_ms\":1}");
        assert_eq!(data.load_history(), "{\"epoch_ms\":1}");
        data.clear_history();
        assert_eq!(data.load_history(), "");
    }

    #[test]
    fn clear_history_on_missing_file_is_fine() {
        let (data, _tmp) = test_dir();
        data.clear_history(); // must not error or log spuriously
    }

    // -- stage params ------------------------------------------------------------

    #[test]
    fn stage_params_round_trip() {
        let (data, _tmp) = test_dir();
        let params = vec![
            StageParams {
                humidity_threshold: 65,
                watering_time_sec: 15,
            },
            StageParams {
                humidity_threshold: 60,
                watering_time_sec: 25,
            },
        ];
        data.save_stage_params(&params);
        let loaded = data.load_stage_params().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(loaded[0].humidity_threshold, 65);
        assert_eq!(loaded[1].watering_time_sec, 25);
    }

    #[test]
    fn corrupt_stage_params_fall_back_to_defaults() {
        let (data, _tmp) = test_dir();
        fs::write(data.path(STAGE_PARAMS_FILE), "not json").unwrap();
        assert!(data.load_stage_params().is_none());
    }

    // -- data dir -----------------------------------------------------------------

    #[test]
    fn open_creates_nested_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let nested = tmp.path().join("a/b/c");
        let data = DataDir::open(&nested).unwrap();
        assert!(data.root().exists());
    }
}
