//! Bounded measurement history and its on-disk record codec.
//!
//! The store is an insertion-ordered ring: at capacity the oldest record is
//! evicted to make room.  On disk the history is a sequence of brace-delimited
//! record fragments joined by commas, with no enclosing array:
//!
//! ```text
//! {"epoch_ms":1700000000000,"temperature":24.5,"humidity":55.0,"pumpActivated":false,"stage":"Vegetative"},{...}
//! ```
//!
//! The codec is deliberately hand-rolled: the field set and fragment delimiter
//! are fixed, parsing scans fragment boundaries, and a truncated trailing
//! fragment is dropped rather than repaired — a torn tail write loses that one
//! record, not the file.  Stage names must not contain `{`, `}` or `"`
//! (enforced by config validation).

use std::collections::VecDeque;

use anyhow::{Context, Result};

/// Maximum number of records retained.
pub const HISTORY_CAPACITY: usize = 500;

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementRecord {
    pub epoch_ms: i64,
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub pump_activated: bool,
    pub stage: String,
}

// ---------------------------------------------------------------------------
// Record codec
// ---------------------------------------------------------------------------

fn encode_value(v: Option<f32>) -> String {
    match v {
        Some(v) => format!("{v:.1}"),
        None => "null".to_string(),
    }
}

/// Encode one record as a self-delimited fragment.
pub fn encode_record(r: &MeasurementRecord) -> String {
    format!(
        "{{\"epoch_ms\":{},\"temperature\":{},\"humidity\":{},\"pumpActivated\":{},\"stage\":\"{}\"}}",
        r.epoch_ms,
        encode_value(r.temperature),
        encode_value(r.humidity),
        r.pump_activated,
        r.stage
    )
}

/// Split a fragment body into fields at commas outside quoted strings.
fn split_fields(body: &str) -> Vec<&str> {
    let mut fields = Vec::new();
    let mut in_string = false;
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '"' => in_string = !in_string,
            ',' if !in_string => {
                fields.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    fields.push(&body[start..]);
    fields
}

fn parse_nullable(value: &str) -> Result<Option<f32>> {
    if value == "null" {
        Ok(None)
    } else {
        Ok(Some(value.parse().context("bad numeric value")?))
    }
}

fn parse_string(value: &str) -> Result<String> {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .map(str::to_string)
        .context("string value not quoted")
}

/// Parse one fragment body (the text between `{` and `}`).
fn parse_fragment(body: &str) -> Result<MeasurementRecord> {
    let mut epoch_ms: Option<i64> = None;
    let mut temperature: Option<Option<f32>> = None;
    let mut humidity: Option<Option<f32>> = None;
    let mut pump_activated: Option<bool> = None;
    let mut stage: Option<String> = None;

    for field in split_fields(body) {
        let field = field.trim();
        if field.is_empty() {
            continue;
        }
        let (key, value) = field.split_once(':').context("field without ':'")?;
        let key = key.trim().trim_matches('"');
        let value = value.trim();
        match key {
            "epoch_ms" => epoch_ms = Some(value.parse().context("bad epoch_ms")?),
            "temperature" => temperature = Some(parse_nullable(value)?),
            "humidity" => humidity = Some(parse_nullable(value)?),
            "pumpActivated" => {
                pump_activated = Some(value.parse().context("bad pumpActivated")?)
            }
            "stage" => stage = Some(parse_string(value)?),
            // Unknown keys from older/newer formats are ignored.
            _ => {}
        }
    }

    Ok(MeasurementRecord {
        epoch_ms: epoch_ms.context("missing epoch_ms")?,
        temperature: temperature.unwrap_or(None),
        humidity: humidity.unwrap_or(None),
        pump_activated: pump_activated.context("missing pumpActivated")?,
        stage: stage.context("missing stage")?,
    })
}

/// Encode a record sequence, oldest first.
pub fn encode_history<'a>(records: impl Iterator<Item = &'a MeasurementRecord>) -> String {
    records
        .map(encode_record)
        .collect::<Vec<_>>()
        .join(",")
}

/// Scan a persisted history for record fragments.
///
/// A trailing fragment with no closing brace is dropped (torn tail write);
/// a fragment that closes but fails field parsing is skipped with a warning.
/// Parsing stops once `limit` records have been read.
pub fn parse_history(input: &str, limit: usize) -> Vec<MeasurementRecord> {
    let mut records = Vec::new();
    let mut pos = 0;

    while records.len() < limit {
        let Some(start) = input[pos..].find('{').map(|i| pos + i) else {
            break;
        };
        let Some(end) = input[start..].find('}').map(|i| start + i) else {
            tracing::warn!("truncated trailing record fragment, dropping");
            break;
        };

        match parse_fragment(&input[start + 1..end]) {
            Ok(record) => records.push(record),
            Err(e) => tracing::warn!("skipping malformed record fragment: {e:#}"),
        }
        pos = end + 1;
    }

    if records.len() == limit && input[pos..].contains('{') {
        tracing::warn!(limit, "history limit reached while parsing, ignoring the rest");
    }
    records
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

pub struct MeasurementStore {
    records: VecDeque<MeasurementRecord>,
    capacity: usize,
}

impl MeasurementStore {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "store capacity must be positive");
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Rebuild a store from its persisted form.
    pub fn from_encoded(input: &str, capacity: usize) -> Self {
        let mut store = Self::new(capacity);
        for record in parse_history(input, capacity) {
            store.records.push_back(record);
        }
        store
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Append a record, evicting the oldest one at capacity.
    pub fn append(&mut self, record: MeasurementRecord) {
        if self.records.len() >= self.capacity {
            self.records.pop_front();
            tracing::debug!("history full, evicted oldest record");
        }
        self.records.push_back(record);
    }

    /// Records in insertion order, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &MeasurementRecord> {
        self.records.iter()
    }

    pub fn last(&self) -> Option<&MeasurementRecord> {
        self.records.back()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn encode(&self) -> String {
        encode_history(self.records.iter())
    }
}

// ===========================================================================
// Tests
// ===========================================================================
