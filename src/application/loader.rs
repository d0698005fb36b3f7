//! Loader: Reads raw vital-sign readings and fills gaps.
//!
//! Pipeline:
//! 1. Parse CSV rows (header required)
//! 2. Coerce timestamps; any unparseable timestamp fails the load
//! 3. Forward-fill missing vitals within each patient, in time order
//! 4. Drop rows that still have a missing value
//!
//! Unparseable timestamps are a hard `MalformedInput` error rather than a
//! silently skipped row.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};

use crate::adapters::artifact::{read_with_retry, DEFAULT_FETCH_TIMEOUT};
use crate::adapters::retry::RetryPolicy;
use crate::domain::{CleanedReading, RawReading};
use crate::{ChronicareError, Result};

const PATIENT_ALIASES: [&str; 4] = ["patient id", "patient_id", "patientid", "patient"];
const TIMESTAMP_ALIASES: [&str; 4] = ["date", "timestamp", "datetime", "time"];
const HEART_RATE: &str = "heart_rate";
const SYSTOLIC_BP: &str = "systolic_bp";

const MISSING_MARKERS: [&str; 6] = ["", "na", "n/a", "nan", "null", "none"];

const DATETIME_FORMATS: [&str; 8] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
];

const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y"];

/// Parse a timestamp cell.
///
/// Accepts RFC 3339 and common naive date/time layouts; naive values are
/// taken as UTC and bare dates as midnight.
#[must_use]
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let s = raw.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(s, fmt) {
            return date.and_hms_opt(0, 0, 0).map(|naive| naive.and_utc());
        }
    }

    None
}

fn is_missing(cell: &str) -> bool {
    MISSING_MARKERS.contains(&cell.trim().to_lowercase().as_str())
}

fn parse_numeric(cell: &str, column: &str, line: u64) -> Result<Option<f64>> {
    let s = cell.trim();
    if is_missing(s) {
        return Ok(None);
    }

    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        _ => Err(ChronicareError::MalformedInput(format!(
            "line {line}: column '{column}' has non-numeric value '{s}'"
        ))),
    }
}

/// Column positions resolved from the header row.
#[derive(Debug)]
struct Columns {
    patient: usize,
    timestamp: usize,
    heart_rate: usize,
    systolic_bp: usize,
    others: Vec<(String, usize)>,
}

fn find_column(headers: &csv::StringRecord, aliases: &[&str], label: &str) -> Result<usize> {
    // The first alias present wins, so `date` beside a `time` column is fine.
    for alias in aliases {
        let matches: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| h.trim().to_lowercase() == *alias)
            .map(|(i, _)| i)
            .collect();

        match matches.as_slice() {
            [] => continue,
            [i] => return Ok(*i),
            _ => {
                return Err(ChronicareError::MalformedInput(format!(
                    "column '{label}' appears more than once"
                )))
            }
        }
    }

    Err(ChronicareError::MalformedInput(format!(
        "required column '{label}' is missing (accepted names: {aliases:?})"
    )))
}

impl Columns {
    fn resolve(headers: &csv::StringRecord) -> Result<Self> {
        let patient = find_column(headers, &PATIENT_ALIASES, "patient id")?;
        let timestamp = find_column(headers, &TIMESTAMP_ALIASES, "date")?;
        let heart_rate = find_column(headers, &[HEART_RATE], HEART_RATE)?;
        let systolic_bp = find_column(headers, &[SYSTOLIC_BP], SYSTOLIC_BP)?;

        let known = [patient, timestamp, heart_rate, systolic_bp];
        let others = headers
            .iter()
            .enumerate()
            .filter(|(i, h)| !known.contains(i) && !h.trim().is_empty())
            .map(|(i, h)| (h.trim().to_string(), i))
            .collect();

        Ok(Self {
            patient,
            timestamp,
            heart_rate,
            systolic_bp,
            others,
        })
    }
}

/// Whether every non-missing cell of column `idx` is a finite number.
fn is_numeric_column(records: &[(u64, csv::StringRecord)], idx: usize) -> bool {
    records.iter().all(|(_, record)| {
        let cell = record.get(idx).unwrap_or("");
        is_missing(cell) || cell.trim().parse::<f64>().is_ok_and(f64::is_finite)
    })
}

/// Parse raw readings from CSV.
///
/// Extra columns holding only numbers (or missing markers) are carried as
/// vitals; descriptive text columns are ignored.
///
/// # Errors
/// Returns `MalformedInput` for a missing required column, an empty patient
/// id, an unparseable timestamp, a non-numeric heart rate or systolic BP, or
/// a ragged row.
pub fn parse_raw<R: Read>(reader: R) -> Result<Vec<RawReading>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_reader(reader);

    let headers = csv_reader
        .headers()
        .map_err(|e| ChronicareError::MalformedInput(format!("unreadable header row: {e}")))?
        .clone();
    let columns = Columns::resolve(&headers)?;

    let records = csv_reader
        .records()
        .enumerate()
        .map(|(i, record)| -> Result<(u64, csv::StringRecord)> {
            let record = record.map_err(|e| ChronicareError::MalformedInput(e.to_string()))?;
            let line = record.position().map_or(i as u64 + 2, |p| p.line());
            Ok((line, record))
        })
        .collect::<Result<Vec<_>>>()?;

    let vitals: Vec<&(String, usize)> = columns
        .others
        .iter()
        .filter(|(name, idx)| {
            let numeric = is_numeric_column(&records, *idx);
            if !numeric {
                tracing::debug!("Ignoring non-numeric column '{}'", name);
            }
            numeric
        })
        .collect();

    let mut readings = Vec::with_capacity(records.len());
    for (line, record) in &records {
        let line = *line;
        let cell = |idx: usize| record.get(idx).unwrap_or("");

        let patient_id = cell(columns.patient).trim().to_string();
        if patient_id.is_empty() {
            return Err(ChronicareError::MalformedInput(format!(
                "line {line}: empty patient id"
            )));
        }

        let timestamp = parse_timestamp(cell(columns.timestamp)).ok_or_else(|| {
            ChronicareError::MalformedInput(format!(
                "line {line}: unparseable timestamp '{}'",
                cell(columns.timestamp).trim()
            ))
        })?;

        let mut other_vitals = BTreeMap::new();
        for (name, idx) in &vitals {
            other_vitals.insert(name.clone(), parse_numeric(cell(*idx), name, line)?);
        }

        readings.push(RawReading {
            patient_id,
            timestamp,
            heart_rate: parse_numeric(cell(columns.heart_rate), HEART_RATE, line)?,
            systolic_bp: parse_numeric(cell(columns.systolic_bp), SYSTOLIC_BP, line)?,
            other_vitals,
        });
    }

    Ok(readings)
}

/// Carry the last observed value of each column forward.
///
/// `readings` must belong to one patient and be in time order.
fn forward_fill(readings: &mut [RawReading]) {
    let mut last_hr = None;
    let mut last_sbp = None;
    let mut last_other: BTreeMap<String, f64> = BTreeMap::new();

    for r in readings.iter_mut() {
        match r.heart_rate {
            Some(v) => last_hr = Some(v),
            None => r.heart_rate = last_hr,
        }
        match r.systolic_bp {
            Some(v) => last_sbp = Some(v),
            None => r.systolic_bp = last_sbp,
        }
        for (name, value) in r.other_vitals.iter_mut() {
            match value {
                Some(v) => {
                    last_other.insert(name.clone(), *v);
                }
                None => *value = last_other.get(name).copied(),
            }
        }
    }
}

/// Forward-fill per patient and drop rows that remain incomplete.
///
/// Output is ordered by patient id, then timestamp (stable for ties).
#[must_use]
pub fn clean_readings(raw: Vec<RawReading>) -> Vec<CleanedReading> {
    let mut by_patient: BTreeMap<String, Vec<RawReading>> = BTreeMap::new();
    for r in raw {
        by_patient.entry(r.patient_id.clone()).or_default().push(r);
    }

    let mut cleaned = Vec::new();
    for (_, mut readings) in by_patient {
        readings.sort_by_key(|r| r.timestamp);
        forward_fill(&mut readings);
        cleaned.extend(readings.into_iter().filter_map(RawReading::into_cleaned));
    }
    cleaned
}

/// Reads and cleans vital-sign sources.
#[derive(Debug, Clone)]
pub struct Loader {
    retry: RetryPolicy,
    /// Hard limit for each read attempt
    timeout: Duration,
}

impl Default for Loader {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl Loader {
    #[must_use]
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            retry,
            timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Load and clean a CSV file.
    ///
    /// # Errors
    /// Returns `DataNotFound` if the file is absent, or unreadable or timed
    /// out after retries, `MalformedInput` if its content is invalid.
    pub fn load_path(&self, path: &Path) -> Result<Vec<CleanedReading>> {
        let bytes = read_with_retry(path, &self.retry, self.timeout)
            .map_err(|e| ChronicareError::DataNotFound(e.to_string()))?;
        tracing::debug!("Read {} bytes of vital-sign data", bytes.len());
        self.load_reader(bytes.as_slice())
    }

    /// Load and clean CSV from any reader.
    ///
    /// # Errors
    /// Returns `MalformedInput` if the content is invalid.
    pub fn load_reader<R: Read>(&self, reader: R) -> Result<Vec<CleanedReading>> {
        let raw = parse_raw(reader)?;
        let raw_count = raw.len();
        let cleaned = clean_readings(raw);

        let patients = cleaned
            .iter()
            .map(|r| r.patient_id.as_str())
            .collect::<std::collections::BTreeSet<_>>()
            .len();
        tracing::info!(
            "Data loaded and cleaned: {} readings kept, {} dropped, {} patients",
            cleaned.len(),
            raw_count - cleaned.len(),
            patients
        );

        Ok(cleaned)
    }
}
