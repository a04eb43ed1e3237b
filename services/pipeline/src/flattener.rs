//! Lap flattener.
//!
//! Walks the nested race → driver → lap structure of an uploaded document and
//! emits one [`FlatLapRecord`] per normal lap. Lap numbers are positions in the
//! driver's original lap list, so skipped laps still consume an index.

use crate::error::{PipelineError, Result};
use crate::model::{format_lap_date_time, FlatLapRecord, RawRaceDocument};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::{debug, trace};

/// Suffix carried by blobs that were already processed
pub const COMPLETED_SUFFIX: &str = "-completed";

/// Track and notes that every record of one document shares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentContext {
    pub track_name: String,
    pub notes: String,
}

impl DocumentContext {
    /// Read the context from the document itself; the track name is required
    pub fn from_document(doc: &RawRaceDocument) -> Result<Self> {
        let track_name = doc
            .track_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(PipelineError::missing_track_name)?;

        Ok(Self {
            track_name: track_name.to_string(),
            notes: doc.notes.clone().unwrap_or_default(),
        })
    }
}

/// Derive track and notes from an object key shaped `<track>-<notes...>.json`.
///
/// Deprecated upload contract, kept for files named by the old uploader.
pub fn legacy_document_context(key: &str) -> Option<DocumentContext> {
    let file_name = key.rsplit('/').next().unwrap_or(key);
    let stem = file_name.split('.').next().unwrap_or(file_name);
    let mut parts = stem.split('-');
    let track_name = parts.next().filter(|part| !part.is_empty())?;
    let notes: Vec<&str> = parts.collect();

    Some(DocumentContext {
        track_name: track_name.to_string(),
        notes: notes.join("-"),
    })
}

/// Parse an uploaded blob. Accepts a single document or an array of them.
pub fn parse_upload(bytes: &[u8]) -> Result<Vec<RawRaceDocument>> {
    let value: Value = serde_json::from_slice(bytes)?;

    match value {
        Value::Array(items) => items
            .into_iter()
            .map(|item| serde_json::from_value(item).map_err(PipelineError::from))
            .collect(),
        other => Ok(vec![serde_json::from_value(other)?]),
    }
}

/// Flatten a document using the track name and notes it carries
pub fn flatten(doc: &RawRaceDocument) -> Result<Vec<FlatLapRecord>> {
    let context = DocumentContext::from_document(doc)?;
    flatten_with_context(doc, &context)
}

/// Flatten a document with an explicitly supplied context
pub fn flatten_with_context(
    doc: &RawRaceDocument,
    context: &DocumentContext,
) -> Result<Vec<FlatLapRecord>> {
    let races = doc
        .data
        .as_ref()
        .and_then(|data| data.races.as_ref())
        .ok_or_else(PipelineError::missing_races)?;

    let mut records = Vec::new();

    for race in races {
        let race_start = parse_race_start(&race.date)?;

        for driver in &race.drivers {
            for (index, lap) in driver.laps.iter().enumerate() {
                if !lap.is_normal() {
                    trace!(race = %race.uuid, driver = %driver.name, lap = index, kind = %lap.kind, "Skipping lap");
                    continue;
                }

                let end_offset = lap.end_timestamp.ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "Lap {} of {} in race {} has no endTimestamp",
                        index, driver.name, race.uuid
                    ))
                })?;
                let duration = lap.duration.ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "Lap {} of {} in race {} has no duration",
                        index, driver.name, race.uuid
                    ))
                })?;

                let lap_timestamp = race_start.checked_add(end_offset).ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "Lap {} of {} in race {} ends outside the representable time range",
                        index, driver.name, race.uuid
                    ))
                })?;
                let lap_date_time = format_lap_date_time(lap_timestamp).ok_or_else(|| {
                    PipelineError::Validation(format!(
                        "Lap timestamp {} is out of range",
                        lap_timestamp
                    ))
                })?;

                records.push(FlatLapRecord {
                    race_id: race.uuid.clone(),
                    lap_timestamp,
                    race_name: race.name.clone(),
                    track_name: context.track_name.clone(),
                    race_notes: context.notes.clone(),
                    driver_name: driver.name.clone(),
                    lap_number: index as i64,
                    lap_time: duration,
                    lap_date_time,
                });
            }
        }
    }

    debug!(
        track = %context.track_name,
        races = races.len(),
        records = records.len(),
        "Flattened race document"
    );

    Ok(records)
}

/// Race start as epoch milliseconds. Dates without an offset are read as UTC.
pub fn parse_race_start(date: &str) -> Result<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(date) {
        return Ok(dt.timestamp_millis());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(naive.and_utc().timestamp_millis());
    }
    if let Some(midnight) = NaiveDate::parse_from_str(date, "%Y-%m-%d")
        .ok()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
    {
        return Ok(midnight.and_utc().timestamp_millis());
    }

    Err(PipelineError::Validation(format!(
        "Invalid race date: {:?}",
        date
    )))
}

/// Key a processed blob is moved to: `<base>-completed.json`
pub fn completed_key(key: &str) -> String {
    let base = key.strip_suffix(".json").unwrap_or(key);
    format!("{}{}.json", base, COMPLETED_SUFFIX)
}

/// Whether a key already names a processed blob
pub fn is_completed_key(key: &str) -> bool {
    key.strip_suffix(".json")
        .unwrap_or(key)
        .ends_with(COMPLETED_SUFFIX)
}
