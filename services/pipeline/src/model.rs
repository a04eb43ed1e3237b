use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Lap kind that counts towards timing; every other kind is discarded
pub const NORMAL_LAP_KIND: &str = "normal";

/// Uploaded race document as produced by the timing system exporter,
/// wrapped with the track name and notes entered by the uploader.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct RawRaceDocument {
    /// Track the races were driven on
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub track_name: Option<String>,
    /// Free-form notes entered with the upload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// Exported timing data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<RawRaceData>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct RawRaceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub races: Option<Vec<RawRace>>,
}

/// One timed session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRace {
    pub uuid: String,
    pub name: String,
    /// Race start, ISO 8601
    pub date: String,
    #[serde(default)]
    pub drivers: Vec<RawDriver>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawDriver {
    pub name: String,
    #[serde(default)]
    pub laps: Vec<RawLap>,
}

/// A single lap as exported. Only the timing fields of normal laps are used.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawLap {
    pub kind: String,
    /// Milliseconds since race start at which the lap ended
    #[serde(default)]
    pub end_timestamp: Option<i64>,
    /// Lap duration in centiseconds
    #[serde(default)]
    pub duration: Option<i64>,
}

impl RawLap {
    pub fn is_normal(&self) -> bool {
        self.kind == NORMAL_LAP_KIND
    }
}

/// One denormalized lap observation, the unit stored and queried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FlatLapRecord {
    pub race_id: String,
    /// Race start (epoch ms) plus the lap's end offset
    pub lap_timestamp: i64,
    pub race_name: String,
    pub track_name: String,
    #[serde(default)]
    pub race_notes: String,
    pub driver_name: String,
    /// Position in the driver's original lap sequence, invalid laps included
    pub lap_number: i64,
    /// Centiseconds
    pub lap_time: i64,
    /// RFC 3339 rendering of `lap_timestamp`
    pub lap_date_time: String,
}

impl FlatLapRecord {
    /// Instant the lap ended, if `lap_date_time` parses
    pub fn lap_instant(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.lap_date_time)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }

    /// `YYYY-MM-DD` part of `lap_date_time`
    pub fn lap_day(&self) -> &str {
        self.lap_date_time
            .split('T')
            .next()
            .unwrap_or(&self.lap_date_time)
    }
}

/// Render an epoch-millisecond timestamp the way lap records store it
pub fn format_lap_date_time(epoch_millis: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp_millis(epoch_millis)
        .map(|dt| dt.to_rfc3339_opts(SecondsFormat::Millis, true))
}
