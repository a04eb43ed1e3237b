//! Pure derivations from dashboard state to what the page renders.

use crate::format::{age_label, format_date, format_lap_time};
use crate::table::LapTable;
use chrono::{DateTime, Utc};
use laptimes_pipeline::FlatLapRecord;
use serde::Serialize;
use std::collections::HashMap;

pub const ALL_TRACKS: &str = "All tracks";
pub const ALL_DRIVERS: &str = "All drivers";
pub const ALL_DAYS: &str = "All days";

pub const CHART_COLORS: [&str; 6] = ["#FF6384", "#36A2EB", "#FFCE56", "#4BC0C0", "#9966FF", "#FF9F40"];
pub const CHART_SHAPES: [&str; 6] = ["circle", "triangle", "rect", "star", "cross", "dash"];

/// Filter selections; `None` means unset
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Filters {
    /// Exact track name
    pub track: Option<String>,
    /// Exact driver name
    pub driver: Option<String>,
    /// Prefix of `LapDateTime`, normally `YYYY-MM-DD`
    pub day: Option<String>,
    /// Case-insensitive substring over rendered table rows
    pub text: Option<String>,
}

impl Filters {
    pub fn matches(&self, record: &FlatLapRecord) -> bool {
        self.track.as_deref().map_or(true, |t| record.track_name == t)
            && self.driver.as_deref().map_or(true, |d| record.driver_name == d)
            && self
                .day
                .as_deref()
                .map_or(true, |d| record.lap_date_time.starts_with(d))
    }
}

/// Dashboard state: the whole fetched collection plus the current filters
#[derive(Debug, Clone, Default)]
pub struct DashboardState {
    pub records: Vec<FlatLapRecord>,
    pub filters: Filters,
}

impl DashboardState {
    pub fn filtered(&self) -> impl Iterator<Item = &FlatLapRecord> {
        self.records.iter().filter(|r| self.filters.matches(r))
    }
}

/// A filter dropdown: the "all" option plus each distinct value once
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptions {
    pub all_label: &'static str,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FilterOptionSets {
    pub tracks: FilterOptions,
    pub drivers: FilterOptions,
    pub days: FilterOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LeaderboardRow {
    pub track_name: String,
    pub driver_name: String,
    pub lap_time: String,
    pub date: String,
    pub age: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ChartPoint {
    /// Epoch milliseconds
    pub x: i64,
    /// Seconds
    pub y: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub label: String,
    pub color: &'static str,
    pub shape: &'static str,
    pub points: Vec<ChartPoint>,
}

/// Everything derived from one state snapshot
#[derive(Debug, Clone)]
pub struct DashboardView {
    pub filter_options: FilterOptionSets,
    pub leaderboard: Vec<LeaderboardRow>,
    pub table: LapTable,
    pub chart: Vec<ChartSeries>,
}

/// Distinct values in first-appearance order
fn distinct<'a>(values: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut seen = Vec::<&str>::new();
    for value in values {
        if !seen.contains(&value) {
            seen.push(value);
        }
    }
    seen.into_iter().map(str::to_string).collect()
}

pub fn derive_filter_options(records: &[FlatLapRecord]) -> FilterOptionSets {
    FilterOptionSets {
        tracks: FilterOptions {
            all_label: ALL_TRACKS,
            values: distinct(records.iter().map(|r| r.track_name.as_str())),
        },
        drivers: FilterOptions {
            all_label: ALL_DRIVERS,
            values: distinct(records.iter().map(|r| r.driver_name.as_str())),
        },
        days: FilterOptions {
            all_label: ALL_DAYS,
            values: distinct(records.iter().map(FlatLapRecord::lap_day)),
        },
    }
}

/// Best lap per track, in the order tracks first appear.
///
/// Ties keep the first record encountered.
pub fn best_laps<'a>(records: &'a [FlatLapRecord], track: Option<&str>) -> Vec<&'a FlatLapRecord> {
    let mut best: Vec<&FlatLapRecord> = Vec::new();
    let mut slots: HashMap<&str, usize> = HashMap::new();

    for record in records
        .iter()
        .filter(|r| track.map_or(true, |t| r.track_name == t))
    {
        match slots.get(record.track_name.as_str()) {
            Some(&slot) => {
                if record.lap_time < best[slot].lap_time {
                    best[slot] = record;
                }
            }
            None => {
                slots.insert(record.track_name.as_str(), best.len());
                best.push(record);
            }
        }
    }

    best
}

pub fn derive_leaderboard(
    records: &[FlatLapRecord],
    track: Option<&str>,
    now: &DateTime<Utc>,
) -> Vec<LeaderboardRow> {
    best_laps(records, track)
        .into_iter()
        .map(|record| {
            let instant = record.lap_instant();
            LeaderboardRow {
                track_name: record.track_name.clone(),
                driver_name: record.driver_name.clone(),
                lap_time: format_lap_time(record.lap_time),
                date: instant
                    .map(|i| format_date(&i))
                    .unwrap_or_else(|| record.lap_day().to_string()),
                age: instant
                    .map(|i| age_label(&i, now))
                    .unwrap_or_default(),
            }
        })
        .collect()
}

/// Table rows for the filtered records, with the free-text filter applied
pub fn derive_table(state: &DashboardState) -> LapTable {
    let mut table = LapTable::from_records(state.filtered());
    if let Some(text) = state.filters.text.as_deref() {
        table.apply_text_filter(text);
    }
    table
}

/// One scatter series per (driver, track) pair present in the filtered set
pub fn derive_chart_series<'a>(records: impl IntoIterator<Item = &'a FlatLapRecord>) -> Vec<ChartSeries> {
    let records: Vec<&FlatLapRecord> = records.into_iter().collect();
    let drivers = distinct(records.iter().map(|r| r.driver_name.as_str()));
    let tracks = distinct(records.iter().map(|r| r.track_name.as_str()));

    let mut series = Vec::new();
    for (driver_index, driver) in drivers.iter().enumerate() {
        for (track_index, track) in tracks.iter().enumerate() {
            let points: Vec<ChartPoint> = records
                .iter()
                .filter(|r| &r.driver_name == driver && &r.track_name == track)
                .map(|r| ChartPoint {
                    x: r.lap_instant()
                        .map(|i| i.timestamp_millis())
                        .unwrap_or(r.lap_timestamp),
                    y: r.lap_time as f64 / 100.0,
                })
                .collect();

            if points.is_empty() {
                continue;
            }

            series.push(ChartSeries {
                label: format!("{} - {}", driver, track),
                color: CHART_COLORS[driver_index % CHART_COLORS.len()],
                shape: CHART_SHAPES[track_index % CHART_SHAPES.len()],
                points,
            });
        }
    }

    series
}

/// Recompute every view from the current state.
///
/// The leaderboard follows the track filter only.
pub fn on_data_changed(state: &DashboardState, now: &DateTime<Utc>) -> DashboardView {
    DashboardView {
        filter_options: derive_filter_options(&state.records),
        leaderboard: derive_leaderboard(&state.records, state.filters.track.as_deref(), now),
        table: derive_table(state),
        chart: derive_chart_series(state.filtered()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn record(track: &str, driver: &str, lap_time: i64, date_time: &str) -> FlatLapRecord {
        FlatLapRecord {
            race_id: "race-1".to_string(),
            lap_timestamp: 0,
            race_name: "Heat 1".to_string(),
            track_name: track.to_string(),
            race_notes: String::new(),
            driver_name: driver.to_string(),
            lap_number: 0,
            lap_time,
            lap_date_time: date_time.to_string(),
        }
    }

    fn records() -> Vec<FlatLapRecord> {
        vec![
            record("Zandvoort", "Max", 6296, "2024-03-09T10:00:00.000Z"),
            record("Spa", "Lewis", 7010, "2024-03-01T10:00:00.000Z"),
            record("Zandvoort", "Lewis", 6100, "2024-03-09T11:00:00.000Z"),
            record("Zandvoort", "Charles", 6100, "2024-03-02T11:00:00.000Z"),
            record("Spa", "Max", 7200, "2024-03-02T12:00:00.000Z"),
        ]
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_filter_options() {
        let options = derive_filter_options(&records());
        assert_eq!(options.tracks.all_label, "All tracks");
        assert_eq!(options.tracks.values, vec!["Zandvoort", "Spa"]);
        assert_eq!(options.drivers.values, vec!["Max", "Lewis", "Charles"]);
        assert_eq!(options.days.values, vec!["2024-03-09", "2024-03-01", "2024-03-02"]);
    }

    #[test]
    fn test_leaderboard_minimum_with_first_tie() {
        let board = derive_leaderboard(&records(), None, &now());
        assert_eq!(board.len(), 2);

        assert_eq!(board[0].track_name, "Zandvoort");
        assert_eq!(board[0].driver_name, "Lewis");
        assert_eq!(board[0].lap_time, "1:01.00");
        assert_eq!(board[0].date, "2024-03-09");
        assert_eq!(board[0].age, "2 days ago");

        assert_eq!(board[1].track_name, "Spa");
        assert_eq!(board[1].driver_name, "Lewis");
        assert_eq!(board[1].age, "1 weeks ago");
    }

    #[test]
    fn test_leaderboard_track_filter() {
        let board = derive_leaderboard(&records(), Some("Spa"), &now());
        assert_eq!(board.len(), 1);
        assert_eq!(board[0].track_name, "Spa");
        assert!(derive_leaderboard(&records(), Some("Monza"), &now()).is_empty());
    }

    #[test]
    fn test_combined_filters() {
        let state = DashboardState {
            records: records(),
            filters: Filters {
                track: Some("Zandvoort".to_string()),
                driver: Some("Lewis".to_string()),
                day: Some("2024-03-09".to_string()),
                text: None,
            },
        };
        let matched: Vec<_> = state.filtered().collect();
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].lap_time, 6100);
    }

    #[test]
    fn test_no_match_renders_placeholder() {
        let state = DashboardState {
            records: records(),
            filters: Filters {
                driver: Some("Nobody".to_string()),
                ..Filters::default()
            },
        };
        let view = on_data_changed(&state, &now());
        assert!(view.table.is_placeholder());
        assert!(view.chart.is_empty());
        assert_eq!(view.leaderboard.len(), 2);
    }

    #[test]
    fn test_chart_series() {
        let series = derive_chart_series(&records());
        let labels: Vec<_> = series.iter().map(|s| s.label.as_str()).collect();
        assert_eq!(
            labels,
            vec!["Max - Zandvoort", "Max - Spa", "Lewis - Zandvoort", "Lewis - Spa", "Charles - Zandvoort"]
        );

        assert_eq!(series[0].color, "#FF6384");
        assert_eq!(series[0].shape, "circle");
        assert_eq!(series[1].shape, "triangle");
        assert_eq!(series[2].color, "#36A2EB");
        assert_eq!(series[0].points[0].y, 62.96);
        assert_eq!(
            series[0].points[0].x,
            Utc.with_ymd_and_hms(2024, 3, 9, 10, 0, 0).unwrap().timestamp_millis()
        );
    }

    #[test]
    fn test_chart_palette_cycles() {
        let records: Vec<_> = (0..8)
            .map(|i| record("Spa", &format!("Driver {}", i), 7000, "2024-03-01T10:00:00.000Z"))
            .collect();
        let series = derive_chart_series(&records);
        assert_eq!(series.len(), 8);
        assert_eq!(series[6].color, series[0].color);
        assert_eq!(series[7].color, "#36A2EB");
    }

    fn arb_filter(values: &'static [&'static str]) -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop::sample::select(values).prop_map(str::to_string))
    }

    proptest! {
        #[test]
        fn prop_dropping_a_filter_widens_results(
            track in arb_filter(&["Zandvoort", "Spa"]),
            driver in arb_filter(&["Max", "Lewis", "Charles"]),
            day in arb_filter(&["2024-03-09", "2024-03-02"]),
        ) {
            let full = DashboardState {
                records: records(),
                filters: Filters { track: track.clone(), driver: driver.clone(), day: day.clone(), text: None },
            };
            let narrowed: Vec<_> = full.filtered().cloned().collect();

            for filters in [
                Filters { track: None, ..full.filters.clone() },
                Filters { driver: None, ..full.filters.clone() },
                Filters { day: None, ..full.filters.clone() },
            ] {
                let wider = DashboardState { records: records(), filters };
                let widened: Vec<_> = wider.filtered().cloned().collect();
                prop_assert!(narrowed.iter().all(|r| widened.contains(r)));
            }

            for record in &narrowed {
                prop_assert!(track.as_deref().map_or(true, |t| record.track_name == t));
                prop_assert!(driver.as_deref().map_or(true, |d| record.driver_name == d));
                prop_assert!(day.as_deref().map_or(true, |d| record.lap_day() == d));
            }
        }
    }
}
