//! Lap table and its header-click sort protocol.
//!
//! Sorting works on the rendered cell text, not on the typed records: lap
//! numbers are parsed back as integers, lap times as `m:ss.hh`, date-times
//! as instants, and everything else compares as plain strings.

use crate::format::{
    format_lap_time, format_table_date_time, lap_time_to_millis, parse_table_date_time,
};
use laptimes_pipeline::FlatLapRecord;
use std::cmp::Ordering;
use tracing::{debug, warn};

pub const TABLE_HEADERS: [&str; 6] = ["Track", "Driver", "Lap", "Lap Time", "Date/Time", "Notes"];

pub const NO_DATA_MESSAGE: &str = "No data matches the selected filters";

const LAP_NUMBER_COLUMN: usize = 2;
const LAP_TIME_COLUMN: usize = 3;
const DATE_TIME_COLUMN: usize = 4;

/// How a column's cell text is compared
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Numeric,
    Duration,
    DateTime,
    Text,
}

impl ColumnKind {
    pub fn for_column(index: usize) -> Self {
        match index {
            LAP_NUMBER_COLUMN => ColumnKind::Numeric,
            LAP_TIME_COLUMN => ColumnKind::Duration,
            DATE_TIME_COLUMN => ColumnKind::DateTime,
            _ => ColumnKind::Text,
        }
    }

    fn compare(self, a: &str, b: &str) -> Ordering {
        let (a, b) = (a.trim(), b.trim());
        match self {
            ColumnKind::Numeric => a.parse::<i64>().ok().cmp(&b.parse::<i64>().ok()),
            ColumnKind::Duration => lap_time_to_millis(a).cmp(&lap_time_to_millis(b)),
            ColumnKind::DateTime => parse_table_date_time(a).cmp(&parse_table_date_time(b)),
            ColumnKind::Text => a.cmp(b),
        }
    }
}

/// Indicator shown on the most recently sorted header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortIndicator {
    Ascending,
    Descending,
}

/// What a header click did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOutcome {
    Sorted(SortIndicator),
    /// Nothing to sort; logged and ignored
    EmptyTable,
    /// Column outside the header range; logged and ignored
    InvalidColumn,
}

/// One rendered table row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRow {
    pub cells: Vec<String>,
    /// Hidden by the free-text filter
    pub hidden: bool,
}

impl TableRow {
    pub fn from_record(record: &FlatLapRecord) -> Self {
        let date_time = record
            .lap_instant()
            .map(|instant| format_table_date_time(&instant))
            .unwrap_or_else(|| record.lap_date_time.clone());

        Self {
            cells: vec![
                record.track_name.clone(),
                record.driver_name.clone(),
                record.lap_number.to_string(),
                format_lap_time(record.lap_time),
                date_time,
                record.race_notes.clone(),
            ],
            hidden: false,
        }
    }

    /// Cell text joined the way the free-text filter sees it
    pub fn text(&self) -> String {
        self.cells.join(" ")
    }
}

/// Table body: either data rows or the no-data placeholder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableBody {
    Rows(Vec<TableRow>),
    Placeholder(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LapTable {
    body: TableBody,
    last_sorted: Option<usize>,
    indicator: Option<(usize, SortIndicator)>,
}

impl LapTable {
    /// Build a fresh table; sort state always starts cleared
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FlatLapRecord>) -> Self {
        let rows: Vec<TableRow> = records.into_iter().map(TableRow::from_record).collect();
        let body = if rows.is_empty() {
            TableBody::Placeholder(NO_DATA_MESSAGE)
        } else {
            TableBody::Rows(rows)
        };

        Self {
            body,
            last_sorted: None,
            indicator: None,
        }
    }

    pub fn headers(&self) -> &'static [&'static str] {
        &TABLE_HEADERS
    }

    pub fn body(&self) -> &TableBody {
        &self.body
    }

    /// Data rows, hidden ones included
    pub fn rows(&self) -> &[TableRow] {
        match &self.body {
            TableBody::Rows(rows) => rows,
            TableBody::Placeholder(_) => &[],
        }
    }

    pub fn visible_rows(&self) -> impl Iterator<Item = &TableRow> {
        self.rows().iter().filter(|row| !row.hidden)
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self.body, TableBody::Placeholder(_))
    }

    pub fn sort_indicator(&self, column: usize) -> Option<SortIndicator> {
        self.indicator
            .filter(|(sorted, _)| *sorted == column)
            .map(|(_, indicator)| indicator)
    }

    /// Hide rows whose text does not contain `filter`, ignoring case
    pub fn apply_text_filter(&mut self, filter: &str) {
        let needle = filter.to_lowercase();
        if let TableBody::Rows(rows) = &mut self.body {
            for row in rows.iter_mut() {
                row.hidden = !row.text().to_lowercase().contains(&needle);
            }
        }
    }

    /// Sort by a header click.
    ///
    /// A click on the column sorted last reverses the ascending order and
    /// clears the toggle; any other click sorts ascending.
    pub fn sort(&mut self, column: usize) -> SortOutcome {
        let rows = match &mut self.body {
            TableBody::Rows(rows) if !rows.is_empty() => rows,
            _ => {
                warn!("Table is empty, nothing to sort");
                return SortOutcome::EmptyTable;
            }
        };

        if column >= rows[0].cells.len() {
            warn!("Invalid column index: {}", column);
            return SortOutcome::InvalidColumn;
        }

        let kind = ColumnKind::for_column(column);
        rows.sort_by(|a, b| kind.compare(&a.cells[column], &b.cells[column]));

        let indicator = if self.last_sorted == Some(column) {
            rows.reverse();
            self.last_sorted = None;
            SortIndicator::Descending
        } else {
            self.last_sorted = Some(column);
            SortIndicator::Ascending
        };

        self.indicator = Some((column, indicator));
        debug!(column = column, ?indicator, "Sorted lap table");
        SortOutcome::Sorted(indicator)
    }
}
