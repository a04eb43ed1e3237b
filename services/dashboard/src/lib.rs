//! Laptimes Dashboard - the view-model behind the lap times page
//!
//! Holds the full record set fetched from the API and derives everything the
//! page shows from it:
//!
//! - filter dropdowns (tracks, drivers, days)
//! - the leaderboard of best laps per track
//! - the lap table, sorted by header clicks on its rendered text
//! - one chart series per driver and track
//!
//! ```text
//! fetch ──▶ DashboardState ──▶ on_data_changed ──▶ DashboardView
//!   ▲                                                   │
//!   └──────────── upload / filter / sort events ◀───────┘
//! ```
//!
//! Rendering is left to the page; every derivation here is a plain function of
//! the state and can be exercised without one.

pub mod client;
pub mod dashboard;
pub mod error;
pub mod format;
pub mod table;
pub mod upload;
pub mod view;

pub use client::{decode_response, DashboardApi};
pub use dashboard::{Dashboard, ViewMode};
pub use error::{ApiClientError, UploadError};
pub use format::{age_label, format_lap_time};
pub use table::{LapTable, SortIndicator, SortOutcome, TableBody, TableRow};
pub use upload::{SelectedFile, UploadForm, UploadPayload, UploadReceipt, UploadStatus};
pub use view::{
    derive_chart_series, derive_filter_options, derive_leaderboard, derive_table,
    on_data_changed, ChartSeries, DashboardState, DashboardView, Filters, LeaderboardRow,
};
