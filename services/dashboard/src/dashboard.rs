//! Dashboard controller: owns the state, reacts to page events and keeps the
//! derived views current.

use crate::client::DashboardApi;
use crate::error::UploadError;
use crate::table::SortOutcome;
use crate::upload::{UploadForm, UploadReceipt, UploadStatus};
use crate::view::{on_data_changed, DashboardState, DashboardView, Filters};
use chrono::{DateTime, Utc};
use tracing::{error, info, instrument};

/// Which panel is shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ViewMode {
    #[default]
    Chart,
    Table,
}

impl ViewMode {
    pub fn toggled(self) -> Self {
        match self {
            ViewMode::Chart => ViewMode::Table,
            ViewMode::Table => ViewMode::Chart,
        }
    }
}

pub struct Dashboard<A> {
    api: A,
    state: DashboardState,
    view: DashboardView,
    mode: ViewMode,
    upload_status: UploadStatus,
}

impl<A: DashboardApi> Dashboard<A> {
    /// Create an empty dashboard; call [`Dashboard::refresh`] to load data
    pub fn new(api: A, now: &DateTime<Utc>) -> Self {
        let state = DashboardState::default();
        let view = on_data_changed(&state, now);

        Self {
            api,
            state,
            view,
            mode: ViewMode::default(),
            upload_status: UploadStatus::default(),
        }
    }

    pub fn state(&self) -> &DashboardState {
        &self.state
    }

    pub fn view(&self) -> &DashboardView {
        &self.view
    }

    pub fn mode(&self) -> ViewMode {
        self.mode
    }

    pub fn upload_status(&self) -> UploadStatus {
        self.upload_status
    }

    /// Refetch the full record set and rebuild every view.
    ///
    /// A failed fetch is logged and leaves the current state in place.
    /// Returns whether new data was loaded.
    #[instrument(skip(self, now))]
    pub async fn refresh(&mut self, now: &DateTime<Utc>) -> bool {
        match self.api.fetch_records().await {
            Ok(records) => {
                info!(count = records.len(), "Fetched race data");
                self.state.records = records;
                self.rerender(now);
                true
            }
            Err(e) => {
                error!(error = %e, "Error fetching race data");
                false
            }
        }
    }

    /// Track selection also narrows the leaderboard
    pub fn set_track_filter(&mut self, track: Option<String>, now: &DateTime<Utc>) {
        self.state.filters.track = track;
        self.rerender(now);
    }

    pub fn set_driver_filter(&mut self, driver: Option<String>, now: &DateTime<Utc>) {
        self.state.filters.driver = driver;
        self.rerender(now);
    }

    pub fn set_day_filter(&mut self, day: Option<String>, now: &DateTime<Utc>) {
        self.state.filters.day = day;
        self.rerender(now);
    }

    /// Hide table rows not containing `text`; keeps the current row order
    pub fn set_text_filter(&mut self, text: Option<String>) {
        self.view
            .table
            .apply_text_filter(text.as_deref().unwrap_or_default());
        self.state.filters.text = text;
    }

    pub fn filters(&self) -> &Filters {
        &self.state.filters
    }

    /// Header click on the lap table
    pub fn sort(&mut self, column: usize) -> SortOutcome {
        self.view.table.sort(column)
    }

    pub fn toggle_view(&mut self) -> ViewMode {
        self.mode = self.mode.toggled();
        self.mode
    }

    /// Clear the status line, e.g. when the upload dialog closes
    pub fn reset_upload_status(&mut self) {
        self.upload_status = UploadStatus::Idle;
    }

    /// Submit the upload form and refetch on success.
    ///
    /// An incomplete form fails before any request is made.
    #[instrument(skip(self, form, now), fields(track = %form.track_name))]
    pub async fn submit_upload(
        &mut self,
        form: &UploadForm,
        now: &DateTime<Utc>,
    ) -> Result<UploadReceipt, UploadError> {
        let payload = match form.prepare() {
            Ok(payload) => payload,
            Err(e) => {
                self.upload_status = if e.is_precondition() {
                    UploadStatus::MissingInput
                } else {
                    error!(error = %e, "Upload error");
                    UploadStatus::Failed
                };
                return Err(e);
            }
        };

        self.upload_status = UploadStatus::Uploading;

        match self.api.upload(&payload).await {
            Ok(receipt) => {
                info!(key = %receipt.file_name, "Upload accepted");
                self.upload_status = UploadStatus::Succeeded;
                self.refresh(now).await;
                Ok(receipt)
            }
            Err(e) => {
                error!(error = %e, "Upload error");
                self.upload_status = UploadStatus::Failed;
                Err(e.into())
            }
        }
    }

    fn rerender(&mut self, now: &DateTime<Utc>) {
        self.view = on_data_changed(&self.state, now);
    }
}
