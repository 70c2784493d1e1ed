//! Medication log endpoints.
//!
//! - `GET /medication-logs?date=YYYY-MM-DD`
//! - `GET /medication-logs/range?startDate=..&endDate=..`

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::api::client::ApiClient;
use crate::api::error::ApiError;
use crate::models::MedicationLog;

#[async_trait]
pub trait MedicationLogApi: Send + Sync {
    async fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<MedicationLog>, ApiError>;
    async fn fetch_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MedicationLog>, ApiError>;
}

fn date_param(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

#[async_trait]
impl MedicationLogApi for ApiClient {
    async fn fetch_by_date(&self, date: NaiveDate) -> Result<Vec<MedicationLog>, ApiError> {
        self.get("medication-logs", &[("date", date_param(date))]).await
    }

    async fn fetch_by_range(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<MedicationLog>, ApiError> {
        self.get(
            "medication-logs/range",
            &[("startDate", date_param(start)), ("endDate", date_param(end))],
        )
        .await
    }
}
