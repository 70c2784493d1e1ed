use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::enums::LogStatus;

/// One scheduled dose and whether it was taken.
///
/// `id` is absent until the backend has persisted the log; optimistic
/// entries are matched by `schedule_id` instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicationLog {
    #[serde(default)]
    pub id: Option<i64>,
    pub schedule_id: i64,
    #[serde(default)]
    pub medication_id: Option<i64>,
    #[serde(default)]
    pub medication_name: String,
    pub scheduled_at: NaiveDateTime,
    #[serde(default)]
    pub taken_at: Option<NaiveDateTime>,
    pub status: LogStatus,
    #[serde(default)]
    pub member_id: Option<i64>,
}

impl MedicationLog {
    /// Calendar date bucket this log belongs to.
    pub fn date_key(&self) -> NaiveDate {
        self.scheduled_at.date()
    }

    /// Same log: matching persisted id, or matching schedule slot.
    pub fn same_entry(&self, other: &MedicationLog) -> bool {
        match (self.id, other.id) {
            (Some(a), Some(b)) if a == b => true,
            _ => self.schedule_id == other.schedule_id,
        }
    }
}
