// src/models/reset.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum ConsentStatus {
    Pending,
    Approved,
    Rejected,
}

/// One homeroom teacher's consent for the current reset round.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ResetRequest {
    pub id: String,
    pub teacher_id: String,
    pub teacher_name: String,
    pub requested_by: String,
    pub status: ConsentStatus,
    pub created_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
pub struct ResetStatus {
    pub consents: Vec<ResetRequest>,
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ConsentPayload {
    pub approve: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct ExecuteResetPayload {
    #[serde(default)]
    pub include_students: bool,
}

#[derive(Debug, Serialize)]
pub struct ResetSummary {
    pub records_deleted: u64,
    pub requests_deleted: u64,
    pub students_deleted: u64,
}
