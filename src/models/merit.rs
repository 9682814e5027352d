// src/models/merit.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

pub const MAX_POINTS: i64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum MeritKind {
    Merit,
    Demerit,
}

impl MeritKind {
    /// Stored points carry the sign of the kind: merits positive, demerits negative.
    pub fn signed(&self, magnitude: i64) -> i64 {
        match self {
            MeritKind::Merit => magnitude.abs(),
            MeritKind::Demerit => -magnitude.abs(),
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            MeritKind::Merit => "상점",
            MeritKind::Demerit => "벌점",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MeritRecord {
    pub id: String,
    pub student_id: String,
    pub kind: MeritKind,
    pub points: i64,
    pub reason: String,
    pub created_by: String,
    pub created_by_name: String,
    pub processed_by: String,
    pub request_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MeritRequest {
    pub id: String,
    pub student_id: String,
    pub requester_id: String,
    pub requester_name: String,
    pub kind: MeritKind,
    pub points: i64,
    pub reason: String,
    pub status: RequestStatus,
    pub processed_by: Option<String>,
    pub processed_at: Option<DateTime<Utc>>,
    pub reject_reason: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct MeritReason {
    pub id: i64,
    pub kind: MeritKind,
    pub reason: String,
    pub default_points: i64,
}

/// Record joined with the student's identifying columns, used by exports and reports.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RecordWithStudent {
    pub id: String,
    pub student_id: String,
    pub student_code: Option<String>,
    pub student_name: String,
    pub kind: MeritKind,
    pub points: i64,
    pub reason: String,
    pub created_by_name: String,
    pub processed_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ScoreSummary {
    pub merit_total: i64,
    pub demerit_total: i64,
    pub net: i64,
}

#[derive(Debug, Deserialize)]
pub struct AwardPayload {
    pub student_id: String,
    pub kind: MeritKind,
    pub points: i64,
    pub reason: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RejectPayload {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateReasonPayload {
    pub kind: MeritKind,
    pub reason: String,
    pub default_points: i64,
}

/// Result of an award: applied immediately or queued for the homeroom teacher.
#[derive(Debug, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AwardOutcome {
    Recorded { record: MeritRecord, cumulative_score: i64 },
    Requested { request: MeritRequest },
}
