// src/models/inquiry.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum InquiryStatus {
    Open,
    Answered,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Inquiry {
    pub id: String,
    pub author_id: String,
    pub title: String,
    pub content: String,
    pub status: InquiryStatus,
    pub answer: Option<String>,
    pub answered_by: Option<String>,
    pub answered_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateInquiryPayload {
    pub title: String,
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AnswerInquiryPayload {
    pub answer: String,
}
