// src/models/log.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogCategory {
    Auth,
    Account,
    Class,
    Merit,
    Request,
    Reset,
    Import,
    Report,
    Inquiry,
}

impl LogCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogCategory::Auth => "auth",
            LogCategory::Account => "account",
            LogCategory::Class => "class",
            LogCategory::Merit => "merit",
            LogCategory::Request => "request",
            LogCategory::Reset => "reset",
            LogCategory::Import => "import",
            LogCategory::Report => "report",
            LogCategory::Inquiry => "inquiry",
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct SystemLog {
    pub id: i64,
    pub category: String,
    pub action: String,
    pub details: String,
    pub actor_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LogQuery {
    pub category: Option<LogCategory>,
    pub limit: Option<i64>,
}
