// src/models/class.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Class {
    pub id: String,
    pub grade: i64,
    pub class_number: i64,
    pub homeroom_teacher_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Class {
    pub fn label(&self) -> String {
        format!("{}학년 {}반", self.grade, self.class_number)
    }
}

/// Class with the names and ids resolved for listings.
#[derive(Debug, Clone, Serialize)]
pub struct ClassOverview {
    pub id: String,
    pub grade: i64,
    pub class_number: i64,
    pub homeroom_teacher_id: Option<String>,
    pub homeroom_teacher_name: Option<String>,
    pub subject_teacher_ids: Vec<String>,
    pub student_ids: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateClassPayload {
    pub grade: i64,
    pub class_number: i64,
    pub homeroom_teacher_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateClassPayload {
    pub homeroom_teacher_id: Option<String>,
    #[serde(default)]
    pub subject_teacher_ids: Vec<String>,
}
