// src/models/account.rs
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    HomeroomTeacher,
    SubjectTeacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "super_admin",
            Role::HomeroomTeacher => "homeroom_teacher",
            Role::SubjectTeacher => "subject_teacher",
            Role::Student => "student",
        }
    }

    /// Korean label used on dashboards and exports.
    pub fn label(&self) -> &'static str {
        match self {
            Role::SuperAdmin => "관리자",
            Role::HomeroomTeacher => "담임교사",
            Role::SubjectTeacher => "교과교사",
            Role::Student => "학생",
        }
    }

    pub fn is_teacher(&self) -> bool {
        matches!(self, Role::HomeroomTeacher | Role::SubjectTeacher)
    }

    /// Teachers and admins may award points and see the student list.
    pub fn is_staff(&self) -> bool {
        !matches!(self, Role::Student)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum AccountStatus {
    Pending,
    Active,
    Inactive,
}

/// A row of the `accounts` table. Teacher-only and student-only columns are optional.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Account {
    pub id: String,
    pub login_id: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub name: String,
    pub role: Role,
    pub status: AccountStatus,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub grade: Option<i64>,
    pub class_number: Option<i64>,
    pub student_number: Option<i64>,
    pub student_code: Option<String>,
    pub birth_date: Option<String>,
    pub cumulative_score: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    pub fn is_admin(&self) -> bool {
        self.role == Role::SuperAdmin
    }

    /// "1학년 2반 3번" for students, the role label otherwise.
    pub fn display_position(&self) -> String {
        match (self.grade, self.class_number, self.student_number) {
            (Some(g), Some(c), Some(n)) => format!("{}학년 {}반 {}번", g, c, n),
            _ => self.role.label().to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LoginForm {
    #[serde(rename = "username")]
    pub login_id: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct TeacherSignup {
    pub email: String,
    pub name: String,
    pub password: String,
    pub role: Role,
    pub subject: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangePasswordPayload {
    pub current_password: String,
    pub new_password: String,
}

/// One student as it appears in an import or export sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StudentRow {
    pub student_code: String,
    pub name: String,
    pub grade: i64,
    pub class_number: i64,
    pub student_number: i64,
    pub birth_date: Option<String>,
}

impl From<&Account> for StudentRow {
    fn from(account: &Account) -> Self {
        StudentRow {
            student_code: account.student_code.clone().unwrap_or_default(),
            name: account.name.clone(),
            grade: account.grade.unwrap_or_default(),
            class_number: account.class_number.unwrap_or_default(),
            student_number: account.student_number.unwrap_or_default(),
            birth_date: account.birth_date.clone(),
        }
    }
}

#[derive(Debug, Default, Serialize)]
pub struct ImportSummary {
    pub created: usize,
    pub updated: usize,
    pub errors: Vec<String>,
}
