// src/templates.rs
use crate::models::{
    account::{Account, Role},
    merit::{MeritRecord, ScoreSummary},
};
use askama::Template;

#[derive(Template)]
#[template(path = "login.html")]
pub struct LoginPage {
    pub error: Option<String>,
}

/// One page for every role; sections are switched on the role flags.
#[derive(Template)]
#[template(path = "dashboard.html")]
pub struct DashboardPage {
    pub name: String,
    pub role_label: String,
    pub is_admin: bool,
    pub is_teacher: bool,
    pub is_homeroom: bool,
    pub class_label: Option<String>,
    pub student: Option<StudentPanel>,
}

pub struct StudentPanel {
    pub student_code: String,
    pub cumulative_score: i64,
    pub summary: ScoreSummary,
    pub records: Vec<MeritRecord>,
}

impl DashboardPage {
    pub fn for_account(account: &Account, class_label: Option<String>, student: Option<StudentPanel>) -> Self {
        Self {
            name: account.name.clone(),
            role_label: account.display_position(),
            is_admin: account.is_admin(),
            is_teacher: account.role.is_teacher(),
            is_homeroom: account.role == Role::HomeroomTeacher,
            class_label,
            student,
        }
    }
}
