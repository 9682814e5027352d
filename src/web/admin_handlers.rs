// src/web/admin_handlers.rs
use crate::{
    config::MailConfig,
    error::{AppError, AppResult},
    models::{
        account::{Account, AccountStatus, ImportSummary, TeacherSignup},
        class::{Class, ClassOverview, CreateClassPayload, UpdateClassPayload},
        inquiry::{AnswerInquiryPayload, Inquiry},
        log::{LogCategory, LogQuery, SystemLog},
        merit::{CreateReasonPayload, MeritReason},
        reset::{ExecuteResetPayload, ResetStatus, ResetSummary},
    },
    services::{
        account_service::{self, NewTeacher},
        class_service, inquiry_service, log_service, merit_service, report_service, reset_service,
        spreadsheet_service,
    },
    state::AppState,
    web::{mw_auth::CurrentUser, xlsx_attachment},
};
use axum::{
    extract::{Extension, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Deserialize, Debug)]
pub struct StatusPayload {
    pub status: AccountStatus,
}

#[derive(Deserialize, Debug)]
pub struct ResetPasswordPayload {
    pub new_password: String,
}

#[derive(Deserialize, Debug)]
pub struct TestReportPayload {
    pub to: String,
}

#[derive(Deserialize, Debug, Default)]
pub struct RunReportPayload {
    /// Local date to report on; today when omitted.
    pub date: Option<NaiveDate>,
}

fn mail_config(state: &AppState) -> AppResult<&MailConfig> {
    state
        .config
        .mail
        .as_ref()
        .ok_or_else(|| AppError::Validation("메일(SMTP) 설정이 없습니다.".to_string()))
}

// --- Teachers and accounts ---

// GET /api/admin/teachers
pub async fn list_teachers(State(state): State<AppState>) -> AppResult<Json<Vec<Account>>> {
    Ok(Json(account_service::list_teachers(&state.db_pool).await?))
}

// POST /api/admin/teachers
pub async fn create_teacher(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Json(payload): Json<TeacherSignup>,
) -> AppResult<impl IntoResponse> {
    let teacher = account_service::create_teacher(
        &state.db_pool,
        NewTeacher {
            email: payload.email,
            name: payload.name,
            password: payload.password,
            role: payload.role,
            subject: payload.subject,
        },
    )
    .await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Account, "teacher_created", &teacher.login_id, Some(&admin.id))
        .await;
    Ok((StatusCode::CREATED, Json(teacher)))
}

// POST /api/admin/teachers/{id}/status
pub async fn set_teacher_status(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(account_id): Path<String>,
    Json(payload): Json<StatusPayload>,
) -> AppResult<Json<Account>> {
    let teacher = account_service::set_status(&state.db_pool, &account_id, payload.status).await?;
    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Account,
        "status_changed",
        &format!("{} -> {:?}", teacher.login_id, payload.status),
        Some(&admin.id),
    )
    .await;
    Ok(Json(teacher))
}

// POST /api/admin/accounts/{id}/password
pub async fn reset_password(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(account_id): Path<String>,
    Json(payload): Json<ResetPasswordPayload>,
) -> AppResult<StatusCode> {
    account_service::reset_password(&state.db_pool, &account_id, &payload.new_password).await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Account, "password_reset", &account_id, Some(&admin.id))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

// DELETE /api/admin/accounts/{id}
pub async fn delete_account(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(account_id): Path<String>,
) -> AppResult<StatusCode> {
    let deleted = account_service::delete_account(&state.db_pool, &account_id).await?;
    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Account,
        "deleted",
        &format!("{} ({})", deleted.login_id, deleted.role.label()),
        Some(&admin.id),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

// --- Classes ---

// GET /api/admin/classes
pub async fn list_classes(State(state): State<AppState>) -> AppResult<Json<Vec<ClassOverview>>> {
    Ok(Json(class_service::list_classes(&state.db_pool).await?))
}

// POST /api/admin/classes
pub async fn create_class(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Json(payload): Json<CreateClassPayload>,
) -> AppResult<impl IntoResponse> {
    let class = class_service::create_class(
        &state.db_pool,
        payload.grade,
        payload.class_number,
        payload.homeroom_teacher_id.as_deref(),
    )
    .await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Class, "created", &class.label(), Some(&admin.id)).await;
    Ok((StatusCode::CREATED, Json(class)))
}

// PUT /api/admin/classes/{id}
pub async fn update_class(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(class_id): Path<String>,
    Json(payload): Json<UpdateClassPayload>,
) -> AppResult<Json<Class>> {
    let class = class_service::update_class(
        &state.db_pool,
        &class_id,
        payload.homeroom_teacher_id.as_deref(),
        &payload.subject_teacher_ids,
    )
    .await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Class, "updated", &class.label(), Some(&admin.id)).await;
    Ok(Json(class))
}

// DELETE /api/admin/classes/{id}
pub async fn delete_class(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(class_id): Path<String>,
) -> AppResult<StatusCode> {
    let class = class_service::delete_class(&state.db_pool, &class_id).await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Class, "deleted", &class.label(), Some(&admin.id)).await;
    Ok(StatusCode::NO_CONTENT)
}

// --- Students and records (XLSX) ---

// POST /api/admin/students/import (multipart, field "file")
pub async fn import_students(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    mut multipart: Multipart,
) -> AppResult<Json<ImportSummary>> {
    let mut upload = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("업로드를 읽을 수 없습니다: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::Validation(format!("업로드를 읽을 수 없습니다: {}", e)))?;
            upload = Some(bytes);
        }
    }
    let bytes = upload.ok_or_else(|| AppError::Validation("엑셀 파일을 첨부해 주세요.".to_string()))?;

    let parsed = spreadsheet_service::parse_student_workbook(&bytes)?;
    tracing::info!(
        "📥 Importing {} student row(s) from sheet '{}' ({} bad row(s)).",
        parsed.rows.len(),
        parsed.sheet_name,
        parsed.errors.len()
    );
    let mut summary = account_service::import_students(&state.db_pool, &parsed.rows).await?;
    let mut errors = parsed.errors;
    errors.append(&mut summary.errors);
    summary.errors = errors;

    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Import,
        "students_imported",
        &format!(
            "{}: created {}, updated {}, errors {}",
            parsed.sheet_name,
            summary.created,
            summary.updated,
            summary.errors.len()
        ),
        Some(&admin.id),
    )
    .await;
    Ok(Json(summary))
}

// GET /api/admin/students/export.xlsx
pub async fn export_students(State(state): State<AppState>) -> AppResult<Response> {
    let students = account_service::list_students(&state.db_pool, None, None).await?;
    let bytes = spreadsheet_service::export_students(&students)?;
    Ok(xlsx_attachment("학생명단.xlsx", bytes))
}

// GET /api/admin/records/export.xlsx
pub async fn export_records(State(state): State<AppState>) -> AppResult<Response> {
    let records = merit_service::records_with_students(&state.db_pool, None, None).await?;
    let bytes = spreadsheet_service::export_records(&records, state.config.report.offset())?;
    Ok(xlsx_attachment("상벌점기록.xlsx", bytes))
}

// DELETE /api/admin/records/{id}
pub async fn delete_record(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(record_id): Path<String>,
) -> AppResult<Json<Value>> {
    let (record, cumulative_score) = merit_service::delete_record(&state.db_pool, &record_id).await?;
    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Merit,
        "record_deleted",
        &format!("{} {} {}: {}", record.student_id, record.kind.label(), record.points, record.reason),
        Some(&admin.id),
    )
    .await;
    Ok(Json(json!({ "deleted": record.id, "cumulative_score": cumulative_score })))
}

// --- Reasons ---

// POST /api/admin/reasons
pub async fn create_reason(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Json(payload): Json<CreateReasonPayload>,
) -> AppResult<impl IntoResponse> {
    let reason =
        merit_service::create_reason(&state.db_pool, payload.kind, &payload.reason, payload.default_points).await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Merit, "reason_created", &reason.reason, Some(&admin.id))
        .await;
    Ok((StatusCode::CREATED, Json::<MeritReason>(reason)))
}

// DELETE /api/admin/reasons/{id}
pub async fn delete_reason(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(reason_id): Path<i64>,
) -> AppResult<StatusCode> {
    merit_service::delete_reason(&state.db_pool, reason_id).await?;
    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Merit,
        "reason_deleted",
        &reason_id.to_string(),
        Some(&admin.id),
    )
    .await;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/admin/logs
pub async fn list_logs(
    State(state): State<AppState>,
    Query(query): Query<LogQuery>,
) -> AppResult<Json<Vec<SystemLog>>> {
    Ok(Json(log_service::list(&state.db_pool, query.category, query.limit).await?))
}

// --- Reset ---

// POST /api/admin/reset/initiate
pub async fn initiate_reset(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
) -> AppResult<Json<ResetStatus>> {
    let status = reset_service::initiate(&state.db_pool, &admin).await?;
    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Reset,
        "initiated",
        &format!("{} consent(s) requested", status.consents.len()),
        Some(&admin.id),
    )
    .await;
    Ok(Json(status))
}

// GET /api/admin/reset/status
pub async fn reset_status(State(state): State<AppState>) -> AppResult<Json<ResetStatus>> {
    Ok(Json(reset_service::status(&state.db_pool).await?))
}

// POST /api/admin/reset/execute
pub async fn execute_reset(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Json(payload): Json<ExecuteResetPayload>,
) -> AppResult<Json<ResetSummary>> {
    let summary = reset_service::execute(&state.db_pool, &admin, payload.include_students).await?;
    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Reset,
        "executed",
        &format!(
            "records {}, requests {}, students {}",
            summary.records_deleted, summary.requests_deleted, summary.students_deleted
        ),
        Some(&admin.id),
    )
    .await;
    Ok(Json(summary))
}

// POST /api/admin/inquiries/{id}/answer
pub async fn answer_inquiry(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Path(inquiry_id): Path<String>,
    Json(payload): Json<AnswerInquiryPayload>,
) -> AppResult<Json<Inquiry>> {
    let inquiry = inquiry_service::answer(&state.db_pool, &admin, &inquiry_id, &payload.answer).await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Inquiry, "answered", &inquiry.title, Some(&admin.id))
        .await;
    Ok(Json(inquiry))
}

// --- Reports ---

// POST /api/admin/reports/test
pub async fn send_test_report(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Json(payload): Json<TestReportPayload>,
) -> AppResult<StatusCode> {
    let mail = mail_config(&state)?;
    let offset = state.config.report.offset();
    let today = Utc::now().with_timezone(&offset).date_naive();
    report_service::send_test_report(mail, &payload.to, today, offset).await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Report, "test_sent", payload.to.trim(), Some(&admin.id))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

// POST /api/admin/reports/run
pub async fn run_daily_reports(
    State(state): State<AppState>,
    Extension(CurrentUser(admin)): Extension<CurrentUser>,
    Json(payload): Json<RunReportPayload>,
) -> AppResult<Json<Value>> {
    let mail = mail_config(&state)?;
    let offset = state.config.report.offset();
    let date = payload
        .date
        .unwrap_or_else(|| Utc::now().with_timezone(&offset).date_naive());
    let sent = report_service::send_daily_reports(&state.db_pool, mail, date, offset).await?;
    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Report,
        "daily_reports_sent",
        &format!("{date}: {sent} sent (manual)"),
        Some(&admin.id),
    )
    .await;
    Ok(Json(json!({ "date": date, "sent": sent })))
}
