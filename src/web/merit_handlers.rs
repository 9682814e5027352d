// src/web/merit_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::{
        account::Account,
        class::Class,
        log::LogCategory,
        merit::{AwardOutcome, AwardPayload, MeritReason, MeritRequest, RejectPayload},
        reset::{ConsentPayload, ResetStatus},
    },
    services::{account_service, class_service, log_service, merit_service, reset_service, spreadsheet_service},
    state::AppState,
    web::{mw_auth::CurrentUser, xlsx_attachment},
};
use axum::{
    extract::{Extension, Path, Query, State},
    response::Response,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize, Default)]
pub struct StudentQuery {
    pub grade: Option<i64>,
    pub class_number: Option<i64>,
}

// GET /api/students
pub async fn list_students(
    State(state): State<AppState>,
    Query(query): Query<StudentQuery>,
) -> AppResult<Json<Vec<Account>>> {
    let students = account_service::list_students(&state.db_pool, query.grade, query.class_number).await?;
    Ok(Json(students))
}

// POST /api/merits
pub async fn award(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<AwardPayload>,
) -> AppResult<Json<AwardOutcome>> {
    let outcome = merit_service::award(
        &state.db_pool,
        &user,
        &payload.student_id,
        payload.kind,
        payload.points,
        &payload.reason,
    )
    .await?;

    let (category, action) = match &outcome {
        AwardOutcome::Recorded { .. } => (LogCategory::Merit, "recorded"),
        AwardOutcome::Requested { .. } => (LogCategory::Request, "requested"),
    };
    log_service::record_quietly(
        &state.db_pool,
        category,
        action,
        &format!("{} {} {}: {}", payload.student_id, payload.kind.label(), payload.points, payload.reason.trim()),
        Some(&user.id),
    )
    .await;
    Ok(Json(outcome))
}

// GET /api/requests/pending
pub async fn pending_requests(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<Vec<MeritRequest>>> {
    Ok(Json(merit_service::pending_requests_for(&state.db_pool, &user).await?))
}

// GET /api/requests/mine
pub async fn my_requests(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<Vec<MeritRequest>>> {
    Ok(Json(merit_service::requests_by(&state.db_pool, &user.id).await?))
}

// POST /api/requests/{id}/approve
pub async fn approve_request(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(request_id): Path<String>,
) -> AppResult<Json<Value>> {
    let (record, cumulative_score) = merit_service::approve_request(&state.db_pool, &user, &request_id).await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Request, "approved", &request_id, Some(&user.id)).await;
    Ok(Json(json!({ "record": record, "cumulative_score": cumulative_score })))
}

// POST /api/requests/{id}/reject
pub async fn reject_request(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(request_id): Path<String>,
    Json(payload): Json<RejectPayload>,
) -> AppResult<Json<MeritRequest>> {
    let request =
        merit_service::reject_request(&state.db_pool, &user, &request_id, payload.reason.as_deref()).await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Request, "rejected", &request_id, Some(&user.id)).await;
    Ok(Json(request))
}

// GET /api/reasons
pub async fn list_reasons(State(state): State<AppState>) -> AppResult<Json<Vec<MeritReason>>> {
    Ok(Json(merit_service::list_reasons(&state.db_pool).await?))
}

async fn own_class(state: &AppState, user: &Account) -> AppResult<Class> {
    class_service::class_of_homeroom(&state.db_pool, &user.id)
        .await?
        .ok_or_else(|| AppError::NotFound("담임 학급이 없습니다.".to_string()))
}

// GET /api/class/students
pub async fn class_students(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<Vec<Account>>> {
    let class = own_class(&state, &user).await?;
    Ok(Json(class_service::students_of_class(&state.db_pool, &class).await?))
}

// GET /api/class/export.xlsx
pub async fn export_class_records(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Response> {
    let class = own_class(&state, &user).await?;
    let records =
        merit_service::records_with_students(&state.db_pool, Some(class.grade), Some(class.class_number)).await?;
    let bytes = spreadsheet_service::export_records(&records, state.config.report.offset())?;
    Ok(xlsx_attachment(&format!("상벌점_{}학년{}반.xlsx", class.grade, class.class_number), bytes))
}

// POST /api/reset/consent
pub async fn respond_reset(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<ConsentPayload>,
) -> AppResult<Json<ResetStatus>> {
    let status = reset_service::respond(&state.db_pool, &user, payload.approve).await?;
    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Reset,
        if payload.approve { "consent_approved" } else { "consent_rejected" },
        &user.name,
        Some(&user.id),
    )
    .await;
    Ok(Json(status))
}
