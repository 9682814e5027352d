// src/web/user_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::{
        account::{Account, ChangePasswordPayload, Role},
        inquiry::{CreateInquiryPayload, Inquiry},
        log::LogCategory,
        merit::{MeritRecord, ScoreSummary},
    },
    services::{account_service, class_service, inquiry_service, log_service, merit_service},
    state::AppState,
    templates::{DashboardPage, StudentPanel},
    web::mw_auth::CurrentUser,
};
use askama::Template;
use axum::{
    extract::{Extension, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse},
    Json,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct StudentRecords {
    pub student: Account,
    pub summary: ScoreSummary,
    pub records: Vec<MeritRecord>,
}

// GET /dashboard
pub async fn dashboard(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<impl IntoResponse> {
    tracing::debug!("GET /dashboard for {}", user.login_id);

    let class_label = match user.role {
        Role::HomeroomTeacher => class_service::class_of_homeroom(&state.db_pool, &user.id)
            .await?
            .map(|class| class.label()),
        _ => None,
    };
    let student = match user.role {
        Role::Student => {
            let records = merit_service::records_of_student(&state.db_pool, &user.id).await?;
            Some(StudentPanel {
                student_code: user.student_code.clone().unwrap_or_default(),
                cumulative_score: user.cumulative_score,
                summary: merit_service::summarize(&records),
                records,
            })
        }
        _ => None,
    };

    let html = DashboardPage::for_account(&user, class_label, student)
        .render()
        .map_err(|e| {
            tracing::error!("Failed to render dashboard: {}", e);
            AppError::InternalServerError
        })?;
    Ok(Html(html))
}

// GET /api/me
pub async fn me(Extension(CurrentUser(user)): Extension<CurrentUser>) -> Json<Account> {
    Json(user)
}

// POST /api/me/password
pub async fn change_password(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<ChangePasswordPayload>,
) -> AppResult<StatusCode> {
    account_service::change_password(
        &state.db_pool,
        &user.id,
        &payload.current_password,
        &payload.new_password,
    )
    .await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Auth, "password_changed", &user.login_id, Some(&user.id))
        .await;
    Ok(StatusCode::NO_CONTENT)
}

// GET /api/students/{id}/records
pub async fn student_records(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(student_id): Path<String>,
) -> AppResult<Json<StudentRecords>> {
    if user.role == Role::Student && user.id != student_id {
        return Err(AppError::Forbidden("본인의 기록만 볼 수 있습니다.".to_string()));
    }
    let student = account_service::find_student(&state.db_pool, &student_id).await?;
    let records = merit_service::records_of_student(&state.db_pool, &student.id).await?;

    Ok(Json(StudentRecords {
        summary: merit_service::summarize(&records),
        student,
        records,
    }))
}

// GET /api/inquiries
pub async fn list_inquiries(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> AppResult<Json<Vec<Inquiry>>> {
    Ok(Json(inquiry_service::list_for(&state.db_pool, &user).await?))
}

// POST /api/inquiries
pub async fn create_inquiry(
    State(state): State<AppState>,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Json(payload): Json<CreateInquiryPayload>,
) -> AppResult<impl IntoResponse> {
    let inquiry = inquiry_service::create(&state.db_pool, &user, &payload.title, &payload.content).await?;
    log_service::record_quietly(&state.db_pool, LogCategory::Inquiry, "created", &inquiry.title, Some(&user.id))
        .await;
    Ok((StatusCode::CREATED, Json(inquiry)))
}
