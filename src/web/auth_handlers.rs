// src/web/auth_handlers.rs
use crate::{
    error::{AppError, AppResult},
    models::{
        account::{AccountStatus, LoginForm, TeacherSignup},
        log::LogCategory,
    },
    services::{
        account_service::{self, NewTeacher},
        auth_service, log_service,
    },
    state::AppState,
    templates::LoginPage,
    web::mw_auth::SESSION_ACCOUNT_KEY,
};
use askama::Template;
use axum::{
    extract::{Form, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    Json,
};
use serde_json::json;
use tower_sessions::Session;

fn render_login(status: StatusCode, error: Option<String>) -> AppResult<Response> {
    let html = LoginPage { error }.render().map_err(|e| {
        tracing::error!("Failed to render login template: {}", e);
        AppError::InternalServerError
    })?;
    Ok((status, Html(html)).into_response())
}

// GET /login
pub async fn show_login_form(session: Session) -> AppResult<Response> {
    if session
        .get::<String>(SESSION_ACCOUNT_KEY)
        .await
        .ok()
        .flatten()
        .is_some()
    {
        tracing::debug!("GET /login: already logged in, redirecting to /dashboard");
        return Ok(Redirect::to("/dashboard").into_response());
    }
    render_login(StatusCode::OK, None)
}

// POST /login
pub async fn handle_login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> AppResult<Response> {
    tracing::info!("Login attempt for '{}'", form.login_id);

    let account = match auth_service::authenticate(&state.db_pool, &form.login_id, &form.password).await {
        Ok(account) => account,
        Err(e @ (AppError::InvalidCredentials | AppError::AccountPending | AppError::Forbidden(_))) => {
            return render_login(e.status(), Some(e.user_message()));
        }
        Err(e) => return Err(e),
    };

    session
        .cycle_id()
        .await
        .map_err(|e| AppError::SessionError(format!("Failed to cycle session id: {}", e)))?;
    session
        .insert(SESSION_ACCOUNT_KEY, &account.id)
        .await
        .map_err(|e| AppError::SessionError(format!("Failed to store session: {}", e)))?;

    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Auth,
        "login",
        &account.login_id,
        Some(&account.id),
    )
    .await;
    tracing::info!("✅ Login for '{}' ({})", account.login_id, account.role.as_str());
    Ok(Redirect::to("/dashboard").into_response())
}

// GET /logout
pub async fn handle_logout(session: Session) -> AppResult<Redirect> {
    let account_id: Option<String> = session.get(SESSION_ACCOUNT_KEY).await.ok().flatten();

    session
        .delete()
        .await
        .map_err(|e| AppError::SessionError(format!("Failed to delete session: {}", e)))?;

    match account_id {
        Some(id) => tracing::info!("🚪 Account '{}' logged out.", id),
        None => tracing::info!("🚪 Anonymous session logged out."),
    }
    Ok(Redirect::to("/login"))
}

// POST /signup
pub async fn handle_signup(
    State(state): State<AppState>,
    Json(payload): Json<TeacherSignup>,
) -> AppResult<impl IntoResponse> {
    let teacher = NewTeacher {
        email: payload.email,
        name: payload.name,
        password: payload.password,
        role: payload.role,
        subject: payload.subject,
    };
    let account = account_service::register_teacher(&state.db_pool, teacher, AccountStatus::Pending).await?;

    log_service::record_quietly(
        &state.db_pool,
        LogCategory::Account,
        "teacher_signup",
        &format!("{} ({})", account.login_id, account.role.label()),
        Some(&account.id),
    )
    .await;
    Ok((StatusCode::CREATED, Json(account)))
}

// GET /health
pub async fn health(State(state): State<AppState>) -> AppResult<Json<serde_json::Value>> {
    sqlx::query("SELECT 1").execute(&state.db_pool).await?;
    Ok(Json(json!({ "status": "ok" })))
}
