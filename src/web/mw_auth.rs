// src/web/mw_auth.rs
use crate::{
    error::AppError,
    models::account::{Account, AccountStatus},
    services::account_service,
    state::AppState,
};
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use tower_sessions::Session;

pub const SESSION_ACCOUNT_KEY: &str = "account_id";

/// The logged-in account, inserted into request extensions by `require_auth`.
#[derive(Clone, Debug)]
pub struct CurrentUser(pub Account);

// JSON callers get a 401, browsers are sent to the login page.
fn not_logged_in(is_api: bool) -> Result<Response, AppError> {
    if is_api {
        Err(AppError::Unauthorized)
    } else {
        Ok(Redirect::to("/login").into_response())
    }
}

pub async fn require_auth(
    State(state): State<AppState>,
    session: Session,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let is_api = request.uri().path().starts_with("/api");

    let account_id = match session.get::<String>(SESSION_ACCOUNT_KEY).await {
        Ok(Some(id)) => id,
        Ok(None) => {
            tracing::debug!("Auth MW: no session for {}", request.uri().path());
            return not_logged_in(is_api);
        }
        Err(e) => {
            tracing::error!("Auth MW: failed to read session: {:?}", e);
            return Err(AppError::SessionError(e.to_string()));
        }
    };

    match account_service::find_by_id(&state.db_pool, &account_id).await? {
        Some(account) if account.status == AccountStatus::Active => {
            tracing::debug!("Auth MW: '{}' authenticated.", account.login_id);
            request.extensions_mut().insert(CurrentUser(account));
            Ok(next.run(request).await)
        }
        _ => {
            // Deleted or deactivated since login.
            tracing::warn!("Auth MW: session for inactive or missing account {}", account_id);
            session
                .flush()
                .await
                .map_err(|e| AppError::SessionError(e.to_string()))?;
            not_logged_in(is_api)
        }
    }
}
