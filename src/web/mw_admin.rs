// src/web/mw_admin.rs
use crate::{error::AppError, web::mw_auth::CurrentUser};
use axum::{
    extract::{Extension, Request},
    middleware::Next,
    response::Response,
};

/// Must run after `require_auth`.
pub async fn require_admin(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if user.is_admin() {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Admin MW: access denied for {}", user.login_id);
        Err(AppError::Forbidden("관리자만 사용할 수 있습니다.".to_string()))
    }
}

/// Teachers and admins. Must run after `require_auth`.
pub async fn require_staff(
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    if user.role.is_staff() {
        Ok(next.run(request).await)
    } else {
        tracing::warn!("Staff MW: access denied for {}", user.login_id);
        Err(AppError::Forbidden("교사만 사용할 수 있습니다.".to_string()))
    }
}
